//! CI workflow runs and the artifacts they publish.
//!
//! These mirror the subset of the GitHub Actions REST payloads the fetcher
//! reads; unknown fields are ignored.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use super::build_type::BuildType;

/// One workflow run from `GET /repos/{owner}/{repo}/actions/runs`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowRun {
    pub id: u64,

    #[serde(default)]
    pub status: Option<String>,

    #[serde(default)]
    pub conclusion: Option<String>,

    #[serde(default)]
    pub head_branch: Option<String>,

    /// Listing of the artifacts this run produced
    pub artifacts_url: String,
}

/// Envelope of the workflow run listing (most recent first)
#[derive(Debug, Clone, Deserialize)]
pub struct WorkflowRunList {
    #[serde(default)]
    pub workflow_runs: Vec<WorkflowRun>,
}

/// One entry of a run's artifact listing
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteArtifact {
    pub id: u64,
    pub name: String,
    pub archive_download_url: String,

    #[serde(default)]
    pub expired: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RemoteArtifactList {
    #[serde(default)]
    pub artifacts: Vec<RemoteArtifact>,
}

/// An artifact matched to a wanted build type, ready to download
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactDescriptor {
    pub build_type: BuildType,
    pub download_url: String,
}

impl RemoteArtifactList {
    /// Pair each wanted build type with the first unexpired artifact of the
    /// same name
    pub fn matching(&self, wanted: &[BuildType]) -> Vec<ArtifactDescriptor> {
        wanted
            .iter()
            .filter_map(|bt| {
                self.artifacts
                    .iter()
                    .find(|a| a.name == bt.as_str() && !a.expired)
                    .map(|a| ArtifactDescriptor {
                        build_type: bt.clone(),
                        download_url: a.archive_download_url.clone(),
                    })
            })
            .collect()
    }
}

/// A downloaded archive sitting at its staging path
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StagedArchive {
    pub path: PathBuf,
    pub size_bytes: u64,
    /// Hex SHA-256 of the staged bytes
    pub sha256: String,
}
