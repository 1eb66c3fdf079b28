//! Adapter interfaces for external systems.
//!
//! Two seams: where deployable archives come from (the CI provider) and how
//! external commands are run (git and the lifecycle scripts). The drivers only
//! talk to these traits, so tests can swap in fakes.

pub mod github;
pub mod process;

use std::path::Path;

use async_trait::async_trait;

use crate::domain::{ArtifactDescriptor, BuildType, RepoRef, StagedArchive};
use crate::error::DeployError;

pub use github::GitHubClient;
pub use process::{CommandSpec, ProcessRunner, TokioProcessRunner};

/// Source of deployable build archives
#[async_trait]
pub trait ArtifactSource: Send + Sync {
    /// Human-readable source name
    fn name(&self) -> &str;

    /// Artifacts of the most recent run whose names are in `wanted`.
    ///
    /// An empty result is not an error; the caller decides what a missing
    /// build type means.
    async fn resolve_artifacts(
        &self,
        repo: &RepoRef,
        wanted: &[BuildType],
    ) -> Result<Vec<ArtifactDescriptor>, DeployError>;

    /// Download `url` to `dest`, overwriting it
    async fn download(&self, url: &str, dest: &Path) -> Result<StagedArchive, DeployError>;
}
