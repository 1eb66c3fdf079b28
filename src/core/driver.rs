//! Deployment driver.
//!
//! Resolves the wanted build types against the latest CI run, then downloads
//! and installs each matching archive one after another. Build types the run
//! did not publish are skipped with a warning and leave the filesystem alone.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tracing::{error, info, instrument, warn};

use super::locks::BuildLocks;
use super::replace::{ReplaceOrchestrator, ReplaceReport};
use crate::adapters::ArtifactSource;
use crate::domain::{
    ArtifactDeployRequest, ArtifactDescriptor, BuildType, DeploymentTarget, RepoRef,
    StagedArchive,
};
use crate::error::DeployError;

/// Result for one build type
#[derive(Debug)]
pub enum BuildTypeResult {
    Deployed {
        archive: StagedArchive,
        report: ReplaceReport,
    },
    /// The latest run published no artifact with this name
    Skipped,
    Failed(DeployError),
}

#[derive(Debug)]
pub struct BuildTypeOutcome {
    pub build_type: BuildType,
    pub result: BuildTypeResult,
}

/// Outcome of one driver run
#[derive(Debug)]
pub struct DeploySummary {
    pub repo: RepoRef,
    pub outcomes: Vec<BuildTypeOutcome>,
}

impl DeploySummary {
    fn names_where(&self, pred: impl Fn(&BuildTypeResult) -> bool) -> Vec<&str> {
        self.outcomes
            .iter()
            .filter(|o| pred(&o.result))
            .map(|o| o.build_type.as_str())
            .collect()
    }

    pub fn deployed(&self) -> Vec<&str> {
        self.names_where(|r| matches!(r, BuildTypeResult::Deployed { .. }))
    }

    pub fn skipped(&self) -> Vec<&str> {
        self.names_where(|r| matches!(r, BuildTypeResult::Skipped))
    }

    pub fn failed(&self) -> Vec<&str> {
        self.names_where(|r| matches!(r, BuildTypeResult::Failed(_)))
    }

    pub fn is_success(&self) -> bool {
        self.failed().is_empty()
    }

    /// `Ok` when nothing failed, otherwise the first failure
    pub fn into_result(self) -> Result<(), DeployError> {
        for outcome in self.outcomes {
            if let BuildTypeResult::Failed(e) = outcome.result {
                return Err(e);
            }
        }
        Ok(())
    }
}

/// Drives artifact deployments for one deploy root
pub struct DeploymentDriver {
    source: Arc<dyn ArtifactSource>,
    orchestrator: ReplaceOrchestrator,
    locks: Arc<BuildLocks>,
    deploy_root: PathBuf,
    settle_delay: Duration,
}

impl DeploymentDriver {
    pub fn new(source: Arc<dyn ArtifactSource>, locks: Arc<BuildLocks>, deploy_root: PathBuf) -> Self {
        Self {
            source,
            orchestrator: ReplaceOrchestrator::new(),
            locks,
            deploy_root,
            settle_delay: Duration::ZERO,
        }
    }

    /// Wait this long before asking the CI provider for artifacts
    pub fn with_settle_delay(mut self, delay: Duration) -> Self {
        self.settle_delay = delay;
        self
    }

    pub fn target(&self, build_type: &BuildType) -> DeploymentTarget {
        DeploymentTarget::new(&self.deploy_root, build_type)
    }

    /// Deploy every requested build type of a repository, sequentially.
    ///
    /// Fails only if the artifact listing cannot be resolved; per build type
    /// failures are reported in the summary.
    #[instrument(skip(self, request), fields(repo = %request.repo))]
    pub async fn deploy(&self, request: &ArtifactDeployRequest) -> Result<DeploySummary, DeployError> {
        if !self.settle_delay.is_zero() {
            info!(seconds = self.settle_delay.as_secs(), "Waiting for artifacts to settle");
            tokio::time::sleep(self.settle_delay).await;
        }

        let mut wanted: Vec<BuildType> = Vec::with_capacity(request.build_types.len());
        for bt in &request.build_types {
            if !wanted.contains(bt) {
                wanted.push(bt.clone());
            }
        }

        let artifacts = self.source.resolve_artifacts(&request.repo, &wanted).await?;
        if artifacts.is_empty() {
            warn!(source = self.source.name(), "No matching artifacts in latest run");
        }

        let mut outcomes = Vec::with_capacity(wanted.len());
        for build_type in wanted {
            let result = match artifacts.iter().find(|a| a.build_type == build_type) {
                None => {
                    warn!(%build_type, "No artifact with this name found to deploy");
                    BuildTypeResult::Skipped
                }
                Some(artifact) => match self.deploy_artifact(artifact).await {
                    Ok((archive, report)) => BuildTypeResult::Deployed { archive, report },
                    Err(e) => {
                        error!(%build_type, error = %e, "Deployment failed");
                        BuildTypeResult::Failed(e)
                    }
                },
            };
            outcomes.push(BuildTypeOutcome { build_type, result });
        }

        Ok(DeploySummary {
            repo: request.repo.clone(),
            outcomes,
        })
    }

    /// Download one artifact to its staging path and install it
    #[instrument(skip(self, artifact), fields(build_type = %artifact.build_type))]
    pub async fn deploy_artifact(
        &self,
        artifact: &ArtifactDescriptor,
    ) -> Result<(StagedArchive, ReplaceReport), DeployError> {
        let target = self.target(&artifact.build_type);
        let _guard = self.locks.acquire(&target).await?;

        let archive = self
            .source
            .download(&artifact.download_url, &target.staged_archive)
            .await?;
        info!(
            size_bytes = archive.size_bytes,
            sha256 = %archive.sha256,
            "Build downloaded"
        );

        let report = self.orchestrator.replace(&target).await?;
        info!("Deployment completed");

        Ok((archive, report))
    }
}
