//! Backup-and-replace orchestrator.
//!
//! Installs a staged archive for one build type in five ordered steps:
//!
//! 1. EvictBackup: delete the old backup archive
//! 2. DemoteCurrent: rename the canonical archive to the backup path
//! 3. ClearTarget: recursively delete the target directory
//! 4. Expand: unzip the staged archive into the target directory
//! 5. PromoteStaged: rename the staged archive to the canonical path
//!
//! Every step except Expand ignores its failure: it is logged, recorded in the
//! [`ReplaceReport`], and the sequence carries on. Expand propagates, so a
//! corrupt archive stops the sequence before promotion. Nothing is rolled
//! back; the target directory and the canonical archive can disagree after a
//! partial failure.

use std::fmt;
use std::io;
use std::path::Path;

use tokio::fs;
use tracing::{debug, error, info, instrument, warn};

use crate::domain::{BuildType, DeploymentTarget};
use crate::error::DeployError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReplaceStep {
    EvictBackup,
    DemoteCurrent,
    ClearTarget,
    Expand,
    PromoteStaged,
}

impl ReplaceStep {
    pub fn name(self) -> &'static str {
        match self {
            Self::EvictBackup => "evict_backup",
            Self::DemoteCurrent => "demote_current",
            Self::ClearTarget => "clear_target",
            Self::Expand => "expand",
            Self::PromoteStaged => "promote_staged",
        }
    }
}

impl fmt::Display for ReplaceStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// What happened to a single step
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepOutcome {
    Done,
    /// Nothing to do (the input path did not exist)
    Skipped,
    /// Failed and was swallowed, or failed fatally
    Failed(String),
}

/// Per-step record of a replace run
#[derive(Debug, Clone)]
pub struct ReplaceReport {
    pub build_type: BuildType,
    pub steps: Vec<(ReplaceStep, StepOutcome)>,
}

impl ReplaceReport {
    fn new(build_type: BuildType) -> Self {
        Self {
            build_type,
            steps: Vec::with_capacity(5),
        }
    }

    fn record(&mut self, step: ReplaceStep, outcome: StepOutcome) {
        self.steps.push((step, outcome));
    }

    pub fn outcome(&self, step: ReplaceStep) -> Option<&StepOutcome> {
        self.steps
            .iter()
            .find(|(s, _)| *s == step)
            .map(|(_, outcome)| outcome)
    }

    /// Steps that failed but did not stop the sequence
    pub fn swallowed_failures(&self) -> Vec<ReplaceStep> {
        self.steps
            .iter()
            .filter(|(_, outcome)| matches!(outcome, StepOutcome::Failed(_)))
            .map(|(step, _)| *step)
            .collect()
    }
}

/// Failure policy annotations for step results
trait StepResultExt {
    /// Log and record a failure, then continue
    fn ignore_failure(self, step: ReplaceStep, report: &mut ReplaceReport);

    /// Record a failure and hand it to the caller
    fn propagate_failure(
        self,
        step: ReplaceStep,
        report: &mut ReplaceReport,
    ) -> Result<(), DeployError>;
}

impl StepResultExt for Result<StepOutcome, DeployError> {
    fn ignore_failure(self, step: ReplaceStep, report: &mut ReplaceReport) {
        match self {
            Ok(outcome) => {
                debug!(build_type = %report.build_type, %step, ?outcome, "Step finished");
                report.record(step, outcome);
            }
            Err(e) => {
                warn!(build_type = %report.build_type, %step, error = %e, "Step failed, continuing");
                report.record(step, StepOutcome::Failed(e.to_string()));
            }
        }
    }

    fn propagate_failure(
        self,
        step: ReplaceStep,
        report: &mut ReplaceReport,
    ) -> Result<(), DeployError> {
        match self {
            Ok(outcome) => {
                debug!(build_type = %report.build_type, %step, ?outcome, "Step finished");
                report.record(step, outcome);
                Ok(())
            }
            Err(e) => {
                error!(build_type = %report.build_type, %step, error = %e, "Step failed, aborting");
                report.record(step, StepOutcome::Failed(e.to_string()));
                Err(e)
            }
        }
    }
}

/// Map a missing path to `Skipped`, any other I/O error to a filesystem error
fn absent_is_skipped(result: io::Result<()>, path: &Path) -> Result<StepOutcome, DeployError> {
    match result {
        Ok(()) => Ok(StepOutcome::Done),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(StepOutcome::Skipped),
        Err(e) => Err(DeployError::fs(path, e)),
    }
}

/// Runs the backup-and-replace sequence for a deployment target
#[derive(Debug, Default, Clone)]
pub struct ReplaceOrchestrator;

impl ReplaceOrchestrator {
    pub fn new() -> Self {
        Self
    }

    /// Install the staged archive of `target`.
    ///
    /// Returns the per-step report, or the extraction error if Expand failed.
    #[instrument(skip(self, target), fields(build_type = %target.build_type))]
    pub async fn replace(&self, target: &DeploymentTarget) -> Result<ReplaceReport, DeployError> {
        let mut report = ReplaceReport::new(target.build_type.clone());

        self.evict_backup(target)
            .await
            .ignore_failure(ReplaceStep::EvictBackup, &mut report);
        self.demote_current(target)
            .await
            .ignore_failure(ReplaceStep::DemoteCurrent, &mut report);
        self.clear_target(target)
            .await
            .ignore_failure(ReplaceStep::ClearTarget, &mut report);
        self.expand(target)
            .await
            .propagate_failure(ReplaceStep::Expand, &mut report)?;
        self.promote_staged(target)
            .await
            .ignore_failure(ReplaceStep::PromoteStaged, &mut report);

        info!(
            swallowed = report.swallowed_failures().len(),
            "Archive installed"
        );
        Ok(report)
    }

    async fn evict_backup(&self, target: &DeploymentTarget) -> Result<StepOutcome, DeployError> {
        let path = &target.backup_archive;
        absent_is_skipped(fs::remove_file(path).await, path)
    }

    async fn demote_current(&self, target: &DeploymentTarget) -> Result<StepOutcome, DeployError> {
        let result = fs::rename(&target.canonical_archive, &target.backup_archive).await;
        absent_is_skipped(result, &target.canonical_archive)
    }

    async fn clear_target(&self, target: &DeploymentTarget) -> Result<StepOutcome, DeployError> {
        let path = &target.target_dir;
        absent_is_skipped(fs::remove_dir_all(path).await, path)
    }

    async fn expand(&self, target: &DeploymentTarget) -> Result<StepOutcome, DeployError> {
        let archive = target.staged_archive.clone();
        let dest = target.target_dir.clone();

        let entries = tokio::task::spawn_blocking(move || extract_zip(&archive, &dest))
            .await
            .map_err(|e| DeployError::Extraction {
                archive: target.staged_archive.clone(),
                message: format!("extraction task failed: {}", e),
            })??;

        debug!(entries, target = %target.target_dir.display(), "Archive expanded");
        Ok(StepOutcome::Done)
    }

    async fn promote_staged(&self, target: &DeploymentTarget) -> Result<StepOutcome, DeployError> {
        fs::rename(&target.staged_archive, &target.canonical_archive)
            .await
            .map(|_| StepOutcome::Done)
            .map_err(|e| DeployError::fs(&target.staged_archive, e))
    }
}

/// Extract a zip archive into `dest`, creating it first. Returns the entry count.
pub fn extract_zip(archive: &Path, dest: &Path) -> Result<usize, DeployError> {
    let fail = |message: String| DeployError::Extraction {
        archive: archive.to_path_buf(),
        message,
    };

    std::fs::create_dir_all(dest)
        .map_err(|e| fail(format!("cannot create {}: {}", dest.display(), e)))?;

    let file = std::fs::File::open(archive).map_err(|e| fail(e.to_string()))?;
    let mut zip = zip::ZipArchive::new(file).map_err(|e| fail(e.to_string()))?;
    let entries = zip.len();
    zip.extract(dest).map_err(|e| fail(e.to_string()))?;

    Ok(entries)
}
