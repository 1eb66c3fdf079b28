//! Core deployment logic.
//!
//! This module contains:
//! - Stager: streams downloads to the staging path
//! - Replace: the backup-and-replace sequence for one build type
//! - Driver: sequential deployment of a repository's build types
//! - Service: the script-driven build-service pipeline
//! - Locks: per-build-type mutual exclusion
//! - Queue: bounded work queue and its worker
//! - History: append-only job log

pub mod driver;
pub mod history;
pub mod locks;
pub mod queue;
pub mod replace;
pub mod service;
pub mod stager;

pub use driver::{BuildTypeOutcome, BuildTypeResult, DeploySummary, DeploymentDriver};
pub use history::DeployHistory;
pub use locks::{BuildGuard, BuildLocks};
pub use queue::{spawn_worker, DeployDispatcher, DeployQueue, JobHandler};
pub use replace::{extract_zip, ReplaceOrchestrator, ReplaceReport, ReplaceStep, StepOutcome};
pub use service::ServiceDriver;
pub use stager::{stage_bytes, StagingFile};
