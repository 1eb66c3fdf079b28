//! Domain types for deployhook.
//!
//! - Build types and the filesystem layout they imply
//! - CI workflow runs and artifacts
//! - Webhook routes
//! - Jobs and their history

pub mod artifact;
pub mod build_type;
pub mod events;
pub mod job;
pub mod route;

pub use artifact::{
    ArtifactDescriptor, RemoteArtifact, RemoteArtifactList, StagedArchive, WorkflowRun,
    WorkflowRunList,
};
pub use build_type::{validate_identifier, BuildType, DeploymentTarget, RepoRef};
pub use events::{HistoryEvent, HistoryEventType};
pub use job::{ArtifactDeployRequest, Job, JobRecord, JobRequest, JobState, ServiceDeployRequest};
pub use route::{Route, RoutingTable};
