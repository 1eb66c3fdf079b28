//! deployhook - Webhook-driven deployment dispatcher
//!
//! Receives CI webhooks and manual triggers, downloads the latest build
//! artifacts and installs them with a backup-and-replace sequence, or
//! redeploys script-managed services.
//!
//! # Architecture
//!
//! HTTP handlers never run deployments themselves:
//! - Requests are validated and submitted to a bounded work queue
//! - A single worker runs jobs one at a time and records them in history
//! - Deployments of the same build type are serialised by a lock that also
//!   holds across processes
//!
//! # Modules
//!
//! - `adapters`: External systems (GitHub Actions API, child processes)
//! - `core`: Stager, replace orchestrator, drivers, queue, history
//! - `domain`: Data structures (BuildType, DeploymentTarget, Job, Route)
//! - `server`: axum router, webhook signatures
//! - `cli`: Command-line interface
//!
//! # Usage
//!
//! ```bash
//! # Serve webhooks on $HOST:$PORT
//! deployhook serve
//!
//! # Deploy the latest artifacts of a repository now
//! deployhook deploy Transerve-PwC frontend citizen employee --no-wait
//!
//! # Show recent jobs
//! deployhook history
//! ```

pub mod adapters;
pub mod cli;
pub mod config;
pub mod core;
pub mod domain;
pub mod error;
pub mod server;

// Re-export main types at crate root for convenience
pub use core::{DeployQueue, DeploymentDriver, ReplaceOrchestrator, ServiceDriver};
pub use domain::{BuildType, DeploymentTarget, JobRequest, RepoRef};
pub use error::{DeployError, ErrorKind};
