//! Bounded deployment work queue.
//!
//! Request handlers submit jobs and return immediately with the job id; a
//! single worker task takes jobs off the channel and runs them one at a time.
//! A failed job is logged and recorded in history, and the worker moves on.

use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::task::JoinHandle;
use tracing::{error, info, warn};
use uuid::Uuid;

use super::driver::{BuildTypeResult, DeploymentDriver};
use super::history::DeployHistory;
use super::service::ServiceDriver;
use crate::domain::{HistoryEvent, HistoryEventType, Job, JobRequest};
use crate::error::DeployError;

/// Executes one job. Returns a short completion summary.
#[async_trait]
pub trait JobHandler: Send + Sync {
    async fn handle(&self, job: &Job) -> Result<String, DeployError>;
}

/// Routes jobs to the artifact or build-service driver
pub struct DeployDispatcher {
    artifacts: DeploymentDriver,
    services: ServiceDriver,
}

impl DeployDispatcher {
    pub fn new(artifacts: DeploymentDriver, services: ServiceDriver) -> Self {
        Self {
            artifacts,
            services,
        }
    }
}

#[async_trait]
impl JobHandler for DeployDispatcher {
    async fn handle(&self, job: &Job) -> Result<String, DeployError> {
        match &job.request {
            JobRequest::Artifacts(request) => {
                let summary = self.artifacts.deploy(request).await?;
                let detail: Vec<String> = summary
                    .outcomes
                    .iter()
                    .map(|o| match &o.result {
                        BuildTypeResult::Deployed { archive, .. } => {
                            format!("{} deployed sha256={}", o.build_type, archive.sha256)
                        }
                        BuildTypeResult::Skipped => format!("{} skipped", o.build_type),
                        BuildTypeResult::Failed(_) => format!("{} failed", o.build_type),
                    })
                    .collect();
                summary.into_result()?;
                Ok(detail.join("; "))
            }
            JobRequest::Service(request) => {
                self.services.deploy(request).await?;
                Ok(format!("service {}/{} started", request.module, request.service))
            }
        }
    }
}

/// Sending side of the work queue
#[derive(Clone)]
pub struct DeployQueue {
    tx: mpsc::Sender<Job>,
    history: Option<Arc<DeployHistory>>,
}

impl DeployQueue {
    /// Create a queue holding at most `capacity` waiting jobs
    pub fn new(capacity: usize, history: Option<Arc<DeployHistory>>) -> (Self, mpsc::Receiver<Job>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self { tx, history }, rx)
    }

    /// Enqueue a job without waiting for it to run
    pub async fn submit(&self, request: JobRequest) -> Result<Uuid, DeployError> {
        let job = Job::new(request);
        let id = job.id;
        let summary = job.request.to_string();

        match self.tx.try_send(job) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => {
                warn!(%summary, "Deployment queue is full, rejecting job");
                return Err(DeployError::QueueFull);
            }
            Err(TrySendError::Closed(_)) => return Err(DeployError::QueueClosed),
        }

        info!(job_id = %id, %summary, "Job queued");
        record(
            self.history.as_deref(),
            HistoryEvent::new(id, HistoryEventType::Queued, summary),
        )
        .await;

        Ok(id)
    }
}

/// Best-effort history append
async fn record(history: Option<&DeployHistory>, event: HistoryEvent) {
    if let Some(history) = history {
        if let Err(e) = history.append(&event).await {
            warn!(error = %e, "Failed to record history event");
        }
    }
}

/// Run jobs from `rx` sequentially until every sender is dropped
pub fn spawn_worker(
    mut rx: mpsc::Receiver<Job>,
    handler: Arc<dyn JobHandler>,
    history: Option<Arc<DeployHistory>>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(job) = rx.recv().await {
            run_job(&job, handler.as_ref(), history.as_deref()).await;
        }
        info!("Deployment queue closed, worker exiting");
    })
}

async fn run_job(job: &Job, handler: &dyn JobHandler, history: Option<&DeployHistory>) {
    let summary = job.request.to_string();
    let waited_ms = (Utc::now() - job.submitted_at).num_milliseconds().max(0);
    info!(job_id = %job.id, %summary, waited_ms, "Job started");
    record(
        history,
        HistoryEvent::new(job.id, HistoryEventType::Started, summary.clone()),
    )
    .await;

    let start = Instant::now();
    let result = handler.handle(job).await;
    let duration_ms = start.elapsed().as_millis() as u64;

    let event = match result {
        Ok(outcome) => {
            info!(job_id = %job.id, duration_ms, %outcome, "Job completed");
            HistoryEvent::new(job.id, HistoryEventType::Completed, outcome)
        }
        Err(e) => {
            error!(job_id = %job.id, duration_ms, kind = ?e.kind(), error = %e, "Job failed");
            HistoryEvent::new(job.id, HistoryEventType::Failed, summary).with_error(e.to_string())
        }
    };
    record(history, event.with_duration(duration_ms)).await;
}
