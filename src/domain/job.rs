//! Deployment jobs and their reconstructed state.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::build_type::{BuildType, RepoRef};
use super::events::{HistoryEvent, HistoryEventType};
use super::route::Route;

/// Download and install CI artifacts for one repository
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactDeployRequest {
    pub repo: RepoRef,
    pub build_types: Vec<BuildType>,
}

/// Pull, rebuild and restart a script-managed service
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceDeployRequest {
    pub module: String,
    pub service: String,
    pub git_pull: bool,
    pub build: bool,
}

impl From<&Route> for ServiceDeployRequest {
    fn from(route: &Route) -> Self {
        Self {
            module: route.module.clone(),
            service: route.service.clone(),
            git_pull: route.git_pull,
            build: route.build,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum JobRequest {
    Artifacts(ArtifactDeployRequest),
    Service(ServiceDeployRequest),
}

impl fmt::Display for JobRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Artifacts(req) => {
                let names: Vec<&str> = req.build_types.iter().map(|b| b.as_str()).collect();
                write!(f, "artifacts {} [{}]", req.repo, names.join(", "))
            }
            Self::Service(req) => write!(f, "service {}/{}", req.module, req.service),
        }
    }
}

/// A unit of work accepted by the queue
#[derive(Debug, Clone)]
pub struct Job {
    pub id: Uuid,
    pub request: JobRequest,
    pub submitted_at: DateTime<Utc>,
}

impl Job {
    pub fn new(request: JobRequest) -> Self {
        Self {
            id: Uuid::new_v4(),
            request,
            submitted_at: Utc::now(),
        }
    }
}

/// State of a job derived from its history
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "status")]
pub enum JobState {
    Queued,
    Running,
    Completed,
    Failed { error: String },
}

impl JobState {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Queued => "queued",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed { .. } => "failed",
        }
    }
}

/// A job as reconstructed from the history log
#[derive(Debug, Clone)]
pub struct JobRecord {
    pub id: Uuid,
    pub summary: String,
    pub state: JobState,
    pub queued_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub duration_ms: Option<u64>,
}

impl JobRecord {
    /// Reconstruct a job from its events (all sharing one job id)
    pub fn from_events(events: &[HistoryEvent]) -> Option<Self> {
        let first = events.first()?;

        let mut record = Self {
            id: first.job_id,
            summary: first.summary.clone(),
            state: JobState::Queued,
            queued_at: first.timestamp,
            finished_at: None,
            duration_ms: None,
        };

        for event in events {
            record.apply_event(event);
        }

        Some(record)
    }

    pub fn apply_event(&mut self, event: &HistoryEvent) {
        match event.event_type {
            // The worker may log Started before the submitter logs Queued,
            // so Queued never moves the state backwards.
            HistoryEventType::Queued => {
                self.queued_at = event.timestamp;
                self.summary = event.summary.clone();
            }
            HistoryEventType::Started => {
                self.state = JobState::Running;
            }
            HistoryEventType::Completed => {
                self.state = JobState::Completed;
                self.finished_at = Some(event.timestamp);
                self.duration_ms = event.duration_ms;
            }
            HistoryEventType::Failed => {
                self.state = JobState::Failed {
                    error: event.error.clone().unwrap_or_default(),
                };
                self.finished_at = Some(event.timestamp);
                self.duration_ms = event.duration_ms;
            }
        }
    }

    pub fn is_finished(&self) -> bool {
        matches!(self.state, JobState::Completed | JobState::Failed { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_from_events() {
        let job_id = Uuid::new_v4();
        let events = vec![
            HistoryEvent::new(job_id, HistoryEventType::Queued, "service core/egov-mdms-service"),
            HistoryEvent::new(job_id, HistoryEventType::Started, "started"),
            HistoryEvent::new(job_id, HistoryEventType::Failed, "failed")
                .with_duration(250)
                .with_error("exit 1".to_string()),
        ];

        let record = JobRecord::from_events(&events).unwrap();
        assert_eq!(record.id, job_id);
        assert_eq!(record.summary, "service core/egov-mdms-service");
        assert_eq!(
            record.state,
            JobState::Failed {
                error: "exit 1".to_string()
            }
        );
        assert_eq!(record.duration_ms, Some(250));
        assert_eq!(record.finished_at, Some(events[2].timestamp));
        assert!(record.is_finished());
    }

    #[test]
    fn test_running_job_is_not_finished() {
        let job_id = Uuid::new_v4();
        let events = vec![
            HistoryEvent::new(job_id, HistoryEventType::Queued, "queued"),
            HistoryEvent::new(job_id, HistoryEventType::Started, "started"),
        ];
        let record = JobRecord::from_events(&events).unwrap();
        assert_eq!(record.state.label(), "running");
        assert!(record.finished_at.is_none());
        assert!(!record.is_finished());
        assert!(JobRecord::from_events(&[]).is_none());
    }

    #[test]
    fn test_request_display() {
        let request = JobRequest::Artifacts(ArtifactDeployRequest {
            repo: RepoRef::new("Transerve-PwC", "frontend").unwrap(),
            build_types: vec![
                BuildType::new("citizen").unwrap(),
                BuildType::new("employee").unwrap(),
            ],
        });
        assert_eq!(
            request.to_string(),
            "artifacts Transerve-PwC/frontend [citizen, employee]"
        );
    }
}
