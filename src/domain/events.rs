//! Deployment history events.
//!
//! Each queued job leaves a trail of immutable records in an append-only log.
//! The state of a job is reconstructed by replaying its records in order.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A single record in the deployment history
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryEvent {
    /// Unique identifier for this record
    pub id: Uuid,

    /// When this record was written
    pub timestamp: DateTime<Utc>,

    /// The job this record belongs to
    pub job_id: Uuid,

    pub event_type: HistoryEventType,

    /// Human-readable summary (NO secrets)
    pub summary: String,

    /// Time taken in milliseconds (for finished jobs)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,

    /// Error message if failed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl HistoryEvent {
    pub fn new(job_id: Uuid, event_type: HistoryEventType, summary: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            job_id,
            event_type,
            summary: summary.into(),
            duration_ms: None,
            error: None,
        }
    }

    pub fn with_duration(mut self, duration_ms: u64) -> Self {
        self.duration_ms = Some(duration_ms);
        self
    }

    pub fn with_error(mut self, error: String) -> Self {
        self.error = Some(error);
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HistoryEventType {
    /// Accepted into the work queue
    Queued,

    /// Picked up by the worker
    Started,

    /// Finished without a fatal error
    Completed,

    /// Finished with a fatal error
    Failed,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_serialization() {
        let event = HistoryEvent::new(
            Uuid::new_v4(),
            HistoryEventType::Started,
            "Deploying Transerve-PwC/frontend [citizen]",
        );

        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("\"event_type\":\"started\""));
        assert!(!json.contains("duration_ms"));

        let parsed: HistoryEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.event_type, HistoryEventType::Started);
        assert_eq!(parsed.job_id, event.job_id);
    }

    #[test]
    fn test_event_builders() {
        let event = HistoryEvent::new(Uuid::new_v4(), HistoryEventType::Failed, "failed")
            .with_duration(1500)
            .with_error("Connection reset".to_string());

        assert_eq!(event.duration_ms, Some(1500));
        assert_eq!(event.error, Some("Connection reset".to_string()));
    }
}
