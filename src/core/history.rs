//! Append-only deployment history.
//!
//! Records are newline-delimited JSON in `.deployhook/history.jsonl` under the
//! deploy root. The server and CLI runs may write concurrently, so every
//! append takes an exclusive advisory lock on the file.

use std::collections::HashMap;
use std::io::Write;
use std::path::PathBuf;

use anyhow::{Context, Result};
use fs2::FileExt;
use tokio::fs::File;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::warn;
use uuid::Uuid;

use crate::domain::{HistoryEvent, JobRecord};

pub struct DeployHistory {
    path: PathBuf,
}

impl DeployHistory {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Append a record to the log
    pub async fn append(&self, event: &HistoryEvent) -> Result<()> {
        let json = serde_json::to_string(event).context("Failed to serialize history event")?;
        let path = self.path.clone();

        tokio::task::spawn_blocking(move || -> Result<()> {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent).with_context(|| {
                    format!("Failed to create history directory: {}", parent.display())
                })?;
            }

            let mut file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(&path)
                .with_context(|| format!("Failed to open history file: {}", path.display()))?;

            file.lock_exclusive()
                .with_context(|| format!("Failed to lock history file: {}", path.display()))?;
            let written = writeln!(file, "{}", json).and_then(|_| file.flush());
            let _ = FileExt::unlock(&file);

            written.context("Failed to write history event")
        })
        .await
        .context("History writer task failed")?
    }

    /// Replay all records in order. Unparseable lines are skipped.
    pub async fn replay(&self) -> Result<Vec<HistoryEvent>> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }

        let file = File::open(&self.path)
            .await
            .with_context(|| format!("Failed to open history file: {}", self.path.display()))?;

        let mut lines = BufReader::new(file).lines();
        let mut events = Vec::new();

        while let Some(line) = lines.next_line().await? {
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<HistoryEvent>(&line) {
                Ok(event) => events.push(event),
                Err(e) => warn!(error = %e, "Skipping malformed history line"),
            }
        }

        Ok(events)
    }

    /// All jobs reconstructed from the log, most recently queued first
    pub async fn jobs(&self) -> Result<Vec<JobRecord>> {
        let events = self.replay().await?;

        let mut order: Vec<Uuid> = Vec::new();
        let mut grouped: HashMap<Uuid, Vec<HistoryEvent>> = HashMap::new();
        for event in events {
            if !grouped.contains_key(&event.job_id) {
                order.push(event.job_id);
            }
            grouped.entry(event.job_id).or_default().push(event);
        }

        Ok(order
            .iter()
            .rev()
            .filter_map(|id| grouped.get(id))
            .filter_map(|events| JobRecord::from_events(events))
            .collect())
    }

    pub async fn recent(&self, limit: usize) -> Result<Vec<JobRecord>> {
        let mut jobs = self.jobs().await?;
        jobs.truncate(limit);
        Ok(jobs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{HistoryEventType, JobState};
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_append_and_replay() {
        let temp = TempDir::new().unwrap();
        let history = DeployHistory::new(temp.path().join(".deployhook/history.jsonl"));
        let job_id = Uuid::new_v4();

        history
            .append(&HistoryEvent::new(job_id, HistoryEventType::Queued, "artifacts a/b [citizen]"))
            .await
            .unwrap();
        history
            .append(&HistoryEvent::new(job_id, HistoryEventType::Started, "started"))
            .await
            .unwrap();

        let events = history.replay().await.unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].event_type, HistoryEventType::Queued);
        assert_eq!(events[1].job_id, job_id);
    }

    #[tokio::test]
    async fn test_missing_log_is_empty() {
        let temp = TempDir::new().unwrap();
        let history = DeployHistory::new(temp.path().join("nope.jsonl"));
        assert!(history.replay().await.unwrap().is_empty());
        assert!(history.jobs().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_jobs_newest_first_with_state() {
        let temp = TempDir::new().unwrap();
        let history = DeployHistory::new(temp.path().join("history.jsonl"));

        let first = Uuid::new_v4();
        let second = Uuid::new_v4();
        history
            .append(&HistoryEvent::new(first, HistoryEventType::Queued, "first"))
            .await
            .unwrap();
        history
            .append(&HistoryEvent::new(second, HistoryEventType::Queued, "second"))
            .await
            .unwrap();
        history
            .append(&HistoryEvent::new(first, HistoryEventType::Completed, "done").with_duration(12))
            .await
            .unwrap();

        let jobs = history.jobs().await.unwrap();
        assert_eq!(jobs.len(), 2);
        assert_eq!(jobs[0].id, second);
        assert_eq!(jobs[0].state, JobState::Queued);
        assert_eq!(jobs[1].state, JobState::Completed);
        assert_eq!(jobs[1].duration_ms, Some(12));

        assert_eq!(history.recent(1).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_malformed_lines_skipped() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("history.jsonl");
        let history = DeployHistory::new(&path);

        history
            .append(&HistoryEvent::new(Uuid::new_v4(), HistoryEventType::Queued, "ok"))
            .await
            .unwrap();
        let mut raw = std::fs::read_to_string(&path).unwrap();
        raw.push_str("{\"truncated\":\n");
        std::fs::write(&path, raw).unwrap();

        assert_eq!(history.replay().await.unwrap().len(), 1);
    }
}
