//! Event logging subsystem for marklock.
//!
//! Runs are recorded as append-only events in NDJSON format (one JSON object
//! per line) in the file named by `event_log` in the config. With no file
//! configured the log is disabled and events are dropped.
//!
//! # Event Format
//!
//! Each event is a JSON object with the following fields:
//! - `ts`: RFC3339 timestamp
//! - `action`: What happened (run_started, worker_failed, ...)
//! - `actor`: The owner string (e.g., `user@HOST`)
//! - `run`: Optional run ordinal within the batch
//! - `worker`: Optional worker ordinal within the run
//! - `details`: Freeform object with action-specific details
//!
//! Only the harness thread writes events; workers report through their
//! outcome channel instead.

use crate::error::{MarklockError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

/// Actions that can be logged as events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventAction {
    /// A run was set up and its workers are about to start
    RunStarted,
    /// A coordination-service session was granted
    SessionOpened,
    /// A worker reported success
    WorkerFinished,
    /// A worker reported an error
    WorkerFailed,
    /// A coordination-service session was revoked
    SessionClosed,
    /// A run was finalized and checked
    RunFinished,
}

impl std::fmt::Display for EventAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EventAction::RunStarted => write!(f, "run_started"),
            EventAction::SessionOpened => write!(f, "session_opened"),
            EventAction::WorkerFinished => write!(f, "worker_finished"),
            EventAction::WorkerFailed => write!(f, "worker_failed"),
            EventAction::SessionClosed => write!(f, "session_closed"),
            EventAction::RunFinished => write!(f, "run_finished"),
        }
    }
}

/// An event record for the run log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    /// RFC3339 timestamp when the event occurred.
    pub ts: DateTime<Utc>,

    /// The action that was performed.
    pub action: EventAction,

    /// The actor who performed the action (e.g., `user@HOST`).
    pub actor: String,

    /// Run ordinal within the batch.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub run: Option<u32>,

    /// Worker ordinal within the run.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub worker: Option<u32>,

    /// Freeform details object with action-specific information.
    pub details: Value,
}

impl Event {
    /// Create a new event with the given action, stamped now.
    pub fn new(action: EventAction) -> Self {
        Self {
            ts: Utc::now(),
            action,
            actor: get_actor_string(),
            run: None,
            worker: None,
            details: Value::Object(serde_json::Map::new()),
        }
    }

    pub fn with_run(mut self, run: u32) -> Self {
        self.run = Some(run);
        self
    }

    pub fn with_worker(mut self, worker: u32) -> Self {
        self.worker = Some(worker);
        self
    }

    pub fn with_details(mut self, details: Value) -> Self {
        self.details = details;
        self
    }

    /// Serialize the event to a single-line JSON string.
    pub fn to_ndjson_line(&self) -> Result<String> {
        serde_json::to_string(self).map_err(|e| {
            MarklockError::UserError(format!("failed to serialize event to JSON: {}", e))
        })
    }
}

/// Get the actor string for event metadata.
fn get_actor_string() -> String {
    let user = std::env::var("USER")
        .or_else(|_| std::env::var("USERNAME"))
        .unwrap_or_else(|_| "unknown".to_string());

    let host = hostname::get()
        .map(|h| h.to_string_lossy().to_string())
        .unwrap_or_else(|_| "unknown".to_string());

    format!("{}@{}", user, host)
}

/// Destination for run events.
#[derive(Debug, Clone, Default)]
pub struct EventLog {
    path: Option<PathBuf>,
}

impl EventLog {
    /// A log appending to `path`.
    pub fn to_file(path: impl Into<PathBuf>) -> Self {
        Self {
            path: Some(path.into()),
        }
    }

    /// A log that drops every event.
    pub fn disabled() -> Self {
        Self { path: None }
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Append an event, reporting failures to the caller.
    ///
    /// The file and its parent directory are created if missing. Each append
    /// results in exactly one line with a trailing newline.
    pub fn append(&self, event: &Event) -> Result<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };

        let json_line = event.to_ndjson_line()?;

        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
            && !parent.exists()
        {
            fs::create_dir_all(parent).map_err(|e| {
                MarklockError::UserError(format!(
                    "failed to create event log directory '{}': {}",
                    parent.display(),
                    e
                ))
            })?;
        }

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .map_err(|e| {
                MarklockError::UserError(format!(
                    "failed to open event log '{}': {}",
                    path.display(),
                    e
                ))
            })?;

        writeln!(file, "{}", json_line).map_err(|e| {
            MarklockError::UserError(format!(
                "failed to write event to '{}': {}",
                path.display(),
                e
            ))
        })
    }

    /// Append an event, downgrading failures to a warning on stderr.
    ///
    /// Logging never fails a run.
    pub fn record(&self, event: Event) {
        if let Err(e) = self.append(&event) {
            eprintln!("Warning: dropping {} event: {}", event.action, e);
        }
    }
}

/// Read all events from an NDJSON log file.
#[cfg(test)]
pub fn read_events(path: &Path) -> Result<Vec<Event>> {
    let content = fs::read_to_string(path).map_err(|e| {
        MarklockError::UserError(format!(
            "failed to read event log '{}': {}",
            path.display(),
            e
        ))
    })?;

    content
        .lines()
        .filter(|line| !line.trim().is_empty())
        .map(|line| {
            serde_json::from_str(line).map_err(|e| {
                MarklockError::UserError(format!("failed to parse event line: {}", e))
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    #[test]
    fn test_event_creation() {
        let event = Event::new(EventAction::RunStarted);

        assert_eq!(event.action, EventAction::RunStarted);
        assert!(event.actor.contains('@'));
        assert!(event.run.is_none());
        assert!(event.worker.is_none());
        assert!(event.details.is_object());
    }

    #[test]
    fn test_event_builders() {
        let event = Event::new(EventAction::WorkerFailed)
            .with_run(2)
            .with_worker(5)
            .with_details(json!({"error": "boom"}));

        assert_eq!(event.run, Some(2));
        assert_eq!(event.worker, Some(5));
        assert_eq!(event.details["error"], "boom");
    }

    #[test]
    fn test_ndjson_line_is_single_line() {
        let event = Event::new(EventAction::RunFinished)
            .with_details(json!({"status": "clean", "nested": {"a": [1, 2]}}));
        let line = event.to_ndjson_line().unwrap();

        assert!(!line.contains('\n'));
        assert!(line.contains("\"action\":\"run_finished\""));
        // Optional fields are skipped when absent
        assert!(!line.contains("\"worker\""));
    }

    #[test]
    fn test_action_display_matches_serde() {
        for action in [
            EventAction::RunStarted,
            EventAction::SessionOpened,
            EventAction::WorkerFinished,
            EventAction::WorkerFailed,
            EventAction::SessionClosed,
            EventAction::RunFinished,
        ] {
            let serialized = serde_json::to_string(&action).unwrap();
            assert_eq!(serialized, format!("\"{}\"", action));
        }
    }

    #[test]
    fn test_append_and_read_back() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("logs").join("events.ndjson");
        let log = EventLog::to_file(&path);

        log.append(&Event::new(EventAction::RunStarted).with_run(0))
            .unwrap();
        log.append(&Event::new(EventAction::RunFinished).with_run(0))
            .unwrap();

        let content = fs::read_to_string(&path).unwrap();
        assert_eq!(content.lines().count(), 2);
        assert!(content.ends_with('\n'));

        let events = read_events(&path).unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].action, EventAction::RunStarted);
        assert_eq!(events[1].action, EventAction::RunFinished);
    }

    #[test]
    fn test_disabled_log_writes_nothing() {
        let log = EventLog::disabled();
        assert!(log.path().is_none());
        log.append(&Event::new(EventAction::RunStarted)).unwrap();
    }

    #[test]
    fn test_record_swallows_errors() {
        let temp_dir = TempDir::new().unwrap();
        // A directory cannot be opened for append.
        let log = EventLog::to_file(temp_dir.path());

        assert!(log.append(&Event::new(EventAction::RunStarted)).is_err());
        log.record(Event::new(EventAction::RunStarted));
    }
}
