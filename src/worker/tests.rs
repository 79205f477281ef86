//! Tests for workers.

use super::*;
use crate::jitter::derive_rng;
use crate::locks::{LockState, PollingLock};
use std::io;
use std::sync::mpsc;
use std::sync::{Arc, Mutex};
use tempfile::TempDir;

/// In-memory sink that can be told to fail on a given marker.
#[derive(Default)]
struct MemorySink {
    bytes: Mutex<Vec<u8>>,
    fail_on: Option<u8>,
}

impl MemorySink {
    fn failing_on(marker: u8) -> Self {
        Self {
            bytes: Mutex::default(),
            fail_on: Some(marker),
        }
    }

    fn contents(&self) -> Vec<u8> {
        self.bytes.lock().unwrap().clone()
    }
}

impl MarkerSink for MemorySink {
    fn append(&self, byte: u8) -> io::Result<()> {
        if self.fail_on == Some(byte) {
            return Err(io::Error::new(io::ErrorKind::BrokenPipe, "sink closed"));
        }
        self.bytes.lock().unwrap().push(byte);
        Ok(())
    }
}

/// Lock double recording calls and failing on demand.
#[derive(Clone, Default)]
struct ScriptedLock {
    fail_lock: bool,
    fail_unlock: bool,
    calls: Arc<Mutex<Vec<&'static str>>>,
}

impl DistributedLock for ScriptedLock {
    fn lock(&mut self) -> Result<()> {
        self.calls.lock().unwrap().push("lock");
        if self.fail_lock {
            return Err(MarklockError::Timeout {
                key: "res".to_string(),
                waited: Duration::from_millis(5),
            });
        }
        Ok(())
    }

    fn unlock(&mut self) -> Result<()> {
        self.calls.lock().unwrap().push("unlock");
        if self.fail_unlock {
            return Err(MarklockError::Release("backend gone".to_string()));
        }
        Ok(())
    }
}

fn worker<'a>(ordinal: u32, sink: &'a dyn MarkerSink) -> Worker<'a> {
    Worker::new(ordinal, sink, Duration::from_millis(2), derive_rng(5, ordinal.into()))
}

#[test]
fn test_unguarded_worker_writes_open_then_close() {
    let sink = MemorySink::default();
    let mut w = worker(0, &sink);

    assert!(!w.is_guarded());
    w.run().unwrap();
    assert_eq!(sink.contents(), b"<>");
}

#[test]
fn test_label_uses_ordinal() {
    let sink = MemorySink::default();
    assert_eq!(worker(7, &sink).to_string(), "worker 7");
}

#[test]
fn test_guarded_worker_locks_and_unlocks_around_section() {
    let sink = MemorySink::default();
    let lock = ScriptedLock::default();
    let calls = Arc::clone(&lock.calls);

    let mut w = worker(1, &sink).with_lock(Box::new(lock));
    assert!(w.is_guarded());
    w.run().unwrap();

    assert_eq!(sink.contents(), b"<>");
    assert_eq!(*calls.lock().unwrap(), vec!["lock", "unlock"]);
}

#[test]
fn test_lock_failure_skips_critical_section() {
    let sink = MemorySink::default();
    let lock = ScriptedLock {
        fail_lock: true,
        ..ScriptedLock::default()
    };
    let calls = Arc::clone(&lock.calls);

    let err = worker(2, &sink).with_lock(Box::new(lock)).run().unwrap_err();

    assert!(err.to_string().starts_with("worker 2: trying to lock: timed out"));
    assert!(matches!(err.root_cause(), MarklockError::Timeout { .. }));
    assert!(sink.contents().is_empty());
    // Nothing was acquired, so nothing is released.
    assert_eq!(*calls.lock().unwrap(), vec!["lock"]);
}

#[test]
fn test_write_failure_names_marker_and_still_unlocks() {
    let sink = MemorySink::failing_on(b'>');
    let lock = ScriptedLock::default();
    let calls = Arc::clone(&lock.calls);

    let err = worker(3, &sink).with_lock(Box::new(lock)).run().unwrap_err();

    assert!(err.to_string().starts_with("worker 3: writing '>'"));
    assert!(matches!(err.root_cause(), MarklockError::Write(_)));
    assert_eq!(sink.contents(), b"<");
    assert_eq!(*calls.lock().unwrap(), vec!["lock", "unlock"]);
}

#[test]
fn test_open_marker_failure_aborts_before_close() {
    let sink = MemorySink::failing_on(b'<');
    let err = worker(4, &sink).run().unwrap_err();

    assert!(err.to_string().contains("writing '<'"));
    assert!(sink.contents().is_empty());
}

#[test]
fn test_unlock_failure_reported_when_section_succeeded() {
    let sink = MemorySink::default();
    let lock = ScriptedLock {
        fail_unlock: true,
        ..ScriptedLock::default()
    };

    let err = worker(5, &sink).with_lock(Box::new(lock)).run().unwrap_err();

    assert!(err.to_string().starts_with("worker 5: unlocking:"));
    assert!(matches!(err.root_cause(), MarklockError::Release(_)));
    assert_eq!(sink.contents(), b"<>");
}

#[test]
fn test_section_error_wins_over_unlock_error() {
    let sink = MemorySink::failing_on(b'<');
    let lock = ScriptedLock {
        fail_unlock: true,
        ..ScriptedLock::default()
    };
    let calls = Arc::clone(&lock.calls);

    let err = worker(6, &sink).with_lock(Box::new(lock)).run().unwrap_err();

    assert!(matches!(err.root_cause(), MarklockError::Write(_)));
    assert_eq!(*calls.lock().unwrap(), vec!["lock", "unlock"]);
}

#[test]
fn test_work_reports_exactly_once_on_success() {
    let sink = MemorySink::default();
    let (tx, rx) = mpsc::channel();

    worker(8, &sink).work(&tx);
    drop(tx);

    let outcomes: Vec<WorkerOutcome> = rx.iter().collect();
    assert_eq!(outcomes.len(), 1);
    assert_eq!(outcomes[0].ordinal, 8);
    assert!(outcomes[0].is_ok());
}

#[test]
fn test_work_reports_exactly_once_on_failure() {
    let sink = MemorySink::failing_on(b'<');
    let (tx, rx) = mpsc::channel();

    worker(9, &sink).work(&tx);
    drop(tx);

    let outcomes: Vec<WorkerOutcome> = rx.iter().collect();
    assert_eq!(outcomes.len(), 1);
    assert!(!outcomes[0].is_ok());
}

#[test]
fn test_work_without_collector_does_not_panic() {
    let sink = MemorySink::default();
    let (tx, rx) = mpsc::channel();
    drop(rx);

    worker(10, &sink).work(&tx);
    assert_eq!(sink.contents(), b"<>");
}

#[test]
fn test_real_lock_released_after_write_failure() {
    let temp_dir = TempDir::new().unwrap();
    let resource = temp_dir.path().join("res");
    let sink = MemorySink::failing_on(b'>');

    let lock = PollingLock::new(&resource, Duration::from_millis(1), derive_rng(1, 0));
    assert!(worker(0, &sink).with_lock(Box::new(lock)).run().is_err());

    let mut probe = PollingLock::new(&resource, Duration::from_millis(1), derive_rng(1, 1));
    assert!(probe.try_lock().unwrap());
    assert_eq!(probe.state(), LockState::Held);
    probe.unlock().unwrap();
}
