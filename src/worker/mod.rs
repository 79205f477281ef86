//! Workers: the unit of concurrent execution.
//!
//! A worker performs one critical section on the shared resource: append the
//! open marker, pause for a random while to widen the race window, append the
//! close marker. The two-phase write is not atomic; it only stays intact when
//! a lock serializes it.
//!
//! # Reporting
//!
//! [`Worker::work`] sends exactly one [`WorkerOutcome`] over its channel on
//! every path, success or failure, so a coordinator can count on receiving
//! one outcome per worker it launched.

#[cfg(test)]
mod tests;

use crate::detector::{CLOSE_MARKER, OPEN_MARKER};
use crate::error::{MarklockError, Result};
use crate::jitter::random_pause;
use crate::locks::DistributedLock;
use crate::resource::MarkerSink;
use rand::rngs::StdRng;
use std::sync::mpsc::Sender;
use std::thread;
use std::time::Duration;

/// What a worker reports once it is done.
#[derive(Debug)]
pub struct WorkerOutcome {
    /// Ordinal of the reporting worker.
    pub ordinal: u32,
    /// `Ok` if the critical section completed and any lock was released.
    pub result: Result<()>,
}

impl WorkerOutcome {
    pub fn is_ok(&self) -> bool {
        self.result.is_ok()
    }
}

/// One writer over the shared resource, optionally guarded by its own lock.
pub struct Worker<'a> {
    ordinal: u32,
    sink: &'a dyn MarkerSink,
    lock: Option<Box<dyn DistributedLock + 'a>>,
    max_sleep: Duration,
    rng: StdRng,
}

impl<'a> Worker<'a> {
    /// An unguarded worker.
    pub fn new(ordinal: u32, sink: &'a dyn MarkerSink, max_sleep: Duration, rng: StdRng) -> Self {
        Self {
            ordinal,
            sink,
            lock: None,
            max_sleep,
            rng,
        }
    }

    /// Guard the critical section with `lock`, which this worker then owns.
    pub fn with_lock(mut self, lock: Box<dyn DistributedLock + 'a>) -> Self {
        self.lock = Some(lock);
        self
    }

    pub fn ordinal(&self) -> u32 {
        self.ordinal
    }

    pub fn is_guarded(&self) -> bool {
        self.lock.is_some()
    }

    /// Run to completion and report the outcome over `done`, exactly once.
    pub fn work(mut self, done: &Sender<WorkerOutcome>) {
        let outcome = WorkerOutcome {
            ordinal: self.ordinal,
            result: self.run(),
        };

        if done.send(outcome).is_err() {
            eprintln!("Warning: {} finished but nobody is collecting outcomes", self);
        }
    }

    /// Lock (if guarded), run the critical section, and always unlock what
    /// was locked. The first failure wins.
    pub fn run(&mut self) -> Result<()> {
        let Some(mut lock) = self.lock.take() else {
            return self.critical_section();
        };

        let result = match lock.lock() {
            Ok(()) => {
                let section = self.critical_section();
                let released = lock
                    .unlock()
                    .map_err(|e| MarklockError::worker(self.to_string(), "unlocking", e));
                section.and(released)
            }
            Err(e) => Err(MarklockError::worker(self.to_string(), "trying to lock", e)),
        };

        self.lock = Some(lock);
        result
    }

    fn critical_section(&mut self) -> Result<()> {
        self.write_marker(OPEN_MARKER)?;

        let pause = random_pause(&mut self.rng, self.max_sleep);
        if !pause.is_zero() {
            thread::sleep(pause);
        }

        self.write_marker(CLOSE_MARKER)
    }

    fn write_marker(&self, marker: u8) -> Result<()> {
        self.sink.append(marker).map_err(|e| {
            MarklockError::worker(
                self.to_string(),
                format!("writing '{}'", marker as char),
                MarklockError::Write(e),
            )
        })
    }
}

impl std::fmt::Display for Worker<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "worker {}", self.ordinal)
    }
}

impl std::fmt::Debug for Worker<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Worker")
            .field("ordinal", &self.ordinal)
            .field("guarded", &self.is_guarded())
            .field("max_sleep", &self.max_sleep)
            .finish()
    }
}
