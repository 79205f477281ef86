//! Advisory file lock acquired by polling.
//!
//! Acquisition loops over a non-blocking exclusive `flock`-style try on
//! `<resource>.lock`, sleeping a random pause between attempts so contending
//! workers don't retry in lockstep. There is no timeout: a polling lock
//! waits as long as it takes.
//!
//! Advisory locks belong to the open file description, so each instance
//! opens its own handle and instances in one process exclude each other just
//! like separate processes do.

use super::DistributedLock;
use super::types::LockState;
use crate::error::{MarklockError, Result};
use crate::jitter::random_pause;
use crate::resource::lock_path_for;
use fs2::FileExt;
use rand::rngs::StdRng;
use std::fs::{File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};
use std::thread;
use std::time::Duration;

/// Polling advisory lock bound to a resource path.
#[derive(Debug)]
pub struct PollingLock {
    lock_path: PathBuf,
    handle: Option<File>,
    state: LockState,
    max_backoff: Duration,
    rng: StdRng,
    attempts: u64,
}

impl PollingLock {
    /// Create an unheld lock for the resource at `resource_path`.
    pub fn new(resource_path: &Path, max_backoff: Duration, rng: StdRng) -> Self {
        Self {
            lock_path: lock_path_for(resource_path),
            handle: None,
            state: LockState::Unheld,
            max_backoff,
            rng,
            attempts: 0,
        }
    }

    pub fn lock_path(&self) -> &Path {
        &self.lock_path
    }

    pub fn state(&self) -> LockState {
        self.state
    }

    /// Try-acquire attempts made over this instance's lifetime.
    #[cfg(test)]
    pub fn attempts(&self) -> u64 {
        self.attempts
    }

    /// One non-blocking acquisition attempt.
    ///
    /// Returns `Ok(false)` when another instance holds the lock.
    pub fn try_lock(&mut self) -> Result<bool> {
        if self.state.is_held() {
            return Err(MarklockError::InvalidState(format!(
                "'{}' is already held by this instance",
                self.lock_path.display()
            )));
        }

        self.attempts += 1;
        let file = self.open_handle()?;
        match FileExt::try_lock_exclusive(file) {
            Ok(()) => {
                self.state = LockState::Held;
                Ok(true)
            }
            Err(e) if is_contended(&e) => Ok(false),
            Err(e) => Err(MarklockError::Acquisition(format!(
                "trying to lock '{}': {}",
                self.lock_path.display(),
                e
            ))),
        }
    }

    fn open_handle(&mut self) -> Result<&File> {
        if self.handle.is_none() {
            let file = OpenOptions::new()
                .read(true)
                .write(true)
                .create(true)
                .truncate(false)
                .open(&self.lock_path)
                .map_err(|e| {
                    MarklockError::Acquisition(format!(
                        "cannot open lock file '{}': {}",
                        self.lock_path.display(),
                        e
                    ))
                })?;
            self.handle = Some(file);
        }

        self.handle.as_ref().ok_or_else(|| {
            MarklockError::Acquisition(format!(
                "lock file '{}' is not open",
                self.lock_path.display()
            ))
        })
    }
}

impl DistributedLock for PollingLock {
    fn lock(&mut self) -> Result<()> {
        while !self.try_lock()? {
            let pause = random_pause(&mut self.rng, self.max_backoff);
            if pause.is_zero() {
                thread::yield_now();
            } else {
                thread::sleep(pause);
            }
        }
        Ok(())
    }

    fn unlock(&mut self) -> Result<()> {
        let file = match (&self.handle, self.state) {
            (Some(file), LockState::Held) => file,
            _ => {
                return Err(MarklockError::InvalidState(format!(
                    "unlock of '{}' without a prior successful lock",
                    self.lock_path.display()
                )));
            }
        };

        FileExt::unlock(file).map_err(|e| {
            MarklockError::Release(format!(
                "unlocking '{}': {}",
                self.lock_path.display(),
                e
            ))
        })?;
        self.state = LockState::Unheld;
        Ok(())
    }
}

fn is_contended(err: &io::Error) -> bool {
    err.kind() == io::ErrorKind::WouldBlock
        || err.raw_os_error() == fs2::lock_contended_error().raw_os_error()
}
