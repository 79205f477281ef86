//! Session-leased lock on a coordination service.

use super::DistributedLock;
use super::types::LockState;
use crate::coordination::{HolderId, Session};
use crate::error::{MarklockError, Result};
use std::sync::Arc;
use std::time::Duration;

/// A mutex hosted by a shared coordination-service session.
///
/// The session is borrowed, not owned: it is opened once per run and closed
/// by whoever opened it after every lock built on it is done. Each instance
/// is its own holder, so instances sharing a session still exclude each
/// other.
#[derive(Debug)]
pub struct LeasedLock {
    session: Arc<Session>,
    key: String,
    holder: HolderId,
    max_wait: Duration,
    fencing_token: Option<u64>,
}

impl LeasedLock {
    /// Create an unheld lock on mutex `key` under `session`.
    pub fn new(session: Arc<Session>, key: impl Into<String>, max_wait: Duration) -> Self {
        Self {
            session,
            key: key.into(),
            holder: HolderId::next(),
            max_wait,
            fencing_token: None,
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn state(&self) -> LockState {
        if self.fencing_token.is_some() {
            LockState::Held
        } else {
            LockState::Unheld
        }
    }

    /// Token of the current acquisition, while held.
    #[cfg(test)]
    pub fn fencing_token(&self) -> Option<u64> {
        self.fencing_token
    }
}

impl DistributedLock for LeasedLock {
    fn lock(&mut self) -> Result<()> {
        if self.fencing_token.is_some() {
            return Err(MarklockError::InvalidState(format!(
                "mutex '{}' is already held by this instance",
                self.key
            )));
        }

        let token = self
            .session
            .acquire(&self.key, self.holder, self.max_wait)
            .map_err(|e| match e {
                MarklockError::Session(reason) => MarklockError::Acquisition(reason),
                other => other,
            })?;
        self.fencing_token = Some(token);
        Ok(())
    }

    fn unlock(&mut self) -> Result<()> {
        if self.fencing_token.take().is_none() {
            return Err(MarklockError::InvalidState(format!(
                "unlock of mutex '{}' without a prior successful lock",
                self.key
            )));
        }

        self.session
            .release(&self.key, self.holder)
            .map_err(|e| match e {
                MarklockError::Release(_) => e,
                other => MarklockError::Release(other.to_string()),
            })
    }
}
