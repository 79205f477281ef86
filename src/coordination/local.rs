//! In-process coordination service.
//!
//! All state lives behind one mutex; waiters park on a condvar and are woken
//! on every release, revocation, or when the lease of the current holder's
//! session is due to run out.

use super::{CoordinationService, HolderId, SessionId};
use crate::error::{MarklockError, Result};
use std::collections::HashMap;
use std::sync::{Condvar, Mutex, MutexGuard};
use std::time::{Duration, Instant};

#[derive(Debug)]
struct SessionEntry {
    ttl: Duration,
    deadline: Instant,
}

#[derive(Debug, Clone, Copy)]
struct MutexEntry {
    session: SessionId,
    holder: HolderId,
    token: u64,
}

#[derive(Debug, Default)]
struct State {
    next_session: u64,
    sessions: HashMap<SessionId, SessionEntry>,
    mutexes: HashMap<String, MutexEntry>,
    last_tokens: HashMap<String, u64>,
}

impl State {
    fn is_live(&self, session: SessionId, now: Instant) -> bool {
        self.sessions
            .get(&session)
            .is_some_and(|entry| now <= entry.deadline)
    }

    fn require_live(&self, session: SessionId, now: Instant) -> Result<()> {
        match self.sessions.get(&session) {
            None => Err(MarklockError::Session(format!("{} does not exist", session))),
            Some(entry) if now > entry.deadline => Err(MarklockError::Session(format!(
                "{} lease expired",
                session
            ))),
            Some(_) => Ok(()),
        }
    }

    fn grant(&mut self, key: &str, session: SessionId, holder: HolderId) -> u64 {
        let last = self.last_tokens.entry(key.to_string()).or_insert(0);
        *last = last.saturating_add(1);
        let token = *last;
        self.mutexes.insert(
            key.to_string(),
            MutexEntry {
                session,
                holder,
                token,
            },
        );
        token
    }
}

/// Coordination service shared by threads of one process.
#[derive(Debug, Default)]
pub struct LocalCoordinator {
    state: Mutex<State>,
    changed: Condvar,
}

impl LocalCoordinator {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|poison| poison.into_inner())
    }

    /// Current holder's fencing token for `key`, if the mutex is held by a
    /// live session.
    #[cfg(test)]
    pub fn holder_token(&self, key: &str) -> Option<u64> {
        let state = self.state();
        let now = Instant::now();
        state
            .mutexes
            .get(key)
            .filter(|entry| state.is_live(entry.session, now))
            .map(|entry| entry.token)
    }

    /// Number of sessions not yet revoked (expired ones included).
    #[cfg(test)]
    pub fn session_count(&self) -> usize {
        self.state().sessions.len()
    }
}

impl CoordinationService for LocalCoordinator {
    fn grant_session(&self, ttl: Duration) -> Result<SessionId> {
        if ttl.is_zero() {
            return Err(MarklockError::Session(
                "session TTL must be greater than zero".to_string(),
            ));
        }

        let mut state = self.state();
        state.next_session = state.next_session.saturating_add(1);
        let id = SessionId(state.next_session);
        state.sessions.insert(
            id,
            SessionEntry {
                ttl,
                deadline: Instant::now() + ttl,
            },
        );
        Ok(id)
    }

    fn keep_alive(&self, session: SessionId) -> Result<()> {
        let mut state = self.state();
        let now = Instant::now();
        state.require_live(session, now)?;
        if let Some(entry) = state.sessions.get_mut(&session) {
            entry.deadline = now + entry.ttl;
        }
        Ok(())
    }

    fn revoke_session(&self, session: SessionId) -> Result<()> {
        let mut state = self.state();
        if state.sessions.remove(&session).is_none() {
            return Err(MarklockError::Session(format!("{} does not exist", session)));
        }
        state.mutexes.retain(|_, entry| entry.session != session);
        drop(state);
        self.changed.notify_all();
        Ok(())
    }

    fn acquire(
        &self,
        session: SessionId,
        key: &str,
        holder: HolderId,
        max_wait: Duration,
    ) -> Result<u64> {
        let started = Instant::now();
        let deadline = started + max_wait;
        let mut state = self.state();

        loop {
            let now = Instant::now();
            state.require_live(session, now)?;

            let current = state.mutexes.get(key).copied();
            match current {
                None => return Ok(state.grant(key, session, holder)),
                Some(entry) if entry.holder == holder => {
                    return Err(MarklockError::InvalidState(format!(
                        "mutex '{}' is already held by this holder",
                        key
                    )));
                }
                // The owner's lease ran out; the mutex is up for takeover.
                Some(entry) if !state.is_live(entry.session, now) => {
                    return Ok(state.grant(key, session, holder));
                }
                Some(_) => {}
            }

            if now >= deadline {
                return Err(MarklockError::Timeout {
                    key: key.to_string(),
                    waited: now.duration_since(started),
                });
            }

            // Wake no later than our deadline or the owner's lease expiry.
            let mut wait = deadline - now;
            if let Some(owner_deadline) = current
                .and_then(|entry| state.sessions.get(&entry.session))
                .map(|owner| owner.deadline)
            {
                let until_expiry =
                    owner_deadline.saturating_duration_since(now) + Duration::from_millis(1);
                wait = wait.min(until_expiry);
            }

            state = self
                .changed
                .wait_timeout(state, wait)
                .unwrap_or_else(|poison| poison.into_inner())
                .0;
        }
    }

    fn release(&self, session: SessionId, key: &str, holder: HolderId) -> Result<()> {
        let mut state = self.state();
        match state.mutexes.get(key) {
            Some(entry) if entry.holder == holder && entry.session == session => {
                state.mutexes.remove(key);
            }
            Some(_) => {
                return Err(MarklockError::Release(format!(
                    "mutex '{}' is owned by another holder (lease lost?)",
                    key
                )));
            }
            None => {
                return Err(MarklockError::Release(format!(
                    "mutex '{}' is not held",
                    key
                )));
            }
        }
        drop(state);
        self.changed.notify_all();
        Ok(())
    }
}
