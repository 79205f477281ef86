//! RAII session handle with a background heartbeat.

use super::{CoordinationService, HolderId, SessionId};
use crate::error::{MarklockError, Result};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError, Sender};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// Heartbeats per TTL window.
const HEARTBEATS_PER_TTL: u32 = 3;

struct Heartbeat {
    stop: Sender<()>,
    handle: JoinHandle<()>,
}

/// A live session lease on a coordination service.
///
/// The lease is renewed in the background at a third of its TTL. Closing the
/// session stops the heartbeat and revokes the lease; this happens exactly
/// once, either through [`Session::close`] or, as a fallback, on drop. If
/// revocation fails during drop, a warning is printed but no panic occurs.
pub struct Session {
    service: Arc<dyn CoordinationService>,
    id: SessionId,
    ttl: Duration,
    heartbeat: Mutex<Option<Heartbeat>>,
    closed: AtomicBool,
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("ttl", &self.ttl)
            .field("closed", &self.is_closed())
            .finish()
    }
}

impl Session {
    /// Grant a session on `service` and start renewing it.
    pub fn open(service: Arc<dyn CoordinationService>, ttl: Duration) -> Result<Self> {
        let id = service.grant_session(ttl)?;
        let heartbeat = spawn_heartbeat(Arc::clone(&service), id, ttl / HEARTBEATS_PER_TTL)
            .inspect_err(|_| {
                let _ = service.revoke_session(id);
            })?;

        Ok(Self {
            service,
            id,
            ttl,
            heartbeat: Mutex::new(Some(heartbeat)),
            closed: AtomicBool::new(false),
        })
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Acquire mutex `key` for `holder` under this session.
    pub fn acquire(&self, key: &str, holder: HolderId, max_wait: Duration) -> Result<u64> {
        self.ensure_open()?;
        self.service.acquire(self.id, key, holder, max_wait)
    }

    /// Release mutex `key` held by `holder` under this session.
    pub fn release(&self, key: &str, holder: HolderId) -> Result<()> {
        self.ensure_open()?;
        self.service.release(self.id, key, holder)
    }

    /// Stop the heartbeat and revoke the lease.
    ///
    /// Fails with `InvalidState` when called on an already closed session.
    pub fn close(&self) -> Result<()> {
        if self.closed.swap(true, Ordering::AcqRel) {
            return Err(MarklockError::InvalidState(format!(
                "{} is already closed",
                self.id
            )));
        }

        self.stop_heartbeat();
        self.service.revoke_session(self.id)
    }

    fn ensure_open(&self) -> Result<()> {
        if self.is_closed() {
            return Err(MarklockError::Session(format!("{} is closed", self.id)));
        }
        Ok(())
    }

    fn stop_heartbeat(&self) {
        let heartbeat = self
            .heartbeat
            .lock()
            .unwrap_or_else(|poison| poison.into_inner())
            .take();

        if let Some(Heartbeat { stop, handle }) = heartbeat {
            // The thread may already have exited after a failed renewal.
            let _ = stop.send(());
            if handle.join().is_err() {
                eprintln!("Warning: heartbeat thread for {} panicked", self.id);
            }
        }
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        if !self.is_closed()
            && let Err(e) = self.close()
        {
            eprintln!("Warning: failed to close {}: {}", self.id, e);
        }
    }
}

fn spawn_heartbeat(
    service: Arc<dyn CoordinationService>,
    id: SessionId,
    interval: Duration,
) -> Result<Heartbeat> {
    let (stop, stop_rx) = mpsc::channel::<()>();
    let interval = interval.max(Duration::from_millis(1));

    let handle = thread::Builder::new()
        .name(format!("heartbeat-{}", id))
        .spawn(move || {
            loop {
                match stop_rx.recv_timeout(interval) {
                    Err(RecvTimeoutError::Timeout) => {
                        if let Err(e) = service.keep_alive(id) {
                            eprintln!("Warning: heartbeat for {} stopped: {}", id, e);
                            return;
                        }
                    }
                    Ok(()) | Err(RecvTimeoutError::Disconnected) => return,
                }
            }
        })
        .map_err(|e| MarklockError::Session(format!("cannot start heartbeat: {}", e)))?;

    Ok(Heartbeat { stop, handle })
}
