//! Coordination-service contract for the session-leased lock backend.
//!
//! A coordination service hands out **sessions** (leases kept alive by
//! heartbeats) and hosts named **mutexes** owned by a holder under a session.
//! When a session's lease runs out, every mutex it hosts becomes free for
//! takeover, which is what keeps a crashed or stalled owner from wedging the
//! resource forever.
//!
//! # Ownership
//!
//! Ownership is per holder, not per session: many locks may share one
//! session and still exclude each other. Each successful acquisition returns
//! a fencing token that strictly increases per key.
//!
//! # Endpoints
//!
//! [`connect`] resolves the configured endpoint:
//!
//! - `local` and `local://<name>` name an in-process [`LocalCoordinator`].
//!   Connects to the same name share one coordinator (`local` is the name
//!   `default`).
//! - `http://host:port` and `https://host:port`, comma-separated for a
//!   cluster, reach an etcd server through [`EtcdCoordinator`], bounded by
//!   the configured dial timeout.

mod etcd;
mod local;
mod session;


pub use etcd::EtcdCoordinator;
pub use local::LocalCoordinator;
pub use session::Session;

use crate::config::CoordinatorConfig;
use crate::error::{MarklockError, Result};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, OnceLock};
use std::time::Duration;

/// Identifier of a granted session lease.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SessionId(pub u64);

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "session-{:x}", self.0)
    }
}

/// Identifier of one mutex owner (one lock instance).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HolderId(pub u64);

impl HolderId {
    /// Process-wide unique holder id.
    pub fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        HolderId(NEXT.fetch_add(1, Ordering::Relaxed))
    }
}

/// Operations a coordination service offers to the leased backend.
pub trait CoordinationService: Send + Sync {
    /// Grant a new session lease that expires unless renewed within `ttl`.
    fn grant_session(&self, ttl: Duration) -> Result<SessionId>;

    /// Renew a live session's lease for another TTL.
    fn keep_alive(&self, session: SessionId) -> Result<()>;

    /// End a session, releasing every mutex it hosts.
    fn revoke_session(&self, session: SessionId) -> Result<()>;

    /// Acquire mutex `key` for `holder`, waiting at most `max_wait`.
    ///
    /// Returns the fencing token of this acquisition.
    fn acquire(
        &self,
        session: SessionId,
        key: &str,
        holder: HolderId,
        max_wait: Duration,
    ) -> Result<u64>;

    /// Release mutex `key` previously acquired by `holder`.
    fn release(&self, session: SessionId, key: &str, holder: HolderId) -> Result<()>;
}

/// Resolve a coordinator endpoint to a service handle.
pub fn connect(config: &CoordinatorConfig) -> Result<Arc<dyn CoordinationService>> {
    let endpoint = config.endpoint.trim();

    if endpoint == "local" {
        return Ok(named_local("default"));
    }
    if let Some(name) = endpoint.strip_prefix("local://") {
        if name.is_empty() {
            return Err(MarklockError::Session(
                "local coordinator endpoint needs a name ('local://<name>')".to_string(),
            ));
        }
        return Ok(named_local(name));
    }

    let endpoints: Vec<String> = endpoint
        .split(',')
        .map(|e| e.trim().to_string())
        .filter(|e| !e.is_empty())
        .collect();
    let remote = !endpoints.is_empty()
        && endpoints
            .iter()
            .all(|e| e.starts_with("http://") || e.starts_with("https://"));
    if remote {
        let service = EtcdCoordinator::connect(&endpoints, config.dial_timeout())?;
        return Ok(Arc::new(service));
    }

    Err(MarklockError::Session(format!(
        "unsupported coordinator endpoint '{}' (expected 'local', 'local://<name>' or http(s)://host:port)",
        endpoint
    )))
}

/// Process-wide in-process coordinator registered under `name`.
fn named_local(name: &str) -> Arc<dyn CoordinationService> {
    static REGISTRY: OnceLock<Mutex<HashMap<String, Arc<LocalCoordinator>>>> = OnceLock::new();

    let mut registry = REGISTRY
        .get_or_init(Default::default)
        .lock()
        .unwrap_or_else(|poison| poison.into_inner());
    let coordinator = registry
        .entry(name.to_string())
        .or_insert_with(|| Arc::new(LocalCoordinator::new()));
    Arc::clone(coordinator) as Arc<dyn CoordinationService>
}
