//! Lock backend selection and per-run lock provisioning.

use crate::config::{BackendKind, Config};
use crate::coordination::{self, CoordinationService, Session};
use crate::error::Result;
use crate::jitter::{LOCK_STREAM_BASE, derive_rng};
use crate::locks::{DistributedLock, LeasedLock, PollingLock};
use crate::resource::SharedResource;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

/// Which lock guards the workers, with everything needed to build it.
pub enum Backend {
    /// No lock at all.
    Unsafe,
    /// Advisory file lock next to the resource, retried with jitter.
    Polling { max_backoff: Duration },
    /// Lease-backed mutex on a coordination service.
    Leased {
        service: Arc<dyn CoordinationService>,
        session_ttl: Duration,
        max_wait: Duration,
        key_prefix: Option<String>,
    },
}

impl Backend {
    /// Resolve `kind` against `config`.
    ///
    /// For the leased backend this connects to the configured coordination
    /// endpoint, so an unsupported endpoint fails here, before any run.
    pub fn from_config(kind: BackendKind, config: &Config) -> Result<Self> {
        Ok(match kind {
            BackendKind::Unsafe => Backend::Unsafe,
            BackendKind::Polling => Backend::Polling {
                max_backoff: config.poll_jitter(),
            },
            BackendKind::Leased => Backend::Leased {
                service: coordination::connect(&config.coordinator)?,
                session_ttl: config.coordinator.session_ttl(),
                max_wait: config.coordinator.lock_wait(),
                key_prefix: config.coordinator.key_prefix.clone(),
            },
        })
    }

    pub fn kind(&self) -> BackendKind {
        match self {
            Backend::Unsafe => BackendKind::Unsafe,
            Backend::Polling { .. } => BackendKind::Polling,
            Backend::Leased { .. } => BackendKind::Leased,
        }
    }

    /// Prepare the locks of one run over `resource`.
    ///
    /// Opens the run's session for the leased backend; failing to do so is
    /// fatal to the run and happens before any worker exists.
    pub(crate) fn plan(&self, resource: &SharedResource, seed: u64) -> Result<LockPlan> {
        Ok(match self {
            Backend::Unsafe => LockPlan::Unguarded,
            Backend::Polling { max_backoff } => LockPlan::Polling {
                resource_path: resource.path().to_path_buf(),
                max_backoff: *max_backoff,
                seed,
            },
            Backend::Leased {
                service,
                session_ttl,
                max_wait,
                key_prefix,
            } => LockPlan::Leased {
                session: Arc::new(Session::open(Arc::clone(service), *session_ttl)?),
                key: key_prefix.clone().unwrap_or_else(|| resource.name()),
                max_wait: *max_wait,
            },
        })
    }
}

impl std::fmt::Debug for Backend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Backend::Unsafe => f.write_str("Unsafe"),
            Backend::Polling { max_backoff } => f
                .debug_struct("Polling")
                .field("max_backoff", max_backoff)
                .finish(),
            Backend::Leased {
                session_ttl,
                max_wait,
                key_prefix,
                ..
            } => f
                .debug_struct("Leased")
                .field("session_ttl", session_ttl)
                .field("max_wait", max_wait)
                .field("key_prefix", key_prefix)
                .finish_non_exhaustive(),
        }
    }
}

/// Locks of a single run. Every worker gets its own lock instance; leased
/// locks share the run's session.
pub(crate) enum LockPlan {
    Unguarded,
    Polling {
        resource_path: PathBuf,
        max_backoff: Duration,
        seed: u64,
    },
    Leased {
        session: Arc<Session>,
        key: String,
        max_wait: Duration,
    },
}

impl LockPlan {
    pub(crate) fn lock_for(&self, ordinal: u32) -> Option<Box<dyn DistributedLock>> {
        match self {
            LockPlan::Unguarded => None,
            LockPlan::Polling {
                resource_path,
                max_backoff,
                seed,
            } => Some(Box::new(PollingLock::new(
                resource_path,
                *max_backoff,
                derive_rng(*seed, LOCK_STREAM_BASE + u64::from(ordinal)),
            ))),
            LockPlan::Leased {
                session,
                key,
                max_wait,
            } => Some(Box::new(LeasedLock::new(
                Arc::clone(session),
                key.clone(),
                *max_wait,
            ))),
        }
    }

    pub(crate) fn session(&self) -> Option<&Session> {
        match self {
            LockPlan::Leased { session, .. } => Some(session),
            _ => None,
        }
    }

    /// Release the run's session, if any. Call once every worker is done.
    pub(crate) fn close(self) -> Result<()> {
        match self {
            LockPlan::Leased { session, .. } => session.close(),
            _ => Ok(()),
        }
    }
}
