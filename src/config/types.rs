//! Configuration types and defaults for marklock.
//!
//! This module defines the backend selector, the coordinator section and the
//! default value functions used by the Config struct.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Which lock discipline the workers of a run use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum BackendKind {
    /// No lock at all; workers race on the resource.
    #[default]
    Unsafe,
    /// OS advisory lock file polled with jittered backoff.
    Polling,
    /// Session-leased mutex held through a coordination service.
    Leased,
}

impl BackendKind {
    /// Parse a backend name.
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "unsafe" => Some(Self::Unsafe),
            "polling" => Some(Self::Polling),
            "leased" => Some(Self::Leased),
            _ => None,
        }
    }

    /// Name as accepted on the command line.
    pub fn as_str(&self) -> &'static str {
        match self {
            BackendKind::Unsafe => "unsafe",
            BackendKind::Polling => "polling",
            BackendKind::Leased => "leased",
        }
    }
}

impl std::fmt::Display for BackendKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Connection and lease parameters for the session-leased backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CoordinatorConfig {
    /// Where the coordination service lives: `local`, `local://<name>` for
    /// an in-process coordinator, or comma-separated `http(s)://host:port`
    /// etcd endpoints.
    #[serde(default = "default_endpoint")]
    pub endpoint: String,

    /// How long connecting to a remote coordinator may take.
    #[serde(default = "default_dial_timeout_ms")]
    pub dial_timeout_ms: u64,

    /// Session lease TTL; the session dies if not renewed within it.
    #[serde(default = "default_session_ttl_ms")]
    pub session_ttl_ms: u64,

    /// Maximum time a single `lock()` may wait.
    #[serde(default = "default_lock_wait_ms")]
    pub lock_wait_ms: u64,

    /// Mutex key prefix; defaults to the shared resource name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key_prefix: Option<String>,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            endpoint: default_endpoint(),
            dial_timeout_ms: default_dial_timeout_ms(),
            session_ttl_ms: default_session_ttl_ms(),
            lock_wait_ms: default_lock_wait_ms(),
            key_prefix: None,
        }
    }
}

impl CoordinatorConfig {
    pub fn dial_timeout(&self) -> Duration {
        Duration::from_millis(self.dial_timeout_ms)
    }

    pub fn session_ttl(&self) -> Duration {
        Duration::from_millis(self.session_ttl_ms)
    }

    pub fn lock_wait(&self) -> Duration {
        Duration::from_millis(self.lock_wait_ms)
    }
}

// Default value functions for serde
pub(crate) fn default_workers() -> u32 {
    2
}
pub(crate) fn default_runs() -> u32 {
    1
}
pub(crate) fn default_max_critical_sleep_ms() -> u64 {
    100
}
pub(crate) fn default_poll_jitter_ms() -> u64 {
    10
}
pub(crate) fn default_endpoint() -> String {
    "local".to_string()
}
pub(crate) fn default_dial_timeout_ms() -> u64 {
    5_000
}
pub(crate) fn default_session_ttl_ms() -> u64 {
    10_000
}
pub(crate) fn default_lock_wait_ms() -> u64 {
    5_000
}
