//! Config struct definition and default implementation.

use super::types::*;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Configuration for a marklock batch.
///
/// Loaded from an optional YAML file; unknown fields are ignored for forward
/// compatibility and CLI flags override whatever the file says.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    // =========================================================================
    // Run shape
    // =========================================================================
    /// Concurrent workers per run.
    #[serde(default = "default_workers")]
    pub workers: u32,

    /// Runs per batch, each against a fresh resource.
    #[serde(default = "default_runs")]
    pub runs: u32,

    /// Upper bound of the pause between the open and close markers.
    #[serde(default = "default_max_critical_sleep_ms")]
    pub max_critical_sleep_ms: u64,

    /// Upper bound of the backoff between polling lock attempts.
    #[serde(default = "default_poll_jitter_ms")]
    pub poll_jitter_ms: u64,

    /// Master seed for every random source of a run. Random when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seed: Option<u64>,

    // =========================================================================
    // Artifacts
    // =========================================================================
    /// Directory for the shared resource files (system temp dir when unset).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temp_dir: Option<PathBuf>,

    /// Keep resource and lock files after the run instead of deleting them.
    #[serde(default)]
    pub keep_files: bool,

    /// NDJSON event log; events are dropped when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event_log: Option<PathBuf>,

    // =========================================================================
    // Leased backend
    // =========================================================================
    #[serde(default)]
    pub coordinator: CoordinatorConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            workers: default_workers(),
            runs: default_runs(),
            max_critical_sleep_ms: default_max_critical_sleep_ms(),
            poll_jitter_ms: default_poll_jitter_ms(),
            seed: None,
            temp_dir: None,
            keep_files: false,
            event_log: None,
            coordinator: CoordinatorConfig::default(),
        }
    }
}

impl Config {
    pub fn max_critical_sleep(&self) -> Duration {
        Duration::from_millis(self.max_critical_sleep_ms)
    }

    pub fn poll_jitter(&self) -> Duration {
        Duration::from_millis(self.poll_jitter_ms)
    }
}
