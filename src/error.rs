//! Error types for marklock.
//!
//! Uses thiserror for derive macros. Each variant is one failure category of
//! the lock/worker/detector core; worker-level failures are wrapped with the
//! worker's label so the harness can report which unit failed.

use crate::exit_codes;
use std::io;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Main error type for marklock operations.
#[derive(Error, Debug)]
pub enum MarklockError {
    /// The lock backend could not even attempt acquisition.
    #[error("lock acquisition failed: {0}")]
    Acquisition(String),

    /// A bounded lock wait ran out.
    #[error("timed out after {waited:?} waiting for lock '{key}'")]
    Timeout { key: String, waited: Duration },

    /// Operation not allowed in the lock's current state.
    #[error("invalid lock state: {0}")]
    InvalidState(String),

    /// The backend failed to release a held lock.
    #[error("lock release failed: {0}")]
    Release(String),

    /// A marker byte could not be appended to the shared resource.
    #[error("write error: {0}")]
    Write(#[source] io::Error),

    /// The detector was handed zero bytes.
    #[error("empty input: cannot certify marker alternation")]
    EmptyInput,

    /// The detector could not read the finalized resource.
    #[error("failed to read '{}': {source}", path.display())]
    DetectorIo {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Coordination-service session could not be created, renewed or revoked.
    #[error("coordination session error: {0}")]
    Session(String),

    /// The shared resource could not be provisioned or finalized.
    #[error("shared resource error: {0}")]
    Resource(String),

    /// A worker thread panicked instead of reporting an outcome.
    #[error("worker thread panicked: {0}")]
    Panicked(String),

    /// A failure attributed to a specific worker.
    #[error("{label}: {context}: {source}")]
    Worker {
        label: String,
        context: String,
        #[source]
        source: Box<MarklockError>,
    },

    /// User provided invalid arguments or configuration.
    #[error("{0}")]
    UserError(String),
}

impl MarklockError {
    /// Wrap an error with the label of the worker it happened in.
    pub fn worker(label: impl Into<String>, context: impl Into<String>, source: Self) -> Self {
        MarklockError::Worker {
            label: label.into(),
            context: context.into(),
            source: Box::new(source),
        }
    }

    /// Strip worker attribution, returning the underlying cause.
    pub fn root_cause(&self) -> &MarklockError {
        match self {
            MarklockError::Worker { source, .. } => source.root_cause(),
            other => other,
        }
    }

    /// Returns the appropriate exit code for this error type.
    pub fn exit_code(&self) -> i32 {
        match self {
            MarklockError::UserError(_) => exit_codes::USER_ERROR,
            _ => exit_codes::RUN_FAILURE,
        }
    }
}

/// Result type alias for marklock operations.
pub type Result<T> = std::result::Result<T, MarklockError>;
