//! Locking subsystem for marklock.
//!
//! Every backend implements [`DistributedLock`], a mutual-exclusion handle
//! bound to one resource identity:
//! - [`PollingLock`]: OS advisory lock on `<resource>.lock`, polled with
//!   jittered backoff, no timeout
//! - [`LeasedLock`]: mutex hosted by a coordination-service session, with a
//!   bounded wait
//!
//! # Ownership
//!
//! A lock value is never shared. Each worker builds its own instance over the
//! common identity, and instances exclude each other whether they live in the
//! same process or not.
//!
//! # State
//!
//! Instances move `Unheld -> Held -> Unheld`. Unlocking an unheld instance is
//! an `InvalidState` error and leaves the identity untouched for everyone else.

mod leased;
mod polling;
mod types;


// Re-export public API
pub use leased::LeasedLock;
pub use polling::PollingLock;
pub use types::LockState;

use crate::error::Result;

/// Mutual exclusion over one resource identity.
pub trait DistributedLock: Send {
    /// Block until this instance holds the lock, or fail.
    fn lock(&mut self) -> Result<()>;

    /// Release a lock this instance holds.
    fn unlock(&mut self) -> Result<()>;
}
