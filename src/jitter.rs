//! Seeded randomness for backoff and race-window widening.
//!
//! Every random pause in a run comes from a `StdRng` derived from one master
//! seed, so a failing run can be replayed with the same seed.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::time::Duration;

/// Odd constant spreading consecutive stream ids across the seed space.
const STREAM_STRIDE: u64 = 0x9E37_79B9_7F4A_7C15;

/// Stream ids reserved for polling locks start here, clear of worker ids.
pub const LOCK_STREAM_BASE: u64 = 1 << 32;

/// Pick the master seed: the configured one, or a fresh random one.
pub fn master_seed(configured: Option<u64>) -> u64 {
    configured.unwrap_or_else(|| rand::rng().random())
}

/// Independent generator for one consumer (`stream`) of a seeded run.
pub fn derive_rng(master: u64, stream: u64) -> StdRng {
    StdRng::seed_from_u64(master ^ stream.wrapping_add(1).wrapping_mul(STREAM_STRIDE))
}

/// Uniform pause in `[0, max)` at millisecond granularity. Zero when `max` is
/// below one millisecond.
pub fn random_pause(rng: &mut impl Rng, max: Duration) -> Duration {
    let max_ms = max.as_millis().min(u128::from(u64::MAX)) as u64;
    if max_ms == 0 {
        return Duration::ZERO;
    }
    Duration::from_millis(rng.random_range(0..max_ms))
}
