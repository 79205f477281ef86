//! Exit code constants for the marklock CLI.
//!
//! - 0: Every run finished cleanly (no worker errors, no garbling)
//! - 1: At least one run garbled or failed to complete
//! - 2: User error (bad args, invalid config)

/// Successful execution.
pub const SUCCESS: i32 = 0;

/// A run garbled the shared resource or a worker reported an error.
pub const RUN_FAILURE: i32 = 1;

/// User error: bad arguments or invalid configuration.
pub const USER_ERROR: i32 = 2;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exit_codes_are_distinct() {
        let codes = [SUCCESS, RUN_FAILURE, USER_ERROR];
        for (i, &a) in codes.iter().enumerate() {
            for (j, &b) in codes.iter().enumerate() {
                if i != j {
                    assert_ne!(a, b, "Exit codes must be distinct");
                }
            }
        }
    }

    #[test]
    fn exit_codes_values() {
        assert_eq!(SUCCESS, 0);
        assert_eq!(RUN_FAILURE, 1);
        assert_eq!(USER_ERROR, 2);
    }
}
