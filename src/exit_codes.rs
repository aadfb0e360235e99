//! Exit code constants for the critsec CLI.
//!
//! - 0: Success
//! - 1: User error (bad args, invalid config)
//! - 2: Teardown failure (a held section could not be released)
//! - 3: Backend failure (store outage, I/O, lock state corruption)
//! - 4: Lock not acquired
//! - 128+N: `exec` child killed by signal N

/// Successful execution.
pub const SUCCESS: i32 = 0;

/// User error: bad arguments or invalid configuration.
pub const USER_ERROR: i32 = 1;

/// A section that was still held could not be released on shutdown.
pub const TEARDOWN_FAILURE: i32 = 2;

/// Backend failure: transport errors, unusable lock directory, corrupt lock state.
pub const BACKEND_FAILURE: i32 = 3;

/// Lock acquisition failure: the section is held elsewhere or the wait timed out.
pub const LOCK_FAILURE: i32 = 4;

/// Added to the signal number when an `exec` child was killed by a signal.
pub const SIGNAL_BASE: i32 = 128;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exit_codes_are_distinct() {
        let codes = [
            SUCCESS,
            USER_ERROR,
            TEARDOWN_FAILURE,
            BACKEND_FAILURE,
            LOCK_FAILURE,
        ];
        for (i, &a) in codes.iter().enumerate() {
            for (j, &b) in codes.iter().enumerate() {
                if i != j {
                    assert_ne!(a, b, "Exit codes must be distinct");
                }
            }
        }
    }

    #[test]
    fn success_is_zero() {
        assert_eq!(SUCCESS, 0);
    }
}
