//! Time Abstractions
//!
//! Provides an injectable time source so tracking durations and log
//! timestamps are deterministic under test.

use chrono::{DateTime, Utc};

/// Time source trait
///
/// Abstracts system time to enable deterministic testing.
///
/// # Example
///
/// ```
/// use bridge_traits::time::{Clock, SystemClock};
///
/// fn log_timestamp(clock: &dyn Clock) {
///     let now = clock.now();
///     println!("Current time: {}", now);
/// }
///
/// log_timestamp(&SystemClock);
/// ```
#[cfg_attr(any(test, feature = "test-util"), mockall::automock)]
pub trait Clock: Send + Sync {
    /// Get current UTC time
    fn now(&self) -> DateTime<Utc>;

    /// Get current Unix timestamp in milliseconds
    fn unix_timestamp_millis(&self) -> i64 {
        self.now().timestamp_millis()
    }
}

/// System clock implementation using actual system time
#[derive(Debug, Clone, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn system_clock_advances() {
        let clock = SystemClock;
        let a = clock.now();
        let b = clock.now();
        assert!(b >= a);
    }

    #[test]
    fn mock_clock_returns_fixed_instant() {
        let mut clock = MockClock::new();
        let fixed = Utc.with_ymd_and_hms(2024, 5, 1, 22, 30, 0).unwrap();
        clock.expect_now().return_const(fixed);

        assert_eq!(clock.now(), fixed);
    }

    #[test]
    fn millis_derive_from_now() {
        struct FixedClock(DateTime<Utc>);
        impl Clock for FixedClock {
            fn now(&self) -> DateTime<Utc> {
                self.0
            }
        }

        let fixed = Utc.with_ymd_and_hms(2024, 5, 1, 22, 30, 0).unwrap();
        let clock = FixedClock(fixed);
        assert_eq!(clock.unix_timestamp_millis(), fixed.timestamp_millis());
    }
}
