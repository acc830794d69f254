//! Timestamp helpers
//!
//! All timestamps carried on the wire are Unix microseconds.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Timestamp type (microseconds since the Unix epoch)
pub type Timestamp = u64;

/// Get current Unix timestamp in microseconds
pub fn now() -> Timestamp {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_micros() as Timestamp)
        .unwrap_or(0)
}

/// Convert microseconds to Duration
pub fn to_duration(micros: Timestamp) -> Duration {
    Duration::from_micros(micros)
}

/// Convert Duration to microseconds
pub fn from_duration(duration: Duration) -> Timestamp {
    duration.as_micros() as Timestamp
}

/// Timestamp `duration` from now
pub fn after(duration: Duration) -> Timestamp {
    now().saturating_add(from_duration(duration))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_now_is_monotonic_enough() {
        let a = now();
        let b = now();
        assert!(b >= a);
        assert!(a > 0);
    }

    #[test]
    fn test_duration_conversion() {
        let d = Duration::from_millis(1500);
        assert_eq!(from_duration(d), 1_500_000);
        assert_eq!(to_duration(1_500_000), d);
    }

    #[test]
    fn test_after_is_in_future() {
        let t = after(Duration::from_secs(60));
        assert!(t > now());
    }
}
