//! Shared timestamp conventions: `DateTime<Utc>` with the Unix epoch as the
//! "absent"/"uninitialized" sentinel (spec.md §3: "zero means uninitialized").

use chrono::{DateTime, Utc};

/// The sentinel used in place of `Option<DateTime<Utc>>` throughout the
/// resilience and cache documents, matching the original's zero-timestamp
/// convention so the on-disk JSON stays a flat set of RFC 3339 strings.
#[must_use]
pub fn zero() -> DateTime<Utc> {
    DateTime::<Utc>::from_timestamp(0, 0).expect("unix epoch is representable")
}

/// Whether `ts` is the "absent" sentinel.
#[must_use]
pub fn is_zero(ts: DateTime<Utc>) -> bool {
    ts == zero()
}

/// Current wall-clock time, as used by every `Allow`/`Record*`/`Save` call
/// site. Centralized so tests can reason about a single "now" source.
#[must_use]
pub fn now() -> DateTime<Utc> {
    Utc::now()
}

/// Oldest of the given timestamps, treating an empty slice as absent (zero).
#[must_use]
pub fn oldest(timestamps: &[DateTime<Utc>]) -> DateTime<Utc> {
    timestamps.iter().copied().min().unwrap_or_else(zero)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration as ChronoDuration;

    #[test]
    fn zero_is_the_unix_epoch() {
        assert!(is_zero(zero()));
        assert!(!is_zero(now()));
    }

    #[test]
    fn oldest_of_empty_is_zero() {
        assert_eq!(oldest(&[]), zero());
    }

    #[test]
    fn oldest_picks_minimum() {
        let a = zero() + ChronoDuration::seconds(10);
        let b = zero() + ChronoDuration::seconds(5);
        let c = zero() + ChronoDuration::seconds(20);
        assert_eq!(oldest(&[a, b, c]), b);
    }

    #[test]
    fn oldest_is_zero_if_any_input_is_zero() {
        let a = zero() + ChronoDuration::seconds(10);
        assert_eq!(oldest(&[a, zero()]), zero());
    }
}
