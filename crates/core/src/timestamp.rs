//! Microsecond-precision timestamp type.
//!
//! Every noun, verb, and change-log entry carries at least one [`Timestamp`].
//! Statistics partitions additionally derive a calendar day (UTC) from it
//! (spec §4.4, §9 open question: cross-timezone behavior at day boundaries
//! is intentionally left to operators).

use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};

/// Microsecond-precision point in time, stored as microseconds since the
/// Unix epoch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Timestamp(u64);

impl Timestamp {
    /// Unix epoch (1970-01-01 00:00:00 UTC).
    pub const EPOCH: Timestamp = Timestamp(0);

    /// The current moment. Returns [`Timestamp::EPOCH`] if the system clock
    /// reports a time before the Unix epoch.
    pub fn now() -> Self {
        let micros = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_micros() as u64)
            .unwrap_or(0);
        Timestamp(micros)
    }

    /// Construct from raw microseconds since epoch.
    pub fn from_micros(micros: u64) -> Self {
        Timestamp(micros)
    }

    /// Raw microseconds since epoch.
    pub fn as_micros(self) -> u64 {
        self.0
    }

    /// The calendar day (UTC) this timestamp falls on, formatted `YYYYMMDD`,
    /// used as the statistics-partition key (spec §3, §4.4).
    pub fn day_partition(self) -> String {
        let secs = (self.0 / 1_000_000) as i64;
        let datetime = chrono::DateTime::from_timestamp(secs, 0).unwrap_or_default();
        datetime.format("%Y%m%d").to_string()
    }
}

impl std::fmt::Display for Timestamp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn day_partition_is_stable_within_a_day() {
        let a = Timestamp::from_micros(1_700_000_000_000_000);
        let b = Timestamp::from_micros(1_700_000_000_000_000 + 1_000_000);
        assert_eq!(a.day_partition(), b.day_partition());
    }

    #[test]
    fn ordering_matches_raw_micros() {
        let a = Timestamp::from_micros(10);
        let b = Timestamp::from_micros(20);
        assert!(a < b);
    }
}
