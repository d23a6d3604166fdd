//! Millisecond intervals and time granularities
//!
//! Time is carried as UTC milliseconds since the epoch throughout the
//! engine. Intervals are half-open `[start, end)`.

use std::fmt;

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

pub const MILLIS_PER_SECOND: i64 = 1_000;
pub const MILLIS_PER_MINUTE: i64 = 60 * MILLIS_PER_SECOND;
pub const MILLIS_PER_HOUR: i64 = 60 * MILLIS_PER_MINUTE;
pub const MILLIS_PER_DAY: i64 = 24 * MILLIS_PER_HOUR;

/// Half-open time interval `[start, end)` in epoch milliseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Interval {
    pub start: i64,
    pub end: i64,
}

impl Interval {
    /// The interval covering all representable time.
    pub const ETERNITY: Interval = Interval {
        start: i64::MIN,
        end: i64::MAX,
    };

    pub fn new(start: i64, end: i64) -> Self {
        debug_assert!(start <= end, "interval start must not exceed end");
        Self { start, end }
    }

    /// Interval between two UTC instants.
    pub fn utc(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self::new(start.timestamp_millis(), end.timestamp_millis())
    }

    pub fn contains(&self, t: i64) -> bool {
        t >= self.start && t < self.end
    }

    pub fn is_empty(&self) -> bool {
        self.start >= self.end
    }

    /// Intersection with another interval, or `None` when disjoint.
    pub fn overlap(&self, other: &Interval) -> Option<Interval> {
        let start = self.start.max(other.start);
        let end = self.end.min(other.end);
        (start < end).then(|| Interval { start, end })
    }
}

impl fmt::Display for Interval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if *self == Interval::ETERNITY {
            return write!(f, "eternity");
        }
        write!(f, "{}/{}", format_instant(self.start), format_instant(self.end))
    }
}

fn format_instant(millis: i64) -> String {
    match Utc.timestamp_millis_opt(millis).single() {
        Some(dt) => dt.to_rfc3339(),
        None => millis.to_string(),
    }
}

/// Bucketing width for the granularizer. Buckets are aligned to multiples
/// of the granularity's duration from the epoch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Granularity {
    All,
    Second,
    Minute,
    Hour,
    Day,
    /// Arbitrary fixed width in milliseconds (must be positive).
    Duration(i64),
}

impl Granularity {
    pub fn duration_millis(&self) -> Option<i64> {
        match self {
            Granularity::All => None,
            Granularity::Second => Some(MILLIS_PER_SECOND),
            Granularity::Minute => Some(MILLIS_PER_MINUTE),
            Granularity::Hour => Some(MILLIS_PER_HOUR),
            Granularity::Day => Some(MILLIS_PER_DAY),
            Granularity::Duration(ms) => {
                debug_assert!(*ms > 0, "granularity duration must be positive");
                Some(*ms)
            }
        }
    }

    /// Truncate a timestamp to the start of its bucket. Floor division
    /// keeps pre-epoch timestamps in the correct bucket.
    pub fn bucket_start(&self, t: i64) -> i64 {
        match self.duration_millis() {
            None => i64::MIN,
            Some(width) => t.div_euclid(width) * width,
        }
    }

    /// The bucket interval containing `t`.
    pub fn bucket(&self, t: i64) -> Interval {
        match self.duration_millis() {
            None => Interval::ETERNITY,
            Some(width) => {
                let start = self.bucket_start(t);
                Interval::new(start, start.saturating_add(width))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_interval_contains() {
        let iv = Interval::new(10, 20);
        assert!(iv.contains(10));
        assert!(iv.contains(19));
        assert!(!iv.contains(20));
        assert!(!iv.contains(9));
    }

    #[test]
    fn test_interval_overlap() {
        let a = Interval::new(0, 10);
        let b = Interval::new(5, 15);
        assert_eq!(a.overlap(&b), Some(Interval::new(5, 10)));
        assert_eq!(a.overlap(&Interval::new(10, 20)), None);
        assert_eq!(a.overlap(&Interval::ETERNITY), Some(a));
    }

    #[test]
    fn test_bucket_start() {
        let g = Granularity::Hour;
        assert_eq!(g.bucket_start(0), 0);
        assert_eq!(g.bucket_start(MILLIS_PER_HOUR - 1), 0);
        assert_eq!(g.bucket_start(MILLIS_PER_HOUR), MILLIS_PER_HOUR);
        assert_eq!(g.bucket_start(MILLIS_PER_HOUR + 1), MILLIS_PER_HOUR);
        // pre-epoch timestamps floor toward the earlier bucket
        assert_eq!(g.bucket_start(-1), -MILLIS_PER_HOUR);
    }

    #[test]
    fn test_bucket_interval() {
        let b = Granularity::Hour.bucket(MILLIS_PER_HOUR + 5);
        assert_eq!(b, Interval::new(MILLIS_PER_HOUR, 2 * MILLIS_PER_HOUR));

        assert_eq!(Granularity::All.bucket(123), Interval::ETERNITY);
    }

    #[test]
    fn test_eternity_display() {
        assert_eq!(Interval::ETERNITY.to_string(), "eternity");
    }
}
