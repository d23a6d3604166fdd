//! Bucketed iteration over a time-ordered cursor
//!
//! Slices a cursor's row stream into granularity-aligned bucket
//! intervals: callers iterate buckets, position the cursor at each
//! bucket, then walk rows while they stay inside it. Bucket order follows
//! the cursor's direction; row order within a bucket is the cursor's.

use crate::data::TIME_COLUMN;
use crate::scan::selector::ColumnValueSelector;
use crate::scan::Cursor;
use crate::time::{Granularity, Interval};
use crate::Result;

pub struct CursorGranularizer<'c> {
    cursor: &'c mut dyn Cursor,
    time_selector: Box<dyn ColumnValueSelector>,
    granularity: Granularity,
    clipped: Option<Interval>,
    descending: bool,
    bucket: Interval,
}

impl<'c> CursorGranularizer<'c> {
    /// `query_interval` bounds the buckets; `data_interval` clips them to
    /// where data can exist (pass `Interval::ETERNITY` when unknown).
    pub fn create(
        cursor: &'c mut dyn Cursor,
        granularity: Granularity,
        query_interval: Interval,
        data_interval: Interval,
        descending: bool,
    ) -> Self {
        let time_selector = cursor.selector_factory().make_selector(TIME_COLUMN);
        let clipped = query_interval.overlap(&data_interval);
        Self {
            cursor,
            time_selector,
            granularity,
            clipped,
            descending,
            bucket: Interval::new(0, 0),
        }
    }

    /// Bucket intervals covering the clipped interval, in cursor order.
    /// Edge buckets are full granularity width; rows outside the query
    /// interval never reach the cursor in the first place.
    pub fn bucket_iter(&self) -> BucketIterator {
        BucketIterator::new(self.granularity, self.clipped, self.descending)
    }

    /// Position the cursor at the first row of `bucket`; false when the
    /// bucket holds no rows (the cursor is then parked at the first row
    /// past it, ready for the next bucket).
    pub fn advance_to_bucket(&mut self, bucket: Interval) -> bool {
        self.bucket = bucket;
        if self.cursor.is_done() {
            return false;
        }
        loop {
            let t = self.time_selector.get_long();
            let before_bucket = if self.descending {
                t >= bucket.end
            } else {
                t < bucket.start
            };
            if !before_bucket {
                return if self.descending {
                    t >= bucket.start
                } else {
                    t < bucket.end
                };
            }
            self.cursor.advance_uninterruptibly();
            if self.cursor.is_done() {
                return false;
            }
        }
    }

    /// Advance within the current bucket, observing cancellation; false
    /// when the cursor left the bucket or is exhausted.
    pub fn advance_within_bucket(&mut self) -> Result<bool> {
        self.cursor.advance()?;
        Ok(self.still_in_bucket())
    }

    /// Advance within the current bucket without observing cancellation.
    pub fn advance_within_bucket_uninterruptibly(&mut self) -> bool {
        self.cursor.advance_uninterruptibly();
        self.still_in_bucket()
    }

    fn still_in_bucket(&self) -> bool {
        if self.cursor.is_done() {
            return false;
        }
        let t = self.time_selector.get_long();
        if self.descending {
            t >= self.bucket.start
        } else {
            t < self.bucket.end
        }
    }

    /// Start of the bucket last passed to `advance_to_bucket`.
    pub fn bucket_start(&self) -> i64 {
        self.bucket.start
    }

    pub fn cursor(&mut self) -> &mut dyn Cursor {
        &mut *self.cursor
    }
}

/// Granularity-aligned buckets over a clipped interval, in either
/// direction. Callers are expected to pass bounded intervals for
/// non-`All` granularities.
pub struct BucketIterator {
    width: Option<i64>,
    clipped: Option<Interval>,
    descending: bool,
    next_start: Option<i64>,
    exhausted: bool,
}

impl BucketIterator {
    fn new(granularity: Granularity, clipped: Option<Interval>, descending: bool) -> Self {
        let width = granularity.duration_millis();
        let next_start = clipped.map(|iv| match width {
            None => i64::MIN,
            Some(_) => {
                if descending {
                    granularity.bucket_start(iv.end - 1)
                } else {
                    granularity.bucket_start(iv.start)
                }
            }
        });
        Self {
            width,
            clipped,
            descending,
            next_start,
            exhausted: false,
        }
    }
}

impl Iterator for BucketIterator {
    type Item = Interval;

    fn next(&mut self) -> Option<Interval> {
        if self.exhausted {
            return None;
        }
        let clipped = self.clipped?;
        let start = self.next_start?;

        let Some(width) = self.width else {
            // Granularity::All: one bucket covering everything
            self.exhausted = true;
            return Some(Interval::ETERNITY);
        };

        if self.descending {
            if start + width <= clipped.start {
                self.exhausted = true;
                return None;
            }
            match start.checked_sub(width) {
                Some(prev) => self.next_start = Some(prev),
                None => self.exhausted = true,
            }
        } else {
            if start >= clipped.end {
                self.exhausted = true;
                return None;
            }
            match start.checked_add(width) {
                Some(next) => self.next_start = Some(next),
                None => self.exhausted = true,
            }
        }
        Some(Interval::new(start, start.saturating_add(width)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::time::MILLIS_PER_HOUR;

    fn hour(h: i64) -> i64 {
        h * MILLIS_PER_HOUR
    }

    fn buckets(granularity: Granularity, interval: Interval, descending: bool) -> Vec<Interval> {
        BucketIterator::new(granularity, Some(interval), descending).collect()
    }

    #[test]
    fn test_ascending_buckets() {
        let out = buckets(Granularity::Hour, Interval::new(hour(1), hour(3)), false);
        assert_eq!(
            out,
            vec![
                Interval::new(hour(1), hour(2)),
                Interval::new(hour(2), hour(3)),
            ]
        );
    }

    #[test]
    fn test_descending_buckets() {
        let out = buckets(Granularity::Hour, Interval::new(hour(1), hour(3)), true);
        assert_eq!(
            out,
            vec![
                Interval::new(hour(2), hour(3)),
                Interval::new(hour(1), hour(2)),
            ]
        );
    }

    #[test]
    fn test_unaligned_interval_gets_full_width_edge_buckets() {
        let out = buckets(
            Granularity::Hour,
            Interval::new(hour(1) + 5, hour(2) + 5),
            false,
        );
        assert_eq!(
            out,
            vec![
                Interval::new(hour(1), hour(2)),
                Interval::new(hour(2), hour(3)),
            ]
        );
    }

    #[test]
    fn test_all_granularity_single_bucket() {
        let out = buckets(Granularity::All, Interval::new(hour(1), hour(3)), false);
        assert_eq!(out, vec![Interval::ETERNITY]);
    }
}
