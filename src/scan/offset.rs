//! Monotone row offsets
//!
//! An offset is a mutable position over `[0, N)` with a direction and
//! skip semantics. The deep wrapper hierarchy of row scanners collapses
//! here into one tagged enum: time checking and filtering wrap other
//! variants by composition.
//!
//! Every base variant publishes its current row through a shared
//! `RowPointer`; selectors bind to that pointer once and never touch the
//! offset again, which is what keeps a long filter seek from corrupting
//! the values visible through selectors.

use std::cell::Cell;
use std::rc::Rc;

use roaring::RoaringBitmap;

use super::filter::ValueMatcher;
use super::CancellationToken;
use crate::segment::NumericColumn;

/// How many candidate rows a filtered seek examines between cancellation
/// checks.
const CANCEL_CHECK_EVERY: u32 = 1024;

/// Shared, cheaply clonable view of an offset's current row.
#[derive(Debug, Clone, Default)]
pub struct RowPointer(Rc<Cell<u32>>);

impl RowPointer {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn get(&self) -> u32 {
        self.0.get()
    }

    #[inline]
    fn set(&self, row: u32) {
        self.0.set(row);
    }
}

/// Mutable cursor position over `[0, N)`.
pub enum Offset {
    Ascending(AscendingOffset),
    Descending(DescendingOffset),
    Bitmap(BitmapOffset),
    TimeCheck(Box<TimeCheckOffset>),
    Filtered(Box<FilteredOffset>),
}

impl Offset {
    pub fn ascending(num_rows: u32) -> Self {
        Offset::Ascending(AscendingOffset::new(num_rows))
    }

    pub fn descending(num_rows: u32) -> Self {
        Offset::Descending(DescendingOffset::new(num_rows))
    }

    pub fn bitmap(bitmap: &RoaringBitmap, descending: bool, num_rows: u32) -> Self {
        Offset::Bitmap(BitmapOffset::new(bitmap, descending, num_rows))
    }

    pub fn time_check(
        inner: Offset,
        timestamps: Rc<NumericColumn<i64>>,
        limit: i64,
        descending: bool,
        all_within: bool,
    ) -> Self {
        Offset::TimeCheck(Box::new(TimeCheckOffset {
            inner,
            timestamps,
            limit,
            descending,
            all_within,
        }))
    }

    pub fn filtered(inner: Offset, matcher: ValueMatcher, token: CancellationToken) -> Self {
        let mut wrapped = FilteredOffset {
            inner,
            matcher,
            token,
            interrupted: false,
        };
        wrapped.seek(true);
        Offset::Filtered(Box::new(wrapped))
    }

    /// Current row; defined only while `within_bounds`.
    #[inline]
    pub fn current(&self) -> u32 {
        debug_assert!(self.within_bounds(), "current() on an exhausted offset");
        match self {
            Offset::Ascending(o) => o.row,
            Offset::Descending(o) => o.row as u32,
            Offset::Bitmap(o) => o.rows[o.idx],
            Offset::TimeCheck(o) => o.inner.current(),
            Offset::Filtered(o) => o.inner.current(),
        }
    }

    pub fn within_bounds(&self) -> bool {
        match self {
            Offset::Ascending(o) => o.row < o.num_rows,
            Offset::Descending(o) => o.row >= 0,
            Offset::Bitmap(o) => o.idx < o.rows.len(),
            Offset::TimeCheck(o) => o.within_bounds(),
            Offset::Filtered(o) => !o.interrupted && o.inner.within_bounds(),
        }
    }

    pub fn advance(&mut self) {
        self.advance_inner(true);
    }

    /// Advance without ever observing cancellation.
    pub fn advance_uninterruptibly(&mut self) {
        self.advance_inner(false);
    }

    fn advance_inner(&mut self, interruptible: bool) {
        match self {
            Offset::Ascending(o) => {
                o.row = o.row.saturating_add(1);
                if o.row < o.num_rows {
                    o.pos.set(o.row);
                }
            }
            Offset::Descending(o) => {
                o.row -= 1;
                if o.row >= 0 {
                    o.pos.set(o.row as u32);
                }
            }
            Offset::Bitmap(o) => {
                o.idx += 1;
                if o.idx < o.rows.len() {
                    o.pos.set(o.rows[o.idx]);
                }
            }
            Offset::TimeCheck(o) => o.inner.advance_inner(interruptible),
            Offset::Filtered(o) => {
                o.inner.advance_inner(interruptible);
                o.seek(interruptible);
            }
        }
    }

    /// Restore the initial state (the position frozen at construction,
    /// or by the last `freeze_initial`).
    pub fn reset(&mut self) {
        match self {
            Offset::Ascending(o) => {
                o.row = o.initial;
                if o.row < o.num_rows {
                    o.pos.set(o.row);
                }
            }
            Offset::Descending(o) => {
                o.row = o.initial;
                if o.row >= 0 {
                    o.pos.set(o.row as u32);
                }
            }
            Offset::Bitmap(o) => {
                o.idx = o.initial;
                if o.idx < o.rows.len() {
                    o.pos.set(o.rows[o.idx]);
                }
            }
            Offset::TimeCheck(o) => o.inner.reset(),
            Offset::Filtered(o) => {
                o.interrupted = false;
                o.inner.reset();
                o.seek(false);
            }
        }
    }

    /// Make the current position the one `reset` returns to. The holder
    /// uses this after skipping rows in front of the query interval, so
    /// a reset does not resurrect the skipped rows.
    pub fn freeze_initial(&mut self) {
        match self {
            Offset::Ascending(o) => o.initial = o.row,
            Offset::Descending(o) => o.initial = o.row,
            Offset::Bitmap(o) => o.initial = o.idx,
            Offset::TimeCheck(o) => o.inner.freeze_initial(),
            Offset::Filtered(o) => o.inner.freeze_initial(),
        }
    }

    /// Independent copy with its own position pointer. Filtered offsets
    /// cannot be cloned (the matcher is bound to this offset's position);
    /// asking for one is an internal error.
    pub fn try_clone(&self) -> Offset {
        match self {
            Offset::Ascending(o) => {
                let copy = AscendingOffset {
                    num_rows: o.num_rows,
                    row: o.row,
                    initial: o.initial,
                    pos: RowPointer::new(),
                };
                copy.pos.set(o.pos.get());
                Offset::Ascending(copy)
            }
            Offset::Descending(o) => {
                let copy = DescendingOffset {
                    num_rows: o.num_rows,
                    row: o.row,
                    initial: o.initial,
                    pos: RowPointer::new(),
                };
                copy.pos.set(o.pos.get());
                Offset::Descending(copy)
            }
            Offset::Bitmap(o) => {
                let copy = BitmapOffset {
                    rows: Rc::clone(&o.rows),
                    idx: o.idx,
                    initial: o.initial,
                    pos: RowPointer::new(),
                };
                copy.pos.set(o.pos.get());
                Offset::Bitmap(copy)
            }
            Offset::TimeCheck(o) => Offset::TimeCheck(Box::new(TimeCheckOffset {
                inner: o.inner.try_clone(),
                timestamps: Rc::clone(&o.timestamps),
                limit: o.limit,
                descending: o.descending,
                all_within: o.all_within,
            })),
            Offset::Filtered(_) => panic!("a filtered offset cannot be cloned"),
        }
    }

    /// The position selectors bind to. Wrappers delegate to the base
    /// variant that actually moves.
    pub fn position(&self) -> RowPointer {
        match self {
            Offset::Ascending(o) => o.pos.clone(),
            Offset::Descending(o) => o.pos.clone(),
            Offset::Bitmap(o) => o.pos.clone(),
            Offset::TimeCheck(o) => o.inner.position(),
            Offset::Filtered(o) => o.inner.position(),
        }
    }
}

pub struct AscendingOffset {
    num_rows: u32,
    row: u32,
    initial: u32,
    pos: RowPointer,
}

impl AscendingOffset {
    fn new(num_rows: u32) -> Self {
        let pos = RowPointer::new();
        pos.set(0);
        Self {
            num_rows,
            row: 0,
            initial: 0,
            pos,
        }
    }
}

pub struct DescendingOffset {
    num_rows: u32,
    row: i64,
    initial: i64,
    pos: RowPointer,
}

impl DescendingOffset {
    fn new(num_rows: u32) -> Self {
        let row = num_rows as i64 - 1;
        let pos = RowPointer::new();
        if row >= 0 {
            pos.set(row as u32);
        }
        Self {
            num_rows,
            row,
            initial: row,
            pos,
        }
    }
}

pub struct BitmapOffset {
    rows: Rc<Vec<u32>>,
    idx: usize,
    initial: usize,
    pos: RowPointer,
}

impl BitmapOffset {
    fn new(bitmap: &RoaringBitmap, descending: bool, num_rows: u32) -> Self {
        let mut rows: Vec<u32> = bitmap.iter().filter(|&r| r < num_rows).collect();
        if descending {
            rows.reverse();
        }
        let pos = RowPointer::new();
        if let Some(&first) = rows.first() {
            pos.set(first);
        }
        Self {
            rows: Rc::new(rows),
            idx: 0,
            initial: 0,
            pos,
        }
    }
}

/// Augments `within_bounds` with a time bound: ascending iteration stops
/// at the first row with `ts >= limit`, descending at the first row with
/// `ts < limit`. When the whole segment is known to lie inside the query
/// interval the per-row lookup is skipped.
pub struct TimeCheckOffset {
    inner: Offset,
    timestamps: Rc<NumericColumn<i64>>,
    limit: i64,
    descending: bool,
    all_within: bool,
}

impl TimeCheckOffset {
    fn within_bounds(&self) -> bool {
        if !self.inner.within_bounds() {
            return false;
        }
        if self.all_within {
            return true;
        }
        let ts = self.timestamps.value_at(self.inner.current() as usize);
        if self.descending {
            ts >= self.limit
        } else {
            ts < self.limit
        }
    }
}

/// Skips rows the value matcher rejects. Seeking is potentially long, so
/// the cancellation token is polled along the way; a cancelled seek
/// leaves the offset exhausted, never mid-seek.
pub struct FilteredOffset {
    inner: Offset,
    matcher: ValueMatcher,
    token: CancellationToken,
    interrupted: bool,
}

impl FilteredOffset {
    fn seek(&mut self, interruptible: bool) {
        let mut examined: u32 = 0;
        while self.inner.within_bounds() {
            if (self.matcher)() {
                return;
            }
            self.inner.advance();
            examined += 1;
            if interruptible
                && examined % CANCEL_CHECK_EVERY == 0
                && self.token.is_cancelled()
            {
                self.interrupted = true;
                return;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn drain(mut offset: Offset) -> Vec<u32> {
        let mut out = Vec::new();
        while offset.within_bounds() {
            out.push(offset.current());
            offset.advance();
        }
        out
    }

    #[test]
    fn test_ascending() {
        assert_eq!(drain(Offset::ascending(4)), vec![0, 1, 2, 3]);
        assert_eq!(drain(Offset::ascending(0)), Vec::<u32>::new());
    }

    #[test]
    fn test_descending() {
        assert_eq!(drain(Offset::descending(4)), vec![3, 2, 1, 0]);
        assert_eq!(drain(Offset::descending(0)), Vec::<u32>::new());
    }

    #[test]
    fn test_bitmap_both_directions() {
        let mut bm = RoaringBitmap::new();
        for r in [1u32, 4, 7] {
            bm.insert(r);
        }
        assert_eq!(drain(Offset::bitmap(&bm, false, 10)), vec![1, 4, 7]);
        assert_eq!(drain(Offset::bitmap(&bm, true, 10)), vec![7, 4, 1]);
        // bits beyond the row count are ignored
        assert_eq!(drain(Offset::bitmap(&bm, false, 5)), vec![1, 4]);
    }

    #[test]
    fn test_reset_restores_initial_state() {
        let mut offset = Offset::ascending(3);
        offset.advance();
        offset.advance();
        offset.reset();
        assert_eq!(drain(offset), vec![0, 1, 2]);
    }

    #[test]
    fn test_position_tracks_base() {
        let offset = Offset::ascending(3);
        let pos = offset.position();
        let mut offset = offset;
        assert_eq!(pos.get(), 0);
        offset.advance();
        assert_eq!(pos.get(), 1);
    }

    #[test]
    fn test_time_check_ascending() {
        let timestamps = Rc::new(NumericColumn::from_values(vec![0i64, 10, 20, 30]));
        let offset = Offset::time_check(Offset::ascending(4), timestamps, 20, false, false);
        assert_eq!(drain(offset), vec![0, 1]);
    }

    #[test]
    fn test_time_check_descending() {
        let timestamps = Rc::new(NumericColumn::from_values(vec![0i64, 10, 20, 30]));
        let offset = Offset::time_check(Offset::descending(4), timestamps, 20, true, false);
        assert_eq!(drain(offset), vec![3, 2]);
    }

    #[test]
    fn test_time_check_all_within_skips_lookup() {
        let timestamps = Rc::new(NumericColumn::from_values(vec![0i64, 10, 20, 30]));
        // limit would cut at row 2, but all_within waives the check
        let offset = Offset::time_check(Offset::ascending(4), timestamps, 20, false, true);
        assert_eq!(drain(offset), vec![0, 1, 2, 3]);
    }

    #[test]
    fn test_filtered_skips_rejected_rows() {
        let inner = Offset::ascending(10);
        let pos = inner.position();
        let matcher: ValueMatcher = Box::new(move || pos.get() % 3 == 0);
        let offset = Offset::filtered(inner, matcher, CancellationToken::new());
        assert_eq!(drain(offset), vec![0, 3, 6, 9]);
    }

    #[test]
    fn test_filtered_no_match_exhausts() {
        let inner = Offset::ascending(10);
        let matcher: ValueMatcher = Box::new(|| false);
        let offset = Offset::filtered(inner, matcher, CancellationToken::new());
        assert!(!offset.within_bounds());
    }

    #[test]
    fn test_filtered_cancellation_exhausts() {
        let token = CancellationToken::new();
        token.cancel();
        let inner = Offset::ascending(1_000_000);
        let pos = inner.position();
        // a match exists far past the first cancellation check, so an
        // honored token must report exhaustion instead of reaching it
        let matcher: ValueMatcher = Box::new(move || pos.get() == 500_000);
        let offset = Offset::filtered(inner, matcher, token);
        assert!(!offset.within_bounds());
    }

    #[test]
    fn test_clone_is_independent() {
        let mut original = Offset::ascending(5);
        original.advance();
        let mut copy = original.try_clone();
        copy.advance();
        assert_eq!(original.current(), 1);
        assert_eq!(copy.current(), 2);
        // separate position pointers
        assert_eq!(original.position().get(), 1);
        assert_eq!(copy.position().get(), 2);
    }

    #[test]
    #[should_panic(expected = "cannot be cloned")]
    fn test_clone_filtered_panics() {
        let offset = Offset::filtered(
            Offset::ascending(1),
            Box::new(|| true),
            CancellationToken::new(),
        );
        let _ = offset.try_clone();
    }
}
