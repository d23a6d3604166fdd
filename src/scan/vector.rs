//! Vectorized iteration
//!
//! The vector path shares the scalar path's filter and time machinery but
//! moves in fixed-width batches. A `VectorWindow` describes the rows of
//! the current batch (a contiguous range or an explicit row list); vector
//! selectors refill their buffers when the window's generation moves.

use std::cell::RefCell;
use std::rc::Rc;

use roaring::RoaringBitmap;

use crate::data::{ColumnCapabilities, Value, ValueType};
use crate::scan::cache::ColumnCache;
use crate::scan::selector::ColumnInspector;
use crate::scan::vcols::{Expr, VirtualColumns};
use crate::scan::CancellationToken;
use crate::segment::{BaseColumn, NumericColumn};
use crate::{DataError, ExecutionError, Result};

/// Rows of the current batch.
enum WindowRows {
    Contiguous { start: u32, len: usize },
    Indexed { rows: Vec<u32> },
}

struct VectorWindow {
    generation: u64,
    rows: WindowRows,
}

/// Shared handle to the current batch window. Selectors keep one and
/// compare generations to know when to refill.
#[derive(Clone)]
pub struct WindowHandle(Rc<RefCell<VectorWindow>>);

impl WindowHandle {
    pub fn new() -> Self {
        Self(Rc::new(RefCell::new(VectorWindow {
            generation: 0,
            rows: WindowRows::Contiguous { start: 0, len: 0 },
        })))
    }

    pub fn generation(&self) -> u64 {
        self.0.borrow().generation
    }

    pub fn len(&self) -> usize {
        match &self.0.borrow().rows {
            WindowRows::Contiguous { len, .. } => *len,
            WindowRows::Indexed { rows } => rows.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Physical row id of a batch lane.
    #[inline]
    pub fn row_at(&self, lane: usize) -> u32 {
        match &self.0.borrow().rows {
            WindowRows::Contiguous { start, .. } => start + lane as u32,
            WindowRows::Indexed { rows } => rows[lane],
        }
    }

    /// All rows of the batch, ascending.
    pub fn rows(&self) -> Vec<u32> {
        match &self.0.borrow().rows {
            WindowRows::Contiguous { start, len } => {
                (*start..*start + *len as u32).collect()
            }
            WindowRows::Indexed { rows } => rows.clone(),
        }
    }

    fn set_contiguous(&self, start: u32, len: usize) {
        let mut w = self.0.borrow_mut();
        w.generation += 1;
        w.rows = WindowRows::Contiguous { start, len };
    }

    fn set_indexed(&self, rows: Vec<u32>) {
        let mut w = self.0.borrow_mut();
        w.generation += 1;
        w.rows = WindowRows::Indexed { rows };
    }
}

impl Default for WindowHandle {
    fn default() -> Self {
        Self::new()
    }
}

/// Batch-granular position over `[start, end)`.
pub enum VectorOffset {
    NoFilter(NoFilterVectorOffset),
    Bitmap(BitmapVectorOffset),
    Filtered(Box<FilteredVectorOffset>),
}

impl VectorOffset {
    pub fn no_filter(vector_size: usize, start: u32, end: u32) -> Self {
        let mut offset = NoFilterVectorOffset {
            vector_size,
            start,
            end,
            current: start,
            window: WindowHandle::new(),
        };
        offset.fill();
        VectorOffset::NoFilter(offset)
    }

    pub fn bitmap(vector_size: usize, bitmap: &RoaringBitmap, start: u32, end: u32) -> Self {
        let rows: Vec<u32> = bitmap.iter().filter(|&r| r >= start && r < end).collect();
        let mut offset = BitmapVectorOffset {
            vector_size,
            rows: Rc::new(rows),
            idx: 0,
            window: WindowHandle::new(),
        };
        offset.fill();
        VectorOffset::Bitmap(offset)
    }

    pub fn filtered(inner: VectorOffset, matcher: Box<dyn VectorValueMatcher>) -> Self {
        let mut offset = FilteredVectorOffset {
            inner,
            matcher,
            window: WindowHandle::new(),
            done: false,
        };
        offset.seek();
        VectorOffset::Filtered(Box::new(offset))
    }

    pub fn window(&self) -> WindowHandle {
        match self {
            VectorOffset::NoFilter(o) => o.window.clone(),
            VectorOffset::Bitmap(o) => o.window.clone(),
            VectorOffset::Filtered(o) => o.window.clone(),
        }
    }

    pub fn current_vector_size(&self) -> usize {
        self.window().len()
    }

    pub fn is_done(&self) -> bool {
        match self {
            VectorOffset::NoFilter(o) => o.current >= o.end,
            VectorOffset::Bitmap(o) => o.idx >= o.rows.len(),
            VectorOffset::Filtered(o) => o.done,
        }
    }

    pub fn advance(&mut self) {
        match self {
            VectorOffset::NoFilter(o) => {
                if o.current < o.end {
                    o.current = (o.current + o.vector_size as u32).min(o.end);
                    o.fill();
                }
            }
            VectorOffset::Bitmap(o) => {
                if o.idx < o.rows.len() {
                    o.idx = (o.idx + o.vector_size).min(o.rows.len());
                    o.fill();
                }
            }
            VectorOffset::Filtered(o) => {
                if !o.done {
                    o.inner.advance();
                    o.seek();
                }
            }
        }
    }

    pub fn reset(&mut self) {
        match self {
            VectorOffset::NoFilter(o) => {
                o.current = o.start;
                o.fill();
            }
            VectorOffset::Bitmap(o) => {
                o.idx = 0;
                o.fill();
            }
            VectorOffset::Filtered(o) => {
                o.done = false;
                o.inner.reset();
                o.seek();
            }
        }
    }
}

pub struct NoFilterVectorOffset {
    vector_size: usize,
    start: u32,
    end: u32,
    current: u32,
    window: WindowHandle,
}

impl NoFilterVectorOffset {
    fn fill(&mut self) {
        let remaining = (self.end - self.current.min(self.end)) as usize;
        self.window
            .set_contiguous(self.current, remaining.min(self.vector_size));
    }
}

pub struct BitmapVectorOffset {
    vector_size: usize,
    rows: Rc<Vec<u32>>,
    idx: usize,
    window: WindowHandle,
}

impl BitmapVectorOffset {
    fn fill(&mut self) {
        let end = (self.idx + self.vector_size).min(self.rows.len());
        self.window.set_indexed(self.rows[self.idx..end].to_vec());
    }
}

/// Applies a vector matcher over the inner offset's batches, skipping
/// batches where nothing matches. The matcher's selectors are bound to
/// the *inner* window so match evaluation sees raw positions.
pub struct FilteredVectorOffset {
    inner: VectorOffset,
    matcher: Box<dyn VectorValueMatcher>,
    window: WindowHandle,
    done: bool,
}

impl FilteredVectorOffset {
    fn seek(&mut self) {
        loop {
            if self.inner.is_done() {
                self.done = true;
                self.window.set_indexed(Vec::new());
                return;
            }
            let mut selected = Vec::new();
            self.matcher.match_rows(&mut selected);
            if !selected.is_empty() {
                self.window.set_indexed(selected);
                return;
            }
            self.inner.advance();
        }
    }
}

/// Batch predicate: writes the row ids of the current batch that match,
/// ascending, into `out`.
pub trait VectorValueMatcher {
    fn match_rows(&mut self, out: &mut Vec<u32>);
}

/// Matcher evaluating one predicate per lane of an object selector.
pub struct PredicateVectorMatcher {
    selector: Option<ObjectVectorSelector>,
    window: WindowHandle,
    pred: Box<dyn Fn(&Value) -> bool>,
    constant: Option<bool>,
}

impl PredicateVectorMatcher {
    pub fn new(
        selector: ObjectVectorSelector,
        window: WindowHandle,
        pred: Box<dyn Fn(&Value) -> bool>,
    ) -> Self {
        Self {
            selector: Some(selector),
            window,
            pred,
            constant: None,
        }
    }

    pub fn constant(window: WindowHandle, matches: bool) -> Self {
        Self {
            selector: None,
            window,
            pred: Box::new(|_| false),
            constant: Some(matches),
        }
    }
}

impl VectorValueMatcher for PredicateVectorMatcher {
    fn match_rows(&mut self, out: &mut Vec<u32>) {
        out.clear();
        match self.constant {
            Some(false) => {}
            Some(true) => out.extend(self.window.rows()),
            None => {
                let selector = self.selector.as_mut().expect("predicate matcher selector");
                let values = selector.get_objects();
                for (lane, value) in values.iter().enumerate() {
                    if (self.pred)(value) {
                        out.push(self.window.row_at(lane));
                    }
                }
            }
        }
    }
}

/// Intersection of child matchers.
pub struct AndVectorMatcher {
    children: Vec<Box<dyn VectorValueMatcher>>,
    scratch: Vec<u32>,
}

impl AndVectorMatcher {
    pub fn new(children: Vec<Box<dyn VectorValueMatcher>>) -> Self {
        Self {
            children,
            scratch: Vec::new(),
        }
    }
}

impl VectorValueMatcher for AndVectorMatcher {
    fn match_rows(&mut self, out: &mut Vec<u32>) {
        out.clear();
        for (i, child) in self.children.iter_mut().enumerate() {
            if i == 0 {
                child.match_rows(out);
            } else {
                child.match_rows(&mut self.scratch);
                intersect_sorted(out, &self.scratch);
            }
            if out.is_empty() {
                return;
            }
        }
    }
}

/// Union of child matchers.
pub struct OrVectorMatcher {
    children: Vec<Box<dyn VectorValueMatcher>>,
    scratch: Vec<u32>,
}

impl OrVectorMatcher {
    pub fn new(children: Vec<Box<dyn VectorValueMatcher>>) -> Self {
        Self {
            children,
            scratch: Vec::new(),
        }
    }
}

impl VectorValueMatcher for OrVectorMatcher {
    fn match_rows(&mut self, out: &mut Vec<u32>) {
        out.clear();
        for child in self.children.iter_mut() {
            child.match_rows(&mut self.scratch);
            union_sorted(out, &self.scratch);
        }
    }
}

/// Complement of a child matcher within the current batch.
pub struct NotVectorMatcher {
    inner: Box<dyn VectorValueMatcher>,
    window: WindowHandle,
    scratch: Vec<u32>,
}

impl NotVectorMatcher {
    pub fn new(inner: Box<dyn VectorValueMatcher>, window: WindowHandle) -> Self {
        Self {
            inner,
            window,
            scratch: Vec::new(),
        }
    }
}

impl VectorValueMatcher for NotVectorMatcher {
    fn match_rows(&mut self, out: &mut Vec<u32>) {
        self.inner.match_rows(&mut self.scratch);
        out.clear();
        let mut excluded = self.scratch.iter().copied().peekable();
        for row in self.window.rows() {
            while excluded.peek().is_some_and(|&e| e < row) {
                excluded.next();
            }
            if excluded.peek() != Some(&row) {
                out.push(row);
            }
        }
    }
}

fn intersect_sorted(out: &mut Vec<u32>, other: &[u32]) {
    let mut keep = other.iter().copied().peekable();
    out.retain(|&row| {
        while keep.peek().is_some_and(|&k| k < row) {
            keep.next();
        }
        keep.peek() == Some(&row)
    });
}

fn union_sorted(out: &mut Vec<u32>, other: &[u32]) {
    if other.is_empty() {
        return;
    }
    let merged = {
        let mut merged = Vec::with_capacity(out.len() + other.len());
        let (mut a, mut b) = (out.iter().copied().peekable(), other.iter().copied().peekable());
        loop {
            match (a.peek(), b.peek()) {
                (Some(&x), Some(&y)) if x < y => {
                    merged.push(x);
                    a.next();
                }
                (Some(&x), Some(&y)) if x > y => {
                    merged.push(y);
                    b.next();
                }
                (Some(&x), Some(_)) => {
                    merged.push(x);
                    a.next();
                    b.next();
                }
                (Some(&x), None) => {
                    merged.push(x);
                    a.next();
                }
                (None, Some(&y)) => {
                    merged.push(y);
                    b.next();
                }
                (None, None) => break,
            }
        }
        merged
    };
    *out = merged;
}

enum VectorSource {
    Column(BaseColumn),
    Expression {
        expr: Rc<Expr>,
        output: ValueType,
        children: Vec<(String, ObjectVectorSelector)>,
    },
    Null,
}

/// Vector selector with a value buffer refilled per batch. Every column
/// shape (physical, virtual, missing) reads through this one struct; the
/// source decides how lanes are produced.
pub struct ObjectVectorSelector {
    source: VectorSource,
    window: WindowHandle,
    generation: Option<u64>,
    values: Vec<Value>,
}

impl ObjectVectorSelector {
    pub fn column(column: BaseColumn, window: WindowHandle) -> Self {
        Self {
            source: VectorSource::Column(column),
            window,
            generation: None,
            values: Vec::new(),
        }
    }

    pub fn null(window: WindowHandle) -> Self {
        Self {
            source: VectorSource::Null,
            window,
            generation: None,
            values: Vec::new(),
        }
    }

    pub fn expression(
        expr: Rc<Expr>,
        output: ValueType,
        children: Vec<(String, ObjectVectorSelector)>,
        window: WindowHandle,
    ) -> Self {
        Self {
            source: VectorSource::Expression {
                expr,
                output,
                children,
            },
            window,
            generation: None,
            values: Vec::new(),
        }
    }

    /// Values of the current batch, one per lane.
    pub fn get_objects(&mut self) -> &[Value] {
        let generation = self.window.generation();
        if self.generation != Some(generation) {
            self.refill();
            self.generation = Some(generation);
        }
        &self.values
    }

    fn refill(&mut self) {
        let len = self.window.len();
        match &mut self.source {
            VectorSource::Column(column) => {
                self.values.clear();
                for lane in 0..len {
                    let row = self.window.row_at(lane) as usize;
                    self.values.push(column.value_at(row));
                }
            }
            VectorSource::Null => {
                self.values.clear();
                self.values.resize(len, Value::Null);
            }
            VectorSource::Expression {
                expr,
                output,
                children,
            } => {
                for (_, child) in children.iter_mut() {
                    child.get_objects();
                }
                self.values.clear();
                for lane in 0..len {
                    let mut resolve = |name: &str| -> Value {
                        children
                            .iter()
                            .find(|(n, _)| n == name)
                            .map(|(_, c)| c.values[lane].clone())
                            .unwrap_or(Value::Null)
                    };
                    self.values
                        .push(expr.eval(&mut resolve).coerce(Some(*output)));
                }
            }
        }
    }
}

/// Typed fast path for long columns (time reads, mostly).
pub struct LongVectorSelector {
    col: Rc<NumericColumn<i64>>,
    window: WindowHandle,
    generation: Option<u64>,
    values: Vec<i64>,
    nulls: Vec<bool>,
}

impl LongVectorSelector {
    pub fn new(col: Rc<NumericColumn<i64>>, window: WindowHandle) -> Self {
        Self {
            col,
            window,
            generation: None,
            values: Vec::new(),
            nulls: Vec::new(),
        }
    }

    pub fn get_longs(&mut self) -> (&[i64], &[bool]) {
        let generation = self.window.generation();
        if self.generation != Some(generation) {
            self.values.clear();
            self.nulls.clear();
            for lane in 0..self.window.len() {
                let row = self.window.row_at(lane) as usize;
                self.values.push(self.col.value_at(row));
                self.nulls.push(self.col.is_null(row));
            }
            self.generation = Some(generation);
        }
        (&self.values, &self.nulls)
    }
}

/// Binds column names to vector selectors for one batch window.
pub trait VectorSelectorFactory: ColumnInspector {
    fn window(&self) -> WindowHandle;

    fn vector_size(&self) -> usize;

    fn make_object_selector(&self, name: &str) -> ObjectVectorSelector;
}

/// Vector selector factory over a columnar segment: virtual columns
/// first, then physical columns through the cache, then null lanes.
pub struct SegmentVectorSelectorFactory<'a> {
    cache: Rc<ColumnCache<'a>>,
    virtual_columns: Rc<VirtualColumns>,
    window: WindowHandle,
    vector_size: usize,
}

impl<'a> SegmentVectorSelectorFactory<'a> {
    pub fn new(
        cache: Rc<ColumnCache<'a>>,
        virtual_columns: Rc<VirtualColumns>,
        window: WindowHandle,
        vector_size: usize,
    ) -> Self {
        Self {
            cache,
            virtual_columns,
            window,
            vector_size,
        }
    }

    pub fn make_long_selector(&self, name: &str) -> Result<LongVectorSelector> {
        let column = self.cache.get(name).ok_or_else(|| DataError::TypeMismatch {
            column: name.to_string(),
            expected: "long",
            found: "absent",
        })?;
        let col = column.as_long_column().ok_or_else(|| DataError::TypeMismatch {
            column: name.to_string(),
            expected: "long",
            found: "non-numeric",
        })?;
        Ok(LongVectorSelector::new(col, self.window.clone()))
    }
}

impl ColumnInspector for SegmentVectorSelectorFactory<'_> {
    fn column_capabilities(&self, name: &str) -> Option<ColumnCapabilities> {
        if let Some(vc) = self.virtual_columns.get(name) {
            return vc.capabilities(self);
        }
        self.cache.segment().column_capabilities(name).cloned()
    }
}

impl VectorSelectorFactory for SegmentVectorSelectorFactory<'_> {
    fn window(&self) -> WindowHandle {
        self.window.clone()
    }

    fn vector_size(&self) -> usize {
        self.vector_size
    }

    fn make_object_selector(&self, name: &str) -> ObjectVectorSelector {
        if let Some(vc) = self.virtual_columns.get(name) {
            return vc.make_vector_selector(self);
        }
        match self.cache.get(name) {
            Some(column) => ObjectVectorSelector::column(column, self.window.clone()),
            None => ObjectVectorSelector::null(self.window.clone()),
        }
    }
}

/// Fixed-width batch cursor. Batches are full-size except possibly the
/// last (and except filtered batches, which carry the surviving lanes).
pub struct VectorCursor<'a> {
    offset: VectorOffset,
    factory: SegmentVectorSelectorFactory<'a>,
    max_vector_size: usize,
    token: CancellationToken,
    interrupted: bool,
}

impl<'a> VectorCursor<'a> {
    pub(crate) fn new(
        offset: VectorOffset,
        factory: SegmentVectorSelectorFactory<'a>,
        max_vector_size: usize,
        token: CancellationToken,
    ) -> Self {
        Self {
            offset,
            factory,
            max_vector_size,
            token,
            interrupted: false,
        }
    }

    pub fn selector_factory(&self) -> &SegmentVectorSelectorFactory<'a> {
        &self.factory
    }

    pub fn max_vector_size(&self) -> usize {
        self.max_vector_size
    }

    pub fn current_vector_size(&self) -> usize {
        self.offset.current_vector_size()
    }

    pub fn advance(&mut self) -> Result<()> {
        if self.is_done() {
            return Ok(());
        }
        self.offset.advance();
        if self.token.is_cancelled() {
            self.interrupted = true;
            return Err(ExecutionError::Interrupted.into());
        }
        Ok(())
    }

    pub fn is_done(&self) -> bool {
        self.interrupted || self.offset.is_done()
    }

    pub fn reset(&mut self) {
        self.interrupted = false;
        self.offset.reset();
    }
}

/// Find the smallest index in `[start, end)` whose timestamp is `>=
/// timestamp`, or `end` when there is none. Binary search for the
/// previous millisecond, then a linear probe across the duplicate run.
pub fn time_search(
    timestamps: &NumericColumn<i64>,
    timestamp: i64,
    start: usize,
    end: usize,
) -> usize {
    // every timestamp satisfies `>= i64::MIN`, and its predecessor is
    // not representable
    let Some(prev) = timestamp.checked_sub(1) else {
        return start;
    };

    let mut min_index = start as i64;
    let mut max_index = end as i64 - 1;
    while min_index <= max_index {
        let mid = ((min_index + max_index) as usize) >> 1;
        let value = timestamps.value_at(mid);
        if value < prev {
            min_index = mid as i64 + 1;
        } else if value > prev {
            max_index = mid as i64 - 1;
        } else {
            min_index = mid as i64;
            break;
        }
    }

    let mut idx = min_index.max(start as i64) as usize;
    while idx < end {
        if timestamps.value_at(idx) >= timestamp {
            return idx;
        }
        idx += 1;
    }
    end
}

#[cfg(test)]
mod tests {
    use super::*;

    fn longs(values: Vec<i64>) -> NumericColumn<i64> {
        NumericColumn::from_values(values)
    }

    #[test]
    fn test_time_search() {
        let col = longs(vec![0, 10, 10, 10, 20, 30]);
        assert_eq!(time_search(&col, 0, 0, 6), 0);
        assert_eq!(time_search(&col, 5, 0, 6), 1);
        assert_eq!(time_search(&col, 10, 0, 6), 1);
        assert_eq!(time_search(&col, 11, 0, 6), 4);
        assert_eq!(time_search(&col, 30, 0, 6), 5);
        assert_eq!(time_search(&col, 31, 0, 6), 6);
        // bounded search
        assert_eq!(time_search(&col, 10, 2, 6), 2);
        assert_eq!(time_search(&col, 0, 3, 6), 3);
    }

    #[test]
    fn test_time_search_minimum_timestamp() {
        // every row is >= i64::MIN; the predecessor probe must not
        // underflow
        let col = longs(vec![0, 10, 20]);
        assert_eq!(time_search(&col, i64::MIN, 0, 3), 0);
        assert_eq!(time_search(&col, i64::MIN, 2, 3), 2);
        assert_eq!(time_search(&col, i64::MIN, 3, 3), 3);
    }

    #[test]
    fn test_no_filter_offset_batches() {
        let mut offset = VectorOffset::no_filter(4, 0, 10);
        let window = offset.window();

        assert_eq!(window.rows(), vec![0, 1, 2, 3]);
        offset.advance();
        assert_eq!(window.rows(), vec![4, 5, 6, 7]);
        offset.advance();
        assert_eq!(window.rows(), vec![8, 9]);
        assert!(!offset.is_done());
        offset.advance();
        assert!(offset.is_done());

        offset.reset();
        assert_eq!(window.rows(), vec![0, 1, 2, 3]);
    }

    #[test]
    fn test_bitmap_offset_batches() {
        let mut bm = RoaringBitmap::new();
        for r in [1u32, 3, 5, 7, 9, 11] {
            bm.insert(r);
        }
        let mut offset = VectorOffset::bitmap(4, &bm, 2, 10);
        let window = offset.window();

        assert_eq!(window.rows(), vec![3, 5, 7, 9]);
        offset.advance();
        assert!(offset.is_done());
    }

    #[test]
    fn test_filtered_offset_skips_empty_batches() {
        // keep only multiples of 5: batches [0..4) -> 0, [4..8) -> 5,
        // [8..12) -> 10
        let inner = VectorOffset::no_filter(4, 0, 12);
        let inner_window = inner.window();
        struct EveryFifth {
            window: WindowHandle,
        }
        impl VectorValueMatcher for EveryFifth {
            fn match_rows(&mut self, out: &mut Vec<u32>) {
                out.clear();
                out.extend(self.window.rows().into_iter().filter(|r| r % 5 == 0));
            }
        }
        let offset = VectorOffset::filtered(
            inner,
            Box::new(EveryFifth {
                window: inner_window,
            }),
        );
        let window = offset.window();
        let mut offset = offset;

        assert_eq!(window.rows(), vec![0]);
        offset.advance();
        assert_eq!(window.rows(), vec![5]);
        offset.advance();
        assert_eq!(window.rows(), vec![10]);
        offset.advance();
        assert!(offset.is_done());
    }

    #[test]
    fn test_object_selector_refills_per_batch() {
        let column = BaseColumn::Long(Rc::new(longs(vec![10, 20, 30, 40, 50])));
        let mut offset = VectorOffset::no_filter(2, 0, 5);
        let mut selector = ObjectVectorSelector::column(column, offset.window());

        assert_eq!(selector.get_objects(), &[Value::Long(10), Value::Long(20)]);
        // stable within a batch
        assert_eq!(selector.get_objects(), &[Value::Long(10), Value::Long(20)]);
        offset.advance();
        assert_eq!(selector.get_objects(), &[Value::Long(30), Value::Long(40)]);
        offset.advance();
        assert_eq!(selector.get_objects(), &[Value::Long(50)]);
    }

    #[test]
    fn test_sorted_set_ops() {
        let mut out = vec![1, 3, 5, 7];
        intersect_sorted(&mut out, &[3, 4, 7, 9]);
        assert_eq!(out, vec![3, 7]);

        let mut out = vec![1, 5];
        union_sorted(&mut out, &[2, 5, 8]);
        assert_eq!(out, vec![1, 2, 5, 8]);
    }

    #[test]
    fn test_not_matcher_complements_window() {
        let offset = VectorOffset::no_filter(8, 0, 8);
        let window = offset.window();
        struct Evens {
            window: WindowHandle,
        }
        impl VectorValueMatcher for Evens {
            fn match_rows(&mut self, out: &mut Vec<u32>) {
                out.clear();
                out.extend(self.window.rows().into_iter().filter(|r| r % 2 == 0));
            }
        }
        let mut not = NotVectorMatcher::new(
            Box::new(Evens {
                window: window.clone(),
            }),
            window,
        );
        let mut out = Vec::new();
        not.match_rows(&mut out);
        assert_eq!(out, vec![1, 3, 5, 7]);
    }
}
