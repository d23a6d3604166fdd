//! Row-based segments
//!
//! Presents the cursor contract over an opaque, lazy sequence of records
//! with a declared schema. Nothing is known about the data until the
//! sequence is walked: the interval is eternity, cardinalities and
//! min/max values are unknown, and capabilities come from the declared
//! row signature alone.

pub mod cursor;
mod walker;


use std::rc::Rc;

use crate::data::{ColumnCapabilities, RowSignature, Value, ValueType, TIME_COLUMN};
use crate::scan::spec::CursorBuildSpec;
use crate::segment::SegmentMetadata;
use crate::time::Interval;
use crate::{ExecutionError, Result};

pub use cursor::RowBasedCursorHolder;

/// Reads one record's column values. The getter is created once per
/// selector and applied to whatever record the cursor is positioned on.
pub type ColumnFn<R> = Rc<dyn Fn(&R) -> Value>;

/// How to interpret opaque records: a timestamp and per-column getters.
/// `column_fn` returning `None` means the column does not exist; its
/// selector reads null.
pub trait RowAdapter<R> {
    fn timestamp(&self, row: &R) -> i64;

    fn column_fn(&self, column: &str) -> Option<ColumnFn<R>>;
}

/// A restartable lazy sequence of records with optional deferred cleanup
/// ("baggage"). Each materialization that finishes — by exhaustion,
/// reset mid-walk, or holder close — fires the baggage exactly once.
#[derive(Clone)]
pub struct RowSequence<R> {
    make_iter: Rc<dyn Fn() -> Box<dyn Iterator<Item = R>>>,
    baggage: Option<Rc<dyn Fn()>>,
}

impl<R> RowSequence<R> {
    pub fn new(make_iter: impl Fn() -> Box<dyn Iterator<Item = R>> + 'static) -> Self {
        Self {
            make_iter: Rc::new(make_iter),
            baggage: None,
        }
    }

    pub fn with_baggage(mut self, baggage: impl Fn() + 'static) -> Self {
        self.baggage = Some(Rc::new(baggage));
        self
    }

    pub(crate) fn iter(&self) -> Box<dyn Iterator<Item = R>> {
        (self.make_iter)()
    }

    pub(crate) fn baggage(&self) -> Option<Rc<dyn Fn()>> {
        self.baggage.clone()
    }
}

impl<R: Clone + 'static> RowSequence<R> {
    pub fn from_vec(rows: Vec<R>) -> Self {
        let rows = Rc::new(rows);
        Self::new(move || {
            let rows = Rc::clone(&rows);
            Box::new((0..rows.len()).map(move |i| rows[i].clone()))
        })
    }
}

/// Segment facade over a row sequence and a declared signature.
pub struct RowBasedSegment<R> {
    sequence: RowSequence<R>,
    adapter: Rc<dyn RowAdapter<R>>,
    signature: RowSignature,
}

impl<R: Clone + 'static> RowBasedSegment<R> {
    pub fn new(
        sequence: RowSequence<R>,
        adapter: Rc<dyn RowAdapter<R>>,
        signature: RowSignature,
    ) -> Self {
        Self {
            sequence,
            adapter,
            signature,
        }
    }

    /// Row-based segments span all of time until proven otherwise.
    pub fn interval(&self) -> Interval {
        Interval::ETERNITY
    }

    pub fn min_time(&self) -> i64 {
        Interval::ETERNITY.start
    }

    pub fn max_time(&self) -> i64 {
        Interval::ETERNITY.end - 1
    }

    pub fn max_ingested_event_time(&self) -> i64 {
        self.max_time()
    }

    pub fn row_signature(&self) -> &RowSignature {
        &self.signature
    }

    /// Every declared column is a dimension here; there are no metrics.
    pub fn available_dimensions(&self) -> Vec<&str> {
        self.signature.column_names().collect()
    }

    pub fn available_metrics(&self) -> Vec<&str> {
        Vec::new()
    }

    /// Cardinality is unknowable without walking the sequence.
    pub fn dimension_cardinality(&self, _column: &str) -> Option<usize> {
        None
    }

    pub fn min_value(&self, _column: &str) -> Option<Value> {
        None
    }

    pub fn max_value(&self, _column: &str) -> Option<Value> {
        None
    }

    /// Capabilities from the declared signature only. A declared column
    /// without a type, like an unknown name, has no capabilities.
    pub fn column_capabilities(&self, column: &str) -> Option<ColumnCapabilities> {
        if column == TIME_COLUMN {
            return Some(ColumnCapabilities::numeric(ValueType::Long));
        }
        self.signature
            .column_type(column)
            .flatten()
            .map(ColumnCapabilities::from_declared)
    }

    /// Counting would require walking the sequence.
    pub fn num_rows(&self) -> Result<u32> {
        Err(ExecutionError::Unsupported("num_rows").into())
    }

    pub fn metadata(&self) -> Result<SegmentMetadata> {
        Err(ExecutionError::Unsupported("metadata").into())
    }

    pub fn make_cursor_holder(&self, spec: CursorBuildSpec) -> Result<RowBasedCursorHolder<R>> {
        RowBasedCursorHolder::new(
            self.sequence.clone(),
            Rc::clone(&self.adapter),
            self.signature.clone(),
            spec,
        )
    }
}
