//! Cursor construction and iteration
//!
//! The scan path: a `CursorBuildSpec` against a segment yields a cursor
//! holder; the holder yields row-at-a-time cursors and, when the gating
//! conditions hold, vectorized cursors. All iteration state lives in
//! offsets; all value access goes through selector factories bound to an
//! offset's shared position.

pub mod cache;
pub mod cursor;
pub mod filter;
pub mod granularizer;
pub mod holder;
pub mod offset;
pub mod selector;
pub mod spec;
pub mod vcols;
pub mod vector;

#[cfg(test)]
mod tests;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::Result;

pub use cache::{Closer, ColumnCache};
pub use cursor::SegmentCursor;
pub use filter::{BitmapIndexSelector, Filter, FilterBundle, ValueMatcher};
pub use granularizer::CursorGranularizer;
pub use holder::SegmentCursorHolder;
pub use offset::{Offset, RowPointer};
pub use selector::{ColumnInspector, ColumnSelectorFactory, ColumnValueSelector};
pub use spec::{CursorBuildSpec, OrderBy};
pub use vcols::{VirtualColumn, VirtualColumns};
pub use vector::VectorCursor;

/// Cooperative cancellation flag, shared between the caller and every
/// cursor derived from one build spec. Cursors observe it only inside
/// `advance`.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    flag: Arc<AtomicBool>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::Relaxed)
    }
}

/// Row-at-a-time cursor over a time-ordered scan.
///
/// `advance` is the only operation that observes cancellation; a cursor
/// that returns `ExecutionError::Interrupted` is exhausted afterwards.
pub trait Cursor {
    fn selector_factory(&self) -> &dyn ColumnSelectorFactory;

    fn advance(&mut self) -> Result<()>;

    /// Advance without observing cancellation, for contexts that must not
    /// raise.
    fn advance_uninterruptibly(&mut self);

    fn is_done(&self) -> bool;

    /// Rewind to the state right after construction.
    fn reset(&mut self);
}

/// Owner of one scan request's transient resources.
///
/// Multiple cursors may be created from one holder; closing the holder
/// releases every opened column and bitmap exactly once, and further
/// operations fail with `ExecutionError::HolderClosed`.
pub trait CursorHolder {
    fn can_vectorize(&self) -> bool;

    fn as_cursor(&self) -> Result<Box<dyn Cursor + '_>>;

    fn as_vector_cursor(&self) -> Result<VectorCursor<'_>>;

    /// The ordering actually honored, so callers can detect dropped hints.
    fn ordering(&self) -> &[OrderBy];

    fn close(&self) -> Result<()>;
}
