//! Segment scan engine
//!
//! The read-path primitive for time-ordered data: given an immutable
//! columnar segment (or a row-oriented shim over arbitrary in-memory
//! records), produce an ordered stream of rows, or fixed-width vectors of
//! rows, that satisfies a filter, lies within a requested time interval,
//! and is iterated in ascending or descending time order.
//!
//! Higher layers (aggregation, windowing, time boundaries) compose on top
//! of the cursor contract exposed here; this crate deliberately stops at
//! that contract.

pub mod data;
pub mod rows;
pub mod scan;
pub mod segment;
pub mod time;

// Re-export the main types
pub use data::{Capability, ColumnCapabilities, RowSignature, Value, ValueType, TIME_COLUMN};
pub use scan::spec::{CursorBuildSpec, NullPolicy, OrderBy, QueryContext, Vectorize};
pub use scan::{CancellationToken, Cursor, CursorHolder};
pub use segment::{Segment, SegmentBuilder};
pub use time::{Granularity, Interval};

/// Configuration errors: the build spec itself is unusable.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("unsupported ordering: cursors order by {} first, got {0}", TIME_COLUMN)]
    UnsupportedOrdering(String),

    #[error("cycle detected involving virtual column: {0}")]
    CyclicVirtualColumn(String),

    #[error("virtual column shadows an existing column: {0}")]
    DuplicateColumnName(String),
}

/// Execution errors: the scan could not run or complete.
#[derive(Debug, thiserror::Error)]
pub enum ExecutionError {
    #[error("cursor cannot be vectorized")]
    NotVectorizable,

    #[error("filter produced neither a bitmap index nor a value matcher")]
    UnmatchableFilter,

    #[error("scan interrupted")]
    Interrupted,

    #[error("failed to release cursor resources: {0}")]
    CloseFailed(String),

    #[error("cursor holder is closed")]
    HolderClosed,

    #[error("unsupported operation: {0}")]
    Unsupported(&'static str),
}

/// Data errors: a column exists but cannot satisfy the requested shape.
#[derive(Debug, thiserror::Error)]
pub enum DataError {
    #[error("type mismatch on column '{column}': expected {expected}, found {found}")]
    TypeMismatch {
        column: String,
        expected: &'static str,
        found: &'static str,
    },
}

/// Top-level error for every fallible operation in the crate.
#[derive(Debug, thiserror::Error)]
pub enum ScanError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Execution(#[from] ExecutionError),

    #[error(transparent)]
    Data(#[from] DataError),
}

pub type Result<T> = std::result::Result<T, ScanError>;
