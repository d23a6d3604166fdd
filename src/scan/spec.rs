//! Scan request description
//!
//! A `CursorBuildSpec` carries everything a cursor holder needs: the time
//! interval, the filter, virtual columns, ordering preference, the query
//! context, and the ambient knobs (null policy, cancellation, metrics).

use std::fmt;
use std::rc::Rc;

use serde::{Deserialize, Serialize};

use super::filter::{BundleInfo, Filter};
use super::selector::ColumnInspector;
use super::vcols::VirtualColumns;
use super::CancellationToken;
use crate::data::TIME_COLUMN;
use crate::time::Interval;
use crate::{ConfigError, Result};

pub const DEFAULT_VECTOR_SIZE: usize = 512;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Direction {
    Ascending,
    Descending,
}

/// One entry of an ordering preference.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderBy {
    pub column: String,
    pub direction: Direction,
}

impl OrderBy {
    pub fn ascending(column: impl Into<String>) -> Self {
        Self {
            column: column.into(),
            direction: Direction::Ascending,
        }
    }

    pub fn descending(column: impl Into<String>) -> Self {
        Self {
            column: column.into(),
            direction: Direction::Descending,
        }
    }

    pub fn time_ascending() -> Self {
        Self::ascending(TIME_COLUMN)
    }

    pub fn time_descending() -> Self {
        Self::descending(TIME_COLUMN)
    }
}

/// Ordering preference asking for rows in descending time order.
pub fn descending_time_order() -> Vec<OrderBy> {
    vec![OrderBy::time_descending()]
}

/// Resolve a preferred ordering into the time direction actually honored.
///
/// Only time ordering is honored by this engine: the first entry must be
/// `__time` (or the list empty); trailing entries are hints, accepted and
/// ignored. Returns the descending flag and the effective ordering.
pub fn resolve_time_ordering(preferred: &[OrderBy]) -> Result<(bool, Vec<OrderBy>)> {
    match preferred.first() {
        Some(first) if first.column != TIME_COLUMN => {
            Err(ConfigError::UnsupportedOrdering(first.column.clone()).into())
        }
        Some(first) if first.direction == Direction::Descending => {
            Ok((true, vec![OrderBy::time_descending()]))
        }
        _ => Ok((false, vec![OrderBy::time_ascending()])),
    }
}

/// How numeric nulls read through selectors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum NullPolicy {
    /// Nulls are nulls: `is_null()` answers truthfully.
    #[default]
    SqlCompatible,
    /// Nulls read as the type's default (zero) and never report null.
    ReplaceWithDefault,
}

/// Whether virtual columns may take part in a vectorized scan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Vectorize {
    Force,
    #[default]
    Auto,
    False,
}

impl Vectorize {
    pub fn should_vectorize(&self, columns_can: bool) -> bool {
        match self {
            Vectorize::Force => true,
            Vectorize::Auto => columns_can,
            Vectorize::False => false,
        }
    }
}

/// Per-query execution options.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryContext {
    pub vector_size: usize,
    pub vectorize_virtual_columns: Vectorize,
}

impl Default for QueryContext {
    fn default() -> Self {
        Self {
            vector_size: DEFAULT_VECTOR_SIZE,
            vectorize_virtual_columns: Vectorize::default(),
        }
    }
}

/// Vectorization gate for an aggregator that would consume the cursor.
/// Aggregation itself happens in higher layers; the holder only asks
/// whether a vectorized cursor would be usable.
pub trait AggregatorHint {
    fn can_vectorize(&self, inspector: &dyn ColumnInspector) -> bool;
}

/// Optional metrics sink. All side effects are observational: clearing
/// the sink never changes which rows a cursor emits.
pub trait QueryMetrics {
    fn vectorized(&self, _vectorized: bool) {}

    fn report_segment_rows(&self, _rows: u64) {}

    fn report_bitmap_construction_time(&self, _nanos: u64) {}

    fn report_pre_filtered_rows(&self, _rows: u64) {}

    fn filter_bundle(&self, _info: &BundleInfo) {}
}

/// Everything a cursor holder needs to build cursors for one scan.
#[derive(Clone)]
pub struct CursorBuildSpec {
    pub interval: Interval,
    pub filter: Option<Rc<dyn Filter>>,
    pub virtual_columns: VirtualColumns,
    pub preferred_ordering: Vec<OrderBy>,
    pub query_context: QueryContext,
    pub aggregators: Vec<Rc<dyn AggregatorHint>>,
    pub query_metrics: Option<Rc<dyn QueryMetrics>>,
    pub null_policy: NullPolicy,
    pub cancellation: CancellationToken,
}

impl CursorBuildSpec {
    pub fn builder() -> CursorBuildSpecBuilder {
        CursorBuildSpecBuilder {
            spec: Self::full_scan(),
        }
    }

    /// Unfiltered scan of everything, ascending time order.
    pub fn full_scan() -> Self {
        Self {
            interval: Interval::ETERNITY,
            filter: None,
            virtual_columns: VirtualColumns::empty(),
            preferred_ordering: Vec::new(),
            query_context: QueryContext::default(),
            aggregators: Vec::new(),
            query_metrics: None,
            null_policy: NullPolicy::default(),
            cancellation: CancellationToken::new(),
        }
    }
}

impl fmt::Debug for CursorBuildSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CursorBuildSpec")
            .field("interval", &self.interval)
            .field("has_filter", &self.filter.is_some())
            .field("virtual_columns", &self.virtual_columns.names())
            .field("preferred_ordering", &self.preferred_ordering)
            .field("query_context", &self.query_context)
            .finish()
    }
}

pub struct CursorBuildSpecBuilder {
    spec: CursorBuildSpec,
}

impl CursorBuildSpecBuilder {
    pub fn set_interval(mut self, interval: Interval) -> Self {
        self.spec.interval = interval;
        self
    }

    pub fn set_filter(mut self, filter: Rc<dyn Filter>) -> Self {
        self.spec.filter = Some(filter);
        self
    }

    pub fn set_virtual_columns(mut self, virtual_columns: VirtualColumns) -> Self {
        self.spec.virtual_columns = virtual_columns;
        self
    }

    pub fn set_preferred_ordering(mut self, ordering: Vec<OrderBy>) -> Self {
        self.spec.preferred_ordering = ordering;
        self
    }

    pub fn set_query_context(mut self, context: QueryContext) -> Self {
        self.spec.query_context = context;
        self
    }

    pub fn set_aggregators(mut self, aggregators: Vec<Rc<dyn AggregatorHint>>) -> Self {
        self.spec.aggregators = aggregators;
        self
    }

    pub fn set_query_metrics(mut self, metrics: Rc<dyn QueryMetrics>) -> Self {
        self.spec.query_metrics = Some(metrics);
        self
    }

    pub fn set_null_policy(mut self, policy: NullPolicy) -> Self {
        self.spec.null_policy = policy;
        self
    }

    pub fn set_cancellation(mut self, token: CancellationToken) -> Self {
        self.spec.cancellation = token;
        self
    }

    pub fn build(self) -> CursorBuildSpec {
        self.spec
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_time_ordering() {
        let (desc, eff) = resolve_time_ordering(&[]).unwrap();
        assert!(!desc);
        assert_eq!(eff, vec![OrderBy::time_ascending()]);

        let (desc, _) = resolve_time_ordering(&descending_time_order()).unwrap();
        assert!(desc);

        // trailing non-time entries are hints, accepted but not honored
        let (desc, eff) =
            resolve_time_ordering(&[OrderBy::time_ascending(), OrderBy::ascending("dim")])
                .unwrap();
        assert!(!desc);
        assert_eq!(eff.len(), 1);

        // a non-time column first cannot be honored at all
        let err = resolve_time_ordering(&[OrderBy::ascending("dim")]).unwrap_err();
        assert!(matches!(
            err,
            crate::ScanError::Config(ConfigError::UnsupportedOrdering(_))
        ));
    }

    #[test]
    fn test_vectorize_modes() {
        assert!(Vectorize::Force.should_vectorize(false));
        assert!(Vectorize::Auto.should_vectorize(true));
        assert!(!Vectorize::Auto.should_vectorize(false));
        assert!(!Vectorize::False.should_vectorize(true));
    }

    #[test]
    fn test_default_context() {
        let ctx = QueryContext::default();
        assert_eq!(ctx.vector_size, 512);
        assert_eq!(ctx.vectorize_virtual_columns, Vectorize::Auto);
    }
}
