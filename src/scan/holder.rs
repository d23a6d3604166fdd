//! Columnar cursor holder
//!
//! One holder per scan request. It owns the transient resources (column
//! cache, filter bundle, time column handles) behind a lazy cell, picks
//! the iteration strategy from what the filter bundle offers, and
//! releases everything exactly once on close.

use std::cell::{Cell, RefCell};
use std::rc::Rc;
use std::time::Instant;

use once_cell::unsync::OnceCell;
use roaring::RoaringBitmap;

use super::cache::{Closer, ColumnCache};
use super::cursor::SegmentCursor;
use super::filter::{BitmapIndexSelector, Filter, FilterBundle};
use super::offset::Offset;
use super::selector::{ColumnInspector, QueryableSelectorFactory};
use super::spec::{
    resolve_time_ordering, AggregatorHint, CursorBuildSpec, NullPolicy, OrderBy, QueryMetrics,
    Vectorize,
};
use super::vcols::VirtualColumns;
use super::vector::{
    time_search, SegmentVectorSelectorFactory, VectorCursor, VectorOffset, WindowHandle,
};
use super::{CancellationToken, Cursor, CursorHolder};
use crate::data::ColumnCapabilities;
use crate::segment::{NumericColumn, Segment};
use crate::time::Interval;
use crate::{ExecutionError, Result};

/// Index access over a segment during filter bundle construction.
/// Virtual columns never carry bitmap indexes.
struct SegmentIndexSelector<'a> {
    segment: &'a Segment,
    virtual_columns: Rc<VirtualColumns>,
}

impl BitmapIndexSelector for SegmentIndexSelector<'_> {
    fn num_rows(&self) -> u32 {
        self.segment.num_rows()
    }

    fn has_bitmap_index(&self, column: &str) -> bool {
        if self.virtual_columns.get(column).is_some() {
            return false;
        }
        self.segment
            .column_capabilities(column)
            .map(|c| c.has_bitmap_index)
            .unwrap_or(false)
    }

    fn value_bitmap(&self, column: &str, value: Option<&str>) -> Option<Rc<RoaringBitmap>> {
        self.segment.column(column)?.value_bitmap(value)
    }
}

/// Capabilities view used by vectorization gating: virtual columns over
/// the segment's physical columns.
struct SegmentInspector<'a> {
    segment: &'a Segment,
    virtual_columns: Rc<VirtualColumns>,
}

impl ColumnInspector for SegmentInspector<'_> {
    fn column_capabilities(&self, name: &str) -> Option<ColumnCapabilities> {
        if let Some(vc) = self.virtual_columns.get(name) {
            return vc.capabilities(self);
        }
        self.segment.column_capabilities(name).cloned()
    }
}

struct CursorResources<'a> {
    closer: Rc<RefCell<Closer>>,
    cache: Rc<ColumnCache<'a>>,
    filter_bundle: Option<FilterBundle>,
    timestamps: Rc<NumericColumn<i64>>,
    min_data_timestamp: i64,
    max_data_timestamp: i64,
    num_rows: u32,
}

impl<'a> CursorResources<'a> {
    fn new(
        segment: &'a Segment,
        virtual_columns: &Rc<VirtualColumns>,
        filter: Option<&Rc<dyn Filter>>,
        metrics: Option<&Rc<dyn QueryMetrics>>,
    ) -> Result<Self> {
        let closer = Rc::new(RefCell::new(Closer::new()));
        let cache = Rc::new(ColumnCache::new(segment, Rc::clone(&closer)));
        let num_rows = segment.num_rows();

        if let Some(metrics) = metrics {
            metrics.report_segment_rows(num_rows as u64);
        }

        let filter_bundle = match filter {
            None => None,
            Some(filter) => {
                let index_selector = SegmentIndexSelector {
                    segment,
                    virtual_columns: Rc::clone(virtual_columns),
                };
                let started = Instant::now();
                let bundle = Rc::clone(filter).make_filter_bundle(
                    &index_selector,
                    num_rows,
                    num_rows,
                    false,
                )?;
                let build_nanos = started.elapsed().as_nanos() as u64;
                let info = bundle.info();
                log::debug!(
                    "filter partitioning ({} ns): {}",
                    build_nanos,
                    info
                );
                if let Some(metrics) = metrics {
                    metrics.report_bitmap_construction_time(build_nanos);
                    metrics.filter_bundle(&info);
                    let pre_filtered = bundle
                        .index
                        .as_ref()
                        .map(|i| i.bitmap.len())
                        .unwrap_or(0);
                    metrics.report_pre_filtered_rows(pre_filtered);
                }
                Some(bundle)
            }
        };

        let timestamps = cache.time_column()?;
        let (min_data_timestamp, max_data_timestamp) = if timestamps.is_empty() {
            (0, -1)
        } else {
            (
                timestamps.value_at(0),
                timestamps.value_at(timestamps.len() - 1),
            )
        };

        Ok(Self {
            closer,
            cache,
            filter_bundle,
            timestamps,
            min_data_timestamp,
            max_data_timestamp,
            num_rows,
        })
    }
}

/// Cursor holder over a columnar segment.
pub struct SegmentCursorHolder<'a> {
    segment: &'a Segment,
    interval: Interval,
    filter: Option<Rc<dyn Filter>>,
    virtual_columns: Rc<VirtualColumns>,
    aggregators: Vec<Rc<dyn AggregatorHint>>,
    metrics: Option<Rc<dyn QueryMetrics>>,
    vector_size: usize,
    vectorize_virtual: Vectorize,
    null_policy: NullPolicy,
    token: CancellationToken,
    descending: bool,
    ordering: Vec<OrderBy>,
    resources: OnceCell<CursorResources<'a>>,
    closed: Cell<bool>,
}

impl<'a> SegmentCursorHolder<'a> {
    pub fn new(segment: &'a Segment, spec: CursorBuildSpec) -> Result<Self> {
        let (descending, ordering) = resolve_time_ordering(&spec.preferred_ordering)?;
        spec.virtual_columns
            .check_no_shadowing(|name| segment.column(name).is_some())?;

        Ok(Self {
            segment,
            interval: spec.interval,
            filter: spec.filter,
            virtual_columns: Rc::new(spec.virtual_columns),
            aggregators: spec.aggregators,
            metrics: spec.query_metrics,
            vector_size: spec.query_context.vector_size,
            vectorize_virtual: spec.query_context.vectorize_virtual_columns,
            null_policy: spec.null_policy,
            token: spec.cancellation,
            descending,
            ordering,
            resources: OnceCell::new(),
            closed: Cell::new(false),
        })
    }

    fn resources(&self) -> Result<&CursorResources<'a>> {
        self.resources.get_or_try_init(|| {
            CursorResources::new(
                self.segment,
                &self.virtual_columns,
                self.filter.as_ref(),
                self.metrics.as_ref(),
            )
        })
    }

    fn ensure_open(&self) -> Result<()> {
        if self.closed.get() {
            Err(ExecutionError::HolderClosed.into())
        } else {
            Ok(())
        }
    }
}

impl CursorHolder for SegmentCursorHolder<'_> {
    fn can_vectorize(&self) -> bool {
        if self.closed.get() || self.descending {
            return false;
        }
        let inspector = SegmentInspector {
            segment: self.segment,
            virtual_columns: Rc::clone(&self.virtual_columns),
        };
        if !self.virtual_columns.is_empty()
            && !self
                .vectorize_virtual
                .should_vectorize(self.virtual_columns.can_vectorize(&inspector))
        {
            return false;
        }
        if !self.aggregators.iter().all(|a| a.can_vectorize(&inspector)) {
            return false;
        }
        // a failed resource build surfaces from as_cursor, not from here
        match self.resources() {
            Err(_) => false,
            Ok(resources) => resources
                .filter_bundle
                .as_ref()
                .map(|b| b.can_vectorize_matcher(&inspector))
                .unwrap_or(true),
        }
    }

    fn as_cursor(&self) -> Result<Box<dyn Cursor + '_>> {
        self.ensure_open()?;
        if let Some(metrics) = &self.metrics {
            metrics.vectorized(false);
        }

        let resources = self.resources()?;
        let bundle = resources.filter_bundle.as_ref();
        let num_rows = resources.num_rows;
        let timestamps = &resources.timestamps;

        let mut base_offset = match bundle {
            None => direction_offset(self.descending, num_rows),
            Some(bundle) => match (&bundle.index, &bundle.matcher) {
                (Some(holder), _) => {
                    Offset::bitmap(&holder.bitmap, self.descending, num_rows)
                }
                (None, Some(_)) => direction_offset(self.descending, num_rows),
                (None, None) => return Err(ExecutionError::UnmatchableFilter.into()),
            },
        };

        // skip rows in front of the query interval
        let time_start = self.interval.start.max(resources.min_data_timestamp);
        let time_end = self.interval.end;
        if self.descending {
            while base_offset.within_bounds() {
                if timestamps.value_at(base_offset.current() as usize) < time_end {
                    break;
                }
                base_offset.advance();
            }
        } else {
            while base_offset.within_bounds() {
                if timestamps.value_at(base_offset.current() as usize) >= time_start {
                    break;
                }
                base_offset.advance();
            }
        }
        // reset must come back to the clipped position, not row zero
        base_offset.freeze_initial();

        let offset = if self.descending {
            Offset::time_check(
                base_offset,
                Rc::clone(timestamps),
                time_start,
                true,
                resources.min_data_timestamp >= time_start,
            )
        } else {
            Offset::time_check(
                base_offset,
                Rc::clone(timestamps),
                time_end,
                false,
                resources.max_data_timestamp < time_end,
            )
        };

        // the clone separates the interruptible iteration offset from the
        // stateless selector reads bound to its position
        let cursor_offset = offset.try_clone();
        let factory = Rc::new(QueryableSelectorFactory::new(
            Rc::clone(&resources.cache),
            Rc::clone(&self.virtual_columns),
            cursor_offset.position(),
            self.null_policy,
        ));

        let final_offset = match bundle.and_then(|b| b.matcher.as_ref()) {
            Some(matcher_bundle) => {
                let matcher = matcher_bundle.value_matcher(factory.as_ref());
                Offset::filtered(cursor_offset, matcher, self.token.clone())
            }
            None => cursor_offset,
        };

        Ok(Box::new(SegmentCursor::new(
            final_offset,
            factory,
            self.token.clone(),
        )))
    }

    fn as_vector_cursor(&self) -> Result<VectorCursor<'_>> {
        self.ensure_open()?;
        if !self.can_vectorize() {
            return Err(ExecutionError::NotVectorizable.into());
        }
        if let Some(metrics) = &self.metrics {
            metrics.vectorized(true);
        }

        let resources = self.resources()?;
        let bundle = resources.filter_bundle.as_ref();
        let num_rows = resources.num_rows as usize;
        let timestamps = &resources.timestamps;

        let start_offset = if self.interval.start > resources.min_data_timestamp {
            time_search(timestamps, self.interval.start, 0, num_rows)
        } else {
            0
        };
        let end_offset = if self.interval.end <= resources.max_data_timestamp {
            time_search(timestamps, self.interval.end, start_offset, num_rows)
        } else {
            num_rows
        };

        if let Some(b) = bundle {
            if b.index.is_none() && b.matcher.is_none() {
                return Err(ExecutionError::UnmatchableFilter.into());
            }
        }

        let base_offset = match bundle.and_then(|b| b.index.as_ref()) {
            None => VectorOffset::no_filter(
                self.vector_size,
                start_offset as u32,
                end_offset as u32,
            ),
            Some(holder) => VectorOffset::bitmap(
                self.vector_size,
                &holder.bitmap,
                start_offset as u32,
                end_offset as u32,
            ),
        };

        let offset = match bundle.and_then(|b| b.matcher.as_ref()) {
            None => base_offset,
            Some(matcher_bundle) => {
                // matcher selectors bind to the unfiltered window, so
                // match evaluation sees raw positions
                let base_factory = self.vector_factory(resources, base_offset.window());
                let matcher = matcher_bundle.vector_matcher(&base_factory);
                VectorOffset::filtered(base_offset, matcher)
            }
        };

        let factory = self.vector_factory(resources, offset.window());
        Ok(VectorCursor::new(
            offset,
            factory,
            self.vector_size,
            self.token.clone(),
        ))
    }

    fn ordering(&self) -> &[OrderBy] {
        &self.ordering
    }

    fn close(&self) -> Result<()> {
        if self.closed.get() {
            return Ok(());
        }
        self.closed.set(true);
        match self.resources.get() {
            None => Ok(()),
            Some(resources) => resources.closer.borrow_mut().close(),
        }
    }
}

impl<'a> SegmentCursorHolder<'a> {
    fn vector_factory(
        &self,
        resources: &CursorResources<'a>,
        window: WindowHandle,
    ) -> SegmentVectorSelectorFactory<'a> {
        SegmentVectorSelectorFactory::new(
            Rc::clone(&resources.cache),
            Rc::clone(&self.virtual_columns),
            window,
            self.vector_size,
        )
    }
}

fn direction_offset(descending: bool, num_rows: u32) -> Offset {
    if descending {
        Offset::descending(num_rows)
    } else {
        Offset::ascending(num_rows)
    }
}
