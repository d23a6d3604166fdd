//! End-to-end scan scenarios over columnar segments

use std::cell::Cell;
use std::rc::Rc;

use super::filter::{
    AndFilter, BitmapIndexSelector, BoundFilter, Filter, FilterBundle, InFilter, NotFilter,
    SelectorFilter,
};
use super::granularizer::CursorGranularizer;
use super::spec::{descending_time_order, CursorBuildSpec, QueryContext, QueryMetrics};
use super::vcols::{BinaryOp, Expr, ExpressionVirtualColumn, VirtualColumns};
use super::vector::VectorSelectorFactory;
use super::{CancellationToken, Cursor, CursorHolder};
use crate::data::{ValueType, TIME_COLUMN};
use crate::segment::{Segment, SegmentBuilder};
use crate::time::{Granularity, Interval, MILLIS_PER_HOUR};
use crate::{ExecutionError, Result, ScanError};

/// Segment with one row per id: `__time = id hours`, LONG = id,
/// STRING = id as text (indexed), DOUBLE = id as double.
fn scenario_segment(ids: &[i64]) -> Segment {
    let strings: Vec<String> = ids.iter().map(|i| i.to_string()).collect();
    SegmentBuilder::new()
        .time_column(ids.iter().map(|i| i * MILLIS_PER_HOUR).collect())
        .add_long("LONG", ids.iter().map(|&i| Some(i)).collect())
        .add_double("DOUBLE", ids.iter().map(|&i| Some(i as f64)).collect())
        .add_string(
            "STRING",
            strings.iter().map(|s| Some(s.as_str())).collect(),
            true,
        )
        .build()
}

/// Drain, reset, then drain again collecting LONG as text, so every walk
/// also exercises the reset round-trip.
fn walk_strings(cursor: &mut dyn Cursor) -> Vec<String> {
    let selector = cursor.selector_factory().make_selector("LONG");

    while !cursor.is_done() {
        cursor.advance_uninterruptibly();
    }
    cursor.reset();

    let mut out = Vec::new();
    while !cursor.is_done() {
        out.push(selector.get_object().as_text().expect("non-null LONG"));
        cursor.advance_uninterruptibly();
    }
    out
}

fn scan_strings(segment: &Segment, spec: CursorBuildSpec) -> Vec<String> {
    let holder = segment.make_cursor_holder(spec).unwrap();
    let out = walk_strings(&mut *holder.as_cursor().unwrap());
    holder.close().unwrap();
    out
}

#[derive(Default)]
struct CapturingMetrics {
    vectorized: Cell<Option<bool>>,
    segment_rows: Cell<u64>,
    pre_filtered_rows: Cell<u64>,
    bitmap_nanos_reported: Cell<bool>,
}

impl QueryMetrics for CapturingMetrics {
    fn vectorized(&self, vectorized: bool) {
        self.vectorized.set(Some(vectorized));
    }

    fn report_segment_rows(&self, rows: u64) {
        self.segment_rows.set(rows);
    }

    fn report_bitmap_construction_time(&self, _nanos: u64) {
        self.bitmap_nanos_reported.set(true);
    }

    fn report_pre_filtered_rows(&self, rows: u64) {
        self.pre_filtered_rows.set(rows);
    }
}

/// A filter that offers neither an index nor a matcher.
struct NoopFilter;

impl Filter for NoopFilter {
    fn describe(&self) -> String {
        "noop".into()
    }

    fn required_columns(&self) -> Vec<String> {
        Vec::new()
    }

    fn make_filter_bundle(
        self: Rc<Self>,
        _selector: &dyn BitmapIndexSelector,
        _total_rows: u32,
        _applied_rows: u32,
        _cnf_already: bool,
    ) -> Result<FilterBundle> {
        Ok(FilterBundle {
            index: None,
            matcher: None,
        })
    }

    fn make_matcher(
        &self,
        _factory: &dyn super::selector::ColumnSelectorFactory,
    ) -> super::filter::ValueMatcher {
        Box::new(|| false)
    }

    fn make_vector_matcher(
        &self,
        factory: &dyn super::vector::VectorSelectorFactory,
    ) -> Box<dyn super::vector::VectorValueMatcher> {
        Box::new(super::vector::PredicateVectorMatcher::constant(
            factory.window(),
            false,
        ))
    }
}

#[test]
fn test_full_scan_ascending() {
    let segment = scenario_segment(&[0, 1, 2]);
    let out = scan_strings(&segment, CursorBuildSpec::full_scan());
    assert_eq!(out, vec!["0", "1", "2"]);
}

#[test]
fn test_filter_on_long_with_float_text_target() {
    let segment = scenario_segment(&[0, 1, 2]);
    let spec = CursorBuildSpec::builder()
        .set_filter(Rc::new(SelectorFilter::new("LONG", Some("1.0"))))
        .build();
    assert_eq!(scan_strings(&segment, spec), vec!["1"]);
}

#[test]
fn test_filter_on_indexed_string_uses_bitmap() {
    let segment = scenario_segment(&[0, 1, 2]);
    let metrics = Rc::new(CapturingMetrics::default());
    let spec = CursorBuildSpec::builder()
        .set_filter(Rc::new(SelectorFilter::new("STRING", Some("1"))))
        .set_query_metrics(Rc::clone(&metrics) as Rc<dyn QueryMetrics>)
        .build();
    assert_eq!(scan_strings(&segment, spec), vec!["1"]);

    assert_eq!(metrics.vectorized.get(), Some(false));
    assert_eq!(metrics.segment_rows.get(), 3);
    assert_eq!(metrics.pre_filtered_rows.get(), 1);
    assert!(metrics.bitmap_nanos_reported.get());
}

#[test]
fn test_filter_on_nonexistent_column_equals_null() {
    let segment = scenario_segment(&[0, 1]);
    let spec = CursorBuildSpec::builder()
        .set_filter(Rc::new(SelectorFilter::new("nonexistent", None)))
        .build();
    assert_eq!(scan_strings(&segment, spec), vec!["0", "1"]);
}

#[test]
fn test_filter_on_nonexistent_column_equals_nonnull() {
    let segment = scenario_segment(&[0, 1]);
    let spec = CursorBuildSpec::builder()
        .set_filter(Rc::new(SelectorFilter::new("nonexistent", Some("abc"))))
        .build();
    assert_eq!(scan_strings(&segment, spec), Vec::<String>::new());
}

#[test]
fn test_filter_on_virtual_column() {
    let segment = scenario_segment(&[0, 1]);
    let vcols = VirtualColumns::create(vec![Rc::new(ExpressionVirtualColumn::new(
        "vc",
        Expr::binary(BinaryOp::Add, Expr::column("LONG"), Expr::literal(1i64)),
        ValueType::Long,
    ))])
    .unwrap();
    let spec = CursorBuildSpec::builder()
        .set_filter(Rc::new(SelectorFilter::new("vc", Some("2"))))
        .set_virtual_columns(vcols)
        .build();
    assert_eq!(scan_strings(&segment, spec), vec!["1"]);
}

#[test]
fn test_descending_scan() {
    let segment = scenario_segment(&[0, 1, 2]);
    let spec = CursorBuildSpec::builder()
        .set_preferred_ordering(descending_time_order())
        .build();
    assert_eq!(scan_strings(&segment, spec), vec!["2", "1", "0"]);
}

#[test]
fn test_interval_does_not_match() {
    let segment = scenario_segment(&[0, 1, 2]);
    let year_2000 = 946_684_800_000;
    let spec = CursorBuildSpec::builder()
        .set_interval(Interval::new(year_2000, year_2000 + 24 * MILLIS_PER_HOUR))
        .build();
    assert_eq!(scan_strings(&segment, spec), Vec::<String>::new());
}

#[test]
fn test_interval_partially_matches() {
    let segment = scenario_segment(&[0, 1, 2]);
    let spec = CursorBuildSpec::builder()
        .set_interval(Interval::new(MILLIS_PER_HOUR, 2 * MILLIS_PER_HOUR))
        .build();
    assert_eq!(scan_strings(&segment, spec), vec!["1"]);
}

#[test]
fn test_granularized_descending_with_interval() {
    let segment = scenario_segment(&[0, 1, 1, 2, 3]);
    let interval = Interval::new(MILLIS_PER_HOUR, 3 * MILLIS_PER_HOUR);
    let spec = CursorBuildSpec::builder()
        .set_interval(interval)
        .set_preferred_ordering(descending_time_order())
        .build();

    let holder = segment.make_cursor_holder(spec).unwrap();
    let mut cursor = holder.as_cursor().unwrap();
    let selector = cursor.selector_factory().make_selector("LONG");

    let mut granularizer = CursorGranularizer::create(
        &mut *cursor,
        Granularity::Hour,
        interval,
        segment.interval(),
        true,
    );

    let mut out = Vec::new();
    for bucket in granularizer.bucket_iter().collect::<Vec<_>>() {
        if !granularizer.advance_to_bucket(bucket) {
            continue;
        }
        loop {
            out.push((
                granularizer.bucket_start(),
                selector.get_object().as_text().unwrap(),
            ));
            if !granularizer.advance_within_bucket_uninterruptibly() {
                break;
            }
        }
    }
    holder.close().unwrap();

    assert_eq!(
        out,
        vec![
            (2 * MILLIS_PER_HOUR, "2".to_string()),
            (MILLIS_PER_HOUR, "1".to_string()),
            (MILLIS_PER_HOUR, "1".to_string()),
        ]
    );
}

#[test]
fn test_granularized_ascending_full_year() {
    let segment = scenario_segment(&[0, 1, 1, 2, 3]);
    let interval = Interval::new(0, 365 * 24 * MILLIS_PER_HOUR);
    let spec = CursorBuildSpec::builder().set_interval(interval).build();

    let holder = segment.make_cursor_holder(spec).unwrap();
    let mut cursor = holder.as_cursor().unwrap();
    let selector = cursor.selector_factory().make_selector("LONG");

    let mut granularizer = CursorGranularizer::create(
        &mut *cursor,
        Granularity::Hour,
        interval,
        segment.interval(),
        false,
    );

    let mut out = Vec::new();
    for bucket in granularizer.bucket_iter().collect::<Vec<_>>() {
        if !granularizer.advance_to_bucket(bucket) {
            continue;
        }
        loop {
            out.push((
                granularizer.bucket_start(),
                selector.get_object().as_text().unwrap(),
            ));
            if !granularizer.advance_within_bucket_uninterruptibly() {
                break;
            }
        }
    }
    holder.close().unwrap();

    let h = MILLIS_PER_HOUR;
    assert_eq!(
        out,
        vec![
            (0, "0".to_string()),
            (h, "1".to_string()),
            (h, "1".to_string()),
            (2 * h, "2".to_string()),
            (3 * h, "3".to_string()),
        ]
    );
}

#[test]
fn test_metrics_are_side_effect_only() {
    let segment = scenario_segment(&[0, 1, 2, 3, 4]);
    let filter = || -> Rc<dyn Filter> { Rc::new(SelectorFilter::new("STRING", Some("3"))) };

    let without = scan_strings(
        &segment,
        CursorBuildSpec::builder().set_filter(filter()).build(),
    );
    let with = scan_strings(
        &segment,
        CursorBuildSpec::builder()
            .set_filter(filter())
            .set_query_metrics(Rc::new(CapturingMetrics::default()))
            .build(),
    );
    assert_eq!(without, with);
}

#[test]
fn test_unmatchable_filter() {
    let segment = scenario_segment(&[0, 1, 2]);
    let spec = CursorBuildSpec::builder()
        .set_filter(Rc::new(NoopFilter))
        .build();
    let holder = segment.make_cursor_holder(spec).unwrap();
    let err = holder.as_cursor().err().expect("unmatchable");
    assert!(matches!(
        err,
        ScanError::Execution(ExecutionError::UnmatchableFilter)
    ));
    holder.close().unwrap();
}

#[test]
fn test_bitmap_and_matcher_intersection() {
    // STRING is indexed, BoundFilter is matcher-only: the AND bundles an
    // index and a matcher, and the emitted set is their intersection
    let segment = scenario_segment(&[0, 1, 2, 3, 4, 5]);
    let filter = Rc::new(AndFilter::new(vec![
        Rc::new(InFilter::new(
            "STRING",
            vec![Some("1"), Some("2"), Some("4")],
        )),
        Rc::new(BoundFilter::new("LONG", Some(2.0), None)),
    ]));
    let spec = CursorBuildSpec::builder().set_filter(filter).build();
    assert_eq!(scan_strings(&segment, spec), vec!["2", "4"]);
}

#[test]
fn test_not_filter() {
    let segment = scenario_segment(&[0, 1, 2]);
    let spec = CursorBuildSpec::builder()
        .set_filter(Rc::new(NotFilter::new(Rc::new(SelectorFilter::new(
            "STRING",
            Some("1"),
        )))))
        .build();
    assert_eq!(scan_strings(&segment, spec), vec!["0", "2"]);
}

#[test]
fn test_holder_close_is_idempotent_and_releases_columns() {
    let segment = scenario_segment(&[0, 1, 2]);
    let spec = CursorBuildSpec::builder()
        .set_filter(Rc::new(SelectorFilter::new("LONG", Some("1"))))
        .build();
    let holder = segment.make_cursor_holder(spec).unwrap();
    let _ = walk_strings(&mut *holder.as_cursor().unwrap());

    holder.close().unwrap();
    holder.close().unwrap();

    assert_eq!(segment.column(TIME_COLUMN).unwrap().open_count(), 0);
    assert_eq!(segment.column("LONG").unwrap().open_count(), 0);

    let err = holder.as_cursor().err().expect("closed holder");
    assert!(matches!(
        err,
        ScanError::Execution(ExecutionError::HolderClosed)
    ));
}

#[test]
fn test_cancellation_interrupts_advance() {
    let segment = scenario_segment(&[0, 1, 2, 3, 4]);
    let token = CancellationToken::new();
    let spec = CursorBuildSpec::builder()
        .set_cancellation(token.clone())
        .build();
    let holder = segment.make_cursor_holder(spec).unwrap();
    let mut cursor = holder.as_cursor().unwrap();

    cursor.advance().unwrap();
    token.cancel();
    let err = cursor.advance().err().expect("interrupted");
    assert!(matches!(
        err,
        ScanError::Execution(ExecutionError::Interrupted)
    ));
    assert!(cursor.is_done());
    // interrupted cursors stay done; further advances are no-ops
    cursor.advance_uninterruptibly();
    assert!(cursor.is_done());
    holder.close().unwrap();
}

#[test]
fn test_descending_cannot_vectorize() {
    let segment = scenario_segment(&[0, 1, 2]);
    let spec = CursorBuildSpec::builder()
        .set_preferred_ordering(descending_time_order())
        .build();
    let holder = segment.make_cursor_holder(spec).unwrap();
    assert!(!holder.can_vectorize());
    let err = holder.as_vector_cursor().err().expect("not vectorizable");
    assert!(matches!(
        err,
        ScanError::Execution(ExecutionError::NotVectorizable)
    ));
    holder.close().unwrap();
}

#[test]
fn test_ordering_reports_effective_time_order() {
    let segment = scenario_segment(&[0, 1, 2]);
    let holder = segment
        .make_cursor_holder(CursorBuildSpec::full_scan())
        .unwrap();
    assert_eq!(holder.ordering()[0].column, TIME_COLUMN);
    holder.close().unwrap();
}

#[test]
fn test_virtual_column_shadowing_physical_is_rejected() {
    let segment = scenario_segment(&[0, 1]);
    let vcols = VirtualColumns::create(vec![Rc::new(ExpressionVirtualColumn::new(
        "LONG",
        Expr::literal(1i64),
        ValueType::Long,
    ))])
    .unwrap();
    let spec = CursorBuildSpec::builder().set_virtual_columns(vcols).build();
    let err = segment.make_cursor_holder(spec).err().expect("shadowing");
    assert!(matches!(
        err,
        ScanError::Config(crate::ConfigError::DuplicateColumnName(_))
    ));
}

fn vector_walk_strings(segment: &Segment, spec: CursorBuildSpec) -> Vec<String> {
    let holder = segment.make_cursor_holder(spec).unwrap();
    assert!(holder.can_vectorize());
    let mut cursor = holder.as_vector_cursor().unwrap();
    let mut selector = cursor.selector_factory().make_object_selector("LONG");

    let mut out = Vec::new();
    while !cursor.is_done() {
        for value in selector.get_objects() {
            out.push(value.as_text().expect("non-null LONG"));
        }
        cursor.advance().unwrap();
    }
    holder.close().unwrap();
    out
}

#[test]
fn test_vector_scalar_equivalence_no_filter() {
    let ids: Vec<i64> = (0..50).collect();
    let segment = scenario_segment(&ids);
    let context = QueryContext {
        vector_size: 7,
        ..QueryContext::default()
    };

    let scalar = scan_strings(&segment, CursorBuildSpec::full_scan());
    let vector = vector_walk_strings(
        &segment,
        CursorBuildSpec::builder().set_query_context(context).build(),
    );
    assert_eq!(scalar, vector);
}

#[test]
fn test_vector_scalar_equivalence_with_filters_and_interval() {
    let ids: Vec<i64> = (0..40).collect();
    let segment = scenario_segment(&ids);
    let interval = Interval::new(5 * MILLIS_PER_HOUR, 33 * MILLIS_PER_HOUR);
    let filter = || -> Rc<dyn Filter> {
        Rc::new(AndFilter::new(vec![
            // indexed half
            Rc::new(InFilter::new(
                "STRING",
                (0..40)
                    .filter(|i| i % 2 == 0)
                    .map(|i| i.to_string())
                    .collect::<Vec<_>>()
                    .iter()
                    .map(|s| Some(s.as_str()))
                    .collect(),
            )),
            // matcher half
            Rc::new(BoundFilter::new("DOUBLE", Some(8.0), Some(30.0))),
        ]))
    };

    let scalar = scan_strings(
        &segment,
        CursorBuildSpec::builder()
            .set_interval(interval)
            .set_filter(filter())
            .build(),
    );
    let vector = vector_walk_strings(
        &segment,
        CursorBuildSpec::builder()
            .set_interval(interval)
            .set_filter(filter())
            .set_query_context(QueryContext {
                vector_size: 4,
                ..QueryContext::default()
            })
            .build(),
    );

    assert_eq!(scalar, vector);
    assert_eq!(scalar, vec!["8", "10", "12", "14", "16", "18", "20", "22", "24", "26", "28", "30"]);
}

#[test]
fn test_vector_cursor_reset_round_trip() {
    let ids: Vec<i64> = (0..10).collect();
    let segment = scenario_segment(&ids);
    let holder = segment
        .make_cursor_holder(
            CursorBuildSpec::builder()
                .set_query_context(QueryContext {
                    vector_size: 3,
                    ..QueryContext::default()
                })
                .build(),
        )
        .unwrap();
    let mut cursor = holder.as_vector_cursor().unwrap();
    assert_eq!(cursor.max_vector_size(), 3);
    assert_eq!(cursor.current_vector_size(), 3);

    let mut sizes = Vec::new();
    while !cursor.is_done() {
        sizes.push(cursor.current_vector_size());
        cursor.advance().unwrap();
    }
    assert_eq!(sizes, vec![3, 3, 3, 1]);

    cursor.reset();
    assert!(!cursor.is_done());
    assert_eq!(cursor.current_vector_size(), 3);
    holder.close().unwrap();
}

#[test]
fn test_vectorized_virtual_column_scan() {
    let segment = scenario_segment(&[0, 1, 2, 3]);
    let vcols = VirtualColumns::create(vec![Rc::new(ExpressionVirtualColumn::new(
        "vc",
        Expr::binary(BinaryOp::Add, Expr::column("LONG"), Expr::literal(1i64)),
        ValueType::Long,
    ))])
    .unwrap();
    let spec = CursorBuildSpec::builder()
        .set_filter(Rc::new(SelectorFilter::new("vc", Some("2"))))
        .set_virtual_columns(vcols)
        .build();

    let holder = segment.make_cursor_holder(spec).unwrap();
    assert!(holder.can_vectorize());
    let mut cursor = holder.as_vector_cursor().unwrap();
    let mut selector = cursor.selector_factory().make_object_selector("LONG");

    let mut out = Vec::new();
    while !cursor.is_done() {
        for value in selector.get_objects() {
            out.push(value.as_text().unwrap());
        }
        cursor.advance().unwrap();
    }
    holder.close().unwrap();
    assert_eq!(out, vec!["1"]);
}

#[test]
fn test_vector_cursor_empty_interval_yields_zero_rows() {
    // an empty interval at the very bottom of the time line used to
    // underflow the vector path's time search
    let segment = scenario_segment(&[0, 1, 2]);
    let holder = segment
        .make_cursor_holder(
            CursorBuildSpec::builder()
                .set_interval(Interval::new(i64::MIN, i64::MIN))
                .build(),
        )
        .unwrap();
    assert!(holder.can_vectorize());
    let cursor = holder.as_vector_cursor().unwrap();
    assert!(cursor.is_done());
    assert_eq!(cursor.current_vector_size(), 0);
    holder.close().unwrap();
}

#[test]
fn test_empty_segment() {
    let segment = SegmentBuilder::new().time_column(vec![]).build();
    let out = scan_strings(&segment, CursorBuildSpec::full_scan());
    assert!(out.is_empty());
}
