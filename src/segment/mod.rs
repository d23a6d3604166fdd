//! Immutable columnar segments
//!
//! A segment is a row-addressable collection of typed columns plus a
//! mandatory, monotone non-decreasing `__time` column. Segments are built
//! once and never mutated; scans borrow them immutably for the lifetime
//! of a cursor holder.

pub mod column;

use std::cell::Cell;
use std::rc::Rc;

use ahash::AHashMap;
use roaring::RoaringBitmap;
use serde::{Deserialize, Serialize};

use crate::data::{Capability, ColumnCapabilities, Value, ValueType, TIME_COLUMN};
use crate::scan::holder::SegmentCursorHolder;
use crate::scan::spec::CursorBuildSpec;
use crate::time::Interval;
use crate::{ExecutionError, Result};

pub use column::{BaseColumn, NumericColumn, StringDictColumn};

/// Optional descriptive metadata attached to a segment at build time.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SegmentMetadata {
    pub properties: Vec<(String, String)>,
}

/// A named column with its capabilities and open tracking.
///
/// `open` hands out a shared handle to the column data and counts the
/// open; the scan layer registers a matching release with its closer so
/// tests can assert that every open is balanced.
pub struct ColumnHolder {
    capabilities: ColumnCapabilities,
    data: BaseColumn,
    opens: Rc<Cell<usize>>,
}

impl ColumnHolder {
    fn new(capabilities: ColumnCapabilities, data: BaseColumn) -> Self {
        Self {
            capabilities,
            data,
            opens: Rc::new(Cell::new(0)),
        }
    }

    pub fn capabilities(&self) -> &ColumnCapabilities {
        &self.capabilities
    }

    pub fn open(&self) -> BaseColumn {
        self.opens.set(self.opens.get() + 1);
        self.data.clone()
    }

    /// Shared open counter, decremented by the holder's closer.
    pub fn open_tracker(&self) -> Rc<Cell<usize>> {
        Rc::clone(&self.opens)
    }

    pub fn open_count(&self) -> usize {
        self.opens.get()
    }

    /// Bitmap of rows holding `value`, when this column is indexed. The
    /// index supplier is separate from the column opener: using it does
    /// not count as an open.
    pub fn value_bitmap(&self, value: Option<&str>) -> Option<Rc<RoaringBitmap>> {
        if !self.capabilities.has_bitmap_index {
            return None;
        }
        self.data.as_string_column()?.bitmap_for(value)
    }
}

/// Immutable columnar segment.
pub struct Segment {
    interval: Interval,
    num_rows: u32,
    names: Vec<String>,
    columns: AHashMap<String, ColumnHolder>,
    metadata: Option<SegmentMetadata>,
}

impl Segment {
    pub fn builder() -> SegmentBuilder {
        SegmentBuilder::new()
    }

    /// Data interval `[min_time, max_time + 1)`.
    pub fn interval(&self) -> Interval {
        self.interval
    }

    pub fn num_rows(&self) -> u32 {
        self.num_rows
    }

    pub fn column(&self, name: &str) -> Option<&ColumnHolder> {
        self.columns.get(name)
    }

    pub fn column_capabilities(&self, name: &str) -> Option<&ColumnCapabilities> {
        self.column(name).map(|c| c.capabilities())
    }

    /// Column names in insertion order, excluding `__time`.
    pub fn column_names(&self) -> impl Iterator<Item = &str> {
        self.names
            .iter()
            .map(|n| n.as_str())
            .filter(|n| *n != TIME_COLUMN)
    }

    /// String columns, in insertion order.
    pub fn available_dimensions(&self) -> Vec<&str> {
        self.column_names()
            .filter(|n| {
                self.columns[*n].capabilities().value_type == ValueType::String
            })
            .collect()
    }

    /// Non-string, non-time columns, in insertion order.
    pub fn available_metrics(&self) -> Vec<&str> {
        self.column_names()
            .filter(|n| {
                self.columns[*n].capabilities().value_type != ValueType::String
            })
            .collect()
    }

    /// Dictionary cardinality of a string column. A missing column has
    /// cardinality 1 (null, nothing else); non-dictionary columns are
    /// unknown.
    pub fn dimension_cardinality(&self, name: &str) -> Option<usize> {
        match self.column(name) {
            None => Some(1),
            Some(holder) => match &holder.data {
                BaseColumn::String(col) => Some(col.cardinality()),
                _ => None,
            },
        }
    }

    pub fn min_time(&self) -> i64 {
        self.interval.start
    }

    pub fn max_time(&self) -> i64 {
        self.interval.end - 1
    }

    /// Smallest dictionary value of an indexed string column.
    pub fn min_value(&self, name: &str) -> Option<Value> {
        self.indexed_string(name).and_then(|col| {
            (col.cardinality() > 0).then(|| Value::String(col.dict_value(0).to_string()))
        })
    }

    /// Largest dictionary value of an indexed string column.
    pub fn max_value(&self, name: &str) -> Option<Value> {
        self.indexed_string(name).and_then(|col| {
            (col.cardinality() > 0)
                .then(|| Value::String(col.dict_value(col.cardinality() - 1).to_string()))
        })
    }

    fn indexed_string(&self, name: &str) -> Option<Rc<StringDictColumn>> {
        let holder = self.column(name)?;
        if !holder.capabilities().has_bitmap_index {
            return None;
        }
        holder.data.as_string_column()
    }

    pub fn metadata(&self) -> Result<&SegmentMetadata> {
        self.metadata
            .as_ref()
            .ok_or_else(|| ExecutionError::Unsupported("metadata").into())
    }

    /// Entry point of the scan path: build a cursor holder for a scan
    /// request. The holder borrows this segment for its whole life.
    pub fn make_cursor_holder(&self, spec: CursorBuildSpec) -> Result<SegmentCursorHolder<'_>> {
        SegmentCursorHolder::new(self, spec)
    }
}

/// Builder for in-memory segments. The time column is mandatory and must
/// be monotone non-decreasing; all columns must have the same length.
pub struct SegmentBuilder {
    timestamps: Option<Vec<i64>>,
    names: Vec<String>,
    columns: AHashMap<String, ColumnHolder>,
    interval: Option<Interval>,
    metadata: Option<SegmentMetadata>,
}

impl SegmentBuilder {
    pub fn new() -> Self {
        Self {
            timestamps: None,
            names: Vec::new(),
            columns: AHashMap::new(),
            interval: None,
            metadata: None,
        }
    }

    /// The `__time` column, epoch milliseconds, monotone non-decreasing.
    pub fn time_column(mut self, timestamps: Vec<i64>) -> Self {
        assert!(
            timestamps.windows(2).all(|w| w[0] <= w[1]),
            "time column must be monotone non-decreasing"
        );
        self.timestamps = Some(timestamps);
        self
    }

    pub fn add_long(self, name: impl Into<String>, rows: Vec<Option<i64>>) -> Self {
        let (values, nulls) = split_nulls(rows, 0);
        let col = BaseColumn::Long(Rc::new(NumericColumn::new(values, nulls)));
        self.add(name.into(), ColumnCapabilities::numeric(ValueType::Long), col)
    }

    pub fn add_double(self, name: impl Into<String>, rows: Vec<Option<f64>>) -> Self {
        let (values, nulls) = split_nulls(rows, 0.0);
        let col = BaseColumn::Double(Rc::new(NumericColumn::new(values, nulls)));
        self.add(name.into(), ColumnCapabilities::numeric(ValueType::Double), col)
    }

    pub fn add_float(self, name: impl Into<String>, rows: Vec<Option<f32>>) -> Self {
        let (values, nulls) = split_nulls(rows, 0.0);
        let col = BaseColumn::Float(Rc::new(NumericColumn::new(values, nulls)));
        self.add(name.into(), ColumnCapabilities::numeric(ValueType::Float), col)
    }

    /// Dictionary-encoded string column; `indexed` also builds one bitmap
    /// per dictionary value.
    pub fn add_string(
        self,
        name: impl Into<String>,
        rows: Vec<Option<&str>>,
        indexed: bool,
    ) -> Self {
        let col = StringDictColumn::from_rows(&rows, indexed);
        let capabilities = ColumnCapabilities {
            value_type: ValueType::String,
            has_multiple_values: Capability::False,
            dictionary_encoded: Capability::True,
            has_bitmap_index: indexed,
        };
        self.add(name.into(), capabilities, BaseColumn::String(Rc::new(col)))
    }

    pub fn interval(mut self, interval: Interval) -> Self {
        self.interval = Some(interval);
        self
    }

    pub fn metadata(mut self, metadata: SegmentMetadata) -> Self {
        self.metadata = Some(metadata);
        self
    }

    fn add(mut self, name: String, capabilities: ColumnCapabilities, data: BaseColumn) -> Self {
        assert!(name != TIME_COLUMN, "__time is added via time_column");
        assert!(
            !self.columns.contains_key(&name),
            "duplicate column: {name}"
        );
        self.names.push(name.clone());
        self.columns.insert(name, ColumnHolder::new(capabilities, data));
        self
    }

    pub fn build(mut self) -> Segment {
        let timestamps = self.timestamps.expect("segment requires a time column");
        let num_rows = timestamps.len();
        for name in &self.names {
            assert_eq!(
                self.columns[name].data.len(),
                num_rows,
                "column {name} length differs from the time column"
            );
        }

        let interval = self.interval.unwrap_or_else(|| {
            if timestamps.is_empty() {
                Interval::new(0, 1)
            } else {
                Interval::new(timestamps[0], timestamps[num_rows - 1] + 1)
            }
        });

        let time_col = BaseColumn::Long(Rc::new(NumericColumn::from_values(timestamps)));
        self.names.insert(0, TIME_COLUMN.to_string());
        self.columns.insert(
            TIME_COLUMN.to_string(),
            ColumnHolder::new(ColumnCapabilities::numeric(ValueType::Long), time_col),
        );

        Segment {
            interval,
            num_rows: num_rows as u32,
            names: self.names,
            columns: self.columns,
            metadata: self.metadata,
        }
    }
}

impl Default for SegmentBuilder {
    fn default() -> Self {
        Self::new()
    }
}

fn split_nulls<T: Copy>(rows: Vec<Option<T>>, zero: T) -> (Vec<T>, RoaringBitmap) {
    let mut values = Vec::with_capacity(rows.len());
    let mut nulls = RoaringBitmap::new();
    for (row, value) in rows.into_iter().enumerate() {
        match value {
            Some(v) => values.push(v),
            None => {
                values.push(zero);
                nulls.insert(row as u32);
            }
        }
    }
    (values, nulls)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn segment() -> Segment {
        Segment::builder()
            .time_column(vec![0, 1_000, 2_000])
            .add_long("count", vec![Some(1), None, Some(3)])
            .add_string("dim", vec![Some("a"), Some("b"), Some("a")], true)
            .build()
    }

    #[test]
    fn test_builder_shape() {
        let s = segment();
        assert_eq!(s.num_rows(), 3);
        assert_eq!(s.interval(), Interval::new(0, 2_001));
        assert_eq!(s.available_dimensions(), vec!["dim"]);
        assert_eq!(s.available_metrics(), vec!["count"]);
        assert!(s.column(TIME_COLUMN).is_some());
        assert!(s.column("missing").is_none());
    }

    #[test]
    fn test_dimension_cardinality() {
        let s = segment();
        assert_eq!(s.dimension_cardinality("dim"), Some(2));
        assert_eq!(s.dimension_cardinality("count"), None);
        assert_eq!(s.dimension_cardinality("missing"), Some(1));
    }

    #[test]
    fn test_min_max_value() {
        let s = segment();
        assert_eq!(s.min_value("dim"), Some(Value::String("a".into())));
        assert_eq!(s.max_value("dim"), Some(Value::String("b".into())));
        assert_eq!(s.min_value("count"), None);
        assert_eq!(s.min_value("missing"), None);
    }

    #[test]
    fn test_metadata_absent() {
        let s = segment();
        assert!(matches!(
            s.metadata(),
            Err(crate::ScanError::Execution(ExecutionError::Unsupported(_)))
        ));

        let with = Segment::builder()
            .time_column(vec![0])
            .metadata(SegmentMetadata::default())
            .build();
        assert!(with.metadata().is_ok());
    }

    #[test]
    fn test_open_tracking() {
        let s = segment();
        let holder = s.column("count").unwrap();
        assert_eq!(holder.open_count(), 0);
        let _col = holder.open();
        assert_eq!(holder.open_count(), 1);
    }
}
