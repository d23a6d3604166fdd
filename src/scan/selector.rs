//! Per-row value selectors
//!
//! A selector is bound once to `(column, position)` and then read many
//! times; the concrete reader struct is chosen per column type at bind
//! time so the per-row path carries no type dispatch.
//!
//! Name resolution is: virtual columns, then physical columns, then a
//! null selector. Unknown names are not an error; a filter on a
//! nonexistent column behaves as a filter on null.

use std::rc::Rc;

use crate::data::{parse_long, ColumnCapabilities, Value};
use crate::scan::cache::ColumnCache;
use crate::scan::offset::RowPointer;
use crate::scan::spec::NullPolicy;
use crate::scan::vcols::VirtualColumns;
use crate::segment::{BaseColumn, NumericColumn, StringDictColumn};

/// Type and nullability answers about columns visible through a factory.
pub trait ColumnInspector {
    fn column_capabilities(&self, name: &str) -> Option<ColumnCapabilities>;
}

/// Binds column names to per-row value selectors.
pub trait ColumnSelectorFactory: ColumnInspector {
    fn make_selector(&self, name: &str) -> Box<dyn ColumnValueSelector>;

    fn null_policy(&self) -> NullPolicy;
}

/// Reads the value of one column at the owning cursor's current row.
/// Values are valid only until the cursor's next advance.
pub trait ColumnValueSelector {
    fn get_long(&self) -> i64;

    fn get_double(&self) -> f64;

    fn get_float(&self) -> f32;

    fn get_object(&self) -> Value;

    fn is_null(&self) -> bool;
}

macro_rules! numeric_selector {
    ($name:ident, $prim:ty, $variant:ident) => {
        pub struct $name {
            col: Rc<NumericColumn<$prim>>,
            pos: RowPointer,
            policy: NullPolicy,
        }

        impl $name {
            pub fn new(col: Rc<NumericColumn<$prim>>, pos: RowPointer, policy: NullPolicy) -> Self {
                Self { col, pos, policy }
            }
        }

        impl ColumnValueSelector for $name {
            #[inline]
            fn get_long(&self) -> i64 {
                self.col.value_at(self.pos.get() as usize) as i64
            }

            #[inline]
            fn get_double(&self) -> f64 {
                self.col.value_at(self.pos.get() as usize) as f64
            }

            #[inline]
            fn get_float(&self) -> f32 {
                self.col.value_at(self.pos.get() as usize) as f32
            }

            fn get_object(&self) -> Value {
                let row = self.pos.get() as usize;
                if self.col.is_null(row) && self.policy == NullPolicy::SqlCompatible {
                    Value::Null
                } else {
                    Value::$variant(self.col.value_at(row))
                }
            }

            #[inline]
            fn is_null(&self) -> bool {
                self.policy == NullPolicy::SqlCompatible
                    && self.col.is_null(self.pos.get() as usize)
            }
        }
    };
}

numeric_selector!(LongColumnSelector, i64, Long);
numeric_selector!(DoubleColumnSelector, f64, Double);
numeric_selector!(FloatColumnSelector, f32, Float);

/// Selector over a dictionary-encoded string column. Numeric reads parse
/// the current value; unparseable text reads as zero.
pub struct StringColumnSelector {
    col: Rc<StringDictColumn>,
    pos: RowPointer,
}

impl StringColumnSelector {
    pub fn new(col: Rc<StringDictColumn>, pos: RowPointer) -> Self {
        Self { col, pos }
    }

    #[inline]
    fn value(&self) -> Option<&str> {
        self.col.value_at(self.pos.get() as usize)
    }

    /// Dictionary code of the current row (0 for null).
    #[inline]
    pub fn code(&self) -> u32 {
        self.col.code_at(self.pos.get() as usize)
    }
}

impl ColumnValueSelector for StringColumnSelector {
    fn get_long(&self) -> i64 {
        self.value().and_then(parse_long).unwrap_or(0)
    }

    fn get_double(&self) -> f64 {
        self.value()
            .and_then(|s| s.trim().parse::<f64>().ok())
            .unwrap_or(0.0)
    }

    fn get_float(&self) -> f32 {
        self.get_double() as f32
    }

    fn get_object(&self) -> Value {
        match self.value() {
            Some(s) => Value::String(s.to_string()),
            None => Value::Null,
        }
    }

    fn is_null(&self) -> bool {
        self.value().is_none()
    }
}

/// Selector for a column that exists nowhere. Reads are null (or the
/// numeric default, depending on policy), never an error.
pub struct NullSelector {
    policy: NullPolicy,
}

impl NullSelector {
    pub fn new(policy: NullPolicy) -> Self {
        Self { policy }
    }
}

impl ColumnValueSelector for NullSelector {
    fn get_long(&self) -> i64 {
        0
    }

    fn get_double(&self) -> f64 {
        0.0
    }

    fn get_float(&self) -> f32 {
        0.0
    }

    fn get_object(&self) -> Value {
        Value::Null
    }

    fn is_null(&self) -> bool {
        self.policy == NullPolicy::SqlCompatible
    }
}

/// Selector bound directly to an opened column.
pub fn selector_for_column(
    column: &BaseColumn,
    pos: RowPointer,
    policy: NullPolicy,
) -> Box<dyn ColumnValueSelector> {
    match column {
        BaseColumn::Long(col) => {
            Box::new(LongColumnSelector::new(Rc::clone(col), pos, policy))
        }
        BaseColumn::Double(col) => {
            Box::new(DoubleColumnSelector::new(Rc::clone(col), pos, policy))
        }
        BaseColumn::Float(col) => {
            Box::new(FloatColumnSelector::new(Rc::clone(col), pos, policy))
        }
        BaseColumn::String(col) => Box::new(StringColumnSelector::new(Rc::clone(col), pos)),
    }
}

/// Selector factory over a columnar segment: virtual columns first, then
/// physical columns through the holder's cache, then the null selector.
pub struct QueryableSelectorFactory<'a> {
    cache: Rc<ColumnCache<'a>>,
    virtual_columns: Rc<VirtualColumns>,
    pos: RowPointer,
    policy: NullPolicy,
}

impl<'a> QueryableSelectorFactory<'a> {
    pub fn new(
        cache: Rc<ColumnCache<'a>>,
        virtual_columns: Rc<VirtualColumns>,
        pos: RowPointer,
        policy: NullPolicy,
    ) -> Self {
        Self {
            cache,
            virtual_columns,
            pos,
            policy,
        }
    }
}

impl ColumnInspector for QueryableSelectorFactory<'_> {
    fn column_capabilities(&self, name: &str) -> Option<ColumnCapabilities> {
        if let Some(vc) = self.virtual_columns.get(name) {
            return vc.capabilities(self);
        }
        self.cache.segment().column_capabilities(name).cloned()
    }
}

impl ColumnSelectorFactory for QueryableSelectorFactory<'_> {
    fn make_selector(&self, name: &str) -> Box<dyn ColumnValueSelector> {
        if let Some(vc) = self.virtual_columns.get(name) {
            return vc.make_selector(self);
        }
        match self.cache.get(name) {
            Some(column) => selector_for_column(&column, self.pos.clone(), self.policy),
            None => Box::new(NullSelector::new(self.policy)),
        }
    }

    fn null_policy(&self) -> NullPolicy {
        self.policy
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use roaring::RoaringBitmap;

    fn long_col(values: Vec<i64>, null_rows: &[usize]) -> Rc<NumericColumn<i64>> {
        let mut nulls = RoaringBitmap::new();
        for &row in null_rows {
            nulls.insert(row as u32);
        }
        Rc::new(NumericColumn::new(values, nulls))
    }

    #[test]
    fn test_long_selector_reads_current_row() {
        let col = long_col(vec![10, 20, 30], &[]);
        let offset = crate::scan::Offset::ascending(3);
        let selector =
            LongColumnSelector::new(col, offset.position(), NullPolicy::SqlCompatible);

        let mut offset = offset;
        assert_eq!(selector.get_long(), 10);
        offset.advance();
        assert_eq!(selector.get_long(), 20);
        assert_eq!(selector.get_double(), 20.0);
        assert_eq!(selector.get_object(), Value::Long(20));
    }

    #[test]
    fn test_null_policy() {
        let col = long_col(vec![0, 7], &[0]);

        let pos = RowPointer::new();
        let sql = LongColumnSelector::new(Rc::clone(&col), pos.clone(), NullPolicy::SqlCompatible);
        assert!(sql.is_null());
        assert_eq!(sql.get_object(), Value::Null);

        let legacy =
            LongColumnSelector::new(col, pos, NullPolicy::ReplaceWithDefault);
        assert!(!legacy.is_null());
        assert_eq!(legacy.get_object(), Value::Long(0));
    }

    #[test]
    fn test_string_selector_numeric_reads() {
        let col = Rc::new(StringDictColumn::from_rows(
            &[Some("5"), Some("abc"), None],
            false,
        ));
        let pos = RowPointer::new();
        let selector = StringColumnSelector::new(col, pos.clone());

        assert_eq!(selector.get_long(), 5);
        assert_eq!(selector.get_object(), Value::String("5".into()));
        assert!(!selector.is_null());
    }

    #[test]
    fn test_null_selector() {
        let s = NullSelector::new(NullPolicy::SqlCompatible);
        assert!(s.is_null());
        assert_eq!(s.get_object(), Value::Null);
        assert_eq!(s.get_long(), 0);

        let s = NullSelector::new(NullPolicy::ReplaceWithDefault);
        assert!(!s.is_null());
    }
}
