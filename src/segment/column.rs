//! Physical column storage
//!
//! Columns are immutable, type-specific vectors. Nulls are tracked as a
//! roaring bitmap of null row ids, the same representation the filter
//! indexes use. String columns are dictionary-encoded with code 0
//! reserved for null, and can carry one roaring bitmap per dictionary
//! value for use as a filter index.

use std::rc::Rc;

use roaring::RoaringBitmap;

use crate::data::{format_float, Value, ValueType};

/// Fixed-length numeric column. Null rows hold the type's zero in the
/// value vector; the null bitmap is authoritative.
#[derive(Debug)]
pub struct NumericColumn<T: Copy> {
    values: Vec<T>,
    nulls: RoaringBitmap,
}

impl<T: Copy> NumericColumn<T> {
    pub fn new(values: Vec<T>, nulls: RoaringBitmap) -> Self {
        debug_assert!(
            nulls.max().map(|m| (m as usize) < values.len()).unwrap_or(true),
            "null bitmap addresses rows past the column"
        );
        Self { values, nulls }
    }

    /// Column with no null rows.
    pub fn from_values(values: Vec<T>) -> Self {
        Self {
            values,
            nulls: RoaringBitmap::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    #[inline]
    pub fn is_null(&self, row: usize) -> bool {
        self.nulls.contains(row as u32)
    }

    /// Raw value at a row, null or not.
    #[inline]
    pub fn value_at(&self, row: usize) -> T {
        self.values[row]
    }

    #[inline]
    pub fn get(&self, row: usize) -> Option<T> {
        if self.is_null(row) {
            None
        } else {
            Some(self.values[row])
        }
    }

    pub fn values(&self) -> &[T] {
        &self.values
    }

    pub fn has_nulls(&self) -> bool {
        !self.nulls.is_empty()
    }
}

/// Dictionary-encoded string column. The dictionary holds distinct values
/// in sorted order; per-row codes use 0 as the null sentinel and
/// `code - 1` as the dictionary index otherwise.
#[derive(Debug)]
pub struct StringDictColumn {
    dict: Vec<String>,
    codes: Vec<u32>,
    value_bitmaps: Option<Vec<Rc<RoaringBitmap>>>,
    null_bitmap: Option<Rc<RoaringBitmap>>,
}

impl StringDictColumn {
    /// Build from per-row optional values, optionally constructing one
    /// bitmap per dictionary value (plus a null bitmap).
    pub fn from_rows(rows: &[Option<&str>], indexed: bool) -> Self {
        let mut dict: Vec<String> = rows
            .iter()
            .flatten()
            .map(|s| s.to_string())
            .collect();
        dict.sort_unstable();
        dict.dedup();

        let codes: Vec<u32> = rows
            .iter()
            .map(|row| match row {
                None => 0,
                Some(s) => {
                    let idx = dict
                        .binary_search_by(|d| d.as_str().cmp(s))
                        .expect("dictionary misses an indexed value");
                    (idx + 1) as u32
                }
            })
            .collect();

        let (value_bitmaps, null_bitmap) = if indexed {
            let mut bitmaps = vec![RoaringBitmap::new(); dict.len()];
            let mut nulls = RoaringBitmap::new();
            for (row, &code) in codes.iter().enumerate() {
                if code == 0 {
                    nulls.insert(row as u32);
                } else {
                    bitmaps[(code - 1) as usize].insert(row as u32);
                }
            }
            (
                Some(bitmaps.into_iter().map(Rc::new).collect()),
                Some(Rc::new(nulls)),
            )
        } else {
            (None, None)
        };

        Self {
            dict,
            codes,
            value_bitmaps,
            null_bitmap,
        }
    }

    pub fn len(&self) -> usize {
        self.codes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.codes.is_empty()
    }

    pub fn cardinality(&self) -> usize {
        self.dict.len()
    }

    #[inline]
    pub fn code_at(&self, row: usize) -> u32 {
        self.codes[row]
    }

    #[inline]
    pub fn value_at(&self, row: usize) -> Option<&str> {
        match self.codes[row] {
            0 => None,
            code => Some(self.dict[(code - 1) as usize].as_str()),
        }
    }

    /// Dictionary entry by index (sorted order).
    pub fn dict_value(&self, idx: usize) -> &str {
        &self.dict[idx]
    }

    /// Dictionary code for a value, if present. The returned code is the
    /// row-level code (1-based), comparable against `code_at`.
    pub fn lookup_code(&self, value: &str) -> Option<u32> {
        self.dict
            .binary_search_by(|d| d.as_str().cmp(value))
            .ok()
            .map(|idx| (idx + 1) as u32)
    }

    pub fn has_bitmap_index(&self) -> bool {
        self.value_bitmaps.is_some()
    }

    /// Bitmap of rows holding `value` (`None` = null rows). Returns `None`
    /// when the column carries no index; a value absent from the
    /// dictionary yields an empty bitmap.
    pub fn bitmap_for(&self, value: Option<&str>) -> Option<Rc<RoaringBitmap>> {
        let bitmaps = self.value_bitmaps.as_ref()?;
        match value {
            None => self.null_bitmap.clone(),
            Some(v) => match self.lookup_code(v) {
                Some(code) => Some(Rc::clone(&bitmaps[(code - 1) as usize])),
                None => Some(Rc::new(RoaringBitmap::new())),
            },
        }
    }
}

/// An opened column, shared by every selector bound to it.
#[derive(Debug, Clone)]
pub enum BaseColumn {
    Long(Rc<NumericColumn<i64>>),
    Double(Rc<NumericColumn<f64>>),
    Float(Rc<NumericColumn<f32>>),
    String(Rc<StringDictColumn>),
}

impl BaseColumn {
    pub fn len(&self) -> usize {
        match self {
            BaseColumn::Long(c) => c.len(),
            BaseColumn::Double(c) => c.len(),
            BaseColumn::Float(c) => c.len(),
            BaseColumn::String(c) => c.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn value_type(&self) -> ValueType {
        match self {
            BaseColumn::Long(_) => ValueType::Long,
            BaseColumn::Double(_) => ValueType::Double,
            BaseColumn::Float(_) => ValueType::Float,
            BaseColumn::String(_) => ValueType::String,
        }
    }

    pub fn value_at(&self, row: usize) -> Value {
        match self {
            BaseColumn::Long(c) => c.get(row).map(Value::Long).unwrap_or(Value::Null),
            BaseColumn::Double(c) => c.get(row).map(Value::Double).unwrap_or(Value::Null),
            BaseColumn::Float(c) => c.get(row).map(Value::Float).unwrap_or(Value::Null),
            BaseColumn::String(c) => c
                .value_at(row)
                .map(|s| Value::String(s.to_string()))
                .unwrap_or(Value::Null),
        }
    }

    /// Decimal text of the value at a row, for string-typed reads.
    pub fn text_at(&self, row: usize) -> Option<String> {
        match self {
            BaseColumn::Long(c) => c.get(row).map(|v| v.to_string()),
            BaseColumn::Double(c) => c.get(row).map(format_float),
            BaseColumn::Float(c) => c.get(row).map(|v| format_float(v as f64)),
            BaseColumn::String(c) => c.value_at(row).map(|s| s.to_string()),
        }
    }

    pub fn as_long_column(&self) -> Option<Rc<NumericColumn<i64>>> {
        match self {
            BaseColumn::Long(c) => Some(Rc::clone(c)),
            _ => None,
        }
    }

    pub fn as_string_column(&self) -> Option<Rc<StringDictColumn>> {
        match self {
            BaseColumn::String(c) => Some(Rc::clone(c)),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_numeric_column_nulls() {
        let mut nulls = RoaringBitmap::new();
        nulls.insert(1);
        let col = NumericColumn::new(vec![10i64, 0, 30], nulls);

        assert_eq!(col.get(0), Some(10));
        assert_eq!(col.get(1), None);
        assert_eq!(col.get(2), Some(30));
        assert!(!col.is_null(0));
        assert!(col.is_null(1));
        assert!(col.has_nulls());
        assert!(!NumericColumn::from_values(vec![1i64]).has_nulls());
    }

    #[test]
    fn test_string_dict_encoding() {
        let col = StringDictColumn::from_rows(&[Some("b"), None, Some("a"), Some("b")], false);

        assert_eq!(col.cardinality(), 2);
        assert_eq!(col.value_at(0), Some("b"));
        assert_eq!(col.value_at(1), None);
        assert_eq!(col.value_at(2), Some("a"));
        assert_eq!(col.lookup_code("a"), Some(1));
        assert_eq!(col.lookup_code("b"), Some(2));
        assert_eq!(col.lookup_code("z"), None);
        assert!(!col.has_bitmap_index());
        assert!(col.bitmap_for(Some("a")).is_none());
    }

    #[test]
    fn test_string_dict_bitmaps() {
        let col = StringDictColumn::from_rows(&[Some("b"), None, Some("a"), Some("b")], true);

        let a = col.bitmap_for(Some("a")).unwrap();
        assert_eq!(a.iter().collect::<Vec<_>>(), vec![2]);

        let b = col.bitmap_for(Some("b")).unwrap();
        assert_eq!(b.iter().collect::<Vec<_>>(), vec![0, 3]);

        let nulls = col.bitmap_for(None).unwrap();
        assert_eq!(nulls.iter().collect::<Vec<_>>(), vec![1]);

        let missing = col.bitmap_for(Some("z")).unwrap();
        assert!(missing.is_empty());
    }
}
