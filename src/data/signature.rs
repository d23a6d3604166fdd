//! Row signatures and column capabilities

use serde::{Deserialize, Serialize};

use super::value::ValueType;

/// Tri-state answer for capabilities that may be unknowable up front.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Capability {
    True,
    False,
    Unknown,
}

impl Capability {
    pub fn is_true(&self) -> bool {
        matches!(self, Capability::True)
    }

    pub fn is_maybe_true(&self) -> bool {
        matches!(self, Capability::True | Capability::Unknown)
    }

    pub fn is_unknown(&self) -> bool {
        matches!(self, Capability::Unknown)
    }
}

/// What a column handle knows about itself before it is opened.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnCapabilities {
    pub value_type: ValueType,
    pub has_multiple_values: Capability,
    pub dictionary_encoded: Capability,
    pub has_bitmap_index: bool,
}

impl ColumnCapabilities {
    /// Capabilities of a plain numeric column.
    pub fn numeric(value_type: ValueType) -> Self {
        debug_assert!(value_type.is_numeric());
        Self {
            value_type,
            has_multiple_values: Capability::False,
            dictionary_encoded: Capability::False,
            has_bitmap_index: false,
        }
    }

    /// Capabilities derived from a declared row signature entry, where
    /// nothing has been observed yet: strings might turn out to be
    /// multi-valued, complex columns are opaque.
    pub fn from_declared(value_type: ValueType) -> Self {
        match value_type {
            ValueType::String => Self {
                value_type,
                has_multiple_values: Capability::Unknown,
                dictionary_encoded: Capability::Unknown,
                has_bitmap_index: false,
            },
            ValueType::Complex => Self {
                value_type,
                has_multiple_values: Capability::False,
                dictionary_encoded: Capability::Unknown,
                has_bitmap_index: false,
            },
            _ => Self::numeric(value_type),
        }
    }
}

/// Ordered sequence of `(name, declared type)` pairs. A `None` type means
/// the column is declared but its type is unknown.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RowSignature {
    columns: Vec<(String, Option<ValueType>)>,
}

impl RowSignature {
    pub fn builder() -> RowSignatureBuilder {
        RowSignatureBuilder { columns: Vec::new() }
    }

    pub fn column_names(&self) -> impl Iterator<Item = &str> {
        self.columns.iter().map(|(name, _)| name.as_str())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.columns.iter().any(|(n, _)| n == name)
    }

    /// Declared type of a column; outer `None` means the column is not in
    /// the signature at all.
    pub fn column_type(&self, name: &str) -> Option<Option<ValueType>> {
        self.columns
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, t)| *t)
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }
}

pub struct RowSignatureBuilder {
    columns: Vec<(String, Option<ValueType>)>,
}

impl RowSignatureBuilder {
    pub fn add(mut self, name: impl Into<String>, value_type: Option<ValueType>) -> Self {
        self.columns.push((name.into(), value_type));
        self
    }

    pub fn build(self) -> RowSignature {
        RowSignature { columns: self.columns }
    }
}
