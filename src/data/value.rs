//! Typed values and the conversions between them
//!
//! Selectors read column data through these conversions, so the coercion
//! rules here are contract, not convenience: string-to-number parsing
//! accepts integer text first, then float text truncated toward zero, and
//! float-to-text always carries a decimal point.

use serde::{Deserialize, Serialize};

/// Logical column types understood by the scan engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ValueType {
    Float,
    Double,
    Long,
    String,
    Complex,
    Unknown,
}

impl ValueType {
    pub fn is_numeric(&self) -> bool {
        matches!(self, ValueType::Float | ValueType::Double | ValueType::Long)
    }

    pub fn name(&self) -> &'static str {
        match self {
            ValueType::Float => "FLOAT",
            ValueType::Double => "DOUBLE",
            ValueType::Long => "LONG",
            ValueType::String => "STRING",
            ValueType::Complex => "COMPLEX",
            ValueType::Unknown => "UNKNOWN",
        }
    }
}

/// A single value read from a column or produced by an expression.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    Null,
    Float(f32),
    Double(f64),
    Long(i64),
    String(String),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Coerce to a long. String text parses as integer first, then as a
    /// float truncated toward zero (so `"1.0"` coerces to `1`).
    pub fn as_long(&self) -> Option<i64> {
        match self {
            Value::Null => None,
            Value::Long(v) => Some(*v),
            Value::Double(v) => Some(*v as i64),
            Value::Float(v) => Some(*v as i64),
            Value::String(s) => parse_long(s),
        }
    }

    pub fn as_double(&self) -> Option<f64> {
        match self {
            Value::Null => None,
            Value::Long(v) => Some(*v as f64),
            Value::Double(v) => Some(*v),
            Value::Float(v) => Some(*v as f64),
            Value::String(s) => s.trim().parse::<f64>().ok(),
        }
    }

    pub fn as_float(&self) -> Option<f32> {
        self.as_double().map(|v| v as f32)
    }

    /// Decimal text of the value. Floats keep a trailing `.0` for whole
    /// numbers so that long and float renderings stay distinguishable.
    pub fn as_text(&self) -> Option<String> {
        match self {
            Value::Null => None,
            Value::Long(v) => Some(v.to_string()),
            Value::Double(v) => Some(format_float(*v)),
            Value::Float(v) => Some(format_float(*v as f64)),
            Value::String(s) => Some(s.clone()),
        }
    }

    /// Convert to the declared type of a column. Unknown passes the value
    /// through untouched; complex always reads as null.
    pub fn coerce(&self, target: Option<ValueType>) -> Value {
        let Some(target) = target else {
            return self.clone();
        };
        if self.is_null() {
            return Value::Null;
        }
        match target {
            ValueType::Float => self.as_float().map(Value::Float).unwrap_or(Value::Null),
            ValueType::Double => self.as_double().map(Value::Double).unwrap_or(Value::Null),
            ValueType::Long => self.as_long().map(Value::Long).unwrap_or(Value::Null),
            ValueType::String => self.as_text().map(Value::String).unwrap_or(Value::Null),
            ValueType::Complex => Value::Null,
            ValueType::Unknown => self.clone(),
        }
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Long(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Double(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::String(v.to_string())
    }
}

/// Parse integer text, falling back to float text truncated toward zero.
pub fn parse_long(s: &str) -> Option<i64> {
    let s = s.trim();
    if let Ok(v) = s.parse::<i64>() {
        return Some(v);
    }
    s.parse::<f64>().ok().filter(|v| v.is_finite()).map(|v| v as i64)
}

/// Render a float the way numeric text is compared elsewhere in the
/// engine: whole values keep one fractional digit (`1` -> `"1.0"`).
pub fn format_float(v: f64) -> String {
    if v.is_finite() && v == v.trunc() && v.abs() < 1e16 {
        format!("{:.1}", v)
    } else {
        format!("{}", v)
    }
}
