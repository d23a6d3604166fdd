//! Value model and row signatures

mod signature;
mod value;

pub use signature::{Capability, ColumnCapabilities, RowSignature};
pub use value::{format_float, parse_long, Value, ValueType};

/// Name of the mandatory, monotone non-decreasing time column.
pub const TIME_COLUMN: &str = "__time";
