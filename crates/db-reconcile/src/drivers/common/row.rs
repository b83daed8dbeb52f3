//! Typed access to decoded catalog rows.
//!
//! The sqlx drivers read catalog queries through the same generic decoder as
//! data rows, then pick fields out of the resulting [`Row`] with these helpers.

use rust_decimal::prelude::ToPrimitive;

use crate::core::value::{Row, SqlValue};
use crate::error::{ReconcileError, Result};

/// Nullable text field. Integers are rendered as text.
pub fn opt_text(row: &Row, idx: usize) -> Option<String> {
    match row.get(idx) {
        None | Some(SqlValue::Null) => None,
        Some(SqlValue::Text(s)) => Some(s.clone()),
        Some(SqlValue::Bytes(b)) => Some(String::from_utf8_lossy(b).into_owned()),
        Some(other) => other.canonical_text(),
    }
}

/// Required text field.
pub fn text(row: &Row, idx: usize) -> Result<String> {
    opt_text(row, idx).ok_or_else(|| {
        ReconcileError::Introspection(format!("expected text in catalog column {}", idx))
    })
}

/// Nullable integer field. Numeric text is parsed.
pub fn opt_int(row: &Row, idx: usize) -> Option<i64> {
    match row.get(idx) {
        Some(SqlValue::I64(v)) => Some(*v),
        Some(SqlValue::Bool(b)) => Some(i64::from(*b)),
        Some(SqlValue::Decimal(d)) => d.to_i64(),
        Some(SqlValue::Text(s)) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Required integer field.
pub fn int(row: &Row, idx: usize) -> Result<i64> {
    opt_int(row, idx).ok_or_else(|| {
        ReconcileError::Introspection(format!("expected integer in catalog column {}", idx))
    })
}

/// Boolean field; NULL and zero are false.
pub fn flag(row: &Row, idx: usize) -> bool {
    opt_int(row, idx).map_or(false, |v| v != 0)
}
