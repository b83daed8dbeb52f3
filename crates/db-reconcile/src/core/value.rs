//! SQL value types for database-agnostic row handling.
//!
//! Values read from any engine are decoded into [`SqlValue`]. The sync engine
//! compares rows through [`SqlValue::canonical_text`] so that the same logical
//! value read from different engines (a Postgres `true` and a MySQL `1`) hashes
//! identically.

use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use uuid::Uuid;

use crate::core::schema::EngineKind;

/// SQL value enum for type-safe row handling.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum SqlValue {
    /// NULL.
    Null,

    /// Boolean value.
    Bool(bool),

    /// Any signed integer width.
    I64(i64),

    /// Floating point (real, double precision).
    F64(f64),

    /// Text/string data.
    Text(String),

    /// Binary data.
    Bytes(Vec<u8>),

    /// UUID value.
    Uuid(Uuid),

    /// Decimal value with arbitrary precision.
    Decimal(Decimal),

    /// Date without time component.
    Date(NaiveDate),

    /// Time without date component.
    Time(NaiveTime),

    /// Timestamp without timezone.
    DateTime(NaiveDateTime),

    /// Timestamp with timezone offset.
    DateTimeOffset(DateTime<FixedOffset>),

    /// JSON document.
    Json(serde_json::Value),
}

impl SqlValue {
    /// Check if this value is NULL.
    #[must_use]
    pub fn is_null(&self) -> bool {
        matches!(self, SqlValue::Null)
    }

    /// Engine-independent text form used for keys and content digests.
    ///
    /// Returns `None` for NULL so callers can distinguish NULL from the empty
    /// string.
    pub fn canonical_text(&self) -> Option<String> {
        let text = match self {
            SqlValue::Null => return None,
            SqlValue::Bool(v) => (if *v { "1" } else { "0" }).to_string(),
            SqlValue::I64(v) => v.to_string(),
            SqlValue::F64(v) => canonical_float(*v),
            SqlValue::Text(v) => v.clone(),
            SqlValue::Bytes(v) => hex::encode(v),
            SqlValue::Uuid(v) => v.hyphenated().to_string(),
            SqlValue::Decimal(v) => v.normalize().to_string(),
            SqlValue::Date(v) => v.format("%Y-%m-%d").to_string(),
            SqlValue::Time(v) => v.format("%H:%M:%S%.f").to_string(),
            SqlValue::DateTime(v) => v.format("%Y-%m-%dT%H:%M:%S%.f").to_string(),
            SqlValue::DateTimeOffset(v) => v
                .with_timezone(&Utc)
                .format("%Y-%m-%dT%H:%M:%S%.fZ")
                .to_string(),
            SqlValue::Json(v) => v.to_string(),
        };
        Some(text)
    }

    /// Render the value as a SQL literal for the given engine.
    ///
    /// Strings are escaped by doubling single quotes; MySQL additionally
    /// escapes backslashes since it treats them as escape characters by default.
    pub fn to_sql_literal(&self, engine: EngineKind) -> String {
        match self {
            SqlValue::Null => "NULL".to_string(),
            SqlValue::Bool(v) => match engine {
                EngineKind::Postgres => (if *v { "TRUE" } else { "FALSE" }).to_string(),
                _ => (if *v { "1" } else { "0" }).to_string(),
            },
            SqlValue::I64(v) => v.to_string(),
            SqlValue::F64(v) => {
                if v.is_finite() {
                    v.to_string()
                } else if engine == EngineKind::Postgres {
                    format!("'{}'::float8", v)
                } else {
                    "NULL".to_string()
                }
            }
            SqlValue::Decimal(v) => v.to_string(),
            SqlValue::Text(v) => quote_string(v, engine),
            SqlValue::Bytes(v) => match engine {
                EngineKind::Postgres => format!("'\\x{}'::bytea", hex::encode(v)),
                _ => format!("X'{}'", hex::encode(v)),
            },
            SqlValue::Uuid(v) => format!("'{}'", v.hyphenated()),
            SqlValue::Date(_)
            | SqlValue::Time(_)
            | SqlValue::DateTime(_)
            | SqlValue::DateTimeOffset(_) => {
                let text = match self {
                    // MySQL DATETIME literals carry no offset.
                    SqlValue::DateTime(v) => v.format("%Y-%m-%d %H:%M:%S%.f").to_string(),
                    SqlValue::DateTimeOffset(v) if engine.is_mysql_family() => v
                        .with_timezone(&Utc)
                        .format("%Y-%m-%d %H:%M:%S%.f")
                        .to_string(),
                    SqlValue::DateTimeOffset(v) => v.format("%Y-%m-%d %H:%M:%S%.f%:z").to_string(),
                    other => other.canonical_text().unwrap_or_default(),
                };
                format!("'{}'", text)
            }
            SqlValue::Json(v) => quote_string(&v.to_string(), engine),
        }
    }
}

fn canonical_float(v: f64) -> String {
    if v.is_finite() && v.fract() == 0.0 && v.abs() < 1e15 {
        format!("{}", v as i64)
    } else {
        v.to_string()
    }
}

fn quote_string(s: &str, engine: EngineKind) -> String {
    let escaped = s.replace('\'', "''");
    if engine.is_mysql_family() {
        format!("'{}'", escaped.replace('\\', "\\\\"))
    } else {
        format!("'{}'", escaped)
    }
}

impl From<bool> for SqlValue {
    fn from(v: bool) -> Self {
        SqlValue::Bool(v)
    }
}

impl From<i32> for SqlValue {
    fn from(v: i32) -> Self {
        SqlValue::I64(v as i64)
    }
}

impl From<i64> for SqlValue {
    fn from(v: i64) -> Self {
        SqlValue::I64(v)
    }
}

impl From<f64> for SqlValue {
    fn from(v: f64) -> Self {
        SqlValue::F64(v)
    }
}

impl From<String> for SqlValue {
    fn from(v: String) -> Self {
        SqlValue::Text(v)
    }
}

impl From<&str> for SqlValue {
    fn from(v: &str) -> Self {
        SqlValue::Text(v.to_string())
    }
}

impl From<Vec<u8>> for SqlValue {
    fn from(v: Vec<u8>) -> Self {
        SqlValue::Bytes(v)
    }
}

impl From<Uuid> for SqlValue {
    fn from(v: Uuid) -> Self {
        SqlValue::Uuid(v)
    }
}

impl From<Decimal> for SqlValue {
    fn from(v: Decimal) -> Self {
        SqlValue::Decimal(v)
    }
}

impl From<NaiveDate> for SqlValue {
    fn from(v: NaiveDate) -> Self {
        SqlValue::Date(v)
    }
}

impl From<NaiveDateTime> for SqlValue {
    fn from(v: NaiveDateTime) -> Self {
        SqlValue::DateTime(v)
    }
}

impl From<DateTime<FixedOffset>> for SqlValue {
    fn from(v: DateTime<FixedOffset>) -> Self {
        SqlValue::DateTimeOffset(v)
    }
}

impl<T: Into<SqlValue>> From<Option<T>> for SqlValue {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(SqlValue::Null)
    }
}

/// One row of values, aligned with a column list.
pub type Row = Vec<SqlValue>;

/// Result of a row-returning query.
#[derive(Debug, Clone, Default, Serialize)]
pub struct QueryResult {
    /// Column names in result order.
    pub columns: Vec<String>,
    /// Rows aligned with `columns`.
    pub rows: Vec<Row>,
    /// Number of rows returned.
    pub row_count: usize,
    /// Wall-clock execution time.
    pub execution_time_ms: u64,
}

impl QueryResult {
    /// First value of the first row, if any.
    pub fn scalar(&self) -> Option<&SqlValue> {
        self.rows.first().and_then(|r| r.first())
    }
}

/// Result of a statement that does not return rows.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ExecResult {
    /// Rows affected as reported by the engine.
    pub rows_affected: u64,
}
