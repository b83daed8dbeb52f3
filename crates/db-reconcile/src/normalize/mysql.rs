//! MySQL / MariaDB type spelling.

use super::RawColumn;

/// `COLUMN_TYPE` verbatim (it already carries length, precision, unsigned
/// and enum members); `DATA_TYPE` when it is missing.
pub(super) fn column_type(column: &RawColumn) -> String {
    column
        .column_type
        .as_deref()
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .unwrap_or(&column.data_type)
        .to_string()
}
