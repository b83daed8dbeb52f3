//! SQLite type spelling.

use super::RawColumn;

/// Declared type, or `TEXT` for columns declared without one.
pub(super) fn column_type(column: &RawColumn) -> String {
    let declared = column.data_type.trim();
    if declared.is_empty() {
        "TEXT".to_string()
    } else {
        declared.to_string()
    }
}
