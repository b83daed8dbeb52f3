//! Schema normalization: engine-native introspection rows to [`TableSchema`].
//!
//! Drivers fetch raw rows (one per column, one per index column, one per FK
//! column) and hand them over unprocessed. Everything engine-specific about
//! type spelling lives in the per-engine submodules; ordering, grouping and
//! primary key derivation are shared.

mod mysql;
mod postgres;
mod sqlite;

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::core::schema::{ColumnInfo, EngineKind, ForeignKeyInfo, IndexInfo, TableSchema};
use crate::error::{ReconcileError, Result};

/// One column row from `information_schema.columns` / `pragma_table_info`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawColumn {
    pub schema: String,
    pub table: String,
    pub name: String,
    pub ordinal_position: i64,
    /// Generic type name (`character varying`, `int`, declared SQLite type).
    pub data_type: String,
    /// Postgres `udt_name` (`int4`, `varchar`, `_text`).
    pub udt_name: Option<String>,
    /// MySQL `COLUMN_TYPE` (`int(11) unsigned`, `enum('a','b')`).
    pub column_type: Option<String>,
    pub character_maximum_length: Option<i64>,
    pub numeric_precision: Option<i64>,
    pub numeric_scale: Option<i64>,
    pub is_nullable: bool,
    pub column_default: Option<String>,
    pub is_primary_key: bool,
    pub is_unique: bool,
    /// Postgres `is_identity`, MySQL `EXTRA` containing `auto_increment`.
    pub is_identity: bool,
    pub comment: Option<String>,
}

/// One (index, column) row.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawIndexColumn {
    pub index_name: String,
    pub column_name: String,
    /// 1-based position within the index.
    pub seq_in_index: i64,
    pub is_unique: bool,
    pub is_primary: bool,
    pub index_type: Option<String>,
}

/// One (constraint, column) row of a foreign key.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawForeignKeyColumn {
    pub constraint_name: String,
    pub column_name: String,
    /// 1-based position within the constraint.
    pub ordinal_position: i64,
    pub ref_schema: String,
    pub ref_table: String,
    pub ref_column: String,
    pub on_delete: Option<String>,
    pub on_update: Option<String>,
}

/// Introspection result for exactly one table.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IntrospectionRows {
    pub columns: Vec<RawColumn>,
    pub indexes: Vec<RawIndexColumn>,
    pub foreign_keys: Vec<RawForeignKeyColumn>,
}

/// Convert introspection rows into a canonical [`TableSchema`].
///
/// # Errors
///
/// - `TableNotFound` when no column rows are present
/// - `Introspection` when rows belong to more than one table
pub fn normalize(
    engine: EngineKind,
    schema: &str,
    table: &str,
    rows: &IntrospectionRows,
) -> Result<TableSchema> {
    let first = rows
        .columns
        .first()
        .ok_or_else(|| ReconcileError::TableNotFound {
            schema: schema.to_string(),
            table: table.to_string(),
        })?;

    if let Some(stray) = rows
        .columns
        .iter()
        .find(|c| c.schema != first.schema || c.table != first.table)
    {
        return Err(ReconcileError::Introspection(format!(
            "rows for {}.{} mixed with {}.{}",
            first.schema, first.table, stray.schema, stray.table
        )));
    }

    let mut raw_columns: Vec<&RawColumn> = rows.columns.iter().collect();
    raw_columns.sort_by_key(|c| c.ordinal_position);

    let columns: Vec<ColumnInfo> = raw_columns
        .iter()
        .map(|c| {
            let serial = engine == EngineKind::Postgres
                && c.column_default.as_deref().is_some_and(postgres::is_serial_default);
            ColumnInfo {
                name: c.name.clone(),
                data_type: normalize_type(engine, c),
                nullable: c.is_nullable,
                default_value: if serial { None } else { c.column_default.clone() },
                is_primary_key: c.is_primary_key,
                is_unique: c.is_unique && !c.is_primary_key,
                is_identity: c.is_identity || serial,
                comment: c.comment.clone().filter(|s| !s.is_empty()),
            }
        })
        .collect();

    let primary_key = columns
        .iter()
        .filter(|c| c.is_primary_key)
        .map(|c| c.name.clone())
        .collect();

    Ok(TableSchema {
        schema: first.schema.clone(),
        name: first.table.clone(),
        columns,
        indexes: group_indexes(&rows.indexes),
        foreign_keys: group_foreign_keys(&rows.foreign_keys),
        primary_key,
    })
}

fn normalize_type(engine: EngineKind, column: &RawColumn) -> String {
    match engine {
        EngineKind::Postgres => postgres::column_type(column),
        EngineKind::Mysql | EngineKind::Mariadb => mysql::column_type(column),
        EngineKind::Sqlite => sqlite::column_type(column),
    }
}

/// Group index rows by name, ordering columns by position. Primary key
/// indexes are dropped: the table's primary key already represents them.
fn group_indexes(rows: &[RawIndexColumn]) -> Vec<IndexInfo> {
    let mut grouped: BTreeMap<&str, Vec<&RawIndexColumn>> = BTreeMap::new();
    for row in rows.iter().filter(|r| !r.is_primary) {
        grouped.entry(row.index_name.as_str()).or_default().push(row);
    }

    grouped
        .into_iter()
        .map(|(name, mut cols)| {
            cols.sort_by_key(|c| c.seq_in_index);
            IndexInfo {
                name: name.to_string(),
                columns: cols.iter().map(|c| c.column_name.clone()).collect(),
                is_unique: cols[0].is_unique,
                is_primary: false,
                index_type: cols[0]
                    .index_type
                    .as_deref()
                    .map(str::to_lowercase)
                    .filter(|t| !t.is_empty())
                    .unwrap_or_else(|| "btree".to_string()),
            }
        })
        .collect()
}

fn group_foreign_keys(rows: &[RawForeignKeyColumn]) -> Vec<ForeignKeyInfo> {
    let mut grouped: BTreeMap<&str, Vec<&RawForeignKeyColumn>> = BTreeMap::new();
    for row in rows {
        grouped
            .entry(row.constraint_name.as_str())
            .or_default()
            .push(row);
    }

    grouped
        .into_iter()
        .map(|(name, mut cols)| {
            cols.sort_by_key(|c| c.ordinal_position);
            let head = cols[0];
            ForeignKeyInfo {
                name: name.to_string(),
                columns: cols.iter().map(|c| c.column_name.clone()).collect(),
                ref_schema: head.ref_schema.clone(),
                ref_table: head.ref_table.clone(),
                ref_columns: cols.iter().map(|c| c.ref_column.clone()).collect(),
                on_delete: normalize_action(head.on_delete.as_deref()),
                on_update: normalize_action(head.on_update.as_deref()),
            }
        })
        .collect()
}

/// Upper-case FK action words; `NO_ACTION` and empty become `NO ACTION`.
pub(crate) fn normalize_action(action: Option<&str>) -> String {
    match action.map(str::trim) {
        None | Some("") => "NO ACTION".to_string(),
        Some(a) => a.replace('_', " ").to_uppercase(),
    }
}
