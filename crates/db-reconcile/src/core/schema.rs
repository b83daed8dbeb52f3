//! Canonical schema metadata for tables, columns, indexes, and foreign keys.
//!
//! These types are produced by [`crate::normalize`] from engine-native
//! introspection rows and consumed by the diff engine. They are immutable once
//! produced: the diff engine never edits a `TableSchema`, it only compares two.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{ReconcileError, Result};

/// Database engine family.
///
/// MariaDB shares the MySQL driver and dialect; it is kept as its own variant
/// so connection identifiers and version reporting stay accurate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EngineKind {
    Postgres,
    Mysql,
    Mariadb,
    Sqlite,
}

impl EngineKind {
    /// Short engine name used in logs and connection ids.
    pub fn as_str(&self) -> &'static str {
        match self {
            EngineKind::Postgres => "postgres",
            EngineKind::Mysql => "mysql",
            EngineKind::Mariadb => "mariadb",
            EngineKind::Sqlite => "sqlite",
        }
    }

    /// Whether the engine speaks the MySQL dialect.
    pub fn is_mysql_family(&self) -> bool {
        matches!(self, EngineKind::Mysql | EngineKind::Mariadb)
    }
}

impl fmt::Display for EngineKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EngineKind {
    type Err = ReconcileError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "postgres" | "postgresql" | "pg" => Ok(EngineKind::Postgres),
            "mysql" => Ok(EngineKind::Mysql),
            "mariadb" => Ok(EngineKind::Mariadb),
            "sqlite" | "sqlite3" => Ok(EngineKind::Sqlite),
            other => Err(ReconcileError::Config(format!(
                "Unknown database type: '{}'. Supported types: postgres, mysql, mariadb, sqlite",
                other
            ))),
        }
    }
}

/// Column definition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnInfo {
    /// Column name.
    pub name: String,

    /// Normalized data type, with length/precision folded in
    /// (e.g. `varchar(255)`, `numeric(10,2)`, `int(11) unsigned`).
    pub data_type: String,

    /// Whether the column accepts NULL.
    pub nullable: bool,

    /// Default expression as reported by the engine.
    pub default_value: Option<String>,

    /// Whether the column is part of the primary key.
    pub is_primary_key: bool,

    /// Whether the column carries a single-column unique constraint.
    pub is_unique: bool,

    /// Whether the engine generates the column's values: Postgres identity
    /// and serial columns, MySQL `AUTO_INCREMENT`. Serial sequence defaults
    /// are folded into this flag rather than kept in `default_value`.
    #[serde(default)]
    pub is_identity: bool,

    /// Column comment, if any.
    pub comment: Option<String>,
}

/// Secondary index definition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexInfo {
    /// Index name.
    pub name: String,

    /// Indexed columns in index order.
    pub columns: Vec<String>,

    /// Whether the index is unique.
    pub is_unique: bool,

    /// Whether this index backs the primary key.
    pub is_primary: bool,

    /// Access method, lower-cased (`btree`, `hash`, `gin`, ...).
    pub index_type: String,
}

/// Foreign key constraint definition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForeignKeyInfo {
    /// Constraint name.
    pub name: String,

    /// Local columns in constraint order.
    pub columns: Vec<String>,

    /// Referenced schema.
    pub ref_schema: String,

    /// Referenced table.
    pub ref_table: String,

    /// Referenced columns, aligned with `columns`.
    pub ref_columns: Vec<String>,

    /// ON DELETE action (`CASCADE`, `SET NULL`, `NO ACTION`, ...).
    pub on_delete: String,

    /// ON UPDATE action.
    pub on_update: String,
}

/// Canonical table metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableSchema {
    /// Schema name.
    pub schema: String,

    /// Table name.
    pub name: String,

    /// Columns ordered by ordinal position.
    pub columns: Vec<ColumnInfo>,

    /// Secondary indexes, primary key index excluded.
    pub indexes: Vec<IndexInfo>,

    /// Foreign key constraints.
    pub foreign_keys: Vec<ForeignKeyInfo>,

    /// Primary key column names in column order.
    pub primary_key: Vec<String>,
}

impl TableSchema {
    /// Get the fully qualified table name.
    pub fn full_name(&self) -> String {
        format!("{}.{}", self.schema, self.name)
    }

    /// Check if the table has a primary key.
    pub fn has_pk(&self) -> bool {
        !self.primary_key.is_empty()
    }

    /// Look up a column by name.
    pub fn column(&self, name: &str) -> Option<&ColumnInfo> {
        self.columns.iter().find(|c| c.name == name)
    }

    /// Look up an index by name.
    pub fn index(&self, name: &str) -> Option<&IndexInfo> {
        self.indexes.iter().find(|i| i.name == name)
    }

    /// Look up a foreign key by name.
    pub fn foreign_key(&self, name: &str) -> Option<&ForeignKeyInfo> {
        self.foreign_keys.iter().find(|f| f.name == name)
    }

    /// Column names in ordinal order.
    pub fn column_names(&self) -> Vec<String> {
        self.columns.iter().map(|c| c.name.clone()).collect()
    }

    /// Whether a single-column unique index covers `column`.
    pub fn has_unique_index_on(&self, column: &str) -> bool {
        self.indexes
            .iter()
            .any(|i| i.is_unique && i.columns.len() == 1 && i.columns[0] == column)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_test_column(name: &str, data_type: &str) -> ColumnInfo {
        ColumnInfo {
            name: name.to_string(),
            data_type: data_type.to_string(),
            nullable: true,
            default_value: None,
            is_primary_key: false,
            is_unique: false,
            is_identity: false,
            comment: None,
        }
    }

    #[test]
    fn test_engine_kind_from_str() {
        assert_eq!("postgresql".parse::<EngineKind>().unwrap(), EngineKind::Postgres);
        assert_eq!("PG".parse::<EngineKind>().unwrap(), EngineKind::Postgres);
        assert_eq!("mariadb".parse::<EngineKind>().unwrap(), EngineKind::Mariadb);
        assert_eq!("sqlite3".parse::<EngineKind>().unwrap(), EngineKind::Sqlite);
        assert!("mssql".parse::<EngineKind>().is_err());
    }

    #[test]
    fn test_mysql_family() {
        assert!(EngineKind::Mysql.is_mysql_family());
        assert!(EngineKind::Mariadb.is_mysql_family());
        assert!(!EngineKind::Postgres.is_mysql_family());
    }

    #[test]
    fn test_table_lookups() {
        let table = TableSchema {
            schema: "public".into(),
            name: "users".into(),
            columns: vec![
                make_test_column("id", "int4"),
                make_test_column("email", "varchar(255)"),
            ],
            indexes: vec![IndexInfo {
                name: "users_email_key".into(),
                columns: vec!["email".into()],
                is_unique: true,
                is_primary: false,
                index_type: "btree".into(),
            }],
            foreign_keys: vec![],
            primary_key: vec!["id".into()],
        };

        assert_eq!(table.full_name(), "public.users");
        assert!(table.has_pk());
        assert_eq!(table.column("email").unwrap().data_type, "varchar(255)");
        assert!(table.column("missing").is_none());
        assert!(table.has_unique_index_on("email"));
        assert!(!table.has_unique_index_on("id"));
        assert_eq!(table.column_names(), vec!["id", "email"]);
    }
}
