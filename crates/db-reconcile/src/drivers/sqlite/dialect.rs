//! SQLite SQL dialect (Strategy pattern).
//!
//! SQLite's ALTER TABLE covers ADD/DROP/RENAME COLUMN only; column
//! modifications and constraint changes on existing tables need a table
//! rebuild, which is left to the operator. Foreign keys are declared inline
//! in CREATE TABLE.

use crate::core::schema::{ColumnInfo, EngineKind};
use crate::core::traits::{ColumnChanges, Dialect};
use crate::core::value::Row;

/// SQLite dialect implementation.
#[derive(Debug, Clone, Default)]
pub struct SqliteDialect;

impl SqliteDialect {
    /// Create a new SQLite dialect instance.
    pub fn new() -> Self {
        Self
    }
}

impl Dialect for SqliteDialect {
    fn name(&self) -> &str {
        "sqlite"
    }

    fn engine(&self) -> EngineKind {
        EngineKind::Sqlite
    }

    fn quote_ident(&self, name: &str) -> String {
        format!("\"{}\"", name.replace('"', "\"\""))
    }

    /// Statements run against the connection's main database.
    fn qualify(&self, _schema: &str, table: &str) -> String {
        self.quote_ident(table)
    }

    fn build_upsert(
        &self,
        table: &str,
        columns: &[String],
        pk_columns: &[String],
        rows: &[Row],
    ) -> String {
        let non_pk_cols: Vec<_> = columns
            .iter()
            .filter(|c| !pk_columns.contains(c))
            .collect();

        let mut sql = format!(
            "{} ON CONFLICT ({}) DO",
            self.build_insert(table, columns, rows),
            self.column_list(pk_columns)
        );
        if non_pk_cols.is_empty() {
            sql.push_str(" NOTHING");
        } else {
            let update_set = non_pk_cols
                .iter()
                .map(|c| format!("{} = excluded.{}", self.quote_ident(c), self.quote_ident(c)))
                .collect::<Vec<_>>()
                .join(", ");
            sql.push_str(&format!(" UPDATE SET {}", update_set));
        }
        sql
    }

    /// Row-value IN needs a subquery on the right in SQLite.
    fn row_value_list(&self, keys: &[Row]) -> String {
        format!("(VALUES {})", self.values_list(keys))
    }

    fn alter_column(&self, _table: &str, _column: &ColumnInfo, _changes: ColumnChanges) -> Vec<String> {
        Vec::new()
    }

    fn supports_alter_column(&self) -> bool {
        false
    }

    fn supports_constraint_ddl(&self) -> bool {
        false
    }

    fn drop_index(&self, _table: &str, _schema: &str, index: &str) -> String {
        format!("DROP INDEX {}", self.quote_ident(index))
    }

    fn drop_foreign_key(&self, _table: &str, _name: &str) -> String {
        String::new()
    }

    fn drop_unique(&self, _table: &str, _name: &str) -> String {
        String::new()
    }
}
