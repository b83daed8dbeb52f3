//! PostgreSQL SQL dialect (Strategy pattern).

use crate::core::schema::{ColumnInfo, EngineKind};
use crate::core::traits::{ColumnChanges, Dialect};
use crate::core::value::Row;

/// PostgreSQL dialect implementation.
#[derive(Debug, Clone, Default)]
pub struct PostgresDialect;

impl PostgresDialect {
    /// Create a new PostgreSQL dialect instance.
    pub fn new() -> Self {
        Self
    }
}

impl Dialect for PostgresDialect {
    fn name(&self) -> &str {
        "postgres"
    }

    fn engine(&self) -> EngineKind {
        EngineKind::Postgres
    }

    fn quote_ident(&self, name: &str) -> String {
        format!("\"{}\"", name.replace('"', "\"\""))
    }

    fn qualify(&self, schema: &str, table: &str) -> String {
        format!("{}.{}", self.quote_ident(schema), self.quote_ident(table))
    }

    fn build_upsert(
        &self,
        table: &str,
        columns: &[String],
        pk_columns: &[String],
        rows: &[Row],
    ) -> String {
        let mut sql = format!(
            "{} ON CONFLICT ({}) DO",
            self.build_insert(table, columns, rows),
            self.column_list(pk_columns)
        );

        let non_pk_cols: Vec<_> = columns
            .iter()
            .filter(|c| !pk_columns.contains(c))
            .collect();

        if non_pk_cols.is_empty() {
            sql.push_str(" NOTHING");
        } else {
            let update_set = non_pk_cols
                .iter()
                .map(|c| format!("{} = EXCLUDED.{}", self.quote_ident(c), self.quote_ident(c)))
                .collect::<Vec<_>>()
                .join(", ");
            sql.push_str(&format!(" UPDATE SET {}", update_set));
        }

        sql
    }

    fn identity_clause(&self) -> Option<&'static str> {
        Some("GENERATED BY DEFAULT AS IDENTITY")
    }

    fn alter_column(&self, table: &str, column: &ColumnInfo, changes: ColumnChanges) -> Vec<String> {
        let name = self.quote_ident(&column.name);
        let mut statements = Vec::new();

        if changes.data_type {
            statements.push(format!(
                "ALTER TABLE {} ALTER COLUMN {} TYPE {} USING {}::{}",
                table, name, column.data_type, name, column.data_type
            ));
        }
        if changes.nullable {
            let action = if column.nullable { "DROP" } else { "SET" };
            statements.push(format!(
                "ALTER TABLE {} ALTER COLUMN {} {} NOT NULL",
                table, name, action
            ));
        }
        if changes.default_value {
            statements.push(match column.default_value {
                Some(ref default) => format!(
                    "ALTER TABLE {} ALTER COLUMN {} SET DEFAULT {}",
                    table, name, default
                ),
                None => format!("ALTER TABLE {} ALTER COLUMN {} DROP DEFAULT", table, name),
            });
        }

        statements
    }

    fn supports_alter_column(&self) -> bool {
        true
    }

    fn supports_constraint_ddl(&self) -> bool {
        true
    }

    fn drop_index(&self, _table: &str, schema: &str, index: &str) -> String {
        format!("DROP INDEX {}", self.qualify(schema, index))
    }

    fn drop_foreign_key(&self, table: &str, name: &str) -> String {
        format!(
            "ALTER TABLE {} DROP CONSTRAINT {}",
            table,
            self.quote_ident(name)
        )
    }

    fn drop_unique(&self, table: &str, name: &str) -> String {
        self.drop_foreign_key(table, name)
    }
}
