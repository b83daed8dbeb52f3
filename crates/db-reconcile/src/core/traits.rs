//! Core traits for engine-agnostic schema comparison and data sync.
//!
//! - [`Connector`]: capability contract every engine driver implements
//! - [`Dialect`]: SQL syntax strategy for generated DML and DDL
//!
//! # Design Patterns
//!
//! - **Strategy**: `Dialect` provides interchangeable SQL rendering rules
//! - **Template Method**: default trait methods define algorithm skeletons
//!   (`Connector::get_table_schema`, the `Dialect` DML builders)

use async_trait::async_trait;

use crate::error::Result;
use crate::normalize::{self, IntrospectionRows};

use super::schema::{ColumnInfo, EngineKind, ForeignKeyInfo, IndexInfo, TableSchema};
use super::value::{ExecResult, QueryResult, Row, SqlValue};

/// Database connection capability.
///
/// Implementations own a connection pool; every call borrows a connection for
/// its duration and returns it on all exit paths.
#[async_trait]
pub trait Connector: Send + Sync {
    /// Engine family of this connection.
    fn engine(&self) -> EngineKind;

    /// Stable identifier used in diffs, runs and history records.
    fn connection_id(&self) -> &str;

    /// Run a row-returning statement.
    async fn query(&self, sql: &str, params: &[SqlValue]) -> Result<QueryResult>;

    /// Run a statement that does not return rows.
    async fn execute(&self, sql: &str, params: &[SqlValue]) -> Result<ExecResult>;

    /// Run statements in a single transaction.
    ///
    /// Either every statement commits or none does. Returns the total number
    /// of rows affected.
    async fn execute_transaction(&self, statements: &[String]) -> Result<u64>;

    /// List user schemas (databases for MySQL, attached databases for SQLite).
    async fn get_schemas(&self) -> Result<Vec<String>>;

    /// List base tables in a schema, sorted by name.
    async fn get_tables(&self, schema: &str) -> Result<Vec<String>>;

    /// Fetch engine-native introspection rows for one table.
    async fn introspect(&self, schema: &str, table: &str) -> Result<IntrospectionRows>;

    /// Fetch and normalize a table's schema.
    ///
    /// Template method: drivers supply [`Connector::introspect`], the
    /// normalizer does the rest.
    async fn get_table_schema(&self, schema: &str, table: &str) -> Result<TableSchema> {
        let rows = self.introspect(schema, table).await?;
        normalize::normalize(self.engine(), schema, table, &rows)
    }

    /// Server version string.
    async fn get_server_version(&self) -> Result<String>;

    /// Close the connection pool.
    async fn close(&self);
}

/// Which attributes of a column differ and need altering.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ColumnChanges {
    pub data_type: bool,
    pub nullable: bool,
    pub default_value: bool,
}

impl ColumnChanges {
    pub fn any(&self) -> bool {
        self.data_type || self.nullable || self.default_value
    }
}

/// Options for building a SELECT query.
#[derive(Debug, Clone, Default)]
pub struct SelectQueryOptions {
    /// Schema name.
    pub schema: String,
    /// Table name.
    pub table: String,
    /// Columns to select.
    pub columns: Vec<String>,
    /// ORDER BY columns (primary key for stable paging).
    pub order_by: Vec<String>,
    /// Additional WHERE clause.
    pub where_clause: Option<String>,
    /// Row limit (for paged reads).
    pub limit: Option<usize>,
    /// Rows to skip.
    pub offset: Option<usize>,
}

/// SQL syntax strategy for different database engines.
///
/// Identifiers passed in are raw names; implementations quote them. Table
/// arguments named `table` are already-qualified SQL names from
/// [`Dialect::qualify`].
pub trait Dialect: Send + Sync {
    /// Get the dialect identifier (e.g., "postgres", "mysql").
    fn name(&self) -> &str;

    /// Engine used for literal rendering.
    fn engine(&self) -> EngineKind;

    /// Quote an identifier (table name, column name, etc.).
    fn quote_ident(&self, name: &str) -> String;

    /// Schema-qualified table name.
    fn qualify(&self, schema: &str, table: &str) -> String;

    /// Insert-or-replace for a set of full rows.
    fn build_upsert(
        &self,
        table: &str,
        columns: &[String],
        pk_columns: &[String],
        rows: &[Row],
    ) -> String;

    /// Statements changing a column in place to match `column`, in
    /// type, nullability, default order. Empty when unsupported.
    fn alter_column(&self, table: &str, column: &ColumnInfo, changes: ColumnChanges) -> Vec<String>;

    /// Whether columns can be altered in place.
    fn supports_alter_column(&self) -> bool;

    /// Whether FK and unique constraints can be added/dropped on existing tables.
    fn supports_constraint_ddl(&self) -> bool;

    /// DROP INDEX statement.
    fn drop_index(&self, table: &str, schema: &str, index: &str) -> String;

    /// DROP of a foreign key constraint.
    fn drop_foreign_key(&self, table: &str, name: &str) -> String;

    /// DROP of a single-column unique constraint.
    fn drop_unique(&self, table: &str, name: &str) -> String;

    /// Render a value as a SQL literal.
    fn literal(&self, value: &SqlValue) -> String {
        value.to_sql_literal(self.engine())
    }

    /// Build a SELECT query for paged reads.
    fn build_select_query(&self, opts: &SelectQueryOptions) -> String {
        let cols = if opts.columns.is_empty() {
            "*".to_string()
        } else {
            self.column_list(&opts.columns)
        };

        let mut sql = format!(
            "SELECT {} FROM {}",
            cols,
            self.qualify(&opts.schema, &opts.table)
        );

        if let Some(ref where_clause) = opts.where_clause {
            if !where_clause.is_empty() {
                sql.push_str(&format!(" WHERE ({})", where_clause));
            }
        }

        if !opts.order_by.is_empty() {
            sql.push_str(&format!(" ORDER BY {}", self.column_list(&opts.order_by)));
        }

        if let Some(limit) = opts.limit {
            sql.push_str(&format!(" LIMIT {}", limit));
        }
        if let Some(offset) = opts.offset {
            sql.push_str(&format!(" OFFSET {}", offset));
        }

        sql
    }

    /// Comma-separated quoted column list.
    fn column_list(&self, columns: &[String]) -> String {
        columns
            .iter()
            .map(|c| self.quote_ident(c))
            .collect::<Vec<_>>()
            .join(", ")
    }

    /// Parenthesized VALUES tuples.
    fn values_list(&self, rows: &[Row]) -> String {
        rows.iter()
            .map(|row| {
                let vals = row.iter().map(|v| self.literal(v)).collect::<Vec<_>>();
                format!("({})", vals.join(", "))
            })
            .collect::<Vec<_>>()
            .join(", ")
    }

    /// Plain multi-row INSERT; conflicts fail.
    fn build_insert(&self, table: &str, columns: &[String], rows: &[Row]) -> String {
        format!(
            "INSERT INTO {} ({}) VALUES {}",
            table,
            self.column_list(columns),
            self.values_list(rows)
        )
    }

    /// UPDATE of one row's non-key columns, matched by key.
    ///
    /// Returns `None` when every column is part of the key.
    fn build_update(
        &self,
        table: &str,
        columns: &[String],
        pk_columns: &[String],
        row: &Row,
    ) -> Option<String> {
        let mut set = Vec::new();
        let mut key = Vec::with_capacity(pk_columns.len());
        for (col, val) in columns.iter().zip(row) {
            if pk_columns.contains(col) {
                key.push((col, val));
            } else {
                set.push(format!("{} = {}", self.quote_ident(col), self.literal(val)));
            }
        }
        if set.is_empty() {
            return None;
        }
        let predicate = key
            .iter()
            .map(|(c, v)| self.equals(c, v))
            .collect::<Vec<_>>()
            .join(" AND ");
        Some(format!(
            "UPDATE {} SET {} WHERE {}",
            table,
            set.join(", "),
            predicate
        ))
    }

    /// DELETE of rows matched by key.
    fn build_delete(&self, table: &str, pk_columns: &[String], keys: &[Row]) -> String {
        format!(
            "DELETE FROM {} WHERE {}",
            table,
            self.key_predicate(pk_columns, keys)
        )
    }

    /// Predicate matching any of `keys`: `pk IN (..)` for a single-column
    /// key, a row-value `(a, b) IN (..)` for composite keys.
    ///
    /// Keys holding NULL fall back to an OR of ANDs, since row-value
    /// comparison never matches NULL.
    fn key_predicate(&self, pk_columns: &[String], keys: &[Row]) -> String {
        let has_null = keys.iter().any(|k| k.iter().any(SqlValue::is_null));
        if pk_columns.len() == 1 && !has_null {
            let list = keys
                .iter()
                .map(|k| self.literal(&k[0]))
                .collect::<Vec<_>>()
                .join(", ");
            return format!("{} IN ({})", self.quote_ident(&pk_columns[0]), list);
        }
        if !has_null {
            return format!(
                "({}) IN {}",
                self.column_list(pk_columns),
                self.row_value_list(keys)
            );
        }
        keys.iter()
            .map(|k| {
                let parts = pk_columns
                    .iter()
                    .zip(k)
                    .map(|(c, v)| self.equals(c, v))
                    .collect::<Vec<_>>();
                format!("({})", parts.join(" AND "))
            })
            .collect::<Vec<_>>()
            .join(" OR ")
    }

    /// Right-hand side of a row-value IN: `((1, 1), (1, 2))`.
    fn row_value_list(&self, keys: &[Row]) -> String {
        format!("({})", self.values_list(keys))
    }

    /// `col = literal`, or `col IS NULL` for NULL.
    fn equals(&self, column: &str, value: &SqlValue) -> String {
        if value.is_null() {
            format!("{} IS NULL", self.quote_ident(column))
        } else {
            format!("{} = {}", self.quote_ident(column), self.literal(value))
        }
    }

    /// Clause marking an engine-generated column, if the engine has one
    /// that can be spelled on a column definition.
    fn identity_clause(&self) -> Option<&'static str> {
        None
    }

    /// Column definition used by CREATE TABLE and ADD COLUMN.
    fn column_definition(&self, column: &ColumnInfo) -> String {
        let mut def = format!("{} {}", self.quote_ident(&column.name), column.data_type);
        if !column.nullable {
            def.push_str(" NOT NULL");
        }
        let identity = self.identity_clause().filter(|_| column.is_identity);
        if let Some(clause) = identity {
            def.push(' ');
            def.push_str(clause);
        } else if let Some(ref default) = column.default_value {
            def.push_str(&format!(" DEFAULT {}", default));
        }
        def
    }

    /// Full CREATE TABLE with primary key and inline single-column unique
    /// constraints not already backed by an index.
    fn create_table(&self, table: &str, schema: &TableSchema) -> String {
        let mut parts: Vec<String> = schema
            .columns
            .iter()
            .map(|c| {
                let mut def = self.column_definition(c);
                if c.is_unique && !c.is_primary_key && !schema.has_unique_index_on(&c.name) {
                    def.push_str(" UNIQUE");
                }
                def
            })
            .collect();
        if !schema.primary_key.is_empty() {
            parts.push(format!(
                "PRIMARY KEY ({})",
                self.column_list(&schema.primary_key)
            ));
        }
        if !self.supports_constraint_ddl() {
            for fk in &schema.foreign_keys {
                parts.push(self.foreign_key_clause(fk));
            }
        }
        format!("CREATE TABLE {} (\n  {}\n)", table, parts.join(",\n  "))
    }

    /// ADD COLUMN statement.
    fn add_column(&self, table: &str, column: &ColumnInfo) -> String {
        format!(
            "ALTER TABLE {} ADD COLUMN {}",
            table,
            self.column_definition(column)
        )
    }

    /// DROP COLUMN statement.
    fn drop_column(&self, table: &str, column: &str) -> String {
        format!(
            "ALTER TABLE {} DROP COLUMN {}",
            table,
            self.quote_ident(column)
        )
    }

    /// ADD of a single-column unique constraint.
    fn add_unique(&self, table: &str, name: &str, column: &str) -> String {
        format!(
            "ALTER TABLE {} ADD CONSTRAINT {} UNIQUE ({})",
            table,
            self.quote_ident(name),
            self.quote_ident(column)
        )
    }

    /// CREATE [UNIQUE] INDEX statement.
    fn create_index(&self, table: &str, index: &IndexInfo) -> String {
        format!(
            "CREATE {}INDEX {} ON {} ({})",
            if index.is_unique { "UNIQUE " } else { "" },
            self.quote_ident(&index.name),
            table,
            self.column_list(&index.columns)
        )
    }

    /// `CONSTRAINT name FOREIGN KEY (...) REFERENCES ...` clause.
    fn foreign_key_clause(&self, fk: &ForeignKeyInfo) -> String {
        format!(
            "CONSTRAINT {} FOREIGN KEY ({}) REFERENCES {} ({}) ON DELETE {} ON UPDATE {}",
            self.quote_ident(&fk.name),
            self.column_list(&fk.columns),
            self.qualify(&fk.ref_schema, &fk.ref_table),
            self.column_list(&fk.ref_columns),
            fk.on_delete,
            fk.on_update
        )
    }

    /// ADD CONSTRAINT ... FOREIGN KEY statement.
    fn add_foreign_key(&self, table: &str, fk: &ForeignKeyInfo) -> String {
        format!("ALTER TABLE {} ADD {}", table, self.foreign_key_clause(fk))
    }

    /// DROP TABLE statement.
    fn drop_table(&self, table: &str) -> String {
        format!("DROP TABLE {}", table)
    }
}
