//! SQLite connector.
//!
//! Uses an SQLx `SqlitePool` over the configured file. `:memory:` opens a
//! single shared in-memory connection that lives as long as the pool.
//! Introspection reads the `pragma_*` table-valued functions.

use std::str::FromStr;
use std::time::Instant;

use async_trait::async_trait;
use sqlx::query::Query;
use sqlx::sqlite::{
    Sqlite, SqliteArguments, SqliteConnectOptions, SqlitePool, SqlitePoolOptions, SqliteRow,
};
use sqlx::{Column, Row as _, TypeInfo, ValueRef};
use tracing::{debug, info};

use crate::config::ConnectionConfig;
use crate::core::identifier::quote_ident;
use crate::core::schema::EngineKind;
use crate::core::traits::Connector;
use crate::core::value::{ExecResult, QueryResult, Row, SqlValue};
use crate::drivers::common::row::{flag, int, opt_text, text};
use crate::error::{ReconcileError, Result};
use crate::normalize::{IntrospectionRows, RawColumn, RawForeignKeyColumn, RawIndexColumn};

const MEMORY_PATH: &str = ":memory:";

/// SQLite connection pool.
pub struct SqliteConnector {
    pool: SqlitePool,
    connection_id: String,
}

impl SqliteConnector {
    /// Open the database file (created if missing) and test one connection.
    pub async fn new(config: &ConnectionConfig) -> Result<Self> {
        let connection_id = config.connection_id();
        let path = config.sqlite_path()?;

        let (options, pool_options) = if path == MEMORY_PATH {
            let options = SqliteConnectOptions::from_str("sqlite::memory:")
                .map_err(|e| ReconcileError::Config(e.to_string()))?;
            let pool_options = SqlitePoolOptions::new()
                .max_connections(1)
                .idle_timeout(None)
                .max_lifetime(None);
            (options, pool_options)
        } else {
            let options = SqliteConnectOptions::new()
                .filename(path)
                .create_if_missing(true);
            let pool_options = SqlitePoolOptions::new().max_connections(config.max_connections);
            (options, pool_options)
        };

        let pool = pool_options
            .connect_with(options.foreign_keys(true))
            .await
            .map_err(|e| ReconcileError::connection(&connection_id, e.to_string()))?;

        info!("Opened SQLite database: {}", path);

        Ok(Self {
            pool,
            connection_id,
        })
    }

    async fn fetch(&self, sql: &str, params: &[SqlValue]) -> Result<Vec<Row>> {
        let query = params.iter().fold(sqlx::query(sql), bind_value);
        let rows = query.fetch_all(&self.pool).await?;
        rows.iter().map(decode_row).collect()
    }
}

#[async_trait]
impl Connector for SqliteConnector {
    fn engine(&self) -> EngineKind {
        EngineKind::Sqlite
    }

    fn connection_id(&self) -> &str {
        &self.connection_id
    }

    async fn query(&self, sql: &str, params: &[SqlValue]) -> Result<QueryResult> {
        let started = Instant::now();
        let query = params.iter().fold(sqlx::query(sql), bind_value);
        let raw = query.fetch_all(&self.pool).await?;

        let columns = match raw.first() {
            Some(row) => row.columns().iter().map(|c| c.name().to_string()).collect(),
            None => Vec::new(),
        };
        let rows = raw.iter().map(decode_row).collect::<Result<Vec<Row>>>()?;

        Ok(QueryResult {
            columns,
            row_count: rows.len(),
            rows,
            execution_time_ms: started.elapsed().as_millis() as u64,
        })
    }

    async fn execute(&self, sql: &str, params: &[SqlValue]) -> Result<ExecResult> {
        let query = params.iter().fold(sqlx::query(sql), bind_value);
        let result = query.execute(&self.pool).await?;
        Ok(ExecResult {
            rows_affected: result.rows_affected(),
        })
    }

    async fn execute_transaction(&self, statements: &[String]) -> Result<u64> {
        let mut tx = self.pool.begin().await?;
        let mut total = 0;
        for stmt in statements {
            total += sqlx::query(stmt)
                .persistent(false)
                .execute(&mut *tx)
                .await?
                .rows_affected();
        }
        tx.commit().await?;
        debug!("Committed {} statements ({} rows)", statements.len(), total);
        Ok(total)
    }

    async fn get_schemas(&self) -> Result<Vec<String>> {
        let rows = self
            .fetch("SELECT name FROM pragma_database_list ORDER BY seq", &[])
            .await?;
        rows.iter().map(|r| text(r, 0)).collect()
    }

    async fn get_tables(&self, schema: &str) -> Result<Vec<String>> {
        let sql = format!(
            "SELECT name FROM {}.sqlite_master \
             WHERE type = 'table' AND name NOT LIKE 'sqlite\\_%' ESCAPE '\\' \
             ORDER BY name",
            quote_ident(EngineKind::Sqlite, schema)?
        );
        let rows = self.fetch(&sql, &[]).await?;
        rows.iter().map(|r| text(r, 0)).collect()
    }

    async fn introspect(&self, schema: &str, table: &str) -> Result<IntrospectionRows> {
        let params = [SqlValue::from(table), SqlValue::from(schema)];

        // Unique constraints surface as `origin = 'u'` autoindexes. They mark
        // their column unique instead of appearing as named indexes.
        let index_rows = self
            .fetch(
                r#"
                SELECT il.name, ii.name, ii.seqno, il."unique", il.origin
                FROM pragma_index_list(?1, ?2) AS il, pragma_index_info(il.name, ?2) AS ii
                WHERE ii.name IS NOT NULL
                ORDER BY il.name, ii.seqno
                "#,
                &params,
            )
            .await?;

        let mut indexes = Vec::new();
        let mut unique_columns: Vec<(String, String)> = Vec::new();
        for r in &index_rows {
            let origin = text(r, 4)?;
            let index = RawIndexColumn {
                index_name: text(r, 0)?,
                column_name: text(r, 1)?,
                seq_in_index: int(r, 2)? + 1,
                is_unique: flag(r, 3),
                is_primary: origin == "pk",
                index_type: None,
            };
            if origin == "u" {
                unique_columns.push((index.index_name, index.column_name));
            } else {
                indexes.push(index);
            }
        }
        let single_column_unique = |column: &str| {
            unique_columns.iter().any(|(idx, col)| {
                col == column && unique_columns.iter().filter(|(i, _)| i == idx).count() == 1
            })
        };

        let columns = self
            .fetch(
                r#"SELECT cid, name, type, "notnull", dflt_value, pk FROM pragma_table_info(?1, ?2) ORDER BY cid"#,
                &params,
            )
            .await?
            .iter()
            .map(|r| {
                let name = text(r, 1)?;
                let is_primary_key = flag(r, 5);
                Ok(RawColumn {
                    schema: schema.to_string(),
                    table: table.to_string(),
                    ordinal_position: int(r, 0)? + 1,
                    data_type: opt_text(r, 2).unwrap_or_default(),
                    is_nullable: !flag(r, 3) && !is_primary_key,
                    column_default: opt_text(r, 4),
                    is_primary_key,
                    is_unique: single_column_unique(&name),
                    name,
                    ..Default::default()
                })
            })
            .collect::<Result<Vec<_>>>()?;

        // SQLite foreign keys are unnamed; `id` groups the columns of one key.
        let foreign_keys = self
            .fetch(
                r#"SELECT id, seq, "table", "from", "to", on_update, on_delete FROM pragma_foreign_key_list(?1, ?2) ORDER BY id, seq"#,
                &params,
            )
            .await?
            .iter()
            .map(|r| {
                Ok(RawForeignKeyColumn {
                    constraint_name: format!("fk_{}_{}", table, int(r, 0)?),
                    ordinal_position: int(r, 1)? + 1,
                    ref_schema: schema.to_string(),
                    ref_table: text(r, 2)?,
                    column_name: text(r, 3)?,
                    ref_column: opt_text(r, 4).unwrap_or_default(),
                    on_update: opt_text(r, 5),
                    on_delete: opt_text(r, 6),
                })
            })
            .collect::<Result<Vec<_>>>()?;

        debug!(
            "Introspected {}.{}: {} columns, {} index columns, {} FK columns",
            schema,
            table,
            columns.len(),
            indexes.len(),
            foreign_keys.len()
        );

        Ok(IntrospectionRows {
            columns,
            indexes,
            foreign_keys,
        })
    }

    async fn get_server_version(&self) -> Result<String> {
        let rows = self.fetch("SELECT sqlite_version()", &[]).await?;
        rows.first()
            .map(|r| text(r, 0))
            .unwrap_or_else(|| Err(ReconcileError::Query("sqlite_version() returned no rows".into())))
    }

    async fn close(&self) {
        self.pool.close().await;
    }
}

/// Bind one value as a positional parameter. Types SQLite has no storage
/// class for are bound as text.
fn bind_value<'q>(
    query: Query<'q, Sqlite, SqliteArguments<'q>>,
    value: &'q SqlValue,
) -> Query<'q, Sqlite, SqliteArguments<'q>> {
    match value {
        SqlValue::Null => query.bind(None::<String>),
        SqlValue::Bool(v) => query.bind(*v),
        SqlValue::I64(v) => query.bind(*v),
        SqlValue::F64(v) => query.bind(*v),
        SqlValue::Text(v) => query.bind(v.as_str()),
        SqlValue::Bytes(v) => query.bind(v.as_slice()),
        other => query.bind(other.canonical_text()),
    }
}

/// Decode every column by the value's storage class, using the declared
/// column type only to recover booleans.
fn decode_row(row: &SqliteRow) -> Result<Row> {
    (0..row.len()).map(|idx| decode_value(row, idx)).collect()
}

fn decode_value(row: &SqliteRow, idx: usize) -> Result<SqlValue> {
    let raw = row.try_get_raw(idx)?;
    if raw.is_null() {
        return Ok(SqlValue::Null);
    }
    let storage = raw.type_info().name().to_string();
    let declared = row.columns()[idx].type_info().name().to_string();

    let value = match storage.as_str() {
        "INTEGER" => {
            let v = row.try_get::<i64, _>(idx)?;
            if declared == "BOOLEAN" {
                SqlValue::Bool(v != 0)
            } else {
                SqlValue::I64(v)
            }
        }
        "REAL" => SqlValue::F64(row.try_get::<f64, _>(idx)?),
        "BLOB" => SqlValue::Bytes(row.try_get::<Vec<u8>, _>(idx)?),
        _ => SqlValue::Text(row.try_get::<String, _>(idx)?),
    };
    Ok(value)
}
