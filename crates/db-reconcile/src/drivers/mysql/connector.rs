//! MySQL/MariaDB connector.
//!
//! Uses an SQLx `MySqlPool`. Catalog reads go to `INFORMATION_SCHEMA`, with
//! text columns cast to `CHAR` since MySQL 8 reports several of them as blobs.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use sqlx::mysql::{
    MySql, MySqlArguments, MySqlConnectOptions, MySqlPool, MySqlPoolOptions, MySqlRow,
    MySqlSslMode,
};
use sqlx::query::Query;
use sqlx::{Column, Row as _, TypeInfo, ValueRef};
use tracing::{debug, info};

use crate::config::ConnectionConfig;
use crate::core::schema::EngineKind;
use crate::core::traits::Connector;
use crate::core::value::{ExecResult, QueryResult, Row, SqlValue};
use crate::drivers::common::row::{flag, int, opt_int, opt_text, text};
use crate::drivers::common::SslMode;
use crate::error::{ReconcileError, Result};
use crate::normalize::{IntrospectionRows, RawColumn, RawForeignKeyColumn, RawIndexColumn};

/// Connection pool timeout.
const POOL_CONNECTION_TIMEOUT: Duration = Duration::from_secs(30);

const COLUMNS_QUERY: &str = r#"
    SELECT
        CAST(c.TABLE_SCHEMA AS CHAR),
        CAST(c.TABLE_NAME AS CHAR),
        CAST(c.COLUMN_NAME AS CHAR),
        CAST(c.ORDINAL_POSITION AS SIGNED),
        CAST(c.DATA_TYPE AS CHAR),
        CAST(c.COLUMN_TYPE AS CHAR),
        CAST(c.CHARACTER_MAXIMUM_LENGTH AS SIGNED),
        CAST(c.NUMERIC_PRECISION AS SIGNED),
        CAST(c.NUMERIC_SCALE AS SIGNED),
        CAST(c.IS_NULLABLE = 'YES' AS SIGNED),
        CAST(c.COLUMN_DEFAULT AS CHAR),
        CAST(c.COLUMN_KEY = 'PRI' AS SIGNED),
        CAST(EXISTS (
            SELECT 1 FROM INFORMATION_SCHEMA.STATISTICS s
            WHERE s.TABLE_SCHEMA = c.TABLE_SCHEMA
              AND s.TABLE_NAME = c.TABLE_NAME
              AND s.COLUMN_NAME = c.COLUMN_NAME
              AND s.NON_UNIQUE = 0
              AND s.INDEX_NAME <> 'PRIMARY'
              AND (
                  SELECT COUNT(*) FROM INFORMATION_SCHEMA.STATISTICS s2
                  WHERE s2.TABLE_SCHEMA = s.TABLE_SCHEMA
                    AND s2.TABLE_NAME = s.TABLE_NAME
                    AND s2.INDEX_NAME = s.INDEX_NAME
              ) = 1
        ) AS SIGNED),
        CAST(c.COLUMN_COMMENT AS CHAR),
        CAST(c.EXTRA LIKE '%auto_increment%' AS SIGNED)
    FROM INFORMATION_SCHEMA.COLUMNS c
    WHERE c.TABLE_SCHEMA = ? AND c.TABLE_NAME = ?
    ORDER BY c.ORDINAL_POSITION
"#;

const INDEXES_QUERY: &str = r#"
    SELECT
        CAST(INDEX_NAME AS CHAR),
        CAST(COLUMN_NAME AS CHAR),
        CAST(SEQ_IN_INDEX AS SIGNED),
        CAST(NON_UNIQUE = 0 AS SIGNED),
        CAST(INDEX_NAME = 'PRIMARY' AS SIGNED),
        CAST(INDEX_TYPE AS CHAR)
    FROM INFORMATION_SCHEMA.STATISTICS
    WHERE TABLE_SCHEMA = ? AND TABLE_NAME = ? AND COLUMN_NAME IS NOT NULL
    ORDER BY INDEX_NAME, SEQ_IN_INDEX
"#;

const FOREIGN_KEYS_QUERY: &str = r#"
    SELECT
        CAST(k.CONSTRAINT_NAME AS CHAR),
        CAST(k.COLUMN_NAME AS CHAR),
        CAST(k.ORDINAL_POSITION AS SIGNED),
        CAST(k.REFERENCED_TABLE_SCHEMA AS CHAR),
        CAST(k.REFERENCED_TABLE_NAME AS CHAR),
        CAST(k.REFERENCED_COLUMN_NAME AS CHAR),
        CAST(r.DELETE_RULE AS CHAR),
        CAST(r.UPDATE_RULE AS CHAR)
    FROM INFORMATION_SCHEMA.KEY_COLUMN_USAGE k
    JOIN INFORMATION_SCHEMA.REFERENTIAL_CONSTRAINTS r
      ON r.CONSTRAINT_SCHEMA = k.CONSTRAINT_SCHEMA
     AND r.CONSTRAINT_NAME = k.CONSTRAINT_NAME
     AND r.TABLE_NAME = k.TABLE_NAME
    WHERE k.TABLE_SCHEMA = ? AND k.TABLE_NAME = ?
      AND k.REFERENCED_TABLE_NAME IS NOT NULL
    ORDER BY k.CONSTRAINT_NAME, k.ORDINAL_POSITION
"#;

/// MySQL/MariaDB connection pool.
pub struct MysqlConnector {
    pool: MySqlPool,
    engine: EngineKind,
    connection_id: String,
}

impl MysqlConnector {
    /// Create a pool and test one connection.
    pub async fn new(config: &ConnectionConfig) -> Result<Self> {
        let connection_id = config.connection_id();
        let engine = config.engine()?;
        let port = config.effective_port()?;

        let ssl_mode = match config.ssl_mode.parse::<SslMode>()? {
            SslMode::Disable => MySqlSslMode::Disabled,
            SslMode::Require => MySqlSslMode::Required,
            SslMode::VerifyCa => MySqlSslMode::VerifyCa,
            SslMode::VerifyFull => MySqlSslMode::VerifyIdentity,
        };

        let options = MySqlConnectOptions::new()
            .host(&config.host)
            .port(port)
            .database(&config.database)
            .username(&config.user)
            .password(&config.password)
            .ssl_mode(ssl_mode);

        let pool = MySqlPoolOptions::new()
            .max_connections(config.max_connections)
            .acquire_timeout(POOL_CONNECTION_TIMEOUT)
            .connect_with(options)
            .await
            .map_err(|e| ReconcileError::connection(&connection_id, e.to_string()))?;

        // Test connection
        sqlx::query("SELECT 1")
            .fetch_one(&pool)
            .await
            .map_err(|e| ReconcileError::connection(&connection_id, e.to_string()))?;

        info!(
            "Connected to {}: {}:{}/{}",
            engine, config.host, port, config.database
        );

        Ok(Self {
            pool,
            engine,
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
impl Connector for MysqlConnector {
    fn engine(&self) -> EngineKind {
        self.engine
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
            .fetch(
                r#"
                SELECT CAST(SCHEMA_NAME AS CHAR)
                FROM INFORMATION_SCHEMA.SCHEMATA
                WHERE SCHEMA_NAME NOT IN ('mysql', 'information_schema', 'performance_schema', 'sys')
                ORDER BY 1
                "#,
                &[],
            )
            .await?;
        rows.iter().map(|r| text(r, 0)).collect()
    }

    async fn get_tables(&self, schema: &str) -> Result<Vec<String>> {
        let rows = self
            .fetch(
                r#"
                SELECT CAST(TABLE_NAME AS CHAR)
                FROM INFORMATION_SCHEMA.TABLES
                WHERE TABLE_SCHEMA = ? AND TABLE_TYPE = 'BASE TABLE'
                ORDER BY 1
                "#,
                &[SqlValue::from(schema)],
            )
            .await?;
        rows.iter().map(|r| text(r, 0)).collect()
    }

    async fn introspect(&self, schema: &str, table: &str) -> Result<IntrospectionRows> {
        let params = [SqlValue::from(schema), SqlValue::from(table)];

        let columns = self
            .fetch(COLUMNS_QUERY, &params)
            .await?
            .iter()
            .map(|r| {
                Ok(RawColumn {
                    schema: text(r, 0)?,
                    table: text(r, 1)?,
                    name: text(r, 2)?,
                    ordinal_position: int(r, 3)?,
                    data_type: text(r, 4)?,
                    udt_name: None,
                    column_type: opt_text(r, 5),
                    character_maximum_length: opt_int(r, 6),
                    numeric_precision: opt_int(r, 7),
                    numeric_scale: opt_int(r, 8),
                    is_nullable: flag(r, 9),
                    column_default: opt_text(r, 10),
                    is_primary_key: flag(r, 11),
                    is_unique: flag(r, 12),
                    is_identity: flag(r, 14),
                    comment: opt_text(r, 13),
                })
            })
            .collect::<Result<Vec<_>>>()?;

        let indexes = self
            .fetch(INDEXES_QUERY, &params)
            .await?
            .iter()
            .map(|r| {
                Ok(RawIndexColumn {
                    index_name: text(r, 0)?,
                    column_name: text(r, 1)?,
                    seq_in_index: int(r, 2)?,
                    is_unique: flag(r, 3),
                    is_primary: flag(r, 4),
                    index_type: opt_text(r, 5),
                })
            })
            .collect::<Result<Vec<_>>>()?;

        let foreign_keys = self
            .fetch(FOREIGN_KEYS_QUERY, &params)
            .await?
            .iter()
            .map(|r| {
                Ok(RawForeignKeyColumn {
                    constraint_name: text(r, 0)?,
                    column_name: text(r, 1)?,
                    ordinal_position: int(r, 2)?,
                    ref_schema: text(r, 3)?,
                    ref_table: text(r, 4)?,
                    ref_column: text(r, 5)?,
                    on_delete: opt_text(r, 6),
                    on_update: opt_text(r, 7),
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
        let rows = self.fetch("SELECT CAST(VERSION() AS CHAR)", &[]).await?;
        rows.first()
            .map(|r| text(r, 0))
            .unwrap_or_else(|| Err(ReconcileError::Query("VERSION() returned no rows".into())))
    }

    async fn close(&self) {
        self.pool.close().await;
    }
}

/// Bind one value as a positional `?` parameter.
fn bind_value<'q>(
    query: Query<'q, MySql, MySqlArguments>,
    value: &'q SqlValue,
) -> Query<'q, MySql, MySqlArguments> {
    match value {
        SqlValue::Null => query.bind(None::<String>),
        SqlValue::Bool(v) => query.bind(*v),
        SqlValue::I64(v) => query.bind(*v),
        SqlValue::F64(v) => query.bind(*v),
        SqlValue::Text(v) => query.bind(v.as_str()),
        SqlValue::Bytes(v) => query.bind(v.as_slice()),
        SqlValue::Uuid(v) => query.bind(v.hyphenated().to_string()),
        SqlValue::Decimal(v) => query.bind(*v),
        SqlValue::Date(v) => query.bind(*v),
        SqlValue::Time(v) => query.bind(*v),
        SqlValue::DateTime(v) => query.bind(*v),
        SqlValue::DateTimeOffset(v) => query.bind(v.naive_utc()),
        SqlValue::Json(v) => query.bind(v.to_string()),
    }
}

/// Decode every column of a row by its reported MySQL type.
fn decode_row(row: &MySqlRow) -> Result<Row> {
    (0..row.len()).map(|idx| decode_value(row, idx)).collect()
}

fn decode_value(row: &MySqlRow, idx: usize) -> Result<SqlValue> {
    if row.try_get_raw(idx)?.is_null() {
        return Ok(SqlValue::Null);
    }

    let column = &row.columns()[idx];
    let type_name = column.type_info().name().to_string();
    let mismatch = |e: sqlx::Error| ReconcileError::TypeMismatch {
        column: column.name().to_string(),
        expected: type_name.clone(),
        found: e.to_string(),
    };

    let value = match type_name.as_str() {
        "BOOLEAN" => SqlValue::Bool(row.try_get::<bool, _>(idx).map_err(mismatch)?),
        "TINYINT" | "SMALLINT" | "MEDIUMINT" | "INT" | "BIGINT" => {
            SqlValue::I64(row.try_get::<i64, _>(idx).map_err(mismatch)?)
        }
        t if t.ends_with(" UNSIGNED") => {
            let v = row.try_get::<u64, _>(idx).map_err(mismatch)?;
            match i64::try_from(v) {
                Ok(v) => SqlValue::I64(v),
                Err(_) => SqlValue::Decimal(rust_decimal::Decimal::from(v)),
            }
        }
        "FLOAT" => SqlValue::F64(f64::from(row.try_get::<f32, _>(idx).map_err(mismatch)?)),
        "DOUBLE" => SqlValue::F64(row.try_get::<f64, _>(idx).map_err(mismatch)?),
        "DECIMAL" => SqlValue::Decimal(row.try_get(idx).map_err(mismatch)?),
        "DATE" => SqlValue::Date(row.try_get(idx).map_err(mismatch)?),
        "TIME" => SqlValue::Time(row.try_get(idx).map_err(mismatch)?),
        "DATETIME" | "TIMESTAMP" => SqlValue::DateTime(row.try_get(idx).map_err(mismatch)?),
        "JSON" => SqlValue::Json(row.try_get(idx).map_err(mismatch)?),
        "BINARY" | "VARBINARY" | "TINYBLOB" | "BLOB" | "MEDIUMBLOB" | "LONGBLOB" => {
            SqlValue::Bytes(row.try_get(idx).map_err(mismatch)?)
        }
        _ => match row.try_get::<String, _>(idx) {
            Ok(s) => SqlValue::Text(s),
            Err(_) => SqlValue::Bytes(row.try_get::<Vec<u8>, _>(idx).map_err(mismatch)?),
        },
    };
    Ok(value)
}
