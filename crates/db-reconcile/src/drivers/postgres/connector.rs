//! PostgreSQL connector.
//!
//! Uses deadpool-postgres for connection pooling. Introspection reads
//! `information_schema` for columns and `pg_catalog` for indexes and foreign
//! keys, returning raw rows for the normalizer.

use std::error::Error as StdError;
use std::time::Instant;

use async_trait::async_trait;
use bytes::BytesMut;
use deadpool_postgres::{Manager, ManagerConfig, Pool, RecyclingMethod};
use tokio_postgres::types::{to_sql_checked, IsNull, ToSql, Type};
use tokio_postgres::Config as PgConfig;
use tracing::{debug, info, warn};

use crate::config::ConnectionConfig;
use crate::core::schema::EngineKind;
use crate::core::traits::Connector;
use crate::core::value::{ExecResult, QueryResult, Row, SqlValue};
use crate::drivers::common::TlsBuilder;
use crate::error::{ReconcileError, Result};
use crate::normalize::{IntrospectionRows, RawColumn, RawForeignKeyColumn, RawIndexColumn};

const COLUMNS_QUERY: &str = r#"
    SELECT
        c.table_schema::text,
        c.table_name::text,
        c.column_name::text,
        c.ordinal_position::int8,
        c.data_type::text,
        c.udt_name::text,
        c.character_maximum_length::int8,
        c.numeric_precision::int8,
        c.numeric_scale::int8,
        c.is_nullable = 'YES',
        c.column_default::text,
        EXISTS (
            SELECT 1
            FROM information_schema.table_constraints tc
            JOIN information_schema.key_column_usage kcu
              ON kcu.constraint_name = tc.constraint_name
             AND kcu.table_schema = tc.table_schema
             AND kcu.table_name = tc.table_name
            WHERE tc.constraint_type = 'PRIMARY KEY'
              AND tc.table_schema = c.table_schema
              AND tc.table_name = c.table_name
              AND kcu.column_name = c.column_name
        ),
        EXISTS (
            SELECT 1
            FROM information_schema.table_constraints tc
            JOIN information_schema.key_column_usage kcu
              ON kcu.constraint_name = tc.constraint_name
             AND kcu.table_schema = tc.table_schema
             AND kcu.table_name = tc.table_name
            WHERE tc.constraint_type = 'UNIQUE'
              AND tc.table_schema = c.table_schema
              AND tc.table_name = c.table_name
              AND kcu.column_name = c.column_name
              AND (
                  SELECT count(*)
                  FROM information_schema.key_column_usage k2
                  WHERE k2.constraint_name = tc.constraint_name
                    AND k2.table_schema = tc.table_schema
              ) = 1
        ),
        col_description(
            format('%I.%I', c.table_schema, c.table_name)::regclass,
            c.ordinal_position::int
        ),
        c.is_identity = 'YES'
    FROM information_schema.columns c
    WHERE c.table_schema = $1 AND c.table_name = $2
    ORDER BY c.ordinal_position
"#;

const INDEXES_QUERY: &str = r#"
    SELECT
        i.relname::text,
        a.attname::text,
        k.ord::int8,
        ix.indisunique,
        ix.indisprimary,
        am.amname::text
    FROM pg_catalog.pg_index ix
    JOIN pg_catalog.pg_class t ON t.oid = ix.indrelid
    JOIN pg_catalog.pg_namespace n ON n.oid = t.relnamespace
    JOIN pg_catalog.pg_class i ON i.oid = ix.indexrelid
    JOIN pg_catalog.pg_am am ON am.oid = i.relam
    CROSS JOIN LATERAL unnest(ix.indkey::int2[]) WITH ORDINALITY AS k(attnum, ord)
    JOIN pg_catalog.pg_attribute a ON a.attrelid = t.oid AND a.attnum = k.attnum
    WHERE n.nspname = $1 AND t.relname = $2
    ORDER BY i.relname, k.ord
"#;

const FOREIGN_KEYS_QUERY: &str = r#"
    SELECT
        con.conname::text,
        a.attname::text,
        k.ord::int8,
        rn.nspname::text,
        rt.relname::text,
        ra.attname::text,
        CASE con.confdeltype
            WHEN 'r' THEN 'RESTRICT' WHEN 'c' THEN 'CASCADE'
            WHEN 'n' THEN 'SET NULL' WHEN 'd' THEN 'SET DEFAULT'
            ELSE 'NO ACTION' END,
        CASE con.confupdtype
            WHEN 'r' THEN 'RESTRICT' WHEN 'c' THEN 'CASCADE'
            WHEN 'n' THEN 'SET NULL' WHEN 'd' THEN 'SET DEFAULT'
            ELSE 'NO ACTION' END
    FROM pg_catalog.pg_constraint con
    JOIN pg_catalog.pg_class t ON t.oid = con.conrelid
    JOIN pg_catalog.pg_namespace n ON n.oid = t.relnamespace
    JOIN pg_catalog.pg_class rt ON rt.oid = con.confrelid
    JOIN pg_catalog.pg_namespace rn ON rn.oid = rt.relnamespace
    CROSS JOIN LATERAL unnest(con.conkey, con.confkey) WITH ORDINALITY AS k(attnum, ref_attnum, ord)
    JOIN pg_catalog.pg_attribute a ON a.attrelid = con.conrelid AND a.attnum = k.attnum
    JOIN pg_catalog.pg_attribute ra ON ra.attrelid = con.confrelid AND ra.attnum = k.ref_attnum
    WHERE con.contype = 'f' AND n.nspname = $1 AND t.relname = $2
    ORDER BY con.conname, k.ord
"#;

/// PostgreSQL connection pool.
pub struct PostgresConnector {
    pool: Pool,
    connection_id: String,
}

impl PostgresConnector {
    /// Create a pool and test one connection.
    pub async fn new(config: &ConnectionConfig) -> Result<Self> {
        let connection_id = config.connection_id();
        let port = config.effective_port()?;

        let mut pg_config = PgConfig::new();
        pg_config.host(&config.host);
        pg_config.port(port);
        pg_config.dbname(&config.database);
        pg_config.user(&config.user);
        pg_config.password(&config.password);

        let mgr_config = ManagerConfig {
            recycling_method: RecyclingMethod::Fast,
        };

        let max_size = config.max_connections as usize;
        let pool = match TlsBuilder::new(config.ssl_mode.parse()?).build()? {
            None => {
                warn!("PostgreSQL TLS is disabled. Credentials will be transmitted in plaintext.");
                let mgr = Manager::from_config(pg_config, tokio_postgres::NoTls, mgr_config);
                Pool::builder(mgr).max_size(max_size).build()
            }
            Some(tls) => {
                let mgr = Manager::from_config(pg_config, tls, mgr_config);
                Pool::builder(mgr).max_size(max_size).build()
            }
        }
        .map_err(|e| ReconcileError::pool(e.to_string(), "creating PostgreSQL pool"))?;

        // Test connection
        let client = pool
            .get()
            .await
            .map_err(|e| ReconcileError::connection(&connection_id, e.to_string()))?;
        client
            .simple_query("SELECT 1")
            .await
            .map_err(|e| ReconcileError::connection(&connection_id, e.to_string()))?;

        info!(
            "Connected to PostgreSQL: {}:{}/{}",
            config.host, port, config.database
        );

        Ok(Self {
            pool,
            connection_id,
        })
    }

    async fn client(&self) -> Result<deadpool_postgres::Object> {
        Ok(self.pool.get().await?)
    }
}

#[async_trait]
impl Connector for PostgresConnector {
    fn engine(&self) -> EngineKind {
        EngineKind::Postgres
    }

    fn connection_id(&self) -> &str {
        &self.connection_id
    }

    async fn query(&self, sql: &str, params: &[SqlValue]) -> Result<QueryResult> {
        let client = self.client().await?;
        let started = Instant::now();
        let refs: Vec<&(dyn ToSql + Sync)> = params.iter().map(|p| p as &(dyn ToSql + Sync)).collect();
        let rows = client.query(sql, &refs).await?;

        let columns: Vec<String> = match rows.first() {
            Some(row) => row.columns().iter().map(|c| c.name().to_string()).collect(),
            None => Vec::new(),
        };
        let rows = rows.iter().map(decode_row).collect::<Result<Vec<Row>>>()?;

        Ok(QueryResult {
            columns,
            row_count: rows.len(),
            rows,
            execution_time_ms: started.elapsed().as_millis() as u64,
        })
    }

    async fn execute(&self, sql: &str, params: &[SqlValue]) -> Result<ExecResult> {
        let client = self.client().await?;
        let refs: Vec<&(dyn ToSql + Sync)> = params.iter().map(|p| p as &(dyn ToSql + Sync)).collect();
        let rows_affected = client.execute(sql, &refs).await?;
        Ok(ExecResult { rows_affected })
    }

    async fn execute_transaction(&self, statements: &[String]) -> Result<u64> {
        let mut client = self.client().await?;
        let tx = client.transaction().await?;
        let mut total = 0;
        for stmt in statements {
            total += tx.execute(stmt.as_str(), &[]).await?;
        }
        tx.commit().await?;
        debug!("Committed {} statements ({} rows)", statements.len(), total);
        Ok(total)
    }

    async fn get_schemas(&self) -> Result<Vec<String>> {
        let client = self.client().await?;
        let rows = client
            .query(
                r#"
                SELECT schema_name::text
                FROM information_schema.schemata
                WHERE schema_name NOT IN ('pg_catalog', 'information_schema')
                  AND schema_name NOT LIKE 'pg\_toast%'
                  AND schema_name NOT LIKE 'pg\_temp%'
                ORDER BY 1
                "#,
                &[],
            )
            .await?;
        Ok(rows.iter().map(|r| r.get::<_, String>(0)).collect())
    }

    async fn get_tables(&self, schema: &str) -> Result<Vec<String>> {
        let client = self.client().await?;
        let rows = client
            .query(
                r#"
                SELECT table_name::text
                FROM information_schema.tables
                WHERE table_schema = $1 AND table_type = 'BASE TABLE'
                ORDER BY 1
                "#,
                &[&schema],
            )
            .await?;
        Ok(rows.iter().map(|r| r.get::<_, String>(0)).collect())
    }

    async fn introspect(&self, schema: &str, table: &str) -> Result<IntrospectionRows> {
        let client = self.client().await?;

        let columns = client
            .query(COLUMNS_QUERY, &[&schema, &table])
            .await?
            .iter()
            .map(|r| RawColumn {
                schema: r.get(0),
                table: r.get(1),
                name: r.get(2),
                ordinal_position: r.get(3),
                data_type: r.get(4),
                udt_name: r.get(5),
                column_type: None,
                character_maximum_length: r.get(6),
                numeric_precision: r.get(7),
                numeric_scale: r.get(8),
                is_nullable: r.get(9),
                column_default: r.get(10),
                is_primary_key: r.get(11),
                is_unique: r.get(12),
                is_identity: r.get(14),
                comment: r.get(13),
            })
            .collect::<Vec<_>>();

        let indexes = client
            .query(INDEXES_QUERY, &[&schema, &table])
            .await?
            .iter()
            .map(|r| RawIndexColumn {
                index_name: r.get(0),
                column_name: r.get(1),
                seq_in_index: r.get(2),
                is_unique: r.get(3),
                is_primary: r.get(4),
                index_type: r.get(5),
            })
            .collect::<Vec<_>>();

        let foreign_keys = client
            .query(FOREIGN_KEYS_QUERY, &[&schema, &table])
            .await?
            .iter()
            .map(|r| RawForeignKeyColumn {
                constraint_name: r.get(0),
                column_name: r.get(1),
                ordinal_position: r.get(2),
                ref_schema: r.get(3),
                ref_table: r.get(4),
                ref_column: r.get(5),
                on_delete: r.get(6),
                on_update: r.get(7),
            })
            .collect::<Vec<_>>();

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
        let client = self.client().await?;
        let row = client.query_one("SELECT version()", &[]).await?;
        Ok(row.get::<_, String>(0))
    }

    async fn close(&self) {
        self.pool.close();
    }
}

/// Decode every column of a row by its Postgres type.
fn decode_row(row: &tokio_postgres::Row) -> Result<Row> {
    (0..row.len()).map(|idx| decode_value(row, idx)).collect()
}

fn decode_value(row: &tokio_postgres::Row, idx: usize) -> Result<SqlValue> {
    let column = &row.columns()[idx];
    let ty = column.type_();
    let mismatch = |e: tokio_postgres::Error| ReconcileError::TypeMismatch {
        column: column.name().to_string(),
        expected: ty.name().to_string(),
        found: e.to_string(),
    };

    let value: SqlValue = match ty.name() {
        "bool" => row.try_get::<_, Option<bool>>(idx).map_err(mismatch)?.into(),
        "int2" => row
            .try_get::<_, Option<i16>>(idx)
            .map_err(mismatch)?
            .map(i64::from)
            .into(),
        "int4" => row
            .try_get::<_, Option<i32>>(idx)
            .map_err(mismatch)?
            .map(i64::from)
            .into(),
        "int8" => row.try_get::<_, Option<i64>>(idx).map_err(mismatch)?.into(),
        "float4" => row
            .try_get::<_, Option<f32>>(idx)
            .map_err(mismatch)?
            .map(f64::from)
            .into(),
        "float8" => row.try_get::<_, Option<f64>>(idx).map_err(mismatch)?.into(),
        "numeric" => row
            .try_get::<_, Option<rust_decimal::Decimal>>(idx)
            .map_err(mismatch)?
            .into(),
        "uuid" => row.try_get::<_, Option<uuid::Uuid>>(idx).map_err(mismatch)?.into(),
        "date" => row
            .try_get::<_, Option<chrono::NaiveDate>>(idx)
            .map_err(mismatch)?
            .into(),
        "time" => row
            .try_get::<_, Option<chrono::NaiveTime>>(idx)
            .map_err(mismatch)?
            .map(SqlValue::Time)
            .into(),
        "timestamp" => row
            .try_get::<_, Option<chrono::NaiveDateTime>>(idx)
            .map_err(mismatch)?
            .into(),
        "timestamptz" => row
            .try_get::<_, Option<chrono::DateTime<chrono::FixedOffset>>>(idx)
            .map_err(mismatch)?
            .into(),
        "bytea" => row.try_get::<_, Option<Vec<u8>>>(idx).map_err(mismatch)?.into(),
        "json" | "jsonb" => row
            .try_get::<_, Option<serde_json::Value>>(idx)
            .map_err(mismatch)?
            .map(SqlValue::Json)
            .into(),
        _ => row.try_get::<_, Option<String>>(idx).map_err(mismatch)?.into(),
    };
    Ok(value)
}

impl ToSql for SqlValue {
    fn to_sql(
        &self,
        ty: &Type,
        out: &mut BytesMut,
    ) -> std::result::Result<IsNull, Box<dyn StdError + Sync + Send>> {
        match self {
            SqlValue::Null => Ok(IsNull::Yes),
            SqlValue::Bool(v) => v.to_sql(ty, out),
            SqlValue::I64(v) => {
                if *ty == Type::INT2 {
                    i16::try_from(*v)?.to_sql(ty, out)
                } else if *ty == Type::INT4 {
                    i32::try_from(*v)?.to_sql(ty, out)
                } else {
                    v.to_sql(ty, out)
                }
            }
            SqlValue::F64(v) => {
                if *ty == Type::FLOAT4 {
                    (*v as f32).to_sql(ty, out)
                } else {
                    v.to_sql(ty, out)
                }
            }
            SqlValue::Text(v) => v.to_sql(ty, out),
            SqlValue::Bytes(v) => v.to_sql(ty, out),
            SqlValue::Uuid(v) => v.to_sql(ty, out),
            SqlValue::Decimal(v) => v.to_sql(ty, out),
            SqlValue::Date(v) => v.to_sql(ty, out),
            SqlValue::Time(v) => v.to_sql(ty, out),
            SqlValue::DateTime(v) => v.to_sql(ty, out),
            SqlValue::DateTimeOffset(v) => v.to_sql(ty, out),
            SqlValue::Json(v) => v.to_sql(ty, out),
        }
    }

    // Each variant checks the concrete type in to_sql
    fn accepts(_ty: &Type) -> bool {
        true
    }

    to_sql_checked!();
}
