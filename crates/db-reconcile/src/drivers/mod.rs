//! Database driver implementations.
//!
//! - [`postgres`]: PostgreSQL via `tokio-postgres` + `deadpool-postgres`
//! - [`mysql`]: MySQL / MariaDB via `sqlx`
//! - [`sqlite`]: SQLite via `sqlx`
//! - [`common`]: Shared utilities (TLS)
//!
//! Each driver module provides a `Dialect` and a `Connector`.
//!
//! # Adding New Databases
//!
//! 1. Create a new module under `drivers/`
//! 2. Implement `Dialect` and `Connector`
//! 3. Add an enum variant to `DialectImpl` and a branch to [`connect`]

pub mod common;
pub mod mysql;
pub mod postgres;
pub mod sqlite;

use std::sync::Arc;

use tracing::info;

pub use common::{SslMode, TlsBuilder};
pub use mysql::{MysqlConnector, MysqlDialect};
pub use postgres::{PostgresConnector, PostgresDialect};
pub use sqlite::{SqliteConnector, SqliteDialect};

use crate::config::ConnectionConfig;
use crate::core::schema::{ColumnInfo, EngineKind};
use crate::core::traits::{ColumnChanges, Connector, Dialect};
use crate::core::value::Row;
use crate::error::Result;

/// Enum-based static dispatch for dialects.
///
/// The compiler generates a match statement instead of using vtable
/// dispatch. Required trait methods, `row_value_list` and `identity_clause`
/// are forwarded; the remaining default methods are built on top of them.
#[derive(Debug, Clone)]
pub enum DialectImpl {
    Postgres(PostgresDialect),
    Mysql(MysqlDialect),
    Sqlite(SqliteDialect),
}

impl DialectImpl {
    /// Dialect for an engine.
    pub fn for_engine(engine: EngineKind) -> Self {
        match engine {
            EngineKind::Postgres => DialectImpl::Postgres(PostgresDialect::new()),
            EngineKind::Mysql => DialectImpl::Mysql(MysqlDialect::new()),
            EngineKind::Mariadb => DialectImpl::Mysql(MysqlDialect::mariadb()),
            EngineKind::Sqlite => DialectImpl::Sqlite(SqliteDialect::new()),
        }
    }

    /// Create a dialect implementation from a database type string.
    ///
    /// # Errors
    ///
    /// Returns an error if the database type is not recognized.
    pub fn from_db_type(db_type: &str) -> Result<Self> {
        Ok(Self::for_engine(db_type.parse()?))
    }
}

macro_rules! dispatch {
    ($self:ident, $d:ident => $call:expr) => {
        match $self {
            DialectImpl::Postgres($d) => $call,
            DialectImpl::Mysql($d) => $call,
            DialectImpl::Sqlite($d) => $call,
        }
    };
}

impl Dialect for DialectImpl {
    fn name(&self) -> &str {
        dispatch!(self, d => d.name())
    }

    fn engine(&self) -> EngineKind {
        dispatch!(self, d => d.engine())
    }

    fn quote_ident(&self, name: &str) -> String {
        dispatch!(self, d => d.quote_ident(name))
    }

    fn qualify(&self, schema: &str, table: &str) -> String {
        dispatch!(self, d => d.qualify(schema, table))
    }

    fn build_upsert(
        &self,
        table: &str,
        columns: &[String],
        pk_columns: &[String],
        rows: &[Row],
    ) -> String {
        dispatch!(self, d => d.build_upsert(table, columns, pk_columns, rows))
    }

    fn row_value_list(&self, keys: &[Row]) -> String {
        dispatch!(self, d => d.row_value_list(keys))
    }

    fn identity_clause(&self) -> Option<&'static str> {
        dispatch!(self, d => d.identity_clause())
    }

    fn alter_column(&self, table: &str, column: &ColumnInfo, changes: ColumnChanges) -> Vec<String> {
        dispatch!(self, d => d.alter_column(table, column, changes))
    }

    fn supports_alter_column(&self) -> bool {
        dispatch!(self, d => d.supports_alter_column())
    }

    fn supports_constraint_ddl(&self) -> bool {
        dispatch!(self, d => d.supports_constraint_ddl())
    }

    fn drop_index(&self, table: &str, schema: &str, index: &str) -> String {
        dispatch!(self, d => d.drop_index(table, schema, index))
    }

    fn drop_foreign_key(&self, table: &str, name: &str) -> String {
        dispatch!(self, d => d.drop_foreign_key(table, name))
    }

    fn drop_unique(&self, table: &str, name: &str) -> String {
        dispatch!(self, d => d.drop_unique(table, name))
    }
}

/// Open a pooled connection for a configured database.
pub async fn connect(config: &ConnectionConfig) -> Result<Arc<dyn Connector>> {
    let engine = config.engine()?;
    info!("Connecting to {} ({})", config.connection_id(), engine);

    let connector: Arc<dyn Connector> = match engine {
        EngineKind::Postgres => Arc::new(PostgresConnector::new(config).await?),
        EngineKind::Mysql | EngineKind::Mariadb => Arc::new(MysqlConnector::new(config).await?),
        EngineKind::Sqlite => Arc::new(SqliteConnector::new(config).await?),
    };
    Ok(connector)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dialect_impl_from_db_type() {
        assert_eq!(DialectImpl::from_db_type("postgres").unwrap().name(), "postgres");
        assert_eq!(DialectImpl::from_db_type("mysql").unwrap().name(), "mysql");
        assert_eq!(DialectImpl::from_db_type("mariadb").unwrap().name(), "mariadb");
        assert_eq!(DialectImpl::from_db_type("sqlite").unwrap().name(), "sqlite");
        assert!(DialectImpl::from_db_type("pg").is_ok());
        assert!(DialectImpl::from_db_type("unknown").is_err());
    }

    #[test]
    fn test_dialect_impl_dispatch() {
        let dialect = DialectImpl::for_engine(EngineKind::Postgres);
        assert_eq!(dialect.quote_ident("table"), "\"table\"");
        assert_eq!(dialect.qualify("public", "t"), "\"public\".\"t\"");

        let dialect = DialectImpl::for_engine(EngineKind::Mysql);
        assert_eq!(dialect.quote_ident("table"), "`table`");
        assert_eq!(dialect.engine(), EngineKind::Mysql);
    }

    #[test]
    fn test_default_methods_use_variant_quoting() {
        let dialect = DialectImpl::for_engine(EngineKind::Sqlite);
        assert_eq!(
            dialect.drop_column("\"users\"", "age"),
            "ALTER TABLE \"users\" DROP COLUMN \"age\""
        );
        assert!(!dialect.supports_constraint_ddl());
    }
}
