//! # db-reconcile
//!
//! Schema diff and data sync between PostgreSQL, MySQL/MariaDB and SQLite.
//!
//! This library provides:
//!
//! - **Schema introspection** normalized to a canonical [`TableSchema`](crate::core::schema::TableSchema)
//! - **Schema diffs** with ordered migration SQL for the target engine
//! - **Row sync** keyed by primary key, with batched, retried writes
//! - **Migration history** via pluggable recorders
//!
//! ## Example
//!
//! ```rust,no_run
//! use db_reconcile::{Config, Reconciler};
//!
//! #[tokio::main]
//! async fn main() -> db_reconcile::Result<()> {
//!     let config = Config::load("reconcile.yaml")?;
//!     let reconciler = Reconciler::new(config).await?;
//!     let diff = reconciler.diff().await?;
//!     print!("{}", diff);
//!     for sql in db_reconcile::get_migration_sql(&diff) {
//!         println!("{};", sql);
//!     }
//!     reconciler.close().await;
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod core;
pub mod diff;
pub mod drivers;
pub mod error;
pub mod history;
pub mod normalize;
pub mod service;
pub mod sync;
pub mod validator;

// Re-exports for convenient access
pub use config::{Config, ConnectionConfig, HistoryConfig};
pub use crate::core::schema::{ColumnInfo, EngineKind, ForeignKeyInfo, IndexInfo, TableSchema};
pub use crate::core::traits::Connector;
pub use crate::core::value::{ExecResult, QueryResult, Row, SqlValue};
pub use diff::{DiffKind, DiffSummary, SchemaDiff, SchemaDiffItem};
pub use error::{ReconcileError, Result};
pub use history::{JsonFileRecorder, MigrationHistoryRecorder, MigrationRecord, NoOpRecorder};
pub use service::{
    apply_migration, compare_schemas, get_migration_sql, get_table_data_diff, load_schema,
    sync_rows, sync_table, sync_to_many, Endpoint, HealthCheckResult, Reconciler,
};
pub use sync::{MemorySource, RunStatus, SyncMode, SyncOptions, SyncRun, TableDataDiff, TableRef};
