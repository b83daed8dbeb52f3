//! Entry points tying connectors, the diff engine and the sync engine
//! together.
//!
//! The free functions take injected connectors and are pure functions of
//! their inputs. [`Reconciler`] wraps them for a loaded [`Config`](crate::Config):
//! it opens both pools and supplies schemas, options and the history recorder.

mod reconciler;

use futures::future::{join_all, try_join_all};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::core::schema::TableSchema;
use crate::core::traits::Connector;
use crate::diff::{self, DiffContext, SchemaDiff};
use crate::error::{ReconcileError, Result};
use crate::history::{MigrationHistoryRecorder, MigrationRecord};
use crate::sync::{
    self, MemorySource, SyncOptions, SyncRun, TableDataDiff, TableSource, TableTarget,
};

pub use reconciler::{HealthCheckResult, Reconciler};

/// One side of a comparison or sync: a connection and a schema on it.
#[derive(Clone, Copy)]
pub struct Endpoint<'a> {
    pub connector: &'a dyn Connector,
    pub schema: &'a str,
}

impl<'a> Endpoint<'a> {
    pub fn new(connector: &'a dyn Connector, schema: &'a str) -> Self {
        Self { connector, schema }
    }
}

/// Read every table of a schema, failing with `SchemaNotFound` when the
/// connection has no such schema.
pub async fn load_schema(endpoint: Endpoint<'_>) -> Result<Vec<TableSchema>> {
    let conn = endpoint.connector;
    let schemas = conn.get_schemas().await?;
    if !schemas.iter().any(|s| s == endpoint.schema) {
        return Err(ReconcileError::SchemaNotFound {
            connection: conn.connection_id().to_string(),
            schema: endpoint.schema.to_string(),
        });
    }

    let tables = conn.get_tables(endpoint.schema).await?;
    debug!(
        "Loading {} tables from {}:{}",
        tables.len(),
        conn.connection_id(),
        endpoint.schema
    );
    try_join_all(
        tables
            .iter()
            .map(|t| conn.get_table_schema(endpoint.schema, t)),
    )
    .await
}

/// Compare the source schema (desired state) against the target schema.
pub async fn compare_schemas(source: Endpoint<'_>, target: Endpoint<'_>) -> Result<SchemaDiff> {
    let (source_tables, target_tables) =
        futures::try_join!(load_schema(source), load_schema(target))?;

    let ctx = DiffContext {
        source_connection: source.connector.connection_id().to_string(),
        target_connection: target.connector.connection_id().to_string(),
        source_schema: source.schema.to_string(),
        target_schema: target.schema.to_string(),
        source_engine: source.connector.engine(),
        target_engine: target.connector.engine(),
    };
    let diff = diff::compare(&source_tables, &target_tables, &ctx);
    info!(
        "Compared {} source and {} target tables: {} changes",
        source_tables.len(),
        target_tables.len(),
        diff.summary.total
    );
    Ok(diff)
}

/// Migration SQL for a diff, in execution order.
pub fn get_migration_sql(diff: &SchemaDiff) -> Vec<String> {
    diff::get_migration_sql(diff)
}

/// Execute a diff's migration SQL on its target, one statement at a time,
/// stopping at the first failure.
///
/// The outcome is recorded whether or not every statement succeeded. A
/// failing recorder is logged, not returned: the statements have already run.
pub async fn apply_migration(
    target: &dyn Connector,
    diff: &SchemaDiff,
    recorder: &dyn MigrationHistoryRecorder,
    config_fingerprint: Option<String>,
) -> Result<MigrationRecord> {
    if target.connection_id() != diff.target_connection {
        return Err(ReconcileError::Config(format!(
            "diff targets {} but connection is {}",
            diff.target_connection,
            target.connection_id()
        )));
    }

    let statements = get_migration_sql(diff);
    let mut executed = Vec::with_capacity(statements.len());
    let mut error = None;

    for sql in statements {
        debug!("Executing: {}", sql);
        match target.execute(&sql, &[]).await {
            Ok(_) => executed.push(sql),
            Err(e) => {
                warn!("Migration statement failed: {}: {}", sql, e);
                error = Some(format!("{}: {}", sql, e));
                break;
            }
        }
    }

    let record =
        MigrationRecord::new(diff, executed, error).with_fingerprint(config_fingerprint);
    if let Err(e) = recorder.record(&record).await {
        warn!(
            "Failed to record migration {} with {} recorder: {}",
            record.id,
            recorder.recorder_type(),
            e
        );
    }

    info!(
        "Migration {} on {}: {} statements executed, {}",
        record.id,
        record.connection_id,
        record.statements.len(),
        if record.success { "succeeded" } else { "failed" }
    );
    Ok(record)
}

/// Sync one table between two connections.
pub async fn sync_table(
    source: Endpoint<'_>,
    target: Endpoint<'_>,
    table: &str,
    primary_keys: &[String],
    options: &SyncOptions,
    cancel: &CancellationToken,
) -> Result<SyncRun> {
    let source_table = TableSource::new(source.connector, source.schema, table)?;
    let target_table = TableTarget::new(target.connector, target.schema, table)?;
    sync::sync(&source_table, &target_table, primary_keys, options, cancel).await
}

/// Sync caller-supplied rows into a table.
pub async fn sync_rows(
    rows: &MemorySource,
    target: Endpoint<'_>,
    table: &str,
    primary_keys: &[String],
    options: &SyncOptions,
    cancel: &CancellationToken,
) -> Result<SyncRun> {
    let target_table = TableTarget::new(target.connector, target.schema, table)?;
    sync::sync(rows, &target_table, primary_keys, options, cancel).await
}

/// Sync one source table into several targets concurrently.
///
/// Results are returned in target order; one target failing does not stop
/// the others.
pub async fn sync_to_many(
    source: Endpoint<'_>,
    targets: &[Endpoint<'_>],
    table: &str,
    primary_keys: &[String],
    options: &SyncOptions,
    cancel: &CancellationToken,
) -> Vec<Result<SyncRun>> {
    info!("Syncing {} into {} targets", table, targets.len());
    join_all(
        targets
            .iter()
            .map(|target| sync_table(source, *target, table, primary_keys, options, cancel)),
    )
    .await
}

/// Count row differences for one table without changing anything.
pub async fn get_table_data_diff(
    source: Endpoint<'_>,
    target: Endpoint<'_>,
    table: &str,
    primary_keys: &[String],
    page_size: usize,
) -> Result<TableDataDiff> {
    let source_table = TableSource::new(source.connector, source.schema, table)?;
    let target_table = TableSource::new(target.connector, target.schema, table)?;
    sync::table_data_diff(&source_table, &target_table, primary_keys, page_size).await
}

#[cfg(test)]
mod tests;
