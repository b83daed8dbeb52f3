//! Sync run driver.

use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::core::value::Row;
use crate::error::{ReconcileError, Result};

use super::classify::{classify, read_digests, Classification, RowShape};
use super::options::{RetryPolicy, SyncOptions};
use super::run::{RunStatus, SyncRun};
use super::source::{MutationBatch, MutationKind, RowSource, RowTarget};

/// Row-level difference counts between two tables.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableDataDiff {
    pub table: String,
    pub source_rows: usize,
    pub target_rows: usize,
    pub missing_in_target: usize,
    pub missing_in_source: usize,
    pub rows_different: usize,
}

/// Shape both sides and classify every key.
async fn plan<S, T>(
    source: &S,
    target: &T,
    primary_keys: &[String],
    page_size: usize,
    retry: &RetryPolicy,
) -> Result<(RowShape, Classification, usize, usize)>
where
    S: RowSource + ?Sized,
    T: RowSource + ?Sized,
{
    let source_columns = source.columns().await?;
    let target_columns = target.columns().await?;
    let shape = RowShape::new(&source_columns, &target_columns, primary_keys)?;

    let source_map = read_digests(source, &shape, page_size, retry).await?;
    let target_map = read_digests(target, &shape, page_size, retry).await?;
    let classification = classify(&source_map, &target_map);
    Ok((shape, classification, source_map.len(), target_map.len()))
}

/// Count row differences without changing anything.
pub async fn table_data_diff(
    source: &dyn RowSource,
    target: &dyn RowSource,
    primary_keys: &[String],
    page_size: usize,
) -> Result<TableDataDiff> {
    let retry = RetryPolicy::default();
    let (_, c, source_rows, target_rows) =
        plan(source, target, primary_keys, page_size.max(1), &retry).await?;
    Ok(TableDataDiff {
        table: target.table_ref().table,
        source_rows,
        target_rows,
        missing_in_target: c.missing_in_target.len(),
        missing_in_source: c.missing_in_source.len(),
        rows_different: c.different.len(),
    })
}

/// Keys of one pending batch.
struct PendingBatch {
    kind: MutationKind,
    keys: Vec<Row>,
}

fn pending_batches(c: Classification, options: &SyncOptions) -> Vec<PendingBatch> {
    let size = options.effective_batch_size();
    let mut batches = Vec::new();
    let mut push = |kind: MutationKind, keys: Vec<Row>| {
        for chunk in keys.chunks(size) {
            batches.push(PendingBatch {
                kind,
                keys: chunk.to_vec(),
            });
        }
    };
    if options.insert_missing {
        push(MutationKind::Insert, c.missing_in_target);
    }
    if options.update_different {
        push(MutationKind::Update, c.different);
    }
    if options.delete_extra {
        push(MutationKind::Delete, c.missing_in_source);
    }
    batches
}

/// Reconcile `target` with `source`.
///
/// Structural problems (empty or missing key columns, unreadable sides)
/// return an error before anything is written. Batch failures are recorded
/// on the returned run.
pub async fn sync(
    source: &dyn RowSource,
    target: &dyn RowTarget,
    primary_keys: &[String],
    options: &SyncOptions,
    cancel: &CancellationToken,
) -> Result<SyncRun> {
    let mut run = SyncRun::new(source.table_ref(), target.table_ref());
    info!(
        "Sync {} starting: {} -> {}",
        run.id, run.source, run.target
    );

    let retry = options.retry_policy();
    let (shape, classification, _, _) = plan(
        source,
        target,
        primary_keys,
        options.effective_batch_size(),
        &retry,
    )
    .await?;
    let batches = pending_batches(classification, options);
    let table = target.qualified_name();
    let total = batches.len();
    debug!("Sync {}: {} batches planned", run.id, total);

    for (index, pending) in batches.iter().enumerate() {
        let number = index + 1;
        if cancel.is_cancelled() {
            warn!("Sync {} cancelled before batch {}/{}", run.id, number, total);
            run.transition(RunStatus::Cancelled)?;
            return Ok(run);
        }

        run.batches_attempted += 1;
        match apply_with_retry(source, target, &shape, &table, pending, options, number).await {
            Ok((rows, statements)) => {
                match pending.kind {
                    MutationKind::Insert => run.inserts += rows,
                    MutationKind::Update => run.updates += rows,
                    MutationKind::Delete => run.deletes += rows,
                }
                run.statements.extend(statements);
                run.batches_applied += 1;
                debug!("Sync {}: batch {}/{} applied ({} rows)", run.id, number, total, rows);
            }
            Err(e) => {
                warn!("Sync {}: {}", run.id, e);
                run.errors.push(e.to_string());
                if !options.continue_on_error || run.errors.len() >= options.max_errors {
                    run.transition(RunStatus::Failed)?;
                    return Ok(run);
                }
            }
        }
    }

    let status = if run.errors.is_empty() {
        RunStatus::Completed
    } else {
        RunStatus::Failed
    };
    run.transition(status)?;
    info!(
        "Sync {} {}: {} inserts, {} updates, {} deletes",
        run.id, run.status, run.inserts, run.updates, run.deletes
    );
    Ok(run)
}

/// Build, render and apply one batch, retrying transient failures with
/// linear backoff. Any failure comes back as `BatchApply`.
///
/// Returns the number of rows written: for inserts and updates the source
/// rows actually fetched, which can fall short of the planned keys when
/// rows vanish from the source after the scan.
async fn apply_with_retry(
    source: &dyn RowSource,
    target: &dyn RowTarget,
    shape: &RowShape,
    table: &str,
    pending: &PendingBatch,
    options: &SyncOptions,
    number: usize,
) -> Result<(u64, Vec<String>)> {
    options
        .retry_policy()
        .run(&format!("Batch {}", number), move || {
            apply_once(source, target, shape, table, pending, options)
        })
        .await
        .map_err(|e| ReconcileError::batch(number, e.to_string()))
}

async fn apply_once(
    source: &dyn RowSource,
    target: &dyn RowTarget,
    shape: &RowShape,
    table: &str,
    pending: &PendingBatch,
    options: &SyncOptions,
) -> Result<(u64, Vec<String>)> {
    let (columns, rows) = match pending.kind {
        MutationKind::Delete => (shape.primary_keys.clone(), pending.keys.clone()),
        MutationKind::Insert | MutationKind::Update => {
            let rows = source
                .fetch_rows(&shape.columns, &shape.primary_keys, &pending.keys)
                .await?;
            (shape.columns.clone(), rows)
        }
    };

    let batch = MutationBatch {
        kind: pending.kind,
        mode: options.mode,
        columns,
        primary_keys: shape.primary_keys.clone(),
        rows,
    };
    if batch.rows.is_empty() {
        return Ok((0, Vec::new()));
    }
    let statements = batch.render(target.dialect(), table);
    target.apply_batch(&batch, &statements).await?;
    Ok((batch.rows.len() as u64, statements))
}

#[cfg(test)]
mod tests;
