use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;

use super::*;
use crate::core::schema::EngineKind;
use crate::core::value::SqlValue;
use crate::drivers::DialectImpl;
use crate::sync::memory::{MemorySource, MemoryTarget};
use crate::sync::options::SyncMode;
use crate::sync::run::TableRef;

fn cols(names: &[&str]) -> Vec<String> {
    names.iter().map(|s| s.to_string()).collect()
}

fn user(id: i64, name: &str) -> Row {
    vec![SqlValue::I64(id), SqlValue::from(name)]
}

fn source(rows: Vec<Row>) -> MemorySource {
    MemorySource::new(TableRef::new("src", "main", "users"), cols(&["id", "name"]), rows).unwrap()
}

fn target(rows: Vec<Row>) -> MemoryTarget {
    MemoryTarget::new(
        EngineKind::Sqlite,
        MemorySource::new(TableRef::new("tgt", "main", "users"), cols(&["id", "name"]), rows)
            .unwrap(),
    )
}

fn all_changes() -> SyncOptions {
    SyncOptions {
        delete_extra: true,
        retry_delay_ms: 1,
        ..SyncOptions::default()
    }
}

async fn sorted(target: &MemoryTarget) -> Vec<Row> {
    let mut rows = target.snapshot().await;
    rows.sort_by_key(|r| match r[0] {
        SqlValue::I64(v) => v,
        _ => i64::MAX,
    });
    rows
}

/// What a [`ScriptedTarget`] does on a given apply call.
#[derive(Clone, Copy)]
enum Step {
    Apply,
    FailTransient,
    FailQuery,
    ApplyThenCancel,
}

/// Memory target that follows a script of per-call outcomes, then applies
/// normally.
struct ScriptedTarget {
    inner: MemoryTarget,
    script: Vec<Step>,
    calls: AtomicUsize,
    cancel: CancellationToken,
}

impl ScriptedTarget {
    fn new(inner: MemoryTarget, script: Vec<Step>) -> Self {
        Self {
            inner,
            script,
            calls: AtomicUsize::new(0),
            cancel: CancellationToken::new(),
        }
    }
}

#[async_trait]
impl RowSource for ScriptedTarget {
    fn table_ref(&self) -> TableRef {
        self.inner.table_ref()
    }

    async fn columns(&self) -> Result<Vec<String>> {
        self.inner.columns().await
    }

    async fn scan_page(
        &self,
        columns: &[String],
        order_by: &[String],
        offset: usize,
        limit: usize,
    ) -> Result<Vec<Row>> {
        self.inner.scan_page(columns, order_by, offset, limit).await
    }

    async fn fetch_rows(&self, columns: &[String], pk_columns: &[String], keys: &[Row]) -> Result<Vec<Row>> {
        self.inner.fetch_rows(columns, pk_columns, keys).await
    }
}

#[async_trait]
impl RowTarget for ScriptedTarget {
    fn dialect(&self) -> &DialectImpl {
        self.inner.dialect()
    }

    async fn apply_batch(&self, batch: &MutationBatch, statements: &[String]) -> Result<u64> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        match self.script.get(call).copied().unwrap_or(Step::Apply) {
            Step::Apply => self.inner.apply_batch(batch, statements).await,
            Step::FailTransient => Err(ReconcileError::TransientIo("connection reset".into())),
            Step::FailQuery => Err(ReconcileError::Query("constraint violation".into())),
            Step::ApplyThenCancel => {
                let n = self.inner.apply_batch(batch, statements).await?;
                self.cancel.cancel();
                Ok(n)
            }
        }
    }
}

/// Memory source whose first `scan_failures` page reads fail with a
/// transient error and whose `fetch_rows` drops the `vanished` ids, as if
/// they were deleted between scan and fetch.
struct FlakySource {
    inner: MemorySource,
    scan_failures: usize,
    scans: AtomicUsize,
    vanished: Vec<i64>,
}

impl FlakySource {
    fn new(inner: MemorySource, scan_failures: usize, vanished: Vec<i64>) -> Self {
        Self {
            inner,
            scan_failures,
            scans: AtomicUsize::new(0),
            vanished,
        }
    }
}

#[async_trait]
impl RowSource for FlakySource {
    fn table_ref(&self) -> TableRef {
        self.inner.table_ref()
    }

    async fn columns(&self) -> Result<Vec<String>> {
        self.inner.columns().await
    }

    async fn scan_page(
        &self,
        columns: &[String],
        order_by: &[String],
        offset: usize,
        limit: usize,
    ) -> Result<Vec<Row>> {
        if self.scans.fetch_add(1, Ordering::SeqCst) < self.scan_failures {
            return Err(ReconcileError::TransientIo("connection reset".into()));
        }
        self.inner.scan_page(columns, order_by, offset, limit).await
    }

    async fn fetch_rows(&self, columns: &[String], pk_columns: &[String], keys: &[Row]) -> Result<Vec<Row>> {
        let rows = self.inner.fetch_rows(columns, pk_columns, keys).await?;
        Ok(rows
            .into_iter()
            .filter(|r| !matches!(r[0], SqlValue::I64(id) if self.vanished.contains(&id)))
            .collect())
    }
}

#[tokio::test]
async fn test_users_scenario() {
    let src = source(vec![user(1, "a"), user(2, "b")]);
    let tgt = target(vec![user(1, "a"), user(3, "c")]);

    let run = sync(&src, &tgt, &cols(&["id"]), &all_changes(), &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(run.status, RunStatus::Completed);
    assert_eq!((run.inserts, run.updates, run.deletes), (1, 0, 1));
    assert!(run.errors.is_empty());
    assert_eq!(sorted(&tgt).await, vec![user(1, "a"), user(2, "b")]);
    assert_eq!(
        run.statements,
        vec![
            "INSERT INTO \"users\" (\"id\", \"name\") VALUES (2, 'b')",
            "DELETE FROM \"users\" WHERE \"id\" IN (3)",
        ]
    );
}

#[tokio::test]
async fn test_second_run_changes_nothing() {
    let src = source(vec![user(1, "a"), user(2, "b"), user(4, "d")]);
    let tgt = target(vec![user(1, "x"), user(3, "c")]);
    let options = all_changes();
    let pk = cols(&["id"]);

    let first = sync(&src, &tgt, &pk, &options, &CancellationToken::new()).await.unwrap();
    assert_eq!((first.inserts, first.updates, first.deletes), (2, 1, 1));

    let second = sync(&src, &tgt, &pk, &options, &CancellationToken::new()).await.unwrap();
    assert_eq!(second.status, RunStatus::Completed);
    assert_eq!(second.total_changes(), 0);
    assert_eq!(second.batches_attempted, 0);
    assert!(second.statements.is_empty());
}

#[tokio::test]
async fn test_options_gate_buckets() {
    let src = source(vec![user(1, "changed"), user(2, "b")]);
    let tgt = target(vec![user(1, "a"), user(3, "c")]);
    let options = SyncOptions {
        insert_missing: false,
        update_different: true,
        delete_extra: false,
        ..SyncOptions::default()
    };

    let run = sync(&src, &tgt, &cols(&["id"]), &options, &CancellationToken::new())
        .await
        .unwrap();
    assert_eq!((run.inserts, run.updates, run.deletes), (0, 1, 0));
    assert_eq!(
        run.statements,
        vec!["UPDATE \"users\" SET \"name\" = 'changed' WHERE \"id\" = 1"]
    );
    assert_eq!(sorted(&tgt).await, vec![user(1, "changed"), user(3, "c")]);
}

#[tokio::test]
async fn test_upsert_mode_renders_insert_or_replace() {
    let src = source(vec![user(1, "changed"), user(2, "b")]);
    let tgt = target(vec![user(1, "a")]);
    let options = SyncOptions {
        mode: SyncMode::Upsert,
        ..SyncOptions::default()
    };

    let run = sync(&src, &tgt, &cols(&["id"]), &options, &CancellationToken::new())
        .await
        .unwrap();
    assert_eq!((run.inserts, run.updates), (1, 1));
    assert!(run.statements.iter().all(|s| s.contains("ON CONFLICT (\"id\") DO UPDATE")));
    assert_eq!(sorted(&tgt).await, vec![user(1, "changed"), user(2, "b")]);
}

#[tokio::test]
async fn test_invalid_primary_key_writes_nothing() {
    let src = source(vec![user(1, "a")]);
    let tgt = target(vec![]);

    let err = sync(&src, &tgt, &[], &all_changes(), &CancellationToken::new())
        .await
        .unwrap_err();
    assert!(matches!(err, ReconcileError::InvalidPrimaryKey(_)));

    let err = sync(&src, &tgt, &cols(&["missing"]), &all_changes(), &CancellationToken::new())
        .await
        .unwrap_err();
    assert!(matches!(err, ReconcileError::InvalidPrimaryKey(_)));
    assert!(tgt.snapshot().await.is_empty());
}

#[tokio::test]
async fn test_cancel_after_first_batch() {
    let src = source(vec![user(1, "a"), user(2, "b"), user(3, "c")]);
    let tgt = ScriptedTarget::new(target(vec![]), vec![Step::ApplyThenCancel]);
    let options = SyncOptions {
        batch_size: 1,
        ..all_changes()
    };

    let run = sync(&src, &tgt, &cols(&["id"]), &options, &tgt.cancel).await.unwrap();

    assert_eq!(run.status, RunStatus::Cancelled);
    assert_eq!(run.inserts, 1);
    assert_eq!(run.batches_attempted, 1);
    assert_eq!(tgt.calls.load(Ordering::SeqCst), 1);
    assert_eq!(tgt.inner.snapshot().await, vec![user(1, "a")]);
    assert!(run.finished_at.is_some());
}

#[tokio::test]
async fn test_transient_errors_are_retried() {
    let src = source(vec![user(1, "a")]);
    let tgt = ScriptedTarget::new(target(vec![]), vec![Step::FailTransient, Step::FailTransient]);

    let run = sync(&src, &tgt, &cols(&["id"]), &all_changes(), &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(run.status, RunStatus::Completed);
    assert_eq!(run.inserts, 1);
    assert_eq!(tgt.calls.load(Ordering::SeqCst), 3);
    assert_eq!(run.batches_attempted, 1);
}

#[tokio::test]
async fn test_retries_exhausted_fail_the_run() {
    let src = source(vec![user(1, "a")]);
    let tgt = ScriptedTarget::new(target(vec![]), vec![Step::FailTransient; 4]);
    let options = SyncOptions {
        max_retries: 2,
        ..all_changes()
    };

    let run = sync(&src, &tgt, &cols(&["id"]), &options, &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(run.status, RunStatus::Failed);
    assert_eq!(run.errors.len(), 1);
    assert!(run.errors[0].starts_with("Batch 1 failed"));
    assert_eq!(tgt.calls.load(Ordering::SeqCst), 3);
    assert_eq!(run.inserts, 0);
}

#[tokio::test]
async fn test_query_errors_are_not_retried() {
    let src = source(vec![user(1, "a"), user(2, "b")]);
    let tgt = ScriptedTarget::new(target(vec![]), vec![Step::FailQuery]);
    let options = SyncOptions {
        batch_size: 1,
        ..all_changes()
    };

    let run = sync(&src, &tgt, &cols(&["id"]), &options, &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(run.status, RunStatus::Failed);
    assert_eq!(tgt.calls.load(Ordering::SeqCst), 1);
    assert_eq!(run.batches_attempted, 1);
}

#[tokio::test]
async fn test_continue_on_error() {
    let src = source(vec![user(1, "a"), user(2, "b"), user(3, "c")]);
    let tgt = ScriptedTarget::new(target(vec![]), vec![Step::Apply, Step::FailQuery]);
    let options = SyncOptions {
        batch_size: 1,
        continue_on_error: true,
        ..all_changes()
    };

    let run = sync(&src, &tgt, &cols(&["id"]), &options, &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(run.status, RunStatus::Failed);
    assert_eq!(run.batches_attempted, 3);
    assert_eq!(run.batches_applied, 2);
    assert_eq!(run.inserts, 2);
    assert_eq!(run.errors.len(), 1);
}

#[tokio::test]
async fn test_max_errors_stops_the_run() {
    let src = source(vec![user(1, "a"), user(2, "b"), user(3, "c")]);
    let tgt = ScriptedTarget::new(target(vec![]), vec![Step::FailQuery, Step::FailQuery]);
    let options = SyncOptions {
        batch_size: 1,
        continue_on_error: true,
        max_errors: 2,
        ..all_changes()
    };

    let run = sync(&src, &tgt, &cols(&["id"]), &options, &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(run.status, RunStatus::Failed);
    assert_eq!(run.batches_attempted, 2);
    assert_eq!(run.errors.len(), 2);
}

#[tokio::test]
async fn test_composite_key_sync() {
    let columns = cols(&["tenant", "id", "v"]);
    let src = MemorySource::new(
        TableRef::new("src", "main", "items"),
        columns.clone(),
        vec![
            vec![SqlValue::from("a"), SqlValue::I64(1), SqlValue::from("x")],
            vec![SqlValue::from("b"), SqlValue::I64(1), SqlValue::from("y")],
        ],
    )
    .unwrap();
    let tgt = MemoryTarget::new(
        EngineKind::Postgres,
        MemorySource::new(
            TableRef::new("tgt", "public", "items"),
            columns,
            vec![vec![SqlValue::from("a"), SqlValue::I64(1), SqlValue::from("old")]],
        )
        .unwrap(),
    );

    let run = sync(&src, &tgt, &cols(&["tenant", "id"]), &all_changes(), &CancellationToken::new())
        .await
        .unwrap();
    assert_eq!((run.inserts, run.updates, run.deletes), (1, 1, 0));
    assert!(run.statements[1].ends_with("WHERE \"tenant\" = 'a' AND \"id\" = 1"));
}

#[tokio::test]
async fn test_table_data_diff() {
    let src = source(vec![user(1, "a"), user(2, "b"), user(4, "changed")]);
    let tgt = target(vec![user(1, "a"), user(3, "c"), user(4, "d")]);

    let diff = table_data_diff(&src, &tgt, &cols(&["id"]), 2).await.unwrap();
    assert_eq!(
        diff,
        TableDataDiff {
            table: "users".to_string(),
            source_rows: 3,
            target_rows: 3,
            missing_in_target: 1,
            missing_in_source: 1,
            rows_different: 1,
        }
    );
    assert_eq!(tgt.snapshot().await.len(), 3);
}

#[tokio::test]
async fn test_transient_scan_errors_are_retried() {
    let src = FlakySource::new(source(vec![user(1, "a"), user(2, "b")]), 1, vec![]);
    let tgt = target(vec![]);

    let run = sync(&src, &tgt, &cols(&["id"]), &all_changes(), &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(run.status, RunStatus::Completed);
    assert_eq!(run.inserts, 2);
    assert_eq!(src.scans.load(Ordering::SeqCst), 2);
    assert_eq!(sorted(&tgt).await, vec![user(1, "a"), user(2, "b")]);
}

#[tokio::test]
async fn test_scan_retries_exhausted_return_error() {
    let src = FlakySource::new(source(vec![user(1, "a")]), 10, vec![]);
    let tgt = target(vec![]);
    let options = SyncOptions {
        max_retries: 2,
        ..all_changes()
    };

    let err = sync(&src, &tgt, &cols(&["id"]), &options, &CancellationToken::new())
        .await
        .unwrap_err();

    assert!(err.is_transient());
    assert_eq!(src.scans.load(Ordering::SeqCst), 3);
    assert!(tgt.snapshot().await.is_empty());
}

#[tokio::test]
async fn test_counts_follow_fetched_rows() {
    let src = FlakySource::new(
        source(vec![user(1, "a"), user(2, "b"), user(3, "c"), user(4, "new")]),
        0,
        vec![2, 4],
    );
    let tgt = target(vec![user(4, "old")]);

    let run = sync(&src, &tgt, &cols(&["id"]), &all_changes(), &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(run.status, RunStatus::Completed);
    assert_eq!((run.inserts, run.updates, run.deletes), (2, 0, 0));
    assert_eq!(run.batches_applied, 2);
    assert_eq!(run.statements.len(), 1);
    assert_eq!(
        sorted(&tgt).await,
        vec![user(1, "a"), user(3, "c"), user(4, "old")]
    );
}
