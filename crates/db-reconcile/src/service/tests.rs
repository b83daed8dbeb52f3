use std::sync::Mutex;

use async_trait::async_trait;
use tempfile::TempDir;

use super::*;
use crate::config::ConnectionConfig;
use crate::core::schema::EngineKind;
use crate::core::value::{ExecResult, QueryResult, SqlValue};
use crate::diff::DiffKind;
use crate::drivers::SqliteConnector;
use crate::history::{JsonFileRecorder, NoOpRecorder};
use crate::normalize::{IntrospectionRows, RawColumn};
use crate::sync::{RunStatus, TableRef};

/// Connector serving canned introspection rows and recording executed SQL.
struct FakeConnector {
    id: String,
    schema: String,
    tables: Vec<IntrospectionRows>,
    executed: Mutex<Vec<String>>,
    fail_on: Option<String>,
}

impl FakeConnector {
    fn new(id: &str, tables: Vec<IntrospectionRows>) -> Self {
        Self {
            id: id.to_string(),
            schema: "public".to_string(),
            tables,
            executed: Mutex::new(Vec::new()),
            fail_on: None,
        }
    }

    fn failing_on(mut self, fragment: &str) -> Self {
        self.fail_on = Some(fragment.to_string());
        self
    }

    fn executed(&self) -> Vec<String> {
        self.executed.lock().unwrap().clone()
    }
}

#[async_trait]
impl Connector for FakeConnector {
    fn engine(&self) -> EngineKind {
        EngineKind::Postgres
    }

    fn connection_id(&self) -> &str {
        &self.id
    }

    async fn query(&self, _sql: &str, _params: &[SqlValue]) -> Result<QueryResult> {
        Ok(QueryResult::default())
    }

    async fn execute(&self, sql: &str, _params: &[SqlValue]) -> Result<ExecResult> {
        if let Some(ref fragment) = self.fail_on {
            if sql.contains(fragment.as_str()) {
                return Err(ReconcileError::Query(format!("rejected: {}", fragment)));
            }
        }
        self.executed.lock().unwrap().push(sql.to_string());
        Ok(ExecResult::default())
    }

    async fn execute_transaction(&self, statements: &[String]) -> Result<u64> {
        for sql in statements {
            self.execute(sql, &[]).await?;
        }
        Ok(statements.len() as u64)
    }

    async fn get_schemas(&self) -> Result<Vec<String>> {
        Ok(vec![self.schema.clone()])
    }

    async fn get_tables(&self, _schema: &str) -> Result<Vec<String>> {
        let mut names: Vec<String> = self
            .tables
            .iter()
            .map(|t| t.columns[0].table.clone())
            .collect();
        names.sort();
        Ok(names)
    }

    async fn introspect(&self, _schema: &str, table: &str) -> Result<IntrospectionRows> {
        Ok(self
            .tables
            .iter()
            .find(|t| t.columns[0].table == table)
            .cloned()
            .unwrap_or_default())
    }

    async fn get_server_version(&self) -> Result<String> {
        Ok("fake 1.0".to_string())
    }

    async fn close(&self) {}
}

fn raw(table: &str, name: &str, pos: i64, udt: &str, pk: bool) -> RawColumn {
    RawColumn {
        schema: "public".into(),
        table: table.into(),
        name: name.into(),
        ordinal_position: pos,
        data_type: udt.into(),
        udt_name: Some(udt.into()),
        is_nullable: !pk,
        is_primary_key: pk,
        ..Default::default()
    }
}

fn orders(with_total: bool) -> IntrospectionRows {
    let mut columns = vec![raw("orders", "id", 1, "int4", true)];
    if with_total {
        let mut total = raw("orders", "total", 2, "numeric", false);
        total.numeric_precision = Some(10);
        total.numeric_scale = Some(2);
        columns.push(total);
    }
    IntrospectionRows {
        columns,
        ..Default::default()
    }
}

fn users() -> IntrospectionRows {
    IntrospectionRows {
        columns: vec![
            raw("users", "id", 1, "int4", true),
            raw("users", "email", 2, "text", false),
        ],
        ..Default::default()
    }
}

#[tokio::test]
async fn test_compare_schemas_orders_scenario() {
    let source = FakeConnector::new("src", vec![users(), orders(false)]);
    let target = FakeConnector::new("dst", vec![users(), orders(true)]);

    let diff = compare_schemas(
        Endpoint::new(&source, "public"),
        Endpoint::new(&target, "public"),
    )
    .await
    .unwrap();

    assert_eq!(diff.items.len(), 1);
    assert_eq!(diff.items[0].kind, DiffKind::ColumnRemoved);
    assert_eq!(diff.source_connection, "src");
    assert_eq!(diff.target_connection, "dst");
    assert_eq!(
        get_migration_sql(&diff),
        vec![r#"ALTER TABLE "public"."orders" DROP COLUMN "total""#]
    );

    let reversed = compare_schemas(
        Endpoint::new(&target, "public"),
        Endpoint::new(&source, "public"),
    )
    .await
    .unwrap();
    assert_eq!(reversed.items.len(), 1);
    assert_eq!(reversed.items[0].kind, DiffKind::ColumnAdded);
}

#[tokio::test]
async fn test_compare_schemas_missing_schema() {
    let source = FakeConnector::new("src", vec![users()]);
    let target = FakeConnector::new("dst", vec![users()]);

    let err = compare_schemas(
        Endpoint::new(&source, "public"),
        Endpoint::new(&target, "staging"),
    )
    .await
    .unwrap_err();
    assert!(matches!(
        err,
        ReconcileError::SchemaNotFound { ref connection, ref schema }
            if connection == "dst" && schema == "staging"
    ));
}

#[tokio::test]
async fn test_apply_migration_records_success() {
    let dir = TempDir::new().unwrap();
    let recorder = JsonFileRecorder::new(dir.path().join("history.jsonl"));
    let source = FakeConnector::new("src", vec![users(), orders(false)]);
    let target = FakeConnector::new("dst", vec![users(), orders(true)]);

    let diff = compare_schemas(
        Endpoint::new(&source, "public"),
        Endpoint::new(&target, "public"),
    )
    .await
    .unwrap();
    let record = apply_migration(&target, &diff, &recorder, Some("abc".into()))
        .await
        .unwrap();

    assert!(record.success);
    assert_eq!(record.statements, get_migration_sql(&diff));
    assert_eq!(target.executed(), get_migration_sql(&diff));

    let stored = recorder.load_all().await.unwrap();
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0].id, record.id);
    assert_eq!(stored[0].config_fingerprint.as_deref(), Some("abc"));
}

#[tokio::test]
async fn test_apply_migration_stops_at_first_failure() {
    let source = FakeConnector::new("src", vec![orders(false)]);
    let target = FakeConnector::new("dst", vec![users(), orders(true)]).failing_on("DROP COLUMN");

    let diff = compare_schemas(
        Endpoint::new(&source, "public"),
        Endpoint::new(&target, "public"),
    )
    .await
    .unwrap();
    let all = get_migration_sql(&diff);
    assert_eq!(all.len(), 2);

    let record = apply_migration(&target, &diff, &NoOpRecorder::new(), None)
        .await
        .unwrap();

    assert!(!record.success);
    assert!(record.error.as_deref().unwrap().contains("DROP COLUMN"));
    assert!(record.statements.is_empty());
    assert!(target.executed().is_empty());
}

#[tokio::test]
async fn test_apply_migration_rejects_other_connection() {
    let source = FakeConnector::new("src", vec![orders(false)]);
    let target = FakeConnector::new("dst", vec![orders(true)]);
    let diff = compare_schemas(
        Endpoint::new(&source, "public"),
        Endpoint::new(&target, "public"),
    )
    .await
    .unwrap();

    let err = apply_migration(&source, &diff, &NoOpRecorder::new(), None)
        .await
        .unwrap_err();
    assert!(matches!(err, ReconcileError::Config(_)));
}

// SQLite-backed end-to-end tests

async fn sqlite(name: &str, statements: &[&str]) -> SqliteConnector {
    let config = ConnectionConfig {
        r#type: "sqlite".to_string(),
        name: Some(name.to_string()),
        host: String::new(),
        port: None,
        database: String::new(),
        user: String::new(),
        password: String::new(),
        schema: None,
        ssl_mode: "disable".to_string(),
        path: Some(":memory:".to_string()),
        max_connections: 1,
    };
    let conn = SqliteConnector::new(&config).await.unwrap();
    let statements: Vec<String> = statements.iter().map(|s| s.to_string()).collect();
    conn.execute_transaction(&statements).await.unwrap();
    conn
}

const USERS: &str = "CREATE TABLE users (id INTEGER PRIMARY KEY, name TEXT)";

async fn users_rows(conn: &SqliteConnector) -> Vec<Vec<SqlValue>> {
    conn.query("SELECT id, name FROM users ORDER BY id", &[])
        .await
        .unwrap()
        .rows
}

fn pk() -> Vec<String> {
    vec!["id".to_string()]
}

fn with_deletes() -> SyncOptions {
    SyncOptions {
        delete_extra: true,
        ..Default::default()
    }
}

#[tokio::test]
async fn test_sync_table_users_scenario() {
    let source = sqlite("src", &[USERS, "INSERT INTO users VALUES (1, 'a'), (2, 'b')"]).await;
    let target = sqlite("dst", &[USERS, "INSERT INTO users VALUES (1, 'a'), (3, 'c')"]).await;
    let cancel = CancellationToken::new();

    let run = sync_table(
        Endpoint::new(&source, "main"),
        Endpoint::new(&target, "main"),
        "users",
        &pk(),
        &with_deletes(),
        &cancel,
    )
    .await
    .unwrap();

    assert_eq!(run.status, RunStatus::Completed);
    assert_eq!((run.inserts, run.updates, run.deletes), (1, 0, 1));
    assert_eq!(users_rows(&target).await, users_rows(&source).await);

    let again = sync_table(
        Endpoint::new(&source, "main"),
        Endpoint::new(&target, "main"),
        "users",
        &pk(),
        &with_deletes(),
        &cancel,
    )
    .await
    .unwrap();
    assert_eq!(again.total_changes(), 0);
}

const LINES: &str = "CREATE TABLE lines (a INTEGER NOT NULL, b INTEGER NOT NULL, v TEXT, PRIMARY KEY (a, b))";

const FILL_LINES: &str = "WITH RECURSIVE n(x) AS (SELECT 0 UNION ALL SELECT x + 1 FROM n WHERE x < 1099) \
     INSERT INTO lines (a, b, v) SELECT x / 10, x % 10, 'v' || x FROM n";

async fn count_lines(conn: &SqliteConnector) -> Option<SqlValue> {
    conn.query("SELECT COUNT(*) FROM lines", &[])
        .await
        .unwrap()
        .scalar()
        .cloned()
}

#[tokio::test]
async fn test_composite_key_sync_past_default_batch() {
    let source = sqlite("src", &[LINES, FILL_LINES]).await;
    let target = sqlite("dst", &[LINES]).await;
    let cancel = CancellationToken::new();
    let keys = vec!["a".to_string(), "b".to_string()];

    let run = sync_table(
        Endpoint::new(&source, "main"),
        Endpoint::new(&target, "main"),
        "lines",
        &keys,
        &SyncOptions::default(),
        &cancel,
    )
    .await
    .unwrap();
    assert_eq!(run.status, RunStatus::Completed, "errors: {:?}", run.errors);
    assert_eq!(run.inserts, 1100);
    assert_eq!(count_lines(&target).await, Some(SqlValue::I64(1100)));

    source
        .execute("UPDATE lines SET v = 'changed'", &[])
        .await
        .unwrap();
    let run = sync_table(
        Endpoint::new(&source, "main"),
        Endpoint::new(&target, "main"),
        "lines",
        &keys,
        &SyncOptions::default(),
        &cancel,
    )
    .await
    .unwrap();
    assert_eq!(run.status, RunStatus::Completed, "errors: {:?}", run.errors);
    assert_eq!(run.updates, 1100);

    source.execute("DELETE FROM lines", &[]).await.unwrap();
    let run = sync_table(
        Endpoint::new(&source, "main"),
        Endpoint::new(&target, "main"),
        "lines",
        &keys,
        &with_deletes(),
        &cancel,
    )
    .await
    .unwrap();
    assert_eq!(run.status, RunStatus::Completed, "errors: {:?}", run.errors);
    assert_eq!(run.deletes, 1100);
    assert_eq!(count_lines(&target).await, Some(SqlValue::I64(0)));
}

#[tokio::test]
async fn test_get_table_data_diff_counts() {
    let source = sqlite("src", &[USERS, "INSERT INTO users VALUES (1, 'a'), (2, 'b')"]).await;
    let target = sqlite("dst", &[USERS, "INSERT INTO users VALUES (1, 'x'), (3, 'c')"]).await;

    let diff = get_table_data_diff(
        Endpoint::new(&source, "main"),
        Endpoint::new(&target, "main"),
        "users",
        &pk(),
        100,
    )
    .await
    .unwrap();

    assert_eq!(diff.source_rows, 2);
    assert_eq!(diff.target_rows, 2);
    assert_eq!(diff.missing_in_target, 1);
    assert_eq!(diff.missing_in_source, 1);
    assert_eq!(diff.rows_different, 1);
    assert_eq!(users_rows(&target).await.len(), 2);
}

#[tokio::test]
async fn test_sync_to_many_targets() {
    let source = sqlite("src", &[USERS, "INSERT INTO users VALUES (1, 'a'), (2, 'b')"]).await;
    let first = sqlite("dst1", &[USERS]).await;
    let second = sqlite("dst2", &[USERS, "INSERT INTO users VALUES (2, 'old')"]).await;
    let cancel = CancellationToken::new();

    let runs = sync_to_many(
        Endpoint::new(&source, "main"),
        &[Endpoint::new(&first, "main"), Endpoint::new(&second, "main")],
        "users",
        &pk(),
        &SyncOptions::default(),
        &cancel,
    )
    .await;

    assert_eq!(runs.len(), 2);
    let first_run = runs[0].as_ref().unwrap();
    let second_run = runs[1].as_ref().unwrap();
    assert_eq!(first_run.target.connection_id, "dst1");
    assert_eq!(first_run.inserts, 2);
    assert_eq!((second_run.inserts, second_run.updates), (1, 1));
    assert_eq!(users_rows(&first).await, users_rows(&source).await);
    assert_eq!(users_rows(&second).await, users_rows(&source).await);
}

#[tokio::test]
async fn test_sync_rows_from_memory() {
    let target = sqlite("dst", &[USERS, "INSERT INTO users VALUES (1, 'a')"]).await;
    let rows = MemorySource::new(
        TableRef::new("memory", "main", "users"),
        vec!["id".to_string(), "name".to_string()],
        vec![
            vec![SqlValue::I64(1), SqlValue::from("a")],
            vec![SqlValue::I64(2), SqlValue::from("b")],
        ],
    )
    .unwrap();

    let run = sync_rows(
        &rows,
        Endpoint::new(&target, "main"),
        "users",
        &pk(),
        &SyncOptions::default(),
        &CancellationToken::new(),
    )
    .await
    .unwrap();

    assert_eq!(run.status, RunStatus::Completed);
    assert_eq!(run.inserts, 1);
    assert_eq!(run.source.connection_id, "memory");
    assert_eq!(
        users_rows(&target).await,
        vec![
            vec![SqlValue::I64(1), SqlValue::from("a")],
            vec![SqlValue::I64(2), SqlValue::from("b")],
        ]
    );
}

#[tokio::test]
async fn test_sync_table_unknown_key_column() {
    let source = sqlite("src", &[USERS]).await;
    let target = sqlite("dst", &[USERS]).await;

    let err = sync_table(
        Endpoint::new(&source, "main"),
        Endpoint::new(&target, "main"),
        "users",
        &["uuid".to_string()],
        &SyncOptions::default(),
        &CancellationToken::new(),
    )
    .await
    .unwrap_err();
    assert!(matches!(err, ReconcileError::InvalidPrimaryKey(_)));
}

#[tokio::test]
async fn test_diff_apply_converges_on_sqlite() {
    let source = sqlite(
        "src",
        &["CREATE TABLE orders (id INTEGER PRIMARY KEY, placed_at TEXT)"],
    )
    .await;
    let target = sqlite(
        "dst",
        &["CREATE TABLE orders (id INTEGER PRIMARY KEY, placed_at TEXT, total REAL)"],
    )
    .await;

    let diff = compare_schemas(
        Endpoint::new(&source, "main"),
        Endpoint::new(&target, "main"),
    )
    .await
    .unwrap();
    assert_eq!(diff.summary.count(DiffKind::ColumnRemoved), 1);
    assert_eq!(
        get_migration_sql(&diff),
        vec![r#"ALTER TABLE "orders" DROP COLUMN "total""#]
    );

    let record = apply_migration(&target, &diff, &NoOpRecorder::new(), None)
        .await
        .unwrap();
    assert!(record.success);

    let after = compare_schemas(
        Endpoint::new(&source, "main"),
        Endpoint::new(&target, "main"),
    )
    .await
    .unwrap();
    assert!(after.is_empty());
}

#[tokio::test]
async fn test_diff_apply_converges_indexes_and_fks_on_sqlite() {
    let source = sqlite(
        "src",
        &[
            "CREATE TABLE orders (id INTEGER PRIMARY KEY, placed_at TEXT, customer TEXT)",
            "CREATE INDEX idx_orders_placed ON orders (placed_at, customer)",
            "CREATE INDEX idx_orders_customer ON orders (customer)",
            "CREATE TABLE shipments (id INTEGER PRIMARY KEY, order_id INTEGER \
             REFERENCES orders (id) ON DELETE CASCADE)",
        ],
    )
    .await;
    let target = sqlite(
        "dst",
        &[
            "CREATE TABLE orders (id INTEGER PRIMARY KEY, placed_at TEXT, customer TEXT)",
            "CREATE INDEX idx_orders_placed ON orders (placed_at)",
            "CREATE UNIQUE INDEX idx_orders_legacy ON orders (customer, placed_at)",
        ],
    )
    .await;

    let diff = compare_schemas(
        Endpoint::new(&source, "main"),
        Endpoint::new(&target, "main"),
    )
    .await
    .unwrap();
    assert_eq!(diff.summary.count(DiffKind::IndexModified), 1);
    assert_eq!(diff.summary.count(DiffKind::IndexAdded), 1);
    assert_eq!(diff.summary.count(DiffKind::IndexRemoved), 1);
    assert_eq!(diff.summary.count(DiffKind::TableAdded), 1);
    let sql = get_migration_sql(&diff);
    assert!(sql
        .iter()
        .any(|s| s.contains("FOREIGN KEY (\"order_id\") REFERENCES \"orders\" (\"id\") ON DELETE CASCADE")));

    let record = apply_migration(&target, &diff, &NoOpRecorder::new(), None)
        .await
        .unwrap();
    assert!(record.success, "{:?}", record.error);

    let after = compare_schemas(
        Endpoint::new(&source, "main"),
        Endpoint::new(&target, "main"),
    )
    .await
    .unwrap();
    assert!(after.is_empty(), "{}", after);
}

#[tokio::test]
async fn test_sqlite_fk_change_is_reported_without_sql() {
    let source = sqlite(
        "src",
        &[
            "CREATE TABLE orders (id INTEGER PRIMARY KEY)",
            "CREATE TABLE shipments (id INTEGER PRIMARY KEY, order_id INTEGER \
             REFERENCES orders (id) ON DELETE CASCADE)",
        ],
    )
    .await;
    let target = sqlite(
        "dst",
        &[
            "CREATE TABLE orders (id INTEGER PRIMARY KEY)",
            "CREATE TABLE shipments (id INTEGER PRIMARY KEY, order_id INTEGER \
             REFERENCES orders (id))",
        ],
    )
    .await;

    let diff = compare_schemas(
        Endpoint::new(&source, "main"),
        Endpoint::new(&target, "main"),
    )
    .await
    .unwrap();
    let modified: Vec<_> = diff.items_of(DiffKind::FkModified).collect();
    assert_eq!(modified.len(), 1);
    assert!(modified[0].is_informational());
    assert!(modified[0].note.as_deref().unwrap().contains("rebuild the table"));
    assert!(get_migration_sql(&diff).is_empty());
}
