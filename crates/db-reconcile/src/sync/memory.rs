//! In-process row sets.

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::core::schema::EngineKind;
use crate::core::value::{Row, SqlValue};
use crate::drivers::DialectImpl;
use crate::error::{ReconcileError, Result};

use super::key::RowKey;
use super::options::SyncMode;
use super::run::TableRef;
use super::source::{MutationBatch, MutationKind, RowSource, RowTarget};

/// Caller-supplied rows.
#[derive(Debug, Clone)]
pub struct MemorySource {
    table: TableRef,
    columns: Vec<String>,
    rows: Vec<Row>,
}

impl MemorySource {
    /// Every row must have one value per column.
    pub fn new(table: TableRef, columns: Vec<String>, rows: Vec<Row>) -> Result<Self> {
        if let Some(bad) = rows.iter().find(|r| r.len() != columns.len()) {
            return Err(ReconcileError::Config(format!(
                "row has {} values for {} columns",
                bad.len(),
                columns.len()
            )));
        }
        Ok(Self { table, columns, rows })
    }

    pub fn rows(&self) -> &[Row] {
        &self.rows
    }

    fn positions(&self, names: &[String]) -> Result<Vec<usize>> {
        names
            .iter()
            .map(|n| {
                self.columns
                    .iter()
                    .position(|c| c == n)
                    .ok_or_else(|| ReconcileError::Query(format!("unknown column {}", n)))
            })
            .collect()
    }

    fn project(row: &Row, positions: &[usize]) -> Row {
        positions.iter().map(|&i| row[i].clone()).collect()
    }

    fn key_of(&self, row: &Row, pk_positions: &[usize]) -> RowKey {
        RowKey::from_row(row, pk_positions)
    }

    fn scan(&self, columns: &[String], order_by: &[String], offset: usize, limit: usize) -> Result<Vec<Row>> {
        let projection = self.positions(columns)?;
        let order = self.positions(order_by)?;
        let mut sorted: Vec<&Row> = self.rows.iter().collect();
        sorted.sort_by_key(|r| self.key_of(r, &order));
        Ok(sorted
            .into_iter()
            .skip(offset)
            .take(limit)
            .map(|r| Self::project(r, &projection))
            .collect())
    }

    fn fetch(&self, columns: &[String], pk_columns: &[String], keys: &[Row]) -> Result<Vec<Row>> {
        let projection = self.positions(columns)?;
        let pk = self.positions(pk_columns)?;
        let wanted: Vec<RowKey> = keys.iter().map(|k| RowKey::from_values(k)).collect();
        Ok(self
            .rows
            .iter()
            .filter(|r| wanted.contains(&self.key_of(r, &pk)))
            .map(|r| Self::project(r, &projection))
            .collect())
    }

    /// Apply a batch in place. Columns missing from the batch are NULL on
    /// insert and left untouched on update.
    fn apply(&mut self, batch: &MutationBatch) -> Result<u64> {
        let pk = self.positions(&batch.primary_keys)?;
        let batch_positions = self.positions(&batch.columns)?;
        let batch_pk = batch
            .primary_keys
            .iter()
            .map(|k| {
                batch
                    .columns
                    .iter()
                    .position(|c| c == k)
                    .ok_or_else(|| ReconcileError::InvalidPrimaryKey(k.clone()))
            })
            .collect::<Result<Vec<_>>>()?;

        let mut affected = 0;
        for row in &batch.rows {
            let key = RowKey::from_row(row, &batch_pk);
            let existing = self.rows.iter().position(|r| self.key_of(r, &pk) == key);

            match (batch.kind, existing) {
                (MutationKind::Delete, Some(i)) => {
                    self.rows.remove(i);
                    affected += 1;
                }
                (MutationKind::Delete, None) => {}
                (MutationKind::Insert, Some(_)) if batch.mode == SyncMode::Insert => {
                    return Err(ReconcileError::Query(format!(
                        "duplicate key {:?} in {}",
                        key.0, self.table
                    )));
                }
                (MutationKind::Update, None) if batch.mode == SyncMode::Insert => {}
                (_, Some(i)) => {
                    for (value, &pos) in row.iter().zip(&batch_positions) {
                        self.rows[i][pos] = value.clone();
                    }
                    affected += 1;
                }
                (_, None) => {
                    let mut full = vec![SqlValue::Null; self.columns.len()];
                    for (value, &pos) in row.iter().zip(&batch_positions) {
                        full[pos] = value.clone();
                    }
                    self.rows.push(full);
                    affected += 1;
                }
            }
        }
        Ok(affected)
    }
}

#[async_trait]
impl RowSource for MemorySource {
    fn table_ref(&self) -> TableRef {
        self.table.clone()
    }

    async fn columns(&self) -> Result<Vec<String>> {
        Ok(self.columns.clone())
    }

    async fn scan_page(
        &self,
        columns: &[String],
        order_by: &[String],
        offset: usize,
        limit: usize,
    ) -> Result<Vec<Row>> {
        self.scan(columns, order_by, offset, limit)
    }

    async fn fetch_rows(&self, columns: &[String], pk_columns: &[String], keys: &[Row]) -> Result<Vec<Row>> {
        self.fetch(columns, pk_columns, keys)
    }
}

/// Writable in-process table. Batches are applied row by row under a lock,
/// all-or-nothing per batch.
pub struct MemoryTarget {
    table: TableRef,
    data: Mutex<MemorySource>,
    dialect: DialectImpl,
}

impl MemoryTarget {
    /// Batches are rendered in `engine`'s dialect for the run's statement log.
    pub fn new(engine: EngineKind, source: MemorySource) -> Self {
        Self {
            table: source.table.clone(),
            data: Mutex::new(source),
            dialect: DialectImpl::for_engine(engine),
        }
    }

    /// Current rows.
    pub async fn snapshot(&self) -> Vec<Row> {
        self.data.lock().await.rows.clone()
    }
}

#[async_trait]
impl RowSource for MemoryTarget {
    fn table_ref(&self) -> TableRef {
        self.table.clone()
    }

    async fn columns(&self) -> Result<Vec<String>> {
        Ok(self.data.lock().await.columns.clone())
    }

    async fn scan_page(
        &self,
        columns: &[String],
        order_by: &[String],
        offset: usize,
        limit: usize,
    ) -> Result<Vec<Row>> {
        self.data.lock().await.scan(columns, order_by, offset, limit)
    }

    async fn fetch_rows(&self, columns: &[String], pk_columns: &[String], keys: &[Row]) -> Result<Vec<Row>> {
        self.data.lock().await.fetch(columns, pk_columns, keys)
    }
}

#[async_trait]
impl RowTarget for MemoryTarget {
    fn dialect(&self) -> &DialectImpl {
        &self.dialect
    }

    async fn apply_batch(&self, batch: &MutationBatch, _statements: &[String]) -> Result<u64> {
        let mut data = self.data.lock().await;
        let mut staged = data.clone();
        let affected = staged.apply(batch)?;
        *data = staged;
        Ok(affected)
    }
}
