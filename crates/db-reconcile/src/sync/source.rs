//! Row sources and targets.
//!
//! The sync engine reads both sides through [`RowSource`] and writes the
//! target through [`RowTarget`]. [`TableSource`] and [`TableTarget`] adapt a
//! [`Connector`] table; `memory` holds the in-process implementations.

use async_trait::async_trait;
use tracing::debug;

use crate::core::identifier::validate_all;
use crate::core::traits::{Connector, Dialect, SelectQueryOptions};
use crate::core::value::Row;
use crate::drivers::DialectImpl;
use crate::error::Result;

use super::options::SyncMode;
use super::run::TableRef;

/// Paged, keyed read access to a table's rows.
#[async_trait]
pub trait RowSource: Send + Sync {
    /// Where the rows come from.
    fn table_ref(&self) -> TableRef;

    /// Column names in table order.
    async fn columns(&self) -> Result<Vec<String>>;

    /// Rows `offset..offset + limit` ordered by `order_by`, projected onto
    /// `columns`.
    async fn scan_page(
        &self,
        columns: &[String],
        order_by: &[String],
        offset: usize,
        limit: usize,
    ) -> Result<Vec<Row>>;

    /// Full rows (projected onto `columns`) whose `pk_columns` match any of
    /// `keys`.
    async fn fetch_rows(&self, columns: &[String], pk_columns: &[String], keys: &[Row]) -> Result<Vec<Row>>;
}

/// Kind of a mutation batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MutationKind {
    Insert,
    Update,
    Delete,
}

/// One batch of changes for the target.
#[derive(Debug, Clone)]
pub struct MutationBatch {
    pub kind: MutationKind,
    pub mode: SyncMode,
    /// Columns of `rows`; key columns only for deletes.
    pub columns: Vec<String>,
    pub primary_keys: Vec<String>,
    pub rows: Vec<Row>,
}

impl MutationBatch {
    /// Render the batch as SQL against a qualified table name.
    pub fn render(&self, dialect: &DialectImpl, table: &str) -> Vec<String> {
        if self.rows.is_empty() {
            return Vec::new();
        }
        match (self.kind, self.mode) {
            (MutationKind::Delete, _) => {
                vec![dialect.build_delete(table, &self.primary_keys, &self.rows)]
            }
            (MutationKind::Insert, SyncMode::Insert) => {
                vec![dialect.build_insert(table, &self.columns, &self.rows)]
            }
            (MutationKind::Update, SyncMode::Insert) => self
                .rows
                .iter()
                .filter_map(|row| dialect.build_update(table, &self.columns, &self.primary_keys, row))
                .collect(),
            (_, SyncMode::Upsert) => vec![dialect.build_upsert(
                table,
                &self.columns,
                &self.primary_keys,
                &self.rows,
            )],
        }
    }
}

/// A writable row set.
#[async_trait]
pub trait RowTarget: RowSource {
    /// SQL dialect batches are rendered in.
    fn dialect(&self) -> &DialectImpl;

    /// Qualified table name batches are rendered against.
    fn qualified_name(&self) -> String {
        let t = self.table_ref();
        self.dialect().qualify(&t.schema, &t.table)
    }

    /// Apply one batch atomically. `statements` is the batch rendered by
    /// [`MutationBatch::render`]. Returns rows affected.
    async fn apply_batch(&self, batch: &MutationBatch, statements: &[String]) -> Result<u64>;
}

/// A table on a connector, read with `ORDER BY pk LIMIT/OFFSET` paging.
pub struct TableSource<'a> {
    connector: &'a dyn Connector,
    schema: String,
    table: String,
    dialect: DialectImpl,
}

impl<'a> TableSource<'a> {
    /// Validates identifiers before any SQL is built.
    pub fn new(connector: &'a dyn Connector, schema: &str, table: &str) -> Result<Self> {
        validate_all(&[schema, table])?;
        Ok(Self {
            connector,
            schema: schema.to_string(),
            table: table.to_string(),
            dialect: DialectImpl::for_engine(connector.engine()),
        })
    }

    pub fn connector(&self) -> &'a dyn Connector {
        self.connector
    }
}

#[async_trait]
impl<'a> RowSource for TableSource<'a> {
    fn table_ref(&self) -> TableRef {
        TableRef::new(self.connector.connection_id(), &self.schema, &self.table)
    }

    async fn columns(&self) -> Result<Vec<String>> {
        let schema = self.connector.get_table_schema(&self.schema, &self.table).await?;
        Ok(schema.column_names())
    }

    async fn scan_page(
        &self,
        columns: &[String],
        order_by: &[String],
        offset: usize,
        limit: usize,
    ) -> Result<Vec<Row>> {
        validate_all(columns)?;
        validate_all(order_by)?;
        let sql = self.dialect.build_select_query(&SelectQueryOptions {
            schema: self.schema.clone(),
            table: self.table.clone(),
            columns: columns.to_vec(),
            order_by: order_by.to_vec(),
            where_clause: None,
            limit: Some(limit),
            offset: Some(offset),
        });
        debug!("{}: scanning page at offset {}", self.table_ref(), offset);
        Ok(self.connector.query(&sql, &[]).await?.rows)
    }

    async fn fetch_rows(&self, columns: &[String], pk_columns: &[String], keys: &[Row]) -> Result<Vec<Row>> {
        if keys.is_empty() {
            return Ok(Vec::new());
        }
        validate_all(columns)?;
        validate_all(pk_columns)?;
        let sql = self.dialect.build_select_query(&SelectQueryOptions {
            schema: self.schema.clone(),
            table: self.table.clone(),
            columns: columns.to_vec(),
            order_by: pk_columns.to_vec(),
            where_clause: Some(self.dialect.key_predicate(pk_columns, keys)),
            limit: None,
            offset: None,
        });
        Ok(self.connector.query(&sql, &[]).await?.rows)
    }
}

/// A connector table receiving batches, each in one transaction.
pub struct TableTarget<'a> {
    inner: TableSource<'a>,
}

impl<'a> TableTarget<'a> {
    pub fn new(connector: &'a dyn Connector, schema: &str, table: &str) -> Result<Self> {
        Ok(Self {
            inner: TableSource::new(connector, schema, table)?,
        })
    }
}

#[async_trait]
impl<'a> RowSource for TableTarget<'a> {
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
impl<'a> RowTarget for TableTarget<'a> {
    fn dialect(&self) -> &DialectImpl {
        &self.inner.dialect
    }

    async fn apply_batch(&self, _batch: &MutationBatch, statements: &[String]) -> Result<u64> {
        if statements.is_empty() {
            return Ok(0);
        }
        self.inner.connector.execute_transaction(statements).await
    }
}
