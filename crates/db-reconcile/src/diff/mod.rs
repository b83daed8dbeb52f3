//! Schema diffing: compare two sets of canonical tables and produce the
//! migration SQL that aligns the target with the source.
//!
//! Direction convention: the **source is the desired state**. A table only in
//! the source is `table_added` (create it on the target); a column only in the
//! target is `column_removed` (drop it from the target).
//!
//! ## Ordering
//!
//! Every statement carries a [`MigrationPhase`]. Items are sorted by the phase
//! of their first statement and [`get_migration_sql`] flattens statements by
//! phase, so that for example a column added to a surviving table always runs
//! before an FK drop on a removed table, and index/FK drops always run before
//! the column changes they would block.

mod format;
mod table;
pub mod types;

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::core::schema::{ColumnInfo, EngineKind, ForeignKeyInfo, IndexInfo, TableSchema};
use crate::drivers::DialectImpl;

/// Kind of a single schema difference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiffKind {
    TableAdded,
    TableRemoved,
    ColumnAdded,
    ColumnRemoved,
    ColumnModified,
    IndexAdded,
    IndexRemoved,
    IndexModified,
    FkAdded,
    FkRemoved,
    FkModified,
}

impl DiffKind {
    /// All kinds, in summary order.
    pub const ALL: [DiffKind; 11] = [
        DiffKind::TableAdded,
        DiffKind::TableRemoved,
        DiffKind::ColumnAdded,
        DiffKind::ColumnRemoved,
        DiffKind::ColumnModified,
        DiffKind::IndexAdded,
        DiffKind::IndexRemoved,
        DiffKind::IndexModified,
        DiffKind::FkAdded,
        DiffKind::FkRemoved,
        DiffKind::FkModified,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            DiffKind::TableAdded => "table_added",
            DiffKind::TableRemoved => "table_removed",
            DiffKind::ColumnAdded => "column_added",
            DiffKind::ColumnRemoved => "column_removed",
            DiffKind::ColumnModified => "column_modified",
            DiffKind::IndexAdded => "index_added",
            DiffKind::IndexRemoved => "index_removed",
            DiffKind::IndexModified => "index_modified",
            DiffKind::FkAdded => "fk_added",
            DiffKind::FkRemoved => "fk_removed",
            DiffKind::FkModified => "fk_modified",
        }
    }
}

/// Execution phase of a migration statement, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MigrationPhase {
    CreateTables,
    AddColumns,
    DropConstraints,
    ModifyColumns,
    DropColumns,
    CreateConstraints,
    DropRemovedTableConstraints,
    DropTables,
}

/// One SQL statement of a diff item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MigrationStatement {
    pub phase: MigrationPhase,
    pub sql: String,
}

impl MigrationStatement {
    fn new(phase: MigrationPhase, sql: String) -> Self {
        Self { phase, sql }
    }
}

/// Snapshot of the schema element a diff item concerns.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "element", rename_all = "snake_case")]
pub enum ElementSnapshot {
    Table(TableSchema),
    Column(ColumnInfo),
    Index(IndexInfo),
    ForeignKey(ForeignKeyInfo),
}

/// A single schema difference with the SQL that reconciles it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchemaDiffItem {
    pub kind: DiffKind,
    pub schema: String,
    pub table: String,
    /// Column, index or constraint name; `None` for table-level items.
    pub name: Option<String>,
    pub source: Option<ElementSnapshot>,
    pub target: Option<ElementSnapshot>,
    /// Ordering phase: the phase of the first statement, or of the operation
    /// the item stands for when it carries no SQL.
    pub phase: MigrationPhase,
    pub statements: Vec<MigrationStatement>,
    pub note: Option<String>,
}

impl SchemaDiffItem {
    /// Items without SQL only report a difference the target dialect cannot
    /// express in place.
    pub fn is_informational(&self) -> bool {
        self.statements.is_empty()
    }
}

/// Count of items per diff kind.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiffSummary {
    pub counts: BTreeMap<DiffKind, usize>,
    pub total: usize,
}

impl DiffSummary {
    /// Summarize a list of items.
    pub fn from_items(items: &[SchemaDiffItem]) -> Self {
        let mut counts: BTreeMap<DiffKind, usize> =
            DiffKind::ALL.iter().map(|k| (*k, 0)).collect();
        for item in items {
            *counts.entry(item.kind).or_default() += 1;
        }
        Self {
            counts,
            total: items.len(),
        }
    }

    /// Number of items of one kind.
    pub fn count(&self, kind: DiffKind) -> usize {
        self.counts.get(&kind).copied().unwrap_or(0)
    }
}

/// Result of comparing two schemas.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchemaDiff {
    pub source_connection: String,
    pub target_connection: String,
    pub source_schema: String,
    pub target_schema: String,
    pub generated_at: DateTime<Utc>,
    pub items: Vec<SchemaDiffItem>,
    pub summary: DiffSummary,
}

impl SchemaDiff {
    /// Returns true if there are no differences.
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Items of one kind.
    pub fn items_of(&self, kind: DiffKind) -> impl Iterator<Item = &SchemaDiffItem> {
        self.items.iter().filter(move |i| i.kind == kind)
    }
}

/// Both sides of a comparison.
#[derive(Debug, Clone)]
pub struct DiffContext {
    pub source_connection: String,
    pub target_connection: String,
    pub source_schema: String,
    pub target_schema: String,
    pub source_engine: EngineKind,
    /// Migration SQL is rendered in this engine's dialect.
    pub target_engine: EngineKind,
}

/// Compare source (desired) tables against target (current) tables.
pub fn compare(source: &[TableSchema], target: &[TableSchema], ctx: &DiffContext) -> SchemaDiff {
    let dialect = DialectImpl::for_engine(ctx.target_engine);
    let differ = table::TableDiffer::new(ctx, &dialect);

    let mut source_sorted: Vec<&TableSchema> = source.iter().collect();
    source_sorted.sort_by(|a, b| a.name.cmp(&b.name));
    let mut target_sorted: Vec<&TableSchema> = target.iter().collect();
    target_sorted.sort_by(|a, b| a.name.cmp(&b.name));

    let mut items = Vec::new();

    for desired in &source_sorted {
        match target_sorted.iter().find(|t| t.name == desired.name) {
            Some(current) => items.extend(differ.diff_table(desired, current)),
            None => items.push(differ.table_added(desired)),
        }
    }

    for current in &target_sorted {
        if !source_sorted.iter().any(|s| s.name == current.name) {
            items.push(differ.table_removed(current));
        }
    }

    // Stable: items within a phase keep table-by-table order
    items.sort_by_key(|i| i.phase);

    let summary = DiffSummary::from_items(&items);
    SchemaDiff {
        source_connection: ctx.source_connection.clone(),
        target_connection: ctx.target_connection.clone(),
        source_schema: ctx.source_schema.clone(),
        target_schema: ctx.target_schema.clone(),
        generated_at: Utc::now(),
        items,
        summary,
    }
}

/// Flatten a diff's statements in phase order, skipping informational items.
pub fn get_migration_sql(diff: &SchemaDiff) -> Vec<String> {
    let mut statements: Vec<&MigrationStatement> =
        diff.items.iter().flat_map(|i| i.statements.iter()).collect();
    statements.sort_by_key(|s| s.phase);
    statements.into_iter().map(|s| s.sql.clone()).collect()
}
