//! Per-table comparison: columns, indexes and foreign keys.

use crate::core::schema::{ColumnInfo, EngineKind, ForeignKeyInfo, IndexInfo, TableSchema};
use crate::core::traits::{ColumnChanges, Dialect};
use crate::drivers::DialectImpl;

use super::types::{compare_types, same_family, translate_type, TypeComparison};
use super::{
    DiffContext, DiffKind, ElementSnapshot, MigrationPhase, MigrationStatement, SchemaDiffItem,
};

/// Renders diff items for one comparison context.
pub(super) struct TableDiffer<'a> {
    ctx: &'a DiffContext,
    dialect: &'a DialectImpl,
}

/// A diff item under construction. The item's phase follows its first
/// statement; items without SQL keep the phase they were started with.
struct ItemBuilder {
    item: SchemaDiffItem,
    notes: Vec<String>,
}

impl ItemBuilder {
    fn source(mut self, snapshot: ElementSnapshot) -> Self {
        self.item.source = Some(snapshot);
        self
    }

    fn target(mut self, snapshot: ElementSnapshot) -> Self {
        self.item.target = Some(snapshot);
        self
    }

    fn statement(mut self, phase: MigrationPhase, sql: String) -> Self {
        self.item.statements.push(MigrationStatement::new(phase, sql));
        self
    }

    fn statements(mut self, statements: Vec<MigrationStatement>) -> Self {
        self.item.statements.extend(statements);
        self
    }

    fn notes(mut self, notes: Vec<String>) -> Self {
        self.notes.extend(notes);
        self
    }

    fn build(mut self) -> SchemaDiffItem {
        if let Some(first) = self.item.statements.first() {
            self.item.phase = first.phase;
        }
        if !self.notes.is_empty() {
            self.item.note = Some(self.notes.join("; "));
        }
        self.item
    }
}

impl<'a> TableDiffer<'a> {
    pub(super) fn new(ctx: &'a DiffContext, dialect: &'a DialectImpl) -> Self {
        Self { ctx, dialect }
    }

    fn qualified(&self, table: &str) -> String {
        self.dialect.qualify(&self.ctx.target_schema, table)
    }

    fn same_family(&self) -> bool {
        same_family(self.ctx.source_engine, self.ctx.target_engine)
    }

    /// Source column spelled for the target engine. Defaults are engine
    /// expressions and only carried within one engine family; otherwise the
    /// target's current default (if any) is kept.
    fn render_column(&self, column: &ColumnInfo, current: Option<&ColumnInfo>) -> ColumnInfo {
        let mut rendered = column.clone();
        rendered.data_type = translate_type(
            self.ctx.source_engine,
            self.ctx.target_engine,
            &column.data_type,
        );
        if !self.same_family() {
            rendered.default_value = current.and_then(|c| c.default_value.clone());
        }
        rendered
    }

    /// References into the source schema point at the target schema.
    fn remap_fk(&self, fk: &ForeignKeyInfo) -> ForeignKeyInfo {
        let mut remapped = fk.clone();
        if fk.ref_schema == self.ctx.source_schema {
            remapped.ref_schema = self.ctx.target_schema.clone();
        }
        remapped
    }

    fn render_table(&self, table: &TableSchema) -> TableSchema {
        TableSchema {
            schema: self.ctx.target_schema.clone(),
            name: table.name.clone(),
            columns: table
                .columns
                .iter()
                .map(|c| self.render_column(c, None))
                .collect(),
            indexes: table.indexes.clone(),
            foreign_keys: table.foreign_keys.iter().map(|f| self.remap_fk(f)).collect(),
            primary_key: table.primary_key.clone(),
        }
    }

    /// Start an item for `table`; `phase` applies when it carries no SQL.
    fn item(
        &self,
        kind: DiffKind,
        table: &str,
        name: Option<&str>,
        phase: MigrationPhase,
    ) -> ItemBuilder {
        ItemBuilder {
            item: SchemaDiffItem {
                kind,
                schema: self.ctx.target_schema.clone(),
                table: table.to_string(),
                name: name.map(String::from),
                source: None,
                target: None,
                phase,
                statements: Vec::new(),
                note: None,
            },
            notes: Vec::new(),
        }
    }

    pub(super) fn table_added(&self, desired: &TableSchema) -> SchemaDiffItem {
        let table = self.qualified(&desired.name);
        let rendered = self.render_table(desired);

        let mut item = self
            .item(DiffKind::TableAdded, &desired.name, None, MigrationPhase::CreateTables)
            .source(ElementSnapshot::Table(desired.clone()))
            .statement(
                MigrationPhase::CreateTables,
                self.dialect.create_table(&table, &rendered),
            );
        for idx in &rendered.indexes {
            item = item.statement(
                MigrationPhase::CreateConstraints,
                self.dialect.create_index(&table, idx),
            );
        }
        if self.dialect.supports_constraint_ddl() {
            for fk in &rendered.foreign_keys {
                item = item.statement(
                    MigrationPhase::CreateConstraints,
                    self.dialect.add_foreign_key(&table, fk),
                );
            }
        }
        item.build()
    }

    pub(super) fn table_removed(&self, current: &TableSchema) -> SchemaDiffItem {
        let table = self.qualified(&current.name);
        let mut item = self
            .item(DiffKind::TableRemoved, &current.name, None, MigrationPhase::DropTables)
            .target(ElementSnapshot::Table(current.clone()));
        if self.dialect.supports_constraint_ddl() {
            for fk in &current.foreign_keys {
                item = item.statement(
                    MigrationPhase::DropRemovedTableConstraints,
                    self.dialect.drop_foreign_key(&table, &fk.name),
                );
            }
        }
        item.statement(MigrationPhase::DropTables, self.dialect.drop_table(&table))
            .build()
    }

    /// Diff two tables with the same name.
    pub(super) fn diff_table(
        &self,
        desired: &TableSchema,
        current: &TableSchema,
    ) -> Vec<SchemaDiffItem> {
        let mut items = self.diff_columns(desired, current);
        items.extend(self.diff_indexes(desired, current));
        items.extend(self.diff_foreign_keys(desired, current));
        items
    }

    fn diff_columns(&self, desired: &TableSchema, current: &TableSchema) -> Vec<SchemaDiffItem> {
        let table = self.qualified(&desired.name);
        let mut items = Vec::new();

        for col in &desired.columns {
            if current.column(&col.name).is_none() {
                items.push(self.column_added(desired, &table, col));
            }
        }

        for col in &current.columns {
            if desired.column(&col.name).is_none() {
                items.push(
                    self.item(
                        DiffKind::ColumnRemoved,
                        &desired.name,
                        Some(&col.name),
                        MigrationPhase::DropColumns,
                    )
                    .target(ElementSnapshot::Column(col.clone()))
                    .statement(
                        MigrationPhase::DropColumns,
                        self.dialect.drop_column(&table, &col.name),
                    )
                    .build(),
                );
            }
        }

        for desired_col in &desired.columns {
            if let Some(current_col) = current.column(&desired_col.name) {
                if let Some(item) =
                    self.column_modified(desired, current, &table, desired_col, current_col)
                {
                    items.push(item);
                }
            }
        }

        items
    }

    fn column_added(&self, desired: &TableSchema, table: &str, col: &ColumnInfo) -> SchemaDiffItem {
        let rendered = self.render_column(col, None);
        let mut notes = Vec::new();
        let mut statements = vec![MigrationStatement::new(
            MigrationPhase::AddColumns,
            self.dialect.add_column(table, &rendered),
        )];

        let generated = rendered.is_identity && self.dialect.identity_clause().is_some();
        if !rendered.nullable && rendered.default_value.is_none() && !generated {
            notes.push("NOT NULL column without default fails on a non-empty table".to_string());
        }
        if col.is_unique && !desired.has_unique_index_on(&col.name) {
            if self.dialect.supports_constraint_ddl() {
                statements.push(MigrationStatement::new(
                    MigrationPhase::CreateConstraints,
                    self.dialect
                        .add_unique(table, &unique_name(&desired.name, &col.name), &col.name),
                ));
            } else {
                notes.push(format!(
                    "{} cannot add a unique constraint to an existing table",
                    self.dialect.name()
                ));
            }
        }

        self.item(
            DiffKind::ColumnAdded,
            &desired.name,
            Some(&col.name),
            MigrationPhase::AddColumns,
        )
        .source(ElementSnapshot::Column(col.clone()))
        .statements(statements)
        .notes(notes)
        .build()
    }

    /// Compare data type, nullability, default, identity and uniqueness.
    /// Comments are not compared.
    fn column_modified(
        &self,
        desired: &TableSchema,
        current: &TableSchema,
        table: &str,
        d: &ColumnInfo,
        c: &ColumnInfo,
    ) -> Option<SchemaDiffItem> {
        let source_engine = self.ctx.source_engine;
        let target_engine = self.ctx.target_engine;
        let mut changes = ColumnChanges::default();
        let mut notes = Vec::new();

        match compare_types(source_engine, &d.data_type, target_engine, &c.data_type) {
            TypeComparison::Equal => {}
            TypeComparison::Different => changes.data_type = true,
            TypeComparison::Incomparable => notes.push(format!(
                "type mismatch: {} ({}) vs {} ({})",
                d.data_type, source_engine, c.data_type, target_engine
            )),
        }

        if d.nullable != c.nullable {
            changes.nullable = true;
        }

        if self.same_family() {
            if d.default_value != c.default_value {
                changes.default_value = true;
            }
        } else if !defaults_equivalent(d.default_value.as_deref(), c.default_value.as_deref()) {
            // Default expressions are engine SQL; report, never rewrite
            notes.push(format!(
                "default mismatch: {} ({}) vs {} ({})",
                d.default_value.as_deref().unwrap_or("none"),
                source_engine,
                c.default_value.as_deref().unwrap_or("none"),
                target_engine
            ));
        }

        if d.is_identity != c.is_identity
            && tracks_identity(source_engine)
            && tracks_identity(target_engine)
        {
            notes.push(format!(
                "identity mismatch: {} ({}) vs {} ({})",
                identity_label(d),
                source_engine,
                identity_label(c),
                target_engine
            ));
        }

        // Uniqueness backed by an index is reconciled by the index diff
        let add_unique = d.is_unique && !c.is_unique && !desired.has_unique_index_on(&d.name);
        let drop_unique = !d.is_unique && c.is_unique && !current.has_unique_index_on(&c.name);

        if !changes.any() && !add_unique && !drop_unique && notes.is_empty() {
            return None;
        }

        let rendered = self.render_column(d, Some(c));
        let mut statements = Vec::new();

        if changes.any() {
            if self.dialect.supports_alter_column() {
                statements.extend(
                    self.dialect
                        .alter_column(table, &rendered, changes)
                        .into_iter()
                        .map(|sql| MigrationStatement::new(MigrationPhase::ModifyColumns, sql)),
                );
            } else {
                notes.push(format!(
                    "{} cannot alter column {} in place; rebuild the table",
                    self.dialect.name(),
                    d.name
                ));
            }
        }

        if add_unique || drop_unique {
            let name = unique_name(&desired.name, &d.name);
            if self.dialect.supports_constraint_ddl() {
                let sql = if add_unique {
                    self.dialect.add_unique(table, &name, &d.name)
                } else {
                    self.dialect.drop_unique(table, &name)
                };
                statements.push(MigrationStatement::new(MigrationPhase::ModifyColumns, sql));
            } else {
                notes.push(format!(
                    "{} cannot change uniqueness of {} in place; rebuild the table",
                    self.dialect.name(),
                    d.name
                ));
            }
        }

        Some(
            self.item(
                DiffKind::ColumnModified,
                &desired.name,
                Some(&d.name),
                MigrationPhase::ModifyColumns,
            )
            .source(ElementSnapshot::Column(d.clone()))
            .target(ElementSnapshot::Column(c.clone()))
            .statements(statements)
            .notes(notes)
            .build(),
        )
    }

    fn diff_indexes(&self, desired: &TableSchema, current: &TableSchema) -> Vec<SchemaDiffItem> {
        let table = self.qualified(&desired.name);
        let schema = &self.ctx.target_schema;
        let mut items = Vec::new();

        for idx in desired.indexes.iter().filter(|i| !i.is_primary) {
            let source = ElementSnapshot::Index(idx.clone());
            match current.index(&idx.name) {
                None => items.push(
                    self.item(
                        DiffKind::IndexAdded,
                        &desired.name,
                        Some(&idx.name),
                        MigrationPhase::CreateConstraints,
                    )
                    .source(source)
                    .statement(
                        MigrationPhase::CreateConstraints,
                        self.dialect.create_index(&table, idx),
                    )
                    .build(),
                ),
                Some(cur) if !indexes_equal(idx, cur) => items.push(
                    self.item(
                        DiffKind::IndexModified,
                        &desired.name,
                        Some(&idx.name),
                        MigrationPhase::DropConstraints,
                    )
                    .source(source)
                    .target(ElementSnapshot::Index(cur.clone()))
                    .statement(
                        MigrationPhase::DropConstraints,
                        self.dialect.drop_index(&table, schema, &cur.name),
                    )
                    .statement(
                        MigrationPhase::CreateConstraints,
                        self.dialect.create_index(&table, idx),
                    )
                    .build(),
                ),
                Some(_) => {}
            }
        }

        for idx in current.indexes.iter().filter(|i| !i.is_primary) {
            if desired.index(&idx.name).is_none() {
                items.push(
                    self.item(
                        DiffKind::IndexRemoved,
                        &desired.name,
                        Some(&idx.name),
                        MigrationPhase::DropConstraints,
                    )
                    .target(ElementSnapshot::Index(idx.clone()))
                    .statement(
                        MigrationPhase::DropConstraints,
                        self.dialect.drop_index(&table, schema, &idx.name),
                    )
                    .build(),
                );
            }
        }

        items
    }

    fn diff_foreign_keys(
        &self,
        desired: &TableSchema,
        current: &TableSchema,
    ) -> Vec<SchemaDiffItem> {
        let table = self.qualified(&desired.name);
        let ddl = self.dialect.supports_constraint_ddl();
        let unsupported = || {
            if ddl {
                Vec::new()
            } else {
                vec![format!(
                    "{} cannot alter foreign keys on an existing table; rebuild the table",
                    self.dialect.name()
                )]
            }
        };
        let mut items = Vec::new();

        for fk in &desired.foreign_keys {
            let rendered = self.remap_fk(fk);
            match current.foreign_key(&fk.name) {
                None => {
                    let mut item = self
                        .item(
                            DiffKind::FkAdded,
                            &desired.name,
                            Some(&fk.name),
                            MigrationPhase::CreateConstraints,
                        )
                        .source(ElementSnapshot::ForeignKey(fk.clone()))
                        .notes(unsupported());
                    if ddl {
                        item = item.statement(
                            MigrationPhase::CreateConstraints,
                            self.dialect.add_foreign_key(&table, &rendered),
                        );
                    }
                    items.push(item.build());
                }
                Some(cur) if !self.foreign_keys_equal(&rendered, cur) => {
                    let mut item = self
                        .item(
                            DiffKind::FkModified,
                            &desired.name,
                            Some(&fk.name),
                            MigrationPhase::DropConstraints,
                        )
                        .source(ElementSnapshot::ForeignKey(fk.clone()))
                        .target(ElementSnapshot::ForeignKey(cur.clone()))
                        .notes(unsupported());
                    if ddl {
                        item = item
                            .statement(
                                MigrationPhase::DropConstraints,
                                self.dialect.drop_foreign_key(&table, &cur.name),
                            )
                            .statement(
                                MigrationPhase::CreateConstraints,
                                self.dialect.add_foreign_key(&table, &rendered),
                            );
                    }
                    items.push(item.build());
                }
                Some(_) => {}
            }
        }

        for fk in &current.foreign_keys {
            if desired.foreign_key(&fk.name).is_none() {
                let mut item = self
                    .item(
                        DiffKind::FkRemoved,
                        &desired.name,
                        Some(&fk.name),
                        MigrationPhase::DropConstraints,
                    )
                    .target(ElementSnapshot::ForeignKey(fk.clone()))
                    .notes(unsupported());
                if ddl {
                    item = item.statement(
                        MigrationPhase::DropConstraints,
                        self.dialect.drop_foreign_key(&table, &fk.name),
                    );
                }
                items.push(item.build());
            }
        }

        items
    }

    /// `desired` is already remapped into the target schema.
    fn foreign_keys_equal(&self, desired: &ForeignKeyInfo, current: &ForeignKeyInfo) -> bool {
        let actions_equal = |a: &str, b: &str| {
            a == b || (!self.same_family() && is_no_action(a) && is_no_action(b))
        };
        desired.columns == current.columns
            && desired.ref_schema == current.ref_schema
            && desired.ref_table == current.ref_table
            && desired.ref_columns == current.ref_columns
            && actions_equal(&desired.on_delete, &current.on_delete)
            && actions_equal(&desired.on_update, &current.on_update)
    }
}

fn indexes_equal(a: &IndexInfo, b: &IndexInfo) -> bool {
    a.columns == b.columns && a.is_unique == b.is_unique && a.index_type == b.index_type
}

/// `RESTRICT` and `NO ACTION` differ only in deferral timing, which engines
/// outside Postgres do not model.
fn is_no_action(action: &str) -> bool {
    action == "NO ACTION" || action == "RESTRICT"
}

/// SQLite has no identity attribute to introspect; `INTEGER PRIMARY KEY`
/// aliases the rowid instead.
fn tracks_identity(engine: EngineKind) -> bool {
    engine != EngineKind::Sqlite
}

fn identity_label(column: &ColumnInfo) -> &'static str {
    if column.is_identity {
        "identity"
    } else {
        "plain"
    }
}

/// Cross-engine default comparison on the literal alone. Postgres casts
/// (`'new'::text`) and enclosing parentheses are dropped, bare expressions
/// compare case-insensitively and `NULL` equals no default.
fn defaults_equivalent(a: Option<&str>, b: Option<&str>) -> bool {
    default_literal(a) == default_literal(b)
}

fn default_literal(default: Option<&str>) -> Option<String> {
    let mut s = default?.trim();
    while let Some((head, cast)) = s.rsplit_once("::") {
        let is_type = !cast.is_empty()
            && cast.matches('(').count() == cast.matches(')').count()
            && cast
                .chars()
                .all(|ch| ch.is_ascii_alphanumeric() || " _()[],\"".contains(ch));
        if !is_type {
            break;
        }
        s = head.trim_end();
    }
    while let Some(inner) = s.strip_prefix('(').and_then(|t| t.strip_suffix(')')) {
        s = inner.trim();
    }
    if let Some(quoted) = s.strip_prefix('\'').and_then(|t| t.strip_suffix('\'')) {
        return Some(quoted.to_string());
    }
    if s.eq_ignore_ascii_case("null") {
        return None;
    }
    Some(s.to_lowercase())
}

/// Constraint name for a single-column unique constraint.
fn unique_name(table: &str, column: &str) -> String {
    format!("{}_{}_key", table, column)
}
