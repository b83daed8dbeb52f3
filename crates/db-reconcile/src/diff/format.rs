//! Human-readable rendering of a schema diff.

use std::fmt;

use super::{DiffKind, ElementSnapshot, SchemaDiff, SchemaDiffItem};

impl DiffKind {
    /// `+` for additions, `-` for removals, `~` for modifications.
    pub fn marker(&self) -> char {
        match self {
            DiffKind::TableAdded
            | DiffKind::ColumnAdded
            | DiffKind::IndexAdded
            | DiffKind::FkAdded => '+',
            DiffKind::TableRemoved
            | DiffKind::ColumnRemoved
            | DiffKind::IndexRemoved
            | DiffKind::FkRemoved => '-',
            DiffKind::ColumnModified | DiffKind::IndexModified | DiffKind::FkModified => '~',
        }
    }

    fn noun(&self) -> &'static str {
        match self {
            DiffKind::TableAdded | DiffKind::TableRemoved => "table",
            DiffKind::ColumnAdded | DiffKind::ColumnRemoved | DiffKind::ColumnModified => "column",
            DiffKind::IndexAdded | DiffKind::IndexRemoved | DiffKind::IndexModified => "index",
            DiffKind::FkAdded | DiffKind::FkRemoved | DiffKind::FkModified => "foreign key",
        }
    }
}

impl fmt::Display for DiffKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

fn describe(snapshot: &ElementSnapshot) -> String {
    match snapshot {
        ElementSnapshot::Table(t) => format!("{} columns", t.columns.len()),
        ElementSnapshot::Column(c) => {
            let nullable = if c.nullable { "" } else { " not null" };
            match c.default_value {
                Some(ref d) => format!("{}{} default {}", c.data_type, nullable, d),
                None => format!("{}{}", c.data_type, nullable),
            }
        }
        ElementSnapshot::Index(i) => format!(
            "{}({})",
            if i.is_unique { "unique " } else { "" },
            i.columns.join(", ")
        ),
        ElementSnapshot::ForeignKey(fk) => format!(
            "({}) -> {}.{}({})",
            fk.columns.join(", "),
            fk.ref_schema,
            fk.ref_table,
            fk.ref_columns.join(", ")
        ),
    }
}

impl fmt::Display for SchemaDiffItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} ", self.kind.marker(), self.kind.noun())?;
        match self.name {
            Some(ref name) => write!(f, "{}.{}", self.table, name)?,
            None => write!(f, "{}", self.table)?,
        }
        match (&self.source, &self.target) {
            (Some(s), Some(t)) => write!(f, ": {} -> {}", describe(t), describe(s))?,
            (Some(s), None) => write!(f, ": {}", describe(s))?,
            (None, Some(t)) => write!(f, ": {}", describe(t))?,
            (None, None) => {}
        }
        if let Some(ref note) = self.note {
            write!(f, " ({})", note)?;
        }
        Ok(())
    }
}

impl fmt::Display for SchemaDiff {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "{}:{} -> {}:{}",
            self.source_connection, self.source_schema, self.target_connection, self.target_schema
        )?;
        if self.is_empty() {
            return writeln!(f, "No changes detected.");
        }

        writeln!(f, "Changes detected:\n")?;
        for item in &self.items {
            writeln!(f, "  {}", item)?;
        }

        let counts = self
            .summary
            .counts
            .iter()
            .filter(|(_, n)| **n > 0)
            .map(|(k, n)| format!("{} {}", n, k))
            .collect::<Vec<_>>();
        writeln!(f, "\n{} changes: {}", self.summary.total, counts.join(", "))
    }
}
