//! Cross-engine type comparison.
//!
//! Normalized types keep each engine's own spelling (`int4`, `int(11)`,
//! `INTEGER`). To compare across engines, and to render a source column in
//! the target's dialect, types are mapped onto a small canonical vocabulary.

use crate::core::schema::EngineKind;

/// Outcome of comparing two column types.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypeComparison {
    Equal,
    Different,
    /// Engines differ and at least one side has no canonical mapping.
    Incomparable,
}

/// Map an engine type spelling onto the canonical vocabulary.
///
/// Returns `None` for types with no portable equivalent (enums, arrays,
/// unsigned integers, geometry, ...).
pub fn canonical_type(engine: EngineKind, data_type: &str) -> Option<String> {
    let lowered = data_type.trim().to_lowercase();
    let (base, args) = split_args(&lowered);

    if engine.is_mysql_family() && lowered.ends_with("unsigned") {
        return None;
    }
    if base.ends_with("[]") {
        return None;
    }

    let canonical = match base {
        "int2" | "smallint" | "smallserial" => "smallint".to_string(),
        "int" | "int4" | "integer" | "serial" | "mediumint" => "integer".to_string(),
        "int8" | "bigint" | "bigserial" => "bigint".to_string(),
        "tinyint" if args == Some("1") => "boolean".to_string(),
        "tinyint" => "smallint".to_string(),
        "bool" | "boolean" => "boolean".to_string(),
        "text" | "tinytext" | "mediumtext" | "longtext" | "clob" => "text".to_string(),
        "varchar" | "character varying" | "nvarchar" => match args {
            Some(n) => format!("varchar({})", n),
            None => "text".to_string(),
        },
        "char" | "bpchar" | "character" | "nchar" => format!("char({})", args.unwrap_or("1")),
        "numeric" | "decimal" => match args {
            Some(a) if a.contains(',') => format!("numeric({})", a.replace(' ', "")),
            Some(p) => format!("numeric({},0)", p),
            None => "numeric".to_string(),
        },
        "real" | "float4" => "real".to_string(),
        "float" if engine.is_mysql_family() => "real".to_string(),
        "float" | "float8" | "double" | "double precision" => "double".to_string(),
        "date" => "date".to_string(),
        "time" | "time without time zone" => "time".to_string(),
        "timestamp" | "timestamp without time zone" | "datetime" => "timestamp".to_string(),
        "timestamptz" | "timestamp with time zone" => "timestamptz".to_string(),
        "bytea" | "blob" | "tinyblob" | "mediumblob" | "longblob" | "binary" | "varbinary" => {
            "bytes".to_string()
        }
        "uuid" => "uuid".to_string(),
        "json" | "jsonb" => "json".to_string(),
        _ => return None,
    };
    Some(canonical)
}

/// Spell a canonical type for the given engine.
pub fn render_type(engine: EngineKind, canonical: &str) -> String {
    let (base, args) = split_args(canonical);
    let with_args = |name: &str| match args {
        Some(a) => format!("{}({})", name, a),
        None => name.to_string(),
    };

    match engine {
        EngineKind::Postgres => match base {
            "double" => "double precision".to_string(),
            "bytes" => "bytea".to_string(),
            "json" => "jsonb".to_string(),
            _ => canonical.to_string(),
        },
        EngineKind::Mysql | EngineKind::Mariadb => match base {
            "integer" => "int".to_string(),
            "boolean" => "tinyint(1)".to_string(),
            "numeric" => with_args("decimal"),
            "real" => "float".to_string(),
            "timestamp" => "datetime".to_string(),
            "timestamptz" => "timestamp".to_string(),
            "bytes" => "longblob".to_string(),
            "uuid" => "char(36)".to_string(),
            _ => canonical.to_string(),
        },
        EngineKind::Sqlite => match base {
            "smallint" | "integer" | "bigint" => "INTEGER".to_string(),
            "boolean" => "BOOLEAN".to_string(),
            "text" | "uuid" | "json" => "TEXT".to_string(),
            "varchar" => with_args("VARCHAR"),
            "char" => with_args("CHAR"),
            "numeric" => with_args("NUMERIC"),
            "real" | "double" => "REAL".to_string(),
            "timestamp" | "timestamptz" => "DATETIME".to_string(),
            "date" => "DATE".to_string(),
            "time" => "TIME".to_string(),
            "bytes" => "BLOB".to_string(),
            _ => canonical.to_uppercase(),
        },
    }
}

/// Compare a source column type against a target column type.
pub fn compare_types(
    source_engine: EngineKind,
    source_type: &str,
    target_engine: EngineKind,
    target_type: &str,
) -> TypeComparison {
    match (
        canonical_type(source_engine, source_type),
        canonical_type(target_engine, target_type),
    ) {
        (Some(a), Some(b)) if a == b => TypeComparison::Equal,
        (Some(_), Some(_)) => TypeComparison::Different,
        _ if source_type.trim().eq_ignore_ascii_case(target_type.trim()) => {
            TypeComparison::Equal
        }
        _ if same_family(source_engine, target_engine) => TypeComparison::Different,
        _ => TypeComparison::Incomparable,
    }
}

/// Spell a source column type for the target engine.
///
/// Same-family engines keep the spelling verbatim; types without a canonical
/// mapping are also kept verbatim.
pub fn translate_type(source_engine: EngineKind, target_engine: EngineKind, data_type: &str) -> String {
    if same_family(source_engine, target_engine) {
        return data_type.to_string();
    }
    match canonical_type(source_engine, data_type) {
        Some(canonical) => render_type(target_engine, &canonical),
        None => data_type.to_string(),
    }
}

/// Whether two engines share type spelling.
pub fn same_family(a: EngineKind, b: EngineKind) -> bool {
    a == b || (a.is_mysql_family() && b.is_mysql_family())
}

fn split_args(t: &str) -> (&str, Option<&str>) {
    match (t.find('('), t.rfind(')')) {
        (Some(open), Some(close)) if close > open => {
            (t[..open].trim(), Some(t[open + 1..close].trim()))
        }
        _ => (t, None),
    }
}
