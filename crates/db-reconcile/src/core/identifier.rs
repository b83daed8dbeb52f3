//! Centralized identifier validation and quoting for SQL injection prevention.
//!
//! SQL identifiers (table names, column names, schema names) cannot be passed as
//! parameters in prepared statements - only data values can be parameterized.
//! Every identifier that reaches generated SQL is therefore validated and quoted
//! here:
//!
//! 1. Validate identifiers for suspicious patterns (null bytes, excessive length)
//! 2. Apply engine-specific quoting (double quotes or backticks)
//! 3. Escape the quote character within the identifier

use crate::core::schema::EngineKind;
use crate::error::{ReconcileError, Result};

/// Maximum identifier length (conservative limit across engines).
/// - PostgreSQL: 63 bytes
/// - MySQL: 64 characters
/// - SQLite: unlimited
const MAX_IDENTIFIER_LENGTH: usize = 128;

/// Validate an identifier for security issues.
///
/// Rejects empty identifiers, identifiers containing null bytes, and
/// identifiers exceeding the maximum length.
///
/// # Errors
///
/// Returns `ReconcileError::Config` for invalid identifiers.
pub fn validate_identifier(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(ReconcileError::Config(
            "Identifier cannot be empty".to_string(),
        ));
    }

    if name.contains('\0') {
        return Err(ReconcileError::Config(format!(
            "SECURITY: Identifier contains null byte (possible injection attempt): {:?}",
            name
        )));
    }

    if name.len() > MAX_IDENTIFIER_LENGTH {
        return Err(ReconcileError::Config(format!(
            "SECURITY: Identifier exceeds maximum length of {} bytes (got {} bytes): {:?}",
            MAX_IDENTIFIER_LENGTH,
            name.len(),
            name
        )));
    }

    Ok(())
}

/// Quote a PostgreSQL or SQLite identifier with double quotes.
pub fn quote_pg(name: &str) -> Result<String> {
    validate_identifier(name)?;
    Ok(format!("\"{}\"", name.replace('"', "\"\"")))
}

/// Quote a MySQL identifier using backticks.
pub fn quote_mysql(name: &str) -> Result<String> {
    validate_identifier(name)?;
    Ok(format!("`{}`", name.replace('`', "``")))
}

/// Quote an identifier for the given engine.
pub fn quote_ident(engine: EngineKind, name: &str) -> Result<String> {
    match engine {
        EngineKind::Mysql | EngineKind::Mariadb => quote_mysql(name),
        EngineKind::Postgres | EngineKind::Sqlite => quote_pg(name),
    }
}

/// Qualify a table name with its schema.
///
/// SQLite attaches schemas per database file, and generated statements always
/// run against the connection's main database, so the schema is omitted.
pub fn qualify(engine: EngineKind, schema: &str, table: &str) -> Result<String> {
    match engine {
        EngineKind::Sqlite => quote_pg(table),
        _ => Ok(format!(
            "{}.{}",
            quote_ident(engine, schema)?,
            quote_ident(engine, table)?
        )),
    }
}

/// Validate every identifier in a list, e.g. user-supplied key columns.
pub fn validate_all<S: AsRef<str>>(names: &[S]) -> Result<()> {
    names
        .iter()
        .try_for_each(|n| validate_identifier(n.as_ref()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_identifier_normal() {
        assert!(validate_identifier("users").is_ok());
        assert!(validate_identifier("my_table").is_ok());
        assert!(validate_identifier("column with spaces").is_ok());
        assert!(validate_identifier("日本語").is_ok());
    }

    #[test]
    fn test_validate_identifier_rejects_empty() {
        let result = validate_identifier("");
        assert!(result.unwrap_err().to_string().contains("empty"));
    }

    #[test]
    fn test_validate_identifier_rejects_null_byte() {
        let result = validate_identifier("table\0name");
        assert!(result.unwrap_err().to_string().contains("null byte"));
    }

    #[test]
    fn test_validate_identifier_length_boundary() {
        assert!(validate_identifier(&"a".repeat(MAX_IDENTIFIER_LENGTH)).is_ok());
        let result = validate_identifier(&"a".repeat(MAX_IDENTIFIER_LENGTH + 1));
        assert!(result.unwrap_err().to_string().contains("maximum length"));
    }

    #[test]
    fn test_quote_pg_escapes_double_quote() {
        assert_eq!(quote_pg("users").unwrap(), "\"users\"");
        assert_eq!(quote_pg("table\"name").unwrap(), "\"table\"\"name\"");
    }

    #[test]
    fn test_quote_pg_sql_injection_safely_quoted() {
        let result = quote_pg("Robert'); DROP TABLE Students;--").unwrap();
        assert_eq!(result, "\"Robert'); DROP TABLE Students;--\"");
    }

    #[test]
    fn test_quote_mysql_escapes_backtick() {
        assert_eq!(quote_mysql("users").unwrap(), "`users`");
        assert_eq!(quote_mysql("a`b`c").unwrap(), "`a``b``c`");
    }

    #[test]
    fn test_qualify_per_engine() {
        assert_eq!(
            qualify(EngineKind::Postgres, "public", "users").unwrap(),
            "\"public\".\"users\""
        );
        assert_eq!(
            qualify(EngineKind::Mariadb, "shop", "orders").unwrap(),
            "`shop`.`orders`"
        );
        assert_eq!(qualify(EngineKind::Sqlite, "main", "users").unwrap(), "\"users\"");
    }

    #[test]
    fn test_validate_all() {
        assert!(validate_all(&["id", "tenant_id"]).is_ok());
        assert!(validate_all(&["id", ""]).is_err());
    }
}
