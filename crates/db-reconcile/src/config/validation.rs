//! Configuration validation.

use super::{Config, ConnectionConfig};
use crate::core::identifier::validate_identifier;
use crate::core::schema::EngineKind;
use crate::drivers::SslMode;
use crate::error::{ReconcileError, Result};

/// Validate the configuration.
pub fn validate(config: &Config) -> Result<()> {
    validate_connection("source", &config.source)?;
    validate_connection("target", &config.target)?;

    if config.source.connection_id() == config.target.connection_id()
        && config.source.default_schema()? == config.target.default_schema()?
    {
        return Err(ReconcileError::Config(
            "source and target cannot be the same database and schema".into(),
        ));
    }

    if config.sync.batch_size == 0 {
        return Err(ReconcileError::Config("sync.batch_size must be at least 1".into()));
    }
    if config.sync.continue_on_error && config.sync.max_errors == 0 {
        return Err(ReconcileError::Config(
            "sync.max_errors must be at least 1 with continue_on_error".into(),
        ));
    }

    Ok(())
}

fn validate_connection(side: &str, conn: &ConnectionConfig) -> Result<()> {
    let engine = conn
        .engine()
        .map_err(|e| ReconcileError::Config(format!("{}.type: {}", side, e)))?;

    match engine {
        EngineKind::Sqlite => {
            if conn.path.as_deref().map_or(true, str::is_empty) {
                return Err(ReconcileError::Config(format!("{}.path is required for sqlite", side)));
            }
        }
        _ => {
            if conn.host.is_empty() {
                return Err(ReconcileError::Config(format!("{}.host is required", side)));
            }
            if conn.database.is_empty() {
                return Err(ReconcileError::Config(format!("{}.database is required", side)));
            }
            if conn.user.is_empty() {
                return Err(ReconcileError::Config(format!("{}.user is required", side)));
            }
        }
    }

    SslMode::parse(&conn.ssl_mode)
        .map_err(|e| ReconcileError::Config(format!("{}.ssl_mode: {}", side, e)))?;

    if let Some(ref schema) = conn.schema {
        validate_identifier(schema)
            .map_err(|e| ReconcileError::Config(format!("{}.schema: {}", side, e)))?;
    }

    if conn.max_connections == 0 {
        return Err(ReconcileError::Config(format!(
            "{}.max_connections must be at least 1",
            side
        )));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::HistoryConfig;
    use crate::sync::SyncOptions;

    fn pg(database: &str) -> ConnectionConfig {
        ConnectionConfig {
            r#type: "postgres".to_string(),
            name: None,
            host: "localhost".to_string(),
            port: None,
            database: database.to_string(),
            user: "postgres".to_string(),
            password: "password".to_string(),
            schema: None,
            ssl_mode: "disable".to_string(),
            path: None,
            max_connections: 4,
        }
    }

    fn valid_config() -> Config {
        Config {
            source: pg("source_db"),
            target: pg("target_db"),
            sync: SyncOptions::default(),
            history: HistoryConfig::default(),
        }
    }

    #[test]
    fn test_valid_config() {
        assert!(validate(&valid_config()).is_ok());
    }

    #[test]
    fn test_missing_host() {
        let mut config = valid_config();
        config.source.host = String::new();
        let err = validate(&config).unwrap_err();
        assert!(err.to_string().contains("source.host"));
    }

    #[test]
    fn test_unknown_type() {
        let mut config = valid_config();
        config.target.r#type = "oracle".to_string();
        let err = validate(&config).unwrap_err();
        assert!(err.to_string().contains("target.type"));
    }

    #[test]
    fn test_sqlite_requires_path() {
        let mut config = valid_config();
        config.target.r#type = "sqlite".to_string();
        assert!(validate(&config).is_err());
        config.target.path = Some("/tmp/db.sqlite".to_string());
        assert!(validate(&config).is_ok());
    }

    #[test]
    fn test_same_database_rejected() {
        let mut config = valid_config();
        config.target = config.source.clone();
        assert!(validate(&config).is_err());

        config.target.schema = Some("staging".to_string());
        assert!(validate(&config).is_ok());
    }

    #[test]
    fn test_bad_ssl_mode() {
        let mut config = valid_config();
        config.source.ssl_mode = "sometimes".to_string();
        assert!(validate(&config).is_err());
    }

    #[test]
    fn test_zero_batch_size() {
        let mut config = valid_config();
        config.sync.batch_size = 0;
        assert!(validate(&config).is_err());
    }

    #[test]
    fn test_debug_redacts_password() {
        let mut config = valid_config();
        config.source.password = "super_secret_password_123".to_string();
        let debug_output = format!("{:?}", config.source);
        assert!(debug_output.contains("[REDACTED]"));
        assert!(!debug_output.contains("super_secret_password_123"));
    }
}
