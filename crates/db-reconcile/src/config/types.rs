//! Configuration type definitions.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::core::schema::EngineKind;
use crate::error::{ReconcileError, Result};
use crate::sync::SyncOptions;

/// Root configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Desired-state database.
    pub source: ConnectionConfig,

    /// Database brought in line with the source.
    pub target: ConnectionConfig,

    /// Data sync behavior.
    #[serde(default)]
    pub sync: SyncOptions,

    /// Migration history recording.
    #[serde(default)]
    pub history: HistoryConfig,
}

/// One database connection.
#[derive(Clone, Serialize, Deserialize)]
pub struct ConnectionConfig {
    /// Engine: `postgres`, `mysql`, `mariadb` or `sqlite`.
    pub r#type: String,

    /// Identifier used in diffs, runs and history records. Defaults to
    /// `type://host:port/database` (or `sqlite://path`).
    #[serde(default)]
    pub name: Option<String>,

    #[serde(default)]
    pub host: String,

    /// Port; the engine default when omitted.
    #[serde(default)]
    pub port: Option<u16>,

    #[serde(default)]
    pub database: String,

    #[serde(default)]
    pub user: String,

    #[serde(default)]
    pub password: String,

    /// Schema to compare; the engine default when omitted.
    #[serde(default)]
    pub schema: Option<String>,

    /// `disable`, `require`, `verify-ca` or `verify-full`.
    #[serde(default = "default_ssl_mode")]
    pub ssl_mode: String,

    /// Database file for SQLite.
    #[serde(default)]
    pub path: Option<String>,

    /// Pool size (default: 4).
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

// Manual Debug keeps the password out of logs
impl fmt::Debug for ConnectionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionConfig")
            .field("type", &self.r#type)
            .field("name", &self.name)
            .field("host", &self.host)
            .field("port", &self.port)
            .field("database", &self.database)
            .field("user", &self.user)
            .field("password", &"[REDACTED]")
            .field("schema", &self.schema)
            .field("ssl_mode", &self.ssl_mode)
            .field("path", &self.path)
            .field("max_connections", &self.max_connections)
            .finish()
    }
}

impl ConnectionConfig {
    /// Parsed engine kind.
    pub fn engine(&self) -> Result<EngineKind> {
        self.r#type.parse()
    }

    /// Port, falling back to the engine default.
    pub fn effective_port(&self) -> Result<u16> {
        Ok(match self.port {
            Some(p) => p,
            None => match self.engine()? {
                EngineKind::Postgres => 5432,
                EngineKind::Mysql | EngineKind::Mariadb => 3306,
                EngineKind::Sqlite => 0,
            },
        })
    }

    /// Schema to compare, falling back to the engine default: `public` for
    /// Postgres, the database name for MySQL, `main` for SQLite.
    pub fn default_schema(&self) -> Result<String> {
        if let Some(ref schema) = self.schema {
            return Ok(schema.clone());
        }
        Ok(match self.engine()? {
            EngineKind::Postgres => "public".to_string(),
            EngineKind::Mysql | EngineKind::Mariadb => self.database.clone(),
            EngineKind::Sqlite => "main".to_string(),
        })
    }

    /// Stable identifier for this connection.
    pub fn connection_id(&self) -> String {
        if let Some(ref name) = self.name {
            return name.clone();
        }
        match self.engine() {
            Ok(EngineKind::Sqlite) => {
                format!("sqlite://{}", self.path.as_deref().unwrap_or(":memory:"))
            }
            Ok(engine) => format!(
                "{}://{}:{}/{}",
                engine,
                self.host,
                self.effective_port().unwrap_or_default(),
                self.database
            ),
            Err(_) => format!("{}://{}/{}", self.r#type, self.host, self.database),
        }
    }

    /// Require a SQLite path.
    pub fn sqlite_path(&self) -> Result<&str> {
        self.path
            .as_deref()
            .ok_or_else(|| ReconcileError::Config("sqlite connection requires a path".into()))
    }
}

/// Where applied migrations are recorded.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HistoryConfig {
    /// JSON-lines file; history is not recorded when unset.
    #[serde(default)]
    pub path: Option<String>,
}

fn default_ssl_mode() -> String {
    "disable".to_string()
}

fn default_max_connections() -> u32 {
    4
}
