//! Error types for the reconciliation library.

use thiserror::Error;

/// Main error type for schema diff and data sync operations.
#[derive(Error, Debug)]
pub enum ReconcileError {
    /// Configuration error (invalid YAML, missing fields, etc.)
    #[error("Configuration error: {0}")]
    Config(String),

    /// Could not connect to a database.
    #[error("Connection to {connection} failed: {message}")]
    Connection { connection: String, message: String },

    /// Connection pool error with context
    #[error("Pool error: {message}\n  Context: {context}")]
    Pool { message: String, context: String },

    /// Requested schema does not exist on the connection.
    #[error("Schema '{schema}' not found on {connection}")]
    SchemaNotFound { connection: String, schema: String },

    /// Introspection returned no rows for the requested table.
    #[error("Table {schema}.{table} not found")]
    TableNotFound { schema: String, table: String },

    /// Primary key columns are missing or absent from a row shape.
    #[error("Invalid primary key: {0}")]
    InvalidPrimaryKey(String),

    /// A value could not be decoded as the column's declared type.
    #[error("Type mismatch on column {column}: expected {expected}, found {found}")]
    TypeMismatch {
        column: String,
        expected: String,
        found: String,
    },

    /// A sync batch failed to apply on the target.
    #[error("Batch {batch} failed: {message}")]
    BatchApply { batch: usize, message: String },

    /// Retryable I/O failure (dropped connection, pool timeout).
    #[error("Transient I/O error: {0}")]
    TransientIo(String),

    /// Query failed on the server.
    #[error("Query failed: {0}")]
    Query(String),

    /// Introspection rows could not be normalized.
    #[error("Introspection failed: {0}")]
    Introspection(String),

    /// Sync run status change out of a terminal state.
    #[error("Invalid run transition from {from} to {to}")]
    InvalidTransition { from: String, to: String },

    /// IO error (file operations)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// YAML serialization/deserialization error
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Operation was cancelled (SIGINT, etc.)
    #[error("Operation cancelled")]
    Cancelled,
}

impl ReconcileError {
    /// Create a Pool error with context about where it occurred
    pub fn pool(message: impl Into<String>, context: impl Into<String>) -> Self {
        ReconcileError::Pool {
            message: message.into(),
            context: context.into(),
        }
    }

    /// Create a BatchApply error
    pub fn batch(batch: usize, message: impl Into<String>) -> Self {
        ReconcileError::BatchApply {
            batch,
            message: message.into(),
        }
    }

    /// Create a Connection error
    pub fn connection(connection: impl Into<String>, message: impl Into<String>) -> Self {
        ReconcileError::Connection {
            connection: connection.into(),
            message: message.into(),
        }
    }

    /// Whether the sync engine may retry the failed operation.
    pub fn is_transient(&self) -> bool {
        matches!(self, ReconcileError::TransientIo(_))
    }

    /// Process exit code for the CLI.
    pub fn exit_code(&self) -> u8 {
        match self {
            ReconcileError::Config(_) | ReconcileError::Yaml(_) => 2,
            ReconcileError::Connection { .. }
            | ReconcileError::Pool { .. }
            | ReconcileError::TransientIo(_) => 3,
            ReconcileError::SchemaNotFound { .. }
            | ReconcileError::TableNotFound { .. }
            | ReconcileError::InvalidPrimaryKey(_) => 4,
            ReconcileError::Cancelled => 130,
            _ => 1,
        }
    }

    /// Format error with full details including error chain
    pub fn format_detailed(&self) -> String {
        let mut output = format!("Error: {}\n", self);

        let mut source = std::error::Error::source(self);
        let mut depth = 1;
        while let Some(err) = source {
            output.push_str(&format!("\nCaused by:\n  {}: {}", depth, err));
            source = err.source();
            depth += 1;
        }

        output
    }
}

impl From<tokio_postgres::Error> for ReconcileError {
    fn from(err: tokio_postgres::Error) -> Self {
        if err.is_closed() {
            return ReconcileError::TransientIo(err.to_string());
        }
        match err.as_db_error() {
            Some(db) => ReconcileError::Query(format!("{} ({})", db.message(), db.code().code())),
            None => ReconcileError::Query(err.to_string()),
        }
    }
}

impl From<deadpool_postgres::PoolError> for ReconcileError {
    fn from(err: deadpool_postgres::PoolError) -> Self {
        match err {
            deadpool_postgres::PoolError::Timeout(_) => {
                ReconcileError::TransientIo(format!("postgres pool timeout: {}", err))
            }
            other => ReconcileError::pool(other.to_string(), "acquiring postgres connection"),
        }
    }
}

impl From<sqlx::Error> for ReconcileError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::Io(_) | sqlx::Error::PoolTimedOut => {
                ReconcileError::TransientIo(err.to_string())
            }
            sqlx::Error::PoolClosed => {
                ReconcileError::pool(err.to_string(), "acquiring sqlx connection")
            }
            other => ReconcileError::Query(other.to_string()),
        }
    }
}

/// Result type alias for reconciliation operations.
pub type Result<T> = std::result::Result<T, ReconcileError>;
