//! Migration history recording.
//!
//! The [`MigrationHistoryRecorder`] trait defines where applied migrations are
//! persisted. The core only emits [`MigrationRecord`]s; recorders decide how
//! to store them.
//!
//! - [`NoOpRecorder`]: discards records (warns once)
//! - [`JsonFileRecorder`]: appends one JSON document per line to a file

mod file;
mod noop;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::diff::{DiffSummary, SchemaDiff};
use crate::error::Result;

pub use file::JsonFileRecorder;
pub use noop::NoOpRecorder;

/// One applied (or attempted) migration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MigrationRecord {
    /// Unique record identifier.
    pub id: Uuid,

    /// Connection the migration ran against.
    pub connection_id: String,

    /// Schema the migration ran against.
    pub schema: String,

    pub applied_at: DateTime<Utc>,

    /// SHA256 fingerprint of the configuration, when run from a config file.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config_fingerprint: Option<String>,

    /// Statements that were executed, in order.
    pub statements: Vec<String>,

    pub summary: DiffSummary,

    pub success: bool,

    /// First error, if the migration stopped early.
    #[serde(default)]
    pub error: Option<String>,

    /// The diff the statements were generated from.
    pub diff: SchemaDiff,
}

impl MigrationRecord {
    /// Record for a migration of `diff` onto its target.
    pub fn new(diff: &SchemaDiff, statements: Vec<String>, error: Option<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            connection_id: diff.target_connection.clone(),
            schema: diff.target_schema.clone(),
            applied_at: Utc::now(),
            config_fingerprint: None,
            statements,
            summary: diff.summary.clone(),
            success: error.is_none(),
            error,
            diff: diff.clone(),
        }
    }

    pub fn with_fingerprint(mut self, fingerprint: Option<String>) -> Self {
        self.config_fingerprint = fingerprint;
        self
    }
}

/// Persistence for applied migrations.
///
/// Implementations must be `Send + Sync` to be shared across tasks.
#[async_trait]
pub trait MigrationHistoryRecorder: Send + Sync {
    /// Persist one record.
    async fn record(&self, record: &MigrationRecord) -> Result<()>;

    /// Get the recorder type name for logging.
    fn recorder_type(&self) -> &'static str;
}
