//! Sync run record and status transitions.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{ReconcileError, Result};

/// Overall run status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl RunStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, RunStatus::Running)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RunStatus::Running => "running",
            RunStatus::Completed => "completed",
            RunStatus::Failed => "failed",
            RunStatus::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A table on a connection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableRef {
    pub connection_id: String,
    pub schema: String,
    pub table: String,
}

impl TableRef {
    pub fn new(
        connection_id: impl Into<String>,
        schema: impl Into<String>,
        table: impl Into<String>,
    ) -> Self {
        Self {
            connection_id: connection_id.into(),
            schema: schema.into(),
            table: table.into(),
        }
    }
}

impl fmt::Display for TableRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}.{}", self.connection_id, self.schema, self.table)
    }
}

/// One reconciliation of a source table into a target table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncRun {
    /// Unique run identifier.
    pub id: Uuid,
    pub source: TableRef,
    pub target: TableRef,
    pub status: RunStatus,
    pub inserts: u64,
    pub updates: u64,
    pub deletes: u64,
    /// One entry per failed batch.
    pub errors: Vec<String>,
    /// SQL of every applied batch, in order.
    pub statements: Vec<String>,
    pub batches_attempted: usize,
    pub batches_applied: usize,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl SyncRun {
    /// Start a new run in `running` status.
    pub fn new(source: TableRef, target: TableRef) -> Self {
        Self {
            id: Uuid::new_v4(),
            source,
            target,
            status: RunStatus::Running,
            inserts: 0,
            updates: 0,
            deletes: 0,
            errors: Vec::new(),
            statements: Vec::new(),
            batches_attempted: 0,
            batches_applied: 0,
            started_at: Utc::now(),
            finished_at: None,
        }
    }

    /// Move to a terminal status. A run leaves `running` exactly once.
    pub fn transition(&mut self, to: RunStatus) -> Result<()> {
        if self.status.is_terminal() || !to.is_terminal() {
            return Err(ReconcileError::InvalidTransition {
                from: self.status.to_string(),
                to: to.to_string(),
            });
        }
        self.status = to;
        self.finished_at = Some(Utc::now());
        Ok(())
    }

    /// Total rows changed.
    pub fn total_changes(&self) -> u64 {
        self.inserts + self.updates + self.deletes
    }

    pub fn duration_secs(&self) -> Option<f64> {
        self.finished_at
            .map(|end| (end - self.started_at).num_milliseconds() as f64 / 1000.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run() -> SyncRun {
        SyncRun::new(
            TableRef::new("src", "public", "users"),
            TableRef::new("tgt", "public", "users"),
        )
    }

    #[test]
    fn test_new_run_is_running() {
        let r = run();
        assert_eq!(r.status, RunStatus::Running);
        assert!(r.finished_at.is_none());
        assert_eq!(r.total_changes(), 0);
    }

    #[test]
    fn test_transition_once() {
        let mut r = run();
        r.transition(RunStatus::Completed).unwrap();
        assert_eq!(r.status, RunStatus::Completed);
        assert!(r.finished_at.is_some());

        let err = r.transition(RunStatus::Failed).unwrap_err();
        assert!(matches!(err, ReconcileError::InvalidTransition { .. }));
        assert_eq!(r.status, RunStatus::Completed);
    }

    #[test]
    fn test_transition_to_running_rejected() {
        let mut r = run();
        assert!(r.transition(RunStatus::Running).is_err());
        assert_eq!(r.status, RunStatus::Running);
    }

    #[test]
    fn test_status_serialization() {
        let json = serde_json::to_string(&RunStatus::Cancelled).unwrap();
        assert_eq!(json, "\"cancelled\"");
        assert_eq!(TableRef::new("a", "s", "t").to_string(), "a:s.t");
    }
}
