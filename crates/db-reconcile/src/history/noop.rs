//! Recorder that persists nothing.
//!
//! Used when no history path is configured. Migrations still apply but leave
//! no trail.

use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use tracing::warn;

use super::{MigrationHistoryRecorder, MigrationRecord};
use crate::error::Result;

/// Discards records. Logs a warning on first use.
pub struct NoOpRecorder {
    warned: AtomicBool,
}

impl NoOpRecorder {
    pub fn new() -> Self {
        Self {
            warned: AtomicBool::new(false),
        }
    }
}

impl Default for NoOpRecorder {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl MigrationHistoryRecorder for NoOpRecorder {
    async fn record(&self, record: &MigrationRecord) -> Result<()> {
        if !self.warned.swap(true, Ordering::SeqCst) {
            warn!(
                "No history path configured: migration {} on {} is not recorded",
                record.id, record.connection_id
            );
        }
        Ok(())
    }

    fn recorder_type(&self) -> &'static str {
        "noop"
    }
}
