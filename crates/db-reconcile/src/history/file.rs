//! JSON-lines history file.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::debug;

use super::{MigrationHistoryRecorder, MigrationRecord};
use crate::error::{ReconcileError, Result};

/// Appends each record as one JSON line.
pub struct JsonFileRecorder {
    path: PathBuf,
    // Serializes appends from concurrent tasks
    lock: Mutex<()>,
}

impl JsonFileRecorder {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read every record back, oldest first. A missing file holds no records.
    pub async fn load_all(&self) -> Result<Vec<MigrationRecord>> {
        let content = match tokio::fs::read_to_string(&self.path).await {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };
        content
            .lines()
            .filter(|l| !l.trim().is_empty())
            .map(|l| serde_json::from_str::<MigrationRecord>(l).map_err(ReconcileError::from))
            .collect()
    }
}

#[async_trait]
impl MigrationHistoryRecorder for JsonFileRecorder {
    async fn record(&self, record: &MigrationRecord) -> Result<()> {
        let mut line = serde_json::to_string(record)?;
        line.push('\n');

        let _guard = self.lock.lock().await;
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await?;
        file.write_all(line.as_bytes()).await?;
        file.flush().await?;

        debug!("Recorded migration {} in {}", record.id, self.path.display());
        Ok(())
    }

    fn recorder_type(&self) -> &'static str {
        "json_file"
    }
}
