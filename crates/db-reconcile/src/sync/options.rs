//! Sync options, as read from the `sync` block of the config file.

use std::future::Future;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::Result;

/// How inserts and updates are written.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncMode {
    /// Plain INSERT and UPDATE; conflicts fail the batch.
    #[default]
    Insert,
    /// The engine's insert-or-replace.
    Upsert,
}

/// Options controlling a sync run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncOptions {
    /// Insert source rows missing from the target.
    #[serde(default = "default_true")]
    pub insert_missing: bool,

    /// Rewrite target rows whose content differs from the source.
    #[serde(default = "default_true")]
    pub update_different: bool,

    /// Delete target rows missing from the source.
    #[serde(default)]
    pub delete_extra: bool,

    #[serde(default)]
    pub mode: SyncMode,

    /// Rows per batch and per read page.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Keep going after a failed batch.
    #[serde(default)]
    pub continue_on_error: bool,

    /// Failed batches tolerated with `continue_on_error` before the run
    /// stops.
    #[serde(default = "default_max_errors")]
    pub max_errors: usize,

    /// Retries of a batch that failed with a transient I/O error.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Base delay between retries; attempt `n` waits `n * retry_delay_ms`.
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,
}

fn default_true() -> bool {
    true
}

fn default_batch_size() -> usize {
    1000
}

fn default_max_errors() -> usize {
    10
}

fn default_max_retries() -> u32 {
    3
}

fn default_retry_delay_ms() -> u64 {
    500
}

impl Default for SyncOptions {
    fn default() -> Self {
        Self {
            insert_missing: true,
            update_different: true,
            delete_extra: false,
            mode: SyncMode::default(),
            batch_size: default_batch_size(),
            continue_on_error: false,
            max_errors: default_max_errors(),
            max_retries: default_max_retries(),
            retry_delay_ms: default_retry_delay_ms(),
        }
    }
}

impl SyncOptions {
    /// Batch size, never zero.
    pub fn effective_batch_size(&self) -> usize {
        self.batch_size.max(1)
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_retries: self.max_retries,
            retry_delay_ms: self.retry_delay_ms,
        }
    }
}

/// Retry schedule for reads and batch writes that fail with a transient
/// I/O error. Attempt `n` waits `n * retry_delay_ms`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub retry_delay_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        SyncOptions::default().retry_policy()
    }
}

impl RetryPolicy {
    /// Run `op` until it succeeds, fails with a non-transient error or
    /// runs out of retries. The last error is returned as is.
    pub async fn run<T, F, Fut>(&self, what: &str, mut op: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut attempt: u32 = 0;
        loop {
            match op().await {
                Ok(value) => return Ok(value),
                Err(e) if e.is_transient() && attempt < self.max_retries => {
                    attempt += 1;
                    let delay = self.retry_delay_ms * u64::from(attempt);
                    warn!(
                        "{} failed with transient error, retry {}/{} in {}ms: {}",
                        what, attempt, self.max_retries, delay, e
                    );
                    tokio::time::sleep(Duration::from_millis(delay)).await;
                }
                Err(e) => return Err(e),
            }
        }
    }
}
