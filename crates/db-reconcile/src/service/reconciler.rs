//! Config-driven facade over the service functions.

use std::sync::Arc;
use std::time::Instant;

use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::config::{Config, ConnectionConfig};
use crate::core::traits::Connector;
use crate::diff::SchemaDiff;
use crate::drivers;
use crate::error::Result;
use crate::history::{JsonFileRecorder, MigrationHistoryRecorder, MigrationRecord, NoOpRecorder};
use crate::sync::{SyncRun, TableDataDiff};

use super::Endpoint;

/// Reconciles the source and target of one configuration.
pub struct Reconciler {
    config: Config,
    source: Arc<dyn Connector>,
    target: Arc<dyn Connector>,
    source_schema: String,
    target_schema: String,
    recorder: Box<dyn MigrationHistoryRecorder>,
}

/// Connectivity of both configured databases.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthCheckResult {
    pub healthy: bool,
    pub source_connected: bool,
    pub source_latency_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_version: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_error: Option<String>,
    pub target_connected: bool,
    pub target_latency_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target_version: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target_error: Option<String>,
}

impl Reconciler {
    /// Open both connection pools.
    pub async fn new(config: Config) -> Result<Self> {
        let source = drivers::connect(&config.source).await?;
        let target = drivers::connect(&config.target).await?;
        Self::with_connectors(config, source, target)
    }

    /// Build from already-open connectors.
    pub fn with_connectors(
        config: Config,
        source: Arc<dyn Connector>,
        target: Arc<dyn Connector>,
    ) -> Result<Self> {
        let source_schema = config.source.default_schema()?;
        let target_schema = config.target.default_schema()?;
        let recorder: Box<dyn MigrationHistoryRecorder> = match config.history.path {
            Some(ref path) => Box::new(JsonFileRecorder::new(path)),
            None => Box::new(NoOpRecorder::new()),
        };
        Ok(Self {
            config,
            source,
            target,
            source_schema,
            target_schema,
            recorder,
        })
    }

    /// Replace the history recorder.
    pub fn with_recorder(mut self, recorder: Box<dyn MigrationHistoryRecorder>) -> Self {
        self.recorder = recorder;
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    fn source(&self) -> Endpoint<'_> {
        Endpoint::new(self.source.as_ref(), &self.source_schema)
    }

    fn target(&self) -> Endpoint<'_> {
        Endpoint::new(self.target.as_ref(), &self.target_schema)
    }

    /// Compare the configured schemas.
    pub async fn diff(&self) -> Result<SchemaDiff> {
        super::compare_schemas(self.source(), self.target()).await
    }

    /// Apply a diff to the target and record it.
    pub async fn apply(&self, diff: &SchemaDiff) -> Result<MigrationRecord> {
        let fingerprint = match self.config.hash() {
            Ok(hash) => Some(hash),
            Err(e) => {
                warn!("Could not fingerprint configuration: {}", e);
                None
            }
        };
        super::apply_migration(self.target.as_ref(), diff, self.recorder.as_ref(), fingerprint)
            .await
    }

    /// Sync one table with the configured options.
    pub async fn sync_table(
        &self,
        table: &str,
        primary_keys: &[String],
        cancel: &CancellationToken,
    ) -> Result<SyncRun> {
        super::sync_table(
            self.source(),
            self.target(),
            table,
            primary_keys,
            &self.config.sync,
            cancel,
        )
        .await
    }

    /// Count row differences for one table.
    pub async fn data_diff(&self, table: &str, primary_keys: &[String]) -> Result<TableDataDiff> {
        super::get_table_data_diff(
            self.source(),
            self.target(),
            table,
            primary_keys,
            self.config.sync.effective_batch_size(),
        )
        .await
    }

    /// Close both pools.
    pub async fn close(&self) {
        self.source.close().await;
        self.target.close().await;
    }

    /// Connect to both databases and read their versions.
    ///
    /// Connection failures are reported in the result, not returned.
    pub async fn health_check(config: &Config) -> HealthCheckResult {
        let (source, target) =
            futures::join!(check_endpoint(&config.source), check_endpoint(&config.target));

        let result = HealthCheckResult {
            healthy: source.error.is_none() && target.error.is_none(),
            source_connected: source.error.is_none(),
            source_latency_ms: source.latency_ms,
            source_version: source.version,
            source_error: source.error,
            target_connected: target.error.is_none(),
            target_latency_ms: target.latency_ms,
            target_version: target.version,
            target_error: target.error,
        };
        info!(
            "Health check: source={} target={}",
            if result.source_connected { "ok" } else { "failed" },
            if result.target_connected { "ok" } else { "failed" }
        );
        result
    }
}

struct EndpointHealth {
    latency_ms: u64,
    version: Option<String>,
    error: Option<String>,
}

async fn check_endpoint(config: &ConnectionConfig) -> EndpointHealth {
    let started = Instant::now();
    let outcome = server_version(config).await;

    let latency_ms = started.elapsed().as_millis() as u64;
    match outcome {
        Ok(version) => EndpointHealth {
            latency_ms,
            version: Some(version),
            error: None,
        },
        Err(e) => EndpointHealth {
            latency_ms,
            version: None,
            error: Some(e.to_string()),
        },
    }
}

async fn server_version(config: &ConnectionConfig) -> Result<String> {
    let conn = drivers::connect(config).await?;
    let version = conn.get_server_version().await;
    conn.close().await;
    version
}
