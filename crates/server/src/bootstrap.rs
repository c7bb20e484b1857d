//! Backend connection and background jobs started with the server.

use crate::engine::{Backend, BlobEngine, BlobResult, ChunkStore, MetadataCatalog};
use hoard_core::config::{AppConfig, SweepConfig};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

/// Open the object store and the metadata store and verify both respond.
pub async fn connect_backend(config: &AppConfig) -> BlobResult<Backend> {
    let objects = hoard_storage::from_config(&config.storage).await?;
    objects.health_check().await?;

    let metadata = hoard_metadata::from_config(&config.metadata).await?;
    metadata.health_check().await?;

    let bucket = &config.blob.bucket;
    tracing::info!(
        storage = objects.backend_name(),
        bucket = %bucket,
        "Storage and metadata backends connected"
    );
    Ok(Backend::new(
        ChunkStore::new(objects, bucket),
        MetadataCatalog::new(metadata, bucket),
    ))
}

/// Connect the backend, retrying per `config.connect`, then open the gate.
///
/// Returns the last connection error once `max_attempts` is exhausted.
/// Zero attempts means retry forever.
pub async fn open_when_connected(engine: &BlobEngine, config: &AppConfig) -> BlobResult<()> {
    let policy = &config.connect;
    let mut attempt: u32 = 0;

    loop {
        attempt = attempt.saturating_add(1);
        match connect_backend(config).await {
            Ok(backend) => {
                if engine.gate().open(backend).is_err() {
                    tracing::warn!("Backend was already open, dropping the new connection");
                }
                return Ok(());
            }
            Err(e) if policy.max_attempts == 0 || attempt < policy.max_attempts => {
                tracing::warn!(
                    attempt,
                    error = %e,
                    retry_in_ms = policy.retry_interval_ms,
                    "Backend connection failed, retrying"
                );
                tokio::time::sleep(policy.retry_interval()).await;
            }
            Err(e) => {
                tracing::error!(attempt, error = %e, "Backend connection failed, giving up");
                return Err(e);
            }
        }
    }
}

/// Run the orphan sweep every `sweep.interval_secs` once the backend is up.
pub fn spawn_sweep_scheduler(engine: BlobEngine, sweep: SweepConfig) -> JoinHandle<()> {
    tokio::spawn(async move {
        tracing::info!(
            interval_secs = sweep.interval_secs,
            grace_period_secs = sweep.grace_period_secs,
            "Orphan sweep scheduler enabled"
        );

        let mut ticker = tokio::time::interval(sweep.interval());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick completes immediately.
        ticker.tick().await;

        loop {
            ticker.tick().await;
            if !engine.is_ready() {
                tracing::debug!("Backend not ready, skipping orphan sweep");
                continue;
            }
            if let Err(e) = engine.sweep_orphans(sweep.grace_period()).await {
                tracing::error!(error = %e, "Orphan sweep failed");
            }
        }
    })
}
