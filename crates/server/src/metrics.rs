//! Prometheus metrics for the hoard server.
//!
//! Covers ingest, download, deletion and sweep activity plus API error codes.
//!
//! # Security Note
//!
//! The `/metrics` endpoint is unauthenticated to allow Prometheus scraping.
//! Metrics carry no file names or ids, only aggregate counts. Restrict the
//! endpoint to scraper addresses at the network level, or turn it off with
//! `server.metrics_enabled = false`.

use axum::http::StatusCode;
use axum::response::IntoResponse;
use prometheus::{
    self, Encoder, Histogram, HistogramOpts, IntCounter, IntCounterVec, IntGauge, Opts, Registry,
    TextEncoder,
};
use std::sync::{LazyLock, Once};

/// Global Prometheus registry for all metrics.
pub static REGISTRY: LazyLock<Registry> = LazyLock::new(Registry::new);

// Ingest metrics
pub static UPLOADS_COMMITTED: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "hoard_uploads_committed_total",
        "Total number of uploads committed",
    )
    .expect("metric creation failed")
});

pub static UPLOAD_BYTES: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "hoard_upload_bytes_total",
        "Total bytes of committed uploads",
    )
    .expect("metric creation failed")
});

pub static CHUNKS_WRITTEN: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new("hoard_chunks_written_total", "Total chunk objects written")
        .expect("metric creation failed")
});

pub static INGEST_ROLLBACKS: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        Opts::new(
            "hoard_ingest_rollbacks_total",
            "Uploads rolled back before commit, by reason",
        ),
        &["reason"],
    )
    .expect("metric creation failed")
});

pub static UPLOAD_DURATION: LazyLock<Histogram> = LazyLock::new(|| {
    Histogram::with_opts(
        HistogramOpts::new(
            "hoard_upload_duration_seconds",
            "Time from first byte to committed record",
        )
        .buckets(vec![0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0]),
    )
    .expect("metric creation failed")
});

// Retrieval metrics
pub static DOWNLOADS_STARTED: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "hoard_downloads_started_total",
        "Total number of downloads opened",
    )
    .expect("metric creation failed")
});

pub static DOWNLOAD_BYTES: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new("hoard_download_bytes_total", "Total bytes streamed to clients")
        .expect("metric creation failed")
});

pub static DOWNLOAD_FAILURES: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        Opts::new(
            "hoard_download_failures_total",
            "Downloads that failed mid-stream, by error code",
        ),
        &["code"],
    )
    .expect("metric creation failed")
});

// Deletion and sweep metrics
pub static FILES_DELETED: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new("hoard_files_deleted_total", "Total number of files deleted")
        .expect("metric creation failed")
});

pub static ORPHAN_CHUNKS_SWEPT: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "hoard_orphan_chunks_swept_total",
        "Total orphaned chunk objects removed by the sweep",
    )
    .expect("metric creation failed")
});

// API metrics
pub static API_ERRORS: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        Opts::new("hoard_api_errors_total", "API error responses by error code"),
        &["code"],
    )
    .expect("metric creation failed")
});

pub static BACKEND_READY: LazyLock<IntGauge> = LazyLock::new(|| {
    IntGauge::new(
        "hoard_backend_ready",
        "1 once the storage backend is connected, 0 before",
    )
    .expect("metric creation failed")
});

static REGISTER_ONCE: Once = Once::new();

/// Register all metrics with the global registry.
///
/// This function is idempotent - subsequent calls after the first are no-ops.
pub fn register_metrics() {
    REGISTER_ONCE.call_once(|| {
        REGISTRY
            .register(Box::new(UPLOADS_COMMITTED.clone()))
            .expect("metric registration failed");
        REGISTRY
            .register(Box::new(UPLOAD_BYTES.clone()))
            .expect("metric registration failed");
        REGISTRY
            .register(Box::new(CHUNKS_WRITTEN.clone()))
            .expect("metric registration failed");
        REGISTRY
            .register(Box::new(INGEST_ROLLBACKS.clone()))
            .expect("metric registration failed");
        REGISTRY
            .register(Box::new(UPLOAD_DURATION.clone()))
            .expect("metric registration failed");

        REGISTRY
            .register(Box::new(DOWNLOADS_STARTED.clone()))
            .expect("metric registration failed");
        REGISTRY
            .register(Box::new(DOWNLOAD_BYTES.clone()))
            .expect("metric registration failed");
        REGISTRY
            .register(Box::new(DOWNLOAD_FAILURES.clone()))
            .expect("metric registration failed");

        REGISTRY
            .register(Box::new(FILES_DELETED.clone()))
            .expect("metric registration failed");
        REGISTRY
            .register(Box::new(ORPHAN_CHUNKS_SWEPT.clone()))
            .expect("metric registration failed");

        REGISTRY
            .register(Box::new(API_ERRORS.clone()))
            .expect("metric registration failed");
        REGISTRY
            .register(Box::new(BACKEND_READY.clone()))
            .expect("metric registration failed");
    });
}

/// GET /metrics - Prometheus metrics endpoint.
pub async fn metrics_handler() -> impl IntoResponse {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();

    let mut buffer = Vec::new();
    match encoder.encode(&metric_families, &mut buffer) {
        Ok(()) => (
            StatusCode::OK,
            [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
            buffer,
        ),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            [("content-type", "text/plain; charset=utf-8")],
            format!("Failed to encode metrics: {e}").into_bytes(),
        ),
    }
}

/// Count an API error response by its code.
pub fn record_api_error(code: &str) {
    API_ERRORS.with_label_values(&[code]).inc();
}
