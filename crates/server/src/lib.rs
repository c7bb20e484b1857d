//! HTTP server and chunked blob engine for hoard.
//!
//! This crate provides:
//! - The blob engine: ingest, retrieval, deletion and orphan sweep
//! - The readiness gate guarding storage until the backend connects
//! - HTTP routes for upload, listing, download, deletion and health
//! - Prometheus metrics and request tracing

pub mod bootstrap;
pub mod engine;
pub mod error;
pub mod handlers;
pub mod metrics;
pub mod routes;
pub mod state;
pub mod trace;

pub use engine::{BlobEngine, BlobError};
pub use error::ApiError;
pub use routes::create_router;
pub use state::AppState;
pub use trace::TraceId;
