//! Chunked blob engine.
//!
//! Turns an upload byte stream into numbered chunk objects plus one
//! metadata record, and reverses that on read. The record insert is the
//! commit point: chunks are written first, the record last, and every
//! failure before the commit rolls the chunks back.
//!
//! All operations go through the [`ReadinessGate`] and fail fast with
//! [`BlobError::NotReady`] until the backend is connected.

pub mod catalog;
pub mod chunks;
pub mod deletion;
pub mod error;
pub mod gate;
pub mod ingest;
pub mod retrieval;
pub mod sweep;

pub use catalog::MetadataCatalog;
pub use chunks::ChunkStore;
pub use error::{BlobError, BlobResult};
pub use gate::{Backend, ReadinessGate};
pub use retrieval::{ByteStream, FileDownload};
pub use sweep::SweepStats;

use hoard_core::config::BlobConfig;
use ingest::ActiveUploads;
use std::sync::Arc;

/// Handle to the blob engine, cheap to clone and shared by every request.
#[derive(Clone)]
pub struct BlobEngine {
    gate: Arc<ReadinessGate>,
    config: Arc<BlobConfig>,
    uploads: Arc<ActiveUploads>,
}

impl BlobEngine {
    /// Create an engine behind a closed gate.
    pub fn new(config: BlobConfig) -> Self {
        Self {
            gate: Arc::new(ReadinessGate::new()),
            config: Arc::new(config),
            uploads: Arc::new(ActiveUploads::default()),
        }
    }

    pub fn gate(&self) -> &ReadinessGate {
        &self.gate
    }

    pub fn config(&self) -> &BlobConfig {
        &self.config
    }

    pub fn is_ready(&self) -> bool {
        self.gate.is_ready()
    }

    /// Fail with [`BlobError::NotReady`] until the backend is connected.
    pub fn ensure_ready(&self) -> BlobResult<()> {
        self.gate.backend().map(|_| ())
    }

    fn backend(&self) -> BlobResult<&Backend> {
        self.gate.backend()
    }
}
