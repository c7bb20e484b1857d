//! One-shot readiness latch guarding every storage access.

use super::catalog::MetadataCatalog;
use super::chunks::ChunkStore;
use super::error::{BlobError, BlobResult};
use std::sync::OnceLock;

/// Storage handles available once the backend is connected.
#[derive(Clone)]
pub struct Backend {
    pub chunks: ChunkStore,
    pub catalog: MetadataCatalog,
}

impl Backend {
    pub fn new(chunks: ChunkStore, catalog: MetadataCatalog) -> Self {
        Self { chunks, catalog }
    }
}

/// Not-ready to ready transition, taken exactly once.
///
/// The backend can only be reached through [`ReadinessGate::backend`], which
/// fails with [`BlobError::NotReady`] until [`ReadinessGate::open`] ran.
#[derive(Default)]
pub struct ReadinessGate {
    backend: OnceLock<Backend>,
}

impl ReadinessGate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_ready(&self) -> bool {
        self.backend.get().is_some()
    }

    /// Publish the backend. A second call is rejected and hands its
    /// backend back; the first one stays in place.
    pub fn open(&self, backend: Backend) -> Result<(), Backend> {
        self.backend.set(backend)?;
        crate::metrics::BACKEND_READY.set(1);
        tracing::info!("storage backend ready");
        Ok(())
    }

    pub fn backend(&self) -> BlobResult<&Backend> {
        self.backend.get().ok_or(BlobError::NotReady)
    }
}
