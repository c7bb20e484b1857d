//! Test server utilities.

use crate::common::{FaultyMetadata, FaultyStore};
use axum::Router;
use hoard_core::config::{AppConfig, MetadataConfig, StorageConfig};
use hoard_server::bootstrap;
use hoard_server::engine::{Backend, BlobEngine, ChunkStore, MetadataCatalog};
use hoard_server::{AppState, create_router};
use std::sync::Arc;
use tempfile::TempDir;

/// Test server with an on-disk backend in a temp directory.
/// Note: #[allow(dead_code)] because each test file compiles common/ separately.
#[allow(dead_code)]
pub struct TestServer {
    pub router: Router,
    pub state: AppState,
    _temp_dir: TempDir,
}

#[allow(dead_code)]
impl TestServer {
    /// Create a ready server with the test defaults.
    pub async fn new() -> Self {
        Self::with_config(|_| {}).await
    }

    /// Create a ready server with custom configuration.
    ///
    /// The backend is connected through the same path the binary uses.
    pub async fn with_config<F>(modifier: F) -> Self
    where
        F: FnOnce(&mut AppConfig),
    {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let config = Self::disk_config(&temp_dir, modifier);

        let state = AppState::new(config);
        bootstrap::open_when_connected(&state.engine, &state.config)
            .await
            .expect("Failed to connect test backend");

        Self {
            router: create_router(state.clone()),
            state,
            _temp_dir: temp_dir,
        }
    }

    /// Create a ready server over the given fault-injecting stores.
    pub async fn with_faults<F>(
        objects: Arc<FaultyStore>,
        metadata: Arc<FaultyMetadata>,
        modifier: F,
    ) -> Self
    where
        F: FnOnce(&mut AppConfig),
    {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let config = Self::disk_config(&temp_dir, modifier);

        let state = AppState::new(config);
        let bucket = state.engine.config().bucket.clone();
        let backend = Backend::new(
            ChunkStore::new(objects, &bucket),
            MetadataCatalog::new(metadata, &bucket),
        );
        assert!(state.engine.gate().open(backend).is_ok());

        Self {
            router: create_router(state.clone()),
            state,
            _temp_dir: temp_dir,
        }
    }

    /// Create a server whose backend never connects.
    pub fn not_ready() -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let config = Self::disk_config(&temp_dir, |_| {});
        let state = AppState::new(config);

        Self {
            router: create_router(state.clone()),
            state,
            _temp_dir: temp_dir,
        }
    }

    pub fn engine(&self) -> &BlobEngine {
        &self.state.engine
    }

    /// Chunk store of the open backend.
    pub fn chunks(&self) -> &ChunkStore {
        &self
            .engine()
            .gate()
            .backend()
            .expect("backend is not open")
            .chunks
    }

    fn disk_config<F>(temp_dir: &TempDir, modifier: F) -> AppConfig
    where
        F: FnOnce(&mut AppConfig),
    {
        let mut config = AppConfig::for_testing();
        config.storage = StorageConfig::Filesystem {
            path: temp_dir.path().join("chunks"),
        };
        config.metadata = MetadataConfig::Sqlite {
            path: temp_dir.path().join("metadata.db"),
            query_timeout_secs: None,
        };
        config.connect.max_attempts = 1;
        modifier(&mut config);
        config
    }
}
