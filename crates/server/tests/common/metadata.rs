//! Metadata test utilities.

use async_trait::async_trait;
use hoard_metadata::{FileRepo, FileRow, MetadataError, MetadataResult, MetadataStore, SqliteStore};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;
use uuid::Uuid;

/// SQLite metadata store with switchable insert failures.
/// Note: #[allow(dead_code)] because each test file compiles common/ separately.
#[allow(dead_code)]
pub struct FaultyMetadata {
    pub inner: SqliteStore,
    fail_inserts: AtomicBool,
    /// Delay before an insert reports back, after the row is written.
    insert_ack_delay_ms: AtomicU64,
    calls: AtomicUsize,
}

#[allow(dead_code)]
impl FaultyMetadata {
    pub async fn new() -> Self {
        Self {
            inner: SqliteStore::in_memory()
                .await
                .expect("Failed to create metadata store"),
            fail_inserts: AtomicBool::new(false),
            insert_ack_delay_ms: AtomicU64::new(0),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn set_fail_inserts(&self, fail: bool) {
        self.fail_inserts.store(fail, Ordering::SeqCst);
    }

    pub fn set_insert_ack_delay(&self, delay: Duration) {
        self.insert_ack_delay_ms
            .store(delay.as_millis() as u64, Ordering::SeqCst);
    }

    /// Number of repository calls performed so far.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn touch(&self) {
        self.calls.fetch_add(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl FileRepo for FaultyMetadata {
    async fn insert_file(&self, row: &FileRow) -> MetadataResult<()> {
        self.touch();
        let result = if self.fail_inserts.load(Ordering::SeqCst) {
            Err(MetadataError::Internal("injected insert failure".to_string()))
        } else {
            self.inner.insert_file(row).await
        };

        let delay = self.insert_ack_delay_ms.load(Ordering::SeqCst);
        if delay > 0 {
            tokio::time::sleep(Duration::from_millis(delay)).await;
        }
        result
    }

    async fn get_file(&self, bucket: &str, file_id: Uuid) -> MetadataResult<Option<FileRow>> {
        self.touch();
        self.inner.get_file(bucket, file_id).await
    }

    async fn list_files(&self, bucket: &str) -> MetadataResult<Vec<FileRow>> {
        self.touch();
        self.inner.list_files(bucket).await
    }

    async fn delete_file(&self, bucket: &str, file_id: Uuid) -> MetadataResult<bool> {
        self.touch();
        self.inner.delete_file(bucket, file_id).await
    }
}

#[async_trait]
impl MetadataStore for FaultyMetadata {
    async fn migrate(&self) -> MetadataResult<()> {
        self.inner.migrate().await
    }

    async fn health_check(&self) -> MetadataResult<()> {
        self.inner.health_check().await
    }
}
