//! Chunk store: chunk bytes keyed by bucket, file id and sequence.

use bytes::Bytes;
use futures::StreamExt;
use hoard_core::FileId;
use hoard_core::chunk::{chunk_key, chunk_prefix, chunks_root};
use hoard_storage::{ObjectMeta, ObjectStore, StorageError, StorageResult};
use std::sync::Arc;

/// Outcome of a batch delete.
#[derive(Debug, Default)]
pub struct DeleteOutcome {
    /// Objects removed by this call.
    pub deleted: u64,
    /// Objects that were already gone.
    pub missing: u64,
    /// Keys whose delete failed, with the error.
    pub failures: Vec<(String, StorageError)>,
}

/// Chunk objects of one bucket on top of an [`ObjectStore`].
#[derive(Clone)]
pub struct ChunkStore {
    store: Arc<dyn ObjectStore>,
    bucket: Arc<str>,
}

impl ChunkStore {
    pub fn new(store: Arc<dyn ObjectStore>, bucket: &str) -> Self {
        Self {
            store,
            bucket: Arc::from(bucket),
        }
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    pub fn backend_name(&self) -> &'static str {
        self.store.backend_name()
    }

    pub fn key(&self, file_id: &FileId, sequence: u32) -> String {
        chunk_key(&self.bucket, file_id, sequence)
    }

    pub async fn put(&self, file_id: &FileId, sequence: u32, data: Bytes) -> StorageResult<()> {
        self.store.put(&self.key(file_id, sequence), data).await
    }

    pub async fn get(&self, file_id: &FileId, sequence: u32) -> StorageResult<Bytes> {
        self.store.get(&self.key(file_id, sequence)).await
    }

    pub async fn exists(&self, file_id: &FileId, sequence: u32) -> StorageResult<bool> {
        self.store.exists(&self.key(file_id, sequence)).await
    }

    pub async fn head(&self, key: &str) -> StorageResult<ObjectMeta> {
        self.store.head(key).await
    }

    /// Every chunk key of a file, in sequence order.
    pub async fn file_keys(&self, file_id: &FileId) -> StorageResult<Vec<String>> {
        self.store.list(&chunk_prefix(&self.bucket, file_id)).await
    }

    /// Every chunk key of the bucket, in lexical order.
    pub async fn all_keys(&self) -> StorageResult<Vec<String>> {
        self.store.list(&chunks_root(&self.bucket)).await
    }

    /// Delete `keys` with at most `concurrency` deletes in flight.
    ///
    /// Missing objects are counted, not reported as failures.
    pub async fn delete_many(&self, keys: Vec<String>, concurrency: usize) -> DeleteOutcome {
        let mut outcome = DeleteOutcome::default();
        let mut deletes = futures::stream::iter(keys)
            .map(|key| async move {
                let result = self.store.delete(&key).await;
                (key, result)
            })
            .buffer_unordered(concurrency.max(1));

        while let Some((key, result)) = deletes.next().await {
            match result {
                Ok(()) => outcome.deleted += 1,
                Err(e) if e.is_not_found() => outcome.missing += 1,
                Err(e) => outcome.failures.push((key, e)),
            }
        }
        outcome
    }
}
