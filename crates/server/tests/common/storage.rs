//! Storage test utilities.

use async_trait::async_trait;
use bytes::Bytes;
use hoard_storage::{MemoryBackend, ObjectMeta, ObjectStore, StorageError, StorageResult};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};

/// In-memory object store with switchable faults.
///
/// Counts every call so tests can assert that storage was never touched.
/// Note: #[allow(dead_code)] because each test file compiles common/ separately.
#[allow(dead_code)]
pub struct FaultyStore {
    pub inner: MemoryBackend,
    /// Puts that still succeed before every further put fails.
    put_budget: AtomicU64,
    fail_deletes: AtomicBool,
    calls: AtomicUsize,
}

#[allow(dead_code)]
impl FaultyStore {
    pub fn new() -> Self {
        Self {
            inner: MemoryBackend::new(),
            put_budget: AtomicU64::new(u64::MAX),
            fail_deletes: AtomicBool::new(false),
            calls: AtomicUsize::new(0),
        }
    }

    /// Let `n` more puts succeed, then fail the rest.
    pub fn fail_puts_after(&self, n: u64) {
        self.put_budget.store(n, Ordering::SeqCst);
    }

    pub fn set_fail_deletes(&self, fail: bool) {
        self.fail_deletes.store(fail, Ordering::SeqCst);
    }

    /// Number of store operations performed so far.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn object_count(&self) -> usize {
        self.inner.len()
    }

    fn touch(&self) {
        self.calls.fetch_add(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl ObjectStore for FaultyStore {
    async fn exists(&self, key: &str) -> StorageResult<bool> {
        self.touch();
        self.inner.exists(key).await
    }

    async fn head(&self, key: &str) -> StorageResult<ObjectMeta> {
        self.touch();
        self.inner.head(key).await
    }

    async fn get(&self, key: &str) -> StorageResult<Bytes> {
        self.touch();
        self.inner.get(key).await
    }

    async fn put(&self, key: &str, data: Bytes) -> StorageResult<()> {
        self.touch();
        let allowed = self
            .put_budget
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| {
                if n == u64::MAX { Some(n) } else { n.checked_sub(1) }
            })
            .is_ok();
        if !allowed {
            return Err(StorageError::Unavailable(format!("injected put failure: {key}")));
        }
        self.inner.put(key, data).await
    }

    async fn delete(&self, key: &str) -> StorageResult<()> {
        self.touch();
        if self.fail_deletes.load(Ordering::SeqCst) {
            return Err(StorageError::Unavailable(format!("injected delete failure: {key}")));
        }
        self.inner.delete(key).await
    }

    async fn list(&self, prefix: &str) -> StorageResult<Vec<String>> {
        self.touch();
        self.inner.list(prefix).await
    }

    fn backend_name(&self) -> &'static str {
        "faulty-memory"
    }
}
