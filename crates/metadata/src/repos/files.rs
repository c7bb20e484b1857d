//! File record repository.

use crate::error::MetadataResult;
use crate::models::FileRow;
use async_trait::async_trait;
use uuid::Uuid;

/// Repository for committed file records.
///
/// Records are scoped by bucket; a file id is unique within its bucket.
#[async_trait]
pub trait FileRepo: Send + Sync {
    /// Insert a new record. Fails with `AlreadyExists` if the id is taken.
    async fn insert_file(&self, row: &FileRow) -> MetadataResult<()>;

    /// Get a record by id.
    async fn get_file(&self, bucket: &str, file_id: Uuid) -> MetadataResult<Option<FileRow>>;

    /// List all records of a bucket, newest first, ties broken by id.
    async fn list_files(&self, bucket: &str) -> MetadataResult<Vec<FileRow>>;

    /// Delete a record. Returns whether a row was removed.
    async fn delete_file(&self, bucket: &str, file_id: Uuid) -> MetadataResult<bool>;
}
