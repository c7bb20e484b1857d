//! Metadata catalog: one committed record per file.

use super::error::BlobResult;
use hoard_core::{FileId, FileRecord};
use hoard_metadata::{FileRow, MetadataStore};
use std::sync::Arc;

/// File records of one bucket on top of a [`MetadataStore`].
#[derive(Clone)]
pub struct MetadataCatalog {
    store: Arc<dyn MetadataStore>,
    bucket: Arc<str>,
}

impl MetadataCatalog {
    pub fn new(store: Arc<dyn MetadataStore>, bucket: &str) -> Self {
        Self {
            store,
            bucket: Arc::from(bucket),
        }
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    /// Insert a committed record. This is the commit point of an ingest.
    pub async fn insert(&self, record: &FileRecord) -> BlobResult<()> {
        let row = FileRow::from_record(&self.bucket, record)?;
        self.store.insert_file(&row).await?;
        Ok(())
    }

    pub async fn get(&self, file_id: &FileId) -> BlobResult<Option<FileRecord>> {
        let row = self.store.get_file(&self.bucket, *file_id.as_uuid()).await?;
        Ok(row.map(FileRecord::try_from).transpose()?)
    }

    /// All records, newest first, ties broken by id.
    pub async fn list(&self) -> BlobResult<Vec<FileRecord>> {
        let rows = self.store.list_files(&self.bucket).await?;
        let records = rows
            .into_iter()
            .map(FileRecord::try_from)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(records)
    }

    /// Remove a record. Returns whether it existed.
    pub async fn remove(&self, file_id: &FileId) -> BlobResult<bool> {
        Ok(self
            .store
            .delete_file(&self.bucket, *file_id.as_uuid())
            .await?)
    }
}
