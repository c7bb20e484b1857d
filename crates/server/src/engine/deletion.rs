//! Deletion coordinator: chunks first, then the record.

use super::BlobEngine;
use super::error::{BlobError, BlobResult};
use crate::metrics;
use hoard_core::FileId;

impl BlobEngine {
    /// Delete a file and every chunk stored under its id.
    ///
    /// Chunks go first so the record is the last thing to disappear. If the
    /// chunk phase fails the record stays, reads report it as corrupt, and
    /// retrying the delete finishes the job.
    #[tracing::instrument(skip(self), fields(bucket = %self.config.bucket, file_id = %file_id))]
    pub async fn delete(&self, file_id: FileId) -> BlobResult<()> {
        let backend = self.backend()?;
        if backend.catalog.get(&file_id).await?.is_none() {
            return Err(BlobError::NotFound(file_id));
        }

        // Listing rather than 0..chunk_count also catches stray sequences.
        let keys = backend.chunks.file_keys(&file_id).await?;
        let outcome = backend
            .chunks
            .delete_many(keys, self.config.write_concurrency)
            .await;

        if let Some((key, e)) = outcome.failures.first() {
            tracing::error!(
                key = %key,
                error = %e,
                failed = outcome.failures.len(),
                "Failed to delete chunks, keeping record"
            );
            return Err(BlobError::BackendFailure(format!(
                "failed to delete {} chunks of {file_id}: {e}",
                outcome.failures.len()
            )));
        }

        if !backend.catalog.remove(&file_id).await? {
            // A concurrent delete removed the record first.
            return Err(BlobError::NotFound(file_id));
        }

        metrics::FILES_DELETED.inc();
        tracing::info!(chunks_deleted = outcome.deleted, "File deleted");
        Ok(())
    }
}
