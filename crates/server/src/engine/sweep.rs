//! Orphan sweep: removes chunks whose file never got a record.
//!
//! Uploads abandoned by a crashed process leave chunks behind that no
//! rollback will ever delete. A file id counts as orphaned when it has no
//! record, no upload in this process still owns it, and its newest chunk is
//! older than the grace period. The grace period covers uploads running in
//! other processes.

use super::BlobEngine;
use super::error::BlobResult;
use crate::metrics;
use hoard_core::FileId;
use hoard_core::chunk::parse_chunk_key;
use serde::Serialize;
use std::collections::BTreeMap;
use time::OffsetDateTime;

/// Counters of one sweep run.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct SweepStats {
    /// File ids found in chunk storage.
    pub files_checked: u64,
    /// Chunk objects removed.
    pub chunks_deleted: u64,
    /// Lookups or deletes that failed; the affected files are retried next run.
    pub errors: u64,
}

impl BlobEngine {
    /// Delete chunks of files without a record whose newest chunk is older
    /// than `grace`. Files with a record are never touched.
    #[tracing::instrument(skip(self), fields(bucket = %self.config.bucket))]
    pub async fn sweep_orphans(&self, grace: time::Duration) -> BlobResult<SweepStats> {
        let backend = self.backend()?;
        let cutoff = OffsetDateTime::now_utc() - grace;

        let mut by_file: BTreeMap<FileId, Vec<String>> = BTreeMap::new();
        for key in backend.chunks.all_keys().await? {
            match parse_chunk_key(backend.chunks.bucket(), &key) {
                Some((file_id, _)) => by_file.entry(file_id).or_default().push(key),
                None => tracing::debug!(key = %key, "Skipping foreign key under chunk prefix"),
            }
        }

        let mut stats = SweepStats::default();
        for (file_id, keys) in by_file {
            stats.files_checked += 1;

            if self.uploads.contains(&file_id) {
                tracing::debug!(file_id = %file_id, "Upload in progress, skipping");
                continue;
            }

            match backend.catalog.get(&file_id).await {
                Ok(Some(_)) => continue,
                Ok(None) => {}
                Err(e) => {
                    tracing::warn!(file_id = %file_id, error = %e, "Record lookup failed, skipping");
                    stats.errors += 1;
                    continue;
                }
            }

            let mut newest: Option<OffsetDateTime> = None;
            let mut unknown_age = false;
            for key in &keys {
                match backend.chunks.head(key).await {
                    Ok(meta) => match meta.last_modified {
                        Some(at) => newest = newest.max(Some(at)),
                        None => unknown_age = true,
                    },
                    Err(e) if e.is_not_found() => {}
                    Err(e) => {
                        tracing::warn!(key = %key, error = %e, "Chunk stat failed");
                        stats.errors += 1;
                        unknown_age = true;
                    }
                }
            }

            if unknown_age || newest.is_none_or(|at| at > cutoff) {
                tracing::debug!(file_id = %file_id, "Orphan candidate within grace period");
                continue;
            }

            let outcome = backend
                .chunks
                .delete_many(keys, self.config.write_concurrency)
                .await;
            for (key, e) in &outcome.failures {
                tracing::warn!(key = %key, error = %e, "Failed to delete orphan chunk");
            }
            stats.chunks_deleted += outcome.deleted;
            stats.errors += outcome.failures.len() as u64;
            tracing::info!(file_id = %file_id, deleted = outcome.deleted, "Removed orphaned chunks");
        }

        metrics::ORPHAN_CHUNKS_SWEPT.inc_by(stats.chunks_deleted);
        tracing::info!(
            files_checked = stats.files_checked,
            chunks_deleted = stats.chunks_deleted,
            errors = stats.errors,
            "Orphan sweep finished"
        );
        Ok(stats)
    }
}
