//! Ingest pipeline: upload stream to chunks, then the committing record.

use super::BlobEngine;
use super::chunks::ChunkStore;
use super::error::{BlobError, BlobResult};
use crate::metrics;
use bytes::Bytes;
use dashmap::DashSet;
use futures::stream::FuturesUnordered;
use futures::{Stream, StreamExt};
use hoard_core::chunk::{ChunkLayout, Chunker};
use hoard_core::file::stored_name;
use hoard_core::{FileId, FileRecord, UploadRequest};
use hoard_storage::StorageResult;
use sha2::{Digest, Sha256};
use std::sync::Arc;
use std::time::Instant;
use time::OffsetDateTime;
use tokio::task::JoinHandle;
use tracing::Instrument;

type WriteTask = JoinHandle<(u32, u64, StorageResult<()>)>;

/// What the stream produced once every chunk is durable.
struct Written {
    length: u64,
    layout: ChunkLayout,
    sha256: String,
}

impl BlobEngine {
    /// Store `body` as a new file and commit its record.
    ///
    /// The file becomes visible only when the record insert succeeds. Any
    /// failure before that point deletes the chunks written so far, and so
    /// does dropping the returned future.
    #[tracing::instrument(
        name = "ingest",
        skip(self, request, body),
        fields(bucket = %self.config.bucket, file_id = tracing::field::Empty)
    )]
    pub async fn ingest<S>(&self, request: UploadRequest, body: S) -> BlobResult<FileRecord>
    where
        S: Stream<Item = BlobResult<Bytes>> + Send,
    {
        let backend = self.backend()?;
        let upload = request.normalize()?;

        let started = Instant::now();
        let file_id = FileId::new();
        let stored_name = stored_name(&upload.original_name, OffsetDateTime::now_utc());
        tracing::Span::current().record("file_id", tracing::field::display(file_id));

        let mut writer = ChunkWriter::new(
            backend.chunks.clone(),
            file_id,
            self.config.write_concurrency,
            self.uploads.register(file_id),
        );

        let written = match self.write_chunks(&mut writer, body).await {
            Ok(written) => written,
            Err(e) => {
                tracing::warn!(error = %e, chunks = writer.issued(), "Upload failed, rolling back");
                writer.rollback(e.code()).await;
                return Err(e);
            }
        };

        let record = FileRecord {
            id: file_id,
            original_name: upload.original_name,
            stored_name,
            content_type: upload.content_type,
            length: written.length,
            chunk_size: written.layout.chunk_size,
            chunk_count: written.layout.chunk_count,
            sha256: written.sha256,
            uploaded_at: commit_time(),
        };

        // Once the insert is issued it runs to completion on its own task,
        // so a caller that goes away cannot roll back a committed record.
        let pending = writer.take_pending().ok_or_else(|| {
            BlobError::BackendFailure("upload chunks were already released".to_string())
        })?;
        let catalog = backend.catalog.clone();
        let committing = record.clone();
        let commit = tokio::spawn(
            async move {
                match catalog.insert(&committing).await {
                    Ok(()) => Ok(()),
                    Err(e) => {
                        tracing::error!(error = %e, "Failed to commit file record, rolling back");
                        pending.undo(e.code()).await;
                        Err(e)
                    }
                }
            }
            .in_current_span(),
        );
        commit
            .await
            .map_err(|e| BlobError::BackendFailure(format!("commit task failed: {e}")))??;

        metrics::UPLOADS_COMMITTED.inc();
        metrics::UPLOAD_BYTES.inc_by(record.length);
        metrics::UPLOAD_DURATION.observe(started.elapsed().as_secs_f64());
        tracing::info!(
            length = record.length,
            chunk_count = record.chunk_count,
            stored_name = %record.stored_name,
            "File committed"
        );

        Ok(record)
    }

    async fn write_chunks<S>(&self, writer: &mut ChunkWriter, body: S) -> BlobResult<Written>
    where
        S: Stream<Item = BlobResult<Bytes>> + Send,
    {
        let limit = self.config.max_upload_size;
        let chunk_size = usize::try_from(self.config.chunk_size).map_err(|_| {
            BlobError::BackendFailure(format!("chunk size {} overflows usize", self.config.chunk_size))
        })?;

        let mut chunker = Chunker::new(chunk_size);
        let mut hasher = Sha256::new();
        let mut length: u64 = 0;

        let mut body = std::pin::pin!(body);
        while let Some(data) = body.next().await {
            let data = data?;
            length += data.len() as u64;
            if length > limit {
                return Err(BlobError::PayloadTooLarge { limit });
            }
            hasher.update(&data);
            for chunk in chunker.push(data) {
                writer.write(chunk).await?;
            }
        }

        if let Some(tail) = chunker.finish() {
            writer.write(tail).await?;
        }

        let layout = ChunkLayout::for_length(
            length,
            self.config.chunk_size,
            self.config.empty_file_policy,
        )
        .map_err(|e| BlobError::BackendFailure(e.to_string()))?;

        if length == 0 && layout.chunk_count == 1 {
            writer.write(Bytes::new()).await?;
        }

        writer.flush().await?;

        if writer.issued() != layout.chunk_count {
            return Err(BlobError::BackendFailure(format!(
                "wrote {} chunks, layout expects {}",
                writer.issued(),
                layout.chunk_count
            )));
        }

        Ok(Written {
            length,
            layout,
            sha256: hex::encode(hasher.finalize()),
        })
    }
}

/// Current time truncated to milliseconds, the precision records are listed with.
fn commit_time() -> OffsetDateTime {
    let now = OffsetDateTime::now_utc();
    now.replace_millisecond(now.millisecond()).unwrap_or(now)
}

/// File ids of uploads that have not committed or rolled back yet.
///
/// The orphan sweep skips these however old their chunks are.
#[derive(Default)]
pub(super) struct ActiveUploads {
    ids: DashSet<FileId>,
}

impl ActiveUploads {
    fn register(self: &Arc<Self>, file_id: FileId) -> UploadLease {
        self.ids.insert(file_id);
        UploadLease {
            uploads: Arc::clone(self),
            file_id,
        }
    }

    pub(super) fn contains(&self, file_id: &FileId) -> bool {
        self.ids.contains(file_id)
    }
}

/// Marks an upload active until dropped.
struct UploadLease {
    uploads: Arc<ActiveUploads>,
    file_id: FileId,
}

impl Drop for UploadLease {
    fn drop(&mut self) {
        self.uploads.ids.remove(&self.file_id);
    }
}

/// Chunk writes of one upload that is not committed yet.
///
/// Writes run as tasks so they progress while the next buffer is read.
/// Sequences are handed out in stream order. Until the chunks are handed
/// over with [`ChunkWriter::take_pending`], dropping the writer deletes
/// every issued sequence again.
struct ChunkWriter {
    chunks: ChunkStore,
    file_id: FileId,
    concurrency: usize,
    next_sequence: u32,
    in_flight: FuturesUnordered<WriteTask>,
    lease: Option<UploadLease>,
}

impl ChunkWriter {
    fn new(chunks: ChunkStore, file_id: FileId, concurrency: usize, lease: UploadLease) -> Self {
        Self {
            chunks,
            file_id,
            concurrency: concurrency.max(1),
            next_sequence: 0,
            in_flight: FuturesUnordered::new(),
            lease: Some(lease),
        }
    }

    /// Number of sequences handed out so far.
    fn issued(&self) -> u32 {
        self.next_sequence
    }

    /// Queue the next chunk, waiting while the write window is full.
    async fn write(&mut self, data: Bytes) -> BlobResult<()> {
        while self.in_flight.len() >= self.concurrency {
            self.complete_one().await?;
        }

        let sequence = self.next_sequence;
        self.next_sequence = sequence
            .checked_add(1)
            .ok_or_else(|| BlobError::InvalidInput("upload has too many chunks".to_string()))?;

        let chunks = self.chunks.clone();
        let file_id = self.file_id;
        let len = data.len() as u64;
        self.in_flight.push(tokio::spawn(async move {
            let result = chunks.put(&file_id, sequence, data).await;
            (sequence, len, result)
        }));
        Ok(())
    }

    async fn complete_one(&mut self) -> BlobResult<()> {
        let Some(joined) = self.in_flight.next().await else {
            return Ok(());
        };
        let (sequence, len, result) =
            joined.map_err(|e| BlobError::BackendFailure(format!("chunk write task failed: {e}")))?;

        match result {
            Ok(()) => {
                metrics::CHUNKS_WRITTEN.inc();
                tracing::trace!(sequence, len, "Chunk written");
                Ok(())
            }
            Err(e) => {
                tracing::warn!(sequence, error = %e, "Chunk write failed");
                Err(BlobError::BackendFailure(format!(
                    "failed to write chunk {sequence}: {e}"
                )))
            }
        }
    }

    /// Wait until every queued write is durable.
    async fn flush(&mut self) -> BlobResult<()> {
        while !self.in_flight.is_empty() {
            self.complete_one().await?;
        }
        Ok(())
    }

    /// Hand the issued chunks over. The writer no longer rolls them back.
    fn take_pending(&mut self) -> Option<PendingChunks> {
        let lease = self.lease.take()?;
        Some(PendingChunks {
            chunks: self.chunks.clone(),
            file_id: self.file_id,
            issued: self.next_sequence,
            concurrency: self.concurrency,
            in_flight: std::mem::take(&mut self.in_flight),
            _lease: lease,
        })
    }

    async fn rollback(mut self, reason: &'static str) {
        if let Some(pending) = self.take_pending() {
            pending.undo(reason).await;
        }
    }
}

impl Drop for ChunkWriter {
    fn drop(&mut self) {
        if self.lease.is_none() || self.next_sequence == 0 {
            return;
        }

        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            tracing::warn!(
                file_id = %self.file_id,
                chunks = self.next_sequence,
                "Upload abandoned outside a runtime, chunks left for the orphan sweep"
            );
            return;
        };

        tracing::warn!(
            file_id = %self.file_id,
            chunks = self.next_sequence,
            "Upload abandoned before commit, rolling back"
        );
        if let Some(pending) = self.take_pending() {
            runtime.spawn(pending.undo("cancelled"));
        }
    }
}

/// Chunks of an uncommitted upload, still marked active.
struct PendingChunks {
    chunks: ChunkStore,
    file_id: FileId,
    issued: u32,
    concurrency: usize,
    in_flight: FuturesUnordered<WriteTask>,
    _lease: UploadLease,
}

impl PendingChunks {
    /// Delete sequences `0..issued` once the writes still running have ended.
    ///
    /// Failures are logged and otherwise ignored; the caller's error stands.
    async fn undo(mut self, reason: &'static str) {
        while self.in_flight.next().await.is_some() {}

        let file_id = self.file_id;
        let keys = (0..self.issued)
            .map(|seq| self.chunks.key(&file_id, seq))
            .collect();
        let outcome = self.chunks.delete_many(keys, self.concurrency).await;

        for (key, e) in &outcome.failures {
            tracing::warn!(file_id = %file_id, key = %key, error = %e, "Failed to roll back chunk");
        }
        metrics::INGEST_ROLLBACKS.with_label_values(&[reason]).inc();
        tracing::info!(
            file_id = %file_id,
            reason,
            deleted = outcome.deleted,
            failed = outcome.failures.len(),
            "Upload rolled back"
        );
    }
}
