//! Retrieval pipeline: listing and ordered chunk streaming.

use super::BlobEngine;
use super::chunks::ChunkStore;
use super::error::{BlobError, BlobResult};
use crate::metrics;
use async_stream::try_stream;
use bytes::Bytes;
use futures::{Stream, StreamExt};
use hoard_core::chunk::ChunkLayout;
use hoard_core::{FileId, FileRecord};
use hoard_storage::StorageError;
use std::pin::Pin;

/// Lazily read file content. Ends after the last chunk; a failed read is
/// yielded as an `Err` item and ends the stream.
pub type ByteStream = Pin<Box<dyn Stream<Item = BlobResult<Bytes>> + Send>>;

/// An opened file: its record and a fresh content stream.
pub struct FileDownload {
    pub record: FileRecord,
    pub stream: ByteStream,
}

impl BlobEngine {
    /// All committed files, newest first.
    #[tracing::instrument(skip(self), fields(bucket = %self.config.bucket))]
    pub async fn list(&self) -> BlobResult<Vec<FileRecord>> {
        self.backend()?.catalog.list().await
    }

    /// Open a file for reading.
    ///
    /// Fails before any content is produced when the record is missing or
    /// its first chunk is gone.
    #[tracing::instrument(skip(self), fields(bucket = %self.config.bucket, file_id = %file_id))]
    pub async fn open(&self, file_id: FileId) -> BlobResult<FileDownload> {
        let backend = self.backend()?;
        let record = backend
            .catalog
            .get(&file_id)
            .await?
            .ok_or(BlobError::NotFound(file_id))?;

        let layout = record.layout();
        layout
            .validate()
            .map_err(|e| BlobError::corrupt(file_id, e.to_string()))?;

        if layout.chunk_count > 0 && !backend.chunks.exists(&file_id, 0).await? {
            tracing::error!("First chunk missing for committed file");
            return Err(BlobError::corrupt(file_id, "chunk 0 is missing"));
        }

        metrics::DOWNLOADS_STARTED.inc();
        let stream = chunk_stream(
            backend.chunks.clone(),
            file_id,
            layout,
            self.config.read_ahead,
        );
        Ok(FileDownload { record, stream })
    }
}

/// Read chunks `0..chunk_count` in order with `read_ahead` reads in flight.
fn chunk_stream(
    chunks: ChunkStore,
    file_id: FileId,
    layout: ChunkLayout,
    read_ahead: usize,
) -> ByteStream {
    Box::pin(try_stream! {
        let mut reads = futures::stream::iter(0..layout.chunk_count)
            .map(move |sequence| {
                let chunks = chunks.clone();
                async move { (sequence, chunks.get(&file_id, sequence).await) }
            })
            .buffered(read_ahead.max(1));

        let mut served: u64 = 0;
        while let Some((sequence, result)) = reads.next().await {
            let data = result.map_err(|e| read_failure(file_id, sequence, e))?;
            check_chunk(file_id, &layout, sequence, &data)?;
            served += data.len() as u64;
            metrics::DOWNLOAD_BYTES.inc_by(data.len() as u64);
            yield data;
        }

        check_total(file_id, &layout, served)?;
    })
}

fn read_failure(file_id: FileId, sequence: u32, err: StorageError) -> BlobError {
    let err = if err.is_not_found() {
        BlobError::corrupt(file_id, format!("chunk {sequence} is missing"))
    } else {
        BlobError::BackendFailure(format!("failed to read chunk {sequence}: {err}"))
    };
    tracing::error!(file_id = %file_id, sequence, error = %err, "Download failed mid-stream");
    metrics::DOWNLOAD_FAILURES.with_label_values(&[err.code()]).inc();
    err
}

fn check_chunk(file_id: FileId, layout: &ChunkLayout, sequence: u32, data: &Bytes) -> BlobResult<()> {
    let expected = layout.expected_len(sequence).unwrap_or(0);
    if data.len() as u64 == expected {
        return Ok(());
    }
    let err = BlobError::corrupt(
        file_id,
        format!("chunk {sequence} has {} bytes, expected {expected}", data.len()),
    );
    tracing::error!(file_id = %file_id, sequence, error = %err, "Chunk length mismatch");
    metrics::DOWNLOAD_FAILURES.with_label_values(&[err.code()]).inc();
    Err(err)
}

fn check_total(file_id: FileId, layout: &ChunkLayout, served: u64) -> BlobResult<()> {
    if served == layout.length {
        return Ok(());
    }
    metrics::DOWNLOAD_FAILURES.with_label_values(&["corrupt_record"]).inc();
    Err(BlobError::corrupt(
        file_id,
        format!("served {served} bytes, record says {}", layout.length),
    ))
}
