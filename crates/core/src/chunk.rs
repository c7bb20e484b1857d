//! Chunk keys, chunk layout and stream re-slicing.

use crate::file::FileId;
use bytes::{Bytes, BytesMut};
use serde::{Deserialize, Serialize};

/// Width of the zero-padded sequence number in chunk keys.
///
/// Padding keeps lexical key order equal to sequence order.
pub const SEQUENCE_WIDTH: usize = 10;

/// Key prefix under which every chunk of a bucket lives.
pub fn chunks_root(bucket: &str) -> String {
    format!("{bucket}/chunks/")
}

/// Key prefix holding all chunks of one file.
pub fn chunk_prefix(bucket: &str, file_id: &FileId) -> String {
    format!("{bucket}/chunks/{file_id}/")
}

/// Object key of a single chunk.
pub fn chunk_key(bucket: &str, file_id: &FileId, sequence: u32) -> String {
    format!(
        "{bucket}/chunks/{file_id}/{sequence:0width$}",
        width = SEQUENCE_WIDTH
    )
}

/// Parse a chunk key produced by [`chunk_key`] back into its parts.
///
/// Returns `None` for keys outside the bucket or with a foreign shape,
/// such as temporary files left behind by a backend.
pub fn parse_chunk_key(bucket: &str, key: &str) -> Option<(FileId, u32)> {
    let rest = key.strip_prefix(bucket)?.strip_prefix("/chunks/")?;
    let (id, seq) = rest.split_once('/')?;
    if seq.len() != SEQUENCE_WIDTH || !seq.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let file_id = FileId::parse(id).ok()?;
    let sequence = seq.parse().ok()?;
    Some((file_id, sequence))
}

/// How a zero-byte upload is persisted.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EmptyFilePolicy {
    /// No chunk object is written; `chunk_count = 0`.
    #[default]
    NoChunks,
    /// One zero-length chunk at sequence 0; `chunk_count = 1`.
    SingleEmptyChunk,
}

/// Expected shape of a file's chunk set.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ChunkLayout {
    pub length: u64,
    pub chunk_size: u64,
    pub chunk_count: u32,
}

impl ChunkLayout {
    /// Layout of a file of `length` bytes split at `chunk_size`.
    pub fn for_length(length: u64, chunk_size: u64, policy: EmptyFilePolicy) -> crate::Result<Self> {
        if chunk_size == 0 {
            return Err(crate::Error::ChunkLayout("chunk size is zero".to_string()));
        }
        let count = if length == 0 {
            match policy {
                EmptyFilePolicy::NoChunks => 0,
                EmptyFilePolicy::SingleEmptyChunk => 1,
            }
        } else {
            length.div_ceil(chunk_size)
        };
        let chunk_count = u32::try_from(count).map_err(|_| {
            crate::Error::ChunkLayout(format!("{count} chunks exceed the sequence range"))
        })?;
        Ok(Self {
            length,
            chunk_size,
            chunk_count,
        })
    }

    /// Check that the count agrees with length and chunk size.
    pub fn validate(&self) -> crate::Result<()> {
        if self.chunk_size == 0 {
            return Err(crate::Error::ChunkLayout("chunk size is zero".to_string()));
        }
        let consistent = if self.length == 0 {
            self.chunk_count <= 1
        } else {
            u64::from(self.chunk_count) == self.length.div_ceil(self.chunk_size)
        };
        if !consistent {
            return Err(crate::Error::ChunkLayout(format!(
                "{} chunks of {} bytes cannot hold {} bytes",
                self.chunk_count, self.chunk_size, self.length
            )));
        }
        Ok(())
    }

    /// Expected byte length of the chunk at `sequence`.
    pub fn expected_len(&self, sequence: u32) -> Option<u64> {
        if sequence >= self.chunk_count {
            return None;
        }
        if sequence + 1 < self.chunk_count {
            return Some(self.chunk_size);
        }
        let preceding = u64::from(self.chunk_count - 1) * self.chunk_size;
        Some(self.length.saturating_sub(preceding))
    }
}

/// Re-slices arbitrarily sized buffers into fixed-size chunks.
///
/// Full chunks are split off without copying when an incoming buffer is
/// aligned; only the straddling remainder is buffered.
#[derive(Debug)]
pub struct Chunker {
    chunk_size: usize,
    buf: BytesMut,
}

impl Chunker {
    /// Create a chunker for the given chunk size.
    pub fn new(chunk_size: usize) -> Self {
        Self {
            chunk_size: chunk_size.max(1),
            buf: BytesMut::new(),
        }
    }

    /// Feed a buffer, returning every chunk it completes, in order.
    pub fn push(&mut self, mut data: Bytes) -> Vec<Bytes> {
        let mut ready = Vec::new();

        if !self.buf.is_empty() {
            let take = (self.chunk_size - self.buf.len()).min(data.len());
            self.buf.extend_from_slice(&data.split_to(take));
            if self.buf.len() == self.chunk_size {
                ready.push(self.buf.split().freeze());
            }
        }

        while data.len() >= self.chunk_size {
            ready.push(data.split_to(self.chunk_size));
        }

        if !data.is_empty() {
            self.buf.extend_from_slice(&data);
        }

        ready
    }

    /// Bytes held back waiting for a full chunk.
    pub fn pending(&self) -> usize {
        self.buf.len()
    }

    /// Flush the trailing partial chunk, if any.
    pub fn finish(self) -> Option<Bytes> {
        if self.buf.is_empty() {
            None
        } else {
            Some(self.buf.freeze())
        }
    }
}
