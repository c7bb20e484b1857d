//! File identity and committed file records.

use crate::chunk::ChunkLayout;
use serde::{Deserialize, Serialize};
use std::fmt;
use time::OffsetDateTime;
use uuid::Uuid;

/// Number of hex characters of the per-upload nonce in a stored name.
const STORED_NAME_NONCE_LEN: usize = 12;

/// Unique identifier for a stored file.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct FileId(Uuid);

impl FileId {
    /// Generate a new random file ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Parse from a string.
    pub fn parse(s: &str) -> crate::Result<Self> {
        Uuid::parse_str(s)
            .map(Self)
            .map_err(|e| crate::Error::InvalidFileId(format!("{s:?}: {e}")))
    }

    /// Wrap an existing UUID.
    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Get the underlying UUID.
    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for FileId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for FileId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "FileId({})", self.0)
    }
}

impl fmt::Display for FileId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Metadata of one logically complete file.
///
/// A record is only ever created after every chunk it describes has been
/// durably written, so holding one implies chunks `0..chunk_count` exist.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileRecord {
    /// File identifier, stable for the file's lifetime.
    pub id: FileId,
    /// Display name supplied by the client.
    pub original_name: String,
    /// Collision-resistant internal name.
    pub stored_name: String,
    /// MIME type served on download.
    pub content_type: String,
    /// Total size in bytes.
    pub length: u64,
    /// Chunk size used when the file was ingested.
    pub chunk_size: u64,
    /// Number of chunks persisted for this file.
    pub chunk_count: u32,
    /// Hex-encoded SHA-256 of the full content.
    pub sha256: String,
    /// When the file was committed.
    #[serde(with = "time::serde::rfc3339")]
    pub uploaded_at: OffsetDateTime,
}

impl FileRecord {
    /// Chunk layout described by this record.
    pub fn layout(&self) -> ChunkLayout {
        ChunkLayout {
            length: self.length,
            chunk_size: self.chunk_size,
            chunk_count: self.chunk_count,
        }
    }
}

/// Build the stored name for a new upload.
///
/// Combines the millisecond timestamp taken when the upload starts, a random
/// nonce and the original name, so two concurrent uploads of the same name
/// never collide.
pub fn stored_name(original_name: &str, now: OffsetDateTime) -> String {
    let millis = now.unix_timestamp_nanos() / 1_000_000;
    let nonce = Uuid::new_v4().simple().to_string();
    format!(
        "{millis}-{}-{original_name}",
        &nonce[..STORED_NAME_NONCE_LEN]
    )
}
