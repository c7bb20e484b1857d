//! Core domain types and shared logic for the hoard blob store.
//!
//! This crate defines the data model used across all other crates:
//! - File identifiers and committed file records
//! - Upload input normalization
//! - Chunk keys, chunk layout and the streaming chunker
//! - Download disposition hints
//! - Application configuration

pub mod chunk;
pub mod config;
pub mod disposition;
pub mod error;
pub mod file;
pub mod upload;

pub use chunk::{ChunkLayout, Chunker, EmptyFilePolicy};
pub use disposition::Disposition;
pub use error::{Error, Result};
pub use file::{FileId, FileRecord};
pub use upload::{NormalizedUpload, UploadRequest};

/// Default chunk size: 255 KiB
pub const DEFAULT_CHUNK_SIZE: u64 = 255 * 1024;

/// Maximum chunk size: 16 MiB
pub const MAX_CHUNK_SIZE: u64 = 16 * 1024 * 1024;

/// Minimum chunk size: 1 KiB
pub const MIN_CHUNK_SIZE: u64 = 1024;

/// Default upload limit: 10 MiB
pub const DEFAULT_MAX_UPLOAD_SIZE: u64 = 10 * 1024 * 1024;

/// Content type used when the client does not advertise one.
pub const DEFAULT_CONTENT_TYPE: &str = "application/octet-stream";

/// Default bucket (namespace) for chunk keys and file records.
pub const DEFAULT_BUCKET: &str = "uploads";

/// Maximum length of an original file name in bytes.
pub const MAX_NAME_LEN: usize = 255;
