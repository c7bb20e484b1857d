//! Database models mapping to the metadata schema.

use crate::error::{MetadataError, MetadataResult};
use hoard_core::{FileId, FileRecord};
use sqlx::FromRow;
use time::OffsetDateTime;
use uuid::Uuid;

/// Committed file record.
#[derive(Debug, Clone, PartialEq, Eq, FromRow)]
pub struct FileRow {
    pub bucket: String,
    pub file_id: Uuid,
    pub original_name: String,
    pub stored_name: String,
    pub content_type: String,
    pub length: i64,
    pub chunk_size: i64,
    pub chunk_count: i64,
    pub sha256: String,
    pub uploaded_at: OffsetDateTime,
}

impl FileRow {
    /// Build the row for `record` in `bucket`.
    pub fn from_record(bucket: &str, record: &FileRecord) -> MetadataResult<Self> {
        let to_i64 = |field: &str, value: u64| {
            i64::try_from(value)
                .map_err(|_| MetadataError::Internal(format!("{field} {value} overflows i64")))
        };
        Ok(Self {
            bucket: bucket.to_string(),
            file_id: *record.id.as_uuid(),
            original_name: record.original_name.clone(),
            stored_name: record.stored_name.clone(),
            content_type: record.content_type.clone(),
            length: to_i64("length", record.length)?,
            chunk_size: to_i64("chunk_size", record.chunk_size)?,
            chunk_count: i64::from(record.chunk_count),
            sha256: record.sha256.clone(),
            uploaded_at: record.uploaded_at,
        })
    }
}

impl TryFrom<FileRow> for FileRecord {
    type Error = MetadataError;

    fn try_from(row: FileRow) -> MetadataResult<Self> {
        let corrupt = |field: &str, value: i64| {
            MetadataError::Internal(format!(
                "file {} has invalid {field} {value}",
                row.file_id
            ))
        };
        let length = u64::try_from(row.length).map_err(|_| corrupt("length", row.length))?;
        let chunk_size =
            u64::try_from(row.chunk_size).map_err(|_| corrupt("chunk_size", row.chunk_size))?;
        let chunk_count =
            u32::try_from(row.chunk_count).map_err(|_| corrupt("chunk_count", row.chunk_count))?;

        Ok(FileRecord {
            id: FileId::from_uuid(row.file_id),
            original_name: row.original_name,
            stored_name: row.stored_name,
            content_type: row.content_type,
            length,
            chunk_size,
            chunk_count,
            sha256: row.sha256,
            uploaded_at: row.uploaded_at,
        })
    }
}
