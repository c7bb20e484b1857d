//! File upload, listing, download and deletion.

use crate::engine::BlobError;
use crate::error::{ApiError, ApiResult};
use crate::state::AppState;
use axum::Json;
use axum::body::Body;
use axum::extract::multipart::{MultipartError, MultipartRejection};
use axum::extract::{Multipart, Path, Query, State};
use axum::http::header::{CONTENT_DISPOSITION, CONTENT_LENGTH, CONTENT_TYPE};
use axum::http::{HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use futures::StreamExt;
use hoard_core::{DEFAULT_CONTENT_TYPE, Disposition, FileId, FileRecord, UploadRequest};
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

/// Multipart field carrying the upload.
pub const UPLOAD_FIELD: &str = "file";

/// POST /upload response.
#[derive(Debug, Serialize)]
pub struct UploadResponse {
    pub file: UploadedFile,
}

/// Summary of a committed upload.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadedFile {
    pub id: FileId,
    /// Stored name.
    pub filename: String,
    pub originalname: String,
    pub content_type: String,
    pub length: u64,
    pub chunk_count: u32,
}

impl From<FileRecord> for UploadedFile {
    fn from(record: FileRecord) -> Self {
        Self {
            id: record.id,
            filename: record.stored_name,
            originalname: record.original_name,
            content_type: record.content_type,
            length: record.length,
            chunk_count: record.chunk_count,
        }
    }
}

/// GET /files entry.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FileListItem {
    #[serde(rename = "_id")]
    pub id: FileId,
    pub filename: String,
    pub originalname: String,
    pub length: u64,
    pub chunk_size: u64,
    pub content_type: String,
    #[serde(with = "time::serde::rfc3339")]
    pub upload_date: OffsetDateTime,
    pub sha256: String,
}

impl From<FileRecord> for FileListItem {
    fn from(record: FileRecord) -> Self {
        Self {
            id: record.id,
            filename: record.stored_name,
            originalname: record.original_name,
            length: record.length,
            chunk_size: record.chunk_size,
            content_type: record.content_type,
            upload_date: record.uploaded_at,
            sha256: record.sha256,
        }
    }
}

/// DELETE /files/{id} response.
#[derive(Debug, Serialize)]
pub struct DeleteResponse {
    pub success: bool,
}

/// Download options.
#[derive(Debug, Default, Deserialize)]
pub struct DownloadQuery {
    /// `inline` or `attachment`.
    pub disposition: Option<String>,
    /// `true` or `1` forces `attachment`.
    pub download: Option<String>,
}

impl DownloadQuery {
    fn resolve(&self, default: Disposition) -> ApiResult<Disposition> {
        if let Some(flag) = self.download.as_deref()
            && matches!(flag.trim().to_ascii_lowercase().as_str(), "true" | "1")
        {
            return Ok(Disposition::Attachment);
        }
        match self.disposition.as_deref() {
            Some(value) => value
                .parse()
                .map_err(|e: hoard_core::Error| BlobError::InvalidInput(e.to_string()).into()),
            None => Ok(default),
        }
    }
}

fn parse_file_id(raw: &str) -> ApiResult<FileId> {
    Ok(FileId::parse(raw).map_err(BlobError::from)?)
}

fn multipart_error(err: MultipartError, limit: u64) -> BlobError {
    if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
        BlobError::PayloadTooLarge { limit }
    } else {
        BlobError::InvalidInput(format!("malformed upload: {}", err.body_text()))
    }
}

/// POST /upload - Store the multipart field `file` as a new file.
///
/// Other fields are skipped; only the first `file` field is stored.
pub async fn upload_file(
    State(state): State<AppState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> ApiResult<Json<UploadResponse>> {
    let engine = &state.engine;
    engine.ensure_ready()?;

    let mut multipart =
        multipart.map_err(|rejection| BlobError::InvalidInput(rejection.body_text()))?;
    let limit = engine.config().max_upload_size;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| multipart_error(e, limit))?
    {
        if field.name() != Some(UPLOAD_FIELD) {
            continue;
        }

        let request = UploadRequest {
            original_name: field.file_name().map(str::to_string),
            content_type: field.content_type().map(str::to_string),
        };
        let body = field.map(move |chunk| chunk.map_err(|e| multipart_error(e, limit)));
        let record = engine.ingest(request, body).await?;

        return Ok(Json(UploadResponse {
            file: record.into(),
        }));
    }

    Err(BlobError::InvalidInput(format!("no file uploaded in field '{UPLOAD_FIELD}'")).into())
}

/// GET /files - List every committed file, newest first.
pub async fn list_files(State(state): State<AppState>) -> ApiResult<Json<Vec<FileListItem>>> {
    let records = state.engine.list().await?;
    Ok(Json(records.into_iter().map(FileListItem::from).collect()))
}

/// GET /files/{id} - Stream a file's content.
///
/// The id is validated before the backend is consulted.
pub async fn download_file(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(query): Query<DownloadQuery>,
) -> ApiResult<Response> {
    let file_id = parse_file_id(&id)?;
    let disposition = query.resolve(state.engine.config().default_disposition)?;

    let download = state.engine.open(file_id).await?;
    let record = download.record;

    let content_type = HeaderValue::from_str(&record.content_type)
        .unwrap_or_else(|_| HeaderValue::from_static(DEFAULT_CONTENT_TYPE));
    let content_disposition = HeaderValue::from_str(&disposition.header_value(&record.original_name))
        .unwrap_or_else(|_| HeaderValue::from_static(disposition.as_str()));

    let body_stream = download
        .stream
        .map(|result| result.map_err(|e| std::io::Error::other(e.to_string())));

    Ok((
        StatusCode::OK,
        [
            (CONTENT_TYPE, content_type),
            (CONTENT_LENGTH, HeaderValue::from(record.length)),
            (CONTENT_DISPOSITION, content_disposition),
        ],
        Body::from_stream(body_stream),
    )
        .into_response())
}

/// DELETE /files/{id} - Delete a file and its chunks.
///
/// An unknown id is a client error here, not a 404.
pub async fn delete_file(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<DeleteResponse>> {
    let file_id = parse_file_id(&id)?;
    match state.engine.delete(file_id).await {
        Ok(()) => Ok(Json(DeleteResponse { success: true })),
        Err(e @ BlobError::NotFound(_)) => Err(ApiError::Rejected(e)),
        Err(e) => Err(e.into()),
    }
}
