//! Upload request input and its normalization.

use crate::{DEFAULT_CONTENT_TYPE, MAX_NAME_LEN};

/// Client-supplied attributes of an upload, before validation.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct UploadRequest {
    /// Display name as sent by the client (multipart `filename`).
    pub original_name: Option<String>,
    /// Advertised MIME type of the upload part.
    pub content_type: Option<String>,
}

/// Upload attributes after normalization.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NormalizedUpload {
    pub original_name: String,
    pub content_type: String,
}

impl UploadRequest {
    /// Create a request from a name and optional content type.
    pub fn new(original_name: impl Into<String>, content_type: Option<String>) -> Self {
        Self {
            original_name: Some(original_name.into()),
            content_type,
        }
    }

    /// Validate and normalize the request.
    ///
    /// Path components are stripped from the name so that only the final
    /// segment is kept. A blank content type falls back to
    /// `application/octet-stream`.
    pub fn normalize(&self) -> crate::Result<NormalizedUpload> {
        let raw = self
            .original_name
            .as_deref()
            .ok_or_else(|| crate::Error::InvalidName("file name is missing".to_string()))?;

        let base = raw.rsplit(['/', '\\']).next().unwrap_or(raw).trim();

        if base.is_empty() {
            return Err(crate::Error::InvalidName(
                "file name is empty".to_string(),
            ));
        }
        if base.len() > MAX_NAME_LEN {
            return Err(crate::Error::InvalidName(format!(
                "file name is {} bytes (max {MAX_NAME_LEN})",
                base.len()
            )));
        }
        if base.chars().any(char::is_control) {
            return Err(crate::Error::InvalidName(
                "file name contains control characters".to_string(),
            ));
        }

        let content_type = self
            .content_type
            .as_deref()
            .map(str::trim)
            .filter(|ct| !ct.is_empty())
            .unwrap_or(DEFAULT_CONTENT_TYPE)
            .to_string();

        Ok(NormalizedUpload {
            original_name: base.to_string(),
            content_type,
        })
    }
}
