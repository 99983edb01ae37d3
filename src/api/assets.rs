//! Image uploads for projects and the about section.

use anyhow::Context;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use bytes::Bytes;
use lazy_static::lazy_static;
use regex::Regex;
use std::path::Path;
use tracing::{debug, info, warn};

use super::error::ApiError;
use super::transport_error;
use crate::auth::TokenManager;
use crate::backend::{AssetAction, AssetReply, AssetRequest};
use crate::config::{BackendConfig, StorageConfig};
use crate::utils::format_bytes;

/// Image types accepted for upload
pub const ALLOWED_MIME_TYPES: [&str; 5] = [
    "image/jpeg",
    "image/png",
    "image/webp",
    "image/gif",
    "image/svg+xml",
];

lazy_static! {
    /// File id inside a public view URL
    static ref FILE_ID_REGEX: Regex = Regex::new(r"/files/([a-zA-Z0-9]+)/view").unwrap();
}

/// The file id embedded in an image URL produced by [`AssetGateway::image_url`]
pub fn extract_file_id(url: &str) -> Option<&str> {
    FILE_ID_REGEX
        .captures(url)
        .and_then(|caps| caps.get(1))
        .map(|id| id.as_str())
}

/// A file picked for upload
#[derive(Debug, Clone)]
pub struct Upload {
    pub file_name: String,
    pub mime_type: String,
    pub data: Bytes,
}

impl Upload {
    pub fn new(
        file_name: impl Into<String>,
        mime_type: impl Into<String>,
        data: impl Into<Bytes>,
    ) -> Self {
        Self {
            file_name: file_name.into(),
            mime_type: mime_type.into(),
            data: data.into(),
        }
    }

    /// Read a file from disk, guessing its type from the extension
    pub async fn from_path(path: &Path) -> anyhow::Result<Self> {
        let data = tokio::fs::read(path)
            .await
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let mime_type = mime_guess::from_path(path).first_or_octet_stream();
        let file_name = path
            .file_name()
            .and_then(|name| name.to_str())
            .unwrap_or("upload");

        Ok(Self::new(file_name, mime_type.essence_str(), data))
    }

    pub fn size(&self) -> u64 {
        self.data.len() as u64
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadedAsset {
    pub file_id: String,
    pub url: String,
}

#[derive(Clone)]
pub struct AssetGateway {
    tokens: TokenManager,
    endpoint: String,
    project_id: String,
    bucket_id: String,
    max_upload_bytes: u64,
}

impl AssetGateway {
    pub fn new(tokens: TokenManager, backend: &BackendConfig, storage: &StorageConfig) -> Self {
        Self {
            tokens,
            endpoint: backend.endpoint.trim_end_matches('/').to_string(),
            project_id: backend.project_id.clone(),
            bucket_id: storage.bucket_id.clone(),
            max_upload_bytes: storage.max_upload_bytes,
        }
    }

    /// Check type and size locally, before anything is sent
    pub fn validate(&self, mime_type: &str, size: u64) -> Result<(), ApiError> {
        if !ALLOWED_MIME_TYPES.contains(&mime_type) {
            return Err(ApiError::validation_field(
                "file",
                "Invalid file type. Allowed: JPG, PNG, WebP, GIF, SVG",
            ));
        }
        if size > self.max_upload_bytes {
            return Err(ApiError::validation_field(
                "file",
                format!(
                    "File too large. Maximum size: {}",
                    format_bytes(self.max_upload_bytes)
                ),
            ));
        }
        Ok(())
    }

    /// Public view URL of an uploaded file
    pub fn image_url(&self, file_id: &str) -> String {
        format!(
            "{}/storage/buckets/{}/files/{}/view?project={}",
            self.endpoint, self.bucket_id, file_id, self.project_id
        )
    }

    pub async fn upload(&self, upload: &Upload) -> Result<UploadedAsset, ApiError> {
        self.validate(&upload.mime_type, upload.size())?;

        let access_token = self.access_token().await?;
        let request = AssetRequest {
            action: AssetAction::Upload,
            file_data: Some(BASE64.encode(&upload.data)),
            file_name: Some(upload.file_name.clone()),
            mime_type: Some(upload.mime_type.clone()),
            file_id: None,
            access_token,
        };

        debug!(file = %upload.file_name, size = upload.size(), "Uploading image");
        let reply = self.send(&request, "Upload failed").await?;
        let Some(file_id) = reply.file_id else {
            return Err(ApiError::backend("Upload returned no file id"));
        };
        let url = reply.url.unwrap_or_else(|| self.image_url(&file_id));

        info!(file_id = %file_id, "Uploaded image");
        Ok(UploadedAsset { file_id, url })
    }

    pub async fn delete(&self, file_id: &str) -> Result<(), ApiError> {
        let access_token = self.access_token().await?;
        let request = AssetRequest {
            action: AssetAction::DeleteFile,
            file_data: None,
            file_name: None,
            mime_type: None,
            file_id: Some(file_id.to_string()),
            access_token,
        };

        self.send(&request, "Delete failed").await?;
        info!(file_id, "Deleted image");
        Ok(())
    }

    /// Delete the file behind an image URL
    pub async fn delete_by_url(&self, url: &str) -> Result<(), ApiError> {
        let Some(file_id) = extract_file_id(url) else {
            return Err(ApiError::validation_field("url", "Not an uploaded image URL"));
        };
        self.delete(file_id).await
    }

    async fn access_token(&self) -> Result<String, ApiError> {
        self.tokens
            .ensure_valid_token()
            .await
            .ok_or_else(ApiError::unauthenticated)
    }

    async fn send(&self, request: &AssetRequest, fallback: &str) -> Result<AssetReply, ApiError> {
        let reply = self
            .tokens
            .backend()
            .asset(request)
            .await
            .map_err(transport_error)?;

        if !reply.success {
            let message = reply.error.as_deref().unwrap_or(fallback);
            warn!(error = message, "Asset request rejected");
            return Err(ApiError::backend(message));
        }
        Ok(reply)
    }
}
