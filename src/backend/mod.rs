//! The remote backend-as-a-service, seen through one trait.
//!
//! Three implementations exist: the function-mediated JWT flow, direct REST
//! calls against the account/databases/storage APIs, and an in-process
//! backend for offline use. Each returns the same wire replies.

mod client;
mod direct;
mod functions;
mod memory;

pub use client::RestClient;
pub use direct::DirectBackend;
pub use functions::FunctionsBackend;
pub use memory::{CallCounts, MemoryBackend};

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;

use crate::clock::Clock;
use crate::config::{BackendKind, Config};
use crate::models::{AdminUser, Collection};

/// Machine-readable error type the backend uses for a bad email/password pair
pub const INVALID_CREDENTIALS: &str = "user_invalid_credentials";

/// Error type reported when the account exists but is not an admin
pub const NOT_ADMIN: &str = "user_not_admin";

/// Transport-level failures that callers may want to tell apart
#[derive(Error, Debug)]
pub enum BackendError {
    #[error("Empty response from {0}")]
    EmptyResponse(String),

    #[error("Backend returned HTTP {status}: {body}")]
    Status { status: u16, body: String },
}

/// Reply to login, verify and refresh
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthReply {
    #[serde(default)]
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<AdminUser>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub access_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Machine-readable error type, e.g. [`INVALID_CREDENTIALS`]
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub error_type: Option<String>,
}

impl AuthReply {
    pub fn rejected(error: impl Into<String>) -> Self {
        Self {
            success: false,
            error: Some(error.into()),
            ..Default::default()
        }
    }

    pub fn with_error_type(mut self, error_type: impl Into<String>) -> Self {
        self.error_type = Some(error_type.into());
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentAction {
    List,
    Get,
    Create,
    Update,
    Delete,
}

impl std::fmt::Display for ContentAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::List => write!(f, "list"),
            Self::Get => write!(f, "get"),
            Self::Create => write!(f, "create"),
            Self::Update => write!(f, "update"),
            Self::Delete => write!(f, "delete"),
        }
    }
}

/// One content operation, as posted to the content endpoint
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContentRequest {
    pub action: ContentAction,
    pub collection: Collection,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub document_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
    pub access_token: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ContentReply {
    #[serde(default)]
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub document: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub documents: Option<Vec<serde_json::Value>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl ContentReply {
    pub fn rejected(error: impl Into<String>) -> Self {
        Self {
            success: false,
            error: Some(error.into()),
            ..Default::default()
        }
    }

    pub fn with_document(document: serde_json::Value) -> Self {
        Self {
            success: true,
            document: Some(document),
            ..Default::default()
        }
    }

    pub fn with_documents(documents: Vec<serde_json::Value>) -> Self {
        Self {
            success: true,
            total: Some(documents.len() as u64),
            documents: Some(documents),
            ..Default::default()
        }
    }

    pub fn ok() -> Self {
        Self {
            success: true,
            ..Default::default()
        }
    }

    /// The most specific failure text the backend gave
    pub fn error_text(&self) -> Option<&str> {
        self.message.as_deref().or(self.error.as_deref())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum AssetAction {
    Upload,
    DeleteFile,
}

/// One file operation; uploads carry the file as base64
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssetRequest {
    pub action: AssetAction,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_data: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_id: Option<String>,
    pub access_token: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssetReply {
    #[serde(default)]
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl AssetReply {
    pub fn rejected(error: impl Into<String>) -> Self {
        Self {
            success: false,
            error: Some(error.into()),
            ..Default::default()
        }
    }

    pub fn uploaded(file_id: impl Into<String>) -> Self {
        Self {
            success: true,
            file_id: Some(file_id.into()),
            ..Default::default()
        }
    }

    pub fn ok() -> Self {
        Self {
            success: true,
            ..Default::default()
        }
    }
}

/// The login/verify/refresh/CRUD/file contract of the remote backend.
///
/// `Err` means the request never produced a usable reply (transport, decode,
/// empty body). A reply with `success: false` is the backend saying no.
#[async_trait]
pub trait Backend: Send + Sync {
    fn name(&self) -> &'static str;
    async fn login(&self, email: &str, password: &str) -> Result<AuthReply>;
    async fn verify(&self, access_token: &str) -> Result<AuthReply>;
    async fn refresh(&self, refresh_token: &str) -> Result<AuthReply>;
    /// End the remote session tied to `refresh_token`, if the backend keeps one
    async fn logout(&self, refresh_token: Option<&str>) -> Result<()>;
    async fn content(&self, request: &ContentRequest) -> Result<ContentReply>;
    async fn asset(&self, request: &AssetRequest) -> Result<AssetReply>;
}

/// Build the backend selected in the configuration
pub fn create_backend(config: &Config, clock: Arc<dyn Clock>) -> Result<Arc<dyn Backend>> {
    let backend: Arc<dyn Backend> = match config.backend.kind {
        BackendKind::Functions => {
            let rest = RestClient::new(&config.backend, &config.http)?;
            Arc::new(FunctionsBackend::new(
                rest,
                config.backend.auth_function_id.clone(),
                config.backend.content_function_id.clone(),
            ))
        }
        BackendKind::Direct => {
            let rest = RestClient::new(&config.backend, &config.http)?;
            Arc::new(DirectBackend::new(
                rest,
                config.backend.database_id.clone(),
                config.storage.bucket_id.clone(),
            ))
        }
        BackendKind::Memory => Arc::new(MemoryBackend::from_config(&config.backend.memory, clock)),
    };

    tracing::info!(backend = backend.name(), "Using {} backend", config.backend.kind);
    Ok(backend)
}
