//! Unified error handling for the data-access layer.
//!
//! Every expected failure (bad credentials, lost session, network trouble,
//! rejected input, backend refusal) is returned as an [`ApiError`] carrying a
//! message that can be shown to the admin as-is. Nothing in the gateways
//! panics or propagates a transport error untranslated.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Error codes for gateway results
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    // Authentication
    Unauthenticated,
    InvalidCredentials,
    Forbidden,

    // Local validation
    Validation,

    // Transport
    Network,
    EmptyResponse,

    // Remote refusals
    NotFound,
    Backend,

    // Local client storage
    Storage,
}

/// The broad class an error falls into, which decides how the UI reacts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Session must be (re)established
    Auth,
    /// The request never produced a usable reply
    Transport,
    /// Rejected locally before any network call
    Validation,
    /// The backend processed the request and said no
    Remote,
}

impl ErrorCode {
    pub fn class(&self) -> ErrorClass {
        match self {
            ErrorCode::Unauthenticated | ErrorCode::InvalidCredentials | ErrorCode::Forbidden => {
                ErrorClass::Auth
            }
            ErrorCode::Network | ErrorCode::EmptyResponse => ErrorClass::Transport,
            ErrorCode::Validation => ErrorClass::Validation,
            ErrorCode::NotFound | ErrorCode::Backend | ErrorCode::Storage => ErrorClass::Remote,
        }
    }

    /// Get the string representation of the error code
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::Unauthenticated => "unauthenticated",
            ErrorCode::InvalidCredentials => "invalid_credentials",
            ErrorCode::Forbidden => "forbidden",
            ErrorCode::Validation => "validation_error",
            ErrorCode::Network => "network_error",
            ErrorCode::EmptyResponse => "empty_response",
            ErrorCode::NotFound => "not_found",
            ErrorCode::Backend => "backend_error",
            ErrorCode::Storage => "storage_error",
        }
    }
}

/// Additional error details
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ErrorDetails {
    /// Field-level validation errors
    ValidationErrors(HashMap<String, Vec<String>>),
    /// Raw backend error string, kept for logs when the message was rewritten
    Backend(String),
}

/// Gateway error with a user-facing message
#[derive(Debug, Clone, PartialEq)]
pub struct ApiError {
    code: ErrorCode,
    message: String,
    details: Option<ErrorDetails>,
}

impl ApiError {
    /// Create a new error with a specific code and message
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            details: None,
        }
    }

    /// Add details to the error
    pub fn with_details(mut self, details: ErrorDetails) -> Self {
        self.details = Some(details);
        self
    }

    pub fn code(&self) -> ErrorCode {
        self.code
    }

    pub fn class(&self) -> ErrorClass {
        self.code.class()
    }

    /// Message suitable for display in a form or banner
    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn details(&self) -> Option<&ErrorDetails> {
        self.details.as_ref()
    }

    // -------------------------------------------------------------------------
    // Convenience constructors for common error types
    // -------------------------------------------------------------------------

    /// No usable access token could be obtained
    pub fn unauthenticated() -> Self {
        Self::new(ErrorCode::Unauthenticated, "Not authenticated")
    }

    /// Email/password pair rejected
    pub fn invalid_credentials() -> Self {
        Self::new(ErrorCode::InvalidCredentials, "Invalid email or password")
    }

    /// Authenticated, but not allowed (e.g. not an admin)
    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Forbidden, message)
    }

    /// Transport failure, already logged at the call site
    pub fn network() -> Self {
        Self::new(ErrorCode::Network, "Network error")
    }

    pub fn empty_response() -> Self {
        Self::new(ErrorCode::EmptyResponse, "Empty response from server")
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::NotFound, message)
    }

    /// The backend answered `success: false`
    pub fn backend(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Backend, message)
    }

    pub fn storage(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Storage, message)
    }

    /// Validation error with field-level details
    pub fn validation(errors: HashMap<String, Vec<String>>) -> Self {
        let message = if errors.len() == 1 {
            errors
                .values()
                .next()
                .and_then(|v| v.first())
                .cloned()
                .unwrap_or_else(|| "Validation failed".to_string())
        } else {
            format!("Validation failed for {} fields", errors.len())
        };

        Self::new(ErrorCode::Validation, message)
            .with_details(ErrorDetails::ValidationErrors(errors))
    }

    /// Single field validation error
    pub fn validation_field(field: &str, message: impl Into<String>) -> Self {
        let mut errors = HashMap::new();
        errors.insert(field.to_string(), vec![message.into()]);
        Self::validation(errors)
    }
}

impl std::fmt::Display for ApiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}] {}", self.code.as_str(), self.message)
    }
}

impl std::error::Error for ApiError {}

impl From<crate::storage::StorageError> for ApiError {
    fn from(err: crate::storage::StorageError) -> Self {
        tracing::error!("Client storage error: {}", err);
        ApiError::storage("Could not save session locally")
    }
}
