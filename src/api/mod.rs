//! Gateways between the admin screens and the backend.
//!
//! Both gateways resolve a valid access token first and translate every
//! failure into an [`ApiError`].

pub mod assets;
pub mod content;
pub mod error;

pub use assets::{AssetGateway, Upload, UploadedAsset};
pub use content::ContentGateway;
pub use error::{ApiError, ErrorClass, ErrorCode, ErrorDetails};

use tracing::warn;

use crate::backend::BackendError;

/// Translate a request that produced no usable reply
pub(crate) fn transport_error(err: anyhow::Error) -> ApiError {
    if let Some(BackendError::EmptyResponse(source)) = err.downcast_ref::<BackendError>() {
        warn!(source = %source, "Backend returned an empty response");
        return ApiError::empty_response();
    }

    warn!(error = ?err, "Backend request failed");
    ApiError::network()
}
