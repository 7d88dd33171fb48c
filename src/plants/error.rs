use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use tracing::{error, warn};

use crate::security::auth::AuthFailure;
use crate::storage::UploadError;

/// Failure kinds surfaced to API clients.
///
/// The status code is the machine-readable signal; the body is always
/// `{"message": ...}` and never carries collaborator detail.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("Authentication failed. Token missing.")]
    AuthMissing,
    #[error("Authentication failed. Invalid token.")]
    AuthInvalid,
    #[error("Missing required field: {field}")]
    ValidationFailed { field: String },
    #[error("Field {field} must be a string")]
    InvalidField { field: String },
    #[error("{0}")]
    BadRequest(String),
    #[error("Upload too large")]
    PayloadTooLarge,
    #[error("Plant not found")]
    NotFound,
    #[error("Image upload failed")]
    UploadFailed(#[from] UploadError),
    #[error("Internal Server Error")]
    Internal(#[from] anyhow::Error),
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub message: String,
}

impl ApiError {
    pub fn missing_field(field: &str) -> Self {
        Self::ValidationFailed {
            field: field.to_string(),
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            Self::AuthMissing => StatusCode::UNAUTHORIZED,
            Self::AuthInvalid => StatusCode::FORBIDDEN,
            Self::ValidationFailed { .. } | Self::InvalidField { .. } | Self::BadRequest(_) => {
                StatusCode::BAD_REQUEST
            }
            Self::PayloadTooLarge => StatusCode::PAYLOAD_TOO_LARGE,
            Self::NotFound => StatusCode::NOT_FOUND,
            Self::UploadFailed(_) | Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<AuthFailure> for ApiError {
    fn from(failure: AuthFailure) -> Self {
        match failure {
            AuthFailure::MissingToken => Self::AuthMissing,
            AuthFailure::InvalidToken => Self::AuthInvalid,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match &self {
            Self::UploadFailed(e) => error!(error = %e, "image upload failed"),
            Self::Internal(e) => error!(error = format!("{e:#}"), "request failed"),
            Self::BadRequest(reason) => warn!(reason = %reason, "rejected malformed request"),
            _ => {}
        }

        let body = ErrorResponse {
            message: self.to_string(),
        };
        (self.status(), Json(body)).into_response()
    }
}
