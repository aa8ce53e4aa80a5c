//! # API Errors
//!
//! Every failure leaves the service as `{ "success": false, "error", "code" }`.

use axum::{
    extract::rejection::{JsonRejection, PathRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use shop_core::ShopError;
use thiserror::Error;
use tracing::error;

/// Error response
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub success: bool,
    pub error: String,
    pub code: u16,
}

impl ErrorResponse {
    pub fn new(error: impl Into<String>, code: u16) -> Self {
        Self {
            success: false,
            error: error.into(),
            code,
        }
    }
}

/// Handler error
#[derive(Debug, Error)]
pub enum ApiError {
    #[error(transparent)]
    Shop(#[from] ShopError),

    #[error("Invalid request body: {0}")]
    Body(#[from] JsonRejection),

    #[error("Invalid path: {0}")]
    Path(#[from] PathRejection),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Shop(err) => {
                StatusCode::from_u16(err.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
            }
            ApiError::Body(_) | ApiError::Path(_) => StatusCode::BAD_REQUEST,
        }
    }

    /// Message shown to the caller; server-side detail stays in the logs
    pub fn public_message(&self) -> String {
        let err = match self {
            ApiError::Shop(err) => err,
            ApiError::Body(rejection) => return rejection.body_text(),
            ApiError::Path(rejection) => return rejection.body_text(),
        };

        match err {
            ShopError::InvalidArgument(message)
            | ShopError::NotFound(message)
            | ShopError::Unauthorized(message)
            | ShopError::Forbidden(message)
            | ShopError::Conflict(message) => message.clone(),
            ShopError::GatewayRejected { message, .. } => {
                format!("Payment gateway rejected the request: {message}")
            }
            ShopError::GatewayUnavailable(_) => "Payment gateway unavailable".to_string(),
            ShopError::StorageUnavailable(_) => "Service temporarily unavailable".to_string(),
            ShopError::Configuration(_) | ShopError::Internal(_) => {
                "Internal server error".to_string()
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!("Request failed: {}", self);
        }

        let body = ErrorResponse::new(self.public_message(), status.as_u16());
        (status, Json(body)).into_response()
    }
}

/// Handler result
pub type ApiResult<T> = Result<T, ApiError>;
