//! # Shop Error Types
//!
//! Typed error handling for the order/payment/entitlement lifecycle.
//! All shop operations return `Result<T, ShopError>`.

use thiserror::Error;

/// Core error type for all shop operations
#[derive(Debug, Error)]
pub enum ShopError {
    /// Malformed request shape (empty cart, bad quantity, missing field)
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Unknown product, order or user reference
    #[error("Not found: {0}")]
    NotFound(String),

    /// Missing or invalid caller credential (session token, callback signature)
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// Authenticated but not entitled
    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// Unique key already taken, or a delete would orphan dependent rows
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Payment gateway unreachable or timed out
    #[error("Payment gateway unavailable: {0}")]
    GatewayUnavailable(String),

    /// Payment gateway reachable but refused the request
    #[error("Gateway error [{provider}]: {message}")]
    GatewayRejected { provider: String, message: String },

    /// Persistence layer failure or timeout
    #[error("Storage unavailable: {0}")]
    StorageUnavailable(String),

    /// Configuration errors (missing keys, invalid values)
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Internal error (should not happen)
    #[error("Internal error: {0}")]
    Internal(String),
}

impl ShopError {
    /// Returns true if the caller may safely retry the same request
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ShopError::GatewayUnavailable(_) | ShopError::StorageUnavailable(_)
        )
    }

    /// Returns the HTTP status code appropriate for this error
    pub fn status_code(&self) -> u16 {
        match self {
            ShopError::InvalidArgument(_) => 400,
            ShopError::NotFound(_) => 404,
            ShopError::Unauthorized(_) => 401,
            ShopError::Forbidden(_) => 403,
            ShopError::Conflict(_) => 409,
            ShopError::GatewayUnavailable(_) => 503,
            ShopError::GatewayRejected { .. } => 502,
            ShopError::StorageUnavailable(_) => 503,
            ShopError::Configuration(_) => 500,
            ShopError::Internal(_) => 500,
        }
    }
}

/// Result type alias for shop operations
pub type ShopResult<T> = Result<T, ShopError>;
