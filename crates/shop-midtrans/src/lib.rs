//! # shop-midtrans
//!
//! Midtrans Snap payment gateway for digital-shop-rs.
//!
//! - **Outbound**: one Snap transaction per checkout, returning the token
//!   and redirect URL for the hosted payment page.
//! - **Inbound**: HTTP notifications are verified against the SHA-512
//!   `signature_key` before the reconciler may act on them.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use shop_midtrans::MidtransSnapGateway;
//! use shop_core::PaymentGateway;
//!
//! let gateway = MidtransSnapGateway::from_env()?;
//! let token = gateway.create_transaction(&request).await?;
//!
//! // In your notification endpoint:
//! gateway.verify_notification(&notification)?;
//! ```

pub mod config;
pub mod signature;
pub mod snap;

// Re-exports
pub use config::{MidtransConfig, PRODUCTION_BASE_URL, SANDBOX_BASE_URL};
pub use signature::notification_signature;
pub use snap::MidtransSnapGateway;
