//! # shop-api
//!
//! HTTP API layer for digital-shop-rs.
//!
//! This crate provides:
//! - Axum-based HTTP server
//! - JWT sessions and argon2 password hashing
//! - Checkout, purchase listing and the download gate
//! - The Midtrans notification endpoint
//! - Admin back-office endpoints
//!
//! ## Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | GET | `/health` | Health check |
//! | POST | `/api/auth/register` | Create account |
//! | POST | `/api/auth/login` | Sign in |
//! | GET | `/api/products` | List products |
//! | GET | `/api/products/{slug}` | Get product |
//! | POST | `/api/payment/create-transaction` | Checkout |
//! | GET | `/api/payment/client-key` | Snap client key |
//! | POST | `/api/payment/notification` | Gateway callback |
//! | GET | `/api/my-purchases` | Purchases of the caller |
//! | GET | `/api/download/{product_id}` | Download link |
//! | * | `/api/admin/...` | Back-office |

pub mod auth;
pub mod config;
pub mod error;
pub mod handlers;
pub mod routes;
pub mod state;

pub use auth::{AdminUser, AuthUser, Claims, SessionKeys};
pub use config::{AdminSeed, AppConfig};
pub use error::{ApiError, ApiResult, ErrorResponse};
pub use routes::create_router;
pub use state::AppState;
