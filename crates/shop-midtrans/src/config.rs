//! # Midtrans Configuration
//!
//! Configuration management for the Midtrans Snap integration.
//! All secrets are loaded from environment variables.

use shop_core::ShopError;
use std::env;
use std::time::Duration;

pub const SANDBOX_BASE_URL: &str = "https://app.sandbox.midtrans.com";
pub const PRODUCTION_BASE_URL: &str = "https://app.midtrans.com";

/// Midtrans API configuration
#[derive(Debug, Clone)]
pub struct MidtransConfig {
    /// Server key (SB-Mid-server-... or Mid-server-...); also the callback signing secret
    pub server_key: String,

    /// Client key for the browser Snap widget
    pub client_key: String,

    /// Production host instead of sandbox
    pub is_production: bool,

    /// API base URL (for testing/mocking)
    pub api_base_url: String,

    /// Deadline for one Snap API call
    pub timeout: Duration,
}

impl MidtransConfig {
    /// Load configuration from environment variables.
    ///
    /// Required env vars:
    /// - `MIDTRANS_SERVER_KEY`
    /// - `MIDTRANS_CLIENT_KEY`
    ///
    /// Optional: `MIDTRANS_IS_PRODUCTION`, `MIDTRANS_API_BASE_URL`,
    /// `GATEWAY_TIMEOUT_SECS`.
    pub fn from_env() -> Result<Self, ShopError> {
        dotenvy::dotenv().ok(); // Load .env file if present

        let server_key = env::var("MIDTRANS_SERVER_KEY").map_err(|_| {
            ShopError::Configuration("MIDTRANS_SERVER_KEY not set".to_string())
        })?;

        let client_key = env::var("MIDTRANS_CLIENT_KEY").map_err(|_| {
            ShopError::Configuration("MIDTRANS_CLIENT_KEY not set".to_string())
        })?;

        if !server_key.contains("Mid-server-") {
            return Err(ShopError::Configuration(
                "MIDTRANS_SERVER_KEY must be a Mid-server- key".to_string(),
            ));
        }

        if !client_key.contains("Mid-client-") {
            return Err(ShopError::Configuration(
                "MIDTRANS_CLIENT_KEY must be a Mid-client- key".to_string(),
            ));
        }

        let is_production = env::var("MIDTRANS_IS_PRODUCTION")
            .map(|v| v == "true" || v == "1")
            .unwrap_or(false);

        let mut config = Self::new(server_key, client_key).production(is_production);

        if let Ok(url) = env::var("MIDTRANS_API_BASE_URL") {
            config = config.with_api_base_url(url);
        }

        if let Ok(secs) = env::var("GATEWAY_TIMEOUT_SECS") {
            let secs = secs.parse().map_err(|_| {
                ShopError::Configuration("GATEWAY_TIMEOUT_SECS must be a number".to_string())
            })?;
            config = config.with_timeout(Duration::from_secs(secs));
        }

        Ok(config)
    }

    /// Create sandbox config with explicit values (for testing)
    pub fn new(server_key: impl Into<String>, client_key: impl Into<String>) -> Self {
        Self {
            server_key: server_key.into(),
            client_key: client_key.into(),
            is_production: false,
            api_base_url: SANDBOX_BASE_URL.to_string(),
            timeout: Duration::from_secs(30),
        }
    }

    /// Builder: switch between sandbox and production hosts
    pub fn production(mut self, is_production: bool) -> Self {
        self.is_production = is_production;
        self.api_base_url = if is_production {
            PRODUCTION_BASE_URL
        } else {
            SANDBOX_BASE_URL
        }
        .to_string();
        self
    }

    /// Check if using sandbox keys
    pub fn is_sandbox_key(&self) -> bool {
        self.server_key.starts_with("SB-")
    }

    /// Builder: set custom API base URL (for testing)
    pub fn with_api_base_url(mut self, url: impl Into<String>) -> Self {
        self.api_base_url = url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Snap transaction endpoint
    pub fn transactions_url(&self) -> String {
        format!("{}/snap/v1/transactions", self.api_base_url)
    }
}
