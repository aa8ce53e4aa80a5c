//! # Application Configuration
//!
//! Environment-driven settings for the HTTP service. Gateway credentials
//! are read separately by `shop_midtrans::MidtransConfig`.

use shop_core::{ShopError, ShopResult, TransitionPolicy, DEFAULT_STORAGE_TIMEOUT};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::time::Duration;

const DEFAULT_CORS_ORIGINS: &str = "http://localhost:5173,http://localhost:3000";

/// Account created at start-up when `ADMIN_EMAIL` and `ADMIN_PASSWORD` are set
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdminSeed {
    pub name: String,
    pub email: String,
    pub password: String,
}

/// Application configuration
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Host to bind to
    pub host: String,
    /// Port to listen on
    pub port: u16,
    /// Environment (development, staging, production)
    pub environment: String,
    pub database_url: String,
    pub database_max_connections: u32,
    /// HS256 session signing key
    pub jwt_secret: String,
    pub session_ttl_hours: i64,
    /// Prefix turning stored file keys into download URLs
    pub files_base_url: Option<String>,
    /// Deadline per storage call
    pub storage_timeout: Duration,
    pub transition_policy: TransitionPolicy,
    pub cors_origins: Vec<String>,
    pub admin: Option<AdminSeed>,
}

impl AppConfig {
    /// Load from environment variables (and an optional `.env`)
    pub fn from_env() -> ShopResult<Self> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load from an explicit variable map
    pub fn from_map(vars: &HashMap<String, String>) -> ShopResult<Self> {
        Self::from_lookup(|key| vars.get(key).cloned())
    }

    fn from_lookup(var: impl Fn(&str) -> Option<String>) -> ShopResult<Self> {
        let jwt_secret = var("JWT_SECRET")
            .filter(|s| !s.trim().is_empty())
            .ok_or_else(|| ShopError::Configuration("JWT_SECRET not set".to_string()))?;

        let transition_policy = match var("ORDER_TRANSITION_POLICY") {
            Some(raw) => raw.parse().map_err(ShopError::Configuration)?,
            None => TransitionPolicy::default(),
        };

        let admin = match (var("ADMIN_EMAIL"), var("ADMIN_PASSWORD")) {
            (Some(email), Some(password)) => Some(AdminSeed {
                name: var("ADMIN_NAME").unwrap_or_else(|| "Administrator".to_string()),
                email,
                password,
            }),
            _ => None,
        };

        Ok(Self {
            host: var("HOST").unwrap_or_else(|| "127.0.0.1".to_string()),
            port: parse_or(&var, "PORT", 8080)?,
            environment: var("ENVIRONMENT").unwrap_or_else(|| "development".to_string()),
            database_url: var("DATABASE_URL")
                .unwrap_or_else(|| "sqlite://shop.db?mode=rwc".to_string()),
            database_max_connections: parse_or(&var, "DATABASE_MAX_CONNECTIONS", 5)?,
            jwt_secret,
            session_ttl_hours: parse_or(&var, "SESSION_TTL_HOURS", 24 * 7)?,
            files_base_url: var("FILES_BASE_URL").filter(|s| !s.trim().is_empty()),
            storage_timeout: var("STORAGE_TIMEOUT_MS")
                .map(|raw| {
                    raw.parse()
                        .map(Duration::from_millis)
                        .map_err(|_| invalid("STORAGE_TIMEOUT_MS", &raw))
                })
                .transpose()?
                .unwrap_or(DEFAULT_STORAGE_TIMEOUT),
            transition_policy,
            cors_origins: var("CORS_ORIGINS")
                .unwrap_or_else(|| DEFAULT_CORS_ORIGINS.to_string())
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(String::from)
                .collect(),
            admin,
        })
    }

    /// Get the socket address to bind to
    pub fn socket_addr(&self) -> ShopResult<SocketAddr> {
        format!("{}:{}", self.host, self.port)
            .parse()
            .map_err(|_| invalid("HOST/PORT", &format!("{}:{}", self.host, self.port)))
    }

    /// Check if running in production
    pub fn is_production(&self) -> bool {
        self.environment == "production"
    }
}

fn parse_or<T: std::str::FromStr>(
    var: &impl Fn(&str) -> Option<String>,
    key: &str,
    default: T,
) -> ShopResult<T> {
    match var(key) {
        Some(raw) => raw.trim().parse().map_err(|_| invalid(key, &raw)),
        None => Ok(default),
    }
}

fn invalid(key: &str, raw: &str) -> ShopError {
    ShopError::Configuration(format!("invalid value for {key}: {raw}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vars(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_defaults() {
        let config = AppConfig::from_map(&vars(&[("JWT_SECRET", "s3cret")])).unwrap();
        assert_eq!(config.host, "127.0.0.1");
        assert_eq!(config.port, 8080);
        assert_eq!(config.database_max_connections, 5);
        assert_eq!(config.session_ttl_hours, 168);
        assert_eq!(config.storage_timeout, DEFAULT_STORAGE_TIMEOUT);
        assert_eq!(config.transition_policy, TransitionPolicy::Monotonic);
        assert_eq!(
            config.cors_origins,
            vec!["http://localhost:5173", "http://localhost:3000"]
        );
        assert!(config.admin.is_none());
        assert!(!config.is_production());
    }

    #[test]
    fn test_jwt_secret_required() {
        let result = AppConfig::from_map(&vars(&[]));
        assert!(matches!(result, Err(ShopError::Configuration(_))));
    }

    #[test]
    fn test_overrides() {
        let config = AppConfig::from_map(&vars(&[
            ("JWT_SECRET", "s3cret"),
            ("PORT", "3000"),
            ("ENVIRONMENT", "production"),
            ("STORAGE_TIMEOUT_MS", "250"),
            ("ORDER_TRANSITION_POLICY", "last-writer-wins"),
            ("CORS_ORIGINS", "https://shop.example.com, "),
            ("ADMIN_EMAIL", "admin@example.com"),
            ("ADMIN_PASSWORD", "hunter22"),
        ]))
        .unwrap();

        assert_eq!(config.port, 3000);
        assert!(config.is_production());
        assert_eq!(config.storage_timeout, Duration::from_millis(250));
        assert_eq!(config.transition_policy, TransitionPolicy::LastWriterWins);
        assert_eq!(config.cors_origins, vec!["https://shop.example.com"]);
        assert_eq!(config.admin.unwrap().name, "Administrator");
    }

    #[test]
    fn test_invalid_values_rejected() {
        let bad_port = AppConfig::from_map(&vars(&[("JWT_SECRET", "s"), ("PORT", "http")]));
        assert!(bad_port.is_err());

        let bad_policy = AppConfig::from_map(&vars(&[
            ("JWT_SECRET", "s"),
            ("ORDER_TRANSITION_POLICY", "first-wins"),
        ]));
        assert!(bad_policy.is_err());
    }

    #[test]
    fn test_socket_addr() {
        let mut config = AppConfig::from_map(&vars(&[("JWT_SECRET", "s")])).unwrap();
        config.host = "0.0.0.0".to_string();
        config.port = 3000;
        assert_eq!(config.socket_addr().unwrap().to_string(), "0.0.0.0:3000");

        config.host = "not a host".to_string();
        assert!(config.socket_addr().is_err());
    }
}
