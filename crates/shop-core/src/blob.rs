//! # Blob Store Port
//!
//! Product files live in an external blob store; the shop only keeps an
//! opaque key per product and hands out references to it.

use crate::error::{ShopError, ShopResult};
use std::sync::Arc;

/// Resolves product file keys into downloadable references
pub trait BlobStore: Send + Sync {
    /// Turn a stored file key into a URL the client can fetch
    fn reference(&self, file_key: &str) -> ShopResult<String>;
}

/// Type alias for a shared blob store
pub type BoxedBlobStore = Arc<dyn BlobStore>;

/// Blob store addressed by URL prefix.
///
/// Keys that already are absolute URLs (e.g. shared-drive links) are
/// returned unchanged; other keys are appended to `base_url`.
#[derive(Debug, Clone, Default)]
pub struct UrlBlobStore {
    base_url: Option<String>,
}

impl UrlBlobStore {
    pub fn new(base_url: Option<String>) -> Self {
        Self {
            base_url: base_url.map(|url| url.trim_end_matches('/').to_string()),
        }
    }
}

impl BlobStore for UrlBlobStore {
    fn reference(&self, file_key: &str) -> ShopResult<String> {
        if file_key.starts_with("https://") || file_key.starts_with("http://") {
            return Ok(file_key.to_string());
        }

        match &self.base_url {
            Some(base) => Ok(format!("{}/{}", base, file_key.trim_start_matches('/'))),
            None => Err(ShopError::Configuration(format!(
                "no FILES_BASE_URL configured for relative file key {file_key}"
            ))),
        }
    }
}
