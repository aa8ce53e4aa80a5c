//! # Application State
//!
//! Shared state for the Axum application: the store, the payment gateway
//! and the three lifecycle services built on top of them.

use crate::auth::{hash_password, SessionKeys};
use crate::config::{AdminSeed, AppConfig};
use shop_core::{
    normalize_email, with_deadline, BoxedBlobStore, BoxedPaymentGateway, BoxedStore, Checkout,
    Entitlements, Ledger, NewUser, ProductCatalog, Reconciler, Role, ShopResult, UrlBlobStore,
};
use shop_midtrans::MidtransSnapGateway;
use shop_sqlite::SqliteStore;
use std::future::Future;
use std::sync::Arc;
use tracing::{info, warn};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    /// Application config
    pub config: AppConfig,
    pub store: BoxedStore,
    pub gateway: BoxedPaymentGateway,
    pub checkout: Checkout,
    pub reconciler: Reconciler,
    pub entitlements: Entitlements,
    pub sessions: SessionKeys,
}

impl AppState {
    /// Wire the services over the given adapters
    pub fn new(
        config: AppConfig,
        store: BoxedStore,
        gateway: BoxedPaymentGateway,
        blobs: BoxedBlobStore,
    ) -> Self {
        let timeout = config.storage_timeout;

        let ledger = Ledger::new(store.clone()).with_storage_timeout(timeout);
        let checkout = Checkout::new(ledger, gateway.clone());
        let reconciler = Reconciler::new(store.clone(), gateway.clone())
            .with_policy(config.transition_policy)
            .with_storage_timeout(timeout);
        let entitlements = Entitlements::new(store.clone(), blobs).with_storage_timeout(timeout);
        let sessions = SessionKeys::new(&config.jwt_secret, config.session_ttl_hours);

        Self {
            config,
            store,
            gateway,
            checkout,
            reconciler,
            entitlements,
            sessions,
        }
    }

    /// Build the production state: SQLite store, Midtrans Snap, URL blob store
    pub async fn from_env() -> anyhow::Result<Self> {
        let config = AppConfig::from_env()?;

        let store = SqliteStore::connect(&config.database_url, config.database_max_connections)
            .await
            .map_err(|e| anyhow::anyhow!("Failed to open database: {}", e))?;
        let store: BoxedStore = Arc::new(store);

        let gateway = MidtransSnapGateway::from_env()
            .map_err(|e| anyhow::anyhow!("Failed to initialize Midtrans: {}", e))?;
        if gateway.config().is_sandbox_key() {
            if config.is_production() {
                warn!("Midtrans sandbox key in a production environment");
            } else {
                info!("Midtrans sandbox mode");
            }
        }

        let blobs: BoxedBlobStore = Arc::new(UrlBlobStore::new(config.files_base_url.clone()));

        let state = Self::new(config, store, Arc::new(gateway), blobs);

        seed_catalog(&state.store, &load_product_catalog()?).await?;
        if let Some(admin) = &state.config.admin {
            seed_admin(&state.store, admin).await?;
        }

        Ok(state)
    }

    /// Run a storage call under the configured deadline
    pub async fn storage<T, F>(&self, operation: &str, call: F) -> ShopResult<T>
    where
        F: Future<Output = ShopResult<T>>,
    {
        with_deadline(self.config.storage_timeout, operation, call).await
    }
}

/// Load product catalog seed from config file
pub fn load_product_catalog() -> anyhow::Result<ProductCatalog> {
    let config_paths = [
        "config/products.toml",
        "../config/products.toml",
        "../../config/products.toml",
    ];

    for path in config_paths {
        if let Ok(content) = std::fs::read_to_string(path) {
            let catalog = ProductCatalog::from_toml(&content)
                .map_err(|e| anyhow::anyhow!("Failed to parse {}: {}", path, e))?;
            info!("Loaded {} products from {}", catalog.len(), path);
            return Ok(catalog);
        }
    }

    warn!("No product catalog found, skipping catalog seed");
    Ok(ProductCatalog::default())
}

/// Insert the seed catalog, but only into an empty product table.
///
/// Returns the number of products created.
pub async fn seed_catalog(store: &BoxedStore, catalog: &ProductCatalog) -> ShopResult<usize> {
    if catalog.is_empty() || !store.list_products().await?.is_empty() {
        return Ok(0);
    }

    for product in &catalog.products {
        product.validate()?;
        store.create_product(product).await?;
    }

    info!("Seeded {} products", catalog.len());
    Ok(catalog.len())
}

/// Create the admin account unless the email is already registered
pub async fn seed_admin(store: &BoxedStore, seed: &AdminSeed) -> ShopResult<bool> {
    let email = normalize_email(&seed.email);
    if store.user_by_email(&email).await?.is_some() {
        return Ok(false);
    }

    store
        .create_user(&NewUser {
            name: seed.name.clone(),
            email: email.clone(),
            password_hash: hash_password(&seed.password)?,
            role: Role::Admin,
        })
        .await?;

    info!("Seeded admin account {}", email);
    Ok(true)
}
