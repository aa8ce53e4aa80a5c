//! # shop-core
//!
//! Order, payment and entitlement lifecycle for the digital-goods shop.
//!
//! This crate provides:
//! - `Ledger` / `Checkout` for creating pending orders at frozen prices
//! - `Reconciler` for applying signed gateway callbacks to orders
//! - `Entitlements` for the download gate and the purchase listing
//! - `Store`, `PaymentGateway` and `BlobStore` ports, with an in-memory store
//! - `ShopError` for typed error handling
//!
//! ## Example
//!
//! ```rust,ignore
//! use shop_core::{Cart, Checkout, Entitlements, Ledger, Reconciler};
//!
//! let checkout = Checkout::new(Ledger::new(store.clone()), gateway.clone());
//! let receipt = checkout.checkout(user.id, &Cart::new().with_item(7, 1), customer).await?;
//!
//! // later, from the gateway's webhook
//! reconciler.apply_gateway_status(&notification).await?;
//!
//! let grant = entitlements.authorize_download(user.id, 7).await?;
//! // redirect the browser to grant.download_url
//! ```

pub mod blob;
pub mod entitlement;
pub mod error;
pub mod gateway;
pub mod ledger;
pub mod memory;
pub mod order;
pub mod product;
pub mod purchase;
pub mod reconcile;
pub mod store;
pub mod user;

// Re-exports for convenience
pub use blob::{BlobStore, BoxedBlobStore, UrlBlobStore};
pub use entitlement::{Entitlements, NOT_ENTITLED_MESSAGE};
pub use error::{ShopError, ShopResult};
pub use gateway::{
    parse_gross_amount, BoxedPaymentGateway, CustomerDetails, FraudStatus, GatewayNotification,
    PaymentGateway, TransactionItem, TransactionRequest, TransactionStatus, TransactionToken,
};
pub use ledger::{Checkout, CheckoutReceipt, Ledger};
pub use memory::InMemoryStore;
pub use order::{
    generate_external_order_id, Cart, CartItem, DashboardStats, NewOrder, NewOrderLine, Order,
    OrderId, OrderLine, OrderStatus, OrderSummary, PlacedOrder, StatusWrite, TransitionPolicy,
    EXTERNAL_ORDER_ID_MAX_LEN, RECENT_ORDERS_LIMIT,
};
pub use product::{NewProduct, Product, ProductCatalog, ProductId, ProductSales};
pub use purchase::{
    group_purchase_rows, sort_newest_first, DownloadGrant, DownloadRecord, Entitlement, Purchase,
    PurchaseRow, PurchasedItem, PurchasedProduct,
};
pub use reconcile::{ReconcileOutcome, Reconciler};
pub use store::{with_deadline, BoxedStore, Store, DEFAULT_STORAGE_TIMEOUT};
pub use user::{normalize_email, NewUser, Role, User, UserId};
