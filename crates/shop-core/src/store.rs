//! # Store Port
//!
//! Persistence trait for products, users, orders and download records.
//! Implementations: [`crate::memory::InMemoryStore`] (tests, local runs)
//! and the SQLite store in `shop-sqlite`.
//!
//! Every method is one atomic unit of work. In particular
//! `insert_order` makes an order visible together with all its lines,
//! `set_order_status` is a conditional update of a single order, and
//! `record_download` is an atomic upsert per `(user, product, order)`.

use crate::error::{ShopError, ShopResult};
use crate::order::{
    DashboardStats, NewOrder, Order, OrderId, OrderLine, OrderStatus, OrderSummary, PlacedOrder,
    StatusWrite,
};
use crate::product::{NewProduct, Product, ProductId, ProductSales};
use crate::purchase::{DownloadRecord, Entitlement, Purchase};
use crate::user::{NewUser, User, UserId};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

/// Default deadline for a single storage call
pub const DEFAULT_STORAGE_TIMEOUT: Duration = Duration::from_secs(5);

#[async_trait]
pub trait Store: Send + Sync {
    // -- catalog ------------------------------------------------------------

    /// All products, newest first
    async fn list_products(&self) -> ShopResult<Vec<Product>>;

    async fn product_by_id(&self, id: ProductId) -> ShopResult<Option<Product>>;

    async fn product_by_slug(&self, slug: &str) -> ShopResult<Option<Product>>;

    /// Products matching `ids`; unknown ids are simply absent
    async fn products_by_ids(&self, ids: &[ProductId]) -> ShopResult<Vec<Product>>;

    /// Fails with `Conflict` if the slug is taken
    async fn create_product(&self, product: &NewProduct) -> ShopResult<Product>;

    /// Fails with `NotFound` if absent, `Conflict` if the new slug is taken
    async fn update_product(&self, id: ProductId, product: &NewProduct) -> ShopResult<Product>;

    /// Fails with `NotFound` if absent, `Conflict` if any order line references it
    async fn delete_product(&self, id: ProductId) -> ShopResult<Product>;

    /// Products with sales figures, newest first
    async fn product_sales(&self) -> ShopResult<Vec<ProductSales>>;

    // -- users --------------------------------------------------------------

    /// Fails with `Conflict` if the email is taken
    async fn create_user(&self, user: &NewUser) -> ShopResult<User>;

    async fn user_by_email(&self, email: &str) -> ShopResult<Option<User>>;

    async fn user_by_id(&self, id: UserId) -> ShopResult<Option<User>>;

    // -- orders -------------------------------------------------------------

    /// Insert a `pending` order and its lines as one unit
    async fn insert_order(&self, order: &NewOrder) -> ShopResult<PlacedOrder>;

    async fn order_by_external_id(&self, external_order_id: &str) -> ShopResult<Option<Order>>;

    async fn order_lines(&self, order_id: OrderId) -> ShopResult<Vec<OrderLine>>;

    /// Set the status of one order if its current status is in `allowed_from`.
    ///
    /// Fails with `NotFound` if no order has that external id.
    async fn set_order_status(
        &self,
        external_order_id: &str,
        allowed_from: &[OrderStatus],
        to: OrderStatus,
    ) -> ShopResult<StatusWrite>;

    /// All orders with customer and product titles, newest first
    async fn list_orders(&self) -> ShopResult<Vec<OrderSummary>>;

    async fn dashboard_stats(&self) -> ShopResult<DashboardStats>;

    // -- entitlements -------------------------------------------------------

    /// The user's oldest `paid` order containing the product
    async fn find_paid_entitlement(
        &self,
        user_id: UserId,
        product_id: ProductId,
    ) -> ShopResult<Option<Entitlement>>;

    /// Create the record with count 1, or increment it; `at` becomes `last_downloaded_at`
    async fn record_download(
        &self,
        user_id: UserId,
        product_id: ProductId,
        order_id: OrderId,
        at: DateTime<Utc>,
    ) -> ShopResult<DownloadRecord>;

    async fn download_record(
        &self,
        user_id: UserId,
        product_id: ProductId,
        order_id: OrderId,
    ) -> ShopResult<Option<DownloadRecord>>;

    /// The user's orders with lines, products and download usage, newest first
    async fn list_purchases(&self, user_id: UserId) -> ShopResult<Vec<Purchase>>;
}

/// Type alias for a shared store (dynamic dispatch)
pub type BoxedStore = Arc<dyn Store>;

/// Run a storage call under a deadline, failing with `StorageUnavailable`
pub async fn with_deadline<T, F>(deadline: Duration, operation: &str, call: F) -> ShopResult<T>
where
    F: Future<Output = ShopResult<T>>,
{
    match tokio::time::timeout(deadline, call).await {
        Ok(result) => result,
        Err(_) => Err(ShopError::StorageUnavailable(format!(
            "{operation} timed out after {}ms",
            deadline.as_millis()
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_deadline_expires() {
        let slow = async {
            tokio::time::sleep(Duration::from_secs(10)).await;
            Ok::<_, ShopError>(())
        };
        let result = with_deadline(Duration::from_secs(1), "slow call", slow).await;
        assert!(matches!(result, Err(ShopError::StorageUnavailable(_))));
    }

    #[tokio::test]
    async fn test_deadline_passes_result_through() {
        let result = with_deadline(Duration::from_secs(1), "fast call", async { Ok(7) }).await;
        assert_eq!(result.unwrap(), 7);
    }
}
