//! # Entitlements
//!
//! Download gate and the "my purchases" read model.

use crate::blob::BoxedBlobStore;
use crate::error::{ShopError, ShopResult};
use crate::product::ProductId;
use crate::purchase::{DownloadGrant, Purchase};
use crate::store::{with_deadline, BoxedStore, DEFAULT_STORAGE_TIMEOUT};
use crate::user::UserId;
use chrono::Utc;
use std::time::Duration;
use tracing::{info, instrument, warn};

/// Message for every refused download, whatever the internal reason
pub const NOT_ENTITLED_MESSAGE: &str =
    "Product not found or not purchased. Please complete payment first.";

#[derive(Clone)]
pub struct Entitlements {
    store: BoxedStore,
    blobs: BoxedBlobStore,
    storage_timeout: Duration,
}

impl Entitlements {
    pub fn new(store: BoxedStore, blobs: BoxedBlobStore) -> Self {
        Self {
            store,
            blobs,
            storage_timeout: DEFAULT_STORAGE_TIMEOUT,
        }
    }

    pub fn with_storage_timeout(mut self, timeout: Duration) -> Self {
        self.storage_timeout = timeout;
        self
    }

    /// Authorize a download of `product_id` for `user_id`.
    ///
    /// Requires a `paid` order of that user containing the product,
    /// otherwise `Forbidden`. The download record is bumped before the
    /// grant is returned; a failed bump is logged and does not refuse
    /// the download.
    #[instrument(skip(self))]
    pub async fn authorize_download(
        &self,
        user_id: UserId,
        product_id: ProductId,
    ) -> ShopResult<DownloadGrant> {
        let entitlement = with_deadline(
            self.storage_timeout,
            "entitlement lookup",
            self.store.find_paid_entitlement(user_id, product_id),
        )
        .await?
        .ok_or_else(|| ShopError::Forbidden(NOT_ENTITLED_MESSAGE.to_string()))?;

        let download_url = self.blobs.reference(&entitlement.file_key)?;

        let bump = with_deadline(
            self.storage_timeout,
            "download record",
            self.store
                .record_download(user_id, product_id, entitlement.order_id, Utc::now()),
        )
        .await;

        match bump {
            Ok(record) => info!(
                order_id = entitlement.order_id,
                download_count = record.download_count,
                "Download authorized"
            ),
            Err(e) => warn!(
                order_id = entitlement.order_id,
                error = %e,
                "Download authorized but bookkeeping failed"
            ),
        }

        Ok(DownloadGrant {
            download_url,
            title: entitlement.title,
        })
    }

    /// The user's orders with their items and download usage, newest first
    #[instrument(skip(self))]
    pub async fn list_purchases(&self, user_id: UserId) -> ShopResult<Vec<Purchase>> {
        with_deadline(
            self.storage_timeout,
            "purchase listing",
            self.store.list_purchases(user_id),
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blob::UrlBlobStore;
    use crate::memory::InMemoryStore;
    use crate::order::{Cart, NewOrder, OrderStatus};
    use crate::product::{NewProduct, Product};
    use crate::store::Store;
    use std::sync::Arc;

    async fn setup() -> (Arc<InMemoryStore>, Entitlements, Product) {
        let store = Arc::new(InMemoryStore::new());
        let product = store
            .create_product(&NewProduct::new("Rust Course", "rust", 100_000, "courses/rust.zip"))
            .await
            .unwrap();
        let blobs = Arc::new(UrlBlobStore::new(Some(
            "https://files.example.com".to_string(),
        )));
        let entitlements = Entitlements::new(store.clone(), blobs);
        (store, entitlements, product)
    }

    async fn order_with_status(
        store: &InMemoryStore,
        user_id: UserId,
        product: &Product,
        status: OrderStatus,
    ) -> i64 {
        let draft = NewOrder::price(
            user_id,
            &Cart::new().with_item(product.id, 1),
            std::slice::from_ref(product),
        )
        .unwrap();
        let placed = store.insert_order(&draft).await.unwrap();
        if status != OrderStatus::Pending {
            store
                .set_order_status(
                    &placed.order.external_order_id,
                    &[OrderStatus::Pending],
                    status,
                )
                .await
                .unwrap();
        }
        placed.order.id
    }

    #[tokio::test]
    async fn test_unpaid_orders_do_not_entitle() {
        let (store, entitlements, product) = setup().await;
        order_with_status(&store, 1, &product, OrderStatus::Pending).await;
        order_with_status(&store, 1, &product, OrderStatus::Cancelled).await;

        match entitlements.authorize_download(1, product.id).await {
            Err(ShopError::Forbidden(msg)) => assert_eq!(msg, NOT_ENTITLED_MESSAGE),
            other => panic!("expected Forbidden, got {other:?}"),
        }

        // unknown product gets the same answer
        let unknown = entitlements.authorize_download(1, 999).await;
        assert!(matches!(unknown, Err(ShopError::Forbidden(_))));
    }

    #[tokio::test]
    async fn test_paid_order_grants_download() {
        let (store, entitlements, product) = setup().await;
        order_with_status(&store, 1, &product, OrderStatus::Cancelled).await;
        let paid = order_with_status(&store, 1, &product, OrderStatus::Paid).await;
        order_with_status(&store, 1, &product, OrderStatus::Pending).await;

        let grant = entitlements.authorize_download(1, product.id).await.unwrap();
        assert_eq!(grant.download_url, "https://files.example.com/courses/rust.zip");
        assert_eq!(grant.title, "Rust Course");

        let record = store
            .download_record(1, product.id, paid)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(record.download_count, 1);
        assert!(record.last_downloaded_at.is_some());
    }

    #[tokio::test]
    async fn test_other_users_paid_order_does_not_entitle() {
        let (store, entitlements, product) = setup().await;
        order_with_status(&store, 2, &product, OrderStatus::Paid).await;

        let result = entitlements.authorize_download(1, product.id).await;
        assert!(matches!(result, Err(ShopError::Forbidden(_))));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_downloads_are_all_counted() {
        let (store, entitlements, product) = setup().await;
        let paid = order_with_status(&store, 1, &product, OrderStatus::Paid).await;

        let handles: Vec<_> = (0..25)
            .map(|_| {
                let entitlements = entitlements.clone();
                let product_id = product.id;
                tokio::spawn(async move { entitlements.authorize_download(1, product_id).await })
            })
            .collect();
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        let record = store
            .download_record(1, product.id, paid)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(record.download_count, 25);
    }

    #[tokio::test]
    async fn test_list_purchases_reports_usage() {
        let (store, entitlements, product) = setup().await;
        let paid = order_with_status(&store, 1, &product, OrderStatus::Paid).await;
        entitlements.authorize_download(1, product.id).await.unwrap();
        entitlements.authorize_download(1, product.id).await.unwrap();

        let purchases = entitlements.list_purchases(1).await.unwrap();
        assert_eq!(purchases.len(), 1);
        assert_eq!(purchases[0].order.id, paid);
        assert_eq!(purchases[0].products[0].download_count, 2);
        assert_eq!(purchases[0].products[0].paid_price, 100_000);

        assert!(entitlements.list_purchases(2).await.unwrap().is_empty());
    }
}
