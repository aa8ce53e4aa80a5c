//! # Ledger
//!
//! Creates pending orders at frozen prices, and sequences checkout:
//! the order is persisted before the gateway hears about it.

use crate::error::ShopResult;
use crate::gateway::{
    BoxedPaymentGateway, CustomerDetails, TransactionItem, TransactionRequest, TransactionToken,
};
use crate::order::{Cart, NewOrder, NewOrderLine, PlacedOrder};
use crate::product::ProductId;
use crate::store::{with_deadline, BoxedStore, DEFAULT_STORAGE_TIMEOUT};
use crate::user::UserId;
use serde::Serialize;
use std::time::Duration;
use tracing::{info, instrument, warn};

/// Owns order creation
#[derive(Clone)]
pub struct Ledger {
    store: BoxedStore,
    storage_timeout: Duration,
}

impl Ledger {
    pub fn new(store: BoxedStore) -> Self {
        Self {
            store,
            storage_timeout: DEFAULT_STORAGE_TIMEOUT,
        }
    }

    /// Builder: set the per-call storage deadline
    pub fn with_storage_timeout(mut self, timeout: Duration) -> Self {
        self.storage_timeout = timeout;
        self
    }

    /// Create a `pending` order for the cart at current catalog prices.
    ///
    /// Validation happens before any write: an empty cart or zero quantity
    /// is `InvalidArgument`, an unknown product is `NotFound`.
    #[instrument(skip(self, cart), fields(items = cart.items.len()))]
    pub async fn create_order(&self, user_id: UserId, cart: &Cart) -> ShopResult<PlacedOrder> {
        self.place(user_id, cart).await.map(|(placed, _)| placed)
    }

    /// Price and persist the cart; also returns the priced draft lines
    async fn place(
        &self,
        user_id: UserId,
        cart: &Cart,
    ) -> ShopResult<(PlacedOrder, Vec<NewOrderLine>)> {
        cart.validate()?;

        let mut ids: Vec<ProductId> = cart.items.iter().map(|i| i.product_id).collect();
        ids.sort_unstable();
        ids.dedup();

        let products = with_deadline(
            self.storage_timeout,
            "product lookup",
            self.store.products_by_ids(&ids),
        )
        .await?;

        let draft = NewOrder::price(user_id, cart, &products)?;

        let placed = with_deadline(
            self.storage_timeout,
            "order insert",
            self.store.insert_order(&draft),
        )
        .await?;

        info!(
            order_id = placed.order.id,
            external_order_id = %placed.order.external_order_id,
            total = placed.order.total_amount,
            units = cart.item_count(),
            "Created pending order"
        );

        Ok((placed, draft.lines))
    }
}

/// What the client needs to continue payment
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CheckoutReceipt {
    pub token: String,
    pub redirect_url: String,
    /// External order id
    pub order_id: String,
    pub total_amount: i64,
}

/// Ledger plus gateway: create the order, then register it with the gateway
#[derive(Clone)]
pub struct Checkout {
    ledger: Ledger,
    gateway: BoxedPaymentGateway,
}

impl Checkout {
    pub fn new(ledger: Ledger, gateway: BoxedPaymentGateway) -> Self {
        Self { ledger, gateway }
    }

    /// Place the order and obtain a payment token.
    ///
    /// If the gateway call fails the order stays `pending` and the gateway
    /// error is returned.
    #[instrument(skip(self, cart, customer), fields(provider = self.gateway.provider_name()))]
    pub async fn checkout(
        &self,
        user_id: UserId,
        cart: &Cart,
        customer: CustomerDetails,
    ) -> ShopResult<CheckoutReceipt> {
        let (placed, lines) = self.ledger.place(user_id, cart).await?;

        let request = TransactionRequest {
            order_id: placed.order.external_order_id.clone(),
            gross_amount: placed.order.total_amount,
            items: lines
                .into_iter()
                .map(|line| TransactionItem {
                    id: line.product_id,
                    price: line.unit_price,
                    quantity: line.quantity,
                    name: line.title,
                })
                .collect(),
            customer,
        };

        let TransactionToken {
            token,
            redirect_url,
        } = self
            .gateway
            .create_transaction(&request)
            .await
            .map_err(|e| {
                warn!(
                    external_order_id = %request.order_id,
                    error = %e,
                    retryable = e.is_retryable(),
                    "Gateway transaction failed; order left pending"
                );
                e
            })?;

        Ok(CheckoutReceipt {
            token,
            redirect_url,
            order_id: placed.order.external_order_id,
            total_amount: placed.order.total_amount,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ShopError;
    use crate::gateway::{GatewayNotification, PaymentGateway};
    use crate::memory::InMemoryStore;
    use crate::order::OrderStatus;
    use crate::product::NewProduct;
    use crate::store::Store;
    use async_trait::async_trait;
    use std::sync::{Arc, Mutex};

    #[derive(Default)]
    struct RecordingGateway {
        requests: Mutex<Vec<TransactionRequest>>,
        fail: bool,
    }

    #[async_trait]
    impl PaymentGateway for RecordingGateway {
        async fn create_transaction(
            &self,
            request: &TransactionRequest,
        ) -> ShopResult<TransactionToken> {
            self.requests.lock().unwrap().push(request.clone());
            if self.fail {
                return Err(ShopError::GatewayUnavailable("connection reset".into()));
            }
            Ok(TransactionToken {
                token: "snap-token".into(),
                redirect_url: format!("https://pay.example.com/{}", request.order_id),
            })
        }

        fn verify_notification(&self, _notification: &GatewayNotification) -> ShopResult<()> {
            Ok(())
        }

        fn provider_name(&self) -> &'static str {
            "recording"
        }
    }

    fn customer() -> CustomerDetails {
        CustomerDetails {
            first_name: "Ayu".into(),
            email: "ayu@example.com".into(),
            phone: None,
        }
    }

    async fn store_with_products() -> (Arc<InMemoryStore>, i64, i64) {
        let store = Arc::new(InMemoryStore::new());
        let a = store
            .create_product(&NewProduct::new("Rust Course", "rust", 100_000, "rust.zip"))
            .await
            .unwrap();
        let b = store
            .create_product(&NewProduct::new("UI Kit", "ui-kit", 40_000, "ui.zip"))
            .await
            .unwrap();
        (store, a.id, b.id)
    }

    #[tokio::test]
    async fn test_create_order_freezes_prices() {
        let (store, a, b) = store_with_products().await;
        let ledger = Ledger::new(store.clone());

        let placed = ledger
            .create_order(9, &Cart::new().with_item(a, 1).with_item(b, 2))
            .await
            .unwrap();
        assert_eq!(placed.order.status, OrderStatus::Pending);
        assert_eq!(placed.order.total_amount, 180_000);

        store
            .update_product(a, &NewProduct::new("Rust Course", "rust", 1, "rust.zip"))
            .await
            .unwrap();

        let order = store
            .order_by_external_id(&placed.order.external_order_id)
            .await
            .unwrap()
            .unwrap();
        let lines = store.order_lines(order.id).await.unwrap();
        assert_eq!(order.total_amount, 180_000);
        assert_eq!(lines[0].unit_price, 100_000);
        assert_eq!(lines.iter().map(|l| l.line_total()).sum::<i64>(), 180_000);
    }

    #[tokio::test]
    async fn test_invalid_cart_writes_nothing() {
        let (store, a, _) = store_with_products().await;
        let ledger = Ledger::new(store.clone());

        let empty = ledger.create_order(1, &Cart::new()).await;
        assert!(matches!(empty, Err(ShopError::InvalidArgument(_))));

        let unknown = ledger
            .create_order(1, &Cart::new().with_item(a, 1).with_item(404, 1))
            .await;
        assert!(matches!(unknown, Err(ShopError::NotFound(_))));

        assert!(store.list_orders().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_checkout_sends_order_to_gateway() {
        let (store, a, _) = store_with_products().await;
        let gateway = Arc::new(RecordingGateway::default());
        let checkout = Checkout::new(Ledger::new(store.clone()), gateway.clone());

        let receipt = checkout
            .checkout(3, &Cart::new().with_item(a, 1), customer())
            .await
            .unwrap();

        let requests = gateway.requests.lock().unwrap();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].order_id, receipt.order_id);
        assert_eq!(requests[0].gross_amount, 100_000);
        assert_eq!(requests[0].items[0].name, "Rust Course");

        let order = store
            .order_by_external_id(&receipt.order_id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(order.status, OrderStatus::Pending);
        assert_eq!(receipt.token, "snap-token");
    }

    #[tokio::test]
    async fn test_gateway_failure_leaves_order_pending() {
        let (store, a, _) = store_with_products().await;
        let gateway = Arc::new(RecordingGateway {
            fail: true,
            ..Default::default()
        });
        let checkout = Checkout::new(Ledger::new(store.clone()), gateway);

        let result = checkout
            .checkout(3, &Cart::new().with_item(a, 1), customer())
            .await;
        assert!(matches!(result, Err(ShopError::GatewayUnavailable(_))));

        let orders = store.list_orders().await.unwrap();
        assert_eq!(orders.len(), 1);
        assert_eq!(orders[0].order.status, OrderStatus::Pending);
    }
}
