//! # Order Types
//!
//! Orders, order lines and the cart value object that produces them.
//! An order freezes unit prices at checkout time; `total_amount` is the
//! sum of its line totals and never tracks later catalog edits.

use crate::error::{ShopError, ShopResult};
use crate::product::{Product, ProductId};
use crate::user::UserId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use uuid::Uuid;

/// Internal order identifier
pub type OrderId = i64;

/// Maximum length of an order id accepted by the gateway
pub const EXTERNAL_ORDER_ID_MAX_LEN: usize = 50;

/// Lifecycle status of an order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderStatus {
    /// Created, awaiting the gateway's verdict
    #[default]
    Pending,
    /// Payment captured or settled
    Paid,
    /// Cancelled, denied or expired at the gateway
    Cancelled,
}

impl OrderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Pending => "pending",
            OrderStatus::Paid => "paid",
            OrderStatus::Cancelled => "cancelled",
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, OrderStatus::Pending)
    }
}

impl FromStr for OrderStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(OrderStatus::Pending),
            "paid" => Ok(OrderStatus::Paid),
            "cancelled" => Ok(OrderStatus::Cancelled),
            other => Err(format!("unknown order status: {other}")),
        }
    }
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A persisted checkout attempt
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    pub id: OrderId,

    /// Identifier shared with the payment gateway
    pub external_order_id: String,

    pub user_id: UserId,

    /// Sum of the frozen line totals
    pub total_amount: i64,

    pub status: OrderStatus,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// One purchased product within an order
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderLine {
    pub order_id: OrderId,
    pub product_id: ProductId,
    /// Product price copied at checkout time
    pub unit_price: i64,
    pub quantity: u32,
}

impl OrderLine {
    pub fn line_total(&self) -> i64 {
        self.unit_price * i64::from(self.quantity)
    }
}

/// An order together with its lines, as created by checkout
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlacedOrder {
    pub order: Order,
    pub lines: Vec<OrderLine>,
}

/// A cart entry: product and quantity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CartItem {
    #[serde(alias = "productId")]
    pub product_id: ProductId,
    #[serde(default = "default_quantity")]
    pub quantity: u32,
}

fn default_quantity() -> u32 {
    1
}

/// Cart value object handed to checkout
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cart {
    pub items: Vec<CartItem>,
}

impl Cart {
    pub fn new() -> Self {
        Self { items: Vec::new() }
    }

    /// Builder: add a product with quantity
    pub fn with_item(mut self, product_id: ProductId, quantity: u32) -> Self {
        self.items.push(CartItem {
            product_id,
            quantity,
        });
        self
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Total number of units in the cart
    pub fn item_count(&self) -> u32 {
        self.items.iter().map(|i| i.quantity).sum()
    }

    /// Reject empty carts and zero quantities
    pub fn validate(&self) -> ShopResult<()> {
        if self.items.is_empty() {
            return Err(ShopError::InvalidArgument("Items are required".to_string()));
        }
        if let Some(item) = self.items.iter().find(|i| i.quantity == 0) {
            return Err(ShopError::InvalidArgument(format!(
                "quantity must be positive for product {}",
                item.product_id
            )));
        }
        Ok(())
    }
}

/// A priced line not yet persisted
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewOrderLine {
    pub product_id: ProductId,
    /// Denormalized for the gateway manifest
    pub title: String,
    pub unit_price: i64,
    pub quantity: u32,
}

/// A pending order to be inserted atomically with its lines
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewOrder {
    pub external_order_id: String,
    pub user_id: UserId,
    pub total_amount: i64,
    pub lines: Vec<NewOrderLine>,
}

impl NewOrder {
    /// Price a validated cart against resolved products, in cart order.
    ///
    /// `products` must contain every product the cart references.
    pub fn price(user_id: UserId, cart: &Cart, products: &[Product]) -> ShopResult<Self> {
        cart.validate()?;

        let mut lines = Vec::with_capacity(cart.items.len());
        let mut total: i64 = 0;

        for item in &cart.items {
            let product = products
                .iter()
                .find(|p| p.id == item.product_id)
                .ok_or_else(|| ShopError::NotFound(format!("Product {} not found", item.product_id)))?;

            total = product
                .price
                .checked_mul(i64::from(item.quantity))
                .and_then(|subtotal| total.checked_add(subtotal))
                .ok_or_else(|| {
                    ShopError::InvalidArgument("order total out of range".to_string())
                })?;

            lines.push(NewOrderLine {
                product_id: product.id,
                title: product.title.clone(),
                unit_price: product.price,
                quantity: item.quantity,
            });
        }

        Ok(Self {
            external_order_id: generate_external_order_id(user_id),
            user_id,
            total_amount: total,
            lines,
        })
    }
}

/// Generate an unguessable gateway order id: `ORDER-<user>-<24 hex>`
pub fn generate_external_order_id(user_id: UserId) -> String {
    let random = Uuid::new_v4().simple().to_string();
    let id = format!("ORDER-{}-{}", user_id, &random[..24]);
    debug_assert!(id.len() <= EXTERNAL_ORDER_ID_MAX_LEN);
    id
}

/// How a status write treats orders that already reached a terminal state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TransitionPolicy {
    /// Only `pending -> terminal`, or re-setting the same terminal state
    #[default]
    Monotonic,
    /// Any terminal write overwrites the current status
    LastWriterWins,
}

impl TransitionPolicy {
    /// Statuses an order may currently hold for a write of `to` to apply
    pub fn allowed_from(&self, to: OrderStatus) -> Vec<OrderStatus> {
        match self {
            TransitionPolicy::Monotonic => {
                if to == OrderStatus::Pending {
                    vec![OrderStatus::Pending]
                } else {
                    vec![OrderStatus::Pending, to]
                }
            }
            TransitionPolicy::LastWriterWins => vec![
                OrderStatus::Pending,
                OrderStatus::Paid,
                OrderStatus::Cancelled,
            ],
        }
    }
}

impl FromStr for TransitionPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "monotonic" => Ok(TransitionPolicy::Monotonic),
            "last-writer-wins" => Ok(TransitionPolicy::LastWriterWins),
            other => Err(format!("unknown transition policy: {other}")),
        }
    }
}

/// Result of a conditional status write
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusWrite {
    /// The write was applied; `previous` is the status it replaced
    Applied { previous: OrderStatus },
    /// The order's current status is not one the write may replace
    Refused { current: OrderStatus },
}

/// Order row for the back-office listing
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderSummary {
    #[serde(flatten)]
    pub order: Order,
    pub customer_name: String,
    pub customer_email: String,
    /// Titles of the products in the order
    pub products: Vec<String>,
}

/// Back-office dashboard figures
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DashboardStats {
    /// Sum of `paid` order totals
    pub total_revenue: i64,
    pub total_orders: i64,
    pub total_products: i64,
    pub total_customers: i64,
    pub recent_orders: Vec<OrderSummary>,
}

/// Number of orders shown on the dashboard
pub const RECENT_ORDERS_LIMIT: usize = 5;

#[cfg(test)]
mod tests {
    use super::*;

    fn product(id: ProductId, price: i64) -> Product {
        Product {
            id,
            slug: format!("p{id}"),
            title: format!("Product {id}"),
            description: String::new(),
            price,
            preview_image: None,
            detail_image: None,
            file_key: format!("files/{id}.zip"),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_price_cart() {
        let products = vec![product(1, 100_000), product(2, 25_000)];
        let cart = Cart::new().with_item(1, 1).with_item(2, 3);
        assert_eq!(cart.item_count(), 4);

        let order = NewOrder::price(7, &cart, &products).unwrap();

        assert_eq!(order.total_amount, 175_000);
        assert_eq!(order.lines.len(), 2);
        assert_eq!(order.lines[1].unit_price, 25_000);
        assert_eq!(order.lines[1].quantity, 3);
        assert!(order.external_order_id.starts_with("ORDER-7-"));
    }

    #[test]
    fn test_price_unknown_product() {
        let cart = Cart::new().with_item(99, 1);
        let err = NewOrder::price(1, &cart, &[product(1, 10)]).unwrap_err();
        assert!(matches!(err, ShopError::NotFound(_)));
    }

    #[test]
    fn test_cart_validation() {
        assert!(matches!(
            Cart::new().validate(),
            Err(ShopError::InvalidArgument(_))
        ));
        assert!(matches!(
            Cart::new().with_item(1, 0).validate(),
            Err(ShopError::InvalidArgument(_))
        ));
        assert!(Cart::new().with_item(1, 2).validate().is_ok());
    }

    #[test]
    fn test_total_overflow_is_rejected() {
        let cart = Cart::new().with_item(1, u32::MAX);
        let err = NewOrder::price(1, &cart, &[product(1, i64::MAX / 2)]).unwrap_err();
        assert!(matches!(err, ShopError::InvalidArgument(_)));
    }

    #[test]
    fn test_external_ids_are_unique_and_bounded() {
        let a = generate_external_order_id(i64::MAX);
        let b = generate_external_order_id(i64::MAX);
        assert_ne!(a, b);
        assert!(a.len() <= EXTERNAL_ORDER_ID_MAX_LEN);
    }

    #[test]
    fn test_cart_accepts_camel_case_product_id() {
        let cart: Cart =
            serde_json::from_str(r#"{"items":[{"productId":3,"quantity":1},{"product_id":4}]}"#)
                .unwrap();
        assert_eq!(cart.items[0].product_id, 3);
        assert_eq!(cart.items[1].quantity, 1);
    }

    #[test]
    fn test_transition_policy() {
        let monotonic = TransitionPolicy::Monotonic;
        assert_eq!(
            monotonic.allowed_from(OrderStatus::Cancelled),
            vec![OrderStatus::Pending, OrderStatus::Cancelled]
        );
        assert_eq!(
            TransitionPolicy::LastWriterWins
                .allowed_from(OrderStatus::Paid)
                .len(),
            3
        );
        assert_eq!(
            "last-writer-wins".parse::<TransitionPolicy>().unwrap(),
            TransitionPolicy::LastWriterWins
        );
    }

    #[test]
    fn test_status_strings() {
        for status in [OrderStatus::Pending, OrderStatus::Paid, OrderStatus::Cancelled] {
            assert_eq!(status.as_str().parse::<OrderStatus>().unwrap(), status);
        }
        assert!(OrderStatus::Paid.is_terminal());
        assert!(!OrderStatus::Pending.is_terminal());
    }
}
