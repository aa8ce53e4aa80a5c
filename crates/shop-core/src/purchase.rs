//! # Purchase and Download Types
//!
//! Read-model types for "my purchases" and the download bookkeeping row.

use crate::order::{Order, OrderId};
use crate::product::ProductId;
use crate::user::UserId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Download usage for one `(user, product, order)` key
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DownloadRecord {
    pub user_id: UserId,
    pub product_id: ProductId,
    pub order_id: OrderId,
    pub download_count: i64,
    pub last_downloaded_at: Option<DateTime<Utc>>,
}

/// A paid order line granting access to a product
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entitlement {
    pub order_id: OrderId,
    pub product_id: ProductId,
    pub title: String,
    pub file_key: String,
}

/// Successful download authorization
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DownloadGrant {
    /// Blob-store reference (URL), never the bytes
    pub download_url: String,
    pub title: String,
}

/// Product fields shown in the purchase listing
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PurchasedProduct {
    pub product_id: ProductId,
    pub title: String,
    pub slug: String,
    pub description: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub preview_image: Option<String>,
}

/// One line of a purchase with its download usage
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PurchasedItem {
    #[serde(flatten)]
    pub product: PurchasedProduct,
    /// Unit price frozen at purchase time
    pub paid_price: i64,
    pub quantity: u32,
    pub download_count: i64,
    pub last_downloaded_at: Option<DateTime<Utc>>,
}

/// An order with its purchased items
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Purchase {
    #[serde(flatten)]
    pub order: Order,
    pub products: Vec<PurchasedItem>,
}

/// Flat join row: order x line x product x optional download record
#[derive(Debug, Clone)]
pub struct PurchaseRow {
    pub order: Order,
    pub item: PurchasedItem,
}

/// Group join rows by order, keeping row order.
///
/// Rows for the same order need not be adjacent; orders appear in the
/// position of their first row.
pub fn group_purchase_rows(rows: impl IntoIterator<Item = PurchaseRow>) -> Vec<Purchase> {
    let mut purchases: Vec<Purchase> = Vec::new();

    for row in rows {
        match purchases.iter_mut().find(|p| p.order.id == row.order.id) {
            Some(purchase) => purchase.products.push(row.item),
            None => purchases.push(Purchase {
                order: row.order,
                products: vec![row.item],
            }),
        }
    }

    purchases
}

/// Sort purchases newest first, ties broken by the higher order id
pub fn sort_newest_first(purchases: &mut [Purchase]) {
    purchases.sort_by(|a, b| {
        b.order
            .created_at
            .cmp(&a.order.created_at)
            .then(b.order.id.cmp(&a.order.id))
    });
}
