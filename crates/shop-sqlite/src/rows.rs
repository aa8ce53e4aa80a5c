//! Row structs as read from SQLite, and their conversion into domain types.

use chrono::{DateTime, Utc};
use shop_core::{
    DownloadRecord, Entitlement, Order, OrderLine, OrderStatus, Product, PurchaseRow,
    PurchasedItem, PurchasedProduct, Role, ShopError, ShopResult, User,
};
use sqlx::FromRow;

pub(crate) const PRODUCT_COLUMNS: &str = "id, slug, title, description, price, preview_image, \
     detail_image, file_key, created_at, updated_at";

pub(crate) const USER_COLUMNS: &str = "id, name, email, password_hash, role, created_at";

pub(crate) const ORDER_COLUMNS: &str =
    "id, external_order_id, user_id, total_amount, status, created_at, updated_at";

pub(crate) fn parse_status(raw: &str) -> ShopResult<OrderStatus> {
    raw.parse().map_err(ShopError::Internal)
}

fn parse_quantity(raw: i64) -> ShopResult<u32> {
    u32::try_from(raw).map_err(|_| ShopError::Internal(format!("invalid quantity {raw}")))
}

#[derive(Debug, FromRow)]
pub(crate) struct ProductRow {
    id: i64,
    slug: String,
    title: String,
    description: String,
    price: i64,
    preview_image: Option<String>,
    detail_image: Option<String>,
    file_key: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<ProductRow> for Product {
    fn from(row: ProductRow) -> Self {
        Product {
            id: row.id,
            slug: row.slug,
            title: row.title,
            description: row.description,
            price: row.price,
            preview_image: row.preview_image,
            detail_image: row.detail_image,
            file_key: row.file_key,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

#[derive(Debug, FromRow)]
pub(crate) struct ProductSalesRow {
    #[sqlx(flatten)]
    pub product: ProductRow,
    pub total_sales: i64,
    pub total_revenue: i64,
}

#[derive(Debug, FromRow)]
pub(crate) struct UserRow {
    id: i64,
    name: String,
    email: String,
    password_hash: String,
    role: String,
    created_at: DateTime<Utc>,
}

impl TryFrom<UserRow> for User {
    type Error = ShopError;

    fn try_from(row: UserRow) -> ShopResult<Self> {
        Ok(User {
            id: row.id,
            name: row.name,
            email: row.email,
            password_hash: row.password_hash,
            role: row.role.parse::<Role>().map_err(ShopError::Internal)?,
            created_at: row.created_at,
        })
    }
}

#[derive(Debug, FromRow)]
pub(crate) struct OrderRow {
    id: i64,
    external_order_id: String,
    user_id: i64,
    total_amount: i64,
    status: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<OrderRow> for Order {
    type Error = ShopError;

    fn try_from(row: OrderRow) -> ShopResult<Self> {
        Ok(Order {
            id: row.id,
            external_order_id: row.external_order_id,
            user_id: row.user_id,
            total_amount: row.total_amount,
            status: parse_status(&row.status)?,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

/// Order joined with its customer
#[derive(Debug, FromRow)]
pub(crate) struct OrderCustomerRow {
    #[sqlx(flatten)]
    pub order: OrderRow,
    pub customer_name: Option<String>,
    pub customer_email: Option<String>,
}

#[derive(Debug, FromRow)]
pub(crate) struct OrderLineRow {
    order_id: i64,
    product_id: i64,
    price: i64,
    quantity: i64,
}

impl TryFrom<OrderLineRow> for OrderLine {
    type Error = ShopError;

    fn try_from(row: OrderLineRow) -> ShopResult<Self> {
        Ok(OrderLine {
            order_id: row.order_id,
            product_id: row.product_id,
            unit_price: row.price,
            quantity: parse_quantity(row.quantity)?,
        })
    }
}

#[derive(Debug, FromRow)]
pub(crate) struct EntitlementRow {
    order_id: i64,
    product_id: i64,
    title: String,
    file_key: String,
}

impl From<EntitlementRow> for Entitlement {
    fn from(row: EntitlementRow) -> Self {
        Entitlement {
            order_id: row.order_id,
            product_id: row.product_id,
            title: row.title,
            file_key: row.file_key,
        }
    }
}

#[derive(Debug, FromRow)]
pub(crate) struct DownloadRow {
    user_id: i64,
    product_id: i64,
    order_id: i64,
    download_count: i64,
    last_downloaded_at: Option<DateTime<Utc>>,
}

impl From<DownloadRow> for DownloadRecord {
    fn from(row: DownloadRow) -> Self {
        DownloadRecord {
            user_id: row.user_id,
            product_id: row.product_id,
            order_id: row.order_id,
            download_count: row.download_count,
            last_downloaded_at: row.last_downloaded_at,
        }
    }
}

/// order x order_items x products, left-joined with downloads
#[derive(Debug, FromRow)]
pub(crate) struct PurchaseJoinRow {
    #[sqlx(flatten)]
    order: OrderRow,
    product_id: i64,
    title: String,
    slug: String,
    description: String,
    preview_image: Option<String>,
    paid_price: i64,
    quantity: i64,
    download_count: Option<i64>,
    last_downloaded_at: Option<DateTime<Utc>>,
}

impl TryFrom<PurchaseJoinRow> for PurchaseRow {
    type Error = ShopError;

    fn try_from(row: PurchaseJoinRow) -> ShopResult<Self> {
        Ok(PurchaseRow {
            order: row.order.try_into()?,
            item: PurchasedItem {
                product: PurchasedProduct {
                    product_id: row.product_id,
                    title: row.title,
                    slug: row.slug,
                    description: row.description,
                    preview_image: row.preview_image,
                },
                paid_price: row.paid_price,
                quantity: parse_quantity(row.quantity)?,
                download_count: row.download_count.unwrap_or(0),
                last_downloaded_at: row.last_downloaded_at,
            },
        })
    }
}
