//! # In-Memory Store
//!
//! [`Store`] backed by plain vectors behind one `RwLock`. Each method
//! holds the lock for its whole body, so every call is atomic.

use crate::error::{ShopError, ShopResult};
use crate::order::{
    DashboardStats, NewOrder, Order, OrderId, OrderLine, OrderStatus, OrderSummary, PlacedOrder,
    StatusWrite, RECENT_ORDERS_LIMIT,
};
use crate::product::{NewProduct, Product, ProductId, ProductSales};
use crate::purchase::{
    group_purchase_rows, sort_newest_first, DownloadRecord, Entitlement, Purchase,
    PurchaseRow, PurchasedItem, PurchasedProduct,
};
use crate::store::Store;
use crate::user::{normalize_email, NewUser, Role, User, UserId};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use tokio::sync::RwLock;

#[derive(Debug, Default)]
struct Tables {
    products: Vec<Product>,
    users: Vec<User>,
    orders: Vec<Order>,
    lines: Vec<OrderLine>,
    downloads: HashMap<(UserId, ProductId, OrderId), DownloadRecord>,
    next_product_id: i64,
    next_user_id: i64,
    next_order_id: i64,
}

impl Tables {
    fn summarize(&self, order: &Order) -> OrderSummary {
        let customer = self.users.iter().find(|u| u.id == order.user_id);
        let products = self
            .lines
            .iter()
            .filter(|l| l.order_id == order.id)
            .filter_map(|l| self.products.iter().find(|p| p.id == l.product_id))
            .map(|p| p.title.clone())
            .collect();

        OrderSummary {
            order: order.clone(),
            customer_name: customer.map(|u| u.name.clone()).unwrap_or_default(),
            customer_email: customer.map(|u| u.email.clone()).unwrap_or_default(),
            products,
        }
    }

    fn orders_newest_first(&self) -> Vec<&Order> {
        let mut orders: Vec<&Order> = self.orders.iter().collect();
        orders.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        orders
    }

    fn slug_taken(&self, slug: &str, except: Option<ProductId>) -> bool {
        self.products
            .iter()
            .any(|p| p.slug == slug && Some(p.id) != except)
    }
}

/// In-memory [`Store`] for tests and local development
#[derive(Debug, Default)]
pub struct InMemoryStore {
    tables: RwLock<Tables>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Store for InMemoryStore {
    async fn list_products(&self) -> ShopResult<Vec<Product>> {
        let tables = self.tables.read().await;
        let mut products = tables.products.clone();
        products.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        Ok(products)
    }

    async fn product_by_id(&self, id: ProductId) -> ShopResult<Option<Product>> {
        let tables = self.tables.read().await;
        Ok(tables.products.iter().find(|p| p.id == id).cloned())
    }

    async fn product_by_slug(&self, slug: &str) -> ShopResult<Option<Product>> {
        let tables = self.tables.read().await;
        Ok(tables.products.iter().find(|p| p.slug == slug).cloned())
    }

    async fn products_by_ids(&self, ids: &[ProductId]) -> ShopResult<Vec<Product>> {
        let tables = self.tables.read().await;
        Ok(tables
            .products
            .iter()
            .filter(|p| ids.contains(&p.id))
            .cloned()
            .collect())
    }

    async fn create_product(&self, product: &NewProduct) -> ShopResult<Product> {
        let mut tables = self.tables.write().await;
        if tables.slug_taken(&product.slug, None) {
            return Err(ShopError::Conflict(
                "Product with this slug already exists".to_string(),
            ));
        }

        tables.next_product_id += 1;
        let now = Utc::now();
        let created = Product {
            id: tables.next_product_id,
            slug: product.slug.clone(),
            title: product.title.clone(),
            description: product.description.clone(),
            price: product.price,
            preview_image: product.preview_image.clone(),
            detail_image: product.detail_image.clone(),
            file_key: product.file_key.clone(),
            created_at: now,
            updated_at: now,
        };
        tables.products.push(created.clone());
        Ok(created)
    }

    async fn update_product(&self, id: ProductId, product: &NewProduct) -> ShopResult<Product> {
        let mut tables = self.tables.write().await;
        if !tables.products.iter().any(|p| p.id == id) {
            return Err(ShopError::NotFound(format!("Product {id} not found")));
        }
        if tables.slug_taken(&product.slug, Some(id)) {
            return Err(ShopError::Conflict(
                "Product with this slug already exists".to_string(),
            ));
        }

        let existing = tables
            .products
            .iter_mut()
            .find(|p| p.id == id)
            .ok_or_else(|| ShopError::NotFound(format!("Product {id} not found")))?;

        existing.slug = product.slug.clone();
        existing.title = product.title.clone();
        existing.description = product.description.clone();
        existing.price = product.price;
        existing.preview_image = product.preview_image.clone();
        existing.detail_image = product.detail_image.clone();
        existing.file_key = product.file_key.clone();
        existing.updated_at = Utc::now();
        Ok(existing.clone())
    }

    async fn delete_product(&self, id: ProductId) -> ShopResult<Product> {
        let mut tables = self.tables.write().await;
        let index = tables
            .products
            .iter()
            .position(|p| p.id == id)
            .ok_or_else(|| ShopError::NotFound(format!("Product {id} not found")))?;

        if tables.lines.iter().any(|l| l.product_id == id) {
            return Err(ShopError::Conflict(format!(
                "Product {id} has been ordered and cannot be deleted"
            )));
        }

        Ok(tables.products.remove(index))
    }

    async fn product_sales(&self) -> ShopResult<Vec<ProductSales>> {
        let tables = self.tables.read().await;
        let mut sales: Vec<ProductSales> = tables
            .products
            .iter()
            .map(|product| {
                let lines: Vec<&OrderLine> = tables
                    .lines
                    .iter()
                    .filter(|l| l.product_id == product.id)
                    .collect();
                let mut order_ids: Vec<OrderId> = lines.iter().map(|l| l.order_id).collect();
                order_ids.sort_unstable();
                order_ids.dedup();

                ProductSales {
                    product: product.clone(),
                    total_sales: order_ids.len() as i64,
                    total_revenue: lines.iter().map(|l| l.line_total()).sum(),
                }
            })
            .collect();
        sales.sort_by(|a, b| {
            b.product
                .created_at
                .cmp(&a.product.created_at)
                .then(b.product.id.cmp(&a.product.id))
        });
        Ok(sales)
    }

    async fn create_user(&self, user: &NewUser) -> ShopResult<User> {
        let mut tables = self.tables.write().await;
        let email = normalize_email(&user.email);
        if tables.users.iter().any(|u| u.email == email) {
            return Err(ShopError::Conflict("Email already registered".to_string()));
        }

        tables.next_user_id += 1;
        let created = User {
            id: tables.next_user_id,
            name: user.name.clone(),
            email,
            password_hash: user.password_hash.clone(),
            role: user.role,
            created_at: Utc::now(),
        };
        tables.users.push(created.clone());
        Ok(created)
    }

    async fn user_by_email(&self, email: &str) -> ShopResult<Option<User>> {
        let tables = self.tables.read().await;
        let email = normalize_email(email);
        Ok(tables.users.iter().find(|u| u.email == email).cloned())
    }

    async fn user_by_id(&self, id: UserId) -> ShopResult<Option<User>> {
        let tables = self.tables.read().await;
        Ok(tables.users.iter().find(|u| u.id == id).cloned())
    }

    async fn insert_order(&self, order: &NewOrder) -> ShopResult<PlacedOrder> {
        if order.lines.is_empty() {
            return Err(ShopError::InvalidArgument(
                "an order needs at least one line".to_string(),
            ));
        }

        let mut tables = self.tables.write().await;
        if tables
            .orders
            .iter()
            .any(|o| o.external_order_id == order.external_order_id)
        {
            return Err(ShopError::Conflict(format!(
                "external order id {} already used",
                order.external_order_id
            )));
        }

        tables.next_order_id += 1;
        let now = Utc::now();
        let created = Order {
            id: tables.next_order_id,
            external_order_id: order.external_order_id.clone(),
            user_id: order.user_id,
            total_amount: order.total_amount,
            status: OrderStatus::Pending,
            created_at: now,
            updated_at: now,
        };
        let lines: Vec<OrderLine> = order
            .lines
            .iter()
            .map(|line| OrderLine {
                order_id: created.id,
                product_id: line.product_id,
                unit_price: line.unit_price,
                quantity: line.quantity,
            })
            .collect();

        tables.orders.push(created.clone());
        tables.lines.extend(lines.iter().cloned());

        Ok(PlacedOrder {
            order: created,
            lines,
        })
    }

    async fn order_by_external_id(&self, external_order_id: &str) -> ShopResult<Option<Order>> {
        let tables = self.tables.read().await;
        Ok(tables
            .orders
            .iter()
            .find(|o| o.external_order_id == external_order_id)
            .cloned())
    }

    async fn order_lines(&self, order_id: OrderId) -> ShopResult<Vec<OrderLine>> {
        let tables = self.tables.read().await;
        Ok(tables
            .lines
            .iter()
            .filter(|l| l.order_id == order_id)
            .cloned()
            .collect())
    }

    async fn set_order_status(
        &self,
        external_order_id: &str,
        allowed_from: &[OrderStatus],
        to: OrderStatus,
    ) -> ShopResult<StatusWrite> {
        let mut tables = self.tables.write().await;
        let order = tables
            .orders
            .iter_mut()
            .find(|o| o.external_order_id == external_order_id)
            .ok_or_else(|| ShopError::NotFound(format!("Order {external_order_id} not found")))?;

        let previous = order.status;
        if !allowed_from.contains(&previous) {
            return Ok(StatusWrite::Refused { current: previous });
        }

        order.status = to;
        order.updated_at = Utc::now();
        Ok(StatusWrite::Applied { previous })
    }

    async fn list_orders(&self) -> ShopResult<Vec<OrderSummary>> {
        let tables = self.tables.read().await;
        Ok(tables
            .orders_newest_first()
            .into_iter()
            .map(|o| tables.summarize(o))
            .collect())
    }

    async fn dashboard_stats(&self) -> ShopResult<DashboardStats> {
        let tables = self.tables.read().await;
        Ok(DashboardStats {
            total_revenue: tables
                .orders
                .iter()
                .filter(|o| o.status == OrderStatus::Paid)
                .map(|o| o.total_amount)
                .sum(),
            total_orders: tables.orders.len() as i64,
            total_products: tables.products.len() as i64,
            total_customers: tables
                .users
                .iter()
                .filter(|u| u.role == Role::Customer)
                .count() as i64,
            recent_orders: tables
                .orders_newest_first()
                .into_iter()
                .take(RECENT_ORDERS_LIMIT)
                .map(|o| tables.summarize(o))
                .collect(),
        })
    }

    async fn find_paid_entitlement(
        &self,
        user_id: UserId,
        product_id: ProductId,
    ) -> ShopResult<Option<Entitlement>> {
        let tables = self.tables.read().await;
        let Some(product) = tables.products.iter().find(|p| p.id == product_id) else {
            return Ok(None);
        };

        let order = tables
            .orders
            .iter()
            .filter(|o| o.user_id == user_id && o.status == OrderStatus::Paid)
            .filter(|o| {
                tables
                    .lines
                    .iter()
                    .any(|l| l.order_id == o.id && l.product_id == product_id)
            })
            .min_by_key(|o| o.id);

        Ok(order.map(|o| Entitlement {
            order_id: o.id,
            product_id,
            title: product.title.clone(),
            file_key: product.file_key.clone(),
        }))
    }

    async fn record_download(
        &self,
        user_id: UserId,
        product_id: ProductId,
        order_id: OrderId,
        at: DateTime<Utc>,
    ) -> ShopResult<DownloadRecord> {
        let mut tables = self.tables.write().await;
        let record = tables
            .downloads
            .entry((user_id, product_id, order_id))
            .or_insert_with(|| DownloadRecord {
                user_id,
                product_id,
                order_id,
                download_count: 0,
                last_downloaded_at: None,
            });
        record.download_count += 1;
        record.last_downloaded_at = Some(at);
        Ok(record.clone())
    }

    async fn download_record(
        &self,
        user_id: UserId,
        product_id: ProductId,
        order_id: OrderId,
    ) -> ShopResult<Option<DownloadRecord>> {
        let tables = self.tables.read().await;
        Ok(tables
            .downloads
            .get(&(user_id, product_id, order_id))
            .cloned())
    }

    async fn list_purchases(&self, user_id: UserId) -> ShopResult<Vec<Purchase>> {
        let guard = self.tables.read().await;
        let tables: &Tables = &guard;
        let rows = tables
            .orders_newest_first()
            .into_iter()
            .filter(|o| o.user_id == user_id)
            .flat_map(|order| {
                tables
                    .lines
                    .iter()
                    .filter(move |l| l.order_id == order.id)
                    .filter_map(move |line| {
                        let product = tables.products.iter().find(|p| p.id == line.product_id)?;
                        let download = tables.downloads.get(&(user_id, product.id, order.id));
                        Some(PurchaseRow {
                            order: order.clone(),
                            item: PurchasedItem {
                                product: PurchasedProduct {
                                    product_id: product.id,
                                    title: product.title.clone(),
                                    slug: product.slug.clone(),
                                    description: product.description.clone(),
                                    preview_image: product.preview_image.clone(),
                                },
                                paid_price: line.unit_price,
                                quantity: line.quantity,
                                download_count: download.map_or(0, |d| d.download_count),
                                last_downloaded_at: download.and_then(|d| d.last_downloaded_at),
                            },
                        })
                    })
            });

        let mut purchases = group_purchase_rows(rows);
        sort_newest_first(&mut purchases);
        Ok(purchases)
    }
}
