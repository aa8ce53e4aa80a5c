//! # SQLite Store
//!
//! [`Store`] on a sqlx SQLite pool. Multi-row writes run in a transaction;
//! status writes are a compare-and-set on the order row; download
//! bookkeeping is a single upsert.

use crate::rows::{
    parse_status, DownloadRow, EntitlementRow, OrderCustomerRow, OrderLineRow, OrderRow,
    ProductRow, ProductSalesRow, PurchaseJoinRow, UserRow, ORDER_COLUMNS, PRODUCT_COLUMNS,
    USER_COLUMNS,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use shop_core::{
    group_purchase_rows, normalize_email, DashboardStats, DownloadRecord, Entitlement, NewOrder,
    NewProduct, NewUser, Order, OrderId, OrderLine, OrderStatus, OrderSummary, PlacedOrder,
    Product, ProductId, ProductSales, Purchase, PurchaseRow, Role, ShopError, ShopResult,
    StatusWrite, Store, User, UserId, RECENT_ORDERS_LIMIT,
};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use sqlx::{QueryBuilder, Sqlite};
use std::collections::HashMap;
use std::str::FromStr;
use std::time::Duration;
use tracing::{debug, info};

const SCHEMA: &str = include_str!("schema.sql");

/// Compare-and-set attempts before a status write gives up
const STATUS_WRITE_ATTEMPTS: usize = 5;

pub(crate) fn storage_error(e: sqlx::Error) -> ShopError {
    match e {
        sqlx::Error::PoolTimedOut => {
            ShopError::StorageUnavailable("database pool timed out".to_string())
        }
        other => ShopError::StorageUnavailable(other.to_string()),
    }
}

fn is_unique_violation(e: &sqlx::Error) -> bool {
    e.as_database_error()
        .is_some_and(|db| db.is_unique_violation())
}

/// Map unique violations to `Conflict(message)`, everything else to `StorageUnavailable`
fn conflict_or_storage(e: sqlx::Error, message: &str) -> ShopError {
    if is_unique_violation(&e) {
        ShopError::Conflict(message.to_string())
    } else {
        storage_error(e)
    }
}

#[derive(Debug, Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Open (creating if needed) the database at `url` and apply the schema
    pub async fn connect(url: &str, max_connections: u32) -> ShopResult<Self> {
        let options = SqliteConnectOptions::from_str(url)
            .map_err(|e| ShopError::Configuration(format!("invalid DATABASE_URL: {e}")))?
            .create_if_missing(true)
            .foreign_keys(true)
            .busy_timeout(Duration::from_secs(5));

        // An in-memory database lives only as long as its connection.
        let in_memory = url.contains(":memory:");
        let pool = SqlitePoolOptions::new()
            .max_connections(if in_memory { 1 } else { max_connections })
            .min_connections(if in_memory { 1 } else { 0 })
            .idle_timeout(if in_memory { None } else { Some(Duration::from_secs(600)) })
            .max_lifetime(if in_memory { None } else { Some(Duration::from_secs(1800)) })
            .connect_with(options)
            .await
            .map_err(storage_error)?;

        let store = Self::from_pool(pool);
        store.migrate().await?;
        info!(url, "SQLite store ready");
        Ok(store)
    }

    pub fn from_pool(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Create missing tables and indexes
    pub async fn migrate(&self) -> ShopResult<()> {
        sqlx::raw_sql(SCHEMA)
            .execute(&self.pool)
            .await
            .map_err(storage_error)?;
        debug!("Schema applied");
        Ok(())
    }

    async fn order_summaries(&self, limit: Option<usize>) -> ShopResult<Vec<OrderSummary>> {
        let limit = limit.map_or(-1, |n| n as i64);
        let rows: Vec<OrderCustomerRow> = sqlx::query_as(
            "SELECT o.id, o.external_order_id, o.user_id, o.total_amount, o.status, \
                    o.created_at, o.updated_at, \
                    u.name AS customer_name, u.email AS customer_email \
             FROM orders o LEFT JOIN users u ON u.id = o.user_id \
             ORDER BY o.created_at DESC, o.id DESC \
             LIMIT ?",
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(storage_error)?;

        let titles: Vec<(i64, String)> = sqlx::query_as(
            "SELECT oi.order_id, p.title \
             FROM order_items oi JOIN products p ON p.id = oi.product_id \
             ORDER BY oi.id",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(storage_error)?;

        let mut titles_by_order: HashMap<OrderId, Vec<String>> = HashMap::new();
        for (order_id, title) in titles {
            titles_by_order.entry(order_id).or_default().push(title);
        }

        rows.into_iter()
            .map(|row| {
                let order = Order::try_from(row.order)?;
                Ok(OrderSummary {
                    products: titles_by_order.remove(&order.id).unwrap_or_default(),
                    order,
                    customer_name: row.customer_name.unwrap_or_default(),
                    customer_email: row.customer_email.unwrap_or_default(),
                })
            })
            .collect()
    }

    async fn count(&self, sql: &str) -> ShopResult<i64> {
        sqlx::query_scalar(sql)
            .fetch_one(&self.pool)
            .await
            .map_err(storage_error)
    }
}

#[async_trait]
impl Store for SqliteStore {
    async fn list_products(&self) -> ShopResult<Vec<Product>> {
        let rows: Vec<ProductRow> = sqlx::query_as(&format!(
            "SELECT {PRODUCT_COLUMNS} FROM products ORDER BY created_at DESC, id DESC"
        ))
        .fetch_all(&self.pool)
        .await
        .map_err(storage_error)?;
        Ok(rows.into_iter().map(Product::from).collect())
    }

    async fn product_by_id(&self, id: ProductId) -> ShopResult<Option<Product>> {
        let row: Option<ProductRow> =
            sqlx::query_as(&format!("SELECT {PRODUCT_COLUMNS} FROM products WHERE id = ?"))
                .bind(id)
                .fetch_optional(&self.pool)
                .await
                .map_err(storage_error)?;
        Ok(row.map(Product::from))
    }

    async fn product_by_slug(&self, slug: &str) -> ShopResult<Option<Product>> {
        let row: Option<ProductRow> =
            sqlx::query_as(&format!("SELECT {PRODUCT_COLUMNS} FROM products WHERE slug = ?"))
                .bind(slug)
                .fetch_optional(&self.pool)
                .await
                .map_err(storage_error)?;
        Ok(row.map(Product::from))
    }

    async fn products_by_ids(&self, ids: &[ProductId]) -> ShopResult<Vec<Product>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let mut query = QueryBuilder::<Sqlite>::new(format!(
            "SELECT {PRODUCT_COLUMNS} FROM products WHERE id IN ("
        ));
        let mut separated = query.separated(", ");
        for id in ids {
            separated.push_bind(*id);
        }
        separated.push_unseparated(")");

        let rows: Vec<ProductRow> = query
            .build_query_as()
            .fetch_all(&self.pool)
            .await
            .map_err(storage_error)?;
        Ok(rows.into_iter().map(Product::from).collect())
    }

    async fn create_product(&self, product: &NewProduct) -> ShopResult<Product> {
        let now = Utc::now();
        let row: ProductRow = sqlx::query_as(&format!(
            "INSERT INTO products \
                (slug, title, description, price, preview_image, detail_image, file_key, \
                 created_at, updated_at) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?) \
             RETURNING {PRODUCT_COLUMNS}"
        ))
        .bind(&product.slug)
        .bind(&product.title)
        .bind(&product.description)
        .bind(product.price)
        .bind(&product.preview_image)
        .bind(&product.detail_image)
        .bind(&product.file_key)
        .bind(now)
        .bind(now)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| conflict_or_storage(e, "Product with this slug already exists"))?;
        Ok(row.into())
    }

    async fn update_product(&self, id: ProductId, product: &NewProduct) -> ShopResult<Product> {
        let row: Option<ProductRow> = sqlx::query_as(&format!(
            "UPDATE products \
             SET slug = ?, title = ?, description = ?, price = ?, preview_image = ?, \
                 detail_image = ?, file_key = ?, updated_at = ? \
             WHERE id = ? \
             RETURNING {PRODUCT_COLUMNS}"
        ))
        .bind(&product.slug)
        .bind(&product.title)
        .bind(&product.description)
        .bind(product.price)
        .bind(&product.preview_image)
        .bind(&product.detail_image)
        .bind(&product.file_key)
        .bind(Utc::now())
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| conflict_or_storage(e, "Product with this slug already exists"))?;

        row.map(Product::from)
            .ok_or_else(|| ShopError::NotFound(format!("Product {id} not found")))
    }

    async fn delete_product(&self, id: ProductId) -> ShopResult<Product> {
        let mut tx = self.pool.begin().await.map_err(storage_error)?;

        let product: ProductRow =
            sqlx::query_as(&format!("SELECT {PRODUCT_COLUMNS} FROM products WHERE id = ?"))
                .bind(id)
                .fetch_optional(&mut *tx)
                .await
                .map_err(storage_error)?
                .ok_or_else(|| ShopError::NotFound(format!("Product {id} not found")))?;

        let ordered: bool =
            sqlx::query_scalar("SELECT EXISTS (SELECT 1 FROM order_items WHERE product_id = ?)")
                .bind(id)
                .fetch_one(&mut *tx)
                .await
                .map_err(storage_error)?;
        if ordered {
            return Err(ShopError::Conflict(format!(
                "Product {id} has been ordered and cannot be deleted"
            )));
        }

        sqlx::query("DELETE FROM products WHERE id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await
            .map_err(storage_error)?;
        tx.commit().await.map_err(storage_error)?;

        Ok(product.into())
    }

    async fn product_sales(&self) -> ShopResult<Vec<ProductSales>> {
        let rows: Vec<ProductSalesRow> = sqlx::query_as(
            "SELECT p.id, p.slug, p.title, p.description, p.price, p.preview_image, \
                    p.detail_image, p.file_key, p.created_at, p.updated_at, \
                    COUNT(DISTINCT oi.order_id) AS total_sales, \
                    COALESCE(SUM(oi.price * oi.quantity), 0) AS total_revenue \
             FROM products p LEFT JOIN order_items oi ON oi.product_id = p.id \
             GROUP BY p.id \
             ORDER BY p.created_at DESC, p.id DESC",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(storage_error)?;

        Ok(rows
            .into_iter()
            .map(|row| ProductSales {
                product: row.product.into(),
                total_sales: row.total_sales,
                total_revenue: row.total_revenue,
            })
            .collect())
    }

    async fn create_user(&self, user: &NewUser) -> ShopResult<User> {
        let row: UserRow = sqlx::query_as(&format!(
            "INSERT INTO users (name, email, password_hash, role, created_at) \
             VALUES (?, ?, ?, ?, ?) \
             RETURNING {USER_COLUMNS}"
        ))
        .bind(&user.name)
        .bind(normalize_email(&user.email))
        .bind(&user.password_hash)
        .bind(user.role.as_str())
        .bind(Utc::now())
        .fetch_one(&self.pool)
        .await
        .map_err(|e| conflict_or_storage(e, "Email already registered"))?;
        row.try_into()
    }

    async fn user_by_email(&self, email: &str) -> ShopResult<Option<User>> {
        let row: Option<UserRow> =
            sqlx::query_as(&format!("SELECT {USER_COLUMNS} FROM users WHERE email = ?"))
                .bind(normalize_email(email))
                .fetch_optional(&self.pool)
                .await
                .map_err(storage_error)?;
        row.map(User::try_from).transpose()
    }

    async fn user_by_id(&self, id: UserId) -> ShopResult<Option<User>> {
        let row: Option<UserRow> =
            sqlx::query_as(&format!("SELECT {USER_COLUMNS} FROM users WHERE id = ?"))
                .bind(id)
                .fetch_optional(&self.pool)
                .await
                .map_err(storage_error)?;
        row.map(User::try_from).transpose()
    }

    async fn insert_order(&self, order: &NewOrder) -> ShopResult<PlacedOrder> {
        if order.lines.is_empty() {
            return Err(ShopError::InvalidArgument(
                "an order needs at least one line".to_string(),
            ));
        }

        let now = Utc::now();
        let mut tx = self.pool.begin().await.map_err(storage_error)?;

        let row: OrderRow = sqlx::query_as(&format!(
            "INSERT INTO orders (external_order_id, user_id, total_amount, status, created_at, updated_at) \
             VALUES (?, ?, ?, ?, ?, ?) \
             RETURNING {ORDER_COLUMNS}"
        ))
        .bind(&order.external_order_id)
        .bind(order.user_id)
        .bind(order.total_amount)
        .bind(OrderStatus::Pending.as_str())
        .bind(now)
        .bind(now)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| {
            conflict_or_storage(
                e,
                &format!("external order id {} already used", order.external_order_id),
            )
        })?;
        let created = Order::try_from(row)?;

        let mut lines = Vec::with_capacity(order.lines.len());
        for line in &order.lines {
            sqlx::query(
                "INSERT INTO order_items (order_id, product_id, price, quantity) VALUES (?, ?, ?, ?)",
            )
            .bind(created.id)
            .bind(line.product_id)
            .bind(line.unit_price)
            .bind(i64::from(line.quantity))
            .execute(&mut *tx)
            .await
            .map_err(storage_error)?;

            lines.push(OrderLine {
                order_id: created.id,
                product_id: line.product_id,
                unit_price: line.unit_price,
                quantity: line.quantity,
            });
        }

        tx.commit().await.map_err(storage_error)?;

        Ok(PlacedOrder {
            order: created,
            lines,
        })
    }

    async fn order_by_external_id(&self, external_order_id: &str) -> ShopResult<Option<Order>> {
        let row: Option<OrderRow> = sqlx::query_as(&format!(
            "SELECT {ORDER_COLUMNS} FROM orders WHERE external_order_id = ?"
        ))
        .bind(external_order_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(storage_error)?;
        row.map(Order::try_from).transpose()
    }

    async fn order_lines(&self, order_id: OrderId) -> ShopResult<Vec<OrderLine>> {
        let rows: Vec<OrderLineRow> = sqlx::query_as(
            "SELECT order_id, product_id, price, quantity FROM order_items \
             WHERE order_id = ? ORDER BY id",
        )
        .bind(order_id)
        .fetch_all(&self.pool)
        .await
        .map_err(storage_error)?;
        rows.into_iter().map(OrderLine::try_from).collect()
    }

    async fn set_order_status(
        &self,
        external_order_id: &str,
        allowed_from: &[OrderStatus],
        to: OrderStatus,
    ) -> ShopResult<StatusWrite> {
        for _ in 0..STATUS_WRITE_ATTEMPTS {
            let current: String =
                sqlx::query_scalar("SELECT status FROM orders WHERE external_order_id = ?")
                    .bind(external_order_id)
                    .fetch_optional(&self.pool)
                    .await
                    .map_err(storage_error)?
                    .ok_or_else(|| {
                        ShopError::NotFound(format!("Order {external_order_id} not found"))
                    })?;
            let current = parse_status(&current)?;

            if !allowed_from.contains(&current) {
                return Ok(StatusWrite::Refused { current });
            }

            let result = sqlx::query(
                "UPDATE orders SET status = ?, updated_at = ? \
                 WHERE external_order_id = ? AND status = ?",
            )
            .bind(to.as_str())
            .bind(Utc::now())
            .bind(external_order_id)
            .bind(current.as_str())
            .execute(&self.pool)
            .await
            .map_err(storage_error)?;

            if result.rows_affected() == 1 {
                return Ok(StatusWrite::Applied { previous: current });
            }
            debug!(external_order_id, "Order status changed concurrently, retrying");
        }

        Err(ShopError::StorageUnavailable(format!(
            "order {external_order_id} kept changing during status write"
        )))
    }

    async fn list_orders(&self) -> ShopResult<Vec<OrderSummary>> {
        self.order_summaries(None).await
    }

    async fn dashboard_stats(&self) -> ShopResult<DashboardStats> {
        let total_revenue: i64 = sqlx::query_scalar(
            "SELECT COALESCE(SUM(total_amount), 0) FROM orders WHERE status = ?",
        )
        .bind(OrderStatus::Paid.as_str())
        .fetch_one(&self.pool)
        .await
        .map_err(storage_error)?;

        let total_customers: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM users WHERE role = ?")
            .bind(Role::Customer.as_str())
            .fetch_one(&self.pool)
            .await
            .map_err(storage_error)?;

        Ok(DashboardStats {
            total_revenue,
            total_orders: self.count("SELECT COUNT(*) FROM orders").await?,
            total_products: self.count("SELECT COUNT(*) FROM products").await?,
            total_customers,
            recent_orders: self.order_summaries(Some(RECENT_ORDERS_LIMIT)).await?,
        })
    }

    async fn find_paid_entitlement(
        &self,
        user_id: UserId,
        product_id: ProductId,
    ) -> ShopResult<Option<Entitlement>> {
        let row: Option<EntitlementRow> = sqlx::query_as(
            "SELECT o.id AS order_id, p.id AS product_id, p.title, p.file_key \
             FROM orders o \
             JOIN order_items oi ON oi.order_id = o.id \
             JOIN products p ON p.id = oi.product_id \
             WHERE o.user_id = ? AND oi.product_id = ? AND o.status = ? \
             ORDER BY o.id \
             LIMIT 1",
        )
        .bind(user_id)
        .bind(product_id)
        .bind(OrderStatus::Paid.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(storage_error)?;
        Ok(row.map(Entitlement::from))
    }

    async fn record_download(
        &self,
        user_id: UserId,
        product_id: ProductId,
        order_id: OrderId,
        at: DateTime<Utc>,
    ) -> ShopResult<DownloadRecord> {
        let row: DownloadRow = sqlx::query_as(
            "INSERT INTO downloads (user_id, product_id, order_id, download_count, last_downloaded_at) \
             VALUES (?, ?, ?, 1, ?) \
             ON CONFLICT (user_id, product_id, order_id) DO UPDATE \
             SET download_count = download_count + 1, \
                 last_downloaded_at = excluded.last_downloaded_at \
             RETURNING user_id, product_id, order_id, download_count, last_downloaded_at",
        )
        .bind(user_id)
        .bind(product_id)
        .bind(order_id)
        .bind(at)
        .fetch_one(&self.pool)
        .await
        .map_err(storage_error)?;
        Ok(row.into())
    }

    async fn download_record(
        &self,
        user_id: UserId,
        product_id: ProductId,
        order_id: OrderId,
    ) -> ShopResult<Option<DownloadRecord>> {
        let row: Option<DownloadRow> = sqlx::query_as(
            "SELECT user_id, product_id, order_id, download_count, last_downloaded_at \
             FROM downloads WHERE user_id = ? AND product_id = ? AND order_id = ?",
        )
        .bind(user_id)
        .bind(product_id)
        .bind(order_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(storage_error)?;
        Ok(row.map(DownloadRecord::from))
    }

    async fn list_purchases(&self, user_id: UserId) -> ShopResult<Vec<Purchase>> {
        let rows: Vec<PurchaseJoinRow> = sqlx::query_as(
            "SELECT o.id, o.external_order_id, o.user_id, o.total_amount, o.status, \
                    o.created_at, o.updated_at, \
                    p.id AS product_id, p.title, p.slug, p.description, p.preview_image, \
                    oi.price AS paid_price, oi.quantity, \
                    d.download_count, d.last_downloaded_at \
             FROM orders o \
             JOIN order_items oi ON oi.order_id = o.id \
             JOIN products p ON p.id = oi.product_id \
             LEFT JOIN downloads d \
                    ON d.order_id = o.id AND d.product_id = p.id AND d.user_id = o.user_id \
             WHERE o.user_id = ? \
             ORDER BY o.created_at DESC, o.id DESC, oi.id",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
        .map_err(storage_error)?;

        let rows = rows
            .into_iter()
            .map(PurchaseRow::try_from)
            .collect::<ShopResult<Vec<_>>>()?;
        Ok(group_purchase_rows(rows))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shop_core::{Cart, NewOrder};
    use std::sync::Arc;

    async fn store() -> SqliteStore {
        SqliteStore::connect("sqlite::memory:", 1).await.unwrap()
    }

    async fn customer(store: &SqliteStore, email: &str) -> User {
        store
            .create_user(&NewUser {
                name: "Ayu".to_string(),
                email: email.to_string(),
                password_hash: "$argon2id$stub".to_string(),
                role: Role::Customer,
            })
            .await
            .unwrap()
    }

    async fn product(store: &SqliteStore, slug: &str, price: i64) -> Product {
        store
            .create_product(&NewProduct::new(slug.to_uppercase(), slug, price, format!("{slug}.zip")))
            .await
            .unwrap()
    }

    async fn place(store: &SqliteStore, user: &User, products: &[&Product]) -> PlacedOrder {
        let cart = products
            .iter()
            .fold(Cart::new(), |cart, p| cart.with_item(p.id, 1));
        let resolved: Vec<Product> = products.iter().map(|p| (*p).clone()).collect();
        let draft = NewOrder::price(user.id, &cart, &resolved).unwrap();
        store.insert_order(&draft).await.unwrap()
    }

    #[tokio::test]
    async fn test_connect_prepares_schema() {
        let store = SqliteStore::connect("sqlite::memory:", 1).await.unwrap();
        let user = customer(&store, "ayu@example.com").await;
        assert!(store.list_purchases(user.id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_migrate_is_idempotent() {
        let store = store().await;
        store.migrate().await.unwrap();
        assert!(store.list_products().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_product_crud_and_slug_conflict() {
        let store = store().await;
        let created = product(&store, "rust-course", 100_000).await;

        let duplicate = store
            .create_product(&NewProduct::new("Other", "rust-course", 5, "x.zip"))
            .await;
        assert!(matches!(duplicate, Err(ShopError::Conflict(_))));

        let updated = store
            .update_product(
                created.id,
                &NewProduct::new("Rust Course 2e", "rust-course", 120_000, "rust2.zip")
                    .with_description("Second edition"),
            )
            .await
            .unwrap();
        assert_eq!(updated.price, 120_000);
        assert_eq!(updated.description, "Second edition");

        let by_slug = store.product_by_slug("rust-course").await.unwrap().unwrap();
        assert_eq!(by_slug.id, created.id);

        let missing = store
            .update_product(999, &NewProduct::new("X", "x", 1, "x.zip"))
            .await;
        assert!(matches!(missing, Err(ShopError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_products_by_ids_skips_unknown() {
        let store = store().await;
        let a = product(&store, "a", 10).await;
        let b = product(&store, "b", 20).await;

        let mut found = store.products_by_ids(&[a.id, b.id, 404]).await.unwrap();
        found.sort_by_key(|p| p.id);
        assert_eq!(found.len(), 2);
        assert!(store.products_by_ids(&[]).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_duplicate_email_conflicts() {
        let store = store().await;
        customer(&store, "ayu@example.com").await;

        let again = store
            .create_user(&NewUser {
                name: "Other".to_string(),
                email: " AYU@example.com ".to_string(),
                password_hash: "h".to_string(),
                role: Role::Customer,
            })
            .await;
        assert!(matches!(again, Err(ShopError::Conflict(_))));

        let found = store.user_by_email("Ayu@Example.com").await.unwrap().unwrap();
        assert_eq!(found.role, Role::Customer);
        assert_eq!(found.password_hash, "$argon2id$stub");
    }

    #[tokio::test]
    async fn test_insert_order_persists_lines() {
        let store = store().await;
        let user = customer(&store, "ayu@example.com").await;
        let a = product(&store, "a", 100_000).await;
        let b = product(&store, "b", 40_000).await;

        let placed = place(&store, &user, &[&a, &b]).await;
        assert_eq!(placed.order.status, OrderStatus::Pending);
        assert_eq!(placed.order.total_amount, 140_000);

        let order = store
            .order_by_external_id(&placed.order.external_order_id)
            .await
            .unwrap()
            .unwrap();
        let lines = store.order_lines(order.id).await.unwrap();
        assert_eq!(lines, placed.lines);
    }

    #[tokio::test]
    async fn test_failed_line_insert_rolls_back_order() {
        let store = store().await;
        let user = customer(&store, "ayu@example.com").await;
        let a = product(&store, "a", 100).await;

        let mut draft =
            NewOrder::price(user.id, &Cart::new().with_item(a.id, 1), &[a.clone()]).unwrap();
        // the second line violates the products foreign key
        draft.lines.push(shop_core::NewOrderLine {
            product_id: 9_999,
            title: "ghost".to_string(),
            unit_price: 1,
            quantity: 1,
        });

        assert!(store.insert_order(&draft).await.is_err());
        assert!(store
            .order_by_external_id(&draft.external_order_id)
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_conditional_status_write() {
        let store = store().await;
        let user = customer(&store, "ayu@example.com").await;
        let a = product(&store, "a", 100).await;
        let ext = place(&store, &user, &[&a]).await.order.external_order_id;

        let paid = store
            .set_order_status(&ext, &[OrderStatus::Pending], OrderStatus::Paid)
            .await
            .unwrap();
        assert_eq!(
            paid,
            StatusWrite::Applied {
                previous: OrderStatus::Pending
            }
        );

        let refused = store
            .set_order_status(&ext, &[OrderStatus::Pending], OrderStatus::Cancelled)
            .await
            .unwrap();
        assert_eq!(
            refused,
            StatusWrite::Refused {
                current: OrderStatus::Paid
            }
        );

        let missing = store
            .set_order_status("ORDER-0-nope", &[OrderStatus::Pending], OrderStatus::Paid)
            .await;
        assert!(matches!(missing, Err(ShopError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_delete_ordered_product_conflicts() {
        let store = store().await;
        let user = customer(&store, "ayu@example.com").await;
        let ordered = product(&store, "ordered", 100).await;
        let unsold = product(&store, "unsold", 100).await;
        place(&store, &user, &[&ordered]).await;

        let result = store.delete_product(ordered.id).await;
        assert!(matches!(result, Err(ShopError::Conflict(_))));

        store.delete_product(unsold.id).await.unwrap();
        assert!(store.product_by_id(unsold.id).await.unwrap().is_none());
        assert!(matches!(
            store.delete_product(unsold.id).await,
            Err(ShopError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_entitlement_needs_paid_order() {
        let store = store().await;
        let user = customer(&store, "ayu@example.com").await;
        let a = product(&store, "a", 100).await;

        let pending = place(&store, &user, &[&a]).await;
        assert!(store.find_paid_entitlement(user.id, a.id).await.unwrap().is_none());

        let paid = place(&store, &user, &[&a]).await;
        store
            .set_order_status(
                &paid.order.external_order_id,
                &[OrderStatus::Pending],
                OrderStatus::Paid,
            )
            .await
            .unwrap();

        let entitlement = store
            .find_paid_entitlement(user.id, a.id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(entitlement.order_id, paid.order.id);
        assert_ne!(entitlement.order_id, pending.order.id);
        assert_eq!(entitlement.file_key, "a.zip");
    }

    #[tokio::test]
    async fn test_concurrent_download_upserts() {
        let store = Arc::new(store().await);
        let user = customer(&store, "ayu@example.com").await;
        let a = product(&store, "a", 100).await;
        let order = place(&store, &user, &[&a]).await.order;

        let handles: Vec<_> = (0..20)
            .map(|_| {
                let store = store.clone();
                let (user_id, product_id, order_id) = (user.id, a.id, order.id);
                tokio::spawn(async move {
                    store
                        .record_download(user_id, product_id, order_id, Utc::now())
                        .await
                })
            })
            .collect();

        let mut counts = Vec::new();
        let mut last_write = None;
        for handle in handles {
            let record = handle.await.unwrap().unwrap();
            if record.download_count == 20 {
                last_write = record.last_downloaded_at;
            }
            counts.push(record.download_count);
        }
        counts.sort_unstable();
        assert_eq!(counts, (1..=20).collect::<Vec<_>>());

        let record = store
            .download_record(user.id, a.id, order.id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(record.download_count, 20);
        assert!(last_write.is_some());
        assert_eq!(record.last_downloaded_at, last_write);
    }

    #[tokio::test]
    async fn test_list_purchases_groups_by_order() {
        let store = store().await;
        let user = customer(&store, "ayu@example.com").await;
        let other = customer(&store, "budi@example.com").await;
        let a = product(&store, "a", 100).await;
        let b = product(&store, "b", 200).await;

        let first = place(&store, &user, &[&a, &b]).await.order;
        let second = place(&store, &user, &[&b]).await.order;
        place(&store, &other, &[&a]).await;
        store
            .record_download(user.id, b.id, second.id, Utc::now())
            .await
            .unwrap();

        let purchases = store.list_purchases(user.id).await.unwrap();
        assert_eq!(purchases.len(), 2);
        assert_eq!(purchases[0].order.id, second.id);
        assert_eq!(purchases[0].products[0].download_count, 1);
        assert_eq!(purchases[1].order.id, first.id);
        assert_eq!(purchases[1].products.len(), 2);
        assert_eq!(purchases[1].products[0].paid_price, 100);
        assert_eq!(purchases[1].products[1].download_count, 0);
    }

    #[tokio::test]
    async fn test_back_office_reads() {
        let store = store().await;
        let user = customer(&store, "ayu@example.com").await;
        let a = product(&store, "a", 100).await;
        let b = product(&store, "b", 250).await;

        let paid = place(&store, &user, &[&a, &b]).await.order;
        place(&store, &user, &[&a]).await;
        store
            .set_order_status(
                &paid.external_order_id,
                &[OrderStatus::Pending],
                OrderStatus::Paid,
            )
            .await
            .unwrap();

        let sales = store.product_sales().await.unwrap();
        let a_sales = sales.iter().find(|s| s.product.id == a.id).unwrap();
        assert_eq!(a_sales.total_sales, 2);
        assert_eq!(a_sales.total_revenue, 200);

        let orders = store.list_orders().await.unwrap();
        assert_eq!(orders.len(), 2);
        let paid_summary = orders.iter().find(|o| o.order.id == paid.id).unwrap();
        assert_eq!(paid_summary.customer_email, "ayu@example.com");
        assert_eq!(paid_summary.products, vec!["A".to_string(), "B".to_string()]);

        let stats = store.dashboard_stats().await.unwrap();
        assert_eq!(stats.total_revenue, 350);
        assert_eq!(stats.total_orders, 2);
        assert_eq!(stats.total_products, 2);
        assert_eq!(stats.total_customers, 1);
        assert_eq!(stats.recent_orders.len(), 2);
    }
}
