//! # shop-sqlite
//!
//! SQLite implementation of the shop's `Store` port, built on sqlx.
//!
//! ```rust,ignore
//! use shop_sqlite::SqliteStore;
//!
//! let store = SqliteStore::connect("sqlite://shop.db?mode=rwc", 5).await?;
//! let products = store.list_products().await?;
//! ```

mod rows;
pub mod store;

pub use store::SqliteStore;
