//! # Product Types
//!
//! Catalog types for the shop. Prices are integers in the smallest
//! currency unit. An optional `config/products.toml` seeds the catalog.

use crate::error::{ShopError, ShopResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Product identifier
pub type ProductId = i64;

/// A product in the catalog
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Product {
    pub id: ProductId,

    /// URL key, unique
    pub slug: String,

    pub title: String,

    #[serde(default)]
    pub description: String,

    /// Price in smallest currency unit, always positive
    pub price: i64,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub preview_image: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail_image: Option<String>,

    /// Opaque blob-store key of the downloadable file
    pub file_key: String,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Editable product fields, used for both create and update
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewProduct {
    pub title: String,
    pub slug: String,
    #[serde(default)]
    pub description: String,
    pub price: i64,
    #[serde(default)]
    pub preview_image: Option<String>,
    #[serde(default)]
    pub detail_image: Option<String>,
    pub file_key: String,
}

impl NewProduct {
    /// Create a product draft with the required fields
    pub fn new(
        title: impl Into<String>,
        slug: impl Into<String>,
        price: i64,
        file_key: impl Into<String>,
    ) -> Self {
        Self {
            title: title.into(),
            slug: slug.into(),
            description: String::new(),
            price,
            preview_image: None,
            detail_image: None,
            file_key: file_key.into(),
        }
    }

    /// Builder: set description
    pub fn with_description(mut self, desc: impl Into<String>) -> Self {
        self.description = desc.into();
        self
    }

    /// Builder: set preview image URL
    pub fn with_preview_image(mut self, url: impl Into<String>) -> Self {
        self.preview_image = Some(url.into());
        self
    }

    /// Reject drafts missing a required field or carrying a non-positive price
    pub fn validate(&self) -> ShopResult<()> {
        let missing: Vec<&str> = [
            ("title", self.title.trim().is_empty()),
            ("slug", self.slug.trim().is_empty()),
            ("file_key", self.file_key.trim().is_empty()),
        ]
        .into_iter()
        .filter_map(|(name, empty)| empty.then_some(name))
        .collect();

        if !missing.is_empty() {
            return Err(ShopError::InvalidArgument(format!(
                "Missing required fields: {}",
                missing.join(", ")
            )));
        }

        if self.price <= 0 {
            return Err(ShopError::InvalidArgument(
                "price must be a positive integer".to_string(),
            ));
        }

        if !self
            .slug
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
        {
            return Err(ShopError::InvalidArgument(format!(
                "slug may only contain letters, digits, '-' and '_': {}",
                self.slug
            )));
        }

        Ok(())
    }
}

/// Product with sales figures, for the back-office listing
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductSales {
    #[serde(flatten)]
    pub product: Product,
    /// Distinct orders containing the product
    pub total_sales: i64,
    /// Sum of frozen line totals
    pub total_revenue: i64,
}

/// Catalog seed file (`config/products.toml`)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProductCatalog {
    #[serde(default)]
    pub products: Vec<NewProduct>,
}

impl ProductCatalog {
    /// Load catalog from TOML string
    pub fn from_toml(toml_str: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(toml_str)
    }

    /// Number of products in the seed
    pub fn len(&self) -> usize {
        self.products.len()
    }

    /// Check if the seed is empty
    pub fn is_empty(&self) -> bool {
        self.products.is_empty()
    }
}
