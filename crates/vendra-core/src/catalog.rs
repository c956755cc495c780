// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Product catalog types and the configuration provider seam.
//!
//! The catalog is an immutable snapshot. A successful Initialize replaces it
//! wholesale; a successful Fetch produces a merged copy and replaces it
//! again. Readers never observe a half-updated catalog.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Whether a product is consumed on use or owned durably.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProductKind {
    /// Can be purchased repeatedly (coins, boosts).
    Consumable,
    /// Owned once (unlocks, upgrades).
    Durable,
}

/// One product entry in the configuration handed to the native layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductEntry {
    /// Storefront product identifier.
    pub product_id: String,
    /// Consumable or durable.
    pub kind: ProductKind,
}

/// Product configuration returned by the config provider: the set of
/// products the store should request from the native layer.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogConfig {
    /// Products to request.
    pub products: Vec<ProductEntry>,
}

impl CatalogConfig {
    /// A configuration with no products counts as missing.
    pub fn is_empty(&self) -> bool {
        self.products.is_empty()
    }

    /// Parse a configuration from its JSON representation, the form most
    /// config backends deliver it in.
    pub fn from_json(bytes: &[u8]) -> serde_json::Result<Self> {
        serde_json::from_slice(bytes)
    }
}

/// A product as resolved by the native layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Product {
    /// Storefront product identifier.
    pub product_id: String,
    /// Localized display title, if the storefront provided one.
    pub title: Option<String>,
    /// Localized, formatted price text ("$1.99"), if provided.
    pub price_text: Option<String>,
    /// Consumable or durable.
    pub kind: ProductKind,
    /// Whether the storefront currently allows purchasing this product.
    pub purchasable: bool,
}

/// Immutable catalog snapshot.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Catalog {
    products: Vec<Product>,
}

impl Catalog {
    /// Build a catalog from native product records.
    pub fn new(products: Vec<Product>) -> Self {
        Self { products }
    }

    /// Look up a product by id.
    pub fn get(&self, product_id: &str) -> Option<&Product> {
        self.products.iter().find(|p| p.product_id == product_id)
    }

    /// Whether the catalog resolves this product id at all.
    pub fn contains(&self, product_id: &str) -> bool {
        self.get(product_id).is_some()
    }

    /// All products in the snapshot.
    pub fn products(&self) -> &[Product] {
        &self.products
    }

    /// Number of products in the snapshot.
    pub fn len(&self) -> usize {
        self.products.len()
    }

    /// Whether the snapshot is empty.
    pub fn is_empty(&self) -> bool {
        self.products.is_empty()
    }

    /// A new snapshot with `additions` layered on top of this catalog.
    /// An addition with a known product id replaces the earlier record.
    pub fn merged(&self, additions: Vec<Product>) -> Catalog {
        let mut products: Vec<Product> = self
            .products
            .iter()
            .filter(|p| !additions.iter().any(|a| a.product_id == p.product_id))
            .cloned()
            .collect();
        products.extend(additions);
        Catalog { products }
    }
}

/// External collaborator that supplies the product configuration.
///
/// Called once per Initialize/Fetch operation, off the store's owner
/// context. Errors (and empty configurations) fail the operation with
/// `ConfigUnavailable` before the native layer is touched.
#[async_trait]
pub trait ConfigProvider: Send + Sync {
    /// Fetch the product configuration.
    async fn get_config(&self) -> anyhow::Result<CatalogConfig>;
}
