//! Product catalog storage: the upsert contract and an in-memory store.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::FixedOffset;
use thiserror::Error;
use tokio::sync::{Mutex, RwLock};

use crate::history::{LedgerOutcome, PriceHistory, PriceSnapshot};
use crate::identity::ProductIdentity;
use crate::models::{Product, ProductMeta};
use crate::platform::Platform;

#[derive(Debug, Error)]
pub enum StoreError {
    /// Concurrent writers collided on the same identity; safe to retry.
    #[error("conflicting write for {0}")]
    Conflict(String),

    /// The backing store is unreachable or returned something unusable.
    /// Fatal for the whole batch.
    #[error("catalog store unavailable: {0}")]
    Unavailable(String),
}

/// Read-side filter for product listings.
#[derive(Debug, Clone, Default)]
pub struct ProductFilter {
    pub platform: Option<Platform>,
    pub category: Option<String>,
    /// Keep only products whose current discount meets this floor.
    pub min_discount: Option<i32>,
}

impl ProductFilter {
    pub fn matches(&self, product: &Product) -> bool {
        if let Some(platform) = self.platform {
            if product.identity.platform != platform {
                return false;
            }
        }
        if let Some(category) = &self.category {
            if &product.category != category {
                return false;
            }
        }
        if let Some(min) = self.min_discount {
            if product.current_discount().map_or(true, |d| d < min) {
                return false;
            }
        }
        true
    }
}

/// Result of one catalog upsert: the product as persisted, plus what the
/// ledger did with the snapshot.
#[derive(Debug, Clone)]
pub struct UpsertResult {
    pub product: Product,
    pub outcome: LedgerOutcome,
}

/// Catalog store contract.
///
/// Writes go through `upsert` only; the read methods are the query
/// surface for the API layer and never touch ledger state.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CatalogStore: Send + Sync {
    /// Atomically apply one admitted scrape: create the product on first
    /// sight (category included), otherwise overwrite title/image/link
    /// with the latest observation and leave category alone, then run the
    /// ledger's one-per-day lowest-price rule on the snapshot.
    ///
    /// Implementations serialize upserts per identity; no caller may
    /// observe a half-updated product.
    async fn upsert(
        &self,
        identity: &ProductIdentity,
        meta: &ProductMeta,
        snapshot: PriceSnapshot,
    ) -> Result<UpsertResult, StoreError>;

    async fn get(&self, identity: &ProductIdentity) -> Result<Option<Product>, StoreError>;

    async fn list(&self, filter: &ProductFilter) -> Result<Vec<Product>, StoreError>;

    async fn history(
        &self,
        identity: &ProductIdentity,
    ) -> Result<Option<PriceHistory>, StoreError>;
}

/// In-process catalog.
///
/// Each identity gets its own mutex, so same-identity read-modify-write
/// is exclusive while distinct identities proceed in parallel.
pub struct MemoryCatalog {
    tz: FixedOffset,
    products: RwLock<HashMap<ProductIdentity, Arc<Mutex<Product>>>>,
}

impl MemoryCatalog {
    /// `tz` is the reference timezone for the ledger's calendar-day rule.
    pub fn new(tz: FixedOffset) -> Self {
        Self {
            tz,
            products: RwLock::new(HashMap::new()),
        }
    }

    async fn slot(&self, identity: &ProductIdentity, meta: &ProductMeta) -> Arc<Mutex<Product>> {
        if let Some(slot) = self.products.read().await.get(identity) {
            return Arc::clone(slot);
        }
        let mut map = self.products.write().await;
        Arc::clone(map.entry(identity.clone()).or_insert_with(|| {
            Arc::new(Mutex::new(Product {
                identity: identity.clone(),
                title: meta.title.clone(),
                image: meta.image.clone(),
                link: meta.link.clone(),
                category: meta.category.clone(),
                history: PriceHistory::new(),
            }))
        }))
    }
}

#[async_trait]
impl CatalogStore for MemoryCatalog {
    async fn upsert(
        &self,
        identity: &ProductIdentity,
        meta: &ProductMeta,
        snapshot: PriceSnapshot,
    ) -> Result<UpsertResult, StoreError> {
        let slot = self.slot(identity, meta).await;
        let mut product = slot.lock().await;

        // Latest observation wins for display metadata; category is
        // create-only and never touched here.
        product.title = meta.title.clone();
        product.image = meta.image.clone();
        product.link = meta.link.clone();
        let outcome = product.history.upsert(snapshot, self.tz);

        Ok(UpsertResult {
            product: product.clone(),
            outcome,
        })
    }

    async fn get(&self, identity: &ProductIdentity) -> Result<Option<Product>, StoreError> {
        let map = self.products.read().await;
        match map.get(identity) {
            Some(slot) => Ok(Some(slot.lock().await.clone())),
            None => Ok(None),
        }
    }

    async fn list(&self, filter: &ProductFilter) -> Result<Vec<Product>, StoreError> {
        let map = self.products.read().await;
        let mut products = Vec::new();
        for slot in map.values() {
            let product = slot.lock().await.clone();
            if filter.matches(&product) {
                products.push(product);
            }
        }
        products.sort_by(|a, b| a.identity.to_string().cmp(&b.identity.to_string()));
        Ok(products)
    }

    async fn history(
        &self,
        identity: &ProductIdentity,
    ) -> Result<Option<PriceHistory>, StoreError> {
        Ok(self.get(identity).await?.map(|p| p.history))
    }
}
