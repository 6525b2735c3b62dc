//! Shared data models for listings and catalog products.

use serde::{Deserialize, Serialize};

use crate::history::PriceHistory;
use crate::identity::ProductIdentity;

/// One scraped product appearance, exactly as an adapter extracted it.
///
/// This is the inbound producer interface: adapters own DOM/API
/// extraction and session concerns, and hand over raw text. Prices are
/// uncleaned strings; the platform tag must name a known platform.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawListing {
    pub link: String,
    pub platform: String,
    /// Search category that surfaced the listing (not a product property).
    pub category: String,
    pub title: String,
    pub raw_price: String,
    #[serde(default)]
    pub raw_reference_price: String,
    #[serde(default)]
    pub image: String,
}

/// Display metadata carried by every admitted scrape. Overwrites the
/// stored product's metadata so it always reflects the latest observation.
#[derive(Debug, Clone, PartialEq)]
pub struct ProductMeta {
    pub title: String,
    pub image: Option<String>,
    pub link: String,
    pub category: String,
}

/// Catalog aggregate: identity, display metadata, and the price ledger.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Product {
    pub identity: ProductIdentity,
    pub title: String,
    pub image: Option<String>,
    pub link: String,
    /// Set when the product is first seen and never overwritten: the
    /// category comes from the search query that discovered the product,
    /// not from the product itself.
    pub category: String,
    pub history: PriceHistory,
}

impl Product {
    /// Current discount, from the most recent history entry.
    pub fn current_discount(&self) -> Option<i32> {
        self.history.latest().map(|s| s.discount_percent)
    }
}
