//! Ingestion pipeline: raw listings in, catalog upserts and a report out.
//!
//! Per-listing flow: clean price text → resolve identity → compute
//! discount → admission check → catalog upsert. A single listing never
//! aborts the batch; only a store outage does.

use std::sync::Arc;

use chrono::Utc;
use rust_decimal::Decimal;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::catalog::{CatalogStore, StoreError};
use crate::history::{LedgerOutcome, PriceSnapshot};
use crate::identity;
use crate::models::{Product, ProductMeta, RawListing};
use crate::platform::Platform;
use crate::pricing::{self, AdmissionPolicy};

/// Upsert attempts per listing when same-identity writers collide.
const CONFLICT_ATTEMPTS: usize = 3;

#[derive(Debug, Error)]
pub enum IngestError {
    /// The catalog's persistence layer is unreachable; the batch fails.
    #[error("catalog store failed: {0}")]
    Store(#[from] StoreError),
}

/// Per-outcome counts for one ingested batch, plus the products that
/// actually took a write. Consumed by the admission HTTP surface.
#[derive(Debug, Default, serde::Serialize)]
pub struct IngestReport {
    /// Products written this batch (new day entry or lower-price replace).
    pub admitted: Vec<Product>,
    /// Listings that appended a new day entry.
    pub admitted_new: usize,
    /// Listings that replaced a same-day entry with a lower price.
    pub updated_lower_price: usize,
    /// Admitted listings whose day entry already held a lower price.
    pub unchanged: usize,
    /// Listings below the batch threshold (the expected common case).
    pub skipped_below_threshold: usize,
    /// Listings whose link resolved to no identity.
    pub skipped_unresolvable: usize,
    /// Listings dropped for unexpected per-listing failures.
    pub skipped_error: usize,
}

impl IngestReport {
    /// Total listings accounted for.
    pub fn total(&self) -> usize {
        self.admitted_new
            + self.updated_lower_price
            + self.unchanged
            + self.skipped_below_threshold
            + self.skipped_unresolvable
            + self.skipped_error
    }
}

/// Drives batches of raw listings through the catalog.
pub struct Ingestor<S: CatalogStore + ?Sized> {
    store: Arc<S>,
}

impl<S: CatalogStore + ?Sized> Ingestor<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    /// Ingest one batch under one admission policy.
    ///
    /// Listings are processed in order; each upsert is atomic, so
    /// cancelling mid-batch only truncates which listings were processed.
    pub async fn ingest(
        &self,
        batch: &[RawListing],
        policy: AdmissionPolicy,
    ) -> Result<IngestReport, IngestError> {
        let mut report = IngestReport::default();
        info!(
            listings = batch.len(),
            threshold = policy.discount_threshold,
            "ingesting batch"
        );

        for listing in batch {
            self.ingest_one(listing, policy, &mut report).await?;
        }

        info!(
            admitted = report.admitted_new,
            lower_price = report.updated_lower_price,
            unchanged = report.unchanged,
            below_threshold = report.skipped_below_threshold,
            unresolvable = report.skipped_unresolvable,
            errors = report.skipped_error,
            "batch complete"
        );
        Ok(report)
    }

    async fn ingest_one(
        &self,
        listing: &RawListing,
        policy: AdmissionPolicy,
        report: &mut IngestReport,
    ) -> Result<(), IngestError> {
        let Some(platform) = Platform::from_str(&listing.platform) else {
            warn!(platform = %listing.platform, "listing carries unknown platform tag");
            report.skipped_error += 1;
            return Ok(());
        };

        let Some(product_identity) = identity::resolve(&listing.link, platform) else {
            debug!(link = %listing.link, %platform, "unresolvable listing link");
            report.skipped_unresolvable += 1;
            return Ok(());
        };

        // Malformed price text degrades to a 0/0 pair and a 0% discount,
        // which the threshold then rejects.
        let price = pricing::clean_price_text(&listing.raw_price);
        // A listing without a struck-through MRP is sold at list price.
        let reference = pricing::clean_price_text(&listing.raw_reference_price).or(price);
        let (price, reference) = match (price, reference) {
            (Some(p), Some(r)) => (p, r),
            _ => (Decimal::ZERO, Decimal::ZERO),
        };
        let discount = pricing::calculate_discount(price, reference);

        if !policy.admits(discount) {
            debug!(identity = %product_identity, discount, "below threshold");
            report.skipped_below_threshold += 1;
            return Ok(());
        }

        let snapshot = PriceSnapshot {
            price,
            reference_price: reference,
            discount_percent: discount,
            observed_at: Utc::now(),
        };
        let meta = ProductMeta {
            title: listing.title.clone(),
            image: (!listing.image.is_empty()).then(|| listing.image.clone()),
            link: identity::canonical_link(&listing.link, platform),
            category: listing.category.clone(),
        };

        let result = {
            let mut attempt = 0;
            loop {
                match self
                    .store
                    .upsert(&product_identity, &meta, snapshot.clone())
                    .await
                {
                    Ok(result) => break result,
                    Err(StoreError::Conflict(_)) if attempt + 1 < CONFLICT_ATTEMPTS => {
                        attempt += 1;
                        debug!(identity = %product_identity, attempt, "upsert conflict, retrying");
                    }
                    Err(StoreError::Conflict(id)) => {
                        warn!(identity = %id, "upsert conflict persisted after retries");
                        report.skipped_error += 1;
                        return Ok(());
                    }
                    Err(err @ StoreError::Unavailable(_)) => return Err(err.into()),
                }
            }
        };

        match result.outcome {
            LedgerOutcome::Appended => {
                info!(identity = %product_identity, discount, "admitted new daily price");
                report.admitted_new += 1;
                report.admitted.push(result.product);
            }
            LedgerOutcome::ReplacedLower => {
                info!(identity = %product_identity, price = %snapshot.price, "updated to new lowest price");
                report.updated_lower_price += 1;
                report.admitted.push(result.product);
            }
            LedgerOutcome::Unchanged => {
                debug!(identity = %product_identity, "kept existing lower price");
                report.unchanged += 1;
            }
        }
        Ok(())
    }
}
