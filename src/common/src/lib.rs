//! Core library for the DealRadar deal aggregator.
//!
//! Scraping adapters (out of process) produce raw listings; this crate
//! consolidates them:
//! - Product identity resolution from listing URLs
//! - Discount calculation and the admission threshold
//! - Bounded one-entry-per-day lowest-price ledgers
//! - Catalog stores (in-memory and Postgres) with per-identity atomic upserts
//! - The ingestion pipeline tying it all together

pub mod catalog;
pub mod config;
pub mod db;
pub mod history;
pub mod identity;
pub mod models;
pub mod pipeline;
pub mod platform;
pub mod pricing;
pub mod repository;

pub use catalog::{CatalogStore, MemoryCatalog, ProductFilter, StoreError, UpsertResult};
pub use config::Config;
pub use db::Database;
pub use history::{LedgerOutcome, PriceHistory, PriceSnapshot, MAX_ENTRIES};
pub use identity::{canonical_link, resolve, ProductIdentity};
pub use models::{Product, ProductMeta, RawListing};
pub use pipeline::{IngestError, IngestReport, Ingestor};
pub use platform::Platform;
pub use pricing::{calculate_discount, clean_price_text, AdmissionPolicy};
pub use repository::PgCatalog;
