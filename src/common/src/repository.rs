//! Postgres-backed product catalog.
//!
//! Products are rows keyed by the unique `(platform, external_id)`
//! composite, with the price ledger embedded as a JSONB array capped at
//! 90 entries. Per-identity serialization is realized with a `version`
//! column: read, apply the ledger rule locally, then conditionally write
//! back; a lost race shows up as zero rows affected and is retried.

use async_trait::async_trait;
use chrono::FixedOffset;
use sqlx::FromRow;

use crate::catalog::{CatalogStore, ProductFilter, StoreError, UpsertResult};
use crate::db::Database;
use crate::history::{PriceHistory, PriceSnapshot};
use crate::identity::ProductIdentity;
use crate::models::{Product, ProductMeta};
use crate::platform::Platform;

/// Read-modify-write attempts before giving up with a conflict.
const UPSERT_ATTEMPTS: usize = 3;

pub struct PgCatalog {
    db: Database,
    tz: FixedOffset,
}

#[derive(Debug, FromRow)]
struct ProductRow {
    platform: String,
    external_id: String,
    title: String,
    image: Option<String>,
    link: String,
    category: String,
    price_history: serde_json::Value,
    version: i64,
}

const SELECT_COLUMNS: &str =
    "platform, external_id, title, image, link, category, price_history, version";

impl ProductRow {
    fn into_product(self) -> Result<Product, StoreError> {
        let platform = Platform::from_str(&self.platform).ok_or_else(|| {
            StoreError::Unavailable(format!("unknown platform in store: {}", self.platform))
        })?;
        let history: PriceHistory = serde_json::from_value(self.price_history)
            .map_err(|e| StoreError::Unavailable(format!("corrupt price history: {e}")))?;
        Ok(Product {
            identity: ProductIdentity::new(platform, self.external_id),
            title: self.title,
            image: self.image,
            link: self.link,
            category: self.category,
            history,
        })
    }
}

impl PgCatalog {
    pub fn new(db: Database, tz: FixedOffset) -> Self {
        Self { db, tz }
    }

    /// Create the products table if it does not exist yet.
    pub async fn ensure_schema(&self) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS products (
                id BIGSERIAL PRIMARY KEY,
                platform VARCHAR NOT NULL,
                external_id VARCHAR NOT NULL,
                title TEXT NOT NULL,
                image TEXT,
                link TEXT NOT NULL,
                category VARCHAR NOT NULL,
                price_history JSONB NOT NULL DEFAULT '[]',
                version BIGINT NOT NULL DEFAULT 0,
                updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
                UNIQUE (platform, external_id)
            )
            "#,
        )
        .execute(self.db.pool())
        .await
        .map_err(store_err)?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_products_category ON products (category)")
            .execute(self.db.pool())
            .await
            .map_err(store_err)?;

        Ok(())
    }

    async fn fetch_row(
        &self,
        identity: &ProductIdentity,
    ) -> Result<Option<ProductRow>, StoreError> {
        sqlx::query_as::<_, ProductRow>(&format!(
            "SELECT {SELECT_COLUMNS} FROM products WHERE platform = $1 AND external_id = $2"
        ))
        .bind(identity.platform.as_str())
        .bind(&identity.external_id)
        .fetch_optional(self.db.pool())
        .await
        .map_err(store_err)
    }

    /// First sight of an identity: insert with a one-entry history.
    /// Returns `false` when a concurrent writer created the row first.
    async fn try_insert(
        &self,
        identity: &ProductIdentity,
        meta: &ProductMeta,
        history: &PriceHistory,
    ) -> Result<bool, StoreError> {
        let history_json = to_json(history)?;
        let result = sqlx::query(
            r#"
            INSERT INTO products (platform, external_id, title, image, link, category, price_history)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            ON CONFLICT (platform, external_id) DO NOTHING
            "#,
        )
        .bind(identity.platform.as_str())
        .bind(&identity.external_id)
        .bind(&meta.title)
        .bind(meta.image.as_deref())
        .bind(&meta.link)
        .bind(&meta.category)
        .bind(history_json)
        .execute(self.db.pool())
        .await
        .map_err(store_err)?;

        Ok(result.rows_affected() == 1)
    }

    /// Conditional write-back: only lands if nobody moved the version.
    async fn try_update(
        &self,
        identity: &ProductIdentity,
        meta: &ProductMeta,
        history: &PriceHistory,
        expected_version: i64,
    ) -> Result<bool, StoreError> {
        let history_json = to_json(history)?;
        let result = sqlx::query(
            r#"
            UPDATE products
            SET title = $1, image = $2, link = $3, price_history = $4,
                version = version + 1, updated_at = NOW()
            WHERE platform = $5 AND external_id = $6 AND version = $7
            "#,
        )
        .bind(&meta.title)
        .bind(meta.image.as_deref())
        .bind(&meta.link)
        .bind(history_json)
        .bind(identity.platform.as_str())
        .bind(&identity.external_id)
        .bind(expected_version)
        .execute(self.db.pool())
        .await
        .map_err(store_err)?;

        Ok(result.rows_affected() == 1)
    }
}

#[async_trait]
impl CatalogStore for PgCatalog {
    async fn upsert(
        &self,
        identity: &ProductIdentity,
        meta: &ProductMeta,
        snapshot: PriceSnapshot,
    ) -> Result<UpsertResult, StoreError> {
        for _ in 0..UPSERT_ATTEMPTS {
            match self.fetch_row(identity).await? {
                None => {
                    let mut history = PriceHistory::new();
                    let outcome = history.upsert(snapshot.clone(), self.tz);
                    if !self.try_insert(identity, meta, &history).await? {
                        // Someone else created the row; reread and update.
                        continue;
                    }
                    return Ok(UpsertResult {
                        product: Product {
                            identity: identity.clone(),
                            title: meta.title.clone(),
                            image: meta.image.clone(),
                            link: meta.link.clone(),
                            category: meta.category.clone(),
                            history,
                        },
                        outcome,
                    });
                }
                Some(row) => {
                    let category = row.category.clone();
                    let version = row.version;
                    let mut history: PriceHistory = serde_json::from_value(row.price_history)
                        .map_err(|e| {
                            StoreError::Unavailable(format!("corrupt price history: {e}"))
                        })?;
                    let outcome = history.upsert(snapshot.clone(), self.tz);
                    // Metadata is refreshed even on an Unchanged ledger
                    // outcome; the listing itself was admitted.
                    if !self.try_update(identity, meta, &history, version).await? {
                        continue;
                    }
                    return Ok(UpsertResult {
                        product: Product {
                            identity: identity.clone(),
                            title: meta.title.clone(),
                            image: meta.image.clone(),
                            link: meta.link.clone(),
                            category,
                            history,
                        },
                        outcome,
                    });
                }
            }
        }
        Err(StoreError::Conflict(identity.to_string()))
    }

    async fn get(&self, identity: &ProductIdentity) -> Result<Option<Product>, StoreError> {
        self.fetch_row(identity)
            .await?
            .map(ProductRow::into_product)
            .transpose()
    }

    async fn list(&self, filter: &ProductFilter) -> Result<Vec<Product>, StoreError> {
        let rows = sqlx::query_as::<_, ProductRow>(&format!(
            r#"
            SELECT {SELECT_COLUMNS} FROM products
            WHERE ($1::varchar IS NULL OR platform = $1)
              AND ($2::varchar IS NULL OR category = $2)
            ORDER BY platform, external_id
            "#
        ))
        .bind(filter.platform.map(|p| p.as_str()))
        .bind(filter.category.as_deref())
        .fetch_all(self.db.pool())
        .await
        .map_err(store_err)?;

        let mut products = Vec::with_capacity(rows.len());
        for row in rows {
            let product = row.into_product()?;
            if filter.matches(&product) {
                products.push(product);
            }
        }
        Ok(products)
    }

    async fn history(
        &self,
        identity: &ProductIdentity,
    ) -> Result<Option<PriceHistory>, StoreError> {
        Ok(self.get(identity).await?.map(|p| p.history))
    }
}

fn store_err(e: sqlx::Error) -> StoreError {
    StoreError::Unavailable(e.to_string())
}

fn to_json(history: &PriceHistory) -> Result<serde_json::Value, StoreError> {
    serde_json::to_value(history).map_err(|e| StoreError::Unavailable(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::history::LedgerOutcome;
    use crate::Config;
    use chrono::Utc;
    use rust_decimal_macros::dec;
    use uuid::Uuid;

    fn ist() -> FixedOffset {
        FixedOffset::east_opt(5 * 3600 + 30 * 60).unwrap()
    }

    async fn connect() -> PgCatalog {
        let config = Config::from_env().expect("Config should load");
        let url = config.require_database_url().expect("DATABASE_URL set");
        let db = Database::connect(url).await.expect("DB should connect");
        let catalog = PgCatalog::new(db, ist());
        catalog.ensure_schema().await.expect("Schema should apply");
        catalog
    }

    fn snapshot(price: rust_decimal::Decimal) -> PriceSnapshot {
        PriceSnapshot {
            price,
            reference_price: dec!(1000),
            discount_percent: 50,
            observed_at: Utc::now(),
        }
    }

    #[tokio::test]
    #[ignore = "requires a live Postgres at DATABASE_URL"]
    async fn test_upsert_create_then_lowest_wins() {
        let catalog = connect().await;
        let identity =
            ProductIdentity::new(Platform::Amazon, format!("T{}", Uuid::new_v4().simple()));
        let meta = ProductMeta {
            title: "Test product".to_string(),
            image: None,
            link: "https://www.amazon.in/dp/TEST".to_string(),
            category: "laptops".to_string(),
        };

        let created = catalog
            .upsert(&identity, &meta, snapshot(dec!(500)))
            .await
            .expect("Insert should succeed");
        assert_eq!(created.outcome, LedgerOutcome::Appended);

        let unchanged = catalog
            .upsert(&identity, &meta, snapshot(dec!(600)))
            .await
            .expect("Second upsert should succeed");
        assert_eq!(unchanged.outcome, LedgerOutcome::Unchanged);

        let replaced = catalog
            .upsert(&identity, &meta, snapshot(dec!(400)))
            .await
            .expect("Third upsert should succeed");
        assert_eq!(replaced.outcome, LedgerOutcome::ReplacedLower);
        assert_eq!(replaced.product.history.len(), 1);
        assert_eq!(replaced.product.history.entries()[0].price, dec!(400));

        // Category survives a re-scrape under a different category.
        let moved = ProductMeta {
            category: "mobiles".to_string(),
            ..meta
        };
        let result = catalog
            .upsert(&identity, &moved, snapshot(dec!(400)))
            .await
            .expect("Upsert should succeed");
        assert_eq!(result.product.category, "laptops");

        sqlx::query("DELETE FROM products WHERE platform = $1 AND external_id = $2")
            .bind(identity.platform.as_str())
            .bind(&identity.external_id)
            .execute(catalog.db.pool())
            .await
            .expect("Cleanup should succeed");
    }
}
