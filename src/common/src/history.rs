//! Bounded per-product price history with one-entry-per-day semantics.

use chrono::{DateTime, FixedOffset, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Maximum retained snapshots per product. Oldest entries are evicted
/// first, keeping "current price" an O(1) read with no join.
pub const MAX_ENTRIES: usize = 90;

/// One price observation. Immutable once recorded; a cheaper same-day
/// scrape replaces the day's entry rather than mutating history shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceSnapshot {
    pub price: Decimal,
    pub reference_price: Decimal,
    pub discount_percent: i32,
    pub observed_at: DateTime<Utc>,
}

/// Outcome of a ledger upsert, reported to callers so a no-write is
/// distinguishable from a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LedgerOutcome {
    /// First observation for this calendar day: appended.
    Appended,
    /// The day's entry was replaced by a strictly lower price.
    ReplacedLower,
    /// The day's entry already holds an equal or lower price; no write.
    Unchanged,
}

/// Time-ordered, day-deduplicated snapshot log for one product.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PriceHistory {
    entries: Vec<PriceSnapshot>,
}

impl PriceHistory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entries(&self) -> &[PriceSnapshot] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Most recent snapshot, i.e. the product's current price.
    pub fn latest(&self) -> Option<&PriceSnapshot> {
        self.entries.last()
    }

    /// Apply the "one entry per calendar day, keep the lowest" rule.
    ///
    /// The day is computed in `tz`, the aggregator's reference timezone.
    /// On a same-day replace the original entry's `observed_at` is
    /// preserved; only price, reference price, and discount move.
    pub fn upsert(&mut self, snapshot: PriceSnapshot, tz: FixedOffset) -> LedgerOutcome {
        let day = calendar_day(snapshot.observed_at, tz);
        if let Some(existing) = self
            .entries
            .iter_mut()
            .find(|entry| calendar_day(entry.observed_at, tz) == day)
        {
            if snapshot.price < existing.price {
                existing.price = snapshot.price;
                existing.reference_price = snapshot.reference_price;
                existing.discount_percent = snapshot.discount_percent;
                LedgerOutcome::ReplacedLower
            } else {
                LedgerOutcome::Unchanged
            }
        } else {
            self.entries.push(snapshot);
            // Keep entries non-decreasing in observed_at even if a delayed
            // batch delivers an older day late.
            let n = self.entries.len();
            if n >= 2 && self.entries[n - 1].observed_at < self.entries[n - 2].observed_at {
                self.entries.sort_by_key(|entry| entry.observed_at);
            }
            if self.entries.len() > MAX_ENTRIES {
                let excess = self.entries.len() - MAX_ENTRIES;
                self.entries.drain(..excess);
            }
            LedgerOutcome::Appended
        }
    }
}

fn calendar_day(at: DateTime<Utc>, tz: FixedOffset) -> NaiveDate {
    at.with_timezone(&tz).date_naive()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};
    use rust_decimal_macros::dec;

    fn ist() -> FixedOffset {
        FixedOffset::east_opt(5 * 3600 + 30 * 60).unwrap()
    }

    fn snapshot(price: Decimal, observed_at: DateTime<Utc>) -> PriceSnapshot {
        PriceSnapshot {
            price,
            reference_price: dec!(1000),
            discount_percent: 50,
            observed_at,
        }
    }

    fn at(y: i32, m: u32, d: u32, h: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, h, 0, 0).unwrap()
    }

    #[test]
    fn test_upsert_is_idempotent() {
        let mut history = PriceHistory::new();
        let snap = snapshot(dec!(500), at(2024, 6, 1, 9));

        assert_eq!(history.upsert(snap.clone(), ist()), LedgerOutcome::Appended);
        assert_eq!(history.upsert(snap, ist()), LedgerOutcome::Unchanged);
        assert_eq!(history.len(), 1);
    }

    #[test]
    fn test_lowest_price_of_day_wins() {
        let mut history = PriceHistory::new();
        history.upsert(snapshot(dec!(500), at(2024, 6, 1, 9)), ist());

        // Higher same-day price is a no-op.
        assert_eq!(
            history.upsert(snapshot(dec!(600), at(2024, 6, 1, 12)), ist()),
            LedgerOutcome::Unchanged
        );
        assert_eq!(history.entries()[0].price, dec!(500));

        // Lower same-day price replaces the entry.
        assert_eq!(
            history.upsert(snapshot(dec!(400), at(2024, 6, 1, 15)), ist()),
            LedgerOutcome::ReplacedLower
        );
        assert_eq!(history.len(), 1);
        assert_eq!(history.entries()[0].price, dec!(400));
    }

    #[test]
    fn test_replace_preserves_original_observed_at() {
        let mut history = PriceHistory::new();
        let first_seen = at(2024, 6, 1, 9);
        history.upsert(snapshot(dec!(500), first_seen), ist());
        history.upsert(snapshot(dec!(400), at(2024, 6, 1, 18)), ist());

        assert_eq!(history.entries()[0].observed_at, first_seen);
        assert_eq!(history.entries()[0].price, dec!(400));
    }

    #[test]
    fn test_day_boundary_uses_reference_timezone() {
        let mut history = PriceHistory::new();
        // 20:00 UTC is already the next day in IST (+05:30)...
        history.upsert(snapshot(dec!(500), at(2024, 6, 1, 20)), ist());
        // ...so 02:00 UTC on June 2 lands on the same IST day.
        assert_eq!(
            history.upsert(snapshot(dec!(450), at(2024, 6, 2, 2)), ist()),
            LedgerOutcome::ReplacedLower
        );
        assert_eq!(history.len(), 1);
    }

    #[test]
    fn test_history_is_bounded_to_90_most_recent_days() {
        let mut history = PriceHistory::new();
        let start = at(2024, 1, 1, 10);
        for day in 0..95 {
            let outcome = history.upsert(
                snapshot(dec!(500), start + Duration::days(day)),
                ist(),
            );
            assert_eq!(outcome, LedgerOutcome::Appended);
        }

        assert_eq!(history.len(), MAX_ENTRIES);
        // The 5 oldest days were evicted.
        assert_eq!(
            history.entries()[0].observed_at,
            start + Duration::days(5)
        );
        assert_eq!(
            history.latest().unwrap().observed_at,
            start + Duration::days(94)
        );
    }

    #[test]
    fn test_late_arriving_older_day_keeps_order() {
        let mut history = PriceHistory::new();
        history.upsert(snapshot(dec!(500), at(2024, 6, 3, 10)), ist());
        history.upsert(snapshot(dec!(480), at(2024, 6, 1, 10)), ist());

        let times: Vec<_> = history.entries().iter().map(|e| e.observed_at).collect();
        let mut sorted = times.clone();
        sorted.sort();
        assert_eq!(times, sorted);
    }
}
