//! Price text cleaning, discount arithmetic, and the admission policy.

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};
use std::str::FromStr;

/// Strip currency symbols and thousands separators from scraped price
/// text ("₹1,299.50" → 1299.50). Returns `None` when nothing numeric
/// remains; callers treat that as a 0/0 pair, which yields a 0% discount.
pub fn clean_price_text(raw: &str) -> Option<Decimal> {
    let cleaned: String = raw
        .chars()
        .filter(|c| c.is_ascii_digit() || *c == '.')
        .collect();
    if cleaned.is_empty() {
        return None;
    }
    Decimal::from_str(&cleaned).ok()
}

/// Discount percentage: `round(100 * (1 - price / reference_price))`.
///
/// A zero or negative reference price yields 0 rather than an error; the
/// scrape simply carried no usable MRP.
pub fn calculate_discount(price: Decimal, reference_price: Decimal) -> i32 {
    if reference_price <= Decimal::ZERO {
        return 0;
    }
    let pct = (Decimal::ONE - price / reference_price) * Decimal::ONE_HUNDRED;
    pct.round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero)
        .to_i32()
        .unwrap_or(0)
}

/// Admission threshold for one ingestion batch.
///
/// Built fresh by the caller before each batch (the settings store it
/// comes from is external); every listing in the batch is judged against
/// the same value, so threshold staleness is bounded by batch cadence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AdmissionPolicy {
    pub discount_threshold: i32,
}

impl AdmissionPolicy {
    pub fn new(discount_threshold: i32) -> Self {
        Self { discount_threshold }
    }

    /// A listing is worth recording when its discount meets the threshold.
    pub fn admits(&self, discount: i32) -> bool {
        discount >= self.discount_threshold
    }
}

impl Default for AdmissionPolicy {
    fn default() -> Self {
        Self {
            discount_threshold: 80,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_clean_price_text() {
        assert_eq!(clean_price_text("₹1,299"), Some(dec!(1299)));
        assert_eq!(clean_price_text("₹1,299.50"), Some(dec!(1299.50)));
        assert_eq!(clean_price_text(" 450 "), Some(dec!(450)));
        assert_eq!(clean_price_text("N/A"), None);
        assert_eq!(clean_price_text(""), None);
        assert_eq!(clean_price_text("1.2.3"), None);
    }

    #[test]
    fn test_discount_correctness() {
        assert_eq!(calculate_discount(dec!(80), dec!(100)), 20);
        assert_eq!(calculate_discount(dec!(100), dec!(0)), 0);
        assert_eq!(calculate_discount(dec!(0), dec!(100)), 100);
    }

    #[test]
    fn test_discount_rounds_half_away_from_zero() {
        // 1 - 79.5/100 = 20.5% → 21, not banker's 20.
        assert_eq!(calculate_discount(dec!(79.5), dec!(100)), 21);
    }

    #[test]
    fn test_discount_can_go_negative_on_markup() {
        assert_eq!(calculate_discount(dec!(150), dec!(100)), -50);
    }

    #[test]
    fn test_admission_boundary() {
        let policy = AdmissionPolicy::new(80);
        assert!(policy.admits(80));
        assert!(!policy.admits(79));
        assert!(policy.admits(100));
    }
}
