//! Product identity resolution from listing URLs.
//!
//! The same physical product surfaces through many listing URLs: organic
//! results, sponsored redirects, category pages. Each platform encodes a
//! canonical reference somewhere in the URL; this module extracts it so
//! every appearance of a product maps to one catalog entry.

use serde::{Deserialize, Serialize};
use std::fmt;
use url::Url;
use uuid::Uuid;

use crate::platform::Platform;

/// Stable, platform-qualified product key.
///
/// A value, not a reference: recomputed from the raw link on every scrape
/// and never stored as a foreign pointer.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ProductIdentity {
    pub platform: Platform,
    pub external_id: String,
}

impl ProductIdentity {
    pub fn new(platform: Platform, external_id: impl Into<String>) -> Self {
        Self {
            platform,
            external_id: external_id.into(),
        }
    }
}

impl fmt::Display for ProductIdentity {
    /// Renders as `{prefix}-{externalId}`, e.g. `amzn-B08N5HR36W`.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.platform.prefix(), self.external_id)
    }
}

/// Resolve a raw listing link to a product identity.
///
/// The platform tag is supplied by the adapter that scraped the listing,
/// never inferred from the URL. Returns `None` when no platform rule
/// matches ("unresolvable"); callers log and skip such listings.
pub fn resolve(raw_link: &str, platform: Platform) -> Option<ProductIdentity> {
    let url = parse_listing_url(raw_link, platform)?;
    let external_id = match platform {
        Platform::Amazon => resolve_amazon(&url),
        Platform::Flipkart => resolve_flipkart(&url),
        Platform::Jiomart | Platform::Zepto | Platform::Bigbasket => last_id_segment(&url),
    }?;
    Some(ProductIdentity::new(platform, external_id))
}

/// Absolutize a listing link against the platform storefront.
///
/// Adapters capture hrefs as-is; relative ones need the origin restored
/// before they are stored as a product's canonical link.
pub fn canonical_link(raw_link: &str, platform: Platform) -> String {
    match parse_listing_url(raw_link, platform) {
        Some(url) => url.into(),
        None => raw_link.to_string(),
    }
}

fn parse_listing_url(raw: &str, platform: Platform) -> Option<Url> {
    match Url::parse(raw) {
        Ok(url) => Some(url),
        Err(url::ParseError::RelativeUrlWithoutBase) => {
            Url::parse(platform.base_url()).ok()?.join(raw).ok()
        }
        Err(_) => None,
    }
}

fn resolve_amazon(url: &Url) -> Option<String> {
    // Sponsored results link through /sspa/click?url=<encoded listing path>.
    if url.path().starts_with("/sspa/click") {
        let inner = url
            .query_pairs()
            .find(|(key, _)| key == "url")
            .map(|(_, value)| value.into_owned())?;
        let unwrapped = parse_listing_url(&inner, Platform::Amazon)?;
        return asin_from_path(&unwrapped);
    }
    asin_from_path(url)
}

/// Match `/dp/{ASIN}` or `/gp/product/{ASIN}` anywhere in the path.
fn asin_from_path(url: &Url) -> Option<String> {
    let segments: Vec<&str> = url.path_segments()?.collect();
    for (i, segment) in segments.iter().enumerate() {
        let candidate = match *segment {
            "dp" => segments.get(i + 1),
            "product" if i > 0 && segments[i - 1] == "gp" => segments.get(i + 1),
            _ => None,
        };
        if let Some(id) = candidate {
            if is_alnum_of_len(id, 10) {
                return Some((*id).to_string());
            }
        }
    }
    None
}

fn resolve_flipkart(url: &Url) -> Option<String> {
    // The pid query parameter is the canonical reference when present.
    if let Some((_, pid)) = url.query_pairs().find(|(key, _)| key == "pid") {
        if !pid.is_empty() {
            return Some(pid.into_owned());
        }
    }
    // Fallback: the 16-char item id segment after /{slug}/p/.
    let segments: Vec<&str> = url.path_segments()?.collect();
    segments
        .iter()
        .position(|segment| *segment == "p")
        .and_then(|i| segments.get(i + 1))
        .filter(|segment| is_alnum_of_len(segment, 16))
        .map(|segment| (*segment).to_string())
}

/// Last numeric or UUID-like path segment (JioMart item ids, Zepto
/// variant UUIDs, BigBasket product numbers).
fn last_id_segment(url: &Url) -> Option<String> {
    url.path_segments()?
        .rev()
        .find(|segment| is_numeric(segment) || is_uuid_like(segment))
        .map(|segment| segment.to_string())
}

fn is_alnum_of_len(s: &str, len: usize) -> bool {
    s.len() == len && s.bytes().all(|b| b.is_ascii_alphanumeric())
}

fn is_numeric(s: &str) -> bool {
    !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit())
}

fn is_uuid_like(s: &str) -> bool {
    Uuid::parse_str(s).is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_amazon_dp_link() {
        let identity = resolve(
            "https://www.amazon.in/Sony-WH-1000XM4-Cancelling-Headphones/dp/B08N5HR36W/ref=sr_1_3?keywords=headphones",
            Platform::Amazon,
        )
        .unwrap();
        assert_eq!(identity.external_id, "B08N5HR36W");
        assert_eq!(identity.to_string(), "amzn-B08N5HR36W");
    }

    #[test]
    fn test_amazon_gp_product_link() {
        let identity = resolve(
            "https://www.amazon.in/gp/product/B09G9FPHY6",
            Platform::Amazon,
        )
        .unwrap();
        assert_eq!(identity.external_id, "B09G9FPHY6");
    }

    #[test]
    fn test_amazon_sponsored_redirect_matches_direct_link() {
        // Same ASIN behind a sponsored click redirect must resolve to the
        // same identity as the organic link.
        let direct = resolve(
            "https://www.amazon.in/Sony-WH-1000XM4/dp/B08N5HR36W/",
            Platform::Amazon,
        )
        .unwrap();
        let sponsored = resolve(
            "/sspa/click?ie=UTF8&spc=MTo1MjM0&url=%2FSony-WH-1000XM4%2Fdp%2FB08N5HR36W%2Fref%3Dsr_1_1_sspa",
            Platform::Amazon,
        )
        .unwrap();
        assert_eq!(direct, sponsored);
    }

    #[test]
    fn test_amazon_search_page_is_unresolvable() {
        assert_eq!(resolve("https://www.amazon.in/s?k=laptops", Platform::Amazon), None);
    }

    #[test]
    fn test_flipkart_pid_query_param_wins() {
        let identity = resolve(
            "https://www.flipkart.com/samsung-galaxy-m14/p/itm6f8120ba2f70a?pid=MOBG6FW5S6J7G2DS&lid=LST123",
            Platform::Flipkart,
        )
        .unwrap();
        assert_eq!(identity.external_id, "MOBG6FW5S6J7G2DS");
        assert_eq!(identity.to_string(), "fk-MOBG6FW5S6J7G2DS");
    }

    #[test]
    fn test_flipkart_path_segment_fallback() {
        let identity = resolve(
            "/samsung-galaxy-m14/p/itm6f8120ba2f70a",
            Platform::Flipkart,
        )
        .unwrap();
        assert_eq!(identity.external_id, "itm6f8120ba2f70a");
    }

    #[test]
    fn test_flipkart_without_any_id_is_unresolvable() {
        assert_eq!(
            resolve("https://www.flipkart.com/search?q=jeans", Platform::Flipkart),
            None
        );
    }

    #[test]
    fn test_jiomart_numeric_segment() {
        let identity = resolve(
            "https://www.jiomart.com/p/groceries/tata-salt-1-kg/590000017",
            Platform::Jiomart,
        )
        .unwrap();
        assert_eq!(identity.to_string(), "jm-590000017");
    }

    #[test]
    fn test_zepto_uuid_segment() {
        let identity = resolve(
            "https://www.zeptonow.com/pn/amul-taaza-toned-milk/pvid/6e7b2f6a-7e9c-4c8f-9a1a-2b6f5d8e4c3d",
            Platform::Zepto,
        )
        .unwrap();
        assert_eq!(
            identity.external_id,
            "6e7b2f6a-7e9c-4c8f-9a1a-2b6f5d8e4c3d"
        );
    }

    #[test]
    fn test_bigbasket_numeric_before_slug() {
        // The id segment is not always last in the path.
        let identity = resolve(
            "https://www.bigbasket.com/pd/40075836/fresho-banana-robusta/",
            Platform::Bigbasket,
        )
        .unwrap();
        assert_eq!(identity.to_string(), "bb-40075836");
    }

    #[test]
    fn test_garbage_link_is_unresolvable() {
        assert_eq!(resolve("not a url at all", Platform::Jiomart), None);
        assert_eq!(resolve("", Platform::Amazon), None);
    }

    #[test]
    fn test_canonical_link_absolutizes_relative_href() {
        assert_eq!(
            canonical_link("/samsung-galaxy-m14/p/itm6f8120ba2f70a", Platform::Flipkart),
            "https://www.flipkart.com/samsung-galaxy-m14/p/itm6f8120ba2f70a"
        );
    }
}
