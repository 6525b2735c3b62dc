//! Retail platform identification.
//!
//! A closed enum instead of the free-form platform strings adapters
//! pass around, so adding a platform forces every match to be revisited.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Supported retail platforms.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    Amazon,
    Flipkart,
    Jiomart,
    Zepto,
    Bigbasket,
}

impl Platform {
    pub const ALL: [Platform; 5] = [
        Platform::Amazon,
        Platform::Flipkart,
        Platform::Jiomart,
        Platform::Zepto,
        Platform::Bigbasket,
    ];

    /// Get the platform name as a string for storage and wire use.
    pub fn as_str(&self) -> &'static str {
        match self {
            Platform::Amazon => "amazon",
            Platform::Flipkart => "flipkart",
            Platform::Jiomart => "jiomart",
            Platform::Zepto => "zepto",
            Platform::Bigbasket => "bigbasket",
        }
    }

    /// Parse platform from string.
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "amazon" => Some(Platform::Amazon),
            "flipkart" => Some(Platform::Flipkart),
            "jiomart" => Some(Platform::Jiomart),
            "zepto" => Some(Platform::Zepto),
            "bigbasket" => Some(Platform::Bigbasket),
            _ => None,
        }
    }

    /// Short tag used as the product id prefix, e.g. `amzn-B08N5HR36W`.
    pub fn prefix(&self) -> &'static str {
        match self {
            Platform::Amazon => "amzn",
            Platform::Flipkart => "fk",
            Platform::Jiomart => "jm",
            Platform::Zepto => "zepto",
            Platform::Bigbasket => "bb",
        }
    }

    /// Storefront origin used to absolutize relative listing links.
    pub fn base_url(&self) -> &'static str {
        match self {
            Platform::Amazon => "https://www.amazon.in",
            Platform::Flipkart => "https://www.flipkart.com",
            Platform::Jiomart => "https://www.jiomart.com",
            Platform::Zepto => "https://www.zeptonow.com",
            Platform::Bigbasket => "https://www.bigbasket.com",
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_platform_from_str() {
        assert_eq!(Platform::from_str("amazon"), Some(Platform::Amazon));
        assert_eq!(Platform::from_str("Flipkart"), Some(Platform::Flipkart));
        assert_eq!(Platform::from_str("JIOMART"), Some(Platform::Jiomart));
        assert_eq!(Platform::from_str("zepto"), Some(Platform::Zepto));
        assert_eq!(Platform::from_str("bigbasket"), Some(Platform::Bigbasket));
        assert_eq!(Platform::from_str("myntra"), None);
    }

    #[test]
    fn test_as_str_round_trips() {
        for platform in Platform::ALL {
            assert_eq!(Platform::from_str(platform.as_str()), Some(platform));
        }
    }

    #[test]
    fn test_prefixes_are_distinct() {
        let mut prefixes: Vec<&str> = Platform::ALL.iter().map(|p| p.prefix()).collect();
        prefixes.sort();
        prefixes.dedup();
        assert_eq!(prefixes.len(), Platform::ALL.len());
    }
}
