//! Price/description metadata service.
//!
//! The resolver consumes this through a narrow trait: one asset-list
//! fetch shared per pipeline window, plus a per-asset detail lookup.
//! Both may fail or return "not found"; callers fall back to a default
//! price of 1 and a placeholder description.

pub mod coingecko;

use async_trait::async_trait;

use crate::errors::TransportError;

/// One entry of the service's asset universe.
#[derive(Debug, Clone)]
pub struct AssetListing {
    pub id: String,
    pub symbol: String,
}

/// Detail payload for a single asset.
#[derive(Debug, Clone, Default)]
pub struct AssetDetail {
    pub description: Option<String>,
    pub price_usd: Option<f64>,
}

#[async_trait]
pub trait MetadataService: Send + Sync {
    /// The full symbol->id universe, fetched once per window.
    async fn list_assets(&self) -> Result<Vec<AssetListing>, TransportError>;

    /// Detail for one listed asset; `None` when the service does not
    /// know it after all.
    async fn asset_detail(&self, id: &str) -> Result<Option<AssetDetail>, TransportError>;
}

/// Case-insensitive symbol match against the shared asset list.
pub fn find_listing<'a>(listings: &'a [AssetListing], symbol: &str) -> Option<&'a AssetListing> {
    listings
        .iter()
        .find(|l| l.symbol.eq_ignore_ascii_case(symbol))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_find_listing_ignores_case() {
        let listings = vec![
            AssetListing {
                id: "dai".into(),
                symbol: "DAI".into(),
            },
            AssetListing {
                id: "wrapped-bitcoin".into(),
                symbol: "wbtc".into(),
            },
        ];
        assert_eq!(find_listing(&listings, "dai").unwrap().id, "dai");
        assert_eq!(
            find_listing(&listings, "WBTC").unwrap().id,
            "wrapped-bitcoin"
        );
        assert!(find_listing(&listings, "yfi").is_none());
    }
}
