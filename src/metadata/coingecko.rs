//! CoinGecko-backed [`MetadataService`].

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

use super::{AssetDetail, AssetListing, MetadataService};
use crate::errors::TransportError;

pub struct CoingeckoClient {
    client: Client,
    base_url: String,
}

#[derive(Debug, Deserialize)]
struct CoinListEntry {
    id: String,
    symbol: String,
}

#[derive(Debug, Deserialize)]
struct CoinDetail {
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    description: Option<CoinDescription>,
    #[serde(default)]
    market_data: Option<CoinMarketData>,
}

#[derive(Debug, Deserialize)]
struct CoinDescription {
    #[serde(default)]
    en: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CoinMarketData {
    #[serde(default)]
    current_price: Option<CoinPrices>,
}

#[derive(Debug, Deserialize)]
struct CoinPrices {
    #[serde(default)]
    usd: Option<f64>,
}

impl CoingeckoClient {
    pub fn new(base_url: String) -> Result<Self, TransportError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(10))
            .user_agent("yieldscope/0.1")
            .build()
            .map_err(|e| TransportError::new(format!("failed to build HTTP client: {e}")))?;

        Ok(Self { client, base_url })
    }
}

#[async_trait]
impl MetadataService for CoingeckoClient {
    async fn list_assets(&self) -> Result<Vec<AssetListing>, TransportError> {
        let url = format!("{}/coins/list", self.base_url);
        let entries: Vec<CoinListEntry> = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| TransportError::new(format!("coin list request failed: {e}")))?
            .json()
            .await
            .map_err(|e| TransportError::new(format!("coin list parse failed: {e}")))?;

        debug!(assets = entries.len(), "fetched asset list");

        Ok(entries
            .into_iter()
            .map(|e| AssetListing {
                id: e.id,
                symbol: e.symbol,
            })
            .collect())
    }

    async fn asset_detail(&self, id: &str) -> Result<Option<AssetDetail>, TransportError> {
        let url = format!("{}/coins/{}", self.base_url, id);
        let detail: CoinDetail = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| TransportError::new(format!("coin detail request failed: {e}")))?
            .json()
            .await
            .map_err(|e| TransportError::new(format!("coin detail parse failed: {e}")))?;

        if detail.error.is_some() {
            return Ok(None);
        }

        let description = detail
            .description
            .and_then(|d| d.en)
            .filter(|d| !d.is_empty());
        let price_usd = detail
            .market_data
            .and_then(|m| m.current_price)
            .and_then(|p| p.usd);

        Ok(Some(AssetDetail {
            description,
            price_usd,
        }))
    }
}
