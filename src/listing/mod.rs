//! Vault listing feed.
//!
//! Supplies the initial vault universe from the public registry:
//! endorsed vaults only, zap entries dropped, strategy name/address
//! pairs backfilled from a second registry endpoint when the listing
//! carries none. Consumed once per pipeline invocation.

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, warn};

use crate::errors::TransportError;
use crate::models::{norm_addr, Strategy, TokenMetadata, Vault, VaultKind};

/// Sushiswap LP pair vault; its deposit token has no working pool
/// accessors, so the registry entry is skipped.
const EXCLUDED_VAULTS: &[&str] = &["0xbD17B1ce622d73bD438b9E658acA5996dc394b0d"];

/// The DAO fee-claim vault is listed as a plain vault but behaves as a
/// lockup; reclassified here, matching its actual interface.
const LOCKUP_VAULT: &str = "0xc5bDdf9843308380375a611c18B50Fb9341f502A";

#[async_trait]
pub trait VaultListingFeed: Send + Sync {
    async fn fetch_vaults(&self) -> Result<Vec<Vault>, TransportError>;
}

#[derive(Debug, Deserialize)]
pub struct RawTokenListing {
    pub address: String,
    pub symbol: String,
    pub decimals: u32,
    #[serde(default, alias = "displayName")]
    pub display_name: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct RawVaultListing {
    pub address: String,
    #[serde(rename = "type", default)]
    pub kind: Option<String>,
    #[serde(default)]
    pub endorsed: bool,
    pub decimals: u32,
    pub token: RawTokenListing,
    #[serde(default, alias = "displayName")]
    pub display_name: Option<String>,
    #[serde(default)]
    pub strategies: Vec<RawStrategyListing>,
}

#[derive(Debug, Deserialize)]
pub struct RawStrategyListing {
    pub address: String,
    pub name: String,
}

/// Per-vault strategy record from the secondary registry endpoint.
#[derive(Debug, Deserialize)]
pub struct RegistryEntry {
    pub address: String,
    #[serde(alias = "strategyName")]
    pub strategy_name: String,
    #[serde(alias = "strategyAddress")]
    pub strategy_address: String,
}

fn parse_kind(raw: Option<&str>) -> VaultKind {
    match raw.map(|s| s.to_ascii_lowercase()).as_deref() {
        Some("v1") => VaultKind::V1,
        Some("earn") => VaultKind::Earn,
        Some("lockup") => VaultKind::Lockup,
        // v2 and anything the registry invents later
        _ => VaultKind::V2,
    }
}

/// Map the raw registry payloads into vault records, applying the feed
/// filters and strategy backfill.
pub fn build_vaults(listings: Vec<RawVaultListing>, registry: &[RegistryEntry]) -> Vec<Vault> {
    let excluded: Vec<String> = EXCLUDED_VAULTS.iter().map(|a| norm_addr(a)).collect();
    let lockup = norm_addr(LOCKUP_VAULT);

    listings
        .into_iter()
        .filter(|v| v.endorsed)
        .filter(|v| v.kind.as_deref() != Some("zap"))
        .filter(|v| !excluded.contains(&norm_addr(&v.address)))
        .map(|raw| {
            let address = norm_addr(&raw.address);
            let kind = if address == lockup {
                VaultKind::Lockup
            } else {
                parse_kind(raw.kind.as_deref())
            };

            let token_display = raw
                .token
                .display_name
                .clone()
                .unwrap_or_else(|| raw.token.symbol.clone());
            let display_name = raw.display_name.clone().unwrap_or_else(|| token_display.clone());

            let mut strategies: Vec<Strategy> = raw
                .strategies
                .iter()
                .map(|s| Strategy::new(&norm_addr(&s.address), &s.name))
                .collect();

            if strategies.is_empty() {
                if let Some(entry) = registry
                    .iter()
                    .find(|e| norm_addr(&e.address) == address)
                {
                    strategies.push(Strategy::new(
                        &norm_addr(&entry.strategy_address),
                        &entry.strategy_name,
                    ));
                }
            }

            Vault {
                address,
                display_name,
                kind,
                decimals: raw.decimals,
                token: TokenMetadata {
                    address: norm_addr(&raw.token.address),
                    symbol: raw.token.symbol,
                    decimals: raw.token.decimals,
                    display_name: token_display,
                },
                price_per_share: 0.0,
                strategies,
                deposit_token: None,
                tvl: None,
            }
        })
        .collect()
}

pub struct HttpVaultListingFeed {
    client: Client,
    vaults_api: String,
    registry_api: String,
}

impl HttpVaultListingFeed {
    pub fn new(vaults_api: String, registry_api: String) -> Result<Self, TransportError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(15))
            .user_agent("yieldscope/0.1")
            .build()
            .map_err(|e| TransportError::new(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            vaults_api,
            registry_api,
        })
    }
}

#[async_trait]
impl VaultListingFeed for HttpVaultListingFeed {
    async fn fetch_vaults(&self) -> Result<Vec<Vault>, TransportError> {
        let listings: Vec<RawVaultListing> = self
            .client
            .get(&self.vaults_api)
            .send()
            .await
            .map_err(|e| TransportError::new(format!("vault listing request failed: {e}")))?
            .json()
            .await
            .map_err(|e| TransportError::new(format!("vault listing parse failed: {e}")))?;

        // Strategy backfill is best-effort; an empty registry only
        // leaves some vaults without strategies.
        let registry: Vec<RegistryEntry> = match self.client.get(&self.registry_api).send().await {
            Ok(resp) => resp.json().await.unwrap_or_else(|e| {
                warn!(error = %e, "registry parse failed, continuing without backfill");
                Vec::new()
            }),
            Err(e) => {
                warn!(error = %e, "registry request failed, continuing without backfill");
                Vec::new()
            }
        };

        let vaults = build_vaults(listings, &registry);
        debug!(vaults = vaults.len(), "vault universe loaded");
        Ok(vaults)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw(address: &str, kind: &str, endorsed: bool) -> RawVaultListing {
        RawVaultListing {
            address: address.to_string(),
            kind: Some(kind.to_string()),
            endorsed,
            decimals: 18,
            token: RawTokenListing {
                address: "0x6b175474e89094c44da98b954eedeac495271d0f".into(),
                symbol: "DAI".into(),
                decimals: 18,
                display_name: Some("DAI".into()),
            },
            display_name: Some("DAI Vault".into()),
            strategies: Vec::new(),
        }
    }

    #[test]
    fn test_feed_filters() {
        let listings = vec![
            raw("0x0000000000000000000000000000000000000001", "v2", true),
            raw("0x0000000000000000000000000000000000000002", "zap", true),
            raw("0x0000000000000000000000000000000000000003", "v2", false),
            raw(super::EXCLUDED_VAULTS[0], "v2", true),
        ];
        let vaults = build_vaults(listings, &[]);
        assert_eq!(vaults.len(), 1);
        assert_eq!(
            vaults[0].address,
            "0x0000000000000000000000000000000000000001"
        );
    }

    #[test]
    fn test_lockup_reclassification() {
        let listings = vec![raw(super::LOCKUP_VAULT, "v2", true)];
        let vaults = build_vaults(listings, &[]);
        assert_eq!(vaults[0].kind, VaultKind::Lockup);
    }

    #[test]
    fn test_strategy_backfill_from_registry() {
        let listings = vec![raw("0x0000000000000000000000000000000000000001", "v1", true)];
        let registry = vec![RegistryEntry {
            address: "0x0000000000000000000000000000000000000001".into(),
            strategy_name: "StrategyDAI3pool".into(),
            strategy_address: "0x0000000000000000000000000000000000000011".into(),
        }];
        let vaults = build_vaults(listings, &registry);
        assert_eq!(vaults[0].strategies.len(), 1);
        assert_eq!(vaults[0].strategies[0].name, "StrategyDAI3pool");
    }

    #[test]
    fn test_unknown_kind_defaults_to_v2() {
        assert_eq!(parse_kind(Some("v3-experimental")), VaultKind::V2);
        assert_eq!(parse_kind(None), VaultKind::V2);
        assert_eq!(parse_kind(Some("Earn")), VaultKind::Earn);
    }
}
