use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Vault categories. The listing feed reports these as `v1`, `v2`,
/// `Earn` and `Lockup`; Earn vaults are the yield-aggregator family and
/// are totalled separately in the snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VaultKind {
    V1,
    V2,
    Earn,
    Lockup,
}

impl VaultKind {
    pub fn as_str(&self) -> &str {
        match self {
            VaultKind::V1 => "v1",
            VaultKind::V2 => "v2",
            VaultKind::Earn => "earn",
            VaultKind::Lockup => "lockup",
        }
    }

    /// Earn vaults aggregate into other yield sources rather than
    /// running their own strategies.
    pub fn is_aggregator(&self) -> bool {
        matches!(self, VaultKind::Earn)
    }
}

/// How a token address unwraps one level. Exactly one kind per node,
/// enforced by construction rather than by parallel boolean flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WrapperKind {
    /// Curve-style LP token backed by up to four constituent coins.
    Pool,
    /// Lending-market receipt token (cToken shape).
    Lending,
    /// Yield-aggregator share token (iEarn shape).
    Aggregator,
    /// Interest-bearing token that rebases against a single underlying
    /// (aToken shape).
    InterestBearing,
    /// A share in another vault from the live vault set.
    NestedVault,
    /// Primitive asset, nothing to unwrap.
    Plain,
}

/// Child payload of a resolved token. Pool tokens carry a coin list,
/// every other wrapper carries a single underlying, plain assets carry
/// nothing.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenChildren {
    Constituents(Vec<Token>),
    Underlying(Box<Token>),
    None,
}

impl TokenChildren {
    pub fn is_none(&self) -> bool {
        matches!(self, TokenChildren::None)
    }
}

/// A node of the resolved token tree.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Token {
    pub address: String,
    pub symbol: String,
    pub decimals: u32,
    /// Quote-currency price. Defaults to 1.0 when no feed knows the
    /// symbol.
    pub price: f64,
    pub description: String,
    pub kind: WrapperKind,
    /// Balance attributed to this node, in token units.
    pub balance: f64,
    pub balance_usd: f64,
    /// Pool constituents only: the coin balance held by the pool.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub protocol_balance: Option<f64>,
    /// Pool constituents only: share of the pool, in percent.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub protocol_ratio: Option<f64>,
    /// Wrapped underlyings only: wrapper-share to underlying rate.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exchange_rate: Option<f64>,
    pub children: TokenChildren,
}

impl Token {
    pub fn leaf(address: &str, info: &AssetInfo) -> Self {
        Self {
            address: address.to_string(),
            symbol: info.symbol.clone(),
            decimals: info.decimals,
            price: info.price,
            description: info.description.clone(),
            kind: WrapperKind::Plain,
            balance: 0.0,
            balance_usd: 0.0,
            protocol_balance: None,
            protocol_ratio: None,
            exchange_rate: None,
            children: TokenChildren::None,
        }
    }

    /// Zero-value leaf used when a subtree cannot be resolved.
    pub fn placeholder(address: &str) -> Self {
        Self {
            address: address.to_string(),
            symbol: String::new(),
            decimals: 18,
            price: 0.0,
            description: String::new(),
            kind: WrapperKind::Plain,
            balance: 0.0,
            balance_usd: 0.0,
            protocol_balance: None,
            protocol_ratio: None,
            exchange_rate: None,
            children: TokenChildren::None,
        }
    }
}

/// Cached static/semi-static per-address metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssetInfo {
    pub address: String,
    pub symbol: String,
    pub decimals: u32,
    pub description: String,
    pub price: f64,
    /// True once a live price was fetched for this entry; false entries
    /// retry the price lookup on the next resolution.
    pub price_updated: bool,
}

pub const DEFAULT_DESCRIPTION: &str = "No description available for this asset yet.";

/// A named external protocol a strategy deploys capital into.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Protocol {
    pub name: String,
    pub balance: f64,
    pub balance_usd: f64,
    pub tokens: Vec<Token>,
}

/// A vault strategy. `name` is the sole attribution discriminator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Strategy {
    pub address: String,
    pub name: String,
    #[serde(default)]
    pub balance: f64,
    #[serde(default)]
    pub balance_usd: f64,
    #[serde(default)]
    pub protocols: Vec<Protocol>,
}

impl Strategy {
    pub fn new(address: &str, name: &str) -> Self {
        Self {
            address: address.to_string(),
            name: name.to_string(),
            balance: 0.0,
            balance_usd: 0.0,
            protocols: Vec::new(),
        }
    }

    pub fn zeroed(&mut self) {
        self.balance = 0.0;
        self.balance_usd = 0.0;
        self.protocols.clear();
    }
}

/// Deposit-asset metadata as reported by the listing feed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenMetadata {
    pub address: String,
    pub symbol: String,
    pub decimals: u32,
    #[serde(default)]
    pub display_name: String,
}

/// Computed vault totals.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct VaultTvl {
    /// Deposit-token units backing the vault (supply * price per share).
    pub total_assets: f64,
    /// Deposit-token quote price used for the valuation.
    pub price: f64,
    pub tvl_usd: f64,
}

/// A vault record. Created from the listing feed, populated in place by
/// the pipeline and immutable once a snapshot is published.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Vault {
    pub address: String,
    pub display_name: String,
    pub kind: VaultKind,
    pub decimals: u32,
    pub token: TokenMetadata,
    #[serde(default)]
    pub price_per_share: f64,
    #[serde(default)]
    pub strategies: Vec<Strategy>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deposit_token: Option<Token>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tvl: Option<VaultTvl>,
}

impl Vault {
    /// Zero every computed field, keeping identity and strategy names
    /// so the vault still appears in the snapshot.
    pub fn zero_computed(&mut self) {
        self.price_per_share = 0.0;
        self.deposit_token = None;
        self.tvl = None;
        for strategy in &mut self.strategies {
            strategy.zeroed();
        }
    }
}

/// System-wide totals over one published window.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SnapshotTotals {
    pub tvl_usd: f64,
    /// Sum over non-aggregator vaults.
    pub vault_holdings_usd: f64,
    /// Sum over aggregator (Earn) vaults.
    pub earn_holdings_usd: f64,
}

/// The published valuation snapshot: one fully resolved window of the
/// vault universe plus aggregate totals. Read-only for consumers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Snapshot {
    pub generated_at: DateTime<Utc>,
    pub window_offset: usize,
    pub window_size: usize,
    pub vaults: Vec<Vault>,
    pub totals: SnapshotTotals,
}

/// Application configuration
#[derive(Debug, Clone)]
pub struct Config {
    pub rpc_url: String,
    pub coingecko_api: String,
    pub vaults_api: String,
    pub vault_registry_api: String,
    pub window_offset: usize,
    pub window_size: usize,
    pub max_concurrent_vaults: usize,
    pub wrapper_tables_path: Option<String>,
    pub port: u16,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        dotenv::dotenv().ok();

        let rpc_url = std::env::var("RPC_URL")
            .unwrap_or_else(|_| "http://localhost:8545".to_string());

        let coingecko_api = std::env::var("COINGECKO_API")
            .unwrap_or_else(|_| "https://api.coingecko.com/api/v3".to_string());

        let vaults_api = std::env::var("VAULTS_API")
            .unwrap_or_else(|_| "https://vaults.finance/all".to_string());

        let vault_registry_api = std::env::var("VAULT_REGISTRY_API")
            .unwrap_or_else(|_| "https://api.yearn.tools/vaults".to_string());

        let window_offset = std::env::var("WINDOW_OFFSET")
            .unwrap_or_else(|_| "0".to_string())
            .parse()
            .unwrap_or(0);

        let window_size = std::env::var("WINDOW_SIZE")
            .unwrap_or_else(|_| "10".to_string())
            .parse()
            .unwrap_or(10);

        let max_concurrent_vaults = std::env::var("MAX_CONCURRENT_VAULTS")
            .unwrap_or_else(|_| "5".to_string())
            .parse()
            .unwrap_or(5);

        let wrapper_tables_path = std::env::var("WRAPPER_TABLES_PATH").ok();

        let port = std::env::var("PORT")
            .unwrap_or_else(|_| "8080".to_string())
            .parse()
            .unwrap_or(8080);

        Ok(Self {
            rpc_url,
            coingecko_api,
            vaults_api,
            vault_registry_api,
            window_offset,
            window_size,
            max_concurrent_vaults,
            wrapper_tables_path,
            port,
        })
    }
}

/// Normalized address form used as a key everywhere: lowercase hex.
/// Listing feeds and tables mix checksummed and lowercase forms.
pub fn norm_addr(address: &str) -> String {
    address.trim().to_ascii_lowercase()
}

/// Scale a raw integer amount down by `decimals`.
pub fn from_units(raw: &num_bigint::BigUint, decimals: u32) -> f64 {
    use num_traits::ToPrimitive;
    raw.to_f64().unwrap_or(0.0) / 10f64.powi(decimals as i32)
}

#[cfg(test)]
mod tests {
    use super::*;
    use num_bigint::BigUint;

    #[test]
    fn test_from_units() {
        let raw = BigUint::from(1_500_000_000_000_000_000u64);
        assert!((from_units(&raw, 18) - 1.5).abs() < 1e-12);
        let raw = BigUint::from(123_456u32);
        assert!((from_units(&raw, 6) - 0.123456).abs() < 1e-12);
    }

    #[test]
    fn test_norm_addr_case_insensitive() {
        assert_eq!(
            norm_addr("0xA2B47E3D5c44877cca798226B7B8118F9BFb7A56"),
            "0xa2b47e3d5c44877cca798226b7b8118f9bfb7a56"
        );
    }

    #[test]
    fn test_zero_computed_keeps_identity() {
        let mut vault = Vault {
            address: "0xabc".into(),
            display_name: "DAI Vault".into(),
            kind: VaultKind::V2,
            decimals: 18,
            token: TokenMetadata {
                address: "0xdef".into(),
                symbol: "DAI".into(),
                decimals: 18,
                display_name: "DAI".into(),
            },
            price_per_share: 1.01,
            strategies: vec![Strategy::new("0x1", "StrategyLenderYieldOptimiser")],
            deposit_token: None,
            tvl: Some(VaultTvl {
                total_assets: 10.0,
                price: 1.0,
                tvl_usd: 10.0,
            }),
        };
        vault.zero_computed();
        assert_eq!(vault.price_per_share, 0.0);
        assert!(vault.tvl.is_none());
        assert_eq!(vault.strategies[0].name, "StrategyLenderYieldOptimiser");
        assert!(vault.strategies[0].protocols.is_empty());
    }
}
