//! Wrapper classification.
//!
//! Address-exact-match lookups against static tables loaded from TOML
//! at startup, plus one live membership check against the current vault
//! set. Classification order is fixed: pool, lending, aggregator,
//! interest-bearing, nested vault, plain; the tables are validated to
//! be non-overlapping so the first match is the only match.

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::collections::{HashMap, HashSet};
use std::path::Path;

use crate::models::norm_addr;

/// The decoding rule that applies to a token address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Wrapper {
    /// LP token; `pool` is the contract exposing coins/balances.
    Pool { pool: String },
    Lending,
    Aggregator,
    InterestBearing,
    NestedVault,
    Plain,
}

/// Exposure asset override for strategies that do not expose `want()`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StrategyAsset {
    Want(String),
    Maker {
        collateral: String,
        debt: String,
        vault: String,
    },
}

#[derive(Debug, Deserialize)]
struct RawTables {
    #[serde(default)]
    pools: HashMap<String, String>,
    #[serde(default)]
    lending: Vec<String>,
    #[serde(default)]
    aggregator: Vec<String>,
    #[serde(default)]
    interest_bearing: Vec<String>,
    #[serde(default)]
    three_coin_pool_symbols: Vec<String>,
    #[serde(default)]
    strategy_assets: HashMap<String, String>,
    #[serde(default)]
    maker_strategies: Vec<RawMakerStrategy>,
}

#[derive(Debug, Deserialize)]
struct RawMakerStrategy {
    address: String,
    collateral: String,
    debt: String,
    vault: String,
}

/// The static classification dataset. Keys are normalized lowercase
/// addresses.
#[derive(Debug)]
pub struct WrapperTables {
    pools: HashMap<String, String>,
    lending: HashSet<String>,
    aggregator: HashSet<String>,
    interest_bearing: HashSet<String>,
    three_coin_pool_symbols: Vec<String>,
    strategy_assets: HashMap<String, StrategyAsset>,
}

const DEFAULT_TABLES: &str = include_str!("../../config/wrapper_tables.toml");

impl WrapperTables {
    pub fn load_default() -> Result<Self> {
        Self::from_toml_str(DEFAULT_TABLES).context("embedded wrapper tables are invalid")
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let raw = std::fs::read_to_string(path.as_ref()).with_context(|| {
            format!("failed to read wrapper tables {}", path.as_ref().display())
        })?;
        Self::from_toml_str(&raw)
    }

    pub fn from_toml_str(raw: &str) -> Result<Self> {
        let raw: RawTables = toml::from_str(raw).context("failed to parse wrapper tables")?;

        let pools = raw
            .pools
            .into_iter()
            .map(|(token, pool)| (norm_addr(&token), norm_addr(&pool)))
            .collect();
        let lending = raw.lending.iter().map(|a| norm_addr(a)).collect();
        let aggregator = raw.aggregator.iter().map(|a| norm_addr(a)).collect();
        let interest_bearing = raw.interest_bearing.iter().map(|a| norm_addr(a)).collect();

        let mut strategy_assets: HashMap<String, StrategyAsset> = raw
            .strategy_assets
            .into_iter()
            .map(|(strategy, want)| (norm_addr(&strategy), StrategyAsset::Want(norm_addr(&want))))
            .collect();
        for maker in raw.maker_strategies {
            strategy_assets.insert(
                norm_addr(&maker.address),
                StrategyAsset::Maker {
                    collateral: norm_addr(&maker.collateral),
                    debt: norm_addr(&maker.debt),
                    vault: norm_addr(&maker.vault),
                },
            );
        }

        let tables = Self {
            pools,
            lending,
            aggregator,
            interest_bearing,
            three_coin_pool_symbols: raw.three_coin_pool_symbols,
            strategy_assets,
        };
        tables.validate()?;
        Ok(tables)
    }

    /// No address may belong to more than one category. A violation is
    /// a table-construction bug, caught at load time.
    pub fn validate(&self) -> Result<()> {
        let mut seen: HashMap<&str, &str> = HashMap::new();
        let groups: [(&str, Vec<&String>); 4] = [
            ("pool", self.pools.keys().collect()),
            ("lending", self.lending.iter().collect()),
            ("aggregator", self.aggregator.iter().collect()),
            ("interest_bearing", self.interest_bearing.iter().collect()),
        ];
        for (category, addresses) in groups {
            for address in addresses {
                if let Some(previous) = seen.insert(address.as_str(), category) {
                    bail!(
                        "classification ambiguity: {address} is listed as both {previous} and {category}"
                    );
                }
            }
        }
        Ok(())
    }

    pub fn classify_pool(&self, address: &str) -> Option<&str> {
        self.pools.get(&norm_addr(address)).map(String::as_str)
    }

    pub fn classify_lending(&self, address: &str) -> bool {
        self.lending.contains(&norm_addr(address))
    }

    pub fn classify_aggregator(&self, address: &str) -> bool {
        self.aggregator.contains(&norm_addr(address))
    }

    pub fn classify_interest_bearing(&self, address: &str) -> bool {
        self.interest_bearing.contains(&norm_addr(address))
    }

    /// Membership in the live vault set; recomputed from current vault
    /// state by the caller, never cached here.
    pub fn classify_nested_vault(&self, address: &str, vault_set: &HashSet<String>) -> bool {
        vault_set.contains(&norm_addr(address))
    }

    /// Fixed-order classification: first match wins.
    pub fn classify(&self, address: &str, vault_set: &HashSet<String>) -> Wrapper {
        if let Some(pool) = self.classify_pool(address) {
            return Wrapper::Pool {
                pool: pool.to_string(),
            };
        }
        if self.classify_lending(address) {
            return Wrapper::Lending;
        }
        if self.classify_aggregator(address) {
            return Wrapper::Aggregator;
        }
        if self.classify_interest_bearing(address) {
            return Wrapper::InterestBearing;
        }
        if self.classify_nested_vault(address, vault_set) {
            return Wrapper::NestedVault;
        }
        Wrapper::Plain
    }

    /// Pools whose balances live behind the alternate three-coin
    /// accessor shape, keyed by LP token symbol.
    pub fn uses_three_coin_accessors(&self, symbol: &str) -> bool {
        self.three_coin_pool_symbols.iter().any(|s| s == symbol)
    }

    pub fn strategy_asset(&self, strategy_address: &str) -> Option<&StrategyAsset> {
        self.strategy_assets.get(&norm_addr(strategy_address))
    }
}
