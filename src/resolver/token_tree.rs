//! Recursive token decoding.
//!
//! Resolves a token address into a tree of constituent assets with
//! balances, prices and exchange rates, unwrapping one classification
//! level per step until it bottoms out in plain assets. Recursion is
//! bounded defensively: the tables driving it are external data and not
//! provably acyclic.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use futures_util::future::BoxFuture;
use tracing::{debug, warn};

use crate::chain::{abi, CallArg, ChainReader};
use crate::errors::TransportError;
use crate::metadata::{find_listing, AssetListing, MetadataService};
use crate::models::{
    from_units, norm_addr, AssetInfo, Token, TokenChildren, VaultKind, WrapperKind,
    DEFAULT_DESCRIPTION,
};
use crate::resolver::asset_cache::AssetInfoCache;
use crate::resolver::classifier::{Wrapper, WrapperTables};

/// Hard cap on unwrap depth; a misconfigured self-referential table
/// entry degrades to a zero-value leaf instead of looping.
const MAX_DEPTH: u32 = 16;

/// Lending wrappers report supply at a fixed 8-decimal convention.
const LENDING_WRAPPER_DECIMALS: u32 = 8;

/// What the resolver needs to know about a live vault: enough to detect
/// nested shares and pick the right rate accessor generation.
#[derive(Debug, Clone, Copy)]
pub struct VaultRef {
    pub kind: VaultKind,
    pub decimals: u32,
}

/// The live vault address set. Rebuilt from current vault state per
/// run, never cached independently.
#[derive(Debug, Default)]
pub struct VaultUniverse {
    set: HashSet<String>,
    index: HashMap<String, VaultRef>,
}

impl VaultUniverse {
    pub fn from_vaults(vaults: &[crate::models::Vault]) -> Self {
        let mut set = HashSet::new();
        let mut index = HashMap::new();
        for vault in vaults {
            let address = norm_addr(&vault.address);
            set.insert(address.clone());
            index.insert(
                address,
                VaultRef {
                    kind: vault.kind,
                    decimals: vault.decimals,
                },
            );
        }
        Self { set, index }
    }

    pub fn addresses(&self) -> &HashSet<String> {
        &self.set
    }

    pub fn lookup(&self, address: &str) -> Option<VaultRef> {
        self.index.get(&norm_addr(address)).copied()
    }
}

/// Fallback price for assets without an independent feed that are
/// self-referential to a vault's already-known valuation.
#[derive(Debug, Clone)]
pub struct VaultPriceHint {
    pub deposit_symbol: String,
    pub price: f64,
}

pub struct TokenTreeResolver {
    chain: Arc<dyn ChainReader>,
    metadata: Arc<dyn MetadataService>,
    cache: Arc<AssetInfoCache>,
    tables: Arc<WrapperTables>,
}

impl TokenTreeResolver {
    pub fn new(
        chain: Arc<dyn ChainReader>,
        metadata: Arc<dyn MetadataService>,
        cache: Arc<AssetInfoCache>,
        tables: Arc<WrapperTables>,
    ) -> Self {
        Self {
            chain,
            metadata,
            cache,
            tables,
        }
    }

    /// Full decode of `address`. Fails only on transport errors not
    /// recovered below; the caller owns recovery for its item.
    pub async fn resolve(
        &self,
        address: &str,
        asset_list: &[AssetListing],
        universe: &VaultUniverse,
        hint: Option<&VaultPriceHint>,
    ) -> Result<Token, TransportError> {
        self.resolve_at(address, asset_list, universe, hint, 0).await
    }

    fn resolve_at<'a>(
        &'a self,
        address: &'a str,
        asset_list: &'a [AssetListing],
        universe: &'a VaultUniverse,
        hint: Option<&'a VaultPriceHint>,
        depth: u32,
    ) -> BoxFuture<'a, Result<Token, TransportError>> {
        Box::pin(async move {
            if depth >= MAX_DEPTH {
                warn!(
                    token = %address,
                    depth,
                    "recursion depth cap hit, returning zero-value leaf"
                );
                return Ok(Token::placeholder(address));
            }

            let info = self.asset_info(address, asset_list, hint).await?;

            match self.tables.classify(address, universe.addresses()) {
                Wrapper::Pool { pool } => {
                    self.resolve_pool(address, &pool, &info, asset_list, universe, depth)
                        .await
                }
                Wrapper::Lending => {
                    self.resolve_lending(address, &info, asset_list, universe, depth)
                        .await
                }
                Wrapper::Aggregator => {
                    self.resolve_aggregator(address, &info, asset_list, universe, depth)
                        .await
                }
                Wrapper::InterestBearing => {
                    self.resolve_interest_bearing(address, &info, asset_list, universe, depth)
                        .await
                }
                Wrapper::NestedVault => {
                    self.resolve_nested_vault(address, &info, asset_list, universe, depth)
                        .await
                }
                Wrapper::Plain => Ok(Token::leaf(&norm_addr(address), &info)),
            }
        })
    }

    /// Cache-first metadata lookup. A miss reads symbol/decimals from
    /// chain; a stale entry retries the price search. The cache entry
    /// is rewritten either way (last writer wins).
    async fn asset_info(
        &self,
        address: &str,
        asset_list: &[AssetListing],
        hint: Option<&VaultPriceHint>,
    ) -> Result<AssetInfo, TransportError> {
        let cached = self.cache.get(address);

        let (symbol, decimals, mut description, mut price, mut price_updated) = match &cached {
            Some(info) => (
                info.symbol.clone(),
                info.decimals,
                info.description.clone(),
                info.price,
                info.price_updated,
            ),
            None => {
                let symbol = self
                    .chain
                    .call(address, &abi::ERC20, "symbol", &[])
                    .await?
                    .into_text()?;
                let decimals = self
                    .chain
                    .call(address, &abi::ERC20, "decimals", &[])
                    .await?
                    .into_uint()?;
                let decimals = u32::try_from(&decimals).map_err(|_| {
                    TransportError::new(format!("implausible decimals for {address}"))
                })?;
                (symbol, decimals, DEFAULT_DESCRIPTION.to_string(), 1.0, false)
            }
        };

        if !price_updated {
            if let Some(listing) = find_listing(asset_list, &symbol) {
                price_updated = true;
                match self.metadata.asset_detail(&listing.id).await {
                    Ok(Some(detail)) => {
                        if let Some(d) = detail.description {
                            description = d;
                        }
                        if let Some(p) = detail.price_usd {
                            price = p;
                        }
                    }
                    Ok(None) => {
                        debug!(symbol = %symbol, "asset listed but detail not found");
                    }
                    // Recovered here: the default price stands.
                    Err(e) => {
                        warn!(symbol = %symbol, error = %e, "asset detail lookup failed");
                    }
                }
            }

            if let Some(hint) = hint {
                if price == 1.0 && symbol == hint.deposit_symbol {
                    price = hint.price;
                }
            }
        }

        let info = AssetInfo {
            address: norm_addr(address),
            symbol,
            decimals,
            description,
            price,
            price_updated,
        };
        self.cache.put(info.clone());
        Ok(info)
    }

    async fn resolve_pool(
        &self,
        address: &str,
        pool: &str,
        info: &AssetInfo,
        asset_list: &[AssetListing],
        universe: &VaultUniverse,
        depth: u32,
    ) -> Result<Token, TransportError> {
        let interface = if self.tables.uses_three_coin_accessors(&info.symbol) {
            &abi::CURVE_POOL_3
        } else {
            &abi::CURVE_POOL
        };

        let mut coins: Vec<Token> = Vec::new();
        for i in 0..4u64 {
            // A failed read here is the expected end of the coin list,
            // not an error: pools carry fewer than 4 coins.
            let coin = match self
                .read_pool_coin(pool, interface, i, asset_list, universe, depth)
                .await
            {
                Ok(coin) => coin,
                Err(e) => {
                    debug!(pool = %pool, index = i, error = %e, "coin enumeration stopped");
                    break;
                }
            };
            coins.push(coin);
        }

        let total: f64 = coins
            .iter()
            .map(|c| c.protocol_balance.unwrap_or(0.0))
            .sum();
        if total > 0.0 {
            for coin in &mut coins {
                let share = coin.protocol_balance.unwrap_or(0.0) * 100.0 / total;
                coin.protocol_ratio = Some(round_to_decimals(share, coin.decimals));
            }
        }

        Ok(Token {
            kind: WrapperKind::Pool,
            children: TokenChildren::Constituents(coins),
            ..Token::leaf(&norm_addr(address), info)
        })
    }

    async fn read_pool_coin(
        &self,
        pool: &str,
        interface: &'static abi::Interface,
        index: u64,
        asset_list: &[AssetListing],
        universe: &VaultUniverse,
        depth: u32,
    ) -> Result<Token, TransportError> {
        let coin_address = self
            .chain
            .call(pool, interface, "coins", &[CallArg::Uint(index)])
            .await?
            .into_address()?;

        let mut coin = self
            .resolve_at(&coin_address, asset_list, universe, None, depth + 1)
            .await?;

        let raw_balance = self
            .chain
            .call(pool, interface, "balances", &[CallArg::Uint(index)])
            .await?
            .into_uint()?;
        coin.protocol_balance = Some(from_units(&raw_balance, coin.decimals));
        Ok(coin)
    }

    async fn resolve_lending(
        &self,
        address: &str,
        info: &AssetInfo,
        asset_list: &[AssetListing],
        universe: &VaultUniverse,
        depth: u32,
    ) -> Result<Token, TransportError> {
        let underlying = self
            .chain
            .call(address, &abi::LENDING_TOKEN, "underlying", &[])
            .await?
            .into_address()?;
        let mut child = self
            .resolve_at(&underlying, asset_list, universe, None, depth + 1)
            .await?;

        let cash = self
            .chain
            .call(address, &abi::LENDING_TOKEN, "getCash", &[])
            .await?
            .into_uint()?;
        let borrows = self
            .chain
            .call(address, &abi::LENDING_TOKEN, "totalBorrows", &[])
            .await?
            .into_uint()?;
        let reserves = self
            .chain
            .call(address, &abi::LENDING_TOKEN, "totalReserves", &[])
            .await?
            .into_uint()?;
        let supply = self
            .chain
            .call(address, &abi::LENDING_TOKEN, "totalSupply", &[])
            .await?
            .into_uint()?;

        let supply = from_units(&supply, LENDING_WRAPPER_DECIMALS);
        let rate = if supply > 0.0 {
            (from_units(&cash, child.decimals) + from_units(&borrows, child.decimals)
                - from_units(&reserves, child.decimals))
                / supply
        } else {
            0.0
        };
        child.exchange_rate = Some(rate);

        Ok(Token {
            kind: WrapperKind::Lending,
            children: TokenChildren::Underlying(Box::new(child)),
            ..Token::leaf(&norm_addr(address), info)
        })
    }

    async fn resolve_aggregator(
        &self,
        address: &str,
        info: &AssetInfo,
        asset_list: &[AssetListing],
        universe: &VaultUniverse,
        depth: u32,
    ) -> Result<Token, TransportError> {
        let underlying = self
            .chain
            .call(address, &abi::AGGREGATOR_TOKEN, "token", &[])
            .await?
            .into_address()?;
        let mut child = self
            .resolve_at(&underlying, asset_list, universe, None, depth + 1)
            .await?;

        let rate = self
            .chain
            .call(address, &abi::AGGREGATOR_TOKEN, "getPricePerFullShare", &[])
            .await?
            .into_uint()?;
        child.exchange_rate = Some(from_units(&rate, 18));

        Ok(Token {
            kind: WrapperKind::Aggregator,
            children: TokenChildren::Underlying(Box::new(child)),
            ..Token::leaf(&norm_addr(address), info)
        })
    }

    async fn resolve_interest_bearing(
        &self,
        address: &str,
        info: &AssetInfo,
        asset_list: &[AssetListing],
        universe: &VaultUniverse,
        depth: u32,
    ) -> Result<Token, TransportError> {
        let underlying = self
            .chain
            .call(
                address,
                &abi::INTEREST_BEARING_TOKEN,
                "underlyingAssetAddress",
                &[],
            )
            .await?
            .into_address()?;
        let mut child = self
            .resolve_at(&underlying, asset_list, universe, None, depth + 1)
            .await?;

        // Interest-bearing wrappers rebase 1:1 against the underlying.
        child.exchange_rate = Some(1.0);

        Ok(Token {
            kind: WrapperKind::InterestBearing,
            children: TokenChildren::Underlying(Box::new(child)),
            ..Token::leaf(&norm_addr(address), info)
        })
    }

    async fn resolve_nested_vault(
        &self,
        address: &str,
        info: &AssetInfo,
        asset_list: &[AssetListing],
        universe: &VaultUniverse,
        depth: u32,
    ) -> Result<Token, TransportError> {
        // The rate accessor generation comes from the vault's recorded
        // category, never re-detected on chain.
        let vault_ref = universe.lookup(address).ok_or_else(|| {
            TransportError::new(format!("{address} classified as vault but not indexed"))
        })?;

        let (interface, rate_method, rate_decimals) = match vault_ref.kind {
            VaultKind::V2 => (&abi::VAULT_V2, "pricePerShare", vault_ref.decimals),
            _ => (&abi::VAULT_V1, "getPricePerFullShare", 18),
        };

        let underlying = self
            .chain
            .call(address, interface, "token", &[])
            .await?
            .into_address()?;
        let mut child = self
            .resolve_at(&underlying, asset_list, universe, None, depth + 1)
            .await?;

        let rate = self
            .chain
            .call(address, interface, rate_method, &[])
            .await?
            .into_uint()?;
        child.exchange_rate = Some(from_units(&rate, rate_decimals));

        Ok(Token {
            kind: WrapperKind::NestedVault,
            children: TokenChildren::Underlying(Box::new(child)),
            ..Token::leaf(&norm_addr(address), info)
        })
    }
}

fn round_to_decimals(value: f64, decimals: u32) -> f64 {
    // Past f64 precision the rounding is a no-op, which matches the
    // tolerance the ratio invariant is tested at.
    let decimals = decimals.min(12);
    let factor = 10f64.powi(decimals as i32);
    (value * factor).round() / factor
}
