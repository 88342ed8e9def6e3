//! Windowed aggregation.
//!
//! Drives one valuation run: slices the vault universe to a window,
//! fans vault processing out with bounded concurrency and publishes a
//! [`Snapshot`]. A vault that fails mid-processing is zeroed, never
//! dropped, so downstream consumers always see the full window.


use std::sync::Arc;

use chrono::Utc;
use futures_util::stream::{self, StreamExt};
use tracing::{info, warn};

use crate::attribution::AttributionEngine;
use crate::chain::{abi, ChainReader};
use crate::metadata::{AssetListing, MetadataService};
use crate::models::{
    from_units, Snapshot, SnapshotTotals, Vault, VaultKind, VaultTvl,
};
use crate::resolver::{TokenTreeResolver, VaultUniverse};

pub struct AggregationPipeline {
    chain: Arc<dyn ChainReader>,
    metadata: Arc<dyn MetadataService>,
    resolver: Arc<TokenTreeResolver>,
    engine: Arc<AttributionEngine>,
    concurrency: usize,
}

impl AggregationPipeline {
    pub fn new(
        chain: Arc<dyn ChainReader>,
        metadata: Arc<dyn MetadataService>,
        resolver: Arc<TokenTreeResolver>,
        engine: Arc<AttributionEngine>,
        concurrency: usize,
    ) -> Self {
        Self {
            chain,
            metadata,
            resolver,
            engine,
            concurrency: concurrency.max(1),
        }
    }

    /// Runs one window over `vaults` and publishes the snapshot.
    /// `vaults` is the full universe; only `[offset, offset + size)` is
    /// processed, but nested-vault detection sees every address.
    pub async fn run(&self, vaults: &[Vault], offset: usize, size: usize) -> Snapshot {
        let start = offset.min(vaults.len());
        let end = offset.saturating_add(size).min(vaults.len());
        let window: Vec<Vault> = vaults[start..end].to_vec();
        info!(
            universe = vaults.len(),
            offset,
            size = window.len(),
            "aggregation window selected"
        );

        // One asset list shared across the whole window. Losing it is a
        // degraded run (default prices), not a failed one.
        let asset_list = match self.metadata.list_assets().await {
            Ok(list) => list,
            Err(e) => {
                warn!(error = %e, "asset listing unavailable, defaults apply");
                Vec::new()
            }
        };
        let universe = VaultUniverse::from_vaults(vaults);

        let order: Vec<String> = window.iter().map(|v| v.address.clone()).collect();
        let mut processed: Vec<Vault> = stream::iter(window)
            .map(|vault| {
                let asset_list = &asset_list;
                let universe = &universe;
                async move { self.process_vault(vault, asset_list, universe).await }
            })
            .buffer_unordered(self.concurrency)
            .collect()
            .await;

        // buffer_unordered yields by completion; restore listing order
        // by address before publishing.
        processed.sort_by_key(|vault| {
            order
                .iter()
                .position(|address| *address == vault.address)
                .unwrap_or(usize::MAX)
        });

        let totals = compute_totals(&processed);
        info!(
            vaults = processed.len(),
            tvl_usd = totals.tvl_usd,
            "aggregation window complete"
        );

        Snapshot {
            generated_at: Utc::now(),
            window_offset: start,
            window_size: processed.len(),
            vaults: processed,
            totals,
        }
    }

    /// Fully values one vault. Infallible: a transport failure zeroes
    /// the vault's computed fields and it stays in the snapshot.
    async fn process_vault(
        &self,
        mut vault: Vault,
        asset_list: &[AssetListing],
        universe: &VaultUniverse,
    ) -> Vault {
        if let Err(e) = self.value_vault(&mut vault, asset_list, universe).await {
            warn!(vault = %vault.address, error = %e, "vault valuation failed, zeroing");
            vault.zero_computed();
            return vault;
        }

        let attributions = futures_util::future::join_all(vault.strategies.iter().map(
            |strategy| {
                let engine = &self.engine;
                let vault_ref = &vault;
                async move {
                    engine
                        .attribute(strategy, vault_ref, asset_list, universe)
                        .await
                }
            },
        ))
        .await;

        for (strategy, attribution) in vault.strategies.iter_mut().zip(attributions) {
            strategy.balance = attribution.balance;
            strategy.balance_usd = attribution.balance_usd;
            strategy.protocols = attribution.protocols;
        }
        vault
    }

    async fn value_vault(
        &self,
        vault: &mut Vault,
        asset_list: &[AssetListing],
        universe: &VaultUniverse,
    ) -> Result<(), crate::errors::TransportError> {
        vault.price_per_share = self.price_per_share(vault).await;

        let deposit_token = self
            .resolver
            .resolve(&vault.token.address, asset_list, universe, None)
            .await?;

        let supply = self
            .chain
            .call(&vault.address, &abi::ERC20, "totalSupply", &[])
            .await?
            .into_uint()?;

        let mut deposit_token = deposit_token;
        deposit_token.balance = from_units(&supply, vault.decimals) * vault.price_per_share;
        deposit_token.balance_usd = deposit_token.balance * deposit_token.price;

        vault.tvl = Some(VaultTvl {
            total_assets: deposit_token.balance,
            price: deposit_token.price,
            tvl_usd: deposit_token.balance_usd,
        });
        vault.deposit_token = Some(deposit_token);
        Ok(())
    }

    /// Share price in deposit-token units, by vault generation. A
    /// failed read lands at 0.0 so the vault values as empty rather
    /// than failing the window.
    async fn price_per_share(&self, vault: &Vault) -> f64 {
        let read = match vault.kind {
            VaultKind::Lockup => return 1.0,
            VaultKind::V2 => self
                .chain
                .call(&vault.address, &abi::VAULT_V2, "pricePerShare", &[])
                .await
                .and_then(|v| v.into_uint())
                .map(|raw| from_units(&raw, vault.decimals)),
            VaultKind::V1 | VaultKind::Earn => self
                .chain
                .call(&vault.address, &abi::VAULT_V1, "getPricePerFullShare", &[])
                .await
                .and_then(|v| v.into_uint())
                .map(|raw| from_units(&raw, 18)),
        };

        match read {
            Ok(pps) => pps,
            Err(e) => {
                warn!(vault = %vault.address, error = %e, "share price read failed");
                0.0
            }
        }
    }
}

fn compute_totals(vaults: &[Vault]) -> SnapshotTotals {
    let mut totals = SnapshotTotals::default();
    for vault in vaults {
        let tvl = vault.tvl.as_ref().map(|t| t.tvl_usd).unwrap_or(0.0);
        totals.tvl_usd += tvl;
        if vault.kind.is_aggregator() {
            totals.earn_holdings_usd += tvl;
        } else {
            totals.vault_holdings_usd += tvl;
        }
    }
    totals
}
