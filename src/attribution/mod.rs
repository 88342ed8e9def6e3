//! Strategy attribution.
//!
//! Maps each vault strategy to the external protocols holding its
//! funds. Dispatch is by registered strategy name (see [`rules`]); the
//! engine never fails a vault: any accessor error zeroes that one
//! strategy and is logged.

pub mod rules;

use std::sync::Arc;

use tracing::warn;

use crate::chain::{abi, CallArg, CallValue, ChainReader};
use crate::errors::TransportError;
use crate::metadata::AssetListing;
use crate::models::{from_units, norm_addr, Protocol, Strategy, Token, Vault};
use crate::resolver::classifier::StrategyAsset;
use crate::resolver::{TokenTreeResolver, VaultPriceHint, VaultUniverse, WrapperTables};

use rules::{match_rule, normalize_lender_name, three_pool_share_method, DecodeRoutine};

/// The attributed exposure of one strategy.
#[derive(Debug, Clone, Default)]
pub struct Attribution {
    pub balance: f64,
    pub balance_usd: f64,
    pub protocols: Vec<Protocol>,
}

pub struct AttributionEngine {
    chain: Arc<dyn ChainReader>,
    tables: Arc<WrapperTables>,
    resolver: Arc<TokenTreeResolver>,
}

impl AttributionEngine {
    pub fn new(
        chain: Arc<dyn ChainReader>,
        tables: Arc<WrapperTables>,
        resolver: Arc<TokenTreeResolver>,
    ) -> Self {
        Self {
            chain,
            tables,
            resolver,
        }
    }

    /// Attributes one strategy. Infallible by contract: errors are
    /// recovered here as a zeroed attribution.
    pub async fn attribute(
        &self,
        strategy: &Strategy,
        vault: &Vault,
        asset_list: &[AssetListing],
        universe: &VaultUniverse,
    ) -> Attribution {
        match self
            .try_attribute(strategy, vault, asset_list, universe)
            .await
        {
            Ok(attribution) => attribution,
            Err(e) => {
                warn!(
                    strategy = %strategy.address,
                    name = %strategy.name,
                    vault = %vault.address,
                    error = %e,
                    "strategy attribution failed, zeroing"
                );
                Attribution::default()
            }
        }
    }

    async fn try_attribute(
        &self,
        strategy: &Strategy,
        vault: &Vault,
        asset_list: &[AssetListing],
        universe: &VaultUniverse,
    ) -> Result<Attribution, TransportError> {
        let routine = match match_rule(&strategy.name) {
            Some(rule) => rule.routine,
            None => return self.attribute_unknown(strategy, vault).await,
        };

        match routine {
            DecodeRoutine::CurveVoterProxy => {
                self.attribute_single_protocol(strategy, vault, asset_list, universe, "Curve")
                    .await
            }
            DecodeRoutine::Governance => {
                self.attribute_single_protocol(strategy, vault, asset_list, universe, "Yearn")
                    .await
            }
            DecodeRoutine::ThreePoolVault => {
                self.attribute_three_pool(strategy, vault, asset_list, universe)
                    .await
            }
            DecodeRoutine::MakerDelegate => {
                self.attribute_maker(strategy, vault, asset_list, universe)
                    .await
            }
            DecodeRoutine::LenderOptimiser => self.attribute_lender(strategy, vault).await,
        }
    }

    /// want() resolution honours the table overrides first; a handful
    /// of strategies predate the accessor.
    async fn strategy_want(&self, strategy: &Strategy) -> Result<String, TransportError> {
        match self.tables.strategy_asset(&strategy.address) {
            Some(StrategyAsset::Want(address)) => Ok(address.clone()),
            Some(StrategyAsset::Maker { .. }) => Err(TransportError::new(format!(
                "strategy {} needs the maker routine",
                strategy.address
            ))),
            None => self
                .chain
                .call(&strategy.address, &abi::STRATEGY, "want", &[])
                .await?
                .into_address(),
        }
    }

    async fn resolve_exposure_token(
        &self,
        address: &str,
        vault: &Vault,
        asset_list: &[AssetListing],
        universe: &VaultUniverse,
    ) -> Result<Token, TransportError> {
        let hint = vault.tvl.as_ref().map(|tvl| VaultPriceHint {
            deposit_symbol: vault.token.symbol.clone(),
            price: tvl.price,
        });
        self.resolver
            .resolve(address, asset_list, universe, hint.as_ref())
            .await
    }

    /// Whole strategy balance held in a single external protocol.
    async fn attribute_single_protocol(
        &self,
        strategy: &Strategy,
        vault: &Vault,
        asset_list: &[AssetListing],
        universe: &VaultUniverse,
        protocol_name: &str,
    ) -> Result<Attribution, TransportError> {
        let want = self.strategy_want(strategy).await?;
        let mut token = self
            .resolve_exposure_token(&want, vault, asset_list, universe)
            .await?;

        let raw = self
            .chain
            .call(&strategy.address, &abi::STRATEGY, "balanceOf", &[])
            .await?
            .into_uint()?;
        let balance = from_units(&raw, token.decimals);
        let balance_usd = balance * vault_quote_price(vault);
        token.balance = balance;
        token.balance_usd = balance_usd;

        Ok(Attribution {
            balance,
            balance_usd,
            protocols: vec![Protocol {
                name: protocol_name.to_string(),
                balance,
                balance_usd,
                tokens: vec![token],
            }],
        })
    }

    /// Stablecoin routed through a meta vault into the 3pool; exposure
    /// is split across Yearn (the meta vault) and Curve (the pool).
    async fn attribute_three_pool(
        &self,
        strategy: &Strategy,
        vault: &Vault,
        asset_list: &[AssetListing],
        universe: &VaultUniverse,
    ) -> Result<Attribution, TransportError> {
        let want = self.strategy_want(strategy).await?;
        let mut token = self
            .resolve_exposure_token(&want, vault, asset_list, universe)
            .await?;

        let method = three_pool_share_method(&strategy.name);
        let raw = self
            .chain
            .call(&strategy.address, &abi::STRATEGY, method, &[])
            .await?
            .into_uint()?;
        let balance = from_units(&raw, token.decimals);
        let balance_usd = balance * token.price;
        token.balance = balance;
        token.balance_usd = balance_usd;

        let pool_usd = balance * vault_quote_price(vault);
        let protocols = ["Yearn", "Curve"]
            .into_iter()
            .map(|name| Protocol {
                name: name.to_string(),
                balance,
                balance_usd: pool_usd,
                tokens: vec![token.clone()],
            })
            .collect();

        Ok(Attribution {
            balance,
            balance_usd,
            protocols,
        })
    }

    /// CDP strategy: collateral locked in Maker mints DAI which is
    /// parked in a yield vault. Exposure is the collateral and debt
    /// legs plus the vault deposit.
    async fn attribute_maker(
        &self,
        strategy: &Strategy,
        vault: &Vault,
        asset_list: &[AssetListing],
        universe: &VaultUniverse,
    ) -> Result<Attribution, TransportError> {
        let (collateral_addr, debt_addr, vault_addr) =
            match self.tables.strategy_asset(&strategy.address) {
                Some(StrategyAsset::Maker {
                    collateral,
                    debt,
                    vault,
                }) => (collateral.clone(), debt.clone(), vault.clone()),
                _ => {
                    return Err(TransportError::new(format!(
                        "no maker asset triple for strategy {}",
                        strategy.address
                    )))
                }
            };

        let debt_raw = self
            .chain
            .call(
                &strategy.address,
                &abi::MAKER_STRATEGY,
                "getTotalDebtAmount",
                &[],
            )
            .await?
            .into_uint()?;
        let collateral_raw = self
            .chain
            .call(
                &strategy.address,
                &abi::MAKER_STRATEGY,
                "balanceOfmVault",
                &[],
            )
            .await?
            .into_uint()?;
        let vault_shares_raw = self
            .chain
            .call(
                &vault_addr,
                &abi::VAULT_V2,
                "balanceOf",
                &[CallArg::Address(norm_addr(&strategy.address))],
            )
            .await?
            .into_uint()?;

        let mut collateral = self
            .resolve_exposure_token(&collateral_addr, vault, asset_list, universe)
            .await?;
        let mut debt = self
            .resolve_exposure_token(&debt_addr, vault, asset_list, universe)
            .await?;
        let mut vault_token = self
            .resolve_exposure_token(&vault_addr, vault, asset_list, universe)
            .await?;

        collateral.balance = from_units(&collateral_raw, collateral.decimals);
        collateral.balance_usd = collateral.balance * collateral.price;
        debt.balance = from_units(&debt_raw, debt.decimals);
        debt.balance_usd = debt.balance * debt.price;
        vault_token.balance = from_units(&vault_shares_raw, vault_token.decimals);
        vault_token.balance_usd = vault_token.balance * vault_token.price;

        let balance = collateral.balance;
        let balance_usd = balance * vault_quote_price(vault);
        let protocols = vec![
            Protocol {
                name: "Maker".to_string(),
                balance,
                balance_usd,
                tokens: vec![collateral, debt.clone()],
            },
            Protocol {
                name: "Yearn".to_string(),
                balance: debt.balance,
                balance_usd: debt.balance_usd,
                tokens: vec![vault_token],
            },
        ];

        Ok(Attribution {
            balance,
            balance_usd,
            protocols,
        })
    }

    /// Lending optimiser: one protocol entry per live lending market,
    /// enumerated from the strategy itself.
    async fn attribute_lender(
        &self,
        strategy: &Strategy,
        vault: &Vault,
    ) -> Result<Attribution, TransportError> {
        let statuses = self
            .chain
            .call(&strategy.address, &abi::LENDER_OPTIMISER, "lendStatuses", &[])
            .await?
            .into_lender_statuses()?;
        let total_raw = self
            .chain
            .call(
                &strategy.address,
                &abi::LENDER_OPTIMISER,
                "lentTotalAssets",
                &[],
            )
            .await?
            .into_uint()?;

        let quote = vault_quote_price(vault);
        let decimals = vault.token.decimals;
        let protocols = statuses
            .into_iter()
            .map(|status| {
                let balance = from_units(&status.assets, decimals);
                Protocol {
                    name: normalize_lender_name(&status.name),
                    balance,
                    balance_usd: balance * quote,
                    tokens: vec![],
                }
            })
            .collect();

        let balance = from_units(&total_raw, decimals);
        Ok(Attribution {
            balance,
            balance_usd: balance * quote,
            protocols,
        })
    }

    /// No rule matched: report the nominal balance under "Unknown" so
    /// the strategy still shows up in totals.
    async fn attribute_unknown(
        &self,
        strategy: &Strategy,
        vault: &Vault,
    ) -> Result<Attribution, TransportError> {
        let raw = match self
            .chain
            .call(&strategy.address, &abi::STRATEGY, "balanceOf", &[])
            .await
            .and_then(CallValue::into_uint)
        {
            Ok(raw) => raw,
            Err(e) => {
                warn!(
                    strategy = %strategy.address,
                    name = %strategy.name,
                    error = %e,
                    "nominal balance read failed for unmatched strategy"
                );
                return Ok(Attribution::default());
            }
        };

        let balance = from_units(&raw, vault.token.decimals);
        let balance_usd = balance * vault_quote_price(vault);
        Ok(Attribution {
            balance,
            balance_usd,
            protocols: vec![Protocol {
                name: "Unknown".to_string(),
                balance,
                balance_usd,
                tokens: vec![],
            }],
        })
    }
}

/// Price one vault deposit unit is quoted at. Falls back to 1.0 when
/// valuation has not run for the vault yet.
fn vault_quote_price(vault: &Vault) -> f64 {
    vault.tvl.as_ref().map(|tvl| tvl.price).unwrap_or(1.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::mock::MockChainReader;
    use crate::chain::LenderStatus;
    use crate::metadata::{AssetDetail, AssetListing, MetadataService};
    use crate::models::{Token, TokenMetadata, VaultKind, VaultTvl};
    use crate::resolver::AssetInfoCache;
    use async_trait::async_trait;
    use num_bigint::BigUint;

    struct EmptyMetadata;

    #[async_trait]
    impl MetadataService for EmptyMetadata {
        async fn list_assets(&self) -> Result<Vec<AssetListing>, TransportError> {
            Ok(vec![])
        }

        async fn asset_detail(&self, _id: &str) -> Result<Option<AssetDetail>, TransportError> {
            Ok(None)
        }
    }

    fn engine_with(chain: Arc<MockChainReader>) -> AttributionEngine {
        let tables = Arc::new(WrapperTables::load_default().unwrap());
        let resolver = Arc::new(TokenTreeResolver::new(
            chain.clone(),
            Arc::new(EmptyMetadata),
            Arc::new(AssetInfoCache::new()),
            tables.clone(),
        ));
        AttributionEngine::new(chain, tables, resolver)
    }

    fn test_vault(price: f64, token_decimals: u32) -> Vault {
        Vault {
            address: "0x0000000000000000000000000000000000000f01".into(),
            display_name: "DAI Vault".into(),
            kind: VaultKind::V2,
            decimals: 18,
            token: TokenMetadata {
                address: "0x6b175474e89094c44da98b954eedeac495271d0f".into(),
                symbol: "DAI".into(),
                decimals: token_decimals,
                display_name: "DAI".into(),
            },
            price_per_share: 0.0,
            strategies: vec![],
            deposit_token: None,
            tvl: Some(VaultTvl {
                total_assets: 0.0,
                price,
                tvl_usd: 0.0,
            }),
        }
    }

    fn strategy(address: &str, name: &str) -> Strategy {
        Strategy::new(address, name)
    }

    const WANT: &str = "0x0000000000000000000000000000000000000aaa";
    const STRAT: &str = "0x0000000000000000000000000000000000000bbb";

    fn stub_want(chain: &MockChainReader) {
        chain.stub_address(STRAT, "want", &[], WANT);
        chain.stub_text(WANT, "symbol", "CRV-LP");
        chain.stub_uint(WANT, "decimals", &[], 18);
    }

    #[tokio::test]
    async fn test_voter_proxy_attributes_to_curve() {
        let chain = Arc::new(MockChainReader::new());
        stub_want(&chain);
        chain.stub_uint(STRAT, "balanceOf", &[], 5_000_000_000_000_000_000);

        let engine = engine_with(chain);
        let vault = test_vault(2.0, 18);
        let universe = VaultUniverse::default();
        let result = engine
            .attribute(&strategy(STRAT, "StrategyCurveYVoterProxy"), &vault, &[], &universe)
            .await;

        assert!((result.balance - 5.0).abs() < 1e-9);
        assert!((result.balance_usd - 10.0).abs() < 1e-9);
        assert_eq!(result.protocols.len(), 1);
        assert_eq!(result.protocols[0].name, "Curve");
        assert_eq!(result.protocols[0].tokens.len(), 1);
        assert!((result.protocols[0].tokens[0].balance - 5.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_three_pool_splits_yearn_and_curve() {
        let chain = Arc::new(MockChainReader::new());
        stub_want(&chain);
        chain.stub_uint(STRAT, "balanceOfy3CRV", &[], 7_000_000_000_000_000_000);

        let engine = engine_with(chain);
        let vault = test_vault(1.0, 18);
        let universe = VaultUniverse::default();
        let result = engine
            .attribute(&strategy(STRAT, "StrategyDAI3pool"), &vault, &[], &universe)
            .await;

        assert!((result.balance - 7.0).abs() < 1e-9);
        let names: Vec<&str> = result.protocols.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, vec!["Yearn", "Curve"]);
        for protocol in &result.protocols {
            assert!((protocol.balance - 7.0).abs() < 1e-9);
        }
    }

    #[tokio::test]
    async fn test_tusd_ypool_uses_its_own_accessor() {
        let chain = Arc::new(MockChainReader::new());
        stub_want(&chain);
        chain.stub_uint(STRAT, "balanceOfYYCRV", &[], 3_000_000_000_000_000_000);

        let engine = engine_with(chain);
        let vault = test_vault(1.0, 18);
        let universe = VaultUniverse::default();
        let result = engine
            .attribute(&strategy(STRAT, "StrategyTUSDypool"), &vault, &[], &universe)
            .await;

        assert!((result.balance - 3.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_want_override_from_tables() {
        // this strategy address carries a want override, so want() must
        // never be called on chain
        let strat = "0x4f2fdebe0df5c92eee77ff902512d725f6dfe65c";
        let override_want = "0x9ca85572e6a3ebf24dedd195623f188735a5179f";
        let chain = Arc::new(MockChainReader::new());
        chain.stub_text(override_want, "symbol", "y3CRV");
        chain.stub_uint(override_want, "decimals", &[], 18);
        chain.stub_uint(strat, "balanceOf", &[], 1_000_000_000_000_000_000);

        let engine = engine_with(chain.clone());
        let vault = test_vault(1.0, 18);
        let universe = VaultUniverse::default();
        let result = engine
            .attribute(
                &strategy(strat, "StrategyCurveYVoterProxy"),
                &vault,
                &[],
                &universe,
            )
            .await;

        assert!((result.balance - 1.0).abs() < 1e-9);
        assert_eq!(result.protocols[0].tokens[0].symbol, "y3CRV");
    }

    #[tokio::test]
    async fn test_maker_delegate_reports_both_legs() {
        let strat = "0x39aff7827b9d0de80d86de295fe62f7818320b76";
        let weth = "0xc02aaa39b223fe8d0a0e5c4f27ead9083c756cc2";
        let dai = "0x6b175474e89094c44da98b954eedeac495271d0f";
        let yvdai = "0xacd43e627e64355f1861cec6d3a6688b31a6f952";

        let chain = Arc::new(MockChainReader::new());
        chain.stub_text(weth, "symbol", "WETH");
        chain.stub_uint(weth, "decimals", &[], 18);
        chain.stub_text(dai, "symbol", "DAI");
        chain.stub_uint(dai, "decimals", &[], 18);
        chain.stub_text(yvdai, "symbol", "yvDAI");
        chain.stub_uint(yvdai, "decimals", &[], 18);
        // 10 WETH collateral, 4000 DAI debt, 3950 yvDAI shares
        chain.stub_uint(strat, "balanceOfmVault", &[], 10_000_000_000_000_000_000);
        chain.stub_uint(strat, "getTotalDebtAmount", &[], 4_000_000_000_000_000_000_000);
        chain.stub_uint(
            yvdai,
            "balanceOf",
            &[CallArg::Address(strat.to_string())],
            3_950_000_000_000_000_000_000,
        );

        let engine = engine_with(chain);
        let vault = test_vault(3000.0, 18);
        let universe = VaultUniverse::default();
        let result = engine
            .attribute(
                &strategy(strat, "StrategyMKRVaultDAIDelegate"),
                &vault,
                &[],
                &universe,
            )
            .await;

        assert!((result.balance - 10.0).abs() < 1e-9);
        assert!((result.balance_usd - 30000.0).abs() < 1e-6);
        assert_eq!(result.protocols.len(), 2);
        assert_eq!(result.protocols[0].name, "Maker");
        assert_eq!(result.protocols[0].tokens.len(), 2);
        assert_eq!(result.protocols[1].name, "Yearn");
        assert!((result.protocols[1].balance - 4000.0).abs() < 1e-6);
        assert!((result.protocols[1].tokens[0].balance - 3950.0).abs() < 1e-6);
    }

    #[tokio::test]
    async fn test_lender_optimiser_normalizes_market_names() {
        let chain = Arc::new(MockChainReader::new());
        chain.stub(
            STRAT,
            "lendStatuses",
            &[],
            CallValue::LenderStatuses(vec![
                LenderStatus {
                    name: "aave-v2".into(),
                    assets: BigUint::from(60_000_000u64),
                },
                LenderStatus {
                    name: "ib-usdc".into(),
                    assets: BigUint::from(40_000_000u64),
                },
            ]),
        );
        chain.stub_uint(STRAT, "lentTotalAssets", &[], 100_000_000);

        let engine = engine_with(chain);
        // 6-decimal deposit token
        let vault = test_vault(1.0, 6);
        let universe = VaultUniverse::default();
        let result = engine
            .attribute(
                &strategy(STRAT, "StrategyLenderYieldOptimiser"),
                &vault,
                &[],
                &universe,
            )
            .await;

        assert!((result.balance - 100.0).abs() < 1e-9);
        let names: Vec<&str> = result.protocols.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, vec!["Aave", "Iron Bank"]);
        assert!((result.protocols[0].balance - 60.0).abs() < 1e-9);
        assert!((result.protocols[1].balance - 40.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_unmatched_strategy_reports_unknown() {
        let chain = Arc::new(MockChainReader::new());
        chain.stub_uint(STRAT, "balanceOf", &[], 2_000_000_000_000_000_000);

        let engine = engine_with(chain);
        let vault = test_vault(1.5, 18);
        let universe = VaultUniverse::default();
        let result = engine
            .attribute(&strategy(STRAT, "StrategyBrandNew"), &vault, &[], &universe)
            .await;

        assert!((result.balance - 2.0).abs() < 1e-9);
        assert!((result.balance_usd - 3.0).abs() < 1e-9);
        assert_eq!(result.protocols.len(), 1);
        assert_eq!(result.protocols[0].name, "Unknown");
    }

    #[tokio::test]
    async fn test_accessor_failure_zeroes_the_strategy() {
        let chain = Arc::new(MockChainReader::new());
        stub_want(&chain);
        chain.fail_method(STRAT, "balanceOf");

        let engine = engine_with(chain);
        let vault = test_vault(1.0, 18);
        let universe = VaultUniverse::default();
        let result = engine
            .attribute(&strategy(STRAT, "StrategyCurveYVoterProxy"), &vault, &[], &universe)
            .await;

        assert_eq!(result.balance, 0.0);
        assert_eq!(result.balance_usd, 0.0);
        assert!(result.protocols.is_empty());
    }

    #[test]
    fn test_attribution_default_is_zeroed() {
        let attribution = Attribution::default();
        assert_eq!(attribution.balance, 0.0);
        assert!(attribution.protocols.is_empty());
    }
}
