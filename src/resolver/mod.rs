//! Token resolution: classification tables, the asset info cache and
//! the recursive tree decoder.

pub mod asset_cache;
pub mod classifier;
pub mod token_tree;

pub use asset_cache::AssetInfoCache;
pub use classifier::{StrategyAsset, Wrapper, WrapperTables};
pub use token_tree::{TokenTreeResolver, VaultPriceHint, VaultRef, VaultUniverse};
