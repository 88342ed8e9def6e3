//! Shared per-address metadata cache.
//!
//! One entry per address, whole-entry replacement, last writer wins.
//! Concurrent resolutions for the same address converge to equivalent
//! values (modulo price staleness), so a plain lock around single-entry
//! reads and writes is all the coordination this needs.

use parking_lot::RwLock;
use std::collections::HashMap;

use crate::models::{norm_addr, AssetInfo};

#[derive(Default)]
pub struct AssetInfoCache {
    inner: RwLock<HashMap<String, AssetInfo>>,
}

impl AssetInfoCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed the cache with known entries, e.g. a shipped asset file.
    pub fn seeded(entries: Vec<AssetInfo>) -> Self {
        let cache = Self::new();
        for entry in entries {
            cache.put(entry);
        }
        cache
    }

    pub fn get(&self, address: &str) -> Option<AssetInfo> {
        self.inner.read().get(&norm_addr(address)).cloned()
    }

    pub fn put(&self, mut info: AssetInfo) {
        info.address = norm_addr(&info.address);
        self.inner.write().insert(info.address.clone(), info);
    }

    pub fn len(&self) -> usize {
        self.inner.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.read().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::DEFAULT_DESCRIPTION;

    fn info(address: &str, price: f64, updated: bool) -> AssetInfo {
        AssetInfo {
            address: address.to_string(),
            symbol: "DAI".into(),
            decimals: 18,
            description: DEFAULT_DESCRIPTION.into(),
            price,
            price_updated: updated,
        }
    }

    #[test]
    fn test_last_writer_wins() {
        let cache = AssetInfoCache::new();
        cache.put(info("0xAbC0000000000000000000000000000000000001", 1.0, false));
        cache.put(info("0xabc0000000000000000000000000000000000001", 1.01, true));
        assert_eq!(cache.len(), 1);
        let entry = cache.get("0xABC0000000000000000000000000000000000001").unwrap();
        assert_eq!(entry.price, 1.01);
        assert!(entry.price_updated);
    }

    #[test]
    fn test_miss_returns_none() {
        let cache = AssetInfoCache::new();
        assert!(cache.get("0x0000000000000000000000000000000000000001").is_none());
    }
}
