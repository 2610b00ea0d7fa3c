//! Asset handle cache.
//!
//! Maps content hash to a resolved handle. Assets are content-addressed, so
//! a resolved entry is valid for the lifetime of the process; the cache is
//! unbounded and only an explicit [`AssetCache::clear`] removes entries.

use bytes::Bytes;
use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{debug, info};

use crate::types::ContentHash;

/// A resolved (or best-effort) reference to a content-addressed asset.
///
/// When resolution succeeds `bytes` holds the fetched content and `url` names
/// the gateway that served it. When every gateway fails the handle is
/// unresolved: `bytes` is empty and `url` is a direct link to the last-resort
/// gateway for the UI layer to lazy-load.
#[derive(Debug, Clone)]
pub struct AssetHandle {
    pub hash: ContentHash,
    pub url: String,
    pub bytes: Option<Bytes>,
    pub resolved: bool,
}

impl AssetHandle {
    pub fn resolved(hash: ContentHash, url: String, bytes: Bytes) -> Self {
        Self {
            hash,
            url,
            bytes: Some(bytes),
            resolved: true,
        }
    }

    /// Best-effort direct link, content not fetched.
    pub fn unresolved(hash: ContentHash, url: String) -> Self {
        Self {
            hash,
            url,
            bytes: None,
            resolved: false,
        }
    }
}

/// Cache statistics.
#[derive(Debug, Clone, Default)]
pub struct AssetCacheStats {
    pub item_count: usize,
    pub hits: u64,
    pub misses: u64,
}

impl AssetCacheStats {
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            (self.hits as f64 / total as f64) * 100.0
        }
    }
}

/// Process-wide asset handle cache. O(1) operations via DashMap.
#[derive(Default)]
pub struct AssetCache {
    entries: DashMap<String, AssetHandle>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl AssetCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get a resolved handle. O(1).
    pub fn get(&self, hash: &ContentHash) -> Option<AssetHandle> {
        if let Some(entry) = self.entries.get(hash.as_str()) {
            self.hits.fetch_add(1, Ordering::Relaxed);
            debug!(hash = %hash, "Asset cache hit");
            return Some(entry.clone());
        }
        self.misses.fetch_add(1, Ordering::Relaxed);
        debug!(hash = %hash, "Asset cache miss");
        None
    }

    /// Store a handle. Only resolved handles belong here; unresolved
    /// best-effort links are returned to the caller without caching so the
    /// next request retries the gateways.
    pub fn insert(&self, handle: AssetHandle) {
        debug!(hash = %handle.hash, url = %handle.url, "Asset cached");
        self.entries.insert(handle.hash.as_str().to_string(), handle);
    }

    pub fn contains(&self, hash: &ContentHash) -> bool {
        self.entries.contains_key(hash.as_str())
    }

    /// Drop every entry.
    pub fn clear(&self) {
        let count = self.entries.len();
        self.entries.clear();
        info!(dropped = count, "Asset cache cleared");
    }

    pub fn stats(&self) -> AssetCacheStats {
        AssetCacheStats {
            item_count: self.entries.len(),
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cache_roundtrip() {
        let cache = AssetCache::new();
        let hash = ContentHash::from("QmCover123");

        assert!(cache.get(&hash).is_none());

        cache.insert(AssetHandle::resolved(
            hash.clone(),
            "https://ipfs.io/ipfs/QmCover123".to_string(),
            Bytes::from_static(b"jpeg bytes"),
        ));

        let handle = cache.get(&hash).expect("should be cached");
        assert!(handle.resolved);
        assert_eq!(handle.bytes.as_deref(), Some(&b"jpeg bytes"[..]));

        let stats = cache.stats();
        assert_eq!(stats.item_count, 1);
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
    }

    #[test]
    fn test_clear_drops_entries() {
        let cache = AssetCache::new();
        cache.insert(AssetHandle::resolved(
            ContentHash::from("QmA"),
            "u".to_string(),
            Bytes::new(),
        ));
        cache.clear();
        assert!(!cache.contains(&ContentHash::from("QmA")));
        assert_eq!(cache.stats().item_count, 0);
    }
}
