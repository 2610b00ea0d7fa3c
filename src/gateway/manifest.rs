//! Production manifest cache.
//!
//! A time-boxed cache in front of [`GatewayResolver`] for the production
//! sponsor manifest, persisted across process restarts through the KV store.
//! On a cold or expired cache the production hash is attempted twice (to
//! absorb one transient gateway error) before degrading to the built-in
//! development fallback manifest, so downstream code never sees an empty or
//! absent manifest.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use super::resolver::GatewayResolver;
use crate::config::Config;
use crate::storage::KvStore;
use crate::types::ContentHash;

/// KV key for the persisted production manifest.
const MANIFEST_KEY: &str = "manifest:production";

// ============================================================================
// Model
// ============================================================================

/// Sponsor/content manifest, keyed by its content hash upstream.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Manifest {
    pub version: String,
    #[serde(default)]
    pub sponsors: Vec<SponsorEntry>,
}

/// One sponsor/content entry in the manifest.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SponsorEntry {
    pub id: String,
    #[serde(default)]
    pub name: String,
    pub placement: String,
    pub active: bool,
    #[serde(default)]
    pub priority: u32,
    /// Nested asset reference, itself a content hash
    #[serde(default)]
    pub asset: Option<ContentHash>,
    #[serde(default)]
    pub link: Option<String>,
}

/// Sponsor entries for one placement, filtered and ordered.
#[derive(Debug, Clone, Serialize)]
pub struct SponsorData {
    pub sponsors: Vec<SponsorEntry>,
}

impl Manifest {
    /// Built-in development fallback, returned when every gateway fails.
    /// Clearly tagged and never empty.
    pub fn dev_fallback() -> Self {
        Self {
            version: "dev-fallback".to_string(),
            sponsors: vec![SponsorEntry {
                id: "dev-banner".to_string(),
                name: "Backline".to_string(),
                placement: "home".to_string(),
                active: true,
                priority: 1,
                asset: None,
                link: Some("https://backline.app".to_string()),
            }],
        }
    }
}

/// Persisted cache entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct CachedManifest {
    manifest: Manifest,
    fetched_at: DateTime<Utc>,
}

// ============================================================================
// Cache
// ============================================================================

/// TTL-boxed manifest cache with KV persistence.
pub struct ManifestCache {
    resolver: Arc<GatewayResolver>,
    store: Arc<dyn KvStore>,
    production_hash: ContentHash,
    ttl: Duration,
    attempts: u32,
    /// In-memory copy of the last loaded manifest (fallback included), so
    /// sponsor lookups after a load never re-read the KV store
    current: RwLock<Option<CachedManifest>>,
}

impl ManifestCache {
    pub fn new(config: &Config, resolver: Arc<GatewayResolver>, store: Arc<dyn KvStore>) -> Self {
        Self {
            resolver,
            store,
            production_hash: ContentHash::new(config.manifest_hash.clone()),
            ttl: config.manifest_ttl,
            attempts: config.manifest_attempts.max(1),
            current: RwLock::new(None),
        }
    }

    fn is_fresh(&self, cached: &CachedManifest) -> bool {
        let age = Utc::now().signed_duration_since(cached.fetched_at);
        age >= chrono::Duration::zero()
            && age.to_std().map(|a| a < self.ttl).unwrap_or(false)
    }

    /// Load the current manifest.
    ///
    /// A fresh in-memory or persisted copy short-circuits with zero network
    /// calls. Otherwise the production hash is resolved (up to the configured
    /// attempt count) and persisted; exhaustion degrades to
    /// [`Manifest::dev_fallback`].
    pub async fn load(&self) -> Manifest {
        // 1. In-memory copy
        {
            let current = self.current.read().await;
            if let Some(cached) = current.as_ref() {
                if self.is_fresh(cached) {
                    debug!("Manifest served from memory");
                    return cached.manifest.clone();
                }
            }
        }

        // 2. Persisted copy
        match self.store.get(MANIFEST_KEY) {
            Ok(Some(raw)) => match serde_json::from_str::<CachedManifest>(&raw) {
                Ok(cached) if self.is_fresh(&cached) => {
                    debug!(fetched_at = %cached.fetched_at, "Manifest served from persisted cache");
                    let manifest = cached.manifest.clone();
                    *self.current.write().await = Some(cached);
                    return manifest;
                }
                Ok(cached) => {
                    debug!(fetched_at = %cached.fetched_at, "Persisted manifest expired");
                }
                Err(e) => {
                    warn!(error = %e, "Persisted manifest unreadable, refetching");
                }
            },
            Ok(None) => {}
            Err(e) => {
                warn!(error = %e, "KV read failed, refetching manifest");
            }
        }

        // 3. Network, with a bounded retry to absorb one transient failure
        for attempt in 1..=self.attempts {
            match self.resolver.resolve_manifest(&self.production_hash).await {
                Ok(manifest) => {
                    info!(attempt, version = %manifest.version, "Production manifest fetched");
                    let cached = CachedManifest {
                        manifest: manifest.clone(),
                        fetched_at: Utc::now(),
                    };
                    if let Ok(raw) = serde_json::to_string(&cached) {
                        if let Err(e) = self.store.set(MANIFEST_KEY, &raw) {
                            warn!(error = %e, "Failed to persist manifest");
                        }
                    }
                    *self.current.write().await = Some(cached);
                    return manifest;
                }
                Err(e) => {
                    warn!(attempt, error = %e, "Production manifest fetch failed");
                }
            }
        }

        // 4. Dev fallback, kept in memory for sponsor lookups but marked
        // stale so the next load retries the network
        warn!("All manifest attempts failed, serving dev fallback");
        let fallback = Manifest::dev_fallback();
        *self.current.write().await = Some(CachedManifest {
            manifest: fallback.clone(),
            fetched_at: DateTime::<Utc>::UNIX_EPOCH,
        });
        fallback
    }

    /// Clear the persisted entry and the in-memory copy. Asset cache entries
    /// are independent and survive.
    pub async fn invalidate(&self) {
        if let Err(e) = self.store.remove(MANIFEST_KEY) {
            warn!(error = %e, "Failed to remove persisted manifest");
        }
        *self.current.write().await = None;
        info!("Manifest cache invalidated");
    }

    /// [`ManifestCache::invalidate`] plus a full asset cache clear.
    pub async fn invalidate_with_assets(&self) {
        self.invalidate().await;
        self.resolver.asset_cache().clear();
    }

    /// Active sponsor entries for a placement, sorted by ascending priority.
    /// Loads the manifest if needed.
    pub async fn sponsor_data(&self, placement: &str) -> SponsorData {
        let manifest = self.load().await;
        let mut sponsors: Vec<SponsorEntry> = manifest
            .sponsors
            .into_iter()
            .filter(|s| s.active && s.placement == placement)
            .collect();
        sponsors.sort_by_key(|s| s.priority);
        SponsorData { sponsors }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryKv;
    use reqwest::Client;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const HASH: &str = "QmProductionManifest";

    fn manifest_json() -> serde_json::Value {
        serde_json::json!({
            "version": "3.2",
            "sponsors": [
                {"id": "b", "name": "B", "placement": "home", "active": true, "priority": 2},
                {"id": "a", "name": "A", "placement": "home", "active": true, "priority": 1},
                {"id": "c", "name": "C", "placement": "player", "active": true, "priority": 1},
                {"id": "d", "name": "D", "placement": "home", "active": false, "priority": 0}
            ]
        })
    }

    fn cache_for(server: &MockServer, gateways: usize) -> ManifestCache {
        let config = Config {
            gateways: (1..=gateways)
                .map(|i| format!("{}/gw{}", server.uri(), i))
                .collect(),
            gateway_timeout: Duration::from_millis(500),
            manifest_hash: HASH.to_string(),
            ..Config::default()
        };
        let resolver = Arc::new(GatewayResolver::new(&config, Client::new()));
        ManifestCache::new(&config, resolver, Arc::new(MemoryKv::new()))
    }

    #[tokio::test]
    async fn test_all_gateways_down_serves_dev_fallback_after_two_attempts() {
        let server = MockServer::start().await;
        // two gateways, each hit once per attempt, two attempts
        for gw in 1..=2 {
            Mock::given(method("GET"))
                .and(path(format!("/gw{}/{}", gw, HASH)))
                .respond_with(ResponseTemplate::new(500))
                .expect(2)
                .mount(&server)
                .await;
        }

        let cache = cache_for(&server, 2);
        let manifest = cache.load().await;

        assert_eq!(manifest.version, "dev-fallback");
        assert!(!manifest.sponsors.is_empty());
    }

    #[tokio::test]
    async fn test_second_load_within_ttl_hits_no_network() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(format!("/gw1/{}", HASH)))
            .respond_with(ResponseTemplate::new(200).set_body_json(manifest_json()))
            .expect(1)
            .mount(&server)
            .await;

        let cache = cache_for(&server, 1);
        let first = cache.load().await;
        let second = cache.load().await;

        assert_eq!(first.version, "3.2");
        assert_eq!(first, second);
        // mock .expect(1) verifies the second call issued zero requests
    }

    #[tokio::test]
    async fn test_persisted_entry_survives_new_cache_instance() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(format!("/gw1/{}", HASH)))
            .respond_with(ResponseTemplate::new(200).set_body_json(manifest_json()))
            .expect(1)
            .mount(&server)
            .await;

        let config = Config {
            gateways: vec![format!("{}/gw1", server.uri())],
            gateway_timeout: Duration::from_millis(500),
            manifest_hash: HASH.to_string(),
            ..Config::default()
        };
        let store: Arc<dyn KvStore> = Arc::new(MemoryKv::new());

        let resolver = Arc::new(GatewayResolver::new(&config, Client::new()));
        let cache = ManifestCache::new(&config, Arc::clone(&resolver), Arc::clone(&store));
        cache.load().await;

        // a fresh cache over the same store restarts with zero network calls
        let restarted = ManifestCache::new(&config, resolver, store);
        let manifest = restarted.load().await;
        assert_eq!(manifest.version, "3.2");
    }

    #[tokio::test]
    async fn test_invalidate_forces_refetch() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(format!("/gw1/{}", HASH)))
            .respond_with(ResponseTemplate::new(200).set_body_json(manifest_json()))
            .expect(2)
            .mount(&server)
            .await;

        let cache = cache_for(&server, 1);
        cache.load().await;
        cache.invalidate().await;
        let manifest = cache.load().await;
        assert_eq!(manifest.version, "3.2");
    }

    #[tokio::test]
    async fn test_fallback_is_not_persisted_as_fresh() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(format!("/gw1/{}", HASH)))
            .respond_with(ResponseTemplate::new(500))
            .expect(4) // 2 attempts per load, 2 loads
            .mount(&server)
            .await;

        let cache = cache_for(&server, 1);
        assert_eq!(cache.load().await.version, "dev-fallback");
        // the fallback must not short-circuit the next load
        assert_eq!(cache.load().await.version, "dev-fallback");
    }

    #[tokio::test]
    async fn test_sponsor_data_filters_and_orders() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(format!("/gw1/{}", HASH)))
            .respond_with(ResponseTemplate::new(200).set_body_json(manifest_json()))
            .mount(&server)
            .await;

        let cache = cache_for(&server, 1);
        let data = cache.sponsor_data("home").await;

        // inactive "d" excluded, "player" placement excluded, priority order
        let ids: Vec<&str> = data.sponsors.iter().map(|s| s.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b"]);
    }
}
