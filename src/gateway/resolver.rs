//! Gateway resolver - ordered fallback over public content gateways.
//!
//! Resolution walks the configured gateway list in order and returns the
//! first usable response. This is deliberately not a race: determinism and
//! bandwidth economy win over minimum latency, and for a given hash and
//! failure pattern the serving gateway is reproducible.
//!
//! A privileged proxy, when configured, is tried before the public list with
//! a longer timeout; any proxy failure is soft and falls through to the
//! public path.

use bytes::Bytes;
use reqwest::Client;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use super::assets::{AssetCache, AssetHandle};
use super::manifest::Manifest;
use super::GatewayError;
use crate::config::Config;
use crate::types::ContentHash;

/// Resolves content hashes into parsed manifests or asset handles despite
/// individual gateway failure.
pub struct GatewayResolver {
    client: Client,
    gateways: Vec<String>,
    proxy_url: Option<String>,
    gateway_timeout: Duration,
    proxy_timeout: Duration,
    assets: Arc<AssetCache>,
}

impl GatewayResolver {
    pub fn new(config: &Config, client: Client) -> Self {
        info!(
            gateways = config.gateways.len(),
            proxy = config.proxy_url.is_some(),
            "GatewayResolver initialized"
        );
        Self {
            client,
            gateways: config.gateways.clone(),
            proxy_url: config.proxy_url.clone(),
            gateway_timeout: config.gateway_timeout,
            proxy_timeout: config.proxy_timeout,
            assets: Arc::new(AssetCache::new()),
        }
    }

    /// Shared asset cache handle.
    pub fn asset_cache(&self) -> Arc<AssetCache> {
        Arc::clone(&self.assets)
    }

    /// The direct URL for `hash` at gateway `base`.
    fn gateway_url(base: &str, hash: &ContentHash) -> String {
        format!("{}/{}", base.trim_end_matches('/'), hash)
    }

    /// Resolve a subpath under a content hash (directory-style content, e.g.
    /// `<hash>/cover.jpg`). Same lenient semantics as
    /// [`GatewayResolver::resolve_asset`].
    pub async fn resolve_asset_at(&self, hash: &ContentHash, subpath: &str) -> AssetHandle {
        let keyed = ContentHash::new(format!("{}/{}", hash, subpath.trim_start_matches('/')));
        self.resolve_asset(&keyed).await
    }

    /// True when a body is an HTML error page rather than content. Gateways
    /// are known to answer 200 with a branded error page.
    fn looks_like_html(body: &str) -> bool {
        // covers both a doctype preamble and a bare leading tag; JSON never
        // starts with '<'
        body.trim_start().starts_with('<')
    }

    // ========================================================================
    // Manifest resolution (strict)
    // ========================================================================

    /// Resolve a content hash into a parsed [`Manifest`].
    ///
    /// Tries the privileged proxy first when configured (soft failure), then
    /// each public gateway in order. Returns
    /// [`GatewayError::AllGatewaysFailed`] carrying the last failure when the
    /// list is exhausted.
    pub async fn resolve_manifest(&self, hash: &ContentHash) -> Result<Manifest, GatewayError> {
        if let Some(ref proxy) = self.proxy_url {
            let url = Self::gateway_url(proxy, hash);
            match self.fetch_manifest(&url, self.proxy_timeout).await {
                Ok(manifest) => {
                    info!(hash = %hash, url = %url, "Manifest resolved via proxy");
                    return Ok(manifest);
                }
                Err(e) => {
                    // Proxy problems never fail the call
                    warn!(hash = %hash, error = %e, "Proxy fetch failed, falling back to public gateways");
                }
            }
        }

        let mut last_error: Option<GatewayError> = None;
        for base in &self.gateways {
            let url = Self::gateway_url(base, hash);
            debug!(hash = %hash, url = %url, "Trying gateway");
            match self.fetch_manifest(&url, self.gateway_timeout).await {
                Ok(manifest) => {
                    info!(hash = %hash, url = %url, "Manifest resolved");
                    return Ok(manifest);
                }
                Err(e) => {
                    warn!(hash = %hash, url = %url, error = %e, "Gateway failed, trying next");
                    last_error = Some(e);
                }
            }
        }

        Err(GatewayError::AllGatewaysFailed {
            last: last_error
                .map(|e| e.to_string())
                .unwrap_or_else(|| "no gateways configured".to_string()),
        })
    }

    async fn fetch_manifest(&self, url: &str, timeout: Duration) -> Result<Manifest, GatewayError> {
        let response = self
            .client
            .get(url)
            .timeout(timeout)
            .send()
            .await
            .map_err(|e| GatewayError::FetchFailed(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(GatewayError::BadStatus {
                status: status.as_u16(),
                url: url.to_string(),
            });
        }

        let body = response
            .text()
            .await
            .map_err(|e| GatewayError::FetchFailed(e.to_string()))?;

        if Self::looks_like_html(&body) {
            return Err(GatewayError::HtmlBody(url.to_string()));
        }

        serde_json::from_str(&body).map_err(|e| GatewayError::ParseFailed(e.to_string()))
    }

    // ========================================================================
    // Asset resolution (lenient)
    // ========================================================================

    /// Resolve a content hash into an [`AssetHandle`]. Never fails: when
    /// every gateway is down the handle degrades to a direct link at the
    /// last-resort gateway for the UI layer to lazy-load.
    pub async fn resolve_asset(&self, hash: &ContentHash) -> AssetHandle {
        if let Some(handle) = self.assets.get(hash) {
            return handle;
        }

        for base in &self.gateways {
            let url = Self::gateway_url(base, hash);
            match self.fetch_bytes(&url, self.gateway_timeout).await {
                Ok(bytes) => {
                    info!(hash = %hash, url = %url, size = bytes.len(), "Asset resolved");
                    let handle = AssetHandle::resolved(hash.clone(), url, bytes);
                    self.assets.insert(handle.clone());
                    return handle;
                }
                Err(e) => {
                    warn!(hash = %hash, url = %url, error = %e, "Asset gateway failed, trying next");
                }
            }
        }

        // Best-effort link; not cached so the next request retries
        let last_resort = self
            .gateways
            .last()
            .map(|base| Self::gateway_url(base, hash))
            .unwrap_or_else(|| hash.to_string());
        warn!(hash = %hash, url = %last_resort, "All gateways failed, returning unresolved asset link");
        AssetHandle::unresolved(hash.clone(), last_resort)
    }

    async fn fetch_bytes(&self, url: &str, timeout: Duration) -> Result<Bytes, GatewayError> {
        let response = self
            .client
            .get(url)
            .timeout(timeout)
            .send()
            .await
            .map_err(|e| GatewayError::FetchFailed(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(GatewayError::BadStatus {
                status: status.as_u16(),
                url: url.to_string(),
            });
        }

        response
            .bytes()
            .await
            .map_err(|e| GatewayError::FetchFailed(e.to_string()))
    }
}

// ============================================================================
// Tests
// ============================================================================
