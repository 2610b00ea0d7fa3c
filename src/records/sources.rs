//! Source abstractions and their HTTP implementations.
//!
//! Each upstream sits behind an `async_trait` seam so the provider can be
//! exercised against in-memory doubles. The HTTP implementations share one
//! `reqwest::Client`, carry an explicit per-request timeout, and map every
//! transport problem into [`RecordError::Upstream`] for the provider to
//! absorb.

use async_trait::async_trait;
use dashmap::DashMap;
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

use super::types::{Beat, Producer, RecordSource};
use super::RecordError;
use crate::types::WalletAddress;

// ============================================================================
// Traits
// ============================================================================

/// Authoritative on-chain ledger reads.
#[async_trait]
pub trait LedgerSource: Send + Sync {
    async fn producer(&self, wallet: &WalletAddress) -> Result<Option<Producer>, RecordError>;
    async fn beat_by_token(&self, token_id: u64) -> Result<Option<Beat>, RecordError>;
    async fn producer_beats(&self, wallet: &WalletAddress) -> Result<Vec<Beat>, RecordError>;
    async fn featured_beats(&self) -> Result<Vec<Beat>, RecordError>;
    async fn all_producers(&self) -> Result<Vec<Producer>, RecordError>;
}

/// Managed content store reads.
#[async_trait]
pub trait ContentStore: Send + Sync {
    async fn producer_by_id(&self, id: &str) -> Result<Option<Producer>, RecordError>;
    async fn beat_by_slug(&self, slug: &str) -> Result<Option<Beat>, RecordError>;
    async fn producer_beats(&self, producer_id: &str) -> Result<Vec<Beat>, RecordError>;
    async fn all_producers(&self) -> Result<Vec<Producer>, RecordError>;
}

/// Community shared-beats endpoint.
#[async_trait]
pub trait CommunityFeed: Send + Sync {
    async fn shared_beats(&self) -> Result<Vec<Beat>, RecordError>;
}

/// Server-side metadata-by-id endpoint for local/ephemeral beats.
#[async_trait]
pub trait BeatMetadata: Send + Sync {
    async fn beat(&self, id: u64) -> Result<Option<Beat>, RecordError>;
}

// ============================================================================
// Session index (local ephemeral beats)
// ============================================================================

/// In-process index of ephemeral beats (uploads not yet on chain), keyed by
/// their timestamp-derived local id.
#[derive(Default)]
pub struct SessionIndex {
    beats: DashMap<u64, Beat>,
}

impl SessionIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, id: u64) -> Option<Beat> {
        self.beats.get(&id).map(|b| b.clone())
    }

    pub fn put(&self, id: u64, beat: Beat) {
        debug!(id, title = %beat.title, "Session beat indexed");
        self.beats.insert(id, beat);
    }

    pub fn remove(&self, id: u64) {
        self.beats.remove(&id);
    }

    /// All session beats, newest first.
    pub fn recent(&self) -> Vec<Beat> {
        let mut beats: Vec<Beat> = self.beats.iter().map(|e| e.clone()).collect();
        beats.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        beats
    }
}

// ============================================================================
// HTTP implementations
// ============================================================================

/// Ledger indexer REST client. Beats and producers from here are tagged
/// `web3` (priority 1).
pub struct HttpLedger {
    client: Client,
    base: String,
    timeout: Duration,
}

impl HttpLedger {
    pub fn new(client: Client, base: impl Into<String>, timeout: Duration) -> Self {
        Self {
            client,
            base: base.into(),
            timeout,
        }
    }
}

async fn get_json<T: serde::de::DeserializeOwned>(
    client: &Client,
    url: &str,
    timeout: Duration,
) -> Result<Option<T>, RecordError> {
    let response = client
        .get(url)
        .timeout(timeout)
        .send()
        .await
        .map_err(|e| RecordError::Upstream(e.to_string()))?;

    // a miss is a miss, not an error
    if response.status() == reqwest::StatusCode::NOT_FOUND {
        return Ok(None);
    }
    if !response.status().is_success() {
        return Err(RecordError::Upstream(format!(
            "HTTP {} from {}",
            response.status(),
            url
        )));
    }

    response
        .json::<T>()
        .await
        .map(Some)
        .map_err(|e| RecordError::Malformed(e.to_string()))
}

#[async_trait]
impl LedgerSource for HttpLedger {
    async fn producer(&self, wallet: &WalletAddress) -> Result<Option<Producer>, RecordError> {
        let url = format!("{}/producers/{}", self.base, wallet);
        let producer: Option<Producer> = get_json(&self.client, &url, self.timeout).await?;
        Ok(producer.map(|mut p| {
            p.source = RecordSource::Web3;
            p
        }))
    }

    async fn beat_by_token(&self, token_id: u64) -> Result<Option<Beat>, RecordError> {
        let url = format!("{}/beats/{}", self.base, token_id);
        let beat: Option<Beat> = get_json(&self.client, &url, self.timeout).await?;
        Ok(beat.map(|b| b.tagged(RecordSource::Web3)))
    }

    async fn producer_beats(&self, wallet: &WalletAddress) -> Result<Vec<Beat>, RecordError> {
        let url = format!("{}/producers/{}/beats", self.base, wallet);
        let beats: Option<Vec<Beat>> = get_json(&self.client, &url, self.timeout).await?;
        Ok(beats
            .unwrap_or_default()
            .into_iter()
            .map(|b| b.tagged(RecordSource::Web3))
            .collect())
    }

    async fn featured_beats(&self) -> Result<Vec<Beat>, RecordError> {
        let url = format!("{}/beats/featured", self.base);
        let beats: Option<Vec<Beat>> = get_json(&self.client, &url, self.timeout).await?;
        Ok(beats
            .unwrap_or_default()
            .into_iter()
            .map(|b| b.tagged(RecordSource::Web3))
            .collect())
    }

    async fn all_producers(&self) -> Result<Vec<Producer>, RecordError> {
        let url = format!("{}/producers", self.base);
        let producers: Option<Vec<Producer>> = get_json(&self.client, &url, self.timeout).await?;
        Ok(producers
            .unwrap_or_default()
            .into_iter()
            .map(|mut p| {
                p.source = RecordSource::Web3;
                p
            })
            .collect())
    }
}

/// Managed content store client. Records are tagged `sanity` (priority 2).
pub struct HttpContentStore {
    client: Client,
    base: String,
    timeout: Duration,
}

impl HttpContentStore {
    pub fn new(client: Client, base: impl Into<String>, timeout: Duration) -> Self {
        Self {
            client,
            base: base.into(),
            timeout,
        }
    }
}

#[async_trait]
impl ContentStore for HttpContentStore {
    async fn producer_by_id(&self, id: &str) -> Result<Option<Producer>, RecordError> {
        let url = format!("{}/producers/{}", self.base, id);
        let producer: Option<Producer> = get_json(&self.client, &url, self.timeout).await?;
        Ok(producer.map(|mut p| {
            p.source = RecordSource::Sanity;
            p
        }))
    }

    async fn beat_by_slug(&self, slug: &str) -> Result<Option<Beat>, RecordError> {
        let url = format!("{}/beats/{}", self.base, slug);
        let beat: Option<Beat> = get_json(&self.client, &url, self.timeout).await?;
        Ok(beat.map(|b| b.tagged(RecordSource::Sanity)))
    }

    async fn producer_beats(&self, producer_id: &str) -> Result<Vec<Beat>, RecordError> {
        let url = format!("{}/producers/{}/beats", self.base, producer_id);
        let beats: Option<Vec<Beat>> = get_json(&self.client, &url, self.timeout).await?;
        Ok(beats
            .unwrap_or_default()
            .into_iter()
            .map(|b| b.tagged(RecordSource::Sanity))
            .collect())
    }

    async fn all_producers(&self) -> Result<Vec<Producer>, RecordError> {
        let url = format!("{}/producers", self.base);
        let producers: Option<Vec<Producer>> = get_json(&self.client, &url, self.timeout).await?;
        Ok(producers
            .unwrap_or_default()
            .into_iter()
            .map(|mut p| {
                p.source = RecordSource::Sanity;
                p
            })
            .collect())
    }
}

/// Community shared-beats wire shape: `{ success, beats }`.
#[derive(Debug, Deserialize)]
struct SharedBeatsResponse {
    #[serde(default)]
    success: bool,
    #[serde(default)]
    beats: Vec<Beat>,
}

/// Community endpoint client. Shared beats are content-store material,
/// tagged `sanity`.
pub struct HttpCommunityFeed {
    client: Client,
    url: String,
    timeout: Duration,
}

impl HttpCommunityFeed {
    pub fn new(client: Client, url: impl Into<String>, timeout: Duration) -> Self {
        Self {
            client,
            url: url.into(),
            timeout,
        }
    }
}

#[async_trait]
impl CommunityFeed for HttpCommunityFeed {
    async fn shared_beats(&self) -> Result<Vec<Beat>, RecordError> {
        let response: Option<SharedBeatsResponse> =
            get_json(&self.client, &self.url, self.timeout).await?;
        Ok(match response {
            Some(r) if r.success => r
                .beats
                .into_iter()
                .map(|b| b.tagged(RecordSource::Sanity))
                .collect(),
            _ => Vec::new(),
        })
    }
}

/// Metadata-by-id endpoint client: GET `<base>/<id>` returns a flat
/// beat-shaped JSON object, or non-2xx on miss.
pub struct HttpMetadata {
    client: Client,
    base: String,
    timeout: Duration,
}

impl HttpMetadata {
    pub fn new(client: Client, base: impl Into<String>, timeout: Duration) -> Self {
        Self {
            client,
            base: base.into(),
            timeout,
        }
    }
}

#[async_trait]
impl BeatMetadata for HttpMetadata {
    async fn beat(&self, id: u64) -> Result<Option<Beat>, RecordError> {
        let url = format!("{}/{}", self.base, id);
        let response = self
            .client
            .get(&url)
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| RecordError::Upstream(e.to_string()))?;

        // any non-2xx is a miss for this endpoint
        if !response.status().is_success() {
            return Ok(None);
        }

        response
            .json::<Beat>()
            .await
            .map(Some)
            .map_err(|e| RecordError::Malformed(e.to_string()))
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn beat_json(id: &str) -> serde_json::Value {
        serde_json::json!({
            "id": id,
            "title": "Test Beat",
            "genre": "trap",
            "bpm": 140,
            "price": 29.99,
            "producer_id": "prod-1",
            "is_active": true,
            "created_at": "2025-06-01T00:00:00Z"
        })
    }

    #[tokio::test]
    async fn test_community_feed_unwraps_envelope() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/beats"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "success": true,
                "beats": [beat_json("slug-a"), beat_json("slug-b")]
            })))
            .mount(&server)
            .await;

        let feed = HttpCommunityFeed::new(
            Client::new(),
            format!("{}/api/beats", server.uri()),
            Duration::from_millis(500),
        );
        let beats = feed.shared_beats().await.unwrap();
        assert_eq!(beats.len(), 2);
        assert_eq!(beats[0].source, RecordSource::Sanity);
        assert_eq!(beats[0].priority, 2);
    }

    #[tokio::test]
    async fn test_community_feed_failure_flag_yields_nothing() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/beats"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({"success": false, "beats": []})),
            )
            .mount(&server)
            .await;

        let feed = HttpCommunityFeed::new(
            Client::new(),
            format!("{}/api/beats", server.uri()),
            Duration::from_millis(500),
        );
        assert!(feed.shared_beats().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_metadata_miss_is_none_not_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/metadata/1714000000000"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let metadata = HttpMetadata::new(
            Client::new(),
            format!("{}/metadata", server.uri()),
            Duration::from_millis(500),
        );
        assert_eq!(metadata.beat(1714000000000).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_ledger_beats_are_tagged_web3() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/beats/42"))
            .respond_with(ResponseTemplate::new(200).set_body_json(beat_json("42")))
            .mount(&server)
            .await;

        let ledger = HttpLedger::new(Client::new(), server.uri(), Duration::from_millis(500));
        let beat = ledger.beat_by_token(42).await.unwrap().unwrap();
        assert_eq!(beat.source, RecordSource::Web3);
        assert_eq!(beat.priority, 1);
    }

    #[test]
    fn test_session_index_recent_is_newest_first() {
        let index = SessionIndex::new();
        let older: Beat = serde_json::from_value(serde_json::json!({
            "id": "1714000000001", "created_at": "2025-01-01T00:00:00Z"
        }))
        .unwrap();
        let newer: Beat = serde_json::from_value(serde_json::json!({
            "id": "1714000000002", "created_at": "2025-06-01T00:00:00Z"
        }))
        .unwrap();

        index.put(1714000000001, older);
        index.put(1714000000002, newer);

        let recent = index.recent();
        assert_eq!(recent[0].id, "1714000000002");
        assert_eq!(recent[1].id, "1714000000001");
    }
}
