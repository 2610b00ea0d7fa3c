//! Unified record provider.
//!
//! Merge rules:
//!
//! - Producers: ledger first for wallet-shaped ids; content-store record
//!   overlaid with ledger dynamics (`total_beats`, `total_sales`) where the
//!   ledger value is non-zero
//! - Beats: dispatch on the parsed [`BeatId`] space, first hit wins
//! - Featured beats: best-effort union of session, community, and ledger
//!   results, deduplicated by id with the lowest priority winning
//!
//! Every upstream failure is logged and swallowed here; the public surface
//! returns `None` or an empty list, never an error.

use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, warn};

use super::sources::{BeatMetadata, CommunityFeed, ContentStore, LedgerSource, SessionIndex};
use super::types::{Beat, Producer};
use crate::types::{BeatId, WalletAddress};

/// One consistent Producer/Beat view over all upstream sources.
pub struct UnifiedRecordProvider {
    ledger: Arc<dyn LedgerSource>,
    content: Arc<dyn ContentStore>,
    community: Arc<dyn CommunityFeed>,
    metadata: Arc<dyn BeatMetadata>,
    session: Arc<SessionIndex>,
}

impl UnifiedRecordProvider {
    pub fn new(
        ledger: Arc<dyn LedgerSource>,
        content: Arc<dyn ContentStore>,
        community: Arc<dyn CommunityFeed>,
        metadata: Arc<dyn BeatMetadata>,
        session: Arc<SessionIndex>,
    ) -> Self {
        Self {
            ledger,
            content,
            community,
            metadata,
            session,
        }
    }

    /// Local session index, exposed for upload flows to register ephemeral
    /// beats.
    pub fn session(&self) -> Arc<SessionIndex> {
        Arc::clone(&self.session)
    }

    // ========================================================================
    // Producers
    // ========================================================================

    /// Resolve a producer by wallet address or content-store id.
    ///
    /// Returns `None` only when the id is empty or both sources miss.
    pub async fn get_producer(&self, id: &str) -> Option<Producer> {
        if id.trim().is_empty() {
            return None;
        }

        // Wallet-shaped ids ask the ledger first
        if let Some(wallet) = WalletAddress::parse(id) {
            match self.ledger.producer(&wallet).await {
                Ok(Some(producer)) => {
                    debug!(wallet = %wallet, "Producer resolved from ledger");
                    return Some(producer);
                }
                Ok(None) => {}
                Err(e) => warn!(wallet = %wallet, error = %e, "Ledger producer lookup failed"),
            }
        }

        match self.content.producer_by_id(id).await {
            Ok(Some(producer)) => Some(self.overlay_ledger_dynamics(producer).await),
            Ok(None) => None,
            Err(e) => {
                warn!(id, error = %e, "Content store producer lookup failed");
                None
            }
        }
    }

    /// Overlay ledger-owned dynamic fields onto a content-store producer.
    /// The ledger wins where its value is non-zero; the content store keeps
    /// fields the ledger does not know.
    async fn overlay_ledger_dynamics(&self, mut producer: Producer) -> Producer {
        let Some(wallet) = producer.wallet_address.clone() else {
            return producer;
        };

        match self.ledger.producer(&wallet).await {
            Ok(Some(onchain)) => {
                if onchain.total_beats > 0 {
                    producer.total_beats = onchain.total_beats;
                }
                if onchain.total_sales > 0 {
                    producer.total_sales = onchain.total_sales;
                }
                debug!(wallet = %wallet, "Ledger dynamics overlaid onto content-store producer");
            }
            Ok(None) => {}
            Err(e) => warn!(wallet = %wallet, error = %e, "Ledger overlay lookup failed"),
        }
        producer
    }

    /// All known producers from both sources, deduplicated by wallet (or id
    /// when no wallet), ledger records winning.
    pub async fn get_all_producers(&self) -> Vec<Producer> {
        let (from_ledger, from_content) =
            tokio::join!(self.ledger.all_producers(), self.content.all_producers());

        let from_ledger = from_ledger.unwrap_or_else(|e| {
            warn!(error = %e, "Ledger producer listing failed");
            Vec::new()
        });
        let from_content = from_content.unwrap_or_else(|e| {
            warn!(error = %e, "Content store producer listing failed");
            Vec::new()
        });

        let mut seen = HashSet::new();
        let mut merged = Vec::new();
        // ledger first so it wins dedup ties
        for producer in from_ledger.into_iter().chain(from_content) {
            let key = producer
                .wallet_address
                .as_ref()
                .map(|w| w.as_str().to_string())
                .unwrap_or_else(|| producer.id.clone());
            if seen.insert(key) {
                merged.push(producer);
            }
        }
        merged
    }

    // ========================================================================
    // Beats
    // ========================================================================

    /// Resolve a beat by raw id, dispatching on its id space.
    pub async fn get_beat(&self, raw_id: &str) -> Option<Beat> {
        let id = BeatId::parse(raw_id)?;

        match id {
            BeatId::LocalEphemeral(n) => {
                // session first, then the server-side metadata cache
                if let Some(beat) = self.session.get(n) {
                    debug!(id = n, "Beat resolved from session index");
                    return Some(beat);
                }
                match self.metadata.beat(n).await {
                    Ok(found) => found,
                    Err(e) => {
                        warn!(id = n, error = %e, "Metadata lookup failed");
                        None
                    }
                }
            }
            BeatId::OnChainToken(n) => match self.ledger.beat_by_token(n).await {
                Ok(found) => found,
                Err(e) => {
                    warn!(token = n, error = %e, "Ledger beat lookup failed");
                    None
                }
            },
            BeatId::ContentSlug(ref slug) => match self.content.beat_by_slug(slug).await {
                Ok(found) => found,
                Err(e) => {
                    warn!(slug, error = %e, "Content store beat lookup failed");
                    None
                }
            },
        }
    }

    /// Beats for one producer, unioned across ledger and content store.
    pub async fn get_producer_beats(&self, id: &str) -> Vec<Beat> {
        if id.trim().is_empty() {
            return Vec::new();
        }

        let wallet = WalletAddress::parse(id);
        let ledger_beats = async {
            match &wallet {
                Some(w) => self.ledger.producer_beats(w).await,
                None => Ok(Vec::new()),
            }
        };
        let (from_ledger, from_content) =
            tokio::join!(ledger_beats, self.content.producer_beats(id));

        let mut beats = from_ledger.unwrap_or_else(|e| {
            warn!(id, error = %e, "Ledger producer beats failed");
            Vec::new()
        });
        beats.extend(from_content.unwrap_or_else(|e| {
            warn!(id, error = %e, "Content store producer beats failed");
            Vec::new()
        }));

        Self::merge_beats(beats, usize::MAX)
    }

    /// Featured beats: a hybrid best-effort union, not a fallback chain.
    ///
    /// Session state, the community endpoint, and the ledger are queried
    /// concurrently; a failed source contributes zero items. The union is
    /// deduplicated by id (lowest priority wins), filtered to active beats,
    /// sorted by priority then recency, and truncated to `limit`.
    pub async fn get_featured_beats(&self, limit: usize) -> Vec<Beat> {
        let session_beats = async { self.session.recent() };
        let (local, community, ledger) = tokio::join!(
            session_beats,
            self.community.shared_beats(),
            self.ledger.featured_beats()
        );

        let community = community.unwrap_or_else(|e| {
            warn!(error = %e, "Community feed failed, contributing nothing");
            Vec::new()
        });
        let ledger = ledger.unwrap_or_else(|e| {
            warn!(error = %e, "Ledger featured query failed, contributing nothing");
            Vec::new()
        });

        let mut all = local;
        all.extend(community);
        all.extend(ledger);

        Self::merge_beats(all, limit)
    }

    /// Dedup by id keeping the first occurrence in priority order, filter to
    /// active beats, sort by priority ascending with newest-first tiebreak,
    /// truncate.
    fn merge_beats(mut beats: Vec<Beat>, limit: usize) -> Vec<Beat> {
        // stable: equal priorities keep their arrival order for the dedup
        beats.sort_by_key(|b| b.priority);

        let mut seen = HashSet::new();
        let mut merged: Vec<Beat> = beats
            .into_iter()
            .filter(|b| seen.insert(b.id.clone()))
            .filter(|b| b.is_active)
            .collect();

        merged.sort_by(|a, b| {
            a.priority
                .cmp(&b.priority)
                .then(b.created_at.cmp(&a.created_at))
        });
        merged.truncate(limit);
        merged
    }
}

// ============================================================================
// Tests
// ============================================================================
