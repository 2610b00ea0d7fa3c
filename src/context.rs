//! Wired service graph.
//!
//! One constructed context object holds every Backline service, so callers
//! receive the process-scoped caches and the per-network credit backend by
//! injection rather than through ambient globals.

use reqwest::Client;
use std::sync::Arc;

use crate::config::Config;
use crate::credits::{CreditContract, CreditLedger, HttpCreditContract, LedgerBackend};
use crate::gateway::{GatewayResolver, ManifestCache};
use crate::records::{
    HttpCommunityFeed, HttpContentStore, HttpLedger, HttpMetadata, SessionIndex,
    UnifiedRecordProvider,
};
use crate::storage::{KvStore, MemoryKv, SqliteKv};
use crate::types::Result;

/// All Backline services, wired from one [`Config`].
pub struct Backline {
    pub resolver: Arc<GatewayResolver>,
    pub manifest: Arc<ManifestCache>,
    pub records: Arc<UnifiedRecordProvider>,
    pub credits: Arc<CreditLedger>,
}

impl Backline {
    /// Build the full service graph, opening the configured KV store.
    pub fn new(config: &Config) -> Result<Self> {
        let store: Arc<dyn KvStore> = match &config.db_path {
            Some(path) => Arc::new(SqliteKv::open(path)?),
            None => Arc::new(MemoryKv::new()),
        };
        Ok(Self::with_store(config, store))
    }

    /// Build the service graph over a caller-provided store (tests, embedded
    /// setups).
    pub fn with_store(config: &Config, store: Arc<dyn KvStore>) -> Self {
        let client = Client::new();
        let timeout = config.gateway_timeout;

        let resolver = Arc::new(GatewayResolver::new(config, client.clone()));
        let manifest = Arc::new(ManifestCache::new(
            config,
            Arc::clone(&resolver),
            Arc::clone(&store),
        ));

        let records = Arc::new(UnifiedRecordProvider::new(
            Arc::new(HttpLedger::new(client.clone(), config.ledger_url.clone(), timeout)),
            Arc::new(HttpContentStore::new(
                client.clone(),
                config.content_store_url.clone(),
                timeout,
            )),
            Arc::new(HttpCommunityFeed::new(
                client.clone(),
                config.community_url.clone(),
                timeout,
            )),
            Arc::new(HttpMetadata::new(
                client.clone(),
                config.metadata_url.clone(),
                timeout,
            )),
            Arc::new(SessionIndex::new()),
        ));

        // backend selection happens here, once per process
        let contract = config.contract_address.as_ref().map(|address| {
            Arc::new(HttpCreditContract::new(client, config, address.clone()))
                as Arc<dyn CreditContract>
        });
        let backend = LedgerBackend::from_config(config, contract);
        let credits = Arc::new(CreditLedger::new(backend, store));

        Self {
            resolver,
            manifest,
            records,
            credits,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::WalletAddress;

    #[tokio::test]
    async fn test_default_wiring_runs_simulated_credits() {
        // no contract address configured: purchases must work offline
        let backline = Backline::new(&Config::default()).unwrap();
        let wallet = WalletAddress::parse(&format!("0x{}", "9".repeat(40))).unwrap();

        assert!(backline.credits.buy_credits(&wallet, 10).await);
        let balance = backline.credits.balance(&wallet).await;
        assert_eq!(balance.credits, 20);
    }
}
