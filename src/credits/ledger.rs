//! Credit ledger with a dual on-chain/simulated backend.
//!
//! The backend is chosen once at construction. Purchases and upgrades try
//! the contract when one is live and transparently fall back to the local
//! simulation on any contract failure; both paths credit the balance
//! identically and append exactly one audit-trail transaction, so callers
//! cannot tell which path executed from the return value.

use async_trait::async_trait;
use chrono::Utc;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use super::types::{
    synthetic_tx_hash, upload_cost, CreditBalance, CreditPackage, LedgerTransaction,
    TransactionKind, UploadCheck, MAX_UPLOAD_BYTES, PRO_UPGRADE_PRICE_USD, UNLIMITED_CREDITS,
};
use super::CreditError;
use crate::config::Config;
use crate::storage::KvStore;
use crate::types::WalletAddress;

// ============================================================================
// Contract seam
// ============================================================================

/// Authoritative on-chain credit contract.
#[async_trait]
pub trait CreditContract: Send + Sync {
    /// On-chain credit balance; `None` when the wallet is unknown to the
    /// contract.
    async fn balance(&self, wallet: &WalletAddress) -> Result<Option<u32>, CreditError>;

    /// Pro NFT ownership.
    async fn has_pro(&self, wallet: &WalletAddress) -> Result<bool, CreditError>;

    /// Execute a credit purchase; returns the transaction hash.
    async fn purchase(
        &self,
        wallet: &WalletAddress,
        package: &CreditPackage,
    ) -> Result<String, CreditError>;

    /// Execute the Pro upgrade; returns the transaction hash.
    async fn upgrade(&self, wallet: &WalletAddress) -> Result<String, CreditError>;
}

/// Which path executes authoritative operations. Selected once per process
/// from the active network's deployment state, not re-decided per call.
#[derive(Clone)]
pub enum LedgerBackend {
    OnChain(Arc<dyn CreditContract>),
    Simulated,
}

impl LedgerBackend {
    /// Select the backend for the configured network. No contract address on
    /// the active chain means no deployment, which is the simulated path.
    pub fn from_config(config: &Config, contract: Option<Arc<dyn CreditContract>>) -> Self {
        match (&config.contract_address, contract) {
            (Some(address), Some(contract)) => {
                info!(chain_id = config.chain_id, address = %address, "Credit backend: on-chain");
                LedgerBackend::OnChain(contract)
            }
            _ => {
                info!(chain_id = config.chain_id, "Credit backend: simulated (no contract deployed)");
                LedgerBackend::Simulated
            }
        }
    }
}

// ============================================================================
// Ledger
// ============================================================================

/// Per-wallet metered-resource ledger.
pub struct CreditLedger {
    backend: LedgerBackend,
    store: Arc<dyn KvStore>,
}

impl CreditLedger {
    pub fn new(backend: LedgerBackend, store: Arc<dyn KvStore>) -> Self {
        Self { backend, store }
    }

    fn balance_key(wallet: &WalletAddress) -> String {
        format!("credits:{wallet}")
    }

    fn txs_key(wallet: &WalletAddress) -> String {
        format!("credits:{wallet}:txs")
    }

    /// Load the local record, granting the one-time default on first
    /// observation. Storage problems degrade to a fresh default record.
    fn load_or_grant(&self, wallet: &WalletAddress) -> CreditBalance {
        let key = Self::balance_key(wallet);
        match self.store.get(&key) {
            Ok(Some(raw)) => match serde_json::from_str(&raw) {
                Ok(balance) => return balance,
                Err(e) => warn!(wallet = %wallet, error = %e, "Persisted balance unreadable, regranting"),
            },
            Ok(None) => {}
            Err(e) => warn!(wallet = %wallet, error = %e, "Balance read failed"),
        }

        let balance = CreditBalance::with_default_grant(wallet.clone());
        info!(wallet = %wallet, credits = balance.credits, "Default credit grant");
        self.persist(&balance);
        balance
    }

    fn persist(&self, balance: &CreditBalance) -> bool {
        match serde_json::to_string(balance) {
            Ok(raw) => match self.store.set(&Self::balance_key(&balance.wallet), &raw) {
                Ok(()) => true,
                Err(e) => {
                    warn!(wallet = %balance.wallet, error = %e, "Balance persist failed");
                    false
                }
            },
            Err(e) => {
                warn!(wallet = %balance.wallet, error = %e, "Balance serialize failed");
                false
            }
        }
    }

    fn append_transaction(&self, tx: LedgerTransaction) {
        let key = Self::txs_key(&tx.wallet);
        let mut txs = self.transactions(&tx.wallet);
        txs.push(tx);
        match serde_json::to_string(&txs) {
            Ok(raw) => {
                if let Err(e) = self.store.set(&key, &raw) {
                    warn!(error = %e, "Transaction append failed");
                }
            }
            Err(e) => warn!(error = %e, "Transaction serialize failed"),
        }
    }

    /// The full audit trail for a wallet, oldest first. Never truncated.
    pub fn transactions(&self, wallet: &WalletAddress) -> Vec<LedgerTransaction> {
        match self.store.get(&Self::txs_key(wallet)) {
            Ok(Some(raw)) => serde_json::from_str(&raw).unwrap_or_else(|e| {
                warn!(wallet = %wallet, error = %e, "Transaction log unreadable");
                Vec::new()
            }),
            _ => Vec::new(),
        }
    }

    // ========================================================================
    // Reads
    // ========================================================================

    /// Current balance: the authoritative on-chain figures reconciled over
    /// the local record when the contract answers, the local record alone
    /// otherwise.
    pub async fn balance(&self, wallet: &WalletAddress) -> CreditBalance {
        let mut balance = self.load_or_grant(wallet);

        if let LedgerBackend::OnChain(ref contract) = self.backend {
            match contract.balance(wallet).await {
                Ok(Some(credits)) => {
                    debug!(wallet = %wallet, credits, "On-chain balance read");
                    balance.credits = credits;
                }
                Ok(None) => {}
                Err(e) => warn!(wallet = %wallet, error = %e, "On-chain balance read failed, using local"),
            }
            match contract.has_pro(wallet).await {
                Ok(true) => {
                    balance.has_pro_nft = true;
                    balance.credits = UNLIMITED_CREDITS;
                }
                Ok(false) => {}
                Err(e) => warn!(wallet = %wallet, error = %e, "Pro ownership read failed, using local"),
            }
            self.persist(&balance);
        }

        balance
    }

    /// Re-read and reconcile the authoritative balance. No-op under the
    /// simulated backend.
    pub async fn refresh_balance(&self, wallet: &WalletAddress) -> CreditBalance {
        self.balance(wallet).await
    }

    /// Affordability check for an upload of `size_bytes`.
    ///
    /// Files over the hard cap are rejected regardless of balance or Pro
    /// status; Pro wallets bypass the balance check entirely.
    pub async fn can_upload(&self, wallet: &WalletAddress, size_bytes: u64) -> UploadCheck {
        let Some(cost) = upload_cost(size_bytes) else {
            return UploadCheck::rejected(
                0,
                format!(
                    "file exceeds the {}MB upload limit",
                    MAX_UPLOAD_BYTES / (1024 * 1024)
                ),
            );
        };

        let balance = self.balance(wallet).await;
        if balance.has_pro_nft {
            return UploadCheck::allowed(cost);
        }
        if balance.credits >= cost {
            UploadCheck::allowed(cost)
        } else {
            UploadCheck::rejected(
                cost,
                format!("requires {} credits, balance is {}", cost, balance.credits),
            )
        }
    }

    // ========================================================================
    // Mutations
    // ========================================================================

    /// Debit credits for a metered action. Fails closed: returns `false`
    /// without mutation when the balance is short and the wallet is not Pro.
    pub fn use_credits(&self, wallet: &WalletAddress, amount: u32) -> bool {
        let mut balance = self.load_or_grant(wallet);

        if balance.has_pro_nft {
            balance.total_used = balance.total_used.saturating_add(amount);
            return self.persist(&balance);
        }
        if balance.credits < amount {
            debug!(wallet = %wallet, amount, credits = balance.credits, "Insufficient credits");
            return false;
        }

        balance.credits -= amount;
        balance.total_used = balance.total_used.saturating_add(amount);
        info!(wallet = %wallet, amount, remaining = balance.credits, "Credits used");
        self.persist(&balance)
    }

    /// Purchase credits covering `amount`.
    ///
    /// On-chain when a contract is live; any contract failure (including "no
    /// deployment") transparently falls back to the simulated purchase. The
    /// observable effect is identical on both paths.
    pub async fn buy_credits(&self, wallet: &WalletAddress, amount: u32) -> bool {
        let Some(package) = CreditPackage::for_amount(amount) else {
            warn!(wallet = %wallet, amount, "No credit package covers the requested amount");
            return false;
        };

        let hash = match &self.backend {
            LedgerBackend::OnChain(contract) => match contract.purchase(wallet, &package).await {
                Ok(hash) => {
                    info!(wallet = %wallet, package = package.id, tx = %hash, "On-chain purchase confirmed");
                    hash
                }
                Err(e) => {
                    warn!(wallet = %wallet, error = %e, "On-chain purchase failed, simulating locally");
                    synthetic_tx_hash(wallet)
                }
            },
            LedgerBackend::Simulated => {
                debug!(wallet = %wallet, package = package.id, "Simulated purchase");
                synthetic_tx_hash(wallet)
            }
        };

        let mut balance = self.load_or_grant(wallet);
        balance.credits = balance.credits.saturating_add(package.credits);
        balance.total_purchased = balance.total_purchased.saturating_add(package.credits);
        balance.last_purchase_at = Some(Utc::now());
        balance.last_tx_hash = Some(hash.clone());
        if !self.persist(&balance) {
            return false;
        }

        self.append_transaction(LedgerTransaction {
            hash,
            wallet: wallet.clone(),
            kind: TransactionKind::Purchase {
                amount: package.credits,
            },
            cost_usd: package.price_usd,
            timestamp: Utc::now(),
        });
        true
    }

    /// One-time Pro upgrade: unlimited metered usage from here on. Same
    /// dual-path pattern as [`CreditLedger::buy_credits`].
    pub async fn upgrade_to_pro(&self, wallet: &WalletAddress) -> bool {
        let mut balance = self.load_or_grant(wallet);
        if balance.has_pro_nft {
            debug!(wallet = %wallet, "Already Pro");
            return true;
        }

        let hash = match &self.backend {
            LedgerBackend::OnChain(contract) => match contract.upgrade(wallet).await {
                Ok(hash) => {
                    info!(wallet = %wallet, tx = %hash, "On-chain Pro upgrade confirmed");
                    hash
                }
                Err(e) => {
                    warn!(wallet = %wallet, error = %e, "On-chain upgrade failed, simulating locally");
                    synthetic_tx_hash(wallet)
                }
            },
            LedgerBackend::Simulated => synthetic_tx_hash(wallet),
        };

        balance.has_pro_nft = true;
        balance.credits = UNLIMITED_CREDITS;
        balance.pro_upgraded_at = Some(Utc::now());
        balance.last_tx_hash = Some(hash.clone());
        if !self.persist(&balance) {
            return false;
        }

        self.append_transaction(LedgerTransaction {
            hash,
            wallet: wallet.clone(),
            kind: TransactionKind::ProUpgrade,
            cost_usd: PRO_UPGRADE_PRICE_USD,
            timestamp: Utc::now(),
        });
        true
    }
}

// ============================================================================
// HTTP contract client
// ============================================================================

#[derive(Debug, Deserialize)]
struct ChainBalance {
    credits: u32,
    #[serde(default)]
    has_pro: bool,
}

#[derive(Debug, Deserialize)]
struct TxReceipt {
    tx_hash: String,
}

/// Credit contract reached through the ledger RPC gateway.
pub struct HttpCreditContract {
    client: Client,
    base: String,
    address: String,
    chain_id: u64,
    timeout: Duration,
}

impl HttpCreditContract {
    pub fn new(client: Client, config: &Config, address: impl Into<String>) -> Self {
        Self {
            client,
            base: config.ledger_url.clone(),
            address: address.into(),
            chain_id: config.chain_id,
            timeout: config.gateway_timeout,
        }
    }

    async fn read_balance(&self, wallet: &WalletAddress) -> Result<Option<ChainBalance>, CreditError> {
        let url = format!("{}/contracts/{}/credits/{}", self.base, self.address, wallet);
        let response = self
            .client
            .get(&url)
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| CreditError::Contract(e.to_string()))?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !response.status().is_success() {
            return Err(CreditError::Contract(format!(
                "HTTP {} from {}",
                response.status(),
                url
            )));
        }
        response
            .json::<ChainBalance>()
            .await
            .map(Some)
            .map_err(|e| CreditError::Contract(e.to_string()))
    }

    async fn send_tx(&self, path: &str, body: serde_json::Value) -> Result<String, CreditError> {
        let url = format!("{}/contracts/{}/{}", self.base, self.address, path);
        let response = self
            .client
            .post(&url)
            .timeout(self.timeout)
            .json(&body)
            .send()
            .await
            .map_err(|e| CreditError::Contract(e.to_string()))?;

        if !response.status().is_success() {
            return Err(CreditError::Contract(format!(
                "HTTP {} from {}",
                response.status(),
                url
            )));
        }
        response
            .json::<TxReceipt>()
            .await
            .map(|r| r.tx_hash)
            .map_err(|e| CreditError::Contract(e.to_string()))
    }
}

#[async_trait]
impl CreditContract for HttpCreditContract {
    async fn balance(&self, wallet: &WalletAddress) -> Result<Option<u32>, CreditError> {
        Ok(self.read_balance(wallet).await?.map(|b| b.credits))
    }

    async fn has_pro(&self, wallet: &WalletAddress) -> Result<bool, CreditError> {
        Ok(self
            .read_balance(wallet)
            .await?
            .map(|b| b.has_pro)
            .unwrap_or(false))
    }

    async fn purchase(
        &self,
        wallet: &WalletAddress,
        package: &CreditPackage,
    ) -> Result<String, CreditError> {
        self.send_tx(
            "purchase",
            json!({
                "wallet": wallet,
                "package": package.id,
                "credits": package.credits,
                "chain_id": self.chain_id,
            }),
        )
        .await
    }

    async fn upgrade(&self, wallet: &WalletAddress) -> Result<String, CreditError> {
        self.send_tx("upgrade", json!({ "wallet": wallet, "chain_id": self.chain_id }))
            .await
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryKv;

    fn wallet(tail: char) -> WalletAddress {
        WalletAddress::parse(&format!("0x{}", tail.to_string().repeat(40))).unwrap()
    }

    fn simulated_ledger() -> CreditLedger {
        CreditLedger::new(LedgerBackend::Simulated, Arc::new(MemoryKv::new()))
    }

    /// Scripted contract double: succeeds with a fixed hash or fails every
    /// call.
    struct FakeContract {
        healthy: bool,
    }

    #[async_trait]
    impl CreditContract for FakeContract {
        async fn balance(&self, _wallet: &WalletAddress) -> Result<Option<u32>, CreditError> {
            if self.healthy {
                Ok(None)
            } else {
                Err(CreditError::Contract("no contract deployed".into()))
            }
        }

        async fn has_pro(&self, _wallet: &WalletAddress) -> Result<bool, CreditError> {
            if self.healthy {
                Ok(false)
            } else {
                Err(CreditError::Contract("no contract deployed".into()))
            }
        }

        async fn purchase(
            &self,
            wallet: &WalletAddress,
            _package: &CreditPackage,
        ) -> Result<String, CreditError> {
            if self.healthy {
                Ok(synthetic_tx_hash(wallet))
            } else {
                Err(CreditError::Contract("no contract deployed".into()))
            }
        }

        async fn upgrade(&self, wallet: &WalletAddress) -> Result<String, CreditError> {
            if self.healthy {
                Ok(synthetic_tx_hash(wallet))
            } else {
                Err(CreditError::Contract("no contract deployed".into()))
            }
        }
    }

    fn onchain_ledger(healthy: bool) -> CreditLedger {
        CreditLedger::new(
            LedgerBackend::OnChain(Arc::new(FakeContract { healthy })),
            Arc::new(MemoryKv::new()),
        )
    }

    #[tokio::test]
    async fn test_default_grant_fires_once() {
        let ledger = simulated_ledger();
        let w = wallet('a');

        let first = ledger.balance(&w).await;
        assert_eq!(first.credits, 10);

        assert!(ledger.use_credits(&w, 3));
        // a later read must not re-grant
        let second = ledger.balance(&w).await;
        assert_eq!(second.credits, 7);
        assert_eq!(second.total_used, 3);
    }

    #[tokio::test]
    async fn test_can_upload_tiers_against_balance() {
        let ledger = simulated_ledger();
        let w = wallet('b');
        // bring the default 10 down to 2
        assert!(ledger.use_credits(&w, 8));

        // 30MB sits in the 2-credit tier
        let check = ledger.can_upload(&w, 30 * 1024 * 1024).await;
        assert_eq!(check, UploadCheck::allowed(2));

        // 60MB costs 5, balance is 2
        let check = ledger.can_upload(&w, 60 * 1024 * 1024).await;
        assert!(!check.allowed);
        assert_eq!(check.cost, 5);
    }

    #[tokio::test]
    async fn test_hard_cap_rejects_even_pro() {
        let ledger = simulated_ledger();
        let w = wallet('c');
        assert!(ledger.upgrade_to_pro(&w).await);

        let check = ledger.can_upload(&w, 101 * 1024 * 1024).await;
        assert!(!check.allowed);
        assert!(check.reason.unwrap().contains("100MB"));
    }

    #[tokio::test]
    async fn test_pro_bypasses_balance_check() {
        let ledger = simulated_ledger();
        let w = wallet('d');
        assert!(ledger.upgrade_to_pro(&w).await);

        let check = ledger.can_upload(&w, 90 * 1024 * 1024).await;
        assert_eq!(check, UploadCheck::allowed(5));
        // and metered use never fails
        assert!(ledger.use_credits(&w, 5));
        assert!(ledger.use_credits(&w, 500));
    }

    #[tokio::test]
    async fn test_use_credits_fails_closed() {
        let ledger = simulated_ledger();
        let w = wallet('e');

        assert!(!ledger.use_credits(&w, 11));
        // balance untouched by the failed debit
        assert_eq!(ledger.balance(&w).await.credits, 10);
    }

    #[tokio::test]
    async fn test_purchase_paths_are_indistinguishable() {
        // the same call against a dead deployment and a live one
        for ledger in [onchain_ledger(false), onchain_ledger(true), simulated_ledger()] {
            let w = wallet('f');
            let ok = ledger.buy_credits(&w, 10).await;
            assert!(ok);

            let balance = ledger.balance(&w).await;
            assert_eq!(balance.credits, 20); // 10 grant + 10 purchased
            assert_eq!(balance.total_purchased, 10);

            let txs = ledger.transactions(&w);
            assert_eq!(txs.len(), 1);
            assert_eq!(txs[0].kind, TransactionKind::Purchase { amount: 10 });
            // hash shape gives nothing away
            assert!(txs[0].hash.starts_with("0x"));
            assert_eq!(txs[0].hash.len(), 66);
        }
    }

    #[tokio::test]
    async fn test_upgrade_dual_path_effect() {
        for ledger in [onchain_ledger(false), simulated_ledger()] {
            let w = wallet('a');
            assert!(ledger.upgrade_to_pro(&w).await);

            let balance = ledger.balance(&w).await;
            assert!(balance.has_pro_nft);
            assert_eq!(balance.credits, UNLIMITED_CREDITS);
            assert_eq!(ledger.transactions(&w).len(), 1);

            // one-time transition: no duplicate transaction
            assert!(ledger.upgrade_to_pro(&w).await);
            assert_eq!(ledger.transactions(&w).len(), 1);
        }
    }

    #[tokio::test]
    async fn test_unknown_package_amount_is_rejected() {
        let ledger = simulated_ledger();
        let w = wallet('b');
        assert!(!ledger.buy_credits(&w, 500).await);
        assert!(ledger.transactions(&w).is_empty());
    }

    #[tokio::test]
    async fn test_audit_trail_accumulates() {
        let ledger = simulated_ledger();
        let w = wallet('c');

        assert!(ledger.buy_credits(&w, 5).await);
        assert!(ledger.buy_credits(&w, 25).await);
        assert!(ledger.upgrade_to_pro(&w).await);

        let txs = ledger.transactions(&w);
        assert_eq!(txs.len(), 3);
        assert_eq!(txs[0].kind, TransactionKind::Purchase { amount: 5 });
        assert_eq!(txs[1].kind, TransactionKind::Purchase { amount: 25 });
        assert_eq!(txs[2].kind, TransactionKind::ProUpgrade);
    }
}
