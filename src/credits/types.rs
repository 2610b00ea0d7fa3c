//! Credit balances, packages, upload tiers, and the audit trail.

use chrono::{DateTime, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::types::WalletAddress;

/// Credits granted once per wallet on first observation.
pub const DEFAULT_GRANT: u32 = 10;

/// Sentinel for an unlimited (Pro) balance.
pub const UNLIMITED_CREDITS: u32 = u32::MAX;

/// Hard upload size cap; larger files are rejected regardless of balance or
/// Pro status.
pub const MAX_UPLOAD_BYTES: u64 = 100 * 1024 * 1024;

const MB: u64 = 1024 * 1024;

/// Size-scaled credit cost ladder: (inclusive upper bound, cost).
const UPLOAD_TIERS: [(u64, u32); 4] = [(10 * MB, 1), (30 * MB, 2), (50 * MB, 3), (100 * MB, 5)];

/// Credit cost for an upload of `size_bytes`, or `None` above the hard cap.
pub fn upload_cost(size_bytes: u64) -> Option<u32> {
    UPLOAD_TIERS
        .iter()
        .find(|(bound, _)| size_bytes <= *bound)
        .map(|(_, cost)| *cost)
}

/// Result of an affordability check. Pure data, no I/O implied.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UploadCheck {
    pub allowed: bool,
    pub cost: u32,
    pub reason: Option<String>,
}

impl UploadCheck {
    pub fn allowed(cost: u32) -> Self {
        Self {
            allowed: true,
            cost,
            reason: None,
        }
    }

    pub fn rejected(cost: u32, reason: impl Into<String>) -> Self {
        Self {
            allowed: false,
            cost,
            reason: Some(reason.into()),
        }
    }
}

// ============================================================================
// Balance
// ============================================================================

/// Per-wallet credit record. Totals are append-only; the record itself is
/// never deleted.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CreditBalance {
    pub wallet: WalletAddress,
    pub credits: u32,
    pub has_pro_nft: bool,
    pub total_used: u32,
    pub total_purchased: u32,
    #[serde(default)]
    pub last_purchase_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub pro_upgraded_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub last_tx_hash: Option<String>,
}

impl CreditBalance {
    /// The default grant, fired once per wallet on first observation.
    pub fn with_default_grant(wallet: WalletAddress) -> Self {
        Self {
            wallet,
            credits: DEFAULT_GRANT,
            has_pro_nft: false,
            total_used: 0,
            total_purchased: 0,
            last_purchase_at: None,
            pro_upgraded_at: None,
            last_tx_hash: None,
        }
    }
}

// ============================================================================
// Packages
// ============================================================================

/// Purchasable credit package.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct CreditPackage {
    pub id: &'static str,
    pub credits: u32,
    pub price_usd: f64,
}

/// Fixed package ladder.
pub const CREDIT_PACKAGES: [CreditPackage; 4] = [
    CreditPackage { id: "starter", credits: 5, price_usd: 4.99 },
    CreditPackage { id: "studio", credits: 10, price_usd: 8.99 },
    CreditPackage { id: "label", credits: 25, price_usd: 19.99 },
    CreditPackage { id: "mogul", credits: 50, price_usd: 34.99 },
];

/// Price of the one-time Pro upgrade.
pub const PRO_UPGRADE_PRICE_USD: f64 = 49.99;

impl CreditPackage {
    /// Smallest package covering `amount`, or `None` when no package does.
    pub fn for_amount(amount: u32) -> Option<CreditPackage> {
        CREDIT_PACKAGES.iter().find(|p| p.credits >= amount).copied()
    }
}

// ============================================================================
// Transactions
// ============================================================================

/// What a ledger transaction paid for.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum TransactionKind {
    Purchase { amount: u32 },
    ProUpgrade,
}

/// Append-only audit record of a purchase or Pro-upgrade attempt. Synthetic
/// hashes are shaped exactly like real ones, so the trail does not reveal
/// which backend executed.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LedgerTransaction {
    pub hash: String,
    pub wallet: WalletAddress,
    #[serde(flatten)]
    pub kind: TransactionKind,
    pub cost_usd: f64,
    pub timestamp: DateTime<Utc>,
}

/// Synthetic transaction hash: `0x` + 64 hex chars over wallet, time, and a
/// random nonce.
pub fn synthetic_tx_hash(wallet: &WalletAddress) -> String {
    let nonce: u64 = rand::thread_rng().gen();
    let mut hasher = Sha256::new();
    hasher.update(wallet.as_str().as_bytes());
    hasher.update(Utc::now().timestamp_nanos_opt().unwrap_or_default().to_be_bytes());
    hasher.update(nonce.to_be_bytes());
    format!("0x{}", hex::encode(hasher.finalize()))
}

// ============================================================================
// Tests
// ============================================================================
