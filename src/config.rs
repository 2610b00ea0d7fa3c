//! Configuration for Backline services.
//!
//! Defaults cover every field; `Config::from_env` overrides from environment
//! variables so embedding applications can tune timeouts and endpoints
//! without code changes.

use std::path::PathBuf;
use std::time::Duration;

/// Ordered public gateway list. Order is part of the contract: resolution is
/// a deterministic fallback walk, not a race, so for a given failure pattern
/// the serving gateway is reproducible.
pub const PUBLIC_GATEWAYS: [&str; 4] = [
    "https://ipfs.io/ipfs",
    "https://dweb.link/ipfs",
    "https://cloudflare-ipfs.com/ipfs",
    "https://gateway.pinata.cloud/ipfs",
];

/// Process configuration for all Backline services.
#[derive(Debug, Clone)]
pub struct Config {
    /// Ordered gateway base URLs, each addressed as `<base>/<hash>`
    pub gateways: Vec<String>,
    /// Privileged proxy base URL, tried before the public gateways
    pub proxy_url: Option<String>,
    /// Per-gateway request timeout (default: 5s)
    pub gateway_timeout: Duration,
    /// Privileged proxy request timeout (default: 8s)
    pub proxy_timeout: Duration,

    /// Production manifest content hash
    pub manifest_hash: String,
    /// Manifest cache validity window (default: 24h)
    pub manifest_ttl: Duration,
    /// Production-hash resolution attempts before falling back (default: 2)
    pub manifest_attempts: u32,

    /// Managed content store query endpoint
    pub content_store_url: String,
    /// Community shared-beats endpoint
    pub community_url: String,
    /// Metadata-by-id endpoint
    pub metadata_url: String,
    /// Authoritative ledger (on-chain read/write) endpoint
    pub ledger_url: String,

    /// Active chain id
    pub chain_id: u64,
    /// Credit contract address on the active chain; `None` selects the
    /// simulated credit backend at startup
    pub contract_address: Option<String>,

    /// SQLite KV path; `None` keeps persistence in memory
    pub db_path: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            gateways: PUBLIC_GATEWAYS.iter().map(|s| s.to_string()).collect(),
            proxy_url: None,
            gateway_timeout: Duration::from_secs(5),
            proxy_timeout: Duration::from_secs(8),

            manifest_hash: String::new(),
            manifest_ttl: Duration::from_secs(24 * 60 * 60),
            manifest_attempts: 2,

            content_store_url: "https://content.backline.app".to_string(),
            community_url: "https://community.backline.app/api/beats".to_string(),
            metadata_url: "https://api.backline.app/metadata".to_string(),
            ledger_url: "https://ledger.backline.app".to_string(),

            chain_id: 1,
            contract_address: None,

            db_path: None,
        }
    }
}

impl Config {
    /// Create config from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(val) = std::env::var("BACKLINE_GATEWAYS") {
            let list: Vec<String> = val
                .split(',')
                .map(|s| s.trim().trim_end_matches('/').to_string())
                .filter(|s| !s.is_empty())
                .collect();
            if !list.is_empty() {
                config.gateways = list;
            }
        }

        if let Ok(val) = std::env::var("BACKLINE_PROXY_URL") {
            if !val.is_empty() {
                config.proxy_url = Some(val.trim_end_matches('/').to_string());
            }
        }

        if let Ok(val) = std::env::var("BACKLINE_GATEWAY_TIMEOUT_MS") {
            if let Ok(ms) = val.parse::<u64>() {
                config.gateway_timeout = Duration::from_millis(ms);
            }
        }

        if let Ok(val) = std::env::var("BACKLINE_PROXY_TIMEOUT_MS") {
            if let Ok(ms) = val.parse::<u64>() {
                config.proxy_timeout = Duration::from_millis(ms);
            }
        }

        if let Ok(val) = std::env::var("BACKLINE_MANIFEST_HASH") {
            config.manifest_hash = val;
        }

        if let Ok(val) = std::env::var("BACKLINE_MANIFEST_TTL_HOURS") {
            if let Ok(hours) = val.parse::<u64>() {
                config.manifest_ttl = Duration::from_secs(hours * 60 * 60);
            }
        }

        if let Ok(val) = std::env::var("BACKLINE_CONTENT_STORE_URL") {
            config.content_store_url = val.trim_end_matches('/').to_string();
        }

        if let Ok(val) = std::env::var("BACKLINE_COMMUNITY_URL") {
            config.community_url = val.trim_end_matches('/').to_string();
        }

        if let Ok(val) = std::env::var("BACKLINE_METADATA_URL") {
            config.metadata_url = val.trim_end_matches('/').to_string();
        }

        if let Ok(val) = std::env::var("BACKLINE_LEDGER_URL") {
            config.ledger_url = val.trim_end_matches('/').to_string();
        }

        if let Ok(val) = std::env::var("BACKLINE_CHAIN_ID") {
            if let Ok(id) = val.parse::<u64>() {
                config.chain_id = id;
            }
        }

        if let Ok(val) = std::env::var("BACKLINE_CONTRACT_ADDRESS") {
            if !val.is_empty() {
                config.contract_address = Some(val);
            }
        }

        if let Ok(val) = std::env::var("BACKLINE_DB_PATH") {
            if !val.is_empty() {
                config.db_path = Some(PathBuf::from(val));
            }
        }

        config
    }
}
