//! Backline - data-resolution core for a beat marketplace
//!
//! Backline turns unreliable, heterogeneous upstreams - a content-addressed
//! gateway network, an on-chain ledger, a managed content store, and local
//! ephemeral state - into a single consistent view for the application.
//!
//! ## Services
//!
//! - **Gateway**: content-hash resolution over an ordered public gateway
//!   list, with timeouts, body validation, and an optional privileged proxy
//! - **Manifest**: TTL-boxed, persisted cache in front of the gateway
//!   resolver, with a built-in development fallback manifest
//! - **Records**: unified Producer/Beat views merged by source priority
//!   across ledger, content store, community feed, and session state
//! - **Credits**: metered upload-credit ledger with an on-chain backend and
//!   a transparent locally-simulated fallback
//! - **Storage**: namespaced string key-value persistence (SQLite or memory)
//!
//! Failure policy: recoverable upstream errors are logged and absorbed at
//! component boundaries; callers see typed failures only where the contract
//! of a call is strict (manifest resolution), and best-effort values
//! everywhere else.

pub mod config;
pub mod context;
pub mod credits;
pub mod gateway;
pub mod records;
pub mod storage;
pub mod types;

pub use config::Config;
pub use context::Backline;
pub use credits::{CreditLedger, LedgerBackend};
pub use gateway::{AssetCache, GatewayResolver, ManifestCache};
pub use records::UnifiedRecordProvider;
pub use storage::{KvStore, MemoryKv, SqliteKv};
pub use types::{BacklineError, BeatId, ContentHash, Result, WalletAddress};
