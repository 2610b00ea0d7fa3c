//! Unified Producer/Beat record resolution.
//!
//! Presents one view of producers and beats despite multiple disagreeing
//! sources: the authoritative on-chain ledger, the managed content store,
//! the community shared-beats endpoint, and local session state. Sources are
//! consulted in a fixed order and merged by per-field priority; a failing
//! source contributes nothing rather than failing the call.

pub mod provider;
pub mod sources;
pub mod types;

pub use provider::UnifiedRecordProvider;
pub use sources::{
    BeatMetadata, CommunityFeed, ContentStore, HttpCommunityFeed, HttpContentStore, HttpLedger,
    HttpMetadata, LedgerSource, SessionIndex,
};
pub use types::{Beat, Producer, RecordSource};

use thiserror::Error;

/// Error types for record sources. These never cross the provider boundary:
/// the public surface degrades to `None`/empty instead.
#[derive(Debug, Error)]
pub enum RecordError {
    /// Transport-level failure (connect error, timeout, non-2xx)
    #[error("Upstream request failed: {0}")]
    Upstream(String),

    /// Body did not match the expected record shape
    #[error("Malformed upstream payload: {0}")]
    Malformed(String),
}
