//! Shared identifiers and the crate error type.
//!
//! Identifiers are parsed once at the system boundary. In particular `BeatId`
//! replaces the upstream habit of sniffing id shapes at every call site: the
//! three disjoint id spaces (on-chain token, local ephemeral id, content-store
//! slug) are made explicit by a tagged type.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

use crate::credits::CreditError;
use crate::gateway::GatewayError;
use crate::records::RecordError;
use crate::storage::StorageError;

/// Crate-wide error type.
#[derive(Debug, Error)]
pub enum BacklineError {
    #[error(transparent)]
    Gateway(#[from] GatewayError),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Record(#[from] RecordError),

    #[error(transparent)]
    Credit(#[from] CreditError),

    /// Rejected synchronously, no upstream call was attempted
    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, BacklineError>;

// ============================================================================
// Content hashes
// ============================================================================

/// Opaque identifier for a piece of content in the content-addressed network.
///
/// Never interpreted, only resolved: any compatible gateway serves the same
/// bytes for the same hash.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContentHash(pub String);

impl ContentHash {
    pub fn new(hash: impl Into<String>) -> Self {
        Self(hash.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ContentHash {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

// ============================================================================
// Wallet addresses
// ============================================================================

/// Canonical (lower-cased) wallet address.
///
/// Producers keyed by wallet are merged across sources on this canonical
/// form, so two casings of the same address never split a record.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WalletAddress(String);

impl WalletAddress {
    /// Parse and canonicalize a wallet address (`0x` + 40 hex chars).
    pub fn parse(input: &str) -> Option<Self> {
        let trimmed = input.trim();
        if Self::looks_like_address(trimmed) {
            Some(Self(trimmed.to_ascii_lowercase()))
        } else {
            None
        }
    }

    /// Shape check without canonicalization.
    pub fn looks_like_address(input: &str) -> bool {
        input.len() == 42
            && input.starts_with("0x")
            && input[2..].chars().all(|c| c.is_ascii_hexdigit())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for WalletAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ============================================================================
// Beat identifiers
// ============================================================================

/// Digit count above which an all-numeric id is a timestamp-derived local id
/// rather than an on-chain token id.
const LOCAL_ID_MIN_DIGITS: usize = 11;

/// Tagged beat identifier, produced once at the system boundary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BeatId {
    /// Short numeric on-chain token id
    OnChainToken(u64),
    /// Long numeric (timestamp-derived) local/ephemeral id
    LocalEphemeral(u64),
    /// Content-store slug
    ContentSlug(String),
}

impl BeatId {
    /// Parse a raw id string into its id space.
    ///
    /// Returns `None` for empty input. All-numeric ids with more than 10
    /// digits are local/ephemeral (millisecond timestamps are 13 digits);
    /// shorter numerics are on-chain token ids; everything else is a slug.
    pub fn parse(raw: &str) -> Option<Self> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return None;
        }

        if trimmed.chars().all(|c| c.is_ascii_digit()) {
            if let Ok(n) = trimmed.parse::<u64>() {
                if trimmed.len() >= LOCAL_ID_MIN_DIGITS {
                    return Some(BeatId::LocalEphemeral(n));
                }
                return Some(BeatId::OnChainToken(n));
            }
        }

        Some(BeatId::ContentSlug(trimmed.to_string()))
    }
}

impl fmt::Display for BeatId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BeatId::OnChainToken(n) => write!(f, "{n}"),
            BeatId::LocalEphemeral(n) => write!(f, "{n}"),
            BeatId::ContentSlug(s) => f.write_str(s),
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wallet_parse_canonicalizes() {
        let addr = WalletAddress::parse("0xAbCd00000000000000000000000000000000Ef12").unwrap();
        assert_eq!(addr.as_str(), "0xabcd00000000000000000000000000000000ef12");
    }

    #[test]
    fn test_wallet_parse_rejects_bad_shapes() {
        assert!(WalletAddress::parse("").is_none());
        assert!(WalletAddress::parse("0x123").is_none());
        assert!(WalletAddress::parse("abcd00000000000000000000000000000000ef12ab").is_none());
        assert!(WalletAddress::parse("0xzzcd00000000000000000000000000000000ef12").is_none());
    }

    #[test]
    fn test_beat_id_empty() {
        assert_eq!(BeatId::parse(""), None);
        assert_eq!(BeatId::parse("   "), None);
    }

    #[test]
    fn test_beat_id_token_vs_local_boundary() {
        // 10 digits: still an on-chain token id
        assert_eq!(BeatId::parse("1234567890"), Some(BeatId::OnChainToken(1234567890)));
        // 11 digits: local/ephemeral
        assert_eq!(
            BeatId::parse("12345678901"),
            Some(BeatId::LocalEphemeral(12345678901))
        );
        // millisecond timestamp id
        assert_eq!(
            BeatId::parse("1714000000000"),
            Some(BeatId::LocalEphemeral(1714000000000))
        );
    }

    #[test]
    fn test_beat_id_slug() {
        assert_eq!(
            BeatId::parse("midnight-trap-140"),
            Some(BeatId::ContentSlug("midnight-trap-140".to_string()))
        );
        // mixed alphanumerics are slugs, not numbers
        assert_eq!(
            BeatId::parse("42beats"),
            Some(BeatId::ContentSlug("42beats".to_string()))
        );
    }
}
