//! Producer and Beat record model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::{ContentHash, WalletAddress};

/// Which upstream produced a record. Lower priority wins merges.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordSource {
    /// Authoritative on-chain ledger
    Web3,
    /// Managed content store
    Sanity,
}

impl RecordSource {
    /// Merge priority; lower = more authoritative.
    pub fn priority(&self) -> u8 {
        match self {
            RecordSource::Web3 => 1,
            RecordSource::Sanity => 2,
        }
    }
}

impl Default for RecordSource {
    fn default() -> Self {
        RecordSource::Sanity
    }
}

fn default_priority() -> u8 {
    RecordSource::Sanity.priority()
}

/// Producer identity, keyed by canonical wallet address or content-store id.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Producer {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub bio: String,
    #[serde(default)]
    pub location: String,
    #[serde(default)]
    pub genres: Vec<String>,
    /// Dynamic field owned by the ledger when both sources know the producer
    #[serde(default)]
    pub total_beats: u32,
    /// Dynamic field owned by the ledger when both sources know the producer
    #[serde(default)]
    pub total_sales: u32,
    #[serde(default)]
    pub wallet_address: Option<WalletAddress>,
    #[serde(default)]
    pub source: RecordSource,
}

/// A beat record from any source.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Beat {
    pub id: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub genre: String,
    #[serde(default)]
    pub bpm: u32,
    #[serde(default)]
    pub price: f64,
    #[serde(default)]
    pub producer_id: String,
    #[serde(default)]
    pub audio: Option<ContentHash>,
    #[serde(default)]
    pub cover: Option<ContentHash>,
    #[serde(default = "default_active")]
    pub is_active: bool,
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub source: RecordSource,
    /// Numeric merge priority; kept alongside `source` so merged result sets
    /// stay sortable after serialization
    #[serde(default = "default_priority")]
    pub priority: u8,
}

fn default_active() -> bool {
    true
}

impl Beat {
    /// Stamp the source tag and its derived priority.
    pub fn tagged(mut self, source: RecordSource) -> Self {
        self.source = source;
        self.priority = source.priority();
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_source_priorities() {
        assert_eq!(RecordSource::Web3.priority(), 1);
        assert_eq!(RecordSource::Sanity.priority(), 2);
    }

    #[test]
    fn test_beat_deserializes_with_defaults() {
        // metadata endpoint returns flat beat-shaped JSON with gaps
        let beat: Beat = serde_json::from_str(
            r#"{"id": "1714000000000", "title": "Night Drive", "bpm": 140}"#,
        )
        .unwrap();
        assert!(beat.is_active);
        assert_eq!(beat.source, RecordSource::Sanity);
        assert_eq!(beat.priority, 2);
    }

    #[test]
    fn test_tagged_sets_both_fields() {
        let beat: Beat = serde_json::from_str(r#"{"id": "7"}"#).unwrap();
        let beat = beat.tagged(RecordSource::Web3);
        assert_eq!(beat.source, RecordSource::Web3);
        assert_eq!(beat.priority, 1);
    }
}
