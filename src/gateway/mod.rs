//! Content-addressed gateway resolution and caching.
//!
//! Three layers:
//!
//! - [`GatewayResolver`] - resolves a content hash against an ordered list of
//!   public gateways (optionally behind a privileged proxy), with per-request
//!   timeouts and response validation
//! - [`ManifestCache`] - TTL-boxed, persisted cache in front of the resolver
//!   for the production manifest, with a built-in development fallback
//! - [`AssetCache`] - process-wide map of resolved asset handles; entries are
//!   content-addressed and therefore never expire
//!
//! Manifest resolution is strict (callers must handle
//! [`GatewayError::AllGatewaysFailed`]); asset resolution is lenient and
//! always returns a usable handle, resolved or not.

pub mod assets;
pub mod manifest;
pub mod resolver;

pub use assets::{AssetCache, AssetCacheStats, AssetHandle};
pub use manifest::{Manifest, ManifestCache, SponsorData, SponsorEntry};
pub use resolver::GatewayResolver;

use thiserror::Error;

/// Error types for gateway resolution.
#[derive(Debug, Error)]
pub enum GatewayError {
    /// Every gateway in the list failed; carries the last failure seen
    #[error("All gateways failed: {last}")]
    AllGatewaysFailed { last: String },

    /// Request-level failure (connect error, timeout, body read)
    #[error("Gateway fetch failed: {0}")]
    FetchFailed(String),

    /// Non-2xx response
    #[error("HTTP {status} from {url}")]
    BadStatus { status: u16, url: String },

    /// 200 response whose body is an HTML error page, not content
    #[error("HTML body from {0}")]
    HtmlBody(String),

    /// Body was not valid manifest JSON
    #[error("Manifest parse failed: {0}")]
    ParseFailed(String),
}
