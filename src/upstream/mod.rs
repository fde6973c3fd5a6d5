//! Upstream source abstraction
//!
//! Provides a trait for read-only metadata access that can be implemented
//! by different backends:
//! - HTTP: the package index JSON API and the image registry API
//! - Memory: fixed data for tests

pub mod http;
#[cfg(test)]
pub(crate) mod memory;

pub use http::HttpUpstream;

use crate::error::ResolveError;
use crate::registry::Entry;
use async_trait::async_trait;

/// Raw metadata as returned by an upstream, before normalization
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawMetadata {
    /// URL the metadata was read from
    pub source_url: String,

    /// Version strings in upstream order
    pub versions: Vec<String>,

    /// Short description
    pub summary: Option<String>,

    /// Additional upstream fields worth keeping
    pub extra: serde_json::Map<String, serde_json::Value>,

    /// Caveats about this fetch, such as a cut-off tag listing
    pub notes: Vec<String>,
}

/// Read-only access to an upstream registry
#[async_trait]
pub trait Upstream: Send + Sync {
    /// Cheap version marker for an entry (serial number, last-modified
    /// stamp). `None` when the upstream offers nothing cheaper than a full
    /// fetch.
    async fn marker(&self, entry: &Entry) -> Result<Option<String>, ResolveError>;

    /// Fetch full metadata for an entry
    async fn fetch(&self, entry: &Entry) -> Result<RawMetadata, ResolveError>;

    /// Human-readable backend name for logs
    fn name(&self) -> &'static str;
}
