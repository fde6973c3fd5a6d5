//! Fingerprints for content-addressed caching
//!
//! A fingerprint is the SHA-256 of a canonical JSON encoding of an entry's
//! canonical identity, its configured metadata and either an upstream
//! version marker or the normalized document itself. Same inputs, same key.

use crate::record::MetadataDocument;
use crate::registry::{Entry, EntryKind};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

/// Bumped whenever the fingerprint inputs or document shape change
pub const FINGERPRINT_SCHEME: u32 = 1;

/// Deterministic cache key, 64 lowercase hex chars
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Fingerprint(String);

#[derive(Serialize)]
#[serde(rename_all = "lowercase")]
enum Basis<'a> {
    Marker(Option<&'a str>),
    Content(&'a str),
}

#[derive(Serialize)]
struct FingerprintInput<'a> {
    scheme: u32,
    kind: EntryKind,
    locator: &'a str,
    metadata: &'a toml::Table,
    basis: Basis<'a>,
}

impl Fingerprint {
    /// Key derived from identity and a cheap upstream version marker.
    ///
    /// With no marker the key depends on identity alone; it is then only
    /// used to serialize concurrent work, never to look up the cache.
    pub fn probe(entry: &Entry, marker: Option<&str>) -> Self {
        Self::compute(entry, Basis::Marker(marker))
    }

    /// Key derived from identity and the normalized document
    pub fn content(entry: &Entry, document: &MetadataDocument) -> Self {
        let digest = digest_json(document);
        Self::compute(entry, Basis::Content(&digest))
    }

    fn compute(entry: &Entry, basis: Basis<'_>) -> Self {
        let locator = entry.canonical_locator();
        let input = FingerprintInput {
            scheme: FINGERPRINT_SCHEME,
            kind: entry.kind(),
            locator: &locator,
            metadata: &entry.metadata,
            basis,
        };
        Self(digest_json(&input))
    }

    /// Parse a stored fingerprint, rejecting anything but 64 hex chars
    pub fn parse(s: &str) -> Option<Self> {
        let valid = s.len() == 64 && s.chars().all(|c| matches!(c, '0'..='9' | 'a'..='f'));
        valid.then(|| Self(s.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// First 12 hex chars, for logs
    pub fn short(&self) -> &str {
        &self.0[..12.min(self.0.len())]
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// SHA-256 hex digest of a value's JSON encoding
pub fn digest_json<T: Serialize + ?Sized>(value: &T) -> String {
    let mut hasher = Sha256::new();
    // Serializing plain data structs into a Vec cannot fail
    if let Ok(bytes) = serde_json::to_vec(value) {
        hasher.update(&bytes);
    }
    hex::encode(hasher.finalize())
}
