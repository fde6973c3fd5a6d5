//! Persistent content cache for resolved records
//!
//! Provides content-addressed caching keyed by entry fingerprints.
//! Entries are immutable once stored, so repeated runs skip any entry whose
//! upstream has not changed.
//!
//! # Cache States
//!
//! | Lookup | Meaning |
//! |--------|---------|
//! | Miss | No entry for this fingerprint, resolve upstream |
//! | Hit | Reuse the stored record, no upstream fetch |
//! | Corrupt | Stored content disagrees with its key, abort the run |

pub mod fingerprint;
pub mod store;

pub use fingerprint::{digest_json, Fingerprint, FINGERPRINT_SCHEME};
pub use store::{CacheEntry, ContentCache, StoreOutcome};
