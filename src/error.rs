//! Error types for apidex
//!
//! All modules use `IndexResult<T>` as their return type. Errors that only
//! affect a single entry live in [`ResolveError`] and never escape the
//! scheduler; they are folded into the entry's record instead.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for indexer operations
pub type IndexResult<T> = Result<T, IndexError>;

/// Errors that abort an indexing run
#[derive(Error, Debug)]
pub enum IndexError {
    // Configuration errors
    #[error("Invalid configuration at {path}: {reason}")]
    ConfigInvalid { path: PathBuf, reason: String },

    #[error("Configuration file not found: {0}")]
    ConfigNotFound(PathBuf),

    #[error("Duplicate entry in configuration: {0}")]
    DuplicateEntry(String),

    #[error("Invalid entry {locator:?}: {reason}")]
    EntryInvalid { locator: String, reason: String },

    // Cache errors
    #[error("Cache corruption at {fingerprint}: {reason}")]
    CacheCorruption { fingerprint: String, reason: String },

    // Manifest errors
    #[error("Failed to commit manifest: {reason}")]
    Commit { reason: String },

    #[error("Manifest at {path} is unreadable: {reason}")]
    ManifestInvalid { path: PathBuf, reason: String },

    #[error("Another apidex process is writing here (lock {0})")]
    Locked(PathBuf),

    // Run errors
    #[error("Run timed out after {0:?}, nothing was committed")]
    RunTimedOut(std::time::Duration),

    #[error("Worker task failed: {0}")]
    Worker(String),

    // IO errors
    #[error("IO error: {context}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    // Serialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("TOML serialize error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),

    // General errors
    #[error("Internal error: {0}")]
    Internal(String),
}

impl IndexError {
    /// Create an IO error with context
    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }

    /// Create a cache corruption error
    pub fn corruption(fingerprint: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::CacheCorruption {
            fingerprint: fingerprint.into(),
            reason: reason.into(),
        }
    }

    /// Create a commit error
    pub fn commit(reason: impl Into<String>) -> Self {
        Self::Commit {
            reason: reason.into(),
        }
    }

    /// Whether the error was raised before any resolver could run
    pub fn is_config_error(&self) -> bool {
        matches!(
            self,
            Self::ConfigInvalid { .. }
                | Self::ConfigNotFound(_)
                | Self::DuplicateEntry(_)
                | Self::EntryInvalid { .. }
                | Self::TomlParse(_)
        )
    }

    /// Get actionable hint for the error
    pub fn hint(&self) -> Option<&'static str> {
        match self {
            Self::CacheCorruption { .. } => {
                Some("Run: apidex invalidate --cache to drop the cache and rebuild")
            }
            Self::DuplicateEntry(_) => Some("Each (kind, locator) pair may appear only once"),
            Self::RunTimedOut(_) => Some("Raise [run] timeout_secs or lower the entry count"),
            Self::Commit { .. } => Some("The previous manifest is still in place"),
            Self::ManifestInvalid { .. } => {
                Some("Run: apidex invalidate --all to discard the manifest")
            }
            Self::Locked(_) => {
                Some("Wait for the other run to finish; if none is running, delete the lock file")
            }
            _ => None,
        }
    }
}

/// Errors local to one entry's resolution
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ResolveError {
    #[error("fetch failed for {url}: {reason}")]
    Fetch { url: String, reason: String },

    #[error("upstream returned status {status} for {url}")]
    Status { url: String, status: u16 },

    #[error("malformed upstream data: {0}")]
    Normalization(String),
}

impl ResolveError {
    /// Create a fetch error
    pub fn fetch(url: impl Into<String>, reason: impl ToString) -> Self {
        Self::Fetch {
            url: url.into(),
            reason: reason.to_string(),
        }
    }

    /// Create a normalization error
    pub fn normalization(reason: impl Into<String>) -> Self {
        Self::Normalization(reason.into())
    }
}
