//! Source registry
//!
//! Turns the `[[entries]]` list of a config document into validated,
//! immutable [`Entry`] values in configuration order.

use crate::config::{Config, EntrySpec};
use crate::error::{IndexError, IndexResult};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

/// Kind of upstream source
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryKind {
    /// A project on the package index
    Package,
    /// A repository on the image registry
    Image,
}

impl EntryKind {
    /// Ecosystem directory used in the artifact tree
    pub fn ecosystem(&self) -> &'static str {
        match self {
            Self::Package => "pypi",
            Self::Image => "docker",
        }
    }

    /// Canonical form of a locator for this kind.
    ///
    /// Packages follow the index's name normalization (case-folded, runs of
    /// `-`, `_` and `.` collapsed to `-`). Images drop the tag and gain the
    /// `library/` namespace when bare.
    pub fn canonical_locator(&self, locator: &str) -> String {
        match self {
            Self::Package => {
                let mut out = String::with_capacity(locator.len());
                let mut in_sep = false;
                for c in locator.trim().chars() {
                    if matches!(c, '-' | '_' | '.') {
                        if !in_sep {
                            out.push('-');
                        }
                        in_sep = true;
                    } else {
                        out.extend(c.to_lowercase());
                        in_sep = false;
                    }
                }
                out
            }
            Self::Image => {
                let trimmed = locator.trim().to_lowercase();
                let last_slash = trimmed.rfind('/').map_or(0, |i| i + 1);
                let repo = match trimmed[last_slash..].find(|c: char| c == ':' || c == '@') {
                    Some(i) => &trimmed[..last_slash + i],
                    None => trimmed.as_str(),
                };
                if repo.contains('/') {
                    repo.to_string()
                } else {
                    format!("library/{}", repo)
                }
            }
        }
    }
}

impl fmt::Display for EntryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Package => write!(f, "package"),
            Self::Image => write!(f, "image"),
        }
    }
}

/// Identity of an entry: `(kind, locator)` as configured
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EntryId {
    pub kind: EntryKind,
    pub locator: String,
}

impl EntryId {
    pub fn new(kind: EntryKind, locator: impl Into<String>) -> Self {
        Self {
            kind,
            locator: locator.into(),
        }
    }
}

impl fmt::Display for EntryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.kind, self.locator)
    }
}

/// One source configured for indexing
#[derive(Debug, Clone, PartialEq)]
pub struct Entry {
    pub id: EntryId,
    pub tags: Vec<String>,
    pub metadata: toml::Table,
}

impl Entry {
    pub fn new(kind: EntryKind, locator: impl Into<String>) -> Self {
        Self {
            id: EntryId::new(kind, locator),
            tags: Vec::new(),
            metadata: toml::Table::new(),
        }
    }

    /// Builder-style tag setter
    pub fn with_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags = tags.into_iter().map(Into::into).collect();
        self
    }

    pub fn kind(&self) -> EntryKind {
        self.id.kind
    }

    pub fn locator(&self) -> &str {
        &self.id.locator
    }

    /// Locator in the kind's canonical form
    pub fn canonical_locator(&self) -> String {
        self.id.kind.canonical_locator(&self.id.locator)
    }

    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.iter().any(|t| t == tag)
    }
}

/// Ordered, validated set of entries for one run
#[derive(Debug, Clone, Default)]
pub struct SourceRegistry {
    entries: Vec<Arc<Entry>>,
}

impl SourceRegistry {
    /// Load entries from configuration.
    ///
    /// Fails on empty or control-character locators and on duplicate
    /// identities.
    pub fn load(config: &Config) -> IndexResult<Self> {
        Self::from_specs(&config.entries)
    }

    pub fn from_specs(specs: &[EntrySpec]) -> IndexResult<Self> {
        Self::from_entries(specs.iter().map(|spec| Entry {
            id: EntryId::new(spec.kind, spec.locator.clone()),
            tags: spec.tags.clone(),
            metadata: spec.metadata.clone(),
        }))
    }

    /// Validate already-built entries, keeping their order
    pub fn from_entries<I>(entries: I) -> IndexResult<Self>
    where
        I: IntoIterator<Item = Entry>,
    {
        let mut seen = HashSet::new();
        let mut validated = Vec::new();

        for entry in entries {
            validate_locator(entry.locator())?;
            if !seen.insert(entry.id.clone()) {
                return Err(IndexError::DuplicateEntry(entry.id.to_string()));
            }
            validated.push(Arc::new(entry));
        }

        Ok(Self { entries: validated })
    }

    pub fn entries(&self) -> &[Arc<Entry>] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Identities carrying `tag`
    pub fn tagged(&self, tag: &str) -> HashSet<EntryId> {
        self.entries
            .iter()
            .filter(|e| e.has_tag(tag))
            .map(|e| e.id.clone())
            .collect()
    }
}

fn validate_locator(locator: &str) -> IndexResult<()> {
    if locator.trim().is_empty() {
        return Err(IndexError::EntryInvalid {
            locator: locator.to_string(),
            reason: "locator cannot be empty".to_string(),
        });
    }
    if locator.chars().any(char::is_control) {
        return Err(IndexError::EntryInvalid {
            locator: locator.to_string(),
            reason: "locator must not contain control characters".to_string(),
        });
    }
    if locator.contains("..") {
        return Err(IndexError::EntryInvalid {
            locator: locator.to_string(),
            reason: "locator must not contain '..'".to_string(),
        });
    }
    Ok(())
}
