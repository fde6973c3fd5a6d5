//! Forced reprocessing
//!
//! Two independent switches, applied before a run:
//!
//! | Request          | Cache                              | Manifest            |
//! |------------------|------------------------------------|---------------------|
//! | `Full`           | untouched                          | deleted             |
//! | `Subset(tag)`    | entries of tagged identities purged | their records dropped |
//!
//! `Full` alone does not cost upstream fetches: entries with unchanged
//! markers still hit the cache. `Subset` forces real refetches for the
//! tagged entries only.

use crate::cache::{ContentCache, Fingerprint};
use crate::error::IndexResult;
use crate::journal::{JournalEvent, RunJournal};
use crate::manifest::ManifestStore;
use crate::registry::SourceRegistry;
use std::collections::HashSet;
use std::fmt;
use tracing::{debug, info};

/// One forced-reprocessing request
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Invalidation {
    /// Forget the previous manifest
    Full,
    /// Purge everything known about entries carrying the tag
    Subset(String),
}

impl fmt::Display for Invalidation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Full => write!(f, "full"),
            Self::Subset(tag) => write!(f, "subset({})", tag),
        }
    }
}

/// Requests to apply before a run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InvalidationPlan {
    requests: Vec<Invalidation>,
}

impl InvalidationPlan {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn full(mut self, enabled: bool) -> Self {
        if enabled {
            self.push(Invalidation::Full);
        }
        self
    }

    pub fn subset(mut self, tag: impl Into<String>) -> Self {
        self.push(Invalidation::Subset(tag.into()));
        self
    }

    pub fn push(&mut self, request: Invalidation) {
        if !self.requests.contains(&request) {
            self.requests.push(request);
        }
    }

    pub fn is_empty(&self) -> bool {
        self.requests.is_empty()
    }

    /// Requests in application order: subsets first, then full
    pub fn ordered(&self) -> Vec<&Invalidation> {
        let mut ordered: Vec<&Invalidation> = self
            .requests
            .iter()
            .filter(|r| matches!(r, Invalidation::Subset(_)))
            .collect();
        ordered.extend(self.requests.iter().filter(|r| **r == Invalidation::Full));
        ordered
    }
}

/// What applying a plan changed
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InvalidationReport {
    pub manifest_removed: bool,
    pub cache_entries: usize,
    pub records: usize,
}

pub struct InvalidationController<'a> {
    cache: &'a ContentCache,
    store: &'a ManifestStore,
    journal: &'a RunJournal,
}

impl<'a> InvalidationController<'a> {
    pub fn new(cache: &'a ContentCache, store: &'a ManifestStore, journal: &'a RunJournal) -> Self {
        Self {
            cache,
            store,
            journal,
        }
    }

    /// Apply every request in `plan`
    pub async fn apply(
        &self,
        plan: &InvalidationPlan,
        registry: &SourceRegistry,
    ) -> IndexResult<InvalidationReport> {
        let mut report = InvalidationReport::default();
        for request in plan.ordered() {
            match request {
                Invalidation::Subset(tag) => {
                    let (cache_entries, records) = self.force_subset(tag, registry).await?;
                    report.cache_entries += cache_entries;
                    report.records += records;
                }
                Invalidation::Full => {
                    report.manifest_removed |= self.force_full().await?;
                }
            }
        }
        Ok(report)
    }

    /// Delete the committed manifest, leaving the cache as is.
    ///
    /// Returns whether there was a manifest to delete.
    pub async fn force_full(&self) -> IndexResult<bool> {
        let removed = self.store.remove().await?;
        if removed {
            info!("Removed manifest {}", self.store.manifest_path().display());
        } else {
            debug!("No manifest to remove");
        }
        self.journal
            .record(JournalEvent::InvalidateFull {
                removed_manifest: removed,
            })
            .await;
        Ok(removed)
    }

    /// Purge cache entries and manifest records for entries tagged `tag`.
    ///
    /// An entry is covered when its record carries the tag or its identity
    /// is tagged in `registry`. Cache entries sharing a fingerprint with a
    /// covered record go too. The live manifest is rewritten and the covered
    /// entries' `index.json` files are removed from the site. Returns
    /// `(cache entries, manifest records)` removed.
    pub async fn force_subset(&self, tag: &str, registry: &SourceRegistry) -> IndexResult<(usize, usize)> {
        let mut manifest = self.store.load().await?;

        let mut ids = registry.tagged(tag);
        let mut fingerprints: HashSet<Fingerprint> = HashSet::new();
        if let Some(manifest) = &manifest {
            for entry in &manifest.entries {
                let Some(record) = &entry.record else { continue };
                if record.has_tag(tag) || entry.tags.iter().any(|t| t == tag) {
                    ids.insert(entry.id.clone());
                }
                if ids.contains(&entry.id) {
                    fingerprints.insert(record.fingerprint.clone());
                }
            }
        }

        let cache_entries = self
            .cache
            .clear(|r| {
                r.has_tag(tag) || ids.contains(&r.id) || fingerprints.contains(&r.fingerprint)
            })
            .await?;

        let records = match manifest.as_mut() {
            Some(manifest) => {
                let removed = manifest.forget(&ids);
                if removed > 0 {
                    self.store.rewrite(manifest).await?;
                }
                removed
            }
            None => 0,
        };

        info!(
            "Invalidated tag {}: {} cache entries, {} manifest records",
            tag, cache_entries, records
        );
        self.journal
            .record(JournalEvent::InvalidateSubset {
                tag: tag.to_string(),
                cache_entries,
                records,
            })
            .await;
        Ok((cache_entries, records))
    }
}
