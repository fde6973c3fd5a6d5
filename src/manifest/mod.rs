//! The published index document
//!
//! A [`Manifest`] lists every registry entry with its latest successful
//! record. It is built by folding a run's outcomes into the previous
//! manifest, so an entry that fails to resolve keeps the record it had
//! before instead of disappearing.

pub mod store;

pub use store::{ManifestStore, Recovery, StagedSite, WriteLock};

use crate::error::{IndexError, IndexResult};
use crate::record::ResolvedRecord;
use crate::registry::{EntryId, EntryKind};
use crate::scheduler::Outcome;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::path::Path;
use tracing::debug;

/// Manifest format version
pub const MANIFEST_SCHEMA: u32 = 1;

/// Run summary at the top of the manifest
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildHeader {
    pub schema: u32,
    pub generated_at: DateTime<Utc>,
    pub indexer_version: String,
    /// Entries in the registry
    pub total: usize,
    /// Entries resolved successfully this run
    pub ok: usize,
    /// Entries whose resolution failed this run
    pub failed: usize,
    /// Entries served from the cache or a shared resolution
    pub skipped: usize,
    /// Failed entries that kept a previous record
    pub stale: usize,
}

/// One registry entry as published
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ManifestEntry {
    pub id: EntryId,

    #[serde(default)]
    pub tags: Vec<String>,

    /// Latest successful record, absent if there never was one
    pub record: Option<ResolvedRecord>,

    /// Reason the most recent resolution failed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure: Option<String>,

    /// Data artifact, relative to the site root
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<String>,

    /// Resolution log, relative to the site root
    pub log: String,
}

impl ManifestEntry {
    /// Failed this run but still carries a previous record
    pub fn is_stale(&self) -> bool {
        self.failure.is_some() && self.record.is_some()
    }

    /// Failed and has nothing to show
    pub fn is_absent(&self) -> bool {
        self.record.is_none()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Manifest {
    pub header: BuildHeader,
    pub entries: Vec<ManifestEntry>,
}

impl Manifest {
    /// Fold a run's outcomes into the previous manifest.
    ///
    /// Outcomes must be in registry order. Identities missing from
    /// `outcomes` are dropped.
    pub fn build(previous: Option<&Manifest>, outcomes: &[Outcome]) -> Self {
        let prior: HashMap<&EntryId, &ResolvedRecord> = previous
            .map(|m| {
                m.entries
                    .iter()
                    .filter_map(|e| e.record.as_ref().map(|r| (&e.id, r)))
                    .collect()
            })
            .unwrap_or_default();

        let mut header = BuildHeader {
            schema: MANIFEST_SCHEMA,
            generated_at: Utc::now(),
            indexer_version: env!("CARGO_PKG_VERSION").to_string(),
            total: outcomes.len(),
            ok: 0,
            failed: 0,
            skipped: 0,
            stale: 0,
        };

        let mut entries = Vec::with_capacity(outcomes.len());
        for outcome in outcomes {
            let resolution = &outcome.resolution;
            let id = outcome.entry.id.clone();
            let dir = artifact_dir(id.kind, &id.locator);

            let (record, failure) = if resolution.record.is_ok() {
                header.ok += 1;
                if resolution.source.is_skip() {
                    header.skipped += 1;
                }
                (Some(resolution.record.clone()), None)
            } else {
                header.failed += 1;
                let kept = prior.get(&id).map(|r| (*r).clone());
                if kept.is_some() {
                    header.stale += 1;
                    debug!("Keeping previous record for {}", id);
                }
                (kept, resolution.record.failure().map(str::to_string))
            };

            entries.push(ManifestEntry {
                data: record.as_ref().map(|_| format!("{}/index.json", dir)),
                log: format!("{}/resolve.log", dir),
                tags: outcome.entry.tags.clone(),
                id,
                record,
                failure,
            });
        }

        Self { header, entries }
    }

    pub fn get(&self, id: &EntryId) -> Option<&ManifestEntry> {
        self.entries.iter().find(|e| &e.id == id)
    }

    /// Drop the records of the given identities, returning how many were
    /// removed. The entries stay listed.
    pub fn forget(&mut self, ids: &HashSet<EntryId>) -> usize {
        let mut removed = 0;
        for entry in self.entries.iter_mut().filter(|e| ids.contains(&e.id)) {
            if entry.record.take().is_some() {
                entry.data = None;
                removed += 1;
            }
        }
        removed
    }

    pub fn to_json(&self) -> IndexResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Parse a manifest read from `path`
    pub fn from_json(path: &Path, content: &str) -> IndexResult<Self> {
        serde_json::from_str(content).map_err(|e| IndexError::ManifestInvalid {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })
    }
}

/// Artifact directory for an entry, relative to the site root:
/// `entries/<ecosystem>/<name>`
pub fn artifact_dir(kind: EntryKind, locator: &str) -> String {
    let name: String = kind
        .canonical_locator(locator)
        .chars()
        .map(|c| if matches!(c, '/' | ':') { '_' } else { c })
        .collect();
    format!("entries/{}/{}", kind.ecosystem(), name)
}
