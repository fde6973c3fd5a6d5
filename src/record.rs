//! Resolved records and the normalized metadata document
//!
//! A [`ResolvedRecord`] is what one resolution attempt produces. Successful
//! records are immutable once stored in the content cache and are carried
//! into the manifest unchanged.

use crate::cache::fingerprint::{digest_json, Fingerprint};
use crate::registry::{Entry, EntryId, EntryKind};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Two consecutive releases, oldest first
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReleasePair {
    pub old: String,
    pub new: String,
}

/// Normalized metadata for one entry, the shape the site consumes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetadataDocument {
    /// Canonical name
    pub name: String,

    /// Ecosystem directory name ("pypi", "docker")
    pub ecosystem: String,

    pub kind: EntryKind,

    /// Newest release in version order
    pub latest: Option<String>,

    /// All releases, ascending
    pub releases: Vec<String>,

    /// Consecutive release pairs, ascending
    pub pairs: Vec<ReleasePair>,

    /// Short upstream description
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,

    /// Upstream extras plus the entry's configured metadata
    #[serde(default)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// Outcome of a resolution attempt
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "lowercase")]
pub enum RecordStatus {
    Ok {
        /// SHA-256 over the normalized document
        content_digest: String,
        document: MetadataDocument,
    },
    Failed {
        reason: String,
    },
}

/// Result of resolving one entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolvedRecord {
    pub id: EntryId,

    #[serde(default)]
    pub tags: Vec<String>,

    pub fingerprint: Fingerprint,

    pub resolved_at: DateTime<Utc>,

    pub status: RecordStatus,
}

impl ResolvedRecord {
    /// Successful record for `entry`
    pub fn ok(entry: &Entry, fingerprint: Fingerprint, document: MetadataDocument) -> Self {
        Self {
            id: entry.id.clone(),
            tags: entry.tags.clone(),
            fingerprint,
            resolved_at: Utc::now(),
            status: RecordStatus::Ok {
                content_digest: digest_json(&document),
                document,
            },
        }
    }

    /// Failed record for `entry`
    pub fn failed(entry: &Entry, fingerprint: Fingerprint, reason: impl Into<String>) -> Self {
        Self {
            id: entry.id.clone(),
            tags: entry.tags.clone(),
            fingerprint,
            resolved_at: Utc::now(),
            status: RecordStatus::Failed {
                reason: reason.into(),
            },
        }
    }

    pub fn is_ok(&self) -> bool {
        matches!(self.status, RecordStatus::Ok { .. })
    }

    pub fn document(&self) -> Option<&MetadataDocument> {
        match &self.status {
            RecordStatus::Ok { document, .. } => Some(document),
            RecordStatus::Failed { .. } => None,
        }
    }

    pub fn content_digest(&self) -> Option<&str> {
        match &self.status {
            RecordStatus::Ok { content_digest, .. } => Some(content_digest),
            RecordStatus::Failed { .. } => None,
        }
    }

    pub fn failure(&self) -> Option<&str> {
        match &self.status {
            RecordStatus::Failed { reason } => Some(reason),
            RecordStatus::Ok { .. } => None,
        }
    }

    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.iter().any(|t| t == tag)
    }

    /// Same resolution, attributed to another entry sharing the fingerprint
    pub fn rebind(&self, entry: &Entry) -> Self {
        let mut record = self.clone();
        record.id = entry.id.clone();
        record.tags = entry.tags.clone();
        record
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn document() -> MetadataDocument {
        MetadataDocument {
            name: "requests".into(),
            ecosystem: "pypi".into(),
            kind: EntryKind::Package,
            latest: Some("2.0.0".into()),
            releases: vec!["1.0.0".into(), "2.0.0".into()],
            pairs: vec![ReleasePair {
                old: "1.0.0".into(),
                new: "2.0.0".into(),
            }],
            summary: None,
            extra: serde_json::Map::new(),
        }
    }

    #[test]
    fn ok_record_carries_digest() {
        let entry = Entry::new(EntryKind::Package, "requests");
        let fp = Fingerprint::probe(&entry, Some("42"));
        let record = ResolvedRecord::ok(&entry, fp, document());

        assert!(record.is_ok());
        assert_eq!(record.content_digest().unwrap(), digest_json(&document()));
        assert!(record.failure().is_none());
    }

    #[test]
    fn status_serializes_tagged() {
        let entry = Entry::new(EntryKind::Package, "requests");
        let fp = Fingerprint::probe(&entry, None);
        let record = ResolvedRecord::failed(&entry, fp, "timeout");

        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["status"]["state"], "failed");
        assert_eq!(json["status"]["reason"], "timeout");
        assert_eq!(json["id"]["kind"], "package");

        let parsed: ResolvedRecord = serde_json::from_value(json).unwrap();
        assert_eq!(parsed, record);
    }

    #[test]
    fn rebind_changes_identity_only() {
        let first = Entry::new(EntryKind::Package, "Requests");
        let second = Entry::new(EntryKind::Package, "requests").with_tags(["std"]);
        let fp = Fingerprint::probe(&first, Some("1"));
        let record = ResolvedRecord::ok(&first, fp.clone(), document());

        let rebound = record.rebind(&second);
        assert_eq!(rebound.id, second.id);
        assert!(rebound.has_tag("std"));
        assert_eq!(rebound.fingerprint, fp);
        assert_eq!(rebound.status, record.status);
    }
}
