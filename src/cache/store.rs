//! On-disk content cache
//!
//! One JSON file per fingerprint under `<root>/records/<fp[0..2]>/<fp>.json`.
//! Files are written to a temp name and renamed into place, so readers only
//! ever see complete entries. An entry is never rewritten with different
//! content; a changed fingerprint is a new file.

use crate::cache::fingerprint::Fingerprint;
use crate::error::{IndexError, IndexResult};
use crate::record::ResolvedRecord;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, warn};
use uuid::Uuid;

/// Persisted cache file contents
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheEntry {
    pub fingerprint: Fingerprint,
    pub stored_at: DateTime<Utc>,
    pub record: ResolvedRecord,
}

/// Result of a [`ContentCache::store`] call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreOutcome {
    /// A new entry was written
    Written,
    /// An identical entry already existed
    AlreadyPresent,
}

/// Fingerprint-keyed record store
#[derive(Debug, Clone)]
pub struct ContentCache {
    root: PathBuf,
}

impl ContentCache {
    /// Open (and create) a cache rooted at `root`
    pub async fn open(root: impl Into<PathBuf>) -> IndexResult<Self> {
        let root = root.into();
        let records = root.join("records");
        fs::create_dir_all(&records).await.map_err(|e| {
            IndexError::io(format!("creating cache directory {}", records.display()), e)
        })?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn records_dir(&self) -> PathBuf {
        self.root.join("records")
    }

    fn entry_path(&self, fingerprint: &Fingerprint) -> PathBuf {
        let fp = fingerprint.as_str();
        self.records_dir()
            .join(&fp[..2.min(fp.len())])
            .join(format!("{}.json", fp))
    }

    /// Read the record stored under `fingerprint`, if any.
    ///
    /// Local disk only. A file that exists but cannot be parsed, or that is
    /// filed under the wrong key, is reported as corruption.
    pub async fn lookup(&self, fingerprint: &Fingerprint) -> IndexResult<Option<ResolvedRecord>> {
        let path = self.entry_path(fingerprint);
        let content = match fs::read_to_string(&path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(IndexError::io(
                    format!("reading cache entry {}", path.display()),
                    e,
                ))
            }
        };

        let entry: CacheEntry = serde_json::from_str(&content)
            .map_err(|e| IndexError::corruption(fingerprint.as_str(), e.to_string()))?;

        if &entry.fingerprint != fingerprint {
            return Err(IndexError::corruption(
                fingerprint.as_str(),
                format!("file holds entry for {}", entry.fingerprint),
            ));
        }

        debug!("Cache hit {} for {}", fingerprint.short(), entry.record.id);
        Ok(Some(entry.record))
    }

    /// Store a successful record under `fingerprint`.
    ///
    /// Storing identical content again is a no-op. Storing different content
    /// under an existing key means fingerprints are not deterministic and is
    /// reported as corruption.
    pub async fn store(
        &self,
        fingerprint: &Fingerprint,
        record: &ResolvedRecord,
    ) -> IndexResult<StoreOutcome> {
        let Some(digest) = record.content_digest() else {
            return Err(IndexError::Internal(format!(
                "refusing to cache failed record for {}",
                record.id
            )));
        };

        if let Some(existing) = self.lookup(fingerprint).await? {
            return if existing.content_digest() == Some(digest) {
                Ok(StoreOutcome::AlreadyPresent)
            } else {
                Err(IndexError::corruption(
                    fingerprint.as_str(),
                    format!("second store for {} with different content", record.id),
                ))
            };
        }

        let path = self.entry_path(fingerprint);
        let Some(dir) = path.parent() else {
            return Err(IndexError::Internal(format!(
                "cache path {} has no parent",
                path.display()
            )));
        };
        fs::create_dir_all(dir)
            .await
            .map_err(|e| IndexError::io(format!("creating cache shard {}", dir.display()), e))?;

        let entry = CacheEntry {
            fingerprint: fingerprint.clone(),
            stored_at: Utc::now(),
            record: record.clone(),
        };
        let content = serde_json::to_string_pretty(&entry)?;

        let tmp = dir.join(format!(".{}.{}.tmp", fingerprint.as_str(), Uuid::new_v4()));
        fs::write(&tmp, content)
            .await
            .map_err(|e| IndexError::io(format!("writing cache entry {}", tmp.display()), e))?;
        fs::rename(&tmp, &path).await.map_err(|e| {
            IndexError::io(format!("publishing cache entry {}", path.display()), e)
        })?;

        debug!("Cached {} for {}", fingerprint.short(), record.id);
        Ok(StoreOutcome::Written)
    }

    /// Remove every entry whose record matches `predicate`.
    ///
    /// Unreadable entries are left for `lookup` to report.
    pub async fn clear<F>(&self, predicate: F) -> IndexResult<usize>
    where
        F: Fn(&ResolvedRecord) -> bool,
    {
        let mut removed = 0;
        for path in self.entry_files().await? {
            let content = fs::read_to_string(&path).await.map_err(|e| {
                IndexError::io(format!("reading cache entry {}", path.display()), e)
            })?;
            let entry: CacheEntry = match serde_json::from_str(&content) {
                Ok(entry) => entry,
                Err(e) => {
                    warn!("Skipping unreadable cache entry {}: {}", path.display(), e);
                    continue;
                }
            };
            if predicate(&entry.record) {
                remove_file(&path).await?;
                removed += 1;
            }
        }

        debug!("Cleared {} cache entries", removed);
        Ok(removed)
    }

    /// Remove every entry, readable or not
    pub async fn clear_all(&self) -> IndexResult<usize> {
        let files = self.entry_files().await?;
        for path in &files {
            remove_file(path).await?;
        }
        Ok(files.len())
    }

    /// Number of stored entries
    pub async fn len(&self) -> IndexResult<usize> {
        Ok(self.entry_files().await?.len())
    }

    pub async fn is_empty(&self) -> IndexResult<bool> {
        Ok(self.len().await? == 0)
    }

    async fn entry_files(&self) -> IndexResult<Vec<PathBuf>> {
        let records = self.records_dir();
        let mut files = Vec::new();

        let mut shards = match fs::read_dir(&records).await {
            Ok(shards) => shards,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(files),
            Err(e) => return Err(IndexError::io("reading cache directory", e)),
        };

        while let Some(shard) = shards
            .next_entry()
            .await
            .map_err(|e| IndexError::io("reading cache shard", e))?
        {
            if !shard.path().is_dir() {
                continue;
            }
            let mut entries = fs::read_dir(shard.path())
                .await
                .map_err(|e| IndexError::io("reading cache shard", e))?;
            while let Some(entry) = entries
                .next_entry()
                .await
                .map_err(|e| IndexError::io("reading cache entry", e))?
            {
                let path = entry.path();
                let is_entry = path.extension().is_some_and(|ext| ext == "json")
                    && !entry.file_name().to_string_lossy().starts_with('.');
                if is_entry {
                    files.push(path);
                }
            }
        }

        Ok(files)
    }
}

async fn remove_file(path: &Path) -> IndexResult<()> {
    match fs::remove_file(path).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(IndexError::io(
            format!("removing cache entry {}", path.display()),
            e,
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::MetadataDocument;
    use crate::registry::{Entry, EntryKind};
    use tempfile::TempDir;

    async fn test_cache() -> (ContentCache, TempDir) {
        let temp = TempDir::new().unwrap();
        let cache = ContentCache::open(temp.path()).await.unwrap();
        (cache, temp)
    }

    fn document(latest: &str) -> MetadataDocument {
        MetadataDocument {
            name: "six".into(),
            ecosystem: "pypi".into(),
            kind: EntryKind::Package,
            latest: Some(latest.into()),
            releases: vec![latest.into()],
            pairs: vec![],
            summary: None,
            extra: serde_json::Map::new(),
        }
    }

    fn record(entry: &Entry, marker: &str, latest: &str) -> (Fingerprint, ResolvedRecord) {
        let fp = Fingerprint::probe(entry, Some(marker));
        let record = ResolvedRecord::ok(entry, fp.clone(), document(latest));
        (fp, record)
    }

    #[tokio::test]
    async fn store_and_lookup() {
        let (cache, _temp) = test_cache().await;
        let entry = Entry::new(EntryKind::Package, "six");
        let (fp, record) = record(&entry, "1", "1.16.0");

        assert_eq!(cache.store(&fp, &record).await.unwrap(), StoreOutcome::Written);
        let found = cache.lookup(&fp).await.unwrap().unwrap();
        assert_eq!(found, record);
    }

    #[tokio::test]
    async fn lookup_missing_returns_none() {
        let (cache, _temp) = test_cache().await;
        let entry = Entry::new(EntryKind::Package, "six");
        let fp = Fingerprint::probe(&entry, Some("1"));
        assert!(cache.lookup(&fp).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn identical_store_is_noop() {
        let (cache, _temp) = test_cache().await;
        let entry = Entry::new(EntryKind::Package, "six");
        let (fp, record) = record(&entry, "1", "1.16.0");

        cache.store(&fp, &record).await.unwrap();
        assert_eq!(
            cache.store(&fp, &record).await.unwrap(),
            StoreOutcome::AlreadyPresent
        );
        assert_eq!(cache.len().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn conflicting_store_is_corruption() {
        let (cache, _temp) = test_cache().await;
        let entry = Entry::new(EntryKind::Package, "six");
        let (fp, first) = record(&entry, "1", "1.16.0");
        let second = ResolvedRecord::ok(&entry, fp.clone(), document("1.17.0"));

        cache.store(&fp, &first).await.unwrap();
        let err = cache.store(&fp, &second).await.unwrap_err();
        assert!(matches!(err, IndexError::CacheCorruption { .. }));
        // original entry untouched
        assert_eq!(cache.lookup(&fp).await.unwrap().unwrap(), first);
    }

    #[tokio::test]
    async fn failed_records_not_cached() {
        let (cache, _temp) = test_cache().await;
        let entry = Entry::new(EntryKind::Package, "six");
        let fp = Fingerprint::probe(&entry, None);
        let record = ResolvedRecord::failed(&entry, fp.clone(), "boom");
        assert!(cache.store(&fp, &record).await.is_err());
    }

    #[tokio::test]
    async fn unreadable_entry_is_corruption() {
        let (cache, _temp) = test_cache().await;
        let entry = Entry::new(EntryKind::Package, "six");
        let fp = Fingerprint::probe(&entry, Some("1"));
        let path = cache.entry_path(&fp);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, "{ not json").unwrap();

        let err = cache.lookup(&fp).await.unwrap_err();
        assert!(matches!(err, IndexError::CacheCorruption { .. }));
    }

    #[tokio::test]
    async fn clear_by_predicate() {
        let (cache, _temp) = test_cache().await;
        let std_entry = Entry::new(EntryKind::Package, "python").with_tags(["std"]);
        let other = Entry::new(EntryKind::Package, "six");
        let (fp_std, rec_std) = record(&std_entry, "1", "3.12");
        let (fp_other, rec_other) = record(&other, "1", "1.16.0");
        cache.store(&fp_std, &rec_std).await.unwrap();
        cache.store(&fp_other, &rec_other).await.unwrap();

        let removed = cache.clear(|r| r.has_tag("std")).await.unwrap();
        assert_eq!(removed, 1);
        assert!(cache.lookup(&fp_std).await.unwrap().is_none());
        assert!(cache.lookup(&fp_other).await.unwrap().is_some());

        // nothing left to match
        assert_eq!(cache.clear(|r| r.has_tag("std")).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn clear_all_empties_cache() {
        let (cache, _temp) = test_cache().await;
        let entry = Entry::new(EntryKind::Package, "six");
        let (fp, rec) = record(&entry, "1", "1.16.0");
        cache.store(&fp, &rec).await.unwrap();

        assert_eq!(cache.clear_all().await.unwrap(), 1);
        assert!(cache.is_empty().await.unwrap());
    }

    #[tokio::test]
    async fn survives_reopen() {
        let temp = TempDir::new().unwrap();
        let entry = Entry::new(EntryKind::Image, "python");
        let (fp, rec) = record(&entry, "2024-01-01", "3.12");
        {
            let cache = ContentCache::open(temp.path()).await.unwrap();
            cache.store(&fp, &rec).await.unwrap();
        }
        let cache = ContentCache::open(temp.path()).await.unwrap();
        assert_eq!(cache.lookup(&fp).await.unwrap().unwrap(), rec);
    }
}
