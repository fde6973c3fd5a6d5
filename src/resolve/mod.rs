//! Entry resolution
//!
//! Turns one [`Entry`] into a [`ResolvedRecord`]:
//! 1. Ask the upstream for a cheap version marker and derive the probe
//!    fingerprint.
//! 2. On a cache hit, return the stored record without further I/O.
//! 3. Otherwise fetch, normalize, store and return.
//!
//! Upstream and normalization failures become failed records. Only cache
//! corruption and cache I/O errors are returned as `Err`.

pub mod log;
pub mod normalize;

pub use log::ResolveLog;
pub use normalize::{normalize, sort_versions};

use crate::cache::{ContentCache, Fingerprint};
use crate::error::{IndexError, IndexResult, ResolveError};
use crate::record::ResolvedRecord;
use crate::registry::Entry;
use crate::scheduler::SingleFlight;
use crate::upstream::Upstream;
use std::fmt;
use std::sync::Arc;

/// Where a resolution's record came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Source {
    /// Fetched and normalized during this run
    Upstream,
    /// Read from the content cache
    Cache,
    /// Reused from another entry resolving the same fingerprint this run
    Shared,
    /// Resolution failed
    Failed,
}

impl Source {
    /// Whether the entry was served without its own upstream fetch
    pub fn is_skip(&self) -> bool {
        matches!(self, Self::Cache | Self::Shared)
    }
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Upstream => write!(f, "upstream"),
            Self::Cache => write!(f, "cache"),
            Self::Shared => write!(f, "shared"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

/// A resolved record plus its advisory log
#[derive(Debug, Clone)]
pub struct Resolution {
    pub record: ResolvedRecord,
    pub log: ResolveLog,
    pub source: Source,
}

/// Work result stored in a single-flight slot
#[derive(Debug, Clone)]
pub struct Materialized {
    record: ResolvedRecord,
    log: ResolveLog,
    source: Source,
}

enum Failure {
    Local(ResolveError, ResolveLog),
    Fatal(IndexError),
}

impl From<IndexError> for Failure {
    fn from(err: IndexError) -> Self {
        Self::Fatal(err)
    }
}

/// Resolves entries against an upstream through the content cache
#[derive(Clone)]
pub struct Resolver {
    upstream: Arc<dyn Upstream>,
    cache: ContentCache,
}

impl Resolver {
    pub fn new(upstream: Arc<dyn Upstream>, cache: ContentCache) -> Self {
        Self { upstream, cache }
    }

    pub fn cache(&self) -> &ContentCache {
        &self.cache
    }

    /// Resolve a single entry on its own
    pub async fn resolve(&self, entry: &Entry) -> IndexResult<Resolution> {
        self.resolve_with(entry, &SingleFlight::new()).await
    }

    /// Resolve an entry, sharing work with other entries of the same
    /// fingerprint through `flights`
    pub async fn resolve_with(
        &self,
        entry: &Entry,
        flights: &SingleFlight<Materialized>,
    ) -> IndexResult<Resolution> {
        let mut log = ResolveLog::new();
        log.info(format!(
            "resolving {} via {} upstream",
            entry.id,
            self.upstream.name()
        ));

        let marker = match self.upstream.marker(entry).await {
            Ok(marker) => marker,
            Err(e) => {
                log.error(format!("version probe failed: {}", e));
                let fingerprint = Fingerprint::probe(entry, None);
                return Ok(failed(entry, fingerprint, &e, log));
            }
        };
        let probe = Fingerprint::probe(entry, marker.as_deref());
        match &marker {
            Some(marker) => log.info(format!("marker {} -> {}", marker, probe.short())),
            None => log.info(format!("no marker, probe {}", probe.short())),
        }

        let slot = flights.slot(&probe);
        let result = slot
            .get_or_try_init(|| self.materialize(entry, &probe, marker.is_some()))
            .await;

        match result {
            Ok(done) if done.record.id == entry.id => {
                log.extend(&done.log);
                Ok(Resolution {
                    record: done.record.clone(),
                    log,
                    source: done.source,
                })
            }
            Ok(done) => {
                log.info(format!(
                    "reusing result of {} for fingerprint {}",
                    done.record.id,
                    done.record.fingerprint.short()
                ));
                Ok(Resolution {
                    record: done.record.rebind(entry),
                    log,
                    source: Source::Shared,
                })
            }
            Err(Failure::Local(e, attempt)) => {
                log.extend(&attempt);
                Ok(failed(entry, probe, &e, log))
            }
            Err(Failure::Fatal(e)) => Err(e),
        }
    }

    async fn materialize(
        &self,
        entry: &Entry,
        probe: &Fingerprint,
        has_marker: bool,
    ) -> Result<Materialized, Failure> {
        let mut log = ResolveLog::new();

        if has_marker {
            if let Some(record) = self.cache.lookup(probe).await? {
                log.info(format!("cache hit {}", probe.short()));
                return Ok(Materialized {
                    record: record.rebind(entry),
                    log,
                    source: Source::Cache,
                });
            }
            log.info(format!("cache miss {}", probe.short()));
        }

        let raw = match self.upstream.fetch(entry).await {
            Ok(raw) => raw,
            Err(e) => {
                log.error(format!("fetch failed: {}", e));
                return Err(Failure::Local(e, log));
            }
        };
        log.info(format!(
            "fetched {} versions from {}",
            raw.versions.len(),
            raw.source_url
        ));
        for note in &raw.notes {
            log.warn(note.as_str());
        }

        let document = match normalize(entry, raw) {
            Ok(document) => document,
            Err(e) => {
                log.error(format!("normalization failed: {}", e));
                return Err(Failure::Local(e, log));
            }
        };

        let key = if has_marker {
            probe.clone()
        } else {
            let key = Fingerprint::content(entry, &document);
            if let Some(record) = self.cache.lookup(&key).await? {
                log.info(format!("content unchanged, cache hit {}", key.short()));
                return Ok(Materialized {
                    record: record.rebind(entry),
                    log,
                    source: Source::Cache,
                });
            }
            key
        };

        let record = ResolvedRecord::ok(entry, key.clone(), document);
        self.cache.store(&key, &record).await?;
        log.info(format!("stored {}", key.short()));

        Ok(Materialized {
            record,
            log,
            source: Source::Upstream,
        })
    }
}

fn failed(entry: &Entry, fingerprint: Fingerprint, err: &ResolveError, log: ResolveLog) -> Resolution {
    Resolution {
        record: ResolvedRecord::failed(entry, fingerprint, err.to_string()),
        log,
        source: Source::Failed,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::EntryKind;
    use crate::resolve::log::LogLevel;
    use crate::upstream::memory::MemoryUpstream;
    use tempfile::TempDir;

    async fn setup(upstream: MemoryUpstream) -> (Resolver, Arc<MemoryUpstream>, TempDir) {
        let temp = TempDir::new().unwrap();
        let cache = ContentCache::open(temp.path()).await.unwrap();
        let upstream = Arc::new(upstream);
        let resolver = Resolver::new(upstream.clone(), cache);
        (resolver, upstream, temp)
    }

    #[tokio::test]
    async fn miss_then_hit() {
        let (resolver, upstream, _temp) = setup(MemoryUpstream::new()).await;
        upstream.publish(EntryKind::Package, "six", &["1.15.0", "1.16.0"]);
        let entry = Entry::new(EntryKind::Package, "six");

        let first = resolver.resolve(&entry).await.unwrap();
        assert_eq!(first.source, Source::Upstream);
        assert!(first.record.is_ok());
        assert_eq!(upstream.fetch_count(), 1);

        let second = resolver.resolve(&entry).await.unwrap();
        assert_eq!(second.source, Source::Cache);
        assert_eq!(second.record, first.record);
        assert_eq!(upstream.fetch_count(), 1);
    }

    #[tokio::test]
    async fn marker_change_refetches() {
        let (resolver, upstream, _temp) = setup(MemoryUpstream::new()).await;
        upstream.publish(EntryKind::Package, "six", &["1.15.0"]);
        let entry = Entry::new(EntryKind::Package, "six");
        let first = resolver.resolve(&entry).await.unwrap();

        upstream.publish(EntryKind::Package, "six", &["1.15.0", "1.16.0"]);
        let second = resolver.resolve(&entry).await.unwrap();

        assert_eq!(upstream.fetch_count(), 2);
        assert_ne!(first.record.fingerprint, second.record.fingerprint);
        assert_eq!(
            second.record.document().unwrap().latest.as_deref(),
            Some("1.16.0")
        );
    }

    #[tokio::test]
    async fn fetch_failure_is_local() {
        let (resolver, upstream, _temp) = setup(MemoryUpstream::new()).await;
        upstream.publish(EntryKind::Image, "python", &["3.12"]);
        upstream.break_source(EntryKind::Image, "python", "connection reset");
        let entry = Entry::new(EntryKind::Image, "python");

        let resolution = resolver.resolve(&entry).await.unwrap();
        assert_eq!(resolution.source, Source::Failed);
        assert!(resolution.record.failure().unwrap().contains("connection reset"));
        assert!(resolver.cache().is_empty().await.unwrap());
        assert!(resolution.log.render().contains("fetch failed"));
    }

    #[tokio::test]
    async fn upstream_caveats_become_warnings() {
        let (resolver, upstream, _temp) = setup(MemoryUpstream::new()).await;
        upstream.publish(EntryKind::Image, "python", &["3.11", "3.12"]);
        upstream.annotate(EntryKind::Image, "python", "tag listing cut off after 10 pages");
        let entry = Entry::new(EntryKind::Image, "python");

        let resolution = resolver.resolve(&entry).await.unwrap();
        assert!(resolution.record.is_ok());
        let warn = resolution
            .log
            .lines()
            .iter()
            .find(|l| l.level == LogLevel::Warn)
            .unwrap();
        assert!(warn.message.contains("cut off"));
    }

    #[tokio::test]
    async fn unknown_source_fails_at_probe() {
        let (resolver, upstream, _temp) = setup(MemoryUpstream::new()).await;
        let entry = Entry::new(EntryKind::Package, "does-not-exist");

        let resolution = resolver.resolve(&entry).await.unwrap();
        assert!(resolution.record.failure().unwrap().contains("404"));
        assert_eq!(upstream.fetch_count(), 0);
    }

    #[tokio::test]
    async fn content_fingerprint_without_marker() {
        let (resolver, upstream, _temp) = setup(MemoryUpstream::new().without_markers()).await;
        upstream.publish(EntryKind::Package, "six", &["1.16.0"]);
        let entry = Entry::new(EntryKind::Package, "six");

        let first = resolver.resolve(&entry).await.unwrap();
        let second = resolver.resolve(&entry).await.unwrap();

        // no marker: every run fetches, but unchanged content maps to the
        // same key and the stored record is reused
        assert_eq!(upstream.fetch_count(), 2);
        assert_eq!(first.source, Source::Upstream);
        assert_eq!(second.source, Source::Cache);
        assert_eq!(first.record, second.record);
        assert_eq!(resolver.cache().len().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn shared_flight_rebinds_identity() {
        let (resolver, upstream, _temp) = setup(MemoryUpstream::new()).await;
        upstream.publish(EntryKind::Package, "requests", &["2.31.0"]);
        let a = Entry::new(EntryKind::Package, "requests");
        let b = Entry::new(EntryKind::Package, "Requests").with_tags(["std"]);
        let flights = SingleFlight::new();

        let ra = resolver.resolve_with(&a, &flights).await.unwrap();
        let rb = resolver.resolve_with(&b, &flights).await.unwrap();

        assert_eq!(ra.source, Source::Upstream);
        assert_eq!(rb.source, Source::Shared);
        assert_eq!(rb.record.id, b.id);
        assert!(rb.record.has_tag("std"));
        assert_eq!(rb.record.fingerprint, ra.record.fingerprint);
        assert_eq!(upstream.fetch_count(), 1);
    }
}
