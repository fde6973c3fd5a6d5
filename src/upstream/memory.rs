//! In-memory upstream for tests
//!
//! Counts fetches and tracks how many fetches for the same canonical source
//! overlap, so tests can assert on cache hits and single flight.

use crate::error::ResolveError;
use crate::registry::{Entry, EntryKind};
use crate::upstream::{RawMetadata, Upstream};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

#[derive(Debug, Clone)]
struct Published {
    versions: Vec<String>,
    serial: u64,
    failure: Option<String>,
    notes: Vec<String>,
}

pub(crate) struct MemoryUpstream {
    sources: Mutex<HashMap<(EntryKind, String), Published>>,
    in_flight: Mutex<HashMap<(EntryKind, String), usize>>,
    fetches: AtomicUsize,
    markers: AtomicUsize,
    max_overlap: AtomicUsize,
    active: AtomicUsize,
    peak: AtomicUsize,
    delay: Duration,
    with_markers: bool,
}

impl MemoryUpstream {
    pub(crate) fn new() -> Self {
        Self {
            sources: Mutex::new(HashMap::new()),
            in_flight: Mutex::new(HashMap::new()),
            fetches: AtomicUsize::new(0),
            markers: AtomicUsize::new(0),
            max_overlap: AtomicUsize::new(0),
            active: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
            delay: Duration::ZERO,
            with_markers: true,
        }
    }

    /// Report no markers, forcing content fingerprints
    pub(crate) fn without_markers(mut self) -> Self {
        self.with_markers = false;
        self
    }

    /// Sleep inside every fetch
    pub(crate) fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    fn key(kind: EntryKind, locator: &str) -> (EntryKind, String) {
        (kind, kind.canonical_locator(locator))
    }

    /// Publish (or replace) a source's versions, bumping its serial
    pub(crate) fn publish(&self, kind: EntryKind, locator: &str, versions: &[&str]) {
        let mut sources = self.sources.lock().unwrap();
        let slot = sources.entry(Self::key(kind, locator)).or_insert(Published {
            versions: vec![],
            serial: 0,
            failure: None,
            notes: vec![],
        });
        slot.versions = versions.iter().map(|v| v.to_string()).collect();
        slot.serial += 1;
        slot.failure = None;
        slot.notes.clear();
    }

    /// Attach a caveat to the next fetches of a source
    pub(crate) fn annotate(&self, kind: EntryKind, locator: &str, note: &str) {
        let mut sources = self.sources.lock().unwrap();
        if let Some(slot) = sources.get_mut(&Self::key(kind, locator)) {
            slot.notes.push(note.to_string());
        }
    }

    /// Make fetches for a source fail without changing its serial
    pub(crate) fn break_source(&self, kind: EntryKind, locator: &str, reason: &str) {
        let mut sources = self.sources.lock().unwrap();
        if let Some(slot) = sources.get_mut(&Self::key(kind, locator)) {
            slot.failure = Some(reason.to_string());
            slot.serial += 1;
        }
    }

    pub(crate) fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }

    pub(crate) fn marker_count(&self) -> usize {
        self.markers.load(Ordering::SeqCst)
    }

    /// Largest number of overlapping fetches seen for one source
    pub(crate) fn max_overlap(&self) -> usize {
        self.max_overlap.load(Ordering::SeqCst)
    }

    /// Largest number of overlapping fetches seen across all sources
    pub(crate) fn peak_concurrency(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }

    fn lookup(&self, entry: &Entry) -> Result<Published, ResolveError> {
        self.sources
            .lock()
            .unwrap()
            .get(&Self::key(entry.kind(), entry.locator()))
            .cloned()
            .ok_or_else(|| ResolveError::Status {
                url: format!("memory://{}", entry.id),
                status: 404,
            })
    }
}

#[async_trait]
impl Upstream for MemoryUpstream {
    async fn marker(&self, entry: &Entry) -> Result<Option<String>, ResolveError> {
        self.markers.fetch_add(1, Ordering::SeqCst);
        if !self.with_markers {
            return Ok(None);
        }
        let published = self.lookup(entry)?;
        Ok(Some(format!("serial={}", published.serial)))
    }

    async fn fetch(&self, entry: &Entry) -> Result<RawMetadata, ResolveError> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        let key = Self::key(entry.kind(), entry.locator());
        {
            let mut in_flight = self.in_flight.lock().unwrap();
            let count = in_flight.entry(key.clone()).or_insert(0);
            *count += 1;
            self.max_overlap.fetch_max(*count, Ordering::SeqCst);
        }
        let active = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(active, Ordering::SeqCst);

        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        let result = self.lookup(entry);

        if let Some(count) = self.in_flight.lock().unwrap().get_mut(&key) {
            *count -= 1;
        }
        self.active.fetch_sub(1, Ordering::SeqCst);

        let published = result?;
        if let Some(reason) = published.failure {
            return Err(ResolveError::fetch(format!("memory://{}", entry.id), reason));
        }
        Ok(RawMetadata {
            source_url: format!("memory://{}", entry.id),
            versions: published.versions,
            summary: None,
            extra: serde_json::Map::new(),
            notes: published.notes,
        })
    }

    fn name(&self) -> &'static str {
        "memory"
    }
}
