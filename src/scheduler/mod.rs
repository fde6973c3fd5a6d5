//! Bounded-concurrency resolution of a registry
//!
//! Every entry is resolved on its own task, gated by a semaphore. Entries
//! that map to the same fingerprint share one resolution through
//! [`SingleFlight`]. A failed entry never stops the others; a fatal error
//! stops the run and aborts the remaining tasks.

pub mod flight;

pub use flight::SingleFlight;

use crate::error::{IndexError, IndexResult};
use crate::registry::Entry;
use crate::resolve::{Materialized, Resolution, Resolver};
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, warn};

/// Result of resolving one registry entry
#[derive(Debug, Clone)]
pub struct Outcome {
    pub entry: Arc<Entry>,
    pub resolution: Resolution,
}

pub struct Scheduler {
    resolver: Resolver,
    concurrency: usize,
}

impl Scheduler {
    /// Create a scheduler running at most `concurrency` resolutions at once
    pub fn new(resolver: Resolver, concurrency: usize) -> Self {
        Self {
            resolver,
            concurrency: concurrency.max(1),
        }
    }

    pub fn concurrency(&self) -> usize {
        self.concurrency
    }

    /// Resolve all entries, returning outcomes in input order
    pub async fn run(&self, entries: &[Arc<Entry>]) -> IndexResult<Vec<Outcome>> {
        self.run_with_progress(entries, |_| {}).await
    }

    /// Like [`Scheduler::run`], calling `on_done` as each entry finishes
    pub async fn run_with_progress<F>(
        &self,
        entries: &[Arc<Entry>],
        mut on_done: F,
    ) -> IndexResult<Vec<Outcome>>
    where
        F: FnMut(&Outcome),
    {
        let permits = Arc::new(Semaphore::new(self.concurrency));
        let flights: Arc<SingleFlight<Materialized>> = Arc::new(SingleFlight::new());
        let mut tasks = JoinSet::new();

        for (index, entry) in entries.iter().enumerate() {
            let permits = Arc::clone(&permits);
            let flights = Arc::clone(&flights);
            let resolver = self.resolver.clone();
            let entry = Arc::clone(entry);

            tasks.spawn(async move {
                let _permit = permits
                    .acquire_owned()
                    .await
                    .map_err(|e| IndexError::Worker(e.to_string()))?;
                let resolution = resolver.resolve_with(&entry, &flights).await?;
                Ok::<_, IndexError>((index, Outcome { entry, resolution }))
            });
        }

        let mut done: Vec<(usize, Outcome)> = Vec::with_capacity(entries.len());
        while let Some(joined) = tasks.join_next().await {
            let (index, outcome) = match joined {
                Ok(Ok(result)) => result,
                Ok(Err(e)) => {
                    warn!("Aborting run: {}", e);
                    return Err(e);
                }
                Err(e) => return Err(IndexError::Worker(e.to_string())),
            };
            debug!(
                "{} resolved from {}",
                outcome.entry.id, outcome.resolution.source
            );
            on_done(&outcome);
            done.push((index, outcome));
        }

        debug!(
            "Resolved {} entries across {} fingerprints",
            done.len(),
            flights.len()
        );
        done.sort_by_key(|(index, _)| *index);
        Ok(done.into_iter().map(|(_, outcome)| outcome).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::ContentCache;
    use crate::registry::EntryKind;
    use crate::resolve::Source;
    use crate::upstream::memory::MemoryUpstream;
    use std::time::Duration;
    use tempfile::TempDir;

    async fn scheduler(
        upstream: MemoryUpstream,
        concurrency: usize,
    ) -> (Scheduler, Arc<MemoryUpstream>, TempDir) {
        let temp = TempDir::new().unwrap();
        let cache = ContentCache::open(temp.path()).await.unwrap();
        let upstream = Arc::new(upstream);
        let resolver = Resolver::new(upstream.clone(), cache);
        (Scheduler::new(resolver, concurrency), upstream, temp)
    }

    fn entries(kind: EntryKind, locators: &[&str]) -> Vec<Arc<Entry>> {
        locators
            .iter()
            .map(|l| Arc::new(Entry::new(kind, *l)))
            .collect()
    }

    #[tokio::test]
    async fn colliding_entries_fetch_once() {
        let (scheduler, upstream, _temp) =
            scheduler(MemoryUpstream::new().with_delay(Duration::from_millis(30)), 3).await;
        upstream.publish(EntryKind::Package, "requests", &["2.31.0", "2.32.0"]);
        let list = entries(EntryKind::Package, &["Requests", "requests", "REQUESTS"]);

        let outcomes = scheduler.run(&list).await.unwrap();

        assert_eq!(upstream.fetch_count(), 1);
        assert_eq!(upstream.max_overlap(), 1);
        assert_eq!(outcomes.len(), 3);
        let upstream_count = outcomes
            .iter()
            .filter(|o| o.resolution.source == Source::Upstream)
            .count();
        assert_eq!(upstream_count, 1);
        for (outcome, entry) in outcomes.iter().zip(&list) {
            assert_eq!(outcome.resolution.record.id, entry.id);
            assert!(outcome.resolution.record.is_ok());
        }
    }

    #[tokio::test]
    async fn failures_are_isolated() {
        let (scheduler, upstream, _temp) = scheduler(MemoryUpstream::new(), 4).await;
        upstream.publish(EntryKind::Package, "six", &["1.16.0"]);
        upstream.publish(EntryKind::Package, "attrs", &["23.1.0"]);
        upstream.publish(EntryKind::Package, "broken", &["1.0"]);
        upstream.break_source(EntryKind::Package, "broken", "timed out");
        let list = entries(EntryKind::Package, &["six", "broken", "attrs"]);

        let outcomes = scheduler.run(&list).await.unwrap();

        assert!(outcomes[0].resolution.record.is_ok());
        assert!(!outcomes[1].resolution.record.is_ok());
        assert!(outcomes[2].resolution.record.is_ok());
    }

    #[tokio::test]
    async fn preserves_registry_order() {
        let (scheduler, upstream, _temp) =
            scheduler(MemoryUpstream::new().with_delay(Duration::from_millis(5)), 8).await;
        let names: Vec<String> = (0..20).map(|i| format!("pkg-{}", i)).collect();
        for name in &names {
            upstream.publish(EntryKind::Package, name, &["1.0.0"]);
        }
        let refs: Vec<&str> = names.iter().map(String::as_str).collect();
        let list = entries(EntryKind::Package, &refs);

        let outcomes = scheduler.run(&list).await.unwrap();

        let ids: Vec<_> = outcomes.iter().map(|o| o.entry.id.clone()).collect();
        let expected: Vec<_> = list.iter().map(|e| e.id.clone()).collect();
        assert_eq!(ids, expected);
    }

    #[tokio::test]
    async fn respects_concurrency_limit() {
        let (scheduler, upstream, _temp) =
            scheduler(MemoryUpstream::new().with_delay(Duration::from_millis(20)), 2).await;
        let names: Vec<String> = (0..6).map(|i| format!("lib{}", i)).collect();
        for name in &names {
            upstream.publish(EntryKind::Package, name, &["0.1.0"]);
        }
        let refs: Vec<&str> = names.iter().map(String::as_str).collect();

        scheduler
            .run(&entries(EntryKind::Package, &refs))
            .await
            .unwrap();

        assert_eq!(upstream.fetch_count(), 6);
        assert!(upstream.peak_concurrency() <= 2);
    }

    #[tokio::test]
    async fn zero_concurrency_runs_serially() {
        let (scheduler, upstream, _temp) = scheduler(MemoryUpstream::new(), 0).await;
        upstream.publish(EntryKind::Image, "redis", &["7.0", "7.2"]);
        assert_eq!(scheduler.concurrency(), 1);

        let mut seen = 0;
        let outcomes = scheduler
            .run_with_progress(&entries(EntryKind::Image, &["redis"]), |_| seen += 1)
            .await
            .unwrap();
        assert_eq!(seen, 1);
        assert_eq!(outcomes.len(), 1);
    }

    #[tokio::test]
    async fn empty_registry() {
        let (scheduler, upstream, _temp) = scheduler(MemoryUpstream::new(), 4).await;
        let outcomes = scheduler.run(&[]).await.unwrap();
        assert!(outcomes.is_empty());
        assert_eq!(upstream.marker_count(), 0);
    }
}
