//! Run orchestration
//!
//! One run: apply forced invalidations, load the registry and the previous
//! manifest, resolve every entry, fold the outcomes in, then stage and commit
//! the new site. Nothing is committed unless every step before the commit
//! succeeds.

use crate::cache::ContentCache;
use crate::config::{Config, IndexPaths};
use crate::error::{IndexError, IndexResult};
use crate::invalidate::{InvalidationController, InvalidationPlan, InvalidationReport};
use crate::journal::{JournalEvent, JournalLine, RunJournal};
use crate::manifest::{BuildHeader, Manifest, ManifestStore};
use crate::registry::SourceRegistry;
use crate::resolve::Resolver;
use crate::scheduler::{Outcome, Scheduler};
use crate::upstream::{HttpUpstream, Upstream};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use uuid::Uuid;

/// Summary of a committed run
#[derive(Debug, Clone)]
pub struct RunReport {
    pub run_id: Uuid,
    pub header: BuildHeader,
    pub invalidation: InvalidationReport,
    pub outcomes: Vec<Outcome>,
    pub site: PathBuf,
}

/// Snapshot of the indexer's on-disk state
#[derive(Debug, Clone)]
pub struct Status {
    pub paths: IndexPaths,
    pub registry_entries: usize,
    pub manifest: Option<Manifest>,
    pub cache_entries: usize,
    pub recent: Vec<JournalLine>,
}

pub struct Indexer {
    config: Config,
    paths: IndexPaths,
    upstream: Arc<dyn Upstream>,
    timeout: Option<Duration>,
}

impl Indexer {
    /// Indexer talking to the configured HTTP upstreams
    pub fn from_config(config: Config) -> Self {
        let upstream = Arc::new(HttpUpstream::new(&config.upstream));
        let paths = IndexPaths::from_config(&config);
        Self::new(config, paths, upstream)
    }

    pub fn new(config: Config, paths: IndexPaths, upstream: Arc<dyn Upstream>) -> Self {
        let timeout = match config.run.timeout_secs {
            0 => None,
            secs => Some(Duration::from_secs(secs)),
        };
        Self {
            config,
            paths,
            upstream,
            timeout,
        }
    }

    /// Override the resolve-phase time limit
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn paths(&self) -> &IndexPaths {
        &self.paths
    }

    fn journal(&self) -> RunJournal {
        RunJournal::new(&self.config, &self.paths)
    }

    fn store(&self) -> ManifestStore {
        ManifestStore::new(&self.paths.dist_dir)
    }

    pub async fn run(&self, plan: &InvalidationPlan) -> IndexResult<RunReport> {
        self.run_with_progress(plan, |_| {}).await
    }

    /// Run, calling `on_done` as each entry finishes resolving
    pub async fn run_with_progress<F>(
        &self,
        plan: &InvalidationPlan,
        on_done: F,
    ) -> IndexResult<RunReport>
    where
        F: FnMut(&Outcome),
    {
        let registry = SourceRegistry::load(&self.config)?;
        self.paths.ensure().await?;

        let run_id = Uuid::new_v4();
        let journal = self.journal();
        journal
            .record(JournalEvent::RunStarted {
                run_id,
                entries: registry.len(),
            })
            .await;

        match self.execute(run_id, &registry, plan, &journal, on_done).await {
            Ok(report) => {
                journal
                    .record(JournalEvent::RunCommitted {
                        run_id,
                        header: report.header.clone(),
                    })
                    .await;
                Ok(report)
            }
            Err(e) => {
                warn!("Run {} failed: {}", run_id, e);
                journal
                    .record(JournalEvent::RunFailed {
                        run_id,
                        error: e.to_string(),
                    })
                    .await;
                Err(e)
            }
        }
    }

    async fn execute<F>(
        &self,
        run_id: Uuid,
        registry: &SourceRegistry,
        plan: &InvalidationPlan,
        journal: &RunJournal,
        on_done: F,
    ) -> IndexResult<RunReport>
    where
        F: FnMut(&Outcome),
    {
        let store = self.store();
        let lock = store.lock(run_id).await?;
        store.recover(&lock).await?;
        let cache = ContentCache::open(&self.paths.cache_dir).await?;

        let invalidation = InvalidationController::new(&cache, &store, journal)
            .apply(plan, registry)
            .await?;
        let previous = store.load().await?;

        info!(
            "Run {}: {} entries, concurrency {}",
            run_id,
            registry.len(),
            self.config.run.concurrency
        );
        let scheduler = Scheduler::new(
            Resolver::new(Arc::clone(&self.upstream), cache),
            self.config.run.concurrency,
        );
        let work = scheduler.run_with_progress(registry.entries(), on_done);
        let outcomes = match self.timeout {
            Some(limit) => tokio::time::timeout(limit, work)
                .await
                .map_err(|_| IndexError::RunTimedOut(limit))??,
            None => work.await?,
        };

        let manifest = Manifest::build(previous.as_ref(), &outcomes);
        let staged = store.stage(&manifest, &outcomes).await?;
        store.commit(staged).await?;

        let h = &manifest.header;
        info!(
            "Run {} committed: {} ok, {} failed, {} skipped, {} stale",
            run_id, h.ok, h.failed, h.skipped, h.stale
        );

        Ok(RunReport {
            run_id,
            header: manifest.header,
            invalidation,
            outcomes,
            site: store.site_dir(),
        })
    }

    /// Apply invalidations without running
    pub async fn invalidate(&self, plan: &InvalidationPlan) -> IndexResult<InvalidationReport> {
        let registry = SourceRegistry::load(&self.config)?;
        self.paths.ensure().await?;
        let store = self.store();
        let lock = store.lock(Uuid::new_v4()).await?;
        store.recover(&lock).await?;
        let cache = ContentCache::open(&self.paths.cache_dir).await?;
        let journal = self.journal();
        InvalidationController::new(&cache, &store, &journal)
            .apply(plan, &registry)
            .await
    }

    /// Drop every cache entry. Returns how many were removed.
    pub async fn purge_cache(&self) -> IndexResult<usize> {
        let cache = ContentCache::open(&self.paths.cache_dir).await?;
        let removed = cache.clear_all().await?;
        info!("Removed {} cache entries", removed);
        Ok(removed)
    }

    /// The committed manifest, if any
    pub async fn manifest(&self) -> IndexResult<Option<Manifest>> {
        self.store().load().await
    }

    pub async fn status(&self) -> IndexResult<Status> {
        let registry = SourceRegistry::load(&self.config)?;
        let manifest = self.manifest().await?;
        let cache_entries = if self.paths.cache_dir.exists() {
            ContentCache::open(&self.paths.cache_dir).await?.len().await?
        } else {
            0
        };
        Ok(Status {
            paths: self.paths.clone(),
            registry_entries: registry.len(),
            manifest,
            cache_entries,
            recent: self.journal().recent(5).await,
        })
    }
}
