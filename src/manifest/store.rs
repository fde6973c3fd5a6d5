//! Manifest persistence and the atomic site swap
//!
//! Layout under the dist directory:
//!
//! ```text
//! <dist>/site/manifest.json
//! <dist>/site/entries/<ecosystem>/<name>/index.json
//! <dist>/site/entries/<ecosystem>/<name>/resolve.log
//! <dist>/.staging-<uuid>/     tree being written
//! <dist>/.retired-<uuid>/     previous tree during a swap
//! ```
//!
//! A run stages a complete tree, then swaps it in with two renames. Readers
//! see either the old site or the new one: while `site` is missing mid-swap,
//! [`ManifestStore::load`] reads the retired tree instead. A crash between
//! the renames leaves a retired tree behind, which [`ManifestStore::recover`]
//! puts back.
//!
//! Anything that changes the dist directory holds a [`WriteLock`] first
//! (`<dist>/.write.lock`). Reads never take it and never modify the tree.

use crate::error::{IndexError, IndexResult};
use crate::manifest::{artifact_dir, Manifest};
use crate::record::MetadataDocument;
use crate::scheduler::Outcome;
use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};
use uuid::Uuid;

const SITE_DIR: &str = "site";
const MANIFEST_FILE: &str = "manifest.json";
const STAGING_PREFIX: &str = ".staging-";
const RETIRED_PREFIX: &str = ".retired-";
const LOCK_FILE: &str = ".write.lock";

/// What [`ManifestStore::recover`] cleaned up
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Recovery {
    /// A retired tree was moved back to `site`
    pub restored: bool,
    /// Leftover staging and retired trees removed
    pub removed: usize,
}

/// A fully written tree waiting to be committed
#[derive(Debug)]
pub struct StagedSite {
    path: PathBuf,
}

impl StagedSite {
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Throw the staged tree away without committing
    pub async fn discard(self) -> IndexResult<()> {
        fs::remove_dir_all(&self.path).await.map_err(|e| {
            IndexError::io(format!("removing staged tree {}", self.path.display()), e)
        })
    }
}

/// Exclusive claim on a dist directory, released on drop
#[derive(Debug)]
pub struct WriteLock {
    path: PathBuf,
}

impl Drop for WriteLock {
    fn drop(&mut self) {
        if let Err(e) = std::fs::remove_file(&self.path) {
            warn!("Could not release {}: {}", self.path.display(), e);
        }
    }
}

/// Staging and retired trees found next to `site`
#[derive(Debug, Default)]
struct Leftovers {
    staging: Vec<PathBuf>,
    /// Oldest first
    retired: Vec<PathBuf>,
}

/// Reads, stages and commits the published site
#[derive(Debug, Clone)]
pub struct ManifestStore {
    dist: PathBuf,
}

impl ManifestStore {
    pub fn new(dist: impl Into<PathBuf>) -> Self {
        Self { dist: dist.into() }
    }

    pub fn dist_dir(&self) -> &Path {
        &self.dist
    }

    pub fn site_dir(&self) -> PathBuf {
        self.dist.join(SITE_DIR)
    }

    pub fn manifest_path(&self) -> PathBuf {
        self.site_dir().join(MANIFEST_FILE)
    }

    pub fn lock_path(&self) -> PathBuf {
        self.dist.join(LOCK_FILE)
    }

    /// Claim the dist directory for `owner`.
    ///
    /// Fails with `Locked` while another writer holds it.
    pub async fn lock(&self, owner: Uuid) -> IndexResult<WriteLock> {
        create_dir(&self.dist).await?;
        let path = self.lock_path();
        let opened = fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .await;
        let mut file = match opened {
            Ok(file) => file,
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                return Err(IndexError::Locked(path))
            }
            Err(e) => return Err(IndexError::io(format!("creating {}", path.display()), e)),
        };
        let lock = WriteLock { path };
        let stamp = format!("{} {}\n", owner, chrono::Utc::now().to_rfc3339());
        file.write_all(stamp.as_bytes())
            .await
            .map_err(|e| IndexError::io(format!("writing {}", lock.path.display()), e))?;
        debug!("Acquired {}", lock.path.display());
        Ok(lock)
    }

    async fn leftovers(&self) -> IndexResult<Leftovers> {
        let mut found = Leftovers::default();
        let mut dir = match fs::read_dir(&self.dist).await {
            Ok(dir) => dir,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(found),
            Err(e) => return Err(IndexError::io(format!("reading {}", self.dist.display()), e)),
        };

        let mut retired = Vec::new();
        while let Some(item) = dir
            .next_entry()
            .await
            .map_err(|e| IndexError::io(format!("reading {}", self.dist.display()), e))?
        {
            let name = item.file_name().to_string_lossy().to_string();
            if name.starts_with(STAGING_PREFIX) {
                found.staging.push(item.path());
            } else if name.starts_with(RETIRED_PREFIX) {
                let modified = item
                    .metadata()
                    .await
                    .and_then(|m| m.modified())
                    .unwrap_or(SystemTime::UNIX_EPOCH);
                retired.push((modified, item.path()));
            }
        }
        retired.sort_by_key(|(modified, _)| *modified);
        found.retired = retired.into_iter().map(|(_, path)| path).collect();
        Ok(found)
    }

    /// Repair what an interrupted commit left behind.
    ///
    /// Restores the newest retired tree when `site` is missing, then removes
    /// abandoned staging and retired trees. Only a lock holder may do this.
    pub async fn recover(&self, _lock: &WriteLock) -> IndexResult<Recovery> {
        let mut recovery = Recovery::default();
        let mut leftovers = self.leftovers().await?;

        let site = self.site_dir();
        if !site.exists() {
            if let Some(newest) = leftovers.retired.pop() {
                warn!(
                    "Site missing after interrupted commit, restoring {}",
                    newest.display()
                );
                fs::rename(&newest, &site).await.map_err(|e| {
                    IndexError::io(format!("restoring {}", newest.display()), e)
                })?;
                recovery.restored = true;
            }
        }

        for path in leftovers.staging.into_iter().chain(leftovers.retired) {
            debug!("Removing leftover tree {}", path.display());
            fs::remove_dir_all(&path)
                .await
                .map_err(|e| IndexError::io(format!("removing {}", path.display()), e))?;
            recovery.removed += 1;
        }

        Ok(recovery)
    }

    /// Load the committed manifest, if there is one.
    ///
    /// Read-only. While `site` is missing the newest retired tree stands in
    /// for it.
    pub async fn load(&self) -> IndexResult<Option<Manifest>> {
        let mut path = self.manifest_path();
        if !self.site_dir().exists() {
            match self.leftovers().await?.retired.pop() {
                Some(retired) => path = retired.join(MANIFEST_FILE),
                None => return Ok(None),
            }
        }

        let content = match fs::read_to_string(&path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(IndexError::io(
                    format!("reading manifest {}", path.display()),
                    e,
                ))
            }
        };
        Manifest::from_json(&path, &content).map(Some)
    }

    /// Write a complete site tree for `manifest` next to the live one.
    ///
    /// Entries whose canonical names collide share a directory; their logs
    /// are concatenated.
    pub async fn stage(&self, manifest: &Manifest, outcomes: &[Outcome]) -> IndexResult<StagedSite> {
        let path = self.dist.join(format!("{}{}", STAGING_PREFIX, Uuid::new_v4()));
        create_dir(&path).await?;
        let staged = StagedSite { path };

        if let Err(e) = self.write_tree(&staged.path, manifest, outcomes).await {
            if let Err(cleanup) = staged.discard().await {
                warn!("Could not remove partial staging tree: {}", cleanup);
            }
            return Err(e);
        }

        debug!("Staged {} entries in {}", manifest.entries.len(), staged.path.display());
        Ok(staged)
    }

    async fn write_tree(&self, root: &Path, manifest: &Manifest, outcomes: &[Outcome]) -> IndexResult<()> {
        let mut logs: BTreeMap<String, String> = BTreeMap::new();
        for outcome in outcomes {
            let dir = artifact_dir(outcome.entry.kind(), outcome.entry.locator());
            let log = logs.entry(dir).or_default();
            log.push_str(&format!("# {}\n", outcome.entry.id));
            log.push_str(&outcome.resolution.log.render());
        }

        // Colliding names share a directory; a fresh record beats a stale one
        let mut data: BTreeMap<String, (bool, &MetadataDocument)> = BTreeMap::new();
        for entry in &manifest.entries {
            let Some(document) = entry.record.as_ref().and_then(|r| r.document()) else {
                continue;
            };
            let stale = entry.is_stale();
            let slot = data
                .entry(artifact_dir(entry.id.kind, &entry.id.locator))
                .or_insert((stale, document));
            if slot.0 && !stale {
                *slot = (stale, document);
            }
        }

        for (dir, log) in &logs {
            let target = root.join(dir);
            create_dir(&target).await?;
            write_file(&target.join("resolve.log"), log.as_bytes()).await?;
        }
        for (dir, (_, document)) in data {
            let target = root.join(&dir);
            create_dir(&target).await?;
            let content = serde_json::to_string_pretty(document)?;
            write_file(&target.join("index.json"), content.as_bytes()).await?;
        }

        write_file(&root.join(MANIFEST_FILE), manifest.to_json()?.as_bytes()).await
    }

    /// Swap a staged tree in as the live site.
    ///
    /// On failure the previous site is put back and `Commit` is returned.
    pub async fn commit(&self, staged: StagedSite) -> IndexResult<()> {
        let site = self.site_dir();
        let retired = if site.exists() {
            let retired = self.dist.join(format!("{}{}", RETIRED_PREFIX, Uuid::new_v4()));
            fs::rename(&site, &retired)
                .await
                .map_err(|e| IndexError::commit(format!("retiring live site: {}", e)))?;
            Some(retired)
        } else {
            None
        };

        if let Err(e) = fs::rename(&staged.path, &site).await {
            if let Some(retired) = &retired {
                if let Err(restore) = fs::rename(retired, &site).await {
                    warn!(
                        "Could not restore {}: {}; the next run will retry",
                        retired.display(),
                        restore
                    );
                }
            }
            return Err(IndexError::commit(format!("publishing staged site: {}", e)));
        }

        if let Some(retired) = retired {
            if let Err(e) = fs::remove_dir_all(&retired).await {
                warn!("Could not remove {}: {}", retired.display(), e);
            }
        }

        info!("Committed site at {}", site.display());
        Ok(())
    }

    /// Replace the live manifest file in place, temp file then rename.
    ///
    /// `index.json` files of entries that lost their record are removed
    /// afterwards, unless a colliding entry still publishes into the same
    /// directory. Their `resolve.log` stays until the next commit.
    pub async fn rewrite(&self, manifest: &Manifest) -> IndexResult<()> {
        let site = self.site_dir();
        create_dir(&site).await?;
        let tmp = site.join(format!(".{}.{}.tmp", MANIFEST_FILE, Uuid::new_v4()));
        write_file(&tmp, manifest.to_json()?.as_bytes()).await?;
        let path = self.manifest_path();
        fs::rename(&tmp, &path)
            .await
            .map_err(|e| IndexError::io(format!("replacing manifest {}", path.display()), e))?;

        let published: HashSet<String> = manifest
            .entries
            .iter()
            .filter(|e| e.record.is_some())
            .map(|e| artifact_dir(e.id.kind, &e.id.locator))
            .collect();
        for entry in manifest.entries.iter().filter(|e| e.record.is_none()) {
            let dir = artifact_dir(entry.id.kind, &entry.id.locator);
            if published.contains(&dir) {
                continue;
            }
            let data = site.join(&dir).join("index.json");
            match fs::remove_file(&data).await {
                Ok(()) => debug!("Removed {}", data.display()),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(IndexError::io(format!("removing {}", data.display()), e)),
            }
        }
        Ok(())
    }

    /// Delete the live manifest file. Returns whether one existed.
    pub async fn remove(&self) -> IndexResult<bool> {
        let path = self.manifest_path();
        match fs::remove_file(&path).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(IndexError::io(
                format!("removing manifest {}", path.display()),
                e,
            )),
        }
    }
}

async fn create_dir(path: &Path) -> IndexResult<()> {
    fs::create_dir_all(path)
        .await
        .map_err(|e| IndexError::io(format!("creating {}", path.display()), e))
}

async fn write_file(path: &Path, content: &[u8]) -> IndexResult<()> {
    fs::write(path, content)
        .await
        .map_err(|e| IndexError::io(format!("writing {}", path.display()), e))
}
