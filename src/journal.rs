//! Run journal
//!
//! Appends one JSON line per run event to `<dist>/journal.log`. The journal is
//! advisory: write failures are logged and otherwise ignored.

use crate::config::{Config, IndexPaths};
use crate::manifest::BuildHeader;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tokio::fs::OpenOptions;
use tokio::io::AsyncWriteExt;
use tracing::warn;
use uuid::Uuid;

/// Something worth remembering about a run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event")]
pub enum JournalEvent {
    #[serde(rename = "run.started")]
    RunStarted { run_id: Uuid, entries: usize },

    #[serde(rename = "run.committed")]
    RunCommitted { run_id: Uuid, header: BuildHeader },

    #[serde(rename = "run.failed")]
    RunFailed { run_id: Uuid, error: String },

    #[serde(rename = "invalidate.full")]
    InvalidateFull { removed_manifest: bool },

    #[serde(rename = "invalidate.subset")]
    InvalidateSubset {
        tag: String,
        cache_entries: usize,
        records: usize,
    },
}

/// A journal line as written
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JournalLine {
    pub timestamp: DateTime<Utc>,
    #[serde(flatten)]
    pub event: JournalEvent,
}

pub struct RunJournal {
    enabled: bool,
    path: PathBuf,
}

impl RunJournal {
    pub fn new(config: &Config, paths: &IndexPaths) -> Self {
        Self {
            enabled: config.general.journal,
            path: paths.journal_path(),
        }
    }

    /// Journal that drops every event
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            path: PathBuf::new(),
        }
    }

    pub async fn record(&self, event: JournalEvent) {
        if !self.enabled {
            return;
        }

        let line = JournalLine {
            timestamp: Utc::now(),
            event,
        };
        let mut text = match serde_json::to_string(&line) {
            Ok(s) => s,
            Err(e) => {
                warn!("Failed to serialize journal event: {}", e);
                return;
            }
        };
        text.push('\n');

        if let Err(e) = self.append(&text).await {
            warn!("Failed to write journal {}: {}", self.path.display(), e);
        }
    }

    async fn append(&self, line: &str) -> std::io::Result<()> {
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await?;

        file.write_all(line.as_bytes()).await?;
        file.flush().await?;
        Ok(())
    }

    /// The last `limit` readable lines, oldest first. Lines that fail to
    /// parse are skipped.
    pub async fn recent(&self, limit: usize) -> Vec<JournalLine> {
        let content = match tokio::fs::read_to_string(&self.path).await {
            Ok(content) => content,
            Err(_) => return Vec::new(),
        };
        let lines: Vec<JournalLine> = content
            .lines()
            .filter_map(|l| serde_json::from_str(l).ok())
            .collect();
        let skip = lines.len().saturating_sub(limit);
        lines.into_iter().skip(skip).collect()
    }
}
