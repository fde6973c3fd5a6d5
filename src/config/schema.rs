//! Configuration schema for apidex
//!
//! Configuration is stored at `~/.config/apidex/config.toml`, optionally
//! merged with a project-local `apidex.toml`.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::registry::EntryKind;

/// Root configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// General settings
    pub general: GeneralConfig,

    /// Cache and output locations
    pub paths: PathsConfig,

    /// Scheduler settings
    pub run: RunConfig,

    /// Upstream fetch settings
    pub upstream: UpstreamConfig,

    /// Sources to index
    pub entries: Vec<EntrySpec>,
}

/// General application settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Log format: "text" or "json"
    pub log_format: String,

    /// Append run events to `<dist>/journal.log`
    pub journal: bool,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_format: "text".to_string(),
            journal: true,
        }
    }
}

/// Storage locations. Unset paths fall back to the state directory.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    /// Content cache directory
    pub cache_dir: Option<PathBuf>,

    /// Output directory holding the committed site tree
    pub dist_dir: Option<PathBuf>,
}

/// Scheduler configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    /// Maximum entries resolved at once
    pub concurrency: usize,

    /// Abort the resolve phase after N seconds (0 = no limit)
    pub timeout_secs: u64,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            concurrency: 8,
            timeout_secs: 4 * 60 * 60,
        }
    }
}

/// Upstream registry configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct UpstreamConfig {
    /// Use the package mirror instead of pypi.org
    pub mirror: bool,

    /// Base URL of the package JSON API
    pub package_api: String,

    /// Base URL of the package mirror JSON API
    pub package_mirror_api: String,

    /// Base URL of the image registry API
    pub image_api: String,

    /// Per-request timeout in seconds
    pub http_timeout_secs: u64,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            mirror: false,
            package_api: "https://pypi.org/pypi".to_string(),
            package_mirror_api: "https://pypi.tuna.tsinghua.edu.cn/pypi".to_string(),
            image_api: "https://hub.docker.com/v2".to_string(),
            http_timeout_secs: 60,
        }
    }
}

impl UpstreamConfig {
    /// Package API base honoring the mirror switch
    pub fn package_base(&self) -> &str {
        if self.mirror {
            &self.package_mirror_api
        } else {
            &self.package_api
        }
    }
}

/// One configured source, as written in the config document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntrySpec {
    /// Entry kind ("package" or "image")
    pub kind: EntryKind,

    /// Upstream locator (project name or image reference)
    pub locator: String,

    /// Classification tags, e.g. "std"
    #[serde(default)]
    pub tags: Vec<String>,

    /// Opaque per-entry settings carried through to the record
    #[serde(default)]
    pub metadata: toml::Table,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_serializes() {
        let config = Config::default();
        let toml = toml::to_string_pretty(&config).unwrap();
        assert!(toml.contains("[general]"));
        assert!(toml.contains("[run]"));
    }

    #[test]
    fn config_deserializes_empty() {
        let config: Config = toml::from_str("").unwrap();
        assert_eq!(config.run.concurrency, 8);
        assert!(config.entries.is_empty());
    }

    #[test]
    fn config_deserializes_entries() {
        let toml = r#"
            [run]
            concurrency = 2

            [[entries]]
            kind = "package"
            locator = "requests"
            tags = ["std"]

            [[entries]]
            kind = "image"
            locator = "python:3.12"
            [entries.metadata]
            note = "base image"
        "#;
        let config: Config = toml::from_str(toml).unwrap();
        assert_eq!(config.run.concurrency, 2);
        assert_eq!(config.run.timeout_secs, 14400); // default preserved
        assert_eq!(config.entries.len(), 2);
        assert_eq!(config.entries[0].kind, EntryKind::Package);
        assert_eq!(config.entries[0].tags, vec!["std"]);
        assert_eq!(config.entries[1].kind, EntryKind::Image);
        assert_eq!(
            config.entries[1].metadata.get("note").and_then(|v| v.as_str()),
            Some("base image")
        );
    }

    #[test]
    fn unknown_kind_rejected() {
        let toml = r#"
            [[entries]]
            kind = "crate"
            locator = "serde"
        "#;
        assert!(toml::from_str::<Config>(toml).is_err());
    }

    #[test]
    fn mirror_switch() {
        let mut upstream = UpstreamConfig::default();
        assert_eq!(upstream.package_base(), "https://pypi.org/pypi");
        upstream.mirror = true;
        assert!(upstream.package_base().contains("tsinghua"));
    }
}
