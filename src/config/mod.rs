//! Configuration management for apidex

pub mod schema;

pub use schema::{Config, EntrySpec};

use crate::error::{IndexError, IndexResult};
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, info};

/// Name of the project-local config file
pub const LOCAL_CONFIG_NAME: &str = "apidex.toml";

/// Configuration manager
pub struct ConfigManager {
    config_path: PathBuf,
    explicit: bool,
}

impl ConfigManager {
    /// Create a new config manager with default path
    pub fn new() -> Self {
        Self {
            config_path: Self::default_config_path(),
            explicit: false,
        }
    }

    /// Create a config manager with a custom path. The file must exist.
    pub fn with_path(path: PathBuf) -> Self {
        Self {
            config_path: path,
            explicit: true,
        }
    }

    /// Get the default config file path
    pub fn default_config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("apidex")
            .join("config.toml")
    }

    /// Get the state directory path
    pub fn state_dir() -> PathBuf {
        dirs::state_dir()
            .or_else(dirs::data_local_dir)
            .unwrap_or_else(|| PathBuf::from("."))
            .join("apidex")
    }

    /// Look for `apidex.toml` in `start` and its ancestors
    pub fn find_local_config(start: &Path) -> Option<PathBuf> {
        start
            .ancestors()
            .map(|dir| dir.join(LOCAL_CONFIG_NAME))
            .find(|candidate| candidate.is_file())
    }

    /// Load configuration, creating default if not exists
    pub async fn load(&self) -> IndexResult<Config> {
        if !self.config_path.exists() {
            if self.explicit {
                return Err(IndexError::ConfigNotFound(self.config_path.clone()));
            }
            debug!("Config file not found, using defaults");
            return Ok(Config::default());
        }

        self.load_from_file(&self.config_path).await
    }

    /// Load the global config and overlay a local one on top of it.
    ///
    /// Tables merge key by key; arrays (including `entries`) are replaced.
    pub async fn load_merged(&self, local: Option<&Path>) -> IndexResult<Config> {
        let Some(local) = local else {
            return self.load().await;
        };

        let mut base = if self.config_path.exists() {
            read_value(&self.config_path).await?
        } else if self.explicit {
            return Err(IndexError::ConfigNotFound(self.config_path.clone()));
        } else {
            toml::Value::Table(toml::Table::new())
        };
        let overlay = read_value(local).await?;
        merge_values(&mut base, overlay);

        base.try_into().map_err(|e: toml::de::Error| IndexError::ConfigInvalid {
            path: local.to_path_buf(),
            reason: e.to_string(),
        })
    }

    /// Load configuration from a specific file
    pub async fn load_from_file(&self, path: &Path) -> IndexResult<Config> {
        let content = fs::read_to_string(path)
            .await
            .map_err(|e| IndexError::io(format!("reading config from {}", path.display()), e))?;

        toml::from_str(&content).map_err(|e| IndexError::ConfigInvalid {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })
    }

    /// Save configuration to file
    pub async fn save(&self, config: &Config) -> IndexResult<()> {
        if let Some(parent) = self.config_path.parent() {
            fs::create_dir_all(parent).await.map_err(|e| {
                IndexError::io(format!("creating config directory {}", parent.display()), e)
            })?;
        }

        let content = toml::to_string_pretty(config)?;
        fs::write(&self.config_path, content).await.map_err(|e| {
            IndexError::io(
                format!("writing config to {}", self.config_path.display()),
                e,
            )
        })?;

        info!("Configuration saved to {}", self.config_path.display());
        Ok(())
    }

    /// Get the config file path
    pub fn path(&self) -> &Path {
        &self.config_path
    }
}

impl Default for ConfigManager {
    fn default() -> Self {
        Self::new()
    }
}

/// Resolved storage locations for one indexer instance
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexPaths {
    /// Content cache root
    pub cache_dir: PathBuf,
    /// Output root; the committed tree lives in `<dist_dir>/site`
    pub dist_dir: PathBuf,
}

impl IndexPaths {
    /// Resolve paths from config, defaulting to the state directory
    pub fn from_config(config: &Config) -> Self {
        let state = ConfigManager::state_dir();
        Self {
            cache_dir: config
                .paths
                .cache_dir
                .clone()
                .unwrap_or_else(|| state.join("cache")),
            dist_dir: config
                .paths
                .dist_dir
                .clone()
                .unwrap_or_else(|| state.join("dist")),
        }
    }

    /// Run journal location
    pub fn journal_path(&self) -> PathBuf {
        self.dist_dir.join("journal.log")
    }

    /// Ensure cache and output directories exist
    pub async fn ensure(&self) -> IndexResult<()> {
        for dir in [&self.cache_dir, &self.dist_dir] {
            fs::create_dir_all(dir).await.map_err(|e| {
                IndexError::io(format!("creating directory {}", dir.display()), e)
            })?;
        }
        Ok(())
    }
}

async fn read_value(path: &Path) -> IndexResult<toml::Value> {
    let content = fs::read_to_string(path)
        .await
        .map_err(|e| IndexError::io(format!("reading config from {}", path.display()), e))?;
    toml::from_str(&content).map_err(|e| IndexError::ConfigInvalid {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })
}

fn merge_values(base: &mut toml::Value, overlay: toml::Value) {
    match (base, overlay) {
        (toml::Value::Table(base), toml::Value::Table(overlay)) => {
            for (key, value) in overlay {
                match base.get_mut(&key) {
                    Some(existing) => merge_values(existing, value),
                    None => {
                        base.insert(key, value);
                    }
                }
            }
        }
        (slot, value) => *slot = value,
    }
}
