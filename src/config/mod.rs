//! Configuration management for outsync

pub mod schema;

pub use schema::{BuildConfig, CompilerOptions, Config, GeneralConfig, StatsLevel};

use crate::error::{OutsyncError, OutsyncResult};
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, info};

/// File name of project-local configuration
pub const LOCAL_CONFIG_FILE: &str = "outsync.toml";

/// Configuration manager
pub struct ConfigManager {
    config_path: PathBuf,
}

impl ConfigManager {
    /// Create a new config manager with default path
    pub fn new() -> Self {
        Self {
            config_path: Self::default_config_path(),
        }
    }

    /// Create a config manager with a custom path
    pub fn with_path(path: PathBuf) -> Self {
        Self { config_path: path }
    }

    /// Get the default config file path
    pub fn default_config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("outsync")
            .join("config.toml")
    }

    /// Find the nearest `outsync.toml`, starting at `start` and walking up
    pub fn find_local_config(start: &Path) -> Option<PathBuf> {
        start
            .ancestors()
            .map(|dir| dir.join(LOCAL_CONFIG_FILE))
            .find(|candidate| candidate.is_file())
    }

    /// Load configuration, using defaults if the file does not exist
    pub async fn load(&self) -> OutsyncResult<Config> {
        if !self.config_path.exists() {
            debug!("Config file not found, using defaults");
            return Ok(Config::default());
        }

        self.load_from_file(&self.config_path).await
    }

    /// Load configuration from a specific file
    pub async fn load_from_file(&self, path: &Path) -> OutsyncResult<Config> {
        let table = read_table(path).await?;
        into_config(table, path)
    }

    /// Load the global configuration overlaid with a local file.
    ///
    /// Keys in the local file win; tables are merged key by key.
    pub async fn load_merged(&self, local: Option<&Path>) -> OutsyncResult<Config> {
        let mut merged = if self.config_path.exists() {
            read_table(&self.config_path).await?
        } else {
            debug!("Global config not found at {}", self.config_path.display());
            toml::Table::new()
        };

        let Some(local) = local else {
            return into_config(merged, &self.config_path);
        };

        let overlay = read_table(local).await?;
        merge_tables(&mut merged, overlay);
        into_config(merged, local)
    }

    /// Save configuration to file
    pub async fn save(&self, config: &Config) -> OutsyncResult<()> {
        self.ensure_config_dir().await?;

        let content = toml::to_string_pretty(config)?;
        fs::write(&self.config_path, content).await.map_err(|e| {
            OutsyncError::io(
                format!("writing config to {}", self.config_path.display()),
                e,
            )
        })?;

        info!("Configuration saved to {}", self.config_path.display());
        Ok(())
    }

    /// Ensure the config directory exists
    async fn ensure_config_dir(&self) -> OutsyncResult<()> {
        if let Some(parent) = self.config_path.parent() {
            fs::create_dir_all(parent).await.map_err(|e| {
                OutsyncError::io(format!("creating directory {}", parent.display()), e)
            })?;
        }
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

async fn read_table(path: &Path) -> OutsyncResult<toml::Table> {
    let content = fs::read_to_string(path)
        .await
        .map_err(|e| OutsyncError::io(format!("reading config from {}", path.display()), e))?;

    content.parse::<toml::Table>().map_err(|e| OutsyncError::ConfigInvalid {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })
}

fn into_config(table: toml::Table, path: &Path) -> OutsyncResult<Config> {
    toml::Value::Table(table)
        .try_into::<Config>()
        .map_err(|e| OutsyncError::ConfigInvalid {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })
}

/// Recursively overlay `overlay` onto `base`
fn merge_tables(base: &mut toml::Table, overlay: toml::Table) {
    for (key, value) in overlay {
        match value {
            toml::Value::Table(incoming) => match base.get_mut(&key) {
                Some(toml::Value::Table(existing)) => merge_tables(existing, incoming),
                _ => {
                    base.insert(key, toml::Value::Table(incoming));
                }
            },
            value => {
                base.insert(key, value);
            }
        }
    }
}
