use crate::index::types::{DEFAULT_CACHE_CAPACITY, DEFAULT_FAST_BUILD_THRESHOLD};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

const APP_NAME: &str = "catdex";
const CONFIG_FILE: &str = "config.json";
const SNAPSHOT_FILE: &str = "catalog.json";

/// Application configuration stored in the app data directory
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Entries a request cache keeps per search
    #[serde(default = "default_cache_capacity")]
    pub cache_capacity: usize,

    /// Documents between two checkpoints of a composite rebuild
    #[serde(default = "default_fast_build_threshold")]
    pub fast_build_threshold: usize,

    /// Never rewrite queries through composite indexes
    #[serde(default)]
    pub skip_composite: bool,

    /// Catalog snapshot used when `--catalog` is not given.
    /// If None, `catalog.json` in the app data directory.
    #[serde(default)]
    pub snapshot_path: Option<PathBuf>,
}

fn default_cache_capacity() -> usize {
    DEFAULT_CACHE_CAPACITY
}

fn default_fast_build_threshold() -> usize {
    DEFAULT_FAST_BUILD_THRESHOLD
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            cache_capacity: default_cache_capacity(),
            fast_build_threshold: default_fast_build_threshold(),
            skip_composite: false,
            snapshot_path: None,
        }
    }
}

impl AppConfig {
    /// Load config from the app data directory, or return default if not found
    pub fn load() -> Result<Self> {
        Self::load_from(&get_config_path()?)
    }

    pub fn load_from(config_path: &Path) -> Result<Self> {
        if config_path.exists() {
            let content = fs::read_to_string(config_path).context("Failed to read config file")?;
            let config: AppConfig =
                serde_json::from_str(&content).context("Failed to parse config file")?;
            Ok(config)
        } else {
            Ok(Self::default())
        }
    }

    /// Snapshot to use: the explicit path, the configured one, or the default
    pub fn resolve_snapshot_path(&self, explicit: Option<&Path>) -> Result<PathBuf> {
        match explicit.or(self.snapshot_path.as_deref()) {
            Some(path) => Ok(path.to_path_buf()),
            None => Ok(get_app_data_dir()?.join(SNAPSHOT_FILE)),
        }
    }
}

/// Get the path to the config file
pub fn get_config_path() -> Result<PathBuf> {
    let app_dir = get_app_data_dir()?;
    Ok(app_dir.join(CONFIG_FILE))
}

/// Get the application data directory
pub fn get_app_data_dir() -> Result<PathBuf> {
    let base = if cfg!(target_os = "macos") {
        dirs::home_dir().map(|h| h.join("Library").join("Application Support"))
    } else if cfg!(target_os = "windows") {
        dirs::data_local_dir()
    } else {
        // Linux/Unix: use XDG_DATA_HOME or ~/.local/share
        dirs::data_dir()
    };

    let base = base.context("Could not determine app data directory")?;
    let app_dir = base.join(APP_NAME);

    fs::create_dir_all(&app_dir)?;
    Ok(app_dir)
}
