//! # Configuration Module
//!
//! Runtime settings for the `memcoll` tool and the query worker pool.
//!
//! ## Data Storage
//!
//! The configuration file lives in the platform-standard config directory:
//! - Linux: `~/.config/memory-collection/config.json`
//! - macOS: `~/Library/Application Support/memory-collection/config.json`
//! - Windows: `%APPDATA%\memory-collection\config.json`
//!
//! A missing file is not an error; every setting has a default.
//!
//! ## Example
//!
//! ```json
//! {
//!   "library_path": "/home/user/music/library.json",
//!   "worker_threads": 4,
//!   "default_limit": 50
//! }
//! ```

use anyhow::{Context, Result};
use log::{debug, info};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

const APP_DIR: &str = "memory-collection";
const CONFIG_FILE: &str = "config.json";

/// Returns the path of the configuration file. The file itself may not exist.
pub fn get_config_path() -> Result<PathBuf> {
    let config_dir = dirs::config_dir()
        .ok_or_else(|| anyhow::anyhow!("Could not determine system config directory"))?;
    Ok(config_dir.join(APP_DIR).join(CONFIG_FILE))
}

/// Configuration for runtime behavior
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Library file used when a command is given none
    pub library_path: Option<PathBuf>,
    /// Size of the query worker pool; 0 lets rayon decide
    pub worker_threads: usize,
    /// Result size cap used when a query sets none
    pub default_limit: Option<i32>,
}

impl RuntimeConfig {
    /// Load the configuration from the default location.
    pub fn new() -> Result<Self> {
        Self::load(&get_config_path()?)
    }

    /// Load the configuration from `path`, falling back to defaults when the
    /// file does not exist.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            debug!("No config at {}, using defaults", path.display());
            return Ok(Self::default());
        }
        let text = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        let config = serde_json::from_str(&text)
            .with_context(|| format!("Invalid config file {}", path.display()))?;
        info!("Loaded config from {}", path.display());
        Ok(config)
    }

    /// Write the configuration to `path`, creating parent directories.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        let text = serde_json::to_string_pretty(self).context("Failed to serialize config")?;
        fs::write(path, text)
            .with_context(|| format!("Failed to write config file {}", path.display()))
    }

    /// Create configuration with an explicit library file
    pub fn with_library_path(library_path: PathBuf) -> Self {
        Self {
            library_path: Some(library_path),
            ..Self::default()
        }
    }
}

/// Size rayon's global pool, which runs every asynchronous query.
///
/// The global pool can only be built once per process; later calls (or a
/// pool already started by an earlier query) leave the existing pool in place.
pub fn init_worker_pool(config: &RuntimeConfig) {
    let mut builder = rayon::ThreadPoolBuilder::new().thread_name(|i| format!("memcoll-query-{i}"));
    if config.worker_threads > 0 {
        builder = builder.num_threads(config.worker_threads);
    }
    match builder.build_global() {
        Ok(()) => debug!(
            "Query worker pool started with {} threads",
            rayon::current_num_threads()
        ),
        Err(e) => debug!("Query worker pool already initialized: {e}"),
    }
}
