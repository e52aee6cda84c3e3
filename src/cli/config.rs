//! Configuration layering for the pan-dl CLI
//!
//! Command-line values win; the JSON config file only fills in options that
//! were not given explicitly; built-in defaults cover the rest.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use pan_dl::{BoundedRetry, DownloadOptions, RetryForever, DEFAULT_COOKIE_NAME};
use serde::Deserialize;

/// Config file looked up next to the executable
pub const CONFIG_FILE_NAME: &str = "pan-dl.json";

/// Base backoff used when `--max-retries` is given
const RETRY_BASE_DELAY: Duration = Duration::from_secs(1);

/// Contents of the JSON config file
#[derive(Debug, Default, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct FileConfig {
    #[serde(alias = "size", alias = "Size")]
    pub workers: Option<u64>,

    #[serde(alias = "Block")]
    pub block: Option<u64>,

    #[serde(alias = "chunk", alias = "Chunk")]
    pub buffer: Option<u64>,

    #[serde(alias = "bduss", alias = "BDUSS")]
    pub cookie: Option<String>,

    #[serde(alias = "Dir")]
    pub dir: Option<PathBuf>,
}

impl FileConfig {
    /// Read a config file; `Ok(None)` when it does not exist
    pub fn load(path: &Path) -> Result<Option<Self>> {
        if !path.exists() {
            return Ok(None);
        }
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {}", path.display()))?;
        let config = serde_json::from_str(&text)
            .with_context(|| format!("failed to parse config file {}", path.display()))?;
        Ok(Some(config))
    }
}

/// `pan-dl.json` in the directory of the running executable
pub fn default_config_path() -> Option<PathBuf> {
    let exe = std::env::current_exe().ok()?;
    exe.parent().map(|dir| dir.join(CONFIG_FILE_NAME))
}

/// Options as given on the command line; `None` means "not given"
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Settings {
    pub workers: Option<usize>,
    pub block_size: Option<u64>,
    pub buffer_size: Option<usize>,
    pub cookie: Option<String>,
    pub dir: Option<PathBuf>,
    pub cookie_name: Option<String>,
    pub filename: Option<String>,
    pub max_retries: Option<u32>,
    pub debug: bool,
    pub rebalance: bool,
}

impl Settings {
    /// Fill options not set on the command line from the config file.
    ///
    /// Zero numbers in the file count as unset.
    pub fn with_file(mut self, file: &FileConfig) -> Self {
        if self.workers.is_none() {
            self.workers = file.workers.filter(|&n| n != 0).map(|n| n as usize);
        }
        if self.block_size.is_none() {
            self.block_size = file.block.filter(|&n| n != 0);
        }
        if self.buffer_size.is_none() {
            self.buffer_size = file.buffer.filter(|&n| n != 0).map(|n| n as usize);
        }
        if self.cookie.is_none() {
            self.cookie = file.cookie.clone();
        }
        if self.dir.is_none() {
            self.dir = file.dir.clone();
        }
        self
    }

    /// Apply defaults for everything still unset
    pub fn into_options(self) -> DownloadOptions {
        let defaults = DownloadOptions::default();
        DownloadOptions {
            workers: self.workers.unwrap_or(defaults.workers),
            block_size: self.block_size.unwrap_or(defaults.block_size),
            buffer_size: self.buffer_size.unwrap_or(defaults.buffer_size),
            dir: self.dir.unwrap_or(defaults.dir),
            filename: self.filename,
            credential: self.cookie,
            cookie_name: self.cookie_name.unwrap_or_else(|| DEFAULT_COOKIE_NAME.to_string()),
            debug: self.debug,
            rebalance: self.rebalance,
            retry: match self.max_retries {
                Some(retries) => Arc::new(BoundedRetry::new(retries.saturating_add(1), RETRY_BASE_DELAY)),
                None => Arc::new(RetryForever),
            },
            ..defaults
        }
    }
}
