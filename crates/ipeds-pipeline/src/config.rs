//! Configuration management
//!
//! Settings come from an optional TOML file merged with `IPEDS_`-prefixed
//! environment variables (a `.env` file is loaded first). Nested keys use a
//! double underscore: `IPEDS_STORAGE__BUCKET`, `IPEDS_DOWNLOADER__TIMEOUT_SECS`.
//!
//! Each component receives only the slice it needs; nothing holds on to the
//! whole [`PipelineConfig`].

use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use ipeds_common::{PipelineError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::download::retry::RetryPolicy;
use crate::download::transfer::TransferOptions;
use crate::extract::Compression;
use crate::storage::StorageConfig;

/// Default request timeout in seconds.
pub const DEFAULT_TIMEOUT_SECS: u64 = 300;

/// Default whole-request attempt budget.
pub const DEFAULT_RETRY_ATTEMPTS: u32 = 3;

/// Default exponential backoff factor in seconds.
pub const DEFAULT_BACKOFF_FACTOR: f64 = 1.0;

/// Default streaming/digest chunk size in MiB.
pub const DEFAULT_CHUNK_SIZE_MB: usize = 10;

/// Relative location searched for when no config file is given.
pub const DEFAULT_CONFIG_FILE: &str = "config/pipeline.toml";

/// Prefix for environment overrides.
pub const ENV_PREFIX: &str = "IPEDS_";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub source: SourceConfig,
    pub paths: PathsConfig,
    pub downloader: DownloaderConfig,
    pub extractor: ExtractorConfig,
    pub storage: StorageConfig,
}

/// Remote archive source
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SourceConfig {
    /// Base URL for the yearly access-database archives
    pub base_url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    /// Scratch space for downloads and extracted artifacts
    pub temp_dir: PathBuf,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            temp_dir: std::env::temp_dir().join("ipeds-pipeline"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DownloaderConfig {
    pub timeout_secs: u64,
    pub retry_attempts: u32,
    pub backoff_factor: f64,
    pub chunk_size_mb: usize,
}

impl Default for DownloaderConfig {
    fn default() -> Self {
        Self {
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            retry_attempts: DEFAULT_RETRY_ATTEMPTS,
            backoff_factor: DEFAULT_BACKOFF_FACTOR,
            chunk_size_mb: DEFAULT_CHUNK_SIZE_MB,
        }
    }
}

impl DownloaderConfig {
    pub fn transfer_options(&self) -> TransferOptions {
        TransferOptions {
            timeout: Duration::from_secs(self.timeout_secs),
            chunk_size: self.chunk_size_mb * 1024 * 1024,
        }
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.retry_attempts, self.backoff_factor)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractorConfig {
    pub compression: Compression,
}

impl PipelineConfig {
    /// Load from `path`, or from the first `config/pipeline.toml` found walking
    /// up from the working directory, then apply environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        dotenvy::dotenv().ok();

        let file = match path {
            Some(p) if !p.exists() => {
                return Err(PipelineError::configuration(format!(
                    "Configuration file not found: {}",
                    p.display()
                )))
            },
            Some(p) => Some(p.to_path_buf()),
            None => find_config_file(),
        };

        let mut figment = Figment::new();
        if let Some(file) = &file {
            figment = figment.merge(Toml::file(file));
        }
        figment = figment.merge(Env::prefixed(ENV_PREFIX).split("__"));

        let config: PipelineConfig = figment
            .extract()
            .map_err(|e| PipelineError::configuration(e.to_string()))?;

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        let base_url = self.source.base_url.trim();
        if base_url.is_empty() {
            return Err(PipelineError::configuration("source.base_url is required"));
        }
        if !(base_url.starts_with("http://") || base_url.starts_with("https://")) {
            return Err(PipelineError::configuration(format!(
                "source.base_url must be an http(s) URL, got '{}'",
                base_url
            )));
        }
        if self.downloader.timeout_secs == 0 {
            return Err(PipelineError::configuration("downloader.timeout_secs must be greater than 0"));
        }
        if self.downloader.retry_attempts == 0 {
            return Err(PipelineError::configuration("downloader.retry_attempts must be at least 1"));
        }
        if self.downloader.chunk_size_mb == 0 {
            return Err(PipelineError::configuration("downloader.chunk_size_mb must be greater than 0"));
        }
        let backoff = self.downloader.backoff_factor;
        if !backoff.is_finite() || backoff < 0.0 {
            return Err(PipelineError::configuration(
                "downloader.backoff_factor must be a finite, non-negative number",
            ));
        }

        self.storage.validate()
    }
}

fn find_config_file() -> Option<PathBuf> {
    let cwd = std::env::current_dir().ok()?;
    cwd.ancestors()
        .map(|dir| dir.join(DEFAULT_CONFIG_FILE))
        .find(|candidate| candidate.is_file())
}
