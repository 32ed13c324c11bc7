use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};

pub const DEFAULT_ATX_API_URL: &str =
    "https://mainnet-api.spacemesh.network/spacemesh.v2alpha1.ActivationService/Highest";

/// Application configuration, read from `config.toml` and the environment
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Path of the postcli executable
    pub postcli_path: PathBuf,
    /// Path of the proving speed profiler executable
    pub profiler_path: PathBuf,
    pub atx_api_url: String,
    pub request_timeout_secs: u64,
    /// File-size polling interval while a run is monitored
    pub poll_interval_ms: u64,
    /// Data directory passed to postcli when none is given on the command line
    pub data_dir: Option<PathBuf>,
    pub min_free_space_bytes: u64,
}

impl Default for AppConfig {
    fn default() -> Self {
        let (postcli, profiler) = if cfg!(windows) {
            ("postcli.exe", "profiler.exe")
        } else {
            ("postcli", "profiler")
        };
        Self {
            postcli_path: PathBuf::from("bin").join("postcli").join(postcli),
            profiler_path: PathBuf::from("bin").join("profiler").join(profiler),
            atx_api_url: DEFAULT_ATX_API_URL.to_string(),
            request_timeout_secs: 30,
            poll_interval_ms: 10_000,
            data_dir: None,
            min_free_space_bytes: 1 << 30,
        }
    }
}

impl AppConfig {
    /// Load from `path` if given, else from the user config directory when a
    /// file exists there, else defaults. Environment overrides apply last.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let config = match path {
            Some(path) => Self::from_file(path)?,
            None => match Self::default_path().filter(|p| p.is_file()) {
                Some(path) => Self::from_file(&path)?,
                None => {
                    debug!("No config file found, using defaults");
                    Self::default()
                }
            },
        };
        Ok(config.with_env_overrides(|key| std::env::var(key).ok()))
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        let config: AppConfig = toml::from_str(&raw)
            .with_context(|| format!("Failed to parse config file {}", path.display()))?;
        info!("Loaded configuration from {}", path.display());
        Ok(config)
    }

    /// `<config dir>/posinit/config.toml`
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("posinit").join("config.toml"))
    }

    /// Apply `POSINIT_*` overrides using `lookup` to read variables
    pub fn with_env_overrides<F>(mut self, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(path) = lookup("POSINIT_POSTCLI_PATH") {
            self.postcli_path = PathBuf::from(path);
        }
        if let Some(path) = lookup("POSINIT_PROFILER_PATH") {
            self.profiler_path = PathBuf::from(path);
        }
        if let Some(url) = lookup("POSINIT_ATX_API_URL") {
            self.atx_api_url = url;
        }
        if let Some(dir) = lookup("POSINIT_DATA_DIR") {
            self.data_dir = Some(PathBuf::from(dir));
        }
        if let Some(ms) = lookup("POSINIT_POLL_INTERVAL_MS").and_then(|v| v.parse().ok()) {
            self.poll_interval_ms = ms;
        }
        if let Some(secs) = lookup("POSINIT_REQUEST_TIMEOUT_SECS").and_then(|v| v.parse().ok()) {
            self.request_timeout_secs = secs;
        }
        if let Some(bytes) = lookup("POSINIT_MIN_FREE_SPACE_BYTES").and_then(|v| v.parse().ok()) {
            self.min_free_space_bytes = bytes;
        }
        self
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(1))
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}
