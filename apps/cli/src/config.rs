//! CLI configuration.
//!
//! Reads JSON at `~/.config/filebay/config.json`. Missing fields fall back
//! to defaults; `FILEBAY_API_ORIGIN` overrides the origin.

use std::path::{Path, PathBuf};

use filebay_upload_queue::DEFAULT_CONCURRENCY;
use serde::{Deserialize, Serialize};

/// Environment variable overriding [`AppConfig::api_origin`].
pub const API_ORIGIN_ENV: &str = "FILEBAY_API_ORIGIN";

const DEFAULT_API_ORIGIN: &str = "http://localhost:8080";
const APP_DIR: &str = "filebay";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("could not determine config directory")]
    NoConfigDir,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid config file: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub api_origin: String,
    pub concurrency: usize,
    /// Where interrupted uploads are remembered. Defaults next to the
    /// config file.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state_file: Option<PathBuf>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            api_origin: DEFAULT_API_ORIGIN.into(),
            concurrency: DEFAULT_CONCURRENCY,
            state_file: None,
        }
    }
}

impl AppConfig {
    /// Loads from `path`, or from the default location when `None`.
    /// A missing file yields the defaults.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let path = match path {
            Some(p) => p.to_path_buf(),
            None => config_file_path()?,
        };

        let mut config = if path.exists() {
            let content = std::fs::read_to_string(&path)?;
            serde_json::from_str::<AppConfig>(&content)?
        } else {
            tracing::debug!(path = %path.display(), "no config file, using defaults");
            AppConfig::default()
        };
        config.apply_env(|key| std::env::var(key).ok());
        Ok(config)
    }

    /// Applies environment overrides read through `lookup`.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(origin) = lookup(API_ORIGIN_ENV).filter(|s| !s.trim().is_empty()) {
            self.api_origin = origin.trim().to_string();
        }
    }

    /// The configured state file, or `~/.config/filebay/uploads.json`.
    pub fn state_file_path(&self) -> Result<PathBuf, ConfigError> {
        match &self.state_file {
            Some(p) => Ok(p.clone()),
            None => Ok(app_dir()?.join("uploads.json")),
        }
    }
}

/// Returns `~/.config/filebay/config.json`.
pub fn config_file_path() -> Result<PathBuf, ConfigError> {
    Ok(app_dir()?.join("config.json"))
}

fn app_dir() -> Result<PathBuf, ConfigError> {
    config_dir()
        .map(|d| d.join(APP_DIR))
        .ok_or(ConfigError::NoConfigDir)
}

fn config_dir() -> Option<PathBuf> {
    #[cfg(target_os = "linux")]
    {
        std::env::var("XDG_CONFIG_HOME")
            .ok()
            .map(PathBuf::from)
            .or_else(|| {
                std::env::var("HOME")
                    .ok()
                    .map(|h| PathBuf::from(h).join(".config"))
            })
    }

    #[cfg(target_os = "windows")]
    {
        std::env::var("APPDATA").ok().map(PathBuf::from)
    }

    #[cfg(not(any(target_os = "linux", target_os = "windows")))]
    {
        std::env::var("HOME")
            .ok()
            .map(|h| PathBuf::from(h).join(".config"))
    }
}
