//! Engine configuration loaded from TOML.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Engine-wide settings.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Style plugin used when a display configures none.
    pub default_style: String,
    /// Row plugin used when a display configures none.
    pub default_row: String,
    /// Upper bound on a pager's items per page; `0` disables the cap.
    pub max_items_per_page: u64,
    /// Query parameter carrying the requested page.
    pub page_param: String,
    /// Log filter used when `VIEWKIT_LOG` is unset.
    pub log_filter: Option<String>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            default_style: "default".into(),
            default_row: "fields".into(),
            max_items_per_page: 200,
            page_param: "page".into(),
            log_filter: None,
        }
    }
}

impl EngineConfig {
    /// Loads `explicit`, else the per-user config file; a missing file yields
    /// the defaults.
    pub fn load(explicit: Option<PathBuf>) -> Result<Self, ConfigError> {
        match explicit.or_else(default_config_path) {
            Some(path) if path.exists() => read_file(&path),
            _ => Ok(Self::default()),
        }
    }

    /// Parses configuration text.
    pub fn from_toml(contents: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(contents)
    }

    /// Applies the items-per-page cap.
    pub fn clamp_items(&self, items: u64) -> u64 {
        if self.max_items_per_page == 0 {
            items
        } else {
            items.min(self.max_items_per_page)
        }
    }
}

fn read_file(path: &Path) -> Result<EngineConfig, ConfigError> {
    let contents = fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    EngineConfig::from_toml(&contents).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

/// Failures loading [`EngineConfig`].
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to parse config {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
}

impl ConfigError {
    /// Returns a machine-readable code for the error variant.
    pub fn code(&self) -> &'static str {
        match self {
            ConfigError::Read { .. } => "ConfigRead",
            ConfigError::Parse { .. } => "ConfigParse",
        }
    }
}

/// `<config dir>/viewkit/config.toml`.
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|base| base.join("viewkit").join("config.toml"))
}
