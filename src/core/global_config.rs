//! Global configuration management
//!
//! Reads user-level settings from `config.toml` in the config directory:
//! default build options and the artifact store location.
//!
//! ```toml
//! [build]
//! jobs = 8
//! primitive = "cargo"
//!
//! [cache]
//! dir = "/var/cache/layerforge"
//! lock_timeout_secs = 600
//! ```

use crate::infra::dirs::LayerforgeDirs;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

use crate::config::defaults;

/// Global configuration error types
#[derive(Error, Debug)]
pub enum GlobalConfigError {
    /// Failed to read config file
    #[error("Failed to read config file '{path}': {error}")]
    ReadError { path: String, error: String },

    /// Failed to parse config file
    #[error("Failed to parse config file '{path}': {error}")]
    ParseError { path: String, error: String },
}

/// Global configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GlobalConfig {
    /// Artifact store settings
    #[serde(default)]
    pub cache: CacheConfig,

    /// Default build options
    #[serde(default)]
    pub build: BuildDefaults,
}

/// Artifact store configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Store root, defaults to the platform cache directory
    pub dir: Option<PathBuf>,

    /// Seconds to wait for another writer of the same artifact
    pub lock_timeout_secs: Option<u64>,
}

/// Default build options
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BuildDefaults {
    /// Default number of parallel jobs
    pub jobs: Option<usize>,

    /// Default build primitive
    pub primitive: Option<String>,

    /// Default command for the `command` primitive
    pub command: Option<Vec<String>>,
}

impl GlobalConfig {
    /// Load global configuration from the config directory
    ///
    /// A missing file yields the defaults; an invalid one is an error.
    pub fn load(dirs: &LayerforgeDirs) -> Result<Self, GlobalConfigError> {
        Self::load_from_path(&dirs.global_config_path())
    }

    /// Load global configuration from a specific path
    pub fn load_from_path(path: &Path) -> Result<Self, GlobalConfigError> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = fs::read_to_string(path).map_err(|e| GlobalConfigError::ReadError {
            path: path.display().to_string(),
            error: e.to_string(),
        })?;

        toml::from_str(&content).map_err(|e| GlobalConfigError::ParseError {
            path: path.display().to_string(),
            error: e.to_string(),
        })
    }

    /// Save global configuration to a specific path
    ///
    /// Creates parent directories if they don't exist.
    pub fn save_to_path(&self, path: &Path) -> Result<(), GlobalConfigError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| GlobalConfigError::ReadError {
                path: parent.display().to_string(),
                error: e.to_string(),
            })?;
        }

        let content = toml::to_string_pretty(self).map_err(|e| GlobalConfigError::ParseError {
            path: path.display().to_string(),
            error: e.to_string(),
        })?;

        fs::write(path, content).map_err(|e| GlobalConfigError::ReadError {
            path: path.display().to_string(),
            error: e.to_string(),
        })
    }

    /// Effective store root
    #[must_use]
    pub fn store_dir(&self, dirs: &LayerforgeDirs) -> PathBuf {
        self.cache.dir.clone().unwrap_or_else(|| dirs.store_dir())
    }

    /// Effective lock timeout
    #[must_use]
    pub fn lock_timeout(&self) -> Duration {
        Duration::from_secs(
            self.cache
                .lock_timeout_secs
                .unwrap_or(defaults::LOCK_TIMEOUT_SECS),
        )
    }

    /// Effective number of build jobs
    #[must_use]
    pub fn build_jobs(&self) -> usize {
        self.build.jobs.unwrap_or_else(num_cpus::get)
    }

    /// Effective build primitive
    #[must_use]
    pub fn primitive(&self) -> &str {
        self.build
            .primitive
            .as_deref()
            .unwrap_or(defaults::DEFAULT_PRIMITIVE)
    }
}
