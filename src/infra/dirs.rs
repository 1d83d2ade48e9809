//! Platform-specific directory management
//!
//! Provides platform-specific paths for the artifact store, the global
//! config file and persistent data. Follows XDG on Linux and the standard
//! locations on macOS.
//!
//! Environment variables can override default directories:
//! - `LAYERFORGE_CACHE_DIR` - Override cache directory (holds the store)
//! - `LAYERFORGE_CONFIG_DIR` - Override config directory
//! - `LAYERFORGE_DATA_DIR` - Override data directory

use std::env;
use std::path::PathBuf;

/// Environment variable names for directory overrides
pub const ENV_CACHE_DIR: &str = "LAYERFORGE_CACHE_DIR";
pub const ENV_CONFIG_DIR: &str = "LAYERFORGE_CONFIG_DIR";
pub const ENV_DATA_DIR: &str = "LAYERFORGE_DATA_DIR";

/// Application name used in directory paths
const APP_NAME: &str = "layerforge";

const STORE_SUBDIR: &str = "store";

/// Platform-specific directory provider
#[derive(Debug, Clone)]
pub struct LayerforgeDirs {
    cache_dir: PathBuf,
    config_dir: PathBuf,
    data_dir: PathBuf,
}

impl LayerforgeDirs {
    /// Checks environment variables first, then falls back to platform defaults.
    #[must_use]
    pub fn new() -> Self {
        Self {
            cache_dir: resolve(ENV_CACHE_DIR, dirs::cache_dir, &[".cache"]),
            config_dir: resolve(ENV_CONFIG_DIR, dirs::config_dir, &[".config"]),
            data_dir: resolve(ENV_DATA_DIR, dirs::data_dir, &[".local", "share"]),
        }
    }

    /// Cache directory
    /// - Linux: `$XDG_CACHE_HOME/layerforge` or `~/.cache/layerforge`
    /// - macOS: `~/Library/Caches/layerforge`
    #[must_use]
    pub fn cache_dir(&self) -> PathBuf {
        self.cache_dir.clone()
    }

    /// Config directory
    #[must_use]
    pub fn config_dir(&self) -> PathBuf {
        self.config_dir.clone()
    }

    /// Data directory
    #[must_use]
    pub fn data_dir(&self) -> PathBuf {
        self.data_dir.clone()
    }

    /// Default artifact store root, under the cache directory
    #[must_use]
    pub fn store_dir(&self) -> PathBuf {
        self.cache_dir.join(STORE_SUBDIR)
    }

    /// Global config file path
    #[must_use]
    pub fn global_config_path(&self) -> PathBuf {
        self.config_dir.join("config.toml")
    }
}

impl Default for LayerforgeDirs {
    fn default() -> Self {
        Self::new()
    }
}

fn resolve(var: &str, platform: fn() -> Option<PathBuf>, home_fallback: &[&str]) -> PathBuf {
    if let Ok(path) = env::var(var) {
        return PathBuf::from(path);
    }

    platform().map_or_else(
        || {
            let base = dirs::home_dir().unwrap_or_else(|| PathBuf::from("."));
            home_fallback
                .iter()
                .fold(base, |path, part| path.join(part))
                .join(APP_NAME)
        },
        |p| p.join(APP_NAME),
    )
}
