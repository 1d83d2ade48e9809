//! Build environment setup
//!
//! Produces the intrinsic build configuration of a layer or sysroot build:
//! the parallelism hint, the packages to build, and the environment the
//! primitive runs under (`CARGO_BUILD_TARGET`, `CARGO_ENCODED_RUSTFLAGS`
//! with `--sysroot`, `LAYERFORGE_LAYER`, ...). Modification sets merge onto
//! [`BuildEnvironment::to_config`]; the merged tree is read back as a
//! [`BuildConfig`].
//!
//! Compiler flags come from the merged manifest's
//! `[target.<triple>] rustflags`. Cargo ignores that table inside
//! `Cargo.toml`, so the flags travel in `CARGO_ENCODED_RUSTFLAGS`.

use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::core::target::TargetSpec;
use crate::core::value::ConfigValue;
use crate::error::ManifestError;

/// Separator cargo expects between flags in `CARGO_ENCODED_RUSTFLAGS`
const RUSTFLAGS_SEPARATOR: &str = "\u{1f}";

/// Build environment for one layer or for the sysroot
#[derive(Debug, Clone, PartialEq)]
pub struct BuildEnvironment {
    /// Target the build compiles for
    pub target: TargetSpec,
    /// Sysroot to compile against (None while building the sysroot itself)
    pub sysroot: Option<PathBuf>,
    /// Layer index, None for the sysroot build
    pub layer: Option<usize>,
    /// Number of parallel jobs
    pub jobs: usize,
    /// Packages built together
    pub packages: Vec<String>,
    /// Compiler flags, before the sysroot flags
    pub rustflags: Vec<String>,
    /// Additional environment variables
    pub extra_env: BTreeMap<String, String>,
}

impl BuildEnvironment {
    /// Environment for building layer `index`
    pub fn for_layer(target: &TargetSpec, sysroot: PathBuf, index: usize) -> Self {
        Self {
            target: target.clone(),
            sysroot: Some(sysroot),
            layer: Some(index),
            jobs: num_cpus::get(),
            packages: Vec::new(),
            rustflags: target.rustflags.clone(),
            extra_env: BTreeMap::new(),
        }
    }

    /// Environment for building the sysroot
    pub fn for_sysroot(target: &TargetSpec) -> Self {
        Self {
            target: target.clone(),
            sysroot: None,
            layer: None,
            jobs: num_cpus::get(),
            packages: Vec::new(),
            rustflags: target.rustflags.clone(),
            extra_env: BTreeMap::new(),
        }
    }

    /// Set the number of parallel jobs
    #[must_use]
    pub fn with_jobs(mut self, jobs: usize) -> Self {
        self.jobs = jobs;
        self
    }

    /// Set the packages built together
    #[must_use]
    pub fn with_packages<I, S>(mut self, packages: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.packages = packages.into_iter().map(Into::into).collect();
        self
    }

    /// Replace the compiler flags, usually with the merged manifest's
    #[must_use]
    pub fn with_rustflags(mut self, flags: Vec<String>) -> Self {
        self.rustflags = flags;
        self
    }

    /// Add an extra environment variable
    #[must_use]
    pub fn with_env(mut self, key: &str, value: &str) -> Self {
        self.extra_env.insert(key.to_string(), value.to_string());
        self
    }

    /// Compiler flags for this build
    pub fn rustflags(&self) -> Vec<String> {
        let mut flags = self.rustflags.clone();
        if let Some(sysroot) = &self.sysroot {
            flags.extend(self.target.sysroot_flags(sysroot));
        }
        flags
    }

    /// Convert to environment variable map for process execution
    pub fn to_env_map(&self) -> BTreeMap<String, String> {
        let mut env = BTreeMap::new();

        env.insert("CARGO_BUILD_TARGET".to_string(), self.target.cargo_target());
        env.insert(
            "CARGO_ENCODED_RUSTFLAGS".to_string(),
            self.rustflags().join(RUSTFLAGS_SEPARATOR),
        );
        env.insert("CARGO_BUILD_JOBS".to_string(), self.jobs.to_string());
        env.insert(
            "LAYERFORGE_LAYER".to_string(),
            self.layer
                .map_or_else(|| "sysroot".to_string(), |index| index.to_string()),
        );

        if let Some(spec_path) = &self.target.spec_path {
            if let Some(dir) = spec_path.parent() {
                env.insert("RUST_TARGET_PATH".to_string(), dir.display().to_string());
            }
        }

        if let Some(linker) = &self.target.linker {
            let var = format!(
                "CARGO_TARGET_{}_LINKER",
                self.target.target_dir_name().to_uppercase().replace(['-', '.'], "_")
            );
            env.insert(var, linker.clone());
        }

        for (key, value) in &self.extra_env {
            env.insert(key.clone(), value.clone());
        }

        env
    }

    /// Intrinsic configuration tree, the base for modification overrides
    pub fn to_config(&self) -> ConfigValue {
        let mut config = ConfigValue::empty_map();
        config.insert_path(&["jobs"], i64::try_from(self.jobs).unwrap_or(i64::MAX).into());
        config.insert_path(&["packages"], ConfigValue::string_list(self.packages.clone()));
        config.insert_path(&["args"], ConfigValue::string_list(Vec::<String>::new()));
        for (key, value) in self.to_env_map() {
            config.insert_path(&["env", key.as_str()], value.into());
        }
        config
    }
}

/// Effective build configuration after all overrides are merged
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct BuildConfig {
    /// Parallelism hint for the primitive
    pub jobs: usize,
    /// Packages built together
    #[serde(default)]
    pub packages: Vec<String>,
    /// Environment for the build process
    #[serde(default)]
    pub env: BTreeMap<String, String>,
    /// Extra arguments for the build tool
    #[serde(default)]
    pub args: Vec<String>,
}

impl BuildConfig {
    /// Read a merged configuration tree
    pub fn from_value(value: &ConfigValue) -> Result<Self, ManifestError> {
        value.deserialize()
    }

    /// Check the configuration
    pub fn validate(&self) -> Result<(), ManifestError> {
        if self.jobs == 0 {
            return Err(ManifestError::InvalidConfig {
                path: "jobs".to_string(),
                error: "must be greater than 0".to_string(),
            });
        }
        if let Some(key) = self.env.keys().find(|k| k.is_empty() || k.contains('=')) {
            return Err(ManifestError::InvalidConfig {
                path: format!("env.{key}"),
                error: "not a valid environment variable name".to_string(),
            });
        }
        Ok(())
    }
}
