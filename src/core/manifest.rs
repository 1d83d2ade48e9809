//! Build manifests and the manifest merger
//!
//! A [`Manifest`] is the declarative description handed to the build
//! primitive for one crate, layer or sysroot: dependencies, enabled
//! features, the profile block and target compiler flags. It is a map-rooted
//! [`ConfigValue`] tree with typed accessors for the well-known keys:
//!
//! ```toml
//! [dependencies.net]
//! path = "crates/net"
//! features = ["tcp"]
//!
//! [profile.release]
//! lto = true
//!
//! [target.aarch64-unknown-none]
//! rustflags = ["-C", "relocation-model=static"]
//! ```

use std::path::{Path, PathBuf};

use crate::core::profile::Profile;
use crate::core::value::ConfigValue;
use crate::error::ManifestError;

/// A build manifest
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Manifest {
    root: ConfigValue,
}

/// How a dependency is declared in a manifest
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DependencySpec {
    pub version: Option<String>,
    pub path: Option<PathBuf>,
    pub git: Option<String>,
    pub rev: Option<String>,
    pub registry: Option<String>,
    pub features: Vec<String>,
    pub default_features: Option<bool>,
}

impl DependencySpec {
    /// Dependency on a local path
    pub fn path(path: &Path) -> Self {
        Self {
            path: Some(path.to_path_buf()),
            ..Self::default()
        }
    }

    /// Dependency on a registry version
    pub fn version(version: &str) -> Self {
        Self {
            version: Some(version.to_string()),
            ..Self::default()
        }
    }

    /// Enable features
    #[must_use]
    pub fn with_features<I, S>(mut self, features: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.features.extend(features.into_iter().map(Into::into));
        self
    }

    fn to_value(&self) -> ConfigValue {
        let mut value = ConfigValue::empty_map();
        if let Some(version) = &self.version {
            value.insert_path(&["version"], version.as_str().into());
        }
        if let Some(path) = &self.path {
            value.insert_path(&["path"], path.display().to_string().into());
        }
        if let Some(git) = &self.git {
            value.insert_path(&["git"], git.as_str().into());
        }
        if let Some(rev) = &self.rev {
            value.insert_path(&["rev"], rev.as_str().into());
        }
        if let Some(registry) = &self.registry {
            value.insert_path(&["registry"], registry.as_str().into());
        }
        if !self.features.is_empty() {
            value.insert_path(&["features"], ConfigValue::string_list(self.features.clone()));
        }
        if let Some(default_features) = self.default_features {
            value.insert_path(&["default-features"], default_features.into());
        }
        value
    }
}

impl Manifest {
    /// An empty manifest
    pub fn new() -> Self {
        Self::default()
    }

    /// Wrap a value tree; the root must be a map
    pub fn from_value(root: ConfigValue) -> Result<Self, ManifestError> {
        match root {
            ConfigValue::Map(_) => Ok(Self { root }),
            other => Err(ManifestError::NotATable {
                found: other.kind().to_string(),
            }),
        }
    }

    /// Convert a parsed TOML value
    pub fn from_toml_value(value: &toml::Value) -> Result<Self, ManifestError> {
        Self::from_value(ConfigValue::from_toml(value)?)
    }

    /// Parse TOML text
    pub fn from_toml_str(content: &str) -> Result<Self, ManifestError> {
        let value: toml::Value = toml::from_str(content).map_err(|e| ManifestError::Parse {
            error: e.to_string(),
        })?;
        Self::from_toml_value(&value)
    }

    /// The underlying value tree
    pub fn as_value(&self) -> &ConfigValue {
        &self.root
    }

    /// Look up a value by key path
    pub fn get(&self, path: &[&str]) -> Option<&ConfigValue> {
        self.root.get_path(path)
    }

    /// Set a value by key path
    pub fn set(&mut self, path: &[&str], value: ConfigValue) {
        self.root.insert_path(path, value);
    }

    /// Declare a dependency, merging onto any existing declaration
    pub fn add_dependency(&mut self, name: &str, spec: &DependencySpec) {
        let merged = match self.get(&["dependencies", name]) {
            Some(existing) => existing.merge(&spec.to_value()),
            None => spec.to_value(),
        };
        self.set(&["dependencies", name], merged);
    }

    /// Builder form of [`Manifest::add_dependency`]
    #[must_use]
    pub fn with_dependency(mut self, name: &str, spec: &DependencySpec) -> Self {
        self.add_dependency(name, spec);
        self
    }

    /// Names of all declared dependencies, sorted
    pub fn dependency_names(&self) -> Vec<String> {
        self.get(&["dependencies"])
            .and_then(ConfigValue::as_map)
            .map(|deps| deps.keys().cloned().collect())
            .unwrap_or_default()
    }

    /// Features enabled on a dependency
    pub fn dependency_features(&self, name: &str) -> Vec<String> {
        self.get(&["dependencies", name, "features"])
            .map(ConfigValue::string_items)
            .unwrap_or_default()
    }

    /// Write the profile block for `profile`
    pub fn set_profile(&mut self, profile: &Profile) -> Result<(), ManifestError> {
        self.set(&["profile", profile.name.as_str()], profile.to_value()?);
        Ok(())
    }

    /// Read back a profile block
    pub fn profile(&self, name: &str) -> Option<&ConfigValue> {
        self.get(&["profile", name])
    }

    /// Set target compiler flags
    pub fn set_rustflags(&mut self, triple: &str, flags: &[String]) {
        self.set(
            &["target", triple, "rustflags"],
            ConfigValue::string_list(flags.iter().cloned()),
        );
    }

    /// Target compiler flags
    pub fn rustflags(&self, triple: &str) -> Vec<String> {
        self.get(&["target", triple, "rustflags"])
            .map(ConfigValue::string_items)
            .unwrap_or_default()
    }

    /// Merge overrides onto this manifest in declaration order
    #[must_use]
    pub fn merged(&self, overrides: &[Manifest]) -> Manifest {
        merge(self, overrides)
    }

    /// Render as Cargo-style TOML text
    pub fn to_toml_string(&self) -> Result<String, ManifestError> {
        toml::to_string_pretty(&self.root.to_toml()).map_err(|e| ManifestError::Render {
            error: e.to_string(),
        })
    }

    /// Render the `Cargo.toml` handed to the primitive.
    ///
    /// Target compiler flags are left out; they reach rustc through
    /// `CARGO_ENCODED_RUSTFLAGS`. Other `[target]` entries stay.
    pub fn to_cargo_toml_string(&self) -> Result<String, ManifestError> {
        let mut root = self.root.clone();
        let mut drop_target = false;
        if let ConfigValue::Map(map) = &mut root {
            if let Some(ConfigValue::Map(targets)) = map.get_mut("target") {
                for entry in targets.values_mut() {
                    if let ConfigValue::Map(entry) = entry {
                        entry.remove("rustflags");
                    }
                }
                targets.retain(|_, entry| !matches!(entry, ConfigValue::Map(m) if m.is_empty()));
                drop_target = targets.is_empty();
            }
            if drop_target {
                map.remove("target");
            }
        }
        toml::to_string_pretty(&root.to_toml()).map_err(|e| ManifestError::Render {
            error: e.to_string(),
        })
    }

    /// Canonical JSON text, used for cache keys
    pub fn to_canonical_json(&self) -> String {
        self.root.to_json().to_string()
    }
}

/// Merge `overrides` onto `base`, in order, last wins per leaf key.
///
/// `merge(b, [o1, o2])` equals `merge(&merge(b, [o1]), [o2])`. Reordering
/// the overrides may change the result.
pub fn merge(base: &Manifest, overrides: &[Manifest]) -> Manifest {
    let values: Vec<ConfigValue> = overrides.iter().map(|m| m.root.clone()).collect();
    Manifest {
        root: ConfigValue::merge_all(&base.root, &values),
    }
}
