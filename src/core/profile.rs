//! Build profiles
//!
//! A [`Profile`] is a named set of codegen settings rendered into the
//! `[profile.<name>]` block of every manifest the pipeline produces.

use serde::{Deserialize, Serialize};

use crate::core::value::ConfigValue;
use crate::error::ManifestError;

/// Optimisation level: a number (`0`-`3`) or a size level (`"s"`, `"z"`)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum OptLevel {
    Level(u8),
    Size(String),
}

/// Profile settings. Unset fields are left to the toolchain default.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct ProfileSettings {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub opt_level: Option<OptLevel>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lto: Option<bool>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub codegen_units: Option<u32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub incremental: Option<bool>,

    /// Debug info level (0, 1 or 2)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub debug: Option<u8>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub overflow_checks: Option<bool>,

    /// Panic strategy, `abort` for bare-metal targets
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub panic: Option<String>,

    /// Strip symbols from the packaged primary output. Never passed to the
    /// compiler: layers always keep their symbols.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub strip: Option<bool>,
}

/// A named build profile
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Profile {
    /// Profile name (`release`, `dev`, or a custom name)
    pub name: String,

    /// Settings for this profile
    #[serde(default)]
    pub settings: ProfileSettings,
}

impl Profile {
    /// Optimised profile for deployable images
    pub fn release() -> Self {
        Self {
            name: "release".to_string(),
            settings: ProfileSettings {
                opt_level: Some(OptLevel::Level(3)),
                lto: Some(true),
                codegen_units: Some(1),
                incremental: Some(false),
                debug: Some(0),
                overflow_checks: Some(false),
                panic: Some("abort".to_string()),
                strip: None,
            },
        }
    }

    /// Unoptimised profile with full debug info
    pub fn dev() -> Self {
        Self {
            name: "dev".to_string(),
            settings: ProfileSettings {
                opt_level: Some(OptLevel::Level(0)),
                lto: Some(false),
                codegen_units: None,
                incremental: Some(true),
                debug: Some(2),
                overflow_checks: Some(true),
                panic: Some("abort".to_string()),
                strip: None,
            },
        }
    }

    /// Built-in defaults for `release` and `dev`; empty settings otherwise
    pub fn named(name: &str) -> Self {
        match name {
            "release" => Self::release(),
            "dev" | "debug" => Self::dev(),
            other => Self {
                name: other.to_string(),
                settings: ProfileSettings::default(),
            },
        }
    }

    /// Apply overrides key by key; keys not set in `overrides` are kept
    pub fn with_overrides(self, overrides: &ProfileSettings) -> Result<Self, ManifestError> {
        let base = ConfigValue::from_serialize(&self.settings)?;
        let over = ConfigValue::from_serialize(overrides)?;
        let settings = base.merge(&over).deserialize()?;
        Ok(Self {
            name: self.name,
            settings,
        })
    }

    /// Output directory name used by cargo for this profile
    pub fn dir_name(&self) -> &str {
        match self.name.as_str() {
            "dev" | "test" => "debug",
            "bench" => "release",
            other => other,
        }
    }

    /// Settings as a value tree, for the manifest `profile` block
    pub fn to_value(&self) -> Result<ConfigValue, ManifestError> {
        ConfigValue::from_serialize(&ProfileSettings {
            strip: None,
            ..self.settings.clone()
        })
    }
}

impl Default for Profile {
    fn default() -> Self {
        Self::release()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strip_stays_out_of_the_manifest_profile() {
        let profile = Profile::release()
            .with_overrides(&ProfileSettings {
                strip: Some(true),
                ..ProfileSettings::default()
            })
            .unwrap();

        assert_eq!(profile.settings.strip, Some(true));
        let value = profile.to_value().unwrap();
        assert!(value.get_path(&["strip"]).is_none());
        assert!(value.get_path(&["lto"]).is_some());
    }

    #[test]
    fn test_release_defaults() {
        let profile = Profile::release();
        assert_eq!(profile.settings.lto, Some(true));
        assert_eq!(profile.settings.codegen_units, Some(1));
        assert_eq!(profile.dir_name(), "release");
    }

    #[test]
    fn test_dev_maps_to_debug_dir() {
        assert_eq!(Profile::named("dev").dir_name(), "debug");
        assert_eq!(Profile::named("custom").dir_name(), "custom");
    }

    #[test]
    fn test_overrides_replace_only_named_keys() {
        let profile = Profile::release()
            .with_overrides(&ProfileSettings {
                debug: Some(2),
                opt_level: Some(OptLevel::Size("z".to_string())),
                ..ProfileSettings::default()
            })
            .unwrap();

        assert_eq!(profile.settings.debug, Some(2));
        assert_eq!(profile.settings.opt_level, Some(OptLevel::Size("z".to_string())));
        // untouched
        assert_eq!(profile.settings.lto, Some(true));
        assert_eq!(profile.settings.panic.as_deref(), Some("abort"));
    }

    #[test]
    fn test_settings_render_kebab_case() {
        let value = Profile::release().to_value().unwrap();
        assert!(value.get_path(&["codegen-units"]).is_some());
        assert!(value.get_path(&["overflow-checks"]).is_some());
        assert!(value.get_path(&["strip"]).is_none());
    }

    #[test]
    fn test_settings_parse_from_toml() {
        let settings: ProfileSettings =
            toml::from_str("opt-level = \"s\"\nlto = false\ncodegen-units = 4\n").unwrap();
        assert_eq!(settings.opt_level, Some(OptLevel::Size("s".to_string())));
        assert_eq!(settings.codegen_units, Some(4));
    }
}
