//! Modification sets
//!
//! A [`ModificationSet`] bundles manifest overrides, environment variables,
//! build configuration overrides, injected input files and post-build
//! transforms. The pipeline receives an ordered list of sets; for each layer
//! it applies, in list order, every set whose [`Scope`] matches. The usual
//! arrangement `[common (all), extra (last)]` gives common-then-last.

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::core::artifact::LayerArtifact;
use crate::core::manifest::Manifest;
use crate::core::planner::BuildLayer;
use crate::core::value::ConfigValue;
use crate::error::PipelineError;

/// Which layers a modification set applies to
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Scope {
    /// Every layer
    #[default]
    All,
    /// Only the layer holding the root crate
    Last,
    /// Layers by index
    Layers(Vec<usize>),
}

impl Scope {
    /// Whether this scope covers `layer`
    pub fn matches(&self, layer: &BuildLayer) -> bool {
        match self {
            Self::All => true,
            Self::Last => layer.is_last,
            Self::Layers(indices) => indices.contains(&layer.index),
        }
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::All => write!(f, "all"),
            Self::Last => write!(f, "last"),
            Self::Layers(indices) => {
                let list: Vec<String> = indices.iter().map(ToString::to_string).collect();
                write!(f, "layers {}", list.join(","))
            }
        }
    }
}

/// Contents of an injected file
#[derive(Debug, Clone, PartialEq)]
pub enum InjectionSource {
    /// Copy an existing file
    Path(PathBuf),
    /// Serialize a structured blob as JSON
    Json(serde_json::Value),
}

/// A generated file handed to the build as a named input
#[derive(Debug, Clone, PartialEq)]
pub struct InjectedFile {
    /// File name inside the build environment
    pub name: String,
    pub source: InjectionSource,
    /// Environment variable set to the file's absolute path
    pub env: Option<String>,
}

impl InjectedFile {
    /// Inject a structured JSON blob
    pub fn json(name: &str, blob: serde_json::Value) -> Self {
        Self {
            name: name.to_string(),
            source: InjectionSource::Json(blob),
            env: None,
        }
    }

    /// Inject an existing file
    pub fn path(name: &str, path: &Path) -> Self {
        Self {
            name: name.to_string(),
            source: InjectionSource::Path(path.to_path_buf()),
            env: None,
        }
    }

    /// Expose the file's path through an environment variable
    #[must_use]
    pub fn with_env(mut self, var: &str) -> Self {
        self.env = Some(var.to_string());
        self
    }

    /// Read the file contents. Names ending in `.json` must hold valid JSON;
    /// the schema is not checked.
    pub fn contents(&self) -> Result<String, PipelineError> {
        let contents = match &self.source {
            InjectionSource::Path(path) => {
                std::fs::read_to_string(path).map_err(|e| PipelineError::Injection {
                    name: self.name.clone(),
                    error: format!("{}: {e}", path.display()),
                })?
            }
            InjectionSource::Json(blob) => {
                serde_json::to_string_pretty(blob).map_err(|e| PipelineError::Injection {
                    name: self.name.clone(),
                    error: e.to_string(),
                })?
            }
        };

        if self.name.ends_with(".json") {
            serde_json::from_str::<serde_json::Value>(&contents).map_err(|e| {
                PipelineError::Injection {
                    name: self.name.clone(),
                    error: format!("not valid JSON: {e}"),
                }
            })?;
        }

        Ok(contents)
    }
}

/// Artifact transform function
pub type TransformFn = Arc<dyn Fn(LayerArtifact) -> LayerArtifact + Send + Sync>;

/// Post-build transform. Operates on the artifact description only and
/// never causes a rebuild.
#[derive(Clone)]
pub enum Transform {
    /// Keep symbols in the final packaging
    DisableStrip,
    /// Expose a file inside the artifact under a name
    ExposeOutput { name: String, path: PathBuf },
    /// Record a metadata entry
    SetMetadata { key: String, value: String },
    /// Arbitrary pure transform
    Custom { label: String, apply: TransformFn },
}

impl Transform {
    /// Wrap a closure
    pub fn custom<F>(label: &str, f: F) -> Self
    where
        F: Fn(LayerArtifact) -> LayerArtifact + Send + Sync + 'static,
    {
        Self::Custom {
            label: label.to_string(),
            apply: Arc::new(f),
        }
    }

    /// Apply to an artifact description
    pub fn apply(&self, artifact: LayerArtifact) -> LayerArtifact {
        match self {
            Self::DisableStrip => LayerArtifact {
                strip: false,
                ..artifact
            },
            Self::ExposeOutput { name, path } => artifact.with_output(name, path),
            Self::SetMetadata { key, value } => {
                let mut artifact = artifact;
                artifact.metadata.insert(key.clone(), value.clone());
                artifact
            }
            Self::Custom { apply, .. } => apply(artifact),
        }
    }
}

impl fmt::Debug for Transform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::DisableStrip => write!(f, "DisableStrip"),
            Self::ExposeOutput { name, path } => f
                .debug_struct("ExposeOutput")
                .field("name", name)
                .field("path", path)
                .finish(),
            Self::SetMetadata { key, value } => f
                .debug_struct("SetMetadata")
                .field("key", key)
                .field("value", value)
                .finish(),
            Self::Custom { label, .. } => f.debug_struct("Custom").field("label", label).finish(),
        }
    }
}

/// A named, scoped bundle of modifications
#[derive(Debug, Clone)]
pub struct ModificationSet {
    pub name: String,
    pub scope: Scope,
    /// Manifest overrides
    pub manifest: Option<Manifest>,
    /// Environment variable overrides
    pub env: BTreeMap<String, String>,
    /// Build configuration overrides (`jobs`, `args`, `env`, ...)
    pub config: ConfigValue,
    /// Files handed to the build as named inputs
    pub inject: Vec<InjectedFile>,
    /// Post-build transforms
    pub transforms: Vec<Transform>,
}

impl ModificationSet {
    /// An empty set
    pub fn new(name: &str, scope: Scope) -> Self {
        Self {
            name: name.to_string(),
            scope,
            manifest: None,
            env: BTreeMap::new(),
            config: ConfigValue::empty_map(),
            inject: Vec::new(),
            transforms: Vec::new(),
        }
    }

    /// Set manifest overrides
    #[must_use]
    pub fn with_manifest(mut self, manifest: Manifest) -> Self {
        self.manifest = Some(manifest);
        self
    }

    /// Set an environment variable
    #[must_use]
    pub fn with_env(mut self, key: &str, value: &str) -> Self {
        self.env.insert(key.to_string(), value.to_string());
        self
    }

    /// Set build configuration overrides
    #[must_use]
    pub fn with_config(mut self, config: ConfigValue) -> Self {
        self.config = config;
        self
    }

    /// Inject a file
    #[must_use]
    pub fn with_injected_file(mut self, file: InjectedFile) -> Self {
        self.inject.push(file);
        self
    }

    /// Add a post-build transform
    #[must_use]
    pub fn with_transform(mut self, transform: Transform) -> Self {
        self.transforms.push(transform);
        self
    }

    /// Configuration overrides with `env` folded in under the `env` key
    pub fn config_overrides(&self) -> ConfigValue {
        let mut config = self.config.clone();
        for (key, value) in &self.env {
            config.insert_path(&["env", key.as_str()], value.as_str().into());
        }
        config
    }
}

/// Sets applying to `layer`, in declaration order
pub fn applicable<'a>(
    sets: &'a [ModificationSet],
    layer: &'a BuildLayer,
) -> impl Iterator<Item = &'a ModificationSet> + 'a {
    sets.iter().filter(move |set| set.scope.matches(layer))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::graph::CrateRef;

    fn layer(index: usize, is_last: bool) -> BuildLayer {
        BuildLayer {
            index,
            crates: vec![CrateRef::local(&format!("c{index}"), "0.1.0", "x")],
            externals: Vec::new(),
            is_last,
        }
    }

    fn artifact() -> LayerArtifact {
        LayerArtifact {
            index: 0,
            key: "k".to_string(),
            path: PathBuf::from("/store/k"),
            crates: vec!["app".to_string()],
            outputs: BTreeMap::new(),
            metadata: BTreeMap::new(),
            strip: true,
            cached: false,
            target_dir: "t".to_string(),
            profile_dir: "release".to_string(),
        }
    }

    #[test]
    fn test_scope_matching() {
        let first = layer(0, false);
        let last = layer(2, true);

        assert!(Scope::All.matches(&first));
        assert!(!Scope::Last.matches(&first));
        assert!(Scope::Last.matches(&last));
        assert!(Scope::Layers(vec![0, 1]).matches(&first));
        assert!(!Scope::Layers(vec![0, 1]).matches(&last));
    }

    #[test]
    fn test_scope_parses_from_toml() {
        #[derive(Deserialize)]
        struct Wrapper {
            scope: Scope,
        }
        let all: Wrapper = toml::from_str("scope = \"all\"").unwrap();
        let last: Wrapper = toml::from_str("scope = \"last\"").unwrap();
        let some: Wrapper = toml::from_str("scope = { layers = [1, 2] }").unwrap();
        assert_eq!(all.scope, Scope::All);
        assert_eq!(last.scope, Scope::Last);
        assert_eq!(some.scope, Scope::Layers(vec![1, 2]));
    }

    #[test]
    fn test_applicable_keeps_declaration_order() {
        let sets = vec![
            ModificationSet::new("common", Scope::All),
            ModificationSet::new("last", Scope::Last),
            ModificationSet::new("first-only", Scope::Layers(vec![0])),
        ];

        let last_layer = layer(1, true);
        let first_layer = layer(0, false);
        let on_last: Vec<_> = applicable(&sets, &last_layer).map(|s| s.name.as_str()).collect();
        let on_first: Vec<_> =
            applicable(&sets, &first_layer).map(|s| s.name.as_str()).collect();

        assert_eq!(on_last, vec!["common", "last"]);
        assert_eq!(on_first, vec!["common", "first-only"]);
    }

    #[test]
    fn test_env_folds_into_config() {
        let set = ModificationSet::new("m", Scope::All)
            .with_config(ConfigValue::empty_map())
            .with_env("SEL4_PREFIX", "/opt/sel4");
        let config = set.config_overrides();
        assert_eq!(
            config.get_path(&["env", "SEL4_PREFIX"]).and_then(ConfigValue::as_str),
            Some("/opt/sel4")
        );
    }

    #[test]
    fn test_transforms_are_pure() {
        let original = artifact();
        let transformed = [
            Transform::DisableStrip,
            Transform::ExposeOutput {
                name: "elf".to_string(),
                path: PathBuf::from("target/t/release/app.elf"),
            },
            Transform::SetMetadata {
                key: "board".to_string(),
                value: "qemu-arm-virt".to_string(),
            },
            Transform::custom("mark", |mut a| {
                a.metadata.insert("marked".to_string(), "yes".to_string());
                a
            }),
        ]
        .iter()
        .fold(original.clone(), |acc, t| t.apply(acc));

        assert!(!transformed.strip);
        assert_eq!(
            transformed.outputs.get("elf"),
            Some(&PathBuf::from("target/t/release/app.elf"))
        );
        assert_eq!(transformed.metadata.get("board").map(String::as_str), Some("qemu-arm-virt"));
        assert_eq!(transformed.metadata.get("marked").map(String::as_str), Some("yes"));
        // the input value is untouched
        assert!(original.strip);
        assert_eq!(transformed.path, original.path);
        assert_eq!(transformed.key, original.key);
    }

    #[test]
    fn test_json_injection_renders_blob() {
        let file = InjectedFile::json("config.json", serde_json::json!({ "objects": [] }))
            .with_env("CONFIG_PATH");
        let contents = file.contents().unwrap();
        assert!(contents.contains("\"objects\""));
        assert_eq!(file.env.as_deref(), Some("CONFIG_PATH"));
    }

    #[test]
    fn test_invalid_json_file_is_rejected() {
        let temp = tempfile::TempDir::new().unwrap();
        let path = temp.path().join("broken.json");
        std::fs::write(&path, "{ not json").unwrap();

        let err = InjectedFile::path("spec.json", &path).contents().unwrap_err();
        assert!(matches!(err, PipelineError::Injection { .. }));
    }

    #[test]
    fn test_non_json_file_is_passed_through() {
        let temp = tempfile::TempDir::new().unwrap();
        let path = temp.path().join("image.ld");
        std::fs::write(&path, "SECTIONS {}").unwrap();

        let contents = InjectedFile::path("image.ld", &path).contents().unwrap();
        assert_eq!(contents, "SECTIONS {}");
    }
}
