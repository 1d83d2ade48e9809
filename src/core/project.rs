//! Project file (layerforge.toml) parsing and validation
//!
//! The project file describes the crate graph, the target, the profile, the
//! sysroot overrides and the ordered modification sets:
//!
//! ```toml
//! extends = "../common.toml"
//!
//! [project]
//! name = "hello"
//! root = "app"
//!
//! [target]
//! triple = "aarch64-unknown-none"
//!
//! [crates.app]
//! version = "0.1.0"
//! path = "crates/app"
//! dependencies = ["smoltcp"]
//!
//! [crates.smoltcp]
//! version = "0.10"
//!
//! [[modifications]]
//! name = "image"
//! scope = "last"
//! inject = [{ name = "config.json", path = "gen/config.json", env = "CONFIG_PATH" }]
//! ```
//!
//! String values may reference environment variables as `${VAR}`. A file may
//! `extends` another; tables merge deeply and the extending file wins.
//! Relative paths resolve against the directory of the project file.

use std::collections::BTreeMap;
use std::path::{Component, Path, PathBuf};

use regex::Regex;
use serde::Deserialize;

use crate::core::graph::{CrateGraph, CrateNode, CrateRef, CrateSource};
use crate::core::manifest::Manifest;
use crate::core::modification::{InjectedFile, ModificationSet, Scope, Transform};
use crate::core::profile::{Profile, ProfileSettings};
use crate::core::target::TargetSpec;
use crate::core::value::ConfigValue;
use crate::error::ProjectError;

/// Project file name
pub const PROJECT_FILE: &str = "layerforge.toml";

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawProject {
    project: RawProjectSection,
    target: RawTarget,
    #[serde(default)]
    profile: RawProfile,
    #[serde(default)]
    crates: BTreeMap<String, RawCrate>,
    #[serde(default)]
    sysroot: RawSysroot,
    #[serde(default)]
    modifications: Vec<RawModification>,
    #[serde(default)]
    build: BuildSection,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawProjectSection {
    name: String,
    root: String,
    binary: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawTarget {
    name: Option<String>,
    triple: String,
    spec: Option<PathBuf>,
    #[serde(default)]
    rustflags: Vec<String>,
    linker: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawProfile {
    #[serde(default = "default_profile")]
    name: String,
    #[serde(default)]
    settings: ProfileSettings,
}

impl Default for RawProfile {
    fn default() -> Self {
        Self {
            name: default_profile(),
            settings: ProfileSettings::default(),
        }
    }
}

fn default_profile() -> String {
    "release".to_string()
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawCrate {
    version: Option<String>,
    path: Option<PathBuf>,
    registry: Option<String>,
    git: Option<String>,
    rev: Option<String>,
    #[serde(default)]
    dependencies: Vec<String>,
    #[serde(default)]
    features: Vec<String>,
    manifest: Option<toml::Value>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawSysroot {
    manifest: Option<toml::Value>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawModification {
    name: String,
    #[serde(default)]
    scope: Scope,
    manifest: Option<toml::Value>,
    #[serde(default)]
    env: BTreeMap<String, String>,
    config: Option<toml::Value>,
    #[serde(default)]
    inject: Vec<RawInject>,
    #[serde(default)]
    transforms: Vec<RawTransform>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawInject {
    name: String,
    path: Option<PathBuf>,
    json: Option<toml::Value>,
    env: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case", deny_unknown_fields)]
enum RawTransform {
    DisableStrip,
    ExposeOutput { name: String, path: PathBuf },
    SetMetadata { key: String, value: String },
}

/// `[build]` section
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BuildSection {
    /// Parallelism hint
    pub jobs: Option<usize>,
    /// Build primitive (`cargo` or `command`)
    pub primitive: Option<String>,
    /// Program and arguments for the `command` primitive
    #[serde(default)]
    pub command: Vec<String>,
}

/// A loaded project
#[derive(Debug, Clone)]
pub struct Project {
    /// Directory holding the project file
    pub dir: PathBuf,
    pub name: String,
    /// Root crate name
    pub root: String,
    /// Primary output name, defaults to the root crate name
    pub binary: Option<String>,
    pub target: TargetSpec,
    pub profile: Profile,
    pub sysroot_overrides: Manifest,
    pub modifications: Vec<ModificationSet>,
    pub build: BuildSection,
    crates: Vec<CrateNode>,
}

impl Project {
    /// Load `layerforge.toml` from `dir`
    pub fn find(dir: &Path) -> Result<Self, ProjectError> {
        Self::load(&dir.join(PROJECT_FILE))
    }

    /// Load a project file, resolving `extends` and `${VAR}` references
    pub fn load(path: &Path) -> Result<Self, ProjectError> {
        if !path.exists() {
            return Err(ProjectError::NotFound {
                path: path.to_path_buf(),
            });
        }

        let mut value = load_toml_with_inheritance(path, &mut Vec::new())?;
        substitute_in_value(&mut value)?;

        let dir = path
            .parent()
            .map_or_else(|| PathBuf::from("."), Path::to_path_buf);
        let raw: RawProject = value.try_into().map_err(|e: toml::de::Error| ProjectError::Parse {
            path: path.to_path_buf(),
            error: e.to_string(),
        })?;

        Self::from_raw(raw, &dir)
    }

    /// Parse project file text. Relative paths resolve against `dir`.
    pub fn from_toml_str(content: &str, dir: &Path) -> Result<Self, ProjectError> {
        let parse_error = |error: String| ProjectError::Parse {
            path: dir.join(PROJECT_FILE),
            error,
        };
        let mut value: toml::Value = toml::from_str(content).map_err(|e| parse_error(e.to_string()))?;
        substitute_in_value(&mut value)?;
        let raw: RawProject = value.try_into().map_err(|e: toml::de::Error| parse_error(e.to_string()))?;
        Self::from_raw(raw, dir)
    }

    fn from_raw(raw: RawProject, dir: &Path) -> Result<Self, ProjectError> {
        if raw.project.name.trim().is_empty() {
            return Err(invalid("project.name", "cannot be empty"));
        }

        let target = build_target(raw.target, dir)?;
        let profile = Profile::named(&raw.profile.name).with_overrides(&raw.profile.settings)?;

        let crates = raw
            .crates
            .into_iter()
            .map(|(name, krate)| build_crate(&name, krate, dir))
            .collect::<Result<Vec<_>, _>>()?;

        let sysroot_overrides = match raw.sysroot.manifest {
            Some(value) => Manifest::from_toml_value(&value)?,
            None => Manifest::new(),
        };

        let modifications = raw
            .modifications
            .into_iter()
            .enumerate()
            .map(|(i, m)| build_modification(i, m, dir))
            .collect::<Result<Vec<_>, _>>()?;

        if raw.build.jobs == Some(0) {
            return Err(invalid("build.jobs", "must be greater than 0"));
        }
        if let Some(primitive) = &raw.build.primitive {
            if primitive != "cargo" && primitive != "command" {
                return Err(invalid("build.primitive", "expected 'cargo' or 'command'"));
            }
            if primitive == "command" && raw.build.command.is_empty() {
                return Err(invalid("build.command", "required by the 'command' primitive"));
            }
        }

        let project = Self {
            dir: dir.to_path_buf(),
            name: raw.project.name,
            root: raw.project.root,
            binary: raw.project.binary,
            target,
            profile,
            sysroot_overrides,
            modifications,
            build: raw.build,
            crates,
        };

        tracing::debug!(
            "Loaded project '{}' with {} crates and {} modification sets",
            project.name,
            project.crates.len(),
            project.modifications.len()
        );
        Ok(project)
    }

    /// Declared crates, sorted by name
    pub fn crates(&self) -> &[CrateNode] {
        &self.crates
    }

    /// Crate graph reachable from the root crate
    pub fn graph(&self) -> Result<CrateGraph, ProjectError> {
        Ok(CrateGraph::new(&self.root, self.crates.clone())?)
    }

    /// Name of the primary output
    pub fn primary_output(&self) -> &str {
        self.binary.as_deref().unwrap_or(&self.root)
    }
}

fn invalid(field: &str, reason: &str) -> ProjectError {
    ProjectError::InvalidField {
        field: field.to_string(),
        reason: reason.to_string(),
    }
}

fn resolve(dir: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        dir.join(path)
    }
}

fn build_target(raw: RawTarget, dir: &Path) -> Result<TargetSpec, ProjectError> {
    let mut target = TargetSpec::new(&raw.triple).with_rustflags(raw.rustflags);
    if let Some(name) = raw.name {
        target.name = name;
    }
    if let Some(spec) = raw.spec {
        target = target.with_spec_path(resolve(dir, &spec));
    }
    target.linker = raw.linker;
    target.validate()?;
    Ok(target)
}

fn build_crate(name: &str, raw: RawCrate, dir: &Path) -> Result<CrateNode, ProjectError> {
    let field = |key: &str| format!("crates.{name}.{key}");

    let sources = [raw.path.is_some(), raw.registry.is_some(), raw.git.is_some()];
    if sources.iter().filter(|s| **s).count() > 1 {
        return Err(invalid(
            &field("path"),
            "only one of 'path', 'registry' and 'git' may be given",
        ));
    }

    let source = if let Some(path) = raw.path {
        CrateSource::Local {
            path: resolve(dir, &path),
        }
    } else if let Some(url) = raw.git {
        CrateSource::Git { url, rev: raw.rev }
    } else {
        CrateSource::Registry {
            registry: raw.registry,
        }
    };

    let version = match (&source, raw.version) {
        (CrateSource::Local { .. }, Some(version)) => {
            semver::Version::parse(&version)
                .map_err(|e| invalid(&field("version"), &e.to_string()))?;
            version
        }
        (CrateSource::Local { .. }, None) => "0.1.0".to_string(),
        (_, Some(version)) => {
            semver::VersionReq::parse(&version)
                .map_err(|e| invalid(&field("version"), &e.to_string()))?;
            version
        }
        (CrateSource::Git { .. }, None) => "*".to_string(),
        (CrateSource::Registry { .. }, None) => {
            return Err(invalid(&field("version"), "required for registry crates"));
        }
    };

    let krate = CrateRef {
        name: name.to_string(),
        version,
        source,
    };

    let mut node = CrateNode::new(krate)
        .with_dependencies(raw.dependencies)
        .with_features(raw.features);
    if let Some(manifest) = raw.manifest {
        node = node.with_manifest(Manifest::from_toml_value(&manifest)?);
    }
    Ok(node)
}

fn build_modification(
    position: usize,
    raw: RawModification,
    dir: &Path,
) -> Result<ModificationSet, ProjectError> {
    let field = |key: &str| format!("modifications[{position}].{key}");

    let mut set = ModificationSet::new(&raw.name, raw.scope);
    if let Some(manifest) = raw.manifest {
        set = set.with_manifest(Manifest::from_toml_value(&manifest)?);
    }
    if let Some(config) = raw.config {
        let config = ConfigValue::from_toml(&config)?;
        if config.as_map().is_none() {
            return Err(invalid(&field("config"), "must be a table"));
        }
        set = set.with_config(config);
    }
    for (key, value) in raw.env {
        set = set.with_env(&key, &value);
    }

    for inject in raw.inject {
        let file = match (inject.path, inject.json) {
            (Some(path), None) => InjectedFile::path(&inject.name, &resolve(dir, &path)),
            (None, Some(blob)) => {
                let json = serde_json::to_value(&blob)
                    .map_err(|e| invalid(&field("inject.json"), &e.to_string()))?;
                InjectedFile::json(&inject.name, json)
            }
            _ => {
                return Err(invalid(
                    &field("inject"),
                    "exactly one of 'path' and 'json' must be given",
                ));
            }
        };
        set = set.with_injected_file(match inject.env {
            Some(var) => file.with_env(&var),
            None => file,
        });
    }

    for transform in raw.transforms {
        set = set.with_transform(match transform {
            RawTransform::DisableStrip => Transform::DisableStrip,
            RawTransform::ExposeOutput { name, path } => {
                if !is_inside_artifact(&path) {
                    return Err(invalid(
                        &field("transforms"),
                        &format!(
                            "output '{name}' must be a relative path inside the artifact, got '{}'",
                            path.display()
                        ),
                    ));
                }
                Transform::ExposeOutput { name, path }
            }
            RawTransform::SetMetadata { key, value } => Transform::SetMetadata { key, value },
        });
    }

    Ok(set)
}

/// Relative, names a file, and free of `..`
fn is_inside_artifact(path: &Path) -> bool {
    path.components().any(|c| matches!(c, Component::Normal(_)))
        && path.components().all(|c| matches!(c, Component::Normal(_) | Component::CurDir))
}

/// Substitute environment variables in a string.
///
/// Replaces `${VAR}` with the value of `VAR`; unset variables become the
/// empty string.
pub fn substitute_env_vars(input: &str) -> Result<String, ProjectError> {
    let re = Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)\}")
        .map_err(|e| invalid("${VAR}", &e.to_string()))?;

    let mut last_end = 0;
    let mut output = String::new();

    for cap in re.captures_iter(input) {
        let Some(full_match) = cap.get(0) else {
            continue;
        };
        output.push_str(&input[last_end..full_match.start()]);
        output.push_str(&std::env::var(&cap[1]).unwrap_or_default());
        last_end = full_match.end();
    }

    output.push_str(&input[last_end..]);
    Ok(output)
}

/// Recursively substitute environment variables in a TOML value
fn substitute_in_value(value: &mut toml::Value) -> Result<(), ProjectError> {
    match value {
        toml::Value::String(s) => {
            *s = substitute_env_vars(s)?;
        }
        toml::Value::Array(arr) => {
            for item in arr.iter_mut() {
                substitute_in_value(item)?;
            }
        }
        toml::Value::Table(table) => {
            for (_, v) in table.iter_mut() {
                substitute_in_value(v)?;
            }
        }
        _ => {}
    }
    Ok(())
}

/// Merge two TOML tables, `override_table` winning. Nested tables merge deeply.
fn merge_toml_tables(base: &mut toml::value::Table, override_table: &toml::value::Table) {
    for (key, override_value) in override_table {
        match (base.get_mut(key), override_value) {
            (Some(toml::Value::Table(base_table)), toml::Value::Table(override_table)) => {
                merge_toml_tables(base_table, override_table);
            }
            _ => {
                base.insert(key.clone(), override_value.clone());
            }
        }
    }
}

/// Load a TOML file and resolve its `extends` directive recursively.
fn load_toml_with_inheritance(
    path: &Path,
    chain: &mut Vec<PathBuf>,
) -> Result<toml::Value, ProjectError> {
    let canonical = path.canonicalize().map_err(|e| ProjectError::Io {
        path: path.to_path_buf(),
        error: e.to_string(),
    })?;
    if chain.contains(&canonical) {
        let mut names: Vec<String> = chain.iter().map(|p| p.display().to_string()).collect();
        names.push(canonical.display().to_string());
        return Err(ProjectError::CircularExtends { chain: names });
    }
    chain.push(canonical);

    let content = std::fs::read_to_string(path).map_err(|e| ProjectError::Io {
        path: path.to_path_buf(),
        error: e.to_string(),
    })?;
    let mut value: toml::Value = toml::from_str(&content).map_err(|e| ProjectError::Parse {
        path: path.to_path_buf(),
        error: e.to_string(),
    })?;

    let extends = value
        .get("extends")
        .and_then(toml::Value::as_str)
        .map(str::to_string);

    if let toml::Value::Table(table) = &mut value {
        table.remove("extends");
    }

    if let Some(extends) = extends {
        let base_dir = path.parent().unwrap_or(Path::new("."));
        let base = load_toml_with_inheritance(&base_dir.join(&extends), chain)?;

        if let (toml::Value::Table(mut merged), toml::Value::Table(current)) = (base, &value) {
            merge_toml_tables(&mut merged, current);
            value = toml::Value::Table(merged);
        }
    }

    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::planner::plan_layers;
    use tempfile::TempDir;

    const BASIC: &str = r#"
[project]
name = "hello"
root = "app"

[target]
triple = "aarch64-unknown-none"
rustflags = ["-Crelocation-model=static"]

[crates.app]
version = "0.1.0"
path = "crates/app"
dependencies = ["net", "timers"]

[crates.net]
version = "0.1.0"
path = "crates/net"
dependencies = ["smoltcp"]
features = ["tcp"]

[crates.timers]
version = "0.1.0"
path = "crates/timers"

[crates.smoltcp]
version = "0.10"

[[modifications]]
name = "common"
env = { SEL4_PREFIX = "/opt/sel4" }

[[modifications]]
name = "image"
scope = "last"
inject = [{ name = "config.json", json = { pds = ["app"] }, env = "CONFIG_PATH" }]
transforms = [{ kind = "expose-output", name = "image", path = "loader.img" }]
"#;

    #[test]
    fn test_basic_project_parses() {
        let project = Project::from_toml_str(BASIC, Path::new("/work")).unwrap();

        assert_eq!(project.name, "hello");
        assert_eq!(project.root, "app");
        assert_eq!(project.primary_output(), "app");
        assert_eq!(project.profile.name, "release");
        assert_eq!(project.target.rustflags, vec!["-Crelocation-model=static"]);
        assert_eq!(project.crates().len(), 4);
        assert_eq!(project.modifications.len(), 2);
        assert_eq!(project.modifications[1].scope, Scope::Last);
        assert_eq!(project.modifications[1].inject[0].env.as_deref(), Some("CONFIG_PATH"));
    }

    #[test]
    fn test_local_paths_resolve_against_project_dir() {
        let project = Project::from_toml_str(BASIC, Path::new("/work")).unwrap();
        let graph = project.graph().unwrap();
        let app = graph.get("app").unwrap();
        assert_eq!(
            app.krate.source,
            CrateSource::Local {
                path: PathBuf::from("/work/crates/app")
            }
        );
        assert!(!graph.is_local("smoltcp"));
    }

    #[test]
    fn test_graph_plans_into_layers() {
        let project = Project::from_toml_str(BASIC, Path::new("/work")).unwrap();
        let layers = plan_layers(&project.graph().unwrap());
        assert_eq!(layers.len(), 2);
        assert_eq!(layers[1].crate_names(), vec!["app"]);
    }

    #[test]
    fn test_invalid_local_version_is_rejected() {
        let content = BASIC.replace(
            "[crates.timers]\nversion = \"0.1.0\"",
            "[crates.timers]\nversion = \"one\"",
        );
        let err = Project::from_toml_str(&content, Path::new("/work")).unwrap_err();
        assert!(matches!(err, ProjectError::InvalidField { field, .. } if field == "crates.timers.version"));
    }

    #[test]
    fn test_registry_crate_requires_version() {
        let content = BASIC.replace("[crates.smoltcp]\nversion = \"0.10\"", "[crates.smoltcp]");
        let err = Project::from_toml_str(&content, Path::new("/work")).unwrap_err();
        assert!(matches!(err, ProjectError::InvalidField { .. }));
    }

    #[test]
    fn test_unknown_field_is_a_parse_error() {
        let content = format!("{BASIC}\n[build]\nthreads = 4\n");
        let err = Project::from_toml_str(&content, Path::new("/work")).unwrap_err();
        assert!(matches!(err, ProjectError::Parse { .. }));
    }

    #[test]
    fn test_command_primitive_requires_command() {
        let content = format!("{BASIC}\n[build]\nprimitive = \"command\"\n");
        let err = Project::from_toml_str(&content, Path::new("/work")).unwrap_err();
        assert!(matches!(err, ProjectError::InvalidField { field, .. } if field == "build.command"));
    }

    #[test]
    fn test_profile_settings_override_defaults() {
        let content = format!("{BASIC}\n[profile]\nname = \"release\"\nsettings = {{ debug = 2 }}\n");
        let project = Project::from_toml_str(&content, Path::new("/work")).unwrap();
        assert_eq!(project.profile.settings.debug, Some(2));
        assert_eq!(project.profile.settings.lto, Some(true));
    }

    #[test]
    fn test_replace_marker_in_crate_manifest() {
        let content = format!(
            "{BASIC}\n[crates.app.manifest.dependencies.net]\nfeatures = {{ \"$replace\" = [\"udp\"] }}\n"
        );
        let project = Project::from_toml_str(&content, Path::new("/work")).unwrap();
        let app = project.crates().iter().find(|c| c.name() == "app").unwrap();
        assert!(app.manifest.get(&["dependencies", "net", "features"]).is_some());
    }

    #[test]
    fn test_inject_needs_exactly_one_source() {
        let content = BASIC.replace(
            "inject = [{ name = \"config.json\", json = { pds = [\"app\"] }, env = \"CONFIG_PATH\" }]",
            "inject = [{ name = \"config.json\" }]",
        );
        let err = Project::from_toml_str(&content, Path::new("/work")).unwrap_err();
        assert!(matches!(err, ProjectError::InvalidField { .. }));
    }

    #[test]
    fn test_exposed_output_must_stay_inside_artifact() {
        for path in ["/etc/passwd", "../sysroot/lib.rlib", "images/../../x", ""] {
            let content = BASIC.replace("path = \"loader.img\"", &format!("path = \"{path}\""));
            let err = Project::from_toml_str(&content, Path::new("/work")).unwrap_err();
            assert!(
                matches!(&err, ProjectError::InvalidField { field, .. } if field == "modifications[1].transforms"),
                "{path}: {err}"
            );
        }

        let content = BASIC.replace("path = \"loader.img\"", "path = \"images/loader.img\"");
        assert!(Project::from_toml_str(&content, Path::new("/work")).is_ok());
    }

    #[test]
    fn test_substitute_env_vars() {
        std::env::set_var("LAYERFORGE_TEST_PREFIX", "/opt/sel4");
        let result = substitute_env_vars("${LAYERFORGE_TEST_PREFIX}/lib:${LAYERFORGE_TEST_UNSET}").unwrap();
        assert_eq!(result, "/opt/sel4/lib:");
        std::env::remove_var("LAYERFORGE_TEST_PREFIX");
    }

    #[test]
    fn test_extends_merges_base_file() {
        let temp = TempDir::new().unwrap();
        std::fs::write(
            temp.path().join("base.toml"),
            "[target]\ntriple = \"aarch64-unknown-none\"\nrustflags = [\"-Cbase\"]\n\n[build]\njobs = 2\n",
        )
        .unwrap();
        std::fs::write(
            temp.path().join(PROJECT_FILE),
            "extends = \"base.toml\"\n\n[project]\nname = \"p\"\nroot = \"app\"\n\n[build]\njobs = 8\n\n[crates.app]\npath = \"app\"\n",
        )
        .unwrap();

        let project = Project::find(temp.path()).unwrap();

        assert_eq!(project.target.triple, "aarch64-unknown-none");
        assert_eq!(project.target.rustflags, vec!["-Cbase"]);
        assert_eq!(project.build.jobs, Some(8));
    }

    #[test]
    fn test_circular_extends_is_detected() {
        let temp = TempDir::new().unwrap();
        std::fs::write(temp.path().join("a.toml"), "extends = \"b.toml\"\n").unwrap();
        std::fs::write(temp.path().join("b.toml"), "extends = \"a.toml\"\n").unwrap();

        let err = Project::load(&temp.path().join("a.toml")).unwrap_err();
        assert!(matches!(err, ProjectError::CircularExtends { chain } if chain.len() == 3));
    }

    #[test]
    fn test_missing_project_file() {
        let temp = TempDir::new().unwrap();
        assert!(matches!(
            Project::find(temp.path()),
            Err(ProjectError::NotFound { .. })
        ));
    }
}
