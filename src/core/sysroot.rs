//! Sysroot construction
//!
//! Builds `core`, `compiler_builtins` and `alloc` for a target and profile
//! into the artifact store. The key covers everything that affects the
//! output, so equal inputs share one immutable sysroot.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

use serde::Serialize;

use crate::core::build_env::{BuildConfig, BuildEnvironment};
use crate::core::manifest::{DependencySpec, Manifest};
use crate::core::primitive::{BuildKind, BuildPrimitive, BuildRequest};
use crate::core::profile::Profile;
use crate::core::target::TargetSpec;
use crate::core::value::ConfigValue;
use crate::error::{ManifestError, PipelineError};
use crate::infra::store::ArtifactStore;

/// Stands for the toolchain's `rust-src` directory in sysroot manifests.
/// Primitives substitute the real path before building.
pub const RUST_SRC_PLACEHOLDER: &str = "@rust-src@";

/// Bumped whenever the sysroot manifest layout changes
const SYSROOT_FORMAT: &str = "1";

const SYSROOT_PACKAGE: &str = "sysroot";

/// A published standard library for one target and profile
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Sysroot {
    pub key: String,
    /// Root to pass to `--sysroot`
    pub path: PathBuf,
    pub target: TargetSpec,
    pub profile: Profile,
    /// Whether the store already held it
    pub cached: bool,
}

impl Sysroot {
    /// Directory holding the target's rlibs
    pub fn lib_dir(&self) -> PathBuf {
        self.path
            .join("lib")
            .join("rustlib")
            .join(self.target.target_dir_name())
            .join("lib")
    }
}

/// Cache key of the sysroot for these inputs, including the contents of a
/// custom target definition
pub fn sysroot_key(
    target: &TargetSpec,
    profile: &Profile,
    overrides: &Manifest,
) -> Result<String, PipelineError> {
    let target_json = ConfigValue::from_serialize(target)?.to_json().to_string();
    let profile_json = ConfigValue::from_serialize(profile)?.to_json().to_string();
    let spec_digest = target.spec_digest()?.unwrap_or_default();
    Ok(ArtifactStore::compute_key([
        SYSROOT_FORMAT,
        target_json.as_str(),
        spec_digest.as_str(),
        profile_json.as_str(),
        overrides.to_canonical_json().as_str(),
    ]))
}

/// Manifest of the synthetic crate whose dependencies are the sysroot
pub fn sysroot_manifest(
    target: &TargetSpec,
    profile: &Profile,
    overrides: &Manifest,
) -> Result<Manifest, ManifestError> {
    let library = |name: &str| PathBuf::from(format!("{RUST_SRC_PLACEHOLDER}/library/{name}"));

    let mut manifest = Manifest::new();
    manifest.set(&["package", "name"], SYSROOT_PACKAGE.into());
    manifest.set(&["package", "version"], "0.0.0".into());
    manifest.set(&["package", "edition"], "2021".into());
    manifest.set(&["lib", "path"], "src/lib.rs".into());

    manifest.add_dependency("core", &DependencySpec::path(&library("core")));
    manifest.add_dependency(
        "compiler_builtins",
        &DependencySpec::version("0.1").with_features(["mem"]),
    );
    manifest.add_dependency("alloc", &DependencySpec::path(&library("alloc")));

    manifest.set_profile(profile)?;
    manifest.set_rustflags(&target.triple, &target.rustflags);

    Ok(manifest.merged(std::slice::from_ref(overrides)))
}

/// Builds sysroots through a primitive, caching them in the store
pub struct SysrootBuilder {
    store: Arc<ArtifactStore>,
    primitive: Arc<dyn BuildPrimitive>,
    jobs: usize,
}

impl SysrootBuilder {
    pub fn new(store: Arc<ArtifactStore>, primitive: Arc<dyn BuildPrimitive>) -> Self {
        Self {
            store,
            primitive,
            jobs: num_cpus::get(),
        }
    }

    #[must_use]
    pub fn with_jobs(mut self, jobs: usize) -> Self {
        self.jobs = jobs;
        self
    }

    /// Return the sysroot for these inputs, building it on a store miss.
    ///
    /// A failing build reports the tool output verbatim and publishes
    /// nothing.
    pub fn build(
        &self,
        target: &TargetSpec,
        profile: &Profile,
        overrides: &Manifest,
    ) -> Result<Sysroot, PipelineError> {
        let key = sysroot_key(target, profile, overrides)?;
        let manifest = sysroot_manifest(target, profile, overrides)?;

        let env = BuildEnvironment::for_sysroot(target)
            .with_rustflags(manifest.rustflags(&target.triple))
            .with_jobs(self.jobs)
            .with_packages([SYSROOT_PACKAGE])
            .with_env("RUSTC_BOOTSTRAP", "1");
        let config = BuildConfig::from_value(&env.to_config())?;

        let mut files = BTreeMap::new();
        files.insert("src/lib.rs".to_string(), "#![no_std]\n".to_string());

        let publication = self.store.publish_with(&key, |out_dir| {
            tracing::info!("Building sysroot for {} ({})", target.name, profile.name);
            let request = BuildRequest {
                kind: BuildKind::Sysroot,
                label: "sysroot".to_string(),
                manifest: manifest.to_cargo_toml_string()?,
                target: target.clone(),
                profile: profile.clone(),
                config,
                sysroot: None,
                inputs: Vec::new(),
                files,
                out_dir: out_dir.to_path_buf(),
            };
            self.primitive
                .build(&request)
                .map_err(|e| PipelineError::ToolchainBuildFailure {
                    target: target.name.clone(),
                    profile: profile.name.clone(),
                    output: e.output(),
                })
        })?;

        let cached = publication.cached();
        if cached {
            tracing::info!("Sysroot for {} ({}) is up to date", target.name, profile.name);
        }
        tracing::debug!("Sysroot key {key}");

        Ok(Sysroot {
            key,
            path: publication.path,
            target: target.clone(),
            profile: profile.clone(),
            cached,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::primitive::RecordingPrimitive;
    use std::time::Duration;
    use tempfile::TempDir;

    fn target() -> TargetSpec {
        TargetSpec::new("aarch64-unknown-none")
    }

    fn builder(temp: &TempDir, primitive: Arc<RecordingPrimitive>) -> SysrootBuilder {
        let store = Arc::new(ArtifactStore::new(temp.path(), Duration::from_secs(5)));
        SysrootBuilder::new(store, primitive).with_jobs(2)
    }

    #[test]
    fn test_key_is_deterministic() {
        let overrides = Manifest::new();
        let a = sysroot_key(&target(), &Profile::release(), &overrides).unwrap();
        let b = sysroot_key(&target(), &Profile::release(), &overrides).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_key_depends_on_every_input() {
        let base = sysroot_key(&target(), &Profile::release(), &Manifest::new()).unwrap();

        let other_profile = sysroot_key(&target(), &Profile::dev(), &Manifest::new()).unwrap();
        let other_target = sysroot_key(
            &TargetSpec::new("riscv64imac-unknown-none-elf"),
            &Profile::release(),
            &Manifest::new(),
        )
        .unwrap();
        let over = Manifest::from_toml_str("[profile.release]\ndebug = 2\n").unwrap();
        let other_overrides = sysroot_key(&target(), &Profile::release(), &over).unwrap();

        assert_ne!(base, other_profile);
        assert_ne!(base, other_target);
        assert_ne!(base, other_overrides);
    }

    #[test]
    fn test_manifest_declares_library_crates() {
        let manifest = sysroot_manifest(&target(), &Profile::release(), &Manifest::new()).unwrap();

        assert_eq!(
            manifest.dependency_names(),
            vec!["alloc", "compiler_builtins", "core"]
        );
        assert_eq!(manifest.dependency_features("compiler_builtins"), vec!["mem"]);
        assert_eq!(
            manifest
                .get(&["dependencies", "core", "path"])
                .and_then(ConfigValue::as_str),
            Some("@rust-src@/library/core")
        );
        assert!(manifest.profile("release").is_some());
    }

    #[test]
    fn test_overrides_merge_onto_sysroot_manifest() {
        let over = Manifest::from_toml_str(
            "[dependencies.compiler_builtins]\nfeatures = [\"no-asm\"]\n",
        )
        .unwrap();
        let manifest = sysroot_manifest(&target(), &Profile::release(), &over).unwrap();
        assert_eq!(
            manifest.dependency_features("compiler_builtins"),
            vec!["mem", "no-asm"]
        );
    }

    #[test]
    fn test_second_build_is_a_cache_hit() {
        let temp = TempDir::new().unwrap();
        let primitive = Arc::new(RecordingPrimitive::default());
        let builder = builder(&temp, Arc::clone(&primitive));

        let first = builder.build(&target(), &Profile::release(), &Manifest::new()).unwrap();
        let second = builder.build(&target(), &Profile::release(), &Manifest::new()).unwrap();

        assert_eq!(first.key, second.key);
        assert_eq!(first.path, second.path);
        assert!(!first.cached);
        assert!(second.cached);
        assert_eq!(primitive.calls(), 1);

        let request = primitive.requests.lock().unwrap()[0].clone();
        assert_eq!(request.kind, BuildKind::Sysroot);
        assert_eq!(request.config.env.get("RUSTC_BOOTSTRAP").map(String::as_str), Some("1"));
        assert_eq!(request.config.jobs, 2);
        assert!(request.files.contains_key("src/lib.rs"));
    }

    #[test]
    fn test_failure_reports_output_and_publishes_nothing() {
        let temp = TempDir::new().unwrap();
        let primitive = Arc::new(RecordingPrimitive::failing_on("sysroot"));
        let builder = builder(&temp, primitive);

        let err = builder
            .build(&target(), &Profile::release(), &Manifest::new())
            .unwrap_err();

        match err {
            PipelineError::ToolchainBuildFailure {
                target,
                profile,
                output,
            } => {
                assert_eq!(target, "aarch64-unknown-none");
                assert_eq!(profile, "release");
                assert_eq!(output, "error: could not compile sysroot");
            }
            other => panic!("unexpected error: {other}"),
        }

        let key = sysroot_key(&self::target(), &Profile::release(), &Manifest::new()).unwrap();
        let store = ArtifactStore::new(temp.path(), Duration::from_secs(5));
        assert!(!store.contains(&key));
    }

    #[test]
    fn test_edited_target_definition_changes_key() {
        let temp = TempDir::new().unwrap();
        let spec = temp.path().join("aarch64-sel4.json");
        std::fs::write(&spec, "{\"arch\": \"aarch64\"}").unwrap();
        let target = TargetSpec::new("aarch64-sel4").with_spec_path(spec.clone());

        let before = sysroot_key(&target, &Profile::release(), &Manifest::new()).unwrap();
        std::fs::write(&spec, "{\"arch\": \"aarch64\", \"linker\": \"rust-lld\"}").unwrap();
        let after = sysroot_key(&target, &Profile::release(), &Manifest::new()).unwrap();

        assert_ne!(before, after);
    }

    #[test]
    fn test_override_rustflags_reach_the_compiler() {
        let temp = TempDir::new().unwrap();
        let primitive = Arc::new(RecordingPrimitive::default());
        let over = Manifest::from_toml_str(
            "[target.aarch64-unknown-none]\nrustflags = [\"-Cforce-frame-pointers=yes\"]\n",
        )
        .unwrap();

        builder(&temp, Arc::clone(&primitive))
            .build(&target(), &Profile::release(), &over)
            .unwrap();

        let request = primitive.requests.lock().unwrap()[0].clone();
        assert_eq!(
            request.config.env.get("CARGO_ENCODED_RUSTFLAGS").map(String::as_str),
            Some("-Cforce-frame-pointers=yes")
        );
        assert!(!request.manifest.contains("rustflags"));
    }

    #[test]
    fn test_lib_dir_layout() {
        let sysroot = Sysroot {
            key: "k".to_string(),
            path: PathBuf::from("/store/objects/ab/k"),
            target: target(),
            profile: Profile::release(),
            cached: false,
        };
        assert_eq!(
            sysroot.lib_dir(),
            PathBuf::from("/store/objects/ab/k/lib/rustlib/aarch64-unknown-none/lib")
        );
    }
}
