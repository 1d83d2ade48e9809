//! The layered build pipeline
//!
//! Runs the sysroot build concurrently with layer planning, then builds the
//! layers strictly in order. For each layer:
//!
//! 1. the intrinsic manifest and configuration are assembled and the
//!    matching modification sets are merged on top, in declaration order;
//! 2. the layer key is computed from everything that affects the output;
//! 3. a store hit reuses the artifact, a miss hands the whole layer to the
//!    build primitive in a staging directory and publishes the result;
//! 4. the matching sets' transforms run on the artifact description.
//!
//! The first failure aborts the run. Later layers are not attempted. Once
//! every layer is built, the primary output of the last layer is packaged:
//! unless a transform disabled it, a stripped copy is published to the store.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::Serialize;
use tokio::task::JoinHandle;

use crate::core::artifact::{output_of, LayerArtifact};
use crate::core::build_env::{BuildConfig, BuildEnvironment};
use crate::core::graph::{CrateGraph, CrateSource};
use crate::core::manifest::Manifest;
use crate::core::modification::{applicable, ModificationSet};
use crate::core::planner::{plan_layers, BuildLayer};
use crate::core::primitive::{BuildKind, BuildPrimitive, BuildRequest};
use crate::core::profile::Profile;
use crate::core::sysroot::{Sysroot, SysrootBuilder};
use crate::core::target::TargetSpec;
use crate::config::defaults;
use crate::core::value::ConfigValue;
use crate::error::{ManifestError, PipelineError};
use crate::infra::filesystem;
use crate::infra::store::ArtifactStore;
use crate::infra::strip::StripTool;

/// Bumped whenever the layer manifest layout changes
const LAYER_FORMAT: &str = "1";

/// Bumped whenever the packaging of the primary output changes
const PACKAGE_FORMAT: &str = "1";

/// Directory injected files are staged under, inside the build directory
const INPUTS_DIR: &str = "inputs";

/// Progress notifications
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PipelineEvent {
    /// The layers are planned
    Planned { layers: usize },
    /// The sysroot is available
    SysrootReady { cached: bool },
    /// A layer build starts
    LayerStarted { index: usize, crates: Vec<String> },
    /// A layer is published
    LayerFinished { index: usize, cached: bool },
}

/// Progress callback
pub type ProgressFn = Arc<dyn Fn(PipelineEvent) + Send + Sync>;

/// Everything needed to build one layer
#[derive(Debug, Clone)]
pub struct LayerPlan {
    pub layer: BuildLayer,
    /// Merged manifest
    pub manifest: Manifest,
    /// Merged build configuration
    pub config: BuildConfig,
    /// Files staged next to the manifest
    pub files: BTreeMap<String, String>,
}

/// Result of a successful run
#[derive(Debug, Clone, Serialize)]
pub struct PipelineOutput {
    pub sysroot: Sysroot,
    pub layers: Vec<LayerArtifact>,
    /// Every named output, the primary binary included
    pub outputs: BTreeMap<String, PathBuf>,
    /// Name of the primary output
    pub primary_name: String,
    /// Path of the primary output
    pub primary: PathBuf,
}

/// Layered build of a crate graph
pub struct Pipeline {
    store: Arc<ArtifactStore>,
    primitive: Arc<dyn BuildPrimitive>,
    target: TargetSpec,
    profile: Profile,
    sysroot_overrides: Manifest,
    modifications: Vec<ModificationSet>,
    jobs: usize,
    binary: Option<String>,
    name: Option<String>,
    strip_tool: Option<StripTool>,
    progress: Option<ProgressFn>,
}

impl Pipeline {
    pub fn new(
        store: Arc<ArtifactStore>,
        primitive: Arc<dyn BuildPrimitive>,
        target: TargetSpec,
        profile: Profile,
    ) -> Self {
        Self {
            store,
            primitive,
            target,
            profile,
            sysroot_overrides: Manifest::new(),
            modifications: Vec::new(),
            jobs: num_cpus::get(),
            binary: None,
            name: None,
            strip_tool: None,
            progress: None,
        }
    }

    /// Extra manifest overrides for the sysroot build
    #[must_use]
    pub fn with_sysroot_overrides(mut self, overrides: Manifest) -> Self {
        self.sysroot_overrides = overrides;
        self
    }

    /// Ordered modification sets
    #[must_use]
    pub fn with_modifications(mut self, modifications: Vec<ModificationSet>) -> Self {
        self.modifications = modifications;
        self
    }

    /// Parallelism hint passed to the primitive
    #[must_use]
    pub fn with_jobs(mut self, jobs: usize) -> Self {
        self.jobs = jobs;
        self
    }

    /// Name of the primary output (defaults to the root crate name)
    #[must_use]
    pub fn with_binary(mut self, binary: Option<String>) -> Self {
        self.binary = binary;
        self
    }

    /// Project name used for the synthetic layer packages
    #[must_use]
    pub fn with_name(mut self, name: &str) -> Self {
        self.name = Some(name.to_string());
        self
    }

    /// Tool used to strip the primary output
    #[must_use]
    pub fn with_strip_tool(mut self, tool: Option<StripTool>) -> Self {
        self.strip_tool = tool;
        self
    }

    /// Receive progress notifications
    #[must_use]
    pub fn with_progress(mut self, progress: ProgressFn) -> Self {
        self.progress = Some(progress);
        self
    }

    pub fn target(&self) -> &TargetSpec {
        &self.target
    }

    pub fn profile(&self) -> &Profile {
        &self.profile
    }

    fn notify(&self, event: PipelineEvent) {
        if let Some(progress) = &self.progress {
            progress(event);
        }
    }

    fn sysroot_builder(&self) -> SysrootBuilder {
        SysrootBuilder::new(Arc::clone(&self.store), Arc::clone(&self.primitive))
            .with_jobs(self.jobs)
    }

    /// Start the sysroot build on a blocking task
    fn spawn_sysroot(&self) -> JoinHandle<Result<Sysroot, PipelineError>> {
        let builder = self.sysroot_builder();
        let target = self.target.clone();
        let profile = self.profile.clone();
        let overrides = self.sysroot_overrides.clone();

        tokio::task::spawn_blocking(move || builder.build(&target, &profile, &overrides))
    }

    /// Build the sysroot only
    pub async fn build_sysroot(&self) -> Result<Sysroot, PipelineError> {
        join(self.spawn_sysroot()).await
    }

    /// Build every layer of `graph` and resolve the outputs
    pub async fn run(&self, graph: &CrateGraph) -> Result<PipelineOutput, PipelineError> {
        // runs while the layers are planned
        let sysroot_task = self.spawn_sysroot();
        let layers = plan_layers(graph);
        tracing::info!(
            "Planned {} layers for {} crates",
            layers.len(),
            graph.local_crates().len()
        );
        self.notify(PipelineEvent::Planned {
            layers: layers.len(),
        });

        let sysroot = join(sysroot_task).await?;
        self.notify(PipelineEvent::SysrootReady {
            cached: sysroot.cached,
        });

        let mut artifacts: Vec<LayerArtifact> = Vec::with_capacity(layers.len());
        for layer in &layers {
            let artifact = self.build_layer(graph, layer, &sysroot, &artifacts).await?;
            artifacts.push(artifact);
        }

        let (primary_name, primary, outputs) = self.resolve_outputs(graph, &artifacts).await?;
        tracing::info!("Primary output {primary_name}: {}", primary.display());

        Ok(PipelineOutput {
            sysroot,
            layers: artifacts,
            outputs,
            primary_name,
            primary,
        })
    }

    /// Assemble the manifest, configuration and files of one layer.
    ///
    /// `sysroot` is the directory passed to `--sysroot`.
    pub fn plan_layer(
        &self,
        graph: &CrateGraph,
        layer: &BuildLayer,
        sysroot: &Path,
    ) -> Result<LayerPlan, PipelineError> {
        let index = layer.index;
        let config_error = |source: ManifestError| PipelineError::Config { index, source };
        let sets: Vec<&ModificationSet> = applicable(&self.modifications, layer).collect();
        if !sets.is_empty() {
            tracing::debug!(
                "Layer {index} modifications: {}",
                sets.iter().map(|s| s.name.as_str()).collect::<Vec<_>>().join(", ")
            );
        }

        // manifest
        let intrinsic = self.intrinsic_manifest(graph, layer)?;
        let overrides: Vec<Manifest> = sets.iter().filter_map(|s| s.manifest.clone()).collect();
        let manifest = intrinsic.merged(&overrides);

        // configuration
        let env = BuildEnvironment::for_layer(&self.target, sysroot.to_path_buf(), index)
            .with_jobs(self.jobs)
            .with_packages(layer.crate_names())
            .with_rustflags(manifest.rustflags(&self.target.triple));
        let mut config = sets
            .iter()
            .fold(env.to_config(), |acc, set| acc.merge(&set.config_overrides()));

        // injected files
        let mut files = BTreeMap::new();
        files.insert("src/lib.rs".to_string(), "#![no_std]\n".to_string());
        for file in sets.iter().flat_map(|s| s.inject.iter()) {
            let contents = file.contents()?;
            if let Some(var) = &file.env {
                let path = self.store.put_input(&file.name, &contents)?;
                config.insert_path(&["env", var.as_str()], path.display().to_string().into());
            }
            files.insert(format!("{INPUTS_DIR}/{}", file.name), contents);
        }

        let config = BuildConfig::from_value(&config).map_err(config_error)?;
        config.validate().map_err(config_error)?;

        Ok(LayerPlan {
            layer: layer.clone(),
            manifest,
            config,
            files,
        })
    }

    fn intrinsic_manifest(
        &self,
        graph: &CrateGraph,
        layer: &BuildLayer,
    ) -> Result<Manifest, PipelineError> {
        let project = self.name.as_deref().unwrap_or_else(|| graph.root_name());

        let mut manifest = Manifest::new();
        manifest.set(
            &["package", "name"],
            format!("{project}-layer-{}", layer.index).into(),
        );
        manifest.set(&["package", "version"], "0.0.0".into());
        manifest.set(&["package", "edition"], "2021".into());
        manifest.set(&["lib", "path"], "src/lib.rs".into());

        let mut crate_overrides = Vec::new();
        for krate in layer.crates.iter().chain(&layer.externals) {
            let features = graph.get(&krate.name).map(|n| n.features.clone()).unwrap_or_default();
            manifest.add_dependency(&krate.name, &krate.dependency_spec(&features));
        }
        for krate in &layer.crates {
            if let Some(node) = graph.get(&krate.name) {
                crate_overrides.push(node.manifest.clone());
            }
        }

        manifest.set_profile(&self.profile)?;
        manifest.set_rustflags(&self.target.triple, &self.target.rustflags);

        Ok(manifest.merged(&crate_overrides))
    }

    /// Cache key of a planned layer
    pub fn layer_key(
        &self,
        plan: &LayerPlan,
        sysroot_key: &str,
        prior: &[LayerArtifact],
    ) -> Result<String, PipelineError> {
        // parallelism never changes the output
        let mut keyed = plan.config.clone();
        keyed.jobs = 0;
        keyed.env.remove("CARGO_BUILD_JOBS");

        let render = |e: serde_json::Error| ManifestError::Render {
            error: e.to_string(),
        };
        let config_json = serde_json::to_string(&keyed).map_err(render)?;
        let target_json = ConfigValue::from_serialize(&self.target)?.to_json().to_string();
        let manifest_toml = plan.manifest.to_toml_string()?;

        let mut parts: Vec<String> = vec![
            LAYER_FORMAT.to_string(),
            manifest_toml,
            config_json,
            target_json,
            sysroot_key.to_string(),
        ];
        parts.push(self.target.spec_digest()?.unwrap_or_default());
        for krate in &plan.layer.crates {
            if let CrateSource::Local { path } = &krate.source {
                parts.push(format!("{}\0{}", krate.name, filesystem::content_digest(path)?));
            }
        }
        parts.extend(prior.iter().map(|a| a.key.clone()));
        parts.extend(plan.files.iter().map(|(name, contents)| format!("{name}\0{contents}")));

        Ok(ArtifactStore::compute_key(parts))
    }

    async fn build_layer(
        &self,
        graph: &CrateGraph,
        layer: &BuildLayer,
        sysroot: &Sysroot,
        prior: &[LayerArtifact],
    ) -> Result<LayerArtifact, PipelineError> {
        let index = layer.index;
        let crates = layer.crate_names();

        let plan = self.plan_layer(graph, layer, &sysroot.path)?;
        let key = self.layer_key(&plan, &sysroot.key, prior)?;
        tracing::debug!("Layer {index} key {key}");

        self.notify(PipelineEvent::LayerStarted {
            index,
            crates: crates.clone(),
        });

        let request = BuildRequest {
            kind: BuildKind::Layer {
                index,
                is_last: layer.is_last,
            },
            label: format!("layer {index}"),
            manifest: plan.manifest.to_cargo_toml_string()?,
            target: self.target.clone(),
            profile: self.profile.clone(),
            config: plan.config,
            sysroot: Some(sysroot.path.clone()),
            inputs: prior.iter().map(|a| a.path.clone()).collect(),
            files: plan.files,
            out_dir: PathBuf::new(),
        };

        let store = Arc::clone(&self.store);
        let primitive = Arc::clone(&self.primitive);
        let failed_crates = crates.clone();
        let task_key = key.clone();
        let publication = join(tokio::task::spawn_blocking(move || {
            store.publish_with(&task_key, move |out_dir| {
                tracing::info!("Building layer {index}: {}", failed_crates.join(", "));
                let mut request = request;
                request.out_dir = out_dir.to_path_buf();
                primitive
                    .build(&request)
                    .map_err(|e| PipelineError::LayerBuildFailure {
                        index,
                        crates: failed_crates,
                        output: e.output(),
                    })
            })
        }))
        .await?;

        let cached = publication.cached();
        if cached {
            tracing::info!("Layer {index} is up to date");
        }

        let artifact = LayerArtifact {
            index,
            key,
            path: publication.path,
            crates,
            outputs: BTreeMap::new(),
            metadata: BTreeMap::new(),
            strip: self.profile.settings.strip.unwrap_or(false),
            cached,
            target_dir: self.target.target_dir_name(),
            profile_dir: self.profile.dir_name().to_string(),
        };

        let artifact = applicable(&self.modifications, layer)
            .flat_map(|set| set.transforms.iter())
            .fold(artifact, |acc, transform| transform.apply(acc));

        self.notify(PipelineEvent::LayerFinished { index, cached });
        Ok(artifact)
    }

    #[allow(clippy::type_complexity)]
    async fn resolve_outputs(
        &self,
        graph: &CrateGraph,
        artifacts: &[LayerArtifact],
    ) -> Result<(String, PathBuf, BTreeMap<String, PathBuf>), PipelineError> {
        let primary_name = self
            .binary
            .clone()
            .unwrap_or_else(|| graph.root_name().to_string());

        let Some(last) = artifacts.last() else {
            return Err(PipelineError::Aborted {
                reason: "no layers were built".to_string(),
            });
        };

        let mut outputs = BTreeMap::new();
        for artifact in artifacts {
            for name in artifact.outputs.keys() {
                outputs.insert(name.clone(), output_of(artifact, name)?);
            }
        }

        let mut primary = output_of(last, &primary_name)?;
        if last.strip {
            primary = self.package_stripped(last, &primary_name, primary).await?;
        }
        outputs.insert(primary_name.clone(), primary.clone());

        Ok((primary_name, primary, outputs))
    }

    /// Publish a stripped copy of `path` and return where it landed
    async fn package_stripped(
        &self,
        artifact: &LayerArtifact,
        name: &str,
        path: PathBuf,
    ) -> Result<PathBuf, PipelineError> {
        let Some(tool) = self.strip_tool.clone() else {
            return Err(PipelineError::Packaging {
                name: name.to_string(),
                output: format!(
                    "no strip tool found; install llvm-strip or set {}",
                    defaults::ENV_STRIP
                ),
            });
        };

        let key =
            ArtifactStore::compute_key(["strip", PACKAGE_FORMAT, artifact.key.as_str(), name]);
        let store = Arc::clone(&self.store);
        let file_name = name.to_string();
        let publication = join(tokio::task::spawn_blocking(move || {
            store.publish_with(&key, move |out_dir| {
                tracing::info!("Stripping {file_name} with {}", tool.program().display());
                tool.strip(&path, &out_dir.join(&file_name))
                    .map_err(|e| PipelineError::Packaging {
                        name: file_name.clone(),
                        output: e.output(),
                    })
            })
        }))
        .await?;

        Ok(publication.path.join(name))
    }
}

/// Await a blocking build task, turning a panic or cancellation into an error
async fn join<T>(task: JoinHandle<Result<T, PipelineError>>) -> Result<T, PipelineError> {
    task.await.map_err(|e| PipelineError::Aborted {
        reason: e.to_string(),
    })?
}
