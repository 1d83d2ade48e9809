//! Manifest command implementation
//!
//! Implements `layerforge manifest` to print the fully merged manifest of a
//! layer (or of the sysroot) exactly as the build primitive receives it.

use anyhow::{bail, Result};
use serde::Serialize;
use std::path::Path;
use std::sync::Arc;

use crate::cli::output::{print_json, OutputConfig};
use crate::core::build_env::BuildConfig;
use crate::core::planner::plan_layers;
use crate::core::primitive::{BuildOutput, BuildPrimitive, BuildRequest, PrimitiveError};
use crate::core::sysroot::{sysroot_key, sysroot_manifest};

use super::{load_global, load_project, open_store, pipeline};

#[derive(Debug, Serialize)]
struct RenderedManifest {
    layer: Option<usize>,
    manifest: String,
    config: Option<BuildConfig>,
    files: Vec<String>,
}

/// Stands in for the build primitive; rendering never builds
struct NoBuild;

impl BuildPrimitive for NoBuild {
    fn name(&self) -> &str {
        "none"
    }

    fn build(&self, request: &BuildRequest) -> Result<BuildOutput, PrimitiveError> {
        Err(PrimitiveError::Spawn {
            program: self.name().to_string(),
            error: format!("{} was not expected to build", request.label),
        })
    }
}

/// Execute the manifest command
pub async fn execute(project_dir: &Path, layer: Option<usize>, sysroot: bool) -> Result<()> {
    let project = load_project(project_dir)?;

    let rendered = if sysroot {
        let manifest =
            sysroot_manifest(&project.target, &project.profile, &project.sysroot_overrides)?;
        RenderedManifest {
            layer: None,
            manifest: manifest.to_cargo_toml_string()?,
            config: None,
            files: Vec::new(),
        }
    } else {
        let graph = project.graph()?;
        let layers = plan_layers(&graph);
        let index = layer.unwrap_or(layers.len().saturating_sub(1));
        let Some(planned) = layers.get(index) else {
            bail!(
                "Layer {index} does not exist; the project has {} layers",
                layers.len()
            );
        };

        // the sysroot path the layer would be built against
        let (dirs, global) = load_global()?;
        let store = open_store(&dirs, &global);
        let key = sysroot_key(&project.target, &project.profile, &project.sysroot_overrides)?;
        let sysroot_path = store.artifact_path(&key);

        let pipeline = pipeline(&project, store, Arc::new(NoBuild), global.build_jobs());
        let plan = pipeline.plan_layer(&graph, planned, &sysroot_path)?;

        RenderedManifest {
            layer: Some(index),
            manifest: plan.manifest.to_cargo_toml_string()?,
            files: plan.files.keys().cloned().collect(),
            config: Some(plan.config),
        }
    };

    if OutputConfig::global().json {
        return print_json(&rendered);
    }

    print!("{}", rendered.manifest);
    if let Some(config) = &rendered.config {
        if !OutputConfig::global().quiet {
            println!();
            println!("# jobs = {}", config.jobs);
            println!("# packages = {}", config.packages.join(" "));
            for (key, value) in &config.env {
                println!("# env {key}={value}");
            }
            for file in &rendered.files {
                println!("# file {file}");
            }
        }
    }

    Ok(())
}
