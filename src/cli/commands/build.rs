//! Build command implementation
//!
//! Implements `layerforge build`: builds the sysroot and every layer, then
//! writes the build record next to the project file.

use anyhow::{Context, Result};
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use crate::cli::output::{create_layer_bar, print_json, print_status, status, OutputConfig};
use crate::core::pipeline::PipelineEvent;
use crate::core::record::BuildRecord;

use super::{load_global, load_project, open_store, pipeline, select_primitive, BuildArgs, Settings};

/// Execute the build command
pub async fn execute(project_dir: &Path, args: &BuildArgs) -> Result<()> {
    let start = Instant::now();

    let project = load_project(project_dir)?;
    let graph = project.graph()?;
    let (dirs, global) = load_global()?;
    let settings = Settings::resolve(args, &project, &global);
    let primitive = select_primitive(&settings)?;
    let store = open_store(&dirs, &global);

    tracing::info!(
        "Building '{}' for {} ({}) with {} jobs using {}",
        project.name,
        project.target.name,
        project.profile.name,
        settings.jobs,
        primitive.name()
    );

    let bar = create_layer_bar(0);
    bar.set_message("sysroot");
    let progress_bar = bar.clone();
    let progress = Arc::new(move |event: PipelineEvent| match event {
        PipelineEvent::Planned { layers } => progress_bar.set_length(layers as u64),
        PipelineEvent::SysrootReady { cached } => {
            progress_bar.println(format!(
                "{} sysroot{}",
                status::SUCCESS,
                if cached { " (cached)" } else { "" }
            ));
        }
        PipelineEvent::LayerStarted { index, crates } => {
            progress_bar.set_message(format!("layer {index}: {}", crates.join(", ")));
        }
        PipelineEvent::LayerFinished { index, cached } => {
            progress_bar.println(format!(
                "{} layer {index}{}",
                status::SUCCESS,
                if cached { " (cached)" } else { "" }
            ));
            progress_bar.inc(1);
        }
    });

    let result = pipeline(&project, store, primitive, settings.jobs)
        .with_progress(progress)
        .run(&graph)
        .await;
    bar.finish_and_clear();
    let output = result?;

    let record = BuildRecord::from_output(&output);
    let record_path = record
        .save(&project.dir)
        .context("Failed to write build record")?;
    tracing::debug!("Build record written to {}", record_path.display());

    if OutputConfig::global().json {
        return print_json(&output);
    }

    let built = output.layers.iter().filter(|l| !l.cached).count();
    print_status(
        status::SUCCESS,
        &format!(
            "Built {} layers ({} rebuilt) in {:.1}s",
            output.layers.len(),
            built,
            start.elapsed().as_secs_f64()
        ),
    );
    print_status(
        status::INFO,
        &format!("{}: {}", output.primary_name, output.primary.display()),
    );
    for (name, path) in &output.outputs {
        if *name != output.primary_name {
            print_status(status::INFO, &format!("{name}: {}", path.display()));
        }
    }

    Ok(())
}
