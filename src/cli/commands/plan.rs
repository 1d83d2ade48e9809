//! Plan command implementation
//!
//! Implements `layerforge plan`: the layers the crate graph is built in and
//! the modification sets each of them receives.

use anyhow::Result;
use serde::Serialize;
use std::path::Path;

use crate::cli::output::{print_json, OutputConfig};
use crate::core::modification::applicable;
use crate::core::planner::plan_layers;

use super::load_project;

#[derive(Debug, Serialize)]
struct PlannedLayer {
    index: usize,
    crates: Vec<String>,
    externals: Vec<String>,
    modifications: Vec<String>,
    is_last: bool,
}

/// Execute the plan command
pub async fn execute(project_dir: &Path) -> Result<()> {
    let project = load_project(project_dir)?;
    let graph = project.graph()?;

    let planned: Vec<PlannedLayer> = plan_layers(&graph)
        .iter()
        .map(|layer| PlannedLayer {
            index: layer.index,
            crates: layer.crate_names(),
            externals: layer.externals.iter().map(|k| k.to_string()).collect(),
            modifications: applicable(&project.modifications, layer)
                .map(|set| set.name.clone())
                .collect(),
            is_last: layer.is_last,
        })
        .collect();

    let output = OutputConfig::global();
    if output.json {
        return print_json(&planned);
    }
    if output.quiet {
        return Ok(());
    }

    println!(
        "Build plan for '{}' ({}, {}):\n",
        project.name, project.target.name, project.profile.name
    );
    for layer in &planned {
        let marker = if layer.is_last { " (root)" } else { "" };
        println!("Layer {}{marker}: {}", layer.index, layer.crates.join(", "));
        if !layer.externals.is_empty() {
            println!("  external: {}", layer.externals.join(", "));
        }
        if !layer.modifications.is_empty() {
            println!("  modifications: {}", layer.modifications.join(", "));
        }
    }

    Ok(())
}
