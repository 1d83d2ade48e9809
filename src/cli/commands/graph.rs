//! Graph command implementation
//!
//! Implements `layerforge graph` to display the crate graph.

use anyhow::Result;
use serde::Serialize;
use std::path::Path;

use crate::cli::output::{print_json, OutputConfig};
use crate::core::planner::plan_layers;
use crate::core::tree::DependencyTree;

use super::{load_project, GraphFormat};

#[derive(Debug, Serialize)]
struct GraphNode {
    name: String,
    version: String,
    local: bool,
    layer: Option<usize>,
    dependencies: Vec<String>,
}

/// Execute the graph command
pub async fn execute(project_dir: &Path, format: GraphFormat) -> Result<()> {
    let project = load_project(project_dir)?;
    let graph = project.graph()?;
    let tree = DependencyTree::from_graph(&graph).with_layers(&plan_layers(&graph));

    if OutputConfig::global().json {
        let nodes: Vec<GraphNode> = graph
            .nodes()
            .map(|node| GraphNode {
                name: node.name().to_string(),
                version: node.krate.version.clone(),
                local: node.krate.is_local(),
                layer: tree.layer_of(node.name()),
                dependencies: tree
                    .dependencies(node.name())
                    .map(|deps| deps.iter().map(|d| d.target.clone()).collect())
                    .unwrap_or_default(),
            })
            .collect();
        return print_json(&nodes);
    }

    match format {
        GraphFormat::Tree => print!("{}", tree.format_tree()),
        GraphFormat::Dot => print!("{}", tree.format_dot()),
    }

    Ok(())
}
