//! Check command implementation
//!
//! Implements `layerforge check` to validate the project without building:
//! the project file, the crate graph, the layer plan, local crate paths and
//! injected files.

use anyhow::Result;
use serde::Serialize;
use std::path::Path;

use crate::cli::output::{print_json, status, OutputConfig};
use crate::core::graph::CrateSource;
use crate::core::planner::{plan_layers, validate_layers};

use super::load_project;

#[derive(Debug, Serialize)]
struct CheckReport {
    project: String,
    target: String,
    profile: String,
    crates: usize,
    layers: usize,
    warnings: Vec<String>,
}

/// Execute the check command
pub async fn execute(project_dir: &Path) -> Result<()> {
    let project = load_project(project_dir)?;
    tracing::info!("Checking project: {}", project.name);

    let graph = project.graph()?;
    let layers = plan_layers(&graph);
    validate_layers(&graph, &layers)?;

    let mut warnings = Vec::new();
    for node in project.crates() {
        if graph.get(node.name()).is_none() {
            warnings.push(format!(
                "Crate '{}' is not reachable from root '{}'",
                node.name(),
                project.root
            ));
        }
        if let CrateSource::Local { path } = &node.krate.source {
            if !path.is_dir() {
                warnings.push(format!(
                    "Crate '{}' path does not exist: {}",
                    node.name(),
                    path.display()
                ));
            }
        }
    }
    for set in &project.modifications {
        for file in &set.inject {
            if let Err(e) = file.contents() {
                warnings.push(format!("Modification '{}': {e}", set.name));
            }
        }
    }

    let report = CheckReport {
        project: project.name.clone(),
        target: project.target.name.clone(),
        profile: project.profile.name.clone(),
        crates: graph.local_crates().len(),
        layers: layers.len(),
        warnings,
    };

    if OutputConfig::global().json {
        return print_json(&report);
    }
    if OutputConfig::global().quiet {
        return Ok(());
    }

    println!("Checking project '{}'...\n", report.project);
    println!("{} Project file is valid", status::SUCCESS);
    println!(
        "{} Crate graph is acyclic ({} local crates)",
        status::SUCCESS,
        report.crates
    );
    println!("{} {} layers planned", status::SUCCESS, report.layers);
    println!(
        "{} Target {} ({})",
        status::INFO,
        report.target,
        report.profile
    );
    for warning in &report.warnings {
        println!("{} {warning}", status::WARNING);
    }

    if report.warnings.is_empty() {
        println!("\n{} Project is ready to build", status::SUCCESS);
    } else {
        println!("\n{} Project has {} warnings", status::WARNING, report.warnings.len());
    }

    Ok(())
}
