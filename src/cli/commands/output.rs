//! Output command implementation
//!
//! Implements `layerforge output [NAME]`: prints the path of a named output
//! recorded by the last successful build.

use anyhow::{Context, Result};
use std::path::Path;

use crate::cli::output::{print_json, OutputConfig};
use crate::core::record::BuildRecord;
use crate::error::PipelineError;

/// Execute the output command
pub async fn execute(project_dir: &Path, name: Option<&str>) -> Result<()> {
    let record = BuildRecord::load(project_dir)
        .context("No build record found. Run 'layerforge build' first.")?;

    let name = name.unwrap_or(&record.primary);
    let path = record
        .output(Some(name))
        .cloned()
        .ok_or_else(|| PipelineError::ArtifactNotFound {
            name: name.to_string(),
            path: project_dir.join(crate::core::record::RECORD_FILE),
        })?;

    if !path.exists() {
        return Err(PipelineError::ArtifactNotFound {
            name: name.to_string(),
            path,
        }
        .into());
    }

    if OutputConfig::global().json {
        return print_json(&serde_json::json!({ "name": name, "path": path }));
    }

    println!("{}", path.display());
    Ok(())
}
