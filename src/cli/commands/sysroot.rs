//! Sysroot command implementation
//!
//! Implements `layerforge sysroot` to build (or find) the sysroot alone.

use anyhow::Result;
use std::path::Path;

use crate::cli::output::{create_spinner, print_json, print_status, status, OutputConfig};

use super::{load_global, load_project, open_store, pipeline, select_primitive, BuildArgs, Settings};

/// Execute the sysroot command
pub async fn execute(project_dir: &Path, args: &BuildArgs) -> Result<()> {
    let project = load_project(project_dir)?;
    let (dirs, global) = load_global()?;
    let settings = Settings::resolve(args, &project, &global);
    let primitive = select_primitive(&settings)?;
    let store = open_store(&dirs, &global);

    let spinner = create_spinner(&format!(
        "Building sysroot for {} ({})",
        project.target.name, project.profile.name
    ));
    let result = pipeline(&project, store, primitive, settings.jobs)
        .build_sysroot()
        .await;
    spinner.finish_and_clear();
    let sysroot = result?;

    if OutputConfig::global().json {
        return print_json(&sysroot);
    }

    let state = if sysroot.cached { "up to date" } else { "built" };
    print_status(
        status::SUCCESS,
        &format!("Sysroot {state}: {}", sysroot.path.display()),
    );
    Ok(())
}
