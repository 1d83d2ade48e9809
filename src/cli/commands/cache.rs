//! CLI command for `layerforge cache`
//!
//! Reports on and clears the shared artifact store.

use anyhow::Result;

use crate::cli::output::{print_json, print_status, status, OutputConfig};
use crate::core::cache::{clean_staging, clean_store, format_size, store_info};

use super::{load_global, open_store};

/// Execute cache info subcommand
pub async fn execute_info() -> Result<()> {
    let (dirs, global) = load_global()?;
    let info = store_info(&open_store(&dirs, &global));

    if OutputConfig::global().json {
        return print_json(&info);
    }
    if OutputConfig::global().quiet {
        return Ok(());
    }

    println!("Artifact Store\n");
    println!("Location: {}", info.path.display());
    println!("Size: {}", info.format_size());
    println!("Artifacts: {}", info.artifact_count);

    if !info.exists {
        println!("\n{} Store directory does not exist (empty store)", status::WARNING);
    }

    Ok(())
}

/// Execute cache clean subcommand
pub async fn execute_clean(staging_only: bool) -> Result<()> {
    let (dirs, global) = load_global()?;
    let store = open_store(&dirs, &global);

    if staging_only {
        let removed = clean_staging(&store)?;
        if OutputConfig::global().json {
            return print_json(&serde_json::json!({ "staging_removed": removed }));
        }
        print_status(
            status::SUCCESS,
            &format!("Removed {removed} staging entries and stale locks"),
        );
        return Ok(());
    }

    let freed = clean_store(&store)?;
    if OutputConfig::global().json {
        return print_json(&serde_json::json!({ "bytes_freed": freed }));
    }
    if freed > 0 {
        print_status(
            status::SUCCESS,
            &format!("Store cleared ({} freed)", format_size(freed)),
        );
    } else {
        print_status(status::SUCCESS, "Store was already empty");
    }
    Ok(())
}
