//! Artifact store management
//!
//! Reports and clears the shared artifact store.

use std::path::PathBuf;

use crate::error::StoreError;
use crate::infra::filesystem;
use crate::infra::store::ArtifactStore;

/// Store information
#[derive(Debug, serde::Serialize)]
pub struct StoreInfo {
    /// Store root
    pub path: PathBuf,
    /// Total size in bytes
    pub size_bytes: u64,
    /// Number of published artifacts
    pub artifact_count: usize,
    /// Whether the store exists
    pub exists: bool,
}

impl StoreInfo {
    /// Format size for display
    pub fn format_size(&self) -> String {
        format_size(self.size_bytes)
    }
}

/// Human readable byte count
pub fn format_size(bytes: u64) -> String {
    if bytes == 0 {
        "0 bytes".to_string()
    } else if bytes < 1024 {
        format!("{bytes} bytes")
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else if bytes < 1024 * 1024 * 1024 {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    } else {
        format!("{:.1} GB", bytes as f64 / (1024.0 * 1024.0 * 1024.0))
    }
}

/// Get store information
pub fn store_info(store: &ArtifactStore) -> StoreInfo {
    let path = store.root().to_path_buf();
    StoreInfo {
        exists: path.exists(),
        size_bytes: filesystem::dir_size(&path),
        artifact_count: store.keys().len(),
        path,
    }
}

/// Remove the whole store. Returns the number of bytes freed.
pub fn clean_store(store: &ArtifactStore) -> Result<u64, StoreError> {
    let path = store.root();
    if !path.exists() {
        return Ok(0);
    }

    let size_before = filesystem::dir_size(path);
    std::fs::remove_dir_all(path).map_err(|e| StoreError::Io {
        path: path.to_path_buf(),
        error: e.to_string(),
    })?;
    tracing::info!("Removed artifact store at {}", path.display());

    Ok(size_before)
}

/// Remove staging directories and lock files left behind by interrupted builds
pub fn clean_staging(store: &ArtifactStore) -> Result<usize, StoreError> {
    let removed = store.clean_staging()?;
    if removed > 0 {
        tracing::info!("Removed {removed} abandoned staging entries and stale locks");
    }
    Ok(removed)
}
