//! Filesystem operations
//!
//! Handles file and directory operations used by the store and the build
//! primitives, and the content digests cache keys are computed from.

use std::path::Path;

use sha2::{Digest, Sha256};

use crate::error::FilesystemError;

/// Build output and VCS directories, never part of a source digest
const DIGEST_SKIPPED_DIRS: &[&str] = &["target", ".git"];

/// Create a directory and all parent directories
pub fn create_dir_all(path: &Path) -> Result<(), FilesystemError> {
    std::fs::create_dir_all(path).map_err(|e| FilesystemError::CreateDir {
        path: path.to_path_buf(),
        error: e.to_string(),
    })
}

/// Remove a directory and all its contents
pub fn remove_dir_all(path: &Path) -> Result<(), FilesystemError> {
    if path.exists() {
        std::fs::remove_dir_all(path).map_err(|e| FilesystemError::RemoveDir {
            path: path.to_path_buf(),
            error: e.to_string(),
        })?;
    }
    Ok(())
}

/// Write content to a file
pub fn write_file(path: &Path, content: &str) -> Result<(), FilesystemError> {
    if let Some(parent) = path.parent() {
        create_dir_all(parent)?;
    }
    std::fs::write(path, content).map_err(|e| FilesystemError::WriteFile {
        path: path.to_path_buf(),
        error: e.to_string(),
    })
}

/// Read content from a file
pub fn read_file(path: &Path) -> Result<String, FilesystemError> {
    std::fs::read_to_string(path).map_err(|e| FilesystemError::ReadFile {
        path: path.to_path_buf(),
        error: e.to_string(),
    })
}

/// Recursively copy `from` into `to`, creating `to` if needed
pub fn copy_dir_all(from: &Path, to: &Path) -> Result<(), FilesystemError> {
    create_dir_all(to)?;
    for entry in walkdir::WalkDir::new(from).min_depth(1) {
        let entry = entry.map_err(|e| FilesystemError::ReadFile {
            path: from.to_path_buf(),
            error: e.to_string(),
        })?;
        let Ok(relative) = entry.path().strip_prefix(from) else {
            continue;
        };
        let dest = to.join(relative);
        if entry.file_type().is_dir() {
            create_dir_all(&dest)?;
        } else {
            if let Some(parent) = dest.parent() {
                create_dir_all(parent)?;
            }
            std::fs::copy(entry.path(), &dest).map_err(|e| FilesystemError::Copy {
                from: entry.path().to_path_buf(),
                to: dest.clone(),
                error: e.to_string(),
            })?;
        }
    }
    Ok(())
}

/// Total size in bytes of the files under `path`
pub fn dir_size(path: &Path) -> u64 {
    if !path.exists() {
        return 0;
    }

    walkdir::WalkDir::new(path)
        .into_iter()
        .filter_map(Result::ok)
        .filter(|e| e.file_type().is_file())
        .filter_map(|e| e.metadata().ok())
        .map(|m| m.len())
        .sum()
}

/// Digest of the files under `path`: relative paths and contents, in
/// sorted order, skipping `target/` and `.git/`.
///
/// A single file digests its contents. A missing path digests as empty.
pub fn content_digest(path: &Path) -> Result<String, FilesystemError> {
    let mut hasher = Sha256::new();
    if !path.exists() {
        return Ok(hex::encode(hasher.finalize()));
    }

    let walker = walkdir::WalkDir::new(path)
        .follow_links(true)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| {
            e.depth() == 0
                || !e.file_type().is_dir()
                || !e
                    .file_name()
                    .to_str()
                    .is_some_and(|name| DIGEST_SKIPPED_DIRS.contains(&name))
        });

    for entry in walker {
        let entry = entry.map_err(|e| FilesystemError::ReadFile {
            path: path.to_path_buf(),
            error: e.to_string(),
        })?;
        if !entry.file_type().is_file() {
            continue;
        }

        let relative = entry.path().strip_prefix(path).unwrap_or(entry.path());
        let name = relative.to_string_lossy();
        let contents = std::fs::read(entry.path()).map_err(|e| FilesystemError::ReadFile {
            path: entry.path().to_path_buf(),
            error: e.to_string(),
        })?;

        hasher.update((name.len() as u64).to_le_bytes());
        hasher.update(name.as_bytes());
        hasher.update((contents.len() as u64).to_le_bytes());
        hasher.update(&contents);
    }

    Ok(hex::encode(hasher.finalize()))
}
