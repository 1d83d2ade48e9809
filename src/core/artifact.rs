//! Layer artifacts and the output accessor
//!
//! A [`LayerArtifact`] describes a published, immutable layer build. Post-build
//! transforms return a new description; they never touch the files behind it.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::error::PipelineError;

/// A published layer build
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LayerArtifact {
    /// Layer index
    pub index: usize,
    /// Store key
    pub key: String,
    /// Published directory
    pub path: PathBuf,
    /// Local crates built by the layer
    pub crates: Vec<String>,
    /// Named outputs, relative to `path`
    #[serde(default)]
    pub outputs: BTreeMap<String, PathBuf>,
    /// Free-form metadata set by transforms
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
    /// Whether packaging strips symbols from the primary output
    pub strip: bool,
    /// Whether the artifact came from the store without building
    pub cached: bool,
    /// Directory name of the target under `target/`
    pub target_dir: String,
    /// Directory name of the profile under `target/<target>/`
    pub profile_dir: String,
}

impl LayerArtifact {
    /// Conventional location of a build product named `name`
    pub fn conventional_path(&self, name: &str) -> PathBuf {
        self.path
            .join("target")
            .join(&self.target_dir)
            .join(&self.profile_dir)
            .join(name)
    }

    /// Expose `relative` under `name`
    #[must_use]
    pub fn with_output(mut self, name: &str, relative: &Path) -> Self {
        self.outputs.insert(name.to_string(), relative.to_path_buf());
        self
    }
}

/// Locate the named output of an artifact.
///
/// Outputs exposed by a transform win; otherwise `name` is looked up at the
/// conventional location inside the artifact.
pub fn output_of(artifact: &LayerArtifact, name: &str) -> Result<PathBuf, PipelineError> {
    let path = match artifact.outputs.get(name) {
        Some(relative) => artifact.path.join(relative),
        None => artifact.conventional_path(name),
    };

    if path.exists() {
        Ok(path)
    } else {
        Err(PipelineError::ArtifactNotFound {
            name: name.to_string(),
            path,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn artifact(path: &Path) -> LayerArtifact {
        LayerArtifact {
            index: 2,
            key: "ab12".to_string(),
            path: path.to_path_buf(),
            crates: vec!["app".to_string()],
            outputs: BTreeMap::new(),
            metadata: BTreeMap::new(),
            strip: true,
            cached: false,
            target_dir: "aarch64-unknown-none".to_string(),
            profile_dir: "release".to_string(),
        }
    }

    #[test]
    fn test_conventional_location() {
        let temp = TempDir::new().unwrap();
        let bin = temp
            .path()
            .join("target/aarch64-unknown-none/release/app.elf");
        std::fs::create_dir_all(bin.parent().unwrap()).unwrap();
        std::fs::write(&bin, b"\x7fELF").unwrap();

        let found = output_of(&artifact(temp.path()), "app.elf").unwrap();
        assert_eq!(found, bin);
    }

    #[test]
    fn test_exposed_output_wins() {
        let temp = TempDir::new().unwrap();
        std::fs::create_dir_all(temp.path().join("image")).unwrap();
        std::fs::write(temp.path().join("image/loader.img"), b"img").unwrap();

        let art = artifact(temp.path()).with_output("image", Path::new("image/loader.img"));

        assert_eq!(
            output_of(&art, "image").unwrap(),
            temp.path().join("image/loader.img")
        );
    }

    #[test]
    fn test_missing_output_is_reported_with_path() {
        let temp = TempDir::new().unwrap();
        let err = output_of(&artifact(temp.path()), "app.elf").unwrap_err();
        match err {
            PipelineError::ArtifactNotFound { name, path } => {
                assert_eq!(name, "app.elf");
                assert!(path.ends_with("target/aarch64-unknown-none/release/app.elf"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }
}
