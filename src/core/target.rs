//! Target specification
//!
//! Describes the bare-metal target every layer and the sysroot are built for.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{FilesystemError, ProjectError};
use crate::infra::filesystem;

/// Target selected for a build. Immutable once the pipeline starts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetSpec {
    /// Human-readable name (e.g. "aarch64-sel4-microkit")
    pub name: String,

    /// Target triple (e.g. "aarch64-unknown-none")
    pub triple: String,

    /// Custom target definition (JSON), for targets rustc does not ship
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub spec_path: Option<PathBuf>,

    /// Extra compiler flags passed to every crate
    #[serde(default)]
    pub rustflags: Vec<String>,

    /// Linker override
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub linker: Option<String>,
}

impl TargetSpec {
    /// Target from a built-in triple
    pub fn new(triple: &str) -> Self {
        Self {
            name: triple.to_string(),
            triple: triple.to_string(),
            spec_path: None,
            rustflags: Vec::new(),
            linker: None,
        }
    }

    /// Use a custom JSON target definition
    #[must_use]
    pub fn with_spec_path(mut self, path: PathBuf) -> Self {
        self.spec_path = Some(path);
        self
    }

    /// Append compiler flags
    #[must_use]
    pub fn with_rustflags<I, S>(mut self, flags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.rustflags.extend(flags.into_iter().map(Into::into));
        self
    }

    /// Value passed to `--target`: the spec path for custom targets,
    /// the triple otherwise
    pub fn cargo_target(&self) -> String {
        match &self.spec_path {
            Some(path) => path.display().to_string(),
            None => self.triple.clone(),
        }
    }

    /// Directory name cargo uses under `target/` for this target
    pub fn target_dir_name(&self) -> String {
        self.spec_path
            .as_deref()
            .and_then(Path::file_stem)
            .and_then(|stem| stem.to_str())
            .map_or_else(|| self.triple.clone(), str::to_string)
    }

    /// Flags appended after the manifest's compiler flags when a crate is
    /// built against a custom sysroot
    pub fn sysroot_flags(&self, sysroot: &Path) -> Vec<String> {
        let mut flags = Vec::new();
        if let Some(linker) = &self.linker {
            flags.push("-C".to_string());
            flags.push(format!("linker={linker}"));
        }
        flags.push("--sysroot".to_string());
        flags.push(sysroot.display().to_string());
        flags
    }

    /// Digest of the custom target definition, None for built-in triples
    pub fn spec_digest(&self) -> Result<Option<String>, FilesystemError> {
        self.spec_path
            .as_deref()
            .map(filesystem::content_digest)
            .transpose()
    }

    /// Check that required fields are present
    pub fn validate(&self) -> Result<(), ProjectError> {
        if self.triple.trim().is_empty() {
            return Err(ProjectError::InvalidField {
                field: "target.triple".to_string(),
                reason: "cannot be empty".to_string(),
            });
        }
        if let Some(path) = &self.spec_path {
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                return Err(ProjectError::InvalidField {
                    field: "target.spec_path".to_string(),
                    reason: format!("expected a .json target definition, got '{}'", path.display()),
                });
            }
        }
        Ok(())
    }
}
