//! Build record handling
//!
//! The build record (layerforge.lock) is written after every successful run.
//! It names the sysroot and layer artifacts by key and lists the named
//! outputs, so later commands can find them without rebuilding.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::core::pipeline::PipelineOutput;
use crate::error::ProjectError;

/// Build record file name
pub const RECORD_FILE: &str = "layerforge.lock";

/// Current record format version
const RECORD_VERSION: u32 = 1;

/// Record of the last successful build
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BuildRecord {
    /// Record format version
    pub version: u32,

    /// layerforge version that wrote the record
    pub tool_version: String,

    /// Target name
    pub target: String,

    /// Profile name
    pub profile: String,

    pub sysroot: RecordedArtifact,

    /// Layers in build order
    #[serde(default)]
    pub layers: Vec<RecordedLayer>,

    /// Name of the primary output
    pub primary: String,

    /// Named outputs, the primary included
    #[serde(default)]
    pub outputs: BTreeMap<String, PathBuf>,
}

/// A recorded store artifact
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RecordedArtifact {
    pub key: String,
    pub path: PathBuf,
}

/// A recorded layer
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RecordedLayer {
    pub index: usize,
    pub key: String,
    pub path: PathBuf,
    /// Crates built by the layer
    #[serde(default)]
    pub crates: Vec<String>,
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
    /// Whether the layer's products were packaged stripped
    #[serde(default)]
    pub strip: bool,
}

impl BuildRecord {
    /// Record a finished pipeline run
    pub fn from_output(output: &PipelineOutput) -> Self {
        Self {
            version: RECORD_VERSION,
            tool_version: env!("CARGO_PKG_VERSION").to_string(),
            target: output.sysroot.target.name.clone(),
            profile: output.sysroot.profile.name.clone(),
            sysroot: RecordedArtifact {
                key: output.sysroot.key.clone(),
                path: output.sysroot.path.clone(),
            },
            layers: output
                .layers
                .iter()
                .map(|layer| RecordedLayer {
                    index: layer.index,
                    key: layer.key.clone(),
                    path: layer.path.clone(),
                    crates: layer.crates.clone(),
                    metadata: layer.metadata.clone(),
                    strip: layer.strip,
                })
                .collect(),
            primary: output.primary_name.clone(),
            outputs: output.outputs.clone(),
        }
    }

    /// Parse from TOML string
    pub fn from_toml(content: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(content)
    }

    /// Serialize to TOML string
    pub fn to_toml(&self) -> Result<String, toml::ser::Error> {
        toml::to_string_pretty(self)
    }

    /// Load the record from a project directory
    pub fn load(project_dir: &Path) -> Result<Self, ProjectError> {
        let path = project_dir.join(RECORD_FILE);
        if !path.exists() {
            return Err(ProjectError::NotFound { path });
        }
        let content = std::fs::read_to_string(&path).map_err(|e| ProjectError::Io {
            path: path.clone(),
            error: e.to_string(),
        })?;
        Self::from_toml(&content).map_err(|e| ProjectError::Parse {
            path,
            error: e.to_string(),
        })
    }

    /// Write the record into a project directory
    pub fn save(&self, project_dir: &Path) -> Result<PathBuf, ProjectError> {
        let path = project_dir.join(RECORD_FILE);
        let content = self.to_toml().map_err(|e| ProjectError::Parse {
            path: path.clone(),
            error: e.to_string(),
        })?;
        std::fs::write(&path, content).map_err(|e| ProjectError::Io {
            path: path.clone(),
            error: e.to_string(),
        })?;
        Ok(path)
    }

    /// Path of a named output; the primary output when `name` is None
    pub fn output(&self, name: Option<&str>) -> Option<&PathBuf> {
        self.outputs.get(name.unwrap_or(&self.primary))
    }
}
