//! The build primitive seam
//!
//! The pipeline never compiles anything itself. It describes each build as a
//! hermetic [`BuildRequest`] and hands it to a [`BuildPrimitive`], which
//! fills `out_dir` or fails with the tool output.

use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::Serialize;
use thiserror::Error;

use crate::core::build_env::BuildConfig;
use crate::core::profile::Profile;
use crate::core::target::TargetSpec;

/// What a request builds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum BuildKind {
    /// The standard library for the target
    Sysroot,
    /// One planned layer
    Layer { index: usize, is_last: bool },
}

/// A hermetic build description
#[derive(Debug, Clone, Serialize)]
pub struct BuildRequest {
    pub kind: BuildKind,
    /// Human-readable label for logs ("sysroot", "layer 2")
    pub label: String,
    /// Rendered Cargo-style manifest
    pub manifest: String,
    pub target: TargetSpec,
    pub profile: Profile,
    /// Merged build configuration
    pub config: BuildConfig,
    /// Sysroot the build compiles against
    pub sysroot: Option<PathBuf>,
    /// Published artifacts of earlier layers, in order
    pub inputs: Vec<PathBuf>,
    /// Extra files to stage next to the manifest, by relative path
    pub files: BTreeMap<String, String>,
    /// Directory the primitive must fill
    pub out_dir: PathBuf,
}

impl BuildRequest {
    /// Package names passed to the build tool
    pub fn packages(&self) -> &[String] {
        &self.config.packages
    }
}

/// Result of a successful build
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BuildOutput {
    /// Combined tool output
    pub log: String,
}

/// Build primitive errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PrimitiveError {
    /// The build tool could not be started
    #[error("Failed to run '{program}': {error}")]
    Spawn { program: String, error: String },

    /// The build tool ran and failed
    #[error("'{program}' exited with {status}:\n{output}")]
    Failed {
        program: String,
        status: String,
        output: String,
    },

    /// Inputs could not be staged
    #[error("Failed to stage build inputs: {error}")]
    Staging { error: String },
}

impl PrimitiveError {
    /// Tool output to report verbatim
    pub fn output(&self) -> String {
        match self {
            Self::Failed { output, .. } => output.clone(),
            other => other.to_string(),
        }
    }
}

/// Turns a build request into a filled output directory
pub trait BuildPrimitive: Send + Sync {
    /// Short name for logs
    fn name(&self) -> &str;

    /// Run the build. On success `request.out_dir` holds the artifact.
    fn build(&self, request: &BuildRequest) -> Result<BuildOutput, PrimitiveError>;
}
