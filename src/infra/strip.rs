//! Symbol stripping for packaged outputs
//!
//! Layers are always compiled with symbols. Stripping happens when an
//! output is packaged, so a transform can keep symbols without a rebuild.

use std::path::{Path, PathBuf};
use std::process::Command;

use crate::config::defaults;
use crate::core::primitive::PrimitiveError;
use crate::infra::process;

/// A `strip`-compatible tool (`--strip-all -o <out> <in>`)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StripTool {
    program: PathBuf,
}

impl StripTool {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }

    /// `$LAYERFORGE_STRIP`, then the first known tool on `PATH`
    pub fn find() -> Option<Self> {
        if let Some(program) = std::env::var_os(defaults::ENV_STRIP) {
            return Some(Self::new(program));
        }
        defaults::STRIP_TOOLS
            .iter()
            .find_map(|tool| which::which(tool).ok())
            .map(Self::new)
    }

    pub fn program(&self) -> &Path {
        &self.program
    }

    /// Write a stripped copy of `input` to `output`
    pub fn strip(&self, input: &Path, output: &Path) -> Result<(), PrimitiveError> {
        let mut command = Command::new(&self.program);
        command.arg("--strip-all").arg("-o").arg(output).arg(input);
        process::run(&mut command)?;
        Ok(())
    }
}
