//! External command build primitive
//!
//! Runs a user supplied command in the output directory. The request is
//! staged next to it (`Cargo.toml`, request files, `request.json`) and
//! described through `LAYERFORGE_*` environment variables:
//!
//! | Variable | Value |
//! |----------|-------|
//! | `LAYERFORGE_KIND` | `sysroot` or `layer` |
//! | `LAYERFORGE_LABEL` | `sysroot`, `layer 2`, ... |
//! | `LAYERFORGE_OUT_DIR` | directory to fill |
//! | `LAYERFORGE_MANIFEST` | staged manifest |
//! | `LAYERFORGE_REQUEST` | full request as JSON |
//! | `LAYERFORGE_TARGET` | `--target` value |
//! | `LAYERFORGE_PROFILE` | profile name |
//! | `LAYERFORGE_PACKAGES` | space separated package names |
//! | `LAYERFORGE_JOBS` | parallelism hint |
//! | `LAYERFORGE_SYSROOT` | sysroot path, layers only |
//! | `LAYERFORGE_INPUTS` | earlier layer artifacts, path-list separated |

use std::process::Command;

use crate::core::primitive::{BuildKind, BuildOutput, BuildPrimitive, BuildRequest, PrimitiveError};
use crate::infra::process::{self, staging_error};

const REQUEST_FILE: &str = "request.json";

/// Runs an external build command
#[derive(Debug, Clone)]
pub struct CommandPrimitive {
    program: String,
    args: Vec<String>,
}

impl CommandPrimitive {
    /// Command line as program followed by arguments
    pub fn new(command: &[String]) -> Result<Self, PrimitiveError> {
        let (program, args) = command.split_first().ok_or_else(|| PrimitiveError::Spawn {
            program: String::new(),
            error: "empty build command".to_string(),
        })?;
        Ok(Self {
            program: program.clone(),
            args: args.to_vec(),
        })
    }

    fn stage(&self, request: &BuildRequest) -> Result<(), PrimitiveError> {
        let manifest = request.out_dir.join("Cargo.toml");
        std::fs::write(&manifest, &request.manifest).map_err(|e| staging_error(&manifest, &e))?;
        process::stage_files(&request.out_dir, &request.files)?;

        let json = serde_json::to_string_pretty(request).map_err(|e| PrimitiveError::Staging {
            error: e.to_string(),
        })?;
        let path = request.out_dir.join(REQUEST_FILE);
        std::fs::write(&path, json).map_err(|e| staging_error(&path, &e))
    }

    fn command(&self, request: &BuildRequest) -> Result<Command, PrimitiveError> {
        let kind = match request.kind {
            BuildKind::Sysroot => "sysroot",
            BuildKind::Layer { .. } => "layer",
        };
        let inputs = std::env::join_paths(&request.inputs).map_err(|e| PrimitiveError::Staging {
            error: e.to_string(),
        })?;

        let mut command = Command::new(&self.program);
        command
            .args(&self.args)
            .current_dir(&request.out_dir)
            .envs(&request.config.env)
            .env("LAYERFORGE_KIND", kind)
            .env("LAYERFORGE_LABEL", &request.label)
            .env("LAYERFORGE_OUT_DIR", &request.out_dir)
            .env("LAYERFORGE_MANIFEST", request.out_dir.join("Cargo.toml"))
            .env("LAYERFORGE_REQUEST", request.out_dir.join(REQUEST_FILE))
            .env("LAYERFORGE_TARGET", request.target.cargo_target())
            .env("LAYERFORGE_PROFILE", &request.profile.name)
            .env("LAYERFORGE_PACKAGES", request.packages().join(" "))
            .env("LAYERFORGE_JOBS", request.config.jobs.to_string())
            .env("LAYERFORGE_INPUTS", inputs);
        if let Some(sysroot) = &request.sysroot {
            command.env("LAYERFORGE_SYSROOT", sysroot);
        }
        Ok(command)
    }
}

impl BuildPrimitive for CommandPrimitive {
    fn name(&self) -> &str {
        &self.program
    }

    fn build(&self, request: &BuildRequest) -> Result<BuildOutput, PrimitiveError> {
        self.stage(request)?;
        let log = process::run(&mut self.command(request)?)?;
        Ok(BuildOutput { log })
    }
}
