//! `cargo` build primitive
//!
//! Stages the request manifest in the output directory and runs
//! `cargo build` against it. Layers reuse the `target/` directory of the
//! previous layer so already built dependencies are not rebuilt. Sysroot
//! builds additionally lay out their rlibs as
//! `lib/rustlib/<target>/lib`, the shape `--sysroot` expects.

use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::OnceLock;

use walkdir::WalkDir;

use crate::config::defaults;
use crate::core::primitive::{BuildKind, BuildOutput, BuildPrimitive, BuildRequest, PrimitiveError};
use crate::core::sysroot::RUST_SRC_PLACEHOLDER;
use crate::infra::filesystem;
use crate::infra::process::{self, staging_error};

const TARGET_DIR: &str = "target";

/// Runs `cargo build`
#[derive(Debug)]
pub struct CargoPrimitive {
    cargo: PathBuf,
    rust_src: OnceLock<PathBuf>,
}

impl CargoPrimitive {
    /// Locate `cargo` through `$CARGO` or `PATH`
    pub fn new() -> Result<Self, PrimitiveError> {
        let cargo = match std::env::var_os(defaults::ENV_CARGO) {
            Some(path) => PathBuf::from(path),
            None => which::which("cargo").map_err(|e| PrimitiveError::Spawn {
                program: "cargo".to_string(),
                error: e.to_string(),
            })?,
        };
        Ok(Self::with_cargo(cargo))
    }

    /// Use a specific `cargo` binary
    pub fn with_cargo(cargo: impl Into<PathBuf>) -> Self {
        Self {
            cargo: cargo.into(),
            rust_src: OnceLock::new(),
        }
    }

    /// Use a specific `rust-src` checkout instead of asking `rustc`
    #[must_use]
    pub fn with_rust_src(self, rust_src: impl Into<PathBuf>) -> Self {
        let _ = self.rust_src.set(rust_src.into());
        self
    }

    fn rust_src(&self) -> Result<&Path, PrimitiveError> {
        if let Some(path) = self.rust_src.get() {
            return Ok(path);
        }
        let path = match std::env::var_os(defaults::ENV_RUST_SRC) {
            Some(path) => PathBuf::from(path),
            None => {
                let sysroot = process::run(Command::new("rustc").args(["--print", "sysroot"]))?;
                PathBuf::from(sysroot.trim())
                    .join("lib")
                    .join("rustlib")
                    .join("src")
                    .join("rust")
            }
        };
        if !path.join("library").is_dir() {
            return Err(PrimitiveError::Staging {
                error: format!(
                    "rust-src not found at '{}'. Install it with `rustup component add rust-src` or set {}",
                    path.display(),
                    defaults::ENV_RUST_SRC
                ),
            });
        }
        Ok(self.rust_src.get_or_init(|| path))
    }

    /// Write the manifest and request files into `out_dir`
    fn stage(&self, request: &BuildRequest) -> Result<(), PrimitiveError> {
        let mut manifest = request.manifest.clone();
        if manifest.contains(RUST_SRC_PLACEHOLDER) {
            let rust_src = self.rust_src()?.display().to_string();
            manifest = manifest.replace(RUST_SRC_PLACEHOLDER, &rust_src);
        }

        let manifest_path = request.out_dir.join("Cargo.toml");
        std::fs::write(&manifest_path, manifest).map_err(|e| staging_error(&manifest_path, &e))?;
        process::stage_files(&request.out_dir, &request.files)?;

        // Every layer builds a library target; cargo needs a source for it
        let lib = request.out_dir.join("src").join("lib.rs");
        if !lib.exists() {
            if let Some(parent) = lib.parent() {
                std::fs::create_dir_all(parent).map_err(|e| staging_error(parent, &e))?;
            }
            std::fs::write(&lib, "#![no_std]\n").map_err(|e| staging_error(&lib, &e))?;
        }

        if let Some(previous) = request.inputs.last() {
            let previous_target = previous.join(TARGET_DIR);
            if previous_target.is_dir() {
                tracing::debug!("Seeding target directory from {}", previous.display());
                filesystem::copy_dir_all(&previous_target, &request.out_dir.join(TARGET_DIR))
                    .map_err(|e| PrimitiveError::Staging {
                        error: e.to_string(),
                    })?;
            }
        }

        Ok(())
    }

    fn command(&self, request: &BuildRequest) -> Command {
        let mut command = Command::new(&self.cargo);
        command
            .arg("build")
            .arg("--manifest-path")
            .arg(request.out_dir.join("Cargo.toml"))
            .arg("--target")
            .arg(request.target.cargo_target())
            .arg("--target-dir")
            .arg(request.out_dir.join(TARGET_DIR))
            .arg("--jobs")
            .arg(request.config.jobs.to_string())
            .arg("--profile")
            .arg(&request.profile.name);
        for package in request.packages() {
            command.arg("-p").arg(package);
        }
        command.args(&request.config.args);

        command.env_remove("RUSTFLAGS");
        command.envs(&request.config.env);
        command.current_dir(&request.out_dir);
        command
    }

    /// Copy the built rlibs into the `--sysroot` layout and drop the rest
    fn lay_out_sysroot(&self, request: &BuildRequest) -> Result<(), PrimitiveError> {
        let deps = request
            .out_dir
            .join(TARGET_DIR)
            .join(request.target.target_dir_name())
            .join(request.profile.dir_name())
            .join("deps");
        let lib_dir = request
            .out_dir
            .join("lib")
            .join("rustlib")
            .join(request.target.target_dir_name())
            .join("lib");
        std::fs::create_dir_all(&lib_dir).map_err(|e| staging_error(&lib_dir, &e))?;

        let mut copied = 0;
        for entry in WalkDir::new(&deps).max_depth(1).into_iter().filter_map(Result::ok) {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("rlib") {
                continue;
            }
            let dest = lib_dir.join(entry.file_name());
            std::fs::copy(path, &dest).map_err(|e| staging_error(&dest, &e))?;
            copied += 1;
        }
        tracing::debug!("Copied {copied} rlibs into {}", lib_dir.display());

        let target = request.out_dir.join(TARGET_DIR);
        filesystem::remove_dir_all(&target).map_err(|e| PrimitiveError::Staging {
            error: e.to_string(),
        })
    }
}

impl BuildPrimitive for CargoPrimitive {
    fn name(&self) -> &str {
        "cargo"
    }

    fn build(&self, request: &BuildRequest) -> Result<BuildOutput, PrimitiveError> {
        self.stage(request)?;
        let log = process::run(&mut self.command(request))?;
        if request.kind == BuildKind::Sysroot {
            self.lay_out_sysroot(request)?;
        }
        Ok(BuildOutput { log })
    }
}
