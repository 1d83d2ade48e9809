//! Common test utilities and helpers
//!
//! This module provides shared utilities for integration tests.

#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::process::{Command, Output};
use std::sync::Mutex;

use tempfile::TempDir;

use layerforge::core::primitive::{BuildOutput, BuildPrimitive, BuildRequest, PrimitiveError};

/// Test project context
///
/// Creates a temporary directory for test projects and provides
/// utilities for setting up test scenarios. Every project gets its own
/// cache and config directories so tests never touch the user's store.
pub struct TestProject {
    /// Temporary directory for the test project
    pub dir: TempDir,
    /// Cache and config directories used by the binary
    pub home: TempDir,
}

impl TestProject {
    /// Create a new test project in a temporary directory
    pub fn new() -> Self {
        Self {
            dir: TempDir::new().expect("Failed to create temp directory"),
            home: TempDir::new().expect("Failed to create temp directory"),
        }
    }

    /// Create a project with the sample layout: `layerforge.toml` plus one
    /// directory per local crate
    pub fn sample() -> Self {
        let project = Self::new();
        project.create_file("layerforge.toml", SAMPLE_PROJECT);
        for krate in ["app", "net", "timers"] {
            project.create_file(&format!("crates/{krate}/src/lib.rs"), "#![no_std]\n");
        }
        project
    }

    /// Get the path to the test project directory
    pub fn path(&self) -> PathBuf {
        self.dir.path().to_path_buf()
    }

    /// Store root the binary uses for this project
    pub fn store_dir(&self) -> PathBuf {
        self.home.path().join("cache").join("store")
    }

    /// Create a file in the test project
    pub fn create_file(&self, name: &str, content: &str) {
        let path = self.dir.path().join(name);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).expect("Failed to create parent directories");
        }
        std::fs::write(path, content).expect("Failed to write file");
    }

    /// Check if a file exists in the test project
    pub fn file_exists(&self, name: &str) -> bool {
        self.dir.path().join(name).exists()
    }

    /// Read a file from the test project
    pub fn read_file(&self, name: &str) -> String {
        std::fs::read_to_string(self.dir.path().join(name)).expect("Failed to read file")
    }

    /// Command running the layerforge binary inside the project
    pub fn command(&self) -> Command {
        let mut cmd = Command::new(env!("CARGO_BIN_EXE_layerforge"));
        cmd.current_dir(self.path())
            .env("LAYERFORGE_CACHE_DIR", self.home.path().join("cache"))
            .env("LAYERFORGE_CONFIG_DIR", self.home.path().join("config"))
            .env("LAYERFORGE_DATA_DIR", self.home.path().join("data"))
            .env_remove("RUST_LOG");
        cmd
    }

    /// Run layerforge with arguments
    pub fn run(&self, args: &[&str]) -> Output {
        self.command()
            .args(args)
            .output()
            .expect("Failed to execute layerforge")
    }
}

impl Default for TestProject {
    fn default() -> Self {
        Self::new()
    }
}

/// Combined stdout and stderr
pub fn combined(output: &Output) -> String {
    format!(
        "{}{}",
        String::from_utf8_lossy(&output.stdout),
        String::from_utf8_lossy(&output.stderr)
    )
}

/// Sample project: app -> {net, timers}, net -> smoltcp (external)
pub const SAMPLE_PROJECT: &str = r#"
[project]
name = "demo"
root = "app"

[target]
triple = "aarch64-unknown-none"

[crates.app]
path = "crates/app"
dependencies = ["net", "timers"]

[crates.net]
path = "crates/net"
dependencies = ["smoltcp"]
features = ["tcp"]

[crates.timers]
path = "crates/timers"

[crates.smoltcp]
version = "0.10"

[[modifications]]
name = "image"
scope = "last"
env = { IMAGE_NAME = "demo.img" }
inject = [{ name = "config.json", json = { uart = 1 }, env = "CONFIG_PATH" }]
"#;

/// Shell script for the `command` primitive that writes one file per
/// package at the conventional output location
pub const FAKE_BUILD_SCRIPT: &str = r#"set -e
mkdir -p "target/$LAYERFORGE_TARGET/release"
for p in $LAYERFORGE_PACKAGES; do
  echo "$LAYERFORGE_LABEL" > "target/$LAYERFORGE_TARGET/release/$p"
done
if [ -n "$CONFIG_PATH" ]; then cp "$CONFIG_PATH" seen-config.json; fi
"#;

/// Build primitive that records requests and writes a file per package
#[derive(Default)]
pub struct RecordingPrimitive {
    pub requests: Mutex<Vec<BuildRequest>>,
    pub fail_on: Vec<String>,
}

impl RecordingPrimitive {
    pub fn failing_on(label: &str) -> Self {
        Self {
            requests: Mutex::new(Vec::new()),
            fail_on: vec![label.to_string()],
        }
    }

    pub fn labels(&self) -> Vec<String> {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .map(|r| r.label.clone())
            .collect()
    }

    pub fn request(&self, label: &str) -> BuildRequest {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .find(|r| r.label == label)
            .cloned()
            .unwrap_or_else(|| panic!("no request labelled {label}"))
    }
}

impl BuildPrimitive for RecordingPrimitive {
    fn name(&self) -> &str {
        "recording"
    }

    fn build(&self, request: &BuildRequest) -> Result<BuildOutput, PrimitiveError> {
        self.requests.lock().unwrap().push(request.clone());

        if self.fail_on.contains(&request.label) {
            return Err(PrimitiveError::Failed {
                program: "recording".to_string(),
                status: "exit status: 101".to_string(),
                output: format!("error: could not compile ({})", request.label),
            });
        }

        let dir = output_dir(&request.out_dir, request);
        std::fs::create_dir_all(&dir).unwrap();
        for package in request.packages() {
            std::fs::write(dir.join(package), &request.label).unwrap();
        }
        Ok(BuildOutput::default())
    }
}

fn output_dir(out_dir: &Path, request: &BuildRequest) -> PathBuf {
    out_dir
        .join("target")
        .join(request.target.target_dir_name())
        .join(request.profile.dir_name())
}
