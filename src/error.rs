//! Error types for layerforge
//!
//! Domain-specific error types using thiserror.

use std::path::PathBuf;
use thiserror::Error;

/// Crate graph errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GraphError {
    /// Dependency cycle between crates
    #[error("Dependency cycle detected: {}", cycle.join(" -> "))]
    CycleDetected { cycle: Vec<String> },

    /// A crate names a dependency that is not part of the crate set
    #[error("Missing dependency: '{dependency}' required by '{krate}'")]
    MissingDependency { krate: String, dependency: String },

    /// The root crate is not part of the crate set
    #[error("Root crate '{name}' is not declared")]
    UnknownRoot { name: String },

    /// The root crate must be built from local sources
    #[error("Root crate '{name}' is external; the root must be a local crate")]
    ExternalRoot { name: String },

    /// The same crate was declared twice
    #[error("Crate '{name}' is declared more than once")]
    DuplicateCrate { name: String },

    /// A layer plan puts a dependency in the same or a later layer
    #[error(
        "Crate '{krate}' in layer {layer} depends on '{dependency}' which is not in an earlier layer"
    )]
    LayerOrderViolation {
        krate: String,
        dependency: String,
        layer: usize,
    },
}

/// Manifest and value tree errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ManifestError {
    /// A manifest must be a table at its root
    #[error("Manifest root must be a table, found {found}")]
    NotATable { found: String },

    /// Malformed replace marker
    #[error("Invalid '$replace' marker at '{path}': {reason}")]
    InvalidReplace { path: String, reason: String },

    /// Value could not be converted into the expected configuration shape
    #[error("Invalid configuration at '{path}': {error}")]
    InvalidConfig { path: String, error: String },

    /// Rendering to TOML failed
    #[error("Failed to render manifest: {error}")]
    Render { error: String },

    /// Parsing TOML failed
    #[error("Failed to parse manifest: {error}")]
    Parse { error: String },
}

/// Project file (layerforge.toml) errors
#[derive(Error, Debug)]
pub enum ProjectError {
    /// Project file not found
    #[error("Project file not found at '{path}'. Create a layerforge.toml to describe the build.")]
    NotFound { path: PathBuf },

    /// IO error reading a project file
    #[error("IO error for '{path}': {error}")]
    Io { path: PathBuf, error: String },

    /// TOML syntax or structure error
    #[error("Failed to parse '{path}': {error}")]
    Parse { path: PathBuf, error: String },

    /// `extends` chain loops back on itself
    #[error("Circular 'extends' chain: {}", chain.join(" -> "))]
    CircularExtends { chain: Vec<String> },

    /// Invalid field value
    #[error("Invalid value for '{field}': {reason}")]
    InvalidField { field: String, reason: String },

    /// Manifest override error
    #[error(transparent)]
    Manifest(#[from] ManifestError),

    /// Crate graph error
    #[error(transparent)]
    Graph(#[from] GraphError),
}

/// Artifact store errors
#[derive(Error, Debug)]
pub enum StoreError {
    /// Another writer holds the lock for this key
    #[error("Timed out after {seconds}s waiting for lock '{path}' held by another build")]
    LockTimeout { path: PathBuf, seconds: u64 },

    /// Filesystem error inside the store
    #[error("Store IO error for '{path}': {error}")]
    Io { path: PathBuf, error: String },
}

/// Pipeline errors
///
/// Every variant aborts the pipeline. Nothing is retried.
#[derive(Error, Debug)]
pub enum PipelineError {
    /// Sysroot construction failed
    #[error("Sysroot build failed for target '{target}' ({profile}):\n{output}")]
    ToolchainBuildFailure {
        target: String,
        profile: String,
        output: String,
    },

    /// A layer build failed
    #[error("Layer {index} [{}] failed to build:\n{output}", crates.join(", "))]
    LayerBuildFailure {
        index: usize,
        crates: Vec<String>,
        output: String,
    },

    /// An expected output is missing after a successful build
    #[error("Artifact '{name}' not found at '{path}'")]
    ArtifactNotFound { name: String, path: PathBuf },

    /// The primary output could not be packaged
    #[error("Failed to package output '{name}':\n{output}")]
    Packaging { name: String, output: String },

    /// A generated input file could not be prepared
    #[error("Failed to inject '{name}': {error}")]
    Injection { name: String, error: String },

    /// Layer configuration could not be assembled
    #[error("Invalid configuration for layer {index}: {source}")]
    Config {
        index: usize,
        source: ManifestError,
    },

    /// A manifest could not be built or rendered
    #[error("Invalid manifest: {0}")]
    Manifest(#[from] ManifestError),

    /// A build task was cancelled or panicked
    #[error("Build task aborted: {reason}")]
    Aborted { reason: String },

    /// Artifact store error
    #[error(transparent)]
    Store(#[from] StoreError),

    /// Build inputs could not be read
    #[error(transparent)]
    Filesystem(#[from] FilesystemError),
}

/// Filesystem errors
#[derive(Error, Debug)]
pub enum FilesystemError {
    /// Failed to create directory
    #[error("Failed to create directory '{path}': {error}")]
    CreateDir { path: PathBuf, error: String },

    /// Failed to remove directory
    #[error("Failed to remove directory '{path}': {error}")]
    RemoveDir { path: PathBuf, error: String },

    /// Failed to write file
    #[error("Failed to write file '{path}': {error}")]
    WriteFile { path: PathBuf, error: String },

    /// Failed to read file
    #[error("Failed to read file '{path}': {error}")]
    ReadFile { path: PathBuf, error: String },

    /// Failed to copy a tree
    #[error("Failed to copy '{from}' to '{to}': {error}")]
    Copy {
        from: PathBuf,
        to: PathBuf,
        error: String,
    },
}

/// Top-level layerforge error type
#[derive(Error, Debug)]
pub enum LayerforgeError {
    /// Project file error
    #[error("Project error: {0}")]
    Project(#[from] ProjectError),

    /// Crate graph error
    #[error("Graph error: {0}")]
    Graph(#[from] GraphError),

    /// Manifest error
    #[error("Manifest error: {0}")]
    Manifest(#[from] ManifestError),

    /// Pipeline error
    #[error("Build error: {0}")]
    Pipeline(#[from] PipelineError),

    /// Store error
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// Filesystem error
    #[error("Filesystem error: {0}")]
    Filesystem(#[from] FilesystemError),

    /// IO error
    #[error("IO error: {source}")]
    Io { source: std::io::Error },

    /// Generic error
    #[error("{0}")]
    Generic(String),
}
