//! Core business logic module
//!
//! This module contains the build model and the pipeline. Filesystem and
//! process access go through [`crate::infra`].
//!
//! # Submodules
//!
//! - [`value`] - Tagged configuration tree and deep merge
//! - [`graph`] - Crate graph model
//! - [`manifest`] - Cargo-style manifests and the manifest merger
//! - [`profile`] - Build profiles
//! - [`target`] - Target specification
//! - [`planner`] - Layer planning by dependency depth
//! - [`build_env`] - Build environment and configuration
//! - [`primitive`] - The build primitive seam
//! - [`sysroot`] - Sysroot construction
//! - [`modification`] - Scoped modification sets and transforms
//! - [`artifact`] - Layer artifacts and the output accessor
//! - [`pipeline`] - The layered build pipeline
//! - [`project`] - Project file (layerforge.toml) handling
//! - [`record`] - Build record (layerforge.lock) handling
//! - [`tree`] - Crate graph visualization
//! - [`cache`] - Artifact store management
//! - [`global_config`] - Global configuration management

pub mod artifact;
pub mod build_env;
pub mod cache;
pub mod global_config;
pub mod graph;
pub mod manifest;
pub mod modification;
pub mod pipeline;
pub mod planner;
pub mod primitive;
pub mod profile;
pub mod project;
pub mod record;
pub mod sysroot;
pub mod target;
pub mod tree;
pub mod value;
