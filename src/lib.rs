//! layerforge - layered builds of bare-metal Rust crate graphs
//!
//! This library builds a root crate and its local dependency graph in
//! dependency-ordered layers against a custom-built sysroot, caching every
//! layer in a content-addressed artifact store.
//!
//! # Architecture
//!
//! The crate is organized into several modules:
//!
//! - [`cli`] - Command-line interface parsing and output formatting
//! - [`core`] - Build model, planning and the layered pipeline
//! - [`infra`] - Infrastructure layer (artifact store, filesystem, processes)
//! - [`config`] - Configuration and constants
//! - [`error`] - Error types and handling

pub mod cli;
pub mod config;
pub mod core;
pub mod error;
pub mod infra;

#[cfg(test)]
pub mod test_utils;
