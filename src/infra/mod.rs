//! Infrastructure layer
//!
//! Handles all I/O operations: the artifact store, the filesystem, and the
//! external processes behind the build primitives and output packaging.

pub mod cargo;
pub mod command;
pub mod dirs;
pub mod filesystem;
pub mod process;
pub mod store;
pub mod strip;
