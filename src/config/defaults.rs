//! Default configuration values

/// Default build primitive
pub const DEFAULT_PRIMITIVE: &str = "cargo";

/// Seconds a writer waits for another writer of the same artifact
pub const LOCK_TIMEOUT_SECS: u64 = 30 * 60;

/// Environment variable pointing at the toolchain's `rust-src` directory
pub const ENV_RUST_SRC: &str = "LAYERFORGE_RUST_SRC";

/// Environment variable selecting the `cargo` binary
pub const ENV_CARGO: &str = "CARGO";

/// Environment variable selecting the symbol strip tool
pub const ENV_STRIP: &str = "LAYERFORGE_STRIP";

/// Strip tools looked up on `PATH`, in order
pub const STRIP_TOOLS: &[&str] = &["llvm-strip", "rust-strip", "strip"];
