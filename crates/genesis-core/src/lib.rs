//! # Genesis Core
//!
//! Core utilities shared by the Genesis crates:
//!
//! - **Process execution**: the [`process::Runner`] seam every external
//!   binary (secrets CLI, YAML merger, BOSH CLI, kit hooks) goes through
//! - **Terminal**: controlling-terminal detection and the
//!   [`term::Prompter`] sink for interactive questions
//! - **Filesystem**: transient workdir guard and atomic writes
//! - **Logging**: `tracing-subscriber` bootstrap

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod fs;
pub mod log;
pub mod process;
pub mod term;

pub use genesis_types::{GenesisError, Result};

/// Genesis application version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Genesis application name
pub const APP_NAME: &str = "genesis";
