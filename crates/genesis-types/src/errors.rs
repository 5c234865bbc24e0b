//! Error types for Genesis operations.

use thiserror::Error;

/// The main error type for Genesis operations.
///
/// Variants follow the engine's error taxonomy: configuration problems
/// are never recovered, dependency problems are fatal at startup, store
/// problems carry remedial instructions, plan validation failures become
/// error plans, and subprocess failures preserve the raw output.
#[derive(Error, Debug)]
pub enum GenesisError {
    /// Missing or malformed environment file, invalid plan record,
    /// unknown reaction type.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Missing external binary or incompatible version.
    #[error("Dependency error: {0}")]
    Dependency(String),

    /// Credentials store unreachable, unauthenticated, or sealed.
    #[error("Store error: {0}")]
    Store(String),

    /// A secret plan that failed field validation.
    #[error("Plan error: {0}")]
    Plan(String),

    /// Non-zero exit during plan execution; the subprocess output is
    /// carried verbatim.
    #[error("Execution error: {0}")]
    Exec(String),

    /// Cyclical or ambiguous CA signage detected by the plan orderer.
    #[error("Cycle error: {0}")]
    Cycle(String),

    /// Returned by the BOSH driver.
    #[error("Deploy error: {0}")]
    Deploy(String),

    /// Kit hook or reaction script failure.
    #[error("Hook execution error: {0}")]
    Hook(String),

    /// Manifest generation or merge failure.
    #[error("Manifest error: {0}")]
    Manifest(String),

    /// Environment composition failure.
    #[error("Environment error: {0}")]
    Environment(String),

    /// I/O error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// YAML parsing error
    #[error("YAML parsing error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// JSON parsing error
    #[error("JSON parsing error: {0}")]
    Json(#[from] serde_json::Error),

    /// Internal bug - should never happen in production
    #[error("Bug detected: {0}\n\nThis is an internal error. Please report this issue at:\nhttps://github.com/genesis-community/genesis/issues")]
    Bug(String),

    /// Generic error with context
    #[error("{0}")]
    Other(String),
}

/// A specialized Result type for Genesis operations.
pub type Result<T> = std::result::Result<T, GenesisError>;

/// Helper macro to create and return a GenesisError::Bug
///
/// This should be used for conditions that should never occur
/// in normal operation and indicate a bug in Genesis itself.
#[macro_export]
macro_rules! bug {
    ($msg:expr) => {
        return Err($crate::GenesisError::Bug($msg.to_string()))
    };
    ($fmt:expr, $($arg:tt)*) => {
        return Err($crate::GenesisError::Bug(format!($fmt, $($arg)*)))
    };
}

/// Helper macro to bail out with a GenesisError
///
/// This is used for expected error conditions.
///
/// # Example
///
/// ```ignore
/// if !valid {
///     bail!(Config, "invalid environment file: {}", reason);
/// }
/// ```
#[macro_export]
macro_rules! bail {
    ($variant:ident, $msg:expr) => {
        return Err($crate::GenesisError::$variant($msg.to_string()))
    };
    ($variant:ident, $fmt:expr, $($arg:tt)*) => {
        return Err($crate::GenesisError::$variant(format!($fmt, $($arg)*)))
    };
    ($msg:expr) => {
        return Err($crate::GenesisError::Other($msg.to_string()))
    };
    ($fmt:expr, $($arg:tt)*) => {
        return Err($crate::GenesisError::Other(format!($fmt, $($arg)*)))
    };
}
