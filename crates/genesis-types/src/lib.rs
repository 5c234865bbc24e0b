//! # Genesis Types
//!
//! Core types, enums, and errors shared across all Genesis crates.
//!
//! This crate provides the fundamental building blocks for the Genesis
//! deployment orchestrator, including:
//!
//! - Type-safe wrappers for environment names, versions, and kit ids
//! - Common enums for secret actions, check outcomes, store health, and
//!   kit hook types
//! - Error types and result aliases
//!
//! ## Example
//!
//! ```
//! use genesis_types::{EnvName, SemVer};
//!
//! // Create a validated environment name
//! let env = EnvName::new("us-west-prod").unwrap();
//! assert_eq!(env.ancestors().len(), 3);
//!
//! // Parse a semantic version
//! let version = SemVer::parse("2.8.5").unwrap();
//! assert_eq!(version.major, 2);
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod enums;
pub mod errors;
pub mod identifiers;

// Re-export common types for convenience
pub use enums::{CheckStatus, HookType, SecretAction, StoreHealth};
pub use errors::{GenesisError, Result};
pub use identifiers::{EnvName, KitId, SemVer};
