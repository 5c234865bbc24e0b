//! # Genesis Environment
//!
//! Environment composition and deployment orchestration:
//!
//! - [`environment`]: the composer — name-hierarchy file sequences,
//!   generated prologue/epilogue, parameter and manifest views, dotted
//!   lookups
//! - [`exodus`]: flattening, interpolation, and publication of the
//!   metadata record a successful deploy leaves behind
//! - [`deployment`]: the reactor driving check → manifest → hooks →
//!   reactions → deploy → exodus

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod deployment;
pub mod environment;
pub mod exodus;

pub use deployment::{DeployOptions, DeployOutcome, Reactor};
pub use environment::{BoshEnvRef, EnvConfig, Environment, Reaction, Reactions};
pub use exodus::Exodus;
