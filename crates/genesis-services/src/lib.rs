//! # Genesis Services
//!
//! Clients for the external collaborators of Genesis:
//!
//! - [`vault`]: the Store Client, a typed session over the secrets CLI
//! - [`target`]: the registry of known credentials-store targets
//! - [`context`]: the explicit per-run context replacing process-wide
//!   singletons
//! - [`bosh`]: the BOSH CLI driver (deploy, create-env, configs,
//!   stemcells)
//! - [`configs`]: the deployment-time config fetcher
//! - [`credhub`]: credhub connection assembly and lookups
//!
//! Everything here shells out through [`genesis_core::process::Runner`];
//! nothing speaks to a remote API directly.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod bosh;
pub mod configs;
pub mod context;
pub mod credhub;
pub mod target;
pub mod vault;

pub use bosh::{Bosh, BoshConnection};
pub use configs::ConfigSet;
pub use context::Context;
pub use credhub::CredhubInfo;
pub use target::{StoreTarget, TargetRegistry};
pub use vault::{StoreExport, Vault};
