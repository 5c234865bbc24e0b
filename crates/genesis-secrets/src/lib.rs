//! # Genesis Secrets
//!
//! The secrets plan engine: parses a declarative specification of
//! required credentials out of kit metadata, orders X.509 plans by
//! signing dependency (detecting cycles), executes lifecycle actions
//! against the credentials store, and validates materialized secrets.
//!
//! The pipeline is strictly serial: plans are processed in the order the
//! orderer produced, so a CA is always materialized before any of its
//! dependents, and per-item progress is well-defined.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod executor;
pub mod order;
pub mod parser;
pub mod plan;
pub mod validator;

pub use executor::{Executor, ItemResult, NullSink, ProgressEvent, ProgressSink, Summary};
pub use parser::{parse, ParseOptions};
pub use plan::{SecretPlan, SelfSigned};
pub use validator::Validator;
