//! # Genesis Manifest
//!
//! Manifest plumbing for Genesis: the adapter over the external YAML
//! merge tool, the adaptive merge loop that defers unresolvable
//! operators, and the `.genesis/` cache of deployed manifests with
//! SHA-1 drift detection.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod adaptive;
pub mod cache;
pub mod merge;

pub use adaptive::{adaptive_merge, MAX_ADAPTIVE_PASSES};
pub use cache::{manifest_sha1, ManifestCache};
pub use merge::{MergeOptions, Merger, SpruceMerger};
