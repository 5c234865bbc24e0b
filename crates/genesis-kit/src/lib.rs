//! # Genesis Kit
//!
//! A kit is an external, versioned bundle of manifest fragments, hook
//! scripts, and a metadata declaration of required secrets. The engine
//! treats it as mostly opaque: metadata subtrees are interpreted by the
//! secret plan parser, hooks are black-box executables obeying the
//! documented environment contract, and fragment selection is the kit's
//! own business (via its blueprint hook when present).

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod hook;
pub mod metadata;

pub use hook::{HookResult, HookRunner};
pub use metadata::KitMetadata;

use genesis_core::process::Runner;
use genesis_types::{GenesisError, HookType, Result};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// A kit on disk: metadata plus hooks plus manifest fragments.
pub struct Kit {
    root: PathBuf,
    meta: KitMetadata,
    hooks: HookRunner,
}

impl Kit {
    /// Load the kit rooted at `root`.
    pub fn load(root: impl AsRef<Path>) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        let meta = KitMetadata::load(&root)?;
        let hooks = HookRunner::new(&root);
        Ok(Self { root, meta, hooks })
    }

    /// Kit directory.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Parsed metadata.
    pub fn metadata(&self) -> &KitMetadata {
        &self.meta
    }

    /// Hook access.
    pub fn hooks(&self) -> &HookRunner {
        &self.hooks
    }

    /// Manifest fragment files for the enabled features, in merge order.
    ///
    /// When the kit supplies a blueprint hook its output (one relative
    /// path per line) is authoritative and the ordering is opaque to the
    /// engine. Without one, the kit convention is `base.yml` followed by
    /// `features/<feature>.yml` per enabled feature.
    pub fn fragments(
        &self,
        runner: &dyn Runner,
        features: &[String],
        env: &BTreeMap<String, String>,
        workdir: &Path,
    ) -> Result<Vec<PathBuf>> {
        if self.hooks.has(HookType::Blueprint) {
            let result =
                self.hooks
                    .run_required(runner, HookType::Blueprint, &[], env, workdir)?;
            return result
                .lines()
                .into_iter()
                .map(|rel| {
                    let path = self.root.join(&rel);
                    if path.is_file() {
                        Ok(path)
                    } else {
                        Err(GenesisError::Manifest(format!(
                            "Kit blueprint named {} but the kit has no such file",
                            rel
                        )))
                    }
                })
                .collect();
        }

        let mut files = Vec::new();
        let base = self.root.join("base.yml");
        if base.is_file() {
            files.push(base);
        }
        for feature in features {
            let path = self.root.join("features").join(format!("{}.yml", feature));
            if path.is_file() {
                files.push(path);
            } else {
                return Err(GenesisError::Manifest(format!(
                    "Kit {} has no fragment for feature '{}'",
                    self.meta.name, feature
                )));
            }
        }
        Ok(files)
    }

    /// The user-facing feature list, passed through the kit's features
    /// hook when it has one.
    ///
    /// Features the hook emits may start with `+` (kit-internal toggles);
    /// user-declared features must not.
    pub fn resolve_features(
        &self,
        runner: &dyn Runner,
        declared: &[String],
        env: &BTreeMap<String, String>,
        workdir: &Path,
    ) -> Result<Vec<String>> {
        for feature in declared {
            if feature.starts_with('+') {
                return Err(GenesisError::Config(format!(
                    "Feature '{}' may only be emitted by the kit itself, not \
                     declared in the environment",
                    feature
                )));
            }
        }

        if !self.hooks.has(HookType::Features) {
            return Ok(declared.to_vec());
        }

        let result = self.hooks.run_required(
            runner,
            HookType::Features,
            declared,
            env,
            workdir,
        )?;
        Ok(result.lines())
    }
}
