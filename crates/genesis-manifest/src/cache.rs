//! Persisted manifest state under `.genesis/`.
//!
//! After a successful deploy the redacted manifest and variables file
//! are cached under `.genesis/manifests/`; pipelines propagate upstream
//! environment files through `.genesis/cached/<upstream>/`. The SHA-1 of
//! the cached manifest is published with the Exodus record and compared
//! on the next deploy to detect drift.

use genesis_types::Result;
use sha1::{Digest, Sha1};
use std::path::{Path, PathBuf};
use tracing::debug;

/// SHA-1 fingerprint, hex-encoded, of a manifest body.
pub fn manifest_sha1(content: &str) -> String {
    let mut hasher = Sha1::new();
    hasher.update(content.as_bytes());
    hex::encode(hasher.finalize())
}

/// Cached deployment state for one repo root.
#[derive(Debug)]
pub struct ManifestCache {
    root: PathBuf,
}

impl ManifestCache {
    /// Cache for the repo rooted at `root`.
    pub fn new(root: impl AsRef<Path>) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    fn manifests_dir(&self) -> PathBuf {
        self.root.join(".genesis").join("manifests")
    }

    /// Path of the cached redacted manifest for `env`.
    pub fn manifest_path(&self, env: &str) -> PathBuf {
        self.manifests_dir().join(format!("{}.yml", env))
    }

    /// Path of the cached redacted variables file for `env`.
    pub fn vars_path(&self, env: &str) -> PathBuf {
        self.manifests_dir().join(format!("{}.vars", env))
    }

    /// Path of the create-env state file for `env`.
    pub fn state_path(&self, env: &str) -> PathBuf {
        self.manifests_dir().join(format!("{}-state.yml", env))
    }

    /// Directory of environment files propagated from `upstream`.
    pub fn cached_dir(&self, upstream: &str) -> PathBuf {
        self.root.join(".genesis").join("cached").join(upstream)
    }

    /// An environment file pulled from an upstream cache, if present.
    pub fn cached_file(&self, upstream: &str, name: &str) -> Option<PathBuf> {
        let path = self.cached_dir(upstream).join(format!("{}.yml", name));
        path.is_file().then_some(path)
    }

    /// Store the redacted manifest for `env`; returns its SHA-1.
    pub fn store_manifest(&self, env: &str, content: &str) -> Result<String> {
        let path = self.manifest_path(env);
        genesis_core::fs::write_file(&path, content)?;
        let sha1 = manifest_sha1(content);
        debug!("cached manifest for {} ({})", env, sha1);
        Ok(sha1)
    }

    /// Store the redacted variables file for `env`.
    pub fn store_vars(&self, env: &str, content: &str) -> Result<()> {
        genesis_core::fs::write_file(self.vars_path(env), content)
    }

    /// The previously cached manifest, if any.
    pub fn load_manifest(&self, env: &str) -> Result<Option<String>> {
        let path = self.manifest_path(env);
        if !path.is_file() {
            return Ok(None);
        }
        genesis_core::fs::read_file(&path).map(Some)
    }

    /// Whether the local cached manifest has drifted from what the last
    /// recorded deployment published.
    pub fn drifted(&self, env: &str, published_sha1: &str) -> Result<bool> {
        match self.load_manifest(env)? {
            None => Ok(false),
            Some(cached) => Ok(manifest_sha1(&cached) != published_sha1),
        }
    }
}
