//! Kit metadata parsing.
//!
//! The `kit.yml` tree is mostly opaque to the engine; only the
//! `certificates.<feature>` and `credentials.<feature>` subtrees, the
//! version gate, and the required-config declarations are interpreted.

use genesis_types::{GenesisError, KitId, Result, SemVer};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::debug;

/// Kit metadata from `kit.yml`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KitMetadata {
    /// Kit name
    pub name: String,

    /// Kit version
    pub version: String,

    /// Kit author
    #[serde(default)]
    pub author: String,

    /// Kit description
    #[serde(default)]
    pub description: String,

    /// Minimum Genesis version required to operate this kit
    #[serde(default)]
    pub genesis_version_min: Option<String>,

    /// Declarative secret specifications, grouped by feature name.
    /// Interpreted by the secret plan parser; carried opaquely here.
    #[serde(default)]
    pub certificates: serde_json::Value,

    /// Non-certificate secret specifications, grouped by feature name.
    #[serde(default)]
    pub credentials: serde_json::Value,

    /// Director configs this kit requires before deploying, as
    /// `type` or `type/name` entries.
    #[serde(default)]
    pub required_configs: Vec<String>,
}

impl KitMetadata {
    /// Load metadata from a kit directory's `kit.yml`.
    pub fn load(kit_dir: impl AsRef<Path>) -> Result<Self> {
        let path = kit_dir.as_ref().join("kit.yml");
        if !path.exists() {
            return Err(GenesisError::Config(format!(
                "Kit directory {} has no kit.yml",
                kit_dir.as_ref().display()
            )));
        }

        let content = genesis_core::fs::read_file(&path)?;
        let meta: Self = serde_yaml::from_str(&content).map_err(|e| {
            GenesisError::Config(format!("Malformed kit.yml in {}: {}", path.display(), e))
        })?;

        if meta.name.is_empty() {
            return Err(GenesisError::Config(format!(
                "kit.yml in {} does not declare a name",
                path.display()
            )));
        }
        Ok(meta)
    }

    /// Kit identifier.
    pub fn id(&self) -> Result<KitId> {
        Ok(KitId {
            name: self.name.clone(),
            version: SemVer::parse(&self.version)?,
        })
    }

    /// Whether the kit declares compatibility with engine behavior
    /// introduced in `version`.
    ///
    /// A kit that omits `genesis_version_min` is treated permissively:
    /// the gate answers `true` (and says so at debug level), so behavior
    /// defaults to the modern path rather than silently guessing.
    pub fn feature_compatibility(&self, version: &str) -> Result<bool> {
        let wanted = SemVer::parse(version)?;
        match &self.genesis_version_min {
            Some(min) => Ok(SemVer::parse(min)?.meets_requirement(&wanted)),
            None => {
                debug!(
                    "kit {} declares no genesis_version_min; assuming compatibility with {}",
                    self.name, version
                );
                Ok(true)
            }
        }
    }

    /// The secret-specification tree handed to the plan parser: a map
    /// with `certificates` and `credentials` keys, each grouped by
    /// feature name.
    pub fn secrets_tree(&self) -> serde_json::Value {
        serde_json::json!({
            "certificates": self.certificates,
            "credentials": self.credentials,
        })
    }

    /// Required director configs as `(type, name)` pairs; a bare type
    /// means the `default` config.
    pub fn required_configs(&self) -> Vec<(String, String)> {
        self.required_configs
            .iter()
            .map(|entry| match entry.split_once('/') {
                Some((t, n)) => (t.to_string(), n.to_string()),
                None => (entry.clone(), "default".to_string()),
            })
            .collect()
    }
}
