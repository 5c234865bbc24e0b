//! Deployment-time config fetcher.
//!
//! Downloads named `(type, name)` configs from the director into a
//! working directory and tracks what was actually fetched, so later
//! stages (merging, hooks) can find them by lookup or through the
//! `GENESIS_<TYPE>_CONFIG[_<NAME>]` environment mirror.

use crate::bosh::Bosh;
use genesis_types::{GenesisError, Result};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// One downloaded config.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigRecord {
    /// Config type (`cloud`, `runtime`, ...).
    pub config_type: String,
    /// Config name; `default` for the unnamed config.
    pub name: String,
    /// Where the content was written.
    pub path: PathBuf,
}

/// Fetches and tracks director configs for one deployment run.
pub struct ConfigSet {
    workdir: PathBuf,
    records: Vec<ConfigRecord>,
}

impl ConfigSet {
    /// Create a fetcher writing into `workdir`.
    pub fn new(workdir: impl AsRef<Path>) -> Self {
        Self {
            workdir: workdir.as_ref().to_path_buf(),
            records: Vec::new(),
        }
    }

    /// Download one config, or every config of a type when `name` is
    /// `*`. Each actually-downloaded `(type, name)` is recorded
    /// separately.
    pub fn fetch(&mut self, bosh: &Bosh, config_type: &str, name: &str) -> Result<()> {
        let names = if name == "*" {
            let all = bosh.config_names(config_type)?;
            info!(
                "director has {} {} config(s): {}",
                all.len(),
                config_type,
                all.join(", ")
            );
            all
        } else {
            vec![name.to_string()]
        };

        for name in names {
            if self.config_file(config_type, &name).is_some() {
                continue;
            }
            let content = bosh.download_config(config_type, &name)?;

            let filename = if name == "default" {
                format!("{}-config.yml", config_type)
            } else {
                format!("{}-config-{}.yml", config_type, name)
            };
            let path = self.workdir.join(filename);
            genesis_core::fs::write_file(&path, &content)?;
            debug!("fetched {} config '{}' to {}", config_type, name, path.display());

            self.records.push(ConfigRecord {
                config_type: config_type.to_string(),
                name,
                path,
            });
        }
        Ok(())
    }

    /// Every downloaded config, in fetch order.
    pub fn records(&self) -> &[ConfigRecord] {
        &self.records
    }

    /// File path of a previously fetched `(type, name)` config.
    pub fn config_file(&self, config_type: &str, name: &str) -> Option<&Path> {
        self.records
            .iter()
            .find(|r| r.config_type == config_type && r.name == name)
            .map(|r| r.path.as_path())
    }

    /// Require a `(type, name)` config to have been fetched.
    pub fn require(&self, config_type: &str, name: &str) -> Result<&Path> {
        self.config_file(config_type, name).ok_or_else(|| {
            GenesisError::Deploy(format!(
                "Required {} config '{}' was not found on the director",
                config_type, name
            ))
        })
    }

    /// The `GENESIS_<TYPE>_CONFIG[_<NAME>]` mirror of every selection,
    /// for hook consumption.
    pub fn env_vars(&self) -> BTreeMap<String, String> {
        let mut vars = BTreeMap::new();
        for record in &self.records {
            let mut var = format!("GENESIS_{}_CONFIG", env_component(&record.config_type));
            if record.name != "default" {
                var.push('_');
                var.push_str(&env_component(&record.name));
            }
            vars.insert(var, record.path.display().to_string());
        }
        vars
    }
}

fn env_component(s: &str) -> String {
    s.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() {
                c.to_ascii_uppercase()
            } else {
                '_'
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bosh::BoshConnection;
    use genesis_core::process::ScriptedRunner;
    use genesis_types::SemVer;
    use std::sync::Arc;
    use tempfile::TempDir;

    fn bosh(runner: Arc<ScriptedRunner>) -> Bosh {
        Bosh::with_binary(
            "bosh",
            SemVer::parse("7.0.0").unwrap(),
            BoshConnection::default(),
            runner,
        )
    }

    #[test]
    fn test_fetch_single_and_lookup() {
        let dir = TempDir::new().unwrap();
        let runner = Arc::new(ScriptedRunner::new());
        runner.push_output(
            r#"{"Tables":[{"Rows":[{"content":"azs: [z1]","name":"default","type":"cloud"}]}]}"#,
            0,
        );

        let mut configs = ConfigSet::new(dir.path());
        configs.fetch(&bosh(runner), "cloud", "default").unwrap();

        let path = configs.config_file("cloud", "default").unwrap();
        assert_eq!(std::fs::read_to_string(path).unwrap(), "azs: [z1]");
        assert!(configs.config_file("cloud", "other").is_none());
        assert!(configs.require("runtime", "default").is_err());
    }

    #[test]
    fn test_fetch_wildcard_records_each_name() {
        let dir = TempDir::new().unwrap();
        let runner = Arc::new(ScriptedRunner::new());
        runner.push_output(
            r#"{"Tables":[{"Rows":[{"name":"default"},{"name":"lab"}]}]}"#,
            0,
        );
        runner.push_output(
            r#"{"Tables":[{"Rows":[{"content":"a: 1","name":"default"}]}]}"#,
            0,
        );
        runner.push_output(
            r#"{"Tables":[{"Rows":[{"content":"b: 2","name":"lab"}]}]}"#,
            0,
        );

        let mut configs = ConfigSet::new(dir.path());
        configs.fetch(&bosh(runner), "cloud", "*").unwrap();

        assert_eq!(configs.records().len(), 2);
        assert!(configs.config_file("cloud", "lab").is_some());
    }

    #[test]
    fn test_env_var_mirror() {
        let dir = TempDir::new().unwrap();
        let mut configs = ConfigSet::new(dir.path());
        configs.records.push(ConfigRecord {
            config_type: "cloud".into(),
            name: "default".into(),
            path: dir.path().join("cloud-config.yml"),
        });
        configs.records.push(ConfigRecord {
            config_type: "runtime".into(),
            name: "dns-rules".into(),
            path: dir.path().join("runtime-config-dns-rules.yml"),
        });

        let vars = configs.env_vars();
        assert!(vars.contains_key("GENESIS_CLOUD_CONFIG"));
        assert!(vars.contains_key("GENESIS_RUNTIME_CONFIG_DNS_RULES"));
    }
}
