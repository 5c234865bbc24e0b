//! Exodus metadata publication.
//!
//! After every successful deployment the `exodus` subtree of the final
//! manifest is flattened to a key → value map, `((var))` references are
//! interpolated from the BOSH variables file (or credhub), and the
//! record is stored under `<exodus_mount>/<env>/<type>` with the SHA-1
//! of the deployed manifest added for drift detection.

use genesis_core::process::Runner;
use genesis_services::{CredhubInfo, Vault};
use genesis_types::Result;
use regex::Regex;
use std::collections::BTreeMap;
use std::sync::{Arc, OnceLock};
use tracing::{debug, warn};

/// Key the deployed manifest's fingerprint is published under.
pub const MANIFEST_SHA1_KEY: &str = "manifest_sha1";

fn var_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^\(\(([A-Za-z0-9_./-]+)\)\)$").unwrap())
}

/// Flatten a nested value into dotted key → scalar string pairs.
/// Sequences flatten with `[n]` index suffixes.
pub fn flatten(value: &serde_json::Value) -> BTreeMap<String, String> {
    let mut out = BTreeMap::new();
    flatten_into(value, String::new(), &mut out);
    out
}

fn flatten_into(value: &serde_json::Value, prefix: String, out: &mut BTreeMap<String, String>) {
    match value {
        serde_json::Value::Object(map) => {
            for (key, inner) in map {
                let child = if prefix.is_empty() {
                    key.clone()
                } else {
                    format!("{}.{}", prefix, key)
                };
                flatten_into(inner, child, out);
            }
        }
        serde_json::Value::Array(list) => {
            for (i, inner) in list.iter().enumerate() {
                flatten_into(inner, format!("{}[{}]", prefix, i), out);
            }
        }
        serde_json::Value::Null => {}
        serde_json::Value::String(s) => {
            out.insert(prefix, s.clone());
        }
        other => {
            out.insert(prefix, other.to_string());
        }
    }
}

/// Replace `((var))` values with their resolution from the BOSH
/// variables file, falling back to credhub when available. Unresolvable
/// references are left as-is with a warning.
pub fn interpolate(
    data: &mut BTreeMap<String, String>,
    bosh_vars: &serde_yaml::Value,
    credhub: Option<(&CredhubInfo, &Arc<dyn Runner>)>,
) -> Result<()> {
    for (key, value) in data.iter_mut() {
        let Some(caps) = var_re().captures(value) else {
            continue;
        };
        let var_name = &caps[1];

        if let Some(resolved) = bosh_vars.get(var_name) {
            *value = match resolved {
                serde_yaml::Value::String(s) => s.clone(),
                other => serde_yaml::to_string(other)?.trim_end().to_string(),
            };
            continue;
        }

        if let Some((credhub, runner)) = credhub {
            if let Some(resolved) = credhub.get(runner, var_name)? {
                *value = resolved;
                continue;
            }
        }

        warn!("exodus key {} references unresolvable variable (({}))", key, var_name);
    }
    Ok(())
}

/// Publishes and reads Exodus records.
pub struct Exodus<'a> {
    vault: &'a Vault,
}

impl<'a> Exodus<'a> {
    /// Exodus accessor over `vault`.
    pub fn new(vault: &'a Vault) -> Self {
        Self { vault }
    }

    /// Publish `data` under `base` (`<exodus_mount><env>/<type>`),
    /// adding the manifest fingerprint. The prior record is removed
    /// first and all keys are written in a single store invocation, so
    /// readers never observe a half-updated record.
    pub fn publish(
        &self,
        base: &str,
        mut data: BTreeMap<String, String>,
        manifest_sha1: &str,
    ) -> Result<()> {
        data.insert(MANIFEST_SHA1_KEY.to_string(), manifest_sha1.to_string());

        if self.vault.has(base)? {
            self.vault.rm(base)?;
        }
        self.vault.set_many(base, &data)?;
        debug!("published exodus record at {} ({} key(s))", base, data.len());
        Ok(())
    }

    /// Read a record back, e.g. a director's connection data.
    pub fn fetch(&self, base: &str) -> Result<BTreeMap<String, String>> {
        self.vault.get(base)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use genesis_core::process::ScriptedRunner;
    use genesis_services::target::StoreTarget;
    use serde_json::json;

    #[test]
    fn test_flatten_nested() {
        let value = json!({
            "admin_username": "admin",
            "ha": { "count": 3, "enabled": true },
            "hosts": ["10.0.0.1", "10.0.0.2"],
            "nothing": null,
        });

        let flat = flatten(&value);
        assert_eq!(flat["admin_username"], "admin");
        assert_eq!(flat["ha.count"], "3");
        assert_eq!(flat["ha.enabled"], "true");
        assert_eq!(flat["hosts[0]"], "10.0.0.1");
        assert_eq!(flat["hosts[1]"], "10.0.0.2");
        assert!(!flat.contains_key("nothing"));
    }

    #[test]
    fn test_interpolate_from_vars() {
        let mut data = BTreeMap::new();
        data.insert("password".to_string(), "((admin_password))".to_string());
        data.insert("plain".to_string(), "untouched".to_string());
        data.insert("partial".to_string(), "((not))interpolated".to_string());

        let vars: serde_yaml::Value =
            serde_yaml::from_str("admin_password: sekrit\n").unwrap();

        interpolate(&mut data, &vars, None).unwrap();
        assert_eq!(data["password"], "sekrit");
        assert_eq!(data["plain"], "untouched");
        assert_eq!(data["partial"], "((not))interpolated");
    }

    #[test]
    fn test_interpolate_unresolvable_left_alone() {
        let mut data = BTreeMap::new();
        data.insert("mystery".to_string(), "((gone))".to_string());

        let vars: serde_yaml::Value = serde_yaml::from_str("{}").unwrap();
        interpolate(&mut data, &vars, None).unwrap();
        assert_eq!(data["mystery"], "((gone))");
    }

    #[test]
    fn test_publish_removes_then_sets_once() {
        let runner = Arc::new(ScriptedRunner::new());
        runner.push_output("", 0); // exists -> yes
        runner.push_output("", 0); // rm
        runner.push_output("", 0); // set
        let vault = Vault::new(
            StoreTarget::new("lab", "https://vault.lab.example:8200", true).unwrap(),
            runner.clone(),
        );

        let mut data = BTreeMap::new();
        data.insert("url".to_string(), "https://cf.example".to_string());

        Exodus::new(&vault)
            .publish("secret/exodus/lab/cf", data, "abc123")
            .unwrap();

        let lines = runner.call_lines();
        assert_eq!(lines[0], "safe exists secret/exodus/lab/cf");
        assert_eq!(lines[1], "safe rm -f secret/exodus/lab/cf");
        assert_eq!(
            lines[2],
            "safe set secret/exodus/lab/cf manifest_sha1=abc123 url=https://cf.example"
        );
    }
}
