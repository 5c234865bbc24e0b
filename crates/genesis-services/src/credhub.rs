//! Credhub proxy settings derived from a director's exodus data.
//!
//! Deployments against a full BOSH director may interpolate `((var))`
//! references through the director's credhub; this module assembles the
//! `CREDHUB_*` environment contract for hooks and offers a lookup used
//! as a fallback interpolation source for exodus publication.

use genesis_core::process::{ProcessCommand, Runner};
use genesis_types::{GenesisError, Result};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Connection settings for a director's credhub.
#[derive(Debug, Clone, Default)]
pub struct CredhubInfo {
    /// Credhub API URL (`CREDHUB_SERVER`).
    pub server: String,
    /// UAA client (`CREDHUB_CLIENT`).
    pub client: String,
    /// UAA client secret (`CREDHUB_SECRET`).
    pub secret: String,
    /// CA bundle PEM (`CREDHUB_CA_CERT`).
    pub ca_cert: String,
    /// Base path credentials live under, e.g. `/bosh-lab/lab-cf/`.
    pub base: String,
}

impl CredhubInfo {
    /// Build from a director's exodus data, keyed the way the BOSH kit
    /// publishes it.
    pub fn from_exodus(exodus: &BTreeMap<String, String>) -> Option<Self> {
        let server = exodus.get("credhub_url")?.clone();
        let ca = [
            exodus.get("ca_cert").cloned().unwrap_or_default(),
            exodus.get("credhub_ca_cert").cloned().unwrap_or_default(),
        ]
        .join("");

        Some(Self {
            server,
            client: exodus
                .get("credhub_username")
                .cloned()
                .unwrap_or_else(|| "credhub-admin".to_string()),
            secret: exodus.get("credhub_password").cloned().unwrap_or_default(),
            ca_cert: ca,
            base: String::new(),
        })
    }

    /// The `CREDHUB_*` variable set for hook consumption.
    pub fn env_vars(&self) -> BTreeMap<String, String> {
        let mut vars = BTreeMap::new();
        vars.insert("CREDHUB_SERVER".to_string(), self.server.clone());
        vars.insert("CREDHUB_CLIENT".to_string(), self.client.clone());
        vars.insert("CREDHUB_SECRET".to_string(), self.secret.clone());
        vars.insert("CREDHUB_CA_CERT".to_string(), self.ca_cert.clone());
        vars
    }

    /// Fetch one credential's value through the credhub CLI.
    pub fn get(&self, runner: &Arc<dyn Runner>, name: &str) -> Result<Option<String>> {
        let full_name = if name.starts_with('/') {
            name.to_string()
        } else {
            format!("{}{}", self.base, name)
        };

        let out = runner.run(
            &ProcessCommand::new("credhub")
                .args(["get", "-n", &full_name, "--output-json"])
                .envs(self.env_vars()),
        )?;

        if !out.success() {
            if out.combined().contains("does not exist") {
                return Ok(None);
            }
            return Err(GenesisError::Store(format!(
                "Could not read {} from credhub:\n{}",
                full_name,
                out.combined()
            )));
        }

        let parsed: serde_json::Value = serde_json::from_str(&out.stdout)
            .map_err(|e| GenesisError::Store(format!("Unparseable credhub output: {}", e)))?;

        Ok(parsed.get("value").map(|v| match v {
            serde_json::Value::String(s) => s.clone(),
            other => other.to_string(),
        }))
    }
}
