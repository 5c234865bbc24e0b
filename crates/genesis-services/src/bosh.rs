//! BOSH CLI driver.
//!
//! The engine never speaks to the director API; every operation goes
//! through the `bosh` binary. Candidate binaries are probed at startup
//! and the highest version meeting the configured minimum is selected.

use genesis_core::process::{ProcessCommand, Runner};
use genesis_types::{GenesisError, Result, SemVer};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info};

/// Candidate BOSH binaries, probed in order.
pub const BOSH_CANDIDATES: &[&str] = &["bosh", "bosh2", "boshv2"];

/// Connection settings for one director, exported to subprocesses as
/// `BOSH_*` variables.
#[derive(Debug, Clone, Default)]
pub struct BoshConnection {
    /// Director alias (`BOSH_ALIAS`).
    pub alias: String,
    /// Director URL (`BOSH_ENVIRONMENT`).
    pub environment: String,
    /// Director CA certificate PEM (`BOSH_CA_CERT`).
    pub ca_cert: Option<String>,
    /// UAA client (`BOSH_CLIENT`).
    pub client: Option<String>,
    /// UAA client secret (`BOSH_CLIENT_SECRET`).
    pub client_secret: Option<String>,
    /// Deployment name (`BOSH_DEPLOYMENT`).
    pub deployment: Option<String>,
}

impl BoshConnection {
    /// The `BOSH_*` variable set for this connection.
    pub fn env_vars(&self) -> BTreeMap<String, String> {
        let mut vars = BTreeMap::new();
        vars.insert("BOSH_ALIAS".to_string(), self.alias.clone());
        vars.insert("BOSH_ENVIRONMENT".to_string(), self.environment.clone());
        if let Some(ca) = &self.ca_cert {
            vars.insert("BOSH_CA_CERT".to_string(), ca.clone());
        }
        if let Some(client) = &self.client {
            vars.insert("BOSH_CLIENT".to_string(), client.clone());
        }
        if let Some(secret) = &self.client_secret {
            vars.insert("BOSH_CLIENT_SECRET".to_string(), secret.clone());
        }
        if let Some(deployment) = &self.deployment {
            vars.insert("BOSH_DEPLOYMENT".to_string(), deployment.clone());
        }
        vars
    }
}

/// A stemcell known to the director.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Stemcell {
    /// Stemcell name.
    pub name: String,
    /// Operating system, e.g. `ubuntu-jammy`.
    pub os: String,
    /// Version, without the in-use marker.
    pub version: String,
}

/// The selected BOSH binary plus a director connection.
#[derive(Clone)]
pub struct Bosh {
    binary: String,
    version: SemVer,
    connection: BoshConnection,
    runner: Arc<dyn Runner>,
}

impl std::fmt::Debug for Bosh {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Bosh")
            .field("binary", &self.binary)
            .field("version", &self.version)
            .field("connection", &self.connection)
            .finish()
    }
}

impl Bosh {
    /// Probe the candidate binaries and select the highest version that
    /// meets `min_version`.
    pub fn find(
        runner: Arc<dyn Runner>,
        connection: BoshConnection,
        min_version: &SemVer,
    ) -> Result<Self> {
        let mut best: Option<(String, SemVer)> = None;

        for candidate in BOSH_CANDIDATES {
            let out = match runner.run(&ProcessCommand::new(*candidate).arg("--version")) {
                Ok(out) if out.success() => out,
                _ => continue,
            };
            let Some(version) = parse_bosh_version(&out.stdout) else {
                continue;
            };
            debug!("found {} version {}", candidate, version);
            if version.meets_requirement(min_version)
                && best.as_ref().map_or(true, |(_, v)| version > *v)
            {
                best = Some((candidate.to_string(), version));
            }
        }

        let (binary, version) = best.ok_or_else(|| {
            GenesisError::Dependency(format!(
                "No BOSH CLI of version {} or later found (candidates: {})",
                min_version,
                BOSH_CANDIDATES.join(", ")
            ))
        })?;

        info!("using {} version {}", binary, version);
        Ok(Self {
            binary,
            version,
            connection,
            runner,
        })
    }

    /// Build a driver over an explicit binary, skipping the probe.
    pub fn with_binary(
        binary: impl Into<String>,
        version: SemVer,
        connection: BoshConnection,
        runner: Arc<dyn Runner>,
    ) -> Self {
        Self {
            binary: binary.into(),
            version,
            connection,
            runner,
        }
    }

    /// The selected CLI version.
    pub fn version(&self) -> &SemVer {
        &self.version
    }

    /// The director connection in use.
    pub fn connection(&self) -> &BoshConnection {
        &self.connection
    }

    fn command<I, S>(&self, args: I) -> ProcessCommand
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        ProcessCommand::new(&self.binary)
            .args(args)
            .envs(self.connection.env_vars())
    }

    /// Submit a deployment to the director. Output streams to the
    /// controlling terminal; the exit code decides success.
    pub fn deploy(&self, deployment: &str, manifest: &Path, flags: &[String]) -> Result<()> {
        let mut args = vec![
            "-n".to_string(),
            "-d".to_string(),
            deployment.to_string(),
            "deploy".to_string(),
            manifest.display().to_string(),
        ];
        args.extend(flags.iter().cloned());

        let out = self.runner.run(&self.command(args).interactive(true))?;
        if !out.success() {
            return Err(GenesisError::Deploy(format!(
                "bosh deploy of {} exited {}",
                deployment, out.code
            )));
        }
        Ok(())
    }

    /// Bootstrap a deployment locally instead of via a director.
    pub fn create_env(
        &self,
        manifest: &Path,
        state_file: &Path,
        vars_file: Option<&Path>,
        flags: &[String],
    ) -> Result<()> {
        let mut args = vec![
            "-n".to_string(),
            "create-env".to_string(),
            manifest.display().to_string(),
            "--state".to_string(),
            state_file.display().to_string(),
        ];
        if let Some(vars) = vars_file {
            args.push("--vars-file".to_string());
            args.push(vars.display().to_string());
        }
        args.extend(flags.iter().cloned());

        let out = self.runner.run(&self.command(args).interactive(true))?;
        if !out.success() {
            return Err(GenesisError::Deploy(format!(
                "bosh create-env of {} exited {}",
                manifest.display(),
                out.code
            )));
        }
        Ok(())
    }

    /// Names of every config of `config_type` on the director.
    pub fn config_names(&self, config_type: &str) -> Result<Vec<String>> {
        let out = self.runner.run(&self.command([
            "configs",
            "--type",
            config_type,
            "--json",
        ]))?;
        if !out.success() {
            return Err(GenesisError::Deploy(format!(
                "Could not list {} configs:\n{}",
                config_type,
                out.combined()
            )));
        }

        #[derive(Deserialize)]
        struct Row {
            name: String,
        }

        Ok(parse_table_rows::<Row>(&out.stdout)?
            .into_iter()
            .map(|r| r.name)
            .collect())
    }

    /// Download the content of one `(type, name)` config.
    pub fn download_config(&self, config_type: &str, name: &str) -> Result<String> {
        let out = self.runner.run(&self.command([
            "config",
            "--type",
            config_type,
            "--name",
            name,
            "--json",
        ]))?;
        if !out.success() {
            return Err(GenesisError::Deploy(format!(
                "Could not download {} config '{}':\n{}",
                config_type,
                name,
                out.combined()
            )));
        }

        #[derive(Deserialize)]
        struct Row {
            content: String,
        }

        parse_table_rows::<Row>(&out.stdout)?
            .into_iter()
            .next()
            .map(|r| r.content)
            .ok_or_else(|| {
                GenesisError::Deploy(format!(
                    "Director has no {} config named '{}'",
                    config_type, name
                ))
            })
    }

    /// Stemcells uploaded to the director.
    pub fn stemcells(&self) -> Result<Vec<Stemcell>> {
        let out = self.runner.run(&self.command(["stemcells", "--json"]))?;
        if !out.success() {
            return Err(GenesisError::Deploy(format!(
                "Could not list stemcells:\n{}",
                out.combined()
            )));
        }

        #[derive(Deserialize)]
        struct Row {
            name: String,
            os: String,
            version: String,
        }

        Ok(parse_table_rows::<Row>(&out.stdout)?
            .into_iter()
            .map(|r| Stemcell {
                name: r.name,
                os: r.os,
                version: r.version.trim_end_matches('*').to_string(),
            })
            .collect())
    }
}

/// Parse `bosh --version` output, e.g.
/// `version 7.5.2-7f164f41-2024-02-20T21:40:56Z`.
pub fn parse_bosh_version(output: &str) -> Option<SemVer> {
    let word = output
        .split_whitespace()
        .skip_while(|w| *w != "version")
        .nth(1)?;
    let numeric = word.split('-').next()?;
    SemVer::parse(numeric).ok()
}

/// Whether a requested stemcell `(os, version)` is satisfied by the
/// director's uploads. `latest` matches any version of the OS;
/// `<N>.latest` matches any version with major `N`.
pub fn stemcell_available(os: &str, version: &str, uploaded: &[Stemcell]) -> bool {
    uploaded.iter().any(|s| {
        if s.os != os {
            return false;
        }
        if version == "latest" {
            return true;
        }
        if let Some(major) = version.strip_suffix(".latest") {
            return s.version.split('.').next() == Some(major);
        }
        s.version == version || s.version.split('.').next() == Some(version)
    })
}

fn parse_table_rows<T: serde::de::DeserializeOwned>(json: &str) -> Result<Vec<T>> {
    #[derive(Deserialize)]
    struct Output {
        #[serde(rename = "Tables", default)]
        tables: Vec<Table>,
    }

    #[derive(Deserialize)]
    struct Table {
        #[serde(rename = "Rows", default)]
        rows: Vec<serde_json::Value>,
    }

    let parsed: Output = serde_json::from_str(json)
        .map_err(|e| GenesisError::Deploy(format!("Unparseable bosh output: {}", e)))?;

    let mut rows = Vec::new();
    for table in parsed.tables {
        for row in table.rows {
            rows.push(serde_json::from_value(row).map_err(|e| {
                GenesisError::Deploy(format!("Unexpected bosh table row: {}", e))
            })?);
        }
    }
    Ok(rows)
}
