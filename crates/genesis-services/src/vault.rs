//! Store Client: a typed session against the external secrets binary.
//!
//! One [`Vault`] represents one authenticated target. Every operation is
//! a subprocess invocation of the secrets CLI; both output streams are
//! drained before exit codes are interpreted.

use crate::target::StoreTarget;
use genesis_core::process::{ProcessCommand, ProcessOutput, Runner};
use genesis_types::{GenesisError, Result, StoreHealth};
use std::collections::BTreeMap;
use std::net::{TcpStream, ToSocketAddrs};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Default secrets CLI binary.
pub const DEFAULT_STORE_BINARY: &str = "safe";

/// Environment variable the secrets CLI uses for target selection; every
/// query overrides it so concurrent shells cannot redirect us.
const TARGET_ENV: &str = "SAFE_TARGET";

/// Debug / trace variables that would pollute machine-read output.
const NOISY_ENV: &[&str] = &["DEBUG", "TRACE", "SAFE_TRACE", "VAULT_TRACE"];

/// Timeout for the TCP reachability probe.
const PROBE_TIMEOUT: Duration = Duration::from_secs(2);

/// A path → key → value export of a subtree of the store.
pub type StoreExport = BTreeMap<String, BTreeMap<String, String>>;

/// A single authenticated session against a credentials store target.
#[derive(Clone)]
pub struct Vault {
    target: StoreTarget,
    runner: Arc<dyn Runner>,
    binary: String,
}

impl std::fmt::Debug for Vault {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Vault")
            .field("target", &self.target)
            .field("binary", &self.binary)
            .finish()
    }
}

impl Vault {
    /// Create a client for `target`.
    pub fn new(target: StoreTarget, runner: Arc<dyn Runner>) -> Self {
        Self {
            target,
            runner,
            binary: DEFAULT_STORE_BINARY.to_string(),
        }
    }

    /// Use a non-default secrets binary.
    pub fn with_binary(mut self, binary: impl Into<String>) -> Self {
        self.binary = binary.into();
        self
    }

    /// The target this session is bound to.
    pub fn target(&self) -> &StoreTarget {
        &self.target
    }

    /// Target alias, for display.
    pub fn name(&self) -> &str {
        &self.target.name
    }

    /// Target URL.
    pub fn url(&self) -> &str {
        &self.target.url
    }

    /// Raw invocation of the secrets CLI against this target.
    ///
    /// The target-selection variable is always overridden and debug/trace
    /// variables are cleared so output stays parseable.
    pub fn query<I, S>(&self, args: I) -> Result<ProcessOutput>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut cmd = ProcessCommand::new(&self.binary)
            .args(args)
            .env(TARGET_ENV, &self.target.name);
        for var in NOISY_ENV {
            cmd = cmd.env_remove(*var);
        }
        self.runner.run(&cmd)
    }

    /// Like [`Vault::query`], but the subprocess owns the controlling
    /// terminal (used when the caller wants the CLI itself to prompt).
    pub fn query_interactive<I, S>(&self, args: I) -> Result<ProcessOutput>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut cmd = ProcessCommand::new(&self.binary)
            .args(args)
            .env(TARGET_ENV, &self.target.name)
            .interactive(true);
        for var in NOISY_ENV {
            cmd = cmd.env_remove(*var);
        }
        self.runner.run(&cmd)
    }

    fn not_found(out: &ProcessOutput) -> bool {
        let text = out.combined().to_lowercase();
        text.contains("not found") || text.contains("no secret exists")
    }

    /// Read the full key → value map stored at `path`.
    ///
    /// A missing path yields an empty map; any other failure, or a
    /// response that is not a map of string keys, is an error.
    pub fn get(&self, path: &str) -> Result<BTreeMap<String, String>> {
        let mut export = self.export(&[path])?;
        Ok(export.remove(&normalize(path)).unwrap_or_default())
    }

    /// Read a single `path:key` value.
    pub fn get_key(&self, path: &str, key: &str) -> Result<Option<String>> {
        let out = self.query(["get", &format!("{}:{}", path, key)])?;
        if !out.success() {
            if Self::not_found(&out) {
                return Ok(None);
            }
            return Err(GenesisError::Store(format!(
                "Could not read {}:{} from store '{}':\n{}",
                path,
                key,
                self.target.name,
                out.combined()
            )));
        }
        Ok(Some(out.stdout.trim_end_matches('\n').to_string()))
    }

    /// Write `path:key = value`.
    pub fn set(&self, path: &str, key: &str, value: &str) -> Result<()> {
        let out = self.query(["set", path, &format!("{}={}", key, value)])?;
        if !out.success() {
            return Err(GenesisError::Store(format!(
                "Could not write {}:{} to store '{}':\n{}",
                path,
                key,
                self.target.name,
                out.combined()
            )));
        }
        Ok(())
    }

    /// Write several keys of `path` in one invocation.
    pub fn set_many(&self, path: &str, pairs: &BTreeMap<String, String>) -> Result<()> {
        if pairs.is_empty() {
            return Ok(());
        }
        let mut args = vec!["set".to_string(), path.to_string()];
        args.extend(pairs.iter().map(|(k, v)| format!("{}={}", k, v)));
        let out = self.query(args)?;
        if !out.success() {
            return Err(GenesisError::Store(format!(
                "Could not write {} keys to {} in store '{}':\n{}",
                pairs.len(),
                path,
                self.target.name,
                out.combined()
            )));
        }
        Ok(())
    }

    /// Prompt-driven write: the subprocess consumes the controlling
    /// terminal and asks for the value itself.
    pub fn set_interactive(&self, path: &str, key: &str) -> Result<()> {
        let out = self.query_interactive(["set", path, key])?;
        if !out.success() {
            return Err(GenesisError::Store(format!(
                "Could not write {}:{} to store '{}'",
                path, key, self.target.name
            )));
        }
        Ok(())
    }

    /// Whether `path` (or `path:key`) exists; subprocess exit code is
    /// the predicate.
    pub fn has(&self, spec: &str) -> Result<bool> {
        let out = self.query(["exists", spec])?;
        Ok(out.success())
    }

    /// Enumerate leaf paths under each prefix.
    ///
    /// When the CLI echoes the prefix back as the only result, an
    /// `exists` probe disambiguates "the prefix is itself a leaf" from
    /// "the subtree is empty".
    pub fn paths(&self, prefixes: &[&str]) -> Result<Vec<String>> {
        let mut found = Vec::new();
        for prefix in prefixes {
            let out = self.query(["paths", prefix])?;
            if !out.success() {
                if Self::not_found(&out) {
                    continue;
                }
                return Err(GenesisError::Store(format!(
                    "Could not list paths under {} in store '{}':\n{}",
                    prefix,
                    self.target.name,
                    out.combined()
                )));
            }

            let lines: Vec<String> = out
                .stdout
                .lines()
                .map(str::trim)
                .filter(|l| !l.is_empty())
                .map(String::from)
                .collect();

            if lines.len() == 1 && lines[0] == normalize(prefix) {
                if self.has(prefix)? {
                    found.push(lines[0].clone());
                }
                continue;
            }
            found.extend(lines);
        }
        Ok(found)
    }

    /// Export every secret under the given prefixes as path → key → value.
    pub fn export(&self, prefixes: &[&str]) -> Result<StoreExport> {
        let mut args = vec!["export".to_string()];
        args.extend(prefixes.iter().map(|p| p.to_string()));

        let out = self.query(args)?;
        if !out.success() {
            if Self::not_found(&out) {
                return Ok(StoreExport::new());
            }
            return Err(GenesisError::Store(format!(
                "Could not export {} from store '{}':\n{}",
                prefixes.join(", "),
                self.target.name,
                out.combined()
            )));
        }

        let parsed: serde_json::Value = serde_json::from_str(&out.stdout).map_err(|e| {
            GenesisError::Bug(format!(
                "Store export for {} is not JSON: {}",
                prefixes.join(", "),
                e
            ))
        })?;

        let map = parsed.as_object().ok_or_else(|| {
            GenesisError::Bug(format!(
                "Store export for {} has unexpected structure (not a path map)",
                prefixes.join(", ")
            ))
        })?;

        let mut export = StoreExport::new();
        for (path, keys) in map {
            let keys = keys.as_object().ok_or_else(|| {
                GenesisError::Bug(format!(
                    "Store export entry {} has unexpected structure (not a key map)",
                    path
                ))
            })?;
            let mut values = BTreeMap::new();
            for (key, value) in keys {
                let value = match value {
                    serde_json::Value::String(s) => s.clone(),
                    other => other.to_string(),
                };
                values.insert(key.clone(), value);
            }
            export.insert(normalize(path), values);
        }
        Ok(export)
    }

    /// Remove `spec` (a path or `path:key`).
    pub fn rm(&self, spec: &str) -> Result<()> {
        let out = self.query(["rm", "-f", spec])?;
        if !out.success() {
            return Err(GenesisError::Store(format!(
                "Could not remove {} from store '{}':\n{}",
                spec,
                self.target.name,
                out.combined()
            )));
        }
        Ok(())
    }

    /// Derive the health of this target.
    ///
    /// Order: TCP probe of host:port, token presence, the CLI's own
    /// status call (exit code 2 means sealed), then presence of the
    /// handshake path under `mount`.
    pub fn status(&self, mount: &str) -> Result<StoreHealth> {
        let (host, port) = self.target.probe_addr()?;
        if !tcp_reachable(&host, port) {
            return Ok(StoreHealth::Unreachable);
        }

        if !self.has_token()? {
            return Ok(StoreHealth::Unauthenticated);
        }

        let out = self.query(["vault", "status"])?;
        if out.code == 2 {
            return Ok(StoreHealth::Sealed);
        }
        if !out.success() {
            return Err(GenesisError::Store(format!(
                "Could not determine status of store '{}':\n{}",
                self.target.name,
                out.combined()
            )));
        }

        let handshake = format!("{}/handshake", mount.trim_matches('/'));
        if self.has(&handshake)? {
            Ok(StoreHealth::Ok)
        } else {
            Ok(StoreHealth::Uninitialized)
        }
    }

    /// Fail unless this target is fully usable, with remedial
    /// instructions per condition.
    pub fn require_usable(&self, mount: &str) -> Result<()> {
        match self.status(mount)? {
            StoreHealth::Ok => Ok(()),
            StoreHealth::Unreachable => Err(GenesisError::Store(format!(
                "Store '{}' ({}) is unreachable.\nCheck your network connection, \
                 or re-target a reachable store.",
                self.target.name, self.target.url
            ))),
            StoreHealth::Unauthenticated => Err(GenesisError::Store(format!(
                "Not authenticated to store '{}'.\nRun `{} auth -t {}` and retry.",
                self.target.name, self.binary, self.target.name
            ))),
            StoreHealth::Sealed => Err(GenesisError::Store(format!(
                "Store '{}' is sealed.\nAn operator must unseal it before secrets \
                 can be read or written.",
                self.target.name
            ))),
            StoreHealth::Uninitialized => Err(GenesisError::Store(format!(
                "Store '{}' has not been initialized for this deployment root.\n\
                 Write any secret under {}/ to establish the handshake.",
                self.target.name,
                mount.trim_matches('/')
            ))),
        }
    }

    fn has_token(&self) -> Result<bool> {
        let out = self.query(["env", "--json"])?;
        if !out.success() {
            return Ok(false);
        }
        let env: serde_json::Value = match serde_json::from_str(&out.stdout) {
            Ok(v) => v,
            Err(_) => return Ok(false),
        };
        Ok(env
            .get("VAULT_TOKEN")
            .and_then(|t| t.as_str())
            .map(|t| !t.is_empty())
            .unwrap_or(false))
    }
}

fn normalize(path: &str) -> String {
    path.trim_start_matches('/').to_string()
}

fn tcp_reachable(host: &str, port: u16) -> bool {
    let addrs = match (host, port).to_socket_addrs() {
        Ok(addrs) => addrs,
        Err(_) => return false,
    };
    for addr in addrs {
        if TcpStream::connect_timeout(&addr, PROBE_TIMEOUT).is_ok() {
            return true;
        }
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use genesis_core::process::ScriptedRunner;

    fn vault(runner: Arc<ScriptedRunner>) -> Vault {
        Vault::new(
            StoreTarget::new("lab", "https://vault.lab.example:8200", true).unwrap(),
            runner,
        )
    }

    #[test]
    fn test_query_pins_target_and_clears_debug_env() {
        let runner = Arc::new(ScriptedRunner::new());
        let v = vault(runner.clone());

        v.query(["paths", "secret/lab"]).unwrap();

        let call = &runner.calls()[0];
        assert_eq!(call.env.get("SAFE_TARGET").unwrap(), "lab");
        assert!(call.env_remove.contains(&"DEBUG".to_string()));
        assert!(call.env_remove.contains(&"SAFE_TRACE".to_string()));
    }

    #[test]
    fn test_get_parses_export() {
        let runner = Arc::new(ScriptedRunner::new());
        runner.push_output(r#"{"secret/lab/admin":{"password":"sekrit","user":"admin"}}"#, 0);
        let v = vault(runner);

        let map = v.get("secret/lab/admin").unwrap();
        assert_eq!(map.get("password").unwrap(), "sekrit");
        assert_eq!(map.get("user").unwrap(), "admin");
    }

    #[test]
    fn test_get_missing_path_is_empty_map() {
        let runner = Arc::new(ScriptedRunner::new());
        runner.push_failure("!! no secret exists at path secret/lab/nope", 1);
        let v = vault(runner);

        assert!(v.get("secret/lab/nope").unwrap().is_empty());
    }

    #[test]
    fn test_get_rejects_unexpected_structure() {
        let runner = Arc::new(ScriptedRunner::new());
        runner.push_output(r#"["not","a","map"]"#, 0);
        let v = vault(runner);

        let err = v.get("secret/lab/admin").unwrap_err();
        assert!(matches!(err, GenesisError::Bug(_)));
    }

    #[test]
    fn test_paths_single_leaf_disambiguation() {
        // CLI echoes the prefix back; an exists probe says it is a leaf
        let runner = Arc::new(ScriptedRunner::new());
        runner.push_output("secret/lab/admin\n", 0); // paths
        runner.push_output("", 0); // exists -> yes
        let v = vault(runner.clone());

        let found = v.paths(&["secret/lab/admin"]).unwrap();
        assert_eq!(found, vec!["secret/lab/admin"]);

        // same echo, but exists says no: empty subtree
        let runner = Arc::new(ScriptedRunner::new());
        runner.push_output("secret/lab/admin\n", 0);
        runner.push_output("", 1);
        let v = vault(runner);

        assert!(v.paths(&["secret/lab/admin"]).unwrap().is_empty());
    }

    #[test]
    fn test_set_interactive_owns_the_terminal() {
        let runner = Arc::new(ScriptedRunner::new());
        let v = vault(runner.clone());

        v.set_interactive("secret/lab/users/admin", "password").unwrap();

        let call = &runner.calls()[0];
        assert_eq!(call.render(), "safe set secret/lab/users/admin password");
        assert!(call.interactive);
        assert_eq!(call.env.get("SAFE_TARGET").unwrap(), "lab");
    }

    #[test]
    fn test_set_many_single_invocation() {
        let runner = Arc::new(ScriptedRunner::new());
        let v = vault(runner.clone());

        let mut pairs = BTreeMap::new();
        pairs.insert("a".to_string(), "1".to_string());
        pairs.insert("b".to_string(), "2".to_string());
        v.set_many("exodus/lab/thing", &pairs).unwrap();

        assert_eq!(
            runner.call_lines(),
            vec!["safe set exodus/lab/thing a=1 b=2"]
        );
    }

    #[test]
    fn test_rm_forces() {
        let runner = Arc::new(ScriptedRunner::new());
        let v = vault(runner.clone());
        v.rm("secret/lab/old").unwrap();
        assert_eq!(runner.call_lines(), vec!["safe rm -f secret/lab/old"]);
    }
}
