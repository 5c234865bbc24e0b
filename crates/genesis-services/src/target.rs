//! Known credentials-store targets and their registry.

use genesis_core::process::{ProcessCommand, Runner};
use genesis_core::term::Prompter;
use genesis_types::{GenesisError, Result};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// A named credentials-store target.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreTarget {
    /// Target alias.
    pub name: String,
    /// Store URL, `http(s)://host(:port)`.
    pub url: String,
    /// False when TLS verification is disabled for this target.
    #[serde(default = "default_verify")]
    pub verify: bool,
}

fn default_verify() -> bool {
    true
}

impl StoreTarget {
    /// Create a target, validating the URL shape.
    pub fn new(name: impl Into<String>, url: impl Into<String>, verify: bool) -> Result<Self> {
        let target = Self {
            name: name.into(),
            url: url.into(),
            verify,
        };
        target.validate()?;
        Ok(target)
    }

    /// Validate that the URL matches `^https?://host(:port)?$`.
    pub fn validate(&self) -> Result<()> {
        let parsed = url::Url::parse(&self.url)
            .map_err(|e| GenesisError::Store(format!("Invalid target URL '{}': {}", self.url, e)))?;

        let scheme_ok = matches!(parsed.scheme(), "http" | "https");
        let shape_ok = parsed.host_str().is_some()
            && parsed.path() == "/"
            && parsed.query().is_none()
            && parsed.fragment().is_none()
            && parsed.username().is_empty()
            && !self.url.trim_end_matches('/').ends_with('/');

        if !scheme_ok || !shape_ok {
            return Err(GenesisError::Store(format!(
                "Invalid target URL '{}': expected http(s)://host(:port)",
                self.url
            )));
        }
        Ok(())
    }

    /// Host and port for a TCP reachability probe (443 for https without
    /// an explicit port, 80 otherwise).
    pub fn probe_addr(&self) -> Result<(String, u16)> {
        let parsed = url::Url::parse(&self.url)
            .map_err(|e| GenesisError::Store(format!("Invalid target URL '{}': {}", self.url, e)))?;
        let host = parsed
            .host_str()
            .ok_or_else(|| GenesisError::Store(format!("Target URL '{}' has no host", self.url)))?
            .to_string();
        let port = parsed
            .port()
            .unwrap_or(if parsed.scheme() == "https" { 443 } else { 80 });
        Ok((host, port))
    }
}

/// Filter over the registry; `None` fields match everything.
#[derive(Debug, Clone, Default)]
pub struct TargetFilter {
    /// Match on alias.
    pub name: Option<String>,
    /// Match on URL.
    pub url: Option<String>,
    /// Match on TLS verification flag.
    pub verify: Option<bool>,
}

/// The list of known credentials-store targets.
///
/// Loaded once per [`crate::Context`] from the external binary's
/// `targets --json` listing. Several aliases may share a URL here; the
/// uniqueness invariant (one attached store per URL) is enforced by the
/// context at attach time, not in this listing.
#[derive(Debug, Clone, Default)]
pub struct TargetRegistry {
    targets: Vec<StoreTarget>,
}

impl TargetRegistry {
    /// Build a registry from an explicit target list.
    pub fn from_targets(targets: Vec<StoreTarget>) -> Result<Self> {
        for t in &targets {
            t.validate()?;
        }
        Ok(Self { targets })
    }

    /// Load the known targets from the external secrets binary.
    pub fn load(runner: &dyn Runner, binary: &str) -> Result<Self> {
        let out = runner.run(
            &ProcessCommand::new(binary)
                .arg("targets")
                .arg("--json")
                .env_remove("SAFE_TARGET"),
        )?;

        if !out.success() {
            return Err(GenesisError::Store(format!(
                "Could not list store targets ({} targets --json exited {}):\n{}",
                binary,
                out.code,
                out.combined()
            )));
        }

        let targets: Vec<StoreTarget> = serde_json::from_str(&out.stdout).map_err(|e| {
            GenesisError::Store(format!("Unparseable target listing: {}", e))
        })?;

        debug!("loaded {} store targets", targets.len());
        Self::from_targets(targets)
    }

    /// All known targets.
    pub fn list(&self) -> &[StoreTarget] {
        &self.targets
    }

    /// Targets matching every set field of `filter`.
    pub fn filter(&self, filter: &TargetFilter) -> Vec<&StoreTarget> {
        self.targets
            .iter()
            .filter(|t| {
                filter.name.as_deref().map_or(true, |n| t.name == n)
                    && filter.url.as_deref().map_or(true, |u| t.url == u)
                    && filter.verify.map_or(true, |v| t.verify == v)
            })
            .collect()
    }

    /// All aliases registered for `url`.
    pub fn aliases_for(&self, url: &str) -> Vec<&StoreTarget> {
        self.targets.iter().filter(|t| t.url == url).collect()
    }

    /// Resolve a name-or-URL reference to a single target.
    ///
    /// URL references are reverse-looked-up to their aliases; anything
    /// else is treated as an alias. Zero matches fail. Multiple aliases
    /// for one URL also fail — the registry never silently picks; use
    /// [`TargetRegistry::aliases_for`] when every alias is wanted.
    pub fn resolve(&self, target: &str) -> Result<&StoreTarget> {
        let matches: Vec<&StoreTarget> =
            if target.starts_with("http://") || target.starts_with("https://") {
                self.aliases_for(target)
            } else {
                self.targets.iter().filter(|t| t.name == target).collect()
            };

        match matches.len() {
            0 => Err(GenesisError::Store(format!(
                "Store target '{}' not found; run the secrets CLI to add it first",
                target
            ))),
            1 => Ok(matches[0]),
            _ => Err(GenesisError::Store(format!(
                "Store URL '{}' is known under multiple aliases ({}); specify one by name",
                target,
                matches
                    .iter()
                    .map(|t| t.name.as_str())
                    .collect::<Vec<_>>()
                    .join(", ")
            ))),
        }
    }

    /// Interactively pick a target.
    ///
    /// URLs registered under more than one alias are hidden from the
    /// listing (with a warning) so the pick is never ambiguous.
    pub fn pick(&self, prompter: &dyn Prompter) -> Result<&StoreTarget> {
        let mut choices: Vec<&StoreTarget> = Vec::new();
        for t in &self.targets {
            let aliases = self.aliases_for(&t.url);
            if aliases.len() > 1 {
                if aliases[0].name == t.name {
                    warn!(
                        "hiding {} from selection: registered under multiple aliases ({})",
                        t.url,
                        aliases
                            .iter()
                            .map(|a| a.name.as_str())
                            .collect::<Vec<_>>()
                            .join(", ")
                    );
                }
                continue;
            }
            choices.push(t);
        }

        if choices.is_empty() {
            return Err(GenesisError::Store(
                "No unambiguous store targets available to select from".to_string(),
            ));
        }

        let labels: Vec<String> = choices
            .iter()
            .map(|t| format!("{} ({})", t.name, t.url))
            .collect();
        let index = prompter.select("Select a credentials store target", &labels)?;
        Ok(choices[index])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use genesis_core::process::ScriptedRunner;
    use genesis_core::term::ScriptedPrompter;

    fn registry() -> TargetRegistry {
        TargetRegistry::from_targets(vec![
            StoreTarget::new("lab", "https://vault.lab.example:8200", true).unwrap(),
            StoreTarget::new("prod", "https://vault.prod.example:8200", true).unwrap(),
            StoreTarget::new("prod-alias", "https://vault.prod.example:8200", true).unwrap(),
        ])
        .unwrap()
    }

    #[test]
    fn test_url_validation() {
        assert!(StoreTarget::new("a", "https://vault.example", true).is_ok());
        assert!(StoreTarget::new("a", "http://10.0.0.5:8200", false).is_ok());
        assert!(StoreTarget::new("a", "ftp://vault.example", true).is_err());
        assert!(StoreTarget::new("a", "https://vault.example/extra", true).is_err());
        assert!(StoreTarget::new("a", "vault.example", true).is_err());
    }

    #[test]
    fn test_probe_addr_defaults() {
        let t = StoreTarget::new("a", "https://vault.example", true).unwrap();
        assert_eq!(t.probe_addr().unwrap(), ("vault.example".to_string(), 443));

        let t = StoreTarget::new("a", "http://vault.example", true).unwrap();
        assert_eq!(t.probe_addr().unwrap(), ("vault.example".to_string(), 80));

        let t = StoreTarget::new("a", "https://vault.example:8200", true).unwrap();
        assert_eq!(t.probe_addr().unwrap(), ("vault.example".to_string(), 8200));
    }

    #[test]
    fn test_load_from_listing() {
        let runner = ScriptedRunner::new();
        runner.push_output(
            r#"[{"name":"lab","url":"https://vault.lab.example:8200","verify":false}]"#,
            0,
        );

        let registry = TargetRegistry::load(&runner, "safe").unwrap();
        assert_eq!(registry.list().len(), 1);
        assert!(!registry.list()[0].verify);
        assert_eq!(runner.call_lines(), vec!["safe targets --json"]);
    }

    #[test]
    fn test_resolve_by_alias_and_url() {
        let r = registry();

        assert_eq!(r.resolve("lab").unwrap().url, "https://vault.lab.example:8200");
        assert_eq!(
            r.resolve("https://vault.lab.example:8200").unwrap().name,
            "lab"
        );

        // zero matches
        assert!(r.resolve("nonesuch").is_err());

        // ambiguous URL is never silently picked
        let err = r.resolve("https://vault.prod.example:8200").unwrap_err();
        assert!(err.to_string().contains("multiple aliases"));
    }

    #[test]
    fn test_filter_by_subset() {
        let r = registry();
        assert_eq!(r.filter(&TargetFilter::default()).len(), 3);
        assert_eq!(
            r.filter(&TargetFilter {
                url: Some("https://vault.prod.example:8200".into()),
                ..Default::default()
            })
            .len(),
            2
        );
    }

    #[test]
    fn test_pick_hides_colliding_urls() {
        let r = registry();
        let prompter = ScriptedPrompter::new();
        prompter.push_selection(0);

        // only "lab" is unambiguous, so index 0 must be it
        let picked = r.pick(&prompter).unwrap();
        assert_eq!(picked.name, "lab");
    }
}
