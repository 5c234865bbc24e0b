//! Explicit process context.
//!
//! The engine keeps no module-level state: the target registry and the
//! current/default store sessions live in one [`Context`] value that is
//! passed explicitly. Tests construct a fresh context per case and
//! teardown is simply dropping it.

use crate::target::{StoreTarget, TargetRegistry};
use crate::vault::Vault;
use genesis_core::process::Runner;
use genesis_core::term::Prompter;
use genesis_types::{GenesisError, Result};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Holds the known targets and the attached store sessions for one run.
pub struct Context {
    registry: TargetRegistry,
    runner: Arc<dyn Runner>,
    prompter: Arc<dyn Prompter>,
    attached: BTreeMap<String, Arc<Vault>>,
    current: Option<Arc<Vault>>,
}

impl Context {
    /// Build a context over a pre-loaded registry.
    pub fn new(
        registry: TargetRegistry,
        runner: Arc<dyn Runner>,
        prompter: Arc<dyn Prompter>,
    ) -> Self {
        Self {
            registry,
            runner,
            prompter,
            attached: BTreeMap::new(),
            current: None,
        }
    }

    /// The known-target registry.
    pub fn registry(&self) -> &TargetRegistry {
        &self.registry
    }

    /// The process runner external collaborators are invoked through.
    pub fn runner(&self) -> Arc<dyn Runner> {
        self.runner.clone()
    }

    /// The prompt sink.
    pub fn prompter(&self) -> &dyn Prompter {
        self.prompter.as_ref()
    }

    /// Attach a session for `target`, enforcing at most one attached
    /// store per URL.
    ///
    /// Re-attaching the same alias returns the existing session;
    /// attaching a different alias for an already-attached URL is an
    /// error rather than a silent re-pick.
    pub fn attach(&mut self, target: &StoreTarget) -> Result<Arc<Vault>> {
        if let Some(existing) = self.attached.get(&target.url) {
            if existing.name() == target.name {
                return Ok(existing.clone());
            }
            return Err(GenesisError::Store(format!(
                "Store URL {} is already attached as '{}'; refusing to attach it \
                 again as '{}'",
                target.url,
                existing.name(),
                target.name
            )));
        }

        let vault = Arc::new(Vault::new(target.clone(), self.runner.clone()));
        self.attached.insert(target.url.clone(), vault.clone());
        Ok(vault)
    }

    /// Resolve a name-or-URL reference and attach it.
    pub fn attach_named(&mut self, reference: &str) -> Result<Arc<Vault>> {
        let target = self.registry.resolve(reference)?.clone();
        self.attach(&target)
    }

    /// Set the store subsequent operations default to.
    pub fn set_current(&mut self, vault: Arc<Vault>) {
        self.current = Some(vault);
    }

    /// The current store session.
    pub fn current(&self) -> Result<Arc<Vault>> {
        self.current.clone().ok_or_else(|| {
            GenesisError::Store(
                "No credentials store selected; target one or pass an explicit \
                 store reference"
                    .to_string(),
            )
        })
    }
}
