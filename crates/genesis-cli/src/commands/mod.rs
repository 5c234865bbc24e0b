//! Command implementations and the shared workspace they run in.

pub mod check;
pub mod deploy;
pub mod manifest;
pub mod secrets;

use crate::cli::Cli;
use anyhow::{anyhow, Context as _};
use genesis_core::process::{ExecRunner, Runner};
use genesis_core::term::{DeniedPrompter, Prompter, TerminalPrompter};
use genesis_env::Environment;
use genesis_kit::Kit;
use genesis_manifest::{Merger, SpruceMerger};
use genesis_secrets::{parse, ParseOptions, SecretPlan};
use genesis_services::{Context, TargetRegistry, Vault};
use genesis_types::EnvName;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::debug;

/// Everything a command needs: resolved repo root, process runner,
/// prompt sink, merge tool, and the selected credentials store.
pub struct Workspace {
    /// Repo root.
    pub root: PathBuf,
    /// Subprocess seam.
    pub runner: Arc<dyn Runner>,
    /// Prompt sink.
    pub prompter: Arc<dyn Prompter>,
    /// Merge-tool adapter.
    pub merger: Arc<dyn Merger>,
    /// Selected store session.
    pub vault: Arc<Vault>,
    /// Prompting is disabled for this run.
    pub no_prompt: bool,
}

impl Workspace {
    /// Resolve global options into a working context.
    pub fn initialize(cli: &Cli) -> anyhow::Result<Self> {
        let root = cli
            .cwd
            .canonicalize()
            .with_context(|| format!("cannot resolve repo root {}", cli.cwd.display()))?;

        let runner: Arc<dyn Runner> = Arc::new(ExecRunner);
        let prompter: Arc<dyn Prompter> = if cli.no_prompt {
            Arc::new(DeniedPrompter)
        } else {
            Arc::new(TerminalPrompter)
        };

        let spruce = SpruceMerger::new(runner.clone());
        spruce.check_available()?;
        let merger: Arc<dyn Merger> = Arc::new(spruce);

        let registry = TargetRegistry::load(runner.as_ref(), "safe")?;
        let mut context = Context::new(registry, runner.clone(), prompter.clone());

        let vault = match &cli.vault {
            Some(reference) => context.attach_named(reference)?,
            None => {
                let known = context.registry().list().to_vec();
                match known.len() {
                    0 => {
                        return Err(anyhow!(
                            "No credentials store targets known; add one with the \
                             secrets CLI first"
                        ))
                    }
                    1 => context.attach(&known[0])?,
                    _ => {
                        let picked = context.registry().pick(prompter.as_ref())?.clone();
                        context.attach(&picked)?
                    }
                }
            }
        };
        context.set_current(vault.clone());
        debug!("using store target {} ({})", vault.name(), vault.url());

        Ok(Self {
            root,
            runner,
            prompter,
            merger,
            vault,
            no_prompt: cli.no_prompt,
        })
    }

    /// Load an environment by name.
    pub fn load_environment(&self, name: &str) -> anyhow::Result<Environment> {
        let name = EnvName::new(name)?;
        Ok(Environment::load(&self.root, &name, self.merger.clone())?)
    }

    /// Locate and load the environment's kit: a `dev/` kit wins, then
    /// the unpacked kit cache under `.genesis/kits/`.
    pub fn load_kit(&self, env: &Environment) -> anyhow::Result<Kit> {
        let name = env
            .config()
            .kit_name
            .clone()
            .ok_or_else(|| anyhow!("environment {} does not declare kit.name", env.name()))?;
        let version = env.config().kit_version.clone().unwrap_or_default();

        let candidates = [
            self.root.join("dev"),
            self.root
                .join(".genesis/kits")
                .join(format!("{}-{}", name, version)),
            self.root.join(".genesis/kits").join(&name).join(&version),
        ];
        for dir in &candidates {
            if dir.join("kit.yml").is_file() {
                debug!("using kit at {}", dir.display());
                return Ok(Kit::load(dir)?);
            }
        }

        Err(anyhow!(
            "kit {}/{} not found (looked in dev/ and .genesis/kits/); \
             fetch it before operating on this environment",
            name,
            version
        ))
    }

    /// The environment's effective feature list, passed through the
    /// kit's features hook.
    pub fn features(&self, env: &Environment, kit: &Kit) -> anyhow::Result<Vec<String>> {
        let mut hook_env = BTreeMap::new();
        hook_env.insert("GENESIS_ROOT".to_string(), self.root.display().to_string());
        hook_env.insert(
            "GENESIS_ENVIRONMENT".to_string(),
            env.name().as_str().to_string(),
        );
        hook_env.insert("GENESIS_KIT_NAME".to_string(), kit.metadata().name.clone());
        hook_env.insert(
            "GENESIS_KIT_VERSION".to_string(),
            kit.metadata().version.clone(),
        );

        Ok(kit.resolve_features(
            self.runner.as_ref(),
            &env.config().features,
            &hook_env,
            &self.root,
        )?)
    }

    /// Ordered secret plans for the environment.
    pub fn plans(
        &self,
        env: &Environment,
        kit: &Kit,
        features: &[String],
        filter: Option<String>,
    ) -> anyhow::Result<Vec<SecretPlan>> {
        let tree = kit.metadata().secrets_tree();
        let opts = ParseOptions {
            root_ca_path: env.config().root_ca_path.clone(),
            filter,
        };
        Ok(parse(&tree, features, &opts)?)
    }
}
