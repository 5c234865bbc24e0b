//! The deployment reactor.
//!
//! Drives check → manifest → pre-deploy hook → reactions → deploy →
//! post-deploy → Exodus publication for one environment. Kit hooks,
//! reaction scripts, and reaction addons are the same shape of external
//! task: resolve the command, assemble the documented environment,
//! invoke, interpret the exit code.

use crate::environment::{Environment, Reaction};
use crate::exodus::{flatten, interpolate, Exodus};
use genesis_core::process::{ProcessCommand, Runner};
use genesis_core::term::Prompter;
use genesis_kit::Kit;
use genesis_secrets::{NullSink, SecretPlan, Validator};
use genesis_services::bosh::{stemcell_available, Bosh};
use genesis_services::{ConfigSet, CredhubInfo, Vault};
use genesis_types::{GenesisError, HookType, Result, SecretAction};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};

/// Caller-facing deploy options.
#[derive(Debug, Clone, Default)]
pub struct DeployOptions {
    /// Flags passed through to the BOSH driver.
    pub flags: Vec<String>,
    /// Generate everything but do not deploy, publish, or run
    /// post-deploy hooks.
    pub dry_run: bool,
    /// The caller confirmed potentially destructive divergence
    /// non-interactively.
    pub yes: bool,
}

/// What a deploy produced.
#[derive(Debug, Clone, Default)]
pub struct DeployOutcome {
    /// SHA-1 of the cached redacted manifest (absent on dry runs).
    pub manifest_sha1: Option<String>,
}

/// Orchestrates one environment's deploy pipeline.
pub struct Reactor<'a> {
    env: &'a Environment,
    kit: &'a Kit,
    vault: Arc<Vault>,
    runner: Arc<dyn Runner>,
    prompter: Arc<dyn Prompter>,
    workdir: PathBuf,
    features: Vec<String>,
    plans: Vec<SecretPlan>,
    bosh: Option<Bosh>,
    configs: ConfigSet,
    credhub: Option<CredhubInfo>,
    call: String,
}

impl<'a> Reactor<'a> {
    /// Create a reactor; optional collaborators attach via `with_*`.
    pub fn new(
        env: &'a Environment,
        kit: &'a Kit,
        vault: Arc<Vault>,
        runner: Arc<dyn Runner>,
        prompter: Arc<dyn Prompter>,
        workdir: impl Into<PathBuf>,
    ) -> Self {
        let workdir = workdir.into();
        Self {
            env,
            kit,
            vault,
            runner,
            prompter,
            configs: ConfigSet::new(&workdir),
            workdir,
            features: Vec::new(),
            plans: Vec::new(),
            bosh: None,
            credhub: None,
            call: "deploy".to_string(),
        }
    }

    /// Enabled features (already passed through the kit's features hook).
    pub fn with_features(mut self, features: Vec<String>) -> Self {
        self.features = features;
        self
    }

    /// Ordered secret plans for the check phase.
    pub fn with_plans(mut self, plans: Vec<SecretPlan>) -> Self {
        self.plans = plans;
        self
    }

    /// The BOSH driver (absent only in tests or fully self-contained
    /// create-env runs).
    pub fn with_bosh(mut self, bosh: Bosh) -> Self {
        self.bosh = Some(bosh);
        self
    }

    /// Credhub connection for exodus interpolation and hook env.
    pub fn with_credhub(mut self, credhub: CredhubInfo) -> Self {
        self.credhub = Some(credhub);
        self
    }

    /// The user-facing command, for `GENESIS_CALL_FULL`.
    pub fn with_call(mut self, call: impl Into<String>) -> Self {
        self.call = call.into();
        self
    }

    /// The documented hook environment contract, assembled in one place.
    pub fn hook_env(&self) -> Result<BTreeMap<String, String>> {
        let env = self.env;
        let name = env.name().as_str();
        let deploy_type = env.deploy_type()?;
        let config = env.config();
        let mut vars = BTreeMap::new();

        vars.insert("GENESIS_ROOT".into(), env.root().display().to_string());
        vars.insert("GENESIS_ENVIRONMENT".into(), name.to_string());
        vars.insert("GENESIS_TYPE".into(), deploy_type.to_string());

        let bin = genesis_core::APP_NAME;
        vars.insert("GENESIS_CALL_BIN".into(), bin.to_string());
        vars.insert("GENESIS_CALL_ENV".into(), format!("{} {}", bin, name));
        vars.insert("GENESIS_CALL_PREFIX".into(), format!("{} {}", bin, name));
        vars.insert(
            "GENESIS_CALL_FULL".into(),
            format!("{} {} {}", bin, name, self.call),
        );

        let params = env.params()?;
        let params_json = match params.get("params") {
            Some(p) => serde_json::to_string(&yaml_to_json(p.clone())?)?,
            None => "{}".to_string(),
        };
        vars.insert("GENESIS_ENVIRONMENT_PARAMS".into(), params_json);

        vars.insert(
            "GENESIS_MIN_VERSION".into(),
            config.min_version.clone().unwrap_or_default(),
        );
        vars.insert("GENESIS_TARGET_VAULT".into(), self.vault.url().to_string());
        vars.insert(
            "GENESIS_VERIFY_VAULT".into(),
            if self.vault.target().verify { "1" } else { "" }.to_string(),
        );

        vars.insert(
            "GENESIS_KIT_NAME".into(),
            self.kit.metadata().name.clone(),
        );
        vars.insert(
            "GENESIS_KIT_VERSION".into(),
            self.kit.metadata().version.clone(),
        );

        vars.insert("GENESIS_SECRETS_MOUNT".into(), env.secrets_mount());
        vars.insert("GENESIS_SECRETS_BASE".into(), env.secrets_base()?);
        vars.insert(
            "GENESIS_SECRETS_MOUNT_OVERRIDE".into(),
            config.secrets_mount.clone().unwrap_or_default(),
        );
        vars.insert("GENESIS_SECRETS_SLUG".into(), env.secrets_path()?);

        vars.insert("GENESIS_EXODUS_MOUNT".into(), env.exodus_mount());
        vars.insert("GENESIS_EXODUS_BASE".into(), env.exodus_base()?);
        vars.insert(
            "GENESIS_EXODUS_MOUNT_OVERRIDE".into(),
            config.exodus_mount.clone().unwrap_or_default(),
        );

        vars.insert("GENESIS_CI_MOUNT".into(), env.ci_mount());
        vars.insert(
            "GENESIS_CI_BASE".into(),
            format!("{}{}/{}", env.ci_mount(), deploy_type, name),
        );
        vars.insert(
            "GENESIS_CI_MOUNT_OVERRIDE".into(),
            config.ci_mount.clone().unwrap_or_default(),
        );

        vars.insert(
            "GENESIS_ROOT_CA_PATH".into(),
            config.root_ca_path.clone().unwrap_or_default(),
        );
        vars.insert(
            "GENESIS_REQUESTED_FEATURES".into(),
            self.features.join(" "),
        );

        vars.extend(self.configs.env_vars());

        if let Some(credhub) = &self.credhub {
            vars.extend(credhub.env_vars());
        }

        // BOSH_* is cleared under create-env: those hooks must never
        // reach for a director.
        if !config.use_create_env {
            if let Some(bosh) = &self.bosh {
                let mut conn = bosh.connection().clone();
                conn.deployment = Some(env.deployment_name()?);
                vars.extend(conn.env_vars());
            }
        }

        Ok(vars)
    }

    /// Check phase: kit check hook, secret existence, required configs.
    pub fn check(&mut self) -> Result<()> {
        let hook_env = self.hook_env()?;

        if self.kit.hooks().has(HookType::Check) {
            self.kit.hooks().run_required(
                self.runner.as_ref(),
                HookType::Check,
                &[],
                &hook_env,
                self.env.root(),
            )?;
        }

        let base = self.env.secrets_base()?;
        let validator = Validator::new(&self.vault, base);
        let summary = validator.validate(&self.plans, SecretAction::Check, &mut NullSink)?;
        if summary.failed(false) {
            return Err(GenesisError::Store(format!(
                "Secrets are not ready: {} missing, {} error(s). \
                 Run the secrets add action and retry.",
                summary.missing, summary.error
            )));
        }

        if let Some(bosh) = &self.bosh {
            let required = self.kit.metadata().required_configs();
            for (config_type, name) in &required {
                self.configs.fetch(bosh, config_type, name)?;
                self.configs.require(config_type, name)?;
            }
        }

        Ok(())
    }

    /// Verify every stemcell the manifest asks for is on the director,
    /// resolving `latest` and `<N>.latest` forms.
    fn verify_stemcells(&self, manifest: &str, bosh: &Bosh) -> Result<()> {
        #[derive(Deserialize)]
        struct StemcellRequest {
            #[serde(default)]
            os: Option<String>,
            #[serde(default)]
            version: Option<String>,
        }

        #[derive(Deserialize)]
        struct ManifestTop {
            #[serde(default)]
            stemcells: Vec<StemcellRequest>,
        }

        let top: ManifestTop = serde_yaml::from_str(manifest).unwrap_or(ManifestTop {
            stemcells: Vec::new(),
        });
        if top.stemcells.is_empty() {
            return Ok(());
        }

        let uploaded = bosh.stemcells()?;
        let mut missing = Vec::new();
        for request in &top.stemcells {
            let os = request.os.as_deref().unwrap_or_default();
            let version = request.version.as_deref().unwrap_or("latest");
            if !stemcell_available(os, version, &uploaded) {
                missing.push(format!("{}/{}", os, version));
            }
        }

        if !missing.is_empty() {
            return Err(GenesisError::Deploy(format!(
                "Stemcell(s) not found on the director: {}. Upload them and retry.",
                missing.join(", ")
            )));
        }
        Ok(())
    }

    /// Run one reaction list in declaration order; the first non-zero
    /// exit aborts the remainder.
    fn run_reactions(
        &self,
        reactions: &[Reaction],
        base_env: &BTreeMap<String, String>,
    ) -> Result<()> {
        let mut captured: BTreeMap<String, String> = BTreeMap::new();

        for reaction in reactions {
            reaction.validate()?;
            let mut env = base_env.clone();
            env.extend(captured.clone());

            let (label, code, stdout) = match (&reaction.script, &reaction.addon) {
                (Some(script), _) => {
                    let path = self.env.root().join(script);
                    let out = self.runner.run(
                        &ProcessCommand::new(path.display().to_string())
                            .args(reaction.args.iter().cloned())
                            .envs(env)
                            .current_dir(self.env.root()),
                    )?;
                    (format!("script {}", script), out.code, out.stdout)
                }
                (_, Some(addon)) => {
                    let mut args = vec![addon.clone()];
                    args.extend(reaction.args.iter().cloned());
                    let result = self.kit.hooks().run(
                        self.runner.as_ref(),
                        HookType::Addon,
                        &args,
                        &env,
                        self.env.root(),
                    )?;
                    (format!("addon {}", addon), result.code, result.stdout)
                }
                _ => unreachable!("validate() rejects these"),
            };

            if code != 0 {
                return Err(GenesisError::Hook(format!(
                    "Reaction {} exited {}; aborting remaining reactions",
                    label, code
                )));
            }
            if let Some(var) = &reaction.var {
                captured.insert(var.clone(), stdout.trim_end().to_string());
            }
        }
        Ok(())
    }

    /// The deploy pipeline.
    pub fn deploy(&mut self, opts: &DeployOptions) -> Result<DeployOutcome> {
        self.check()?;

        let hook_env = self.hook_env()?;
        let fragments = self.kit.fragments(
            self.runner.as_ref(),
            &self.features,
            &hook_env,
            self.env.root(),
        )?;
        let config_files: Vec<PathBuf> = self
            .configs
            .records()
            .iter()
            .map(|r| r.path.clone())
            .collect();

        info!("generating manifest for {}", self.env.name());
        let manifest =
            self.env
                .manifest(&self.features, &fragments, &config_files, &BTreeMap::new())?;
        let manifest_file = self.workdir.join("manifest.yml");
        genesis_core::fs::write_file(&manifest_file, &manifest)?;

        if !self.env.config().use_create_env {
            if let Some(bosh) = &self.bosh {
                self.verify_stemcells(&manifest, bosh)?;
            }
        }

        // pre-deploy hook; any stdout payload lands in the datafile
        let datafile = self.workdir.join("predeploy-data");
        if self.kit.hooks().has(HookType::PreDeploy) {
            let result = self.kit.hooks().run_required(
                self.runner.as_ref(),
                HookType::PreDeploy,
                &[],
                &hook_env,
                self.env.root(),
            )?;
            if !result.stdout.is_empty() {
                genesis_core::fs::write_file(&datafile, &result.stdout)?;
            }
        }

        // redacted manifest and BOSH-variables file
        let mut redact_env = BTreeMap::new();
        redact_env.insert("REDACT".to_string(), "yes".to_string());
        let redacted =
            self.env
                .manifest(&self.features, &fragments, &config_files, &redact_env)?;

        let vars_content = extract_bosh_vars(&manifest)?;
        let vars_file = self.workdir.join(format!("{}.vars", self.env.name()));
        genesis_core::fs::write_file(&vars_file, &vars_content)?;

        let mut reaction_env = hook_env.clone();
        reaction_env.insert(
            "GENESIS_PREDEPLOY_DATAFILE".into(),
            datafile.display().to_string(),
        );
        reaction_env.insert(
            "GENESIS_MANIFEST_FILE".into(),
            manifest_file.display().to_string(),
        );
        reaction_env.insert(
            "GENESIS_BOSHVARS_FILE".into(),
            vars_file.display().to_string(),
        );
        reaction_env.insert(
            "GENESIS_DEPLOY_OPTIONS".into(),
            serde_json::to_string(&opts.flags)?,
        );
        reaction_env.insert(
            "GENESIS_DEPLOY_DRYRUN".into(),
            if opts.dry_run { "true" } else { "false" }.to_string(),
        );

        self.run_reactions(&self.env.config().reactions.pre_deploy.clone(), &reaction_env)?;

        if opts.dry_run {
            info!("dry-run: skipping deploy, exodus, and post-deploy phases");
            return Ok(DeployOutcome::default());
        }

        self.confirm_no_drift(opts)?;

        let deploy_result = self.invoke_driver(opts, &manifest_file, &vars_file);
        let rc = if deploy_result.is_ok() { 0 } else { 1 };

        let mut outcome = DeployOutcome::default();
        if rc == 0 {
            outcome.manifest_sha1 = Some(self.record_success(&manifest, &redacted)?);
        }

        // post-deploy hook and reactions run regardless of the deploy's
        // fate; they see GENESIS_DEPLOY_RC
        reaction_env.insert("GENESIS_DEPLOY_RC".into(), rc.to_string());
        if self.kit.hooks().has(HookType::PostDeploy) {
            let result = self.kit.hooks().run(
                self.runner.as_ref(),
                HookType::PostDeploy,
                &[],
                &reaction_env,
                self.env.root(),
            )?;
            if !result.success() {
                warn!("post-deploy hook exited {}", result.code);
            }
        }
        if let Err(e) =
            self.run_reactions(&self.env.config().reactions.post_deploy.clone(), &reaction_env)
        {
            warn!("post-deploy reactions aborted: {}", e);
        }

        deploy_result?;
        Ok(outcome)
    }

    /// Fail (or prompt) when the local cached manifest does not match
    /// what the last recorded deployment published.
    fn confirm_no_drift(&self, opts: &DeployOptions) -> Result<()> {
        let exodus = Exodus::new(&self.vault);
        let previous = exodus.fetch(&self.env.exodus_base()?)?;
        let Some(published_sha1) = previous.get(crate::exodus::MANIFEST_SHA1_KEY) else {
            return Ok(());
        };

        if !self
            .env
            .cache()
            .drifted(self.env.name().as_str(), published_sha1)?
        {
            return Ok(());
        }

        warn!(
            "cached manifest for {} differs from the last recorded deployment",
            self.env.name()
        );
        if opts.yes {
            return Ok(());
        }
        let proceed = self.prompter.confirm(
            "The cached manifest does not match the last deployment of this \
             environment. Deploy anyway?",
            false,
        )?;
        if !proceed {
            return Err(GenesisError::Deploy(
                "Aborted due to manifest drift".to_string(),
            ));
        }
        Ok(())
    }

    fn invoke_driver(
        &self,
        opts: &DeployOptions,
        manifest_file: &std::path::Path,
        vars_file: &std::path::Path,
    ) -> Result<()> {
        let bosh = self.bosh.as_ref().ok_or_else(|| {
            GenesisError::Dependency("No BOSH driver available for deployment".to_string())
        })?;

        if self.env.config().use_create_env {
            let state_file = self.env.cache().state_path(self.env.name().as_str());
            if let Some(parent) = state_file.parent() {
                std::fs::create_dir_all(parent)?;
            }
            bosh.create_env(manifest_file, &state_file, Some(vars_file), &opts.flags)
        } else {
            bosh.deploy(&self.env.deployment_name()?, manifest_file, &opts.flags)
        }
    }

    /// Cache the redacted manifest and publish the Exodus record; the
    /// last side effect of a successful deploy.
    fn record_success(&self, manifest: &str, redacted: &str) -> Result<String> {
        let env_name = self.env.name().as_str();
        let sha1 = self.env.cache().store_manifest(env_name, redacted)?;
        self.env
            .cache()
            .store_vars(env_name, &extract_bosh_vars(manifest)?)?;

        let parsed: serde_yaml::Value = serde_yaml::from_str(manifest)?;
        let exodus_value = parsed
            .get("exodus")
            .cloned()
            .unwrap_or(serde_yaml::Value::Null);
        let mut data = flatten(&yaml_to_json(exodus_value)?);

        let vars: serde_yaml::Value = serde_yaml::from_str(&extract_bosh_vars(manifest)?)
            .unwrap_or(serde_yaml::Value::Null);
        let runner = self.runner.clone();
        interpolate(
            &mut data,
            &vars,
            self.credhub.as_ref().map(|c| (c, &runner)),
        )?;

        Exodus::new(&self.vault).publish(&self.env.exodus_base()?, data, &sha1)?;
        Ok(sha1)
    }
}

/// The BOSH-variables document: the manifest's `bosh-variables` subtree.
fn extract_bosh_vars(manifest: &str) -> Result<String> {
    let parsed: serde_yaml::Value = serde_yaml::from_str(manifest)?;
    match parsed.get("bosh-variables") {
        Some(vars) if !vars.is_null() => Ok(serde_yaml::to_string(vars)?),
        _ => Ok("{}\n".to_string()),
    }
}

fn yaml_to_json(value: serde_yaml::Value) -> Result<serde_json::Value> {
    serde_json::to_value(value).map_err(GenesisError::from)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::environment::tests::SimpleMerger;
    use genesis_core::process::ScriptedRunner;
    use genesis_core::term::DeniedPrompter;
    use genesis_services::bosh::BoshConnection;
    use genesis_services::target::StoreTarget;
    use genesis_types::{EnvName, SemVer};
    use tempfile::TempDir;

    struct Fixture {
        root: TempDir,
        kit_dir: TempDir,
        workdir: TempDir,
        runner: Arc<ScriptedRunner>,
    }

    impl Fixture {
        fn new(env_extra: &str) -> Self {
            let root = TempDir::new().unwrap();
            std::fs::write(
                root.path().join("lab.yml"),
                format!(
                    "genesis:\n  env: lab\n  use_create_env: true\n{}kit:\n  name: shield\n  version: 2.1.0\n",
                    env_extra
                ),
            )
            .unwrap();

            let kit_dir = TempDir::new().unwrap();
            std::fs::write(
                kit_dir.path().join("kit.yml"),
                "name: shield\nversion: 2.1.0\n",
            )
            .unwrap();
            std::fs::write(
                kit_dir.path().join("base.yml"),
                "exodus:\n  url: https://shield.example\n",
            )
            .unwrap();

            Self {
                root,
                kit_dir,
                workdir: TempDir::new().unwrap(),
                runner: Arc::new(ScriptedRunner::new()),
            }
        }

        fn environment(&self) -> Environment {
            Environment::load(
                self.root.path(),
                &EnvName::new("lab").unwrap(),
                Arc::new(SimpleMerger),
            )
            .unwrap()
        }

        fn kit(&self) -> Kit {
            Kit::load(self.kit_dir.path()).unwrap()
        }

        fn vault(&self) -> Arc<Vault> {
            Arc::new(Vault::new(
                StoreTarget::new("lab", "https://vault.lab.example:8200", true).unwrap(),
                self.runner.clone(),
            ))
        }

        fn bosh(&self) -> Bosh {
            Bosh::with_binary(
                "bosh",
                SemVer::parse("7.0.0").unwrap(),
                BoshConnection::default(),
                self.runner.clone(),
            )
        }
    }

    #[test]
    fn test_hook_env_contract() {
        let fx = Fixture::new("");
        let env = fx.environment();
        let kit = fx.kit();
        let reactor = Reactor::new(
            &env,
            &kit,
            fx.vault(),
            fx.runner.clone(),
            Arc::new(DeniedPrompter),
            fx.workdir.path(),
        )
        .with_features(vec!["base".to_string(), "ha".to_string()]);

        let vars = reactor.hook_env().unwrap();
        assert_eq!(vars["GENESIS_ENVIRONMENT"], "lab");
        assert_eq!(vars["GENESIS_TYPE"], "shield");
        assert_eq!(vars["GENESIS_KIT_NAME"], "shield");
        assert_eq!(vars["GENESIS_KIT_VERSION"], "2.1.0");
        assert_eq!(vars["GENESIS_SECRETS_BASE"], "secret/lab/shield/");
        assert_eq!(vars["GENESIS_SECRETS_SLUG"], "lab/shield");
        assert_eq!(vars["GENESIS_EXODUS_BASE"], "secret/exodus/lab/shield");
        assert_eq!(vars["GENESIS_REQUESTED_FEATURES"], "base ha");
        assert_eq!(vars["GENESIS_TARGET_VAULT"], "https://vault.lab.example:8200");
        assert_eq!(vars["GENESIS_VERIFY_VAULT"], "1");
        assert_eq!(vars["GENESIS_CALL_FULL"], "genesis lab deploy");
        // create-env: no director leakage into hooks
        assert!(!vars.contains_key("BOSH_ENVIRONMENT"));
    }

    #[test]
    fn test_dry_run_generates_but_does_not_deploy() {
        let fx = Fixture::new("");
        // secrets check export
        fx.runner.push_output("{}", 0);

        let env = fx.environment();
        let kit = fx.kit();
        let mut reactor = Reactor::new(
            &env,
            &kit,
            fx.vault(),
            fx.runner.clone(),
            Arc::new(DeniedPrompter),
            fx.workdir.path(),
        );

        let outcome = reactor
            .deploy(&DeployOptions {
                dry_run: true,
                ..Default::default()
            })
            .unwrap();

        assert!(outcome.manifest_sha1.is_none());
        let manifest =
            std::fs::read_to_string(fx.workdir.path().join("manifest.yml")).unwrap();
        assert!(manifest.contains("name: lab-shield"));
        assert!(manifest.contains("url: https://shield.example"));

        // nothing beyond the secrets export was invoked
        let lines = fx.runner.call_lines();
        assert_eq!(lines.len(), 1);
        assert!(lines[0].starts_with("safe export"));
    }

    #[test]
    fn test_create_env_deploy_publishes_exodus() {
        let fx = Fixture::new("");
        fx.runner.push_output("{}", 0); // secrets check export
        fx.runner.push_output("{}", 0); // drift: exodus fetch (empty)
        fx.runner.push_output("", 0); // bosh create-env
        fx.runner.push_output("", 1); // exodus publish: exists -> no
        fx.runner.push_output("", 0); // exodus publish: set

        let env = fx.environment();
        let kit = fx.kit();
        let mut reactor = Reactor::new(
            &env,
            &kit,
            fx.vault(),
            fx.runner.clone(),
            Arc::new(DeniedPrompter),
            fx.workdir.path(),
        )
        .with_bosh(fx.bosh());

        let outcome = reactor.deploy(&DeployOptions::default()).unwrap();
        let sha1 = outcome.manifest_sha1.unwrap();
        assert_eq!(sha1.len(), 40);

        let lines = fx.runner.call_lines();
        assert!(lines.iter().any(|l| l.starts_with("bosh -n create-env")));
        let set_line = lines
            .iter()
            .find(|l| l.starts_with("safe set secret/exodus/lab/shield"))
            .expect("exodus publication");
        assert!(set_line.contains(&format!("manifest_sha1={}", sha1)));
        assert!(set_line.contains("url=https://shield.example"));

        // cached redacted manifest matches the published fingerprint
        let cached = env.cache().load_manifest("lab").unwrap().unwrap();
        assert_eq!(genesis_manifest::manifest_sha1(&cached), sha1);
    }

    #[test]
    fn test_pre_deploy_reaction_failure_aborts() {
        let fx = Fixture::new(concat!(
            "  reactions:\n",
            "    pre-deploy:\n",
            "      - script: bin/first\n",
            "      - script: bin/second\n",
        ));
        fx.runner.push_output("{}", 0); // secrets check export
        fx.runner.push_failure("first failed", 3); // bin/first

        let env = fx.environment();
        let kit = fx.kit();
        let mut reactor = Reactor::new(
            &env,
            &kit,
            fx.vault(),
            fx.runner.clone(),
            Arc::new(DeniedPrompter),
            fx.workdir.path(),
        )
        .with_bosh(fx.bosh());

        let err = reactor.deploy(&DeployOptions::default()).unwrap_err();
        assert!(err.to_string().contains("bin/first"));

        // bin/second never ran, and neither did the driver
        let lines = fx.runner.call_lines();
        assert!(!lines.iter().any(|l| l.contains("bin/second")));
        assert!(!lines.iter().any(|l| l.contains("create-env")));
    }

    #[test]
    fn test_reaction_var_capture_feeds_later_entries() {
        let fx = Fixture::new("");
        let env = fx.environment();
        let kit = fx.kit();
        let reactor = Reactor::new(
            &env,
            &kit,
            fx.vault(),
            fx.runner.clone(),
            Arc::new(DeniedPrompter),
            fx.workdir.path(),
        );

        fx.runner.push_output("captured-value\n", 0);
        fx.runner.push_output("", 0);

        let reactions = vec![
            Reaction {
                script: Some("bin/emit".to_string()),
                addon: None,
                args: vec![],
                var: Some("EMITTED".to_string()),
            },
            Reaction {
                script: Some("bin/consume".to_string()),
                addon: None,
                args: vec![],
                var: None,
            },
        ];

        reactor
            .run_reactions(&reactions, &BTreeMap::new())
            .unwrap();

        let calls = fx.runner.calls();
        assert_eq!(calls.len(), 2);
        assert!(!calls[0].env.contains_key("EMITTED"));
        assert_eq!(calls[1].env["EMITTED"], "captured-value");
    }

    #[test]
    fn test_stemcell_verification() {
        let fx = Fixture::new("");
        let env = fx.environment();
        let kit = fx.kit();
        let reactor = Reactor::new(
            &env,
            &kit,
            fx.vault(),
            fx.runner.clone(),
            Arc::new(DeniedPrompter),
            fx.workdir.path(),
        );

        fx.runner.push_output(
            r#"{"Tables":[{"Rows":[{"name":"s1","os":"ubuntu-jammy","version":"1.181*"}]}]}"#,
            0,
        );
        let manifest = "stemcells:\n- os: ubuntu-jammy\n  version: latest\n";
        reactor.verify_stemcells(manifest, &fx.bosh()).unwrap();

        fx.runner.push_output(
            r#"{"Tables":[{"Rows":[{"name":"s1","os":"ubuntu-jammy","version":"1.181"}]}]}"#,
            0,
        );
        let manifest = "stemcells:\n- os: centos-7\n  version: latest\n";
        let err = reactor.verify_stemcells(manifest, &fx.bosh()).unwrap_err();
        assert!(err.to_string().contains("centos-7/latest"));
    }

    #[test]
    fn test_extract_bosh_vars() {
        let manifest = "name: x\nbosh-variables:\n  admin_password: sekrit\n";
        let vars = extract_bosh_vars(manifest).unwrap();
        assert!(vars.contains("admin_password: sekrit"));

        assert_eq!(extract_bosh_vars("name: x\n").unwrap(), "{}\n");
    }
}
