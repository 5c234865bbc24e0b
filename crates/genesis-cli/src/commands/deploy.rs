//! `genesis deploy`

use super::Workspace;
use colored::Colorize;
use genesis_env::{DeployOptions, Environment, Exodus, Reactor};
use genesis_services::bosh::{Bosh, BoshConnection};
use genesis_services::CredhubInfo;
use genesis_types::SemVer;
use tracing::debug;

/// Oldest BOSH CLI the engine will drive.
const MIN_BOSH_VERSION: &str = "6.4.0";

/// Resolve the deploying director's connection (and credhub) from its
/// own exodus data.
pub(crate) fn director_for(
    ws: &Workspace,
    env: &Environment,
) -> anyhow::Result<(Bosh, Option<CredhubInfo>)> {
    let min = SemVer::parse(MIN_BOSH_VERSION)?;

    if env.config().use_create_env {
        let bosh = Bosh::find(ws.runner.clone(), BoshConnection::default(), &min)?;
        return Ok((bosh, None));
    }

    let bref = env.bosh_env();
    let mut mount = bref.mount.clone().unwrap_or_else(|| env.exodus_mount());
    if !mount.ends_with('/') {
        mount.push('/');
    }
    let record_path = format!(
        "{}{}/{}",
        mount,
        bref.alias,
        bref.deploy_type.as_deref().unwrap_or("bosh")
    );
    debug!("reading director connection from {}", record_path);
    let record = Exodus::new(&ws.vault).fetch(&record_path)?;

    let connection = BoshConnection {
        alias: bref.alias.clone(),
        environment: record.get("url").cloned().unwrap_or_default(),
        ca_cert: record.get("ca_cert").cloned(),
        client: record
            .get("admin_username")
            .or_else(|| record.get("client"))
            .cloned(),
        client_secret: record
            .get("admin_password")
            .or_else(|| record.get("client_secret"))
            .cloned(),
        deployment: None,
    };

    // genesis.credhub_env points credhub data at a different exodus
    // record than the deploying director's
    let credhub_record = match &env.config().credhub_env {
        Some(reference) => {
            let cref = genesis_env::BoshEnvRef::parse(reference);
            let path = format!(
                "{}{}/{}",
                mount,
                cref.alias,
                cref.deploy_type.as_deref().unwrap_or("bosh")
            );
            Exodus::new(&ws.vault).fetch(&path)?
        }
        None => record.clone(),
    };

    let credhub = CredhubInfo::from_exodus(&credhub_record).map(|mut credhub| {
        credhub.base = format!(
            "/{}/{}/",
            bref.alias,
            env.deployment_name().unwrap_or_default()
        );
        credhub
    });

    let bosh = Bosh::find(ws.runner.clone(), connection, &min)?;
    Ok((bosh, credhub))
}

/// Deploy one environment.
pub fn run(
    ws: &Workspace,
    env_name: &str,
    dry_run: bool,
    yes: bool,
    flags: Vec<String>,
) -> anyhow::Result<i32> {
    let env = ws.load_environment(env_name)?;
    ws.vault.require_usable(&env.secrets_mount())?;

    let kit = ws.load_kit(&env)?;
    let features = ws.features(&env, &kit)?;
    let plans = ws.plans(&env, &kit, &features, None)?;
    let (bosh, credhub) = director_for(ws, &env)?;

    let workdir = tempfile::tempdir()?;
    let mut reactor = Reactor::new(
        &env,
        &kit,
        ws.vault.clone(),
        ws.runner.clone(),
        ws.prompter.clone(),
        workdir.path(),
    )
    .with_features(features)
    .with_plans(plans)
    .with_bosh(bosh)
    .with_call("deploy");
    if let Some(credhub) = credhub {
        reactor = reactor.with_credhub(credhub);
    }

    let outcome = reactor.deploy(&DeployOptions {
        flags,
        dry_run,
        yes,
    })?;

    if dry_run {
        println!("{} {} (dry run; nothing deployed)", "✓".green(), env.name());
    } else {
        println!(
            "{} {} deployed ({})",
            "✓".green(),
            env.name(),
            outcome.manifest_sha1.as_deref().unwrap_or("-")
        );
    }
    Ok(0)
}
