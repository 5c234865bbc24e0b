//! `genesis check`

use super::Workspace;
use crate::ui::progress::ProgressRenderer;
use colored::Colorize;
use genesis_env::Reactor;
use genesis_secrets::Validator;
use genesis_types::SecretAction;

/// Run the pre-deployment checks without deploying.
pub fn run(ws: &Workspace, env_name: &str) -> anyhow::Result<i32> {
    let env = ws.load_environment(env_name)?;
    ws.vault.require_usable(&env.secrets_mount())?;

    let kit = ws.load_kit(&env)?;
    let features = ws.features(&env, &kit)?;
    let plans = ws.plans(&env, &kit, &features, None)?;

    println!(
        "checking {} (kit {}/{}, features: {})",
        env.name().to_string().bold(),
        kit.metadata().name,
        kit.metadata().version,
        if features.is_empty() {
            "none".to_string()
        } else {
            features.join(", ")
        }
    );

    // the director is optional here: check what can be checked offline
    let director = super::deploy::director_for(ws, &env).ok();

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
    .with_plans(plans.clone())
    .with_call("check");
    if let Some((bosh, _)) = director {
        reactor = reactor.with_bosh(bosh);
    }
    reactor.check()?;

    // detailed per-secret report
    let validator = Validator::new(&ws.vault, env.secrets_base()?);
    let mut renderer = ProgressRenderer::new(true);
    let summary = validator.validate(&plans, SecretAction::Check, &mut renderer)?;

    if summary.failed(false) {
        println!("{}", "environment is NOT ready to deploy".red());
        return Ok(1);
    }
    println!("{}", "environment is ready to deploy".green());
    Ok(0)
}
