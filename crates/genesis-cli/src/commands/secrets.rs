//! `genesis secrets`

use super::Workspace;
use crate::cli::SecretsCommand;
use crate::ui::progress::ProgressRenderer;
use genesis_secrets::{Executor, Validator};
use genesis_types::SecretAction;

/// Run a secret lifecycle action for one environment.
pub fn run(ws: &Workspace, env_name: &str, action: SecretsCommand) -> anyhow::Result<i32> {
    let env = ws.load_environment(env_name)?;
    ws.vault.require_usable(&env.secrets_mount())?;

    let base = env.secrets_base()?;

    // user-provided values need no kit or plan set
    if let SecretsCommand::Set { path, key, value } = &action {
        return set_value(ws, &base, path, key, value.as_deref());
    }

    let kit = ws.load_kit(&env)?;
    let features = ws.features(&env, &kit)?;

    let (secret_action, filter, confirm, strict) = match &action {
        SecretsCommand::Add { filter } => (SecretAction::Add, filter.clone(), None, false),
        SecretsCommand::Rotate { filter, yes } => (
            SecretAction::Recreate,
            filter.clone(),
            (!yes).then(|| "Regenerate these secrets? Existing values will be replaced."),
            false,
        ),
        SecretsCommand::Renew { filter } => (SecretAction::Renew, filter.clone(), None, false),
        SecretsCommand::Remove { filter, yes } => (
            SecretAction::Remove,
            filter.clone(),
            (!yes).then(|| "Remove these secrets from the store? This cannot be undone."),
            false,
        ),
        SecretsCommand::Check { filter } => (SecretAction::Check, filter.clone(), None, false),
        SecretsCommand::Validate { filter, strict } => {
            (SecretAction::Validate, filter.clone(), None, *strict)
        }
        SecretsCommand::Set { .. } => unreachable!("handled above"),
    };

    let plans = ws.plans(&env, &kit, &features, filter)?;

    if let Some(question) = confirm {
        let proceed = ws.prompter.confirm(
            &format!("{} ({} secret(s) affected)", question, plans.len()),
            false,
        )?;
        if !proceed {
            println!("aborted");
            return Ok(1);
        }
    }

    let verbose = matches!(
        secret_action,
        SecretAction::Check | SecretAction::Validate
    );
    let mut renderer = ProgressRenderer::new(verbose);

    let summary = match secret_action {
        SecretAction::Check | SecretAction::Validate => {
            let validator = Validator::new(&ws.vault, base);
            validator.validate(&plans, secret_action, &mut renderer)?
        }
        _ => {
            let executor = Executor::new(&ws.vault, base);
            executor.execute(&plans, secret_action, &mut renderer)?
        }
    };

    Ok(if summary.failed(strict) { 1 } else { 0 })
}

/// Write one `path:key` under the environment's secrets base. With no
/// value on the command line, the store CLI prompts on the controlling
/// terminal so the value never appears in process listings or history.
fn set_value(
    ws: &Workspace,
    base: &str,
    path: &str,
    key: &str,
    value: Option<&str>,
) -> anyhow::Result<i32> {
    let full = format!("{}{}", base, path.trim_matches('/'));

    match value {
        Some(value) => ws.vault.set(&full, key, value)?,
        None => {
            if ws.no_prompt || !genesis_core::term::in_controlling_terminal() {
                anyhow::bail!(
                    "no value given for {}:{} and prompting is unavailable; \
                     pass the value as an argument or re-run interactively",
                    full,
                    key
                );
            }
            ws.vault.set_interactive(&full, key)?;
        }
    }

    println!("wrote {}:{}", full, key);
    Ok(0)
}
