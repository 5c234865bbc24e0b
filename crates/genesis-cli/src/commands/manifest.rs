//! `genesis manifest`

use super::Workspace;
use std::collections::BTreeMap;

/// Generate and print the deployment manifest.
pub fn run(ws: &Workspace, env_name: &str, redact: bool) -> anyhow::Result<i32> {
    let env = ws.load_environment(env_name)?;
    let kit = ws.load_kit(&env)?;
    let features = ws.features(&env, &kit)?;

    let mut hook_env = BTreeMap::new();
    hook_env.insert("GENESIS_ROOT".to_string(), ws.root.display().to_string());
    hook_env.insert(
        "GENESIS_ENVIRONMENT".to_string(),
        env.name().as_str().to_string(),
    );
    let fragments = kit.fragments(ws.runner.as_ref(), &features, &hook_env, &ws.root)?;

    let mut merge_env = BTreeMap::new();
    if redact {
        merge_env.insert("REDACT".to_string(), "yes".to_string());
    }

    let manifest = env.manifest(&features, &fragments, &[], &merge_env)?;
    print!("{}", manifest);
    Ok(0)
}
