//! Kit hook execution.
//!
//! Hooks are black-box executables under the kit's `hooks/` directory.
//! The engine resolves the script, injects the documented environment,
//! runs it to completion, and interprets exit code and captured stdout.

use genesis_core::process::{ProcessCommand, Runner};
use genesis_types::{GenesisError, HookType, Result};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Result from hook execution.
#[derive(Debug, Clone)]
pub struct HookResult {
    /// Exit code from the hook.
    pub code: i32,
    /// Captured standard output.
    pub stdout: String,
    /// Captured standard error.
    pub stderr: String,
}

impl HookResult {
    /// Whether the hook exited zero.
    pub fn success(&self) -> bool {
        self.code == 0
    }

    /// Non-empty trimmed stdout lines.
    pub fn lines(&self) -> Vec<String> {
        self.stdout
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .map(String::from)
            .collect()
    }
}

/// Locates and runs one kit's hooks.
pub struct HookRunner {
    kit_dir: PathBuf,
}

impl HookRunner {
    /// Hooks of the kit rooted at `kit_dir`.
    pub fn new(kit_dir: impl AsRef<Path>) -> Self {
        Self {
            kit_dir: kit_dir.as_ref().to_path_buf(),
        }
    }

    fn script_path(&self, hook: HookType) -> PathBuf {
        self.kit_dir.join("hooks").join(hook.script_name())
    }

    /// Whether the kit supplies `hook` as an executable script.
    pub fn has(&self, hook: HookType) -> bool {
        let path = self.script_path(hook);
        if !path.is_file() {
            return false;
        }
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            path.metadata()
                .map(|m| m.permissions().mode() & 0o111 != 0)
                .unwrap_or(false)
        }
        #[cfg(not(unix))]
        true
    }

    /// Run `hook` with the given arguments and environment, from the
    /// environment repo root.
    pub fn run(
        &self,
        runner: &dyn Runner,
        hook: HookType,
        args: &[String],
        env: &BTreeMap<String, String>,
        workdir: &Path,
    ) -> Result<HookResult> {
        let script = self.script_path(hook);
        if !self.has(hook) {
            return Err(GenesisError::Hook(format!(
                "Kit does not provide a {} hook ({})",
                hook,
                script.display()
            )));
        }

        debug!("running {} hook: {}", hook, script.display());
        let out = runner.run(
            &ProcessCommand::new(script.display().to_string())
                .args(args.iter().cloned())
                .envs(env.clone())
                .current_dir(workdir),
        )?;

        Ok(HookResult {
            code: out.code,
            stdout: out.stdout,
            stderr: out.stderr,
        })
    }

    /// Run `hook` and fail unless it exits zero.
    pub fn run_required(
        &self,
        runner: &dyn Runner,
        hook: HookType,
        args: &[String],
        env: &BTreeMap<String, String>,
        workdir: &Path,
    ) -> Result<HookResult> {
        let result = self.run(runner, hook, args, env, workdir)?;
        if !result.success() {
            return Err(GenesisError::Hook(format!(
                "Kit {} hook exited {}:\n{}",
                hook,
                result.code,
                if result.stderr.is_empty() {
                    result.stdout.clone()
                } else {
                    result.stderr.clone()
                }
            )));
        }
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use genesis_core::process::ScriptedRunner;
    use tempfile::TempDir;

    fn kit_with_hook(hook: &str) -> TempDir {
        let dir = TempDir::new().unwrap();
        let hooks = dir.path().join("hooks");
        std::fs::create_dir_all(&hooks).unwrap();
        let script = hooks.join(hook);
        std::fs::write(&script, "#!/bin/sh\necho hello\n").unwrap();
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();
        }
        dir
    }

    #[test]
    fn test_hook_discovery() {
        let dir = kit_with_hook("check");
        let hooks = HookRunner::new(dir.path());

        assert!(hooks.has(HookType::Check));
        assert!(!hooks.has(HookType::PreDeploy));
    }

    #[cfg(unix)]
    #[test]
    fn test_non_executable_hook_is_ignored() {
        use std::os::unix::fs::PermissionsExt;
        let dir = kit_with_hook("check");
        let script = dir.path().join("hooks/check");
        std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o644)).unwrap();

        assert!(!HookRunner::new(dir.path()).has(HookType::Check));
    }

    #[test]
    fn test_run_passes_env_and_args() {
        let dir = kit_with_hook("addon");
        let work = TempDir::new().unwrap();
        let hooks = HookRunner::new(dir.path());

        let runner = ScriptedRunner::new();
        runner.push_output("payload\n", 0);

        let mut env = BTreeMap::new();
        env.insert("GENESIS_ENVIRONMENT".to_string(), "lab".to_string());

        let result = hooks
            .run(
                &runner,
                HookType::Addon,
                &["rotate".to_string()],
                &env,
                work.path(),
            )
            .unwrap();

        assert!(result.success());
        assert_eq!(result.lines(), vec!["payload"]);

        let call = &runner.calls()[0];
        assert!(call.program.ends_with("hooks/addon"));
        assert_eq!(call.args, vec!["rotate"]);
        assert_eq!(call.env.get("GENESIS_ENVIRONMENT").unwrap(), "lab");
    }

    #[test]
    fn test_run_required_surfaces_failure() {
        let dir = kit_with_hook("check");
        let work = TempDir::new().unwrap();
        let hooks = HookRunner::new(dir.path());

        let runner = ScriptedRunner::new();
        runner.push_failure("bad environment", 2);

        let err = hooks
            .run_required(&runner, HookType::Check, &[], &BTreeMap::new(), work.path())
            .unwrap_err();
        assert!(err.to_string().contains("bad environment"));
    }
}
