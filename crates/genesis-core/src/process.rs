//! Process execution utilities.
//!
//! Every external collaborator (the secrets CLI, the YAML merger, the
//! BOSH CLI, kit hooks) is invoked through the [`Runner`] seam so that
//! callers can be exercised against a scripted runner instead of real
//! binaries.

use genesis_types::{GenesisError, Result};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::process::{Command, Stdio};
use tracing::{debug, trace};

/// A fully described subprocess invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessCommand {
    /// Program name or path.
    pub program: String,
    /// Positional arguments.
    pub args: Vec<String>,
    /// Environment variables set for the child.
    pub env: BTreeMap<String, String>,
    /// Environment variables removed from the child's environment.
    pub env_remove: Vec<String>,
    /// Working directory for the child, if different from the parent's.
    pub cwd: Option<PathBuf>,
    /// When set, the child inherits the controlling terminal instead of
    /// having its streams captured.
    pub interactive: bool,
}

impl ProcessCommand {
    /// Describe an invocation of `program` with no arguments.
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            env: BTreeMap::new(),
            env_remove: Vec::new(),
            cwd: None,
            interactive: false,
        }
    }

    /// Append one argument.
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Append several arguments.
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Set an environment variable for the child.
    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    /// Merge a map of environment variables.
    pub fn envs(mut self, vars: impl IntoIterator<Item = (String, String)>) -> Self {
        self.env.extend(vars);
        self
    }

    /// Remove an environment variable from the child's environment.
    pub fn env_remove(mut self, key: impl Into<String>) -> Self {
        self.env_remove.push(key.into());
        self
    }

    /// Run the child in `dir`.
    pub fn current_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cwd = Some(dir.into());
        self
    }

    /// Let the child consume the controlling terminal.
    pub fn interactive(mut self, interactive: bool) -> Self {
        self.interactive = interactive;
        self
    }

    /// Render as a loggable command line.
    pub fn render(&self) -> String {
        let mut parts = vec![self.program.clone()];
        parts.extend(self.args.iter().cloned());
        parts.join(" ")
    }
}

/// Captured result of a subprocess run.
#[derive(Debug, Clone, Default)]
pub struct ProcessOutput {
    /// Captured standard output (empty for interactive runs).
    pub stdout: String,
    /// Captured standard error (empty for interactive runs).
    pub stderr: String,
    /// Exit code; -1 when the child was killed by a signal.
    pub code: i32,
}

impl ProcessOutput {
    /// Whether the child exited zero.
    pub fn success(&self) -> bool {
        self.code == 0
    }

    /// Stdout and stderr, concatenated for error reporting.
    pub fn combined(&self) -> String {
        if self.stderr.is_empty() {
            self.stdout.clone()
        } else if self.stdout.is_empty() {
            self.stderr.clone()
        } else {
            format!("{}\n{}", self.stdout, self.stderr)
        }
    }
}

/// Executes process commands.
///
/// The production implementation is [`ExecRunner`]; tests use
/// [`ScriptedRunner`] to supply canned outputs and record invocations.
pub trait Runner: Send + Sync {
    /// Run the command to completion, draining both output streams
    /// before the exit code is interpreted.
    fn run(&self, cmd: &ProcessCommand) -> Result<ProcessOutput>;
}

/// Runner that spawns real subprocesses.
#[derive(Debug, Default, Clone)]
pub struct ExecRunner;

impl Runner for ExecRunner {
    fn run(&self, spec: &ProcessCommand) -> Result<ProcessOutput> {
        trace!("exec: {}", spec.render());

        let mut cmd = Command::new(&spec.program);
        cmd.args(&spec.args);
        for (key, value) in &spec.env {
            cmd.env(key, value);
        }
        for key in &spec.env_remove {
            cmd.env_remove(key);
        }
        if let Some(dir) = &spec.cwd {
            cmd.current_dir(dir);
        }

        if spec.interactive {
            let status = cmd
                .stdin(Stdio::inherit())
                .stdout(Stdio::inherit())
                .stderr(Stdio::inherit())
                .status()
                .map_err(|e| {
                    GenesisError::Dependency(format!(
                        "Failed to run {}: {}",
                        spec.program, e
                    ))
                })?;

            return Ok(ProcessOutput {
                stdout: String::new(),
                stderr: String::new(),
                code: status.code().unwrap_or(-1),
            });
        }

        let output = cmd.output().map_err(|e| {
            GenesisError::Dependency(format!("Failed to run {}: {}", spec.program, e))
        })?;

        let result = ProcessOutput {
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
            code: output.status.code().unwrap_or(-1),
        };
        debug!("exec: {} -> exit {}", spec.render(), result.code);
        Ok(result)
    }
}

/// Runner that replays canned outputs and records every invocation.
///
/// Outputs are consumed in FIFO order; once the queue is exhausted every
/// further command succeeds with empty output. Intended for tests and
/// for dry-run inspection of the command stream.
#[derive(Default)]
pub struct ScriptedRunner {
    outputs: std::sync::Mutex<std::collections::VecDeque<ProcessOutput>>,
    calls: std::sync::Mutex<Vec<ProcessCommand>>,
}

impl ScriptedRunner {
    /// Create a runner with an empty output queue.
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a canned output.
    pub fn push_output(&self, stdout: impl Into<String>, code: i32) {
        self.outputs.lock().unwrap().push_back(ProcessOutput {
            stdout: stdout.into(),
            stderr: String::new(),
            code,
        });
    }

    /// Queue a canned output with stderr content.
    pub fn push_failure(&self, stderr: impl Into<String>, code: i32) {
        self.outputs.lock().unwrap().push_back(ProcessOutput {
            stdout: String::new(),
            stderr: stderr.into(),
            code,
        });
    }

    /// All commands run so far, in order.
    pub fn calls(&self) -> Vec<ProcessCommand> {
        self.calls.lock().unwrap().clone()
    }

    /// Rendered command lines for every call, in order.
    pub fn call_lines(&self) -> Vec<String> {
        self.calls().iter().map(|c| c.render()).collect()
    }
}

impl Runner for ScriptedRunner {
    fn run(&self, cmd: &ProcessCommand) -> Result<ProcessOutput> {
        self.calls.lock().unwrap().push(cmd.clone());
        Ok(self
            .outputs
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_default())
    }
}
