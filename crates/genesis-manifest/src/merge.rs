//! YAML merge-tool adapter.
//!
//! The engine does not implement a YAML merger; merging is an opaque
//! transformation performed by the external `spruce` binary. The
//! [`Merger`] trait is the seam tests stub out.

use genesis_core::process::{ProcessCommand, Runner};
use genesis_types::{GenesisError, Result};
use std::collections::BTreeMap;
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, trace};

/// Default merge binary.
pub const DEFAULT_MERGE_BINARY: &str = "spruce";

/// Options for one merge invocation.
#[derive(Debug, Clone, Default)]
pub struct MergeOptions {
    /// Suppress operator evaluation (`--skip-eval`); used for the
    /// parameter view where deferred values must survive untouched.
    pub skip_eval: bool,
    /// Paths pruned from the result.
    pub prune: Vec<String>,
    /// Paths cherry-picked into the result.
    pub cherry_pick: Vec<String>,
    /// Extra environment for the merge subprocess (operators may
    /// reference it).
    pub env: BTreeMap<String, String>,
}

impl MergeOptions {
    /// Options for an evaluation-suppressed merge.
    pub fn skip_eval() -> Self {
        Self {
            skip_eval: true,
            ..Default::default()
        }
    }
}

/// Merges YAML documents via an external tool.
pub trait Merger: Send + Sync {
    /// Merge files on disk, in order.
    fn merge_files(&self, files: &[PathBuf], opts: &MergeOptions) -> Result<String>;

    /// Merge in-memory documents, in order.
    fn merge_docs(&self, docs: &[String], opts: &MergeOptions) -> Result<String>;
}

/// [`Merger`] backed by the `spruce` binary.
pub struct SpruceMerger {
    binary: String,
    runner: Arc<dyn Runner>,
}

impl SpruceMerger {
    /// Create a merger using the default binary name.
    pub fn new(runner: Arc<dyn Runner>) -> Self {
        Self {
            binary: DEFAULT_MERGE_BINARY.to_string(),
            runner,
        }
    }

    /// Use a non-default merge binary.
    pub fn with_binary(mut self, binary: impl Into<String>) -> Self {
        self.binary = binary.into();
        self
    }

    /// Check the merge binary is invocable; fatal at startup otherwise.
    pub fn check_available(&self) -> Result<()> {
        let out = self
            .runner
            .run(&ProcessCommand::new(&self.binary).arg("--version"))?;
        if !out.success() {
            return Err(GenesisError::Dependency(format!(
                "The {} merge tool is not available (exit {})",
                self.binary, out.code
            )));
        }
        Ok(())
    }

    fn build_command(&self, files: &[PathBuf], opts: &MergeOptions) -> ProcessCommand {
        let mut cmd = ProcessCommand::new(&self.binary).arg("merge");
        if opts.skip_eval {
            cmd = cmd.arg("--skip-eval");
        }
        for path in &opts.prune {
            cmd = cmd.arg("--prune").arg(path);
        }
        for path in &opts.cherry_pick {
            cmd = cmd.arg("--cherry-pick").arg(path);
        }
        for file in files {
            cmd = cmd.arg(file.display().to_string());
        }
        cmd.envs(opts.env.clone())
    }
}

impl Merger for SpruceMerger {
    fn merge_files(&self, files: &[PathBuf], opts: &MergeOptions) -> Result<String> {
        if files.is_empty() {
            return Err(GenesisError::Manifest("No files to merge".to_string()));
        }

        debug!("merging {} file(s)", files.len());
        for (i, file) in files.iter().enumerate() {
            trace!("  [{}] {}", i, file.display());
        }

        let out = self.runner.run(&self.build_command(files, opts))?;
        if !out.success() {
            return Err(GenesisError::Manifest(format!(
                "Merge failed:\n{}",
                out.stderr
            )));
        }

        debug!("merge produced {} bytes", out.stdout.len());
        Ok(out.stdout)
    }

    fn merge_docs(&self, docs: &[String], opts: &MergeOptions) -> Result<String> {
        if docs.is_empty() {
            return Err(GenesisError::Manifest("No content to merge".to_string()));
        }

        let dir = tempfile::tempdir()
            .map_err(|e| GenesisError::Manifest(format!("Failed to create temp dir: {}", e)))?;

        let mut files = Vec::with_capacity(docs.len());
        for (i, doc) in docs.iter().enumerate() {
            let path = dir.path().join(format!("merge-{:03}.yml", i));
            let mut file = std::fs::File::create(&path)
                .map_err(|e| GenesisError::Manifest(format!("Failed to create temp file: {}", e)))?;
            file.write_all(doc.as_bytes())
                .map_err(|e| GenesisError::Manifest(format!("Failed to write temp file: {}", e)))?;
            files.push(path);
        }

        self.merge_files(&files, opts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use genesis_core::process::ScriptedRunner;

    #[test]
    fn test_command_shape() {
        let runner = Arc::new(ScriptedRunner::new());
        runner.push_output("merged: true\n", 0);
        let merger = SpruceMerger::new(runner.clone());

        let opts = MergeOptions {
            skip_eval: true,
            prune: vec!["meta".to_string()],
            cherry_pick: vec!["params".to_string()],
            env: BTreeMap::new(),
        };
        let merged = merger
            .merge_files(
                &[PathBuf::from("a.yml"), PathBuf::from("b.yml")],
                &opts,
            )
            .unwrap();

        assert_eq!(merged, "merged: true\n");
        assert_eq!(
            runner.call_lines(),
            vec!["spruce merge --skip-eval --prune meta --cherry-pick params a.yml b.yml"]
        );
    }

    #[test]
    fn test_merge_failure_carries_stderr() {
        let runner = Arc::new(ScriptedRunner::new());
        runner.push_failure("$.params.x: could not resolve", 1);
        let merger = SpruceMerger::new(runner);

        let err = merger
            .merge_files(&[PathBuf::from("a.yml")], &MergeOptions::default())
            .unwrap_err();
        assert!(err.to_string().contains("could not resolve"));
    }

    #[test]
    fn test_merge_docs_roundtrip_through_files() {
        let runner = Arc::new(ScriptedRunner::new());
        runner.push_output("ok: 1\n", 0);
        let merger = SpruceMerger::new(runner.clone());

        merger
            .merge_docs(&["a: 1\n".to_string(), "b: 2\n".to_string()], &MergeOptions::default())
            .unwrap();

        let call = &runner.calls()[0];
        // two temp files appended after "merge"
        assert_eq!(call.args.len(), 3);
        assert!(call.args[1].ends_with("merge-000.yml"));
        assert!(call.args[2].ends_with("merge-001.yml"));
    }

    #[test]
    fn test_empty_input_rejected() {
        let merger = SpruceMerger::new(Arc::new(ScriptedRunner::new()));
        assert!(merger.merge_files(&[], &MergeOptions::default()).is_err());
        assert!(merger.merge_docs(&[], &MergeOptions::default()).is_err());
    }
}
