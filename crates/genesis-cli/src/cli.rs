//! Command-line definition.

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

/// Genesis: a deployment-environment orchestrator.
#[derive(Debug, Parser)]
#[command(name = "genesis", version, about)]
pub struct Cli {
    /// Deployment repo root.
    #[arg(short = 'C', long = "cwd", default_value = ".", global = true)]
    pub cwd: PathBuf,

    /// Increase log verbosity (-v info, -vv debug, -vvv trace).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Never prompt; fail instead when interaction would be required.
    #[arg(long, global = true)]
    pub no_prompt: bool,

    /// Credentials store target (alias or URL); picked interactively
    /// when ambiguous.
    #[arg(long, global = true)]
    pub vault: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

/// Shared environment selector.
#[derive(Debug, Args)]
pub struct EnvArg {
    /// Environment name (its `<name>.yml` must exist in the repo).
    pub env: String,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Deploy an environment.
    Deploy {
        #[command(flatten)]
        env: EnvArg,

        /// Generate everything but do not deploy.
        #[arg(long)]
        dry_run: bool,

        /// Proceed without confirmation prompts.
        #[arg(short, long)]
        yes: bool,

        /// Flags passed through to the BOSH driver.
        #[arg(last = true)]
        flags: Vec<String>,
    },

    /// Run pre-deployment checks without deploying.
    Check {
        #[command(flatten)]
        env: EnvArg,
    },

    /// Generate and print the deployment manifest.
    Manifest {
        #[command(flatten)]
        env: EnvArg,

        /// Redact secret values.
        #[arg(long)]
        redact: bool,
    },

    /// Manage an environment's secrets.
    Secrets {
        #[command(flatten)]
        env: EnvArg,

        #[command(subcommand)]
        action: SecretsCommand,
    },
}

/// Secret lifecycle subcommands.
#[derive(Debug, Clone, Subcommand)]
pub enum SecretsCommand {
    /// Create any secrets that do not yet exist.
    Add {
        /// Limit to paths matching `/regex/`, `/regex/i`, or `!/regex/`.
        #[arg(long)]
        filter: Option<String>,
    },
    /// Regenerate secrets (fixed ones are left alone).
    Rotate {
        #[arg(long)]
        filter: Option<String>,
        /// Proceed without confirmation.
        #[arg(short, long)]
        yes: bool,
    },
    /// Renew certificates (other types are skipped).
    Renew {
        #[arg(long)]
        filter: Option<String>,
    },
    /// Remove secrets from the store.
    Remove {
        #[arg(long)]
        filter: Option<String>,
        /// Proceed without confirmation.
        #[arg(short, long)]
        yes: bool,
    },
    /// Write a user-provided secret value.
    Set {
        /// Store path, relative to the environment's secrets base.
        path: String,
        /// Key under the path.
        key: String,
        /// Value to store. When omitted, the store CLI prompts for it
        /// on the controlling terminal so the value never lands in
        /// shell history.
        value: Option<String>,
    },
    /// Verify secrets exist.
    Check {
        #[arg(long)]
        filter: Option<String>,
    },
    /// Deep-validate secrets (structure, crypto, policy).
    Validate {
        #[arg(long)]
        filter: Option<String>,
        /// Treat warnings as failures.
        #[arg(long)]
        strict: bool,
    },
}
