//! Genesis command-line entry point.

mod cli;
mod commands;
mod ui;

use clap::Parser;
use cli::{Cli, Command};
use colored::Colorize;
use commands::Workspace;

fn main() {
    let cli = Cli::parse();
    let _ = genesis_core::log::init(cli.verbose);

    match run(&cli) {
        Ok(code) => std::process::exit(code),
        Err(e) => {
            eprintln!("{} {:#}", "error:".red().bold(), e);
            std::process::exit(1);
        }
    }
}

fn run(cli: &Cli) -> anyhow::Result<i32> {
    let ws = Workspace::initialize(cli)?;

    match &cli.command {
        Command::Deploy {
            env,
            dry_run,
            yes,
            flags,
        } => commands::deploy::run(&ws, &env.env, *dry_run, *yes, flags.clone()),
        Command::Check { env } => commands::check::run(&ws, &env.env),
        Command::Manifest { env, redact } => commands::manifest::run(&ws, &env.env, *redact),
        Command::Secrets { env, action } => {
            commands::secrets::run(&ws, &env.env, action.clone())
        }
    }
}
