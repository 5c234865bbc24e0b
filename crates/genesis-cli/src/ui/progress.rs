//! Rendering of the secret engine's progress events.
//!
//! The engine emits a fixed event protocol and owns no rendering state;
//! this renderer holds the counters, elapsed clock, and display mode.
//! Single-line mode collapses everything onto one indicatif bar;
//! verbose mode prints one glyphed line per item.

use colored::Colorize;
use genesis_secrets::{ItemResult, ProgressEvent, ProgressSink};
use genesis_types::CheckStatus;
use indicatif::{ProgressBar, ProgressStyle};
use std::time::Instant;

/// Glyph for one outcome, colored for the terminal.
fn glyph(status: CheckStatus) -> String {
    match status {
        CheckStatus::Ok => "[✔]".green().to_string(),
        CheckStatus::Skipped => "[-]".dimmed().to_string(),
        CheckStatus::Missing => "[∅]".red().to_string(),
        CheckStatus::Error => "[✘]".red().to_string(),
        CheckStatus::Warn => "[⚠]".yellow().to_string(),
    }
}

/// Terminal renderer for executor / validator progress.
pub struct ProgressRenderer {
    verbose: bool,
    started: Instant,
    bar: Option<ProgressBar>,
    spinner: Option<ProgressBar>,
}

impl ProgressRenderer {
    /// Create a renderer; `verbose` prints per-item lines instead of a
    /// single progress bar.
    pub fn new(verbose: bool) -> Self {
        Self {
            verbose,
            started: Instant::now(),
            bar: None,
            spinner: None,
        }
    }

    fn print_item(&self, result: &ItemResult) {
        println!("  {} {}", glyph(result.status), result.label);
        if !result.message.is_empty()
            && (self.verbose || matches!(result.status, CheckStatus::Error | CheckStatus::Warn | CheckStatus::Missing))
        {
            for line in result.message.lines() {
                println!("      {}", line.dimmed());
            }
        }
    }
}

impl ProgressSink for ProgressRenderer {
    fn on_event(&mut self, event: ProgressEvent<'_>) {
        match event {
            ProgressEvent::Wait { message } => {
                let spinner = ProgressBar::new_spinner();
                spinner.set_style(
                    ProgressStyle::default_spinner()
                        .template("{spinner:.green} {msg}")
                        .unwrap(),
                );
                spinner.set_message(message);
                spinner.enable_steady_tick(std::time::Duration::from_millis(80));
                self.spinner = Some(spinner);
            }
            ProgressEvent::WaitDone => {
                if let Some(spinner) = self.spinner.take() {
                    spinner.finish_and_clear();
                }
            }
            ProgressEvent::Init { action, total } => {
                self.started = Instant::now();
                if !self.verbose && total > 0 {
                    let bar = ProgressBar::new(total as u64);
                    bar.set_style(
                        ProgressStyle::default_bar()
                            .template("[{bar:40.cyan/blue}] {pos}/{len} {msg}")
                            .unwrap()
                            .progress_chars("=>-"),
                    );
                    bar.set_message(action.to_string());
                    self.bar = Some(bar);
                }
            }
            ProgressEvent::StartItem { plan, .. } => {
                if let Some(bar) = &self.bar {
                    bar.set_message(plan.label());
                }
            }
            ProgressEvent::DoneItem { result, .. } => match &self.bar {
                Some(bar) => {
                    bar.inc(1);
                    if matches!(
                        result.status,
                        CheckStatus::Error | CheckStatus::Warn | CheckStatus::Missing
                    ) {
                        bar.suspend(|| self.print_item(result));
                    }
                }
                None => self.print_item(result),
            },
            ProgressEvent::Prompt { message } => {
                if let Some(bar) = &self.bar {
                    bar.suspend(|| println!("{}", message));
                } else {
                    println!("{}", message);
                }
            }
            ProgressEvent::Empty => {
                println!("{}", "Nothing to do.".dimmed());
            }
            ProgressEvent::Abort { error } => {
                if let Some(bar) = self.bar.take() {
                    bar.abandon();
                }
                eprintln!("{} {}", "[✘]".red(), error);
            }
            ProgressEvent::Completed { summary } => {
                if let Some(bar) = self.bar.take() {
                    bar.finish_and_clear();
                }
                let elapsed = self.started.elapsed().as_secs();
                let mut parts: Vec<String> = Vec::new();
                for (count, word) in [
                    (summary.ok, "ok"),
                    (summary.skipped, "skipped"),
                    (summary.missing, "missing"),
                    (summary.error, "failed"),
                    (summary.warn, "warnings"),
                ] {
                    if count > 0 {
                        parts.push(format!("{} {}", count, word));
                    }
                }
                if parts.is_empty() {
                    parts.push("nothing to do".to_string());
                }
                println!("{} ({}s)", parts.join(", "), elapsed);
            }
        }
    }
}
