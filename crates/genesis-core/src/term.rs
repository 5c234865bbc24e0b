//! Terminal detection and the prompt sink every interactive question
//! goes through.

use genesis_types::{GenesisError, Result};
use std::io::{self, IsTerminal};

/// Check if we're running in a controlling terminal.
pub fn in_controlling_terminal() -> bool {
    io::stdin().is_terminal() && io::stdout().is_terminal()
}

/// The single sink all interactive prompts go through.
///
/// Implementations must refuse to prompt when no controlling terminal is
/// present; callers running unattended get a clear error naming the
/// `--no-prompt`-style remedial flag instead of a hung read.
pub trait Prompter: Send + Sync {
    /// Ask a yes/no question.
    fn confirm(&self, message: &str, default: bool) -> Result<bool>;

    /// Pick one of `options`; returns the selected index.
    fn select(&self, message: &str, options: &[String]) -> Result<usize>;
}

/// Prompter backed by the controlling terminal.
#[derive(Debug, Default, Clone)]
pub struct TerminalPrompter;

impl TerminalPrompter {
    fn require_terminal(&self, message: &str) -> Result<()> {
        if !in_controlling_terminal() {
            return Err(GenesisError::Config(format!(
                "Cannot prompt for \"{}\": no controlling terminal. \
                Re-run interactively, or pass --no-prompt and supply the \
                answer via options.",
                message
            )));
        }
        Ok(())
    }
}

impl Prompter for TerminalPrompter {
    fn confirm(&self, message: &str, default: bool) -> Result<bool> {
        self.require_terminal(message)?;
        dialoguer::Confirm::new()
            .with_prompt(message)
            .default(default)
            .interact()
            .map_err(|e| GenesisError::Other(format!("Prompt failed: {}", e)))
    }

    fn select(&self, message: &str, options: &[String]) -> Result<usize> {
        self.require_terminal(message)?;
        dialoguer::Select::new()
            .with_prompt(message)
            .items(options)
            .default(0)
            .interact()
            .map_err(|e| GenesisError::Other(format!("Prompt failed: {}", e)))
    }
}

/// Prompter for unattended runs: every question is a hard error.
#[derive(Debug, Default, Clone)]
pub struct DeniedPrompter;

impl Prompter for DeniedPrompter {
    fn confirm(&self, message: &str, _default: bool) -> Result<bool> {
        Err(GenesisError::Config(format!(
            "Interactive confirmation required (\"{}\") but prompting is disabled",
            message
        )))
    }

    fn select(&self, message: &str, _options: &[String]) -> Result<usize> {
        Err(GenesisError::Config(format!(
            "Interactive selection required (\"{}\") but prompting is disabled",
            message
        )))
    }
}

/// Prompter that replays scripted answers, for tests.
#[derive(Default)]
pub struct ScriptedPrompter {
    confirms: std::sync::Mutex<std::collections::VecDeque<bool>>,
    selections: std::sync::Mutex<std::collections::VecDeque<usize>>,
}

impl ScriptedPrompter {
    /// Create an empty scripted prompter.
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue an answer for the next `confirm` call.
    pub fn push_confirm(&self, answer: bool) {
        self.confirms.lock().unwrap().push_back(answer);
    }

    /// Queue an answer for the next `select` call.
    pub fn push_selection(&self, index: usize) {
        self.selections.lock().unwrap().push_back(index);
    }
}

impl Prompter for ScriptedPrompter {
    fn confirm(&self, message: &str, _default: bool) -> Result<bool> {
        self.confirms.lock().unwrap().pop_front().ok_or_else(|| {
            GenesisError::Bug(format!("unscripted confirm prompt: {}", message))
        })
    }

    fn select(&self, message: &str, _options: &[String]) -> Result<usize> {
        self.selections.lock().unwrap().pop_front().ok_or_else(|| {
            GenesisError::Bug(format!("unscripted select prompt: {}", message))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scripted_prompter() {
        let p = ScriptedPrompter::new();
        p.push_confirm(true);
        p.push_selection(2);

        assert!(p.confirm("continue?", false).unwrap());
        assert_eq!(p.select("pick", &["a".into(), "b".into(), "c".into()]).unwrap(), 2);
        assert!(p.confirm("again?", false).is_err());
    }

    #[test]
    fn test_denied_prompter_refuses() {
        let p = DeniedPrompter;
        assert!(p.confirm("anything", true).is_err());
        assert!(p.select("anything", &[]).is_err());
    }
}
