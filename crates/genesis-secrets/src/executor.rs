//! Secret plan execution.
//!
//! For each plan the executor emits an opaque command list against the
//! Store Client, interprets the subprocess output, and reports per-item
//! progress through a caller-owned sink. Items run strictly serially in
//! the order the plan orderer produced, so a CA is always materialized
//! before any of its dependents.

use crate::plan::{RandomPlan, SecretPlan, X509Plan};
use genesis_core::process::ProcessOutput;
use genesis_services::Vault;
use genesis_types::{CheckStatus, GenesisError, Result, SecretAction};
use rand::Rng;
use regex::Regex;
use std::sync::OnceLock;

/// One item's outcome.
#[derive(Debug, Clone)]
pub struct ItemResult {
    /// Plan path (with key component for random plans).
    pub label: String,
    /// Outcome status.
    pub status: CheckStatus,
    /// Human-readable detail; multi-line for validation failures.
    pub message: String,
}

/// Aggregated counters for one batch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Summary {
    /// Items present and correct.
    pub ok: usize,
    /// Items the action did not apply to.
    pub skipped: usize,
    /// Items absent from the store.
    pub missing: usize,
    /// Items that failed.
    pub error: usize,
    /// Items needing attention.
    pub warn: usize,
}

impl Summary {
    /// Record one outcome.
    pub fn add(&mut self, status: CheckStatus) {
        match status {
            CheckStatus::Ok => self.ok += 1,
            CheckStatus::Skipped => self.skipped += 1,
            CheckStatus::Missing => self.missing += 1,
            CheckStatus::Error => self.error += 1,
            CheckStatus::Warn => self.warn += 1,
        }
    }

    /// Total items recorded.
    pub fn total(&self) -> usize {
        self.ok + self.skipped + self.missing + self.error + self.warn
    }

    /// Whether the aggregate exit status is non-zero.
    pub fn failed(&self, strict: bool) -> bool {
        self.error > 0 || self.missing > 0 || (strict && self.warn > 0)
    }
}

/// Progress protocol delivered to the caller's sink.
///
/// The executor holds no rendering state; counters, errors, and elapsed
/// time belong to the sink, which is free to collapse to single-line
/// mode or render fully verbose output.
#[derive(Debug)]
pub enum ProgressEvent<'a> {
    /// A long operation (store preload, export) started.
    Wait {
        /// What the engine is waiting on.
        message: String,
    },
    /// The awaited operation finished.
    WaitDone,
    /// A batch is starting.
    Init {
        /// The action applied to every item.
        action: SecretAction,
        /// Item count.
        total: usize,
    },
    /// An item is about to be processed.
    StartItem {
        /// 1-based item number.
        index: usize,
        /// Item count.
        total: usize,
        /// The plan being processed.
        plan: &'a SecretPlan,
    },
    /// An item finished.
    DoneItem {
        /// 1-based item number.
        index: usize,
        /// The outcome.
        result: &'a ItemResult,
    },
    /// The engine is asking the user something.
    Prompt {
        /// The question.
        message: String,
    },
    /// The batch had no items.
    Empty,
    /// The batch stopped early.
    Abort {
        /// Why.
        error: String,
    },
    /// The batch ran to completion.
    Completed {
        /// Final counters.
        summary: &'a Summary,
    },
}

/// Receives progress events.
pub trait ProgressSink {
    /// Handle one event.
    fn on_event(&mut self, event: ProgressEvent<'_>);
}

/// Sink that ignores everything.
#[derive(Debug, Default)]
pub struct NullSink;

impl ProgressSink for NullSink {
    fn on_event(&mut self, _event: ProgressEvent<'_>) {}
}

/// Synthesize a CN for a CA plan that names none: `ca.n<9 digits>.<base>`.
pub fn synthesize_ca_cn(base_path: &str) -> String {
    let n: u32 = rand::thread_rng().gen_range(0..1_000_000_000);
    format!("ca.n{:09}.{}", n, base_path)
}

/// Build the store-CLI command list for one plan and action.
///
/// `base` is the secrets base the plan paths hang off of (trailing slash
/// included). An empty list means the action does not apply to the plan
/// type (for example, only certificates support `renew`).
pub fn commands_for(plan: &SecretPlan, action: SecretAction, base: &str) -> Vec<Vec<String>> {
    let full = |path: &str| format!("{}{}", base, path);

    match (plan, action) {
        (SecretPlan::Error(_), _) => Vec::new(),

        (SecretPlan::X509(p), SecretAction::Add | SecretAction::Recreate) => {
            vec![x509_issue(p, full(&p.path), base, action == SecretAction::Add)]
        }
        (SecretPlan::X509(p), SecretAction::Renew) => {
            vec![vec![
                "x509".to_string(),
                "renew".to_string(),
                full(&p.path),
                "--ttl".to_string(),
                p.ttl().to_string(),
            ]]
        }
        (SecretPlan::X509(p), SecretAction::Remove) => {
            vec![vec!["rm".to_string(), "-f".to_string(), full(&p.path)]]
        }

        (SecretPlan::Rsa(p), SecretAction::Add | SecretAction::Recreate) => {
            let mut cmd = vec!["rsa".to_string(), p.size.to_string(), full(&p.path)];
            if action == SecretAction::Add || p.fixed {
                cmd.push("--no-clobber".to_string());
            }
            vec![cmd]
        }
        (SecretPlan::Ssh(p), SecretAction::Add | SecretAction::Recreate) => {
            let mut cmd = vec!["ssh".to_string(), p.size.to_string(), full(&p.path)];
            if action == SecretAction::Add || p.fixed {
                cmd.push("--no-clobber".to_string());
            }
            vec![cmd]
        }
        (SecretPlan::Rsa(p) | SecretPlan::Ssh(p), SecretAction::Remove) => {
            vec![vec!["rm".to_string(), "-f".to_string(), full(&p.path)]]
        }

        (SecretPlan::Dhparams(p), SecretAction::Add | SecretAction::Recreate) => {
            let mut cmd = vec!["dhparam".to_string(), p.size.to_string(), full(&p.path)];
            if action == SecretAction::Add || p.fixed {
                cmd.push("--no-clobber".to_string());
            }
            vec![cmd]
        }
        (SecretPlan::Dhparams(p), SecretAction::Remove) => {
            vec![vec!["rm".to_string(), "-f".to_string(), full(&p.path)]]
        }

        (SecretPlan::Random(p), SecretAction::Add | SecretAction::Recreate) => {
            random_commands(p, &full(&p.path), action == SecretAction::Add)
        }
        (SecretPlan::Random(p), SecretAction::Remove) => {
            let mut cmds = vec![vec![
                "rm".to_string(),
                "-f".to_string(),
                format!("{}:{}", full(&p.path), p.key),
            ]];
            if let Some(paired) = p.paired_key() {
                cmds.push(vec![
                    "rm".to_string(),
                    "-f".to_string(),
                    format!("{}:{}", full(&p.path), paired),
                ]);
            }
            cmds
        }

        // renew only applies to certificates
        (_, SecretAction::Renew) => Vec::new(),

        // check / validate never emit store mutations
        (_, SecretAction::Check | SecretAction::Validate) => Vec::new(),
    }
}

fn x509_issue(plan: &X509Plan, full_path: String, base: &str, no_clobber: bool) -> Vec<String> {
    let mut cmd = vec![
        "x509".to_string(),
        "issue".to_string(),
        full_path,
        "--ttl".to_string(),
        plan.ttl().to_string(),
    ];

    if plan.is_ca {
        cmd.push("--ca".to_string());
    }

    if plan.names.is_empty() && plan.is_ca {
        cmd.push("--name".to_string());
        cmd.push(synthesize_ca_cn(&plan.base_path));
    } else {
        for name in &plan.names {
            cmd.push("--name".to_string());
            cmd.push(name.clone());
        }
    }

    for usage in plan.key_usage() {
        cmd.push("--key-usage".to_string());
        cmd.push(usage);
    }

    if !plan.self_signed.is_self_signed() && !plan.signed_by.is_empty() {
        let signer = if plan.signed_by_abs_path {
            plan.signed_by.clone()
        } else {
            format!("{}{}", base, plan.signed_by)
        };
        cmd.push("--signed-by".to_string());
        cmd.push(signer);
    }

    if no_clobber {
        cmd.push("--no-clobber".to_string());
    }
    cmd
}

fn random_commands(plan: &RandomPlan, full_path: &str, no_clobber: bool) -> Vec<Vec<String>> {
    let protect = no_clobber || plan.fixed;

    let mut gen = vec!["gen".to_string(), plan.size.to_string()];
    if let Some(chars) = &plan.valid_chars {
        gen.push("--policy".to_string());
        gen.push(chars.clone());
    }
    gen.push(full_path.to_string());
    gen.push(plan.key.clone());
    if protect {
        gen.push("--no-clobber".to_string());
    }

    let mut cmds = vec![gen];
    if let Some(fmt) = &plan.format {
        let mut cmd = vec![
            "fmt".to_string(),
            fmt.clone(),
            full_path.to_string(),
            plan.key.clone(),
            plan.paired_key().unwrap(),
        ];
        if protect {
            cmd.push("--no-clobber".to_string());
        }
        cmds.push(cmd);
    }
    cmds
}

fn skip_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"refusing to .* already present").unwrap())
}

fn renewed_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"Renewed x509 cert.*expiry set to (.+)").unwrap())
}

/// Interpret one subprocess's output for one command of an item.
///
/// A refusal line means the item already exists and was skipped; any
/// other non-zero exit aborts the whole batch with the raw output
/// preserved.
pub fn interpret_output(
    action: SecretAction,
    out: &ProcessOutput,
) -> Result<(CheckStatus, String)> {
    let combined = out.combined();

    if skip_re().is_match(&combined) {
        return Ok((CheckStatus::Skipped, "already present".to_string()));
    }

    if !out.success() {
        return Err(GenesisError::Exec(combined));
    }

    if action == SecretAction::Renew {
        if let Some(caps) = renewed_re().captures(&combined) {
            return Ok((
                CheckStatus::Ok,
                format!("expiry set to {}", caps[1].trim()),
            ));
        }
    }

    if combined.trim().is_empty() {
        return Ok((CheckStatus::Ok, String::new()));
    }

    Ok((CheckStatus::Error, combined))
}

/// Runs ordered plan batches against a store.
pub struct Executor<'a> {
    vault: &'a Vault,
    base: String,
}

impl<'a> Executor<'a> {
    /// Create an executor whose plan paths hang off `base`.
    pub fn new(vault: &'a Vault, base: impl Into<String>) -> Self {
        let mut base = base.into();
        if !base.is_empty() && !base.ends_with('/') {
            base.push('/');
        }
        Self { vault, base }
    }

    /// Apply `action` to every plan, strictly in order, reporting
    /// progress through `sink`.
    pub fn execute(
        &self,
        plans: &[SecretPlan],
        action: SecretAction,
        sink: &mut dyn ProgressSink,
    ) -> Result<Summary> {
        let mut summary = Summary::default();

        sink.on_event(ProgressEvent::Init {
            action,
            total: plans.len(),
        });

        if plans.is_empty() {
            sink.on_event(ProgressEvent::Empty);
            return Ok(summary);
        }

        for (i, plan) in plans.iter().enumerate() {
            let index = i + 1;
            sink.on_event(ProgressEvent::StartItem {
                index,
                total: plans.len(),
                plan,
            });

            let result = match plan {
                SecretPlan::Error(err) => ItemResult {
                    label: plan.label(),
                    status: CheckStatus::Error,
                    message: err.error.clone(),
                },
                _ => match self.run_item(plan, action) {
                    Ok(result) => result,
                    Err(e) => {
                        sink.on_event(ProgressEvent::Abort {
                            error: e.to_string(),
                        });
                        return Err(e);
                    }
                },
            };

            summary.add(result.status);
            sink.on_event(ProgressEvent::DoneItem { index, result: &result });
        }

        sink.on_event(ProgressEvent::Completed { summary: &summary });
        Ok(summary)
    }

    fn run_item(&self, plan: &SecretPlan, action: SecretAction) -> Result<ItemResult> {
        let commands = commands_for(plan, action, &self.base);

        if commands.is_empty() {
            return Ok(ItemResult {
                label: plan.label(),
                status: CheckStatus::Skipped,
                message: format!("{} not supported for {}", action, plan.kind()),
            });
        }

        let mut status = CheckStatus::Ok;
        let mut messages: Vec<String> = Vec::new();

        for command in commands {
            let out = self.vault.query(command)?;
            let (cmd_status, message) = interpret_output(action, &out)?;
            if !message.is_empty() {
                messages.push(message);
            }
            status = combine(status, cmd_status);
        }

        Ok(ItemResult {
            label: plan.label(),
            status,
            message: messages.join("\n"),
        })
    }
}

fn combine(a: CheckStatus, b: CheckStatus) -> CheckStatus {
    use CheckStatus::*;
    match (a, b) {
        (Error, _) | (_, Error) => Error,
        (Missing, _) | (_, Missing) => Missing,
        (Warn, _) | (_, Warn) => Warn,
        (Skipped, _) | (_, Skipped) => Skipped,
        (Ok, Ok) => Ok,
    }
}
