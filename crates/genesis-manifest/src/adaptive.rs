//! Adaptive merging.
//!
//! When the credentials store is unreachable or a reference cannot
//! resolve, a full-evaluation merge fails on operators that are fine to
//! leave for later. The adaptive loop rewrites exactly the operator text
//! the merge tool reported as failing into a deferred form
//! (`(( defer … ))`) and retries, bounded at five passes. The original
//! error is preserved and surfaced if the loop cannot converge.

use crate::merge::{MergeOptions, Merger};
use genesis_types::{GenesisError, Result};
use regex::Regex;
use std::sync::OnceLock;
use tracing::debug;

/// Retry bound for the rewrite loop.
pub const MAX_ADAPTIVE_PASSES: usize = 5;

fn operator_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\(\(\s*([^()]+?)\s*\)\)").unwrap())
}

/// Extract the inner text of every `(( … ))` operator mentioned in a
/// merge error report, skipping operators that are already deferred.
pub fn failing_operators(error: &str) -> Vec<String> {
    let mut ops = Vec::new();
    for caps in operator_re().captures_iter(error) {
        let inner = caps[1].trim().to_string();
        if inner.starts_with("defer ") || inner == "defer" {
            continue;
        }
        if !ops.contains(&inner) {
            ops.push(inner);
        }
    }
    ops
}

/// Rewrite every occurrence of the reported operators in `doc` to their
/// deferred form. Returns the rewritten document and how many rewrites
/// happened. Only the exact reported operator text is touched —
/// whitespace inside the operator may vary, nothing else.
pub fn defer_operators(doc: &str, operators: &[String]) -> (String, usize) {
    let mut result = doc.to_string();
    let mut rewrites = 0;

    for op in operators {
        let tokens: Vec<String> = op.split_whitespace().map(regex::escape).collect();
        if tokens.is_empty() {
            continue;
        }
        let pattern = format!(r"\(\(\s*{}\s*\)\)", tokens.join(r"\s+"));
        let Ok(re) = Regex::new(&pattern) else {
            continue;
        };

        let replacement = format!("(( defer {} ))", op);
        let rewritten = re.replace_all(&result, replacement.as_str());
        if let std::borrow::Cow::Owned(new) = rewritten {
            rewrites += re.find_iter(&result).count();
            result = new;
        }
    }

    (result, rewrites)
}

/// Merge with full evaluation, deferring unresolvable operators.
///
/// Each failed pass rewrites only the operators the merge tool itself
/// named; a pass that rewrites nothing gives up immediately. When the
/// loop fails, the error carries the original (first) failure text.
pub fn adaptive_merge(
    merger: &dyn Merger,
    docs: &[String],
    opts: &MergeOptions,
) -> Result<String> {
    let mut docs: Vec<String> = docs.to_vec();
    let mut original_error: Option<String> = None;

    for pass in 0..MAX_ADAPTIVE_PASSES {
        match merger.merge_docs(&docs, opts) {
            Ok(merged) => {
                if pass > 0 {
                    debug!("adaptive merge converged after {} rewrite pass(es)", pass);
                }
                return Ok(merged);
            }
            Err(e) => {
                let text = e.to_string();
                if original_error.is_none() {
                    original_error = Some(text.clone());
                }

                let operators = failing_operators(&text);
                if operators.is_empty() {
                    break;
                }

                let mut rewrites = 0;
                for doc in docs.iter_mut() {
                    let (rewritten, count) = defer_operators(doc, &operators);
                    *doc = rewritten;
                    rewrites += count;
                }
                debug!(
                    "adaptive merge pass {}: deferred {} operator occurrence(s)",
                    pass + 1,
                    rewrites
                );
                if rewrites == 0 {
                    break;
                }
            }
        }
    }

    Err(GenesisError::Manifest(format!(
        "Merge failed even after deferring unresolvable operators:\n{}",
        original_error.unwrap_or_else(|| "no error reported".to_string())
    )))
}
