//! Common enums shared across Genesis crates.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle action that can be applied to a secret plan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SecretAction {
    /// Create the secret if it does not already exist (never overwrites).
    Add,
    /// Regenerate the secret, replacing any existing value (unless fixed).
    Recreate,
    /// Extend the validity of an existing certificate.
    Renew,
    /// Remove the secret (and any paired formatted key).
    Remove,
    /// Verify the expected keys exist in the store.
    Check,
    /// Deep structural, cryptographic, and policy validation.
    Validate,
}

impl fmt::Display for SecretAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let word = match self {
            SecretAction::Add => "add",
            SecretAction::Recreate => "recreate",
            SecretAction::Renew => "renew",
            SecretAction::Remove => "remove",
            SecretAction::Check => "check",
            SecretAction::Validate => "validate",
        };
        write!(f, "{}", word)
    }
}

/// Per-item outcome of a secret action or validation.
///
/// Aggregate exit status is non-zero iff any `Error` or `Missing`
/// occurred, and additionally non-zero on `Warn` in strict mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CheckStatus {
    /// The item is present and correct.
    Ok,
    /// The action did not apply to this item.
    Skipped,
    /// The item (or one of its expected keys) is absent from the store.
    Missing,
    /// The item failed a structural or cryptographic check.
    Error,
    /// The item works but needs attention (e.g. expiring soon).
    Warn,
}

impl CheckStatus {
    /// Whether this status makes the aggregate run fail.
    pub fn is_fatal(&self, strict: bool) -> bool {
        match self {
            CheckStatus::Error | CheckStatus::Missing => true,
            CheckStatus::Warn => strict,
            CheckStatus::Ok | CheckStatus::Skipped => false,
        }
    }
}

impl fmt::Display for CheckStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let word = match self {
            CheckStatus::Ok => "ok",
            CheckStatus::Skipped => "skipped",
            CheckStatus::Missing => "missing",
            CheckStatus::Error => "error",
            CheckStatus::Warn => "warn",
        };
        write!(f, "{}", word)
    }
}

/// Authentication / reachability state of a credentials store.
///
/// Derivation order: TCP probe, token presence, status subprocess
/// (exit code 2 means sealed), handshake path under the configured mount.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreHealth {
    /// The host:port does not accept connections.
    Unreachable,
    /// Reachable, but no token is held for the target.
    Unauthenticated,
    /// The store is sealed and cannot serve secrets.
    Sealed,
    /// Reachable and unsealed, but the handshake path is absent.
    Uninitialized,
    /// Fully usable.
    Ok,
}

impl fmt::Display for StoreHealth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let word = match self {
            StoreHealth::Unreachable => "unreachable",
            StoreHealth::Unauthenticated => "unauthenticated",
            StoreHealth::Sealed => "sealed",
            StoreHealth::Uninitialized => "uninitialized",
            StoreHealth::Ok => "ok",
        };
        write!(f, "{}", word)
    }
}

/// Kit hook scripts recognized by the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum HookType {
    /// Environment sanity checks before deployment.
    Check,
    /// Emits the ordered manifest fragment list for the enabled features.
    Blueprint,
    /// Rewrites / augments the user-declared feature list.
    Features,
    /// Runs after the manifest is generated, before the deploy.
    PreDeploy,
    /// Runs after the deploy completes.
    PostDeploy,
    /// Named add-on actions invocable from reactions.
    Addon,
}

impl HookType {
    /// The script name under the kit's `hooks/` directory.
    pub fn script_name(&self) -> &'static str {
        match self {
            HookType::Check => "check",
            HookType::Blueprint => "blueprint",
            HookType::Features => "features",
            HookType::PreDeploy => "pre-deploy",
            HookType::PostDeploy => "post-deploy",
            HookType::Addon => "addon",
        }
    }
}

impl fmt::Display for HookType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.script_name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_check_status_fatality() {
        assert!(CheckStatus::Error.is_fatal(false));
        assert!(CheckStatus::Missing.is_fatal(false));
        assert!(!CheckStatus::Warn.is_fatal(false));
        assert!(CheckStatus::Warn.is_fatal(true));
        assert!(!CheckStatus::Ok.is_fatal(true));
        assert!(!CheckStatus::Skipped.is_fatal(true));
    }

    #[test]
    fn test_hook_script_names() {
        assert_eq!(HookType::PreDeploy.script_name(), "pre-deploy");
        assert_eq!(HookType::Blueprint.to_string(), "blueprint");
    }
}
