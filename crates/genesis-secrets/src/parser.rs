//! Secret plan parsing from kit metadata.
//!
//! Walks the `certificates.<feature>` and `credentials.<feature>`
//! subtrees of the dereferenced kit metadata for every enabled feature
//! and produces typed plan records. Syntactic problems never abort the
//! walk; the offending path gets an error plan in place.

use crate::order;
use crate::plan::{
    DhparamsPlan, ErrorPlan, KeyPlan, RandomPlan, SecretPlan, SelfSigned, X509Plan,
};
use genesis_types::{GenesisError, Result};
use regex::Regex;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::OnceLock;
use tracing::debug;

/// Options controlling a parse.
#[derive(Debug, Clone, Default)]
pub struct ParseOptions {
    /// When set, plans without a signer are signed by this absolute
    /// store path instead of becoming self-signed.
    pub root_ca_path: Option<String>,
    /// Optional path filter: `/regex/`, `/regex/i`, or `!/regex/` to
    /// negate; anything else is a substring match.
    pub filter: Option<String>,
}

/// Bounds for RSA / SSH key sizes, in bits.
const KEY_SIZE_RANGE: std::ops::RangeInclusive<u32> = 1024..=16384;

fn random_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"^random\s+(\d+)(?:\s+fmt\s+(\S+)(?:\s+at\s+(\S+))?)?(?:\s+allowed-chars\s+(\S+))?(\s+fixed)?$",
        )
        .unwrap()
    })
}

fn keypair_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^(ssh|rsa)\s+(\d+)(\s+fixed)?$").unwrap())
}

fn dhparams_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^dhparams?\s+(\d+)(\s+fixed)?$").unwrap())
}

fn valid_for_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[1-9][0-9]*[ymdh]$").unwrap())
}

/// Parse the kit's secret specifications for the enabled features into
/// an ordered plan sequence: X.509 plans first in signing-dependency
/// order, then the remaining types in sorted path order.
///
/// `features` is the environment's list; the literal `base` feature is
/// always walked first.
pub fn parse(tree: &Value, features: &[String], opts: &ParseOptions) -> Result<Vec<SecretPlan>> {
    let mut walk_features = vec!["base".to_string()];
    for f in features {
        if f != "base" {
            walk_features.push(f.clone());
        }
    }

    let mut plans: BTreeMap<String, SecretPlan> = BTreeMap::new();

    for feature in &walk_features {
        if let Some(certs) = tree.get("certificates").and_then(|c| c.get(feature)) {
            walk_certificates(feature, certs, &mut plans);
        }
        if let Some(creds) = tree.get("credentials").and_then(|c| c.get(feature)) {
            walk_credentials(feature, creds, &mut plans);
        }
    }

    debug!(
        "parsed {} secret plan(s) from features [{}]",
        plans.len(),
        walk_features.join(", ")
    );

    let ordered = order::order(plans, opts.root_ca_path.as_deref());

    match &opts.filter {
        None => Ok(ordered),
        Some(filter) => {
            let matcher = PathFilter::parse(filter)?;
            Ok(ordered
                .into_iter()
                .filter(|p| matcher.matches(p.path()))
                .collect())
        }
    }
}

fn error_plan(plans: &mut BTreeMap<String, SecretPlan>, path: &str, error: String) {
    plans.insert(
        path.to_string(),
        SecretPlan::Error(ErrorPlan {
            path: path.to_string(),
            error,
        }),
    );
}

fn walk_certificates(feature: &str, subtree: &Value, plans: &mut BTreeMap<String, SecretPlan>) {
    let Some(groups) = subtree.as_object() else {
        return;
    };

    for (base_path, certs) in groups {
        let Some(certs) = certs.as_object() else {
            error_plan(
                plans,
                base_path,
                format!(
                    "certificates.{}.{} must be a map of certificate names",
                    feature, base_path
                ),
            );
            continue;
        };

        for (cert_name, attrs) in certs {
            let path = format!("{}/{}", base_path, cert_name);
            if path.contains(':') {
                error_plan(
                    plans,
                    &path,
                    "certificate paths may not contain colons".to_string(),
                );
                continue;
            }

            match parse_x509(&path, base_path, attrs) {
                Ok(plan) => {
                    plans.insert(path.clone(), SecretPlan::X509(plan));
                }
                Err(e) => error_plan(plans, &path, e),
            }
        }
    }
}

fn parse_x509(path: &str, base_path: &str, attrs: &Value) -> std::result::Result<X509Plan, String> {
    let empty = serde_json::Map::new();
    let attrs = match attrs {
        Value::Object(map) => map,
        Value::Null => &empty,
        _ => return Err("certificate specification must be a map".to_string()),
    };

    let is_ca = attrs.get("is_ca").and_then(Value::as_bool).unwrap_or(false);

    let signed_by = match attrs.get("signed_by") {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(s)) => s.clone(),
        Some(_) => return Err("signed_by must be a string".to_string()),
    };
    // One-shot legacy fixups like "base.application/certs.ca" are
    // flagged, never silently rewritten.
    if signed_by.starts_with("base.") {
        return Err(format!(
            "signed_by '{}' uses the legacy dotted form; name the signing \
             plan's slash-delimited path instead",
            signed_by
        ));
    }

    let names = match attrs.get("names") {
        None | Some(Value::Null) => Vec::new(),
        Some(Value::Array(list)) => {
            let mut names = Vec::with_capacity(list.len());
            for entry in list {
                match entry.as_str() {
                    Some(s) if !s.trim().is_empty() => names.push(s.to_string()),
                    _ => return Err("names entries must be non-empty strings".to_string()),
                }
            }
            names
        }
        Some(_) => return Err("names must be a list of strings".to_string()),
    };

    let usage = match attrs.get("usage") {
        None | Some(Value::Null) => None,
        Some(Value::Array(list)) => {
            let mut usage = Vec::with_capacity(list.len());
            for entry in list {
                match entry.as_str() {
                    Some(s) => usage.push(s.to_string()),
                    None => return Err("usage entries must be strings".to_string()),
                }
            }
            Some(usage)
        }
        Some(_) => return Err("usage must be a list of strings".to_string()),
    };

    let valid_for = match attrs.get("valid_for") {
        None | Some(Value::Null) => None,
        Some(Value::String(s)) => {
            if !valid_for_re().is_match(s) {
                return Err(format!(
                    "valid_for '{}' does not match <number><y|m|d|h>",
                    s
                ));
            }
            Some(s.clone())
        }
        Some(_) => return Err("valid_for must be a string".to_string()),
    };

    Ok(X509Plan {
        path: path.to_string(),
        base_path: base_path.to_string(),
        is_ca,
        signed_by,
        signed_by_abs_path: false,
        self_signed: SelfSigned::No,
        names,
        usage,
        valid_for,
    })
}

fn walk_credentials(feature: &str, subtree: &Value, plans: &mut BTreeMap<String, SecretPlan>) {
    let Some(paths) = subtree.as_object() else {
        return;
    };

    for (path, spec) in paths {
        if path.contains(':') {
            error_plan(
                plans,
                path,
                "credential paths may not contain colons; the key component \
                 belongs in the per-key map"
                    .to_string(),
            );
            continue;
        }

        match spec {
            Value::String(s) => match parse_credential_string(s) {
                ParsedCredential::Random { .. } => error_plan(
                    plans,
                    path,
                    format!(
                        "credentials.{}.{}: random secrets must be specified per \
                         key in a hashmap",
                        feature, path
                    ),
                ),
                ParsedCredential::Ssh { size, fixed } => {
                    insert_keypair(plans, path, size, fixed, true)
                }
                ParsedCredential::Rsa { size, fixed } => {
                    insert_keypair(plans, path, size, fixed, false)
                }
                ParsedCredential::Dhparams { size, fixed } => {
                    plans.insert(
                        path.clone(),
                        SecretPlan::Dhparams(DhparamsPlan {
                            path: path.clone(),
                            size,
                            fixed,
                        }),
                    );
                }
                ParsedCredential::Unrecognized => error_plan(
                    plans,
                    path,
                    format!("unrecognized credential specification '{}'", s),
                ),
            },
            Value::Object(keys) => {
                for (key, keyspec) in keys {
                    let anchor = format!("{}:{}", path, key);
                    let Some(keyspec) = keyspec.as_str() else {
                        error_plan(
                            plans,
                            &anchor,
                            "per-key credential specification must be a string".to_string(),
                        );
                        continue;
                    };
                    match parse_credential_string(keyspec) {
                        ParsedCredential::Random {
                            size,
                            format,
                            destination,
                            valid_chars,
                            fixed,
                        } => {
                            plans.insert(
                                anchor.clone(),
                                SecretPlan::Random(RandomPlan {
                                    path: path.clone(),
                                    key: key.clone(),
                                    size,
                                    format,
                                    destination,
                                    valid_chars,
                                    fixed,
                                }),
                            );
                        }
                        ParsedCredential::Unrecognized => error_plan(
                            plans,
                            &anchor,
                            format!("unrecognized credential specification '{}'", keyspec),
                        ),
                        _ => error_plan(
                            plans,
                            &anchor,
                            "only random secrets may be specified per key".to_string(),
                        ),
                    }
                }
            }
            _ => error_plan(
                plans,
                path,
                format!(
                    "credentials.{}.{} must be a specification string or a \
                     per-key map",
                    feature, path
                ),
            ),
        }
    }
}

fn insert_keypair(
    plans: &mut BTreeMap<String, SecretPlan>,
    path: &str,
    size: u32,
    fixed: bool,
    ssh: bool,
) {
    if !KEY_SIZE_RANGE.contains(&size) {
        error_plan(
            plans,
            path,
            format!(
                "key size {} out of range ({}..{} bits)",
                size,
                KEY_SIZE_RANGE.start(),
                KEY_SIZE_RANGE.end()
            ),
        );
        return;
    }
    let plan = KeyPlan {
        path: path.to_string(),
        size,
        fixed,
    };
    plans.insert(
        path.to_string(),
        if ssh {
            SecretPlan::Ssh(plan)
        } else {
            SecretPlan::Rsa(plan)
        },
    );
}

enum ParsedCredential {
    Random {
        size: usize,
        format: Option<String>,
        destination: Option<String>,
        valid_chars: Option<String>,
        fixed: bool,
    },
    Ssh {
        size: u32,
        fixed: bool,
    },
    Rsa {
        size: u32,
        fixed: bool,
    },
    Dhparams {
        size: u32,
        fixed: bool,
    },
    Unrecognized,
}

fn parse_credential_string(spec: &str) -> ParsedCredential {
    let spec = spec.trim();

    if let Some(caps) = random_re().captures(spec) {
        let Ok(size) = caps[1].parse::<usize>() else {
            return ParsedCredential::Unrecognized;
        };
        return ParsedCredential::Random {
            size,
            format: caps.get(2).map(|m| m.as_str().to_string()),
            destination: caps.get(3).map(|m| m.as_str().to_string()),
            valid_chars: caps.get(4).map(|m| m.as_str().to_string()),
            fixed: caps.get(5).is_some(),
        };
    }

    if let Some(caps) = keypair_re().captures(spec) {
        let Ok(size) = caps[2].parse::<u32>() else {
            return ParsedCredential::Unrecognized;
        };
        let fixed = caps.get(3).is_some();
        return if &caps[1] == "ssh" {
            ParsedCredential::Ssh { size, fixed }
        } else {
            ParsedCredential::Rsa { size, fixed }
        };
    }

    if let Some(caps) = dhparams_re().captures(spec) {
        let Ok(size) = caps[1].parse::<u32>() else {
            return ParsedCredential::Unrecognized;
        };
        return ParsedCredential::Dhparams {
            size,
            fixed: caps.get(2).is_some(),
        };
    }

    ParsedCredential::Unrecognized
}

/// A slash-delimited path filter with negation and case-insensitivity.
struct PathFilter {
    regex: Regex,
    negate: bool,
}

impl PathFilter {
    fn parse(filter: &str) -> Result<Self> {
        let (negate, body) = match filter.strip_prefix('!') {
            Some(rest) => (true, rest),
            None => (false, filter),
        };

        let (pattern, insensitive) = if let Some(inner) = body.strip_prefix('/') {
            if let Some(inner) = inner.strip_suffix("/i") {
                (inner.to_string(), true)
            } else if let Some(inner) = inner.strip_suffix('/') {
                (inner.to_string(), false)
            } else {
                return Err(GenesisError::Config(format!(
                    "Malformed secret filter '{}': missing closing slash",
                    filter
                )));
            }
        } else {
            (regex::escape(body), false)
        };

        let regex = regex::RegexBuilder::new(&pattern)
            .case_insensitive(insensitive)
            .build()
            .map_err(|e| {
                GenesisError::Config(format!("Malformed secret filter '{}': {}", filter, e))
            })?;

        Ok(Self { regex, negate })
    }

    fn matches(&self, path: &str) -> bool {
        self.regex.is_match(path) != self.negate
    }
}
