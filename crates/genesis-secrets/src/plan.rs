//! Secret plan records.
//!
//! A plan is a declarative description of a single credential the engine
//! must ensure exists with a given shape. Plans are a tagged union keyed
//! by store path; a plan that fails field validation becomes an
//! [`SecretPlan::Error`] in place so the rest of the run can proceed.

use serde::{Deserialize, Serialize};

/// Default validity for certificate authorities.
pub const DEFAULT_CA_TTL: &str = "10y";

/// Default validity for leaf certificates.
pub const DEFAULT_CERT_TTL: &str = "1y";

/// Key usage applied to leaf certificates when the plan does not
/// override it.
pub const DEFAULT_CERT_USAGE: &[&str] = &["server_auth", "client_auth"];

/// Key usage applied to CAs when the plan does not override it.
pub const DEFAULT_CA_USAGE: &[&str] =
    &["server_auth", "client_auth", "crl_sign", "key_cert_sign"];

/// How an X.509 plan came to be self-signed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SelfSigned {
    /// Signed by another plan or an absolute CA path.
    No,
    /// No signer could be assigned, so the certificate signs itself.
    Implicit,
    /// The plan names itself as its own signer.
    Explicit,
}

impl SelfSigned {
    /// Whether the certificate signs itself at all.
    pub fn is_self_signed(&self) -> bool {
        !matches!(self, SelfSigned::No)
    }
}

/// An X.509 certificate plan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct X509Plan {
    /// Store path of the certificate.
    pub path: String,
    /// The grouping path the plan was declared under.
    pub base_path: String,
    /// Whether this certificate is a CA.
    pub is_ca: bool,
    /// Path of the signing plan; empty when unsigned.
    #[serde(default)]
    pub signed_by: String,
    /// When set, `signed_by` is an absolute store path outside the plan
    /// set (the configured root CA).
    #[serde(default)]
    pub signed_by_abs_path: bool,
    /// Self-signing state.
    pub self_signed: SelfSigned,
    /// Subject names; the first is the CN, the rest are SANs.
    #[serde(default)]
    pub names: Vec<String>,
    /// Key usage override; `None` means type defaults apply.
    #[serde(default)]
    pub usage: Option<Vec<String>>,
    /// Validity, `[1-9][0-9]*[ymdh]`; `None` means type default.
    #[serde(default)]
    pub valid_for: Option<String>,
}

impl X509Plan {
    /// The validity to request, falling back to the CA / leaf default.
    pub fn ttl(&self) -> &str {
        self.valid_for.as_deref().unwrap_or(if self.is_ca {
            DEFAULT_CA_TTL
        } else {
            DEFAULT_CERT_TTL
        })
    }

    /// The effective key usage set.
    pub fn key_usage(&self) -> Vec<String> {
        match &self.usage {
            Some(usage) => usage.clone(),
            None => {
                let defaults = if self.is_ca {
                    DEFAULT_CA_USAGE
                } else {
                    DEFAULT_CERT_USAGE
                };
                defaults.iter().map(|s| s.to_string()).collect()
            }
        }
    }

    /// The CN, when the plan names one.
    pub fn cn(&self) -> Option<&str> {
        self.names.first().map(String::as_str)
    }

    /// The SANs: every name after the CN.
    pub fn sans(&self) -> &[String] {
        if self.names.is_empty() {
            &[]
        } else {
            &self.names[1..]
        }
    }
}

/// An RSA or SSH keypair plan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyPlan {
    /// Store path of the keypair.
    pub path: String,
    /// Key size in bits (1024..16384).
    pub size: u32,
    /// Fixed secrets survive `recreate`.
    #[serde(default)]
    pub fixed: bool,
}

/// A Diffie-Hellman parameters plan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DhparamsPlan {
    /// Store path.
    pub path: String,
    /// Parameter size in bits.
    pub size: u32,
    /// Fixed secrets survive `recreate`.
    #[serde(default)]
    pub fixed: bool,
}

/// A random string plan, stored at `path:key`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RandomPlan {
    /// Store path.
    pub path: String,
    /// Key under the path.
    pub key: String,
    /// Length in characters.
    pub size: usize,
    /// Optional format the value is additionally stored in.
    #[serde(default)]
    pub format: Option<String>,
    /// Key the formatted value lands under; defaults to `<key>-<format>`.
    #[serde(default)]
    pub destination: Option<String>,
    /// Character class the value is drawn from.
    #[serde(default)]
    pub valid_chars: Option<String>,
    /// Fixed secrets survive `recreate`.
    #[serde(default)]
    pub fixed: bool,
}

impl RandomPlan {
    /// The key the formatted companion value is stored under, when the
    /// plan declares a format.
    pub fn paired_key(&self) -> Option<String> {
        self.format.as_ref().map(|fmt| {
            self.destination
                .clone()
                .unwrap_or_else(|| format!("{}-{}", self.key, fmt))
        })
    }
}

/// A plan that failed validation, kept in place of the original.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorPlan {
    /// Store path the failure is anchored to.
    pub path: String,
    /// What went wrong.
    pub error: String,
}

/// One credential the engine must ensure exists.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum SecretPlan {
    /// X.509 certificate.
    X509(X509Plan),
    /// RSA keypair.
    Rsa(KeyPlan),
    /// SSH keypair.
    Ssh(KeyPlan),
    /// Diffie-Hellman parameters.
    Dhparams(DhparamsPlan),
    /// Random string.
    Random(RandomPlan),
    /// A plan that failed validation.
    Error(ErrorPlan),
}

impl SecretPlan {
    /// The store path this plan is anchored to (without the `:key`
    /// component of random plans).
    pub fn path(&self) -> &str {
        match self {
            SecretPlan::X509(p) => &p.path,
            SecretPlan::Rsa(p) | SecretPlan::Ssh(p) => &p.path,
            SecretPlan::Dhparams(p) => &p.path,
            SecretPlan::Random(p) => &p.path,
            SecretPlan::Error(p) => &p.path,
        }
    }

    /// Human-readable kind.
    pub fn kind(&self) -> &'static str {
        match self {
            SecretPlan::X509(p) if p.is_ca => "X.509 CA certificate",
            SecretPlan::X509(_) => "X.509 certificate",
            SecretPlan::Rsa(_) => "RSA keypair",
            SecretPlan::Ssh(_) => "SSH keypair",
            SecretPlan::Dhparams(_) => "Diffie-Hellman parameters",
            SecretPlan::Random(_) => "random string",
            SecretPlan::Error(_) => "invalid specification",
        }
    }

    /// Display label, `path (kind)`, with the key component for random
    /// plans.
    pub fn label(&self) -> String {
        match self {
            SecretPlan::Random(p) => format!("{}:{} ({})", p.path, p.key, self.kind()),
            other => format!("{} ({})", other.path(), other.kind()),
        }
    }

    /// Whether this plan is an error record.
    pub fn is_error(&self) -> bool {
        matches!(self, SecretPlan::Error(_))
    }

    /// Whether the plan is protected from `recreate`.
    pub fn is_fixed(&self) -> bool {
        match self {
            SecretPlan::Rsa(p) | SecretPlan::Ssh(p) => p.fixed,
            SecretPlan::Dhparams(p) => p.fixed,
            SecretPlan::Random(p) => p.fixed,
            _ => false,
        }
    }

    /// Demote this plan to an error record, keeping its path.
    pub fn into_error(self, error: impl Into<String>) -> SecretPlan {
        SecretPlan::Error(ErrorPlan {
            path: self.path().to_string(),
            error: error.into(),
        })
    }

    /// The keys a materialized secret of this plan is expected to hold.
    pub fn expected_keys(&self) -> Vec<String> {
        match self {
            SecretPlan::X509(p) => {
                let mut keys = vec![
                    "certificate".to_string(),
                    "combined".to_string(),
                    "key".to_string(),
                ];
                if p.is_ca {
                    keys.push("crl".to_string());
                    keys.push("serial".to_string());
                }
                keys
            }
            SecretPlan::Rsa(_) => vec!["private".to_string(), "public".to_string()],
            SecretPlan::Ssh(_) => vec![
                "private".to_string(),
                "public".to_string(),
                "fingerprint".to_string(),
            ],
            SecretPlan::Dhparams(_) => vec!["dhparam-pem".to_string()],
            SecretPlan::Random(p) => {
                let mut keys = vec![p.key.clone()];
                if let Some(paired) = p.paired_key() {
                    keys.push(paired);
                }
                keys
            }
            SecretPlan::Error(_) => Vec::new(),
        }
    }
}
