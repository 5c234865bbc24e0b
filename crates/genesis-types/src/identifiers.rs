//! Type-safe identifiers and version types.

use crate::errors::{GenesisError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A validated Genesis environment name.
///
/// Environment names must:
/// - Start with a lowercase letter
/// - Contain only lowercase letters, digits, underscores, and hyphens
/// - End with a lowercase letter or digit
/// - Not contain consecutive hyphens or any whitespace
///
/// The name decomposes on `-` into an ancestor sequence: the environment
/// `us-west-prod` is composed from `us.yml`, `us-west.yml`, and
/// `us-west-prod.yml`, in that order.
///
/// # Example
///
/// ```
/// use genesis_types::EnvName;
///
/// let env = EnvName::new("us-west-prod").unwrap();
/// assert_eq!(env.as_str(), "us-west-prod");
/// assert_eq!(env.ancestors(), vec!["us", "us-west", "us-west-prod"]);
///
/// assert!(EnvName::new("Invalid-Name").is_err());
/// assert!(EnvName::new("double--hyphen").is_err());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EnvName(String);

impl EnvName {
    /// Create a new validated environment name.
    ///
    /// # Errors
    ///
    /// Returns an error if the name doesn't meet validation requirements.
    pub fn new(name: impl AsRef<str>) -> Result<Self> {
        let name = name.as_ref();
        if !Self::is_valid(name) {
            return Err(GenesisError::Config(format!(
                "Invalid environment name '{}': must start with a lowercase letter, \
                contain only lowercase letters, digits, underscores, and hyphens \
                (no consecutive hyphens), and end with a letter or digit",
                name
            )));
        }
        Ok(Self(name.to_string()))
    }

    /// Check if a name is valid without allocating.
    pub fn is_valid(name: &str) -> bool {
        if name.len() < 2 || name.contains("--") {
            return false;
        }

        let mut chars = name.chars();
        let first = chars.next().unwrap();
        let last = name.chars().last().unwrap();

        first.is_ascii_lowercase()
            && (last.is_ascii_lowercase() || last.is_ascii_digit())
            && name
                .chars()
                .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-' || c == '_')
    }

    /// Get the name as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The ancestor name sequence, shortest prefix first.
    ///
    /// For `a-b-c` this returns `["a", "a-b", "a-b-c"]`; each entry names
    /// one file of the environment's hierarchy (`<entry>.yml`).
    pub fn ancestors(&self) -> Vec<String> {
        let parts: Vec<&str> = self.0.split('-').collect();
        (1..=parts.len()).map(|i| parts[..i].join("-")).collect()
    }

    /// Extract a validated environment name from a file path stem.
    ///
    /// # Errors
    ///
    /// Returns an error if the path doesn't contain a valid environment name.
    pub fn from_path(path: impl AsRef<std::path::Path>) -> Result<Self> {
        let path = path.as_ref();

        let stem = path.file_stem().and_then(|s| s.to_str()).ok_or_else(|| {
            GenesisError::Config(format!(
                "Cannot extract environment name from path: {:?}",
                path
            ))
        })?;

        Self::new(stem)
    }
}

impl fmt::Display for EnvName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for EnvName {
    type Err = GenesisError;

    fn from_str(s: &str) -> Result<Self> {
        Self::new(s)
    }
}

/// Semantic version type following semver 2.0.0 specification.
///
/// Used to gate the running engine against `genesis.min_version` in
/// environment files and `genesis_version_min` in kit metadata.
///
/// # Example
///
/// ```
/// use genesis_types::SemVer;
///
/// let v = SemVer::parse("1.2.3-rc.1").unwrap();
/// assert_eq!(v.major, 1);
/// assert_eq!(v.pre_release.as_deref(), Some("rc.1"));
///
/// let v1 = SemVer::parse("1.2.3").unwrap();
/// let v2 = SemVer::parse("1.2.4").unwrap();
/// assert!(v1 < v2);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SemVer {
    /// Major version number (incompatible API changes)
    pub major: u32,
    /// Minor version number (backwards-compatible features)
    pub minor: u32,
    /// Patch version number (backwards-compatible bug fixes)
    pub patch: u32,
    /// Pre-release version identifier
    pub pre_release: Option<String>,
    /// Build metadata
    pub build: Option<String>,
}

impl SemVer {
    /// Parse a semantic version string.
    ///
    /// A leading `v` is tolerated; a missing patch (or minor) component
    /// defaults to zero, matching how kits commonly abbreviate versions.
    ///
    /// # Errors
    ///
    /// Returns an error if the version string is not valid semver.
    pub fn parse(version: &str) -> Result<Self> {
        let version = version.trim().trim_start_matches('v');

        let (version, build) = match version.split_once('+') {
            Some((v, b)) => (v, Some(b.to_string())),
            None => (version, None),
        };
        let (version, pre_release) = match version.split_once('-') {
            Some((v, p)) => (v, Some(p.to_string())),
            None => (version, None),
        };

        let mut numbers = version.split('.');
        let mut next_num = |what: &str| -> Result<u32> {
            match numbers.next() {
                None | Some("") => Ok(0),
                Some(n) => n.parse().map_err(|_| {
                    GenesisError::Config(format!("Invalid {} version component: {}", what, n))
                }),
            }
        };

        let major = next_num("major")?;
        let minor = next_num("minor")?;
        let patch = next_num("patch")?;

        Ok(Self {
            major,
            minor,
            patch,
            pre_release,
            build,
        })
    }

    /// Check if this version meets a minimum version requirement.
    pub fn meets_requirement(&self, min: &SemVer) -> bool {
        self >= min
    }
}

impl fmt::Display for SemVer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)?;
        if let Some(pre) = &self.pre_release {
            write!(f, "-{}", pre)?;
        }
        if let Some(build) = &self.build {
            write!(f, "+{}", build)?;
        }
        Ok(())
    }
}

impl FromStr for SemVer {
    type Err = GenesisError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl PartialOrd for SemVer {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for SemVer {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        // A pre-release sorts before the release it precedes.
        self.major
            .cmp(&other.major)
            .then(self.minor.cmp(&other.minor))
            .then(self.patch.cmp(&other.patch))
            .then(match (&self.pre_release, &other.pre_release) {
                (None, None) => std::cmp::Ordering::Equal,
                (None, Some(_)) => std::cmp::Ordering::Greater,
                (Some(_), None) => std::cmp::Ordering::Less,
                (Some(a), Some(b)) => a.cmp(b),
            })
    }
}

/// Kit identifier combining name and version.
///
/// # Example
///
/// ```
/// use genesis_types::{KitId, SemVer};
///
/// let kit = KitId {
///     name: "shield".to_string(),
///     version: SemVer::parse("1.2.3").unwrap(),
/// };
/// assert_eq!(kit.to_string(), "shield/1.2.3");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KitId {
    /// Kit name
    pub name: String,
    /// Kit version
    pub version: SemVer,
}

impl fmt::Display for KitId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.name, self.version)
    }
}
