//! External access policy
//!
//! Mirrors the `accessExternalSchema` property: an empty value forbids every external
//! reference, `all` permits any, and a comma-separated list permits the named schemes only.
//! The policy is a plain value handed to the reader factory; nothing here consults the
//! process environment.

use std::fmt;
use std::path::Path;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::Url;

/// Name of the access-control property, as quoted in diagnostics
pub const ACCESS_EXTERNAL_SCHEMA: &str = "accessExternalSchema";

/// Scheme assumed for references that carry none and cannot be expanded
pub const DEFAULT_SCHEME: &str = "file";

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Invalid accessExternalSchema value '{value}': {reason}")]
pub struct InvalidAccessPolicy {
    pub value: String,
    pub reason: String,
}

/// Which URI schemes the engine may dereference on its own
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum AccessPolicy {
    /// No external access at all
    #[default]
    Deny,
    /// Any scheme
    All,
    /// Only the listed schemes (lowercase)
    Schemes(Vec<String>),
}

impl AccessPolicy {
    pub fn parse(value: &str) -> Result<Self, InvalidAccessPolicy> {
        let trimmed = value.trim();
        if trimmed.is_empty() {
            return Ok(AccessPolicy::Deny);
        }
        if trimmed.eq_ignore_ascii_case("all") {
            return Ok(AccessPolicy::All);
        }

        let mut schemes = Vec::new();
        for part in trimmed.split(',') {
            let scheme = part.trim().to_ascii_lowercase();
            if scheme.is_empty() {
                continue;
            }
            if scheme.eq_ignore_ascii_case("all") {
                return Err(InvalidAccessPolicy {
                    value: value.to_string(),
                    reason: "'all' cannot be combined with other schemes".to_string(),
                });
            }
            let valid = scheme.starts_with(|c: char| c.is_ascii_alphabetic())
                && scheme
                    .chars()
                    .all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.' | ':'));
            if !valid {
                return Err(InvalidAccessPolicy {
                    value: value.to_string(),
                    reason: format!("'{}' is not a URI scheme", scheme),
                });
            }
            if !schemes.contains(&scheme) {
                schemes.push(scheme);
            }
        }

        if schemes.is_empty() {
            Ok(AccessPolicy::Deny)
        } else {
            Ok(AccessPolicy::Schemes(schemes))
        }
    }

    pub fn permits(&self, scheme: &str) -> bool {
        match self {
            AccessPolicy::Deny => false,
            AccessPolicy::All => true,
            AccessPolicy::Schemes(schemes) => {
                schemes.iter().any(|s| s.eq_ignore_ascii_case(scheme))
            }
        }
    }

    pub fn is_deny(&self) -> bool {
        matches!(self, AccessPolicy::Deny)
    }
}

impl fmt::Display for AccessPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AccessPolicy::Deny => Ok(()),
            AccessPolicy::All => f.write_str("all"),
            AccessPolicy::Schemes(schemes) => f.write_str(&schemes.join(",")),
        }
    }
}

impl FromStr for AccessPolicy {
    type Err = InvalidAccessPolicy;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for AccessPolicy {
    type Error = InvalidAccessPolicy;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<AccessPolicy> for String {
    fn from(policy: AccessPolicy) -> Self {
        policy.to_string()
    }
}

/// Expand a possibly relative reference against the referencing document's system id.
///
/// Absolute references are returned untouched so that canonical identifiers compare exactly.
/// A base that is not a URI is taken as a filesystem path.
pub fn expand_system_id(reference: &str, base: Option<&str>) -> String {
    let reference = reference.trim();
    if Url::parse(reference).is_ok() {
        return reference.to_string();
    }

    let Some(base_url) = base.and_then(base_url) else {
        return reference.to_string();
    };

    match base_url.join(reference) {
        Ok(expanded) => expanded.to_string(),
        Err(_) => reference.to_string(),
    }
}

fn base_url(base: &str) -> Option<Url> {
    if let Ok(url) = Url::parse(base) {
        return Some(url);
    }
    let path = std::path::absolute(Path::new(base)).ok()?;
    Url::from_file_path(path).ok()
}

/// Scheme of a system id, lowercased; relative references count as local files.
pub fn scheme_of(system_id: &str) -> String {
    match Url::parse(system_id.trim()) {
        Ok(url) => url.scheme().to_string(),
        Err(_) => DEFAULT_SCHEME.to_string(),
    }
}
