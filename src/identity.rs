// src/identity.rs

//! Package identities and the registry naming scheme
//!
//! A registry-qualified identity has the form `scope.name`:
//! - **Scope**: 1-39 ASCII alphanumerics or hyphens; hyphens may not lead,
//!   trail, or repeat.
//! - **Name**: 1-100 ASCII alphanumerics, hyphens, or underscores, with the
//!   same rules for both separator characters.
//!
//! Scopes and names compare case-insensitively but preserve their original
//! spelling for display. Identities that are not registry-qualified carry
//! the SCM URL they were derived from; registry operations reject those
//! with an *invalid package identity* error.

use std::fmt;
use std::hash::{Hash, Hasher};
use std::str::FromStr;

use serde::{de, Deserialize, Deserializer, Serialize, Serializer};
use url::Url;

use crate::error::Error;

const MAX_SCOPE_LENGTH: usize = 39;
const MAX_NAME_LENGTH: usize = 100;

/// Validate a sequence of alphanumerics interleaved with single, non-edge
/// separator characters.
fn valid_identifier(s: &str, max_length: usize, separators: &[char]) -> bool {
    if s.is_empty() || s.len() > max_length {
        return false;
    }
    let mut previous_was_separator = true; // rejects a leading separator
    for c in s.chars() {
        if c.is_ascii_alphanumeric() {
            previous_was_separator = false;
        } else if separators.contains(&c) {
            if previous_was_separator {
                return false;
            }
            previous_was_separator = true;
        } else {
            return false;
        }
    }
    !previous_was_separator // rejects a trailing separator
}

/// A package scope under the registry naming scheme
#[derive(Debug, Clone)]
pub struct PackageScope(String);

impl PackageScope {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Lowercased form, used for case-insensitive keying
    pub fn canonical(&self) -> String {
        self.0.to_ascii_lowercase()
    }
}

impl FromStr for PackageScope {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if valid_identifier(s, MAX_SCOPE_LENGTH, &['-']) {
            Ok(Self(s.to_string()))
        } else {
            Err(Error::InvalidPackageIdentity {
                identity: s.to_string(),
            })
        }
    }
}

impl fmt::Display for PackageScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl PartialEq for PackageScope {
    fn eq(&self, other: &Self) -> bool {
        self.0.eq_ignore_ascii_case(&other.0)
    }
}

impl Eq for PackageScope {}

impl Hash for PackageScope {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.canonical().hash(state);
    }
}

/// A package name under the registry naming scheme
#[derive(Debug, Clone)]
pub struct PackageName(String);

impl PackageName {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn canonical(&self) -> String {
        self.0.to_ascii_lowercase()
    }
}

impl FromStr for PackageName {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if valid_identifier(s, MAX_NAME_LENGTH, &['-', '_']) {
            Ok(Self(s.to_string()))
        } else {
            Err(Error::InvalidPackageIdentity {
                identity: s.to_string(),
            })
        }
    }
}

impl fmt::Display for PackageName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl PartialEq for PackageName {
    fn eq(&self, other: &Self) -> bool {
        self.0.eq_ignore_ascii_case(&other.0)
    }
}

impl Eq for PackageName {}

impl Hash for PackageName {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.canonical().hash(state);
    }
}

/// A registry-qualified `scope.name` pair
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RegistryIdentity {
    pub scope: PackageScope,
    pub name: PackageName,
}

impl RegistryIdentity {
    pub fn new(scope: PackageScope, name: PackageName) -> Self {
        Self { scope, name }
    }
}

impl FromStr for RegistryIdentity {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (scope, name) = s.split_once('.').ok_or_else(|| Error::InvalidPackageIdentity {
            identity: s.to_string(),
        })?;
        Ok(Self {
            scope: scope.parse()?,
            name: name.parse()?,
        })
    }
}

impl fmt::Display for RegistryIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.scope, self.name)
    }
}

/// A package identity as seen by the client
///
/// The registry form is the only one registry operations accept; the SCM
/// form exists so identity-lookup results and resolver inputs share one
/// type.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum PackageIdentity {
    Registry(RegistryIdentity),
    Scm(Url),
}

impl PackageIdentity {
    /// Parse either a `scope.name` pair or an SCM URL
    pub fn parse(s: &str) -> Result<Self, Error> {
        if let Ok(identity) = s.parse::<RegistryIdentity>() {
            return Ok(Self::Registry(identity));
        }
        match Url::parse(s) {
            Ok(url) => Ok(Self::Scm(url)),
            Err(_) => Err(Error::InvalidPackageIdentity {
                identity: s.to_string(),
            }),
        }
    }

    /// The registry form, if this identity is registry-qualified
    pub fn registry_identity(&self) -> Option<&RegistryIdentity> {
        match self {
            Self::Registry(identity) => Some(identity),
            Self::Scm(_) => None,
        }
    }
}

impl From<RegistryIdentity> for PackageIdentity {
    fn from(identity: RegistryIdentity) -> Self {
        Self::Registry(identity)
    }
}

impl fmt::Display for PackageIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Registry(identity) => identity.fmt(f),
            Self::Scm(url) => url.fmt(f),
        }
    }
}

impl Serialize for PackageIdentity {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for PackageIdentity {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::parse(&s).map_err(de::Error::custom)
    }
}
