// src/config.rs

//! Registry configuration: endpoints, authentication, and trust policy
//!
//! Configuration is a plain serde document so it can be loaded from the
//! package manager's `registries.json`. Scope mappings win over the
//! default registry; scope keys compare case-insensitively.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::cache::FreshnessPolicy;
use crate::error::{Error, Result};
use crate::identity::PackageScope;

/// How a registry expects the `Authorization` header to be derived
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuthenticationKind {
    #[default]
    None,
    Basic,
    Token,
}

/// A configured registry endpoint
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Registry {
    pub url: Url,
    /// Registries that do not implement the `/availability` probe are
    /// treated as always available.
    #[serde(default)]
    pub supports_availability: bool,
    #[serde(default)]
    pub authentication: AuthenticationKind,
}

impl Registry {
    pub fn new(url: Url) -> Self {
        Self {
            url,
            supports_availability: false,
            authentication: AuthenticationKind::None,
        }
    }

    pub fn with_availability(mut self, supported: bool) -> Self {
        self.supports_availability = supported;
        self
    }

    pub fn with_authentication(mut self, kind: AuthenticationKind) -> Self {
        self.authentication = kind;
        self
    }
}

/// Severity applied when a pinned value disagrees with an observed one
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CheckingMode {
    /// Mismatches are fatal
    #[default]
    Strict,
    /// Mismatches are logged and the operation continues
    Warn,
}

/// Signature validation policy
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct SigningPolicy {
    /// Disable the signature pipeline entirely. Checksum pinning still runs.
    pub skip_signature_validation: bool,
}

/// Trust policy knobs for the validation pipeline
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct SecurityPolicy {
    pub signing: SigningPolicy,
    /// Applied to checksum fingerprints
    pub fingerprint_checking: CheckingMode,
    /// Applied to signing-entity history
    pub signing_entity_checking: CheckingMode,
}

/// Complete client configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct RegistryConfiguration {
    /// Fallback registry for scopes without an explicit mapping
    pub default_registry: Option<Registry>,
    /// Per-scope registry assignments; keys are scope strings
    pub scoped_registries: HashMap<String, Registry>,
    pub security: SecurityPolicy,
    /// Freshness predicate for the availability and metadata caches
    pub cache_freshness: FreshnessPolicy,
}

impl RegistryConfiguration {
    /// Build a configuration with only a default registry.
    pub fn with_default_registry(registry: Registry) -> Self {
        Self {
            default_registry: Some(registry),
            ..Default::default()
        }
    }

    /// Assign a registry to a package scope.
    pub fn set_scoped_registry(&mut self, scope: &PackageScope, registry: Registry) {
        self.scoped_registries.insert(scope.canonical(), registry);
    }

    /// The registry responsible for a scope: the scoped mapping if one
    /// exists, the default otherwise.
    pub fn registry_for(&self, scope: &PackageScope) -> Option<&Registry> {
        self.scoped_registries
            .get(&scope.canonical())
            .or(self.default_registry.as_ref())
    }

    /// Parse a configuration document.
    pub fn from_json(json: &str) -> Result<Self> {
        let configuration: Self =
            serde_json::from_str(json).map_err(|e| Error::BadConfiguration {
                details: format!("malformed registry configuration: {e}"),
            })?;
        for scope in configuration.scoped_registries.keys() {
            scope.parse::<PackageScope>().map_err(|_| Error::BadConfiguration {
                details: format!("'{scope}' is not a valid package scope"),
            })?;
        }
        Ok(configuration)
    }
}
