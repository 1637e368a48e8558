// src/signing/mod.rs

//! Signing entities, signature formats, and the trust pipeline
//!
//! The cryptographic work (parsing detached signatures, walking
//! certificate chains, evaluating trust roots) belongs to an injected
//! [`SignatureVerifier`](crate::signing::verifier::SignatureVerifier).
//! This module owns everything around it: the identity extracted from a
//! signature, the consent flow for unsigned and untrusted content, and
//! trust-on-first-use tracking of who signs each package.

mod entity;
mod validation;
mod verifier;

pub use entity::SigningEntityTofu;
pub use validation::{SignatureValidation, SigningConsentDelegate};
pub use verifier::{SignatureVerdict, SignatureVerifier};

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::Error;

/// Format of a detached signature
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SignatureFormat {
    #[serde(rename = "cms-1.0.0")]
    Cms1_0_0,
}

impl fmt::Display for SignatureFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Cms1_0_0 => f.write_str("cms-1.0.0"),
        }
    }
}

impl FromStr for SignatureFormat {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "cms-1.0.0" => Ok(Self::Cms1_0_0),
            other => Err(Error::UnknownSignatureFormat {
                format: other.to_string(),
            }),
        }
    }
}

/// The identity extracted from a signature
///
/// Recognized entities come from certificates whose subject carries the
/// full set of naming attributes; anything else is kept verbatim as
/// unrecognized. Comparison is structural on all fields.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum SigningEntity {
    #[serde(rename_all = "kebab-case")]
    Recognized {
        /// Certificate program the entity was recognized under
        certificate_type: String,
        name: String,
        organizational_unit: String,
        organization: String,
    },
    #[serde(rename_all = "kebab-case")]
    Unrecognized {
        name: Option<String>,
        email: Option<String>,
        organization: Option<String>,
    },
}

impl SigningEntity {
    pub fn is_recognized(&self) -> bool {
        matches!(self, Self::Recognized { .. })
    }

    /// Display name, falling back through the descriptor fields
    pub fn name(&self) -> Option<&str> {
        match self {
            Self::Recognized { name, .. } => Some(name),
            Self::Unrecognized {
                name,
                email,
                organization,
            } => name
                .as_deref()
                .or(email.as_deref())
                .or(organization.as_deref()),
        }
    }
}

impl fmt::Display for SigningEntity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name().unwrap_or("<unknown signer>"))
    }
}

/// Where a signing-entity record was observed
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "url", rename_all = "kebab-case")]
pub enum SigningEntityOrigin {
    Registry(Url),
}

impl fmt::Display for SigningEntityOrigin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Registry(url) => write!(f, "registry {url}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn recognized(name: &str) -> SigningEntity {
        SigningEntity::Recognized {
            certificate_type: "adp".to_string(),
            name: name.to_string(),
            organizational_unit: "Engineering".to_string(),
            organization: "Mona Inc".to_string(),
        }
    }

    #[test]
    fn test_signature_format_round_trip() {
        let format: SignatureFormat = "cms-1.0.0".parse().unwrap();
        assert_eq!(format.to_string(), "cms-1.0.0");
        assert!(matches!(
            "pgp".parse::<SignatureFormat>(),
            Err(Error::UnknownSignatureFormat { .. })
        ));
    }

    #[test]
    fn test_structural_equality() {
        assert_eq!(recognized("Mona"), recognized("Mona"));
        assert_ne!(recognized("Mona"), recognized("Eve"));
        assert_ne!(
            recognized("Mona"),
            SigningEntity::Unrecognized {
                name: Some("Mona".to_string()),
                email: None,
                organization: None,
            }
        );
    }

    #[test]
    fn test_entity_serde_round_trip() {
        for entity in [
            recognized("Mona"),
            SigningEntity::Unrecognized {
                name: None,
                email: Some("mona@example.com".to_string()),
                organization: None,
            },
        ] {
            let json = serde_json::to_string(&entity).unwrap();
            let back: SigningEntity = serde_json::from_str(&json).unwrap();
            assert_eq!(entity, back);
        }
    }

    #[test]
    fn test_display_falls_back_through_fields() {
        let entity = SigningEntity::Unrecognized {
            name: None,
            email: Some("mona@example.com".to_string()),
            organization: None,
        };
        assert_eq!(entity.to_string(), "mona@example.com");
    }
}
