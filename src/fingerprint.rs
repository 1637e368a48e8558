// src/fingerprint.rs

//! Trust-on-first-use checksum pinning
//!
//! The first checksum observed for a (package, version, kind, registry) is
//! pinned through the injected fingerprint storage. Every later download of
//! the same content is compared against the pin: a mismatch is fatal under
//! strict checking and a diagnostic under warn. The pin is never updated on
//! a mismatch.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use semver::Version;
use serde::{de, Deserialize, Deserializer, Serialize, Serializer};
use tracing::{debug, warn};
use url::Url;

use crate::config::{CheckingMode, Registry};
use crate::error::{Error, Result};
use crate::identity::{PackageIdentity, RegistryIdentity};
use crate::store::FingerprintStorage;

/// What a fingerprint covers
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum FingerprintKind {
    SourceArchive,
    /// A manifest, optionally specialized to a tools version
    Manifest(Option<String>),
}

impl FingerprintKind {
    /// Canonical storage key: `source-archive`, `manifest`, or
    /// `manifest-<tools-version>`.
    pub fn key(&self) -> String {
        match self {
            Self::SourceArchive => "source-archive".to_string(),
            Self::Manifest(None) => "manifest".to_string(),
            Self::Manifest(Some(tools_version)) => format!("manifest-{tools_version}"),
        }
    }
}

impl fmt::Display for FingerprintKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.key())
    }
}

impl FromStr for FingerprintKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "source-archive" => Ok(Self::SourceArchive),
            "manifest" => Ok(Self::Manifest(None)),
            other => match other.strip_prefix("manifest-") {
                Some(tools_version) if !tools_version.is_empty() => {
                    Ok(Self::Manifest(Some(tools_version.to_string())))
                }
                _ => Err(Error::BadConfiguration {
                    details: format!("unknown fingerprint kind '{other}'"),
                }),
            },
        }
    }
}

impl Serialize for FingerprintKind {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.key())
    }
}

impl<'de> Deserialize<'de> for FingerprintKind {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(de::Error::custom)
    }
}

/// A pinned checksum
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Fingerprint {
    /// Registry the checksum was observed from
    pub origin: Url,
    pub kind: FingerprintKind,
    /// Lowercase hex digest
    pub value: String,
}

/// Fingerprints recorded for one package version, keyed by kind then
/// origin URL
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VersionFingerprints(pub HashMap<String, HashMap<String, Fingerprint>>);

impl VersionFingerprints {
    pub fn find(&self, kind: &FingerprintKind, origin: &Url) -> Option<&Fingerprint> {
        self.0.get(&kind.key())?.get(origin.as_str())
    }

    pub fn insert(&mut self, fingerprint: Fingerprint) {
        self.0
            .entry(fingerprint.kind.key())
            .or_default()
            .insert(fingerprint.origin.as_str().to_string(), fingerprint);
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Checksum validation against the fingerprint store
pub struct ChecksumTofu {
    storage: Arc<dyn FingerprintStorage>,
    mode: CheckingMode,
}

impl ChecksumTofu {
    pub fn new(storage: Arc<dyn FingerprintStorage>, mode: CheckingMode) -> Self {
        Self { storage, mode }
    }

    /// Validate a downloaded source archive.
    ///
    /// On first use the registry-declared checksum is required, compared
    /// against the computed one, and pinned. On later uses the computed
    /// checksum is compared against the pin.
    pub async fn validate_source_archive(
        &self,
        registry: &Registry,
        package: &RegistryIdentity,
        version: &Version,
        computed: &str,
        declared: Option<&str>,
    ) -> Result<()> {
        let kind = FingerprintKind::SourceArchive;
        let pinned = self.pinned(package, version, &kind, &registry.url).await?;

        match pinned {
            Some(previous) => self.compare(registry, package, version, computed, &previous),
            None => {
                let declared = declared.ok_or_else(|| Error::SourceArchiveMissingChecksum {
                    registry: registry.url.clone(),
                    package: PackageIdentity::Registry(package.clone()),
                    version: version.clone(),
                })?;
                if declared != computed {
                    match self.mode {
                        CheckingMode::Strict => {
                            return Err(Error::InvalidChecksum {
                                expected: declared.to_string(),
                                actual: computed.to_string(),
                            });
                        }
                        CheckingMode::Warn => {
                            warn!(
                                %package, %version,
                                "computed checksum '{computed}' does not match declared '{declared}'"
                            );
                        }
                    }
                }
                self.pin(registry, package, version, kind, declared).await
            }
        }
    }

    /// Validate a fetched manifest. Manifests carry no registry-declared
    /// checksum; the first computed value becomes the pin.
    pub async fn validate_manifest(
        &self,
        registry: &Registry,
        package: &RegistryIdentity,
        version: &Version,
        computed: &str,
        tools_version: Option<&str>,
    ) -> Result<()> {
        let kind = FingerprintKind::Manifest(tools_version.map(str::to_string));
        let pinned = self.pinned(package, version, &kind, &registry.url).await?;

        match pinned {
            Some(previous) => self.compare(registry, package, version, computed, &previous),
            None => self.pin(registry, package, version, kind, computed).await,
        }
    }

    async fn pinned(
        &self,
        package: &RegistryIdentity,
        version: &Version,
        kind: &FingerprintKind,
        origin: &Url,
    ) -> Result<Option<String>> {
        let fingerprints = self.storage.get(package, version).await?;
        Ok(fingerprints.find(kind, origin).map(|f| f.value.clone()))
    }

    async fn pin(
        &self,
        registry: &Registry,
        package: &RegistryIdentity,
        version: &Version,
        kind: FingerprintKind,
        value: &str,
    ) -> Result<()> {
        debug!(%package, %version, kind = %kind, "pinning checksum '{value}'");
        let fingerprint = Fingerprint {
            origin: registry.url.clone(),
            kind,
            value: value.to_string(),
        };
        self.storage.put(package, version, &fingerprint).await
    }

    fn compare(
        &self,
        registry: &Registry,
        package: &RegistryIdentity,
        version: &Version,
        computed: &str,
        pinned: &str,
    ) -> Result<()> {
        if computed == pinned {
            return Ok(());
        }
        match self.mode {
            CheckingMode::Strict => Err(Error::ChecksumChanged {
                registry: registry.url.clone(),
                package: PackageIdentity::Registry(package.clone()),
                version: version.clone(),
                latest: computed.to_string(),
                previous: pinned.to_string(),
            }),
            CheckingMode::Warn => {
                warn!(
                    %package, %version,
                    "checksum changed from previously recorded '{pinned}' to '{computed}'"
                );
                Ok(())
            }
        }
    }
}
