// src/store/mod.rs

//! Persistent trust stores
//!
//! Fingerprints and signing-entity records outlive the process. The client
//! talks to them through the two traits here and assumes implementations
//! provide their own concurrency guarantees. Two implementations ship with
//! the crate: JSON files under a root directory, and in-memory maps for
//! tests and ephemeral use.

mod fs;
mod memory;

pub use fs::{FileFingerprintStorage, FileSigningEntityStorage};
pub use memory::{MemoryFingerprintStorage, MemorySigningEntityStorage};

use std::collections::HashMap;

use async_trait::async_trait;
use semver::Version;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::fingerprint::{Fingerprint, VersionFingerprints};
use crate::identity::RegistryIdentity;
use crate::signing::{SigningEntity, SigningEntityOrigin};

/// Store of pinned checksums, keyed by package and version
#[async_trait]
pub trait FingerprintStorage: Send + Sync {
    /// All fingerprints recorded for a package version. An unknown package
    /// or version yields an empty record, not an error.
    async fn get(
        &self,
        package: &RegistryIdentity,
        version: &Version,
    ) -> Result<VersionFingerprints>;

    /// Record a fingerprint, replacing any previous record with the same
    /// kind and origin. Comparison against existing pins is the caller's
    /// responsibility.
    async fn put(
        &self,
        package: &RegistryIdentity,
        version: &Version,
        fingerprint: &Fingerprint,
    ) -> Result<()>;
}

/// The signer recorded for one package version
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionSigner {
    pub entity: SigningEntity,
    /// Registries this entity has been observed from
    pub origins: Vec<SigningEntityOrigin>,
}

/// Signing history of one package
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PackageSigners(pub HashMap<Version, VersionSigner>);

impl PackageSigners {
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// The entity recorded for a specific version
    pub fn signer(&self, version: &Version) -> Option<&SigningEntity> {
        self.0.get(version).map(|signer| &signer.entity)
    }

    /// The highest version signed by a recognized entity, if any
    pub fn latest_recognized(&self) -> Option<(&Version, &SigningEntity)> {
        self.0
            .iter()
            .filter(|(_, signer)| signer.entity.is_recognized())
            .max_by_key(|(version, _)| *version)
            .map(|(version, signer)| (version, &signer.entity))
    }
}

/// Store of observed signing entities, keyed by package
#[async_trait]
pub trait SigningEntityStorage: Send + Sync {
    /// The signing history of a package. An unknown package yields an
    /// empty record.
    async fn get(&self, package: &RegistryIdentity) -> Result<PackageSigners>;

    /// Record an entity for a version. When the same entity is already
    /// recorded, the origin is merged; a differing entity replaces the
    /// record (history checks happen before this call).
    async fn put(
        &self,
        package: &RegistryIdentity,
        version: &Version,
        entity: &SigningEntity,
        origin: &SigningEntityOrigin,
    ) -> Result<()>;

    /// Administrative overwrite of the recorded entity for a version,
    /// discarding prior origins.
    async fn change_signing_entity(
        &self,
        package: &RegistryIdentity,
        version: &Version,
        entity: &SigningEntity,
        origin: &SigningEntityOrigin,
    ) -> Result<()>;
}

/// Shared merge used by both storage implementations.
pub(crate) fn merge_signer(
    signers: &mut PackageSigners,
    version: &Version,
    entity: &SigningEntity,
    origin: &SigningEntityOrigin,
) {
    match signers.0.get_mut(version) {
        Some(existing) if existing.entity == *entity => {
            if !existing.origins.contains(origin) {
                existing.origins.push(origin.clone());
            }
        }
        _ => {
            signers.0.insert(
                version.clone(),
                VersionSigner {
                    entity: entity.clone(),
                    origins: vec![origin.clone()],
                },
            );
        }
    }
}
