// src/store/memory.rs

//! In-memory trust stores
//!
//! Process-lifetime maps guarded by read-write locks. Used in tests and by
//! callers that opt out of persistence; records vanish when the process
//! exits, so every run re-pins from scratch.

use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;
use semver::Version;

use crate::error::Result;
use crate::fingerprint::{Fingerprint, VersionFingerprints};
use crate::identity::RegistryIdentity;
use crate::signing::{SigningEntity, SigningEntityOrigin};
use crate::store::{
    merge_signer, FingerprintStorage, PackageSigners, SigningEntityStorage, VersionSigner,
};

fn package_key(package: &RegistryIdentity) -> String {
    format!("{}.{}", package.scope.canonical(), package.name.canonical())
}

/// Fingerprints held in a process-local map
#[derive(Default)]
pub struct MemoryFingerprintStorage {
    entries: RwLock<HashMap<String, HashMap<Version, VersionFingerprints>>>,
}

impl MemoryFingerprintStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl FingerprintStorage for MemoryFingerprintStorage {
    async fn get(
        &self,
        package: &RegistryIdentity,
        version: &Version,
    ) -> Result<VersionFingerprints> {
        let entries = match self.entries.read() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        Ok(entries
            .get(&package_key(package))
            .and_then(|versions| versions.get(version))
            .cloned()
            .unwrap_or_default())
    }

    async fn put(
        &self,
        package: &RegistryIdentity,
        version: &Version,
        fingerprint: &Fingerprint,
    ) -> Result<()> {
        let mut entries = match self.entries.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        entries
            .entry(package_key(package))
            .or_default()
            .entry(version.clone())
            .or_default()
            .insert(fingerprint.clone());
        Ok(())
    }
}

/// Signing-entity records held in a process-local map
#[derive(Default)]
pub struct MemorySigningEntityStorage {
    entries: RwLock<HashMap<String, PackageSigners>>,
}

impl MemorySigningEntityStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SigningEntityStorage for MemorySigningEntityStorage {
    async fn get(&self, package: &RegistryIdentity) -> Result<PackageSigners> {
        let entries = match self.entries.read() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        Ok(entries.get(&package_key(package)).cloned().unwrap_or_default())
    }

    async fn put(
        &self,
        package: &RegistryIdentity,
        version: &Version,
        entity: &SigningEntity,
        origin: &SigningEntityOrigin,
    ) -> Result<()> {
        let mut entries = match self.entries.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        let signers = entries.entry(package_key(package)).or_default();
        merge_signer(signers, version, entity, origin);
        Ok(())
    }

    async fn change_signing_entity(
        &self,
        package: &RegistryIdentity,
        version: &Version,
        entity: &SigningEntity,
        origin: &SigningEntityOrigin,
    ) -> Result<()> {
        let mut entries = match self.entries.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        let signers = entries.entry(package_key(package)).or_default();
        signers.0.insert(
            version.clone(),
            VersionSigner {
                entity: entity.clone(),
                origins: vec![origin.clone()],
            },
        );
        Ok(())
    }
}
