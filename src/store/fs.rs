// src/store/fs.rs

//! Filesystem-backed trust stores
//!
//! One JSON document per package under a root directory, named by the
//! lowercased `scope.name` identity:
//!
//! ```text
//! root/
//! +-- fingerprints/
//! |   +-- mona.linkedlist.json
//! +-- signing-entities/
//!     +-- mona.linkedlist.json
//! ```
//!
//! Writes are read-modify-write under an async mutex, so a single store
//! instance is safe to share across tasks. Multiple processes pointed at
//! the same directory race at file granularity, which mirrors the
//! guarantees of the package manager's other on-disk state.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use semver::Version;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::sync::Mutex;
use tracing::debug;

use crate::error::{Error, Result};
use crate::fingerprint::{Fingerprint, VersionFingerprints};
use crate::identity::RegistryIdentity;
use crate::signing::{SigningEntity, SigningEntityOrigin};
use crate::store::{
    merge_signer, FingerprintStorage, PackageSigners, SigningEntityStorage, VersionSigner,
};

fn package_file(root: &Path, package: &RegistryIdentity) -> PathBuf {
    root.join(format!(
        "{}.{}.json",
        package.scope.canonical(),
        package.name.canonical()
    ))
}

async fn read_document<T: DeserializeOwned + Default>(path: &Path) -> Result<T> {
    match tokio::fs::read(path).await {
        Ok(bytes) => serde_json::from_slice(&bytes).map_err(|e| Error::FailedLoadingPackageMetadata {
            path: path.to_path_buf(),
            details: format!("corrupt store file: {e}"),
        }),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(T::default()),
        Err(e) => Err(e.into()),
    }
}

async fn write_document<T: Serialize>(path: &Path, document: &T) -> Result<()> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    let json = serde_json::to_vec_pretty(document).map_err(|e| Error::FailedLoadingPackageMetadata {
        path: path.to_path_buf(),
        details: format!("failed encoding store file: {e}"),
    })?;
    tokio::fs::write(path, json).await?;
    Ok(())
}

/// Fingerprints persisted as one JSON file per package
pub struct FileFingerprintStorage {
    root: PathBuf,
    write_lock: Mutex<()>,
}

impl FileFingerprintStorage {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            write_lock: Mutex::new(()),
        }
    }
}

#[async_trait]
impl FingerprintStorage for FileFingerprintStorage {
    async fn get(
        &self,
        package: &RegistryIdentity,
        version: &Version,
    ) -> Result<VersionFingerprints> {
        let path = package_file(&self.root, package);
        let document: HashMap<Version, VersionFingerprints> = read_document(&path).await?;
        Ok(document.get(version).cloned().unwrap_or_default())
    }

    async fn put(
        &self,
        package: &RegistryIdentity,
        version: &Version,
        fingerprint: &Fingerprint,
    ) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        let path = package_file(&self.root, package);
        let mut document: HashMap<Version, VersionFingerprints> = read_document(&path).await?;
        document
            .entry(version.clone())
            .or_default()
            .insert(fingerprint.clone());
        write_document(&path, &document).await?;
        debug!(%package, %version, path = %path.display(), "fingerprint recorded");
        Ok(())
    }
}

/// Signing-entity records persisted as one JSON file per package
pub struct FileSigningEntityStorage {
    root: PathBuf,
    write_lock: Mutex<()>,
}

impl FileSigningEntityStorage {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            write_lock: Mutex::new(()),
        }
    }
}

#[async_trait]
impl SigningEntityStorage for FileSigningEntityStorage {
    async fn get(&self, package: &RegistryIdentity) -> Result<PackageSigners> {
        let path = package_file(&self.root, package);
        read_document(&path).await
    }

    async fn put(
        &self,
        package: &RegistryIdentity,
        version: &Version,
        entity: &SigningEntity,
        origin: &SigningEntityOrigin,
    ) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        let path = package_file(&self.root, package);
        let mut signers: PackageSigners = read_document(&path).await?;
        merge_signer(&mut signers, version, entity, origin);
        write_document(&path, &signers).await?;
        debug!(%package, %version, "signing entity recorded");
        Ok(())
    }

    async fn change_signing_entity(
        &self,
        package: &RegistryIdentity,
        version: &Version,
        entity: &SigningEntity,
        origin: &SigningEntityOrigin,
    ) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        let path = package_file(&self.root, package);
        let mut signers: PackageSigners = read_document(&path).await?;
        signers.0.insert(
            version.clone(),
            VersionSigner {
                entity: entity.clone(),
                origins: vec![origin.clone()],
            },
        );
        write_document(&path, &signers).await?;
        debug!(%package, %version, "signing entity overwritten");
        Ok(())
    }
}
