// src/signing/entity.rs

//! Trust-on-first-use tracking of signing entities
//!
//! One entity is recorded per (package, version). Within a package's
//! history, a release signed by someone other than the recognized entity
//! that signed earlier releases is a trust failure; the same applies to
//! the entity of a single release changing between downloads.

use std::sync::Arc;

use semver::Version;
use tracing::{debug, warn};

use crate::config::{CheckingMode, Registry};
use crate::error::{Error, Result};
use crate::identity::{PackageIdentity, RegistryIdentity};
use crate::signing::{SigningEntity, SigningEntityOrigin};
use crate::store::SigningEntityStorage;

pub struct SigningEntityTofu {
    storage: Arc<dyn SigningEntityStorage>,
    mode: CheckingMode,
}

impl SigningEntityTofu {
    pub fn new(storage: Arc<dyn SigningEntityStorage>, mode: CheckingMode) -> Self {
        Self { storage, mode }
    }

    /// Whether any release of the package was previously signed by a
    /// recognized entity. Consulted before accepting unsigned content.
    pub async fn has_recognized_signer(&self, package: &RegistryIdentity) -> Result<bool> {
        let signers = self.storage.get(package).await?;
        Ok(signers.latest_recognized().is_some())
    }

    /// Compare an observed entity against the package's history and record
    /// it.
    pub async fn validate(
        &self,
        registry: &Registry,
        package: &RegistryIdentity,
        version: &Version,
        entity: Option<&SigningEntity>,
    ) -> Result<()> {
        let Some(entity) = entity else {
            // no identity could be extracted; nothing to compare or record
            return Ok(());
        };

        let signers = self.storage.get(package).await?;

        if let Some(existing) = signers.signer(version) {
            if existing != entity {
                match self.mode {
                    CheckingMode::Strict => {
                        return Err(Error::SigningEntityForReleaseChanged {
                            registry: registry.url.clone(),
                            package: PackageIdentity::Registry(package.clone()),
                            version: version.clone(),
                            latest: entity.clone(),
                            previous: existing.clone(),
                        });
                    }
                    CheckingMode::Warn => {
                        warn!(
                            %package, %version,
                            "signing entity changed from '{existing}' to '{entity}'; keeping the original record"
                        );
                        return Ok(());
                    }
                }
            }
        } else if let Some((previous_version, previous)) = signers.latest_recognized() {
            if previous != entity {
                match self.mode {
                    CheckingMode::Strict => {
                        return Err(Error::SigningEntityForPackageChanged {
                            registry: registry.url.clone(),
                            package: PackageIdentity::Registry(package.clone()),
                            version: version.clone(),
                            latest: entity.clone(),
                            previous: previous.clone(),
                            previous_version: previous_version.clone(),
                        });
                    }
                    CheckingMode::Warn => {
                        warn!(
                            %package, %version,
                            "package previously signed by '{previous}' (version {previous_version}), now signed by '{entity}'"
                        );
                    }
                }
            }
        }

        debug!(%package, %version, signer = %entity, "recording signing entity");
        let origin = SigningEntityOrigin::Registry(registry.url.clone());
        self.storage.put(package, version, entity, &origin).await
    }

    /// Administrative overwrite of a recorded entity.
    pub async fn change(
        &self,
        package: &RegistryIdentity,
        version: &Version,
        entity: &SigningEntity,
        origin: &SigningEntityOrigin,
    ) -> Result<()> {
        self.storage
            .change_signing_entity(package, version, entity, origin)
            .await
    }
}
