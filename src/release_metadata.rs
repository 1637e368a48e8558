// src/release_metadata.rs

//! The release-metadata sidecar written next to extracted sources
//!
//! After a successful download the client drops a `.registry-metadata`
//! file at the root of the extracted tree, capturing where the release
//! came from, the descriptive metadata the registry served, and the
//! signing entity when the archive was signed. Consumers (and the
//! round-trip tests) read it back with [`load`].

use std::path::Path;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::{Error, Result};
use crate::metadata::PackageVersionMetadata;
use crate::signing::SigningEntity;

/// Sidecar filename at the root of the extracted package
pub const RELEASE_METADATA_FILENAME: &str = ".registry-metadata";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "url", rename_all = "kebab-case")]
pub enum ReleaseSource {
    Registry(Url),
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct ReleaseDescription {
    pub author: Option<String>,
    pub organization: Option<String>,
    pub description: Option<String>,
    pub license_url: Option<Url>,
    pub readme_url: Option<Url>,
    #[serde(default)]
    pub scm_repository_urls: Vec<Url>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct ReleaseSignature {
    pub signed_by: Option<SigningEntity>,
    pub format: String,
    pub base64: String,
}

/// Everything the sidecar records about a downloaded release
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct RegistryReleaseMetadata {
    pub source: ReleaseSource,
    pub metadata: ReleaseDescription,
    pub signature: Option<ReleaseSignature>,
}

impl RegistryReleaseMetadata {
    /// Assemble the sidecar from version metadata and the entity resolved
    /// during signature validation.
    pub(crate) fn from_version_metadata(
        version_metadata: &PackageVersionMetadata,
        signing_entity: Option<SigningEntity>,
    ) -> Self {
        let signature = version_metadata
            .source_archive()
            .and_then(|resource| resource.signing.as_ref())
            .map(|signing| ReleaseSignature {
                signed_by: signing_entity,
                format: signing.signature_format.clone(),
                base64: signing.signature_base64.clone(),
            });

        Self {
            source: ReleaseSource::Registry(version_metadata.registry.url.clone()),
            metadata: ReleaseDescription {
                author: version_metadata
                    .author
                    .as_ref()
                    .and_then(|author| author.name.clone()),
                organization: version_metadata
                    .author
                    .as_ref()
                    .and_then(|author| author.organization.clone()),
                description: version_metadata.description.clone(),
                license_url: version_metadata.license_url.clone(),
                readme_url: version_metadata.readme_url.clone(),
                scm_repository_urls: version_metadata
                    .repository_urls
                    .clone()
                    .unwrap_or_default(),
            },
            signature,
        }
    }
}

/// Write the sidecar at the root of an extracted package.
pub(crate) async fn write(root: &Path, metadata: &RegistryReleaseMetadata) -> Result<()> {
    let path = root.join(RELEASE_METADATA_FILENAME);
    let json =
        serde_json::to_vec_pretty(metadata).map_err(|e| Error::FailedLoadingPackageMetadata {
            path: path.clone(),
            details: format!("failed encoding release metadata: {e}"),
        })?;
    tokio::fs::write(&path, json).await?;
    Ok(())
}

/// Read the sidecar back from an extracted package.
pub async fn load(root: &Path) -> Result<RegistryReleaseMetadata> {
    let path = root.join(RELEASE_METADATA_FILENAME);
    let bytes = tokio::fs::read(&path)
        .await
        .map_err(|e| Error::FailedLoadingPackageMetadata {
            path: path.clone(),
            details: e.to_string(),
        })?;
    serde_json::from_slice(&bytes).map_err(|e| Error::FailedLoadingPackageMetadata {
        path,
        details: format!("malformed release metadata: {e}"),
    })
}
