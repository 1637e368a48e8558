// src/client/download.rs

//! The source-archive download pipeline
//!
//! Streaming download to `destination.zip`, then strictly in order:
//! checksum computation, signature validation (consent-capable), checksum
//! pinning, extraction, wrapper flattening, and the release-metadata
//! sidecar. No side effect lands before everything ahead of it succeeded,
//! and a failure after the destination directory was created tears the
//! directory down again. The archive file is always removed.

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::time::Duration;

use tracing::{debug, info};

use crate::archive;
use crate::config::Registry;
use crate::error::{Error, Result};
use crate::headers::MediaType;
use crate::identity::{PackageIdentity, RegistryIdentity};
use crate::metadata::PackageVersionMetadata;
use crate::release_metadata::{self, RegistryReleaseMetadata};
use crate::response;
use crate::transport::{ProgressHandler, Request};
use crate::urls;
use semver::Version;

use super::{wrap_retrieval, RegistryClient};

/// Progress callback for streamed downloads: (bytes received, total bytes
/// when the registry reported one)
pub type DownloadProgress = ProgressHandler;

impl RegistryClient {
    /// Download, verify, and extract a release's source archive into
    /// `destination`, which must not exist yet.
    pub async fn download_source_archive(
        &self,
        package: &PackageIdentity,
        version: &Version,
        destination: &Path,
        progress: Option<DownloadProgress>,
        timeout: Option<Duration>,
    ) -> Result<()> {
        let (registry, identity) = self.resolve(package)?;
        self.gate(&registry, timeout).await?;

        if tokio::fs::try_exists(destination).await? {
            return Err(Error::PathAlreadyExists(destination.to_path_buf()));
        }

        let version_metadata = self.get_version_metadata(package, version, timeout).await?;

        let archive_path = sibling_archive_path(destination);
        let response = {
            let url = urls::join(
                &registry.url,
                &[
                    identity.scope.as_str(),
                    identity.name.as_str(),
                    &format!("{version}.zip"),
                ],
            )?;
            let request =
                self.prepare(Request::get(url), &registry, Some(MediaType::Zip), timeout);
            self.check_cancelled()?;
            self.inner
                .transport
                .download(request, &archive_path, progress)
                .await
                .map_err(Error::from_transport)
                .map_err(|error| self.wrap_download(error, &registry, package, version))?
        };

        match response.status {
            200 => {}
            404 => {
                return Err(Error::PackageNotFound {
                    package: package.clone(),
                    version: Some(version.clone()),
                })
            }
            _ => {
                return Err(self.wrap_download(
                    response::classify(200, &response),
                    &registry,
                    package,
                    version,
                ))
            }
        }
        // optional on archive responses
        let result = match crate::headers::validate_api_version(&response, false) {
            Ok(()) => {
                self.verify_and_extract(
                    &registry,
                    package,
                    &identity,
                    version,
                    &version_metadata,
                    &archive_path,
                    destination,
                )
                .await
            }
            Err(error) => Err(error),
        };

        // the archive file never outlives the operation
        let _ = tokio::fs::remove_file(&archive_path).await;

        result?;
        info!(%package, %version, destination = %destination.display(), "source archive downloaded");
        Ok(())
    }

    #[allow(clippy::too_many_arguments)]
    async fn verify_and_extract(
        &self,
        registry: &Registry,
        package: &PackageIdentity,
        identity: &RegistryIdentity,
        version: &Version,
        version_metadata: &PackageVersionMetadata,
        archive_path: &Path,
        destination: &Path,
    ) -> Result<()> {
        let bytes = tokio::fs::read(archive_path).await?;
        let checksum = self.inner.hash_algorithm.hash(&bytes);
        debug!(%package, %version, %checksum, "archive downloaded, validating");

        let signing_entity = self
            .inner
            .signature_validation
            .validate_source_archive(
                registry,
                identity,
                version,
                &bytes,
                version_metadata,
                &self.inner.configuration.security.signing,
            )
            .await?;

        let declared = version_metadata
            .source_archive()
            .and_then(|resource| resource.checksum.as_deref());
        self.inner
            .checksum_tofu
            .validate_source_archive(registry, identity, version, &checksum, declared)
            .await?;

        let archiver = self
            .inner
            .archiver
            .clone()
            .ok_or_else(|| Error::MissingConfiguration {
                details: "no archiver configured for source archive extraction".to_string(),
            })?;

        tokio::fs::create_dir_all(destination).await?;
        let extracted = async {
            self.check_cancelled()?;
            archiver
                .extract(archive_path, destination)
                .await
                .map_err(Error::from)?;
            archive::strip_top_level_directory(destination).await?;

            let sidecar =
                RegistryReleaseMetadata::from_version_metadata(version_metadata, signing_entity);
            release_metadata::write(destination, &sidecar).await?;
            Ok(())
        }
        .await;

        if extracted.is_err() {
            // no partial trees
            let _ = tokio::fs::remove_dir_all(destination).await;
        }
        extracted
    }

    fn wrap_download(
        &self,
        error: Error,
        registry: &Registry,
        package: &PackageIdentity,
        version: &Version,
    ) -> Error {
        wrap_retrieval(error, |source| Error::FailedDownloadingSourceArchive {
            registry: registry.url.clone(),
            package: package.clone(),
            version: version.clone(),
            source,
        })
    }
}

/// `destination` with a `.zip` suffix appended (not substituted, so dotted
/// directory names survive).
fn sibling_archive_path(destination: &Path) -> PathBuf {
    let mut path = OsString::from(destination.as_os_str());
    path.push(".zip");
    PathBuf::from(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_archive_path_appends_extension() {
        assert_eq!(
            sibling_archive_path(Path::new("/tmp/out")),
            PathBuf::from("/tmp/out.zip")
        );
        // a dotted directory name keeps its full name
        assert_eq!(
            sibling_archive_path(Path::new("/tmp/LinkedList-1.1.1")),
            PathBuf::from("/tmp/LinkedList-1.1.1.zip")
        );
    }
}
