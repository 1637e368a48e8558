// src/client/mod.rs

//! The registry client: per-operation pipelines over the typed REST
//! surface
//!
//! Every operation follows the same shape: resolve the package identity to
//! a (scope, name, registry) triple, run the availability gate, issue the
//! request, route the response through the classifier, and, for content
//! operations, run signature validation and checksum pinning before
//! committing any side effect.
//!
//! The client is cheap to clone and safe to share; concurrent operations
//! may race on the caches, which tolerate redundant work by design.

mod download;

pub use download::DownloadProgress;

use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use semver::Version;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use url::Url;

use crate::archive::Archiver;
use crate::auth::{authorization_header, AuthorizationProvider};
use crate::availability::{self, AvailabilityGate, AvailabilityStatus};
use crate::cache::TtlCache;
use crate::config::{Registry, RegistryConfiguration};
use crate::error::{Error, Result};
use crate::fingerprint::ChecksumTofu;
use crate::hash::HashAlgorithm;
use crate::headers::{self, MediaType, LOCATION_HEADER, RETRY_AFTER_HEADER};
use crate::identity::{PackageIdentity, RegistryIdentity};
use crate::manifest::{self, DefaultToolsVersionParser, ToolsVersionParser};
use crate::metadata::{wire, PackageMetadata, PackageVersionMetadata, ResourceSigning};
use crate::publish::{self, PublishResult, SIGNATURE_FORMAT_HEADER};
use crate::response;
use crate::signing::{
    SignatureFormat, SignatureValidation, SignatureVerifier, SigningConsentDelegate,
    SigningEntity, SigningEntityOrigin, SigningEntityTofu,
};
use crate::store::{
    FingerprintStorage, MemoryFingerprintStorage, MemorySigningEntityStorage,
    SigningEntityStorage,
};
use crate::transport::{HttpTransport, Request, Response, ReqwestTransport};
use crate::urls;

/// Version metadata is cached for one hour.
pub const METADATA_TTL: Duration = Duration::from_secs(60 * 60);

/// One manifest known to exist for a release
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AvailableManifest {
    pub tools_version: String,
    /// Populated for the primary manifest only; alternates are fetched on
    /// demand via `get_manifest_content`
    pub content: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct MetadataCacheKey {
    registry: Url,
    package: RegistryIdentity,
    version: Version,
}

struct ClientInner {
    configuration: RegistryConfiguration,
    transport: Arc<dyn HttpTransport>,
    archiver: Option<Arc<dyn Archiver>>,
    authorization: Option<Arc<dyn AuthorizationProvider>>,
    tools_version_parser: Arc<dyn ToolsVersionParser>,
    hash_algorithm: HashAlgorithm,
    signature_validation: SignatureValidation,
    checksum_tofu: ChecksumTofu,
    signing_entity_storage: Arc<dyn SigningEntityStorage>,
    availability: AvailabilityGate,
    metadata_cache: TtlCache<MetadataCacheKey, wire::VersionMetadata>,
    cancellation: CancellationToken,
    default_timeout: Option<Duration>,
}

/// Client for Swift package registries
///
/// Construct through [`RegistryClientBuilder`]. Clones share all state,
/// including caches and the cancellation token.
#[derive(Clone)]
pub struct RegistryClient {
    inner: Arc<ClientInner>,
}

/// Builder assembling a [`RegistryClient`] and its collaborators
///
/// Only the configuration is required. The transport defaults to reqwest,
/// the trust stores to in-memory maps, and the tools-version parser to the
/// header scanner. The signature verifier and archiver have no defaults;
/// operations that need a missing one fail with *missing-configuration*.
pub struct RegistryClientBuilder {
    configuration: RegistryConfiguration,
    transport: Option<Arc<dyn HttpTransport>>,
    archiver: Option<Arc<dyn Archiver>>,
    signature_verifier: Option<Arc<dyn SignatureVerifier>>,
    consent_delegate: Option<Arc<dyn SigningConsentDelegate>>,
    authorization: Option<Arc<dyn AuthorizationProvider>>,
    fingerprint_storage: Option<Arc<dyn FingerprintStorage>>,
    signing_entity_storage: Option<Arc<dyn SigningEntityStorage>>,
    tools_version_parser: Option<Arc<dyn ToolsVersionParser>>,
    hash_algorithm: HashAlgorithm,
    default_timeout: Option<Duration>,
}

impl RegistryClientBuilder {
    pub fn new(configuration: RegistryConfiguration) -> Self {
        Self {
            configuration,
            transport: None,
            archiver: None,
            signature_verifier: None,
            consent_delegate: None,
            authorization: None,
            fingerprint_storage: None,
            signing_entity_storage: None,
            tools_version_parser: None,
            hash_algorithm: HashAlgorithm::default(),
            default_timeout: None,
        }
    }

    pub fn transport(mut self, transport: Arc<dyn HttpTransport>) -> Self {
        self.transport = Some(transport);
        self
    }

    pub fn archiver(mut self, archiver: Arc<dyn Archiver>) -> Self {
        self.archiver = Some(archiver);
        self
    }

    pub fn signature_verifier(mut self, verifier: Arc<dyn SignatureVerifier>) -> Self {
        self.signature_verifier = Some(verifier);
        self
    }

    pub fn consent_delegate(mut self, delegate: Arc<dyn SigningConsentDelegate>) -> Self {
        self.consent_delegate = Some(delegate);
        self
    }

    pub fn authorization_provider(mut self, provider: Arc<dyn AuthorizationProvider>) -> Self {
        self.authorization = Some(provider);
        self
    }

    pub fn fingerprint_storage(mut self, storage: Arc<dyn FingerprintStorage>) -> Self {
        self.fingerprint_storage = Some(storage);
        self
    }

    pub fn signing_entity_storage(mut self, storage: Arc<dyn SigningEntityStorage>) -> Self {
        self.signing_entity_storage = Some(storage);
        self
    }

    pub fn tools_version_parser(mut self, parser: Arc<dyn ToolsVersionParser>) -> Self {
        self.tools_version_parser = Some(parser);
        self
    }

    pub fn hash_algorithm(mut self, algorithm: HashAlgorithm) -> Self {
        self.hash_algorithm = algorithm;
        self
    }

    pub fn default_timeout(mut self, timeout: Duration) -> Self {
        self.default_timeout = Some(timeout);
        self
    }

    pub fn build(self) -> Result<RegistryClient> {
        let cancellation = CancellationToken::new();
        let transport = match self.transport {
            Some(transport) => transport,
            None => Arc::new(
                ReqwestTransport::with_cancellation(cancellation.child_token())
                    .map_err(Error::from_transport)?,
            ),
        };

        let fingerprint_storage = self
            .fingerprint_storage
            .unwrap_or_else(|| Arc::new(MemoryFingerprintStorage::new()));
        let signing_entity_storage = self
            .signing_entity_storage
            .unwrap_or_else(|| Arc::new(MemorySigningEntityStorage::new()));

        let security = &self.configuration.security;
        let entity_tofu = SigningEntityTofu::new(
            signing_entity_storage.clone(),
            security.signing_entity_checking,
        );
        let signature_validation =
            SignatureValidation::new(self.signature_verifier, entity_tofu, self.consent_delegate);
        let checksum_tofu = ChecksumTofu::new(fingerprint_storage, security.fingerprint_checking);

        let freshness = self.configuration.cache_freshness;
        Ok(RegistryClient {
            inner: Arc::new(ClientInner {
                availability: AvailabilityGate::new(freshness),
                metadata_cache: TtlCache::new(METADATA_TTL, freshness),
                configuration: self.configuration,
                transport,
                archiver: self.archiver,
                authorization: self.authorization,
                tools_version_parser: self
                    .tools_version_parser
                    .unwrap_or_else(|| Arc::new(DefaultToolsVersionParser)),
                hash_algorithm: self.hash_algorithm,
                signature_validation,
                checksum_tofu,
                signing_entity_storage,
                cancellation,
                default_timeout: self.default_timeout,
            }),
        })
    }
}

struct ReleasePage {
    versions: Vec<Version>,
    alternate_locations: Vec<Url>,
    next_page: Option<Url>,
}

impl RegistryClient {
    /// Retrieve the release list of a package, following pagination and
    /// returning versions in descending order.
    pub async fn get_package_metadata(
        &self,
        package: &PackageIdentity,
        timeout: Option<Duration>,
    ) -> Result<PackageMetadata> {
        let (registry, identity) = self.resolve(package)?;
        self.gate(&registry, timeout).await?;

        let mut versions: Vec<Version> = Vec::new();
        let mut alternate_locations: Vec<Url> = Vec::new();
        let mut next_page = Some(urls::join(
            &registry.url,
            &[identity.scope.as_str(), identity.name.as_str()],
        )?);

        while let Some(page_url) = next_page.take() {
            self.check_cancelled()?;
            let page = self
                .fetch_release_page(&registry, package, page_url, timeout)
                .await
                .map_err(|error| {
                    wrap_retrieval(error, |source| Error::FailedRetrievingReleases {
                        registry: registry.url.clone(),
                        package: package.clone(),
                        source,
                    })
                })?;
            versions.extend(page.versions);
            if alternate_locations.is_empty() {
                alternate_locations = page.alternate_locations;
            }
            next_page = page.next_page;
        }

        versions.sort_unstable_by(|a, b| b.cmp(a));
        versions.dedup();
        info!(%package, releases = versions.len(), "retrieved release list");
        Ok(PackageMetadata {
            registry,
            versions,
            alternate_locations,
            next_page: None,
        })
    }

    async fn fetch_release_page(
        &self,
        registry: &Registry,
        package: &PackageIdentity,
        page_url: Url,
        timeout: Option<Duration>,
    ) -> Result<ReleasePage> {
        let request = self.prepare(Request::get(page_url), registry, Some(MediaType::Json), timeout);
        let response = self.send(request).await?;
        match response.status {
            200 => {
                headers::validate_api_version(&response, true)?;
                headers::validate_content_type(&response, MediaType::Json.content_type())?;
                let releases: wire::Releases =
                    serde_json::from_slice(&response.body).map_err(|e| Error::InvalidResponse {
                        details: format!("malformed release list: {e}"),
                    })?;
                let versions = releases
                    .releases
                    .iter()
                    .filter(|(_, release)| release.problem.is_none())
                    .filter_map(|(version, _)| Version::parse(version).ok())
                    .collect();

                let links = headers::parse_link_entries(&response.headers);
                let alternate_locations = headers::link_urls(&links, "alternate")
                    .into_iter()
                    .filter_map(|url| Url::parse(url).ok())
                    .collect();
                let next_page = headers::first_link(&links, "next")
                    .and_then(|entry| Url::parse(&entry.url).ok());

                Ok(ReleasePage {
                    versions,
                    alternate_locations,
                    next_page,
                })
            }
            404 => Err(Error::PackageNotFound {
                package: package.clone(),
                version: None,
            }),
            _ => Err(response::classify(200, &response)),
        }
    }

    /// Retrieve the metadata of one release, including its resources and
    /// their signing entities.
    pub async fn get_version_metadata(
        &self,
        package: &PackageIdentity,
        version: &Version,
        timeout: Option<Duration>,
    ) -> Result<PackageVersionMetadata> {
        let (registry, identity) = self.resolve(package)?;
        self.gate(&registry, timeout).await?;

        let raw = self
            .raw_version_metadata(&registry, package, &identity, version, timeout)
            .await?;

        // resolve signing entities resource by resource; failures degrade
        // to an absent entity
        let mut entities = Vec::with_capacity(raw.resources.len());
        for resource in &raw.resources {
            let entity = match &resource.signing {
                Some(signing) => {
                    let signing = ResourceSigning {
                        signature_base64: signing.signature_base64.clone(),
                        signature_format: signing.signature_format.clone(),
                    };
                    self.inner
                        .signature_validation
                        .extract_signing_entity(&signing)
                        .await
                }
                None => None,
            };
            entities.push(entity);
        }

        Ok(PackageVersionMetadata::from_wire(registry, &raw, entities))
    }

    /// Fetch raw version metadata through the TTL cache.
    async fn raw_version_metadata(
        &self,
        registry: &Registry,
        package: &PackageIdentity,
        identity: &RegistryIdentity,
        version: &Version,
        timeout: Option<Duration>,
    ) -> Result<wire::VersionMetadata> {
        let key = MetadataCacheKey {
            registry: registry.url.clone(),
            package: identity.clone(),
            version: version.clone(),
        };
        if let Some(raw) = self.inner.metadata_cache.get(&key) {
            debug!(%package, %version, "version metadata served from cache");
            return Ok(raw);
        }

        let raw = self
            .fetch_version_metadata(registry, package, identity, version, timeout)
            .await
            .map_err(|error| {
                wrap_retrieval(error, |source| Error::FailedRetrievingReleaseInfo {
                    registry: registry.url.clone(),
                    package: package.clone(),
                    version: version.clone(),
                    source,
                })
            })?;
        self.inner.metadata_cache.put(key, raw.clone());
        Ok(raw)
    }

    async fn fetch_version_metadata(
        &self,
        registry: &Registry,
        package: &PackageIdentity,
        identity: &RegistryIdentity,
        version: &Version,
        timeout: Option<Duration>,
    ) -> Result<wire::VersionMetadata> {
        let url = urls::join(
            &registry.url,
            &[
                identity.scope.as_str(),
                identity.name.as_str(),
                &version.to_string(),
            ],
        )?;
        let request = self.prepare(Request::get(url), registry, Some(MediaType::Json), timeout);
        let response = self.send(request).await?;
        match response.status {
            200 => {
                headers::validate_api_version(&response, true)?;
                headers::validate_content_type(&response, MediaType::Json.content_type())?;
                serde_json::from_slice(&response.body).map_err(|e| Error::InvalidResponse {
                    details: format!("malformed version metadata: {e}"),
                })
            }
            404 => Err(Error::PackageNotFound {
                package: package.clone(),
                version: Some(version.clone()),
            }),
            _ => Err(response::classify(200, &response)),
        }
    }

    /// List the manifests available for a release: the primary
    /// `Package.swift` with its content, plus tools-version alternates.
    pub async fn get_available_manifests(
        &self,
        package: &PackageIdentity,
        version: &Version,
        timeout: Option<Duration>,
    ) -> Result<BTreeMap<String, AvailableManifest>> {
        let (registry, identity) = self.resolve(package)?;
        self.gate(&registry, timeout).await?;

        let version_metadata = self.get_version_metadata(package, version, timeout).await?;

        let result = self
            .fetch_manifest(
                &registry,
                package,
                &identity,
                version,
                &version_metadata,
                None,
                true,
                timeout,
            )
            .await
            .map_err(|error| {
                wrap_retrieval(error, |source| Error::FailedRetrievingManifest {
                    registry: registry.url.clone(),
                    package: package.clone(),
                    version: version.clone(),
                    source,
                })
            })?;
        let (content, response) = result;

        let tools_version = self
            .inner
            .tools_version_parser
            .parse(content.as_bytes())
            .map_err(|error| {
                wrap_retrieval(error, |source| Error::FailedRetrievingManifest {
                    registry: registry.url.clone(),
                    package: package.clone(),
                    version: version.clone(),
                    source,
                })
            })?;
        let mut manifests = BTreeMap::new();
        manifests.insert(
            manifest::manifest_filename(None),
            AvailableManifest {
                tools_version,
                content: Some(content),
            },
        );

        for entry in headers::parse_link_entries(&response.headers) {
            if entry.relation != "alternate" {
                continue;
            }
            let Some(tools_version) = entry.tools_version else {
                continue;
            };
            // registries usually name the alternate explicitly; derive the
            // conventional versioned filename when they do not
            let filename = entry
                .filename
                .unwrap_or_else(|| manifest::manifest_filename(Some(&tools_version)));
            manifests.insert(
                filename,
                AvailableManifest {
                    tools_version,
                    content: None,
                },
            );
        }

        Ok(manifests)
    }

    /// Fetch the content of a release manifest, optionally specialized to
    /// a tools version.
    pub async fn get_manifest_content(
        &self,
        package: &PackageIdentity,
        version: &Version,
        tools_version: Option<&str>,
        timeout: Option<Duration>,
    ) -> Result<String> {
        let (registry, identity) = self.resolve(package)?;
        self.gate(&registry, timeout).await?;

        let version_metadata = self.get_version_metadata(package, version, timeout).await?;

        let (content, _) = self
            .fetch_manifest(
                &registry,
                package,
                &identity,
                version,
                &version_metadata,
                tools_version,
                false,
                timeout,
            )
            .await
            .map_err(|error| {
                wrap_retrieval(error, |source| Error::FailedRetrievingManifest {
                    registry: registry.url.clone(),
                    package: package.clone(),
                    version: version.clone(),
                    source,
                })
            })?;
        Ok(content)
    }

    /// Shared manifest retrieval: fetch, validate headers, run the trust
    /// pipeline, pin the checksum.
    #[allow(clippy::too_many_arguments)]
    async fn fetch_manifest(
        &self,
        registry: &Registry,
        package: &PackageIdentity,
        identity: &RegistryIdentity,
        version: &Version,
        version_metadata: &PackageVersionMetadata,
        tools_version: Option<&str>,
        api_version_required: bool,
        timeout: Option<Duration>,
    ) -> Result<(String, Response)> {
        let mut url = urls::join(
            &registry.url,
            &[
                identity.scope.as_str(),
                identity.name.as_str(),
                &version.to_string(),
                manifest::MANIFEST_FILENAME,
            ],
        )?;
        if let Some(tools_version) = tools_version {
            url = urls::with_query(url, "swift-version", tools_version);
        }

        let request = self.prepare(Request::get(url), registry, Some(MediaType::Swift), timeout);
        let response = self.send(request).await?;
        match response.status {
            200 => {}
            404 => {
                return Err(Error::PackageNotFound {
                    package: package.clone(),
                    version: Some(version.clone()),
                })
            }
            _ => return Err(response::classify(200, &response)),
        }
        headers::validate_api_version(&response, api_version_required)?;
        headers::validate_content_type(&response, MediaType::Swift.content_type())?;

        let archive_signed = version_metadata
            .source_archive()
            .is_some_and(|resource| resource.signing.is_some());
        self.inner
            .signature_validation
            .validate_manifest(
                registry,
                identity,
                version,
                &response.body,
                archive_signed,
                &self.inner.configuration.security.signing,
            )
            .await?;

        let checksum = self.inner.hash_algorithm.hash(&response.body);
        self.inner
            .checksum_tofu
            .validate_manifest(registry, identity, version, &checksum, tools_version)
            .await?;

        let content = String::from_utf8(response.body.clone()).map_err(|_| Error::InvalidResponse {
            details: "manifest is not valid UTF-8".to_string(),
        })?;
        Ok((content, response))
    }

    /// Look up the registry identities recorded for an SCM URL. A 404
    /// means the registry knows none: an empty set, not an error.
    pub async fn lookup_identities(
        &self,
        scm_url: &Url,
        timeout: Option<Duration>,
    ) -> Result<HashSet<PackageIdentity>> {
        let registry = self
            .inner
            .configuration
            .default_registry
            .clone()
            .ok_or(Error::RegistryNotConfigured { scope: None })?;
        self.gate(&registry, timeout).await?;

        let url = urls::with_query(
            urls::join(&registry.url, &["identifiers"])?,
            "url",
            scm_url.as_str(),
        );
        let request = self.prepare(Request::get(url), &registry, Some(MediaType::Json), timeout);
        let response = self.send(request).await.map_err(|error| {
            wrap_retrieval(error, |source| Error::FailedIdentityLookup {
                url: scm_url.clone(),
                source,
            })
        })?;

        match response.status {
            200 => {
                let identifiers: wire::Identifiers = serde_json::from_slice(&response.body)
                    .map_err(|e| Error::FailedIdentityLookup {
                        url: scm_url.clone(),
                        source: Box::new(Error::InvalidResponse {
                            details: format!("malformed identifier list: {e}"),
                        }),
                    })?;
                let mut identities = HashSet::new();
                for identifier in identifiers.identifiers {
                    match identifier.parse::<RegistryIdentity>() {
                        Ok(identity) => {
                            identities.insert(PackageIdentity::Registry(identity));
                        }
                        Err(_) => {
                            warn!("skipping malformed identifier '{identifier}'");
                        }
                    }
                }
                Ok(identities)
            }
            404 => Ok(HashSet::new()),
            _ => Err(Error::FailedIdentityLookup {
                url: scm_url.clone(),
                source: Box::new(response::classify(200, &response)),
            }),
        }
    }

    /// Probe a login endpoint. Only a 200 is a successful login.
    pub async fn login(&self, url: &Url, timeout: Option<Duration>) -> Result<()> {
        let mut request = Request::post(url.clone()).timeout(timeout.or(self.inner.default_timeout));
        if let Some(registry) = self.registry_for_url(url) {
            if let Some(header) = self.authorization_for(&registry) {
                request = request.header("Authorization", header);
            }
        }

        let response = self.send(request).await.map_err(|error| match error {
            Error::Cancelled => Error::Cancelled,
            other => Error::LoginFailed {
                url: url.clone(),
                details: other.to_string(),
            },
        })?;
        match response.status {
            200 => {
                info!(%url, "login succeeded");
                Ok(())
            }
            _ => Err(Error::LoginFailed {
                url: url.clone(),
                details: response::classify(200, &response).to_string(),
            }),
        }
    }

    /// Publish a release, optionally signed.
    #[allow(clippy::too_many_arguments)]
    pub async fn publish(
        &self,
        package: &PackageIdentity,
        version: &Version,
        archive_path: &std::path::Path,
        metadata_path: Option<&std::path::Path>,
        signature: Option<Vec<u8>>,
        metadata_signature: Option<Vec<u8>>,
        signature_format: Option<SignatureFormat>,
        timeout: Option<Duration>,
    ) -> Result<PublishResult> {
        let (registry, identity) = self.resolve(package)?;
        // argument validation comes before any file or network traffic
        publish::validate_signing_arguments(
            metadata_path.is_some(),
            signature.is_some(),
            metadata_signature.is_some(),
            signature_format.is_some(),
        )?;

        let archive = tokio::fs::read(archive_path).await.map_err(|e| {
            Error::FailedLoadingPackageArchive {
                path: archive_path.to_path_buf(),
                details: e.to_string(),
            }
        })?;
        let metadata = match metadata_path {
            Some(path) => Some(tokio::fs::read(path).await.map_err(|e| {
                Error::FailedLoadingPackageMetadata {
                    path: path.to_path_buf(),
                    details: e.to_string(),
                }
            })?),
            None => None,
        };

        self.gate(&registry, timeout).await?;

        let envelope = publish::build_envelope(
            &archive,
            metadata.as_deref(),
            signature.as_deref(),
            metadata_signature.as_deref(),
        );

        let url = urls::join(
            &registry.url,
            &[
                identity.scope.as_str(),
                identity.name.as_str(),
                &version.to_string(),
            ],
        )?;
        let mut request = self
            .prepare(Request::put(url), &registry, Some(MediaType::Json), timeout)
            .header("Content-Type", envelope.content_type())
            .header("Expect", "100-continue")
            .header("Prefer", "respond-async")
            .body(envelope.body);
        if let Some(format) = signature_format {
            request = request.header(SIGNATURE_FORMAT_HEADER, format.to_string());
        }

        let response = self.send(request).await.map_err(|error| {
            wrap_retrieval(error, Error::FailedPublishing)
        })?;

        match response.status {
            201 => {
                headers::validate_api_version(&response, true)?;
                let location = response
                    .headers
                    .get(LOCATION_HEADER)
                    .and_then(|value| Url::parse(value).ok());
                info!(%package, %version, "release published");
                Ok(PublishResult::Published { location })
            }
            202 => {
                headers::validate_api_version(&response, true)?;
                let location = response
                    .headers
                    .get(LOCATION_HEADER)
                    .ok_or(Error::MissingPublishingLocation)?;
                let status_url = Url::parse(location).map_err(|_| Error::InvalidUrl {
                    url: location.to_string(),
                })?;
                let retry_after = response
                    .headers
                    .get(RETRY_AFTER_HEADER)
                    .and_then(|value| value.trim().parse::<u64>().ok());
                info!(%package, %version, %status_url, "release accepted for processing");
                Ok(PublishResult::Processing {
                    status_url,
                    retry_after,
                })
            }
            _ => Err(Error::FailedPublishing(Box::new(response::classify(
                201, &response,
            )))),
        }
    }

    /// Probe a registry's availability endpoint and report the mapped
    /// status.
    pub async fn check_availability(
        &self,
        registry: &Registry,
        timeout: Option<Duration>,
    ) -> Result<AvailabilityStatus> {
        if !registry.supports_availability {
            return Err(Error::AvailabilityCheckFailed {
                registry: registry.url.clone(),
                details: "registry does not support availability checks".to_string(),
            });
        }
        self.probe(registry, timeout).await.map_err(|error| match error {
            Error::Cancelled => Error::Cancelled,
            other => Error::AvailabilityCheckFailed {
                registry: registry.url.clone(),
                details: other.to_string(),
            },
        })
    }

    /// Overwrite the recorded signing entity for a release.
    pub async fn change_signing_entity(
        &self,
        package: &PackageIdentity,
        version: &Version,
        entity: SigningEntity,
        origin: SigningEntityOrigin,
    ) -> Result<()> {
        let identity = package
            .registry_identity()
            .cloned()
            .ok_or_else(|| Error::InvalidPackageIdentity {
                identity: package.to_string(),
            })?;
        info!(%package, %version, signer = %entity, "overwriting recorded signing entity");
        self.inner
            .signing_entity_storage
            .change_signing_entity(&identity, version, &entity, &origin)
            .await
    }

    /// Cancel in-flight and future operations. `deadline` is forwarded to
    /// the transport as the grace for outstanding requests.
    pub async fn cancel(&self, deadline: Duration) {
        info!("cancelling registry operations");
        self.inner.cancellation.cancel();
        self.inner.transport.cancel(deadline).await;
    }

    // --- shared pipeline stages ---

    fn resolve(&self, package: &PackageIdentity) -> Result<(Registry, RegistryIdentity)> {
        let identity = package
            .registry_identity()
            .cloned()
            .ok_or_else(|| Error::InvalidPackageIdentity {
                identity: package.to_string(),
            })?;
        let registry = self
            .inner
            .configuration
            .registry_for(&identity.scope)
            .cloned()
            .ok_or_else(|| Error::RegistryNotConfigured {
                scope: Some(identity.scope.to_string()),
            })?;
        Ok((registry, identity))
    }

    /// The availability gate. Registries without probe support pass
    /// unconditionally and cost no HTTP call.
    async fn gate(&self, registry: &Registry, timeout: Option<Duration>) -> Result<()> {
        if !registry.supports_availability {
            return Ok(());
        }
        let status = match self.inner.availability.cached(&registry.url) {
            Some(status) => status,
            None => {
                let status = self.probe(registry, timeout).await.map_err(|error| {
                    match error {
                        Error::Cancelled => Error::Cancelled,
                        other => Error::AvailabilityCheckFailed {
                            registry: registry.url.clone(),
                            details: other.to_string(),
                        },
                    }
                })?;
                self.inner
                    .availability
                    .record(registry.url.clone(), status.clone());
                status
            }
        };
        AvailabilityGate::verdict(&registry.url, &status)
    }

    async fn probe(
        &self,
        registry: &Registry,
        timeout: Option<Duration>,
    ) -> Result<AvailabilityStatus> {
        let url = urls::join(&registry.url, &["availability"])?;
        let request = self.prepare(Request::get(url), registry, None, timeout);
        let response = self.send(request).await?;
        Ok(availability::status_from_response(response.status))
    }

    /// Decorate a request with the per-registry headers and timeout every
    /// operation shares.
    fn prepare(
        &self,
        mut request: Request,
        registry: &Registry,
        accept: Option<MediaType>,
        timeout: Option<Duration>,
    ) -> Request {
        request = request.timeout(timeout.or(self.inner.default_timeout));
        if let Some(accept) = accept {
            request = request.header("Accept", accept.accept());
        }
        if let Some(header) = self.authorization_for(registry) {
            request = request.header("Authorization", header);
        }
        request
    }

    fn authorization_for(&self, registry: &Registry) -> Option<String> {
        let provider = self.inner.authorization.as_ref()?;
        let (user, secret) = provider.credentials(&registry.url)?;
        authorization_header(registry.authentication, &user, &secret)
    }

    /// The registry configured for a URL, matched by origin. Used by
    /// operations addressed by URL rather than by package.
    fn registry_for_url(&self, url: &Url) -> Option<Registry> {
        let origin = url.origin();
        self.inner
            .configuration
            .scoped_registries
            .values()
            .chain(self.inner.configuration.default_registry.as_ref())
            .find(|registry| registry.url.origin() == origin)
            .cloned()
    }

    fn check_cancelled(&self) -> Result<()> {
        if self.inner.cancellation.is_cancelled() {
            Err(Error::Cancelled)
        } else {
            Ok(())
        }
    }

    async fn send(&self, request: Request) -> Result<Response> {
        self.check_cancelled()?;
        self.inner
            .transport
            .send(request)
            .await
            .map_err(Error::from_transport)
    }
}

/// Apply a per-operation wrapper. Cancellation, not-found, and the trust
/// and checksum failures pass through untouched: the first must stay
/// distinguishable, the rest are verdicts in their own right rather than
/// retrieval failures.
fn wrap_retrieval(error: Error, wrap: impl FnOnce(Box<Error>) -> Error) -> Error {
    match error {
        Error::Cancelled
        | Error::PackageNotFound { .. }
        | Error::SourceArchiveNotSigned { .. }
        | Error::ManifestNotSigned { .. }
        | Error::SignerNotTrusted { .. }
        | Error::InvalidSignature { .. }
        | Error::InvalidSigningCertificate { .. }
        | Error::FailedToValidateSignature { .. }
        | Error::SigningEntityForReleaseChanged { .. }
        | Error::SigningEntityForPackageChanged { .. }
        | Error::ChecksumChanged { .. }
        | Error::InvalidChecksum { .. }
        | Error::SourceArchiveMissingChecksum { .. } => error,
        other => wrap(Box::new(other)),
    }
}
