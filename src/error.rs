// src/error.rs

//! Error taxonomy for registry operations
//!
//! Every failure the client can produce is a variant of [`Error`], grouped
//! the way callers handle them:
//! - configuration problems (caught before any network traffic)
//! - protocol violations (unexpected status, header, or body shape)
//! - per-operation retrieval failures that wrap an underlying cause
//! - trust failures (signatures, signing entities)
//! - checksum pinning failures
//! - filesystem and archive failures
//! - publish failures
//!
//! Cancellation is the one distinguished value: a cancelled operation
//! surfaces [`Error::Cancelled`] without any per-operation wrapping, so
//! callers can tell an aborted task from a failed one.

use std::path::PathBuf;

use semver::Version;
use thiserror::Error;
use url::Url;

use crate::identity::PackageIdentity;
use crate::signing::SigningEntity;
use crate::transport::TransportError;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    // --- Configuration ---
    #[error("no registry configured{}", .scope.as_deref().map(|s| format!(" for scope '{s}'")).unwrap_or_default())]
    RegistryNotConfigured { scope: Option<String> },

    #[error("'{identity}' is not a valid registry package identity")]
    InvalidPackageIdentity { identity: String },

    #[error("invalid URL: {url}")]
    InvalidUrl { url: String },

    #[error("missing configuration: {details}")]
    MissingConfiguration { details: String },

    #[error("bad configuration: {details}")]
    BadConfiguration { details: String },

    #[error("a signature format must be provided alongside a signature")]
    MissingSignatureFormat,

    #[error("unknown signature format: {format}")]
    UnknownSignatureFormat { format: String },

    // --- Protocol ---
    #[error("invalid response status: expected {expected}, got {actual}")]
    InvalidResponseStatus { expected: u16, actual: u16 },

    #[error("invalid Content-Version header: expected '{expected}', got {actual:?}")]
    InvalidContentVersion {
        expected: &'static str,
        actual: Option<String>,
    },

    #[error("invalid Content-Type header: expected '{expected}', got {actual:?}")]
    InvalidContentType {
        expected: String,
        actual: Option<String>,
    },

    #[error("invalid response from registry: {details}")]
    InvalidResponse { details: String },

    #[error("unauthorized: {details}")]
    Unauthorized { details: String },

    #[error("forbidden: {details}")]
    Forbidden { details: String },

    #[error("authentication method not supported: {details}")]
    AuthenticationMethodNotSupported { details: String },

    #[error("client error {code}: {details}")]
    ClientError { code: u16, details: String },

    #[error("server error {code}: {details}")]
    ServerError { code: u16, details: String },

    #[error("{package}{} not found on the registry", .version.as_ref().map(|v| format!(" version {v}")).unwrap_or_default())]
    PackageNotFound {
        package: PackageIdentity,
        version: Option<Version>,
    },

    // --- Per-operation retrieval ---
    #[error("failed retrieving releases for {package} from {registry}")]
    FailedRetrievingReleases {
        registry: Url,
        package: PackageIdentity,
        #[source]
        source: Box<Error>,
    },

    #[error("failed retrieving metadata for {package} {version} from {registry}")]
    FailedRetrievingReleaseInfo {
        registry: Url,
        package: PackageIdentity,
        version: Version,
        #[source]
        source: Box<Error>,
    },

    #[error("failed retrieving manifest for {package} {version} from {registry}")]
    FailedRetrievingManifest {
        registry: Url,
        package: PackageIdentity,
        version: Version,
        #[source]
        source: Box<Error>,
    },

    #[error("failed downloading source archive for {package} {version} from {registry}")]
    FailedDownloadingSourceArchive {
        registry: Url,
        package: PackageIdentity,
        version: Version,
        #[source]
        source: Box<Error>,
    },

    #[error("failed looking up identities for {url}")]
    FailedIdentityLookup {
        url: Url,
        #[source]
        source: Box<Error>,
    },

    #[error("availability check failed for {registry}: {details}")]
    AvailabilityCheckFailed { registry: Url, details: String },

    #[error("login to {url} failed: {details}")]
    LoginFailed { url: Url, details: String },

    #[error("registry {registry} is not available")]
    RegistryNotAvailable { registry: Url },

    // --- Trust ---
    #[error("source archive for {package} {version} is not signed")]
    SourceArchiveNotSigned {
        registry: Url,
        package: PackageIdentity,
        version: Version,
    },

    #[error("manifest for {package} {version} is not signed")]
    ManifestNotSigned {
        registry: Url,
        package: PackageIdentity,
        version: Version,
    },

    #[error("the signer{} of {package} {version} is not trusted", .entity.as_ref().map(|e| format!(" {e}")).unwrap_or_default())]
    SignerNotTrusted {
        package: PackageIdentity,
        version: Version,
        entity: Option<SigningEntity>,
    },

    #[error("invalid signature: {reason}")]
    InvalidSignature { reason: String },

    #[error("invalid signing certificate: {reason}")]
    InvalidSigningCertificate { reason: String },

    #[error("failed to validate signature: {reason}")]
    FailedToValidateSignature { reason: String },

    #[error("the signing entity for {package} {version} changed from {previous} to {latest}")]
    SigningEntityForReleaseChanged {
        registry: Url,
        package: PackageIdentity,
        version: Version,
        latest: SigningEntity,
        previous: SigningEntity,
    },

    #[error("{package} {version} is signed by {latest}, but version {previous_version} was signed by {previous}")]
    SigningEntityForPackageChanged {
        registry: Url,
        package: PackageIdentity,
        version: Version,
        latest: SigningEntity,
        previous: SigningEntity,
        previous_version: Version,
    },

    // --- Checksum pinning ---
    #[error("checksum for {package} {version} changed from previously recorded '{previous}' to '{latest}'")]
    ChecksumChanged {
        registry: Url,
        package: PackageIdentity,
        version: Version,
        latest: String,
        previous: String,
    },

    #[error("computed checksum '{actual}' does not match '{expected}' declared by the registry")]
    InvalidChecksum { expected: String, actual: String },

    #[error("source archive for {package} {version} has no checksum in its release metadata")]
    SourceArchiveMissingChecksum {
        registry: Url,
        package: PackageIdentity,
        version: Version,
    },

    // --- Filesystem / archive ---
    #[error("path already exists: {}", .0.display())]
    PathAlreadyExists(PathBuf),

    #[error("failed loading package archive at {}: {details}", .path.display())]
    FailedLoadingPackageArchive { path: PathBuf, details: String },

    #[error("failed loading package metadata at {}: {details}", .path.display())]
    FailedLoadingPackageMetadata { path: PathBuf, details: String },

    #[error("invalid source archive: {reason}")]
    InvalidSourceArchive { reason: String },

    // --- Publish ---
    #[error("failed publishing")]
    FailedPublishing(#[source] Box<Error>),

    #[error("the registry accepted the publish request but did not provide a status location")]
    MissingPublishingLocation,

    // --- Carriers ---
    /// Underlying transport failure. Always appears wrapped in a
    /// per-operation variant; never surfaced bare by a client operation.
    #[error(transparent)]
    Transport(TransportError),

    /// The operation was cancelled. Never wrapped.
    #[error("operation cancelled")]
    Cancelled,

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Convert a transport failure, keeping cancellation distinguished.
    pub(crate) fn from_transport(error: TransportError) -> Self {
        match error {
            TransportError::Cancelled => Error::Cancelled,
            other => Error::Transport(other),
        }
    }

    /// Apply a per-operation wrapper unless the error is a cancellation,
    /// which must propagate unwrapped.
    pub(crate) fn wrapped(self, wrap: impl FnOnce(Box<Error>) -> Error) -> Self {
        match self {
            Error::Cancelled => Error::Cancelled,
            other => wrap(Box::new(other)),
        }
    }
}
