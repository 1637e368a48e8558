// src/lib.rs

//! Swift Package Registry Client
//!
//! Client library mediating between a package manager and HTTP package
//! registries: release discovery, version metadata, manifests, verified
//! source-archive downloads, identity lookup, login, and publishing.
//!
//! # Architecture
//!
//! - Typed REST surface: one pipeline per operation, composed from a
//!   URL builder, header parsers, and a response classifier
//! - Layered trust: signature validation with user consent for
//!   unsigned/untrusted content, signing-entity change detection, and
//!   trust-on-first-use checksum pinning
//! - Injected collaborators: HTTP transport, ZIP extractor, signature
//!   engine, credential source, and the persistent trust stores sit
//!   behind traits
//!
//! # Example
//!
//! ```no_run
//! use swift_registry_client::{
//!     PackageIdentity, Registry, RegistryClientBuilder, RegistryConfiguration,
//! };
//! use url::Url;
//!
//! # async fn run() -> swift_registry_client::Result<()> {
//! let registry = Registry::new(Url::parse("https://packages.example.com").unwrap());
//! let client =
//!     RegistryClientBuilder::new(RegistryConfiguration::with_default_registry(registry))
//!         .build()?;
//!
//! let package = PackageIdentity::parse("mona.LinkedList")?;
//! let metadata = client.get_package_metadata(&package, None).await?;
//! println!("latest: {:?}", metadata.latest_version());
//! # Ok(())
//! # }
//! ```

pub mod archive;
pub mod auth;
mod availability;
mod cache;
pub mod client;
pub mod config;
mod error;
pub mod fingerprint;
pub mod hash;
mod headers;
pub mod identity;
pub mod manifest;
pub mod metadata;
mod publish;
pub mod release_metadata;
mod response;
pub mod signing;
pub mod store;
pub mod transport;
mod urls;

pub use availability::{AvailabilityStatus, AVAILABILITY_TTL};
pub use cache::FreshnessPolicy;
pub use client::{
    AvailableManifest, DownloadProgress, RegistryClient, RegistryClientBuilder, METADATA_TTL,
};
pub use config::{
    AuthenticationKind, CheckingMode, Registry, RegistryConfiguration, SecurityPolicy,
    SigningPolicy,
};
pub use error::{Error, Result};
pub use fingerprint::{Fingerprint, FingerprintKind};
pub use hash::{HashAlgorithm, Hasher};
pub use identity::{PackageIdentity, PackageName, PackageScope, RegistryIdentity};
pub use metadata::{PackageMetadata, PackageVersionMetadata, Resource, ResourceSigning};
pub use publish::{PublishResult, SIGNATURE_FORMAT_HEADER};
pub use release_metadata::{RegistryReleaseMetadata, RELEASE_METADATA_FILENAME};
pub use signing::{
    SignatureFormat, SignatureVerdict, SignatureVerifier, SigningConsentDelegate, SigningEntity,
    SigningEntityOrigin,
};
