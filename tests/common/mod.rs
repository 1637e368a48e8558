// tests/common/mod.rs

//! Shared test utilities for the integration suites: a wiremock-backed
//! client builder, a configurable signature verifier, a fake archiver, and
//! a consent delegate with canned answers.

#![allow(dead_code)]

use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use semver::Version;
use url::Url;

use swift_registry_client::archive::{ArchiveError, Archiver};
use swift_registry_client::{
    Error, PackageIdentity, Registry, RegistryClientBuilder, RegistryConfiguration,
    RegistryIdentity, Result, SignatureFormat, SignatureVerdict, SignatureVerifier,
    SigningConsentDelegate, SigningEntity,
};

pub const API_VERSION_HEADER: (&str, &str) = ("Content-Version", "1");

pub fn package() -> PackageIdentity {
    PackageIdentity::parse("mona.LinkedList").unwrap()
}

pub fn version() -> Version {
    Version::new(1, 1, 1)
}

pub fn recognized(name: &str) -> SigningEntity {
    SigningEntity::Recognized {
        certificate_type: "adp".to_string(),
        name: name.to_string(),
        organizational_unit: "Engineering".to_string(),
        organization: "Mona Inc".to_string(),
    }
}

/// Registry pointed at a mock server; the availability probe is off by
/// default.
pub fn registry(base_url: &str) -> Registry {
    Registry::new(Url::parse(base_url).unwrap())
}

/// Configuration with the mock server as default registry.
pub fn configuration(base_url: &str) -> RegistryConfiguration {
    RegistryConfiguration::with_default_registry(registry(base_url))
}

/// Builder preloaded with the mock-server configuration.
pub fn client_builder(base_url: &str) -> RegistryClientBuilder {
    RegistryClientBuilder::new(configuration(base_url))
}

/// Signing block fragment for version-metadata resources.
pub fn signing_json() -> serde_json::Value {
    serde_json::json!({
        "signatureBase64": BASE64.encode(b"signature"),
        "signatureFormat": "cms-1.0.0"
    })
}

/// Verifier with a canned verdict.
pub struct StaticVerifier {
    pub entity: Option<SigningEntity>,
    pub trusted: bool,
}

impl StaticVerifier {
    pub fn trusted(entity: SigningEntity) -> Arc<Self> {
        Arc::new(Self {
            entity: Some(entity),
            trusted: true,
        })
    }

    pub fn untrusted(entity: SigningEntity) -> Arc<Self> {
        Arc::new(Self {
            entity: Some(entity),
            trusted: false,
        })
    }
}

#[async_trait]
impl SignatureVerifier for StaticVerifier {
    async fn extract_signing_entity(
        &self,
        _signature: &[u8],
        _format: SignatureFormat,
    ) -> Result<SigningEntity> {
        self.entity
            .clone()
            .ok_or_else(|| Error::InvalidSigningCertificate {
                reason: "no signing entity".to_string(),
            })
    }

    async fn verify(
        &self,
        _signature: &[u8],
        _content: &[u8],
        _format: SignatureFormat,
    ) -> Result<SignatureVerdict> {
        Ok(SignatureVerdict {
            entity: self.entity.clone(),
            trusted: self.trusted,
        })
    }
}

/// "Extracts" by writing a canned tree wrapped in a top-level directory,
/// the shape registry archives come in.
pub struct FakeArchiver;

#[async_trait]
impl Archiver for FakeArchiver {
    async fn extract(
        &self,
        _archive: &Path,
        destination: &Path,
    ) -> std::result::Result<(), ArchiveError> {
        let wrapper = destination.join("LinkedList-1.1.1");
        tokio::fs::create_dir_all(wrapper.join("Sources")).await?;
        tokio::fs::write(wrapper.join("Package.swift"), b"// swift-tools-version:5.5\n").await?;
        tokio::fs::write(wrapper.join("Sources").join("main.swift"), b"// code\n").await?;
        Ok(())
    }
}

/// Always reports a colliding entry.
pub struct CollidingArchiver;

#[async_trait]
impl Archiver for CollidingArchiver {
    async fn extract(
        &self,
        _archive: &Path,
        _destination: &Path,
    ) -> std::result::Result<(), ArchiveError> {
        Err(ArchiveError::Collision("Sources/main.swift".to_string()))
    }
}

/// Consent delegate with fixed answers and prompt counters.
pub struct CannedDelegate {
    pub allow_unsigned: bool,
    pub allow_untrusted: bool,
    pub unsigned_prompts: AtomicUsize,
    pub untrusted_prompts: AtomicUsize,
}

impl CannedDelegate {
    pub fn new(allow_unsigned: bool, allow_untrusted: bool) -> Arc<Self> {
        Arc::new(Self {
            allow_unsigned,
            allow_untrusted,
            unsigned_prompts: AtomicUsize::new(0),
            untrusted_prompts: AtomicUsize::new(0),
        })
    }
}

#[async_trait]
impl SigningConsentDelegate for CannedDelegate {
    async fn on_unsigned(
        &self,
        _registry: &Registry,
        _package: &RegistryIdentity,
        _version: &Version,
    ) -> bool {
        self.unsigned_prompts.fetch_add(1, Ordering::SeqCst);
        self.allow_unsigned
    }

    async fn on_untrusted(
        &self,
        _registry: &Registry,
        _package: &RegistryIdentity,
        _version: &Version,
    ) -> bool {
        self.untrusted_prompts.fetch_add(1, Ordering::SeqCst);
        self.allow_untrusted
    }
}
