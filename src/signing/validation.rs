// src/signing/validation.rs

//! The signature validation pipeline
//!
//! For signed content: verify the signature, gate untrusted signers behind
//! the consent delegate, and hand the resolved entity to TOFU tracking.
//! For unsigned content: refuse outright if the package has a recognized
//! signing history, otherwise ask the delegate; no delegate means deny.
//!
//! Delegate answers are memoized per (registry, package, version) so one
//! operation validating several resources prompts at most once.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use semver::Version;
use tracing::{debug, warn};
use url::Url;

use crate::config::{Registry, SigningPolicy};
use crate::error::{Error, Result};
use crate::identity::{PackageIdentity, RegistryIdentity};
use crate::manifest;
use crate::metadata::{PackageVersionMetadata, ResourceSigning};
use crate::signing::{SignatureFormat, SigningEntity, SigningEntityTofu, SignatureVerifier};

/// Consent surface for content that cannot be validated automatically
///
/// Absent delegate means both questions are answered with a refusal.
#[async_trait]
pub trait SigningConsentDelegate: Send + Sync {
    /// Should an unsigned release be accepted?
    async fn on_unsigned(
        &self,
        registry: &Registry,
        package: &RegistryIdentity,
        version: &Version,
    ) -> bool;

    /// Should a release from an untrusted or unrecognized signer be
    /// accepted?
    async fn on_untrusted(
        &self,
        registry: &Registry,
        package: &RegistryIdentity,
        version: &Version,
    ) -> bool;
}

/// What kind of content is passing through the pipeline; selects the
/// not-signed error variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ContentKind {
    SourceArchive,
    Manifest,
}

type ConsentKey = (Url, RegistryIdentity, Version);

pub struct SignatureValidation {
    verifier: Option<Arc<dyn SignatureVerifier>>,
    entity_tofu: SigningEntityTofu,
    delegate: Option<Arc<dyn SigningConsentDelegate>>,
    unsigned_consent: RwLock<HashMap<ConsentKey, bool>>,
    untrusted_consent: RwLock<HashMap<ConsentKey, bool>>,
}

impl SignatureValidation {
    pub fn new(
        verifier: Option<Arc<dyn SignatureVerifier>>,
        entity_tofu: SigningEntityTofu,
        delegate: Option<Arc<dyn SigningConsentDelegate>>,
    ) -> Self {
        Self {
            verifier,
            entity_tofu,
            delegate,
            unsigned_consent: RwLock::new(HashMap::new()),
            untrusted_consent: RwLock::new(HashMap::new()),
        }
    }

    /// Extract the signing entity from a resource's signature without any
    /// content to verify against. Failures degrade to `None`; callers
    /// treat the entity as advisory.
    pub async fn extract_signing_entity(&self, signing: &ResourceSigning) -> Option<SigningEntity> {
        let verifier = self.verifier.as_ref()?;
        let format: SignatureFormat = signing.signature_format.parse().ok()?;
        let signature = BASE64.decode(&signing.signature_base64).ok()?;
        match verifier.extract_signing_entity(&signature, format).await {
            Ok(entity) => Some(entity),
            Err(error) => {
                debug!("could not extract signing entity: {error}");
                None
            }
        }
    }

    /// Run the full pipeline over a downloaded source archive.
    pub async fn validate_source_archive(
        &self,
        registry: &Registry,
        package: &RegistryIdentity,
        version: &Version,
        content: &[u8],
        version_metadata: &PackageVersionMetadata,
        policy: &SigningPolicy,
    ) -> Result<Option<SigningEntity>> {
        if policy.skip_signature_validation {
            debug!(%package, %version, "signature validation skipped by policy");
            return Ok(None);
        }

        let signing = version_metadata
            .source_archive()
            .and_then(|resource| resource.signing.as_ref());
        match signing {
            None => {
                self.accept_unsigned(registry, package, version, ContentKind::SourceArchive)
                    .await?;
                Ok(None)
            }
            Some(signing) => {
                let format: SignatureFormat = signing.signature_format.parse()?;
                let signature =
                    BASE64
                        .decode(&signing.signature_base64)
                        .map_err(|e| Error::InvalidSignature {
                            reason: format!("signature is not valid base64: {e}"),
                        })?;
                self.verify_and_record(registry, package, version, &signature, content, format)
                    .await
            }
        }
    }

    /// Run the full pipeline over a fetched manifest. The signature, when
    /// present, is embedded in the manifest itself. `archive_signed`
    /// reflects the release's source archive: a signed release must not
    /// serve unsigned manifests, with no consent escape hatch.
    pub async fn validate_manifest(
        &self,
        registry: &Registry,
        package: &RegistryIdentity,
        version: &Version,
        manifest_bytes: &[u8],
        archive_signed: bool,
        policy: &SigningPolicy,
    ) -> Result<Option<SigningEntity>> {
        if policy.skip_signature_validation {
            debug!(%package, %version, "signature validation skipped by policy");
            return Ok(None);
        }

        match manifest::split_signature(manifest_bytes)? {
            None => {
                if archive_signed {
                    return Err(Error::ManifestNotSigned {
                        registry: registry.url.clone(),
                        package: PackageIdentity::Registry(package.clone()),
                        version: version.clone(),
                    });
                }
                self.accept_unsigned(registry, package, version, ContentKind::Manifest)
                    .await?;
                Ok(None)
            }
            Some(split) => {
                self.verify_and_record(
                    registry,
                    package,
                    version,
                    &split.signature,
                    &split.content,
                    split.format,
                )
                .await
            }
        }
    }

    async fn verify_and_record(
        &self,
        registry: &Registry,
        package: &RegistryIdentity,
        version: &Version,
        signature: &[u8],
        content: &[u8],
        format: SignatureFormat,
    ) -> Result<Option<SigningEntity>> {
        let verifier = self
            .verifier
            .as_ref()
            .ok_or_else(|| Error::MissingConfiguration {
                details: "content is signed but no signature verifier is configured".to_string(),
            })?;

        let verdict = verifier.verify(signature, content, format).await?;
        let trusted = verdict.trusted
            && verdict
                .entity
                .as_ref()
                .is_some_and(SigningEntity::is_recognized);

        if !trusted {
            let allowed = self
                .consent(&self.untrusted_consent, Consent::Untrusted, registry, package, version)
                .await;
            if !allowed {
                return Err(Error::SignerNotTrusted {
                    package: PackageIdentity::Registry(package.clone()),
                    version: version.clone(),
                    entity: verdict.entity,
                });
            }
            warn!(%package, %version, "proceeding with untrusted signer by user consent");
        }

        self.entity_tofu
            .validate(registry, package, version, verdict.entity.as_ref())
            .await?;
        Ok(verdict.entity)
    }

    async fn accept_unsigned(
        &self,
        registry: &Registry,
        package: &RegistryIdentity,
        version: &Version,
        kind: ContentKind,
    ) -> Result<()> {
        let not_signed = || match kind {
            ContentKind::SourceArchive => Error::SourceArchiveNotSigned {
                registry: registry.url.clone(),
                package: PackageIdentity::Registry(package.clone()),
                version: version.clone(),
            },
            ContentKind::Manifest => Error::ManifestNotSigned {
                registry: registry.url.clone(),
                package: PackageIdentity::Registry(package.clone()),
                version: version.clone(),
            },
        };

        // a package with recognized signing history must stay signed
        if self.entity_tofu.has_recognized_signer(package).await? {
            return Err(not_signed());
        }

        let allowed = self
            .consent(&self.unsigned_consent, Consent::Unsigned, registry, package, version)
            .await;
        if allowed {
            warn!(%package, %version, "proceeding with unsigned content by user consent");
            Ok(())
        } else {
            Err(not_signed())
        }
    }

    async fn consent(
        &self,
        cache: &RwLock<HashMap<ConsentKey, bool>>,
        question: Consent,
        registry: &Registry,
        package: &RegistryIdentity,
        version: &Version,
    ) -> bool {
        let key = (registry.url.clone(), package.clone(), version.clone());
        {
            let answers = match cache.read() {
                Ok(guard) => guard,
                Err(poisoned) => poisoned.into_inner(),
            };
            if let Some(&answer) = answers.get(&key) {
                return answer;
            }
        }

        let answer = match &self.delegate {
            None => false,
            Some(delegate) => match question {
                Consent::Unsigned => delegate.on_unsigned(registry, package, version).await,
                Consent::Untrusted => delegate.on_untrusted(registry, package, version).await,
            },
        };

        let mut answers = match cache.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        answers.insert(key, answer);
        answer
    }
}

#[derive(Debug, Clone, Copy)]
enum Consent {
    Unsigned,
    Untrusted,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CheckingMode;
    use crate::metadata::Resource;
    use crate::signing::SignatureVerdict;
    use crate::store::MemorySigningEntityStorage;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn registry() -> Registry {
        Registry::new(Url::parse("https://packages.example.com").unwrap())
    }

    fn package() -> RegistryIdentity {
        "mona.LinkedList".parse().unwrap()
    }

    fn version() -> Version {
        Version::new(1, 1, 1)
    }

    fn recognized(name: &str) -> SigningEntity {
        SigningEntity::Recognized {
            certificate_type: "adp".to_string(),
            name: name.to_string(),
            organizational_unit: "Engineering".to_string(),
            organization: "Mona Inc".to_string(),
        }
    }

    fn metadata_with_signing(signing: Option<ResourceSigning>) -> PackageVersionMetadata {
        PackageVersionMetadata {
            registry: registry(),
            license_url: None,
            readme_url: None,
            repository_urls: None,
            resources: vec![Resource {
                name: "source-archive".to_string(),
                content_type: "application/zip".to_string(),
                checksum: Some("abc".to_string()),
                signing,
                signing_entity: None,
            }],
            author: None,
            description: None,
            published_at: None,
        }
    }

    fn signing_block() -> ResourceSigning {
        ResourceSigning {
            signature_base64: BASE64.encode(b"signature"),
            signature_format: "cms-1.0.0".to_string(),
        }
    }

    /// Verifier returning a fixed verdict
    struct StaticVerifier {
        verdict: SignatureVerdict,
    }

    #[async_trait]
    impl SignatureVerifier for StaticVerifier {
        async fn extract_signing_entity(
            &self,
            _signature: &[u8],
            _format: SignatureFormat,
        ) -> Result<SigningEntity> {
            self.verdict
                .entity
                .clone()
                .ok_or_else(|| Error::InvalidSigningCertificate {
                    reason: "no entity".to_string(),
                })
        }

        async fn verify(
            &self,
            _signature: &[u8],
            _content: &[u8],
            _format: SignatureFormat,
        ) -> Result<SignatureVerdict> {
            Ok(self.verdict.clone())
        }
    }

    /// Delegate that counts prompts and returns a fixed answer
    struct CountingDelegate {
        answer: bool,
        unsigned_prompts: AtomicUsize,
        untrusted_prompts: AtomicUsize,
    }

    impl CountingDelegate {
        fn new(answer: bool) -> Self {
            Self {
                answer,
                unsigned_prompts: AtomicUsize::new(0),
                untrusted_prompts: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl SigningConsentDelegate for CountingDelegate {
        async fn on_unsigned(
            &self,
            _registry: &Registry,
            _package: &RegistryIdentity,
            _version: &Version,
        ) -> bool {
            self.unsigned_prompts.fetch_add(1, Ordering::SeqCst);
            self.answer
        }

        async fn on_untrusted(
            &self,
            _registry: &Registry,
            _package: &RegistryIdentity,
            _version: &Version,
        ) -> bool {
            self.untrusted_prompts.fetch_add(1, Ordering::SeqCst);
            self.answer
        }
    }

    fn validation(
        verifier: Option<Arc<dyn SignatureVerifier>>,
        delegate: Option<Arc<dyn SigningConsentDelegate>>,
    ) -> SignatureValidation {
        let tofu = SigningEntityTofu::new(
            Arc::new(MemorySigningEntityStorage::new()),
            CheckingMode::Strict,
        );
        SignatureValidation::new(verifier, tofu, delegate)
    }

    #[tokio::test]
    async fn test_skip_policy_short_circuits() {
        let validation = validation(None, None);
        let policy = SigningPolicy {
            skip_signature_validation: true,
        };
        let entity = validation
            .validate_source_archive(
                &registry(),
                &package(),
                &version(),
                b"content",
                &metadata_with_signing(Some(signing_block())),
                &policy,
            )
            .await
            .unwrap();
        assert!(entity.is_none());
    }

    #[tokio::test]
    async fn test_unsigned_without_delegate_is_refused() {
        let validation = validation(None, None);
        let result = validation
            .validate_source_archive(
                &registry(),
                &package(),
                &version(),
                b"content",
                &metadata_with_signing(None),
                &SigningPolicy::default(),
            )
            .await;
        assert!(matches!(result, Err(Error::SourceArchiveNotSigned { .. })));
    }

    #[tokio::test]
    async fn test_unsigned_with_consent_is_accepted() {
        let delegate = Arc::new(CountingDelegate::new(true));
        let validation = validation(None, Some(delegate.clone()));
        let entity = validation
            .validate_source_archive(
                &registry(),
                &package(),
                &version(),
                b"content",
                &metadata_with_signing(None),
                &SigningPolicy::default(),
            )
            .await
            .unwrap();
        assert!(entity.is_none());
        assert_eq!(delegate.unsigned_prompts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_unsigned_consent_is_memoized() {
        let delegate = Arc::new(CountingDelegate::new(true));
        let validation = validation(None, Some(delegate.clone()));
        for _ in 0..3 {
            validation
                .validate_source_archive(
                    &registry(),
                    &package(),
                    &version(),
                    b"content",
                    &metadata_with_signing(None),
                    &SigningPolicy::default(),
                )
                .await
                .unwrap();
        }
        assert_eq!(delegate.unsigned_prompts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_unsigned_refused_when_package_has_recognized_history() {
        let storage = Arc::new(MemorySigningEntityStorage::new());
        let tofu = SigningEntityTofu::new(storage.clone(), CheckingMode::Strict);
        tofu.validate(&registry(), &package(), &Version::new(1, 0, 0), Some(&recognized("Mona")))
            .await
            .unwrap();

        // delegate would consent, but history wins
        let delegate = Arc::new(CountingDelegate::new(true));
        let validation = SignatureValidation::new(
            None,
            SigningEntityTofu::new(storage, CheckingMode::Strict),
            Some(delegate.clone()),
        );

        let result = validation
            .validate_source_archive(
                &registry(),
                &package(),
                &version(),
                b"content",
                &metadata_with_signing(None),
                &SigningPolicy::default(),
            )
            .await;
        assert!(matches!(result, Err(Error::SourceArchiveNotSigned { .. })));
        assert_eq!(delegate.unsigned_prompts.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_trusted_signature_resolves_entity() {
        let verifier = Arc::new(StaticVerifier {
            verdict: SignatureVerdict {
                entity: Some(recognized("Mona")),
                trusted: true,
            },
        });
        let validation = validation(Some(verifier), None);
        let entity = validation
            .validate_source_archive(
                &registry(),
                &package(),
                &version(),
                b"content",
                &metadata_with_signing(Some(signing_block())),
                &SigningPolicy::default(),
            )
            .await
            .unwrap();
        assert_eq!(entity, Some(recognized("Mona")));
    }

    #[tokio::test]
    async fn test_untrusted_signer_refused_without_consent() {
        let verifier = Arc::new(StaticVerifier {
            verdict: SignatureVerdict {
                entity: Some(recognized("Mona")),
                trusted: false,
            },
        });
        let validation = validation(Some(verifier), None);
        let result = validation
            .validate_source_archive(
                &registry(),
                &package(),
                &version(),
                b"content",
                &metadata_with_signing(Some(signing_block())),
                &SigningPolicy::default(),
            )
            .await;
        assert!(matches!(result, Err(Error::SignerNotTrusted { .. })));
    }

    #[tokio::test]
    async fn test_untrusted_signer_accepted_with_consent() {
        let verifier = Arc::new(StaticVerifier {
            verdict: SignatureVerdict {
                entity: Some(recognized("Mona")),
                trusted: false,
            },
        });
        let delegate = Arc::new(CountingDelegate::new(true));
        let validation = validation(Some(verifier), Some(delegate.clone()));
        let entity = validation
            .validate_source_archive(
                &registry(),
                &package(),
                &version(),
                b"content",
                &metadata_with_signing(Some(signing_block())),
                &SigningPolicy::default(),
            )
            .await
            .unwrap();
        assert_eq!(entity, Some(recognized("Mona")));
        assert_eq!(delegate.untrusted_prompts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_signed_manifest_round_trips_through_pipeline() {
        let verifier = Arc::new(StaticVerifier {
            verdict: SignatureVerdict {
                entity: Some(recognized("Mona")),
                trusted: true,
            },
        });
        let validation = validation(Some(verifier), None);
        let manifest = format!(
            "// swift-tools-version:5.5\nimport PackageDescription\n// signature: cms-1.0.0;{}\n",
            BASE64.encode(b"signature")
        );
        let entity = validation
            .validate_manifest(
                &registry(),
                &package(),
                &version(),
                manifest.as_bytes(),
                true,
                &SigningPolicy::default(),
            )
            .await
            .unwrap();
        assert_eq!(entity, Some(recognized("Mona")));
    }

    #[tokio::test]
    async fn test_unsigned_manifest_error_kind() {
        let validation = validation(None, None);
        let manifest = b"// swift-tools-version:5.5\nimport PackageDescription\n";
        let result = validation
            .validate_manifest(
                &registry(),
                &package(),
                &version(),
                manifest,
                false,
                &SigningPolicy::default(),
            )
            .await;
        assert!(matches!(result, Err(Error::ManifestNotSigned { .. })));
    }

    #[tokio::test]
    async fn test_unsigned_manifest_for_signed_archive_skips_consent() {
        let delegate = Arc::new(CountingDelegate::new(true));
        let validation = validation(None, Some(delegate.clone()));
        let manifest = b"// swift-tools-version:5.5\nimport PackageDescription\n";
        let result = validation
            .validate_manifest(
                &registry(),
                &package(),
                &version(),
                manifest,
                true,
                &SigningPolicy::default(),
            )
            .await;
        assert!(matches!(result, Err(Error::ManifestNotSigned { .. })));
        assert_eq!(delegate.unsigned_prompts.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_extract_entity_degrades_to_none() {
        let without_verifier = validation(None, None);
        assert!(without_verifier
            .extract_signing_entity(&signing_block())
            .await
            .is_none());

        let verifier = Arc::new(StaticVerifier {
            verdict: SignatureVerdict {
                entity: Some(recognized("Mona")),
                trusted: true,
            },
        });
        let with_verifier = validation(Some(verifier), None);
        let entity = with_verifier.extract_signing_entity(&signing_block()).await;
        assert_eq!(entity, Some(recognized("Mona")));
    }
}
