// tests/download.rs

//! Integration tests for the source-archive download pipeline: checksum
//! pinning, signature validation, extraction, and cleanup on failure.

mod common;

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use semver::Version;
use tempfile::TempDir;
use url::Url;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use common::*;
use swift_registry_client::store::{FingerprintStorage, MemoryFingerprintStorage};
use swift_registry_client::{Error, Fingerprint, FingerprintKind, HashAlgorithm};

const ARCHIVE_BYTES: &[u8] = b"PK\x03\x04 pretend zip bytes";

fn archive_checksum() -> String {
    HashAlgorithm::Sha256.hash(ARCHIVE_BYTES)
}

fn version_metadata_body(signed: bool, checksum: Option<&str>) -> serde_json::Value {
    let mut archive = serde_json::json!({
        "name": "source-archive",
        "type": "application/zip"
    });
    if let Some(checksum) = checksum {
        archive["checksum"] = serde_json::json!(checksum);
    }
    if signed {
        archive["signing"] = signing_json();
    }
    serde_json::json!({
        "id": "mona.LinkedList",
        "version": "1.1.1",
        "resources": [archive],
        "metadata": {
            "author": { "name": "J. Appleseed" },
            "description": "One thing links to another."
        }
    })
}

async fn mount_release(server: &MockServer, signed: bool, checksum: Option<&str>) {
    Mock::given(method("GET"))
        .and(path("/mona/LinkedList/1.1.1"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(version_metadata_body(signed, checksum))
                .insert_header("Content-Version", "1"),
        )
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path("/mona/LinkedList/1.1.1.zip"))
        .and(header("Accept", "application/vnd.swift.registry.v1+zip"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_bytes(ARCHIVE_BYTES)
                .insert_header("Content-Type", "application/zip"),
        )
        .mount(server)
        .await;
}

fn default_client(server: &MockServer, storage: Arc<MemoryFingerprintStorage>) -> swift_registry_client::RegistryClient {
    client_builder(&server.uri())
        .signature_verifier(StaticVerifier::trusted(recognized("Mona")))
        .archiver(Arc::new(FakeArchiver))
        .fingerprint_storage(storage)
        .build()
        .unwrap()
}

#[tokio::test]
async fn test_download_pins_fingerprint_and_writes_sidecar() {
    let server = MockServer::start().await;
    let checksum = archive_checksum();
    mount_release(&server, true, Some(&checksum)).await;

    let storage = Arc::new(MemoryFingerprintStorage::new());
    let client = default_client(&server, storage.clone());

    let workdir = TempDir::new().unwrap();
    let destination = workdir.path().join("LinkedList");
    client
        .download_source_archive(&package(), &version(), &destination, None, None)
        .await
        .unwrap();

    // extracted tree is flattened and the archive file is gone
    assert!(destination.join("Package.swift").exists());
    assert!(destination.join("Sources").join("main.swift").exists());
    assert!(!destination.join("LinkedList-1.1.1").exists());
    assert!(!workdir.path().join("LinkedList.zip").exists());

    // fingerprint pinned under (package, version, source-archive, registry)
    let identity = package().registry_identity().cloned().unwrap();
    let fingerprints = storage.get(&identity, &version()).await.unwrap();
    let pin = fingerprints
        .find(
            &FingerprintKind::SourceArchive,
            &Url::parse(&server.uri()).unwrap(),
        )
        .unwrap();
    assert_eq!(pin.value, checksum);

    // sidecar captures source, description, and the signing entity
    let sidecar = swift_registry_client::release_metadata::load(&destination)
        .await
        .unwrap();
    let signature = sidecar.signature.unwrap();
    assert_eq!(signature.signed_by, Some(recognized("Mona")));
    assert_eq!(
        sidecar.metadata.description.as_deref(),
        Some("One thing links to another.")
    );
}

#[tokio::test]
async fn test_download_twice_is_idempotent_on_the_store() {
    let server = MockServer::start().await;
    let checksum = archive_checksum();
    mount_release(&server, true, Some(&checksum)).await;

    let storage = Arc::new(MemoryFingerprintStorage::new());
    let client = default_client(&server, storage.clone());
    let identity = package().registry_identity().cloned().unwrap();

    let workdir = TempDir::new().unwrap();
    for run in 0..2 {
        let destination = workdir.path().join(format!("out-{run}"));
        client
            .download_source_archive(&package(), &version(), &destination, None, None)
            .await
            .unwrap();
    }

    let fingerprints = storage.get(&identity, &version()).await.unwrap();
    let pin = fingerprints
        .find(
            &FingerprintKind::SourceArchive,
            &Url::parse(&server.uri()).unwrap(),
        )
        .unwrap();
    assert_eq!(pin.value, checksum);
}

#[tokio::test]
async fn test_download_with_changed_checksum_fails_and_leaves_no_tree() {
    let server = MockServer::start().await;
    let checksum = archive_checksum();
    mount_release(&server, true, Some(&checksum)).await;

    // a pre-existing pin that disagrees with what the registry now serves
    let storage = Arc::new(MemoryFingerprintStorage::new());
    let identity = package().registry_identity().cloned().unwrap();
    storage
        .put(
            &identity,
            &version(),
            &Fingerprint {
                origin: Url::parse(&server.uri()).unwrap(),
                kind: FingerprintKind::SourceArchive,
                value: "def0000000000000000000000000000000000000000000000000000000000000"
                    .to_string(),
            },
        )
        .await
        .unwrap();

    let client = default_client(&server, storage.clone());
    let workdir = TempDir::new().unwrap();
    let destination = workdir.path().join("LinkedList");

    let result = client
        .download_source_archive(&package(), &version(), &destination, None, None)
        .await;
    match result {
        Err(Error::ChecksumChanged {
            latest, previous, ..
        }) => {
            assert_eq!(latest, checksum);
            assert!(previous.starts_with("def"));
        }
        other => panic!("unexpected result: {other:?}"),
    }

    // no destination directory, no leftover archive, and the pin survives
    assert!(!destination.exists());
    assert!(!workdir.path().join("LinkedList.zip").exists());
    let fingerprints = storage.get(&identity, &version()).await.unwrap();
    let pin = fingerprints
        .find(
            &FingerprintKind::SourceArchive,
            &Url::parse(&server.uri()).unwrap(),
        )
        .unwrap();
    assert!(pin.value.starts_with("def"));
}

#[tokio::test]
async fn test_download_requires_absent_destination() {
    let server = MockServer::start().await;
    let client = client_builder(&server.uri())
        .archiver(Arc::new(FakeArchiver))
        .build()
        .unwrap();

    let workdir = TempDir::new().unwrap();
    let destination = workdir.path().join("LinkedList");
    tokio::fs::create_dir(&destination).await.unwrap();

    let result = client
        .download_source_archive(&package(), &version(), &destination, None, None)
        .await;
    assert!(matches!(result, Err(Error::PathAlreadyExists(_))));
    assert!(server.received_requests().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_download_missing_declared_checksum() {
    let server = MockServer::start().await;
    mount_release(&server, true, None).await;

    let client = default_client(&server, Arc::new(MemoryFingerprintStorage::new()));
    let workdir = TempDir::new().unwrap();
    let destination = workdir.path().join("LinkedList");

    let result = client
        .download_source_archive(&package(), &version(), &destination, None, None)
        .await;
    assert!(matches!(
        result,
        Err(Error::SourceArchiveMissingChecksum { .. })
    ));
    assert!(!destination.exists());
}

#[tokio::test]
async fn test_download_unsigned_archive_without_delegate_is_refused() {
    let server = MockServer::start().await;
    let checksum = archive_checksum();
    mount_release(&server, false, Some(&checksum)).await;

    let client = client_builder(&server.uri())
        .archiver(Arc::new(FakeArchiver))
        .build()
        .unwrap();
    let workdir = TempDir::new().unwrap();
    let destination = workdir.path().join("LinkedList");

    let result = client
        .download_source_archive(&package(), &version(), &destination, None, None)
        .await;
    assert!(matches!(result, Err(Error::SourceArchiveNotSigned { .. })));
    assert!(!destination.exists());
}

#[tokio::test]
async fn test_download_unsigned_archive_with_consent() {
    let server = MockServer::start().await;
    let checksum = archive_checksum();
    mount_release(&server, false, Some(&checksum)).await;

    let delegate = CannedDelegate::new(true, false);
    let client = client_builder(&server.uri())
        .archiver(Arc::new(FakeArchiver))
        .consent_delegate(delegate.clone())
        .build()
        .unwrap();
    let workdir = TempDir::new().unwrap();
    let destination = workdir.path().join("LinkedList");

    client
        .download_source_archive(&package(), &version(), &destination, None, None)
        .await
        .unwrap();
    assert_eq!(delegate.unsigned_prompts.load(Ordering::SeqCst), 1);

    // unsigned release: the sidecar carries no signature block
    let sidecar = swift_registry_client::release_metadata::load(&destination)
        .await
        .unwrap();
    assert!(sidecar.signature.is_none());
}

#[tokio::test]
async fn test_download_untrusted_signer_refused() {
    let server = MockServer::start().await;
    let checksum = archive_checksum();
    mount_release(&server, true, Some(&checksum)).await;

    let client = client_builder(&server.uri())
        .signature_verifier(StaticVerifier::untrusted(recognized("Eve")))
        .archiver(Arc::new(FakeArchiver))
        .build()
        .unwrap();
    let workdir = TempDir::new().unwrap();
    let destination = workdir.path().join("LinkedList");

    let result = client
        .download_source_archive(&package(), &version(), &destination, None, None)
        .await;
    assert!(matches!(result, Err(Error::SignerNotTrusted { .. })));
    assert!(!destination.exists());
}

#[tokio::test]
async fn test_download_extraction_collision_cleans_up() {
    let server = MockServer::start().await;
    let checksum = archive_checksum();
    mount_release(&server, true, Some(&checksum)).await;

    let client = client_builder(&server.uri())
        .signature_verifier(StaticVerifier::trusted(recognized("Mona")))
        .archiver(Arc::new(CollidingArchiver))
        .build()
        .unwrap();
    let workdir = TempDir::new().unwrap();
    let destination = workdir.path().join("LinkedList");

    let result = client
        .download_source_archive(&package(), &version(), &destination, None, None)
        .await;
    assert!(matches!(result, Err(Error::InvalidSourceArchive { .. })));
    assert!(!destination.exists());
    assert!(!workdir.path().join("LinkedList.zip").exists());
}

#[tokio::test]
async fn test_download_without_archiver_is_a_configuration_error() {
    let server = MockServer::start().await;
    let checksum = archive_checksum();
    mount_release(&server, true, Some(&checksum)).await;

    let client = client_builder(&server.uri())
        .signature_verifier(StaticVerifier::trusted(recognized("Mona")))
        .build()
        .unwrap();
    let workdir = TempDir::new().unwrap();
    let destination = workdir.path().join("LinkedList");

    let result = client
        .download_source_archive(&package(), &version(), &destination, None, None)
        .await;
    assert!(matches!(result, Err(Error::MissingConfiguration { .. })));
}

#[tokio::test]
async fn test_download_reports_progress() {
    let server = MockServer::start().await;
    let checksum = archive_checksum();
    mount_release(&server, true, Some(&checksum)).await;

    let client = default_client(&server, Arc::new(MemoryFingerprintStorage::new()));
    let workdir = TempDir::new().unwrap();
    let destination = workdir.path().join("LinkedList");

    let received = Arc::new(AtomicU64::new(0));
    let progress: swift_registry_client::DownloadProgress = {
        let received = received.clone();
        Arc::new(move |bytes: u64, _total: Option<u64>| {
            received.store(bytes, Ordering::SeqCst);
        })
    };
    client
        .download_source_archive(&package(), &version(), &destination, Some(progress), None)
        .await
        .unwrap();

    assert_eq!(received.load(Ordering::SeqCst), ARCHIVE_BYTES.len() as u64);
}

#[tokio::test]
async fn test_download_not_found() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/mona/LinkedList/1.1.1"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(version_metadata_body(false, Some(&archive_checksum())))
                .insert_header("Content-Version", "1"),
        )
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/mona/LinkedList/1.1.1.zip"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let delegate = CannedDelegate::new(true, false);
    let client = client_builder(&server.uri())
        .archiver(Arc::new(FakeArchiver))
        .consent_delegate(delegate)
        .build()
        .unwrap();
    let workdir = TempDir::new().unwrap();
    let destination = workdir.path().join("LinkedList");

    let result = client
        .download_source_archive(&package(), &version(), &destination, None, None)
        .await;
    assert!(matches!(result, Err(Error::PackageNotFound { .. })));
    assert!(!destination.exists());
}

#[tokio::test]
async fn test_fingerprints_are_scoped_per_registry() {
    // the same release pinned from two registries keeps two fingerprints
    let storage = Arc::new(MemoryFingerprintStorage::new());
    let identity = package().registry_identity().cloned().unwrap();

    for origin in ["https://a.example.com", "https://b.example.com"] {
        storage
            .put(
                &identity,
                &version(),
                &Fingerprint {
                    origin: Url::parse(origin).unwrap(),
                    kind: FingerprintKind::SourceArchive,
                    value: format!("checksum-for-{origin}"),
                },
            )
            .await
            .unwrap();
    }

    let fingerprints = storage.get(&identity, &version()).await.unwrap();
    for origin in ["https://a.example.com", "https://b.example.com"] {
        let pin = fingerprints
            .find(&FingerprintKind::SourceArchive, &Url::parse(origin).unwrap())
            .unwrap();
        assert!(pin.value.ends_with(origin));
    }
}
