// src/metadata.rs

//! Wire models of registry protocol v1 and the views returned to callers
//!
//! The `wire` submodule mirrors the JSON bodies exactly as the registry
//! sends them; the public types at the top are the projections handed to
//! the package manager. URLs arriving in metadata are best-effort: a value
//! that does not parse is dropped rather than failing the operation.

use chrono::{DateTime, Utc};
use semver::Version;
use url::Url;

use crate::config::Registry;
use crate::signing::SigningEntity;

/// Resource name of the source archive in version metadata
pub const SOURCE_ARCHIVE_RESOURCE: &str = "source-archive";

/// Package-level metadata: the release list
#[derive(Debug, Clone)]
pub struct PackageMetadata {
    pub registry: Registry,
    /// Strictly descending, deduplicated
    pub versions: Vec<Version>,
    /// Mirrors advertised via `Link: rel="alternate"`; first non-empty
    /// page wins
    pub alternate_locations: Vec<Url>,
    /// Always `None` on returned values; populated only on intermediate
    /// pagination results
    pub next_page: Option<Url>,
}

impl PackageMetadata {
    /// Highest known version
    pub fn latest_version(&self) -> Option<&Version> {
        self.versions.first()
    }
}

/// Signature attached to a resource
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceSigning {
    pub signature_base64: String,
    pub signature_format: String,
}

/// A named artifact attached to a release
#[derive(Debug, Clone)]
pub struct Resource {
    pub name: String,
    /// Media type of the artifact (`type` on the wire)
    pub content_type: String,
    pub checksum: Option<String>,
    pub signing: Option<ResourceSigning>,
    /// Extracted from the signature when one is present and parses;
    /// `None` otherwise
    pub signing_entity: Option<SigningEntity>,
}

/// Author block from release metadata
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Author {
    pub name: Option<String>,
    pub email: Option<String>,
    pub organization: Option<String>,
}

/// Release-level metadata
#[derive(Debug, Clone)]
pub struct PackageVersionMetadata {
    pub registry: Registry,
    pub license_url: Option<Url>,
    pub readme_url: Option<Url>,
    pub repository_urls: Option<Vec<Url>>,
    pub resources: Vec<Resource>,
    pub author: Option<Author>,
    pub description: Option<String>,
    pub published_at: Option<DateTime<Utc>>,
}

impl PackageVersionMetadata {
    /// The distinguished source-archive resource
    pub fn source_archive(&self) -> Option<&Resource> {
        self.resources
            .iter()
            .find(|resource| resource.name == SOURCE_ARCHIVE_RESOURCE)
    }
}

/// JSON bodies exactly as the registry serves them
pub(crate) mod wire {
    use std::collections::HashMap;

    use chrono::{DateTime, Utc};
    use serde::{Deserialize, Serialize};

    /// `GET /{scope}/{name}` body
    #[derive(Debug, Clone, Deserialize)]
    pub struct Releases {
        pub releases: HashMap<String, Release>,
    }

    #[derive(Debug, Clone, Deserialize)]
    pub struct Release {
        #[allow(dead_code)]
        pub url: Option<String>,
        /// Present when the release is unavailable (e.g. yanked); such
        /// releases are omitted from results
        pub problem: Option<ReleaseProblem>,
    }

    #[derive(Debug, Clone, Deserialize)]
    pub struct ReleaseProblem {
        #[allow(dead_code)]
        pub status: Option<u16>,
        #[allow(dead_code)]
        pub title: Option<String>,
        #[allow(dead_code)]
        pub detail: Option<String>,
    }

    /// `GET /{scope}/{name}/{version}` body
    #[derive(Debug, Clone, Serialize, Deserialize)]
    #[serde(rename_all = "camelCase")]
    pub struct VersionMetadata {
        pub id: String,
        pub version: String,
        #[serde(default)]
        pub resources: Vec<Resource>,
        pub metadata: Option<AdditionalMetadata>,
        #[serde(default)]
        pub published_at: Option<DateTime<Utc>>,
    }

    #[derive(Debug, Clone, Serialize, Deserialize)]
    pub struct Resource {
        pub name: String,
        #[serde(rename = "type")]
        pub content_type: String,
        #[serde(default)]
        pub checksum: Option<String>,
        #[serde(default)]
        pub signing: Option<Signing>,
    }

    #[derive(Debug, Clone, Serialize, Deserialize)]
    #[serde(rename_all = "camelCase")]
    pub struct Signing {
        pub signature_base64: String,
        pub signature_format: String,
    }

    #[derive(Debug, Clone, Serialize, Deserialize)]
    #[serde(rename_all = "camelCase")]
    pub struct AdditionalMetadata {
        #[serde(default)]
        pub author: Option<Author>,
        #[serde(default)]
        pub description: Option<String>,
        #[serde(default, rename = "licenseURL")]
        pub license_url: Option<String>,
        #[serde(default, rename = "readmeURL")]
        pub readme_url: Option<String>,
        #[serde(default, rename = "repositoryURLs")]
        pub repository_urls: Option<Vec<String>>,
        #[serde(default)]
        pub original_publication_time: Option<DateTime<Utc>>,
    }

    #[derive(Debug, Clone, Serialize, Deserialize)]
    pub struct Author {
        #[serde(default)]
        pub name: Option<String>,
        #[serde(default)]
        pub email: Option<String>,
        #[serde(default)]
        pub organization: Option<Organization>,
    }

    #[derive(Debug, Clone, Serialize, Deserialize)]
    pub struct Organization {
        #[serde(default)]
        pub name: Option<String>,
    }

    /// `GET /identifiers?url=...` body
    #[derive(Debug, Clone, Deserialize)]
    pub struct Identifiers {
        pub identifiers: Vec<String>,
    }
}

impl PackageVersionMetadata {
    /// Project the wire form, attaching pre-extracted signing entities in
    /// resource order.
    pub(crate) fn from_wire(
        registry: Registry,
        raw: &wire::VersionMetadata,
        signing_entities: Vec<Option<SigningEntity>>,
    ) -> Self {
        let parse_url = |s: &String| Url::parse(s).ok();
        let metadata = raw.metadata.as_ref();
        let published_at = raw
            .published_at
            .or_else(|| metadata.and_then(|m| m.original_publication_time));

        Self {
            registry,
            license_url: metadata.and_then(|m| m.license_url.as_ref()).and_then(parse_url),
            readme_url: metadata.and_then(|m| m.readme_url.as_ref()).and_then(parse_url),
            repository_urls: metadata.and_then(|m| {
                m.repository_urls
                    .as_ref()
                    .map(|urls| urls.iter().filter_map(parse_url).collect())
            }),
            resources: raw
                .resources
                .iter()
                .zip(signing_entities)
                .map(|(resource, signing_entity)| Resource {
                    name: resource.name.clone(),
                    content_type: resource.content_type.clone(),
                    checksum: resource.checksum.clone(),
                    signing: resource.signing.as_ref().map(|signing| ResourceSigning {
                        signature_base64: signing.signature_base64.clone(),
                        signature_format: signing.signature_format.clone(),
                    }),
                    signing_entity,
                })
                .collect(),
            author: metadata.and_then(|m| m.author.as_ref()).map(|author| Author {
                name: author.name.clone(),
                email: author.email.clone(),
                organization: author
                    .organization
                    .as_ref()
                    .and_then(|organization| organization.name.clone()),
            }),
            description: metadata.and_then(|m| m.description.clone()),
            published_at,
        }
    }
}
