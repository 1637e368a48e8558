// src/headers.rs

//! Wire header grammar: media types, API version, and `Link` relations
//!
//! The `Link` header is a comma-separated list of entries. Each entry
//! starts with a `<url>` field followed by semicolon-separated attributes;
//! `rel` is mandatory, manifest alternates additionally carry `filename`
//! and `swift-tools-version`. A malformed entry is skipped, the rest of
//! the header still parses.

use crate::transport::{Headers, Response};

/// Protocol version carried in `Content-Version`
pub const API_VERSION: &str = "1";

pub const CONTENT_VERSION_HEADER: &str = "Content-Version";
pub const CONTENT_TYPE_HEADER: &str = "Content-Type";
pub const LINK_HEADER: &str = "Link";
pub const LOCATION_HEADER: &str = "Location";
pub const RETRY_AFTER_HEADER: &str = "Retry-After";

/// Media types of registry protocol v1
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaType {
    Json,
    Swift,
    Zip,
}

impl MediaType {
    /// The `Accept` header value requesting this representation
    pub fn accept(&self) -> &'static str {
        match self {
            Self::Json => "application/vnd.swift.registry.v1+json",
            Self::Swift => "application/vnd.swift.registry.v1+swift",
            Self::Zip => "application/vnd.swift.registry.v1+zip",
        }
    }

    /// The content type expected on responses for this representation
    pub fn content_type(&self) -> &'static str {
        match self {
            Self::Json => "application/json",
            Self::Swift => "text/x-swift",
            Self::Zip => "application/zip",
        }
    }
}

/// A parsed `Link` header entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkEntry {
    pub url: String,
    pub relation: String,
    pub filename: Option<String>,
    pub tools_version: Option<String>,
}

/// Parse every well-formed entry out of the `Link` headers of a response.
pub fn parse_link_entries(headers: &Headers) -> Vec<LinkEntry> {
    headers
        .get_all(LINK_HEADER)
        .iter()
        .flat_map(|value| value.split(','))
        .filter_map(parse_link_entry)
        .collect()
}

fn parse_link_entry(entry: &str) -> Option<LinkEntry> {
    let mut fields = entry.split(';');
    let url = fields
        .next()?
        .trim()
        .strip_prefix('<')?
        .strip_suffix('>')?
        .to_string();

    let mut relation = None;
    let mut filename = None;
    let mut tools_version = None;
    for field in fields {
        let Some((name, value)) = field.split_once('=') else {
            continue;
        };
        let value = value.trim().trim_matches('"').to_string();
        match name.trim() {
            "rel" => relation = Some(value),
            "filename" => filename = Some(value),
            "swift-tools-version" => tools_version = Some(value),
            _ => {}
        }
    }

    Some(LinkEntry {
        url,
        relation: relation?,
        filename,
        tools_version,
    })
}

/// First entry with the given relation.
pub fn first_link<'a>(entries: &'a [LinkEntry], relation: &str) -> Option<&'a LinkEntry> {
    entries.iter().find(|entry| entry.relation == relation)
}

/// All entry URLs with the given relation.
pub fn link_urls<'a>(entries: &'a [LinkEntry], relation: &str) -> Vec<&'a str> {
    entries
        .iter()
        .filter(|entry| entry.relation == relation)
        .map(|entry| entry.url.as_str())
        .collect()
}

/// Check `Content-Version` against the protocol version.
///
/// Comparison is strict string equality. When the header is optional for
/// the operation, absence passes but a present-and-wrong value still
/// fails.
pub fn validate_api_version(response: &Response, required: bool) -> crate::error::Result<()> {
    match response.headers.get(CONTENT_VERSION_HEADER) {
        Some(value) if value == API_VERSION => Ok(()),
        None if !required => Ok(()),
        other => Err(crate::error::Error::InvalidContentVersion {
            expected: API_VERSION,
            actual: other.map(str::to_string),
        }),
    }
}

/// Check `Content-Type` against an expected token.
///
/// Accepts the exact token or a `token;`-prefixed form with parameters.
pub fn validate_content_type(response: &Response, expected: &str) -> crate::error::Result<()> {
    let actual = response.headers.get(CONTENT_TYPE_HEADER);
    if content_type_matches(actual, expected) {
        Ok(())
    } else {
        Err(crate::error::Error::InvalidContentType {
            expected: expected.to_string(),
            actual: actual.map(str::to_string),
        })
    }
}

/// True when the content type is the exact token or a parameterized form.
pub fn content_type_matches(actual: Option<&str>, expected: &str) -> bool {
    actual.is_some_and(|value| value == expected || value.starts_with(&format!("{expected};")))
}
