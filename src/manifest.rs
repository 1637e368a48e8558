// src/manifest.rs

//! Manifest helpers: tools-version declarations and embedded signatures
//!
//! A manifest opens with a `// swift-tools-version:` comment; parsing that
//! declaration properly belongs to the package manager, so it sits behind
//! a trait with a header-scanning default. Signed manifests additionally
//! carry a trailing `// signature: <format>;<base64>` line that is split
//! off before verification.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;

use crate::error::{Error, Result};
use crate::signing::SignatureFormat;

/// Primary manifest filename
pub const MANIFEST_FILENAME: &str = "Package.swift";

const TOOLS_VERSION_PREFIX: &str = "swift-tools-version:";
const SIGNATURE_PREFIX: &str = "// signature:";

/// Filename of a manifest, specialized to a tools version when given
pub fn manifest_filename(tools_version: Option<&str>) -> String {
    match tools_version {
        None => MANIFEST_FILENAME.to_string(),
        Some(tools_version) => format!("Package@swift-{tools_version}.swift"),
    }
}

/// Parser of the manifest's tools-version declaration
pub trait ToolsVersionParser: Send + Sync {
    /// The declared tools version, e.g. `5.5`.
    fn parse(&self, manifest: &[u8]) -> Result<String>;
}

/// Scans the leading comment block for the declaration
#[derive(Debug, Default)]
pub struct DefaultToolsVersionParser;

impl ToolsVersionParser for DefaultToolsVersionParser {
    fn parse(&self, manifest: &[u8]) -> Result<String> {
        let text = std::str::from_utf8(manifest).map_err(|_| Error::InvalidResponse {
            details: "manifest is not valid UTF-8".to_string(),
        })?;

        for line in text.lines() {
            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }
            let Some(comment) = trimmed.strip_prefix("//") else {
                break;
            };
            if let Some(declaration) = comment.trim().strip_prefix(TOOLS_VERSION_PREFIX) {
                let tools_version = declaration.trim();
                if tools_version.is_empty() {
                    break;
                }
                return Ok(tools_version.to_string());
            }
        }

        Err(Error::InvalidResponse {
            details: "manifest does not declare a swift-tools-version".to_string(),
        })
    }
}

/// A manifest split into signed content and its embedded signature
#[derive(Debug, Clone)]
pub(crate) struct ManifestSignature {
    /// Everything preceding the signature line
    pub content: Vec<u8>,
    pub format: SignatureFormat,
    pub signature: Vec<u8>,
}

/// Split the signature trailer off a manifest, if one is present.
pub(crate) fn split_signature(manifest: &[u8]) -> Result<Option<ManifestSignature>> {
    let Ok(text) = std::str::from_utf8(manifest) else {
        return Ok(None);
    };
    let trimmed = text.trim_end();
    let (content_end, last_line) = match trimmed.rfind('\n') {
        Some(position) => (position + 1, &trimmed[position + 1..]),
        None => (0, trimmed),
    };
    let Some(trailer) = last_line.trim().strip_prefix(SIGNATURE_PREFIX) else {
        return Ok(None);
    };

    let (format, signature_base64) =
        trailer
            .trim()
            .split_once(';')
            .ok_or_else(|| Error::InvalidSignature {
                reason: "malformed manifest signature line".to_string(),
            })?;
    let format: SignatureFormat = format.trim().parse()?;
    let signature = BASE64
        .decode(signature_base64.trim())
        .map_err(|e| Error::InvalidSignature {
            reason: format!("manifest signature is not valid base64: {e}"),
        })?;

    Ok(Some(ManifestSignature {
        content: text[..content_end].as_bytes().to_vec(),
        format,
        signature,
    }))
}
