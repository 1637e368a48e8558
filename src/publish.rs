// src/publish.rs

//! Multipart envelope assembly for publishing releases
//!
//! The publish body is assembled by hand rather than through an HTTP
//! library's multipart support: the registry protocol fixes the part
//! order, the transfer encodings, and expects the metadata part
//! quoted-printable encoded. The boundary is a fresh UUID per envelope.
//!
//! Part order:
//! 1. `source-archive` (application/zip, binary)
//! 2. `source-archive-signature` (application/octet-stream, binary), when signing
//! 3. `metadata` (application/json, quoted-printable), when provided
//! 4. `metadata-signature` (application/octet-stream, binary), when signing

use url::Url;
use uuid::Uuid;

use crate::error::{Error, Result};

/// Header naming the signature format on signed publishes
pub const SIGNATURE_FORMAT_HEADER: &str = "X-Swift-Package-Signature-Format";

/// Outcome of a publish request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PublishResult {
    /// The registry published the release synchronously (201)
    Published { location: Option<Url> },
    /// The registry accepted the release for asynchronous processing
    /// (202); poll `status_url` for progress
    Processing {
        status_url: Url,
        retry_after: Option<u64>,
    },
}

/// Check the signing argument combinations before any file or network
/// work.
pub(crate) fn validate_signing_arguments(
    has_metadata: bool,
    has_signature: bool,
    has_metadata_signature: bool,
    has_format: bool,
) -> Result<()> {
    if (has_signature || has_metadata_signature) && !has_format {
        return Err(Error::MissingSignatureFormat);
    }
    if has_metadata_signature && !has_metadata {
        return Err(Error::InvalidSignature {
            reason: "metadata signature provided without metadata".to_string(),
        });
    }
    if has_metadata && (has_signature != has_metadata_signature) {
        return Err(Error::InvalidSignature {
            reason: "both archive and metadata must be signed".to_string(),
        });
    }
    Ok(())
}

/// An assembled multipart body
#[derive(Debug, Clone)]
pub(crate) struct PublishEnvelope {
    pub boundary: String,
    pub body: Vec<u8>,
}

impl PublishEnvelope {
    /// `Content-Type` value announcing this envelope
    pub fn content_type(&self) -> String {
        format!("multipart/form-data;boundary=\"{}\"", self.boundary)
    }
}

pub(crate) fn build_envelope(
    archive: &[u8],
    metadata: Option<&[u8]>,
    archive_signature: Option<&[u8]>,
    metadata_signature: Option<&[u8]>,
) -> PublishEnvelope {
    let boundary = Uuid::new_v4().to_string();
    let mut body = Vec::new();

    append_part(
        &mut body,
        &boundary,
        "source-archive",
        "application/zip",
        "binary",
        archive,
    );
    if let Some(signature) = archive_signature {
        append_part(
            &mut body,
            &boundary,
            "source-archive-signature",
            "application/octet-stream",
            "binary",
            signature,
        );
    }
    if let Some(metadata) = metadata {
        let encoded = quoted_printable(metadata);
        append_part(
            &mut body,
            &boundary,
            "metadata",
            "application/json",
            "quoted-printable",
            &encoded,
        );
        if let Some(signature) = metadata_signature {
            append_part(
                &mut body,
                &boundary,
                "metadata-signature",
                "application/octet-stream",
                "binary",
                signature,
            );
        }
    }
    body.extend_from_slice(format!("--{boundary}--\r\n").as_bytes());

    PublishEnvelope { boundary, body }
}

fn append_part(
    body: &mut Vec<u8>,
    boundary: &str,
    name: &str,
    content_type: &str,
    transfer_encoding: &str,
    content: &[u8],
) {
    body.extend_from_slice(format!("--{boundary}\r\n").as_bytes());
    body.extend_from_slice(
        format!("Content-Disposition: form-data; name=\"{name}\"\r\n").as_bytes(),
    );
    body.extend_from_slice(format!("Content-Type: {content_type}\r\n").as_bytes());
    body.extend_from_slice(
        format!("Content-Transfer-Encoding: {transfer_encoding}\r\n").as_bytes(),
    );
    body.extend_from_slice(format!("Content-Length: {}\r\n", content.len()).as_bytes());
    body.extend_from_slice(b"\r\n");
    body.extend_from_slice(content);
    body.extend_from_slice(b"\r\n");
}

/// Minimal RFC 2045 quoted-printable encoding: printable ASCII passes
/// through, everything else becomes `=XX`, lines soft-wrap below 76
/// characters.
fn quoted_printable(data: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(data.len());
    let mut line_length = 0usize;
    for &byte in data {
        let literal = matches!(byte, b' ' | b'\t' | 33..=126) && byte != b'=';
        let width = if literal { 1 } else { 3 };
        if line_length + width > 75 {
            out.extend_from_slice(b"=\r\n");
            line_length = 0;
        }
        if literal {
            out.push(byte);
        } else {
            out.extend_from_slice(format!("={byte:02X}").as_bytes());
        }
        line_length += width;
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Counterpart decoder used only to prove the encoding round-trips.
    fn quoted_printable_decode(data: &[u8]) -> Vec<u8> {
        let mut out = Vec::new();
        let mut bytes = data.iter().copied().peekable();
        while let Some(byte) = bytes.next() {
            if byte != b'=' {
                out.push(byte);
                continue;
            }
            let high = bytes.next().unwrap();
            if high == b'\r' {
                bytes.next(); // soft line break, skip the \n
                continue;
            }
            let low = bytes.next().unwrap();
            let hex = [high, low];
            let hex = std::str::from_utf8(&hex).unwrap();
            out.push(u8::from_str_radix(hex, 16).unwrap());
        }
        out
    }

    /// Split a multipart body into (headers, content) pairs.
    fn parse_multipart(body: &[u8], boundary: &str) -> Vec<(String, Vec<u8>)> {
        let text = body.to_vec();
        let delimiter = format!("--{boundary}\r\n").into_bytes();
        let closing = format!("--{boundary}--\r\n").into_bytes();

        let mut parts = Vec::new();
        let mut offset = 0;
        loop {
            let Some(start) = find(&text[offset..], &delimiter) else {
                break;
            };
            let part_start = offset + start + delimiter.len();
            let next = find(&text[part_start..], &delimiter)
                .map(|p| part_start + p)
                .or_else(|| find(&text[part_start..], &closing).map(|p| part_start + p))
                .expect("unterminated part");
            let part = &text[part_start..next];
            let header_end = find(part, b"\r\n\r\n").expect("missing header separator");
            let headers = String::from_utf8_lossy(&part[..header_end]).into_owned();
            // strip the trailing \r\n that closes the part content
            let content = part[header_end + 4..part.len() - 2].to_vec();
            parts.push((headers, content));
            offset = next;
        }
        parts
    }

    fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
        haystack
            .windows(needle.len())
            .position(|window| window == needle)
    }

    #[test]
    fn test_signature_requires_format() {
        assert!(matches!(
            validate_signing_arguments(false, true, false, false),
            Err(Error::MissingSignatureFormat)
        ));
        assert!(validate_signing_arguments(false, true, false, true).is_ok());
    }

    #[test]
    fn test_metadata_and_archive_must_both_be_signed() {
        let result = validate_signing_arguments(true, true, false, true);
        match result {
            Err(Error::InvalidSignature { reason }) => {
                assert_eq!(reason, "both archive and metadata must be signed");
            }
            other => panic!("unexpected result: {other:?}"),
        }
        assert!(matches!(
            validate_signing_arguments(true, false, true, true),
            Err(Error::InvalidSignature { .. })
        ));
        assert!(validate_signing_arguments(true, true, true, true).is_ok());
        assert!(validate_signing_arguments(true, false, false, false).is_ok());
    }

    #[test]
    fn test_part_order_and_headers() {
        let envelope = build_envelope(
            b"zip-bytes",
            Some(br#"{"description": "One thing links to another."}"#),
            Some(b"archive-sig"),
            Some(b"metadata-sig"),
        );

        let parts = parse_multipart(&envelope.body, &envelope.boundary);
        let names: Vec<&str> = parts
            .iter()
            .map(|(headers, _)| {
                let start = headers.find("name=\"").unwrap() + 6;
                let end = headers[start..].find('"').unwrap() + start;
                &headers[start..end]
            })
            .collect();
        assert_eq!(
            names,
            vec![
                "source-archive",
                "source-archive-signature",
                "metadata",
                "metadata-signature"
            ]
        );

        assert!(parts[0].0.contains("Content-Type: application/zip"));
        assert!(parts[0].0.contains("Content-Transfer-Encoding: binary"));
        assert!(parts[2].0.contains("Content-Type: application/json"));
        assert!(parts[2].0.contains("Content-Transfer-Encoding: quoted-printable"));
        assert!(envelope
            .content_type()
            .starts_with("multipart/form-data;boundary=\""));
    }

    #[test]
    fn test_envelope_round_trips_through_a_mime_parser() {
        let metadata = br#"{"author": {"name": "J. Appleseed"}, "description": "One = thing"}"#;
        let envelope = build_envelope(
            b"zip-bytes\x00\x01\x02",
            Some(metadata),
            Some(b"archive-sig"),
            Some(b"metadata-sig"),
        );

        let parts = parse_multipart(&envelope.body, &envelope.boundary);
        assert_eq!(parts[0].1, b"zip-bytes\x00\x01\x02");
        assert_eq!(parts[1].1, b"archive-sig");
        assert_eq!(quoted_printable_decode(&parts[2].1), metadata);
        assert_eq!(parts[3].1, b"metadata-sig");
    }

    #[test]
    fn test_unsigned_envelope_omits_signature_parts() {
        let envelope = build_envelope(b"zip-bytes", Some(b"{}"), None, None);
        let parts = parse_multipart(&envelope.body, &envelope.boundary);
        assert_eq!(parts.len(), 2);
    }

    #[test]
    fn test_quoted_printable_wraps_long_lines() {
        let long = vec![b'a'; 200];
        let encoded = quoted_printable(&long);
        for line in encoded.split(|&b| b == b'\n') {
            assert!(line.len() <= 76 + 1); // +1 for the \r
        }
        assert_eq!(quoted_printable_decode(&encoded), long);
    }

    #[test]
    fn test_quoted_printable_escapes_equals_and_control_bytes() {
        let encoded = quoted_printable(b"a=b\nc");
        assert_eq!(encoded, b"a=3Db=0Ac");
    }
}
