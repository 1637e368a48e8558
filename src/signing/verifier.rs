// src/signing/verifier.rs

//! Seam for the cryptographic signature engine
//!
//! Implementations parse detached signatures, verify them against content,
//! and evaluate the signing certificate against their trust roots. The
//! pipeline in [`validation`](super::validation) never touches signature
//! bytes itself.

use async_trait::async_trait;

use crate::error::Result;
use crate::signing::{SignatureFormat, SigningEntity};

/// Outcome of verifying a signature over content
#[derive(Debug, Clone)]
pub struct SignatureVerdict {
    /// Identity extracted from the signing certificate, when one could be
    /// determined
    pub entity: Option<SigningEntity>,
    /// Whether the certificate chain validated against the engine's trust
    /// roots
    pub trusted: bool,
}

/// Detached-signature verification engine
///
/// Errors use the trust section of the taxonomy: *invalid-signature* for
/// malformed or non-matching signatures, *invalid-signing-certificate* for
/// certificate problems, and *failed-to-validate-signature* for engine
/// failures.
#[async_trait]
pub trait SignatureVerifier: Send + Sync {
    /// Parse the signature and extract the signing entity without
    /// verifying it against any content.
    async fn extract_signing_entity(
        &self,
        signature: &[u8],
        format: SignatureFormat,
    ) -> Result<SigningEntity>;

    /// Verify a detached signature over `content`.
    async fn verify(
        &self,
        signature: &[u8],
        content: &[u8],
        format: SignatureFormat,
    ) -> Result<SignatureVerdict>;
}
