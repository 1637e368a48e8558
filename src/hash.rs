// src/hash.rs

//! Checksum computation for archives and manifests
//!
//! The registry protocol pins SHA-256 for resource checksums; the algorithm
//! is still injected into the client so fingerprints record which function
//! produced them and future protocol revisions can add members here.

use std::fmt;
use std::str::FromStr;

use sha2::{Digest, Sha256};

use crate::error::Error;

/// Hash algorithm selection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum HashAlgorithm {
    /// SHA-256, the checksum algorithm of registry protocol v1
    #[default]
    Sha256,
}

impl HashAlgorithm {
    /// Hash output length in bytes
    #[inline]
    pub const fn output_len(&self) -> usize {
        match self {
            Self::Sha256 => 32,
        }
    }

    /// Algorithm name as used in fingerprint records
    #[inline]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Sha256 => "sha256",
        }
    }

    /// Hash a byte slice, returning lowercase hex
    pub fn hash(&self, data: &[u8]) -> String {
        let mut hasher = Hasher::new(*self);
        hasher.update(data);
        hasher.finalize()
    }
}

impl fmt::Display for HashAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for HashAlgorithm {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "sha256" | "sha-256" => Ok(Self::Sha256),
            other => Err(Error::BadConfiguration {
                details: format!("unknown hash algorithm '{other}'"),
            }),
        }
    }
}

/// Incremental hasher for streamed content
pub struct Hasher {
    inner: Sha256,
}

impl Hasher {
    pub fn new(algorithm: HashAlgorithm) -> Self {
        match algorithm {
            HashAlgorithm::Sha256 => Self {
                inner: Sha256::new(),
            },
        }
    }

    pub fn update(&mut self, data: &[u8]) {
        self.inner.update(data);
    }

    /// Consume the hasher and return the digest as lowercase hex
    pub fn finalize(self) -> String {
        format!("{:x}", self.inner.finalize())
    }
}
