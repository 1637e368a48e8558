// src/archive.rs

//! Archive extraction seam and post-extraction normalization
//!
//! ZIP extraction itself is injected; this module defines the seam, the
//! error vocabulary extractors report in, and the post-extraction step
//! that flattens the single top-level directory wrapper registries put
//! around package sources.

use std::path::Path;

use async_trait::async_trait;
use thiserror::Error;
use tracing::debug;

use crate::error::{Error as RegistryError, Result};

/// Failures an extractor can report
///
/// Entries that would land outside the destination and entries colliding
/// with already-extracted paths must be rejected, not silently skipped.
#[derive(Debug, Error)]
pub enum ArchiveError {
    #[error("entry '{0}' escapes the destination directory")]
    PathTraversal(String),

    #[error("entry '{0}' collides with an existing path")]
    Collision(String),

    #[error("malformed archive: {0}")]
    Malformed(String),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<ArchiveError> for RegistryError {
    fn from(error: ArchiveError) -> Self {
        RegistryError::InvalidSourceArchive {
            reason: error.to_string(),
        }
    }
}

/// Extractor seam
#[async_trait]
pub trait Archiver: Send + Sync {
    /// Extract `archive` into the existing directory `destination`.
    async fn extract(&self, archive: &Path, destination: &Path)
        -> std::result::Result<(), ArchiveError>;
}

/// Flatten the single top-level directory wrapper, if the extracted tree
/// has one.
///
/// `destination/Package-1.1.1/...` becomes `destination/...`. A tree with
/// multiple top-level entries is left untouched.
pub(crate) async fn strip_top_level_directory(destination: &Path) -> Result<()> {
    let mut entries = tokio::fs::read_dir(destination).await?;
    let mut top_level = Vec::new();
    while let Some(entry) = entries.next_entry().await? {
        top_level.push(entry);
    }

    let [wrapper] = top_level.as_slice() else {
        return Ok(());
    };
    if !wrapper.file_type().await?.is_dir() {
        return Ok(());
    }

    let wrapper_path = wrapper.path();
    debug!(path = %wrapper_path.display(), "stripping top-level directory wrapper");

    let mut children = tokio::fs::read_dir(&wrapper_path).await?;
    while let Some(child) = children.next_entry().await? {
        let target = destination.join(child.file_name());
        if tokio::fs::try_exists(&target).await? {
            return Err(RegistryError::InvalidSourceArchive {
                reason: format!(
                    "cannot flatten archive: '{}' already exists",
                    target.display()
                ),
            });
        }
        tokio::fs::rename(child.path(), target).await?;
    }
    tokio::fs::remove_dir(&wrapper_path).await?;
    Ok(())
}
