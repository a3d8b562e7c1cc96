//! Startup and shutdown of blob storage.

use tracing::{info, warn};

use crate::config::FilesConfig;
use crate::file::BlobStore;
use crate::{DocstoreError, Result};

/// What happens to stored blobs on shutdown.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RetentionPolicy {
    /// Leave blobs in place.
    #[default]
    Retain,
    /// Delete everything under the storage root.
    Discard,
}

impl RetentionPolicy {
    /// Parse a configured policy. Only `discard` (any case) discards.
    pub fn parse(value: &str) -> Self {
        if value.trim().eq_ignore_ascii_case("discard") {
            Self::Discard
        } else {
            Self::Retain
        }
    }
}

/// Prepares storage at startup and applies the retention policy at shutdown.
#[derive(Debug, Clone)]
pub struct Lifecycle {
    blobs: BlobStore,
    policy: RetentionPolicy,
}

impl Lifecycle {
    pub fn new(blobs: BlobStore, policy: RetentionPolicy) -> Self {
        Self { blobs, policy }
    }

    /// Build from the `[files]` configuration section.
    pub fn from_config(config: &FilesConfig) -> Self {
        Self::new(
            BlobStore::new(&config.storage_path),
            RetentionPolicy::parse(&config.policy),
        )
    }

    pub fn policy(&self) -> RetentionPolicy {
        self.policy
    }

    pub fn blobs(&self) -> &BlobStore {
        &self.blobs
    }

    /// Create the storage root. Failure here should abort startup.
    pub async fn start(&self) -> Result<()> {
        self.blobs.ensure_root().await.map_err(|e| {
            DocstoreError::Config(format!(
                "could not initialize storage at {}: {e}",
                self.blobs.root().display()
            ))
        })?;
        info!(root = %self.blobs.root().display(), policy = ?self.policy, "Blob storage ready");
        Ok(())
    }

    /// Apply the retention policy.
    ///
    /// Returns the number of entries removed. Metadata is left untouched,
    /// so after a discard, records may point at blobs that no longer exist.
    pub async fn stop(&self) -> Result<usize> {
        match self.policy {
            RetentionPolicy::Retain => {
                info!("Retaining stored files");
                Ok(0)
            }
            RetentionPolicy::Discard => match self.blobs.purge_all().await {
                Ok(removed) => {
                    info!(removed, "Discarded stored files");
                    Ok(removed)
                }
                Err(e) => {
                    warn!(error = %e, "Failed to discard stored files");
                    Err(e)
                }
            },
        }
    }
}
