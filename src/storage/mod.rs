//! Storage gateway: the three backend operations the restore needs.
pub(crate) mod s3_client;
#[cfg(test)]
pub(crate) mod memory;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::future::Future;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

use crate::versions::ObjectVersion;

/// Largest page `ListObjectVersions` will return.
pub const DEFAULT_PAGE_SIZE: i32 = 1000;

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("S3 request failed: {0}")]
    Sdk(String),

    #[error("Unexpected response from storage backend: {0}")]
    InvalidResponse(String),

    #[error("request cancelled")]
    Cancelled,
}

pub type StorageResult<T> = std::result::Result<T, StorageError>;

#[derive(Debug, Clone)]
pub struct ListVersionsRequest {
    pub bucket: String,
    pub prefix: Option<String>,
    pub key_marker: Option<String>,
    pub version_id_marker: Option<String>,
    pub max_keys: i32,
}

/// A version or delete-marker record as listed, still tagged with its key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectVersionEntry {
    pub key: String,
    pub version_id: String,
    pub last_modified: DateTime<Utc>,
    pub is_latest: bool,
    pub etag: Option<String>,
}

impl ObjectVersionEntry {
    pub fn into_put(self) -> (String, ObjectVersion) {
        let version = ObjectVersion::put(
            self.version_id,
            self.last_modified,
            self.is_latest,
            self.etag.unwrap_or_default(),
        );
        (self.key, version)
    }

    pub fn into_delete_marker(self) -> (String, ObjectVersion) {
        let version =
            ObjectVersion::delete_marker(self.version_id, self.last_modified, self.is_latest);
        (self.key, version)
    }
}

#[derive(Debug, Clone, Default)]
pub struct VersionPage {
    pub versions: Vec<ObjectVersionEntry>,
    pub delete_markers: Vec<ObjectVersionEntry>,
    pub is_truncated: bool,
    pub next_key_marker: Option<String>,
    pub next_version_id_marker: Option<String>,
}

/// Server-side version operations on a versioned bucket.
///
/// Implementations must list keys in non-decreasing lexicographic order across
/// all pages of one scan. The listing iterator relies on this to decide when a
/// key's history is complete; a backend without that guarantee cannot be used.
#[async_trait]
pub trait VersionStore: Send + Sync {
    /// Fetches one page of versions and delete markers.
    async fn list_versions_page(&self, request: &ListVersionsRequest) -> StorageResult<VersionPage>;

    /// Creates a new current version of `key` in `dest_bucket` whose content is
    /// `source_version_id` of the same key in `source_bucket`.
    async fn copy_version(
        &self,
        source_bucket: &str,
        dest_bucket: &str,
        key: &str,
        source_version_id: &str,
    ) -> StorageResult<()>;

    /// Inserts a delete marker as the new current version of `key`.
    async fn delete_current_version(&self, bucket: &str, key: &str) -> StorageResult<()>;
}

/// Races `operation` against `cancel`. The operation future is dropped when the
/// token fires first.
pub async fn cancellable<T, F>(cancel: &CancellationToken, operation: F) -> StorageResult<T>
where
    F: Future<Output = StorageResult<T>>,
{
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(StorageError::Cancelled),
        result = operation => result,
    }
}
