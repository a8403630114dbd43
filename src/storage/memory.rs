//! In-memory versioned bucket with `ListObjectVersions` paging semantics.
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use std::collections::BTreeMap;
use std::sync::Mutex;

use super::{
    ListVersionsRequest, ObjectVersionEntry, StorageError, StorageResult, VersionPage,
    VersionStore,
};

#[derive(Debug, Clone)]
struct StoredVersion {
    version_id: String,
    last_modified: DateTime<Utc>,
    /// `None` for delete markers.
    etag: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordedCall {
    List { key_marker: Option<String> },
    Copy { key: String, version_id: String },
    Delete { key: String },
}

#[derive(Debug, Default)]
struct Inner {
    /// Versions per key, oldest first.
    objects: BTreeMap<String, Vec<StoredVersion>>,
    clock: Option<DateTime<Utc>>,
    next_version: u64,
    calls: Vec<RecordedCall>,
    fail_list_after: Option<usize>,
    fail_mutations: bool,
}

impl Inner {
    fn tick(&mut self) -> DateTime<Utc> {
        let now = self.clock.map_or_else(Utc::now, |t| t + Duration::seconds(1));
        self.clock = Some(now);
        now
    }

    fn new_version_id(&mut self) -> String {
        self.next_version += 1;
        format!("gen-{}", self.next_version)
    }
}

/// Mutations are timestamped one second after the newest record already held,
/// so they always sort after the existing history.
#[derive(Debug)]
pub struct MemoryVersionStore {
    bucket: String,
    page_limit: i32,
    inner: Mutex<Inner>,
}

impl MemoryVersionStore {
    pub fn new(bucket: &str) -> Self {
        Self {
            bucket: bucket.to_string(),
            page_limit: i32::MAX,
            inner: Mutex::new(Inner::default()),
        }
    }

    /// Caps the page size regardless of what the caller asks for.
    pub fn with_page_limit(mut self, page_limit: i32) -> Self {
        self.page_limit = page_limit;
        self
    }

    pub fn put(&self, key: &str, version_id: &str, at: DateTime<Utc>, etag: &str) {
        self.record(key, version_id, at, Some(etag.to_string()));
    }

    pub fn delete(&self, key: &str, version_id: &str, at: DateTime<Utc>) {
        self.record(key, version_id, at, None);
    }

    fn record(&self, key: &str, version_id: &str, at: DateTime<Utc>, etag: Option<String>) {
        let mut inner = self.inner.lock().unwrap();
        inner.clock = Some(inner.clock.map_or(at, |t| t.max(at)));
        let versions = inner.objects.entry(key.to_string()).or_default();
        versions.push(StoredVersion {
            version_id: version_id.to_string(),
            last_modified: at,
            etag,
        });
        versions.sort_by_key(|v| v.last_modified);
    }

    /// Makes the `n`th and later list calls (zero-based) fail.
    pub fn fail_list_after(&self, n: usize) {
        self.inner.lock().unwrap().fail_list_after = Some(n);
    }

    pub fn fail_mutations(&self) {
        self.inner.lock().unwrap().fail_mutations = true;
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.inner.lock().unwrap().calls.clone()
    }

    pub fn mutation_count(&self) -> usize {
        self.calls()
            .iter()
            .filter(|c| !matches!(c, RecordedCall::List { .. }))
            .count()
    }

    /// Etag visible to an unversioned read, `None` if the key is deleted or absent.
    pub fn current_etag(&self, key: &str) -> Option<String> {
        let inner = self.inner.lock().unwrap();
        inner
            .objects
            .get(key)
            .and_then(|versions| versions.last())
            .and_then(|v| v.etag.clone())
    }

    pub fn version_count(&self, key: &str) -> usize {
        let inner = self.inner.lock().unwrap();
        inner.objects.get(key).map_or(0, Vec::len)
    }

    fn check_bucket(&self, bucket: &str) -> StorageResult<()> {
        if bucket != self.bucket {
            return Err(StorageError::Sdk(format!("NoSuchBucket: {}", bucket)));
        }
        Ok(())
    }
}

#[async_trait]
impl VersionStore for MemoryVersionStore {
    async fn list_versions_page(&self, request: &ListVersionsRequest) -> StorageResult<VersionPage> {
        self.check_bucket(&request.bucket)?;
        let mut inner = self.inner.lock().unwrap();
        let call_index = inner
            .calls
            .iter()
            .filter(|c| matches!(c, RecordedCall::List { .. }))
            .count();
        inner.calls.push(RecordedCall::List {
            key_marker: request.key_marker.clone(),
        });
        if inner.fail_list_after.is_some_and(|n| call_index >= n) {
            return Err(StorageError::Sdk("InternalError: listing failed".to_string()));
        }

        // Keys ascending, newest version first within a key, as S3 lists them.
        let prefix = request.prefix.as_deref().unwrap_or("");
        let entries: Vec<(&String, &StoredVersion, bool)> = inner
            .objects
            .iter()
            .filter(|(key, _)| key.starts_with(prefix))
            .flat_map(|(key, versions)| {
                let newest = versions.len() - 1;
                versions
                    .iter()
                    .enumerate()
                    .rev()
                    .map(move |(i, v)| (key, v, i == newest))
            })
            .collect();

        let start = match (&request.key_marker, &request.version_id_marker) {
            (None, _) => 0,
            (Some(key_marker), Some(version_marker)) => entries
                .iter()
                .position(|(k, v, _)| *k == key_marker && &v.version_id == version_marker)
                .map_or(entries.len(), |i| i + 1),
            (Some(key_marker), None) => entries
                .iter()
                .position(|(k, _, _)| k.as_str() > key_marker.as_str())
                .unwrap_or(entries.len()),
        };

        let limit = request.max_keys.min(self.page_limit).max(1) as usize;
        let end = (start + limit).min(entries.len());
        let mut page = VersionPage {
            is_truncated: end < entries.len(),
            ..VersionPage::default()
        };
        for (key, version, is_latest) in &entries[start..end] {
            let entry = ObjectVersionEntry {
                key: (*key).clone(),
                version_id: version.version_id.clone(),
                last_modified: version.last_modified,
                is_latest: *is_latest,
                etag: version.etag.clone(),
            };
            if version.etag.is_some() {
                page.versions.push(entry);
            } else {
                page.delete_markers.push(entry);
            }
        }
        if page.is_truncated {
            let (key, version, _) = entries[end - 1];
            page.next_key_marker = Some(key.clone());
            page.next_version_id_marker = Some(version.version_id.clone());
        }
        Ok(page)
    }

    async fn copy_version(
        &self,
        source_bucket: &str,
        dest_bucket: &str,
        key: &str,
        source_version_id: &str,
    ) -> StorageResult<()> {
        self.check_bucket(source_bucket)?;
        self.check_bucket(dest_bucket)?;
        let mut inner = self.inner.lock().unwrap();
        inner.calls.push(RecordedCall::Copy {
            key: key.to_string(),
            version_id: source_version_id.to_string(),
        });
        if inner.fail_mutations {
            return Err(StorageError::Sdk("AccessDenied: copy".to_string()));
        }

        let etag = inner
            .objects
            .get(key)
            .and_then(|versions| versions.iter().find(|v| v.version_id == source_version_id))
            .and_then(|v| v.etag.clone())
            .ok_or_else(|| StorageError::Sdk(format!("NoSuchVersion: {}", source_version_id)))?;
        let version_id = inner.new_version_id();
        let last_modified = inner.tick();
        inner.objects.entry(key.to_string()).or_default().push(StoredVersion {
            version_id,
            last_modified,
            etag: Some(etag),
        });
        Ok(())
    }

    async fn delete_current_version(&self, bucket: &str, key: &str) -> StorageResult<()> {
        self.check_bucket(bucket)?;
        let mut inner = self.inner.lock().unwrap();
        inner.calls.push(RecordedCall::Delete { key: key.to_string() });
        if inner.fail_mutations {
            return Err(StorageError::Sdk("AccessDenied: delete".to_string()));
        }

        let version_id = inner.new_version_id();
        let last_modified = inner.tick();
        inner.objects.entry(key.to_string()).or_default().push(StoredVersion {
            version_id,
            last_modified,
            etag: None,
        });
        Ok(())
    }
}
