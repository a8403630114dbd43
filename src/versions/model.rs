// s3-version-restore/src/versions/model.rs
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::fmt;

/// How often (in distinct keys) the pending set reports loading progress.
const PROGRESS_EVERY_KEYS: usize = 1000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Put,
    Delete,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operation::Put => write!(f, "PUT"),
            Operation::Delete => write!(f, "DELETE"),
        }
    }
}

/// One historical state of one key: either written content or a delete marker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectVersion {
    pub version_id: String,
    pub operation: Operation,
    pub timestamp: DateTime<Utc>,
    pub is_latest: bool,
    /// Empty for delete markers.
    pub etag: String,
}

impl ObjectVersion {
    pub fn put(
        version_id: impl Into<String>,
        timestamp: DateTime<Utc>,
        is_latest: bool,
        etag: impl Into<String>,
    ) -> Self {
        ObjectVersion {
            version_id: version_id.into(),
            operation: Operation::Put,
            timestamp,
            is_latest,
            etag: etag.into(),
        }
    }

    pub fn delete_marker(
        version_id: impl Into<String>,
        timestamp: DateTime<Utc>,
        is_latest: bool,
    ) -> Self {
        ObjectVersion {
            version_id: version_id.into(),
            operation: Operation::Delete,
            timestamp,
            is_latest,
            etag: String::new(),
        }
    }

    pub fn is_delete_marker(&self) -> bool {
        self.operation == Operation::Delete
    }
}

/// All versions of one key, ascending by timestamp.
///
/// Records sharing a timestamp keep their insertion order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VersionHistory {
    versions: Vec<ObjectVersion>,
}

impl VersionHistory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a record, then stable-sorts by timestamp.
    pub fn push(&mut self, version: ObjectVersion) {
        self.versions.push(version);
        self.versions.sort_by_key(|v| v.timestamp);
    }

    pub fn iter(&self) -> std::slice::Iter<'_, ObjectVersion> {
        self.versions.iter()
    }

    pub fn len(&self) -> usize {
        self.versions.len()
    }

    /// The version currently visible to unversioned reads.
    pub fn latest(&self) -> Option<&ObjectVersion> {
        self.versions.iter().find(|v| v.is_latest)
    }

    /// The version in effect at `reference`: the last record strictly before it.
    pub fn at(&self, reference: DateTime<Utc>) -> Option<&ObjectVersion> {
        self.versions
            .iter()
            .take_while(|v| v.timestamp < reference)
            .last()
    }
}

impl From<Vec<ObjectVersion>> for VersionHistory {
    fn from(versions: Vec<ObjectVersion>) -> Self {
        let mut history = VersionHistory::new();
        for version in versions {
            history.push(version);
        }
        history
    }
}

/// One record per entry, oldest first: `PUT v1 2023-08-17T16:00:00+00:00 "etag"`,
/// with `*` after the record currently marked latest.
impl fmt::Display for VersionHistory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[")?;
        for (i, v) in self.versions.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{} {} {}", v.operation, v.version_id, v.timestamp.to_rfc3339())?;
            if !v.is_delete_marker() {
                write!(f, " {:?}", v.etag)?;
            }
            if v.is_latest {
                write!(f, "*")?;
            }
        }
        write!(f, "]")
    }
}

/// Keys whose records have been received but not yet handed to the caller.
///
/// Ordered by key so the smallest key can be taken off the front once it is
/// known to be complete.
#[derive(Debug, Default)]
pub struct PendingKeySet {
    histories: BTreeMap<String, VersionHistory>,
    keys_seen: usize,
}

impl PendingKeySet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: &str, version: ObjectVersion) {
        if let Some(history) = self.histories.get_mut(key) {
            history.push(version);
            return;
        }

        self.keys_seen += 1;
        if self.keys_seen % PROGRESS_EVERY_KEYS == 0 {
            tracing::debug!(count = self.keys_seen, "loading objects");
        }
        let mut history = VersionHistory::new();
        history.push(version);
        self.histories.insert(key.to_string(), history);
    }

    pub fn key_count(&self) -> usize {
        self.histories.len()
    }

    /// Removes and returns the lexicographically smallest key.
    pub fn pop_first(&mut self) -> Option<(String, VersionHistory)> {
        self.histories.pop_first()
    }
}
