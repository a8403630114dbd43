// s3-version-restore/src/restore/decision.rs
use chrono::{DateTime, Utc};
use std::fmt;
use tokio_util::sync::CancellationToken;

use crate::errors::{AppError, Result};
use crate::storage::{cancellable, StorageError, VersionStore};
use crate::versions::VersionHistory;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RestoreAction {
    /// Already in the state it had at the reference time.
    Skip,
    /// Did not exist, or was deleted, at the reference time.
    LogicalDelete,
    /// Had this version's content at the reference time.
    PromoteVersion(String),
}

impl fmt::Display for RestoreAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RestoreAction::Skip => write!(f, "skip"),
            RestoreAction::LogicalDelete => write!(f, "delete"),
            RestoreAction::PromoteVersion(version_id) => write!(f, "restore {}", version_id),
        }
    }
}

/// Decides what brings one key back to its state at `reference`.
///
/// The state at `reference` is the last record strictly before it; the current
/// state is the record marked latest. States are compared by etag. Delete
/// markers have an empty etag, and so does a key with no record before
/// `reference`, so "never existed" and "deleted" count as the same state.
pub fn decide(history: &VersionHistory, reference: DateTime<Utc>) -> RestoreAction {
    let at_reference = history.at(reference);
    let current = history.latest();

    let reference_etag = at_reference.map_or("", |v| v.etag.as_str());
    let current_etag = current.map_or("", |v| v.etag.as_str());
    if reference_etag == current_etag {
        return RestoreAction::Skip;
    }

    match at_reference {
        Some(version) if !version.is_delete_marker() => {
            RestoreAction::PromoteVersion(version.version_id.clone())
        }
        _ => RestoreAction::LogicalDelete,
    }
}

/// Issues the gateway call for `action`. Both calls append to the key's
/// history; nothing is overwritten or removed.
pub async fn apply<S: VersionStore + ?Sized>(
    store: &S,
    bucket: &str,
    key: &str,
    action: &RestoreAction,
    reference: DateTime<Utc>,
    cancel: &CancellationToken,
) -> Result<()> {
    let (result, version_id) = match action {
        RestoreAction::Skip => return Ok(()),
        RestoreAction::LogicalDelete => (
            cancellable(cancel, store.delete_current_version(bucket, key)).await,
            None,
        ),
        RestoreAction::PromoteVersion(version_id) => (
            cancellable(cancel, store.copy_version(bucket, bucket, key, version_id)).await,
            Some(version_id.clone()),
        ),
    };

    result.map_err(|source| match source {
        StorageError::Cancelled => AppError::Cancelled(format!("restoring {}", key)),
        source => AppError::Mutation {
            key: key.to_string(),
            version_id,
            reference,
            source,
        },
    })
}
