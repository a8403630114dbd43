// s3-version-restore/src/restore/logic.rs
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use super::decision::{apply, decide, RestoreAction};
use crate::config::RestoreConfig;
use crate::errors::{AppError, Result};
use crate::storage::VersionStore;
use crate::versions::VersionListIterator;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RestoreSummary {
    pub keys_scanned: usize,
    pub skipped: usize,
    pub deleted: usize,
    pub restored: usize,
}

/// Walks every key once: list its history, decide, mutate. Stops at the first
/// error so the bucket is never left partially restored without a report of
/// where it stopped.
pub async fn perform_restore_orchestration<S: VersionStore + ?Sized>(
    store: &S,
    restore_config: &RestoreConfig,
    cancel: &CancellationToken,
) -> Result<RestoreSummary> {
    let bucket = restore_config.bucket.as_str();
    let reference = restore_config.reference_timestamp;
    info!(
        bucket,
        reference = %reference.to_rfc3339(),
        prefix = ?restore_config.prefix,
        dry_run = restore_config.dry_run,
        "starting restore"
    );

    let mut versions = VersionListIterator::new(
        store,
        bucket,
        restore_config.prefix.clone(),
        restore_config.page_size,
    );
    let mut summary = RestoreSummary::default();

    while let Some((key, history)) = versions.next(cancel).await? {
        summary.keys_scanned += 1;
        debug!(key = %key, versions = %history, "checking");

        let action = decide(&history, reference);
        match &action {
            RestoreAction::Skip => {
                let etag = history.at(reference).map_or("", |v| v.etag.as_str());
                info!(key = %key, etag, "skipping");
                summary.skipped += 1;
                continue;
            }
            RestoreAction::LogicalDelete => {
                let version_id = history.at(reference).map(|v| v.version_id.as_str());
                info!(key = %key, version = ?version_id, "deleting");
                summary.deleted += 1;
            }
            RestoreAction::PromoteVersion(version_id) => {
                info!(key = %key, version = %version_id, "restoring");
                summary.restored += 1;
            }
        }

        if restore_config.dry_run {
            continue;
        }
        if let Err(e) = apply(store, bucket, &key, &action, reference, cancel).await {
            if !matches!(e, AppError::Cancelled(_)) {
                tracing::error!(key = %key, action = %action, error = %e, "could not restore object");
            }
            return Err(e);
        }
    }

    info!(
        keys = summary.keys_scanned,
        skipped = summary.skipped,
        deleted = summary.deleted,
        restored = summary.restored,
        pages = versions.pages_fetched(),
        "restore finished"
    );
    Ok(summary)
}
