// s3-version-restore/src/versions/iterator.rs
use tokio_util::sync::CancellationToken;

use super::model::{PendingKeySet, VersionHistory};
use crate::errors::{AppError, Result};
use crate::storage::{cancellable, ListVersionsRequest, StorageError, VersionStore};

/// Pulls `(key, history)` pairs out of a paginated version listing.
///
/// Each key is yielded exactly once, with every version and delete marker it
/// has, sorted by timestamp. The listing returns keys in ascending order, so
/// as soon as two distinct keys are pending the smaller one cannot receive
/// records from a later page and is safe to hand out. Only the keys of the
/// pages fetched so far are held in memory.
pub struct VersionListIterator<'a, S: VersionStore + ?Sized> {
    store: &'a S,
    bucket: String,
    prefix: Option<String>,
    page_size: i32,
    key_marker: Option<String>,
    version_id_marker: Option<String>,
    more_pages: bool,
    pending: PendingKeySet,
    pages_fetched: usize,
    keys_emitted: usize,
}

impl<'a, S: VersionStore + ?Sized> VersionListIterator<'a, S> {
    pub fn new(store: &'a S, bucket: &str, prefix: Option<String>, page_size: i32) -> Self {
        Self {
            store,
            bucket: bucket.to_string(),
            prefix,
            page_size,
            key_marker: None,
            version_id_marker: None,
            more_pages: true,
            pending: PendingKeySet::new(),
            pages_fetched: 0,
            keys_emitted: 0,
        }
    }

    pub fn pages_fetched(&self) -> usize {
        self.pages_fetched
    }

    /// Returns the next key and its complete history, or `None` once the
    /// listing is exhausted. A failed or cancelled page fetch is returned as
    /// is and leaves markers and pending keys where they were.
    pub async fn next(
        &mut self,
        cancel: &CancellationToken,
    ) -> Result<Option<(String, VersionHistory)>> {
        while self.more_pages && self.pending.key_count() <= 1 {
            self.fetch_page(cancel).await?;
        }

        // Either two or more keys are pending (the first is complete), or the
        // listing is done and everything pending is complete, or nothing is left.
        match self.pending.pop_first() {
            Some((key, history)) => {
                self.keys_emitted += 1;
                Ok(Some((key, history)))
            }
            None => {
                tracing::debug!(
                    bucket = %self.bucket,
                    pages = self.pages_fetched,
                    keys = self.keys_emitted,
                    "version listing exhausted"
                );
                Ok(None)
            }
        }
    }

    async fn fetch_page(&mut self, cancel: &CancellationToken) -> Result<()> {
        let request = ListVersionsRequest {
            bucket: self.bucket.clone(),
            prefix: self.prefix.clone(),
            key_marker: self.key_marker.clone(),
            version_id_marker: self.version_id_marker.clone(),
            max_keys: self.page_size,
        };
        // Nothing below is touched until the whole page is in hand.
        let page = cancellable(cancel, self.store.list_versions_page(&request))
            .await
            .map_err(|e| self.listing_error(e))?;

        if page.is_truncated && page.next_key_marker.is_none() {
            return Err(self.listing_error(StorageError::InvalidResponse(
                "truncated page without a continuation marker".to_string(),
            )));
        }

        self.pages_fetched += 1;
        tracing::debug!(
            page = self.pages_fetched,
            versions = page.versions.len(),
            delete_markers = page.delete_markers.len(),
            truncated = page.is_truncated,
            "fetched version page"
        );

        self.more_pages = page.is_truncated;
        self.key_marker = page.next_key_marker;
        self.version_id_marker = page.next_version_id_marker;

        for entry in page.versions {
            let (key, version) = entry.into_put();
            self.pending.insert(&key, version);
        }
        for entry in page.delete_markers {
            let (key, version) = entry.into_delete_marker();
            self.pending.insert(&key, version);
        }
        Ok(())
    }

    fn listing_error(&self, source: StorageError) -> AppError {
        if matches!(source, StorageError::Cancelled) {
            return AppError::Cancelled(format!("listing versions of {}", self.bucket));
        }
        AppError::Listing {
            bucket: self.bucket.clone(),
            prefix: self.prefix.clone(),
            source,
        }
    }
}
