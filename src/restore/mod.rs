pub(crate) mod decision;
mod logic;

use tokio_util::sync::CancellationToken;

use crate::config::AppConfig;
use crate::errors::{AppError, Result};
use crate::storage::s3_client::S3VersionStore;

/// Public entry point for the restore process: connects to S3 and walks the
/// bucket with the configured reference time.
pub async fn run_restore_flow(
    app_config: &AppConfig,
    cancel: &CancellationToken,
) -> Result<logic::RestoreSummary> {
    // Credential and region resolution may block on IMDS or SSO lookups.
    let store = tokio::select! {
        biased;
        _ = cancel.cancelled() => {
            return Err(AppError::Cancelled(format!(
                "connecting to S3 for bucket {}",
                app_config.restore.bucket
            )));
        }
        store = S3VersionStore::connect(&app_config.s3) => store,
    };
    logic::perform_restore_orchestration(&store, &app_config.restore, cancel).await
}
