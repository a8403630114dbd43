//! Versioned Bucket Restore Tool
//!
//! Restores every object of a versioned S3 bucket to the state it had at a
//! given instant, using server-side copies and delete markers only.

// s3-version-restore/src/main.rs
mod config;
mod errors;
mod restore;
mod storage;
mod versions;

use anyhow::{Context, Result};
use clap::Parser;
use config::{AppConfig, Args};
use errors::AppError;
use std::process::ExitCode;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Main entry point for the restore tool
#[tokio::main]
async fn main() -> ExitCode {
    // A missing .env is fine; the SDK has its own credential chain.
    dotenv::dotenv().ok();
    let args = Args::parse();
    init_logging(args.verbose);

    match run_app(&args).await {
        Ok(_) => {
            info!("✅ Operation completed successfully.");
            ExitCode::SUCCESS
        }
        Err(e) => {
            if e.downcast_ref::<AppError>().is_some_and(AppError::is_cancelled) {
                eprintln!("⚠️ Restore interrupted before completion; re-run to finish.");
            }
            eprintln!("❌ Error: {:?}", e);
            ExitCode::FAILURE
        }
    }
}

/// Logs go to stderr. `--verbose` enables debug output for this tool only;
/// `RUST_LOG` replaces the filter entirely.
fn init_logging(verbose: bool) {
    let level = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("warn,s3_version_restore={}", level)));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

async fn run_app(args: &Args) -> Result<()> {
    let app_config = AppConfig::load(args).context("Failed to load configuration")?;

    let cancel = CancellationToken::new();
    spawn_cancellation(&cancel, app_config.timeout);

    let restore_config = &app_config.restore;
    let summary = restore::run_restore_flow(&app_config, &cancel)
        .await
        .with_context(|| {
            format!(
                "Restore of bucket {} to {} failed",
                restore_config.bucket,
                restore_config.reference_timestamp.to_rfc3339()
            )
        })?;
    cancel.cancel();

    if restore_config.dry_run {
        info!(
            would_delete = summary.deleted,
            would_restore = summary.restored,
            "dry run, bucket not modified"
        );
    }
    Ok(())
}

/// Cancels `cancel` on Ctrl-C or once `timeout` has elapsed. Both watchers
/// exit as soon as the token is cancelled for any other reason.
fn spawn_cancellation(cancel: &CancellationToken, timeout: Option<Duration>) {
    let token = cancel.clone();
    tokio::spawn(async move {
        tokio::select! {
            _ = token.cancelled() => {}
            signal = tokio::signal::ctrl_c() => {
                if signal.is_ok() {
                    warn!("interrupt received, aborting");
                    token.cancel();
                }
            }
        }
    });

    if let Some(timeout) = timeout {
        let token = cancel.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = token.cancelled() => {}
                _ = tokio::time::sleep(timeout) => {
                    warn!(timeout_secs = timeout.as_secs(), "deadline reached, aborting");
                    token.cancel();
                }
            }
        });
    }
}
