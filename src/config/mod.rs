// s3-version-restore/src/config/mod.rs
use chrono::{DateTime, Utc};
use clap::Parser;
use serde::Deserialize;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use url::Url;

use crate::errors::{AppError, Result};
use crate::storage::DEFAULT_PAGE_SIZE;

/// S3-only endpoint override variable from the AWS SDK shared configuration.
pub const ENDPOINT_ENV_VAR: &str = "AWS_ENDPOINT_URL_S3";

/// Restore every object of a versioned bucket to its state at a point in time.
///
/// History is never rewritten: objects are restored by copying the old version
/// on top, and removed by adding a delete marker.
#[derive(Parser, Debug, Clone)]
#[command(name = "s3-version-restore", version, about, long_about = None)]
#[command(after_help = "Example: s3-version-restore --verbose mybucket \"2023-08-17T18:50:00+02:00\"")]
pub struct Args {
    /// Versioned bucket to restore
    pub bucket: String,

    /// Point in time to restore to (RFC3339)
    pub timestamp: String,

    /// Print debug information
    #[arg(short, long)]
    pub verbose: bool,

    /// Only work on keys with this prefix
    #[arg(long)]
    pub prefix: Option<String>,

    /// Decide and log, but do not modify the bucket
    #[arg(long)]
    pub dry_run: bool,

    /// Optional JSON configuration file (`s3_storage` section)
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Custom S3 endpoint (overrides AWS_ENDPOINT_URL_S3)
    #[arg(long)]
    pub endpoint_url: Option<String>,

    /// AWS region
    #[arg(long)]
    pub region: Option<String>,

    /// Versions requested per listing page (1-1000)
    #[arg(long)]
    pub page_size: Option<i32>,

    /// Abort the whole run after this many seconds
    #[arg(long)]
    pub timeout_secs: Option<u64>,
}

// Structs for deserializing the JSON config file
#[derive(Debug, Clone, Default, Deserialize)]
pub struct JsonS3StorageConfig {
    pub region: Option<String>,
    pub access_key_id: Option<String>,
    pub secret_access_key: Option<String>,
    pub endpoint_url: Option<String>,
    pub force_path_style: Option<bool>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawJsonConfig {
    pub prefix: Option<String>,
    pub page_size: Option<i32>,
    pub s3_storage: Option<JsonS3StorageConfig>,
}

#[derive(Clone)]
pub struct StaticCredentials {
    pub access_key_id: String,
    pub secret_access_key: String,
}

impl fmt::Debug for StaticCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StaticCredentials")
            .field("access_key_id", &self.access_key_id)
            .field("secret_access_key", &"<redacted>")
            .finish()
    }
}

/// Connection settings for the S3 client. Anything left `None` falls back to
/// the SDK's default resolution (environment, shared config, instance role).
#[derive(Debug, Clone, Default)]
pub struct S3Settings {
    pub endpoint_url: Option<String>,
    pub region: Option<String>,
    pub credentials: Option<StaticCredentials>,
    pub force_path_style: bool,
}

#[derive(Debug, Clone)]
pub struct RestoreConfig {
    pub bucket: String,
    pub reference_timestamp: DateTime<Utc>,
    pub prefix: Option<String>,
    pub page_size: i32,
    pub dry_run: bool,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub restore: RestoreConfig,
    pub s3: S3Settings,
    pub timeout: Option<Duration>,
}

impl AppConfig {
    /// Reads the optional config file and the endpoint environment variable,
    /// then merges them under the command-line arguments.
    pub fn load(args: &Args) -> Result<Self> {
        let file_config = match &args.config {
            Some(path) => Some(load_json_config(path)?),
            None => None,
        };
        let env_endpoint = std::env::var(ENDPOINT_ENV_VAR).ok();
        Self::from_sources(args, file_config, env_endpoint)
    }

    /// Precedence is command line, then config file, then environment.
    pub fn from_sources(
        args: &Args,
        file_config: Option<RawJsonConfig>,
        env_endpoint: Option<String>,
    ) -> Result<Self> {
        let file_config = file_config.unwrap_or_default();
        let storage = file_config.s3_storage.unwrap_or_default();

        if args.bucket.trim().is_empty() {
            return Err(AppError::InvalidInput("bucket name cannot be empty".to_string()));
        }
        let reference_timestamp = parse_reference_timestamp(&args.timestamp)?;

        let page_size = args
            .page_size
            .or(file_config.page_size)
            .unwrap_or(DEFAULT_PAGE_SIZE);
        if !(1..=DEFAULT_PAGE_SIZE).contains(&page_size) {
            return Err(AppError::Config(format!(
                "page_size must be between 1 and {}, got {}",
                DEFAULT_PAGE_SIZE, page_size
            )));
        }

        let endpoint_url = non_empty(args.endpoint_url.clone())
            .or_else(|| non_empty(storage.endpoint_url.clone()))
            .or_else(|| non_empty(env_endpoint))
            .map(|url| validate_endpoint_url(&url))
            .transpose()?;

        let credentials = match (
            non_empty(storage.access_key_id.clone()),
            non_empty(storage.secret_access_key.clone()),
        ) {
            (Some(access_key_id), Some(secret_access_key)) => Some(StaticCredentials {
                access_key_id,
                secret_access_key,
            }),
            (None, None) => None,
            _ => {
                return Err(AppError::Config(
                    "s3_storage must set both access_key_id and secret_access_key, or neither"
                        .to_string(),
                ));
            }
        };

        // S3-compatible endpoints rarely support virtual-hosted buckets.
        let force_path_style = storage
            .force_path_style
            .unwrap_or(endpoint_url.is_some());

        Ok(AppConfig {
            restore: RestoreConfig {
                bucket: args.bucket.trim().to_string(),
                reference_timestamp,
                prefix: key_prefix(args.prefix.clone()).or_else(|| key_prefix(file_config.prefix)),
                page_size,
                dry_run: args.dry_run,
            },
            s3: S3Settings {
                endpoint_url,
                region: non_empty(args.region.clone()).or_else(|| non_empty(storage.region)),
                credentials,
                force_path_style,
            },
            timeout: args.timeout_secs.map(Duration::from_secs),
        })
    }
}

pub fn load_json_config(config_path: &Path) -> Result<RawJsonConfig> {
    let config_content = fs::read_to_string(config_path).map_err(|e| {
        AppError::Config(format!(
            "Failed to read config file at {}: {}",
            config_path.display(),
            e
        ))
    })?;
    serde_json::from_str(&config_content).map_err(|e| {
        AppError::Config(format!(
            "Failed to parse JSON from config file at {}: {}",
            config_path.display(),
            e
        ))
    })
}

pub fn parse_reference_timestamp(value: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value.trim())
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| AppError::InvalidInput(format!("invalid RFC3339 timestamp {:?}: {}", value, e)))
}

fn validate_endpoint_url(value: &str) -> Result<String> {
    let url = Url::parse(value)
        .map_err(|e| AppError::Config(format!("invalid endpoint URL {:?}: {}", value, e)))?;
    if !matches!(url.scheme(), "http" | "https") || url.host_str().is_none() {
        return Err(AppError::Config(format!(
            "endpoint URL must be http(s)://host[:port], got {:?}",
            value
        )));
    }
    Ok(value.trim_end_matches('/').to_string())
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|s| !s.trim().is_empty())
}

// Whitespace is a valid key prefix; only "" means the whole bucket.
fn key_prefix(value: Option<String>) -> Option<String> {
    value.filter(|s| !s.is_empty())
}
