// s3-version-restore/src/storage/s3_client.rs
use async_trait::async_trait;
use aws_sdk_s3 as s3;
use chrono::{DateTime, Utc};
use s3::config::{BehaviorVersion, Credentials, Region};
use s3::error::DisplayErrorContext;
use url::form_urlencoded;

use super::{
    ListVersionsRequest, ObjectVersionEntry, StorageError, StorageResult, VersionPage,
    VersionStore,
};
use crate::config::S3Settings;

/// `VersionStore` backed by the AWS SDK. Works against AWS S3 and any
/// S3-compatible endpoint that supports bucket versioning.
#[derive(Clone)]
pub struct S3VersionStore {
    client: s3::Client,
}

impl S3VersionStore {
    pub fn new(client: s3::Client) -> Self {
        Self { client }
    }

    /// Builds a client from the SDK default chain, overridden by whatever
    /// `settings` provides (endpoint, region, static credentials).
    pub async fn connect(settings: &S3Settings) -> Self {
        let mut loader = aws_config::defaults(BehaviorVersion::latest());
        if let Some(endpoint_url) = &settings.endpoint_url {
            loader = loader.endpoint_url(endpoint_url);
        }
        if let Some(region) = &settings.region {
            loader = loader.region(Region::new(region.clone()));
        }
        if let Some(credentials) = &settings.credentials {
            loader = loader.credentials_provider(Credentials::new(
                &credentials.access_key_id,
                &credentials.secret_access_key,
                None, // session_token
                None, // expiry
                "Static", // provider_name
            ));
        }
        let sdk_config = loader.load().await;

        let s3_config = s3::config::Builder::from(&sdk_config)
            .force_path_style(settings.force_path_style)
            .build();
        tracing::debug!(
            endpoint = ?settings.endpoint_url,
            region = ?sdk_config.region().map(|r| r.to_string()),
            path_style = settings.force_path_style,
            "initialized s3 client"
        );
        Self::new(s3::Client::from_conf(s3_config))
    }
}

#[async_trait]
impl VersionStore for S3VersionStore {
    // Needs s3:ListBucketVersions.
    async fn list_versions_page(&self, request: &ListVersionsRequest) -> StorageResult<VersionPage> {
        let output = self
            .client
            .list_object_versions()
            .bucket(&request.bucket)
            .set_prefix(request.prefix.clone())
            .set_key_marker(request.key_marker.clone())
            .set_version_id_marker(request.version_id_marker.clone())
            .max_keys(request.max_keys)
            .send()
            .await
            .map_err(|e| {
                StorageError::Sdk(format!(
                    "listing object versions of {}: {}",
                    request.bucket,
                    DisplayErrorContext(&e)
                ))
            })?;

        let versions = output
            .versions()
            .iter()
            .map(|v| {
                Ok(ObjectVersionEntry {
                    key: required(v.key(), "Version.Key")?,
                    version_id: required(v.version_id(), "Version.VersionId")?,
                    last_modified: to_utc(v.last_modified(), "Version.LastModified")?,
                    is_latest: v.is_latest().unwrap_or(false),
                    etag: v.e_tag().map(str::to_string),
                })
            })
            .collect::<StorageResult<Vec<_>>>()?;

        let delete_markers = output
            .delete_markers()
            .iter()
            .map(|m| {
                Ok(ObjectVersionEntry {
                    key: required(m.key(), "DeleteMarker.Key")?,
                    version_id: required(m.version_id(), "DeleteMarker.VersionId")?,
                    last_modified: to_utc(m.last_modified(), "DeleteMarker.LastModified")?,
                    is_latest: m.is_latest().unwrap_or(false),
                    etag: None,
                })
            })
            .collect::<StorageResult<Vec<_>>>()?;

        Ok(VersionPage {
            versions,
            delete_markers,
            is_truncated: output.is_truncated().unwrap_or(false),
            next_key_marker: output.next_key_marker().map(str::to_string),
            next_version_id_marker: output.next_version_id_marker().map(str::to_string),
        })
    }

    async fn copy_version(
        &self,
        source_bucket: &str,
        dest_bucket: &str,
        key: &str,
        source_version_id: &str,
    ) -> StorageResult<()> {
        let source = copy_source(source_bucket, key, source_version_id);
        self.client
            .copy_object()
            .copy_source(&source)
            .bucket(dest_bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| {
                StorageError::Sdk(format!("copying object {}: {}", source, DisplayErrorContext(&e)))
            })?;
        Ok(())
    }

    async fn delete_current_version(&self, bucket: &str, key: &str) -> StorageResult<()> {
        self.client
            .delete_object()
            .bucket(bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| {
                StorageError::Sdk(format!(
                    "deleting object {}/{}: {}",
                    bucket,
                    key,
                    DisplayErrorContext(&e)
                ))
            })?;
        Ok(())
    }
}

fn required(value: Option<&str>, field: &str) -> StorageResult<String> {
    value
        .map(str::to_string)
        .ok_or_else(|| StorageError::InvalidResponse(format!("{} missing", field)))
}

fn to_utc(value: Option<&s3::primitives::DateTime>, field: &str) -> StorageResult<DateTime<Utc>> {
    let value = value.ok_or_else(|| StorageError::InvalidResponse(format!("{} missing", field)))?;
    DateTime::<Utc>::from_timestamp(value.secs(), value.subsec_nanos()).ok_or_else(|| {
        StorageError::InvalidResponse(format!("{} out of range: {}", field, value))
    })
}

/// `CopySource` value for one version: `bucket/key?versionId=id`, with the key
/// and version id URL-encoded as `CopyObject` requires.
fn copy_source(bucket: &str, key: &str, version_id: &str) -> String {
    format!(
        "{}/{}?versionId={}",
        bucket,
        encode_component(key),
        encode_component(version_id)
    )
}

// form encoding writes spaces as '+', which S3 would read back as a literal plus.
fn encode_component(value: &str) -> String {
    form_urlencoded::byte_serialize(value.as_bytes())
        .collect::<String>()
        .replace('+', "%20")
}
