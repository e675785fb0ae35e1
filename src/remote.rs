//! Remote object-storage capability
//!
//! The engine consumes listing and fetch as an abstract trait so the
//! reconciler and executor never touch the SDK directly; tests swap in
//! an in-memory store.

use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_sdk_s3::config::ProvideCredentials;
use aws_sdk_s3::error::{ProvideErrorMetadata, SdkError};
use aws_sdk_s3::Client as S3Client;
use bytes::Bytes;
use chrono::{DateTime, Utc};

use crate::error::{Result, SyncError};
use crate::types::RemoteObject;

/// Abstract remote store: listing and whole-object fetch
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// List all objects under a prefix. Pagination is handled
    /// internally; the full finite listing is returned.
    async fn list_objects(&self, bucket: &str, prefix: &str) -> Result<Vec<RemoteObject>>;

    /// Fetch one object's full body
    async fn get_object(&self, bucket: &str, key: &str) -> Result<Bytes>;

    /// Check that a bucket exists and is accessible
    async fn bucket_exists(&self, bucket: &str) -> Result<bool>;
}

/// S3-backed implementation over the AWS SDK
pub struct S3ObjectStore {
    client: S3Client,
}

impl S3ObjectStore {
    /// Establish a client from the ambient AWS environment (env vars,
    /// profile, instance metadata). Credentials are resolved eagerly
    /// so a missing or broken credential chain surfaces as a
    /// connection error before any listing is attempted.
    pub async fn connect() -> Result<Self> {
        let config = aws_config::defaults(BehaviorVersion::latest()).load().await;
        let provider = config.credentials_provider().ok_or_else(|| {
            SyncError::Connection("no AWS credentials provider configured".to_string())
        })?;
        provider.provide_credentials().await.map_err(|e| {
            SyncError::Connection(format!("cannot resolve AWS credentials: {e}"))
        })?;
        Ok(Self {
            client: S3Client::new(&config),
        })
    }

    /// Wrap an existing client (custom endpoint, tests against minio)
    pub fn from_client(client: S3Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ObjectStore for S3ObjectStore {
    async fn list_objects(&self, bucket: &str, prefix: &str) -> Result<Vec<RemoteObject>> {
        let mut objects = Vec::new();
        let mut pages = self
            .client
            .list_objects_v2()
            .bucket(bucket)
            .prefix(prefix)
            .into_paginator()
            .send();

        while let Some(page) = pages.next().await {
            let page = page.map_err(|e| SyncError::Listing {
                bucket: bucket.to_string(),
                prefix: prefix.to_string(),
                message: sdk_error_message(&e),
            })?;

            for obj in page.contents() {
                objects.push(RemoteObject {
                    bucket: bucket.to_string(),
                    key: obj.key().unwrap_or_default().to_string(),
                    size: obj.size().unwrap_or(0).max(0) as u64,
                    last_modified: obj.last_modified().and_then(to_chrono),
                    etag: obj.e_tag().map(String::from),
                });
            }
        }

        tracing::debug!(bucket, prefix, count = objects.len(), "listed objects");
        Ok(objects)
    }

    async fn get_object(&self, bucket: &str, key: &str) -> Result<Bytes> {
        let response = self
            .client
            .get_object()
            .bucket(bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| transfer_error(key, &e))?;

        let data = response
            .body
            .collect()
            .await
            .map_err(|e| SyncError::transfer_transient(key, e.to_string()))?;

        Ok(data.into_bytes())
    }

    async fn bucket_exists(&self, bucket: &str) -> Result<bool> {
        match self.client.head_bucket().bucket(bucket).send().await {
            Ok(_) => Ok(true),
            Err(e) => {
                let service_error = e.into_service_error();
                if service_error.is_not_found() {
                    Ok(false)
                } else {
                    Err(SyncError::Connection(service_error.to_string()))
                }
            }
        }
    }
}

fn to_chrono(dt: &aws_sdk_s3::primitives::DateTime) -> Option<DateTime<Utc>> {
    DateTime::<Utc>::from_timestamp(dt.secs(), dt.subsec_nanos())
}

fn sdk_error_message<E>(err: &SdkError<E>) -> String
where
    E: ProvideErrorMetadata + std::fmt::Debug,
{
    err.message()
        .map(String::from)
        .unwrap_or_else(|| format!("{err:?}"))
}

/// Classify an SDK failure into a transient or permanent transfer
/// error. Dispatch/timeout failures and throttling codes are transient;
/// everything else (access denied, missing key) is permanent.
fn transfer_error<E>(key: &str, err: &SdkError<E>) -> SyncError
where
    E: ProvideErrorMetadata + std::fmt::Debug,
{
    let message = sdk_error_message(err);
    let retryable = match err {
        SdkError::TimeoutError(_) | SdkError::DispatchFailure(_) | SdkError::ResponseError(_) => {
            true
        }
        SdkError::ServiceError(_) => matches!(
            err.code(),
            Some("SlowDown")
                | Some("RequestTimeout")
                | Some("InternalError")
                | Some("ServiceUnavailable")
                | Some("Throttling")
                | Some("ThrottlingException")
        ),
        _ => false,
    };

    SyncError::Transfer {
        key: key.to_string(),
        message,
        retryable,
    }
}
