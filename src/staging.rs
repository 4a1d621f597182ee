//! CSV staging to object storage.
//!
//! A batch becomes one CSV object under `<prefix>/<table>_<unix seconds>.csv`.
//! Keys are not checked for collisions.

use crate::batch::Batch;
use async_trait::async_trait;
use aws_sdk_s3::primitives::ByteStream;
use chrono::Utc;
use std::io::Write;
use std::sync::Arc;
use thiserror::Error;
use tracing::info;

#[derive(Error, Debug)]
pub enum StagingError {
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Upload to s3://{bucket}/{key} failed: {message}")]
    Upload {
        bucket: String,
        key: String,
        message: String,
    },

    #[error("Refusing to stage an empty batch")]
    EmptyBatch,
}

/// Write-only object storage
#[async_trait]
pub trait ObjectStore: Send + Sync {
    async fn put_object(&self, bucket: &str, key: &str, body: Vec<u8>) -> Result<(), StagingError>;
}

pub struct S3ObjectStore {
    client: aws_sdk_s3::Client,
}

impl S3ObjectStore {
    pub fn new(client: aws_sdk_s3::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ObjectStore for S3ObjectStore {
    async fn put_object(&self, bucket: &str, key: &str, body: Vec<u8>) -> Result<(), StagingError> {
        self.client
            .put_object()
            .bucket(bucket)
            .key(key)
            .content_type("text/csv")
            .body(ByteStream::from(body))
            .send()
            .await
            .map_err(|e| StagingError::Upload {
                bucket: bucket.to_string(),
                key: key.to_string(),
                message: aws_sdk_s3::error::DisplayErrorContext(&e).to_string(),
            })?;
        Ok(())
    }
}

/// Staging key for a table at a given second
pub fn object_key(prefix: &str, table: &str, unix_seconds: i64) -> String {
    let prefix = prefix.trim_end_matches('/');
    if prefix.is_empty() {
        format!("{}_{}.csv", table, unix_seconds)
    } else {
        format!("{}/{}_{}.csv", prefix, table, unix_seconds)
    }
}

/// Serialize a batch as CSV with a header row.
pub fn write_csv<W: Write>(batch: &Batch, writer: W) -> Result<(), StagingError> {
    let mut csv_writer = csv::Writer::from_writer(writer);
    for row in batch.rows() {
        csv_writer.serialize(row)?;
    }
    csv_writer.flush()?;
    Ok(())
}

pub fn to_csv_bytes(batch: &Batch) -> Result<Vec<u8>, StagingError> {
    let mut buf = Vec::new();
    write_csv(batch, &mut buf)?;
    Ok(buf)
}

type Clock = Box<dyn Fn() -> i64 + Send + Sync>;

pub struct StagingLoader {
    store: Arc<dyn ObjectStore>,
    bucket: String,
    prefix: String,
    clock: Clock,
}

impl StagingLoader {
    pub fn new(store: Arc<dyn ObjectStore>, bucket: &str, prefix: &str) -> Self {
        Self {
            store,
            bucket: bucket.to_string(),
            prefix: prefix.to_string(),
            clock: Box::new(|| Utc::now().timestamp()),
        }
    }

    /// Replace the wall clock used for key timestamps
    pub fn with_clock<F>(mut self, clock: F) -> Self
    where
        F: Fn() -> i64 + Send + Sync + 'static,
    {
        self.clock = Box::new(clock);
        self
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    /// Write the batch as one new object and return its key.
    pub async fn stage(&self, batch: &Batch, table: &str) -> Result<String, StagingError> {
        if batch.is_empty() {
            return Err(StagingError::EmptyBatch);
        }

        let key = object_key(&self.prefix, table, (self.clock)());
        let body = to_csv_bytes(batch)?;

        info!(
            "Uploading {} rows ({} bytes) to S3 at s3://{}/{}",
            batch.len(),
            body.len(),
            self.bucket,
            key
        );
        self.store.put_object(&self.bucket, &key, body).await?;
        info!("Data successfully uploaded to S3 at {}", key);

        Ok(key)
    }
}
