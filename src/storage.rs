use crate::{domain::FileStorage, errors::StorageError};
use anyhow::Context;
use async_trait::async_trait;
use aws_sdk_s3::{Client as S3Client, error::SdkError, primitives::ByteStream};
use tracing;

#[derive(Debug, Clone)]
pub struct S3FileStorage {
    client: S3Client,
    bucket_name: String,
    public_base_url: String,
}

impl S3FileStorage {
    pub fn new(client: S3Client, bucket_name: String, public_base_url: String) -> Self {
        Self {
            client,
            bucket_name,
            public_base_url,
        }
    }
}

#[async_trait]
impl FileStorage for S3FileStorage {
    /// Probes object metadata with HeadObject.
    async fn exists(&self, key: &str) -> Result<bool, StorageError> {
        tracing::debug!(s3_key = %key, bucket = %self.bucket_name, "S3: Checking object existence");

        match self.client
            .head_object()
            .bucket(&self.bucket_name)
            .key(key)
            .send()
            .await
        {
            Ok(_) => Ok(true),
            Err(sdk_err) => {
                if let SdkError::ServiceError(service_err) = &sdk_err {
                    if service_err.err().is_not_found() {
                        return Ok(false);
                    }
                }
                tracing::error!(s3_key = %key, bucket = %self.bucket_name, error = %sdk_err, "S3: Error checking object existence");
                Err(StorageError::Unavailable(
                    anyhow::Error::new(sdk_err)
                        .context(format!("S3: Failed to head object with key '{}'", key)),
                ))
            }
        }
    }

    /// Uploads data with PutObject. `If-None-Match: *` makes the key
    /// write-once even when two first-time uploads race.
    async fn upload(
        &self,
        key: &str,
        data: Vec<u8>,
        content_type: Option<String>,
    ) -> Result<(), StorageError> {
        let ct = content_type.unwrap_or_else(|| "application/octet-stream".to_string());
        tracing::debug!(s3_key = %key, bucket = %self.bucket_name, content_type = %ct, "S3: Uploading file");

        let body = ByteStream::from(data);
        self.client
            .put_object()
            .bucket(&self.bucket_name)
            .key(key)
            .body(body)
            .content_type(ct)
            .if_none_match("*")
            .send()
            .await
            .map_err(|sdk_err| {
                if let SdkError::ServiceError(service_err) = &sdk_err {
                    if service_err.err().meta().code() == Some("PreconditionFailed") {
                        tracing::warn!(s3_key = %key, bucket = %self.bucket_name, "S3: Object already exists, upload rejected");
                        return StorageError::DuplicateSubmission(key.to_string());
                    }
                }
                tracing::error!(s3_key = %key, bucket = %self.bucket_name, error = %sdk_err, "S3: Error uploading file");
                StorageError::Unavailable(
                    anyhow::Error::new(sdk_err)
                        .context(format!("S3: Failed to upload object with key '{}'", key)),
                )
            })?;

        tracing::debug!(s3_key = %key, bucket = %self.bucket_name, "S3: Upload successful");
        Ok(())
    }

    /// Downloads file data and its content type from S3 using GetObject.
    async fn download(&self, key: &str) -> Result<(ByteStream, Option<String>), StorageError> {
        tracing::debug!(s3_key = %key, bucket = %self.bucket_name, "S3: Downloading file");

        let output = self.client
            .get_object()
            .bucket(&self.bucket_name)
            .key(key)
            .send()
            .await
            .map_err(|sdk_err| {
                // Check specifically for NoSuchKey
                if let SdkError::ServiceError(service_err) = &sdk_err {
                    if service_err.err().meta().code() == Some("NoSuchKey") {
                        tracing::warn!(s3_key = %key, bucket = %self.bucket_name, "S3: NoSuchKey error downloading file");
                        return StorageError::NotFound(key.to_string());
                    }
                }
                tracing::error!(s3_key = %key, bucket = %self.bucket_name, error = %sdk_err, "S3: Error downloading file");
                StorageError::Unavailable(
                    anyhow::Error::new(sdk_err)
                        .context(format!("S3: Failed to download object with key '{}'", key)),
                )
            })?;

        let content_type = output.content_type().map(|s| s.to_string());
        tracing::debug!(s3_key = %key, bucket = %self.bucket_name, ?content_type, "S3: Download successful");

        Ok((output.body, content_type))
    }

    /// Images are served by this service's own `/images/{key}` route.
    fn url(&self, key: &str) -> String {
        format!("{}/images/{}", self.public_base_url, key)
    }
}
