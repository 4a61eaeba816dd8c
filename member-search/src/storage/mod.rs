use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_sdk_s3::{primitives::ByteStream, Client as AwsS3SdkClient};
use bytes::Bytes;
use thiserror::Error;

pub mod profile_pictures;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ObjectStoreError {
    #[error("object storage operation failed: {0}")]
    OperationFailed(String),
}

/// Object storage used for member uploads. Both the S3 client and the test
/// mock implement it.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    async fn put_object(
        &self,
        bucket: &str,
        key: &str,
        body: Bytes,
        content_type: &str,
    ) -> Result<(), ObjectStoreError>;

    async fn delete_object(&self, bucket: &str, key: &str) -> Result<(), ObjectStoreError>;

    /// Publicly readable URL of an object in a public bucket.
    fn public_url(&self, bucket: &str, key: &str) -> String;
}

pub struct S3ObjectStore {
    client: AwsS3SdkClient,
    public_base_url: String,
}

impl S3ObjectStore {
    pub fn new(client: AwsS3SdkClient, public_base_url: String) -> Self {
        Self {
            client,
            public_base_url: public_base_url.trim_end_matches('/').to_string(),
        }
    }

    /// Builds the SDK client from the environment's credentials. A custom
    /// endpoint (MinIO, the hosted storage gateway) needs path-style addressing.
    pub async fn from_env(region: &str, endpoint: Option<&str>, public_base_url: String) -> Self {
        let mut aws_config_builder = aws_config::defaults(BehaviorVersion::latest())
            .region(aws_config::Region::new(region.to_string()));

        if let Some(endpoint) = endpoint {
            aws_config_builder = aws_config_builder.endpoint_url(endpoint);
        }

        let aws_config = aws_config_builder.load().await;

        let mut s3_config_builder = aws_sdk_s3::config::Builder::from(&aws_config);
        if endpoint.is_some() {
            s3_config_builder = s3_config_builder.force_path_style(true);
        }

        Self::new(
            AwsS3SdkClient::from_conf(s3_config_builder.build()),
            public_base_url,
        )
    }
}

#[async_trait]
impl ObjectStore for S3ObjectStore {
    async fn put_object(
        &self,
        bucket: &str,
        key: &str,
        body: Bytes,
        content_type: &str,
    ) -> Result<(), ObjectStoreError> {
        self.client
            .put_object()
            .bucket(bucket)
            .key(key)
            .content_type(content_type)
            .cache_control("max-age=3600")
            .body(ByteStream::from(body))
            .send()
            .await
            .map_err(|e| {
                ObjectStoreError::OperationFailed(format!(
                    "failed to put object {bucket}/{key}: {}",
                    e.into_service_error()
                ))
            })?;
        Ok(())
    }

    async fn delete_object(&self, bucket: &str, key: &str) -> Result<(), ObjectStoreError> {
        self.client
            .delete_object()
            .bucket(bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| {
                ObjectStoreError::OperationFailed(format!(
                    "failed to delete object {bucket}/{key}: {}",
                    e.into_service_error()
                ))
            })?;
        Ok(())
    }

    fn public_url(&self, bucket: &str, key: &str) -> String {
        format!("{}/{}/{}", self.public_base_url, bucket, key)
    }
}
