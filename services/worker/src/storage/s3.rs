use super::ObjectStore;
use crate::config::S3Config;
use crate::error::{IngestError, Result};
use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_sdk_s3::config::Builder as S3ConfigBuilder;
use aws_sdk_s3::error::DisplayErrorContext;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::Client as S3Client;
use bytes::Bytes;
use tracing::{debug, info, instrument};

/// S3-backed object store
pub struct S3ObjectStore {
    client: S3Client,
}

impl S3ObjectStore {
    /// Create a new store from service configuration
    pub async fn new(config: &S3Config) -> anyhow::Result<Self> {
        let aws_config = aws_config::defaults(BehaviorVersion::latest())
            .region(aws_config::Region::new(config.region.clone()))
            .load()
            .await;

        let mut s3_config_builder = S3ConfigBuilder::from(&aws_config);

        // Configure custom endpoint for MinIO/LocalStack
        if let Some(ref endpoint_url) = config.endpoint_url {
            s3_config_builder = s3_config_builder.endpoint_url(endpoint_url);
        }

        if config.force_path_style {
            s3_config_builder = s3_config_builder.force_path_style(true);
        }

        let client = S3Client::from_conf(s3_config_builder.build());

        info!(
            bucket = %config.bucket,
            region = %config.region,
            "S3 object store initialized"
        );

        Ok(Self { client })
    }
}

#[async_trait]
impl ObjectStore for S3ObjectStore {
    #[instrument(skip(self))]
    async fn get_object(&self, namespace: &str, key: &str) -> Result<Bytes> {
        let output = self
            .client
            .get_object()
            .bucket(namespace)
            .key(key)
            .send()
            .await
            .map_err(|e| {
                if e.as_service_error()
                    .map(|e| e.is_no_such_key())
                    .unwrap_or(false)
                {
                    IngestError::ObjectNotFound {
                        namespace: namespace.to_string(),
                        key: key.to_string(),
                    }
                } else {
                    IngestError::storage("get", namespace, key, DisplayErrorContext(&e).to_string())
                }
            })?;

        let body = output
            .body
            .collect()
            .await
            .map_err(|e| IngestError::storage("get", namespace, key, e.to_string()))?
            .into_bytes();

        debug!(size_bytes = body.len(), "Object downloaded");
        Ok(body)
    }

    #[instrument(skip(self, body), fields(size_bytes = body.len()))]
    async fn put_object(
        &self,
        namespace: &str,
        key: &str,
        body: Bytes,
        content_type: &str,
    ) -> Result<()> {
        self.client
            .put_object()
            .bucket(namespace)
            .key(key)
            .body(ByteStream::from(body))
            .content_type(content_type)
            .send()
            .await
            .map_err(|e| {
                IngestError::storage("put", namespace, key, DisplayErrorContext(&e).to_string())
            })?;

        debug!("Object uploaded");
        Ok(())
    }

    #[instrument(skip(self))]
    async fn delete_object(&self, namespace: &str, key: &str) -> Result<()> {
        // S3 reports success for keys that do not exist
        self.client
            .delete_object()
            .bucket(namespace)
            .key(key)
            .send()
            .await
            .map_err(|e| {
                IngestError::storage("delete", namespace, key, DisplayErrorContext(&e).to_string())
            })?;

        debug!("Object deleted");
        Ok(())
    }

    async fn object_exists(&self, namespace: &str, key: &str) -> Result<bool> {
        match self
            .client
            .head_object()
            .bucket(namespace)
            .key(key)
            .send()
            .await
        {
            Ok(_) => Ok(true),
            Err(e) => {
                if e.as_service_error()
                    .map(|e| e.is_not_found())
                    .unwrap_or(false)
                {
                    Ok(false)
                } else {
                    Err(IngestError::storage(
                        "head",
                        namespace,
                        key,
                        DisplayErrorContext(&e).to_string(),
                    ))
                }
            }
        }
    }
}
