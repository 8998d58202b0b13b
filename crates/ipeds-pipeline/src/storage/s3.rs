use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_sdk_s3::{
    config::{Credentials, Region},
    error::SdkError,
    operation::get_object::GetObjectError,
    primitives::ByteStream,
    Client,
};
use ipeds_common::{PipelineError, Result};
use std::path::Path;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, instrument};

use super::{config::StorageConfig, ObjectStore};

/// S3-compatible object store (AWS, MinIO, GCS interoperability endpoint)
#[derive(Clone)]
pub struct S3Storage {
    client: Client,
    bucket: String,
}

impl S3Storage {
    pub async fn new(config: &StorageConfig) -> Result<Self> {
        debug!(
            bucket = config.bucket_name(),
            endpoint = ?config.endpoint,
            region = %config.region,
            "Initializing S3 storage"
        );

        let region = Region::new(config.region.clone());
        let mut loader = aws_config::defaults(BehaviorVersion::latest()).region(region);

        // Static keys win over the ambient credential chain
        if let (Some(access_key), Some(secret_key)) = (&config.access_key, &config.secret_key) {
            loader = loader.credentials_provider(Credentials::new(
                access_key,
                secret_key,
                None,
                None,
                "ipeds-pipeline",
            ));
        }

        let sdk_config = loader.load().await;
        let mut builder =
            aws_sdk_s3::config::Builder::from(&sdk_config).force_path_style(config.path_style);

        if let Some(endpoint) = &config.endpoint {
            builder = builder.endpoint_url(endpoint);
        }

        let client = Client::from_conf(builder.build());

        info!("Storage client initialized for bucket: {}", config.bucket_name());

        Ok(Self {
            client,
            bucket: config.bucket_name().to_string(),
        })
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    fn get_object_error(&self, key: &str, e: SdkError<GetObjectError>) -> PipelineError {
        if e.as_service_error().is_some_and(|se| se.is_no_such_key()) {
            PipelineError::not_found(format!("s3://{}/{}", self.bucket, key))
        } else {
            PipelineError::storage(format!("Failed to download s3://{}/{}: {}", self.bucket, key, e))
        }
    }

    async fn stream_to_file(&self, key: &str, local_path: &Path) -> Result<u64> {
        let response = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| self.get_object_error(key, e))?;

        let mut body = response.body;
        let mut file = tokio::fs::File::create(local_path).await?;
        let mut written = 0u64;

        while let Some(chunk) = body
            .try_next()
            .await
            .map_err(|e| PipelineError::storage(format!("Failed to read S3 response body: {}", e)))?
        {
            file.write_all(&chunk).await?;
            written += chunk.len() as u64;
        }
        file.flush().await?;

        Ok(written)
    }
}

#[async_trait]
impl ObjectStore for S3Storage {
    #[instrument(skip(self))]
    async fn exists(&self, key: &str) -> Result<bool> {
        match self
            .client
            .head_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
        {
            Ok(_) => Ok(true),
            Err(e) => {
                if e.as_service_error().is_some_and(|se| se.is_not_found()) {
                    Ok(false)
                } else {
                    Err(PipelineError::storage(format!(
                        "Failed to check existence of s3://{}/{}: {}",
                        self.bucket, key, e
                    )))
                }
            },
        }
    }

    #[instrument(skip(self))]
    async fn read_text(&self, key: &str) -> Result<String> {
        let response = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| self.get_object_error(key, e))?;

        let data = response
            .body
            .collect()
            .await
            .map_err(|e| PipelineError::storage(format!("Failed to read S3 response body: {}", e)))?
            .into_bytes();

        String::from_utf8(data.to_vec())
            .map_err(|e| PipelineError::storage(format!("s3://{}/{} is not UTF-8: {}", self.bucket, key, e)))
    }

    #[instrument(skip(self, data))]
    async fn write_bytes(&self, key: &str, data: Vec<u8>, content_type: &str) -> Result<()> {
        debug!("Uploading {} bytes to s3://{}/{}", data.len(), self.bucket, key);

        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .content_type(content_type)
            .body(ByteStream::from(data))
            .send()
            .await
            .map_err(|e| PipelineError::storage(format!("Failed to upload s3://{}/{}: {}", self.bucket, key, e)))?;

        info!("Successfully uploaded to s3://{}/{}", self.bucket, key);
        Ok(())
    }

    #[instrument(skip(self))]
    async fn upload_file(&self, key: &str, local_path: &Path, timeout: Duration) -> Result<()> {
        let body = ByteStream::from_path(local_path).await.map_err(|e| {
            PipelineError::storage(format!("Failed to open {}: {}", local_path.display(), e))
        })?;

        let request = self
            .client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .body(body)
            .send();

        tokio::time::timeout(timeout, request)
            .await
            .map_err(|_| {
                PipelineError::storage(format!(
                    "Upload of {} timed out after {:?}",
                    local_path.display(),
                    timeout
                ))
            })?
            .map_err(|e| PipelineError::storage(format!("Failed to upload s3://{}/{}: {}", self.bucket, key, e)))?;

        info!("Successfully uploaded {} to s3://{}/{}", local_path.display(), self.bucket, key);
        Ok(())
    }

    #[instrument(skip(self))]
    async fn download_file(&self, key: &str, local_path: &Path, timeout: Duration) -> Result<()> {
        let result = match tokio::time::timeout(timeout, self.stream_to_file(key, local_path)).await {
            Ok(result) => result,
            Err(_) => Err(PipelineError::storage(format!(
                "Download of s3://{}/{} timed out after {:?}",
                self.bucket, key, timeout
            ))),
        };

        match result {
            Ok(bytes) => {
                info!("Downloaded {} bytes from s3://{}/{}", bytes, self.bucket, key);
                Ok(())
            },
            Err(e) => {
                // No half-written copy left behind
                let _ = tokio::fs::remove_file(local_path).await;
                Err(e)
            },
        }
    }

    #[instrument(skip(self))]
    async fn list_some(&self, prefix: &str, max: usize) -> Result<Vec<String>> {
        let response = self
            .client
            .list_objects_v2()
            .bucket(&self.bucket)
            .prefix(prefix)
            .max_keys(i32::try_from(max).unwrap_or(i32::MAX))
            .send()
            .await
            .map_err(|e| PipelineError::storage(format!("Failed to list s3://{}/{}: {}", self.bucket, prefix, e)))?;

        Ok(response
            .contents()
            .iter()
            .filter_map(|obj| obj.key().map(|k| k.to_string()))
            .collect())
    }

    fn uri(&self, key: &str) -> String {
        format!("s3://{}/{}", self.bucket, key)
    }
}
