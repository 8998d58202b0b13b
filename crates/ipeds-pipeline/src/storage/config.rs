use ipeds_common::{PipelineError, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Which object store implementation backs the pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    #[default]
    S3,
    Local,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub backend: StorageBackend,
    pub endpoint: Option<String>,
    pub region: String,
    pub bucket: String,
    pub access_key: Option<String>,
    pub secret_key: Option<String>,
    pub path_style: bool,
    /// Root directory for the local backend
    pub local_root: Option<PathBuf>,
    /// Upper bound for a single file upload, in seconds
    pub upload_timeout_secs: u64,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: StorageBackend::S3,
            endpoint: None,
            region: "us-east-1".to_string(),
            bucket: String::new(),
            access_key: None,
            secret_key: None,
            path_style: false,
            local_root: None,
            upload_timeout_secs: 300,
        }
    }
}

impl StorageConfig {
    pub fn for_minio(endpoint: impl Into<String>, bucket: impl Into<String>) -> Self {
        Self {
            endpoint: Some(endpoint.into()),
            bucket: bucket.into(),
            access_key: Some("minioadmin".to_string()),
            secret_key: Some("minioadmin".to_string()),
            path_style: true,
            ..Self::default()
        }
    }

    /// Strip a `s3://` or `gs://` scheme and trailing slashes from the bucket
    pub fn bucket_name(&self) -> &str {
        self.bucket
            .trim_start_matches("s3://")
            .trim_start_matches("gs://")
            .trim_end_matches('/')
    }

    pub fn validate(&self) -> Result<()> {
        match self.backend {
            StorageBackend::S3 => {
                if self.bucket_name().is_empty() {
                    return Err(PipelineError::configuration(
                        "storage.bucket is required for the s3 backend",
                    ));
                }
                if self.access_key.is_some() != self.secret_key.is_some() {
                    return Err(PipelineError::configuration(
                        "storage.access_key and storage.secret_key must be set together",
                    ));
                }
            },
            StorageBackend::Local => {
                if self.local_root.is_none() {
                    return Err(PipelineError::configuration(
                        "storage.local_root is required for the local backend",
                    ));
                }
            },
        }

        if self.upload_timeout_secs == 0 {
            return Err(PipelineError::configuration(
                "storage.upload_timeout_secs must be greater than 0",
            ));
        }

        Ok(())
    }
}
