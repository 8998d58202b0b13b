//! Durable object storage
//!
//! The pipeline only needs a narrow capability surface from its store, so it
//! talks to an [`ObjectStore`] trait object. [`S3Storage`] is the production
//! backend; [`LocalStorage`] mirrors the same key layout on a local directory.

use async_trait::async_trait;
use ipeds_common::{PipelineError, Result};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, instrument};

pub mod config;
pub mod local;
pub mod s3;

pub use config::{StorageBackend, StorageConfig};
pub use local::LocalStorage;
pub use s3::S3Storage;

pub const JSON_CONTENT_TYPE: &str = "application/json";

/// Capability surface required from durable storage
#[async_trait]
pub trait ObjectStore: Send + Sync {
    async fn exists(&self, key: &str) -> Result<bool>;

    async fn read_text(&self, key: &str) -> Result<String>;

    async fn write_bytes(&self, key: &str, data: Vec<u8>, content_type: &str) -> Result<()>;

    async fn upload_file(&self, key: &str, local_path: &Path, timeout: Duration) -> Result<()>;

    /// Copy the object at `key` to `local_path`. A missing object is `NotFound`.
    async fn download_file(&self, key: &str, local_path: &Path, timeout: Duration) -> Result<()>;

    /// List up to `max` keys under `prefix`. Used as a connectivity probe.
    async fn list_some(&self, prefix: &str, max: usize) -> Result<Vec<String>>;

    /// Fully qualified location of `key`, e.g. `s3://bucket/downloads/2023/...`
    fn uri(&self, key: &str) -> String;
}

/// Build the store selected by `config`
pub async fn connect(config: &StorageConfig) -> Result<Arc<dyn ObjectStore>> {
    config.validate()?;

    let store: Arc<dyn ObjectStore> = match config.backend {
        StorageBackend::S3 => Arc::new(S3Storage::new(config).await?),
        StorageBackend::Local => {
            let root = config.local_root.clone().ok_or_else(|| {
                PipelineError::configuration("storage.local_root is required for the local backend")
            })?;
            Arc::new(LocalStorage::new(root))
        },
    };

    info!(backend = ?config.backend, location = %store.uri(""), "Object store ready");
    Ok(store)
}

/// `s3://bucket/key` or `gs://bucket/key` reference to a stored object
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteLocation {
    pub bucket: String,
    pub key: String,
}

impl RemoteLocation {
    /// `None` for anything that is not a bucket URI with a non-empty key
    pub fn parse(location: &str) -> Option<Self> {
        let rest = location
            .strip_prefix("s3://")
            .or_else(|| location.strip_prefix("gs://"))?;
        let (bucket, key) = rest.split_once('/')?;
        let key = key.trim_start_matches('/');
        if bucket.is_empty() || key.is_empty() || key.ends_with('/') {
            return None;
        }
        Some(Self {
            bucket: bucket.to_string(),
            key: key.to_string(),
        })
    }
}

/// Copy a stored object into `<scratch_dir>/downloads/<file name>`
#[instrument(skip(store))]
pub async fn stage_locally(
    store: &dyn ObjectStore,
    key: &str,
    scratch_dir: &Path,
    timeout: Duration,
) -> Result<PathBuf> {
    if !store.exists(key).await? {
        return Err(PipelineError::not_found(store.uri(key)));
    }

    let name = key.rsplit('/').next().unwrap_or(key);
    let downloads = scratch_dir.join("downloads");
    tokio::fs::create_dir_all(&downloads).await?;
    let local_path = downloads.join(name);

    store.download_file(key, &local_path, timeout).await?;
    info!("Downloaded {} to {}", store.uri(key), local_path.display());
    Ok(local_path)
}

/// Deterministic key layout shared by the fetcher and the publisher
pub mod paths {
    pub fn archive_key(year: u16, filename: &str) -> String {
        format!("downloads/{}/{}", year, filename)
    }

    pub fn archive_metadata_key(year: u16) -> String {
        format!("downloads/{}/metadata.json", year)
    }

    pub fn table_key(run: &str, table_name: &str) -> String {
        format!("extracted/{}/tables/{}.parquet", run, table_name)
    }

    pub fn manifest_key(run: &str) -> String {
        format!("extracted/{}/metadata/extraction_manifest.json", run)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::paths::*;
    use super::RemoteLocation;

    #[test]
    fn test_remote_location_parse() {
        let location = RemoteLocation::parse("gs://ipeds-raw/downloads/2022/IPEDS202223.accdb").unwrap();
        assert_eq!(location.bucket, "ipeds-raw");
        assert_eq!(location.key, "downloads/2022/IPEDS202223.accdb");

        assert_eq!(RemoteLocation::parse("s3://b/k.accdb").unwrap().bucket, "b");
        assert_eq!(RemoteLocation::parse("/data/IPEDS202223.accdb"), None);
        assert_eq!(RemoteLocation::parse("s3://bucket-only"), None);
        assert_eq!(RemoteLocation::parse("s3://bucket/dir/"), None);
    }

    #[test]
    fn test_key_layout() {
        assert_eq!(archive_key(2023, "IPEDS2023_pv.zip"), "downloads/2023/IPEDS2023_pv.zip");
        assert_eq!(archive_metadata_key(2023), "downloads/2023/metadata.json");
        assert_eq!(table_key("2022", "HD2022"), "extracted/2022/tables/HD2022.parquet");
        assert_eq!(
            manifest_key("2022"),
            "extracted/2022/metadata/extraction_manifest.json"
        );
    }
}
