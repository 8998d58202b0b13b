//! Publishing of archives and extraction artifacts to object storage
//!
//! Keys come from [`crate::storage::paths`]. Metadata JSON is always written
//! after the payload it describes.

use ipeds_common::Result;
use serde::Serialize;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, instrument, warn};

use crate::download::models::TransferRecord;
use crate::extract::models::ExtractionManifest;
use crate::storage::{paths, ObjectStore, JSON_CONTENT_TYPE};

/// Locations written by [`Publisher::publish_extraction`]
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PublishResult {
    pub uploaded_locations: Vec<String>,
    pub manifest_location: String,
}

pub struct Publisher {
    store: Arc<dyn ObjectStore>,
    upload_timeout: Duration,
}

impl Publisher {
    pub fn new(store: Arc<dyn ObjectStore>, upload_timeout: Duration) -> Self {
        Self { store, upload_timeout }
    }

    pub fn store(&self) -> &Arc<dyn ObjectStore> {
        &self.store
    }

    /// Upload a downloaded archive, then its sidecar metadata.
    ///
    /// Returns the record with its storage location filled in.
    #[instrument(skip(self, record), fields(filename = %record.filename))]
    pub async fn publish_archive(
        &self,
        local_path: &Path,
        year: u16,
        mut record: TransferRecord,
    ) -> Result<TransferRecord> {
        let key = paths::archive_key(year, &record.filename);
        self.store.upload_file(&key, local_path, self.upload_timeout).await?;
        record.storage_location = self.store.uri(&key);

        let sidecar = serde_json::to_vec_pretty(&record)?;
        self.store
            .write_bytes(&paths::archive_metadata_key(year), sidecar, JSON_CONTENT_TYPE)
            .await?;

        info!("Published {} to {}", record.filename, record.storage_location);
        Ok(record)
    }

    /// Upload every `<local_dir>/<table>.parquet` that still exists, fill in
    /// the matching record's storage location, then upload the manifest.
    ///
    /// Records whose artifact is missing locally are left untouched.
    #[instrument(skip(self, manifest), fields(tables = manifest.table_metadata.len()))]
    pub async fn publish_extraction(
        &self,
        local_dir: &Path,
        manifest: &mut ExtractionManifest,
        run: &str,
    ) -> Result<PublishResult> {
        let mut uploaded_locations = Vec::new();

        for record in manifest.table_metadata.iter_mut() {
            let local_path = local_dir.join(format!("{}.parquet", record.table_name));
            if !tokio::fs::try_exists(&local_path).await? {
                warn!("Artifact for {} is missing locally, skipping upload", record.table_name);
                continue;
            }

            let key = paths::table_key(run, &record.table_name);
            self.store.upload_file(&key, &local_path, self.upload_timeout).await?;
            record.storage_location = self.store.uri(&key);
            uploaded_locations.push(record.storage_location.clone());
        }

        let manifest_key = paths::manifest_key(run);
        let body = serde_json::to_vec_pretty(manifest)?;
        self.store.write_bytes(&manifest_key, body, JSON_CONTENT_TYPE).await?;
        let manifest_location = self.store.uri(&manifest_key);

        info!(
            "Published {} table artifacts and manifest to {}",
            uploaded_locations.len(),
            manifest_location
        );

        Ok(PublishResult {
            uploaded_locations,
            manifest_location,
        })
    }
}
