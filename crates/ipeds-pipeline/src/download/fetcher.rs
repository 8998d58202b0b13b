// Archive fetcher: "fetch year X, version V"

use ipeds_common::{PipelineError, Result};
use std::path::{Path, PathBuf};
use tracing::{debug, error, info, instrument, warn};

use super::models::{archive_filename, archive_url, ArchiveVersion, TransferRecord};
use super::transfer::HttpTransfer;
use crate::publish::Publisher;
use crate::storage::paths;

/// Result of [`ArchiveFetcher::fetch_archive`]. Failures are the `Err` arm.
#[derive(Debug, Clone, PartialEq)]
pub enum FetchOutcome {
    /// Already published; `record` is the stored sidecar when one exists
    Exists {
        record: Option<TransferRecord>,
        location: String,
    },
    /// Downloaded, verified and published in this call
    Success { record: TransferRecord, location: String },
}

impl FetchOutcome {
    pub fn status(&self) -> &'static str {
        match self {
            Self::Exists { .. } => "exists",
            Self::Success { .. } => "success",
        }
    }

    pub fn location(&self) -> &str {
        match self {
            Self::Exists { location, .. } | Self::Success { location, .. } => location,
        }
    }

    pub fn record(&self) -> Option<&TransferRecord> {
        match self {
            Self::Exists { record, .. } => record.as_ref(),
            Self::Success { record, .. } => Some(record),
        }
    }
}

pub struct ArchiveFetcher {
    base_url: String,
    temp_dir: PathBuf,
    transfer: HttpTransfer,
    publisher: Publisher,
}

impl ArchiveFetcher {
    pub fn new(
        base_url: impl Into<String>,
        temp_dir: impl Into<PathBuf>,
        transfer: HttpTransfer,
        publisher: Publisher,
    ) -> Self {
        Self {
            base_url: base_url.into(),
            temp_dir: temp_dir.into(),
            transfer,
            publisher,
        }
    }

    /// Download, verify and publish one archive unless it is already stored.
    ///
    /// With `force == false` the store is consulted before any network
    /// activity and an existing archive short-circuits the call.
    #[instrument(skip(self))]
    pub async fn fetch_archive(&self, year: u16, version: ArchiveVersion, force: bool) -> Result<FetchOutcome> {
        let filename = archive_filename(year, version);
        let key = paths::archive_key(year, &filename);
        let store = self.publisher.store();

        if !force && store.exists(&key).await? {
            let location = store.uri(&key);
            info!("{} already present at {}", filename, location);
            let record = self.read_sidecar(year).await?;
            return Ok(FetchOutcome::Exists { record, location });
        }

        let url = archive_url(&self.base_url, year, version);
        let scratch = self.temp_dir.join(format!("ipeds_{}", year));
        let local_path = scratch.join(&filename);

        let result = self.download_and_publish(&url, &local_path, year).await;
        remove_dir_if_empty(&scratch).await;

        match result {
            Ok(record) => {
                let location = record.storage_location.clone();
                Ok(FetchOutcome::Success { record, location })
            },
            Err(e) => {
                error!(kind = e.kind(), "Failed to fetch {}: {}", filename, e);
                Err(e)
            },
        }
    }

    async fn download_and_publish(&self, url: &str, local_path: &Path, year: u16) -> Result<TransferRecord> {
        tokio::fs::create_dir_all(local_path.parent().unwrap_or(&self.temp_dir)).await?;

        let record = self.transfer.transfer(url, local_path).await?;
        let record = self.publisher.publish_archive(local_path, year, record).await?;

        tokio::fs::remove_file(local_path).await?;
        debug!("Removed scratch copy {}", local_path.display());
        Ok(record)
    }

    async fn read_sidecar(&self, year: u16) -> Result<Option<TransferRecord>> {
        let store = self.publisher.store();
        let key = paths::archive_metadata_key(year);
        let text = match store.read_text(&key).await {
            Ok(text) => text,
            Err(PipelineError::NotFound(_)) => return Ok(None),
            Err(e) => return Err(e),
        };

        match serde_json::from_str(&text) {
            Ok(record) => Ok(Some(record)),
            Err(e) => {
                warn!("Ignoring unreadable sidecar {}: {}", store.uri(&key), e);
                Ok(None)
            },
        }
    }
}

/// Remove `dir` only if nothing else is in it
async fn remove_dir_if_empty(dir: &Path) {
    let is_empty = match tokio::fs::read_dir(dir).await {
        Ok(mut entries) => matches!(entries.next_entry().await, Ok(None)),
        Err(_) => false,
    };
    if is_empty {
        if let Err(e) = tokio::fs::remove_dir(dir).await {
            debug!("Left scratch directory {}: {}", dir.display(), e);
        }
    }
}
