//! Resumable HTTP transfer to local disk
//!
//! Bytes land in `<destination>.partial` and are renamed into place only after
//! the body has been fully received. Digests are computed from a second read
//! of the completed file so they cover exactly what was persisted, across any
//! resume boundary.

use chrono::Utc;
use ipeds_common::checksum::compute_file_digests;
use ipeds_common::{PipelineError, Result};
use reqwest::header::{HeaderValue, RANGE};
use reqwest::{Client, StatusCode};
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tokio::fs::OpenOptions;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, instrument, warn};

use super::models::TransferRecord;
use super::retry::RetryPolicy;

pub const USER_AGENT: &str = concat!("ipeds-pipeline/", env!("CARGO_PKG_VERSION"));

const PARTIAL_SUFFIX: &str = ".partial";

/// Per-request knobs for [`HttpTransfer`]
#[derive(Debug, Clone)]
pub struct TransferOptions {
    /// Applied to each HTTP request as a whole
    pub timeout: Duration,
    /// Read buffer for the digest pass
    pub chunk_size: usize,
}

impl Default for TransferOptions {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(300),
            chunk_size: 10 * 1024 * 1024,
        }
    }
}

/// Sibling file that receives bytes while a transfer is in flight
pub fn partial_path(destination: &Path) -> PathBuf {
    let mut name = OsString::from(destination.as_os_str());
    name.push(PARTIAL_SUFFIX);
    PathBuf::from(name)
}

pub struct HttpTransfer {
    client: Client,
    retry: RetryPolicy,
    options: TransferOptions,
}

impl HttpTransfer {
    pub fn new(options: TransferOptions, retry: RetryPolicy) -> Result<Self> {
        let client = Client::builder()
            .timeout(options.timeout)
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| PipelineError::configuration(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self { client, retry, options })
    }

    /// Stream `url` into `destination`, resuming from a leftover partial file.
    ///
    /// On failure the partial file and any final file are removed before the
    /// error is returned. The returned record has no storage location yet.
    #[instrument(skip(self), fields(destination = %destination.display()))]
    pub async fn transfer(&self, url: &str, destination: &Path) -> Result<TransferRecord> {
        let partial = partial_path(destination);

        match self.transfer_inner(url, destination, &partial).await {
            Ok(record) => Ok(record),
            Err(e) => {
                warn!("Transfer of {} failed: {}", url, e);
                remove_if_present(&partial).await;
                remove_if_present(destination).await;
                Err(e)
            },
        }
    }

    async fn transfer_inner(&self, url: &str, destination: &Path, partial: &Path) -> Result<TransferRecord> {
        let started = Instant::now();

        if let Some(parent) = destination.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let mut resume_from = match tokio::fs::metadata(partial).await {
            Ok(meta) => meta.len(),
            Err(_) => 0,
        };

        let mut request = self
            .client
            .get(url)
            .build()
            .map_err(|e| PipelineError::transfer(url, e.to_string()))?;
        if resume_from > 0 {
            info!("Resuming {} from byte {}", url, resume_from);
            let range = HeaderValue::from_str(&format!("bytes={}-", resume_from))
                .map_err(|e| PipelineError::transfer(url, e.to_string()))?;
            request.headers_mut().insert(RANGE, range);
        }

        let mut response = self.retry.execute(&self.client, request).await?;
        let status = response.status();
        if !status.is_success() {
            return Err(PipelineError::transfer(url, format!("HTTP {}", status)));
        }

        if resume_from > 0 && status != StatusCode::PARTIAL_CONTENT {
            warn!("Server ignored range request for {}; restarting from zero", url);
            resume_from = 0;
        }

        let total_size = response.content_length().map(|len| len + resume_from);
        let mut file = OpenOptions::new()
            .create(true)
            .write(true)
            .append(resume_from > 0)
            .truncate(resume_from == 0)
            .open(partial)
            .await?;

        let mut written = resume_from;
        let mut last_decile = progress_decile(written, total_size);

        while let Some(chunk) = response
            .chunk()
            .await
            .map_err(|e| PipelineError::transfer(url, format!("stream interrupted: {}", e)))?
        {
            file.write_all(&chunk).await?;
            written += chunk.len() as u64;

            let decile = progress_decile(written, total_size);
            if decile > last_decile {
                last_decile = decile;
                if let Some(total) = total_size {
                    info!("Progress: {}% ({}/{} bytes)", decile * 10, written, total);
                }
            }
        }

        file.flush().await?;
        file.sync_all().await?;
        drop(file);

        if let Some(expected) = total_size {
            if written != expected {
                return Err(PipelineError::transfer(
                    url,
                    format!("received {} of {} bytes", written, expected),
                ));
            }
        }

        tokio::fs::rename(partial, destination).await?;
        debug!("Renamed {} -> {}", partial.display(), destination.display());

        let digest_path = destination.to_path_buf();
        let buffer_size = self.options.chunk_size;
        let digests = tokio::task::spawn_blocking(move || compute_file_digests(digest_path, buffer_size))
            .await
            .map_err(|e| PipelineError::Io(std::io::Error::other(e)))??;

        let elapsed = started.elapsed().as_secs_f64();
        info!(
            "Downloaded {} ({} bytes) in {:.2}s, sha256={}",
            url, digests.size, elapsed, digests.sha256
        );

        Ok(TransferRecord {
            filename: destination
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default(),
            source_url: url.to_string(),
            destination_path: destination.to_path_buf(),
            file_size_bytes: digests.size,
            checksum_md5: digests.md5,
            checksum_sha256: digests.sha256,
            download_duration_seconds: elapsed,
            http_status_code: status.as_u16(),
            download_timestamp: Utc::now(),
            storage_location: String::new(),
        })
    }
}

fn progress_decile(written: u64, total: Option<u64>) -> u64 {
    match total {
        Some(total) if total > 0 => (written.min(total) * 10) / total,
        _ => 0,
    }
}

async fn remove_if_present(path: &Path) {
    match tokio::fs::remove_file(path).await {
        Ok(()) => debug!("Removed {}", path.display()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {},
        Err(e) => warn!("Could not remove {}: {}", path.display(), e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_path() {
        assert_eq!(
            partial_path(Path::new("/tmp/ipeds_2023/IPEDS2023.zip")),
            PathBuf::from("/tmp/ipeds_2023/IPEDS2023.zip.partial")
        );
    }

    #[test]
    fn test_progress_decile() {
        assert_eq!(progress_decile(0, Some(100)), 0);
        assert_eq!(progress_decile(19, Some(100)), 1);
        assert_eq!(progress_decile(100, Some(100)), 10);
        assert_eq!(progress_decile(50, None), 0);
        assert_eq!(progress_decile(5, Some(0)), 0);
    }
}
