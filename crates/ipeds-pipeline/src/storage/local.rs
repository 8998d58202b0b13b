use async_trait::async_trait;
use ipeds_common::{PipelineError, Result};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, instrument};

use super::ObjectStore;

/// Object store backed by a directory; keys map to relative paths
#[derive(Debug, Clone)]
pub struct LocalStorage {
    root: PathBuf,
}

impl LocalStorage {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn path_for(&self, key: &str) -> PathBuf {
        self.root.join(key)
    }

    async fn ensure_parent(path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        Ok(())
    }
}

#[async_trait]
impl ObjectStore for LocalStorage {
    async fn exists(&self, key: &str) -> Result<bool> {
        Ok(tokio::fs::try_exists(self.path_for(key)).await?)
    }

    async fn read_text(&self, key: &str) -> Result<String> {
        match tokio::fs::read_to_string(self.path_for(key)).await {
            Ok(text) => Ok(text),
            Err(e) if e.kind() == ErrorKind::NotFound => Err(PipelineError::not_found(self.uri(key))),
            Err(e) => Err(e.into()),
        }
    }

    #[instrument(skip(self, data))]
    async fn write_bytes(&self, key: &str, data: Vec<u8>, _content_type: &str) -> Result<()> {
        let path = self.path_for(key);
        Self::ensure_parent(&path).await?;
        tokio::fs::write(&path, data).await?;
        debug!(path = %path.display(), "Wrote object");
        Ok(())
    }

    #[instrument(skip(self))]
    async fn upload_file(&self, key: &str, local_path: &Path, timeout: Duration) -> Result<()> {
        let path = self.path_for(key);
        Self::ensure_parent(&path).await?;

        tokio::time::timeout(timeout, tokio::fs::copy(local_path, &path))
            .await
            .map_err(|_| {
                PipelineError::storage(format!(
                    "Copy of {} timed out after {:?}",
                    local_path.display(),
                    timeout
                ))
            })??;

        debug!(path = %path.display(), "Copied object");
        Ok(())
    }

    #[instrument(skip(self))]
    async fn download_file(&self, key: &str, local_path: &Path, timeout: Duration) -> Result<()> {
        let path = self.path_for(key);
        if !tokio::fs::try_exists(&path).await? {
            return Err(PipelineError::not_found(self.uri(key)));
        }
        Self::ensure_parent(local_path).await?;

        tokio::time::timeout(timeout, tokio::fs::copy(&path, local_path))
            .await
            .map_err(|_| {
                PipelineError::storage(format!("Copy of {} timed out after {:?}", path.display(), timeout))
            })??;

        debug!(path = %local_path.display(), "Fetched object");
        Ok(())
    }

    async fn list_some(&self, prefix: &str, max: usize) -> Result<Vec<String>> {
        let mut keys = Vec::new();
        let mut pending = vec![self.root.clone()];

        while let Some(dir) = pending.pop() {
            let mut entries = match tokio::fs::read_dir(&dir).await {
                Ok(entries) => entries,
                Err(e) if e.kind() == ErrorKind::NotFound => continue,
                Err(e) => return Err(e.into()),
            };

            while let Some(entry) = entries.next_entry().await? {
                let path = entry.path();
                if entry.file_type().await?.is_dir() {
                    pending.push(path);
                    continue;
                }

                let Ok(relative) = path.strip_prefix(&self.root) else {
                    continue;
                };
                let key = relative.to_string_lossy().replace('\\', "/");
                if key.starts_with(prefix) {
                    keys.push(key);
                    if keys.len() >= max {
                        return Ok(keys);
                    }
                }
            }
        }

        Ok(keys)
    }

    fn uri(&self, key: &str) -> String {
        format!("file://{}", self.path_for(key).display())
    }
}
