//! Legacy-database reader capability
//!
//! The extractor only needs two operations from an Access container: list
//! its tables and export one of them as delimited text. [`MdbToolsReader`]
//! provides them by invoking the `mdbtools` binaries.

use async_trait::async_trait;
use ipeds_common::{PipelineError, Result};
use std::path::Path;
use tokio::process::Command;
use tracing::{debug, instrument};

#[async_trait]
pub trait LegacyReader: Send + Sync {
    /// Table names in container order
    async fn list_tables(&self, container: &Path) -> Result<Vec<String>>;

    /// Full table contents as CSV with a header row
    async fn export_table(&self, container: &Path, table: &str) -> Result<String>;
}

/// Reader backed by the `mdb-tables` and `mdb-export` command-line tools
#[derive(Debug, Clone, Default)]
pub struct MdbToolsReader {
    _private: (),
}

impl MdbToolsReader {
    /// Confirm `mdbtools` is installed.
    ///
    /// A missing toolchain is a configuration problem, reported before any
    /// container is opened.
    pub async fn detect() -> Result<Self> {
        let output = Command::new("mdb-ver").output().await.map_err(|e| {
            PipelineError::configuration(format!("mdbtools not found ({}). Please install mdbtools.", e))
        })?;

        if !output.status.success() {
            return Err(PipelineError::configuration(format!(
                "mdb-ver failed: {}",
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }

        debug!("mdbtools version: {}", String::from_utf8_lossy(&output.stdout).trim());
        Ok(Self::default())
    }

    async fn run(program: &str, args: &[&str]) -> Result<String> {
        let output = Command::new(program)
            .args(args)
            .output()
            .await
            .map_err(|e| PipelineError::tool(format!("Failed to run {}: {}", program, e)))?;

        if !output.status.success() {
            return Err(PipelineError::tool(format!(
                "{} exited with {}: {}",
                program,
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

#[async_trait]
impl LegacyReader for MdbToolsReader {
    #[instrument(skip(self))]
    async fn list_tables(&self, container: &Path) -> Result<Vec<String>> {
        let path = container.to_string_lossy().into_owned();
        let stdout = Self::run("mdb-tables", &["-1", path.as_str()]).await?;
        Ok(parse_table_listing(&stdout))
    }

    #[instrument(skip(self))]
    async fn export_table(&self, container: &Path, table: &str) -> Result<String> {
        let path = container.to_string_lossy().into_owned();
        Self::run("mdb-export", &[path.as_str(), table]).await
    }
}

/// One table name per line; blank lines are dropped
pub fn parse_table_listing(stdout: &str) -> Vec<String> {
    stdout
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect()
}
