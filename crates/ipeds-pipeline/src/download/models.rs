// Archive download models

use chrono::{DateTime, Utc};
use ipeds_common::PipelineError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

/// Release stage of a yearly archive
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArchiveVersion {
    #[default]
    Final,
    Provisional,
    Revised,
}

impl ArchiveVersion {
    pub const ALL: [ArchiveVersion; 3] = [Self::Final, Self::Provisional, Self::Revised];

    /// Filename suffix inserted before the extension
    pub fn suffix(self) -> &'static str {
        match self {
            Self::Final => "",
            Self::Provisional => "_pv",
            Self::Revised => "_rv",
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Final => "final",
            Self::Provisional => "provisional",
            Self::Revised => "revised",
        }
    }
}

impl fmt::Display for ArchiveVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ArchiveVersion {
    type Err = PipelineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "final" => Ok(Self::Final),
            "provisional" => Ok(Self::Provisional),
            "revised" => Ok(Self::Revised),
            other => Err(PipelineError::configuration(format!(
                "Unknown archive version '{}' (expected final, provisional or revised)",
                other
            ))),
        }
    }
}

/// Published filename for `(year, version)`, e.g. `IPEDS2023_pv.zip`
pub fn archive_filename(year: u16, version: ArchiveVersion) -> String {
    format!("IPEDS{}{}.zip", year, version.suffix())
}

/// Remote location for `(year, version)` under `base_url`
pub fn archive_url(base_url: &str, year: u16, version: ArchiveVersion) -> String {
    format!("{}/{}", base_url.trim_end_matches('/'), archive_filename(year, version))
}

/// Provenance of one completed transfer; also the sidecar JSON format
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransferRecord {
    pub filename: String,
    pub source_url: String,
    #[serde(default)]
    pub destination_path: PathBuf,
    pub file_size_bytes: u64,
    pub checksum_md5: String,
    pub checksum_sha256: String,
    pub download_duration_seconds: f64,
    pub http_status_code: u16,
    pub download_timestamp: DateTime<Utc>,
    /// Empty until published
    #[serde(default, alias = "gcs_path")]
    pub storage_location: String,
}

impl TransferRecord {
    pub fn is_published(&self) -> bool {
        !self.storage_location.is_empty()
    }
}
