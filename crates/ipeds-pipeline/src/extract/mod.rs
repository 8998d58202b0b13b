//! Table extraction from legacy Access containers
//!
//! [`reader`] lists and exports tables, [`inference`] types the exported
//! cells, [`table`] writes one Parquet artifact per table and
//! [`orchestrator`] runs a whole container into an [`ExtractionManifest`].

use parquet::basic::{Compression as ParquetCompression, GzipLevel, ZstdLevel};
use serde::{Deserialize, Serialize};
use std::fmt;

pub mod inference;
pub mod models;
pub mod orchestrator;
pub mod reader;
pub mod table;

pub use models::{ColumnDescriptor, DataType, ExtractionManifest, TableExtractionRecord};
pub use orchestrator::{ExtractionOrchestrator, TableSelection};
pub use reader::{LegacyReader, MdbToolsReader};
pub use table::TableExtractor;

/// Parquet codec for table artifacts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Compression {
    #[default]
    Snappy,
    Gzip,
    Zstd,
    Lz4,
    None,
}

impl Compression {
    pub fn to_parquet(self) -> ParquetCompression {
        match self {
            Self::Snappy => ParquetCompression::SNAPPY,
            Self::Gzip => ParquetCompression::GZIP(GzipLevel::default()),
            Self::Zstd => ParquetCompression::ZSTD(ZstdLevel::default()),
            Self::Lz4 => ParquetCompression::LZ4_RAW,
            Self::None => ParquetCompression::UNCOMPRESSED,
        }
    }
}

impl fmt::Display for Compression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Snappy => "snappy",
            Self::Gzip => "gzip",
            Self::Zstd => "zstd",
            Self::Lz4 => "lz4",
            Self::None => "none",
        };
        f.write_str(name)
    }
}
