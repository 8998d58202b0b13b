// Extraction models

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Normalized column type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DataType {
    Integer,
    Float,
    Boolean,
    Timestamp,
    Date,
    String,
}

impl DataType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Integer => "integer",
            Self::Float => "float",
            Self::Boolean => "boolean",
            Self::Timestamp => "timestamp",
            Self::Date => "date",
            Self::String => "string",
        }
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnDescriptor {
    pub name: String,
    pub data_type: DataType,
    pub nullable: bool,
}

/// Outcome of extracting one table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableExtractionRecord {
    pub source_file: String,
    pub table_name: String,
    pub extraction_timestamp: DateTime<Utc>,
    pub row_count: usize,
    pub column_count: usize,
    pub columns: Vec<ColumnDescriptor>,
    #[serde(alias = "parquet_size_bytes")]
    pub artifact_size_bytes: u64,
    /// Empty until published
    #[serde(default, alias = "gcs_path")]
    pub storage_location: String,
    pub extraction_duration_seconds: f64,
}

/// Aggregate of one extraction run over a container
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractionManifest {
    pub source_file: String,
    pub extraction_timestamp: DateTime<Utc>,
    pub total_tables: usize,
    pub extracted_tables: usize,
    pub skipped_tables: Vec<String>,
    pub failed_tables: Vec<String>,
    pub table_metadata: Vec<TableExtractionRecord>,
    pub total_duration_seconds: f64,
}

impl ExtractionManifest {
    /// `extracted + failed + skipped == total` and one record per extracted table
    pub fn is_consistent(&self) -> bool {
        self.extracted_tables + self.failed_tables.len() + self.skipped_tables.len() == self.total_tables
            && self.extracted_tables == self.table_metadata.len()
    }

    pub fn total_rows(&self) -> usize {
        self.table_metadata.iter().map(|t| t.row_count).sum()
    }

    pub fn total_artifact_bytes(&self) -> u64 {
        self.table_metadata.iter().map(|t| t.artifact_size_bytes).sum()
    }
}
