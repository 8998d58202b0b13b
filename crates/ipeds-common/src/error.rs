//! Error types for the IPEDS pipeline

use thiserror::Error;

/// Result type alias for pipeline operations
pub type Result<T> = std::result::Result<T, PipelineError>;

/// Main error type for the pipeline
///
/// Single-item operations (fetch one archive, extract one table) return these
/// directly. Batch extraction catches them per table and records the table as
/// failed instead.
#[derive(Error, Debug)]
pub enum PipelineError {
    /// Missing or invalid settings; raised before any I/O happens.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Network or HTTP failure after the retry budget was spent.
    #[error("Transfer of {url} failed: {message}")]
    Transfer { url: String, message: String },

    /// A local file or remote object that was required does not exist.
    #[error("Not found: {0}")]
    NotFound(String),

    /// A table export produced no data rows.
    #[error("Table '{0}' appears to be empty")]
    EmptyTable(String),

    /// The legacy-database tool rejected its input or exited unsuccessfully.
    #[error("Legacy reader failed: {0}")]
    Tool(String),

    /// A table could not be converted into a columnar artifact.
    #[error("Failed to extract table '{table}': {message}")]
    Extraction { table: String, message: String },

    #[error("Object storage error: {0}")]
    Storage(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl PipelineError {
    pub fn configuration(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    pub fn transfer(url: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Transfer {
            url: url.into(),
            message: message.into(),
        }
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    pub fn tool(msg: impl Into<String>) -> Self {
        Self::Tool(msg.into())
    }

    pub fn extraction(table: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Extraction {
            table: table.into(),
            message: message.into(),
        }
    }

    pub fn storage(msg: impl Into<String>) -> Self {
        Self::Storage(msg.into())
    }

    /// Stable label for log fields
    pub fn kind(&self) -> &'static str {
        match self {
            PipelineError::Configuration(_) => "configuration",
            PipelineError::Transfer { .. } => "transfer",
            PipelineError::NotFound(_) => "not_found",
            PipelineError::EmptyTable(_) => "empty_table",
            PipelineError::Tool(_) => "tool",
            PipelineError::Extraction { .. } => "extraction",
            PipelineError::Storage(_) => "storage",
            PipelineError::Io(_) => "io",
            PipelineError::Serialization(_) => "serialization",
        }
    }
}
