//! Yearly archive download
//!
//! [`HttpTransfer`] streams one URL to disk with resume support,
//! [`RetryPolicy`] bounds the request exchange and [`ArchiveFetcher`] turns
//! both into an idempotent "fetch year X, version V" operation.

pub mod fetcher;
pub mod models;
pub mod retry;
pub mod transfer;

pub use fetcher::{ArchiveFetcher, FetchOutcome};
pub use models::{archive_filename, archive_url, ArchiveVersion, TransferRecord};
pub use retry::RetryPolicy;
pub use transfer::{HttpTransfer, TransferOptions};
