//! IPEDS Pipeline Library
#![deny(clippy::unwrap_used, clippy::expect_used)]
//!
//! Downloads yearly IPEDS Access archives, stores them in object storage and
//! converts the tables inside into Parquet artifacts.
//!
//! # Overview
//!
//! - **Download**: resumable HTTP transfer with MD5/SHA-256 verification,
//!   whole-request retries and an idempotent per-(year, version) fetch
//! - **Extract**: table listing through a [`extract::LegacyReader`], column
//!   type inference and one Parquet file per table, aggregated into an
//!   [`extract::ExtractionManifest`]
//! - **Publish**: deterministic object keys for archives, sidecar metadata,
//!   table artifacts and manifests
//! - **Storage**: S3-compatible or local-directory [`storage::ObjectStore`]
//!
//! # Example
//!
//! ```no_run
//! use ipeds_pipeline::config::PipelineConfig;
//! use ipeds_pipeline::download::{ArchiveFetcher, ArchiveVersion, HttpTransfer};
//! use ipeds_pipeline::publish::Publisher;
//! use ipeds_pipeline::storage;
//! use std::time::Duration;
//!
//! # async fn run() -> ipeds_common::Result<()> {
//! let config = PipelineConfig::load(None)?;
//! let store = storage::connect(&config.storage).await?;
//! let publisher = Publisher::new(store, Duration::from_secs(config.storage.upload_timeout_secs));
//! let transfer = HttpTransfer::new(
//!     config.downloader.transfer_options(),
//!     config.downloader.retry_policy(),
//! )?;
//! let fetcher = ArchiveFetcher::new(&config.source.base_url, &config.paths.temp_dir, transfer, publisher);
//!
//! let outcome = fetcher.fetch_archive(2023, ArchiveVersion::Provisional, false).await?;
//! println!("{}: {}", outcome.status(), outcome.location());
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod download;
pub mod extract;
pub mod publish;
pub mod storage;

pub use ipeds_common::{PipelineError, Result};
