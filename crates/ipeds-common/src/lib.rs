//! IPEDS Common Library
#![deny(clippy::unwrap_used, clippy::expect_used)]
//!
//! Shared error taxonomy, checksum utilities and logging setup used by the
//! IPEDS pipeline crates.
//!
//! # Overview
//!
//! - **Error Handling**: [`PipelineError`] and the [`Result`] alias
//! - **Checksums**: MD5 + SHA-256 digests computed in a single read pass
//! - **Logging**: `tracing` subscriber initialisation driven by env vars
//!
//! # Example
//!
//! ```no_run
//! use ipeds_common::checksum::compute_file_digests;
//! use ipeds_common::Result;
//!
//! fn verify(path: &str) -> Result<()> {
//!     let digests = compute_file_digests(path, 8192)?;
//!     println!("md5={} sha256={}", digests.md5, digests.sha256);
//!     Ok(())
//! }
//! ```

pub mod checksum;
pub mod error;
pub mod logging;

pub use error::{PipelineError, Result};
