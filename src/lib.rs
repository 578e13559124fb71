//! Retrieval of daily GNSS broadcast ephemeris and IONEX products from the
//! NASA CDDIS archive.
//!
//! The crate follows the usual archive flow:
//! resolve the remote and local path for a date, download it through the
//! Earthdata login redirect, then optionally decompress it next to the original.
//!
//! ## Quick start
//! - Configure authentication via a netrc entry for `urs.earthdata.nasa.gov`
//!   (`NETRC`, `~/.netrc`, or `%USERPROFILE%\_netrc`) or via
//!   `EARTHDATA_USERNAME` / `EARTHDATA_PASSWORD`.
//! - Build a [`Batch`] with [`Batch::http`] (or over any [`Transport`]) and run
//!   it for a [`DateSpan`].
//!
//! ```no_run
//! use anyhow::Result;
//! use cddis_fetch::{Archive, Batch, DateSpan, Environment, FileType, RequestTemplate};
//!
//! fn main() -> Result<()> {
//!     let mut template = RequestTemplate::new(FileType::RinexV3Gnss, "data");
//!     template.decompress = true;
//!
//!     let env = Environment::capture();
//!     let batch = Batch::http(template, Archive::cddis(), &env)?;
//!     let date = chrono::NaiveDate::from_ymd_opt(2024, 3, 1).unwrap();
//!     let summary = batch.run(DateSpan::Single(date), &env);
//!     std::process::exit(summary.exit_code());
//! }
//! ```

#![forbid(unsafe_code)]

mod batch;
mod config;
mod credentials;
mod diagnose;
mod error;
mod http;
mod lzw;
mod outcome;
mod path;
mod postprocess;
mod profile;
mod request;
mod transfer;
mod util;

pub use batch::{Batch, CancelFlag, DateRecord, DateReport, DateSpan, RunSummary};
pub use config::{ENV_CA_BUNDLE, ENV_NETRC, ENV_PASSWORD, ENV_PROXY, ENV_USERNAME, Environment};
pub use credentials::{CredentialReport, CredentialSource, Credentials, SourceCheck, probe, resolve};
pub use diagnose::{DiagnosticReport, PathStatus, diagnose};
pub use error::ConfigError;
pub use http::{HttpSettings, HttpTransport};
pub use outcome::{SkipReason, TransferOutcome};
pub use path::{Archive, CDDIS_ARCHIVE, EARTHDATA_AUTH_HOST, ResolvedPath};
pub use postprocess::{decompress_sibling, process, verify_artifact};
pub use profile::{Compression, CompressionRule, DEPRECATED_ALIASES, FileType, FileTypeProfile, PROFILES};
pub use request::{DEFAULT_RETRIES, DEFAULT_TIMEOUT, RequestTemplate, RetrievalRequest};
pub use transfer::{AttemptError, RetryPolicy, TransferEngine, Transport, has_artifact};
pub use util::mask_username;

pub use path::resolve as resolve_path;
pub use lzw::decompress as decompress_unix_z;
