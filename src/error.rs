use chrono::NaiveDate;
use std::path::PathBuf;

/// Failures that end one unit of work and are never retried.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("unknown file type `{0}` (expected one of: {known})", known = crate::profile::known_keys())]
    UnknownFileType(String),

    #[error("{file_type} is not published for {date} (available {window})")]
    OutsideWindow {
        file_type: &'static str,
        date: NaiveDate,
        window: String,
    },

    #[error("invalid date range: start {start} is after end {end}")]
    InvalidRange { start: NaiveDate, end: NaiveDate },

    #[error("no NASA Earthdata credentials found (checked: {})", .checked.join("; "))]
    NoCredentials { checked: Vec<String> },

    #[error("invalid proxy `{url}`: {reason}")]
    Proxy { url: String, reason: String },

    #[error("invalid URL `{url}`: {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("TLS setup failed: {0}")]
    Tls(String),

    #[error("{action} {}: {source}", .path.display())]
    Io {
        action: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to decompress {}: {reason}", .path.display())]
    Decompress { path: PathBuf, reason: String },

    /// The archive answered, but not with the file that was asked for.
    #[error("{location} is not a valid {expected} file: got {found}")]
    UnexpectedContent {
        location: String,
        expected: &'static str,
        found: String,
    },
}

impl ConfigError {
    pub(crate) fn io(action: &'static str, path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        ConfigError::Io {
            action,
            path: path.into(),
            source,
        }
    }
}

/// Remediation text shown next to a 401/403. Never includes credential values.
pub(crate) fn auth_guidance(status: u16, url: &str, auth_host: &str) -> String {
    format!(
        "Authentication failed (HTTP {status}) for {url}.\n\
         - Check the Earthdata login/password in your netrc (`machine {auth_host}`) or in EARTHDATA_USERNAME/EARTHDATA_PASSWORD\n\
         - Make sure the CDDIS application is authorized for your Earthdata account\n\
         - Visit https://cddis.nasa.gov in a browser and sign in once, then re-run"
    )
}

/// The netrc stanza users are pointed at when no credentials were found.
pub(crate) fn netrc_template(auth_host: &str) -> String {
    format!("machine {auth_host}\n    login YOUR_USERNAME\n    password YOUR_PASSWORD")
}
