use serde::Serialize;
use std::fmt;
use std::path::PathBuf;

use crate::error::ConfigError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum SkipReason {
    AlreadyExists,
}

/// Result of one retrieval. Produced once, never retried afterwards.
#[derive(Debug)]
pub enum TransferOutcome {
    Success { bytes: u64, path: PathBuf },
    Skipped { path: PathBuf, reason: SkipReason },
    NotFound { url: String },
    AuthFailed { status: u16, url: String },
    TransientFailure { attempts: u32, last_error: String },
    ConfigError(ConfigError),
}

impl TransferOutcome {
    /// Success, Skipped and NotFound do not fail a run.
    pub fn is_ok(&self) -> bool {
        matches!(
            self,
            TransferOutcome::Success { .. }
                | TransferOutcome::Skipped { .. }
                | TransferOutcome::NotFound { .. }
        )
    }

    pub fn kind(&self) -> &'static str {
        match self {
            TransferOutcome::Success { .. } => "success",
            TransferOutcome::Skipped { .. } => "skipped",
            TransferOutcome::NotFound { .. } => "not-found",
            TransferOutcome::AuthFailed { .. } => "auth-failed",
            TransferOutcome::TransientFailure { .. } => "transient-failure",
            TransferOutcome::ConfigError(_) => "config-error",
        }
    }
}

impl From<ConfigError> for TransferOutcome {
    fn from(e: ConfigError) -> Self {
        TransferOutcome::ConfigError(e)
    }
}

impl fmt::Display for TransferOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransferOutcome::Success { bytes, path } => {
                write!(f, "downloaded {} ({} bytes)", path.display(), bytes)
            }
            TransferOutcome::Skipped { path, .. } => {
                write!(f, "skipped existing {}", path.display())
            }
            TransferOutcome::NotFound { url } => write!(f, "not published yet (404): {}", url),
            TransferOutcome::AuthFailed { status, url } => {
                write!(f, "authentication failed (HTTP {}): {}", status, url)
            }
            TransferOutcome::TransientFailure { attempts, last_error } => {
                write!(f, "gave up after {} attempt(s): {}", attempts, last_error)
            }
            TransferOutcome::ConfigError(e) => write!(f, "{}", e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ok_set() {
        assert!(TransferOutcome::NotFound { url: "u".into() }.is_ok());
        assert!(
            TransferOutcome::Skipped {
                path: "p".into(),
                reason: SkipReason::AlreadyExists
            }
            .is_ok()
        );
        assert!(!TransferOutcome::AuthFailed { status: 403, url: "u".into() }.is_ok());
        assert!(
            !TransferOutcome::TransientFailure {
                attempts: 3,
                last_error: "timeout".into()
            }
            .is_ok()
        );
        assert!(!TransferOutcome::from(ConfigError::Tls("x".into())).is_ok());
    }
}
