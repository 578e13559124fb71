//! Authenticated download of one resolved file with retry and atomic placement.

use std::io::Write;
use std::path::Path;
use std::thread;
use std::time::Duration;

use crate::credentials::Credentials;
use crate::error::{ConfigError, auth_guidance};
use crate::outcome::{SkipReason, TransferOutcome};
use crate::path::ResolvedPath;
use crate::postprocess::{check_magic, read_head, verify_artifact};
use crate::util::{backoff, jittered, retriable_status};

/// Why a single attempt did not produce a body.
#[derive(Debug)]
pub enum AttemptError {
    /// Final (non-redirect) HTTP status other than success.
    Status(u16),
    Timeout(String),
    Connect(String),
    /// The body stopped before it was complete.
    Body(std::io::Error),
    /// Writing to the local sink failed.
    Local(std::io::Error),
    Config(ConfigError),
}

/// One network round trip for a URL.
///
/// Implementations stream a successful body into `sink` and return the number
/// of bytes written. They never retry; [`TransferEngine`] owns that policy.
pub trait Transport {
    fn get(
        &self,
        url: &str,
        credentials: &Credentials,
        sink: &mut dyn Write,
    ) -> Result<u64, AttemptError>;
}

impl<T: Transport + ?Sized> Transport for &T {
    fn get(
        &self,
        url: &str,
        credentials: &Credentials,
        sink: &mut dyn Write,
    ) -> Result<u64, AttemptError> {
        (**self).get(url, credentials, sink)
    }
}

impl<T: Transport + ?Sized> Transport for Box<T> {
    fn get(
        &self,
        url: &str,
        credentials: &Credentials,
        sink: &mut dyn Write,
    ) -> Result<u64, AttemptError> {
        (**self).get(url, credentials, sink)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first. Zero behaves like one.
    pub attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub jitter: bool,
}

impl RetryPolicy {
    pub fn new(attempts: u32) -> Self {
        Self {
            attempts,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(60),
            jitter: true,
        }
    }

    /// No waiting between attempts.
    pub fn immediate(attempts: u32) -> Self {
        Self {
            attempts,
            base_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
            jitter: false,
        }
    }

    fn delay_before_retry(&self, retry: u32) -> Duration {
        let delay = backoff(retry, self.base_delay, self.max_delay);
        if self.jitter { jittered(delay) } else { delay }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(3)
    }
}

/// True when `path` already holds a non-empty file.
pub fn has_artifact(path: &Path) -> bool {
    std::fs::metadata(path)
        .map(|m| m.is_file() && m.len() > 0)
        .unwrap_or(false)
}

pub struct TransferEngine<T> {
    transport: T,
    policy: RetryPolicy,
    skip_existing: bool,
    auth_host: String,
}

impl<T: Transport> TransferEngine<T> {
    pub fn new(transport: T, policy: RetryPolicy) -> Self {
        Self {
            transport,
            policy,
            skip_existing: false,
            auth_host: crate::path::EARTHDATA_AUTH_HOST.to_string(),
        }
    }

    pub fn with_skip_existing(mut self, skip: bool) -> Self {
        self.skip_existing = skip;
        self
    }

    pub fn with_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_auth_host(mut self, host: impl Into<String>) -> Self {
        self.auth_host = host.into();
        self
    }

    /// `Skipped` when skip-existing is on and a valid copy is already there.
    ///
    /// A file whose leading bytes do not match its suffix (e.g. a saved login
    /// page) does not count and is fetched again.
    pub fn existing(&self, resolved: &ResolvedPath) -> Option<TransferOutcome> {
        let target = &resolved.local;
        if !(self.skip_existing && has_artifact(target)) {
            return None;
        }
        if let Err(e) = verify_artifact(target) {
            log::warn!("{}; downloading it again", e);
            return None;
        }
        log::info!("skipping existing file: {}", target.display());
        Some(TransferOutcome::Skipped {
            path: target.clone(),
            reason: SkipReason::AlreadyExists,
        })
    }

    pub fn fetch(&self, resolved: &ResolvedPath, credentials: &Credentials) -> TransferOutcome {
        if let Some(skipped) = self.existing(resolved) {
            return skipped;
        }
        let target = &resolved.local;

        let dir = match target.parent() {
            Some(p) if !p.as_os_str().is_empty() => p,
            _ => Path::new("."),
        };
        if let Err(e) = std::fs::create_dir_all(dir) {
            return ConfigError::io("failed to create directory", dir, e).into();
        }

        let attempts = self.policy.attempts.max(1);
        let mut waited = Duration::ZERO;
        let mut last_error = String::new();

        for attempt in 1..=attempts {
            log::info!("downloading {} (attempt {}/{})", resolved.url, attempt, attempts);

            // Bodies land in a sibling temp file; it is removed on drop unless persisted.
            let mut part = match tempfile::Builder::new()
                .prefix(".")
                .suffix(".part")
                .tempfile_in(dir)
            {
                Ok(f) => f,
                Err(e) => return ConfigError::io("failed to create temp file in", dir, e).into(),
            };

            match self.transport.get(&resolved.url, credentials, part.as_file_mut()) {
                Ok(bytes) => {
                    if let Err(e) = part.as_file().sync_all() {
                        return ConfigError::io("failed to sync", part.path(), e).into();
                    }
                    // The temp file is dropped, so nothing lands at the destination.
                    if let Some(compression) = resolved.compression {
                        let head = match part.reopen().and_then(read_head) {
                            Ok(h) => h,
                            Err(e) => return ConfigError::io("failed to read", part.path(), e).into(),
                        };
                        if let Err(found) = check_magic(&head, compression) {
                            let err = ConfigError::UnexpectedContent {
                                location: resolved.url.clone(),
                                expected: compression.suffix(),
                                found,
                            };
                            log::error!("{}", err);
                            return err.into();
                        }
                    }
                    if let Err(e) = part.persist(target) {
                        return ConfigError::io("failed to move download to", target, e.error)
                            .into();
                    }
                    log::info!("downloaded {} ({} bytes)", target.display(), bytes);
                    return TransferOutcome::Success {
                        bytes,
                        path: target.clone(),
                    };
                }
                Err(AttemptError::Status(404)) => {
                    log::warn!("file not found (404): {}", resolved.url);
                    return TransferOutcome::NotFound {
                        url: resolved.url.clone(),
                    };
                }
                Err(AttemptError::Status(status @ (401 | 403))) => {
                    log::error!("{}", auth_guidance(status, &resolved.url, &self.auth_host));
                    return TransferOutcome::AuthFailed {
                        status,
                        url: resolved.url.clone(),
                    };
                }
                Err(AttemptError::Status(status)) if retriable_status(status) => {
                    last_error = format!("HTTP {}", status);
                }
                Err(AttemptError::Status(status)) => {
                    log::error!("HTTP {}: {}", status, resolved.url);
                    return TransferOutcome::TransientFailure {
                        attempts: attempt,
                        last_error: format!("HTTP {}", status),
                    };
                }
                Err(AttemptError::Timeout(msg)) => last_error = format!("timed out: {}", msg),
                Err(AttemptError::Connect(msg)) => last_error = format!("connection failed: {}", msg),
                Err(AttemptError::Body(e)) => last_error = format!("transfer interrupted: {}", e),
                Err(AttemptError::Local(e)) => {
                    return ConfigError::io("failed to write", part.path(), e).into();
                }
                Err(AttemptError::Config(e)) => return e.into(),
            }

            if attempt < attempts {
                let delay = self.policy.delay_before_retry(attempt - 1);
                log::warn!(
                    "attempt {}/{} for {} failed ({}); retrying in {:.1}s",
                    attempt,
                    attempts,
                    resolved.url,
                    last_error,
                    delay.as_secs_f64()
                );
                thread::sleep(delay);
                waited += delay;
            }
        }

        log::error!(
            "giving up on {} after {} attempt(s) and {:.1}s of backoff: {}",
            resolved.url,
            attempts,
            waited.as_secs_f64(),
            last_error
        );
        TransferOutcome::TransientFailure {
            attempts,
            last_error,
        }
    }
}
