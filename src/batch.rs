//! Runs one retrieval per date, in ascending order, and folds the outcomes
//! into an exit status.

use chrono::NaiveDate;
use serde::Serialize;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::config::Environment;
use crate::credentials::{self, Credentials};
use crate::error::{ConfigError, netrc_template};
use crate::http::{HttpSettings, HttpTransport};
use crate::outcome::TransferOutcome;
use crate::path::{self, Archive};
use crate::postprocess;
use crate::profile::FileType;
use crate::request::{RequestTemplate, RetrievalRequest};
use crate::transfer::{RetryPolicy, TransferEngine, Transport};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DateSpan {
    Single(NaiveDate),
    /// Inclusive on both ends.
    Range { start: NaiveDate, end: NaiveDate },
}

impl DateSpan {
    pub fn dates(&self) -> Result<Vec<NaiveDate>, ConfigError> {
        let (start, end) = match *self {
            DateSpan::Single(d) => (d, d),
            DateSpan::Range { start, end } => (start, end),
        };
        if start > end {
            return Err(ConfigError::InvalidRange { start, end });
        }
        Ok(start.iter_days().take_while(|d| *d <= end).collect())
    }
}

/// Set from another thread (e.g. a Ctrl-C handler) to stop before the next date.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

#[derive(Debug)]
pub struct DateReport {
    pub date: NaiveDate,
    /// The type whose outcome is reported; differs from the requested one after a fallback.
    pub file_type: FileType,
    pub outcome: TransferOutcome,
}

#[derive(Debug, Default)]
pub struct RunSummary {
    pub reports: Vec<DateReport>,
    /// Dates never started because the run was cancelled.
    pub not_attempted: Vec<NaiveDate>,
    /// Set when the run could not start at all (e.g. an inverted range).
    pub setup_error: Option<ConfigError>,
}

#[derive(Debug, Serialize)]
pub struct DateRecord {
    pub date: NaiveDate,
    pub file_type: FileType,
    pub status: &'static str,
    pub detail: String,
}

#[derive(Debug, Serialize)]
struct SummaryJson<'a> {
    exit_code: i32,
    interrupted: bool,
    setup_error: Option<String>,
    dates: Vec<DateRecord>,
    not_attempted: &'a [NaiveDate],
}

impl RunSummary {
    pub fn interrupted(&self) -> bool {
        !self.not_attempted.is_empty()
    }

    pub fn is_success(&self) -> bool {
        self.setup_error.is_none()
            && !self.interrupted()
            && self.reports.iter().all(|r| r.outcome.is_ok())
    }

    pub fn exit_code(&self) -> i32 {
        if self.is_success() { 0 } else { 1 }
    }

    pub fn count(&self, kind: &str) -> usize {
        self.reports.iter().filter(|r| r.outcome.kind() == kind).count()
    }

    pub fn records(&self) -> Vec<DateRecord> {
        self.reports
            .iter()
            .map(|r| DateRecord {
                date: r.date,
                file_type: r.file_type,
                status: r.outcome.kind(),
                detail: r.outcome.to_string(),
            })
            .collect()
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(&SummaryJson {
            exit_code: self.exit_code(),
            interrupted: self.interrupted(),
            setup_error: self.setup_error.as_ref().map(|e| e.to_string()),
            dates: self.records(),
            not_attempted: &self.not_attempted,
        })
    }
}

pub struct Batch<T> {
    engine: TransferEngine<T>,
    template: RequestTemplate,
    archive: Archive,
    cancel: CancelFlag,
    fallback: bool,
}

impl<T: Transport> Batch<T> {
    pub fn new(transport: T, template: RequestTemplate, archive: Archive) -> Self {
        let engine = TransferEngine::new(transport, RetryPolicy::new(template.retries))
            .with_skip_existing(template.skip_existing)
            .with_auth_host(archive.auth_host.clone());
        Self {
            engine,
            template,
            archive,
            cancel: CancelFlag::new(),
            fallback: true,
        }
    }

    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.engine = self.engine.with_policy(policy);
        self
    }

    pub fn with_cancel(mut self, cancel: CancelFlag) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn with_fallback(mut self, fallback: bool) -> Self {
        self.fallback = fallback;
        self
    }

    pub fn run(&self, span: DateSpan, env: &Environment) -> RunSummary {
        let dates = match span.dates() {
            Ok(d) => d,
            Err(e) => {
                log::error!("{}", e);
                return RunSummary {
                    setup_error: Some(e),
                    ..RunSummary::default()
                };
            }
        };

        let credentials = match credentials::resolve(env, &self.archive.auth_host) {
            Ok(c) => Ok(c),
            Err(ConfigError::NoCredentials { checked }) => {
                log::error!("No valid NASA Earthdata credentials found. Checked:");
                for (i, source) in checked.iter().enumerate() {
                    log::error!("  {}. {}", i + 1, source);
                }
                log::error!(
                    "Create a netrc file with:\n{}\nor set EARTHDATA_USERNAME and EARTHDATA_PASSWORD.",
                    netrc_template(&self.archive.auth_host)
                );
                log::error!("Continuing so already-downloaded dates are still reported.");
                Err(checked)
            }
            Err(other) => {
                log::error!("{}", other);
                Err(Vec::new())
            }
        };

        let mut summary = RunSummary::default();
        for (i, date) in dates.iter().enumerate() {
            if self.cancel.is_cancelled() {
                summary.not_attempted = dates[i..].to_vec();
                log::warn!(
                    "interrupted; {} date(s) not attempted starting at {}",
                    summary.not_attempted.len(),
                    date
                );
                break;
            }

            let request = self.template.for_date(*date);
            let (file_type, outcome) =
                self.retrieve(&request, credentials.as_ref().map_err(|v| v.as_slice()));
            report(*date, file_type, &outcome);
            summary.reports.push(DateReport {
                date: *date,
                file_type,
                outcome,
            });
        }

        log::info!(
            "completed: {} date(s): {} downloaded, {} skipped, {} not found, {} failed{}",
            summary.reports.len(),
            summary.count("success"),
            summary.count("skipped"),
            summary.count("not-found"),
            summary.reports.iter().filter(|r| !r.outcome.is_ok()).count(),
            if summary.interrupted() { " (interrupted)" } else { "" }
        );
        summary
    }

    /// One date: the requested type, then its fallback if the first is missing.
    fn retrieve(
        &self,
        request: &RetrievalRequest,
        credentials: Result<&Credentials, &[String]>,
    ) -> (FileType, TransferOutcome) {
        let primary_type = request.file_type();
        let primary = self.attempt(primary_type, request, credentials);

        let fallback_type = match primary_type.profile().fallback {
            Some(ft) if self.fallback => ft,
            _ => return (primary_type, primary),
        };
        let primary_outside = matches!(
            primary,
            TransferOutcome::ConfigError(ConfigError::OutsideWindow { .. })
        );
        if !primary_outside && !matches!(primary, TransferOutcome::NotFound { .. }) {
            return (primary_type, primary);
        }

        log::info!(
            "{} unavailable for {}, trying fallback {}",
            primary_type,
            request.date(),
            fallback_type
        );
        let alternate = self.attempt(fallback_type, request, credentials);
        // A fallback that does not cover the date says nothing new.
        if matches!(
            alternate,
            TransferOutcome::ConfigError(ConfigError::OutsideWindow { .. })
        ) {
            return (primary_type, primary);
        }
        (fallback_type, alternate)
    }

    fn attempt(
        &self,
        file_type: FileType,
        request: &RetrievalRequest,
        credentials: Result<&Credentials, &[String]>,
    ) -> TransferOutcome {
        let resolved =
            match path::resolve(request.date(), file_type, request.out_root(), &self.archive) {
                Ok(r) => r,
                Err(e) => return e.into(),
            };

        let fetched = match credentials {
            Ok(c) => self.engine.fetch(&resolved, c),
            Err(checked) => match self.engine.existing(&resolved) {
                Some(skipped) => skipped,
                None => ConfigError::NoCredentials {
                    checked: checked.to_vec(),
                }
                .into(),
            },
        };
        postprocess::process(fetched, request.decompress())
    }
}

impl Batch<HttpTransport> {
    /// A batch over HTTPS, with the transport configured from `template`.
    pub fn http(
        template: RequestTemplate,
        archive: Archive,
        env: &Environment,
    ) -> Result<Self, ConfigError> {
        let transport = HttpTransport::new(HttpSettings::from_template(&template, &archive, env))?;
        Ok(Self::new(transport, template, archive))
    }
}

fn report(date: NaiveDate, file_type: FileType, outcome: &TransferOutcome) {
    match outcome {
        TransferOutcome::Success { .. } | TransferOutcome::Skipped { .. } => {
            log::info!("{} {}: {}", date, file_type, outcome)
        }
        TransferOutcome::NotFound { .. } => log::warn!("{} {}: {}", date, file_type, outcome),
        _ => log::error!("{} {}: {}", date, file_type, outcome),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    #[test]
    fn range_is_inclusive_and_ascending() {
        let dates = DateSpan::Range {
            start: d(2022, 12, 30),
            end: d(2023, 1, 2),
        }
        .dates()
        .unwrap();
        assert_eq!(dates, vec![d(2022, 12, 30), d(2022, 12, 31), d(2023, 1, 1), d(2023, 1, 2)]);
        assert_eq!(DateSpan::Single(d(2024, 2, 29)).dates().unwrap(), vec![d(2024, 2, 29)]);
    }

    #[test]
    fn inverted_range_is_rejected() {
        let err = DateSpan::Range {
            start: d(2024, 1, 2),
            end: d(2024, 1, 1),
        }
        .dates()
        .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidRange { .. }));
    }

    #[test]
    fn cancel_flag_is_shared() {
        let flag = CancelFlag::new();
        let other = flag.clone();
        other.cancel();
        assert!(flag.is_cancelled());
    }
}
