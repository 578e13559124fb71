use chrono::NaiveDate;
use std::path::PathBuf;
use std::time::Duration;

use crate::profile::FileType;

pub const DEFAULT_RETRIES: u32 = 3;
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

/// Everything about a retrieval except the date; shared by every date of a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestTemplate {
    pub file_type: FileType,
    pub out_root: PathBuf,
    pub decompress: bool,
    pub skip_existing: bool,
    /// Total attempts per file.
    pub retries: u32,
    pub timeout: Duration,
    pub proxy: Option<String>,
    /// Show a progress bar per download.
    pub progress: bool,
}

impl RequestTemplate {
    pub fn new(file_type: FileType, out_root: impl Into<PathBuf>) -> Self {
        Self {
            file_type,
            out_root: out_root.into(),
            decompress: false,
            skip_existing: false,
            retries: DEFAULT_RETRIES,
            timeout: DEFAULT_TIMEOUT,
            proxy: None,
            progress: false,
        }
    }

    pub fn for_date(&self, date: NaiveDate) -> RetrievalRequest {
        RetrievalRequest {
            date,
            file_type: self.file_type,
            out_root: self.out_root.clone(),
            decompress: self.decompress,
            skip_existing: self.skip_existing,
            retries: self.retries,
            timeout: self.timeout,
            proxy: self.proxy.clone(),
        }
    }
}

/// One (date, file type) retrieval. Fields are read-only after construction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetrievalRequest {
    date: NaiveDate,
    file_type: FileType,
    out_root: PathBuf,
    decompress: bool,
    skip_existing: bool,
    retries: u32,
    timeout: Duration,
    proxy: Option<String>,
}

impl RetrievalRequest {
    pub fn date(&self) -> NaiveDate {
        self.date
    }

    pub fn file_type(&self) -> FileType {
        self.file_type
    }

    pub fn out_root(&self) -> &std::path::Path {
        &self.out_root
    }

    pub fn decompress(&self) -> bool {
        self.decompress
    }

    pub fn skip_existing(&self) -> bool {
        self.skip_existing
    }

    pub fn retries(&self) -> u32 {
        self.retries
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn proxy(&self) -> Option<&str> {
        self.proxy.as_deref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_carries_every_template_setting() {
        let mut template = RequestTemplate::new(FileType::IonexV2, "data");
        template.decompress = true;
        template.skip_existing = true;
        template.retries = 5;
        template.timeout = Duration::from_secs(7);
        template.proxy = Some("http://proxy.local:3128".to_string());

        let date = NaiveDate::from_ymd_opt(2023, 3, 1).unwrap();
        let request = template.for_date(date);
        assert_eq!(request.date(), date);
        assert_eq!(request.file_type(), FileType::IonexV2);
        assert_eq!(request.out_root(), std::path::Path::new("data"));
        assert!(request.decompress());
        assert!(request.skip_existing());
        assert_eq!(request.retries(), 5);
        assert_eq!(request.timeout(), Duration::from_secs(7));
        assert_eq!(request.proxy(), Some("http://proxy.local:3128"));

        let defaults = RequestTemplate::new(FileType::RinexV2Gps, ".").for_date(date);
        assert!(!defaults.skip_existing());
        assert_eq!(defaults.retries(), DEFAULT_RETRIES);
        assert_eq!(defaults.timeout(), DEFAULT_TIMEOUT);
        assert_eq!(defaults.proxy(), None);
    }
}
