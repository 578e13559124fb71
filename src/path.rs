//! Date + file type → remote URL and local destination. Pure computation.

use chrono::{Datelike, NaiveDate};
use serde::Serialize;
use std::path::{Path, PathBuf};

use crate::error::ConfigError;
use crate::profile::{Compression, FileType};
use crate::util::urljoin;

pub const CDDIS_ARCHIVE: &str = "https://cddis.nasa.gov/archive";
pub const EARTHDATA_AUTH_HOST: &str = "urs.earthdata.nasa.gov";

/// Where files are fetched from and which host receives the login.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Archive {
    pub base_url: String,
    pub auth_host: String,
}

impl Archive {
    pub fn cddis() -> Self {
        Self {
            base_url: CDDIS_ARCHIVE.to_string(),
            auth_host: EARTHDATA_AUTH_HOST.to_string(),
        }
    }
}

impl Default for Archive {
    fn default() -> Self {
        Self::cddis()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResolvedPath {
    pub file_type: FileType,
    pub date: NaiveDate,
    pub url: String,
    pub local: PathBuf,
    pub decompressed: Option<PathBuf>,
    pub compression: Option<Compression>,
}

/// Template fields derived from a date.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct DateParts {
    pub year: i32,
    pub doy: u32,
    pub yy: u32,
}

impl DateParts {
    pub(crate) fn of(date: NaiveDate) -> Self {
        Self {
            year: date.year(),
            doy: date.ordinal(),
            yy: date.year().rem_euclid(100) as u32,
        }
    }

    fn render(&self, template: &str, ext: &str) -> String {
        template
            .replace("{yyyy}", &format!("{:04}", self.year))
            .replace("{ddd}", &format!("{:03}", self.doy))
            .replace("{yy}", &format!("{:02}", self.yy))
            .replace("{ext}", ext)
    }
}

pub fn resolve(
    date: NaiveDate,
    file_type: FileType,
    out_root: &Path,
    archive: &Archive,
) -> Result<ResolvedPath, ConfigError> {
    let profile = file_type.profile();
    if !profile.covers(date) {
        return Err(ConfigError::OutsideWindow {
            file_type: profile.key,
            date,
            window: profile.window(),
        });
    }

    let parts = DateParts::of(date);
    let compression = profile.compression.for_date(date);
    let directory = parts.render(profile.directory, "");
    let filename = parts.render(profile.filename, compression.suffix());

    let url = urljoin(&urljoin(&archive.base_url, &directory), &filename);
    let local = out_root.join(format!("{:04}", parts.year)).join(&filename);
    let decompressed = strip_compression_suffix(&local);

    Ok(ResolvedPath {
        file_type,
        date,
        url,
        local,
        compression: decompressed.as_ref().map(|_| compression),
        decompressed,
    })
}

/// Removes exactly one `.gz` or `.Z` suffix; `None` for uncompressed names.
pub(crate) fn strip_compression_suffix(path: &Path) -> Option<PathBuf> {
    let compression = Compression::from_path(path)?;
    let name = path.file_name()?.to_str()?;
    let stem = name.strip_suffix(compression.suffix())?;
    if stem.is_empty() {
        return None;
    }
    Some(path.with_file_name(stem))
}
