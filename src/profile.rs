//! Static table describing every archived product the downloader knows about.
//!
//! Adding a product is a new [`FileType`] variant plus one row in [`PROFILES`];
//! nothing else branches on the type.

use chrono::NaiveDate;
use serde::Serialize;
use std::fmt;
use std::str::FromStr;

use crate::error::ConfigError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum FileType {
    RinexV2Gps,
    RinexV3Gnss,
    RinexV4Gnss,
    IonexV1,
    IonexV2,
}

impl FileType {
    pub const ALL: [FileType; 5] = [
        FileType::RinexV2Gps,
        FileType::RinexV3Gnss,
        FileType::RinexV4Gnss,
        FileType::IonexV1,
        FileType::IonexV2,
    ];

    pub fn key(self) -> &'static str {
        self.profile().key
    }

    pub fn profile(self) -> &'static FileTypeProfile {
        // Table rows are ordered like the enum.
        &PROFILES[self as usize]
    }

    pub fn is_ionex(self) -> bool {
        matches!(self, FileType::IonexV1 | FileType::IonexV2)
    }

    /// Parses a canonical key or a deprecated alias.
    ///
    /// The second element is the alias that was used, if any, so callers can warn.
    pub fn parse_key(key: &str) -> Result<(FileType, Option<&'static str>), ConfigError> {
        let key = key.trim();
        if let Some(ft) = FileType::ALL.iter().copied().find(|ft| ft.key() == key) {
            return Ok((ft, None));
        }
        DEPRECATED_ALIASES
            .iter()
            .find(|(alias, _)| *alias == key)
            .map(|(alias, ft)| (*ft, Some(*alias)))
            .ok_or_else(|| ConfigError::UnknownFileType(key.to_string()))
    }
}

impl fmt::Display for FileType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

impl FromStr for FileType {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        FileType::parse_key(s).map(|(ft, _)| ft)
    }
}

pub const DEPRECATED_ALIASES: [(&str, FileType); 3] = [
    ("gps-v2", FileType::RinexV2Gps),
    ("gnss-v3", FileType::RinexV3Gnss),
    ("brdm-v3", FileType::RinexV3Gnss),
];

pub(crate) fn known_keys() -> String {
    FileType::ALL
        .iter()
        .map(|ft| ft.key())
        .collect::<Vec<_>>()
        .join(", ")
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Compression {
    /// Unix `compress` (LZW), the archive's legacy format.
    UnixZ,
    Gzip,
}

impl Compression {
    pub fn suffix(self) -> &'static str {
        match self {
            Compression::UnixZ => ".Z",
            Compression::Gzip => ".gz",
        }
    }

    /// Leading bytes every file in this format starts with.
    pub fn magic(self) -> [u8; 2] {
        match self {
            Compression::UnixZ => [0x1f, 0x9d],
            Compression::Gzip => [0x1f, 0x8b],
        }
    }

    pub fn from_path(path: &std::path::Path) -> Option<Compression> {
        let name = path.file_name()?.to_str()?;
        if name.ends_with(".gz") {
            Some(Compression::Gzip)
        } else if name.ends_with(".Z") {
            Some(Compression::UnixZ)
        } else {
            None
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub enum CompressionRule {
    Fixed(Compression),
    /// Dates strictly before `date` use `before`; `date` and later use `from`.
    Cutover {
        date: NaiveDate,
        before: Compression,
        from: Compression,
    },
}

impl CompressionRule {
    pub fn for_date(&self, date: NaiveDate) -> Compression {
        match *self {
            CompressionRule::Fixed(c) => c,
            CompressionRule::Cutover { date: cut, before, from } => {
                if date < cut {
                    before
                } else {
                    from
                }
            }
        }
    }
}

#[derive(Debug)]
pub struct FileTypeProfile {
    pub key: &'static str,
    pub description: &'static str,
    /// Relative to the archive base; placeholders `{yyyy}`, `{ddd}`, `{yy}`.
    pub directory: &'static str,
    /// Same placeholders plus `{ext}` for the compression suffix.
    pub filename: &'static str,
    pub compression: CompressionRule,
    pub earliest: NaiveDate,
    pub latest: Option<NaiveDate>,
    /// Product to try when this one is missing for a date.
    pub fallback: Option<FileType>,
}

impl FileTypeProfile {
    pub fn covers(&self, date: NaiveDate) -> bool {
        date >= self.earliest && self.latest.is_none_or(|latest| date <= latest)
    }

    pub fn window(&self) -> String {
        match self.latest {
            Some(latest) => format!("{} to {}", self.earliest, latest),
            None => format!("from {}", self.earliest),
        }
    }
}

const fn ymd(y: i32, m: u32, d: u32) -> NaiveDate {
    match NaiveDate::from_ymd_opt(y, m, d) {
        Some(d) => d,
        None => panic!("invalid profile date"),
    }
}

pub static PROFILES: [FileTypeProfile; 5] = [
    FileTypeProfile {
        key: "rinex-v2-gps",
        description: "Daily RINEX v2 GPS broadcast ephemeris (brdc)",
        directory: "gnss/data/daily/{yyyy}/{ddd}/{yy}n/",
        filename: "brdc{ddd}0.{yy}n{ext}",
        compression: CompressionRule::Cutover {
            date: ymd(2020, 12, 1),
            before: Compression::UnixZ,
            from: Compression::Gzip,
        },
        earliest: ymd(1992, 1, 1),
        latest: None,
        fallback: None,
    },
    FileTypeProfile {
        key: "rinex-v3-gnss",
        description: "Daily RINEX v3 multi-GNSS broadcast ephemeris (IGS combined)",
        directory: "gnss/data/daily/{yyyy}/{ddd}/{yy}p/",
        filename: "BRDC00IGS_R_{yyyy}{ddd}0000_01D_MN.rnx{ext}",
        compression: CompressionRule::Fixed(Compression::Gzip),
        earliest: ymd(2016, 1, 1),
        latest: None,
        fallback: None,
    },
    FileTypeProfile {
        key: "rinex-v4-gnss",
        description: "Daily RINEX v4 multi-GNSS broadcast ephemeris (DLR)",
        directory: "gnss/data/daily/{yyyy}/brdc/",
        filename: "BRD400DLR_S_{yyyy}{ddd}0000_01D_MN.rnx{ext}",
        compression: CompressionRule::Fixed(Compression::Gzip),
        earliest: ymd(2023, 1, 1),
        latest: None,
        fallback: None,
    },
    FileTypeProfile {
        key: "ionex-v1",
        description: "IGS final global ionosphere maps, short names",
        directory: "gnss/products/ionex/{yyyy}/{ddd}/",
        filename: "igsg{ddd}0.{yy}i{ext}",
        compression: CompressionRule::Fixed(Compression::UnixZ),
        earliest: ymd(1998, 6, 1),
        latest: Some(ymd(2022, 11, 26)),
        fallback: Some(FileType::IonexV2),
    },
    FileTypeProfile {
        key: "ionex-v2",
        description: "IGS final global ionosphere maps, long names",
        directory: "gnss/products/ionex/{yyyy}/{ddd}/",
        filename: "IGS0OPSFIN_{yyyy}{ddd}0000_01D_02H_GIM.INX{ext}",
        compression: CompressionRule::Fixed(Compression::Gzip),
        earliest: ymd(2022, 11, 27),
        latest: None,
        fallback: Some(FileType::IonexV1),
    },
];
