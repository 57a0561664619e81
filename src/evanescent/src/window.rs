//! Rotation windows and the suffixes that name them.
//!
//! A rotated file is identified purely by its name: `<path>.<suffix>` while
//! uncompressed and `<path>.<suffix>.gz` once compressed, where the suffix
//! is the local start of the window the file was written in.

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use chrono::{DateTime, Duration, Local, NaiveDate, TimeZone};
use serde::{Deserialize, Serialize};

/// Extension appended to a rotated file once compressed.
pub const GZ_EXTENSION: &str = ".gz";

/// How often the live file is set aside.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum RotationPolicy {
    /// One file per local hour, suffix `YYYYMMDDHH`.
    Hourly,
    /// One file per local day, suffix `YYYYMMDD`.
    #[default]
    Daily,
}

impl RotationPolicy {
    /// Length of one rotation window.
    pub fn stride(&self) -> Duration {
        match self {
            Self::Hourly => Duration::hours(1),
            Self::Daily => Duration::days(1),
        }
    }

    /// `strftime` format of the suffix.
    pub fn format(&self) -> &'static str {
        match self {
            Self::Hourly => "%Y%m%d%H",
            Self::Daily => "%Y%m%d",
        }
    }

    /// Number of digits in every suffix produced by this policy.
    pub fn suffix_len(&self) -> usize {
        match self {
            Self::Hourly => 10,
            Self::Daily => 8,
        }
    }

    /// Formats `time` as the suffix of the window containing it.
    pub fn suffix(&self, time: &DateTime<Local>) -> String {
        time.format(self.format()).to_string()
    }

    /// Glob fragment matching exactly one suffix of this policy.
    pub fn match_pattern(&self) -> String {
        "[0-9]".repeat(self.suffix_len())
    }

    /// Parses a suffix back into the local start of its window.
    pub fn parse_suffix(&self, suffix: &str) -> Option<DateTime<Local>> {
        if suffix.len() != self.suffix_len() || !suffix.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }

        let date = NaiveDate::parse_from_str(&suffix[..8], "%Y%m%d").ok()?;
        let hour = match self {
            Self::Hourly => suffix[8..].parse::<u32>().ok()?,
            Self::Daily => 0,
        };
        let naive = date.and_hms_opt(hour, 0, 0)?;
        Local.from_local_datetime(&naive).earliest()
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Hourly => "hourly",
            Self::Daily => "daily",
        }
    }
}

/// `<path>.<suffix>`
pub fn rotated_path(path: &Path, suffix: &str) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(".");
    name.push(suffix);
    PathBuf::from(name)
}

/// `<path>.<suffix>.gz`
pub fn compressed_path(path: &Path, suffix: &str) -> PathBuf {
    let mut name = rotated_path(path, suffix).into_os_string();
    name.push(GZ_EXTENSION);
    PathBuf::from(name)
}

/// Glob matching every uncompressed rotated file of `path`.
///
/// `escaped` must already be passed through [`glob::Pattern::escape`].
pub fn uncompressed_pattern(escaped: &str, policy: RotationPolicy) -> String {
    format!("{escaped}.{}", policy.match_pattern())
}

/// Glob matching every compressed rotated file of `path`.
pub fn compressed_pattern(escaped: &str, policy: RotationPolicy) -> String {
    format!("{escaped}.{}{GZ_EXTENSION}", policy.match_pattern())
}

impl fmt::Display for RotationPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for RotationPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "hourly" => Ok(Self::Hourly),
            "daily" => Ok(Self::Daily),
            _ => Err(format!("Unknown rotation policy: {s}")),
        }
    }
}
