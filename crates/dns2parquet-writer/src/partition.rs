//! Partition keys and Hive-style directory layout
//!
//! A partition directory looks like:
//! `{table}/year={year}/month={month}/day={day}/server={server}`

use chrono::{DateTime, Datelike, NaiveDate};
use std::fmt;
use std::path::{Path, PathBuf};

/// Identity of one output partition.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PartitionKey {
    pub year: i32,
    pub month: u32,
    pub day: u32,
    pub server: String,
}

impl PartitionKey {
    pub fn new(date: NaiveDate, server: &str) -> Self {
        Self {
            year: date.year(),
            month: date.month(),
            day: date.day(),
            server: sanitize_server_name(server),
        }
    }

    /// Key for a record captured at `millis` since the Unix epoch (UTC).
    ///
    /// Returns `None` when the timestamp is outside chrono's range.
    pub fn from_timestamp_millis(millis: i64, server: &str) -> Option<Self> {
        let dt = DateTime::from_timestamp_millis(millis)?;
        Some(Self::new(dt.date_naive(), server))
    }

    pub fn date(&self) -> Option<NaiveDate> {
        NaiveDate::from_ymd_opt(self.year, self.month, self.day)
    }

    /// Path of the partition relative to the table directory.
    pub fn relative_path(&self) -> PathBuf {
        PathBuf::from(format!("year={}", self.year))
            .join(format!("month={}", self.month))
            .join(format!("day={}", self.day))
            .join(format!("server={}", self.server))
    }

    /// Absolute partition directory below `<output>/<table>`.
    pub fn directory(&self, output: impl AsRef<Path>, table: &str) -> PathBuf {
        output.as_ref().join(table).join(self.relative_path())
    }
}

impl fmt::Display for PartitionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "year={}/month={}/day={}/server={}",
            self.year, self.month, self.day, self.server
        )
    }
}

/// Sanitize a server label for use in file paths.
///
/// Dots are kept so host names stay readable; everything else that is not
/// alphanumeric, `-` or `_` becomes `_`.
pub fn sanitize_server_name(name: &str) -> String {
    name.chars()
        .map(|c| {
            if c.is_alphanumeric() || c == '-' || c == '_' || c == '.' {
                c
            } else {
                '_'
            }
        })
        .collect()
}
