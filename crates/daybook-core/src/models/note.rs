//! Note model

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Days, Local, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::error::Error;

const MAX_PATH_LEN: usize = 128;
const DATE_PATH_FORMAT: &str = "%Y%m%d";

/// Key of a note, typically a `YYYYMMDD` date.
///
/// Only ASCII alphanumerics, `-` and `_` are accepted so a path can never
/// escape the notes directory on the server.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct NotePath(String);

impl NotePath {
    pub fn parse(raw: &str) -> Result<Self, Error> {
        let trimmed = raw.trim().trim_matches('/');
        if trimmed.is_empty() {
            return Err(Error::Validation("note path must not be empty".to_string()));
        }
        if trimmed.len() > MAX_PATH_LEN {
            return Err(Error::Validation(format!(
                "note path must be at most {MAX_PATH_LEN} characters"
            )));
        }
        if !trimmed
            .chars()
            .all(|ch| ch.is_ascii_alphanumeric() || ch == '-' || ch == '_')
        {
            return Err(Error::Validation(format!(
                "note path '{trimmed}' may only contain letters, digits, '-' and '_'"
            )));
        }
        Ok(Self(trimmed.to_string()))
    }

    /// Accepts `YYYY-MM-DD` as typed into a date picker as well as plain paths.
    pub fn from_user_input(raw: &str) -> Result<Self, Error> {
        let trimmed = raw.trim();
        if NaiveDate::parse_from_str(trimmed, "%Y-%m-%d").is_ok() {
            return Self::parse(&trimmed.replace('-', ""));
        }
        Self::parse(trimmed)
    }

    pub fn from_date(date: NaiveDate) -> Self {
        Self(date.format(DATE_PATH_FORMAT).to_string())
    }

    /// Path for the current local date.
    pub fn today() -> Self {
        Self::from_date(Local::now().date_naive())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The date this path names, if it is a `YYYYMMDD` path.
    pub fn date(&self) -> Option<NaiveDate> {
        if self.0.len() != 8 {
            return None;
        }
        NaiveDate::parse_from_str(&self.0, DATE_PATH_FORMAT).ok()
    }

    /// Previous/next day navigation.
    pub fn shift_days(&self, offset: i64) -> Result<Self, Error> {
        let date = self.date().ok_or_else(|| {
            Error::Validation(format!("note path '{}' is not a date", self.0))
        })?;
        let shifted = if offset >= 0 {
            date.checked_add_days(Days::new(offset.unsigned_abs()))
        } else {
            date.checked_sub_days(Days::new(offset.unsigned_abs()))
        };
        shifted
            .map(Self::from_date)
            .ok_or_else(|| Error::Validation("date offset out of range".to_string()))
    }

    /// `YYYY-MM-DD` for date paths, the raw path otherwise.
    pub fn display_label(&self) -> String {
        self.date().map_or_else(
            || self.0.clone(),
            |date| date.format("%Y-%m-%d").to_string(),
        )
    }
}

impl fmt::Display for NotePath {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(&self.0)
    }
}

impl FromStr for NotePath {
    type Err = Error;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        Self::parse(raw)
    }
}

impl TryFrom<String> for NotePath {
    type Error = Error;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<NotePath> for String {
    fn from(path: NotePath) -> Self {
        path.0
    }
}

impl AsRef<str> for NotePath {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Entry of the notes listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NoteSummary {
    pub path: String,
    pub last_modified: DateTime<Utc>,
    pub size: u64,
}

/// Timestamped copy of a note taken by a history-creating save.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistorySnapshot {
    /// Unix ms, unique per note
    pub timestamp: i64,
    pub content: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_accepts_date_and_named_paths() {
        assert_eq!(NotePath::parse("20240101").unwrap().as_str(), "20240101");
        assert_eq!(NotePath::parse(" /ideas_2024-q1/ ").unwrap().as_str(), "ideas_2024-q1");
    }

    #[test]
    fn parse_rejects_traversal_and_separators() {
        assert!(NotePath::parse("").is_err());
        assert!(NotePath::parse("..").is_err());
        assert!(NotePath::parse("a/b").is_err());
        assert!(NotePath::parse("a.md").is_err());
        assert!(NotePath::parse(&"x".repeat(MAX_PATH_LEN + 1)).is_err());
    }

    #[test]
    fn user_input_strips_date_dashes() {
        assert_eq!(
            NotePath::from_user_input("2024-03-09").unwrap().as_str(),
            "20240309"
        );
        assert_eq!(NotePath::from_user_input("inbox").unwrap().as_str(), "inbox");
    }

    #[test]
    fn shift_days_crosses_month_and_year() {
        let path = NotePath::parse("20231231").unwrap();
        assert_eq!(path.shift_days(1).unwrap().as_str(), "20240101");
        assert_eq!(path.shift_days(-31).unwrap().as_str(), "20231130");
        assert!(NotePath::parse("inbox").unwrap().shift_days(1).is_err());
    }

    #[test]
    fn display_label_formats_dates() {
        assert_eq!(NotePath::parse("20240101").unwrap().display_label(), "2024-01-01");
        assert_eq!(NotePath::parse("inbox").unwrap().display_label(), "inbox");
    }

    #[test]
    fn note_summary_uses_camel_case() {
        let summary = NoteSummary {
            path: "20240101".to_string(),
            last_modified: DateTime::from_timestamp(1_704_067_200, 0).unwrap(),
            size: 3,
        };
        let json = serde_json::to_value(&summary).unwrap();
        assert!(json.get("lastModified").is_some());
    }
}
