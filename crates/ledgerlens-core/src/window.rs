//! Chronological bucketing of transactions into slices.

use chrono::{DateTime, Datelike, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Label of the single slice produced by [`SliceWindow::All`].
pub const ALL_SLICE_LABEL: &str = "ALL";

/// Width of a time slice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SliceWindow {
    /// Calendar month, labelled `YYYY-MM`.
    #[default]
    Month,
    /// Calendar quarter, labelled `YYYY-Qn`.
    Quarter,
    /// Whole range in a single slice.
    All,
}

impl SliceWindow {
    /// Bucket label for a timestamp.
    ///
    /// Labels sort lexicographically in chronological order for years 0000-9999.
    #[must_use]
    pub fn label(&self, timestamp: &DateTime<Utc>) -> String {
        match self {
            SliceWindow::Month => timestamp.format("%Y-%m").to_string(),
            SliceWindow::Quarter => {
                let quarter = (timestamp.month() - 1) / 3 + 1;
                format!("{:04}-Q{}", timestamp.year(), quarter)
            }
            SliceWindow::All => ALL_SLICE_LABEL.to_string(),
        }
    }

    /// Returns the window name as a string.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            SliceWindow::Month => "month",
            SliceWindow::Quarter => "quarter",
            SliceWindow::All => "all",
        }
    }
}

impl fmt::Display for SliceWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for SliceWindow {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "month" | "m" | "monthly" => Ok(Self::Month),
            "quarter" | "q" | "quarterly" => Ok(Self::Quarter),
            "all" | "none" => Ok(Self::All),
            _ => Err(format!("Invalid slice window: {}", s)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_month_and_quarter_labels() {
        let ts = Utc.with_ymd_and_hms(2024, 11, 3, 0, 0, 0).unwrap();
        assert_eq!(SliceWindow::Month.label(&ts), "2024-11");
        assert_eq!(SliceWindow::Quarter.label(&ts), "2024-Q4");
        assert_eq!(SliceWindow::All.label(&ts), "ALL");

        let ts = Utc.with_ymd_and_hms(2023, 1, 31, 23, 59, 59).unwrap();
        assert_eq!(SliceWindow::Quarter.label(&ts), "2023-Q1");
    }

    #[test]
    fn test_parse_window() {
        assert_eq!("Q".parse::<SliceWindow>().unwrap(), SliceWindow::Quarter);
        assert_eq!("monthly".parse::<SliceWindow>().unwrap(), SliceWindow::Month);
        assert!("weekly".parse::<SliceWindow>().is_err());
    }
}
