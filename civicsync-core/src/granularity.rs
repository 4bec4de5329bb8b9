//! Period granularity of an indicator's date labels.
//!
//! Each indicator keeps a single granularity so that the series merger's
//! exact-string date comparison is meaningful: `2023` and `2023-02` never end
//! up interleaved in one series.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Granularity {
    /// `YYYY`
    Annual,
    /// `YYYY-MM`
    Monthly,
    /// `YYYY-MM-DD`
    Daily,
}

impl Granularity {
    /// True if `label` is a well-formed period label at this granularity.
    pub fn accepts(self, label: &str) -> bool {
        match self {
            Granularity::Annual => label.len() == 4 && label.bytes().all(|b| b.is_ascii_digit()),
            Granularity::Monthly => {
                label.len() == 7
                    && NaiveDate::parse_from_str(&format!("{label}-01"), "%Y-%m-%d").is_ok()
            }
            Granularity::Daily => {
                label.len() == 10 && NaiveDate::parse_from_str(label, "%Y-%m-%d").is_ok()
            }
        }
    }

    /// Period label for a calendar date at this granularity.
    pub fn label_for(self, date: NaiveDate) -> String {
        match self {
            Granularity::Annual => date.format("%Y").to_string(),
            Granularity::Monthly => date.format("%Y-%m").to_string(),
            Granularity::Daily => date.format("%Y-%m-%d").to_string(),
        }
    }
}

impl fmt::Display for Granularity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Granularity::Annual => "annual",
            Granularity::Monthly => "monthly",
            Granularity::Daily => "daily",
        };
        f.write_str(s)
    }
}
