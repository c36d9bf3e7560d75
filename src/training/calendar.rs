//! Contract calendar: maps calendar dates onto contract years and the
//! fixed schedule start-month buckets.
//!
//! Contract year Y spans 1 June Y through 31 May Y+1, so November and
//! December sit in the same contract year as the following January and
//! February. Everything here is pure arithmetic on the date.

use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};

/// The contract year containing `date`.
pub fn contract_year(date: NaiveDate) -> i32 {
    if date.month() >= 6 {
        date.year()
    } else {
        date.year() - 1
    }
}

/// Start-month bucket a schedule identifier is keyed on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MonthBucket {
    September,
    January,
    April,
}

impl MonthBucket {
    pub const fn label(self) -> &'static str {
        match self {
            Self::September => "september",
            Self::January => "january",
            Self::April => "april",
        }
    }
}

/// The schedule start-month bucket for `date`, evaluated within the
/// contract year containing it: Jun-Oct starts September, Nov-Feb starts
/// January, Mar-May starts April.
pub fn schedule_month_bucket(date: NaiveDate) -> MonthBucket {
    match date.month() {
        6..=10 => MonthBucket::September,
        11 | 12 | 1 | 2 => MonthBucket::January,
        _ => MonthBucket::April,
    }
}

/// Identifier of the standard schedule starting in `bucket`.
pub fn standard_identifier(bucket: MonthBucket) -> String {
    format!("ecf-standard-{}", bucket.label())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(year: i32, month: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(year, month, day).expect("valid date")
    }

    #[test]
    fn contract_year_rolls_over_on_first_of_june() {
        assert_eq!(contract_year(date(2024, 5, 31)), 2023);
        assert_eq!(contract_year(date(2024, 6, 1)), 2024);
        assert_eq!(contract_year(date(2024, 12, 31)), 2024);
        assert_eq!(contract_year(date(2025, 1, 1)), 2024);
    }

    #[test]
    fn bucket_boundaries_map_exhaustively() {
        assert_eq!(schedule_month_bucket(date(2024, 6, 1)), MonthBucket::September);
        assert_eq!(schedule_month_bucket(date(2024, 10, 31)), MonthBucket::September);
        assert_eq!(schedule_month_bucket(date(2024, 11, 1)), MonthBucket::January);
        assert_eq!(schedule_month_bucket(date(2024, 12, 31)), MonthBucket::January);
        assert_eq!(schedule_month_bucket(date(2025, 1, 1)), MonthBucket::January);
        assert_eq!(schedule_month_bucket(date(2024, 2, 29)), MonthBucket::January);
        assert_eq!(schedule_month_bucket(date(2025, 3, 1)), MonthBucket::April);
        assert_eq!(schedule_month_bucket(date(2025, 5, 31)), MonthBucket::April);
    }

    #[test]
    fn november_and_following_january_share_a_contract_year() {
        let november = date(2024, 11, 15);
        let january = date(2025, 1, 15);
        assert_eq!(contract_year(november), contract_year(january));
        assert_eq!(schedule_month_bucket(november), schedule_month_bucket(january));
    }

    #[test]
    fn standard_identifier_formats_each_bucket() {
        assert_eq!(standard_identifier(MonthBucket::September), "ecf-standard-september");
        assert_eq!(standard_identifier(MonthBucket::January), "ecf-standard-january");
        assert_eq!(standard_identifier(MonthBucket::April), "ecf-standard-april");
    }
}
