//! Derived metric tables.
//!
//! [`daily`] rebuilds `product_performance_enhanced` for a date range from
//! stored orders; [`summary`] rebuilds `product_analytics_summary` from the
//! daily rows.

pub mod daily;
pub mod summary;

use chrono::{Days, NaiveDate};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use utoipa::ToSchema;

pub use daily::{AggregationReport, FailedKey, aggregate_daily, build_daily_rows};
pub use summary::{SummaryReport, build_summaries, summarize_products};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("date range start {start} is after end {end}")]
pub struct InvalidDateRange {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

/// Inclusive range of calendar dates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct DateRange {
    #[schema(value_type = String, format = Date)]
    pub start: NaiveDate,
    #[schema(value_type = String, format = Date)]
    pub end: NaiveDate,
}

impl DateRange {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Result<Self, InvalidDateRange> {
        if start > end {
            return Err(InvalidDateRange { start, end });
        }
        Ok(Self { start, end })
    }

    pub fn single(day: NaiveDate) -> Self {
        Self {
            start: day,
            end: day,
        }
    }

    /// The `days` calendar days ending at `end` (inclusive). Zero days is treated as one.
    pub fn trailing(end: NaiveDate, days: u32) -> Self {
        let back = u64::from(days.max(1) - 1);
        let start = end.checked_sub_days(Days::new(back)).unwrap_or(NaiveDate::MIN);
        Self { start, end }
    }

    /// The range of equal length immediately before this one.
    pub fn preceding(&self) -> Self {
        let end = self.start.pred_opt().unwrap_or(NaiveDate::MIN);
        Self::trailing(end, self.days())
    }

    pub fn contains(&self, day: NaiveDate) -> bool {
        self.start <= day && day <= self.end
    }

    pub fn days(&self) -> u32 {
        let span = self.end.signed_duration_since(self.start).num_days() + 1;
        u32::try_from(span).unwrap_or(u32::MAX)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn day(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    #[test]
    fn reversed_range_is_rejected() {
        let err = DateRange::new(day("2025-01-05"), day("2025-01-04")).unwrap_err();
        assert_eq!(err.start, day("2025-01-05"));
    }

    #[test]
    fn trailing_window_is_inclusive() {
        let range = DateRange::trailing(day("2025-01-10"), 7);
        assert_eq!(range.start, day("2025-01-04"));
        assert_eq!(range.days(), 7);
        assert!(range.contains(day("2025-01-04")));
        assert!(range.contains(day("2025-01-10")));
        assert!(!range.contains(day("2025-01-03")));
    }

    #[test]
    fn preceding_window_has_same_length() {
        let range = DateRange::trailing(day("2025-01-10"), 7);
        let prev = range.preceding();
        assert_eq!(prev.start, day("2024-12-28"));
        assert_eq!(prev.end, day("2025-01-03"));
    }
}
