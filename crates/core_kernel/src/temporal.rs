//! Civil date ranges
//!
//! Accounting periods and entry dates are civil dates with no time zone.
//! A `DateRange` is inclusive at both ends, so an entry dated on a period's
//! start or end date belongs to that period.

use chrono::{Datelike, Months, NaiveDate};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors related to temporal operations
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TemporalError {
    #[error("Invalid range: start {start} must not be after end {end}")]
    InvalidRange { start: NaiveDate, end: NaiveDate },

    #[error("Invalid calendar date: {0}")]
    InvalidDate(String),
}

/// An inclusive range of civil dates
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DateRange {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateRange {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Result<Self, TemporalError> {
        if start > end {
            return Err(TemporalError::InvalidRange { start, end });
        }
        Ok(Self { start, end })
    }

    /// The calendar month containing `year`/`month`
    pub fn month(year: i32, month: u32) -> Result<Self, TemporalError> {
        let start = NaiveDate::from_ymd_opt(year, month, 1)
            .ok_or_else(|| TemporalError::InvalidDate(format!("{}-{:02}", year, month)))?;
        let end = start
            .checked_add_months(Months::new(1))
            .and_then(|next| next.pred_opt())
            .ok_or_else(|| TemporalError::InvalidDate(format!("end of {}-{:02}", year, month)))?;
        Self::new(start, end)
    }

    /// The calendar quarter `quarter` (1-4) of `year`
    pub fn quarter(year: i32, quarter: u32) -> Result<Self, TemporalError> {
        if !(1..=4).contains(&quarter) {
            return Err(TemporalError::InvalidDate(format!("{} Q{}", year, quarter)));
        }
        let first = Self::month(year, (quarter - 1) * 3 + 1)?;
        let last = Self::month(year, quarter * 3)?;
        Self::new(first.start, last.end)
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        date >= self.start && date <= self.end
    }

    pub fn overlaps(&self, other: &DateRange) -> bool {
        self.start <= other.end && other.start <= self.end
    }

    /// True when `other` begins the day after this range ends
    pub fn is_followed_by(&self, other: &DateRange) -> bool {
        self.end.succ_opt() == Some(other.start)
    }

    /// Number of days covered, counting both ends
    pub fn days(&self) -> i64 {
        (self.end - self.start).num_days() + 1
    }

    pub fn year(&self) -> i32 {
        self.start.year()
    }
}
