//! Time types for commodity delivery periods.
//!
//! This module provides:
//! - `Date`: type-safe daily date wrapper around chrono::NaiveDate
//! - `Month`: a calendar-month delivery period
//! - `Period`: the trait unifying delivery-period granularities, used to
//!   index forward curves, simulation panels and storage contracts
//!
//! # Examples
//!
//! ```
//! use storage_core::types::time::{Date, Period};
//!
//! let start = Date::from_ymd(2024, 1, 1).unwrap();
//! let end = start.offset(10);
//! assert_eq!(end - start, 10);
//! assert_eq!(end.offset_from(start), 10);
//! ```

use chrono::{Datelike, Duration, NaiveDate};
use std::fmt;
use std::hash::Hash;
use std::ops::Sub;
use std::str::FromStr;

use super::error::DateError;

/// A delivery period on a contiguous, evenly-indexable calendar.
///
/// A period type partitions time into consecutive intervals (days, months)
/// that can be stepped forwards and backwards by an integer offset. Forward
/// curves, inventory spaces and simulation panels are all indexed by a
/// period type, so the whole valuation is generic over the granularity of
/// the underlying market.
pub trait Period:
    Copy + Clone + Eq + Ord + Hash + fmt::Debug + fmt::Display + Send + Sync + 'static
{
    /// Returns the period `num_periods` steps after `self` (negative steps
    /// backwards).
    fn offset(self, num_periods: i32) -> Self;

    /// Returns the signed number of periods from `earlier` to `self`.
    ///
    /// `p.offset(n).offset_from(p) == n` for all `p` and `n`.
    fn offset_from(self, earlier: Self) -> i32;

    /// The first calendar day covered by this period.
    fn first_day(self) -> Date;

    /// The next period.
    fn next(self) -> Self {
        self.offset(1)
    }

    /// The previous period.
    fn previous(self) -> Self {
        self.offset(-1)
    }
}

/// Type-safe daily date wrapper around chrono::NaiveDate.
///
/// Doubles as the daily delivery period: `Date` implements [`Period`] with
/// one-day steps, which is the granularity used for daily-nominated gas
/// storage.
///
/// # Examples
///
/// ```
/// use storage_core::types::time::Date;
///
/// let date = Date::from_ymd(2024, 6, 15).unwrap();
/// assert_eq!(date.year(), 2024);
///
/// let parsed: Date = "2024-06-15".parse().unwrap();
/// assert_eq!(date, parsed);
/// ```
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(transparent))]
pub struct Date(NaiveDate);

impl Date {
    /// Creates a Date from year, month, and day components.
    ///
    /// # Examples
    ///
    /// ```
    /// use storage_core::types::time::Date;
    ///
    /// let date = Date::from_ymd(2024, 2, 29).unwrap();
    /// assert!(Date::from_ymd(2023, 2, 29).is_err());
    /// ```
    pub fn from_ymd(year: i32, month: u32, day: u32) -> Result<Self, DateError> {
        NaiveDate::from_ymd_opt(year, month, day)
            .map(Date)
            .ok_or(DateError::InvalidDate { year, month, day })
    }

    /// Parses a date from an ISO 8601 string (YYYY-MM-DD).
    pub fn parse(s: &str) -> Result<Self, DateError> {
        NaiveDate::parse_from_str(s, "%Y-%m-%d")
            .map(Date)
            .map_err(|e| DateError::ParseError(e.to_string()))
    }

    /// Returns the underlying NaiveDate for access to chrono's full API.
    pub fn into_inner(self) -> NaiveDate {
        self.0
    }

    /// Returns the year component.
    pub fn year(&self) -> i32 {
        self.0.year()
    }

    /// Returns the month component (1-12).
    pub fn month(&self) -> u32 {
        self.0.month()
    }

    /// Returns the day component (1-31).
    pub fn day(&self) -> u32 {
        self.0.day()
    }

    /// Returns the date `num_days` later (negative moves backwards).
    pub fn add_days(self, num_days: i64) -> Self {
        Date(self.0 + Duration::days(num_days))
    }
}

impl Period for Date {
    fn offset(self, num_periods: i32) -> Self {
        self.add_days(num_periods as i64)
    }

    fn offset_from(self, earlier: Self) -> i32 {
        (self - earlier) as i32
    }

    fn first_day(self) -> Date {
        self
    }
}

impl Sub for Date {
    type Output = i64;

    /// Returns the number of days between two dates, negative if `self` is
    /// earlier than `other`.
    fn sub(self, other: Self) -> i64 {
        (self.0 - other.0).num_days()
    }
}

impl FromStr for Date {
    type Err = DateError;

    fn from_str(s: &str) -> Result<Self, DateError> {
        Date::parse(s)
    }
}

impl fmt::Display for Date {
    /// Formats the date as ISO 8601 (YYYY-MM-DD).
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.format("%Y-%m-%d"))
    }
}

/// A calendar-month delivery period.
///
/// Used for monthly-nominated storage and monthly forward curves.
///
/// # Examples
///
/// ```
/// use storage_core::types::time::{Date, Month, Period};
///
/// let jan = Month::new(2024, 1).unwrap();
/// assert_eq!(jan.offset(13), Month::new(2025, 2).unwrap());
/// assert_eq!(jan.first_day(), Date::from_ymd(2024, 1, 1).unwrap());
/// ```
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Month {
    year: i32,
    month: u32,
}

impl Month {
    /// Creates a Month from year and month number (1-12).
    pub fn new(year: i32, month: u32) -> Result<Self, DateError> {
        if !(1..=12).contains(&month) {
            return Err(DateError::InvalidMonth(month));
        }
        Ok(Month { year, month })
    }

    /// The month containing the given date.
    pub fn containing(date: Date) -> Self {
        Month {
            year: date.year(),
            month: date.month(),
        }
    }

    /// Returns the year component.
    pub fn year(&self) -> i32 {
        self.year
    }

    /// Returns the month number (1-12).
    pub fn month(&self) -> u32 {
        self.month
    }
}

impl Period for Month {
    fn offset(self, num_periods: i32) -> Self {
        let zero_based = self.year * 12 + (self.month as i32 - 1) + num_periods;
        Month {
            year: zero_based.div_euclid(12),
            month: (zero_based.rem_euclid(12) + 1) as u32,
        }
    }

    fn offset_from(self, earlier: Self) -> i32 {
        (self.year - earlier.year) * 12 + (self.month as i32 - earlier.month as i32)
    }

    fn first_day(self) -> Date {
        // month is validated on construction so the date always exists
        Date(
            NaiveDate::from_ymd_opt(self.year, self.month, 1)
                .unwrap_or(NaiveDate::MIN),
        )
    }
}

impl fmt::Display for Month {
    /// Formats as YYYY-MM.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}-{:02}", self.year, self.month)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn date_from_ymd_valid() {
        let date = Date::from_ymd(2024, 6, 15).unwrap();
        assert_eq!(date.year(), 2024);
        assert_eq!(date.month(), 6);
        assert_eq!(date.day(), 15);
    }

    #[test]
    fn date_from_ymd_invalid() {
        assert!(Date::from_ymd(2024, 2, 30).is_err());
        assert!(Date::from_ymd(2024, 13, 1).is_err());
        assert!(Date::from_ymd(2023, 2, 29).is_err());
    }

    #[test]
    fn date_parse_and_display_roundtrip() {
        let date = Date::parse("2024-06-15").unwrap();
        assert_eq!(format!("{}", date), "2024-06-15");
        assert!(Date::parse("2024/06/15").is_err());
    }

    #[test]
    fn date_subtraction() {
        let start = Date::from_ymd(2024, 1, 1).unwrap();
        let end = Date::from_ymd(2024, 1, 11).unwrap();
        assert_eq!(end - start, 10);
        assert_eq!(start - end, -10);
    }

    #[test]
    fn date_period_offset_crosses_month_end() {
        let date = Date::from_ymd(2019, 8, 30).unwrap();
        assert_eq!(date.offset(2), Date::from_ymd(2019, 9, 1).unwrap());
        assert_eq!(date.offset(2).offset_from(date), 2);
        assert_eq!(date.next().previous(), date);
    }

    #[test]
    fn month_offset_wraps_years() {
        let jan = Month::new(2024, 1).unwrap();
        assert_eq!(jan.offset(13), Month::new(2025, 2).unwrap());
        assert_eq!(jan.offset(-1), Month::new(2023, 12).unwrap());
        assert_eq!(jan.offset(-1).offset_from(jan), -1);
    }

    #[test]
    fn month_invalid_number_rejected() {
        assert!(Month::new(2024, 0).is_err());
        assert!(Month::new(2024, 13).is_err());
    }

    #[test]
    fn month_first_day_and_display() {
        let month = Month::new(2024, 9).unwrap();
        assert_eq!(month.first_day(), Date::from_ymd(2024, 9, 1).unwrap());
        assert_eq!(format!("{}", month), "2024-09");
    }

    #[test]
    fn month_containing_date() {
        let date = Date::from_ymd(2024, 6, 15).unwrap();
        assert_eq!(Month::containing(date), Month::new(2024, 6).unwrap());
    }

    mod property_tests {
        use super::*;
        use proptest::prelude::*;

        fn date_strategy() -> impl Strategy<Value = Date> {
            (2000i32..2100i32, 1u32..13u32, 1u32..29u32)
                .prop_filter_map("valid date", |(y, m, d)| Date::from_ymd(y, m, d).ok())
        }

        proptest! {
            #[test]
            fn date_offset_roundtrips(date in date_strategy(), n in -2000i32..2000i32) {
                let shifted = date.offset(n);
                prop_assert_eq!(shifted.offset_from(date), n);
            }

            #[test]
            fn month_offset_roundtrips(y in 1990i32..2100i32, m in 1u32..13u32, n in -500i32..500i32) {
                let month = Month::new(y, m).unwrap();
                let shifted = month.offset(n);
                prop_assert_eq!(shifted.offset_from(month), n);
                prop_assert!((1..=12).contains(&shifted.month()));
            }
        }
    }
}
