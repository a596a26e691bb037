//! Named reporting periods and the half-open time windows they resolve to.
//!
//! Periods are resolved on the ward's local calendar (a fixed UTC offset), so
//! "today" in a ward at UTC+05:30 starts at 18:30 UTC of the previous day.

use std::str::FromStr;

use chrono::{
    DateTime, Datelike, Duration, FixedOffset, Months, NaiveDate, NaiveDateTime, TimeZone, Utc,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PeriodError {
    #[error("unknown period {0:?}")]
    Unknown(String),

    #[error("a custom period needs both a start and an end date")]
    MissingCustomBounds,

    #[error("period end {end} is before its start {start}")]
    EndBeforeStart { start: NaiveDate, end: NaiveDate },

    #[error("period falls outside the supported calendar range")]
    OutOfRange,
}

/// `[start, end)`; a missing bound is open.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TimeWindow {
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
}

impl TimeWindow {
    pub const UNBOUNDED: TimeWindow = TimeWindow {
        start: None,
        end: None,
    };

    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self {
            start: Some(start),
            end: Some(end),
        }
    }

    pub fn contains(&self, at: DateTime<Utc>) -> bool {
        self.start.map_or(true, |s| at >= s) && self.end.map_or(true, |e| at < e)
    }

    /// Whether an interval starting at `from` and running until `to` (open
    /// when `None`) touches the window.
    pub fn overlaps(&self, from: DateTime<Utc>, to: Option<DateTime<Utc>>) -> bool {
        let starts_before_end = self.end.map_or(true, |e| from < e);
        let ends_after_start = match (self.start, to) {
            (Some(s), Some(to)) => to >= s,
            _ => true,
        };
        starts_before_end && ends_after_start
    }

    pub fn span_days(&self) -> Option<i64> {
        match (self.start, self.end) {
            (Some(s), Some(e)) => Some((e - s).num_days()),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Period {
    Today,
    Yesterday,
    ThisWeek,
    LastWeek,
    ThisMonth,
    LastMonth,
    Last7Days,
    Last30Days,
    Last3Months,
    ThisYear,
    LastYear,
    AllTime,
    Custom { start: NaiveDate, end: NaiveDate },
}

impl FromStr for Period {
    type Err = PeriodError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let period = match s.trim().to_ascii_lowercase().replace(['-', ' '], "_").as_str() {
            "today" => Period::Today,
            "yesterday" => Period::Yesterday,
            "this_week" | "week" => Period::ThisWeek,
            "last_week" => Period::LastWeek,
            "this_month" | "month" => Period::ThisMonth,
            "last_month" => Period::LastMonth,
            "last_7_days" | "7d" => Period::Last7Days,
            "last_30_days" | "30d" => Period::Last30Days,
            "last_3_months" | "3m" => Period::Last3Months,
            "this_year" | "year" => Period::ThisYear,
            "last_year" => Period::LastYear,
            "all" | "all_time" => Period::AllTime,
            "custom" => return Err(PeriodError::MissingCustomBounds),
            _ => return Err(PeriodError::Unknown(s.to_string())),
        };
        Ok(period)
    }
}

impl Period {
    pub fn custom(start: NaiveDate, end: NaiveDate) -> Result<Self, PeriodError> {
        if end < start {
            return Err(PeriodError::EndBeforeStart { start, end });
        }
        Ok(Period::Custom { start, end })
    }

    pub fn label(&self) -> String {
        match self {
            Period::Today => "Today".into(),
            Period::Yesterday => "Yesterday".into(),
            Period::ThisWeek => "This Week".into(),
            Period::LastWeek => "Last Week".into(),
            Period::ThisMonth => "This Month".into(),
            Period::LastMonth => "Last Month".into(),
            Period::Last7Days => "Last 7 Days".into(),
            Period::Last30Days => "Last 30 Days".into(),
            Period::Last3Months => "Last 3 Months".into(),
            Period::ThisYear => "This Year".into(),
            Period::LastYear => "Last Year".into(),
            Period::AllTime => "All Time".into(),
            Period::Custom { start, end } => format!("{} to {}", start, end),
        }
    }

    /// Resolves the period against `now` on a calendar `offset` away from UTC.
    pub fn resolve(
        &self,
        now: DateTime<Utc>,
        offset: FixedOffset,
    ) -> Result<TimeWindow, PeriodError> {
        let today = now.with_timezone(&offset).date_naive();
        let day = |d: NaiveDate, n: i64| {
            d.checked_add_signed(Duration::days(n))
                .ok_or(PeriodError::OutOfRange)
        };
        let month_start = first_of_month(today)?;
        let year_start = NaiveDate::from_ymd_opt(today.year(), 1, 1).ok_or(PeriodError::OutOfRange)?;
        let monday = day(today, -(today.weekday().num_days_from_monday() as i64))?;

        let (start, end) = match *self {
            Period::AllTime => return Ok(TimeWindow::UNBOUNDED),
            Period::Today => (today, day(today, 1)?),
            Period::Yesterday => (day(today, -1)?, today),
            Period::ThisWeek => (monday, day(monday, 7)?),
            Period::LastWeek => (day(monday, -7)?, monday),
            Period::ThisMonth => (month_start, add_months(month_start, 1)?),
            Period::LastMonth => (sub_months(month_start, 1)?, month_start),
            Period::Last7Days => (day(today, -6)?, day(today, 1)?),
            Period::Last30Days => (day(today, -29)?, day(today, 1)?),
            Period::Last3Months => (sub_months(today, 3)?, day(today, 1)?),
            Period::ThisYear => (year_start, add_months(year_start, 12)?),
            Period::LastYear => (sub_months(year_start, 12)?, year_start),
            Period::Custom { start, end } => {
                if end < start {
                    return Err(PeriodError::EndBeforeStart { start, end });
                }
                (start, day(end, 1)?)
            }
        };

        Ok(TimeWindow::new(
            local_midnight(start, offset)?,
            local_midnight(end, offset)?,
        ))
    }
}

fn first_of_month(d: NaiveDate) -> Result<NaiveDate, PeriodError> {
    NaiveDate::from_ymd_opt(d.year(), d.month(), 1).ok_or(PeriodError::OutOfRange)
}

fn add_months(d: NaiveDate, n: u32) -> Result<NaiveDate, PeriodError> {
    d.checked_add_months(Months::new(n)).ok_or(PeriodError::OutOfRange)
}

fn sub_months(d: NaiveDate, n: u32) -> Result<NaiveDate, PeriodError> {
    d.checked_sub_months(Months::new(n)).ok_or(PeriodError::OutOfRange)
}

/// Midnight of `date` on the local calendar, as a UTC instant.
pub fn local_midnight(date: NaiveDate, offset: FixedOffset) -> Result<DateTime<Utc>, PeriodError> {
    let local: NaiveDateTime = date.and_hms_opt(0, 0, 0).ok_or(PeriodError::OutOfRange)?;
    offset
        .from_local_datetime(&local)
        .single()
        .map(|dt| dt.with_timezone(&Utc))
        .ok_or(PeriodError::OutOfRange)
}

/// Query-string form: `?period=last_month` or `?period=custom&start=2024-01-01&end=2024-01-31`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PeriodQuery {
    pub period: Option<String>,
    pub start: Option<NaiveDate>,
    pub end: Option<NaiveDate>,
}

impl PeriodQuery {
    /// `None` when the query names no period at all.
    pub fn period(&self) -> Result<Option<Period>, PeriodError> {
        let is_custom = self
            .period
            .as_deref()
            .map_or(false, |p| p.trim().eq_ignore_ascii_case("custom"));

        match (&self.period, self.start, self.end) {
            (Some(_), start, end) if is_custom => match (start, end) {
                (Some(start), Some(end)) => Period::custom(start, end).map(Some),
                _ => Err(PeriodError::MissingCustomBounds),
            },
            (Some(name), _, _) => name.parse().map(Some),
            (None, Some(start), Some(end)) => Period::custom(start, end).map(Some),
            (None, None, None) => Ok(None),
            (None, _, _) => Err(PeriodError::MissingCustomBounds),
        }
    }
}
