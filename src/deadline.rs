//! Portal date parsing, remaining-time classification, and display.
//!
//! Portal dates look like `Friday، 17 January 2025، 11:59 PM` (English
//! names, Arabic commas) and are read in the configured operating offset.
//! Day counts use the calendar-day basis: a deadline later today is `0`,
//! yesterday is `-1`.

use std::sync::Arc;

use chrono::{DateTime, Datelike, Duration, FixedOffset, NaiveDate, NaiveTime, TimeZone, Utc};
use regex::Regex;

use crate::calendar::{persian_weekday, CalendarFormatter};
use crate::models::course::DateText;
use crate::{AppError, Result};

const DATE_PATTERN: &str = r"(\w+)،\s*(\d+)\s+(\w+)\s+(\d+)،\s*(.+)";
const TIME_PATTERN: &str = r"(?i)(\d+):(\d+)\s*(AM|PM)";

const MILLIS_PER_DAY: i64 = 86_400_000;

/// Parsed view of a portal date string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeadlineInfo {
    /// Exact instant, when the text parsed.
    pub instant: Option<DateTime<Utc>>,
    /// Whole calendar days until the deadline's local day.
    pub days_remaining: Option<i64>,
    /// Text for messages; the raw input when parsing failed.
    pub display: String,
}

impl DeadlineInfo {
    /// Urgency band of this deadline.
    #[must_use]
    pub fn urgency(&self) -> Urgency {
        Urgency::from_days(self.days_remaining)
    }

    /// Whether the deadline's day has passed.
    #[must_use]
    pub fn is_passed(&self) -> bool {
        self.days_remaining.is_some_and(|days| days < 0)
    }
}

/// Remaining-time band, checked in declaration order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Urgency {
    /// Deadline day is in the past.
    Passed,
    /// Deadline is today.
    DueToday,
    /// Deadline is tomorrow.
    OneDayLeft,
    /// Two or three days left.
    Urgent,
    /// Four to seven days left.
    Soon,
    /// More than a week left.
    Comfortable,
    /// Date could not be read.
    Unknown,
}

impl Urgency {
    /// Band for a day count.
    #[must_use]
    pub fn from_days(days: Option<i64>) -> Self {
        match days {
            None => Self::Unknown,
            Some(d) if d < 0 => Self::Passed,
            Some(0) => Self::DueToday,
            Some(1) => Self::OneDayLeft,
            Some(d) if d <= 3 => Self::Urgent,
            Some(d) if d <= 7 => Self::Soon,
            Some(_) => Self::Comfortable,
        }
    }
}

/// Parses portal dates against an injected `now`.
#[derive(Clone)]
pub struct DeadlineTracker {
    offset: FixedOffset,
    calendar: Option<Arc<dyn CalendarFormatter>>,
    date_re: Regex,
    time_re: Regex,
}

impl std::fmt::Debug for DeadlineTracker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeadlineTracker")
            .field("offset", &self.offset)
            .field("calendar", &self.calendar.is_some())
            .finish_non_exhaustive()
    }
}

impl DeadlineTracker {
    /// Tracker for the given operating offset, rendering Gregorian dates.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if the date patterns fail to compile.
    pub fn new(offset: FixedOffset) -> Result<Self> {
        let compile = |pattern: &str| {
            Regex::new(pattern)
                .map_err(|err| AppError::Config(format!("invalid date pattern: {err}")))
        };
        Ok(Self {
            offset,
            calendar: None,
            date_re: compile(DATE_PATTERN)?,
            time_re: compile(TIME_PATTERN)?,
        })
    }

    /// Render dates in a secondary calendar.
    #[must_use]
    pub fn with_calendar(mut self, calendar: Arc<dyn CalendarFormatter>) -> Self {
        self.calendar = Some(calendar);
        self
    }

    /// Operating offset.
    #[must_use]
    pub fn offset(&self) -> FixedOffset {
        self.offset
    }

    /// Parse `text` relative to `now`. Never fails; unreadable input comes
    /// back verbatim with no instant.
    #[must_use]
    pub fn parse(&self, text: &str, now: DateTime<Utc>) -> DeadlineInfo {
        let Some((date, time)) = self.parse_parts(text) else {
            return DeadlineInfo {
                instant: None,
                days_remaining: None,
                display: text.to_owned(),
            };
        };

        let instant = self.localize(date, time.unwrap_or(NaiveTime::MIN));
        let days_remaining = self
            .localize(date, NaiveTime::MIN)
            .map(|midnight| days_until(midnight, now));

        let clock = time.map_or_else(
            || self.raw_time(text).unwrap_or_default(),
            |t| t.format("%H:%M").to_string(),
        );

        DeadlineInfo {
            instant,
            days_remaining,
            display: format!(
                "{}، {} - ساعت {clock}",
                persian_weekday(date.weekday()),
                self.format_date(date)
            ),
        }
    }

    /// Parse an optional stored date; the unknown sentinel yields no
    /// instant and displays as-is.
    #[must_use]
    pub fn parse_text(&self, text: &DateText, now: DateTime<Utc>) -> DeadlineInfo {
        self.parse(text.as_str(), now)
    }

    /// Exact instant of a portal date string.
    #[must_use]
    pub fn instant(&self, text: &str) -> Option<DateTime<Utc>> {
        let (date, time) = self.parse_parts(text)?;
        self.localize(date, time.unwrap_or(NaiveTime::MIN))
    }

    /// Whether the deadline's day has passed. The single expiry predicate
    /// used by reconciliation, overviews, and pruning.
    #[must_use]
    pub fn is_expired(&self, text: &str, now: DateTime<Utc>) -> bool {
        self.parse(text, now).is_passed()
    }

    /// Time left until `instant`; negative once it has passed.
    #[must_use]
    pub fn time_remaining(instant: DateTime<Utc>, now: DateTime<Utc>) -> Duration {
        instant - now
    }

    /// Whole hours left until `instant`.
    #[must_use]
    pub fn hours_remaining(instant: DateTime<Utc>, now: DateTime<Utc>) -> i64 {
        Self::time_remaining(instant, now).num_hours()
    }

    /// Local date and time of `now`, for "last checked" stamps.
    #[must_use]
    pub fn stamp(&self, now: DateTime<Utc>) -> String {
        let local = now.with_timezone(&self.offset);
        let date = local.date_naive();
        let day = self
            .calendar
            .as_ref()
            .and_then(|calendar| calendar.format_numeric(date))
            .unwrap_or_else(|| date.format("%Y/%m/%d").to_string());
        format!("{day}, {}", local.format("%H:%M:%S"))
    }

    fn format_date(&self, date: NaiveDate) -> String {
        self.calendar
            .as_ref()
            .and_then(|calendar| calendar.format_date(date))
            .unwrap_or_else(|| date.format("%Y-%m-%d").to_string())
    }

    fn parse_parts(&self, text: &str) -> Option<(NaiveDate, Option<NaiveTime>)> {
        let caps = self.date_re.captures(text)?;
        let day: u32 = caps.get(2)?.as_str().parse().ok()?;
        let month = month_number(caps.get(3)?.as_str())?;
        let year: i32 = caps.get(4)?.as_str().parse().ok()?;
        let date = NaiveDate::from_ymd_opt(year, month, day)?;

        let time = caps.get(5).and_then(|raw| self.parse_clock(raw.as_str()));
        Some((date, time))
    }

    fn parse_clock(&self, raw: &str) -> Option<NaiveTime> {
        let caps = self.time_re.captures(raw)?;
        let mut hours: u32 = caps.get(1)?.as_str().parse().ok()?;
        let minutes: u32 = caps.get(2)?.as_str().parse().ok()?;
        let pm = caps.get(3)?.as_str().eq_ignore_ascii_case("PM");
        if pm && hours != 12 {
            hours += 12;
        } else if !pm && hours == 12 {
            hours = 0;
        }
        NaiveTime::from_hms_opt(hours, minutes, 0)
    }

    fn raw_time(&self, text: &str) -> Option<String> {
        self.date_re
            .captures(text)
            .and_then(|caps| caps.get(5))
            .map(|raw| raw.as_str().trim().to_owned())
    }

    fn localize(&self, date: NaiveDate, time: NaiveTime) -> Option<DateTime<Utc>> {
        self.offset
            .from_local_datetime(&date.and_time(time))
            .single()
            .map(|local| local.with_timezone(&Utc))
    }
}

/// `ceil((target - now) / 1 day)`.
fn days_until(target: DateTime<Utc>, now: DateTime<Utc>) -> i64 {
    let diff = (target - now).num_milliseconds();
    if diff > 0 {
        (diff + MILLIS_PER_DAY - 1) / MILLIS_PER_DAY
    } else {
        diff / MILLIS_PER_DAY
    }
}

fn month_number(name: &str) -> Option<u32> {
    let month = match name {
        "January" => 1,
        "February" => 2,
        "March" => 3,
        "April" => 4,
        "May" => 5,
        "June" => 6,
        "July" => 7,
        "August" => 8,
        "September" => 9,
        "October" => 10,
        "November" => 11,
        "December" => 12,
        _ => return None,
    };
    Some(month)
}
