//! Secondary-calendar rendering for user-facing dates.
//!
//! The portal reports Gregorian dates; subscribers read Solar Hijri
//! (Jalali) dates. Conversion follows the 2820-year break table used by the
//! common `jalaali` implementations, valid for Jalali years -61..3177.

use chrono::{Datelike, NaiveDate, Weekday};

/// Renders a civil date in a secondary calendar.
pub trait CalendarFormatter: Send + Sync {
    /// Long form such as `26 دی 1403`; `None` when the date is out of range.
    fn format_date(&self, date: NaiveDate) -> Option<String>;

    /// Numeric form such as `1403/10/26`; `None` when the date is out of range.
    fn format_numeric(&self, date: NaiveDate) -> Option<String>;
}

/// Solar Hijri calendar formatter.
#[derive(Debug, Clone, Copy, Default)]
pub struct JalaliCalendar;

impl CalendarFormatter for JalaliCalendar {
    fn format_date(&self, date: NaiveDate) -> Option<String> {
        let (year, month, day) = to_jalali(date)?;
        let month_name = JALALI_MONTHS.get(usize::try_from(month - 1).ok()?)?;
        Some(format!("{day:02} {month_name} {year}"))
    }

    fn format_numeric(&self, date: NaiveDate) -> Option<String> {
        let (year, month, day) = to_jalali(date)?;
        Some(format!("{year}/{month:02}/{day:02}"))
    }
}

const JALALI_MONTHS: [&str; 12] = [
    "فروردین",
    "اردیبهشت",
    "خرداد",
    "تیر",
    "مرداد",
    "شهریور",
    "مهر",
    "آبان",
    "آذر",
    "دی",
    "بهمن",
    "اسفند",
];

const BREAKS: [i64; 20] = [
    -61, 9, 38, 199, 426, 686, 756, 818, 1111, 1181, 1210, 1635, 2060, 2097, 2192, 2262, 2324,
    2394, 2456, 3178,
];

/// Persian weekday name.
#[must_use]
pub fn persian_weekday(day: Weekday) -> &'static str {
    match day {
        Weekday::Sun => "یکشنبه",
        Weekday::Mon => "دوشنبه",
        Weekday::Tue => "سه‌شنبه",
        Weekday::Wed => "چهارشنبه",
        Weekday::Thu => "پنج‌شنبه",
        Weekday::Fri => "جمعه",
        Weekday::Sat => "شنبه",
    }
}

/// Convert a Gregorian date to `(year, month, day)` in the Jalali calendar.
#[must_use]
pub fn to_jalali(date: NaiveDate) -> Option<(i64, i64, i64)> {
    let gy = i64::from(date.year());
    let gm = i64::from(date.month());
    let gd = i64::from(date.day());

    let jdn = gregorian_to_day_number(gy, gm, gd);
    let mut jy = gy - 621;
    let (leap, march) = jalali_year_info(jy)?;
    let mut k = jdn - gregorian_to_day_number(gy, 3, march);

    if k >= 0 {
        if k <= 185 {
            return Some((jy, 1 + k / 31, k % 31 + 1));
        }
        k -= 186;
    } else {
        jy -= 1;
        k += 179;
        if leap == 1 {
            k += 1;
        }
    }
    Some((jy, 7 + k / 30, k % 30 + 1))
}

/// Leap offset and the March day on which Farvardin 1 falls.
fn jalali_year_info(jy: i64) -> Option<(i64, i64)> {
    let first = BREAKS[0];
    let last = BREAKS[BREAKS.len() - 1];
    if jy < first || jy >= last {
        return None;
    }

    let gy = jy + 621;
    let mut leap_j = -14;
    let mut jp = first;
    let mut jump = 0;
    for &jm in &BREAKS[1..] {
        jump = jm - jp;
        if jy < jm {
            break;
        }
        leap_j += jump / 33 * 8 + (jump % 33) / 4;
        jp = jm;
    }

    let mut n = jy - jp;
    leap_j += n / 33 * 8 + (n % 33 + 3) / 4;
    if jump % 33 == 4 && jump - n == 4 {
        leap_j += 1;
    }

    let leap_g = gy / 4 - (gy / 100 + 1) * 3 / 4 - 150;
    let march = 20 + leap_j - leap_g;

    if jump - n < 6 {
        n = n - jump + (jump + 4) / 33 * 33;
    }
    let mut leap = ((n + 1) % 33 - 1) % 4;
    if leap == -1 {
        leap = 4;
    }
    Some((leap, march))
}

fn gregorian_to_day_number(gy: i64, gm: i64, gd: i64) -> i64 {
    let d = (gy + (gm - 8) / 6 + 100_100) * 1461 / 4 + (153 * ((gm + 9) % 12) + 2) / 5 + gd
        - 34_840_408;
    d - (gy + 100_100 + (gm - 8) / 6) / 100 * 3 / 4 + 752
}
