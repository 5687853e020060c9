//! Date-of-birth parsing and age arithmetic.
//!
//! Dates may arrive in the Gregorian or the Jalali (Solar Hijri) calendar
//! depending on the user's locale. Everything downstream works with
//! Gregorian `NaiveDate`s.

use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};

use super::input::normalize_digits;

/// Calendar a date was entered in.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Calendar {
    #[default]
    Gregorian,
    Jalali,
}

/// Parse `yyyy-MM-dd` or `yyyy/MM/dd` in the given calendar.
///
/// Returns `None` for anything that is not a real calendar date.
pub fn parse_date(input: &str, calendar: Calendar) -> Option<NaiveDate> {
    let normalized = normalize_digits(input.trim());
    let mut parts = normalized.split(['-', '/']);
    let year: i32 = parts.next()?.parse().ok()?;
    let month: u32 = parts.next()?.parse().ok()?;
    let day: u32 = parts.next()?.parse().ok()?;
    if parts.next().is_some() {
        return None;
    }
    match calendar {
        Calendar::Gregorian => NaiveDate::from_ymd_opt(year, month, day),
        Calendar::Jalali => jalali_to_gregorian(year, month, day),
    }
}

/// Convert a Jalali date to Gregorian, rejecting impossible dates.
pub fn jalali_to_gregorian(jy: i32, jm: u32, jd: u32) -> Option<NaiveDate> {
    if !(1..=12).contains(&jm) || jd == 0 || jy < 1 {
        return None;
    }
    let month_len = if jm <= 6 { 31 } else { 30 };
    if jd > month_len {
        return None;
    }
    let date = jalali_days_to_gregorian(jy, jm, jd)?;
    // Esfand 30 only exists in leap years; otherwise it lands on Farvardin 1.
    if jm == 12 && jd == 30 && Some(date) == jalali_days_to_gregorian(jy + 1, 1, 1) {
        return None;
    }
    Some(date)
}

// 33-year cycle arithmetic; valid for the proleptic range users can be born in.
fn jalali_days_to_gregorian(jy: i32, jm: u32, jd: u32) -> Option<NaiveDate> {
    let jy = i64::from(jy) + 1595;
    let jm = i64::from(jm);
    let month_offset = if jm < 7 {
        (jm - 1) * 31
    } else {
        (jm - 7) * 30 + 186
    };
    let mut days =
        -355_668 + 365 * jy + (jy / 33) * 8 + ((jy % 33) + 3) / 4 + i64::from(jd) + month_offset;

    let mut gy = 400 * (days / 146_097);
    days %= 146_097;
    if days > 36_524 {
        days -= 1;
        gy += 100 * (days / 36_524);
        days %= 36_524;
        if days >= 365 {
            days += 1;
        }
    }
    gy += 4 * (days / 1461);
    days %= 1461;
    if days > 365 {
        gy += (days - 1) / 365;
        days = (days - 1) % 365;
    }

    let year = i32::try_from(gy).ok()?;
    let ordinal = u32::try_from(days + 1).ok()?;
    NaiveDate::from_yo_opt(year, ordinal)
}

/// Whole years between `birth` and `today`, honoring month/day rollover.
///
/// A birthday that has not yet come round this year does not count.
pub fn age_on(birth: NaiveDate, today: NaiveDate) -> i32 {
    let mut years = today.year() - birth.year();
    if (today.month(), today.day()) < (birth.month(), birth.day()) {
        years -= 1;
    }
    years
}
