//! Calendar engine.
//!
//! Pure functions that turn a cadence and a reference instant into the next
//! fire instant. Nothing here reads the clock; callers pass `after` explicitly.
//! Every result is midnight UTC of the chosen date.

use chrono::{DateTime, Datelike, Duration, NaiveDate, TimeZone, Utc};

use crate::schedule::{DaySpec, Frequency};

/// Next fire instant strictly after `after` for a cadence.
///
/// Used on create, on cadence edits and on resume.
#[must_use]
pub fn next_run(frequency: Frequency, day: DaySpec, after: DateTime<Utc>) -> DateTime<Utc> {
    match (frequency, day) {
        (Frequency::Weekly, DaySpec::DayOfWeek(dow)) => next_weekly(dow, after),
        (Frequency::Biweekly, DaySpec::DayOfWeek(dow)) => next_biweekly(dow, after),
        (Frequency::Monthly, DaySpec::DayOfMonth(dom)) => next_monthly(dom, after),
        // DaySpec::for_frequency never builds these; fall back on the day that
        // is present so the schedule still fires.
        (_, DaySpec::DayOfMonth(dom)) => next_monthly(dom, after),
        (_, DaySpec::DayOfWeek(dow)) => next_weekly(dow, after),
    }
}

/// Next fire instant after a firing that was scheduled for `executed_at`.
///
/// Weekly and biweekly add exactly 7 or 14 days so a late firing keeps the
/// cadence; monthly re-derives the clamped month day.
#[must_use]
pub fn next_after_execution(
    frequency: Frequency,
    day: DaySpec,
    executed_at: DateTime<Utc>,
) -> DateTime<Utc> {
    match (frequency, day) {
        (Frequency::Weekly, _) => executed_at + Duration::days(7),
        (Frequency::Biweekly, _) => executed_at + Duration::days(14),
        (Frequency::Monthly, DaySpec::DayOfMonth(dom)) => next_monthly(dom, executed_at),
        (Frequency::Monthly, DaySpec::DayOfWeek(dow)) => next_weekly(dow, executed_at),
    }
}

/// Next midnight falling on `day_of_week` (0 = Sunday), a same-day match
/// meaning one week later.
#[must_use]
pub fn next_weekly(day_of_week: u8, after: DateTime<Utc>) -> DateTime<Utc> {
    next_weekday(day_of_week, after, 7)
}

/// As [`next_weekly`], but a same-day match means two weeks later.
///
/// The cadence is anchored at the moment of scheduling rather than at a
/// calendar-aligned even week.
#[must_use]
pub fn next_biweekly(day_of_week: u8, after: DateTime<Utc>) -> DateTime<Utc> {
    next_weekday(day_of_week, after, 14)
}

fn next_weekday(day_of_week: u8, after: DateTime<Utc>, same_day_offset: i64) -> DateTime<Utc> {
    let current = i64::from(after.weekday().num_days_from_sunday());
    let target = i64::from(day_of_week % 7);
    let diff = match (target - current + 7) % 7 {
        0 => same_day_offset,
        d => d,
    };
    midnight(after.date_naive() + Duration::days(diff))
}

/// Next midnight on `day_of_month`, clamped to the length of the month.
///
/// If this month's candidate is not strictly after `after`, the following
/// month is used (clamped again).
#[must_use]
pub fn next_monthly(day_of_month: u8, after: DateTime<Utc>) -> DateTime<Utc> {
    let (year, month) = (after.year(), after.month());
    let candidate = clamped_date(year, month, day_of_month);
    if midnight(candidate) > after {
        return midnight(candidate);
    }

    let (year, month) = if month == 12 {
        (year + 1, 1)
    } else {
        (year, month + 1)
    };
    midnight(clamped_date(year, month, day_of_month))
}

/// Number of days in a month.
#[must_use]
pub fn days_in_month(year: i32, month: u32) -> u32 {
    let (next_year, next_month) = if month == 12 {
        (year + 1, 1)
    } else {
        (year, month + 1)
    };
    NaiveDate::from_ymd_opt(next_year, next_month, 1)
        .and_then(|first| first.pred_opt())
        .map_or(28, |last| last.day())
}

fn clamped_date(year: i32, month: u32, day_of_month: u8) -> NaiveDate {
    let day = u32::from(day_of_month.max(1)).min(days_in_month(year, month));
    NaiveDate::from_ymd_opt(year, month, day).unwrap_or_default()
}

fn midnight(date: NaiveDate) -> DateTime<Utc> {
    Utc.from_utc_datetime(&date.and_hms_opt(0, 0, 0).unwrap_or_default())
}

/// Whether two instants fall in the same UTC calendar month.
#[must_use]
pub fn same_utc_month(a: DateTime<Utc>, b: DateTime<Utc>) -> bool {
    a.year() == b.year() && a.month() == b.month()
}
