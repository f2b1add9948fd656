//! Timestamp utilities

use chrono::{DateTime, NaiveDate, TimeZone, Utc};

/// Get current UTC timestamp
pub fn now() -> DateTime<Utc> {
    Utc::now()
}

/// Calendar date of `ts` as observed in `tz`
///
/// Truncating to the date is equivalent to truncating to local midnight,
/// without tripping over days that do not start at 00:00 because of DST.
pub fn local_date<Tz: TimeZone>(ts: DateTime<Utc>, tz: &Tz) -> NaiveDate {
    ts.with_timezone(tz).date_naive()
}

/// Whole calendar days from `earlier` to `later` in `tz`
///
/// Negative when `earlier` falls on a later calendar day than `later`.
pub fn calendar_days_between<Tz: TimeZone>(
    earlier: DateTime<Utc>,
    later: DateTime<Utc>,
    tz: &Tz,
) -> i64 {
    (local_date(later, tz) - local_date(earlier, tz)).num_days()
}
