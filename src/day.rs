//! Calendar-day normalization.
//!
//! Every stored timestamp is the unix second of a UTC midnight. Callers may
//! hand in dates with or without a time of day; the time part is dropped.

use time::{Date, Duration, OffsetDateTime, PrimitiveDateTime, UtcOffset};

use crate::{Error, Result};

pub const SECONDS_PER_DAY: i64 = 86_400;

/// Anything that names a calendar day.
pub trait CalendarDay {
    fn calendar_day(&self) -> Date;
}

impl CalendarDay for Date {
    fn calendar_day(&self) -> Date {
        *self
    }
}

impl CalendarDay for PrimitiveDateTime {
    fn calendar_day(&self) -> Date {
        self.date()
    }
}

impl CalendarDay for OffsetDateTime {
    fn calendar_day(&self) -> Date {
        self.to_offset(UtcOffset::UTC).date()
    }
}

impl<T: CalendarDay + ?Sized> CalendarDay for &T {
    fn calendar_day(&self) -> Date {
        (**self).calendar_day()
    }
}

/// Unix seconds of the UTC midnight starting `day`.
pub fn day_to_timestamp(day: Date) -> i64 {
    day.midnight().assume_utc().unix_timestamp()
}

/// Inverse of [`day_to_timestamp`]. Rejects timestamps that are not a UTC midnight.
pub fn timestamp_to_day(timestamp: i64) -> Result<Date> {
    if timestamp.rem_euclid(SECONDS_PER_DAY) != 0 {
        return Err(Error::Corrupt("timestamp is not a utc midnight"));
    }
    let datetime = OffsetDateTime::from_unix_timestamp(timestamp)
        .map_err(|_| Error::Corrupt("timestamp out of range"))?;
    Ok(datetime.date())
}

/// Signed number of whole days from `from` to `to`.
pub fn days_between(from: Date, to: Date) -> i64 {
    (to - from).whole_days()
}

/// `day` shifted by `days`, failing when it leaves the representable calendar.
pub fn add_days(day: Date, days: i64) -> Result<Date> {
    day.checked_add(Duration::days(days))
        .ok_or_else(|| Error::UnsupportedRange(format!("{day} + {days} days is out of range")))
}
