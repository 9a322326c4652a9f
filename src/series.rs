//! Series validation.
//!
//! Turns caller-supplied `(dates, values)` into a [`DailySeries`]: one value
//! per calendar day, strictly ordered, no gaps. The write engine only accepts
//! a `DailySeries`, so positional addressing holds for anything it stores.

use time::{Date, Duration};

use crate::config::{EngineConfig, InteriorGaps, Sentinels};
use crate::day::{day_to_timestamp, days_between, CalendarDay};
use crate::{Error, Result};

/// A dense daily series starting at `start`. NaN marks a missing observation.
#[derive(Debug, Clone, PartialEq)]
pub struct DailySeries {
    start: Date,
    values: Vec<f64>,
}

impl DailySeries {
    pub fn start(&self) -> Date {
        self.start
    }

    /// Last day covered by the series.
    pub fn end(&self) -> Date {
        self.start + Duration::days(self.values.len() as i64 - 1)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn values(&self) -> &[f64] {
        &self.values
    }

    pub fn start_timestamp(&self) -> i64 {
        day_to_timestamp(self.start)
    }

    /// Fail with `Error::SentinelCollision` if a real value aliases the
    /// missing-value sentinel of `sentinels`.
    pub fn check_sentinels(&self, sentinels: &Sentinels) -> Result<()> {
        let sentinel = sentinels.missing_value.to_bits();
        match self.iter().find(|(_, value)| value.to_bits() == sentinel) {
            Some((day, _)) => Err(Error::SentinelCollision { day }),
            None => Ok(()),
        }
    }

    /// `(day, value)` pairs in order.
    pub fn iter(&self) -> impl Iterator<Item = (Date, f64)> + '_ {
        self.values
            .iter()
            .enumerate()
            .map(move |(k, value)| (self.start + Duration::days(k as i64), *value))
    }
}

/// Validate with the default engine configuration.
pub fn validate<D: CalendarDay>(dates: &[D], values: &[f64]) -> Result<DailySeries> {
    validate_with(dates, values, &EngineConfig::default())
}

pub fn validate_with<D: CalendarDay>(
    dates: &[D],
    values: &[f64],
    config: &EngineConfig,
) -> Result<DailySeries> {
    if dates.len() != values.len() {
        return Err(Error::LengthMismatch {
            dates: dates.len(),
            values: values.len(),
        });
    }
    if dates.is_empty() {
        return Err(Error::EmptySeries);
    }

    let days: Vec<Date> = dates.iter().map(CalendarDay::calendar_day).collect();
    for pair in days.windows(2) {
        if pair[0] >= pair[1] {
            return Err(Error::Unordered {
                previous: pair[0],
                next: pair[1],
            });
        }
    }

    let sentinel = config.sentinels.missing_value.to_bits();
    if let Some(position) = values.iter().position(|v| v.to_bits() == sentinel) {
        return Err(Error::SentinelCollision {
            day: days[position],
        });
    }

    let start = days[0];
    let end = days[days.len() - 1];
    let span = days_between(start, end) as usize + 1;

    let values = if span == values.len() {
        values.to_vec()
    } else {
        match config.interior_gaps {
            InteriorGaps::Reject => {
                return Err(Error::NotDense {
                    expected: span,
                    actual: values.len(),
                })
            }
            InteriorGaps::FillMissing => {
                let mut dense = vec![f64::NAN; span];
                for (day, value) in days.iter().zip(values) {
                    dense[days_between(start, *day) as usize] = *value;
                }
                dense
            }
        }
    };

    if span != values.len() {
        return Err(Error::NotDense {
            expected: span,
            actual: values.len(),
        });
    }

    Ok(DailySeries { start, values })
}
