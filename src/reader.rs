//! Reading a stored series back.
//!
//! Day ranges are located by positional arithmetic from the first record; the
//! file is never scanned for a date.

use std::path::Path;

use time::Date;

use crate::day::{days_between, timestamp_to_day};
use crate::record::Record;
use crate::store::RecordFile;
use crate::Result;

/// Days covered by a series file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StoredRange {
    pub first: Date,
    pub last: Date,
    pub len: u64,
}

/// First and last stored day, or `None` for an empty file.
pub fn stored_range(path: &Path) -> Result<Option<StoredRange>> {
    let mut file = RecordFile::open_read(path)?;
    let (Some(first), Some(last)) = (file.first()?, file.last()?) else {
        return Ok(None);
    };
    Ok(Some(StoredRange {
        first: timestamp_to_day(first.timestamp)?,
        last: timestamp_to_day(last.timestamp)?,
        len: file.record_count(),
    }))
}

pub fn read_all(path: &Path) -> Result<Vec<Record>> {
    RecordFile::open_read(path)?.read_from(0)
}

/// Records for the days `from..=to`, clamped to the stored range.
pub fn read_range(path: &Path, from: Date, to: Date) -> Result<Vec<Record>> {
    let mut file = RecordFile::open_read(path)?;
    let Some(first) = file.first()? else {
        return Ok(Vec::new());
    };
    if to < from {
        return Ok(Vec::new());
    }
    let first_day = timestamp_to_day(first.timestamp)?;
    let start = days_between(first_day, from).max(0) as u64;
    let end = days_between(first_day, to);
    if end < 0 {
        return Ok(Vec::new());
    }
    let count = end as u64 + 1 - start;
    file.read_span(start, count)
}
