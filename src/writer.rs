//! Write engine.
//!
//! A series file is populated once by [`SeriesWriter::bulk_write`] and then
//! reconciled by [`SeriesWriter::write`]. An incoming series is placed
//! relative to the stored range `[first, last]`:
//!
//! | incoming start       | action                                              |
//! |----------------------|-----------------------------------------------------|
//! | before `first`       | `Error::UnsupportedRange`                           |
//! | within `[first, last]` | skip unchanged, overwrite changed, extend past end |
//! | after `last`         | append, filling skipped days per `AppendGapPolicy`  |
//!
//! Every overwritten record is returned as displaced so it can be handed to
//! the change log.
//!
//! # Single writer
//!
//! Nothing here locks. Callers must serialize writes to a series, for example
//! by holding a [`SeriesLock`] for the duration of the call.

use std::fs;
use std::io::{ErrorKind, Read, Seek, Write};
use std::path::Path;

use time::OffsetDateTime;

use crate::changelog;
use crate::config::{AppendGapPolicy, EngineConfig, Sentinels};
use crate::day::{days_between, timestamp_to_day, CalendarDay, SECONDS_PER_DAY};
use crate::lock::SeriesLock;
use crate::record::{Record, DEFAULT_META_ID};
use crate::series::{validate, DailySeries};
use crate::store::RecordFile;
use crate::{Error, Result};

/// Outcome of a write.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WriteReport {
    /// Prior contents of every overwritten record, in file order.
    pub displaced: Vec<Record>,
    /// Overlapping records left untouched because the value did not change.
    pub unchanged: usize,
    pub overwritten: usize,
    /// Incoming records written past the previous end of file.
    pub appended: usize,
    /// Missing-value records written for days skipped by an append.
    pub filled: usize,
}

impl WriteReport {
    pub fn is_noop(&self) -> bool {
        self.overwritten == 0 && self.appended == 0 && self.filled == 0
    }
}

#[derive(Debug, Clone, Default)]
pub struct SeriesWriter {
    config: EngineConfig,
}

impl SeriesWriter {
    pub fn new(config: EngineConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Create `path` and write `series` into it. Fails with
    /// `Error::AlreadyExists` rather than replacing a stored series.
    pub fn bulk_write(&self, path: &Path, series: &DailySeries, meta_id: i32) -> Result<WriteReport> {
        series.check_sentinels(&self.config.sentinels)?;
        let mut file = RecordFile::create_new(path)?;
        let report = bulk_load(&mut file, series, meta_id, &self.config.sentinels)?;
        if self.config.sync {
            file.sync()?;
        }
        log::info!(
            "created series {} with {} records from {}",
            path.display(),
            report.appended,
            series.start()
        );
        Ok(report)
    }

    /// Reconcile `series` against the existing, non-empty file at `path`.
    ///
    /// The caller must be the only writer of `path` for the whole call.
    pub fn write(&self, path: &Path, series: &DailySeries, meta_id: i32) -> Result<WriteReport> {
        let mut file = RecordFile::open(path)?;
        let report = reconcile(&mut file, series, meta_id, &self.config)?;
        file.flush()?;
        if self.config.sync && !report.is_noop() {
            file.sync()?;
        }
        log::debug!(
            "wrote {}: {} unchanged, {} overwritten, {} appended, {} filled",
            path.display(),
            report.unchanged,
            report.overwritten,
            report.appended,
            report.filled
        );
        Ok(report)
    }

    /// Write `series` to `path`, creating it if needed, and log displaced
    /// records to `log_path` stamped with `replaced_at`.
    ///
    /// If the series write fails partway, nothing is logged: records already
    /// overwritten by then have no change log entry.
    pub fn upsert(
        &self,
        lock: &SeriesLock,
        path: &Path,
        log_path: &Path,
        series: &DailySeries,
        meta_id: i32,
        replaced_at: OffsetDateTime,
    ) -> Result<WriteReport> {
        if !lock.covers(path) {
            return Err(Error::LockMismatch(path.to_path_buf()));
        }
        let stored_len = match fs::metadata(path) {
            Ok(meta) => Some(meta.len()),
            Err(err) if err.kind() == ErrorKind::NotFound => None,
            Err(err) => return Err(Error::Io(err)),
        };
        match stored_len {
            None => self.bulk_write(path, series, meta_id),
            Some(0) => {
                let mut file = RecordFile::open(path)?;
                let report = bulk_load(&mut file, series, meta_id, &self.config.sentinels)?;
                if self.config.sync {
                    file.sync()?;
                }
                Ok(report)
            }
            Some(_) => {
                let report = self.write(path, series, meta_id)?;
                changelog::write_log(log_path, &report.displaced, replaced_at, &self.config.sentinels)?;
                Ok(report)
            }
        }
    }
}

/// Validate `dates`/`values` and bulk-write them with the default configuration.
pub fn bulk_write<D: CalendarDay>(path: &Path, dates: &[D], values: &[f64]) -> Result<()> {
    let series = validate(dates, values)?;
    SeriesWriter::default().bulk_write(path, &series, DEFAULT_META_ID)?;
    Ok(())
}

/// Validate `dates`/`values` and reconcile them with the default configuration,
/// returning the displaced records.
pub fn write<D: CalendarDay>(path: &Path, dates: &[D], values: &[f64]) -> Result<Vec<Record>> {
    let series = validate(dates, values)?;
    let report = SeriesWriter::default().write(path, &series, DEFAULT_META_ID)?;
    Ok(report.displaced)
}

/// Write every record of `series` into an empty store.
pub fn bulk_load<S: Write + Seek>(
    file: &mut RecordFile<S>,
    series: &DailySeries,
    meta_id: i32,
    sentinels: &Sentinels,
) -> Result<WriteReport> {
    if !file.is_empty() {
        return Err(Error::UnsupportedRange(
            "bulk load into a non-empty series".to_string(),
        ));
    }
    series.check_sentinels(sentinels)?;
    let records = encode_series(series, meta_id, sentinels);
    file.append(&records)?;
    file.flush()?;
    Ok(WriteReport {
        appended: records.len(),
        ..WriteReport::default()
    })
}

/// Reconcile `series` against a non-empty store.
///
/// Overwrites happen one record at a time. If a write fails partway, the
/// error is returned and the displaced records collected so far are lost,
/// although the records before the failure have already been replaced.
pub fn reconcile<S: Read + Write + Seek>(
    file: &mut RecordFile<S>,
    series: &DailySeries,
    meta_id: i32,
    config: &EngineConfig,
) -> Result<WriteReport> {
    series.check_sentinels(&config.sentinels)?;
    let (Some(first), Some(last)) = (file.first()?, file.last()?) else {
        return Err(Error::UnsupportedRange(
            "incremental write to an empty series".to_string(),
        ));
    };
    let first_day = timestamp_to_day(first.timestamp)?;
    let last_day = timestamp_to_day(last.timestamp)?;
    if days_between(first_day, last_day) + 1 != file.record_count() as i64 {
        return Err(Error::Corrupt(
            "record count does not match the first and last record dates",
        ));
    }

    let start = series.start();
    if start < first_day {
        return Err(Error::UnsupportedRange(format!(
            "series starts {start}, before the first stored day {first_day}"
        )));
    }

    let incoming = encode_series(series, meta_id, &config.sentinels);
    if start <= last_day {
        let offset = days_between(first_day, start) as u64;
        log::debug!("overlapping write at record {offset} of {}", file.record_count());
        overwrite_from(file, offset, first.timestamp, &incoming)
    } else {
        let gap = days_between(last_day, start);
        log::debug!("append {gap} days after {last_day}");
        append_after(file, &last, gap, &incoming, config)
    }
}

fn overwrite_from<S: Read + Write + Seek>(
    file: &mut RecordFile<S>,
    offset: u64,
    base_timestamp: i64,
    incoming: &[Record],
) -> Result<WriteReport> {
    let window = file.read_from(offset)?;
    for (k, existing) in window.iter().enumerate() {
        let expected = base_timestamp + (offset + k as u64) as i64 * SECONDS_PER_DAY;
        if existing.timestamp != expected {
            return Err(Error::Corrupt("record timestamp does not match its position"));
        }
    }

    let mut report = WriteReport::default();
    let overlap = window.len().min(incoming.len());
    for (k, (existing, record)) in window.iter().zip(incoming).enumerate() {
        if existing.same_value(record) {
            report.unchanged += 1;
            continue;
        }
        report.displaced.push(*existing);
        file.write_record(offset + k as u64, record)?;
        report.overwritten += 1;
    }

    let extension = &incoming[overlap..];
    file.append(extension)?;
    report.appended = extension.len();
    Ok(report)
}

fn append_after<S: Write + Seek>(
    file: &mut RecordFile<S>,
    last: &Record,
    gap: i64,
    incoming: &[Record],
    config: &EngineConfig,
) -> Result<WriteReport> {
    if gap > 1 && config.append_gaps == AppendGapPolicy::Strict {
        return Err(Error::UnsupportedRange(format!(
            "append starts {gap} days after the last stored record; strict policy requires 1"
        )));
    }

    let fill = (gap - 1) as usize;
    let mut records = Vec::with_capacity(fill + incoming.len());
    for day in 1..gap {
        records.push(Record::missing(
            last.timestamp + day * SECONDS_PER_DAY,
            &config.sentinels,
        ));
    }
    if fill > 0 {
        log::warn!("filling {fill} missing days before appended data");
    }
    records.extend_from_slice(incoming);
    file.append(&records)?;

    Ok(WriteReport {
        appended: incoming.len(),
        filled: fill,
        ..WriteReport::default()
    })
}

fn encode_series(series: &DailySeries, meta_id: i32, sentinels: &Sentinels) -> Vec<Record> {
    let start = series.start_timestamp();
    series
        .values()
        .iter()
        .enumerate()
        .map(|(k, value)| {
            Record::observation(start + k as i64 * SECONDS_PER_DAY, *value, meta_id, sentinels)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::InteriorGaps;
    use crate::day::day_to_timestamp;
    use crate::series::validate_with;
    use std::io::Cursor;
    use time::macros::date;
    use time::Date;

    fn days(start: Date, n: usize) -> Vec<Date> {
        (0..n)
            .map(|k| start + time::Duration::days(k as i64))
            .collect()
    }

    fn stored(start: Date, values: &[f64]) -> RecordFile<Cursor<Vec<u8>>> {
        let mut file = RecordFile::new(Cursor::new(Vec::new())).unwrap();
        let series = validate(&days(start, values.len()), values).unwrap();
        bulk_load(&mut file, &series, 0, &Sentinels::default()).unwrap();
        file
    }

    fn values(file: &mut RecordFile<Cursor<Vec<u8>>>) -> Vec<f64> {
        file.read_from(0).unwrap().iter().map(|r| r.value).collect()
    }

    #[test]
    fn overlap_skips_unchanged_and_displaces_changed() {
        let mut file = stored(date!(2020 - 01 - 01), &[1.0, 2.0, 3.0, 4.0, 5.0]);
        let series = validate(&days(date!(2020 - 01 - 03), 5), &[3.0, 9.0, 5.0, 6.0, 7.0]).unwrap();

        let report = reconcile(&mut file, &series, 0, &EngineConfig::default()).unwrap();

        assert_eq!(
            report.displaced,
            vec![Record::new(day_to_timestamp(date!(2020 - 01 - 04)), 4.0, 0)]
        );
        assert_eq!(report.unchanged, 2);
        assert_eq!(report.overwritten, 1);
        assert_eq!(report.appended, 2);
        assert_eq!(values(&mut file), vec![1.0, 2.0, 3.0, 9.0, 5.0, 6.0, 7.0]);
        file.verify_positions().unwrap();
    }

    #[test]
    fn identical_overlap_is_noop() {
        let mut file = stored(date!(2020 - 01 - 01), &[1.0, 2.0, 3.0]);
        let before = file.read_from(0).unwrap();
        let series = validate(&days(date!(2020 - 01 - 02), 2), &[2.0, 3.0]).unwrap();

        let report = reconcile(&mut file, &series, 5, &EngineConfig::default()).unwrap();

        assert!(report.is_noop());
        assert!(report.displaced.is_empty());
        assert_eq!(file.read_from(0).unwrap(), before);
    }

    #[test]
    fn missing_over_missing_is_unchanged() {
        let mut file = stored(date!(2020 - 01 - 01), &[1.0, f64::NAN]);
        let series = validate(&days(date!(2020 - 01 - 02), 1), &[f64::NAN]).unwrap();
        let report = reconcile(&mut file, &series, 0, &EngineConfig::default()).unwrap();
        assert!(report.is_noop());
    }

    #[test]
    fn nan_over_value_stores_sentinel_pair() {
        let sentinels = Sentinels::default();
        let mut file = stored(date!(2020 - 01 - 01), &[1.0, 2.0]);
        let series = validate(&days(date!(2020 - 01 - 01), 1), &[f64::NAN]).unwrap();

        let report = reconcile(&mut file, &series, 3, &EngineConfig::default()).unwrap();

        assert_eq!(report.displaced.len(), 1);
        assert_eq!(report.displaced[0].value, 1.0);
        assert!(file.read_record(0).unwrap().is_missing(&sentinels));
    }

    #[test]
    fn append_fills_skipped_days() {
        let sentinels = Sentinels::default();
        let mut file = stored(date!(2020 - 01 - 01), &[1.0, 2.0]);
        let series = validate(&days(date!(2020 - 01 - 05), 2), &[5.0, 6.0]).unwrap();

        let report = reconcile(&mut file, &series, 0, &EngineConfig::default()).unwrap();

        assert_eq!(report.filled, 2);
        assert_eq!(report.appended, 2);
        assert_eq!(file.record_count(), 6);
        assert!(file.read_record(2).unwrap().is_missing(&sentinels));
        assert!(file.read_record(3).unwrap().is_missing(&sentinels));
        assert_eq!(file.read_record(4).unwrap().value, 5.0);
        file.verify_positions().unwrap();
    }

    #[test]
    fn adjacent_append_has_no_filler() {
        let mut file = stored(date!(2020 - 01 - 01), &[1.0]);
        let series = validate(&days(date!(2020 - 01 - 02), 1), &[2.0]).unwrap();
        let report = reconcile(&mut file, &series, 0, &EngineConfig::default()).unwrap();
        assert_eq!(report.filled, 0);
        assert_eq!(values(&mut file), vec![1.0, 2.0]);
    }

    #[test]
    fn strict_policy_rejects_gap() {
        let config = EngineConfig {
            append_gaps: AppendGapPolicy::Strict,
            ..EngineConfig::default()
        };
        let mut file = stored(date!(2020 - 01 - 01), &[1.0]);
        let series = validate(&days(date!(2020 - 01 - 03), 1), &[3.0]).unwrap();

        let err = reconcile(&mut file, &series, 0, &config).unwrap_err();
        assert!(matches!(err, Error::UnsupportedRange(_)));
        assert_eq!(file.record_count(), 1);

        let adjacent = validate(&days(date!(2020 - 01 - 02), 1), &[2.0]).unwrap();
        reconcile(&mut file, &adjacent, 0, &config).unwrap();
        assert_eq!(file.record_count(), 2);
    }

    #[test]
    fn rejects_start_before_first_record() {
        let mut file = stored(date!(2020 - 01 - 05), &[1.0, 2.0]);
        let series = validate(&days(date!(2020 - 01 - 04), 3), &[0.0, 1.0, 2.0]).unwrap();
        let err = reconcile(&mut file, &series, 0, &EngineConfig::default()).unwrap_err();
        assert!(matches!(err, Error::UnsupportedRange(_)));
        assert_eq!(values(&mut file), vec![1.0, 2.0]);
    }

    #[test]
    fn rejects_empty_store() {
        let mut file = RecordFile::new(Cursor::new(Vec::new())).unwrap();
        let series = validate(&days(date!(2020 - 01 - 01), 1), &[1.0]).unwrap();
        assert!(matches!(
            reconcile(&mut file, &series, 0, &EngineConfig::default()),
            Err(Error::UnsupportedRange(_))
        ));
    }

    #[test]
    fn detects_misplaced_record_before_writing() {
        let mut file = RecordFile::new(Cursor::new(Vec::new())).unwrap();
        let base = day_to_timestamp(date!(2020 - 01 - 01));
        file.append(&[
            Record::new(base, 1.0, 0),
            Record::new(base + 5 * SECONDS_PER_DAY, 2.0, 0),
            Record::new(base + 2 * SECONDS_PER_DAY, 3.0, 0),
        ])
        .unwrap();
        let series = validate(&days(date!(2020 - 01 - 02), 2), &[7.0, 8.0]).unwrap();

        let err = reconcile(&mut file, &series, 0, &EngineConfig::default()).unwrap_err();
        assert!(matches!(err, Error::Corrupt(_)));
        assert_eq!(values(&mut file), vec![1.0, 2.0, 3.0]);
    }

    #[test]
    fn filled_interior_gap_lands_as_missing() {
        let config = EngineConfig {
            interior_gaps: InteriorGaps::FillMissing,
            ..EngineConfig::default()
        };
        let mut file = stored(date!(2020 - 01 - 01), &[1.0, 2.0, 3.0]);
        let series = validate_with(
            &[date!(2020 - 01 - 01), date!(2020 - 01 - 03)],
            &[1.0, 4.0],
            &config,
        )
        .unwrap();

        let report = reconcile(&mut file, &series, 0, &config).unwrap();

        let displaced: Vec<f64> = report.displaced.iter().map(|r| r.value).collect();
        assert_eq!(displaced, vec![2.0, 3.0]);
        assert!(file.read_record(1).unwrap().is_missing(&config.sentinels));
    }

    #[test]
    fn bulk_load_refuses_populated_store() {
        let mut file = stored(date!(2020 - 01 - 01), &[1.0]);
        let series = validate(&days(date!(2020 - 01 - 01), 1), &[1.0]).unwrap();
        assert!(matches!(
            bulk_load(&mut file, &series, 0, &Sentinels::default()),
            Err(Error::UnsupportedRange(_))
        ));
    }

    #[test]
    fn reconcile_checks_values_against_its_own_sentinels() {
        let config = EngineConfig {
            sentinels: Sentinels {
                missing_value: -5.0,
                missing_meta_id: -1,
            },
            ..EngineConfig::default()
        };
        let mut file = stored(date!(2020 - 01 - 01), &[1.0, 2.0]);
        let before = file.read_from(0).unwrap();
        let series = validate(&days(date!(2020 - 01 - 02), 2), &[-5.0, 3.0]).unwrap();

        let err = reconcile(&mut file, &series, 7, &config).unwrap_err();
        assert!(matches!(err, Error::SentinelCollision { day } if day == date!(2020 - 01 - 02)));
        assert_eq!(file.read_from(0).unwrap(), before);

        let mut empty = RecordFile::new(Cursor::new(Vec::new())).unwrap();
        assert!(matches!(
            bulk_load(&mut empty, &series, 7, &config.sentinels),
            Err(Error::SentinelCollision { .. })
        ));
        assert!(empty.is_empty());
    }

    struct FailAfter {
        inner: Cursor<Vec<u8>>,
        writes_left: usize,
    }

    impl Read for FailAfter {
        fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
            self.inner.read(buf)
        }
    }

    impl Write for FailAfter {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            if self.writes_left == 0 {
                return Err(std::io::Error::new(ErrorKind::Other, "disk full"));
            }
            self.writes_left -= 1;
            self.inner.write(buf)
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    impl Seek for FailAfter {
        fn seek(&mut self, pos: std::io::SeekFrom) -> std::io::Result<u64> {
            self.inner.seek(pos)
        }
    }

    #[test]
    fn failed_overwrite_keeps_earlier_replacements() {
        let seeded = stored(date!(2020 - 01 - 01), &[1.0, 2.0, 3.0]).into_inner();
        let mut file = RecordFile::new(FailAfter {
            inner: seeded,
            writes_left: 1,
        })
        .unwrap();
        let series = validate(&days(date!(2020 - 01 - 01), 3), &[10.0, 20.0, 3.0]).unwrap();

        let err = reconcile(&mut file, &series, 0, &EngineConfig::default()).unwrap_err();
        assert!(matches!(err, Error::Io(_)));

        let mut after = RecordFile::new(file.into_inner().inner).unwrap();
        assert_eq!(values(&mut after), vec![10.0, 2.0, 3.0]);
    }
}
