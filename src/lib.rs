//! Flat-file storage for dense daily time series.
//!
//! Each series is one file holding a fixed-size record per calendar day with
//! no gaps. Incremental writes overwrite only the values that changed, extend
//! the file as needed, and report every displaced record so it can be kept in
//! an append-only change log.

pub mod changelog;
pub mod config;
pub mod day;
pub mod error;
pub mod lock;
pub mod reader;
pub mod record;
pub mod series;
pub mod store;
pub mod writer;

pub use changelog::{write_log, LogEntry, LogHeader};
pub use config::{AppendGapPolicy, EngineConfig, InteriorGaps, Sentinels};
pub use day::CalendarDay;
pub use error::{Error, Result};
pub use lock::SeriesLock;
pub use reader::{read_all, read_range, stored_range, StoredRange};
pub use record::{decode, encode, Record, DEFAULT_META_ID, RECORD_SIZE};
pub use series::{validate, validate_with, DailySeries};
pub use store::RecordFile;
pub use writer::{bulk_write, write, SeriesWriter, WriteReport};
