use std::path::PathBuf;

use time::Date;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("corrupt data: {0}")]
    Corrupt(&'static str),
    #[error("unsupported version: {0}")]
    UnsupportedVersion(u32),
    #[error("unsupported range: {0}")]
    UnsupportedRange(String),
    #[error("dates and values differ in length ({dates} dates, {values} values)")]
    LengthMismatch { dates: usize, values: usize },
    #[error("series is empty")]
    EmptySeries,
    #[error("unordered dates were supplied: {previous} >= {next}")]
    Unordered { previous: Date, next: Date },
    #[error("series is not dense: span covers {expected} days but holds {actual} values")]
    NotDense { expected: usize, actual: usize },
    #[error("value on {day} collides with the missing-value sentinel")]
    SentinelCollision { day: Date },
    #[error("already exists: {}", .0.display())]
    AlreadyExists(PathBuf),
    #[error("writer already active")]
    WriterAlreadyActive,
    #[error("series lock does not cover {}", .0.display())]
    LockMismatch(PathBuf),
    #[error("invalid config: {0}")]
    InvalidConfig(String),
    #[error("config parse error: {0}")]
    Config(#[from] serde_json::Error),
}

impl Error {
    /// True for errors raised by input validation, before any file is touched.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            Error::LengthMismatch { .. }
                | Error::EmptySeries
                | Error::Unordered { .. }
                | Error::NotDense { .. }
                | Error::SentinelCollision { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, Error>;
