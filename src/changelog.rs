//! Append-only change log.
//!
//! Every record displaced by an in-place overwrite is appended here together
//! with the time the overwrite happened. The log is a forensic trail: it is
//! never rewritten and never consulted when reading a series.
//!
//! # Layout
//!
//! ```text
//! header (64 bytes, written once)
//!   0  magic           u32  'TSLG'
//!   4  version         u32
//!   8  entry_size      u32
//!  12  missing_value   f64  sentinel in force when the log was created
//!  20  missing_meta_id i32
//!  24  crc32           u32  over bytes 0..24
//!  28  zero padding
//! entries (28 bytes each)
//!   timestamp i64 | value f64 | meta_id i32 | replaced_at i64
//! ```

use std::fs::{File, OpenOptions};
use std::io::{ErrorKind, Read, Write};
use std::path::Path;

use time::OffsetDateTime;

use crate::config::Sentinels;
use crate::record::{Record, RECORD_SIZE};
use crate::{Error, Result};

pub const LOG_HEADER_SIZE: usize = 64;
pub const LOG_ENTRY_SIZE: usize = RECORD_SIZE + 8;
pub const LOG_MAGIC: u32 = 0x544C_4F47; // 'TSLG'
pub const LOG_VERSION: u32 = 1;

const CRC_OFFSET: usize = 24;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LogHeader {
    pub version: u32,
    pub entry_size: u32,
    pub sentinels: Sentinels,
}

impl LogHeader {
    pub fn new(sentinels: Sentinels) -> Self {
        Self {
            version: LOG_VERSION,
            entry_size: LOG_ENTRY_SIZE as u32,
            sentinels,
        }
    }

    pub fn to_bytes(&self) -> [u8; LOG_HEADER_SIZE] {
        let mut buf = [0u8; LOG_HEADER_SIZE];
        buf[0..4].copy_from_slice(&LOG_MAGIC.to_le_bytes());
        buf[4..8].copy_from_slice(&self.version.to_le_bytes());
        buf[8..12].copy_from_slice(&self.entry_size.to_le_bytes());
        buf[12..20].copy_from_slice(&self.sentinels.missing_value.to_le_bytes());
        buf[20..24].copy_from_slice(&self.sentinels.missing_meta_id.to_le_bytes());
        let crc = crc32fast::hash(&buf[..CRC_OFFSET]);
        buf[CRC_OFFSET..CRC_OFFSET + 4].copy_from_slice(&crc.to_le_bytes());
        buf
    }

    pub fn from_bytes(bytes: &[u8; LOG_HEADER_SIZE]) -> Result<Self> {
        let magic = u32::from_le_bytes(bytes[0..4].try_into().expect("slice length"));
        if magic != LOG_MAGIC {
            return Err(Error::Corrupt("change log magic mismatch"));
        }
        let crc = u32::from_le_bytes(
            bytes[CRC_OFFSET..CRC_OFFSET + 4]
                .try_into()
                .expect("slice length"),
        );
        if crc != crc32fast::hash(&bytes[..CRC_OFFSET]) {
            return Err(Error::Corrupt("change log header crc mismatch"));
        }
        let version = u32::from_le_bytes(bytes[4..8].try_into().expect("slice length"));
        if version != LOG_VERSION {
            return Err(Error::UnsupportedVersion(version));
        }
        let entry_size = u32::from_le_bytes(bytes[8..12].try_into().expect("slice length"));
        if entry_size as usize != LOG_ENTRY_SIZE {
            return Err(Error::Corrupt("change log entry size mismatch"));
        }
        let missing_value = f64::from_le_bytes(bytes[12..20].try_into().expect("slice length"));
        let missing_meta_id = i32::from_le_bytes(bytes[20..24].try_into().expect("slice length"));
        Ok(Self {
            version,
            entry_size,
            sentinels: Sentinels {
                missing_value,
                missing_meta_id,
            },
        })
    }
}

/// One audit entry: a displaced record and when it was replaced.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LogEntry {
    pub record: Record,
    /// Unix seconds.
    pub replaced_at: i64,
}

impl LogEntry {
    pub fn to_bytes(&self) -> [u8; LOG_ENTRY_SIZE] {
        let mut buf = [0u8; LOG_ENTRY_SIZE];
        buf[..RECORD_SIZE].copy_from_slice(&self.record.to_bytes());
        buf[RECORD_SIZE..].copy_from_slice(&self.replaced_at.to_le_bytes());
        buf
    }

    pub fn from_bytes(bytes: &[u8; LOG_ENTRY_SIZE]) -> Self {
        let mut record = [0u8; RECORD_SIZE];
        record.copy_from_slice(&bytes[..RECORD_SIZE]);
        let replaced_at = i64::from_le_bytes(bytes[RECORD_SIZE..].try_into().expect("slice length"));
        Self {
            record: Record::from_bytes(&record),
            replaced_at,
        }
    }
}

/// Create the log with its header if it does not exist yet; otherwise check the header.
pub fn ensure_log(path: &Path, sentinels: &Sentinels) -> Result<LogHeader> {
    match OpenOptions::new().write(true).create_new(true).open(path) {
        Ok(mut file) => {
            let header = LogHeader::new(*sentinels);
            file.write_all(&header.to_bytes())?;
            file.sync_all()?;
            log::info!("created change log {}", path.display());
            Ok(header)
        }
        Err(err) if err.kind() == ErrorKind::AlreadyExists => read_header(path),
        Err(err) => Err(Error::Io(err)),
    }
}

fn read_header(path: &Path) -> Result<LogHeader> {
    let mut file = File::open(path)?;
    let mut buf = [0u8; LOG_HEADER_SIZE];
    file.read_exact(&mut buf).map_err(|err| match err.kind() {
        ErrorKind::UnexpectedEof => Error::Corrupt("change log header truncated"),
        _ => Error::Io(err),
    })?;
    LogHeader::from_bytes(&buf)
}

/// Append one entry per displaced record. The log must already exist.
pub fn append(path: &Path, displaced: &[Record], replaced_at: i64) -> Result<()> {
    if displaced.is_empty() {
        return Ok(());
    }
    let mut buf = Vec::with_capacity(displaced.len() * LOG_ENTRY_SIZE);
    for record in displaced {
        let entry = LogEntry {
            record: *record,
            replaced_at,
        };
        buf.extend_from_slice(&entry.to_bytes());
    }
    let mut file = OpenOptions::new().append(true).open(path)?;
    file.write_all(&buf)?;
    file.sync_data()?;
    log::debug!(
        "appended {} entries to change log {}",
        displaced.len(),
        path.display()
    );
    Ok(())
}

/// Record `displaced` as replaced at `replaced_at`, creating the log on first use.
///
/// An empty list leaves the filesystem untouched. An existing log created
/// under a different sentinel pair is refused with `Error::Corrupt`.
pub fn write_log(
    path: &Path,
    displaced: &[Record],
    replaced_at: OffsetDateTime,
    sentinels: &Sentinels,
) -> Result<()> {
    if displaced.is_empty() {
        return Ok(());
    }
    let header = ensure_log(path, sentinels)?;
    if !same_sentinels(&header.sentinels, sentinels) {
        return Err(Error::Corrupt("change log sentinel mismatch"));
    }
    append(path, displaced, replaced_at.unix_timestamp())
}

fn same_sentinels(a: &Sentinels, b: &Sentinels) -> bool {
    a.missing_value.to_bits() == b.missing_value.to_bits()
        && a.missing_meta_id == b.missing_meta_id
}

/// Read the header and every entry of a change log.
pub fn read_log(path: &Path) -> Result<(LogHeader, Vec<LogEntry>)> {
    let mut bytes = Vec::new();
    File::open(path)?.read_to_end(&mut bytes)?;
    if bytes.len() < LOG_HEADER_SIZE {
        return Err(Error::Corrupt("change log header truncated"));
    }
    let mut header_buf = [0u8; LOG_HEADER_SIZE];
    header_buf.copy_from_slice(&bytes[..LOG_HEADER_SIZE]);
    let header = LogHeader::from_bytes(&header_buf)?;

    let body = &bytes[LOG_HEADER_SIZE..];
    if body.len() % LOG_ENTRY_SIZE != 0 {
        return Err(Error::Corrupt("change log ends in a partial entry"));
    }
    let entries = body
        .chunks_exact(LOG_ENTRY_SIZE)
        .map(|chunk| {
            let mut buf = [0u8; LOG_ENTRY_SIZE];
            buf.copy_from_slice(chunk);
            LogEntry::from_bytes(&buf)
        })
        .collect();
    Ok((header, entries))
}
