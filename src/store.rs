//! Record-addressed view over a random-access byte store.
//!
//! Record `i` lives at byte `i * RECORD_SIZE`; nothing else is stored in a
//! series file. Writes may overwrite any existing record or extend the file by
//! exactly one position at a time, so the file can never grow a hole.

use std::fs::{File, OpenOptions};
use std::io::{ErrorKind, Read, Seek, SeekFrom, Write};
use std::path::Path;

use crate::day::SECONDS_PER_DAY;
use crate::record::{Record, RECORD_SIZE};
use crate::{Error, Result};

pub struct RecordFile<S = File> {
    inner: S,
    len: u64,
}

impl RecordFile<File> {
    /// Open an existing series file for reading and in-place writes.
    pub fn open(path: &Path) -> Result<Self> {
        let file = OpenOptions::new().read(true).write(true).open(path)?;
        Self::new(file)
    }

    pub fn open_read(path: &Path) -> Result<Self> {
        let file = OpenOptions::new().read(true).open(path)?;
        Self::new(file)
    }

    /// Create a new, empty series file. Fails with `Error::AlreadyExists` if present.
    pub fn create_new(path: &Path) -> Result<Self> {
        let file = match OpenOptions::new()
            .read(true)
            .write(true)
            .create_new(true)
            .open(path)
        {
            Ok(file) => file,
            Err(err) if err.kind() == ErrorKind::AlreadyExists => {
                return Err(Error::AlreadyExists(path.to_path_buf()))
            }
            Err(err) => return Err(Error::Io(err)),
        };
        Ok(Self { inner: file, len: 0 })
    }

    pub fn sync(&self) -> Result<()> {
        self.inner.sync_all()?;
        Ok(())
    }
}

impl<S: Seek> RecordFile<S> {
    /// Wrap a byte store, rejecting one that ends in a partial record.
    pub fn new(mut inner: S) -> Result<Self> {
        let bytes = inner.seek(SeekFrom::End(0))?;
        if bytes % RECORD_SIZE as u64 != 0 {
            return Err(Error::Corrupt("series file ends in a partial record"));
        }
        Ok(Self {
            inner,
            len: bytes / RECORD_SIZE as u64,
        })
    }

    pub fn record_count(&self) -> u64 {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn into_inner(self) -> S {
        self.inner
    }

    fn seek_record(&mut self, index: u64) -> Result<()> {
        self.inner
            .seek(SeekFrom::Start(index * RECORD_SIZE as u64))?;
        Ok(())
    }
}

impl<S: Read + Seek> RecordFile<S> {
    pub fn read_record(&mut self, index: u64) -> Result<Record> {
        if index >= self.len {
            return Err(Error::Corrupt("record index out of bounds"));
        }
        self.seek_record(index)?;
        let mut buf = [0u8; RECORD_SIZE];
        self.inner.read_exact(&mut buf)?;
        Ok(Record::from_bytes(&buf))
    }

    pub fn first(&mut self) -> Result<Option<Record>> {
        if self.is_empty() {
            return Ok(None);
        }
        self.read_record(0).map(Some)
    }

    pub fn last(&mut self) -> Result<Option<Record>> {
        if self.is_empty() {
            return Ok(None);
        }
        self.read_record(self.len - 1).map(Some)
    }

    /// Read `count` records starting at `index`, clamped to the end of the file.
    pub fn read_span(&mut self, index: u64, count: u64) -> Result<Vec<Record>> {
        if index >= self.len {
            return Ok(Vec::new());
        }
        let count = count.min(self.len - index) as usize;
        self.seek_record(index)?;
        let mut buf = vec![0u8; count * RECORD_SIZE];
        self.inner.read_exact(&mut buf)?;
        Ok(buf
            .chunks_exact(RECORD_SIZE)
            .map(|chunk| {
                let mut bytes = [0u8; RECORD_SIZE];
                bytes.copy_from_slice(chunk);
                Record::from_bytes(&bytes)
            })
            .collect())
    }

    /// Every record from `index` to the end of the file.
    pub fn read_from(&mut self, index: u64) -> Result<Vec<Record>> {
        self.read_span(index, u64::MAX)
    }

    /// Check that record `k` carries `first.timestamp + k` days for every `k`.
    pub fn verify_positions(&mut self) -> Result<()> {
        let records = self.read_from(0)?;
        let Some(first) = records.first() else {
            return Ok(());
        };
        let base = first.timestamp;
        for (k, record) in records.iter().enumerate() {
            if record.timestamp != base + k as i64 * SECONDS_PER_DAY {
                return Err(Error::Corrupt("record timestamp does not match its position"));
            }
        }
        Ok(())
    }
}

impl<S: Write + Seek> RecordFile<S> {
    /// Overwrite record `index`, or extend the file when `index == record_count()`.
    pub fn write_record(&mut self, index: u64, record: &Record) -> Result<()> {
        if index > self.len {
            return Err(Error::UnsupportedRange(format!(
                "write at record {index} would leave a gap after record {}",
                self.len
            )));
        }
        self.seek_record(index)?;
        self.inner.write_all(&record.to_bytes())?;
        if index == self.len {
            self.len += 1;
        }
        Ok(())
    }

    /// Append a run of records with a single write.
    pub fn append(&mut self, records: &[Record]) -> Result<()> {
        if records.is_empty() {
            return Ok(());
        }
        let mut buf = Vec::with_capacity(records.len() * RECORD_SIZE);
        for record in records {
            buf.extend_from_slice(&record.to_bytes());
        }
        self.seek_record(self.len)?;
        self.inner.write_all(&buf)?;
        self.len += records.len() as u64;
        Ok(())
    }

    pub fn flush(&mut self) -> Result<()> {
        self.inner.flush()?;
        Ok(())
    }
}
