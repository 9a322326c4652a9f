//! Exclusive-access guard for a series file.
//!
//! The write engine assumes a single writer per series and does no locking of
//! its own. Callers that may race take a [`SeriesLock`] around each write; the
//! guard is an advisory `flock` on `<series>.lock` and is released on drop.

use std::fs::{File, OpenOptions};
use std::io::{Seek, SeekFrom, Write};
use std::os::unix::io::AsRawFd;
use std::path::{Path, PathBuf};

use crate::{Error, Result};

pub const LOCK_EXTENSION: &str = "lock";

#[derive(Debug)]
pub struct SeriesLock {
    series: PathBuf,
    _file: File,
}

impl SeriesLock {
    /// Take the lock without blocking. Fails with `Error::WriterAlreadyActive`
    /// if another handle holds it.
    ///
    /// The series path is kept with its parent directory canonicalized, so
    /// relative and absolute spellings of one file name the same guard.
    pub fn acquire(series: &Path) -> Result<Self> {
        let path = lock_path(series);
        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .truncate(false)
            .open(&path)?;
        if !try_lock(&file)? {
            return Err(Error::WriterAlreadyActive);
        }
        write_owner(&file)?;
        log::debug!("acquired series lock {}", path.display());
        Ok(Self {
            series: normalize(series),
            _file: file,
        })
    }

    /// True when this guard was taken for `series`, compared after the same
    /// parent normalization `acquire` applies.
    pub fn covers(&self, series: &Path) -> bool {
        self.series == normalize(series)
    }

    pub fn series(&self) -> &Path {
        &self.series
    }
}

pub fn lock_path(series: &Path) -> PathBuf {
    let mut name = series.as_os_str().to_owned();
    name.push(".");
    name.push(LOCK_EXTENSION);
    PathBuf::from(name)
}

/// Canonicalize the parent directory and rejoin the file name. The series
/// file itself may not exist yet, so it is not resolved.
fn normalize(series: &Path) -> PathBuf {
    let parent = match series.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    let parent = parent
        .canonicalize()
        .unwrap_or_else(|_| parent.to_path_buf());
    match series.file_name() {
        Some(name) => parent.join(name),
        None => series.to_path_buf(),
    }
}

fn try_lock(file: &File) -> Result<bool> {
    // SAFETY: flock only reads the descriptor, which `file` keeps open.
    let res = unsafe { libc::flock(file.as_raw_fd(), libc::LOCK_EX | libc::LOCK_NB) };
    if res == 0 {
        return Ok(true);
    }
    let err = std::io::Error::last_os_error();
    if err.kind() == std::io::ErrorKind::WouldBlock {
        return Ok(false);
    }
    Err(Error::Io(err))
}

fn write_owner(file: &File) -> Result<()> {
    let mut handle = file.try_clone()?;
    handle.set_len(0)?;
    handle.seek(SeekFrom::Start(0))?;
    writeln!(handle, "{}", std::process::id())?;
    Ok(())
}
