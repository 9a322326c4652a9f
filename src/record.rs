//! Fixed-width record codec.
//!
//! Layout (little-endian, 20 bytes):
//!
//! ```text
//! 0        8        16     20
//! | ts i64 | val f64 | meta i32 |
//! ```

use crate::config::Sentinels;

pub const RECORD_SIZE: usize = 20;
pub const DEFAULT_META_ID: i32 = 0;

pub const TIMESTAMP_OFFSET: usize = 0;
pub const VALUE_OFFSET: usize = 8;
pub const META_ID_OFFSET: usize = 16;

/// One calendar day's observation.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Record {
    /// Unix seconds of the day's UTC midnight.
    pub timestamp: i64,
    pub value: f64,
    pub meta_id: i32,
}

impl Record {
    pub fn new(timestamp: i64, value: f64, meta_id: i32) -> Self {
        Self {
            timestamp,
            value,
            meta_id,
        }
    }

    /// Build the record stored for `value`, substituting the sentinel pair for NaN.
    pub fn observation(timestamp: i64, value: f64, meta_id: i32, sentinels: &Sentinels) -> Self {
        if value.is_nan() {
            Self::missing(timestamp, sentinels)
        } else {
            Self::new(timestamp, value, meta_id)
        }
    }

    pub fn missing(timestamp: i64, sentinels: &Sentinels) -> Self {
        Self::new(timestamp, sentinels.missing_value, sentinels.missing_meta_id)
    }

    pub fn is_missing(&self, sentinels: &Sentinels) -> bool {
        self.value.to_bits() == sentinels.missing_value.to_bits()
            && self.meta_id == sentinels.missing_meta_id
    }

    /// Stored value with the missing sentinel mapped back to NaN.
    pub fn value_or_nan(&self, sentinels: &Sentinels) -> f64 {
        if self.is_missing(sentinels) {
            f64::NAN
        } else {
            self.value
        }
    }

    /// Bit-for-bit comparison of the stored values.
    pub fn same_value(&self, other: &Record) -> bool {
        self.value.to_bits() == other.value.to_bits()
    }

    pub fn to_bytes(&self) -> [u8; RECORD_SIZE] {
        let mut buf = [0u8; RECORD_SIZE];
        buf[TIMESTAMP_OFFSET..TIMESTAMP_OFFSET + 8].copy_from_slice(&self.timestamp.to_le_bytes());
        buf[VALUE_OFFSET..VALUE_OFFSET + 8].copy_from_slice(&self.value.to_le_bytes());
        buf[META_ID_OFFSET..META_ID_OFFSET + 4].copy_from_slice(&self.meta_id.to_le_bytes());
        buf
    }

    pub fn from_bytes(bytes: &[u8; RECORD_SIZE]) -> Self {
        let mut ts = [0u8; 8];
        ts.copy_from_slice(&bytes[TIMESTAMP_OFFSET..TIMESTAMP_OFFSET + 8]);
        let mut value = [0u8; 8];
        value.copy_from_slice(&bytes[VALUE_OFFSET..VALUE_OFFSET + 8]);
        let mut meta_id = [0u8; 4];
        meta_id.copy_from_slice(&bytes[META_ID_OFFSET..META_ID_OFFSET + 4]);
        Self {
            timestamp: i64::from_le_bytes(ts),
            value: f64::from_le_bytes(value),
            meta_id: i32::from_le_bytes(meta_id),
        }
    }
}

pub fn encode(timestamp: i64, value: f64, meta_id: i32, sentinels: &Sentinels) -> [u8; RECORD_SIZE] {
    Record::observation(timestamp, value, meta_id, sentinels).to_bytes()
}

pub fn decode(bytes: &[u8; RECORD_SIZE]) -> Record {
    Record::from_bytes(bytes)
}
