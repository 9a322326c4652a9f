//! Engine configuration.
//!
//! Sentinels and write policies are resolved once at startup and passed to the
//! validator and write engine. They are stored as JSON so a deployment can pin
//! them next to its data.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::record::DEFAULT_META_ID;
use crate::{Error, Result};

/// Reserved values standing in for a missing observation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Sentinels {
    /// Stored in the value field when the observation is absent.
    /// Default: -9999.0
    pub missing_value: f64,
    /// Stored in the meta id field when the observation is absent.
    /// Default: -1
    pub missing_meta_id: i32,
}

impl Default for Sentinels {
    fn default() -> Self {
        Self {
            missing_value: -9999.0,
            missing_meta_id: -1,
        }
    }
}

/// How an append that starts more than one day after the stored range is handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AppendGapPolicy {
    /// Write sentinel filler records for every skipped day.
    #[default]
    FillMissing,
    /// Accept only an append starting exactly one day after the last record.
    Strict,
}

/// How missing days inside an incoming series are handled by validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InteriorGaps {
    /// Fail validation with `Error::NotDense`.
    #[default]
    Reject,
    /// Insert a missing observation for every absent day.
    FillMissing,
}

/// Configuration for the write engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub sentinels: Sentinels,

    /// Default: `FillMissing`
    pub append_gaps: AppendGapPolicy,

    /// Default: `Reject`
    pub interior_gaps: InteriorGaps,

    /// `sync_all` series files after every write.
    /// Default: false
    pub sync: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            sentinels: Sentinels::default(),
            append_gaps: AppendGapPolicy::default(),
            interior_gaps: InteriorGaps::default(),
            sync: false,
        }
    }
}

impl EngineConfig {
    /// Load and validate a JSON config file. Missing fields take their defaults.
    pub fn load(path: &Path) -> Result<Self> {
        let json = fs::read_to_string(path)?;
        let config: EngineConfig = serde_json::from_str(&json)?;
        config.validate()?;
        Ok(config)
    }

    /// Save the config as pretty-printed JSON.
    pub fn save(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json)?;
        Ok(())
    }

    /// Reject sentinels that cannot be told apart from real data.
    pub fn validate(&self) -> Result<()> {
        if !self.sentinels.missing_value.is_finite() {
            return Err(Error::InvalidConfig(format!(
                "missing_value sentinel must be finite, got {}",
                self.sentinels.missing_value
            )));
        }
        if self.sentinels.missing_meta_id == DEFAULT_META_ID {
            return Err(Error::InvalidConfig(format!(
                "missing_meta_id sentinel must differ from the default meta id {DEFAULT_META_ID}"
            )));
        }
        Ok(())
    }
}
