use serde::{Deserialize, Serialize};
use std::{
    collections::BTreeSet,
    fs::{read_to_string, write},
    path::Path,
};

use crate::{error::RegistryError, summary::Layout, time::HourBucket};

pub const DEFAULT_PASSIVE_STREAMS: &[&str] = &[
    "accelerometer",
    "ambient_audio",
    "app_log",
    "bluetooth",
    "calls",
    "devicemotion",
    "gps",
    "gyro",
    "identifiers",
    "ios_log",
    "magnetometer",
    "power_state",
    "proximity",
    "reachability",
    "texts",
    "wifi",
];

pub const DEFAULT_SURVEY_STREAMS: &[&str] = &["audio_recordings", "survey_answers", "survey_timings"];

/// Stream holding device identifier files.
pub const IDENTIFIERS_STREAM: &str = "identifiers";

/// Which attached configuration supplies duty cycles for a user's coverage statistics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CoveragePolicy {
    /// Only the configuration attached to that user.
    #[default]
    AttachedOnly,
    /// The user's own configuration, else the first attached configuration in path order.
    AnyAttached,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanConfig {
    pub passive_streams: BTreeSet<String>,
    pub survey_streams: BTreeSet<String>,
    /// Inclusive window of hour buckets to register. Files outside are skipped.
    pub utc_range: Option<(HourBucket, HourBucket)>,
}

impl Default for ScanConfig {
    fn default() -> Self {
        ScanConfig {
            passive_streams: DEFAULT_PASSIVE_STREAMS.iter().map(|s| s.to_string()).collect(),
            survey_streams: DEFAULT_SURVEY_STREAMS.iter().map(|s| s.to_string()).collect(),
            utc_range: None,
        }
    }
}

impl ScanConfig {
    pub fn is_known_stream(&self, name: &str) -> bool {
        self.passive_streams.contains(name) || self.survey_streams.contains(name)
    }

    pub fn is_survey_stream(&self, name: &str) -> bool {
        self.survey_streams.contains(name)
    }

    pub fn in_range(&self, bucket: &HourBucket) -> bool {
        match &self.utc_range {
            Some((start, end)) => start <= bucket && bucket <= end,
            None => true,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CoverageConfig {
    pub policy: CoveragePolicy,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExportConfig {
    pub indent: usize,
    pub max_width: usize,
}

impl Default for ExportConfig {
    fn default() -> Self {
        let layout = Layout::default();
        ExportConfig {
            indent: layout.indent,
            max_width: layout.max_width,
        }
    }
}

impl ExportConfig {
    pub fn layout(&self) -> Layout {
        Layout {
            indent: self.indent,
            max_width: self.max_width,
            rule_zero: true,
        }
    }
}

/// Options controlling scans, coverage and exports. Stored as TOML.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistryConfig {
    pub scan: ScanConfig,
    pub coverage: CoverageConfig,
    pub export: ExportConfig,
}

impl RegistryConfig {
    /// Read from a TOML file. A missing file yields the defaults.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<RegistryConfig, RegistryError> {
        let path = path.as_ref();
        tracing::debug!("Attempting to read registry config from: {:?}", path);
        if !path.exists() {
            tracing::debug!("Config file not found, using defaults.");
            return Ok(RegistryConfig::default());
        }
        let content = read_to_string(path)?;
        Ok(toml::from_str(&content)?)
    }

    pub fn to_file<P: AsRef<Path>>(&self, path: P) -> Result<(), RegistryError> {
        tracing::debug!("Attempting to write registry config to: {:?}", path.as_ref());
        let toml_string = toml::to_string(self)?;
        write(path, toml_string)?;
        Ok(())
    }
}
