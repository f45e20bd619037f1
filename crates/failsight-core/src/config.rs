//! Pipeline configuration.
//!
//! Every knob that shapes a dataset build lives here so a build can be
//! reproduced from its manifest. Configs load from JSON; missing fields take
//! the defaults below.

use std::collections::BTreeSet;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Default window length in days.
pub const DEFAULT_SAMPLE_LEN: u32 = 14;
/// Default observation horizon (last day index of the dataset).
pub const DEFAULT_HORIZON: u32 = 579;
/// Default share of failing samples consumed by the balanced training set.
pub const DEFAULT_TRAIN_FRACTION: f64 = 0.9;

/// How the scanner moves its floor after finishing one event period.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PeriodFloor {
    /// Floor becomes the last cursor position reached.
    #[default]
    Cursor,
    /// Floor becomes the event day itself.
    Event,
}

/// How assembled samples are divided into training and validation sets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SplitPolicy {
    /// Class-balanced training set, validation skewed to natural prevalence.
    #[default]
    Balanced,
    /// Windows ending at the horizon validate; everything else trains.
    Horizon,
}

impl std::fmt::Display for SplitPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Balanced => write!(f, "balanced"),
            Self::Horizon => write!(f, "horizon"),
        }
    }
}

/// Dataset build configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Window length `L` in days.
    pub sample_len: u32,
    /// Observation horizon `H`; events after it are ignored.
    pub horizon: u32,
    /// `dist_from_event` values that never produce a sample.
    pub skip: BTreeSet<u32>,
    pub period_floor: PeriodFloor,
    /// Suppress repeat failing samples from one site on one day.
    pub site_dedup: bool,
    /// Supported device classes; the position is the class code.
    pub device_classes: Vec<String>,
    pub split: SplitPolicy,
    /// Share of the failing pool drawn into the balanced training set.
    pub train_fraction: f64,
    /// Fixed seed for reproducible partitions.
    pub seed: Option<u64>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            sample_len: DEFAULT_SAMPLE_LEN,
            horizon: DEFAULT_HORIZON,
            skip: BTreeSet::new(),
            period_floor: PeriodFloor::Cursor,
            site_dedup: true,
            device_classes: vec!["anon_model_c".to_string(), "anon_model_j".to_string()],
            split: SplitPolicy::Balanced,
            train_fraction: DEFAULT_TRAIN_FRACTION,
            seed: None,
        }
    }
}

impl PipelineConfig {
    /// Load a config from a JSON file and validate it.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Self = serde_json::from_str(&raw).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.sample_len == 0 {
            return Err(ConfigError::Validation(
                "sample_len must be greater than 0".to_string(),
            ));
        }
        if self.horizon < self.sample_len {
            return Err(ConfigError::Validation(format!(
                "horizon ({}) must be at least sample_len ({})",
                self.horizon, self.sample_len
            )));
        }
        if !(self.train_fraction > 0.0 && self.train_fraction <= 1.0) {
            return Err(ConfigError::Validation(
                "train_fraction must be in (0, 1]".to_string(),
            ));
        }
        if self.device_classes.is_empty() {
            return Err(ConfigError::Validation(
                "device_classes must not be empty".to_string(),
            ));
        }
        if self.device_classes.len() > u8::MAX as usize + 1 {
            return Err(ConfigError::Validation(
                "too many device classes".to_string(),
            ));
        }
        let unique: BTreeSet<&str> = self.device_classes.iter().map(String::as_str).collect();
        if unique.len() != self.device_classes.len() {
            return Err(ConfigError::Validation(
                "device_classes must not contain duplicates".to_string(),
            ));
        }
        Ok(())
    }

    /// Class code for a vendor tag, if supported.
    pub fn class_code(&self, tag: &str) -> Option<u8> {
        self.device_classes
            .iter()
            .position(|c| c == tag)
            .map(|i| i as u8)
    }
}
