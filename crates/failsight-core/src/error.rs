//! Error types for every stage of the pipeline.
//!
//! Each stage has its own enum so callers can match on the conditions they
//! handle (a dropped window, a rejected device) and propagate the rest through
//! the crate-level [`Error`].

use std::path::PathBuf;

use thiserror::Error;

use crate::features::FeatureKey;

/// Structural problems with one device record. The device is skipped; the
/// rest of the batch is still processed.
#[derive(Debug, Error)]
pub enum TimelineError {
    #[error("device {device}: unsupported device class '{class}'")]
    UnsupportedClass { device: String, class: String },
    #[error("device {device}: malformed record: {reason}")]
    Malformed { device: String, reason: String },
    #[error("device {device}: bad day index '{key}' in {series}")]
    BadDay {
        device: String,
        series: String,
        key: String,
    },
    #[error("device {device}: non-numeric value '{value}' on day {day} of {series}")]
    BadValue {
        device: String,
        series: String,
        day: u32,
        value: String,
    },
    #[error("device {device}: only {observed} latency observations, need {required}")]
    TooFewObservations {
        device: String,
        observed: usize,
        required: usize,
    },
}

#[derive(Debug, Error, PartialEq)]
pub enum FeatureError {
    #[error("invalid window: expected {expected} daily values, got {actual}")]
    InvalidWindow { expected: usize, actual: usize },
    #[error("invalid window: non-finite {feature}")]
    NonFinite { feature: FeatureKey },
}

#[derive(Debug, Error, PartialEq)]
pub enum NormalizeError {
    #[error("degenerate range for feature {feature}: min == max == {value}")]
    DegenerateFeatureRange { feature: FeatureKey, value: f64 },
    #[error("no samples observed; feature limits are unset")]
    NoObservations,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SearchError {
    #[error("insufficient data: requested {requested} neighbors from {available} training vectors")]
    InsufficientData { requested: usize, available: usize },
    #[error("at least one neighbor must be requested")]
    ZeroNeighbors,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SweepError {
    #[error("sample range {start}-{end} is outside 1-{available}")]
    InvalidRange {
        start: usize,
        end: usize,
        available: usize,
    },
    #[error("cannot merge sweeps over k ranges {left} and {right}")]
    KRangeMismatch { left: usize, right: usize },
    #[error(transparent)]
    Search(#[from] SearchError),
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PartitionError {
    #[error("no failing samples were assembled; cannot balance the dataset")]
    NoFailingSamples,
}

#[derive(Debug, Error)]
pub enum TableError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("{path}:{line}: {reason}")]
    Row {
        path: PathBuf,
        line: usize,
        reason: String,
    },
    #[error("{path}: a report block covers one sample range, this sweep covers {ranges}")]
    MergedReport { path: PathBuf, ranges: usize },
    #[error("failed to encode or decode {path}: {source}")]
    Json {
        path: PathBuf,
        source: serde_json::Error,
    },
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },
    #[error("invalid config: {0}")]
    Validation(String),
}

/// Crate-level error.
#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Timeline(#[from] TimelineError),
    #[error(transparent)]
    Feature(#[from] FeatureError),
    #[error(transparent)]
    Normalize(#[from] NormalizeError),
    #[error(transparent)]
    Search(#[from] SearchError),
    #[error(transparent)]
    Sweep(#[from] SweepError),
    #[error(transparent)]
    Partition(#[from] PartitionError),
    #[error(transparent)]
    Table(#[from] TableError),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("failed to parse telemetry document {path}: {source}")]
    Document {
        path: PathBuf,
        source: serde_json::Error,
    },
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
