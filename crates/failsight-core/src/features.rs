//! Window feature extraction.
//!
//! Every metric window of `L` daily values reduces to three statistics: a
//! representative value (mean for averages, max for maxima), the population
//! standard deviation and an endpoint slope. Six metrics × three statistics
//! give the fixed 18-column feature vector shared by the kNN engine and any
//! downstream model.

use serde::{Deserialize, Serialize};
use statrs::statistics::Statistics;

use crate::error::FeatureError;

/// Number of features per sample.
pub const FEATURE_COUNT: usize = Metric::ALL.len() * Stat::ALL.len();

/// Fixed-order feature vector.
pub type FeatureVector = [f64; FEATURE_COUNT];

// ---------------------------------------------------------------------------
// Metrics and statistics
// ---------------------------------------------------------------------------

/// A tracked daily telemetry series.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Metric {
    TempAvg,
    TempMax,
    CpuAvg,
    CpuMax,
    LatencyAvg,
    LatencyMax,
}

impl Metric {
    pub const ALL: [Metric; 6] = [
        Metric::TempAvg,
        Metric::TempMax,
        Metric::CpuAvg,
        Metric::CpuMax,
        Metric::LatencyAvg,
        Metric::LatencyMax,
    ];

    pub fn index(self) -> usize {
        self as usize
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::TempAvg => "temp_avg",
            Self::TempMax => "temp_max",
            Self::CpuAvg => "cpu_avg",
            Self::CpuMax => "cpu_max",
            Self::LatencyAvg => "latency_avg",
            Self::LatencyMax => "latency_max",
        }
    }

    /// How the window collapses to its representative value.
    pub fn aggregate(self) -> Aggregate {
        match self {
            Self::TempAvg | Self::CpuAvg | Self::LatencyAvg => Aggregate::Mean,
            Self::TempMax | Self::CpuMax | Self::LatencyMax => Aggregate::Max,
        }
    }
}

impl std::fmt::Display for Metric {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Aggregate {
    Mean,
    Max,
}

/// Per-metric statistic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stat {
    /// Mean or max, depending on [`Metric::aggregate`].
    Value,
    StdDev,
    Slope,
}

impl Stat {
    pub const ALL: [Stat; 3] = [Stat::Value, Stat::StdDev, Stat::Slope];
}

/// One of the 18 feature columns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FeatureKey {
    pub metric: Metric,
    pub stat: Stat,
}

impl FeatureKey {
    /// All keys in column order.
    pub const ALL: [FeatureKey; FEATURE_COUNT] = {
        let mut keys = [FeatureKey {
            metric: Metric::TempAvg,
            stat: Stat::Value,
        }; FEATURE_COUNT];
        let mut m = 0;
        while m < Metric::ALL.len() {
            let mut s = 0;
            while s < Stat::ALL.len() {
                keys[m * Stat::ALL.len() + s] = FeatureKey {
                    metric: Metric::ALL[m],
                    stat: Stat::ALL[s],
                };
                s += 1;
            }
            m += 1;
        }
        keys
    };

    pub fn index(self) -> usize {
        let stat = match self.stat {
            Stat::Value => 0,
            Stat::StdDev => 1,
            Stat::Slope => 2,
        };
        self.metric.index() * Stat::ALL.len() + stat
    }

    /// Column name, e.g. `cpu_max_stdev`.
    pub fn name(self) -> String {
        match self.stat {
            Stat::Value => self.metric.name().to_string(),
            Stat::StdDev => format!("{}_stdev", self.metric.name()),
            Stat::Slope => format!("{}_slope", self.metric.name()),
        }
    }
}

impl std::fmt::Display for FeatureKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.name())
    }
}

// ---------------------------------------------------------------------------
// Extraction
// ---------------------------------------------------------------------------

/// The three statistics for one metric window.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MetricFeatures {
    pub value: f64,
    pub std_dev: f64,
    pub slope: f64,
}

/// Reduce exactly `window_len` daily values of one metric.
///
/// Slope is the endpoint rate `(last - first) / window_len`, not a fit.
pub fn extract_metric(
    metric: Metric,
    values: &[f64],
    window_len: usize,
) -> Result<MetricFeatures, FeatureError> {
    if window_len == 0 || values.len() != window_len {
        return Err(FeatureError::InvalidWindow {
            expected: window_len,
            actual: values.len(),
        });
    }

    let value = match metric.aggregate() {
        Aggregate::Mean => values.mean(),
        Aggregate::Max => values.max(),
    };
    let std_dev = values.population_std_dev();
    let slope = (values[window_len - 1] - values[0]) / window_len as f64;

    let out = MetricFeatures {
        value,
        std_dev,
        slope,
    };
    for (stat, v) in [
        (Stat::Value, out.value),
        (Stat::StdDev, out.std_dev),
        (Stat::Slope, out.slope),
    ] {
        if !v.is_finite() {
            return Err(FeatureError::NonFinite {
                feature: FeatureKey { metric, stat },
            });
        }
    }
    Ok(out)
}

/// Build the full feature vector from one window per metric, indexed by
/// [`Metric::index`].
pub fn extract_window(
    windows: &[Vec<f64>; 6],
    window_len: usize,
) -> Result<FeatureVector, FeatureError> {
    let mut features = [0.0; FEATURE_COUNT];
    for metric in Metric::ALL {
        let mf = extract_metric(metric, &windows[metric.index()], window_len)?;
        let base = metric.index() * Stat::ALL.len();
        features[base] = mf.value;
        features[base + 1] = mf.std_dev;
        features[base + 2] = mf.slope;
    }
    Ok(features)
}

/// Column names in feature order.
pub fn feature_names() -> Vec<String> {
    FeatureKey::ALL.iter().map(|k| k.name()).collect()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
