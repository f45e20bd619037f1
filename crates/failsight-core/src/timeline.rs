//! Device timelines parsed from the per-batch telemetry document.
//!
//! The document maps a device id to its record: vendor tag, site, one
//! day-indexed series per metric and an event log. Records that fail to parse
//! are rejected one at a time; the rest of the batch goes on.

use std::collections::{BTreeMap, HashMap};
use std::path::Path;

use serde::Deserialize;

use crate::config::PipelineConfig;
use crate::error::{Error, TimelineError};
use crate::features::Metric;

/// Status tag of a recorded event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventStatus {
    Down,
    Other(String),
}

impl EventStatus {
    fn parse(tag: &str) -> Self {
        match tag {
            "down" => Self::Down,
            other => Self::Other(other.to_string()),
        }
    }
}

/// One day-indexed metric series. Gaps are legal.
pub type Series = HashMap<u32, f64>;

/// A switch's full observation record. Read-only once built.
#[derive(Debug, Clone)]
pub struct DeviceTimeline {
    pub id: String,
    pub name: String,
    pub site: Option<String>,
    pub class_code: u8,
    series: [Series; 6],
    events: BTreeMap<u32, EventStatus>,
}

impl DeviceTimeline {
    /// Assemble a timeline directly (used by tests and in-memory callers).
    pub fn new(
        id: impl Into<String>,
        site: Option<String>,
        class_code: u8,
        series: [Series; 6],
        events: BTreeMap<u32, EventStatus>,
    ) -> Self {
        let id = id.into();
        Self {
            name: id.clone(),
            id,
            site,
            class_code,
            series,
            events,
        }
    }

    pub fn series(&self, metric: Metric) -> &Series {
        &self.series[metric.index()]
    }

    pub fn events(&self) -> &BTreeMap<u32, EventStatus> {
        &self.events
    }

    /// Copy the `[end_day - len, end_day)` slice of every metric, or `None`
    /// if any metric is missing any day.
    pub fn window(&self, end_day: u32, len: u32) -> Option<[Vec<f64>; 6]> {
        if end_day < len {
            return None;
        }
        let start = end_day - len;
        let mut out: [Vec<f64>; 6] = Default::default();
        for metric in Metric::ALL {
            let series = &self.series[metric.index()];
            let values = &mut out[metric.index()];
            values.reserve(len as usize);
            for day in start..end_day {
                values.push(*series.get(&day)?);
            }
        }
        Some(out)
    }
}

// ---------------------------------------------------------------------------
// Raw document
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawValue {
    Number(f64),
    Text(String),
}

#[derive(Debug, Deserialize)]
struct RawDevice {
    model: String,
    #[serde(default)]
    site_code: Option<String>,
    #[serde(default)]
    switch_name: Option<String>,
    temp_avg: BTreeMap<String, RawValue>,
    temp_max: BTreeMap<String, RawValue>,
    cpu_avg: BTreeMap<String, RawValue>,
    cpu_max: BTreeMap<String, RawValue>,
    #[serde(alias = "latency_avg")]
    ping_latency_avg: BTreeMap<String, RawValue>,
    #[serde(alias = "latency_max")]
    ping_latency_max: BTreeMap<String, RawValue>,
    #[serde(default)]
    events: BTreeMap<String, Vec<serde_json::Value>>,
}

fn parse_day(device: &str, series: &str, key: &str) -> Result<u32, TimelineError> {
    key.trim().parse::<u32>().map_err(|_| TimelineError::BadDay {
        device: device.to_string(),
        series: series.to_string(),
        key: key.to_string(),
    })
}

fn parse_series(
    device: &str,
    metric: Metric,
    raw: BTreeMap<String, RawValue>,
) -> Result<Series, TimelineError> {
    let mut out = Series::with_capacity(raw.len());
    for (key, value) in raw {
        let day = parse_day(device, metric.name(), &key)?;
        let v = match value {
            RawValue::Number(n) => n,
            RawValue::Text(s) => s.trim().parse::<f64>().map_err(|_| TimelineError::BadValue {
                device: device.to_string(),
                series: metric.name().to_string(),
                day,
                value: s.clone(),
            })?,
        };
        out.insert(day, v);
    }
    Ok(out)
}

/// Convert one raw JSON record into a timeline, applying the class and
/// minimum-observation filters.
pub fn parse_device(
    id: &str,
    value: serde_json::Value,
    config: &PipelineConfig,
) -> Result<DeviceTimeline, TimelineError> {
    let raw: RawDevice =
        serde_json::from_value(value).map_err(|e| TimelineError::Malformed {
            device: id.to_string(),
            reason: e.to_string(),
        })?;

    let class_code =
        config
            .class_code(&raw.model)
            .ok_or_else(|| TimelineError::UnsupportedClass {
                device: id.to_string(),
                class: raw.model.clone(),
            })?;

    let observed = raw.ping_latency_max.len();
    if observed < config.sample_len as usize {
        return Err(TimelineError::TooFewObservations {
            device: id.to_string(),
            observed,
            required: config.sample_len as usize,
        });
    }

    let series = [
        parse_series(id, Metric::TempAvg, raw.temp_avg)?,
        parse_series(id, Metric::TempMax, raw.temp_max)?,
        parse_series(id, Metric::CpuAvg, raw.cpu_avg)?,
        parse_series(id, Metric::CpuMax, raw.cpu_max)?,
        parse_series(id, Metric::LatencyAvg, raw.ping_latency_avg)?,
        parse_series(id, Metric::LatencyMax, raw.ping_latency_max)?,
    ];

    let mut events = BTreeMap::new();
    for (key, descriptor) in raw.events {
        let day = parse_day(id, "events", &key)?;
        let status = descriptor
            .first()
            .and_then(|v| v.as_str())
            .ok_or_else(|| TimelineError::Malformed {
                device: id.to_string(),
                reason: format!("event on day {day} has no status tag"),
            })?;
        events.insert(day, EventStatus::parse(status));
    }

    Ok(DeviceTimeline {
        id: id.to_string(),
        name: raw.switch_name.unwrap_or_else(|| id.to_string()),
        site: raw.site_code,
        class_code,
        series,
        events,
    })
}

/// Result of parsing one telemetry document.
#[derive(Debug, Default)]
pub struct ParsedBatch {
    pub timelines: Vec<DeviceTimeline>,
    pub rejected: Vec<TimelineError>,
}

/// Parse a whole telemetry document from a JSON string. Device order follows
/// the sorted device ids so builds are reproducible.
pub fn parse_document(json: &str, config: &PipelineConfig) -> Result<ParsedBatch, serde_json::Error> {
    let records: BTreeMap<String, serde_json::Value> = serde_json::from_str(json)?;
    let mut batch = ParsedBatch::default();
    for (id, value) in records {
        match parse_device(&id, value, config) {
            Ok(timeline) => batch.timelines.push(timeline),
            Err(e) => {
                log::warn!("skipping {e}");
                batch.rejected.push(e);
            }
        }
    }
    log::debug!(
        "parsed {} devices ({} rejected)",
        batch.timelines.len(),
        batch.rejected.len()
    );
    Ok(batch)
}

/// Read and parse a telemetry document from disk.
pub fn load_document(path: &Path, config: &PipelineConfig) -> Result<ParsedBatch, Error> {
    let raw = std::fs::read_to_string(path).map_err(|source| Error::Io {
        path: path.to_path_buf(),
        source,
    })?;
    parse_document(&raw, config).map_err(|source| Error::Document {
        path: path.to_path_buf(),
        source,
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
