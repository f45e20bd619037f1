//! Feature tables and the dataset manifest.
//!
//! # Storage Format
//!
//! A built dataset is a directory containing:
//! - `training.csv`, `validation.csv`: one normalized sample per row
//! - `dataset.json`: build metadata (config, counts, feature limits)
//!
//! Table rows are `label,device_class,<18 features>,device`. The device
//! column is last and may be empty.

use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::assembler::{AssemblyStats, Sample};
use crate::config::PipelineConfig;
use crate::error::{Error, TableError};
use crate::features::{FEATURE_COUNT, FeatureVector, feature_names};
use crate::knn::LabeledVector;
use crate::normalize::{FeatureLimit, RunningLimits};
use crate::scanner::Label;

pub const TRAINING_FILE: &str = "training.csv";
pub const VALIDATION_FILE: &str = "validation.csv";
pub const MANIFEST_FILE: &str = "dataset.json";

/// Fields per row: label, class, features, device.
const ROW_FIELDS: usize = FEATURE_COUNT + 3;

pub fn table_header() -> String {
    format!("label,device_class,{},device", feature_names().join(","))
}

// ---------------------------------------------------------------------------
// Writer
// ---------------------------------------------------------------------------

/// Streams rows into one feature table.
pub struct FeatureTableWriter {
    path: PathBuf,
    writer: BufWriter<File>,
    rows: u64,
}

impl FeatureTableWriter {
    /// Create (or truncate) the table and write its header.
    pub fn create(path: &Path) -> Result<Self, TableError> {
        let io = |source| TableError::Io {
            path: path.to_path_buf(),
            source,
        };
        let mut writer = BufWriter::new(File::create(path).map_err(io)?);
        writeln!(writer, "{}", table_header()).map_err(io)?;
        Ok(Self {
            path: path.to_path_buf(),
            writer,
            rows: 0,
        })
    }

    pub fn write_row(
        &mut self,
        label: Label,
        class_code: u8,
        features: &FeatureVector,
        device: Option<&str>,
    ) -> Result<(), TableError> {
        self.write_row_inner(label, class_code, features, device)
            .map_err(|source| TableError::Io {
                path: self.path.clone(),
                source,
            })?;
        self.rows += 1;
        Ok(())
    }

    fn write_row_inner(
        &mut self,
        label: Label,
        class_code: u8,
        features: &FeatureVector,
        device: Option<&str>,
    ) -> std::io::Result<()> {
        write!(self.writer, "{},{}", label.code(), class_code)?;
        for v in features {
            write!(self.writer, ",{v}")?;
        }
        let device = device.unwrap_or_default().replace(['\n', '\r'], " ");
        writeln!(self.writer, ",{device}")
    }

    /// Flush and return the number of rows written.
    pub fn finish(mut self) -> Result<u64, TableError> {
        self.writer.flush().map_err(|source| TableError::Io {
            path: self.path.clone(),
            source,
        })?;
        Ok(self.rows)
    }
}

/// Normalize `samples` with `limits` and write them as a table.
pub fn write_samples(path: &Path, samples: &[Sample], limits: &RunningLimits) -> Result<u64, Error> {
    let mut writer = FeatureTableWriter::create(path)?;
    for s in samples {
        let normalized = limits.normalize(&s.features)?;
        writer.write_row(s.label, s.class_code, &normalized, s.device.as_deref())?;
    }
    let rows = writer.finish()?;
    log::info!("wrote {rows} rows to {}", path.display());
    Ok(rows)
}

// ---------------------------------------------------------------------------
// Reader
// ---------------------------------------------------------------------------

fn parse_row(line: &str) -> Result<LabeledVector, String> {
    let fields: Vec<&str> = line.splitn(ROW_FIELDS, ',').collect();
    if fields.len() != ROW_FIELDS {
        return Err(format!(
            "expected {ROW_FIELDS} fields, found {}",
            fields.len()
        ));
    }
    let code: u8 = fields[0]
        .trim()
        .parse()
        .map_err(|_| format!("bad label '{}'", fields[0]))?;
    let label = Label::from_code(code).ok_or_else(|| format!("label must be 0 or 1, got {code}"))?;
    let class_code: u8 = fields[1]
        .trim()
        .parse()
        .map_err(|_| format!("bad device class '{}'", fields[1]))?;

    let mut features = [0.0; FEATURE_COUNT];
    for (i, raw) in fields[2..2 + FEATURE_COUNT].iter().enumerate() {
        let v: f64 = raw
            .trim()
            .parse()
            .map_err(|_| format!("bad value '{raw}' in column {}", i + 3))?;
        if !v.is_finite() {
            return Err(format!("non-finite value in column {}", i + 3));
        }
        features[i] = v;
    }

    let device = fields[ROW_FIELDS - 1].trim();
    Ok(LabeledVector {
        label,
        class_code,
        features,
        device: (!device.is_empty()).then(|| device.to_string()),
    })
}

/// Read a whole feature table, preserving row order.
pub fn read_feature_table(path: &Path) -> Result<Vec<LabeledVector>, TableError> {
    let text = fs::read_to_string(path).map_err(|source| TableError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let row_err = |line: usize, reason: String| TableError::Row {
        path: path.to_path_buf(),
        line,
        reason,
    };

    let mut lines = text.lines().enumerate();
    match lines.next() {
        Some((_, header)) if header.trim() == table_header() => {}
        Some(_) => return Err(row_err(1, "missing or unexpected header".to_string())),
        None => return Err(row_err(1, "table is empty".to_string())),
    }

    let mut rows = Vec::new();
    for (i, line) in lines {
        if line.trim().is_empty() {
            continue;
        }
        rows.push(parse_row(line).map_err(|reason| row_err(i + 1, reason))?);
    }
    log::debug!("read {} rows from {}", rows.len(), path.display());
    Ok(rows)
}

// ---------------------------------------------------------------------------
// Manifest (dataset.json)
// ---------------------------------------------------------------------------

pub const MANIFEST_VERSION: u32 = 1;

/// Sizes of the written splits.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SplitSizes {
    pub training: u64,
    pub training_failing: u64,
    pub validation: u64,
    pub validation_failing: u64,
    /// Healthy samples assembled but not written to either table.
    pub unused: u64,
}

/// Metadata written next to the feature tables.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatasetManifest {
    pub version: u32,
    pub id: String,
    pub created_unix_secs: u64,
    pub config: PipelineConfig,
    pub stats: AssemblyStats,
    pub split: SplitSizes,
    /// Per-feature min/max used to normalize both tables.
    pub limits: Vec<FeatureLimit>,
    pub device_classes: Vec<String>,
    pub failsight_version: String,
}

impl DatasetManifest {
    pub fn new(
        config: &PipelineConfig,
        stats: AssemblyStats,
        split: SplitSizes,
        limits: &RunningLimits,
    ) -> Self {
        let created_unix_secs = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs();
        Self {
            version: MANIFEST_VERSION,
            id: Uuid::new_v4().to_string(),
            created_unix_secs,
            config: config.clone(),
            stats,
            split,
            limits: limits.to_records(),
            device_classes: config.device_classes.clone(),
            failsight_version: crate::VERSION.to_string(),
        }
    }

    /// Rebuild the normalization limits, if every feature is recorded.
    pub fn running_limits(&self) -> Option<RunningLimits> {
        RunningLimits::from_records(&self.limits, self.stats.healthy + self.stats.failing)
    }

    pub fn write(&self, path: &Path) -> Result<(), TableError> {
        let json = serde_json::to_string_pretty(self).map_err(|source| TableError::Json {
            path: path.to_path_buf(),
            source,
        })?;
        fs::write(path, json).map_err(|source| TableError::Io {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn read(path: &Path) -> Result<Self, TableError> {
        let raw = fs::read_to_string(path).map_err(|source| TableError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&raw).map_err(|source| TableError::Json {
            path: path.to_path_buf(),
            source,
        })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(label: Label, base: f64, device: Option<&str>) -> Sample {
        Sample {
            label,
            class_code: 1,
            device: device.map(String::from),
            end_day: 10,
            at_horizon: false,
            features: std::array::from_fn(|i| base + i as f64),
        }
    }

    #[test]
    fn test_header_layout() {
        let header = table_header();
        let cols: Vec<&str> = header.split(',').collect();
        assert_eq!(cols.len(), ROW_FIELDS);
        assert_eq!(cols[0], "label");
        assert_eq!(cols[1], "device_class");
        assert_eq!(cols[2], "temp_avg");
        assert_eq!(cols[ROW_FIELDS - 1], "device");
    }

    #[test]
    fn test_written_rows_are_normalized() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(TRAINING_FILE);
        let samples = vec![
            sample(Label::Failing, 0.0, Some("sw-1")),
            sample(Label::Healthy, 4.0, None),
            sample(Label::Healthy, 2.0, Some("sw,3")),
        ];
        let mut limits = RunningLimits::new();
        for s in &samples {
            limits.observe(&s.features);
        }
        assert_eq!(write_samples(&path, &samples, &limits).unwrap(), 3);

        let rows = read_feature_table(&path).unwrap();
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[0].label, Label::Failing);
        assert_eq!(rows[0].class_code, 1);
        assert!(rows[0].features.iter().all(|&v| v == 0.0));
        assert!(rows[1].features.iter().all(|&v| v == 1.0));
        assert!(rows[2].features.iter().all(|&v| v == 0.5));
        assert_eq!(rows[0].device.as_deref(), Some("sw-1"));
        assert_eq!(rows[1].device, None);
        assert_eq!(rows[2].device.as_deref(), Some("sw,3"));
    }

    #[test]
    fn test_bad_rows_report_line_numbers() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("t.csv");
        let good = format!("0,0,{},sw", vec!["0.5"; FEATURE_COUNT].join(","));
        let bad_label = format!("2,0,{},sw", vec!["0.5"; FEATURE_COUNT].join(","));
        fs::write(&path, format!("{}\n{good}\n{bad_label}\n", table_header())).unwrap();
        match read_feature_table(&path) {
            Err(TableError::Row { line, .. }) => assert_eq!(line, 3),
            other => panic!("expected row error, got {other:?}"),
        }

        fs::write(&path, format!("{}\n0,0,1.0,sw\n", table_header())).unwrap();
        assert!(matches!(
            read_feature_table(&path),
            Err(TableError::Row { line: 2, .. })
        ));

        fs::write(&path, format!("{good}\n")).unwrap();
        assert!(matches!(
            read_feature_table(&path),
            Err(TableError::Row { line: 1, .. })
        ));
    }

    #[test]
    fn test_manifest_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(MANIFEST_FILE);
        let mut limits = RunningLimits::new();
        limits.observe(&[0.0; FEATURE_COUNT]);
        limits.observe(&[2.0; FEATURE_COUNT]);
        let stats = AssemblyStats {
            healthy: 1,
            failing: 1,
            ..Default::default()
        };
        let manifest = DatasetManifest::new(
            &PipelineConfig::default(),
            stats,
            SplitSizes::default(),
            &limits,
        );
        manifest.write(&path).unwrap();

        let back = DatasetManifest::read(&path).unwrap();
        assert_eq!(back.id, manifest.id);
        assert_eq!(back.version, MANIFEST_VERSION);
        assert_eq!(back.config, PipelineConfig::default());
        assert_eq!(back.running_limits(), Some(limits));
        assert_eq!(back.device_classes, vec!["anon_model_c", "anon_model_j"]);
    }
}
