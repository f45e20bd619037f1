//! Dataset build and single-window prediction.
//!
//! `build_dataset` runs the whole labeling pipeline: telemetry documents →
//! assembled pools → partition → normalized tables plus manifest.
//! `predict_devices` applies a built dataset to fresh telemetry.

use std::fs;
use std::path::{Path, PathBuf};

use crate::assembler::SampleAssembler;
use crate::config::PipelineConfig;
use crate::error::{Error, Result};
use crate::features::extract_window;
use crate::knn::{NeighborIndex, Voting};
use crate::normalize::RunningLimits;
use crate::partition::{count_label, partition};
use crate::scanner::Label;
use crate::table::{
    DatasetManifest, MANIFEST_FILE, SplitSizes, TRAINING_FILE, VALIDATION_FILE, write_samples,
};
use crate::timeline::{ParsedBatch, load_document};

/// Expand directories into their `*.json` files (sorted); plain files pass
/// through unchanged.
pub fn collect_inputs(paths: &[PathBuf]) -> Result<Vec<PathBuf>> {
    let mut out = Vec::new();
    for path in paths {
        if !path.is_dir() {
            out.push(path.clone());
            continue;
        }
        let entries = fs::read_dir(path).map_err(|source| Error::Io {
            path: path.clone(),
            source,
        })?;
        let mut found: Vec<PathBuf> = entries
            .filter_map(|e| e.ok().map(|e| e.path()))
            .filter(|p| p.is_file() && p.extension().is_some_and(|x| x == "json"))
            .collect();
        found.sort();
        if found.is_empty() {
            log::warn!("no .json documents in {}", path.display());
        }
        out.extend(found);
    }
    Ok(out)
}

/// Build training and validation tables plus `dataset.json` under `out_dir`.
pub fn build_dataset(
    inputs: &[PathBuf],
    out_dir: &Path,
    config: &PipelineConfig,
) -> Result<DatasetManifest> {
    config.validate()?;
    fs::create_dir_all(out_dir).map_err(|source| Error::Io {
        path: out_dir.to_path_buf(),
        source,
    })?;

    let mut assembler = SampleAssembler::new(config);
    for input in collect_inputs(inputs)? {
        log::info!("reading {}", input.display());
        let batch = load_document(&input, config)?;
        assembler.add_batch(&batch);
    }
    let pools = assembler.finish();
    pools.limits.validate()?;

    let split = partition(pools.healthy, pools.failing, config)?;
    let training_path = out_dir.join(TRAINING_FILE);
    let validation_path = out_dir.join(VALIDATION_FILE);
    let sizes = SplitSizes {
        training: write_samples(&training_path, &split.training, &pools.limits)?,
        training_failing: count_label(&split.training, Label::Failing) as u64,
        validation: write_samples(&validation_path, &split.validation, &pools.limits)?,
        validation_failing: count_label(&split.validation, Label::Failing) as u64,
        unused: split.unused as u64,
    };

    let manifest = DatasetManifest::new(config, pools.stats, sizes, &pools.limits);
    manifest.write(&out_dir.join(MANIFEST_FILE))?;
    log::info!("dataset {} written to {}", manifest.id, out_dir.display());
    Ok(manifest)
}

/// Result for one device.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    Predicted(Label),
    /// Some day in the window has no reading.
    NoWindow,
    /// The window exists but its features are unusable.
    Invalid(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct DevicePrediction {
    pub device: String,
    pub end_day: u32,
    pub outcome: Outcome,
}

/// Classify the window ending at `end_day` for every device in `batch`.
pub fn predict_devices(
    batch: &ParsedBatch,
    limits: &RunningLimits,
    sample_len: u32,
    index: &NeighborIndex,
    k: usize,
    voting: Voting,
    end_day: u32,
) -> Result<Vec<DevicePrediction>> {
    let mut out = Vec::with_capacity(batch.timelines.len());
    for timeline in &batch.timelines {
        let outcome = match timeline.window(end_day, sample_len) {
            None => Outcome::NoWindow,
            Some(windows) => match extract_window(&windows, sample_len as usize) {
                Err(e) => Outcome::Invalid(e.to_string()),
                Ok(features) => {
                    let normalized = limits.normalize(&features)?;
                    Outcome::Predicted(index.classify(&normalized, k, voting)?)
                }
            },
        };
        out.push(DevicePrediction {
            device: timeline.name.clone(),
            end_day,
            outcome,
        });
    }
    Ok(out)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
