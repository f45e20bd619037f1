//! # failsight-core
//!
//! **Predict switch failures from trailing telemetry windows.**
//!
//! `failsight-core` turns sparse daily telemetry (temperature, CPU load, ping
//! latency) into fixed-length, labeled feature windows, and classifies unseen
//! windows with a brute-force k-nearest-neighbor vote.
//!
//! ## Quick Start
//!
//! ```no_run
//! use std::path::{Path, PathBuf};
//! use failsight_core::{
//!     NeighborIndex, PipelineConfig, SampleRange, SweepParams, Voting, build_dataset,
//!     read_feature_table, sweep,
//! };
//!
//! let config = PipelineConfig::default();
//! build_dataset(&[PathBuf::from("telemetry/")], Path::new("out"), &config).unwrap();
//!
//! let index = NeighborIndex::new(read_feature_table(Path::new("out/training.csv")).unwrap());
//! let validation = read_feature_table(Path::new("out/validation.csv")).unwrap();
//! let params = SweepParams {
//!     range: SampleRange { start: 1, end: validation.len() },
//!     k_range: 25,
//!     voting: Voting::default(),
//!     threads: 4,
//! };
//! let result = sweep(&index, &validation, &params).unwrap();
//! println!("{:?}", result.best());
//! ```
//!
//! ## Architecture
//!
//! Timeline → Scanner → Assembler (features, limits) → Partition → Tables
//!
//! Tables → Neighbor index + Voting → Sweep → k report
//!
//! The scanner walks each device's event log backward from "down" events and
//! from the observation horizon, emitting one candidate window per stride.
//! The window right before a failure is labeled failing. Features are
//! min-max normalized with limits gathered over every assembled sample.

pub mod assembler;
pub mod config;
pub mod dataset;
pub mod error;
pub mod evaluation;
pub mod features;
pub mod knn;
pub mod normalize;
pub mod partition;
pub mod scanner;
pub mod table;
pub mod timeline;

pub use assembler::{AssemblyStats, Sample, SampleAssembler, SamplePools};
pub use config::{PeriodFloor, PipelineConfig, SplitPolicy};
pub use dataset::{DevicePrediction, Outcome, build_dataset, collect_inputs, predict_devices};
pub use error::{Error, Result};
pub use evaluation::{
    BestK, Confusion, ConfusionSweep, KMetrics, SampleRange, SweepParams, append_report,
    default_threads, read_report, sweep,
};
pub use features::{FEATURE_COUNT, FeatureKey, FeatureVector, Metric, Stat};
pub use knn::{LabeledVector, Neighbor, NeighborIndex, Tally, Voting};
pub use normalize::{FeatureLimit, RunningLimits};
pub use partition::Partition;
pub use scanner::{Candidate, Label, WindowScanner};
pub use table::{DatasetManifest, FeatureTableWriter, SplitSizes, read_feature_table};
pub use timeline::{DeviceTimeline, ParsedBatch, load_document, parse_document};

/// Library version (from Cargo.toml).
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
