//! Sample assembly: scanner candidates → validated, labeled feature samples.
//!
//! The assembler owns all state that spans devices: the healthy and failing
//! pools, the running feature limits and the per-site record of failure days
//! already claimed. Devices are fed in one at a time.

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};

use crate::config::PipelineConfig;
use crate::features::{FeatureVector, extract_window};
use crate::normalize::RunningLimits;
use crate::scanner::{Candidate, Label, WindowScanner};
use crate::timeline::{DeviceTimeline, ParsedBatch};

/// One labeled, feature-extracted window. Features are raw (unnormalized).
#[derive(Debug, Clone, PartialEq)]
pub struct Sample {
    pub label: Label,
    pub class_code: u8,
    pub device: Option<String>,
    pub end_day: u32,
    /// Window ends exactly at the observation horizon.
    pub at_horizon: bool,
    pub features: FeatureVector,
}

/// Counters reported at the end of a build.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssemblyStats {
    pub devices: u64,
    pub rejected_devices: u64,
    pub candidates: u64,
    pub invalid_windows: u64,
    pub deduplicated: u64,
    pub healthy: u64,
    pub failing: u64,
}

/// Output of a finished assembly.
#[derive(Debug, Clone)]
pub struct SamplePools {
    pub healthy: Vec<Sample>,
    pub failing: Vec<Sample>,
    pub limits: RunningLimits,
    pub stats: AssemblyStats,
}

/// Tracks which days each site has already produced a failing sample for.
#[derive(Debug, Default)]
pub struct SiteClaims {
    days: HashMap<String, HashSet<u32>>,
}

impl SiteClaims {
    /// Claim `day` for `site`. Returns `false` if it was already claimed.
    pub fn claim(&mut self, site: &str, day: u32) -> bool {
        self.days.entry(site.to_string()).or_default().insert(day)
    }
}

pub struct SampleAssembler<'a> {
    config: &'a PipelineConfig,
    scanner: WindowScanner<'a>,
    healthy: Vec<Sample>,
    failing: Vec<Sample>,
    limits: RunningLimits,
    claims: SiteClaims,
    stats: AssemblyStats,
}

impl<'a> SampleAssembler<'a> {
    pub fn new(config: &'a PipelineConfig) -> Self {
        Self {
            config,
            scanner: WindowScanner::from_config(config),
            healthy: Vec::new(),
            failing: Vec::new(),
            limits: RunningLimits::new(),
            claims: SiteClaims::default(),
            stats: AssemblyStats::default(),
        }
    }

    /// Add every timeline from a parsed batch and count its rejects.
    pub fn add_batch(&mut self, batch: &ParsedBatch) {
        self.stats.rejected_devices += batch.rejected.len() as u64;
        for timeline in &batch.timelines {
            self.add_timeline(timeline);
        }
    }

    /// Scan one device and assemble every valid window. Returns the number
    /// of samples added.
    pub fn add_timeline(&mut self, timeline: &DeviceTimeline) -> usize {
        self.stats.devices += 1;
        let candidates = self.scanner.scan(timeline.events());
        let mut added = 0;
        for candidate in candidates {
            self.stats.candidates += 1;
            if self.assemble(timeline, candidate) {
                added += 1;
            }
        }
        log::debug!("{}: {} samples", timeline.id, added);
        added
    }

    fn assemble(&mut self, timeline: &DeviceTimeline, candidate: Candidate) -> bool {
        let len = self.config.sample_len;
        let Some(windows) = timeline.window(candidate.end_day, len) else {
            self.stats.invalid_windows += 1;
            return false;
        };
        let features = match extract_window(&windows, len as usize) {
            Ok(f) => f,
            Err(e) => {
                log::debug!("{} day {}: {e}", timeline.id, candidate.end_day);
                self.stats.invalid_windows += 1;
                return false;
            }
        };

        if candidate.label.is_failing() && self.config.site_dedup {
            if let Some(site) = timeline.site.as_deref() {
                if !self.claims.claim(site, candidate.end_day) {
                    log::debug!(
                        "{}: site {} already failed on day {}",
                        timeline.id,
                        site,
                        candidate.end_day
                    );
                    self.stats.deduplicated += 1;
                    return false;
                }
            }
        }

        self.limits.observe(&features);
        let sample = Sample {
            label: candidate.label,
            class_code: timeline.class_code,
            device: Some(timeline.name.clone()),
            end_day: candidate.end_day,
            at_horizon: candidate.end_day == self.config.horizon,
            features,
        };
        match sample.label {
            Label::Healthy => {
                self.stats.healthy += 1;
                self.healthy.push(sample);
            }
            Label::Failing => {
                self.stats.failing += 1;
                self.failing.push(sample);
            }
        }
        true
    }

    pub fn stats(&self) -> &AssemblyStats {
        &self.stats
    }

    pub fn finish(self) -> SamplePools {
        log::info!(
            "assembled {} healthy and {} failing samples from {} devices",
            self.stats.healthy,
            self.stats.failing,
            self.stats.devices
        );
        SamplePools {
            healthy: self.healthy,
            failing: self.failing,
            limits: self.limits,
            stats: self.stats,
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
