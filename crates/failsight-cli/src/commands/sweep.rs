//! `failsight sweep`: confusion counts for every k over a validation range.

use std::path::Path;
use std::time::Instant;

use failsight_core::{
    NeighborIndex, SampleRange, SweepParams, Voting, append_report, default_threads, sweep,
};

use super::{fail, fmt_opt, load_training, load_validation};

pub struct SweepCommandConfig<'a> {
    pub dataset: &'a Path,
    pub start: usize,
    pub end: Option<usize>,
    pub k_range: usize,
    pub voting: Voting,
    pub threads: Option<usize>,
    pub report: &'a Path,
}

pub fn run(cfg: SweepCommandConfig<'_>) {
    let index = NeighborIndex::new(load_training(cfg.dataset));
    let validation = load_validation(cfg.dataset);
    let params = SweepParams {
        range: SampleRange {
            start: cfg.start,
            end: cfg.end.unwrap_or(validation.len()),
        },
        k_range: cfg.k_range,
        voting: cfg.voting,
        threads: cfg.threads.unwrap_or_else(default_threads),
    };

    println!(
        "Sweeping samples {} of {} against {} training vectors, k=1..{} ({})",
        params.range,
        validation.len(),
        index.len(),
        params.k_range,
        params.voting
    );
    let started = Instant::now();
    let result = sweep(&index, &validation, &params).unwrap_or_else(|e| fail("sweep failed", e));
    let elapsed = started.elapsed();

    append_report(cfg.report, &result).unwrap_or_else(|e| fail("failed to write report", e));

    let best = result.best();
    println!("Done in {:.2}s, appended to {}", elapsed.as_secs_f64(), cfg.report.display());
    for (name, entry) in [
        ("accuracy", best.accuracy),
        ("precision", best.precision),
        ("recall", best.recall),
        ("F1", best.f1),
    ] {
        match entry {
            Some((k, v)) => println!("  Best k for {name:<9} {k:>4}  ({})", fmt_opt(Some(v))),
            None => println!("  Best k for {name:<9}  n/a"),
        }
    }
}
