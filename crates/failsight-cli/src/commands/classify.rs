//! `failsight classify`: predict each device's window against a built dataset.

use std::path::{Path, PathBuf};

use failsight_core::{
    Label, NeighborIndex, Outcome, ParsedBatch, Voting, collect_inputs, load_document,
    predict_devices,
};

use super::{fail, load_manifest, load_training};

pub fn run(inputs: &[PathBuf], dataset: &Path, k: usize, voting: Voting, end_day: Option<u32>) {
    let manifest = load_manifest(dataset);
    let Some(limits) = manifest.running_limits() else {
        fail("classify", "manifest is missing feature limits");
    };
    // Parse with the build's config so class codes and window length match.
    let config = &manifest.config;
    let end_day = end_day.unwrap_or(config.horizon);
    let index = NeighborIndex::new(load_training(dataset));

    let mut batch = ParsedBatch::default();
    let files = collect_inputs(inputs).unwrap_or_else(|e| fail("bad input", e));
    for path in &files {
        let mut parsed = load_document(path, config).unwrap_or_else(|e| fail("bad input", e));
        batch.timelines.append(&mut parsed.timelines);
        batch.rejected.append(&mut parsed.rejected);
    }

    let predictions = predict_devices(
        &batch,
        &limits,
        config.sample_len,
        &index,
        k,
        voting,
        end_day,
    )
    .unwrap_or_else(|e| fail("classification failed", e));

    println!(
        "Window [{}, {}) with k={k} ({voting})",
        end_day.saturating_sub(config.sample_len),
        end_day
    );
    println!("{:<40} {:<10}", "Device", "Prediction");
    println!("{}", "-".repeat(51));

    let mut failing = 0;
    for p in &predictions {
        let shown = match &p.outcome {
            Outcome::Predicted(Label::Failing) => {
                failing += 1;
                "FAILING".to_string()
            }
            Outcome::Predicted(Label::Healthy) => "healthy".to_string(),
            Outcome::NoWindow => "no data".to_string(),
            Outcome::Invalid(reason) => format!("invalid ({reason})"),
        };
        println!("{:<40} {shown}", p.device);
    }
    println!(
        "\n{failing} of {} device(s) predicted failing; {} rejected",
        predictions.len(),
        batch.rejected.len()
    );
}
