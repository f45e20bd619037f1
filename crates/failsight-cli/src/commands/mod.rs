pub mod build;
pub mod classify;
pub mod inspect;
pub mod score;
pub mod sweep;

use std::fmt::Display;
use std::path::Path;

use failsight_core::table::{MANIFEST_FILE, TRAINING_FILE, VALIDATION_FILE};
use failsight_core::{DatasetManifest, LabeledVector, Voting, read_feature_table};

/// Print an error and exit with status 1.
pub fn fail(what: &str, err: impl Display) -> ! {
    eprintln!("Error: {what}: {err}");
    std::process::exit(1);
}

/// Map a `--voting` name to a rule. Unknown names are rejected by clap.
pub fn parse_voting(name: &str, weight: f64) -> Voting {
    match name {
        "weighted" => Voting::DistanceWeighted,
        _ => Voting::Majority {
            class_weight: weight,
        },
    }
}

pub fn load_manifest(dataset: &Path) -> DatasetManifest {
    if !dataset.join(MANIFEST_FILE).exists() {
        eprintln!("Not a dataset directory: {}", dataset.display());
        eprintln!("Build one first: failsight build <telemetry> --out <dir>");
        std::process::exit(1);
    }
    DatasetManifest::read(&dataset.join(MANIFEST_FILE))
        .unwrap_or_else(|e| fail("failed to read manifest", e))
}

pub fn load_training(dataset: &Path) -> Vec<LabeledVector> {
    read_feature_table(&dataset.join(TRAINING_FILE))
        .unwrap_or_else(|e| fail("failed to read training table", e))
}

pub fn load_validation(dataset: &Path) -> Vec<LabeledVector> {
    read_feature_table(&dataset.join(VALIDATION_FILE))
        .unwrap_or_else(|e| fail("failed to read validation table", e))
}

/// Format an optional ratio, or "n/a".
pub fn fmt_opt(v: Option<f64>) -> String {
    v.map(|v| format!("{v:.4}")).unwrap_or_else(|| "n/a".to_string())
}
