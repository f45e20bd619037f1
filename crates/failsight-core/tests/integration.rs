//! End-to-end: telemetry document → dataset directory → sweep → report.

use std::path::{Path, PathBuf};

use failsight_core::table::{MANIFEST_FILE, TRAINING_FILE, VALIDATION_FILE};
use failsight_core::{
    ConfusionSweep, DatasetManifest, Label, NeighborIndex, PipelineConfig, SampleRange,
    SplitPolicy, SweepParams, Voting, append_report, build_dataset, read_feature_table,
    read_report, sweep,
};
use serde_json::{Map, Value, json};

const DEVICES: usize = 20;
const LAST_DAY: u32 = 60;
const DOWN_DAY: u32 = 40;

fn is_failing_device(dev: usize) -> bool {
    dev % 4 == 0
}

fn series(dev: usize, metric: usize) -> Value {
    let mut map = Map::new();
    for d in 0..=LAST_DAY {
        let mut v = 40.0 + ((d as usize * 7 + dev * 3 + metric) % 5) as f64;
        if is_failing_device(dev) && (DOWN_DAY - 5..DOWN_DAY).contains(&d) {
            v = 80.0 + (d - (DOWN_DAY - 5)) as f64 * 5.0;
        }
        // Mix numbers and numeric strings the way exported documents do.
        let value = if d % 2 == 0 { json!(v) } else { json!(v.to_string()) };
        map.insert(d.to_string(), value);
    }
    Value::Object(map)
}

fn write_document(dir: &Path) -> PathBuf {
    let mut doc = Map::new();
    for dev in 0..DEVICES {
        let mut events = Map::new();
        if is_failing_device(dev) {
            events.insert(DOWN_DAY.to_string(), json!(["down", "power"]));
        }
        doc.insert(
            format!("dev-{dev:02}"),
            json!({
                "model": if dev % 2 == 0 { "anon_model_c" } else { "anon_model_j" },
                "site_code": format!("S{dev}"),
                "temp_avg": series(dev, 0),
                "temp_max": series(dev, 1),
                "cpu_avg": series(dev, 2),
                "cpu_max": series(dev, 3),
                "ping_latency_avg": series(dev, 4),
                "latency_max": series(dev, 5),
                "events": events,
            }),
        );
    }
    // One device from an unsupported family is rejected, not fatal.
    doc.insert(
        "dev-other".to_string(),
        json!({
            "model": "juniper_x",
            "temp_avg": {}, "temp_max": {}, "cpu_avg": {}, "cpu_max": {},
            "ping_latency_avg": {}, "ping_latency_max": {}
        }),
    );
    let path = dir.join("batch.json");
    std::fs::write(&path, serde_json::to_string(&Value::Object(doc)).unwrap()).unwrap();
    path
}

fn config() -> PipelineConfig {
    PipelineConfig {
        sample_len: 5,
        horizon: LAST_DAY,
        seed: Some(7),
        ..Default::default()
    }
}

#[test]
fn build_produces_balanced_tables_and_manifest() {
    let dir = tempfile::tempdir().unwrap();
    let doc = write_document(dir.path());
    let out = dir.path().join("dataset");

    let manifest = build_dataset(&[doc], &out, &config()).unwrap();
    assert_eq!(manifest.stats.devices, DEVICES as u64);
    assert_eq!(manifest.stats.rejected_devices, 1);
    // 5 failing devices, one failing window each.
    assert_eq!(manifest.stats.failing, 5);
    // Healthy devices: ends 60..=5. Failing devices: 35..=5 before the outage
    // plus 60..=45 after it; the rescan below day 40 adds nothing.
    assert_eq!(manifest.stats.healthy, 15 * 12 + 5 * 11);

    let training = read_feature_table(&out.join(TRAINING_FILE)).unwrap();
    let validation = read_feature_table(&out.join(VALIDATION_FILE)).unwrap();
    assert_eq!(training.len(), 8);
    assert_eq!(training.iter().filter(|v| v.label == Label::Failing).count(), 4);
    assert_eq!(validation.len(), 1 + 47);
    assert_eq!(manifest.split.training, 8);
    assert_eq!(manifest.split.validation_failing, 1);

    for row in training.iter().chain(&validation) {
        assert!(row.features.iter().all(|&v| (0.0..=1.0).contains(&v)));
        assert!(row.class_code <= 1);
        assert!(row.device.as_deref().is_some_and(|d| d.starts_with("dev-")));
    }

    let stored = DatasetManifest::read(&out.join(MANIFEST_FILE)).unwrap();
    assert_eq!(stored.id, manifest.id);
    assert!(stored.running_limits().is_some());
}

#[test]
fn seeded_builds_are_identical() {
    let dir = tempfile::tempdir().unwrap();
    let doc = write_document(dir.path());
    let a = dir.path().join("a");
    let b = dir.path().join("b");
    build_dataset(std::slice::from_ref(&doc), &a, &config()).unwrap();
    build_dataset(&[doc], &b, &config()).unwrap();
    for file in [TRAINING_FILE, VALIDATION_FILE] {
        assert_eq!(
            std::fs::read_to_string(a.join(file)).unwrap(),
            std::fs::read_to_string(b.join(file)).unwrap(),
            "{file}"
        );
    }
}

#[test]
fn horizon_split_validates_last_windows() {
    let dir = tempfile::tempdir().unwrap();
    let doc = write_document(dir.path());
    let out = dir.path().join("dataset");
    let config = PipelineConfig {
        split: SplitPolicy::Horizon,
        ..config()
    };
    let manifest = build_dataset(&[doc], &out, &config).unwrap();
    assert_eq!(manifest.split.validation, DEVICES as u64);
    assert_eq!(
        manifest.split.training + manifest.split.validation,
        manifest.stats.healthy + manifest.stats.failing
    );
}

#[test]
fn sweep_counts_and_report_roundtrip() {
    let dir = tempfile::tempdir().unwrap();
    let doc = write_document(dir.path());
    let out = dir.path().join("dataset");
    build_dataset(&[doc], &out, &config()).unwrap();

    let index = NeighborIndex::new(read_feature_table(&out.join(TRAINING_FILE)).unwrap());
    let validation = read_feature_table(&out.join(VALIDATION_FILE)).unwrap();
    let n = validation.len();
    let report = dir.path().join("k_results.csv");

    let mut expected = ConfusionSweep::new(5);
    for (range, voting) in [
        (SampleRange { start: 1, end: 30 }, Voting::Majority { class_weight: 1.5 }),
        (SampleRange { start: 31, end: n }, Voting::DistanceWeighted),
    ] {
        let params = SweepParams {
            range,
            k_range: 5,
            voting,
            threads: 3,
        };
        let result = sweep(&index, &validation, &params).unwrap();
        for k in 1..=5 {
            assert_eq!(result.confusion(k).unwrap().total(), range.len() as u64);
        }
        append_report(&report, &result).unwrap();
        expected.merge(&result).unwrap();
    }

    let merged = read_report(&report).unwrap();
    assert_eq!(merged, expected);
    assert_eq!(merged.covered(), n as u64);
    let best = merged.best();
    assert!(best.accuracy.is_some());
}
