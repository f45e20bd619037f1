//! `failsight inspect`: show a dataset manifest.

use std::path::Path;

use super::{fail, load_manifest};

pub fn run(dataset: &Path, json: bool) {
    let manifest = load_manifest(dataset);

    if json {
        let text =
            serde_json::to_string_pretty(&manifest).unwrap_or_else(|e| fail("encode failed", e));
        println!("{text}");
        return;
    }

    let config = &manifest.config;
    println!("Dataset: {}", dataset.display());
    println!("  ID:            {}", manifest.id);
    println!("  Created:       {} (unix)", manifest.created_unix_secs);
    println!("  Version:       {} (failsight {})", manifest.version, manifest.failsight_version);
    println!("  Window:        {} days, horizon {}", config.sample_len, config.horizon);
    println!("  Floor:         {:?}", config.period_floor);
    println!("  Split:         {} (train fraction {})", config.split, config.train_fraction);
    if let Some(seed) = config.seed {
        println!("  Seed:          {seed}");
    }
    if !config.skip.is_empty() {
        let skip: Vec<String> = config.skip.iter().map(u32::to_string).collect();
        println!("  Skip:          {}", skip.join(","));
    }
    println!("  Site dedup:    {}", config.site_dedup);
    println!("  Classes:       {}", manifest.device_classes.join(", "));
    println!(
        "  Samples:       {} failing, {} healthy from {} devices",
        manifest.stats.failing, manifest.stats.healthy, manifest.stats.devices
    );
    println!(
        "  Training:      {} ({} failing)",
        manifest.split.training, manifest.split.training_failing
    );
    println!(
        "  Validation:    {} ({} failing)",
        manifest.split.validation, manifest.split.validation_failing
    );

    println!("\n  {:<24} {:>14} {:>14}", "Feature", "Min", "Max");
    println!("  {}", "-".repeat(54));
    for limit in &manifest.limits {
        println!("  {:<24} {:>14.4} {:>14.4}", limit.feature, limit.min, limit.max);
    }
}
