//! `failsight build`: telemetry documents into feature tables and a manifest.

use std::path::{Path, PathBuf};

use failsight_core::{PeriodFloor, PipelineConfig, SplitPolicy, build_dataset};

use super::fail;

pub struct BuildCommandConfig<'a> {
    pub inputs: &'a [PathBuf],
    pub out: &'a Path,
    pub config_path: Option<&'a Path>,
    pub sample_len: Option<u32>,
    pub horizon: Option<u32>,
    pub skip: Option<&'a str>,
    pub period_floor: Option<&'a str>,
    pub split: Option<&'a str>,
    pub train_fraction: Option<f64>,
    pub seed: Option<u64>,
    pub site_dedup: bool,
    pub classes: Option<&'a str>,
}

fn split_list(s: &str) -> impl Iterator<Item = &str> {
    s.split(',').map(str::trim).filter(|s| !s.is_empty())
}

/// Config file (or defaults) with command-line overrides applied.
fn resolve_config(cfg: &BuildCommandConfig<'_>) -> PipelineConfig {
    let mut config = match cfg.config_path {
        Some(path) => PipelineConfig::load(path).unwrap_or_else(|e| fail("bad config", e)),
        None => PipelineConfig::default(),
    };

    if let Some(v) = cfg.sample_len {
        config.sample_len = v;
    }
    if let Some(v) = cfg.horizon {
        config.horizon = v;
    }
    if let Some(list) = cfg.skip {
        config.skip = split_list(list)
            .map(|s| {
                s.parse::<u32>()
                    .unwrap_or_else(|e| fail(&format!("bad --skip value '{s}'"), e))
            })
            .collect();
    }
    match cfg.period_floor {
        Some("event") => config.period_floor = PeriodFloor::Event,
        Some("cursor") => config.period_floor = PeriodFloor::Cursor,
        _ => {}
    }
    match cfg.split {
        Some("horizon") => config.split = SplitPolicy::Horizon,
        Some("balanced") => config.split = SplitPolicy::Balanced,
        _ => {}
    }
    if let Some(v) = cfg.train_fraction {
        config.train_fraction = v;
    }
    if cfg.seed.is_some() {
        config.seed = cfg.seed;
    }
    if !cfg.site_dedup {
        config.site_dedup = false;
    }
    if let Some(list) = cfg.classes {
        config.device_classes = split_list(list).map(String::from).collect();
    }

    if let Err(e) = config.validate() {
        fail("bad config", e);
    }
    config
}

pub fn run(cfg: BuildCommandConfig<'_>) {
    let config = resolve_config(&cfg);
    log::debug!("build config: {config:?}");

    let manifest =
        build_dataset(cfg.inputs, cfg.out, &config).unwrap_or_else(|e| fail("build failed", e));

    let stats = &manifest.stats;
    let split = &manifest.split;
    println!("Dataset {}", manifest.id);
    println!("  Directory:   {}", cfg.out.display());
    println!(
        "  Devices:     {} ({} rejected)",
        stats.devices, stats.rejected_devices
    );
    println!(
        "  Windows:     {} candidates, {} invalid, {} duplicate site failures",
        stats.candidates, stats.invalid_windows, stats.deduplicated
    );
    println!(
        "  Samples:     {} failing, {} healthy",
        stats.failing, stats.healthy
    );
    println!(
        "  Split:       {} ({} failing) training, {} ({} failing) validation, {} unused",
        split.training,
        split.training_failing,
        split.validation,
        split.validation_failing,
        split.unused
    );
    println!(
        "  Policy:      {} split, L={}, H={}",
        config.split, config.sample_len, config.horizon
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    fn command<'a>(inputs: &'a [PathBuf], out: &'a Path) -> BuildCommandConfig<'a> {
        BuildCommandConfig {
            inputs,
            out,
            config_path: None,
            sample_len: None,
            horizon: None,
            skip: None,
            period_floor: None,
            split: None,
            train_fraction: None,
            seed: None,
            site_dedup: true,
            classes: None,
        }
    }

    #[test]
    fn test_split_list_trims_and_drops_empty() {
        let items: Vec<&str> = split_list(" 1, 2,,3 ,").collect();
        assert_eq!(items, vec!["1", "2", "3"]);
    }

    #[test]
    fn test_no_flags_gives_defaults() {
        let out = PathBuf::from("out");
        let config = resolve_config(&command(&[], &out));
        assert_eq!(config, PipelineConfig::default());
    }

    #[test]
    fn test_skip_and_class_lists() {
        let out = PathBuf::from("out");
        let cfg = BuildCommandConfig {
            skip: Some("0, 2,5"),
            classes: Some("anon_model_j,"),
            ..command(&[], &out)
        };
        let config = resolve_config(&cfg);
        assert_eq!(config.skip.into_iter().collect::<Vec<_>>(), vec![0, 2, 5]);
        assert_eq!(config.device_classes, vec!["anon_model_j".to_string()]);
    }

    #[test]
    fn test_flags_override_config_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pipeline.json");
        std::fs::write(
            &path,
            r#"{"sample_len": 7, "horizon": 100, "split": "horizon", "seed": 1, "site_dedup": true}"#,
        )
        .unwrap();
        let out = PathBuf::from("out");

        let from_file = resolve_config(&BuildCommandConfig {
            config_path: Some(&path),
            ..command(&[], &out)
        });
        assert_eq!(from_file.sample_len, 7);
        assert_eq!(from_file.split, SplitPolicy::Horizon);

        let config = resolve_config(&BuildCommandConfig {
            config_path: Some(&path),
            sample_len: Some(10),
            period_floor: Some("event"),
            split: Some("balanced"),
            seed: Some(9),
            site_dedup: false,
            ..command(&[], &out)
        });
        assert_eq!(config.sample_len, 10);
        // Fields without a flag keep the file's value.
        assert_eq!(config.horizon, 100);
        assert_eq!(config.period_floor, PeriodFloor::Event);
        assert_eq!(config.split, SplitPolicy::Balanced);
        assert_eq!(config.seed, Some(9));
        assert!(!config.site_dedup);
    }
}
