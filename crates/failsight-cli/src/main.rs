//! CLI for failsight: build switch-failure datasets and sweep nearest-neighbor models.

mod commands;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "failsight")]
#[command(about = "failsight: predict switch failures from trailing telemetry windows")]
#[command(version = failsight_core::VERSION)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build training/validation feature tables from telemetry documents.
    /// Directories are expanded to the .json files they contain.
    Build {
        /// Telemetry documents or directories of documents
        #[arg(required = true)]
        inputs: Vec<PathBuf>,

        /// Output dataset directory
        #[arg(long, default_value = "dataset")]
        out: PathBuf,

        /// Pipeline config (JSON); flags below override its fields
        #[arg(long)]
        config: Option<PathBuf>,

        /// Window length in days
        #[arg(long)]
        sample_len: Option<u32>,

        /// Observation horizon (last day index)
        #[arg(long)]
        horizon: Option<u32>,

        /// Comma-separated distances from an event that never produce a sample
        #[arg(long)]
        skip: Option<String>,

        /// Where the scanner floor moves after each event period
        #[arg(long, value_parser = ["cursor", "event"])]
        period_floor: Option<String>,

        /// Split policy
        #[arg(long, value_parser = ["balanced", "horizon"])]
        split: Option<String>,

        /// Share of failing samples used for the balanced training set
        #[arg(long)]
        train_fraction: Option<f64>,

        /// Seed for a reproducible split
        #[arg(long)]
        seed: Option<u64>,

        /// Keep every failing sample even when a site fails twice on one day
        #[arg(long)]
        no_site_dedup: bool,

        /// Comma-separated supported device classes, in class-code order
        #[arg(long)]
        classes: Option<String>,
    },

    /// Sweep k = 1..=k-range over a range of validation samples and append
    /// TP/TN/FP/FN rows to the report.
    Sweep {
        /// Dataset directory written by `build`
        #[arg(long, default_value = "dataset")]
        dataset: PathBuf,

        /// First validation sample (1-based, inclusive)
        #[arg(long, default_value = "1")]
        start: usize,

        /// Last validation sample (inclusive; default: last row)
        #[arg(long)]
        end: Option<usize>,

        /// Largest k evaluated
        #[arg(long, default_value = "25")]
        k_range: usize,

        /// Voting rule
        #[arg(long, default_value = "majority", value_parser = ["majority", "weighted"])]
        voting: String,

        /// Healthy class weight for majority voting
        #[arg(long, default_value = "1.0")]
        weight: f64,

        /// Worker threads (default: available parallelism)
        #[arg(long)]
        threads: Option<usize>,

        /// Report file (appended)
        #[arg(long, default_value = "k_results.csv")]
        report: PathBuf,
    },

    /// Merge sweep reports and show the best k per metric
    Score {
        /// Report files to merge
        #[arg(required = true)]
        reports: Vec<PathBuf>,

        /// Show only this k
        #[arg(long)]
        k: Option<usize>,

        /// Show metrics for every k
        #[arg(long)]
        all: bool,
    },

    /// Classify the latest window of each device in fresh telemetry
    Classify {
        /// Telemetry documents or directories of documents
        #[arg(required = true)]
        inputs: Vec<PathBuf>,

        /// Dataset directory written by `build`
        #[arg(long, default_value = "dataset")]
        dataset: PathBuf,

        /// Number of neighbors
        #[arg(long, default_value = "5")]
        k: usize,

        /// Voting rule
        #[arg(long, default_value = "majority", value_parser = ["majority", "weighted"])]
        voting: String,

        /// Healthy class weight for majority voting
        #[arg(long, default_value = "1.0")]
        weight: f64,

        /// Exclusive end day of the window (default: the dataset horizon)
        #[arg(long)]
        end_day: Option<u32>,
    },

    /// Show a dataset manifest
    Inspect {
        /// Dataset directory written by `build`
        #[arg(long, default_value = "dataset")]
        dataset: PathBuf,

        /// Print the raw manifest JSON
        #[arg(long)]
        json: bool,
    },
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let cli = Cli::parse();

    match cli.command {
        Commands::Build {
            inputs,
            out,
            config,
            sample_len,
            horizon,
            skip,
            period_floor,
            split,
            train_fraction,
            seed,
            no_site_dedup,
            classes,
        } => commands::build::run(commands::build::BuildCommandConfig {
            inputs: &inputs,
            out: &out,
            config_path: config.as_deref(),
            sample_len,
            horizon,
            skip: skip.as_deref(),
            period_floor: period_floor.as_deref(),
            split: split.as_deref(),
            train_fraction,
            seed,
            site_dedup: !no_site_dedup,
            classes: classes.as_deref(),
        }),
        Commands::Sweep {
            dataset,
            start,
            end,
            k_range,
            voting,
            weight,
            threads,
            report,
        } => commands::sweep::run(commands::sweep::SweepCommandConfig {
            dataset: &dataset,
            start,
            end,
            k_range,
            voting: commands::parse_voting(&voting, weight),
            threads,
            report: &report,
        }),
        Commands::Score { reports, k, all } => commands::score::run(&reports, k, all),
        Commands::Classify {
            inputs,
            dataset,
            k,
            voting,
            weight,
            end_day,
        } => commands::classify::run(
            &inputs,
            &dataset,
            k,
            commands::parse_voting(&voting, weight),
            end_day,
        ),
        Commands::Inspect { dataset, json } => commands::inspect::run(&dataset, json),
    }
}
