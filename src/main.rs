//! Blight risk experiment runner.
//!
//! Usage:
//! ```bash
//! # Train and log every configuration of an experiment
//! blight-risk --config experiments/tax_and_fire.toml --data-dir data --output-dir output
//!
//! # Try a configuration without touching the registry
//! blight-risk --config experiments/tax_and_fire.toml --no-log
//!
//! # Keep fitted models and the raw train/test sets
//! blight-risk --config experiments/tax_and_fire.toml --pickle --dump
//! ```

use std::num::NonZeroUsize;
use std::thread;

use anyhow::{Context, Result};
use blight_risk::registry::{ArtifactPolicy, ExperimentRegistry, FsArtifactSink, JsonFileStore};
use blight_risk::{ExperimentConfig, ExperimentRunner, OutputLayout, ParquetFeatureStore, RunOptions};
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use tracing::{info, warn};

#[derive(Parser)]
#[command(name = "blight-risk")]
#[command(about = "Train and evaluate inspection-outcome models over temporal windows")]
#[command(version)]
struct Cli {
    /// Path to the experiment configuration (TOML)
    #[arg(short, long)]
    config: String,

    /// Worker threads for models that support them (0 or less: all cores)
    #[arg(short = 'j', long, default_value_t = -1, allow_negative_numbers = true)]
    n_jobs: i64,

    /// Do not write records or artifacts to the registry
    #[arg(long)]
    no_log: bool,

    /// Save fitted models, imputers and scalers alongside each record
    #[arg(long)]
    pickle: bool,

    /// Write train and test datasets before imputation and scaling
    #[arg(long)]
    dump: bool,

    /// Directory holding parcels_inspections.parquet and features/
    #[arg(long, default_value = "data")]
    data_dir: String,

    /// Root of registry and artifact output
    #[arg(long, default_value = "output")]
    output_dir: String,
}

fn resolve_jobs(n_jobs: i64) -> usize {
    if n_jobs > 0 {
        return n_jobs as usize;
    }
    thread::available_parallelism()
        .map(NonZeroUsize::get)
        .unwrap_or(1)
}

fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("blight_risk=info".parse()?),
        )
        .init();

    let cli = Cli::parse();

    let layout = OutputLayout::new(&cli.output_dir);
    layout
        .ensure()
        .with_context(|| format!("Failed to create output directories in {}", cli.output_dir))?;

    let config = ExperimentConfig::from_file(&cli.config)
        .with_context(|| format!("Failed to load config {}", cli.config))?;

    let log_results = !cli.no_log;
    if cli.pickle && !log_results {
        warn!("--pickle has no effect with --no-log");
    }

    let options = RunOptions {
        n_jobs: resolve_jobs(cli.n_jobs),
        log_results,
        dump_datasets: cli.dump,
    };
    info!(
        "Running {} with {} job(s), logging {}",
        config.name_or_default(),
        options.n_jobs,
        if log_results { "on" } else { "off" }
    );

    let store = ParquetFeatureStore::new(&cli.data_dir);
    let registry = ExperimentRegistry::new(
        JsonFileStore::new(layout.registry_dir()),
        FsArtifactSink::new(layout.clone()),
        ArtifactPolicy {
            predictions: true,
            snapshots: cli.pickle,
        },
    );

    let pb = ProgressBar::new(0);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] {bar:40.cyan/blue} {pos}/{len} {msg}")?
            .progress_chars("=>-"),
    );

    let mut runner = ExperimentRunner::new(config, options, &store, registry).with_progress(pb);
    let report = runner.run()?;

    println!("{}", report.summary());
    Ok(())
}
