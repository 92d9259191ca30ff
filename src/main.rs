use std::collections::BTreeMap;
use std::fs::File;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow};
use clap::{Parser, Subcommand};
use clip_dataset::config::DatasetConfig;
use clip_dataset::dataset::{ClipDataset, ClipSample};
use clip_dataset::manifest::Manifest;
use clip_dataset::observability::{MetricsCollector, log_snapshot};
use clip_dataset::sampling::{Mode, select_sampling_params};
use clip_dataset::validation::validate_config;
use serde::Serialize;
use serde_json::{json, to_writer_pretty};
use tracing::{error, info, warn};
use tracing_subscriber::{EnvFilter, prelude::*};

fn main() -> Result<()> {
    let cli = Cli::parse();
    configure_tracing()?;

    match cli.command {
        Commands::Inspect {
            config,
            mode,
            limit,
        } => inspect(&config, mode, limit),
        Commands::Validate { config, mode } => validate(&config, mode),
        Commands::Params {
            config,
            mode,
            index,
            spatial_temporal_index,
        } => params(&config, mode, index, spatial_temporal_index),
        Commands::Fetch {
            config,
            mode,
            indices,
            seed,
            print_metrics,
            metrics_json,
        } => fetch(&config, mode, indices, seed, print_metrics, metrics_json),
    }
}

fn configure_tracing() -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .try_init()
        .map_err(|err| anyhow!(err.to_string()))?;
    Ok(())
}

fn load_config(path: &Path) -> Result<DatasetConfig> {
    DatasetConfig::load(path).with_context(|| format!("Failed to load config {}", path.display()))
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    let stdout = std::io::stdout();
    to_writer_pretty(stdout.lock(), value).context("Failed to write JSON to stdout")?;
    println!();
    Ok(())
}

fn inspect(config_path: &Path, mode: Mode, limit: usize) -> Result<()> {
    let cfg = load_config(config_path)?;
    let manifest = Manifest::load(&cfg, mode)?;

    let mut labels: BTreeMap<i64, usize> = BTreeMap::new();
    for entry in manifest.entries() {
        *labels.entry(entry.label).or_default() += 1;
    }
    print_json(&json!({
        "manifest": manifest.source(),
        "mode": mode,
        "entries": manifest.len(),
        "skip_rows": manifest.skip_rows(),
        "labels": labels,
        "head": &manifest.entries()[..limit.min(manifest.len())],
    }))
}

fn validate(config_path: &Path, mode: Mode) -> Result<()> {
    let cfg = load_config(config_path)?;
    let report = validate_config(&cfg, mode);

    for warning in &report.warnings {
        warn!(file = %config_path.display(), "{warning}");
    }

    if report.is_ok() {
        info!(file = %config_path.display(), %mode, "Config validation passed");
        Ok(())
    } else {
        for error_msg in &report.errors {
            error!(file = %config_path.display(), "{error_msg}");
        }
        Err(anyhow!(
            "Config validation failed with {} error(s)",
            report.errors.len()
        ))
    }
}

fn params(
    config_path: &Path,
    mode: Mode,
    index: usize,
    spatial_temporal_index: Option<usize>,
) -> Result<()> {
    let cfg = load_config(config_path)?;
    let stored = match spatial_temporal_index {
        Some(value) => value,
        None => {
            let manifest = Manifest::load(&cfg, mode)?;
            manifest
                .get(index)
                .map(|entry| entry.spatial_temporal_index)
                .ok_or_else(|| {
                    anyhow!("Index {index} is outside a manifest of {} entries", manifest.len())
                })?
        }
    };
    let params = select_sampling_params(mode, stored, &cfg)?;
    print_json(&json!({
        "mode": mode,
        "spatial_temporal_index": stored,
        "temporal_index": params.temporal.as_i64(),
        "spatial_index": params.spatial.as_i64(),
        "min_scale": params.min_scale,
        "max_scale": params.max_scale,
        "crop_size": params.crop_size,
    }))
}

#[derive(Serialize)]
struct SampleSummary {
    requested: usize,
    index: usize,
    label: i64,
    pathways: Vec<Vec<usize>>,
    time_index: Vec<f64>,
    boxes: Vec<usize>,
}

impl SampleSummary {
    fn new(requested: usize, sample: &ClipSample) -> Self {
        Self {
            requested,
            index: sample.index,
            label: sample.label,
            pathways: sample.frames.iter().map(|p| p.shape().to_vec()).collect(),
            time_index: sample.time_index.iter().copied().collect(),
            boxes: sample.boxes.shape().to_vec(),
        }
    }
}

fn fetch(
    config_path: &Path,
    mode: Mode,
    indices: Vec<usize>,
    seed: Option<u64>,
    print_metrics: bool,
    metrics_json: Option<PathBuf>,
) -> Result<()> {
    let mut cfg = load_config(config_path)?;
    if seed.is_some() {
        cfg.data_loader.seed = seed;
    }
    let metrics = MetricsCollector::global().clone();
    metrics.reset();
    let mut dataset = ClipDataset::new(cfg, mode)?.with_metrics(metrics.clone());
    info!(videos = dataset.len(), %mode, "Dataset ready");

    let indices = if indices.is_empty() { vec![0] } else { indices };
    let mut summaries = Vec::with_capacity(indices.len());
    for requested in indices {
        let sample = dataset
            .get(requested)
            .with_context(|| format!("Failed to fetch index {requested}"))?;
        summaries.push(SampleSummary::new(requested, &sample));
    }
    print_json(&summaries)?;

    let snapshot = metrics.snapshot();
    if print_metrics {
        log_snapshot(&snapshot);
    }
    if let Some(path) = metrics_json {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create metrics directory: {}", parent.display())
            })?;
        }
        let file = File::create(&path)
            .with_context(|| format!("Failed to create metrics file: {}", path.display()))?;
        to_writer_pretty(file, &snapshot)
            .with_context(|| format!("Failed to write metrics JSON: {}", path.display()))?;
        info!(metrics = %path.display(), "Metrics JSON written");
    }
    Ok(())
}

#[derive(Parser)]
#[command(
    name = "clip-dataset",
    version,
    about = "Inspect and sample video clip datasets"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Summarize the manifest for a split.
    Inspect {
        config: PathBuf,
        #[arg(long, default_value = "train")]
        mode: Mode,
        #[arg(long, default_value_t = 5)]
        limit: usize,
    },
    Validate {
        config: PathBuf,
        #[arg(long, default_value = "train")]
        mode: Mode,
    },
    /// Show the sampling parameters a fetch of `index` would use.
    Params {
        config: PathBuf,
        #[arg(long, default_value = "test")]
        mode: Mode,
        #[arg(long, default_value_t = 0)]
        index: usize,
        #[arg(long = "spatial-temporal-index")]
        spatial_temporal_index: Option<usize>,
    },
    /// Fetch items and print their shapes.
    Fetch {
        config: PathBuf,
        #[arg(long, default_value = "train")]
        mode: Mode,
        #[arg(long = "index")]
        indices: Vec<usize>,
        #[arg(long)]
        seed: Option<u64>,
        #[arg(long)]
        print_metrics: bool,
        #[arg(long = "metrics-json")]
        metrics_json: Option<PathBuf>,
    },
}
