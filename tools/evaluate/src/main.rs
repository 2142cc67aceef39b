//! Evaluation CLI Tool
//!
//! Loads the best checkpoint written by `train` and reports accuracy and
//! per-class precision/recall/F1 on the DermaMNIST test split.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use colored::Colorize;
use derma_core::{backend_name, load_toml_config, select_device, setup_cli_logging, DefaultBackend, ExperimentConfig};
use derma_training::run_test;
use tracing::info;

/// DermaMNIST evaluation tool
#[derive(Parser, Debug)]
#[command(
    name = "evaluate",
    about = "Evaluate the best DermaMNIST checkpoint on the test split"
)]
struct Args {
    /// Experiment configuration file (TOML)
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Directory holding best_model.mpk
    #[arg(short, long, value_name = "DIR")]
    output: Option<PathBuf>,

    /// Directory holding dermamnist.npz
    #[arg(short, long, value_name = "DIR")]
    data_root: Option<PathBuf>,

    /// Width of the first convolution stage; must match training
    #[arg(long, value_name = "N")]
    base_channels: Option<usize>,

    /// Fail instead of downloading a missing archive
    #[arg(long)]
    no_download: bool,

    /// Also write the full result as JSON
    #[arg(long, value_name = "FILE")]
    report: Option<PathBuf>,

    #[arg(short, long)]
    verbose: bool,
}

fn main() -> Result<()> {
    let args = Args::parse();
    setup_cli_logging(args.verbose)?;

    println!("{}", "DermaMNIST CNN - Test Evaluation".green().bold());

    let mut config = match &args.config {
        Some(path) => load_toml_config(path).context("Failed to load configuration file")?,
        None => ExperimentConfig::default(),
    };
    if let Some(ref output) = args.output {
        config.output_dir = output.clone();
    }
    if let Some(ref root) = args.data_root {
        config.data.root = root.clone();
    }
    if let Some(width) = args.base_channels {
        config.model.base_channels = width;
    }
    if args.no_download {
        config.data.download = false;
    }
    config.model.validate().context("Invalid model configuration")?;

    info!("Backend: {}", backend_name());
    let device = select_device(&config.device);

    let result = run_test::<DefaultBackend>(&config, &device).context("Test evaluation failed")?;

    println!();
    println!("{}", result.report);
    println!(
        "{} {:.4} ({}/{})",
        "Test accuracy is:".cyan().bold(),
        result.accuracy,
        result.correct,
        result.total
    );

    if let Some(path) = args.report {
        std::fs::write(&path, serde_json::to_string_pretty(&result)?)
            .with_context(|| format!("Failed to write report to {}", path.display()))?;
        info!("Report saved to: {}", path.display());
    }

    Ok(())
}
