//! Training CLI Tool
//!
//! Trains the DermaMNIST CNN on the train split with early stopping on the
//! validation split. The best checkpoint, TensorBoard scalars, the evaluation
//! history and the resolved configuration are written to the output directory.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use colored::Colorize;
use derma_core::{
    backend_name, load_toml_config, select_device, setup_cli_logging, DataSplit, DeviceType, ExperimentConfig,
    TrainingBackend,
};
use derma_dataset::{DermaDataset, DermaMnist};
use derma_training::{TensorboardLog, Trainer};
use tracing::info;

#[derive(Debug, Clone, Copy, ValueEnum)]
enum DeviceArg {
    Cpu,
    Cuda,
}

/// DermaMNIST training tool
#[derive(Parser, Debug)]
#[command(
    name = "train",
    about = "Train the DermaMNIST CNN baseline",
    long_about = "Train the DermaMNIST CNN with Adam and patience-based early stopping. \
                  Every flag is optional and overrides the configuration file."
)]
struct Args {
    /// Experiment configuration file (TOML)
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Output directory for checkpoint, logs and history
    #[arg(short, long, value_name = "DIR")]
    output: Option<PathBuf>,

    /// Directory holding dermamnist.npz
    #[arg(short, long, value_name = "DIR")]
    data_root: Option<PathBuf>,

    #[arg(short, long, value_name = "N")]
    epochs: Option<usize>,

    #[arg(short, long, value_name = "SIZE")]
    batch_size: Option<usize>,

    /// Non-improving validations tolerated before stopping
    #[arg(short, long, value_name = "N")]
    patience: Option<usize>,

    #[arg(short, long, value_name = "LR")]
    lr: Option<f64>,

    #[arg(short, long, value_name = "SEED")]
    seed: Option<u64>,

    /// Width of the first convolution stage
    #[arg(long, value_name = "N")]
    base_channels: Option<usize>,

    #[arg(long, value_enum)]
    device: Option<DeviceArg>,

    /// Fail instead of downloading a missing archive
    #[arg(long)]
    no_download: bool,

    /// Train without random crops and flips
    #[arg(long)]
    no_augmentation: bool,

    /// Validate the configuration and exit
    #[arg(long)]
    dry_run: bool,

    #[arg(short, long)]
    verbose: bool,
}

fn main() -> Result<()> {
    let args = Args::parse();
    setup_cli_logging(args.verbose)?;

    println!("{}", "DermaMNIST CNN - Training".green().bold());

    let mut config = match &args.config {
        Some(path) => load_toml_config(path).context("Failed to load configuration file")?,
        None => ExperimentConfig::default(),
    };
    apply_overrides(&mut config, &args);
    config.validate().context("Invalid configuration")?;

    print_config_summary(&config);
    if args.dry_run {
        info!("Configuration validated successfully (dry run)");
        return Ok(());
    }

    std::fs::create_dir_all(&config.output_dir).context("Failed to create output directory")?;
    let config_path = config.output_dir.join("config.toml");
    std::fs::write(&config_path, toml::to_string_pretty(&config)?).context("Failed to save configuration")?;
    info!("Configuration saved to: {}", config_path.display());

    println!("{}", "Loading dataset...".cyan());
    let provider = DermaMnist::new(&config.data.root);
    let train = DermaDataset::new(
        provider
            .load(DataSplit::Train, config.data.download)
            .context("Failed to load training split")?,
    );
    let val = DermaDataset::new(
        provider
            .load(DataSplit::Validation, false)
            .context("Failed to load validation split")?,
    );
    println!("  Training samples:   {}", train.len());
    println!("  Validation samples: {}", val.len());

    let device = select_device(&config.device);
    let mut log = TensorboardLog::new(&config.output_dir).context("Failed to open metrics log")?;
    let trainer = Trainer::<TrainingBackend>::new(config, device)?.with_progress(true);

    println!("{}", "Starting training...".green().bold());
    let outcome = trainer.fit(&train, &val, &mut log).context("Training failed")?;

    println!();
    println!("{}", "Training complete".green().bold());
    println!("  Iterations:               {}", outcome.iterations);
    println!("  Evaluations:              {}", outcome.evaluations);
    println!("  Best validation accuracy: {:.4}", outcome.best_accuracy);
    if outcome.stopped_early {
        println!("  {}", "Stopped early: patience exhausted".yellow());
    }
    println!("  Checkpoint:               {}", trainer.checkpoints().best_path().display());
    println!("  History:                  {}", trainer.history_path().display());

    Ok(())
}

fn apply_overrides(config: &mut ExperimentConfig, args: &Args) {
    if let Some(ref output) = args.output {
        config.output_dir = output.clone();
    }
    if let Some(ref root) = args.data_root {
        config.data.root = root.clone();
    }
    if let Some(epochs) = args.epochs {
        config.training.num_epochs = epochs;
    }
    if let Some(batch_size) = args.batch_size {
        config.training.batch_size = batch_size;
    }
    if let Some(patience) = args.patience {
        config.training.max_patience = patience;
    }
    if let Some(lr) = args.lr {
        config.training.learning_rate = lr;
    }
    if let Some(seed) = args.seed {
        config.training.seed = seed;
    }
    if let Some(width) = args.base_channels {
        config.model.base_channels = width;
    }
    if let Some(device) = args.device {
        config.device.device_type = match device {
            DeviceArg::Cpu => DeviceType::Cpu,
            DeviceArg::Cuda => DeviceType::Cuda,
        };
    }
    if args.no_download {
        config.data.download = false;
    }
    if args.no_augmentation {
        config.data.augmentation = false;
    }
}

fn print_config_summary(config: &ExperimentConfig) {
    println!();
    println!("{}", "Configuration:".cyan().bold());
    println!("  Backend:       {}", backend_name());
    println!("  Data root:     {}", config.data.root.display());
    println!("  Output:        {}", config.output_dir.display());
    println!("  Epochs:        {}", config.training.num_epochs);
    println!("  Batch size:    {}", config.training.batch_size);
    println!("  Patience:      {}", config.training.max_patience);
    println!("  Learning rate: {}", config.training.learning_rate);
    println!("  Seed:          {}", config.training.seed);
    println!("  Base channels: {}", config.model.base_channels);
    println!("  Augmentation:  {}", config.data.augmentation);
    println!();
}
