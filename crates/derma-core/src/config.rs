//! Configuration structures for the DermaMNIST baseline.
//!
//! Every default reproduces the reference DermaMNIST run, so an empty config file
//! (or none at all) trains the reference model.

use crate::error::{Error, Result};
use crate::types::{DeviceType, NUM_CLASSES};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// File stem of the best checkpoint; the recorder appends its own extension
pub const BEST_MODEL_STEM: &str = "best_model";

/// Top-level experiment configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExperimentConfig {
    /// Training hyperparameters
    pub training: TrainingParams,
    /// Data configuration
    pub data: DataConfig,
    /// Model configuration
    pub model: ModelConfig,
    /// Device configuration
    pub device: DeviceConfig,
    /// Directory for the checkpoint, metrics log and history
    pub output_dir: PathBuf,
}

impl Default for ExperimentConfig {
    fn default() -> Self {
        Self {
            training: TrainingParams::default(),
            data: DataConfig::default(),
            model: ModelConfig::default(),
            device: DeviceConfig::default(),
            output_dir: PathBuf::from("output/dermamnist"),
        }
    }
}

impl ExperimentConfig {
    /// Path of the best checkpoint (without the recorder extension)
    pub fn best_model_path(&self) -> PathBuf {
        self.output_dir.join(BEST_MODEL_STEM)
    }

    /// Validates every section
    pub fn validate(&self) -> Result<()> {
        self.training.validate()?;
        self.model.validate()
    }
}

/// Training hyperparameters
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainingParams {
    /// Mini-batch size
    pub batch_size: usize,
    /// Maximum number of epochs
    pub num_epochs: usize,
    /// Consecutive non-improving evaluations tolerated before stopping
    pub max_patience: usize,
    /// Adam learning rate
    pub learning_rate: f64,
    /// Log the training loss every this many iterations
    pub loss_log_interval: usize,
    /// Seed for weight init, shuffling and augmentation
    pub seed: u64,
}

impl Default for TrainingParams {
    fn default() -> Self {
        Self {
            batch_size: 8,
            num_epochs: 100,
            max_patience: 30,
            learning_rate: 0.005,
            loss_log_interval: 50,
            seed: 42,
        }
    }
}

impl TrainingParams {
    /// Rejects values the training loop cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.batch_size == 0 {
            return Err(Error::Config("batch_size must be positive".to_string()));
        }
        if self.num_epochs == 0 {
            return Err(Error::Config("num_epochs must be positive".to_string()));
        }
        if self.max_patience == 0 {
            return Err(Error::Config("max_patience must be positive".to_string()));
        }
        if self.loss_log_interval == 0 {
            return Err(Error::Config(
                "loss_log_interval must be positive".to_string(),
            ));
        }
        if !(self.learning_rate > 0.0) {
            return Err(Error::Config(format!(
                "learning_rate must be positive, got {}",
                self.learning_rate
            )));
        }
        Ok(())
    }
}

/// Data configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DataConfig {
    /// Directory holding (or receiving) `dermamnist.npz`
    pub root: PathBuf,
    /// Fetch the archive when it is not cached yet
    pub download: bool,
    /// Apply random crop/flip augmentation to the training split
    pub augmentation: bool,
}

impl Default for DataConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("data/dermamnist"),
            download: true,
            augmentation: true,
        }
    }
}

/// Model configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    /// Number of output classes
    pub num_classes: usize,
    /// Width of the first stage; later stages use 2x and 4x
    pub base_channels: usize,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            num_classes: NUM_CLASSES,
            base_channels: 64,
        }
    }
}

impl ModelConfig {
    pub fn validate(&self) -> Result<()> {
        if self.num_classes == 0 || self.base_channels == 0 {
            return Err(Error::Config(format!(
                "model needs positive num_classes and base_channels, got {} and {}",
                self.num_classes, self.base_channels
            )));
        }
        Ok(())
    }
}

/// Device configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct DeviceConfig {
    /// Device type
    pub device_type: DeviceType,
    /// CUDA device ID (if applicable)
    pub cuda_device_id: Option<usize>,
}
