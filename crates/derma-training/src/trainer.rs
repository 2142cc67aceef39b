//! Supervised training loop with validation-driven early stopping.
//!
//! One iteration is one optimizer step on one shuffled mini-batch. Each time
//! the iteration count reaches a multiple of the epoch length the model is
//! evaluated on both splits, and the validation accuracy decides whether the
//! checkpoint is replaced and whether training continues.

use std::fs;
use std::path::PathBuf;

use burn::{
    data::dataloader::batcher::Batcher,
    module::{AutodiffModule, Module},
    nn::loss::CrossEntropyLossConfig,
    optim::{AdamConfig, GradientsParams, Optimizer},
    tensor::{backend::AutodiffBackend, ElementConversion},
};
use derma_core::{Error, ExperimentConfig, Result};
use derma_dataset::{DermaBatch, DermaBatcher, DermaDataset, EpochLoader};
use indicatif::{ProgressBar, ProgressStyle};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::checkpoint::CheckpointStore;
use crate::early_stopping::{EarlyStopping, Verdict};
use crate::evaluator::{batch_loss, evaluate_model};
use crate::model::{DermaCnn, DermaCnnConfig};
use crate::summary::{
    ScalarLog, TAG_NUM_PARAMS, TAG_TRAIN_ACCURACY, TAG_TRAIN_LOSS, TAG_VAL_ACCURACY, TAG_VAL_LOSS,
};

/// File written into the output directory at the end of a run
pub const HISTORY_FILE: &str = "history.json";

/// Adam denominator term; burn defaults to 1e-5
pub const ADAM_EPSILON: f32 = 1e-8;

/// Adam with the reference betas and epsilon
pub fn optimizer_config() -> AdamConfig {
    AdamConfig::new().with_epsilon(ADAM_EPSILON)
}

/// Metrics from one end-of-epoch evaluation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationRecord {
    pub iteration: usize,
    pub epoch: usize,
    pub train_accuracy: f64,
    /// Cross-entropy on the first validation batch, absent for an empty split
    pub val_loss: Option<f64>,
    pub val_accuracy: f64,
    pub patience_remaining: usize,
    pub improved: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainingOutcome {
    pub iterations: usize,
    pub optimizer_steps: usize,
    pub evaluations: usize,
    pub best_accuracy: f64,
    pub stopped_early: bool,
    pub history: Vec<EvaluationRecord>,
}

pub struct Trainer<B: AutodiffBackend> {
    config: ExperimentConfig,
    device: B::Device,
    checkpoints: CheckpointStore,
    show_progress: bool,
}

impl<B: AutodiffBackend> Trainer<B> {
    pub fn new(config: ExperimentConfig, device: B::Device) -> Result<Self> {
        config.validate()?;
        let checkpoints = CheckpointStore::new(&config.output_dir);
        Ok(Self {
            config,
            device,
            checkpoints,
            show_progress: false,
        })
    }

    /// Draw a progress bar over each epoch's batches
    pub fn with_progress(mut self, show: bool) -> Self {
        self.show_progress = show;
        self
    }

    pub fn config(&self) -> &ExperimentConfig {
        &self.config
    }

    pub fn checkpoints(&self) -> &CheckpointStore {
        &self.checkpoints
    }

    pub fn history_path(&self) -> PathBuf {
        self.config.output_dir.join(HISTORY_FILE)
    }

    /// Train on `train` until the epoch budget is spent or patience runs out
    pub fn fit(&self, train: &DermaDataset, val: &DermaDataset, log: &mut dyn ScalarLog) -> Result<TrainingOutcome> {
        let params = &self.config.training;

        B::seed(params.seed);
        let mut model: DermaCnn<B> = DermaCnnConfig::from(&self.config.model).init(&self.device);

        let num_params = model.num_params();
        info!("Model has {} trainable parameters", num_params);
        log.add_scalar(TAG_NUM_PARAMS, num_params as f64, 0);

        let mut loader = EpochLoader::new(train.len(), params.batch_size, true, params.seed)?;
        let epoch_length = loader.num_batches();
        if epoch_length == 0 {
            return Err(Error::Config("training split is empty".to_string()));
        }

        let train_batcher = if self.config.data.augmentation {
            DermaBatcher::<B>::training(params.seed)
        } else {
            DermaBatcher::<B>::evaluation()
        };
        let train_eval_batcher = self.train_accuracy_batcher();
        let eval_batcher = DermaBatcher::<B::InnerBackend>::evaluation();

        let mut optimizer = optimizer_config().init();
        let loss_fn = CrossEntropyLossConfig::new().init(&self.device);
        let mut stopper = EarlyStopping::new(params.max_patience);

        info!(
            "Training on {} samples ({} batches per epoch), validating on {}",
            train.len(),
            epoch_length,
            val.len()
        );

        let mut iteration = 0usize;
        let mut optimizer_steps = 0usize;
        let mut history = Vec::new();
        let mut stopped_early = false;

        'training: for epoch in 0..params.num_epochs {
            let batches = loader.next_epoch();
            let progress = self.epoch_progress(epoch, batches.len());

            for indices in batches {
                iteration += 1;

                let batch: DermaBatch<B> = train_batcher.batch(train.gather(&indices), &self.device);
                let logits = model.forward(batch.images);
                let loss = loss_fn.forward(logits, batch.targets);

                if iteration % params.loss_log_interval == 0 {
                    let loss_value = loss.clone().into_scalar().elem::<f64>();
                    debug!("Iteration {}: loss = {:.4}", iteration, loss_value);
                    log.add_scalar(TAG_TRAIN_LOSS, loss_value, iteration);
                }

                let grads = GradientsParams::from_grads(loss.backward(), &model);
                model = optimizer.step(params.learning_rate, model, grads);
                optimizer_steps += 1;
                progress.inc(1);

                if iteration % epoch_length != 0 {
                    continue;
                }

                let valid = model.valid();
                let mut record =
                    self.evaluate(&valid, train, val, &train_eval_batcher, &eval_batcher, iteration, epoch, log)?;

                let verdict = self.observe(&mut stopper, &valid, record.val_accuracy)?;
                record.patience_remaining = stopper.patience_remaining();
                record.improved = verdict == Verdict::Improved;

                info!(
                    "Epoch {} (iteration {}): train acc {:.4} | val loss {:.4} | val acc {:.4} | patience {}/{}",
                    epoch + 1,
                    iteration,
                    record.train_accuracy,
                    record.val_loss.unwrap_or(f64::NAN),
                    record.val_accuracy,
                    record.patience_remaining,
                    params.max_patience
                );
                history.push(record);

                if verdict == Verdict::Exhausted {
                    info!("Patience exhausted at iteration {}, stopping", iteration);
                    stopped_early = true;
                    progress.finish_and_clear();
                    break 'training;
                }
            }

            progress.finish_and_clear();
        }

        log.flush()?;

        let outcome = TrainingOutcome {
            iterations: iteration,
            optimizer_steps,
            evaluations: history.len(),
            best_accuracy: stopper.best_accuracy(),
            stopped_early,
            history,
        };
        self.write_history(&outcome)?;

        info!(
            "Training finished after {} iterations, best validation accuracy {:.4}",
            outcome.iterations, outcome.best_accuracy
        );
        Ok(outcome)
    }

    /// Batcher for the training-accuracy pass; it sees the same augmentation
    /// as the optimizer does, from an independent stream
    fn train_accuracy_batcher(&self) -> DermaBatcher<B::InnerBackend> {
        if self.config.data.augmentation {
            DermaBatcher::training(self.config.training.seed.wrapping_add(1))
        } else {
            DermaBatcher::evaluation()
        }
    }

    /// Feed one validation accuracy to `stopper`, replacing the checkpoint
    /// with `model` only on a strict improvement
    fn observe(
        &self,
        stopper: &mut EarlyStopping,
        model: &DermaCnn<B::InnerBackend>,
        val_accuracy: f64,
    ) -> Result<Verdict> {
        let verdict = stopper.observe(val_accuracy);
        if verdict == Verdict::Improved {
            let path = self.checkpoints.save_best(model)?;
            info!("New best validation accuracy {:.4}, saved {:?}", stopper.best_accuracy(), path);
        }
        Ok(verdict)
    }

    /// Training accuracy, validation loss on the first batch, validation accuracy
    #[allow(clippy::too_many_arguments)]
    fn evaluate(
        &self,
        model: &DermaCnn<B::InnerBackend>,
        train: &DermaDataset,
        val: &DermaDataset,
        train_batcher: &DermaBatcher<B::InnerBackend>,
        batcher: &DermaBatcher<B::InnerBackend>,
        iteration: usize,
        epoch: usize,
        log: &mut dyn ScalarLog,
    ) -> Result<EvaluationRecord> {
        let batch_size = self.config.training.batch_size;

        let train_result = evaluate_model(model, train, train_batcher, batch_size)?;
        log.add_scalar(TAG_TRAIN_ACCURACY, train_result.accuracy, iteration);

        let first: Vec<usize> = (0..val.len().min(batch_size)).collect();
        let val_loss = if first.is_empty() {
            None
        } else {
            let batch: DermaBatch<B::InnerBackend> = batcher.batch(val.gather(&first), &self.device);
            Some(batch_loss(model, batch))
        };
        if let Some(loss) = val_loss {
            log.add_scalar(TAG_VAL_LOSS, loss, iteration);
        }

        let val_result = evaluate_model(model, val, batcher, batch_size)?;
        log.add_scalar(TAG_VAL_ACCURACY, val_result.accuracy, iteration);

        Ok(EvaluationRecord {
            iteration,
            epoch,
            train_accuracy: train_result.accuracy,
            val_loss,
            val_accuracy: val_result.accuracy,
            patience_remaining: 0,
            improved: false,
        })
    }

    fn epoch_progress(&self, epoch: usize, len: usize) -> ProgressBar {
        if !self.show_progress {
            return ProgressBar::hidden();
        }

        let pb = ProgressBar::new(len as u64);
        if let Ok(style) = ProgressStyle::default_bar()
            .template("{msg} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({eta})")
        {
            pb.set_style(style.progress_chars("#>-"));
        }
        pb.set_message(format!("Epoch {}/{}", epoch + 1, self.config.training.num_epochs));
        pb
    }

    fn write_history(&self, outcome: &TrainingOutcome) -> Result<()> {
        fs::create_dir_all(&self.config.output_dir)?;
        let json = serde_json::to_string_pretty(&outcome.history)?;
        fs::write(self.history_path(), json)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::summary::MemoryLog;
    use burn::backend::{Autodiff, NdArray};
    use derma_core::NUM_CLASSES;
    use derma_dataset::DermaItem;
    use image::{ImageBuffer, Rgb};
    use tempfile::TempDir;

    type TestBackend = Autodiff<NdArray>;

    fn dataset(n: usize, offset: usize) -> DermaDataset {
        DermaDataset::new(
            (0..n)
                .map(|i| {
                    let label = (i + offset) % NUM_CLASSES;
                    let shade = (label * 36) as u8;
                    DermaItem::new(ImageBuffer::from_pixel(28, 28, Rgb([shade, 255 - shade, 128])), label)
                })
                .collect(),
        )
    }

    fn config(dir: &TempDir, epochs: usize, patience: usize) -> ExperimentConfig {
        let mut config = ExperimentConfig::default();
        config.output_dir = dir.path().join("run");
        config.model.base_channels = 2;
        config.training.batch_size = 4;
        config.training.num_epochs = epochs;
        config.training.max_patience = patience;
        config.training.loss_log_interval = 2;
        config
    }

    fn trainer(config: ExperimentConfig) -> Trainer<TestBackend> {
        Trainer::new(config, Default::default()).unwrap()
    }

    #[test]
    fn test_steps_match_batches_per_epoch() {
        let dir = TempDir::new().unwrap();
        let trainer = trainer(config(&dir, 2, 10));
        let mut log = MemoryLog::new();

        let outcome = trainer.fit(&dataset(10, 0), &dataset(6, 3), &mut log).unwrap();

        // 10 samples in batches of 4 is 3 steps per epoch
        assert_eq!(outcome.optimizer_steps, 6);
        assert_eq!(outcome.iterations, 6);
        assert_eq!(outcome.evaluations, 2);
        assert!(!outcome.stopped_early);

        let steps: Vec<usize> = log.series(TAG_VAL_ACCURACY).iter().map(|(s, _)| *s).collect();
        assert_eq!(steps, vec![3, 6]);
        assert_eq!(log.series(TAG_TRAIN_ACCURACY).len(), 2);
        assert_eq!(log.series(TAG_VAL_LOSS).len(), 2);
        assert_eq!(log.series(TAG_TRAIN_LOSS).iter().map(|(s, _)| *s).collect::<Vec<_>>(), vec![2, 4, 6]);
        assert_eq!(log.series(TAG_NUM_PARAMS)[0].0, 0);
    }

    #[test]
    fn test_single_epoch_single_patience_validates_once() {
        let dir = TempDir::new().unwrap();
        let trainer = trainer(config(&dir, 1, 1));
        let mut log = MemoryLog::new();

        let outcome = trainer.fit(&dataset(8, 0), &dataset(5, 1), &mut log).unwrap();

        assert_eq!(outcome.evaluations, 1);
        assert_eq!(outcome.history[0].iteration, 2);
        assert_eq!(outcome.iterations, 2);
        assert!(trainer.history_path().is_file());
    }

    #[test]
    fn test_checkpoint_written_only_on_improvement() {
        let dir = TempDir::new().unwrap();
        let trainer = trainer(config(&dir, 3, 5));
        let mut log = MemoryLog::new();

        let outcome = trainer.fit(&dataset(8, 0), &dataset(7, 0), &mut log).unwrap();

        // Improvements are exactly the strict running maxima above zero
        let mut best = 0.0;
        for record in &outcome.history {
            assert_eq!(record.improved, record.val_accuracy > best);
            if record.improved {
                best = record.val_accuracy;
            }
        }
        assert_eq!(outcome.best_accuracy, best);

        let any_improved = outcome.history.iter().any(|r| r.improved);
        assert_eq!(trainer.checkpoints().exists(), any_improved);
    }

    fn max_logit_gap(a: &DermaCnn<NdArray>, b: &DermaCnn<NdArray>) -> f32 {
        let device = Default::default();
        let input = burn::tensor::Tensor::<NdArray, 4>::ones([2, 3, 32, 32], &device);
        let left: Vec<f32> = a.forward(input.clone()).into_data().iter::<f32>().collect();
        let right: Vec<f32> = b.forward(input).into_data().iter::<f32>().collect();
        left.iter().zip(right.iter()).map(|(l, r)| (l - r).abs()).fold(0.0, f32::max)
    }

    #[test]
    fn test_checkpoint_keeps_best_model_after_worse_evaluation() {
        let dir = TempDir::new().unwrap();
        let trainer = trainer(config(&dir, 3, 5));
        let device = Default::default();
        let mut stopper = EarlyStopping::new(5);

        let make = || DermaCnnConfig::new().with_base_channels(2).init::<NdArray>(&device);
        let (first, best, later) = (make(), make(), make());

        assert_eq!(trainer.observe(&mut stopper, &first, 0.5).unwrap(), Verdict::Improved);
        assert_eq!(trainer.observe(&mut stopper, &best, 0.8).unwrap(), Verdict::Improved);
        assert!(matches!(
            trainer.observe(&mut stopper, &later, 0.6).unwrap(),
            Verdict::NotImproved { .. }
        ));
        assert!(matches!(
            trainer.observe(&mut stopper, &later, 0.8).unwrap(),
            Verdict::NotImproved { .. }
        ));

        let restored = crate::tester::load_best_model::<NdArray>(trainer.config(), &device).unwrap();
        // CompactRecorder stores half precision
        let gap_best = max_logit_gap(&restored, &best);
        assert!(gap_best < 1e-2, "restored model differs from best by {gap_best}");
        assert!(max_logit_gap(&restored, &later) > gap_best);
    }

    #[test]
    fn test_reloaded_checkpoint_scores_best_accuracy() {
        let dir = TempDir::new().unwrap();
        let mut config = config(&dir, 4, 10);
        config.data.augmentation = false;
        let trainer = trainer(config);
        let mut log = MemoryLog::new();
        let val = dataset(14, 0);

        let outcome = trainer.fit(&dataset(8, 0), &val, &mut log).unwrap();
        assert_eq!(outcome.evaluations, 4);
        if !trainer.checkpoints().exists() {
            assert_eq!(outcome.best_accuracy, 0.0);
            return;
        }

        let reloaded = crate::tester::run_test_on::<NdArray>(trainer.config(), &val, &Default::default()).unwrap();
        // Half precision weights may flip at most a near tie
        let tolerance = 1.0 / val.len() as f64 + 1e-9;
        assert!(
            (reloaded.accuracy - outcome.best_accuracy).abs() <= tolerance,
            "checkpoint scores {} but best evaluation was {}",
            reloaded.accuracy,
            outcome.best_accuracy
        );
    }

    fn batch_values(batcher: &DermaBatcher<NdArray>, item: &DermaItem) -> Vec<f32> {
        let batch: DermaBatch<NdArray> = batcher.batch(vec![item.clone()], &Default::default());
        batch.images.into_data().iter::<f32>().collect()
    }

    #[test]
    fn test_train_accuracy_pass_uses_training_augmentation() {
        let dir = TempDir::new().unwrap();
        let gradient = DermaItem::new(ImageBuffer::from_fn(28, 28, |x, y| Rgb([(x * 9) as u8, (y * 9) as u8, 7])), 2);
        let plain = batch_values(&DermaBatcher::evaluation(), &gradient);

        let augmented = trainer(config(&dir, 1, 1)).train_accuracy_batcher();
        assert!((0..8).any(|_| batch_values(&augmented, &gradient) != plain));

        let mut no_aug = config(&dir, 1, 1);
        no_aug.data.augmentation = false;
        let unaugmented = trainer(no_aug).train_accuracy_batcher();
        assert!((0..8).all(|_| batch_values(&unaugmented, &gradient) == plain));
    }

    #[test]
    fn test_optimizer_uses_reference_epsilon() {
        let value = serde_json::to_value(optimizer_config()).unwrap();
        let epsilon = value["epsilon"].as_f64().unwrap();
        assert!((epsilon - 1e-8).abs() < 1e-12, "epsilon is {epsilon}");
    }

    #[test]
    fn test_history_file_matches_outcome() {
        let dir = TempDir::new().unwrap();
        let trainer = trainer(config(&dir, 2, 10));
        let mut log = MemoryLog::new();

        let outcome = trainer.fit(&dataset(5, 2), &dataset(3, 0), &mut log).unwrap();

        let text = fs::read_to_string(trainer.history_path()).unwrap();
        let saved: Vec<EvaluationRecord> = serde_json::from_str(&text).unwrap();
        assert_eq!(saved.len(), outcome.history.len());
        assert_eq!(saved[0].iteration, outcome.history[0].iteration);
    }

    #[test]
    fn test_empty_training_split_rejected() {
        let dir = TempDir::new().unwrap();
        let trainer = trainer(config(&dir, 1, 1));
        let mut log = MemoryLog::new();

        let result = trainer.fit(&DermaDataset::default(), &dataset(3, 0), &mut log);
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn test_invalid_config_rejected() {
        let dir = TempDir::new().unwrap();
        let mut bad = config(&dir, 1, 1);
        bad.training.learning_rate = 0.0;
        assert!(Trainer::<TestBackend>::new(bad, Default::default()).is_err());
    }
}
