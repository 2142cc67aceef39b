//! Model evaluation over a whole split.
//!
//! This module provides:
//! - Batched argmax prediction without gradients
//! - Accuracy plus a per-class precision/recall/F1 report
//! - Cross-entropy on a single batch for validation loss logging

use burn::{
    data::dataloader::batcher::Batcher,
    nn::loss::CrossEntropyLossConfig,
    tensor::{backend::Backend, ElementConversion},
};
use derma_core::{ClassificationReport, Error, LesionClass, Result};
use derma_dataset::{DermaBatch, DermaBatcher, DermaDataset};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::model::DermaCnn;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvaluationResult {
    /// `correct / total`, 0 for an empty split
    pub accuracy: f64,
    pub correct: usize,
    pub total: usize,
    pub report: ClassificationReport,
}

impl EvaluationResult {
    pub fn incorrect(&self) -> usize {
        self.total - self.correct
    }
}

/// Predicted and true labels for every item, in dataset order
pub fn predict<B: Backend>(
    model: &DermaCnn<B>,
    dataset: &DermaDataset,
    batcher: &DermaBatcher<B>,
    batch_size: usize,
) -> Result<(Vec<usize>, Vec<usize>)> {
    if batch_size == 0 {
        return Err(Error::InvalidArgument("batch_size must be > 0".to_string()));
    }

    let device = model.head.weight.device();
    let indices: Vec<usize> = (0..dataset.len()).collect();
    let mut predictions = Vec::with_capacity(dataset.len());
    let mut labels = Vec::with_capacity(dataset.len());

    for chunk in indices.chunks(batch_size) {
        let batch: DermaBatch<B> = batcher.batch(dataset.gather(chunk), &device);
        let logits = model.forward(batch.images);
        let [n, _] = logits.dims();

        let predicted = logits.argmax(1).reshape([n]);
        predictions.extend(predicted.into_data().iter::<i64>().map(|p| p as usize));
        labels.extend(batch.targets.into_data().iter::<i64>().map(|t| t as usize));
    }

    Ok((predictions, labels))
}

/// Evaluate `model` on every item of `dataset` and log the per-class report
pub fn evaluate_model<B: Backend>(
    model: &DermaCnn<B>,
    dataset: &DermaDataset,
    batcher: &DermaBatcher<B>,
    batch_size: usize,
) -> Result<EvaluationResult> {
    let (predictions, labels) = predict(model, dataset, batcher, batch_size)?;

    let report = ClassificationReport::from_predictions(&predictions, &labels, &LesionClass::names());
    let correct = predictions.iter().zip(labels.iter()).filter(|(p, t)| p == t).count();
    let total = labels.len();
    let accuracy = if total == 0 { 0.0 } else { correct as f64 / total as f64 };

    info!("Classification report:\n{}", report.render(4));

    Ok(EvaluationResult {
        accuracy,
        correct,
        total,
        report,
    })
}

/// Mean cross-entropy of `model` on one batch
pub fn batch_loss<B: Backend>(model: &DermaCnn<B>, batch: DermaBatch<B>) -> f64 {
    let logits = model.forward(batch.images);
    CrossEntropyLossConfig::new()
        .init(&logits.device())
        .forward(logits, batch.targets)
        .into_scalar()
        .elem::<f64>()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::DermaCnnConfig;
    use burn::backend::NdArray;
    use derma_dataset::DermaItem;
    use image::{ImageBuffer, Rgb};

    type TestBackend = NdArray;

    fn dataset(n: usize) -> DermaDataset {
        DermaDataset::new(
            (0..n)
                .map(|i| DermaItem::new(ImageBuffer::from_pixel(28, 28, Rgb([(i * 20) as u8, 40, 90])), i % 7))
                .collect(),
        )
    }

    fn model() -> DermaCnn<TestBackend> {
        DermaCnnConfig::new().with_base_channels(2).init(&Default::default())
    }

    #[test]
    fn test_counts_cover_every_sample() {
        let data = dataset(11);
        let result = evaluate_model(&model(), &data, &DermaBatcher::evaluation(), 4).unwrap();

        assert_eq!(result.total, 11);
        assert_eq!(result.correct + result.incorrect(), 11);
        assert!((0.0..=1.0).contains(&result.accuracy));
        assert_eq!(result.report.total_support, 11);
    }

    #[test]
    fn test_predictions_keep_dataset_order() {
        let data = dataset(9);
        let (predictions, labels) = predict(&model(), &data, &DermaBatcher::evaluation(), 2).unwrap();

        assert_eq!(predictions.len(), 9);
        assert!(predictions.iter().all(|&p| p < 7));
        assert_eq!(labels, data.labels());
    }

    #[test]
    fn test_empty_dataset_has_zero_accuracy() {
        let result = evaluate_model(&model(), &DermaDataset::default(), &DermaBatcher::evaluation(), 8).unwrap();
        assert_eq!(result.total, 0);
        assert_eq!(result.accuracy, 0.0);
    }

    #[test]
    fn test_zero_batch_size_rejected() {
        let result = evaluate_model(&model(), &dataset(2), &DermaBatcher::evaluation(), 0);
        assert!(matches!(result, Err(Error::InvalidArgument(_))));
    }

    #[test]
    fn test_batch_loss_is_finite() {
        let data = dataset(4);
        let device = Default::default();
        let batch: DermaBatch<TestBackend> = DermaBatcher::evaluation().batch(data.gather(&[0, 1, 2, 3]), &device);
        let loss = batch_loss(&model(), batch);
        assert!(loss.is_finite());
        assert!(loss > 0.0);
    }
}
