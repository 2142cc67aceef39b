//! Held-out test evaluation of the best checkpoint.

use burn::{module::Module, tensor::backend::Backend};
use derma_core::{DataSplit, ExperimentConfig, Result};
use derma_dataset::{DermaBatcher, DermaDataset, DermaMnist};
use tracing::{debug, info};

use crate::checkpoint::CheckpointStore;
use crate::evaluator::{evaluate_model, EvaluationResult};
use crate::model::{DermaCnn, DermaCnnConfig};

/// Batch size used for test-split inference
pub const TEST_BATCH_SIZE: usize = 8;

/// Load the best checkpoint from `config.output_dir` and evaluate it on the
/// test split, downloading the archive first when the config allows it.
///
/// The checkpoint is resolved before any data is fetched, so a missing
/// checkpoint always fails with `CheckpointNotFound`.
pub fn run_test<B: Backend>(config: &ExperimentConfig, device: &B::Device) -> Result<EvaluationResult> {
    let model = load_best_model::<B>(config, device)?;
    let items = DermaMnist::new(&config.data.root).load(DataSplit::Test, config.data.download)?;
    test_model(&model, &DermaDataset::new(items))
}

/// [`run_test`] on an already loaded test split
pub fn run_test_on<B: Backend>(
    config: &ExperimentConfig,
    test: &DermaDataset,
    device: &B::Device,
) -> Result<EvaluationResult> {
    let model = load_best_model::<B>(config, device)?;
    test_model(&model, test)
}

/// Evaluate an already restored model on `test`
pub fn test_model<B: Backend>(model: &DermaCnn<B>, test: &DermaDataset) -> Result<EvaluationResult> {
    let result = evaluate_model(model, test, &DermaBatcher::evaluation(), TEST_BATCH_SIZE)?;
    info!("Test accuracy is: {:.4}", result.accuracy);
    Ok(result)
}

/// Fresh model with the best checkpoint's parameters
pub fn load_best_model<B: Backend>(config: &ExperimentConfig, device: &B::Device) -> Result<DermaCnn<B>> {
    let model = DermaCnnConfig::from(&config.model).init(device);
    let model = CheckpointStore::new(&config.output_dir).load_best(model, device)?;

    info!("Model has {} parameters", model.num_params());
    for (name, shape) in model.parameter_shapes() {
        debug!("  {name}: {shape:?}");
    }
    Ok(model)
}
