//! Training and evaluation for the DermaMNIST CNN baseline.
//!
//! This crate provides:
//! - The fixed-topology CNN ([`DermaCnn`])
//! - The early-stopped training loop ([`Trainer`])
//! - Best-checkpoint persistence and held-out test evaluation
//! - Scalar metric sinks (TensorBoard, in-memory)

pub mod checkpoint;
pub mod early_stopping;
pub mod evaluator;
pub mod model;
pub mod summary;
pub mod tester;
pub mod trainer;

pub use checkpoint::CheckpointStore;
pub use early_stopping::{EarlyStopping, Verdict};
pub use evaluator::{evaluate_model, EvaluationResult};
pub use model::{DermaCnn, DermaCnnConfig};
pub use summary::{MemoryLog, ScalarLog, TensorboardLog};
pub use tester::{load_best_model, run_test, run_test_on, test_model};
pub use trainer::{EvaluationRecord, Trainer, TrainingOutcome};
