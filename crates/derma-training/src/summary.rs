//! Scalar metric sinks.

use std::fs;
use std::path::Path;

use derma_core::Result;
use serde::{Deserialize, Serialize};
use tensorboard_rs::summary_writer::SummaryWriter;

pub const TAG_NUM_PARAMS: &str = "num_params";
pub const TAG_TRAIN_LOSS: &str = "loss/train";
pub const TAG_VAL_LOSS: &str = "loss/val";
pub const TAG_TRAIN_ACCURACY: &str = "accuracy/train";
pub const TAG_VAL_ACCURACY: &str = "accuracy/val";

/// Sink for `(tag, value, step)` scalars
pub trait ScalarLog {
    fn add_scalar(&mut self, tag: &str, value: f64, step: usize);

    fn flush(&mut self) -> Result<()>;
}

/// Writes TensorBoard event files into a directory
pub struct TensorboardLog {
    writer: SummaryWriter,
}

impl TensorboardLog {
    pub fn new<P: AsRef<Path>>(dir: P) -> Result<Self> {
        fs::create_dir_all(dir.as_ref())?;
        Ok(Self {
            writer: SummaryWriter::new(dir.as_ref()),
        })
    }
}

impl ScalarLog for TensorboardLog {
    fn add_scalar(&mut self, tag: &str, value: f64, step: usize) {
        self.writer.add_scalar(tag, value as f32, step);
    }

    fn flush(&mut self) -> Result<()> {
        self.writer.flush();
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScalarRecord {
    pub tag: String,
    pub value: f64,
    pub step: usize,
}

/// Keeps every scalar in memory
#[derive(Debug, Clone, Default)]
pub struct MemoryLog {
    records: Vec<ScalarRecord>,
}

impl MemoryLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> &[ScalarRecord] {
        &self.records
    }

    /// `(step, value)` pairs logged under `tag`, in order
    pub fn series(&self, tag: &str) -> Vec<(usize, f64)> {
        self.records
            .iter()
            .filter(|r| r.tag == tag)
            .map(|r| (r.step, r.value))
            .collect()
    }
}

impl ScalarLog for MemoryLog {
    fn add_scalar(&mut self, tag: &str, value: f64, step: usize) {
        self.records.push(ScalarRecord {
            tag: tag.to_string(),
            value,
            step,
        });
    }

    fn flush(&mut self) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_memory_log_series() {
        let mut log = MemoryLog::new();
        log.add_scalar(TAG_TRAIN_LOSS, 1.5, 50);
        log.add_scalar(TAG_VAL_ACCURACY, 0.4, 60);
        log.add_scalar(TAG_TRAIN_LOSS, 1.2, 100);

        assert_eq!(log.records().len(), 3);
        assert_eq!(log.series(TAG_TRAIN_LOSS), vec![(50, 1.5), (100, 1.2)]);
        assert!(log.series(TAG_NUM_PARAMS).is_empty());
    }

    #[test]
    fn test_tensorboard_log_writes_event_file() {
        let dir = TempDir::new().unwrap();
        let logdir = dir.path().join("tb");

        let mut log = TensorboardLog::new(&logdir).unwrap();
        log.add_scalar(TAG_NUM_PARAMS, 1234.0, 0);
        log.add_scalar(TAG_VAL_ACCURACY, 0.5, 10);
        log.flush().unwrap();

        let entries = fs::read_dir(&logdir).unwrap().count();
        assert!(entries > 0);
    }
}
