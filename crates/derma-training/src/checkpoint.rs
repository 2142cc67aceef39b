//! Best-model persistence.
//!
//! A single checkpoint lives in the output directory and is overwritten
//! wholesale whenever validation accuracy strictly improves.

use std::fs;
use std::path::{Path, PathBuf};

use burn::{
    module::Module,
    record::CompactRecorder,
    tensor::backend::Backend,
};
use derma_core::{Error, Result, BEST_MODEL_STEM};
use tracing::{debug, info};

use crate::model::DermaCnn;

/// Extension `CompactRecorder` appends to the stem
const RECORD_EXTENSION: &str = "mpk";

#[derive(Debug, Clone)]
pub struct CheckpointStore {
    dir: PathBuf,
    recorder: CompactRecorder,
}

impl CheckpointStore {
    pub fn new<P: AsRef<Path>>(output_dir: P) -> Self {
        Self {
            dir: output_dir.as_ref().to_path_buf(),
            recorder: CompactRecorder::new(),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path passed to the recorder; it adds its own extension
    fn stem_path(&self) -> PathBuf {
        self.dir.join(BEST_MODEL_STEM)
    }

    /// Location of the checkpoint file on disk
    pub fn best_path(&self) -> PathBuf {
        self.stem_path().with_extension(RECORD_EXTENSION)
    }

    pub fn exists(&self) -> bool {
        self.best_path().is_file()
    }

    /// Overwrite the checkpoint with `model`'s parameters
    pub fn save_best<B: Backend>(&self, model: &DermaCnn<B>) -> Result<PathBuf> {
        fs::create_dir_all(&self.dir)?;
        model
            .clone()
            .save_file(self.stem_path(), &self.recorder)
            .map_err(|e| Error::Checkpoint(format!("Failed to save {:?}: {e}", self.best_path())))?;

        let path = self.best_path();
        debug!("Saved checkpoint to {:?}", path);
        Ok(path)
    }

    /// Load the checkpoint into `model`
    pub fn load_best<B: Backend>(&self, model: DermaCnn<B>, device: &B::Device) -> Result<DermaCnn<B>> {
        let path = self.best_path();
        if !path.is_file() {
            return Err(Error::CheckpointNotFound(path));
        }

        let model = model
            .load_file(self.stem_path(), &self.recorder, device)
            .map_err(|e| Error::Checkpoint(format!("Failed to load {path:?}: {e}")))?;

        info!("Loaded checkpoint from {:?}", path);
        Ok(model)
    }
}
