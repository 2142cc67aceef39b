//! Epoch-wise batch index generation.

use derma_core::{Error, Result};
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

/// Splits `0..len` into batches of indices, optionally reshuffled every epoch.
///
/// The final batch of an epoch may be short. Orderings depend only on the seed
/// and the number of epochs drawn so far.
#[derive(Debug, Clone)]
pub struct EpochLoader {
    len: usize,
    batch_size: usize,
    shuffle: bool,
    rng: ChaCha8Rng,
}

impl EpochLoader {
    pub fn new(len: usize, batch_size: usize, shuffle: bool, seed: u64) -> Result<Self> {
        if batch_size == 0 {
            return Err(Error::InvalidArgument("batch_size must be > 0".to_string()));
        }
        Ok(Self {
            len,
            batch_size,
            shuffle,
            rng: ChaCha8Rng::seed_from_u64(seed),
        })
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    pub fn num_batches(&self) -> usize {
        self.len.div_ceil(self.batch_size)
    }

    /// Index batches for the next epoch
    pub fn next_epoch(&mut self) -> Vec<Vec<usize>> {
        let mut indices: Vec<usize> = (0..self.len).collect();
        if self.shuffle {
            indices.shuffle(&mut self.rng);
        }
        indices.chunks(self.batch_size).map(<[usize]>::to_vec).collect()
    }
}
