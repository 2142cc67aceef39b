//! Burn dataset and batcher for DermaMNIST.

use std::marker::PhantomData;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use burn::data::dataloader::batcher::Batcher;
use burn::data::dataset::Dataset;
use burn::prelude::*;
use derma_core::{CHANNELS, IMAGE_SIZE, NUM_CLASSES};
use image::RgbImage;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

use crate::transform::{to_chw, Compose};

/// One labelled lesion image at native resolution
#[derive(Debug, Clone, PartialEq)]
pub struct DermaItem {
    pub image: RgbImage,
    pub label: usize,
}

impl DermaItem {
    pub fn new(image: RgbImage, label: usize) -> Self {
        Self { image, label }
    }
}

/// In-memory split implementing [`Dataset`]
#[derive(Debug, Clone, Default)]
pub struct DermaDataset {
    items: Vec<DermaItem>,
}

impl DermaDataset {
    pub fn new(items: Vec<DermaItem>) -> Self {
        Self { items }
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn labels(&self) -> Vec<usize> {
        self.items.iter().map(|item| item.label).collect()
    }

    /// Sample count per class index
    pub fn class_distribution(&self) -> [usize; NUM_CLASSES] {
        let mut counts = [0; NUM_CLASSES];
        for item in &self.items {
            if let Some(slot) = counts.get_mut(item.label) {
                *slot += 1;
            }
        }
        counts
    }

    /// Clone the items at `indices`, in that order
    pub fn gather(&self, indices: &[usize]) -> Vec<DermaItem> {
        indices.iter().filter_map(|&i| self.items.get(i).cloned()).collect()
    }
}

impl Dataset<DermaItem> for DermaDataset {
    fn get(&self, index: usize) -> Option<DermaItem> {
        self.items.get(index).cloned()
    }

    fn len(&self) -> usize {
        self.items.len()
    }
}

/// Images `[B, 3, H, W]` in `[0, 1]` with integer class targets `[B]`
#[derive(Clone, Debug)]
pub struct DermaBatch<B: Backend> {
    pub images: Tensor<B, 4>,
    pub targets: Tensor<B, 1, Int>,
}

/// Applies a transform pipeline and stacks items into a [`DermaBatch`].
///
/// Each call derives its RNG from the seed and a batch counter, so a run that
/// issues the same sequence of batches sees the same augmentations.
pub struct DermaBatcher<B: Backend> {
    transform: Arc<Compose>,
    seed: u64,
    counter: Arc<AtomicU64>,
    _backend: PhantomData<B>,
}

impl<B: Backend> Clone for DermaBatcher<B> {
    fn clone(&self) -> Self {
        Self {
            transform: Arc::clone(&self.transform),
            seed: self.seed,
            counter: Arc::clone(&self.counter),
            _backend: PhantomData,
        }
    }
}

impl<B: Backend> std::fmt::Debug for DermaBatcher<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DermaBatcher")
            .field("transforms", &self.transform.len())
            .field("seed", &self.seed)
            .finish()
    }
}

impl<B: Backend> DermaBatcher<B> {
    pub fn new(transform: Compose, seed: u64) -> Self {
        Self {
            transform: Arc::new(transform),
            seed,
            counter: Arc::new(AtomicU64::new(0)),
            _backend: PhantomData,
        }
    }

    /// Augmenting batcher for the training split
    pub fn training(seed: u64) -> Self {
        Self::new(Compose::training(), seed)
    }

    /// Deterministic batcher for evaluation
    pub fn evaluation() -> Self {
        Self::new(Compose::evaluation(), 0)
    }

    fn next_rng(&self) -> ChaCha8Rng {
        let n = self.counter.fetch_add(1, Ordering::Relaxed);
        ChaCha8Rng::seed_from_u64(self.seed.wrapping_add(n.wrapping_mul(0x9E37_79B9_7F4A_7C15)))
    }
}

impl<B: Backend> Batcher<B, DermaItem, DermaBatch<B>> for DermaBatcher<B> {
    fn batch(&self, items: Vec<DermaItem>, device: &B::Device) -> DermaBatch<B> {
        let batch_size = items.len();
        let mut rng = self.next_rng();

        let mut height = IMAGE_SIZE;
        let mut width = IMAGE_SIZE;
        let mut images_data = Vec::with_capacity(batch_size * CHANNELS * height * width);
        let mut targets_data = Vec::with_capacity(batch_size);

        for (i, item) in items.into_iter().enumerate() {
            let image = self.transform.apply(item.image, &mut rng);
            if i == 0 {
                width = image.width() as usize;
                height = image.height() as usize;
            }
            images_data.extend(to_chw(&image));
            targets_data.push(item.label as i64);
        }

        let images = Tensor::<B, 4>::from_floats(
            TensorData::new(images_data, [batch_size, CHANNELS, height, width]),
            device,
        );
        let targets = Tensor::<B, 1, Int>::from_data(TensorData::new(targets_data, [batch_size]), device);

        DermaBatch { images, targets }
    }
}
