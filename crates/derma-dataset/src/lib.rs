//! Dataset handling for the DermaMNIST baseline.
//!
//! This crate provides:
//! - Download, caching and parsing of the `dermamnist.npz` archive
//! - A composable, seedable image transform pipeline
//! - Burn `Dataset` and `Batcher` implementations
//! - A seeded epoch loader that reshuffles batch order every epoch

pub mod dataset;
pub mod dermamnist;
pub mod loader;
pub mod npy;
pub mod transform;

pub use dataset::{DermaBatch, DermaBatcher, DermaDataset, DermaItem};
pub use dermamnist::DermaMnist;
pub use loader::EpochLoader;
pub use transform::{Compose, Pad, PaddingMode, RandomCrop, RandomHorizontalFlip, RandomVerticalFlip, Transform};
