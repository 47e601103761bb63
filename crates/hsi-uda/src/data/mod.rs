//! # Hyperspectral Data
//!
//! ``.mat`` cubes and label maps, patch datasets, samplers and loaders.
//!
//! * [`mat`] - MATLAB v5 variable reading.
//! * [`cube`] - [`cube::HyperspectralCube`] and [`cube::LabelMap`].
//! * [`dataset`] - [`dataset::HsiDataset`], a `burn` dataset of labeled patches.
//! * [`batcher`] - [`batcher::HsiBatcher`], stacking patches into tensors.
//! * [`sampler`] - index samplers, including the unbounded [`sampler::InfiniteSampler`].
//! * [`loader`] - epoch loaders, [`loader::InfiniteDataLoader`] and [`loader::load_data`].

pub mod batcher;
pub mod cube;
pub mod dataset;
pub mod loader;
pub mod mat;
pub mod sampler;
