//! # Data Loaders
//!
//! * finite loaders are `burn` [`DataLoader`]s, one epoch per
//!   [`DataLoader::iter`] call, built with [`DataLoaderBuilder`].
//! * [`InfiniteDataLoader`] - an unbounded [`Iterator`] of batches; source
//!   and target streams of different lengths can be zipped without epochs.
//! * [`load_data`] - ``.mat`` files to a loader over an [`HsiDataset`].

use crate::data::batcher::{HsiBatch, HsiBatcher};
use crate::data::cube::{BandNormalization, HyperspectralCube, LabelMap};
use crate::data::dataset::{HsiDataset, HsiDatasetConfig, HsiItem};
use crate::data::mat::load_mat_variable;
use crate::data::sampler::{
    BatchSampler, InfiniteSampler, RandomSampler, Sampler, SequentialSampler,
    WeightedRandomSampler,
};
use anyhow::{bail, ensure};
use burn::config::Config;
use burn::data::dataloader::batcher::Batcher;
use burn::data::dataloader::{DataLoader, DataLoaderBuilder};
use burn::data::dataset::Dataset;
use burn::data::dataset::transform::{PartialDataset, ShuffledDataset};
use burn::prelude::Backend;
use std::fmt::Debug;
use std::path::PathBuf;
use std::sync::Arc;

/// Unbounded loader.
pub struct InfiniteDataLoader<B: Backend, I, O> {
    dataset: Arc<dyn Dataset<I>>,
    batcher: Arc<dyn Batcher<B, I, O>>,
    sampler: InfiniteSampler,
    device: B::Device,
}

#[allow(clippy::len_without_is_empty)]
impl<B: Backend, I, O> InfiniteDataLoader<B, I, O> {
    /// Cycle `dataset` through `batch_sampler` forever.
    ///
    /// # Errors
    ///
    /// If the sampler would never yield a batch.
    pub fn new(
        dataset: Arc<dyn Dataset<I>>,
        batcher: Arc<dyn Batcher<B, I, O>>,
        batch_sampler: BatchSampler,
        device: B::Device,
    ) -> anyhow::Result<Self> {
        ensure!(
            !dataset.is_empty(),
            "an infinite loader over an empty dataset would never yield"
        );
        ensure!(
            !batch_sampler.is_empty(),
            "an infinite loader whose epochs have no batches would never yield"
        );
        Ok(Self {
            dataset,
            batcher,
            sampler: InfiniteSampler::new(batch_sampler),
            device,
        })
    }

    /// Always ``0``: the stream has no length.
    pub fn len(&self) -> usize {
        0
    }

    /// Batch size.
    pub fn batch_size(&self) -> usize {
        self.sampler.batch_sampler().batch_size()
    }
}

impl<B: Backend, I, O> Iterator for InfiniteDataLoader<B, I, O> {
    type Item = O;

    fn next(&mut self) -> Option<O> {
        let indices = self.sampler.next()?;
        let items: Vec<I> = indices
            .iter()
            .filter_map(|&i| self.dataset.get(i))
            .collect();
        Some(self.batcher.batch(items, &self.device))
    }
}

/// A finite or infinite loader, as chosen by [`DataLoaderConfig`].
pub enum Loader<B: Backend, I, O> {
    /// Epoch loader.
    Finite {
        /// The `burn` loader.
        loader: Arc<dyn DataLoader<B, O>>,

        /// Items per batch.
        batch_size: usize,
    },

    /// Unbounded loader.
    Infinite(InfiniteDataLoader<B, I, O>),
}

impl<B: Backend, I, O> Loader<B, I, O> {
    /// Batches per epoch; ``0`` for infinite loaders.
    pub fn len(&self) -> usize {
        match self {
            Self::Finite { loader, batch_size } => loader.num_items().div_ceil(*batch_size),
            Self::Infinite(loader) => loader.len(),
        }
    }

    /// Is there nothing to iterate?
    pub fn is_empty(&self) -> bool {
        match self {
            Self::Finite { loader, .. } => loader.num_items() == 0,
            Self::Infinite(_) => false,
        }
    }

    /// Unwrap an epoch loader.
    pub fn into_finite(self) -> anyhow::Result<Arc<dyn DataLoader<B, O>>> {
        match self {
            Self::Finite { loader, .. } => Ok(loader),
            Self::Infinite(_) => bail!("expected an epoch loader, got an infinite one"),
        }
    }

    /// Unwrap an infinite loader.
    pub fn into_infinite(self) -> anyhow::Result<InfiniteDataLoader<B, I, O>> {
        match self {
            Self::Infinite(loader) => Ok(loader),
            Self::Finite { .. } => bail!("expected an infinite loader, got an epoch one"),
        }
    }
}

/// Loader options.
#[derive(Config, Debug)]
pub struct DataLoaderConfig {
    /// Items per batch.
    pub batch_size: usize,

    /// Permute the indices every epoch.
    #[config(default = true)]
    pub shuffle: bool,

    /// Drop a trailing partial batch.
    #[config(default = false)]
    pub drop_last: bool,

    /// Worker threads for epoch loaders; infinite loaders build batches on
    /// the calling thread.
    #[config(default = 0)]
    pub num_workers: usize,

    /// Build an [`InfiniteDataLoader`].
    #[config(default = false)]
    pub infinite_data_loader: bool,

    /// Sampler seed.
    #[config(default = 0)]
    pub seed: u64,
}

/// An epoch loader over `dataset`.
///
/// `drop_last` keeps a seeded random subset whose size is a multiple of the
/// batch size; `shuffle` re-permutes it every epoch.
fn build_epoch_loader<B, I, O, Bt>(
    dataset: Arc<dyn Dataset<I>>,
    batcher: Bt,
    config: &DataLoaderConfig,
    device: &B::Device,
) -> Arc<dyn DataLoader<B, O>>
where
    B: Backend,
    I: Send + Sync + Clone + Debug + 'static,
    O: Send + Clone + Debug + 'static,
    Bt: Batcher<B, I, O> + 'static,
{
    let mut builder = DataLoaderBuilder::new(batcher)
        .batch_size(config.batch_size)
        .set_device(device.clone());
    if config.shuffle {
        builder = builder.shuffle(config.seed);
    }
    if config.num_workers > 0 {
        builder = builder.num_workers(config.num_workers);
    }

    if config.drop_last {
        let n = dataset.len();
        let keep = n - n % config.batch_size;
        let subset = ShuffledDataset::with_seed(dataset, config.seed);
        builder.build(PartialDataset::new(subset, 0, keep))
    } else {
        builder.build(dataset)
    }
}

/// Build a loader over `dataset`.
///
/// With `weights`, an infinite loader draws each batch by weighted sampling
/// without replacement.
pub fn get_data_loader<B, I, O, Bt>(
    dataset: Arc<dyn Dataset<I>>,
    batcher: Bt,
    config: &DataLoaderConfig,
    weights: Option<Vec<f64>>,
    device: &B::Device,
) -> anyhow::Result<Loader<B, I, O>>
where
    B: Backend,
    I: Send + Sync + Clone + Debug + 'static,
    O: Send + Clone + Debug + 'static,
    Bt: Batcher<B, I, O> + 'static,
{
    ensure!(config.batch_size > 0, "batch_size must be positive");

    if !config.infinite_data_loader {
        ensure!(weights.is_none(), "sample weights need an infinite loader");
        return Ok(Loader::Finite {
            loader: build_epoch_loader(dataset, batcher, config, device),
            batch_size: config.batch_size,
        });
    }

    if config.num_workers > 0 {
        tracing::debug!(
            num_workers = config.num_workers,
            "infinite loaders build batches on the calling thread"
        );
    }

    let sampler: Box<dyn Sampler> = match weights {
        Some(weights) => {
            ensure!(
                weights.len() == dataset.len(),
                "{} weights for {} items",
                weights.len(),
                dataset.len()
            );
            Box::new(WeightedRandomSampler::new(
                weights,
                config.batch_size,
                config.seed,
            )?)
        }
        None if config.shuffle => Box::new(RandomSampler::new(dataset.len(), config.seed)),
        None => Box::new(SequentialSampler::new(dataset.len())),
    };
    let batch_sampler = BatchSampler::new(sampler, config.batch_size, config.drop_last);

    Ok(Loader::Infinite(InfiniteDataLoader::new(
        dataset,
        Arc::new(batcher),
        batch_sampler,
        device.clone(),
    )?))
}

/// A loader of [`HsiBatch`]es.
pub type HsiDataLoader<B> = Loader<B, HsiItem, HsiBatch<B>>;

/// [`load_data`] configuration.
#[derive(Config, Debug)]
pub struct LoadDataConfig {
    /// Folder holding the ``.mat`` files.
    pub data_folder: PathBuf,

    /// Items per batch.
    pub batch_size: usize,

    /// Training loaders shuffle and drop the last partial batch.
    #[config(default = true)]
    pub train: bool,

    /// Load the target domain instead of the source domain.
    #[config(default = false)]
    pub target: bool,

    /// Requested worker count.
    #[config(default = 0)]
    pub num_workers: usize,

    /// Build an [`InfiniteDataLoader`].
    #[config(default = false)]
    pub infinite_data_loader: bool,

    /// Patch extraction and sampling.
    #[config(default = "HsiDatasetConfig::new()")]
    pub dataset: HsiDatasetConfig,

    /// Per-band normalization of the cube.
    #[config(default = "BandNormalization::None")]
    pub normalization: BandNormalization,

    /// Source cube file.
    #[config(default = "\"Source.mat\".to_string()")]
    pub src_data_file: String,

    /// Target cube file.
    #[config(default = "\"Target.mat\".to_string()")]
    pub tgt_data_file: String,

    /// Source label file.
    #[config(default = "\"Source_map.mat\".to_string()")]
    pub src_label_file: String,

    /// Target label file.
    #[config(default = "\"Target_map.mat\".to_string()")]
    pub tgt_label_file: String,

    /// Cube variable name.
    #[config(default = "\"ori_data\".to_string()")]
    pub data_key: String,

    /// Label variable name.
    #[config(default = "\"map\".to_string()")]
    pub label_key: String,
}

impl LoadDataConfig {
    /// ``(cube file, label file)`` for the selected domain.
    pub fn data_paths(&self) -> (PathBuf, PathBuf) {
        let (data, labels) = if self.target {
            (&self.tgt_data_file, &self.tgt_label_file)
        } else {
            (&self.src_data_file, &self.src_label_file)
        };
        (self.data_folder.join(data), self.data_folder.join(labels))
    }

    /// Read the selected domain into an [`HsiDataset`].
    ///
    /// With a `test_ratio`, training loads the train split and evaluation
    /// loads the held-out split.
    pub fn load_dataset(&self) -> anyhow::Result<HsiDataset> {
        let (data_path, label_path) = self.data_paths();

        let cube = HyperspectralCube::from_mat(&load_mat_variable(&data_path, &self.data_key)?)?
            .normalized(self.normalization);
        let labels = LabelMap::from_mat(&load_mat_variable(&label_path, &self.label_key)?)?;

        let dataset = self.dataset.init(Arc::new(cube), &labels)?;
        if self.dataset.test_ratio.is_none() {
            return Ok(dataset);
        }
        let (train, test) = dataset.split();
        Ok(if self.train { train } else { test })
    }

    /// Loader options for this domain.
    pub fn loader_config(&self) -> DataLoaderConfig {
        DataLoaderConfig::new(self.batch_size)
            .with_shuffle(self.train)
            .with_drop_last(self.train)
            .with_num_workers(self.num_workers)
            .with_infinite_data_loader(self.infinite_data_loader)
            .with_seed(self.dataset.seed)
    }
}

/// Load a domain's ``.mat`` files into a loader.
///
/// # Returns
///
/// ``(loader, n_class, bands)``, where `n_class` counts the non-zero labels.
pub fn load_data<B: Backend>(
    config: &LoadDataConfig,
    device: &B::Device,
) -> anyhow::Result<(HsiDataLoader<B>, usize, usize)> {
    let dataset = config.load_dataset()?;
    let n_class = dataset.num_classes();
    let bands = dataset.bands();

    tracing::info!(
        domain = if config.target { "target" } else { "source" },
        train = config.train,
        samples = dataset.len(),
        bands,
        n_class,
        "loaded hyperspectral domain"
    );

    let loader = get_data_loader(
        Arc::new(dataset),
        HsiBatcher,
        &config.loader_config(),
        None,
        device,
    )?;
    Ok((loader, n_class, bands))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{MatTestData, write_mat_v5};
    use burn::backend::NdArray;
    use std::path::Path;

    type B = NdArray<f32>;

    /// Identity batcher over indices.
    #[derive(Debug, Clone, Copy)]
    struct IndexBatcher;

    impl Batcher<B, usize, Vec<usize>> for IndexBatcher {
        fn batch(
            &self,
            items: Vec<usize>,
            _device: &<B as Backend>::Device,
        ) -> Vec<usize> {
            items
        }
    }

    fn range_loader(
        n: usize,
        config: &DataLoaderConfig,
        weights: Option<Vec<f64>>,
    ) -> anyhow::Result<Loader<B, usize, Vec<usize>>> {
        let dataset: Vec<usize> = (100..100 + n).collect();
        get_data_loader(
            Arc::new(burn::data::dataset::InMemDataset::new(dataset)),
            IndexBatcher,
            config,
            weights,
            &Default::default(),
        )
    }

    #[test]
    fn test_sequential_loader() {
        let config = DataLoaderConfig::new(2).with_shuffle(false);
        let loader = range_loader(5, &config, None).unwrap();
        assert_eq!(loader.len(), 3);
        let loader = loader.into_finite().unwrap();
        assert_eq!(loader.num_items(), 5);

        for _ in 0..2 {
            let batches: Vec<_> = loader.iter().collect();
            assert_eq!(batches, vec![vec![100, 101], vec![102, 103], vec![104]]);
        }
    }

    #[test]
    fn test_shuffled_epochs() {
        let config = DataLoaderConfig::new(4).with_drop_last(true).with_seed(5);
        let loader = range_loader(10, &config, None).unwrap();
        assert_eq!(loader.len(), 2);
        let loader = loader.into_finite().unwrap();

        let mut kept: Option<Vec<usize>> = None;
        for _ in 0..3 {
            let epoch: Vec<Vec<usize>> = loader.iter().collect();
            assert_eq!(epoch.len(), 2);
            assert!(epoch.iter().all(|b| b.len() == 4));
            let mut seen: Vec<usize> = epoch.into_iter().flatten().collect();
            seen.sort();
            seen.dedup();
            assert_eq!(seen.len(), 8);
            // The dropped remainder is fixed across epochs.
            if let Some(kept) = &kept {
                assert_eq!(&seen, kept);
            }
            kept = Some(seen);
        }
    }

    #[test]
    fn test_epoch_loader_with_workers() {
        let config = DataLoaderConfig::new(3)
            .with_shuffle(false)
            .with_num_workers(2);
        let loader = range_loader(11, &config, None)
            .unwrap()
            .into_finite()
            .unwrap();
        assert_eq!(loader.num_items(), 11);

        for _ in 0..2 {
            let batches: Vec<Vec<usize>> = loader.iter().collect();
            assert!(batches.iter().all(|b| !b.is_empty() && b.len() <= 3));
            let mut seen: Vec<usize> = batches.into_iter().flatten().collect();
            seen.sort();
            assert_eq!(seen, (100..111).collect::<Vec<_>>());
        }
    }

    #[test]
    fn test_infinite_loader() {
        let config = DataLoaderConfig::new(3).with_infinite_data_loader(true);
        let loader = range_loader(4, &config, None).unwrap();
        assert_eq!(loader.len(), 0);
        assert!(!loader.is_empty());

        let loader = loader.into_infinite().unwrap();
        assert_eq!(loader.batch_size(), 3);

        // Runs well past a single epoch.
        let batches: Vec<Vec<usize>> = loader.take(25).collect();
        assert_eq!(batches.len(), 25);
        assert!(batches.iter().flatten().all(|i| (100..104).contains(i)));
    }

    #[test]
    fn test_infinite_loader_rejects_empty() {
        let config = DataLoaderConfig::new(3).with_infinite_data_loader(true);
        assert!(range_loader(0, &config, None).is_err());

        let config = config.with_drop_last(true);
        assert!(range_loader(2, &config, None).is_err());
    }

    #[test]
    fn test_weighted_infinite_loader() {
        let config = DataLoaderConfig::new(2).with_infinite_data_loader(true);
        let weights = vec![0.0, 1.0, 1.0, 0.0];
        let loader = range_loader(4, &config, Some(weights.clone()))
            .unwrap()
            .into_infinite()
            .unwrap();
        for batch in loader.take(10) {
            let mut batch = batch;
            batch.sort();
            assert_eq!(batch, vec![101, 102]);
        }

        let finite = DataLoaderConfig::new(2);
        assert!(range_loader(4, &finite, Some(weights)).is_err());
        assert!(range_loader(3, &config, Some(vec![1.0; 4])).is_err());
    }

    fn write_domain(
        folder: &Path,
        data_file: &str,
        label_file: &str,
    ) {
        // 4x4 cube with 2 bands; labels: class 1 on the left half, 2 on the right.
        let (h, w, b) = (4usize, 4usize, 2usize);
        let mut values = vec![0.0; h * w * b];
        for k in 0..b {
            for j in 0..w {
                for i in 0..h {
                    values[i + h * (j + w * k)] = (100 * k + 10 * i + j) as f64;
                }
            }
        }
        let mut labels = vec![0u8; h * w];
        for j in 0..w {
            for i in 0..h {
                labels[i + h * j] = if j < 2 { 1 } else { 2 };
            }
        }
        write_mat_v5(
            &folder.join(data_file),
            &[("ori_data", &[h, w, b], MatTestData::Double(values))],
        );
        write_mat_v5(
            &folder.join(label_file),
            &[("map", &[h, w], MatTestData::UInt8(labels))],
        );
    }

    #[test]
    fn test_load_data() {
        let dir = tempfile::tempdir().unwrap();
        write_domain(dir.path(), "Source.mat", "Source_map.mat");
        write_domain(dir.path(), "Target.mat", "Target_map.mat");

        let device = Default::default();
        let config = LoadDataConfig::new(dir.path().to_path_buf(), 4)
            .with_dataset(HsiDatasetConfig::new().with_patch_size(3));

        let (loader, n_class, bands) = load_data::<B>(&config, &device).unwrap();
        assert_eq!(n_class, 2);
        assert_eq!(bands, 2);
        assert_eq!(loader.len(), 4);
        let loader = loader.into_finite().unwrap();

        let batch = loader.iter().next().unwrap();
        assert_eq!(batch.patches.dims(), [4, 2, 3, 3]);
        assert_eq!(batch.labels.dims(), [4]);

        let eval = config.clone().with_train(false).with_target(true);
        assert_eq!(
            eval.data_paths().0.file_name().unwrap().to_str().unwrap(),
            "Target.mat"
        );
        let (loader, _, _) = load_data::<B>(&eval, &device).unwrap();
        let loader = loader.into_finite().unwrap();
        let first = loader.iter().next().unwrap();
        // Sequential: the first item is pixel (0, 0), band 0 centre = 0.
        let centre: Vec<f32> = first
            .patches
            .slice([0..1, 0..1, 1..2, 1..2])
            .into_data()
            .convert::<f32>()
            .to_vec()
            .unwrap();
        assert_eq!(centre, vec![0.0]);
    }

    #[test]
    fn test_load_data_split() {
        let dir = tempfile::tempdir().unwrap();
        write_domain(dir.path(), "Source.mat", "Source_map.mat");

        let dataset = HsiDatasetConfig::new()
            .with_patch_size(1)
            .with_test_ratio(Some(0.25));
        let config = LoadDataConfig::new(dir.path().to_path_buf(), 2).with_dataset(dataset);

        let train = config.load_dataset().unwrap();
        let test = config.clone().with_train(false).load_dataset().unwrap();
        assert_eq!(train.class_counts(), vec![6, 6]);
        assert_eq!(test.class_counts(), vec![2, 2]);
    }

    #[test]
    fn test_load_data_missing_files() {
        let dir = tempfile::tempdir().unwrap();
        let config = LoadDataConfig::new(dir.path().to_path_buf(), 2);
        assert!(load_data::<B>(&config, &Default::default()).is_err());
    }
}
