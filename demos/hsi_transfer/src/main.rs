#![recursion_limit = "256"]
//! Source-to-target domain adaptation on a pair of hyperspectral scenes.
//!
//! ```text
//! $ hsi_transfer --data-folder ./data --backbone rsp_resnet18 --transfer-loss bnm
//! ```

use anyhow::{Context, anyhow, bail, ensure};
use burn::config::Config;
use burn::module::{AutodiffModule, Module};
use burn::optim::{AdamWConfig, GradientsParams, Optimizer};
use burn::prelude::Backend;
use burn::record::CompactRecorder;
use burn::tensor::ElementConversion;
use burn::tensor::backend::AutodiffBackend;
use clap::{Parser, arg};
use hsi_uda::cache::disk::DiskCacheConfig;
use hsi_uda::data::cube::BandNormalization;
use hsi_uda::data::dataset::{HsiDatasetConfig, PatchPadding};
use burn::data::dataloader::DataLoader;
use hsi_uda::data::batcher::HsiBatch;
use hsi_uda::data::loader::{LoadDataConfig, load_data};
use hsi_uda::losses::TransferLossConfig;
use hsi_uda::models::backbone::BackboneConfig;
use hsi_uda::models::transfer_net::{TransferNet, TransferNetConfig};
use std::path::PathBuf;
use std::time::Instant;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// JSON `ExperimentConfig` to start from; flags below override it.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Folder holding Source.mat, Source_map.mat, Target.mat and Target_map.mat.
    #[arg(long)]
    data_folder: Option<PathBuf>,

    /// Backbone: rsp_resnet18, resnet50, alexnet, dann, ...
    #[arg(long)]
    backbone: Option<String>,

    /// Transfer loss: bnm, mmd, mmd_linear, coral, none.
    #[arg(long)]
    transfer_loss: Option<String>,

    /// Batch size for both domains.
    #[arg(short, long)]
    batch_size: Option<usize>,

    /// Patch side; must be odd.
    #[arg(long)]
    patch_size: Option<usize>,

    /// Training iterations.
    #[arg(long)]
    iterations: Option<usize>,

    /// Learning rate.
    #[arg(long)]
    learning_rate: Option<f64>,

    /// Weight of the transfer loss.
    #[arg(long)]
    transfer_weight: Option<f64>,

    /// Cap on source samples per class.
    #[arg(long)]
    samples_per_class: Option<usize>,

    /// Per-band normalization: none, zscore, minmax.
    #[arg(long)]
    normalization: Option<String>,

    /// Load torchvision weights where the backbone has them.
    #[arg(long)]
    pretrained: Option<bool>,

    /// Worker threads for the evaluation loader.
    #[arg(long)]
    num_workers: Option<usize>,

    /// Random seed for reproducibility.
    #[arg(short, long)]
    seed: Option<u64>,

    /// Directory to save the artifacts.
    #[arg(long)]
    artifact_dir: Option<String>,
}

/// Everything needed to reproduce a run; saved as ``config.json``.
#[derive(Config, Debug)]
pub struct ExperimentConfig {
    /// Folder holding the ``.mat`` files.
    pub data_folder: PathBuf,

    #[config(default = "\"rsp_resnet18\".to_string()")]
    pub backbone: String,

    #[config(default = "\"bnm\".to_string()")]
    pub transfer_loss: String,

    #[config(default = 32)]
    pub batch_size: usize,

    #[config(default = 9)]
    pub patch_size: usize,

    #[config(default = 1000)]
    pub iterations: usize,

    #[config(default = 1e-3)]
    pub learning_rate: f64,

    #[config(default = 5e-4)]
    pub weight_decay: f32,

    #[config(default = 1.0)]
    pub transfer_weight: f64,

    #[config(default = "None")]
    pub samples_per_class: Option<usize>,

    #[config(default = "BandNormalization::ZScore")]
    pub normalization: BandNormalization,

    #[config(default = "PatchPadding::Symmetric")]
    pub padding: PatchPadding,

    #[config(default = true)]
    pub use_bottleneck: bool,

    #[config(default = 256)]
    pub bottleneck_width: usize,

    #[config(default = false)]
    pub pretrained: bool,

    #[config(default = 50)]
    pub log_interval: usize,

    #[config(default = 200)]
    pub eval_interval: usize,

    #[config(default = 0)]
    pub num_workers: usize,

    #[config(default = 0)]
    pub seed: u64,

    #[config(default = "\"/tmp/hsi_transfer\".to_string()")]
    pub artifact_dir: String,
}

fn parse_normalization(name: &str) -> anyhow::Result<BandNormalization> {
    Ok(match name.to_lowercase().as_str() {
        "none" => BandNormalization::None,
        "zscore" => BandNormalization::ZScore,
        "minmax" => BandNormalization::MinMax,
        _ => bail!("unknown normalization {name:?}; expected none, zscore or minmax"),
    })
}

impl ExperimentConfig {
    /// Start from ``--config`` (or defaults) and apply the flags.
    fn from_args(args: &Args) -> anyhow::Result<Self> {
        let mut config = match (&args.config, &args.data_folder) {
            (Some(path), _) => Self::load(path)
                .map_err(|err| anyhow!("loading {}: {err:?}", path.display()))?,
            (None, Some(folder)) => Self::new(folder.clone()),
            (None, None) => bail!("either --config or --data-folder is required"),
        };

        if let Some(v) = &args.data_folder {
            config.data_folder = v.clone();
        }
        if let Some(v) = &args.backbone {
            config.backbone = v.clone();
        }
        if let Some(v) = &args.transfer_loss {
            config.transfer_loss = v.clone();
        }
        if let Some(v) = args.batch_size {
            config.batch_size = v;
        }
        if let Some(v) = args.patch_size {
            config.patch_size = v;
        }
        if let Some(v) = args.iterations {
            config.iterations = v;
        }
        if let Some(v) = args.learning_rate {
            config.learning_rate = v;
        }
        if let Some(v) = args.transfer_weight {
            config.transfer_weight = v;
        }
        if args.samples_per_class.is_some() {
            config.samples_per_class = args.samples_per_class;
        }
        if let Some(v) = &args.normalization {
            config.normalization = parse_normalization(v)?;
        }
        if let Some(v) = args.pretrained {
            config.pretrained = v;
        }
        if let Some(v) = args.num_workers {
            config.num_workers = v;
        }
        if let Some(v) = args.seed {
            config.seed = v;
        }
        if let Some(v) = &args.artifact_dir {
            config.artifact_dir = v.clone();
        }
        Ok(config)
    }

    fn dataset_config(&self) -> HsiDatasetConfig {
        HsiDatasetConfig::new()
            .with_patch_size(self.patch_size)
            .with_padding(self.padding)
            .with_seed(self.seed)
    }

    fn domain(
        &self,
        target: bool,
        train: bool,
    ) -> LoadDataConfig {
        let mut dataset = self.dataset_config();
        if !target {
            dataset = dataset.with_samples_per_class(self.samples_per_class);
        }
        LoadDataConfig::new(self.data_folder.clone(), self.batch_size)
            .with_target(target)
            .with_train(train)
            .with_infinite_data_loader(train)
            .with_num_workers(self.num_workers)
            .with_normalization(self.normalization)
            .with_dataset(dataset)
    }
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    let config = ExperimentConfig::from_args(&args)?;

    #[cfg(feature = "wgpu")]
    return train::<burn::backend::Autodiff<burn::backend::Wgpu>>(&config);

    #[cfg(not(feature = "wgpu"))]
    train::<burn::backend::Autodiff<burn::backend::NdArray>>(&config)
}

fn ensure_artifact_dir(artifact_dir: &str) -> anyhow::Result<()> {
    let _ignored = std::fs::remove_dir_all(artifact_dir);
    std::fs::create_dir_all(artifact_dir)?;
    Ok(())
}

/// Classification accuracy over one pass of `loader`.
fn evaluate<B: Backend>(
    model: &TransferNet<B>,
    loader: &dyn DataLoader<B, HsiBatch<B>>,
) -> f64 {
    let mut correct = 0i64;
    let mut total = 0usize;
    for batch in loader.iter() {
        let [n] = batch.labels.dims();
        let predicted = model.predict(batch.patches).argmax(1).squeeze::<1>(1);
        correct += predicted
            .equal(batch.labels)
            .int()
            .sum()
            .into_scalar()
            .elem::<i64>();
        total += n;
    }
    if total == 0 {
        0.0
    } else {
        correct as f64 / total as f64
    }
}

/// Train on labeled source and unlabeled target batches, evaluating on the
/// target domain.
pub fn train<B: AutodiffBackend>(config: &ExperimentConfig) -> anyhow::Result<()> {
    let device: B::Device = Default::default();
    B::seed(config.seed);

    let artifact_dir: &str = config.artifact_dir.as_ref();
    ensure_artifact_dir(artifact_dir)?;
    config
        .save(format!("{artifact_dir}/config.json"))
        .context("saving config.json")?;

    let (source, n_class, bands) = load_data::<B>(&config.domain(false, true), &device)?;
    let (target, target_n_class, target_bands) =
        load_data::<B>(&config.domain(true, true), &device)?;
    ensure!(
        bands == target_bands,
        "source has {bands} bands but target has {target_bands}"
    );
    let (test, _, _) = load_data::<B::InnerBackend>(&config.domain(true, false), &device)?;
    if target_n_class != n_class {
        tracing::warn!(
            n_class,
            target_n_class,
            "source and target disagree on the class count"
        );
    }
    let mut source = source.into_infinite()?;
    let mut target = target.into_infinite()?;
    let test = test.into_finite()?;

    let net_config = TransferNetConfig::new(
        n_class,
        BackboneConfig::new(config.backbone.clone())
            .with_input_channels(bands)
            .with_input_resolution(Some([config.patch_size, config.patch_size]))
            .with_pretrained(config.pretrained),
        TransferLossConfig::new(config.transfer_loss.clone()),
    )
    .with_use_bottleneck(config.use_bottleneck)
    .with_bottleneck_width(config.bottleneck_width);
    net_config
        .save(format!("{artifact_dir}/model_config.json"))
        .context("saving model_config.json")?;

    let mut model: TransferNet<B> =
        net_config.init_with_weights(&device, &DiskCacheConfig::default())?;
    let mut optim = AdamWConfig::new()
        .with_weight_decay(config.weight_decay)
        .init();

    let now = Instant::now();
    let mut best_accuracy = 0.0;
    for iteration in 1..=config.iterations {
        let source_batch = source.next().context("source loader stopped")?;
        let target_batch = target.next().context("target loader stopped")?;

        let output = model.forward(
            source_batch.patches,
            target_batch.patches,
            source_batch.labels,
        );
        let clf_loss = output.clf_loss;
        let transfer_loss = output.transfer_loss;
        let loss = clf_loss.clone() + transfer_loss.clone().mul_scalar(config.transfer_weight);

        let grads = GradientsParams::from_grads(loss.backward(), &model);
        model = optim.step(config.learning_rate, model, grads);

        if iteration % config.log_interval.max(1) == 0 {
            tracing::info!(
                iteration,
                clf_loss = clf_loss.into_scalar().elem::<f64>(),
                transfer_loss = transfer_loss.into_scalar().elem::<f64>(),
                "train"
            );
        }

        if iteration % config.eval_interval.max(1) == 0 || iteration == config.iterations {
            let accuracy = evaluate(&model.valid(), test.as_ref());
            if accuracy > best_accuracy {
                best_accuracy = accuracy;
            }
            tracing::info!(iteration, accuracy, best_accuracy, "target evaluation");
        }
    }

    let elapsed = now.elapsed().as_secs();
    tracing::info!(
        best_accuracy,
        "training completed in {}m{}s",
        elapsed / 60,
        elapsed % 60
    );

    model
        .save_file(format!("{artifact_dir}/model"), &CompactRecorder::new())
        .map_err(|err| anyhow!("saving model: {err:?}"))?;

    Ok(())
}
