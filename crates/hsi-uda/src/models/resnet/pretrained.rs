//! # Pretrained `ResNet` Models and Configs

use crate::cache::disk::DiskCacheConfig;
use crate::cache::prefabs::{StaticPreFabConfig, StaticPreFabMap};
use crate::cache::weights::{StaticPretrainedWeightsDescriptor, StaticPretrainedWeightsMap};
use crate::models::resnet::resnet_io::pytorch_stubs::load_resnet_stub_record;
use crate::models::resnet::resnet_model::{ResNetBackbone, ResNetBackboneConfig};
use burn::module::Module;
use burn::prelude::Backend;
use std::path::PathBuf;

/// Well-known [`ResNetBackboneConfig`]s, with torchvision weights where available.
pub static PREFAB_RESNET_MAP: StaticPreFabMap<ResNetBackboneConfig> = StaticPreFabMap {
    name: "resnet",
    description: "Well-Known ResNet configs",

    items: &[
        &StaticPreFabConfig {
            name: "resnet18",
            description: "ResNet-18 [2, 2, 2, 2] BasicBlocks",
            builder: || ResNetBackboneConfig::new([2, 2, 2, 2]),
            weights: Some(&StaticPretrainedWeightsMap {
                items: &[&StaticPretrainedWeightsDescriptor {
                    name: "tv_in1k",
                    description: "ResNet-18 pretrained on ImageNet",
                    license: Some("bsd-3-clause"),
                    origin: Some("https://github.com/pytorch/vision"),
                    urls: &["https://download.pytorch.org/models/resnet18-f37072fd.pth"],
                }],
            }),
        },
        &StaticPreFabConfig {
            name: "resnet34",
            description: "ResNet-34 [3, 4, 6, 3] BasicBlocks",
            builder: || ResNetBackboneConfig::new([3, 4, 6, 3]),
            weights: Some(&StaticPretrainedWeightsMap {
                items: &[&StaticPretrainedWeightsDescriptor {
                    name: "tv_in1k",
                    description: "ResNet-34 pretrained on ImageNet",
                    license: Some("bsd-3-clause"),
                    origin: Some("https://github.com/pytorch/vision"),
                    urls: &["https://download.pytorch.org/models/resnet34-b627a593.pth"],
                }],
            }),
        },
        &StaticPreFabConfig {
            name: "resnet50",
            description: "ResNet-50 [3, 4, 6, 3] Bottleneck",
            builder: || ResNetBackboneConfig::new([3, 4, 6, 3]).with_bottleneck(true),
            weights: Some(&StaticPretrainedWeightsMap {
                items: &[&StaticPretrainedWeightsDescriptor {
                    name: "tv_in1k",
                    description: "ResNet-50 pretrained on ImageNet",
                    license: Some("bsd-3-clause"),
                    origin: Some("https://github.com/pytorch/vision"),
                    urls: &["https://download.pytorch.org/models/resnet50-0676ba61.pth"],
                }],
            }),
        },
        &StaticPreFabConfig {
            name: "resnet101",
            description: "ResNet-101 [3, 4, 23, 3] Bottleneck",
            builder: || ResNetBackboneConfig::new([3, 4, 23, 3]).with_bottleneck(true),
            weights: None,
        },
        &StaticPreFabConfig {
            name: "resnet152",
            description: "ResNet-152 [3, 8, 36, 3] Bottleneck",
            builder: || ResNetBackboneConfig::new([3, 8, 36, 3]).with_bottleneck(true),
            weights: None,
        },
    ],
};

/// Fetch the named pretrained weights of a well-known `ResNet` into the disk cache.
///
/// # Arguments
///
/// - `prefab`: the model name, e.g. ``resnet18``.
/// - `weights`: the weights name, e.g. ``tv_in1k``.
/// - `disk_cache`: the cache policy.
///
/// # Returns
///
/// The path of the cached weights file.
pub fn fetch_pretrained_weights(
    prefab: &str,
    weights: &str,
    disk_cache: &DiskCacheConfig,
) -> anyhow::Result<PathBuf> {
    PREFAB_RESNET_MAP
        .try_lookup(prefab)?
        .weights_directory()
        .try_lookup_by_name(weights)?
        .fetch_weights_to_disk_cache(disk_cache)
}

impl<B: Backend> ResNetBackbone<B> {
    /// Copy torchvision weights from a ``.pth`` file onto this model.
    ///
    /// Weight shapes must match the model, except for the stem conv,
    /// which keeps its initialization when the input channels differ.
    pub fn load_pytorch_weights(
        self,
        path: PathBuf,
    ) -> anyhow::Result<Self> {
        let device = self.devices()[0].clone();
        tracing::info!(path = %path.display(), "loading ResNet weights");
        let record = load_resnet_stub_record::<B>(path, &device)?;
        record.copy_weights(self)
    }

    /// Fetch named pretrained weights through the disk cache, and copy them onto this model.
    pub fn load_pretrained(
        self,
        prefab: &str,
        weights: &str,
        disk_cache: &DiskCacheConfig,
    ) -> anyhow::Result<Self> {
        let path = fetch_pretrained_weights(prefab, weights, disk_cache)?;
        self.load_pytorch_weights(path)
    }
}
