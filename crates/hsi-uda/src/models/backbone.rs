//! # Backbone Selection
//!
//! [`BackboneKind`] parses a backbone name; [`BackboneConfig`] builds the
//! matching [`Backbone`] module.
//!
//! | name              | backbone                 |
//! |-------------------|--------------------------|
//! | ``rsp_resnet*``   | [`RspResNetBackbone`]    |
//! | ``resnet*``       | [`ResNetBackbone`]       |
//! | ``alexnet``       | [`AlexNetBackbone`]      |
//! | ``dann``          | [`DaNNBackbone`]         |

use crate::cache::disk::DiskCacheConfig;
use crate::models::alexnet::{
    ALEXNET_MIN_INPUT_RESOLUTION, AlexNetBackbone, AlexNetBackboneConfig,
};
use crate::models::dann::{DaNNBackbone, DaNNBackboneConfig};
use crate::models::resnet::pretrained::PREFAB_RESNET_MAP;
use crate::models::resnet::{ResNetBackbone, ResNetBackboneConfig, ResNetBackboneMeta};
use crate::models::rsp_resnet::{
    RSP_MIN_INPUT_RESOLUTION, RSP_PREFIX, RspResNetBackbone, RspResNetBackboneConfig,
};
use anyhow::{bail, ensure};
use burn::config::Config;
use burn::module::Module;
use burn::prelude::{Backend, Tensor};
use std::fmt;
use std::str::FromStr;

/// Name of the pretrained torchvision ImageNet weights.
pub const TV_IN1K: &str = "tv_in1k";

/// A parsed backbone name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackboneKind {
    /// Style-removal `ResNet`; holds the bare ``resnet*`` name.
    RspResNet(String),

    /// Plain `ResNet`; holds the ``resnet*`` name.
    ResNet(String),

    /// `AlexNet`.
    AlexNet,

    /// `DaNN` MLP.
    DaNN,
}

impl FromStr for BackboneKind {
    type Err = anyhow::Error;

    fn from_str(name: &str) -> Result<Self, Self::Err> {
        let lower = name.to_lowercase();
        let kind = match lower.as_str() {
            "alexnet" => Self::AlexNet,
            "dann" => Self::DaNN,
            _ => match lower.strip_prefix(RSP_PREFIX) {
                Some(resnet) if PREFAB_RESNET_MAP.lookup(resnet).is_some() => {
                    Self::RspResNet(resnet.to_string())
                }
                None if PREFAB_RESNET_MAP.lookup(&lower).is_some() => Self::ResNet(lower.clone()),
                _ => bail!(
                    "unknown backbone {name:?}; expected alexnet, dann, {:?} or their rsp_ forms",
                    PREFAB_RESNET_MAP.names()
                ),
            },
        };
        Ok(kind)
    }
}

impl BackboneKind {
    /// The smallest input side the backbone can run on.
    pub fn min_input_resolution(&self) -> usize {
        match self {
            Self::RspResNet(_) => RSP_MIN_INPUT_RESOLUTION,
            Self::AlexNet => ALEXNET_MIN_INPUT_RESOLUTION,
            Self::ResNet(_) | Self::DaNN => 1,
        }
    }
}

impl fmt::Display for BackboneKind {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        match self {
            Self::RspResNet(name) => write!(f, "{RSP_PREFIX}{name}"),
            Self::ResNet(name) => write!(f, "{name}"),
            Self::AlexNet => write!(f, "alexnet"),
            Self::DaNN => write!(f, "dann"),
        }
    }
}

/// [`Backbone`] configuration.
#[derive(Config, Debug)]
pub struct BackboneConfig {
    /// Backbone name; see [`BackboneKind`].
    pub name: String,

    /// The number of input channels (spectral bands).
    #[config(default = 3)]
    pub input_channels: usize,

    /// Input ``[height, width]``; sizes the `DaNN` input layer.
    ///
    /// When unset, `DaNN` expects ``224x224x3`` inputs.
    #[config(default = "None")]
    pub input_resolution: Option<[usize; 2]>,

    /// Load torchvision ImageNet weights where available.
    #[config(default = false)]
    pub pretrained: bool,
}

impl BackboneConfig {
    /// Parse the backbone name.
    pub fn kind(&self) -> anyhow::Result<BackboneKind> {
        self.name.parse()
    }

    /// Initialize a [`Backbone`] with fresh weights.
    ///
    /// # Errors
    ///
    /// If the name is unknown, or `input_resolution` is smaller than
    /// [`BackboneKind::min_input_resolution`].
    pub fn init<B: Backend>(
        &self,
        device: &B::Device,
    ) -> anyhow::Result<Backbone<B>> {
        let kind = self.kind()?;
        if let Some([height, width]) = self.input_resolution {
            let min = kind.min_input_resolution();
            ensure!(
                height.min(width) >= min,
                "{kind} needs inputs of at least {min}x{min}, got {height}x{width}"
            );
        }

        let backbone = match kind {
            BackboneKind::RspResNet(name) => Backbone::RspResNet(
                RspResNetBackboneConfig::from_name(&name, self.input_channels)?.init(device),
            ),
            BackboneKind::ResNet(name) => Backbone::ResNet(
                ResNetBackboneConfig::from_name(&name)?
                    .with_input_channels(self.input_channels)
                    .init(device),
            ),
            BackboneKind::AlexNet => Backbone::AlexNet(
                AlexNetBackboneConfig::new()
                    .with_input_channels(self.input_channels)
                    .init(device),
            ),
            BackboneKind::DaNN => {
                let mut config = DaNNBackboneConfig::new();
                if let Some([height, width]) = self.input_resolution {
                    config = config.with_n_input(self.input_channels * height * width);
                }
                Backbone::DaNN(config.init(device))
            }
        };
        tracing::debug!(
            backbone = %self.name,
            output_num = backbone.output_num(),
            "initialized backbone"
        );
        Ok(backbone)
    }

    /// Initialize a [`Backbone`], loading pretrained weights when configured.
    pub fn init_with_weights<B: Backend>(
        &self,
        device: &B::Device,
        disk_cache: &DiskCacheConfig,
    ) -> anyhow::Result<Backbone<B>> {
        let backbone = self.init(device)?;
        if !self.pretrained {
            return Ok(backbone);
        }
        Ok(match (backbone, self.kind()?) {
            (Backbone::ResNet(model), BackboneKind::ResNet(name)) => {
                Backbone::ResNet(model.load_pretrained(&name, TV_IN1K, disk_cache)?)
            }
            (Backbone::RspResNet(model), BackboneKind::RspResNet(name)) => {
                Backbone::RspResNet(model.load_pretrained(&name, TV_IN1K, disk_cache)?)
            }
            (Backbone::AlexNet(model), _) => Backbone::AlexNet(model.load_pretrained(disk_cache)?),
            (backbone, kind) => {
                tracing::warn!(%kind, "no pretrained weights; using initialization");
                backbone
            }
        })
    }
}

/// A feature-extracting backbone.
#[derive(Module, Debug)]
#[allow(clippy::large_enum_variant)]
pub enum Backbone<B: Backend> {
    /// Style-removal `ResNet`.
    RspResNet(RspResNetBackbone<B>),

    /// Plain `ResNet`.
    ResNet(ResNetBackbone<B>),

    /// `AlexNet`.
    AlexNet(AlexNetBackbone<B>),

    /// `DaNN` MLP.
    DaNN(DaNNBackbone<B>),
}

impl<B: Backend> Backbone<B> {
    /// The width of the output feature vector.
    pub fn output_num(&self) -> usize {
        match self {
            Self::RspResNet(model) => model.output_num(),
            Self::ResNet(model) => model.output_num(),
            Self::AlexNet(model) => model.output_num(),
            Self::DaNN(model) => model.output_num(),
        }
    }

    /// Compute the feature vector.
    ///
    /// # Arguments
    ///
    /// - `input`: ``[batch, channels, height, width]``.
    ///
    /// # Returns
    ///
    /// A ``[batch, output_num]`` tensor.
    pub fn forward_features(
        &self,
        input: Tensor<B, 4>,
    ) -> Tensor<B, 2> {
        match self {
            Self::RspResNet(model) => model.forward_features(input),
            Self::ResNet(model) => model.forward_features(input),
            Self::AlexNet(model) => model.forward_features(input),
            Self::DaNN(model) => model.forward_features(input),
        }
    }
}
