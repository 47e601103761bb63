//! # Normalization Wrapper
//!
//! Lets the `ResNet` family swap the norm layer of every block:
//! * [`Batch`](Normalization::Batch) - [`BatchNorm`], the torchvision default.
//! * [`Instance`](Normalization::Instance) - [`InstanceNorm`], style-free features.
//! * [`Group`](Normalization::Group) - [`GroupNorm`], for tiny hyperspectral batches.
//!
//! Only the batch variant can receive pretrained torchvision statistics.

use burn::nn::{
    BatchNorm, BatchNormConfig, GroupNorm, GroupNormConfig, InstanceNorm, InstanceNormConfig,
};
use burn::prelude::{Backend, Config, Module, Tensor};

/// [`Normalization`] Configuration.
#[derive(Config, Debug)]
pub enum NormalizationConfig {
    /// [`BatchNorm`] Configuration.
    Batch(BatchNormConfig),

    /// [`GroupNorm`] Configuration.
    Group(GroupNormConfig),

    /// [`InstanceNorm`] Configuration.
    Instance(InstanceNormConfig),
}

impl Default for NormalizationConfig {
    fn default() -> Self {
        Self::batch()
    }
}

impl From<BatchNormConfig> for NormalizationConfig {
    fn from(config: BatchNormConfig) -> Self {
        Self::Batch(config)
    }
}

impl From<GroupNormConfig> for NormalizationConfig {
    fn from(config: GroupNormConfig) -> Self {
        Self::Group(config)
    }
}

impl From<InstanceNormConfig> for NormalizationConfig {
    fn from(config: InstanceNormConfig) -> Self {
        Self::Instance(config)
    }
}

impl NormalizationConfig {
    /// A feature-less [`BatchNorm`] config; sized later by [`Self::with_num_features`].
    pub fn batch() -> Self {
        BatchNormConfig::new(0).into()
    }

    /// A feature-less affine [`InstanceNorm`] config.
    pub fn instance() -> Self {
        InstanceNormConfig::new(0).with_affine(true).into()
    }

    /// Initialize a [`Normalization`] layer.
    pub fn init<B: Backend>(
        &self,
        device: &B::Device,
    ) -> Normalization<B> {
        match self {
            NormalizationConfig::Batch(config) => config.init(device).into(),
            NormalizationConfig::Group(config) => config.init(device).into(),
            NormalizationConfig::Instance(config) => config.init(device).into(),
        }
    }

    /// Adjust a norm config to the feature size.
    pub fn with_num_features(
        self,
        num_features: usize,
    ) -> Self {
        match self {
            NormalizationConfig::Batch(config) => BatchNormConfig {
                num_features,
                ..config
            }
            .into(),
            NormalizationConfig::Group(config) => GroupNormConfig {
                num_channels: num_features,
                ..config
            }
            .into(),
            NormalizationConfig::Instance(config) => InstanceNormConfig {
                num_channels: num_features,
                ..config
            }
            .into(),
        }
    }

    /// Get the number of features.
    pub fn num_features(&self) -> usize {
        match self {
            NormalizationConfig::Batch(config) => config.num_features,
            NormalizationConfig::Group(config) => config.num_channels,
            NormalizationConfig::Instance(config) => config.num_channels,
        }
    }
}

/// Normalization Layer Wrapper.
///
/// See the module docs for the supported layers.
#[derive(Module, Debug)]
pub enum Normalization<B: Backend> {
    /// [`BatchNorm`] layer; restricted to `BatchNorm<2>`.
    Batch(BatchNorm<B, 2>),

    /// [`GroupNorm`] layer.
    Group(GroupNorm<B>),

    /// [`InstanceNorm`] layer.
    Instance(InstanceNorm<B>),
}

impl<B: Backend> From<BatchNorm<B, 2>> for Normalization<B> {
    fn from(layer: BatchNorm<B, 2>) -> Self {
        Self::Batch(layer)
    }
}

impl<B: Backend> From<GroupNorm<B>> for Normalization<B> {
    fn from(layer: GroupNorm<B>) -> Self {
        Self::Group(layer)
    }
}

impl<B: Backend> From<InstanceNorm<B>> for Normalization<B> {
    fn from(layer: InstanceNorm<B>) -> Self {
        Self::Instance(layer)
    }
}

impl<B: Backend> Normalization<B> {
    /// Applies normalization to a ``[batch, channels, ...]`` tensor.
    ///
    /// The output has the input shape.
    pub fn forward<const D: usize>(
        &self,
        input: Tensor<B, D>,
    ) -> Tensor<B, D> {
        match self {
            Normalization::Batch(norm) => norm.forward(input),
            Normalization::Group(norm) => norm.forward(input),
            Normalization::Instance(norm) => norm.forward(input),
        }
    }

    /// Get the number of features.
    pub fn num_features(&self) -> usize {
        match self {
            Normalization::Batch(norm) => norm.gamma.shape().dims[0],
            Normalization::Group(norm) => norm.num_channels,
            Normalization::Instance(norm) => norm.num_channels,
        }
    }
}
