//! # Residual Block Wrapper

use crate::compat::normalization_wrapper::NormalizationConfig;
use crate::models::resnet::basic_block::{BasicBlock, BasicBlockConfig, BasicBlockMeta};
use crate::models::resnet::bottleneck::{
    BottleneckBlock, BottleneckBlockConfig, BottleneckBlockMeta,
};
use burn::config::Config;
use burn::prelude::{Backend, Module, Tensor};

/// [`ResidualBlock`] Meta API.
pub trait ResidualBlockMeta {
    /// The number of input feature planes.
    fn in_planes(&self) -> usize;

    /// The number of output feature planes.
    fn out_planes(&self) -> usize;

    /// The stride of convolution.
    ///
    /// Affects downsample behavior.
    fn stride(&self) -> usize;
}

/// [`ResidualBlock`] Config.
#[derive(Config, Debug)]
pub enum ResidualBlockConfig {
    /// A `ResNet` [`BasicBlock`].
    Basic(BasicBlockConfig),

    /// A `ResNet` [`BottleneckBlock`].
    Bottleneck(BottleneckBlockConfig),
}

impl ResidualBlockMeta for ResidualBlockConfig {
    fn in_planes(&self) -> usize {
        match self {
            Self::Basic(config) => config.in_planes(),
            Self::Bottleneck(config) => config.in_planes(),
        }
    }

    fn out_planes(&self) -> usize {
        match self {
            Self::Basic(config) => config.out_planes(),
            Self::Bottleneck(config) => config.out_planes(),
        }
    }

    fn stride(&self) -> usize {
        match self {
            Self::Basic(config) => config.stride(),
            Self::Bottleneck(config) => config.stride(),
        }
    }
}

impl From<BasicBlockConfig> for ResidualBlockConfig {
    fn from(config: BasicBlockConfig) -> Self {
        Self::Basic(config)
    }
}

impl From<BottleneckBlockConfig> for ResidualBlockConfig {
    fn from(config: BottleneckBlockConfig) -> Self {
        Self::Bottleneck(config)
    }
}

impl ResidualBlockConfig {
    /// Build a block config.
    ///
    /// # Arguments
    ///
    /// - `in_planes`: the input channels.
    /// - `planes`: the block base width; bottleneck blocks expand it.
    /// - `stride`: the block stride.
    /// - `bottleneck`: select [`BottleneckBlock`] over [`BasicBlock`].
    pub fn build(
        in_planes: usize,
        planes: usize,
        stride: usize,
        bottleneck: bool,
    ) -> Self {
        if bottleneck {
            BottleneckBlockConfig::new(in_planes, planes)
                .with_stride(stride)
                .into()
        } else {
            BasicBlockConfig::new(in_planes, planes)
                .with_stride(stride)
                .into()
        }
    }

    /// Initialize a [`ResidualBlock`].
    pub fn init<B: Backend>(
        &self,
        device: &B::Device,
    ) -> ResidualBlock<B> {
        match self {
            Self::Basic(config) => ResidualBlock::Basic(config.clone().init(device)),
            Self::Bottleneck(config) => ResidualBlock::Bottleneck(config.clone().init(device)),
        }
    }

    /// Override the stride.
    pub fn with_stride(
        self,
        stride: usize,
    ) -> Self {
        match self {
            Self::Basic(config) => config.with_stride(stride).into(),
            Self::Bottleneck(config) => config.with_stride(stride).into(),
        }
    }

    /// Override the normalization layers.
    pub fn with_normalization(
        self,
        normalization: NormalizationConfig,
    ) -> Self {
        match self {
            Self::Basic(config) => config.with_normalization(normalization).into(),
            Self::Bottleneck(config) => config.with_normalization(normalization).into(),
        }
    }
}

/// A `ResNet` [`BasicBlock`] or [`BottleneckBlock`] wrapper.
#[derive(Module, Debug)]
#[allow(clippy::large_enum_variant)]
pub enum ResidualBlock<B: Backend> {
    /// A `ResNet` [`BasicBlock`].
    Basic(BasicBlock<B>),

    /// A `ResNet` [`BottleneckBlock`].
    Bottleneck(BottleneckBlock<B>),
}

impl<B: Backend> From<BasicBlock<B>> for ResidualBlock<B> {
    fn from(block: BasicBlock<B>) -> Self {
        Self::Basic(block)
    }
}

impl<B: Backend> From<BottleneckBlock<B>> for ResidualBlock<B> {
    fn from(block: BottleneckBlock<B>) -> Self {
        Self::Bottleneck(block)
    }
}

impl<B: Backend> ResidualBlockMeta for ResidualBlock<B> {
    fn in_planes(&self) -> usize {
        match self {
            Self::Basic(block) => block.in_planes(),
            Self::Bottleneck(block) => block.in_planes(),
        }
    }

    fn out_planes(&self) -> usize {
        match self {
            Self::Basic(block) => block.out_planes(),
            Self::Bottleneck(block) => block.out_planes(),
        }
    }

    fn stride(&self) -> usize {
        match self {
            Self::Basic(block) => block.stride(),
            Self::Bottleneck(block) => block.stride(),
        }
    }
}

impl<B: Backend> ResidualBlock<B> {
    /// Apply the wrapped block to the input.
    ///
    /// # Arguments
    ///
    /// - `input`: ``[batch, in_planes, in_height, in_width]``.
    ///
    /// # Returns
    ///
    /// A ``[batch, out_planes, out_height, out_width]`` tensor.
    pub fn forward(
        &self,
        input: Tensor<B, 4>,
    ) -> Tensor<B, 4> {
        match self {
            Self::Basic(block) => block.forward(input),
            Self::Bottleneck(block) => block.forward(input),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bimm_contracts::assert_shape_contract;
    use burn::backend::NdArray;

    #[test]
    fn test_residual_block_config() {
        let cfg = ResidualBlockConfig::build(16, 32, 2, false);
        assert!(matches!(cfg, ResidualBlockConfig::Basic(_)));
        assert_eq!(cfg.in_planes(), 16);
        assert_eq!(cfg.out_planes(), 32);
        assert_eq!(cfg.stride(), 2);

        let cfg = ResidualBlockConfig::build(16, 32, 2, true);
        assert!(matches!(cfg, ResidualBlockConfig::Bottleneck(_)));
        assert_eq!(cfg.in_planes(), 16);
        assert_eq!(cfg.out_planes(), 128);
        assert_eq!(cfg.stride(), 2);

        let cfg = cfg.with_stride(1);
        assert_eq!(cfg.stride(), 1);
    }

    #[test]
    fn test_residual_block_basic_block() {
        type B = NdArray;
        let device = Default::default();

        let block: ResidualBlock<B> = ResidualBlockConfig::build(4, 8, 2, false).init(&device);
        assert!(matches!(block, ResidualBlock::Basic(_)));
        assert_eq!(block.in_planes(), 4);
        assert_eq!(block.out_planes(), 8);
        assert_eq!(block.stride(), 2);

        let output = block.forward(Tensor::ones([2, 4, 8, 8], &device));

        assert_shape_contract!(
            ["batch", "out_planes", "out_height", "out_width"],
            &output,
            &[
                ("batch", 2),
                ("out_planes", 8),
                ("out_height", 4),
                ("out_width", 4)
            ],
        );
    }

    #[test]
    fn test_residual_block_bottleneck_block() {
        type B = NdArray;
        let device = Default::default();

        let block: ResidualBlock<B> = ResidualBlockConfig::build(4, 2, 1, true)
            .with_normalization(NormalizationConfig::instance())
            .init(&device);
        assert!(matches!(block, ResidualBlock::Bottleneck(_)));
        assert_eq!(block.out_planes(), 8);

        let output = block.forward(Tensor::ones([2, 4, 5, 5], &device));
        assert_eq!(output.dims(), [2, 8, 5, 5]);
    }
}
