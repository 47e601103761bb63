//! # The `ResNet` Downsample Implementation.
//!
//! The identity path of a residual block, when the block changes
//! resolution or channel count: a 1x1 strided conv and a norm layer.

use crate::compat::normalization_wrapper::NormalizationConfig;
use crate::layers::blocks::conv_norm::{ConvNorm2d, ConvNorm2dConfig, ConvNorm2dMeta};
use crate::models::resnet::util::CONV_INTO_RELU_INITIALIZER;
use burn::nn::conv::Conv2dConfig;
use burn::nn::{Initializer, PaddingConfig2d};
use burn::prelude::{Backend, Config, Module, Tensor};

/// [`ConvDownsample`] Meta trait.
pub trait ConvDownsampleMeta {
    /// The size of the in channels dimension.
    fn in_channels(&self) -> usize;

    /// The size of the out channels dimension.
    fn out_channels(&self) -> usize;

    /// The stride of the downsample layer.
    fn stride(&self) -> usize;
}

/// [`ConvDownsample`] configuration.
#[derive(Config, Debug)]
pub struct ConvDownsampleConfig {
    /// The size of the in channels dimension.
    pub in_channels: usize,

    /// The size of the out channels dimension.
    pub out_channels: usize,

    /// The stride of the downsample layer.
    #[config(default = 1)]
    pub stride: usize,

    /// The norm layer config; sized on init.
    #[config(default = "NormalizationConfig::batch()")]
    pub norm: NormalizationConfig,

    /// The conv initializer.
    #[config(default = "CONV_INTO_RELU_INITIALIZER")]
    pub initializer: Initializer,
}

impl ConvDownsampleMeta for ConvDownsampleConfig {
    fn in_channels(&self) -> usize {
        self.in_channels
    }

    fn out_channels(&self) -> usize {
        self.out_channels
    }

    fn stride(&self) -> usize {
        self.stride
    }
}

impl ConvDownsampleConfig {
    /// Initialize a [`ConvDownsample`] `Module`.
    pub fn init<B: Backend>(
        &self,
        device: &B::Device,
    ) -> ConvDownsample<B> {
        let config = ConvNorm2dConfig::new(
            Conv2dConfig::new([self.in_channels, self.out_channels], [1, 1])
                .with_stride([self.stride, self.stride])
                .with_padding(PaddingConfig2d::Explicit(0, 0))
                .with_initializer(self.initializer.clone())
                .with_bias(false),
        )
        .with_norm(self.norm.clone());

        ConvDownsample {
            conv_norm: config.init(device),
        }
    }
}

/// Applies a 1x1 conv to reduce the resolution (H, W) and adjust the number of channels.
///
/// Maps ``[batch, in_channels, in_height, in_width]`` to
/// ``[batch, out_channels, out_height, out_width]`` tensors.
#[derive(Module, Debug)]
pub struct ConvDownsample<B: Backend> {
    /// Embedded conv/norm.
    pub conv_norm: ConvNorm2d<B>,
}

impl<B: Backend> ConvDownsampleMeta for ConvDownsample<B> {
    fn in_channels(&self) -> usize {
        self.conv_norm.in_channels()
    }

    fn out_channels(&self) -> usize {
        self.conv_norm.out_channels()
    }

    fn stride(&self) -> usize {
        self.conv_norm.stride()[0]
    }
}

impl<B: Backend> ConvDownsample<B> {
    /// Forward pass.
    pub fn forward(
        &self,
        input: Tensor<B, 4>,
    ) -> Tensor<B, 4> {
        self.conv_norm.forward(input)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;

    #[test]
    fn test_downsample() {
        type B = NdArray<f32>;
        let device = Default::default();

        let config = ConvDownsampleConfig::new(4, 8).with_stride(2);
        assert_eq!(config.in_channels(), 4);
        assert_eq!(config.out_channels(), 8);
        assert_eq!(config.stride(), 2);

        let layer: ConvDownsample<B> = config.init(&device);
        assert_eq!(layer.in_channels(), 4);
        assert_eq!(layer.out_channels(), 8);
        assert_eq!(layer.stride(), 2);

        let output = layer.forward(Tensor::ones([2, 4, 7, 7], &device));
        assert_eq!(output.dims(), [2, 8, 4, 4]);
    }
}
