//! # Basic Block for `ResNet`
//!
//! [`BasicBlock`] is the two-conv `ResNet` unit used by `resnet18` and `resnet34`.
//!
//! [`BasicBlockMeta`] defines a common meta API for [`BasicBlock`]
//! and [`BasicBlockConfig`].
//!
//! [`BasicBlockConfig`] implements [`Config`], and provides
//! [`BasicBlockConfig::init`] to initialize a [`BasicBlock`].
//!
//! [`BasicBlock`] implements [`Module`], and provides
//! [`BasicBlock::forward`].

use crate::compat::normalization_wrapper::NormalizationConfig;
use crate::layers::blocks::cna::{CNA2d, CNA2dConfig, CNA2dMeta};
use crate::models::resnet::downsample::{ConvDownsample, ConvDownsampleConfig};
use crate::models::resnet::util::{CONV_INTO_RELU_INITIALIZER, scalar_to_array};
use bimm_contracts::{assert_shape_contract_periodically, unpack_shape_contract};
use burn::nn::PaddingConfig2d;
use burn::nn::conv::Conv2dConfig;
use burn::prelude::{Backend, Config, Module, Tensor};

/// [`BasicBlock`] Meta trait.
pub trait BasicBlockMeta {
    /// The size of the in channels dimension.
    fn in_planes(&self) -> usize;

    /// Configures the size of `out_planes`.
    fn planes(&self) -> usize;

    /// Dilation rate for conv layers.
    fn dilation(&self) -> usize;

    /// The stride of the first convolution.
    ///
    /// Affects downsample behavior.
    fn stride(&self) -> usize;

    /// The size of the out channels dimension.
    ///
    /// A basic block never expands: ``out_planes = planes``.
    fn out_planes(&self) -> usize {
        self.planes()
    }

    /// Does this block need a projection on the identity path?
    fn needs_downsample(&self) -> bool {
        self.stride() != 1 || self.in_planes() != self.out_planes()
    }
}

/// [`BasicBlock`] Config.
///
/// Implements [`BasicBlockMeta`].
#[derive(Config, Debug)]
pub struct BasicBlockConfig {
    /// The size of the in channels dimension.
    pub in_planes: usize,

    /// The size of the out channels dimension.
    pub planes: usize,

    /// The stride of the first conv and the downsample layer.
    #[config(default = 1)]
    pub stride: usize,

    /// Dilation rate for conv layers.
    #[config(default = 1)]
    pub dilation: usize,

    /// [`crate::compat::normalization_wrapper::Normalization`] config.
    ///
    /// The feature size of this config will be replaced
    /// with the appropriate feature size for each layer.
    #[config(default = "NormalizationConfig::batch()")]
    pub normalization: NormalizationConfig,
}

impl BasicBlockMeta for BasicBlockConfig {
    fn in_planes(&self) -> usize {
        self.in_planes
    }

    fn planes(&self) -> usize {
        self.planes
    }

    fn dilation(&self) -> usize {
        self.dilation
    }

    fn stride(&self) -> usize {
        self.stride
    }
}

impl BasicBlockConfig {
    /// Initialize a [`BasicBlock`].
    pub fn init<B: Backend>(
        self,
        device: &B::Device,
    ) -> BasicBlock<B> {
        let in_planes = self.in_planes();
        let out_planes = self.out_planes();
        let stride = self.stride();
        let dilation = self.dilation();

        let downsample = self.needs_downsample().then(|| {
            ConvDownsampleConfig::new(in_planes, out_planes)
                .with_stride(stride)
                .with_norm(self.normalization.clone())
        });

        let cna1 = CNA2dConfig::new(
            Conv2dConfig::new([in_planes, out_planes], scalar_to_array(3))
                .with_stride(scalar_to_array(stride))
                .with_dilation(scalar_to_array(dilation))
                .with_padding(PaddingConfig2d::Explicit(dilation, dilation))
                .with_initializer(CONV_INTO_RELU_INITIALIZER)
                .with_bias(false),
        )
        .with_norm(self.normalization.clone());

        let cna2 = CNA2dConfig::new(
            Conv2dConfig::new([out_planes, out_planes], scalar_to_array(3))
                .with_dilation(scalar_to_array(dilation))
                .with_padding(PaddingConfig2d::Explicit(dilation, dilation))
                .with_initializer(CONV_INTO_RELU_INITIALIZER)
                .with_bias(false),
        )
        .with_norm(self.normalization);

        BasicBlock {
            downsample: downsample.map(|cfg| cfg.init(device)),
            cna1: cna1.init(device),
            cna2: cna2.init(device),
        }
    }
}

/// Basic Block for `ResNet`.
///
/// Implements [`BasicBlockMeta`].
#[derive(Module, Debug)]
pub struct BasicBlock<B: Backend> {
    /// Optional `DownSample` layer; for the residual connection.
    pub downsample: Option<ConvDownsample<B>>,

    /// First Conv/Norm/Act Block.
    pub cna1: CNA2d<B>,

    /// Second Conv/Norm/Act Block.
    pub cna2: CNA2d<B>,
}

impl<B: Backend> BasicBlockMeta for BasicBlock<B> {
    fn in_planes(&self) -> usize {
        self.cna1.in_channels()
    }

    fn planes(&self) -> usize {
        self.cna2.out_channels()
    }

    fn dilation(&self) -> usize {
        self.cna2.dilation()[0]
    }

    fn stride(&self) -> usize {
        self.cna1.stride()[0]
    }
}

impl<B: Backend> BasicBlock<B> {
    /// Forward Pass.
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
        let [batch] = unpack_shape_contract!(
            ["batch", "in_planes", "in_height", "in_width"],
            &input,
            &["batch"],
            &[("in_planes", self.in_planes())]
        );

        let identity = match &self.downsample {
            Some(downsample) => downsample.forward(input.clone()),
            None => input.clone(),
        };

        let x = self.cna1.forward(input);
        let x = self.cna2.hook_forward(x, |x| x + identity);

        assert_shape_contract_periodically!(
            ["batch", "out_planes", "out_height", "out_width"],
            &x,
            &[("batch", batch), ("out_planes", self.out_planes())]
        );

        x
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bimm_contracts::assert_shape_contract;
    use burn::backend::{Autodiff, NdArray};

    #[test]
    fn test_basic_block_config() {
        let config = BasicBlockConfig::new(16, 32);
        assert_eq!(config.in_planes(), 16);
        assert_eq!(config.out_planes(), 32);
        assert_eq!(config.stride(), 1);
        assert!(config.needs_downsample());

        let config = BasicBlockConfig::new(16, 16);
        assert!(!config.needs_downsample());
        assert!(config.with_stride(2).needs_downsample());
    }

    #[test]
    fn test_basic_block_meta() {
        type B = NdArray<f32>;
        let device = Default::default();

        let block: BasicBlock<B> = BasicBlockConfig::new(4, 8).with_stride(2).init(&device);

        assert_eq!(block.in_planes(), 4);
        assert_eq!(block.out_planes(), 8);
        assert_eq!(block.stride(), 2);
        assert_eq!(block.dilation(), 1);
        assert!(block.downsample.is_some());
    }

    #[test]
    fn test_basic_block_forward_no_downsample_autodiff() {
        type B = Autodiff<NdArray<f32>>;
        let device = Default::default();

        let block: BasicBlock<B> = BasicBlockConfig::new(4, 4).init(&device);
        assert!(block.downsample.is_none());

        let output = block.forward(Tensor::ones([2, 4, 9, 9], &device));

        assert_shape_contract!(
            ["batch", "out_channels", "out_height", "out_width"],
            &output,
            &[
                ("batch", 2),
                ("out_channels", 4),
                ("out_height", 9),
                ("out_width", 9)
            ],
        );
    }

    #[test]
    fn test_basic_block_forward_odd_resolution_downsample() {
        type B = NdArray<f32>;
        let device = Default::default();

        let block: BasicBlock<B> = BasicBlockConfig::new(2, 6)
            .with_stride(2)
            .with_normalization(NormalizationConfig::instance())
            .init(&device);

        let output = block.forward(Tensor::ones([3, 2, 9, 9], &device));
        assert_eq!(output.dims(), [3, 6, 5, 5]);
    }
}
