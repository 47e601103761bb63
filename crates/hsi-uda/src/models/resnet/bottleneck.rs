//! # [`BottleneckBlock`] Block for `ResNet`
//!
//! [`BottleneckBlock`] is the bottleneck form of the core `ResNet` convolution unit,
//! used by `resnet50`, `resnet101` and `resnet152`.
//!
//! [`BottleneckBlockMeta`] defines a common meta API for [`BottleneckBlock`]
//! and [`BottleneckBlockConfig`].
//!
//! [`BottleneckBlockConfig`] implements [`Config`], and provides
//! [`BottleneckBlockConfig::init`] to initialize a [`BottleneckBlock`].
//!
//! [`BottleneckBlock`] implements [`Module`], and provides
//! [`BottleneckBlock::forward`].

use crate::compat::normalization_wrapper::NormalizationConfig;
use crate::layers::blocks::cna::{CNA2d, CNA2dConfig, CNA2dMeta};
use crate::models::resnet::downsample::{ConvDownsample, ConvDownsampleConfig};
use crate::models::resnet::util::{CONV_INTO_RELU_INITIALIZER, scalar_to_array};
use bimm_contracts::{assert_shape_contract_periodically, unpack_shape_contract};
use burn::nn::PaddingConfig2d;
use burn::nn::conv::Conv2dConfig;
use burn::prelude::{Backend, Config, Module, Tensor};

/// Default channel expansion of a bottleneck block.
pub const BOTTLENECK_EXPANSION: usize = 4;

/// [`BottleneckBlock`] Meta trait.
pub trait BottleneckBlockMeta {
    /// The number of input feature planes.
    fn in_planes(&self) -> usize;

    /// Dilation rate for conv layers.
    fn dilation(&self) -> usize;

    /// Configures the size of `width` and `out_planes`.
    fn planes(&self) -> usize;

    /// Groups of the 3x3 conv filters.
    fn cardinality(&self) -> usize;

    /// Control factor for `width()`.
    fn base_width(&self) -> usize;

    /// Control factor for `out_planes()`
    fn expansion_factor(&self) -> usize;

    /// Inner width of the block.
    ///
    /// ``planes * (base_width / 64) * cardinality``
    fn width(&self) -> usize {
        self.planes() * (self.base_width() / 64) * self.cardinality()
    }

    /// The number of output feature planes.
    ///
    /// ``out_planes = planes * expansion_factor``
    fn out_planes(&self) -> usize {
        self.planes() * self.expansion_factor()
    }

    /// The stride of the 3x3 convolution.
    ///
    /// Affects downsample behavior.
    fn stride(&self) -> usize;

    /// Does this block need a projection on the identity path?
    fn needs_downsample(&self) -> bool {
        self.stride() != 1 || self.in_planes() != self.out_planes()
    }
}

/// [`BottleneckBlock`] Config.
///
/// Implements [`BottleneckBlockMeta`].
#[derive(Config, Debug)]
pub struct BottleneckBlockConfig {
    /// The size of the in channels dimension.
    pub in_planes: usize,

    /// Configures the size of `width` and `out_planes`.
    pub planes: usize,

    /// Groups of the conv filters.
    #[config(default = 1)]
    pub cardinality: usize,

    /// Base width used to determine the number of inner channels.
    #[config(default = 64)]
    pub base_width: usize,

    /// Control factor for `out_planes()`
    #[config(default = "BOTTLENECK_EXPANSION")]
    pub expansion_factor: usize,

    /// The stride of the 3x3 conv and the downsample layer.
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

impl BottleneckBlockMeta for BottleneckBlockConfig {
    fn in_planes(&self) -> usize {
        self.in_planes
    }

    fn dilation(&self) -> usize {
        self.dilation
    }

    fn planes(&self) -> usize {
        self.planes
    }

    fn cardinality(&self) -> usize {
        self.cardinality
    }

    fn base_width(&self) -> usize {
        self.base_width
    }

    fn expansion_factor(&self) -> usize {
        self.expansion_factor
    }

    fn stride(&self) -> usize {
        self.stride
    }
}

impl BottleneckBlockConfig {
    /// Initialize a [`BottleneckBlock`].
    pub fn init<B: Backend>(
        self,
        device: &B::Device,
    ) -> BottleneckBlock<B> {
        let in_planes = self.in_planes();
        let width = self.width();
        let out_planes = self.out_planes();
        let dilation = self.dilation();
        let stride = self.stride();

        let downsample = self.needs_downsample().then(|| {
            ConvDownsampleConfig::new(in_planes, out_planes)
                .with_stride(stride)
                .with_norm(self.normalization.clone())
        });

        let cna = |conv: Conv2dConfig| -> CNA2dConfig {
            CNA2dConfig::new(
                conv.with_initializer(CONV_INTO_RELU_INITIALIZER)
                    .with_bias(false),
            )
            .with_norm(self.normalization.clone())
        };

        let cna1 = cna(Conv2dConfig::new([in_planes, width], [1, 1]));

        let cna2 = cna(
            Conv2dConfig::new([width, width], [3, 3])
                .with_stride(scalar_to_array(stride))
                .with_dilation(scalar_to_array(dilation))
                .with_padding(PaddingConfig2d::Explicit(dilation, dilation))
                .with_groups(self.cardinality()),
        );

        let cna3 = cna(Conv2dConfig::new([width, out_planes], [1, 1]));

        BottleneckBlock {
            base_width: self.base_width,
            expansion_factor: self.expansion_factor,
            downsample: downsample.map(|cfg| cfg.init(device)),
            cna1: cna1.init(device),
            cna2: cna2.init(device),
            cna3: cna3.init(device),
        }
    }
}

/// Bottleneck Block for `ResNet`.
///
/// Implements [`BottleneckBlockMeta`].
#[derive(Module, Debug)]
pub struct BottleneckBlock<B: Backend> {
    /// Base width used to determine the number of inner channels.
    pub base_width: usize,

    /// Control factor for `out_planes()`
    pub expansion_factor: usize,

    /// Optional `DownSample` layer; for the residual connection.
    pub downsample: Option<ConvDownsample<B>>,

    /// First conv/norm/act layer; 1x1 reduction.
    pub cna1: CNA2d<B>,

    /// Second conv/norm/act layer; 3x3, carries the stride.
    pub cna2: CNA2d<B>,

    /// Third conv/norm/act layer; 1x1 expansion.
    pub cna3: CNA2d<B>,
}

impl<B: Backend> BottleneckBlockMeta for BottleneckBlock<B> {
    fn in_planes(&self) -> usize {
        self.cna1.in_channels()
    }

    fn dilation(&self) -> usize {
        self.cna2.dilation()[0]
    }

    fn planes(&self) -> usize {
        self.out_planes() / self.expansion_factor
    }

    fn cardinality(&self) -> usize {
        self.cna2.groups()
    }

    fn base_width(&self) -> usize {
        self.base_width
    }

    fn expansion_factor(&self) -> usize {
        self.expansion_factor
    }

    fn out_planes(&self) -> usize {
        self.cna3.out_channels()
    }

    fn width(&self) -> usize {
        self.cna2.out_channels()
    }

    fn stride(&self) -> usize {
        self.cna2.stride()[0]
    }
}

impl<B: Backend> BottleneckBlock<B> {
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
        let x = self.cna2.forward(x);
        let x = self.cna3.hook_forward(x, |x| x + identity);

        assert_shape_contract_periodically!(
            ["batch", "out_planes", "out_height", "out_width"],
            &x,
            &[("batch", batch), ("out_planes", self.out_planes())]
        );

        x
    }
}
