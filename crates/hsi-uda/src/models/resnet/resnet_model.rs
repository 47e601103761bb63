//! # `ResNet` Backbone
//!
//! [`ResNetBackbone`] is a headless `ResNet`; it maps images to pooled
//! feature vectors of width [`ResNetBackboneMeta::output_num`].
//!
//! [`ResNetBackboneConfig`] implements [`Config`], and provides
//! [`ResNetBackboneConfig::init`] to initialize a [`ResNetBackbone`].

use crate::compat::normalization_wrapper::NormalizationConfig;
use crate::layers::blocks::cna::{CNA2d, CNA2dConfig, CNA2dMeta};
use crate::models::resnet::bottleneck::BOTTLENECK_EXPANSION;
use crate::models::resnet::layer_block::{LayerBlock, LayerBlockConfig, LayerBlockMeta};
use crate::models::resnet::util::{CONV_INTO_RELU_INITIALIZER, scalar_to_array};
use bimm_contracts::{assert_shape_contract_periodically, unpack_shape_contract};
use burn::config::Config;
use burn::module::Module;
use burn::nn::PaddingConfig2d;
use burn::nn::conv::Conv2dConfig;
use burn::nn::pool::{AdaptiveAvgPool2d, AdaptiveAvgPool2dConfig, MaxPool2d, MaxPool2dConfig};
use burn::prelude::{Backend, Tensor};

/// Base planes of the four `ResNet` stages.
pub const STAGE_PLANES: [usize; 4] = [64, 128, 256, 512];

/// Output channels of the `ResNet` stem.
pub const STEM_PLANES: usize = 64;

/// [`ResNetBackbone`] Meta API.
pub trait ResNetBackboneMeta {
    /// The number of input channels.
    fn input_channels(&self) -> usize;

    /// The channel expansion of each residual block; 1 or 4.
    fn expansion(&self) -> usize;

    /// The output planes of each stage.
    fn stage_out_planes(&self) -> [usize; 4] {
        STAGE_PLANES.map(|p| p * self.expansion())
    }

    /// The width of the pooled feature vector.
    fn output_num(&self) -> usize {
        STAGE_PLANES[3] * self.expansion()
    }
}

/// [`ResNetBackbone`] configuration.
#[derive(Config, Debug)]
pub struct ResNetBackboneConfig {
    /// The number of residual blocks in each stage.
    pub layers: [usize; 4],

    /// Use [`crate::models::resnet::bottleneck::BottleneckBlock`]s.
    #[config(default = false)]
    pub bottleneck: bool,

    /// The number of input channels.
    #[config(default = 3)]
    pub input_channels: usize,

    /// Stride of the 7x7 stem convolution.
    #[config(default = 2)]
    pub stem_stride: usize,

    /// Stride of the first block of each stage.
    #[config(default = "[1, 2, 2, 2]")]
    pub layer_strides: [usize; 4],

    /// Normalization for every conv/norm layer.
    #[config(default = "NormalizationConfig::batch()")]
    pub normalization: NormalizationConfig,
}

impl ResNetBackboneMeta for ResNetBackboneConfig {
    fn input_channels(&self) -> usize {
        self.input_channels
    }

    fn expansion(&self) -> usize {
        if self.bottleneck {
            BOTTLENECK_EXPANSION
        } else {
            1
        }
    }
}

impl ResNetBackboneConfig {
    /// Look up a well-known configuration by name.
    ///
    /// Names are ``resnet18``, ``resnet34``, ``resnet50``, ``resnet101``, ``resnet152``.
    pub fn from_name(name: &str) -> anyhow::Result<Self> {
        Ok(super::pretrained::PREFAB_RESNET_MAP
            .try_lookup(name)?
            .new_config())
    }

    /// Build the stage configs.
    pub fn layer_configs(&self) -> Vec<LayerBlockConfig> {
        let mut in_planes = STEM_PLANES;
        (0..4)
            .map(|idx| {
                let config = LayerBlockConfig::build(
                    self.layers[idx],
                    in_planes,
                    STAGE_PLANES[idx],
                    self.layer_strides[idx],
                    self.bottleneck,
                )
                .with_normalization(self.normalization.clone());
                in_planes = config.out_planes();
                config
            })
            .collect()
    }

    /// Initialize a [`ResNetBackbone`].
    pub fn init<B: Backend>(
        &self,
        device: &B::Device,
    ) -> ResNetBackbone<B> {
        let stem = CNA2dConfig::new(
            Conv2dConfig::new([self.input_channels, STEM_PLANES], [7, 7])
                .with_stride(scalar_to_array(self.stem_stride))
                .with_padding(PaddingConfig2d::Explicit(3, 3))
                .with_initializer(CONV_INTO_RELU_INITIALIZER)
                .with_bias(false),
        )
        .with_norm(self.normalization.clone());

        let maxpool = MaxPool2dConfig::new([3, 3])
            .with_strides([2, 2])
            .with_padding(PaddingConfig2d::Explicit(1, 1));

        ResNetBackbone {
            stem: stem.init(device),
            maxpool: maxpool.init(),
            layers: self
                .layer_configs()
                .into_iter()
                .map(|config| config.init(device))
                .collect(),
            avgpool: AdaptiveAvgPool2dConfig::new([1, 1]).init(),
        }
    }
}

/// Headless `ResNet`.
///
/// ``conv 7x7 -> norm -> relu -> maxpool 3/2 -> layer1..4 -> avgpool -> flatten``
#[derive(Module, Debug)]
pub struct ResNetBackbone<B: Backend> {
    /// The 7x7 conv/norm/relu stem.
    pub stem: CNA2d<B>,

    /// The stem max-pool.
    pub maxpool: MaxPool2d,

    /// The four residual stages.
    pub layers: Vec<LayerBlock<B>>,

    /// Global average pool.
    pub avgpool: AdaptiveAvgPool2d,
}

impl<B: Backend> ResNetBackboneMeta for ResNetBackbone<B> {
    fn input_channels(&self) -> usize {
        self.stem.in_channels()
    }

    fn expansion(&self) -> usize {
        self.layers[3].out_planes() / STAGE_PLANES[3]
    }
}

impl<B: Backend> ResNetBackbone<B> {
    /// Apply the stem and the max-pool.
    ///
    /// # Arguments
    ///
    /// - `input`: ``[batch, input_channels, height, width]``.
    ///
    /// # Returns
    ///
    /// A ``[batch, 64, out_height, out_width]`` tensor.
    pub fn forward_stem(
        &self,
        input: Tensor<B, 4>,
    ) -> Tensor<B, 4> {
        let [_batch] = unpack_shape_contract!(
            ["batch", "channels", "height", "width"],
            &input,
            &["batch"],
            &[("channels", self.input_channels())]
        );

        let x = self.stem.forward(input);
        self.maxpool.forward(x)
    }

    /// Global average pool and flatten.
    ///
    /// Maps ``[batch, channels, height, width]`` to ``[batch, channels]``.
    pub fn pool(
        &self,
        input: Tensor<B, 4>,
    ) -> Tensor<B, 2> {
        self.avgpool.forward(input).flatten(1, 3)
    }

    /// Compute the pooled feature vector.
    ///
    /// # Arguments
    ///
    /// - `input`: ``[batch, input_channels, height, width]``.
    ///
    /// # Returns
    ///
    /// A ``[batch, output_num]`` tensor.
    pub fn forward_features(
        &self,
        input: Tensor<B, 4>,
    ) -> Tensor<B, 2> {
        let x = self.forward_stem(input);
        let x = self.layers.iter().fold(x, |x, layer| layer.forward(x));
        let x = self.pool(x);

        assert_shape_contract_periodically!(
            ["batch", "features"],
            &x,
            &[("features", self.output_num())]
        );

        x
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bimm_contracts::assert_shape_contract;
    use burn::backend::NdArray;

    #[test]
    fn test_resnet_config_meta() {
        let config = ResNetBackboneConfig::new([2, 2, 2, 2]);
        assert_eq!(config.expansion(), 1);
        assert_eq!(config.output_num(), 512);
        assert_eq!(config.stage_out_planes(), [64, 128, 256, 512]);

        let layers = config.layer_configs();
        assert_eq!(layers.len(), 4);
        assert_eq!(layers[0].in_planes(), 64);
        assert_eq!(layers[1].stride(), 2);

        let config = ResNetBackboneConfig::new([3, 4, 6, 3]).with_bottleneck(true);
        assert_eq!(config.expansion(), 4);
        assert_eq!(config.output_num(), 2048);
        assert_eq!(config.layer_configs()[3].out_planes(), 2048);
    }

    #[test]
    fn test_resnet_from_name() {
        let config = ResNetBackboneConfig::from_name("resnet50").unwrap();
        assert_eq!(config.layers, [3, 4, 6, 3]);
        assert!(config.bottleneck);

        let config = ResNetBackboneConfig::from_name("resnet152").unwrap();
        assert_eq!(config.layers, [3, 8, 36, 3]);

        let err = ResNetBackboneConfig::from_name("resnet19").unwrap_err();
        assert!(err.to_string().contains("resnet19"));
    }

    #[test]
    fn test_resnet_forward_hyperspectral_patch() {
        type B = NdArray<f32>;
        let device = Default::default();

        let model: ResNetBackbone<B> = ResNetBackboneConfig::new([1, 1, 1, 1])
            .with_input_channels(5)
            .init(&device);
        assert_eq!(model.input_channels(), 5);
        assert_eq!(model.expansion(), 1);
        assert_eq!(model.output_num(), 512);

        let output = model.forward_features(Tensor::ones([2, 5, 9, 9], &device));
        assert_shape_contract!(
            ["batch", "features"],
            &output,
            &[("batch", 2), ("features", 512)]
        );
    }

    #[test]
    fn test_resnet_forward_bottleneck() {
        type B = NdArray<f32>;
        let device = Default::default();

        let model: ResNetBackbone<B> = ResNetBackboneConfig::new([1, 1, 1, 1])
            .with_bottleneck(true)
            .init(&device);
        assert_eq!(model.expansion(), 4);

        let output = model.forward_features(Tensor::ones([1, 3, 32, 32], &device));
        assert_eq!(output.dims(), [1, 2048]);
    }
}
