//! # `AlexNet` Backbone
//!
//! The `AlexNet` feature stack followed by the first six classifier entries;
//! the final 1000-way projection is dropped.

use crate::cache::disk::DiskCacheConfig;
use crate::cache::weights::StaticPretrainedWeightsDescriptor;
use anyhow::Context;
use bimm_contracts::{assert_shape_contract_periodically, unpack_shape_contract};
use burn::config::Config;
use burn::module::Module;
use burn::nn::conv::{Conv2d, Conv2dConfig, Conv2dRecord};
use burn::nn::pool::{AdaptiveAvgPool2d, AdaptiveAvgPool2dConfig, MaxPool2d, MaxPool2dConfig};
use burn::nn::{Dropout, DropoutConfig, Linear, LinearConfig, PaddingConfig2d, Relu};
use burn::prelude::{Backend, Tensor};
use burn::record::{FullPrecisionSettings, Recorder};
use burn_import::pytorch::{LoadArgs, PyTorchFileRecorder};
use std::path::PathBuf;

/// Spatial size of the adaptive pool ahead of the classifier.
pub const ALEXNET_POOL_SIZE: usize = 6;

/// Smallest input side that survives the three unpadded 3x3/2 max-pools.
pub const ALEXNET_MIN_INPUT_RESOLUTION: usize = 63;

/// torchvision `AlexNet` ImageNet weights.
pub static ALEXNET_TV_IN1K: StaticPretrainedWeightsDescriptor<'static> = StaticPretrainedWeightsDescriptor {
    name: "alexnet-tv_in1k",
    description: "AlexNet pretrained on ImageNet",
    license: Some("bsd-3-clause"),
    origin: Some("https://github.com/pytorch/vision"),
    urls: &["https://download.pytorch.org/models/alexnet-owt-7be5d3b4.pth"],
};

/// [`AlexNetBackbone`] configuration.
#[derive(Config, Debug)]
pub struct AlexNetBackboneConfig {
    /// The number of input channels.
    #[config(default = 3)]
    pub input_channels: usize,

    /// Width of the two hidden classifier layers.
    #[config(default = 4096)]
    pub hidden: usize,

    /// Classifier dropout.
    #[config(default = 0.5)]
    pub dropout: f64,
}

impl AlexNetBackboneConfig {
    /// Initialize an [`AlexNetBackbone`].
    pub fn init<B: Backend>(
        &self,
        device: &B::Device,
    ) -> AlexNetBackbone<B> {
        let conv = |channels: [usize; 2], kernel: usize, stride: usize, padding: usize| -> Conv2d<B> {
            Conv2dConfig::new(channels, [kernel, kernel])
                .with_stride([stride, stride])
                .with_padding(PaddingConfig2d::Explicit(padding, padding))
                .init(device)
        };
        let flat = 256 * ALEXNET_POOL_SIZE * ALEXNET_POOL_SIZE;

        AlexNetBackbone {
            conv1: conv([self.input_channels, 64], 11, 4, 2),
            conv2: conv([64, 192], 5, 1, 2),
            conv3: conv([192, 384], 3, 1, 1),
            conv4: conv([384, 256], 3, 1, 1),
            conv5: conv([256, 256], 3, 1, 1),
            maxpool: MaxPool2dConfig::new([3, 3]).with_strides([2, 2]).init(),
            avgpool: AdaptiveAvgPool2dConfig::new([ALEXNET_POOL_SIZE, ALEXNET_POOL_SIZE]).init(),
            dropout: DropoutConfig::new(self.dropout).init(),
            fc1: LinearConfig::new(flat, self.hidden).init(device),
            fc2: LinearConfig::new(self.hidden, self.hidden).init(device),
            act: Relu::new(),
        }
    }
}

/// Headless `AlexNet`.
#[derive(Module, Debug)]
pub struct AlexNetBackbone<B: Backend> {
    /// 11x11/4 conv.
    pub conv1: Conv2d<B>,
    /// 5x5 conv.
    pub conv2: Conv2d<B>,
    /// 3x3 conv.
    pub conv3: Conv2d<B>,
    /// 3x3 conv.
    pub conv4: Conv2d<B>,
    /// 3x3 conv.
    pub conv5: Conv2d<B>,
    /// Shared 3x3/2 max-pool.
    pub maxpool: MaxPool2d,
    /// Adaptive pool to 6x6.
    pub avgpool: AdaptiveAvgPool2d,
    /// Classifier dropout.
    pub dropout: Dropout,
    /// First hidden layer.
    pub fc1: Linear<B>,
    /// Second hidden layer.
    pub fc2: Linear<B>,
    /// Activation.
    pub act: Relu,
}

impl<B: Backend> AlexNetBackbone<B> {
    /// The width of the output feature vector.
    pub fn output_num(&self) -> usize {
        self.fc2.weight.dims()[1]
    }

    /// Compute the feature vector.
    ///
    /// # Arguments
    ///
    /// - `input`: ``[batch, input_channels, height, width]``; at least
    ///   [`ALEXNET_MIN_INPUT_RESOLUTION`] on each side.
    ///
    /// # Returns
    ///
    /// A ``[batch, output_num]`` tensor.
    pub fn forward_features(
        &self,
        input: Tensor<B, 4>,
    ) -> Tensor<B, 2> {
        let [batch] = unpack_shape_contract!(
            ["batch", "channels", "height", "width"],
            &input,
            &["batch"],
            &[("channels", self.conv1.weight.dims()[1])]
        );

        let x = self.act.forward(self.conv1.forward(input));
        let x = self.maxpool.forward(x);
        let x = self.act.forward(self.conv2.forward(x));
        let x = self.maxpool.forward(x);
        let x = self.act.forward(self.conv3.forward(x));
        let x = self.act.forward(self.conv4.forward(x));
        let x = self.act.forward(self.conv5.forward(x));
        let x = self.maxpool.forward(x);
        let x = self.avgpool.forward(x).flatten(1, 3);

        let x = self.dropout.forward(x);
        let x = self.act.forward(self.fc1.forward(x));
        let x = self.dropout.forward(x);
        let x = self.act.forward(self.fc2.forward(x));

        assert_shape_contract_periodically!(
            ["batch", "features"],
            &x,
            &[("batch", batch), ("features", self.output_num())]
        );

        x
    }

    /// Copy torchvision weights from a ``.pth`` file onto this model.
    ///
    /// The first conv keeps its initialization when the input channels differ.
    pub fn load_pytorch_weights(
        self,
        path: PathBuf,
    ) -> anyhow::Result<Self> {
        let device = self.devices()[0].clone();
        tracing::info!(path = %path.display(), "loading AlexNet weights");

        let load_args = LoadArgs::new(path)
            .with_key_remap(r"^features\.0\.", "conv1.")
            .with_key_remap(r"^features\.3\.", "conv2.")
            .with_key_remap(r"^features\.6\.", "conv3.")
            .with_key_remap(r"^features\.8\.", "conv4.")
            .with_key_remap(r"^features\.10\.", "conv5.")
            .with_key_remap(r"^classifier\.1\.", "fc1.")
            .with_key_remap(r"^classifier\.4\.", "fc2.")
            .with_key_remap(r"^classifier\.6\.", "fc3.");
        let stub: AlexNetStubRecord<B> =
            PyTorchFileRecorder::<FullPrecisionSettings>::new().load(load_args, &device)?;

        let conv1 = copy_conv_if_shaped(self.conv1, stub.conv1, "conv1");
        Ok(Self {
            conv1,
            conv2: self.conv2.load_record(stub.conv2),
            conv3: self.conv3.load_record(stub.conv3),
            conv4: self.conv4.load_record(stub.conv4),
            conv5: self.conv5.load_record(stub.conv5),
            fc1: self.fc1.load_record(stub.fc1),
            fc2: self.fc2.load_record(stub.fc2),
            ..self
        })
    }

    /// Fetch the torchvision ImageNet weights through the disk cache.
    pub fn load_pretrained(
        self,
        disk_cache: &DiskCacheConfig,
    ) -> anyhow::Result<Self> {
        let path = ALEXNET_TV_IN1K
            .to_descriptor()
            .fetch_weights_to_disk_cache(disk_cache)
            .context("fetching AlexNet weights")?;
        self.load_pytorch_weights(path)
    }
}

fn copy_conv_if_shaped<B: Backend>(
    conv: Conv2d<B>,
    record: Conv2dRecord<B>,
    name: &str,
) -> Conv2d<B> {
    let stub_dims = record.weight.dims();
    let conv_dims = conv.weight.dims();
    if stub_dims == conv_dims {
        conv.load_record(record)
    } else {
        tracing::warn!(
            name,
            ?stub_dims,
            ?conv_dims,
            "conv shape differs from pretrained weights; keeping initialization"
        );
        conv
    }
}

/// torchvision parameter layout.
#[allow(dead_code)]
#[derive(Module, Debug)]
struct AlexNetStub<B: Backend> {
    conv1: Conv2d<B>,
    conv2: Conv2d<B>,
    conv3: Conv2d<B>,
    conv4: Conv2d<B>,
    conv5: Conv2d<B>,
    fc1: Linear<B>,
    fc2: Linear<B>,
    fc3: Linear<B>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use bimm_contracts::assert_shape_contract;
    use burn::backend::NdArray;

    type B = NdArray<f32>;

    #[test]
    fn test_alexnet_forward() {
        let device = Default::default();
        let model: AlexNetBackbone<B> = AlexNetBackboneConfig::new()
            .with_hidden(32)
            .init(&device);
        assert_eq!(model.output_num(), 32);

        let output = model.forward_features(Tensor::ones([2, 3, 64, 64], &device));
        assert_shape_contract!(
            ["batch", "features"],
            &output,
            &[("batch", 2), ("features", 32)]
        );
    }

    #[test]
    fn test_alexnet_smallest_input() {
        let device = Default::default();
        let model: AlexNetBackbone<B> = AlexNetBackboneConfig::new()
            .with_input_channels(4)
            .with_hidden(16)
            .init(&device);

        let side = ALEXNET_MIN_INPUT_RESOLUTION;
        let output = model.forward_features(Tensor::zeros([2, 4, side, side], &device));
        assert_eq!(output.dims(), [2, 16]);
    }

    #[test]
    fn test_alexnet_default_width() {
        let config = AlexNetBackboneConfig::new();
        assert_eq!(config.hidden, 4096);
        assert_eq!(config.input_channels, 3);
    }

    #[test]
    fn test_copy_conv_if_shaped() {
        let device = Default::default();
        let source: Conv2d<B> = Conv2dConfig::new([3, 4], [3, 3]).init(&device);
        let target: Conv2d<B> = Conv2dConfig::new([3, 4], [3, 3]).init(&device);
        let other: Conv2d<B> = Conv2dConfig::new([5, 4], [3, 3]).init(&device);

        let copied = copy_conv_if_shaped(target, source.clone().into_record(), "conv");
        copied
            .weight
            .to_data()
            .assert_eq(&source.weight.to_data(), true);

        let before = other.weight.to_data();
        let kept = copy_conv_if_shaped(other, source.into_record(), "conv");
        kept.weight.to_data().assert_eq(&before, true);
    }
}
