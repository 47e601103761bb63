#![allow(missing_docs)]
//! # torchvision `ResNet` Stubs.
//!
//! Stub modules mirroring the torchvision parameter layout. There is
//! insufficient information in loaded weights to rebuild stateless modules,
//! so weights are loaded into these records and then copied onto a
//! [`ResNetBackbone`].
use crate::compat::normalization_wrapper::Normalization;
use crate::layers::blocks::cna::CNA2d;
use crate::layers::blocks::conv_norm::ConvNorm2d;
use crate::models::resnet::basic_block::BasicBlock;
use crate::models::resnet::bottleneck::BottleneckBlock;
use crate::models::resnet::downsample::ConvDownsample;
use crate::models::resnet::layer_block::LayerBlock;
use crate::models::resnet::residual_block::ResidualBlock;
use crate::models::resnet::resnet_model::ResNetBackbone;
use anyhow::{bail, ensure};
use burn::module::Module;
use burn::nn::conv::{Conv2d, Conv2dRecord};
use burn::nn::{BatchNorm, BatchNormRecord, Linear};
use burn::prelude::Backend;
use burn::record::{FullPrecisionSettings, Recorder};
use burn_import::pytorch::{LoadArgs, PyTorchFileRecorder};
use std::path::PathBuf;

/// Load a [`ResNetStubRecord`] from a ``torch`` weights path.
pub fn load_resnet_stub_record<B: Backend>(
    path: PathBuf,
    device: &B::Device,
) -> anyhow::Result<ResNetStubRecord<B>> {
    let load_args = LoadArgs::new(path)
        .with_key_remap(r"downsample\.0", "downsample.conv")
        .with_key_remap(r"downsample\.1", "downsample.bn")
        .with_key_remap(r"^layer1\.", "layers.0.blocks.")
        .with_key_remap(r"^layer2\.", "layers.1.blocks.")
        .with_key_remap(r"^layer3\.", "layers.2.blocks.")
        .with_key_remap(r"^layer4\.", "layers.3.blocks.");

    let record = PyTorchFileRecorder::<FullPrecisionSettings>::new().load(load_args, device)?;

    Ok(record)
}

#[derive(Module, Debug)]
pub struct ResNetStub<B: Backend> {
    pub conv1: Conv2d<B>,
    pub bn1: BatchNorm<B, 2>,
    pub layers: Vec<LayerBlockStub<B>>,
    pub fc: Linear<B>,
}

impl<B: Backend> ResNetStubRecord<B> {
    /// Copy the feature weights onto `target`; the classifier head is dropped.
    ///
    /// The stem is copied only when its conv shape matches.
    pub fn copy_weights(
        self,
        target: ResNetBackbone<B>,
    ) -> anyhow::Result<ResNetBackbone<B>> {
        ensure!(
            self.layers.len() == target.layers.len(),
            "weights have {} stages, model has {}",
            self.layers.len(),
            target.layers.len()
        );

        let stub_dims = self.conv1.weight.dims();
        let stem_dims = target.stem.conv.weight.dims();
        let stem = if stub_dims == stem_dims {
            copy_cna_weights(self.conv1, self.bn1, target.stem)?
        } else {
            tracing::warn!(
                ?stub_dims,
                ?stem_dims,
                "stem conv shape differs from pretrained weights; keeping initialization"
            );
            target.stem
        };

        let layers = self
            .layers
            .into_iter()
            .zip(target.layers)
            .map(|(s, t)| s.copy_weights(t))
            .collect::<anyhow::Result<Vec<_>>>()?;

        Ok(ResNetBackbone {
            stem,
            layers,
            ..target
        })
    }
}

#[derive(Module, Debug)]
pub struct LayerBlockStub<B: Backend> {
    pub blocks: Vec<ResidualBlockStub<B>>,
}

impl<B: Backend> LayerBlockStubRecord<B> {
    pub fn copy_weights(
        self,
        target: LayerBlock<B>,
    ) -> anyhow::Result<LayerBlock<B>> {
        ensure!(
            self.blocks.len() == target.blocks.len(),
            "weights have {} blocks, stage has {}",
            self.blocks.len(),
            target.blocks.len()
        );
        Ok(LayerBlock {
            blocks: self
                .blocks
                .into_iter()
                .zip(target.blocks)
                .map(|(s, t)| s.copy_weights(t))
                .collect::<anyhow::Result<Vec<_>>>()?,
        })
    }
}

#[derive(Module, Debug)]
#[allow(clippy::large_enum_variant)]
pub enum ResidualBlockStub<B: Backend> {
    Bottleneck(BottleneckStub<B>),
    Basic(BasicBlockStub<B>),
}

impl<B: Backend> ResidualBlockStubRecord<B> {
    pub fn copy_weights(
        self,
        target: ResidualBlock<B>,
    ) -> anyhow::Result<ResidualBlock<B>> {
        use ResidualBlock as T;
        use ResidualBlockStubRecord as S;
        match (self, target) {
            (S::Basic(stub), T::Basic(block)) => Ok(stub.copy_weights(block)?.into()),
            (S::Bottleneck(stub), T::Bottleneck(block)) => Ok(stub.copy_weights(block)?.into()),
            (S::Basic(_), T::Bottleneck(_)) => {
                bail!("Cannot apply basic block weights to a bottleneck block")
            }
            (S::Bottleneck(_), T::Basic(_)) => {
                bail!("Cannot apply bottleneck block weights to a basic block")
            }
        }
    }
}

pub fn copy_downsample_weights<B: Backend>(
    downsample: Option<DownsampleStubRecord<B>>,
    target: Option<ConvDownsample<B>>,
) -> anyhow::Result<Option<ConvDownsample<B>>> {
    match (downsample, target) {
        (Some(stub), Some(target)) => Ok(Some(stub.copy_weights(target)?)),
        (None, None) => Ok(None),
        (None, Some(_)) => bail!("model has a downsample the weights lack"),
        (Some(_), None) => bail!("weights have a downsample the model lacks"),
    }
}

#[derive(Module, Debug)]
pub struct DownsampleStub<B: Backend> {
    pub conv: Conv2d<B>,
    pub bn: BatchNorm<B, 2>,
}

impl<B: Backend> DownsampleStubRecord<B> {
    pub fn copy_weights(
        self,
        target: ConvDownsample<B>,
    ) -> anyhow::Result<ConvDownsample<B>> {
        Ok(ConvDownsample {
            conv_norm: copy_conv_norm_weights(self.conv, self.bn, target.conv_norm)?,
        })
    }
}

fn load_batch_norm<B: Backend>(
    bn: BatchNormRecord<B, 2>,
    target: Normalization<B>,
) -> anyhow::Result<Normalization<B>> {
    match target {
        Normalization::Batch(norm) => Ok(norm.load_record(bn).into()),
        other => bail!("BatchNorm weights cannot be applied to {other:?}"),
    }
}

pub fn copy_cna_weights<B: Backend>(
    conv: Conv2dRecord<B>,
    bn: BatchNormRecord<B, 2>,
    target: CNA2d<B>,
) -> anyhow::Result<CNA2d<B>> {
    Ok(CNA2d {
        conv: target.conv.load_record(conv),
        norm: load_batch_norm(bn, target.norm)?,
        act: target.act,
    })
}

pub fn copy_conv_norm_weights<B: Backend>(
    conv: Conv2dRecord<B>,
    bn: BatchNormRecord<B, 2>,
    target: ConvNorm2d<B>,
) -> anyhow::Result<ConvNorm2d<B>> {
    Ok(ConvNorm2d {
        conv: target.conv.load_record(conv),
        norm: load_batch_norm(bn, target.norm)?,
    })
}

#[derive(Module, Debug)]
pub struct BasicBlockStub<B: Backend> {
    pub conv1: Conv2d<B>,
    pub bn1: BatchNorm<B, 2>,
    pub conv2: Conv2d<B>,
    pub bn2: BatchNorm<B, 2>,
    pub downsample: Option<DownsampleStub<B>>,
}

impl<B: Backend> BasicBlockStubRecord<B> {
    pub fn copy_weights(
        self,
        target: BasicBlock<B>,
    ) -> anyhow::Result<BasicBlock<B>> {
        Ok(BasicBlock {
            cna1: copy_cna_weights(self.conv1, self.bn1, target.cna1)?,
            cna2: copy_cna_weights(self.conv2, self.bn2, target.cna2)?,
            downsample: copy_downsample_weights(self.downsample, target.downsample)?,
        })
    }
}

#[derive(Module, Debug)]
pub struct BottleneckStub<B: Backend> {
    pub conv1: Conv2d<B>,
    pub bn1: BatchNorm<B, 2>,
    pub conv2: Conv2d<B>,
    pub bn2: BatchNorm<B, 2>,
    pub conv3: Conv2d<B>,
    pub bn3: BatchNorm<B, 2>,
    pub downsample: Option<DownsampleStub<B>>,
}

impl<B: Backend> BottleneckStubRecord<B> {
    pub fn copy_weights(
        self,
        target: BottleneckBlock<B>,
    ) -> anyhow::Result<BottleneckBlock<B>> {
        Ok(BottleneckBlock {
            cna1: copy_cna_weights(self.conv1, self.bn1, target.cna1)?,
            cna2: copy_cna_weights(self.conv2, self.bn2, target.cna2)?,
            cna3: copy_cna_weights(self.conv3, self.bn3, target.cna3)?,
            downsample: copy_downsample_weights(self.downsample, target.downsample)?,
            ..target
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compat::normalization_wrapper::NormalizationConfig;
    use crate::models::resnet::basic_block::BasicBlockConfig;
    use crate::models::resnet::resnet_model::ResNetBackboneConfig;
    use burn::backend::NdArray;

    type B = NdArray<f32>;

    #[test]
    fn test_copy_basic_block_weights() {
        let device = Default::default();

        let source: BasicBlock<B> = BasicBlockConfig::new(4, 8).with_stride(2).init(&device);
        let target: BasicBlock<B> = BasicBlockConfig::new(4, 8).with_stride(2).init(&device);

        let unwrap_bn = |n: &Normalization<B>| match n {
            Normalization::Batch(bn) => bn.clone().into_record(),
            _ => unreachable!(),
        };

        let downsample = source.downsample.as_ref().unwrap();
        let stub = BasicBlockStubRecord {
            conv1: source.cna1.conv.clone().into_record(),
            bn1: unwrap_bn(&source.cna1.norm),
            conv2: source.cna2.conv.clone().into_record(),
            bn2: unwrap_bn(&source.cna2.norm),
            downsample: Some(DownsampleStubRecord {
                conv: downsample.conv_norm.conv.clone().into_record(),
                bn: unwrap_bn(&downsample.conv_norm.norm),
            }),
        };

        let copied = stub.copy_weights(target).unwrap();
        copied
            .cna1
            .conv
            .weight
            .to_data()
            .assert_eq(&source.cna1.conv.weight.to_data(), true);
        copied
            .downsample
            .unwrap()
            .conv_norm
            .conv
            .weight
            .to_data()
            .assert_eq(&downsample.conv_norm.conv.weight.to_data(), true);
    }

    #[test]
    fn test_downsample_mismatch_is_error() {
        let device = Default::default();
        let target: BasicBlock<B> = BasicBlockConfig::new(4, 8).init(&device);
        let source: BasicBlock<B> = BasicBlockConfig::new(8, 8).init(&device);
        assert!(source.downsample.is_none());

        assert!(copy_downsample_weights::<B>(None, target.downsample).is_err());
    }

    #[test]
    fn test_instance_norm_target_is_error() {
        let device = Default::default();
        let source: ResNetBackbone<B> = ResNetBackboneConfig::new([1, 1, 1, 1]).init(&device);
        let target: ResNetBackbone<B> = ResNetBackboneConfig::new([1, 1, 1, 1])
            .with_normalization(NormalizationConfig::instance())
            .init(&device);

        let bn = match &source.stem.norm {
            Normalization::Batch(bn) => bn.clone().into_record(),
            _ => unreachable!(),
        };
        let result = copy_cna_weights(source.stem.conv.clone().into_record(), bn, target.stem);
        assert!(result.is_err());
    }
}
