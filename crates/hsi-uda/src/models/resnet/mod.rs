//! # `ResNet`
//!
//! Headless `ResNet` backbones, built from [`basic_block`] and [`bottleneck`]
//! units grouped into [`layer_block`] stages.
//!
//! Well-known configs and torchvision weights live in [`pretrained`].

pub mod basic_block;
pub mod bottleneck;
pub mod downsample;
pub mod layer_block;
pub mod pretrained;
pub mod residual_block;
pub mod resnet_io;
pub mod resnet_model;
pub mod util;

pub use resnet_model::{ResNetBackbone, ResNetBackboneConfig, ResNetBackboneMeta};
