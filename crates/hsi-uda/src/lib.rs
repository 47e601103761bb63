#![warn(missing_docs)]
//!# hsi-uda - Unsupervised Domain Adaptation for Hyperspectral Images
//!
//! ## Notable Components
//!
//! * [`cache`] - pretrained weight cache.
//! * [`compat`] - compat code, ported or planned for an upcoming release of ``burn``.
//!   * [`compat::normalization_wrapper::Normalization`] - norm layer abstraction wrapper.
//! * [`layers`] - reusable neural network modules.
//!   * [`layers::attention::simam`] - parameter-free `SimAM` attention.
//!   * [`layers::blocks`] - ``Conv2d + Norm (+ Act)`` blocks.
//! * [`models`] - backbones and the transfer network.
//!   * [`models::resnet`] - `ResNet`
//!   * [`models::rsp_resnet`] - style-removal `ResNet`.
//!   * [`models::alexnet`] - `AlexNet`.
//!   * [`models::dann`] - `DaNN` MLP.
//!   * [`models::backbone`] - backbone selection by name.
//!   * [`models::transfer_net`] - backbone + classifier + transfer loss.
//! * [`losses`] - transfer losses: BNM, MMD, CORAL.
//! * [`data`] - ``.mat`` hyperspectral datasets and (infinite) data loaders.

/// Test-only macro import.
#[cfg(test)]
#[allow(unused_imports)]
#[macro_use]
extern crate hamcrest;

pub mod compat;

#[cfg(test)]
pub(crate) mod testing;

pub mod layers;

pub mod cache;
pub mod data;
pub mod losses;
pub mod models;
