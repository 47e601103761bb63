//! # Transfer Losses
//!
//! Domain-discrepancy losses, selected by a string key.
//!
//! | key          | loss                       |
//! |--------------|----------------------------|
//! | ``bnm``      | [`bnm::bnm_loss`]          |
//! | ``mmd``      | [`mmd::mmd_rbf_loss`]      |
//! | ``mmd_linear`` | [`mmd::mmd_linear_loss`] |
//! | ``coral``    | [`coral::coral_loss`]      |
//! | ``none``     | zero                       |

pub mod bnm;
pub mod coral;
pub mod mmd;

use anyhow::bail;
use burn::config::Config;
use burn::prelude::{Backend, Tensor};
use std::fmt;
use std::str::FromStr;

/// A parsed transfer loss key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferLossKind {
    /// Batch nuclear-norm maximization over the target predictions.
    Bnm,

    /// Multi-kernel Gaussian MMD.
    Mmd,

    /// Linear MMD.
    MmdLinear,

    /// Correlation alignment.
    Coral,

    /// No transfer term.
    None,
}

impl TransferLossKind {
    /// All known kinds.
    pub const ALL: [TransferLossKind; 5] = [
        Self::Bnm,
        Self::Mmd,
        Self::MmdLinear,
        Self::Coral,
        Self::None,
    ];

    /// The string key.
    pub fn key(&self) -> &'static str {
        match self {
            Self::Bnm => "bnm",
            Self::Mmd => "mmd",
            Self::MmdLinear => "mmd_linear",
            Self::Coral => "coral",
            Self::None => "none",
        }
    }

    /// Does this loss consume class probabilities rather than features?
    pub fn uses_predictions(&self) -> bool {
        matches!(self, Self::Bnm)
    }
}

impl FromStr for TransferLossKind {
    type Err = anyhow::Error;

    fn from_str(key: &str) -> Result<Self, Self::Err> {
        let lower = key.to_lowercase();
        match Self::ALL.iter().find(|kind| kind.key() == lower) {
            Some(kind) => Ok(*kind),
            None => bail!(
                "unknown transfer loss {key:?}; expected one of {:?}",
                Self::ALL.map(|kind| kind.key())
            ),
        }
    }
}

impl fmt::Display for TransferLossKind {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        write!(f, "{}", self.key())
    }
}

/// [`TransferLoss`] configuration.
#[derive(Config, Debug)]
pub struct TransferLossConfig {
    /// Loss key; see [`TransferLossKind`].
    pub loss_type: String,

    /// Ratio between neighbouring MMD kernel bandwidths.
    #[config(default = 2.0)]
    pub kernel_mul: f64,

    /// Number of MMD kernels.
    #[config(default = 5)]
    pub kernel_num: usize,
}

impl TransferLossConfig {
    /// Parse the loss key and build the loss.
    pub fn init(&self) -> anyhow::Result<TransferLoss> {
        let kind: TransferLossKind = self.loss_type.parse()?;
        if kind == TransferLossKind::Mmd && self.kernel_num == 0 {
            bail!("mmd needs at least one kernel");
        }
        Ok(TransferLoss {
            kind,
            kernel_mul: self.kernel_mul,
            kernel_num: self.kernel_num,
        })
    }
}

/// A configured transfer loss.
#[derive(Debug, Clone, PartialEq)]
pub struct TransferLoss {
    /// The loss kind.
    pub kind: TransferLossKind,

    /// MMD bandwidth ratio.
    pub kernel_mul: f64,

    /// MMD kernel count.
    pub kernel_num: usize,
}

impl TransferLoss {
    /// Compute the loss.
    ///
    /// # Arguments
    ///
    /// - `source`: ``[n_source, d]`` source features.
    /// - `target`: ``[n_target, d]`` target features; or, for
    ///   [`TransferLossKind::Bnm`], ``[n_target, classes]`` target probabilities.
    ///
    /// # Returns
    ///
    /// A scalar ``[1]`` tensor.
    pub fn forward<B: Backend>(
        &self,
        source: Tensor<B, 2>,
        target: Tensor<B, 2>,
    ) -> Tensor<B, 1> {
        match self.kind {
            TransferLossKind::Bnm => bnm::bnm_loss(target),
            TransferLossKind::Mmd => {
                mmd::mmd_rbf_loss(source, target, self.kernel_mul, self.kernel_num)
            }
            TransferLossKind::MmdLinear => mmd::mmd_linear_loss(source, target),
            TransferLossKind::Coral => coral::coral_loss(source, target),
            TransferLossKind::None => Tensor::zeros([1], &source.device()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{assert_tensor_close, to_vec};
    use burn::backend::NdArray;
    use burn::tensor::Distribution;

    type B = NdArray<f32>;

    #[test]
    fn test_parse_kind() {
        for kind in TransferLossKind::ALL {
            assert_eq!(kind.to_string().parse::<TransferLossKind>().unwrap(), kind);
        }
        assert_eq!(
            "MMD_Linear".parse::<TransferLossKind>().unwrap(),
            TransferLossKind::MmdLinear
        );
    }

    #[test]
    fn test_unknown_key_is_error() {
        let err = TransferLossConfig::new("adv".to_string())
            .init()
            .unwrap_err();
        assert!(err.to_string().contains("adv"), "{err}");
        assert!("".parse::<TransferLossKind>().is_err());
    }

    #[test]
    fn test_config_defaults() {
        let config = TransferLossConfig::new("mmd".to_string());
        assert_eq!(config.kernel_mul, 2.0);
        assert_eq!(config.kernel_num, 5);

        assert!(config.with_kernel_num(0).init().is_err());
    }

    #[test]
    fn test_forward_dispatch() {
        let device = Default::default();
        let x: Tensor<B, 2> = Tensor::random([4, 3], Distribution::Default, &device);

        for key in ["mmd", "mmd_linear", "coral"] {
            let loss = TransferLossConfig::new(key.to_string()).init().unwrap();
            let value = to_vec(loss.forward(x.clone(), x.clone()))[0];
            assert!(value.abs() < 1e-5, "{key}: {value}");
        }

        let none = TransferLossConfig::new("none".to_string()).init().unwrap();
        assert_tensor_close(none.forward(x.clone(), x.add_scalar(5.0)), &[0.0], 1e-9);
    }

    #[test]
    fn test_bnm_uses_target_only() {
        let device = Default::default();
        let source: Tensor<B, 2> = Tensor::zeros([2, 7], &device);
        let target: Tensor<B, 2> = Tensor::from_data([[1.0f32, 0.0], [0.0, 1.0]], &device);

        let loss = TransferLossConfig::new("bnm".to_string()).init().unwrap();
        assert!(loss.kind.uses_predictions());
        assert_tensor_close(loss.forward(source, target), &[-1.0], 1e-6);
    }
}
