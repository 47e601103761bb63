//! # `SimAM` - Simple, Parameter-Free Attention Module
//!
//! Every activation gets an energy based on how far it sits from its
//! channel's spatial mean:
//!
//! ```text
//! n      = height * width - 1
//! d      = (x - mean_hw(x))^2
//! energy = d / (4 * (sum_hw(d) / n + e_lambda)) + 0.5
//! out    = x * sigmoid(energy)
//! ```
//!
//! [`SimAm`] has no weights, so it records nothing into a module record.

use burn::config::Config;
use burn::module::Module;
use burn::prelude::{Backend, Tensor};
use burn::tensor::activation::sigmoid;

/// [`SimAm`] Config.
#[derive(Config, Debug)]
pub struct SimAmConfig {
    /// Regularizer added to the per-channel variance.
    #[config(default = 1e-4)]
    pub e_lambda: f64,
}

impl SimAmConfig {
    /// Initialize a [`SimAm`] module.
    pub fn init(&self) -> SimAm {
        SimAm {
            e_lambda: self.e_lambda,
        }
    }
}

/// The result of a [`SimAm`] forward pass.
#[derive(Debug, Clone)]
pub struct SimAmOutput<B: Backend> {
    /// ``input * attention``.
    pub output: Tensor<B, 4>,

    /// The per-activation energy.
    pub energy: Tensor<B, 4>,

    /// ``sigmoid(energy)``.
    pub attention: Tensor<B, 4>,
}

/// Parameter-free attention.
#[derive(Module, Clone, Debug)]
pub struct SimAm {
    /// Regularizer added to the per-channel variance.
    pub e_lambda: f64,
}

impl Default for SimAm {
    fn default() -> Self {
        SimAmConfig::new().init()
    }
}

impl SimAm {
    /// Forward pass.
    ///
    /// # Arguments
    ///
    /// - `input`: ``[batch, channels, height, width]``, with `height * width > 1`.
    ///
    /// # Returns
    ///
    /// A [`SimAmOutput`]; every tensor has the input shape.
    pub fn forward<B: Backend>(
        &self,
        input: Tensor<B, 4>,
    ) -> SimAmOutput<B> {
        let [_, _, height, width] = input.dims();
        let n = height * width;
        assert!(
            n > 1,
            "SimAM needs more than one spatial position, got {height}x{width}"
        );
        let n = (n - 1) as f64;

        let mean = input.clone().mean_dim(3).mean_dim(2);
        let d = (input.clone() - mean).powf_scalar(2.0);

        let variance = d.clone().sum_dim(3).sum_dim(2).div_scalar(n);
        let denominator = variance.add_scalar(self.e_lambda).mul_scalar(4.0);

        let energy = (d / denominator).add_scalar(0.5);
        let attention = sigmoid(energy.clone());

        SimAmOutput {
            output: input * attention.clone(),
            energy,
            attention,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::assert_tensor_close;
    use burn::backend::NdArray;
    use burn::tensor::{Distribution, TensorData};

    type B = NdArray<f32>;

    #[test]
    fn test_constant_map_scales_by_half_energy() {
        let device = Default::default();
        let input: Tensor<B, 4> = Tensor::ones([2, 3, 4, 4], &device).mul_scalar(3.0);

        let result = SimAm::default().forward(input);

        let scale = 1.0 / (1.0 + (-0.5f32).exp());
        assert_tensor_close(result.energy, &[0.5; 2 * 3 * 4 * 4], 1e-5);
        assert_tensor_close(result.output, &[3.0 * scale; 2 * 3 * 4 * 4], 1e-5);
    }

    #[test]
    fn test_matches_reference() {
        let device = Default::default();
        let values = [1.0f32, 2.0, 4.0, 7.0];
        let input: Tensor<B, 4> =
            Tensor::from_data(TensorData::new(values.to_vec(), [1, 1, 2, 2]), &device);

        let e_lambda = 1e-4f32;
        let mean = values.iter().sum::<f32>() / 4.0;
        let d: Vec<f32> = values.iter().map(|v| (v - mean).powi(2)).collect();
        let var = d.iter().sum::<f32>() / 3.0;
        let expected: Vec<f32> = values
            .iter()
            .zip(d.iter())
            .map(|(v, d)| {
                let energy = d / (4.0 * (var + e_lambda)) + 0.5;
                v / (1.0 + (-energy).exp())
            })
            .collect();

        let result = SimAm::default().forward(input);
        assert_tensor_close(result.output, &expected, 1e-4);
    }

    #[test]
    fn test_shapes() {
        let device = Default::default();
        let input: Tensor<B, 4> = Tensor::random([2, 5, 3, 6], Distribution::Default, &device);
        let result = SimAm::default().forward(input);
        assert_eq!(result.output.dims(), [2, 5, 3, 6]);
        assert_eq!(result.energy.dims(), [2, 5, 3, 6]);
        assert_eq!(result.attention.dims(), [2, 5, 3, 6]);
    }

    #[test]
    #[should_panic(expected = "more than one spatial position")]
    fn test_single_pixel_panics() {
        let device = Default::default();
        let input: Tensor<B, 4> = Tensor::ones([1, 2, 1, 1], &device);
        SimAm::default().forward(input);
    }
}
