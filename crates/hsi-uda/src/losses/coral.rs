//! # CORAL
//!
//! Deep correlation alignment:
//! ``sum((C_s - C_t)^2) / (4 d^2)`` over the unbiased feature covariances.

use burn::prelude::{Backend, Tensor};

/// Unbiased covariance of the rows of `x`.
///
/// Maps ``[n, d]`` to ``[d, d]``.
///
/// # Panics
///
/// If ``n < 2``.
pub fn covariance<B: Backend>(x: Tensor<B, 2>) -> Tensor<B, 2> {
    let [n, _] = x.dims();
    assert!(n >= 2, "covariance needs at least 2 samples, got {n}");

    let centered = x.clone() - x.mean_dim(0);
    centered
        .clone()
        .transpose()
        .matmul(centered)
        .div_scalar((n - 1) as f64)
}

/// CORAL loss between two feature batches.
///
/// # Arguments
///
/// - `source`: ``[n_source, d]``.
/// - `target`: ``[n_target, d]``.
///
/// # Returns
///
/// A scalar ``[1]`` tensor.
///
/// # Panics
///
/// If either domain has fewer than 2 samples, or the widths differ.
pub fn coral_loss<B: Backend>(
    source: Tensor<B, 2>,
    target: Tensor<B, 2>,
) -> Tensor<B, 1> {
    let [_, d] = source.dims();
    let [_, dt] = target.dims();
    assert_eq!(d, dt, "CORAL feature widths differ: {d} vs {dt}");

    let delta = covariance(source) - covariance(target);
    delta.powf_scalar(2.0).sum().div_scalar((4 * d * d) as f64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{assert_tensor_close, to_vec};
    use burn::backend::NdArray;
    use burn::tensor::{Distribution, TensorData};

    type B = NdArray<f32>;

    #[test]
    fn test_covariance() {
        let device = Default::default();
        let x: Tensor<B, 2> = Tensor::from_data(
            TensorData::new(vec![1.0f32, 2.0, 3.0, 6.0, 5.0, 10.0], [3, 2]),
            &device,
        );
        // col0: [1, 3, 5], col1: [2, 6, 10] = 2 * col0
        assert_tensor_close(covariance(x), &[4.0, 8.0, 8.0, 16.0], 1e-5);
    }

    #[test]
    fn test_coral_identical_is_zero() {
        let device = Default::default();
        let x: Tensor<B, 2> = Tensor::random([5, 3], Distribution::Default, &device);
        assert_tensor_close(coral_loss(x.clone(), x), &[0.0], 1e-6);
    }

    #[test]
    fn test_coral_value() {
        let device = Default::default();
        let source: Tensor<B, 2> =
            Tensor::from_data(TensorData::new(vec![0.0f32, 2.0], [2, 1]), &device);
        let target: Tensor<B, 2> =
            Tensor::from_data(TensorData::new(vec![0.0f32, 0.0], [2, 1]), &device);

        // C_s = 2, C_t = 0; 4 / 4.
        assert_tensor_close(coral_loss(source, target), &[1.0], 1e-6);
    }

    #[test]
    fn test_coral_shift_invariant() {
        let device = Default::default();
        let x: Tensor<B, 2> = Tensor::random([6, 2], Distribution::Default, &device);
        let loss = to_vec(coral_loss(x.clone(), x.add_scalar(3.0)))[0];
        assert!(loss.abs() < 1e-5, "{loss}");
    }

    #[test]
    #[should_panic(expected = "at least 2 samples")]
    fn test_coral_single_sample() {
        let device = Default::default();
        let x: Tensor<B, 2> = Tensor::ones([1, 2], &device);
        coral_loss(x.clone(), x);
    }
}
