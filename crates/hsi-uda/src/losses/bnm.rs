//! # Batch Nuclear-norm Maximization
//!
//! ``loss = -mean(singular_values(target))``
//!
//! The singular vectors are computed on the host with `nalgebra` and held
//! constant; the differentiable value is ``-<A, U V^T> / rank``, which equals
//! the loss and has the nuclear-norm gradient ``-U V^T / rank``.

use burn::prelude::{Backend, Tensor};
use burn::tensor::TensorData;
use nalgebra::DMatrix;

/// The polar factor ``U V^T`` of a thin SVD of a row-major matrix.
fn polar_factor(
    data: &[f64],
    rows: usize,
    cols: usize,
) -> Vec<f32> {
    let svd = DMatrix::from_row_slice(rows, cols, data).svd(true, true);
    let polar = svd
        .u
        .zip(svd.v_t)
        .map(|(u, v_t)| u * v_t)
        .unwrap_or_else(|| DMatrix::zeros(rows, cols));

    (0..rows)
        .flat_map(|i| (0..cols).map(move |j| (i, j)))
        .map(|(i, j)| polar[(i, j)] as f32)
        .collect()
}

/// BNM loss over a ``[batch, classes]`` prediction matrix.
///
/// # Returns
///
/// A scalar ``[1]`` tensor.
///
/// # Panics
///
/// If the input is empty.
pub fn bnm_loss<B: Backend>(target: Tensor<B, 2>) -> Tensor<B, 1> {
    let [rows, cols] = target.dims();
    assert!(rows > 0 && cols > 0, "BNM needs a non-empty matrix");

    let data: Vec<f64> = target
        .to_data()
        .convert::<f64>()
        .to_vec::<f64>()
        .unwrap_or_default();
    let rank = rows.min(cols) as f64;

    let polar = polar_factor(&data, rows, cols);
    let polar = Tensor::<B, 2>::from_data(TensorData::new(polar, [rows, cols]), &target.device());

    (target * polar).sum().div_scalar(-rank)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{assert_tensor_close, to_vec};
    use burn::backend::{Autodiff, NdArray};

    #[test]
    fn test_bnm_value() {
        type B = NdArray<f32>;
        let device = Default::default();

        let target: Tensor<B, 2> =
            Tensor::from_data(TensorData::new(vec![2.0f32, 0.0, 1.0, 2.0], [2, 2]), &device);
        let root = 65f32.sqrt();
        let s0 = ((9.0 + root) / 2.0).sqrt();
        let s1 = ((9.0 - root) / 2.0).sqrt();

        assert_tensor_close(bnm_loss(target), &[-(s0 + s1) / 2.0], 1e-5);
    }

    #[test]
    fn test_bnm_rectangular_probabilities() {
        type B = NdArray<f32>;
        let device = Default::default();

        // Confident, diverse predictions: singular values [1, 1].
        let target: Tensor<B, 2> = Tensor::from_data(
            TensorData::new(vec![1.0f32, 0.0, 0.0, 1.0, 0.0, 0.0], [3, 2]),
            &device,
        );
        assert_tensor_close(bnm_loss(target), &[-1.0], 1e-6);
    }

    #[test]
    fn test_bnm_rank_deficient() {
        type B = NdArray<f32>;
        let device = Default::default();

        // Singular values [2, 0].
        let target: Tensor<B, 2> =
            Tensor::from_data(TensorData::new(vec![1.0f32, 1.0, 1.0, 1.0], [2, 2]), &device);
        assert_tensor_close(bnm_loss(target), &[-1.0], 1e-5);
    }

    #[test]
    fn test_polar_factor_of_orthogonal() {
        let polar = polar_factor(&[0.0, 1.0, 1.0, 0.0], 2, 2);
        for (p, e) in polar.iter().zip([0.0f32, 1.0, 1.0, 0.0]) {
            assert!((p - e).abs() < 1e-6, "{polar:?}");
        }
    }

    #[test]
    fn test_bnm_gradient_is_polar() {
        type B = Autodiff<NdArray<f32>>;
        let device = Default::default();

        let target: Tensor<B, 2> =
            Tensor::from_data(TensorData::new(vec![0.0f32, 2.0, 3.0, 0.0], [2, 2]), &device)
                .require_grad();
        let loss = bnm_loss(target.clone());
        let grads = loss.backward();
        let grad = target.grad(&grads).unwrap();

        // -U V^T / rank
        let grad = to_vec(grad);
        let expected = [0.0, -0.5, -0.5, 0.0];
        for (g, e) in grad.iter().zip(expected.iter()) {
            assert!((g - e).abs() < 1e-6, "{grad:?}");
        }
    }
}
