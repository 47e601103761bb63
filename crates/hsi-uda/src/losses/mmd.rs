//! # Maximum Mean Discrepancy
//!
//! * [`mmd_rbf_loss`] - multi-kernel Gaussian MMD; the kernel bandwidths are
//!   geometric around the mean pairwise squared distance of the joint batch.
//! * [`mmd_linear_loss`] - squared distance between the domain means.

use burn::prelude::{Backend, Tensor};
use burn::tensor::ElementConversion;

/// Pairwise squared euclidean distances between the rows of `x`.
///
/// Maps ``[n, d]`` to ``[n, n]``.
pub fn pairwise_sq_distances<B: Backend>(x: Tensor<B, 2>) -> Tensor<B, 2> {
    let sq = x.clone().powf_scalar(2.0).sum_dim(1);
    let gram = x.clone().matmul(x.transpose());
    (sq.clone() + sq.transpose() - gram.mul_scalar(2.0)).clamp_min(0.0)
}

/// Sum of `kernel_num` Gaussian kernels over the joint ``[source; target]`` batch.
///
/// # Returns
///
/// A ``[n_source + n_target, n_source + n_target]`` kernel matrix.
pub fn gaussian_kernel<B: Backend>(
    source: Tensor<B, 2>,
    target: Tensor<B, 2>,
    kernel_mul: f64,
    kernel_num: usize,
) -> Tensor<B, 2> {
    let total = Tensor::cat(vec![source, target], 0);
    let [n, _] = total.dims();
    let distances = pairwise_sq_distances(total);

    let pairs = (n * n - n).max(1) as f64;
    let mean_distance: f64 = distances.clone().detach().sum().into_scalar().elem();
    let base = (mean_distance / pairs).max(1e-12) / kernel_mul.powi((kernel_num / 2) as i32);

    (0..kernel_num)
        .map(|i| {
            let bandwidth = base * kernel_mul.powi(i as i32);
            distances.clone().div_scalar(-bandwidth).exp()
        })
        .reduce(|acc, k| acc + k)
        .unwrap_or_else(|| distances.zeros_like())
}

/// Multi-kernel Gaussian MMD.
///
/// # Arguments
///
/// - `source`: ``[n_source, d]``.
/// - `target`: ``[n_target, d]``.
/// - `kernel_mul`: ratio between neighbouring bandwidths.
/// - `kernel_num`: number of kernels.
///
/// # Returns
///
/// A scalar ``[1]`` tensor.
pub fn mmd_rbf_loss<B: Backend>(
    source: Tensor<B, 2>,
    target: Tensor<B, 2>,
    kernel_mul: f64,
    kernel_num: usize,
) -> Tensor<B, 1> {
    let [ns, _] = source.dims();
    let [nt, _] = target.dims();
    let n = ns + nt;
    let kernels = gaussian_kernel(source, target, kernel_mul, kernel_num);

    let xx = kernels.clone().slice([0..ns, 0..ns]).mean();
    let yy = kernels.clone().slice([ns..n, ns..n]).mean();
    let xy = kernels.clone().slice([0..ns, ns..n]).mean();
    let yx = kernels.slice([ns..n, 0..ns]).mean();

    xx + yy - xy - yx
}

/// Linear MMD: ``|mean(source) - mean(target)|^2``.
///
/// # Returns
///
/// A scalar ``[1]`` tensor.
pub fn mmd_linear_loss<B: Backend>(
    source: Tensor<B, 2>,
    target: Tensor<B, 2>,
) -> Tensor<B, 1> {
    let delta = source.mean_dim(0) - target.mean_dim(0);
    delta.powf_scalar(2.0).sum()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{assert_tensor_close, to_vec};
    use burn::backend::NdArray;
    use burn::tensor::{Distribution, TensorData};

    type B = NdArray<f32>;

    #[test]
    fn test_pairwise_sq_distances() {
        let device = Default::default();
        let x: Tensor<B, 2> =
            Tensor::from_data(TensorData::new(vec![0.0f32, 0.0, 3.0, 4.0], [2, 2]), &device);
        assert_tensor_close(pairwise_sq_distances(x), &[0.0, 25.0, 25.0, 0.0], 1e-4);
    }

    #[test]
    fn test_mmd_identical_batches() {
        let device = Default::default();
        let x: Tensor<B, 2> = Tensor::random([6, 4], Distribution::Default, &device);

        let loss = to_vec(mmd_rbf_loss(x.clone(), x, 2.0, 5))[0];
        assert!(loss.abs() < 1e-5, "{loss}");
    }

    #[test]
    fn test_mmd_separated_batches() {
        let device = Default::default();
        let source: Tensor<B, 2> = Tensor::random([6, 3], Distribution::Default, &device);
        let target = source.clone().add_scalar(10.0);

        let loss = to_vec(mmd_rbf_loss(source, target, 2.0, 5))[0];
        assert!(loss > 0.5, "{loss}");
    }

    #[test]
    fn test_mmd_linear() {
        let device = Default::default();
        let source: Tensor<B, 2> =
            Tensor::from_data(TensorData::new(vec![0.0f32, 0.0, 2.0, 2.0], [2, 2]), &device);
        let target: Tensor<B, 2> =
            Tensor::from_data(TensorData::new(vec![1.0f32, 4.0], [1, 2]), &device);

        // means: [1, 1] vs [1, 4]
        assert_tensor_close(mmd_linear_loss(source, target), &[9.0], 1e-5);
    }
}
