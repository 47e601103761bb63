//! # `ResNet` Utilities
use burn::nn::Initializer;

/// Kaiming-normal, fan-out initializer used for convolutions feeding a ReLU.
///
/// Matches torchvision's ``kaiming_normal_(mode="fan_out", nonlinearity="relu")``.
pub const CONV_INTO_RELU_INITIALIZER: Initializer = Initializer::KaimingNormal {
    gain: std::f64::consts::SQRT_2,
    fan_out_only: true,
};

/// Expand a scalar into a square 2d parameter.
#[inline(always)]
pub fn scalar_to_array(value: usize) -> [usize; 2] {
    [value, value]
}

/// Output extent of a padded, strided, dilated window along one axis.
///
/// ``floor((input + 2 * padding - dilation * (kernel - 1) - 1) / stride) + 1``
///
/// # Panics
///
/// If the padded input is smaller than the dilated kernel.
pub fn window_output_size(
    input: usize,
    kernel: usize,
    stride: usize,
    padding: usize,
    dilation: usize,
) -> usize {
    let span = dilation * (kernel - 1) + 1;
    let padded = input + 2 * padding;
    assert!(
        padded >= span,
        "window {span} does not fit in padded extent {padded}"
    );
    (padded - span) / stride + 1
}
