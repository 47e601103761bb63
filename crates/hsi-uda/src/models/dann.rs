//! # `DaNN` Backbone
//!
//! A single hidden layer over the flattened input:
//! ``flatten -> linear -> dropout -> relu``.

use bimm_contracts::assert_shape_contract_periodically;
use burn::config::Config;
use burn::module::Module;
use burn::nn::{Dropout, DropoutConfig, Linear, LinearConfig, Relu};
use burn::prelude::{Backend, Tensor};

/// [`DaNNBackbone`] configuration.
#[derive(Config, Debug)]
pub struct DaNNBackboneConfig {
    /// Flattened input width.
    #[config(default = "224 * 224 * 3")]
    pub n_input: usize,

    /// Hidden (output) width.
    #[config(default = 256)]
    pub n_hidden: usize,

    /// Dropout after the hidden layer.
    #[config(default = 0.5)]
    pub dropout: f64,
}

impl DaNNBackboneConfig {
    /// Initialize a [`DaNNBackbone`].
    pub fn init<B: Backend>(
        &self,
        device: &B::Device,
    ) -> DaNNBackbone<B> {
        DaNNBackbone {
            layer_input: LinearConfig::new(self.n_input, self.n_hidden).init(device),
            dropout: DropoutConfig::new(self.dropout).init(),
            act: Relu::new(),
        }
    }
}

/// Shallow MLP backbone.
#[derive(Module, Debug)]
pub struct DaNNBackbone<B: Backend> {
    /// Input projection.
    pub layer_input: Linear<B>,

    /// Hidden dropout.
    pub dropout: Dropout,

    /// Activation.
    pub act: Relu,
}

impl<B: Backend> DaNNBackbone<B> {
    /// Flattened input width.
    pub fn n_input(&self) -> usize {
        self.layer_input.weight.dims()[0]
    }

    /// The width of the output feature vector.
    pub fn output_num(&self) -> usize {
        self.layer_input.weight.dims()[1]
    }

    /// Compute the feature vector.
    ///
    /// # Arguments
    ///
    /// - `input`: ``[batch, channels, height, width]`` with
    ///   ``channels * height * width == n_input``.
    ///
    /// # Returns
    ///
    /// A ``[batch, output_num]`` tensor.
    ///
    /// # Panics
    ///
    /// If the flattened input width is not `n_input`.
    pub fn forward_features(
        &self,
        input: Tensor<B, 4>,
    ) -> Tensor<B, 2> {
        let x: Tensor<B, 2> = input.flatten(1, 3);
        let [_, width] = x.dims();
        assert_eq!(
            width,
            self.n_input(),
            "DaNN expects {} flattened inputs, got {width}",
            self.n_input()
        );

        let x = self.layer_input.forward(x);
        let x = self.dropout.forward(x);
        let x = self.act.forward(x);

        assert_shape_contract_periodically!(
            ["batch", "features"],
            &x,
            &[("features", self.output_num())]
        );

        x
    }
}
