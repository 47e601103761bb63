//! # Transfer Network
//!
//! ``backbone -> [bottleneck] -> classifier``, trained on a labeled source
//! batch and an unlabeled target batch:
//!
//! ```text
//! loss = cross_entropy(classifier(source), labels)
//!      + weight * transfer_loss(source_features, target_features)
//! ```
//!
//! For BNM the transfer loss sees ``softmax(classifier(target))`` instead of
//! the target features.

use crate::cache::disk::DiskCacheConfig;
use crate::losses::{TransferLoss, TransferLossConfig};
use crate::models::backbone::{Backbone, BackboneConfig};
use burn::config::Config;
use burn::module::{Ignored, Module};
use burn::nn::loss::CrossEntropyLossConfig;
use burn::nn::{Linear, LinearConfig, Relu};
use burn::prelude::{Backend, Int, Tensor};
use burn::tensor::activation::softmax;

/// [`TransferNet`] configuration.
#[derive(Config, Debug)]
pub struct TransferNetConfig {
    /// Number of classes.
    pub num_class: usize,

    /// Feature extractor.
    pub backbone: BackboneConfig,

    /// Domain-discrepancy loss.
    pub transfer_loss: TransferLossConfig,

    /// Insert a ``linear + relu`` bottleneck before the classifier.
    #[config(default = true)]
    pub use_bottleneck: bool,

    /// Bottleneck width.
    #[config(default = 256)]
    pub bottleneck_width: usize,
}

impl TransferNetConfig {
    /// Initialize a [`TransferNet`] with fresh backbone weights.
    pub fn init<B: Backend>(
        &self,
        device: &B::Device,
    ) -> anyhow::Result<TransferNet<B>> {
        let backbone = self.backbone.init(device)?;
        self.init_with_backbone(backbone, device)
    }

    /// Initialize a [`TransferNet`], loading pretrained backbone weights when
    /// the backbone asks for them.
    pub fn init_with_weights<B: Backend>(
        &self,
        device: &B::Device,
        disk_cache: &DiskCacheConfig,
    ) -> anyhow::Result<TransferNet<B>> {
        let backbone = self.backbone.init_with_weights(device, disk_cache)?;
        self.init_with_backbone(backbone, device)
    }

    fn init_with_backbone<B: Backend>(
        &self,
        backbone: Backbone<B>,
        device: &B::Device,
    ) -> anyhow::Result<TransferNet<B>> {
        anyhow::ensure!(self.num_class > 0, "num_class must be positive");
        let transfer_loss = self.transfer_loss.init()?;

        let mut feature_dim = backbone.output_num();
        let bottleneck = if self.use_bottleneck {
            let layer = LinearConfig::new(feature_dim, self.bottleneck_width).init(device);
            feature_dim = self.bottleneck_width;
            Some(layer)
        } else {
            None
        };

        tracing::info!(
            backbone = %self.backbone.name,
            transfer_loss = %transfer_loss.kind,
            num_class = self.num_class,
            feature_dim,
            "initialized transfer net"
        );

        Ok(TransferNet {
            backbone,
            bottleneck,
            act: Relu::new(),
            classifier: LinearConfig::new(feature_dim, self.num_class).init(device),
            transfer_loss: Ignored(transfer_loss),
        })
    }
}

/// Output of [`TransferNet::forward`].
#[derive(Debug, Clone)]
pub struct TransferNetOutput<B: Backend> {
    /// Source classification loss, ``[1]``.
    pub clf_loss: Tensor<B, 1>,

    /// Transfer loss, ``[1]``.
    pub transfer_loss: Tensor<B, 1>,

    /// Source logits, ``[n_source, num_class]``.
    pub source_logits: Tensor<B, 2>,
}

/// Backbone plus classifier head with a transfer loss.
#[derive(Module, Debug)]
pub struct TransferNet<B: Backend> {
    /// Feature extractor.
    pub backbone: Backbone<B>,

    /// Optional bottleneck projection.
    pub bottleneck: Option<Linear<B>>,

    /// Bottleneck activation.
    pub act: Relu,

    /// Classifier head.
    pub classifier: Linear<B>,

    /// Transfer loss.
    pub transfer_loss: Ignored<TransferLoss>,
}

impl<B: Backend> TransferNet<B> {
    /// Number of classes.
    pub fn num_class(&self) -> usize {
        self.classifier.weight.dims()[1]
    }

    /// Backbone (and bottleneck) features.
    ///
    /// # Arguments
    ///
    /// - `input`: ``[batch, channels, height, width]``.
    ///
    /// # Returns
    ///
    /// A ``[batch, features]`` tensor.
    pub fn features(
        &self,
        input: Tensor<B, 4>,
    ) -> Tensor<B, 2> {
        let x = self.backbone.forward_features(input);
        match &self.bottleneck {
            Some(bottleneck) => self.act.forward(bottleneck.forward(x)),
            None => x,
        }
    }

    /// Compute the training losses.
    ///
    /// # Arguments
    ///
    /// - `source`: ``[n_source, channels, height, width]`` labeled batch.
    /// - `target`: ``[n_target, channels, height, width]`` unlabeled batch.
    /// - `source_label`: ``[n_source]`` class indices.
    pub fn forward(
        &self,
        source: Tensor<B, 4>,
        target: Tensor<B, 4>,
        source_label: Tensor<B, 1, Int>,
    ) -> TransferNetOutput<B> {
        let [n_source, _, _, _] = source.dims();
        assert_eq!(
            source_label.dims(),
            [n_source],
            "one label per source sample"
        );

        let source_features = self.features(source);
        let target_features = self.features(target);

        let source_logits = self.classifier.forward(source_features.clone());
        let clf_loss = CrossEntropyLossConfig::new()
            .init(&source_logits.device())
            .forward(source_logits.clone(), source_label);

        let transfer_loss = if self.transfer_loss.kind.uses_predictions() {
            let target_probs = softmax(self.classifier.forward(target_features), 1);
            self.transfer_loss.forward(source_features, target_probs)
        } else {
            self.transfer_loss.forward(source_features, target_features)
        };

        TransferNetOutput {
            clf_loss,
            transfer_loss,
            source_logits,
        }
    }

    /// Class logits.
    ///
    /// # Arguments
    ///
    /// - `input`: ``[batch, channels, height, width]``.
    ///
    /// # Returns
    ///
    /// A ``[batch, num_class]`` tensor.
    pub fn predict(
        &self,
        input: Tensor<B, 4>,
    ) -> Tensor<B, 2> {
        self.classifier.forward(self.features(input))
    }
}
