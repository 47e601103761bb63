//! # `RSP-ResNet` - Style-Removal `ResNet` Backbone
//!
//! A full-resolution [`ResNetBackbone`] (stride-1 stem and stages) where the
//! output of each of the first three stages is split into an instance-normalized
//! *content* part and a residual *style* part; the style is re-weighted by
//! [`SimAm`] attention and added back:
//!
//! ```text
//! x_s      = layer_s(x)
//! content  = IN_s(x_s)
//! style    = x_s - content
//! x        = content + SimAM(style)
//! ```

use crate::cache::disk::DiskCacheConfig;
use crate::layers::attention::simam::{SimAm, SimAmConfig};
use crate::models::resnet::resnet_model::{
    ResNetBackbone, ResNetBackboneConfig, ResNetBackboneMeta,
};
use bimm_contracts::assert_shape_contract_periodically;
use burn::config::Config;
use burn::module::Module;
use burn::nn::{InstanceNorm, InstanceNormConfig};
use burn::prelude::{Backend, Tensor};

/// Name prefix selecting an [`RspResNetBackbone`].
pub const RSP_PREFIX: &str = "rsp_";

/// Number of stages followed by content/style separation.
pub const RSP_STAGES: usize = 3;

/// Smallest input side whose post-pool stage maps have more than one pixel,
/// as [`SimAm`] requires.
pub const RSP_MIN_INPUT_RESOLUTION: usize = 3;

/// [`RspResNetBackbone`] configuration.
#[derive(Config, Debug)]
pub struct RspResNetBackboneConfig {
    /// The underlying `ResNet` layout.
    ///
    /// Its stem and stage strides are forced to 1 on init.
    pub resnet: ResNetBackboneConfig,

    /// Attention config applied to the style residuals.
    #[config(default = "SimAmConfig::new()")]
    pub simam: SimAmConfig,
}

impl ResNetBackboneMeta for RspResNetBackboneConfig {
    fn input_channels(&self) -> usize {
        self.resnet.input_channels()
    }

    fn expansion(&self) -> usize {
        self.resnet.expansion()
    }
}

impl RspResNetBackboneConfig {
    /// Look up a well-known configuration by name.
    ///
    /// Accepts ``rsp_resnet18`` .. ``rsp_resnet152``, or the bare ``resnet*`` name.
    pub fn from_name(
        name: &str,
        input_channels: usize,
    ) -> anyhow::Result<Self> {
        let name = name.strip_prefix(RSP_PREFIX).unwrap_or(name);
        let resnet = ResNetBackboneConfig::from_name(name)?.with_input_channels(input_channels);
        Ok(Self::new(resnet))
    }

    /// The effective `ResNet` config: stride 1 everywhere except the max-pool.
    pub fn full_resolution_resnet(&self) -> ResNetBackboneConfig {
        self.resnet
            .clone()
            .with_stem_stride(1)
            .with_layer_strides([1; 4])
    }

    /// Initialize a [`RspResNetBackbone`].
    pub fn init<B: Backend>(
        &self,
        device: &B::Device,
    ) -> RspResNetBackbone<B> {
        let planes = self.stage_out_planes();
        RspResNetBackbone {
            resnet: self.full_resolution_resnet().init(device),
            instance_norms: planes[..RSP_STAGES]
                .iter()
                .map(|&p| InstanceNormConfig::new(p).with_affine(true).init(device))
                .collect(),
            simam: self.simam.init(),
        }
    }
}

/// Per-stage content/style decomposition.
#[derive(Debug, Clone)]
pub struct RspStageOutput<B: Backend> {
    /// ``IN(x_s)``.
    pub content: Tensor<B, 4>,

    /// ``x_s - content``.
    pub style: Tensor<B, 4>,

    /// ``SimAM(style)``.
    pub attended_style: Tensor<B, 4>,

    /// ``content + attended_style``; the input of the next stage.
    pub recomposed: Tensor<B, 4>,
}

/// [`RspResNetBackbone::forward`] output.
#[derive(Debug, Clone)]
pub struct RspResNetOutput<B: Backend> {
    /// Pooled features; ``[batch, output_num]``.
    pub features: Tensor<B, 2>,

    /// One entry per separated stage.
    pub stages: Vec<RspStageOutput<B>>,
}

/// Style-removal `ResNet`.
#[derive(Module, Debug)]
pub struct RspResNetBackbone<B: Backend> {
    /// Stride-1 `ResNet` trunk.
    pub resnet: ResNetBackbone<B>,

    /// Affine instance norms after stages 1..3.
    pub instance_norms: Vec<InstanceNorm<B>>,

    /// Style attention.
    pub simam: SimAm,
}

impl<B: Backend> ResNetBackboneMeta for RspResNetBackbone<B> {
    fn input_channels(&self) -> usize {
        self.resnet.input_channels()
    }

    fn expansion(&self) -> usize {
        self.resnet.expansion()
    }
}

impl<B: Backend> RspResNetBackbone<B> {
    /// Forward pass, keeping the per-stage decomposition.
    ///
    /// # Arguments
    ///
    /// - `input`: ``[batch, input_channels, height, width]``.
    ///
    /// # Returns
    ///
    /// A [`RspResNetOutput`].
    pub fn forward(
        &self,
        input: Tensor<B, 4>,
    ) -> RspResNetOutput<B> {
        let mut x = self.resnet.forward_stem(input);
        let mut stages = Vec::with_capacity(RSP_STAGES);

        for (idx, layer) in self.resnet.layers.iter().enumerate() {
            x = layer.forward(x);

            if let Some(norm) = self.instance_norms.get(idx) {
                let content = norm.forward(x.clone());
                let style = x - content.clone();
                let attended_style = self.simam.forward(style.clone()).output;
                let recomposed = content.clone() + attended_style.clone();

                x = recomposed.clone();
                stages.push(RspStageOutput {
                    content,
                    style,
                    attended_style,
                    recomposed,
                });
            }
        }

        let features = self.resnet.pool(x);
        assert_shape_contract_periodically!(
            ["batch", "features"],
            &features,
            &[("features", self.output_num())]
        );

        RspResNetOutput { features, stages }
    }

    /// Compute the pooled feature vector.
    pub fn forward_features(
        &self,
        input: Tensor<B, 4>,
    ) -> Tensor<B, 2> {
        self.forward(input).features
    }

    /// Fetch named pretrained weights onto the `ResNet` trunk.
    pub fn load_pretrained(
        self,
        prefab: &str,
        weights: &str,
        disk_cache: &DiskCacheConfig,
    ) -> anyhow::Result<Self> {
        let prefab = prefab.strip_prefix(RSP_PREFIX).unwrap_or(prefab);
        Ok(Self {
            resnet: self.resnet.load_pretrained(prefab, weights, disk_cache)?,
            ..self
        })
    }
}
