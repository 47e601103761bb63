//! # Patch Batching

use crate::data::dataset::HsiItem;
use burn::data::dataloader::batcher::Batcher;
use burn::prelude::{Backend, Int, Tensor};
use burn::tensor::TensorData;

/// A batch of patches.
#[derive(Debug, Clone)]
pub struct HsiBatch<B: Backend> {
    /// ``[batch, bands, patch_size, patch_size]``.
    pub patches: Tensor<B, 4>,

    /// ``[batch]`` class indices.
    pub labels: Tensor<B, 1, Int>,
}

/// Stacks [`HsiItem`]s into an [`HsiBatch`].
#[derive(Debug, Clone, Copy, Default)]
pub struct HsiBatcher;

impl<B: Backend> Batcher<B, HsiItem, HsiBatch<B>> for HsiBatcher {
    /// # Panics
    ///
    /// If `items` is empty or the items disagree on shape.
    fn batch(
        &self,
        items: Vec<HsiItem>,
        device: &B::Device,
    ) -> HsiBatch<B> {
        assert!(!items.is_empty(), "cannot batch zero items");
        let (bands, p) = (items[0].bands, items[0].patch_size);
        let batch = items.len();

        let mut values = Vec::with_capacity(batch * bands * p * p);
        let mut labels = Vec::with_capacity(batch);
        for item in &items {
            assert_eq!(
                (item.bands, item.patch_size),
                (bands, p),
                "mixed patch shapes in one batch"
            );
            values.extend_from_slice(&item.patch);
            labels.push(item.label as i64);
        }

        HsiBatch {
            patches: Tensor::from_data(TensorData::new(values, [batch, bands, p, p]), device),
            labels: Tensor::from_data(TensorData::new(labels, [batch]), device),
        }
    }
}
