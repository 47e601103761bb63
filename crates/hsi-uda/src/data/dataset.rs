//! # Hyperspectral Patch Dataset
//!
//! Every labeled pixel yields a ``[bands, patch_size, patch_size]``
//! neighbourhood centred on it. Windows that run past the image border are
//! filled according to [`PatchPadding`].

use crate::data::cube::{HyperspectralCube, LabelMap, LabeledPixel};
use anyhow::{bail, ensure};
use burn::config::Config;
use burn::data::dataset::Dataset;
use rand::SeedableRng;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;

/// How to fill patch cells outside the image.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum PatchPadding {
    /// Mirror the image, repeating the edge: ``... b a | a b c ... x y z | z y ...``.
    #[default]
    Symmetric,

    /// Zeros.
    Zero,
}

impl PatchPadding {
    /// Map a possibly out-of-range coordinate into ``0..len``.
    ///
    /// Returns `None` where the cell should be zero.
    pub fn resolve(
        &self,
        index: isize,
        len: usize,
    ) -> Option<usize> {
        let len = len as isize;
        if (0..len).contains(&index) {
            return Some(index as usize);
        }
        match self {
            Self::Zero => None,
            Self::Symmetric => {
                // The reflection has period 2 * len.
                let period = 2 * len;
                let i = index.rem_euclid(period);
                Some(if i < len { i } else { period - 1 - i } as usize)
            }
        }
    }
}

/// [`HsiDataset`] configuration.
#[derive(Config, Debug)]
pub struct HsiDatasetConfig {
    /// Side of the square patch; must be odd.
    #[config(default = 9)]
    pub patch_size: usize,

    /// Keep at most this many pixels of each class, chosen at random.
    #[config(default = "None")]
    pub samples_per_class: Option<usize>,

    /// Fraction of each class held out by [`HsiDataset::split`].
    #[config(default = "None")]
    pub test_ratio: Option<f64>,

    /// Border fill.
    #[config(default = "PatchPadding::Symmetric")]
    pub padding: PatchPadding,

    /// Seed for per-class sampling and splitting.
    #[config(default = 0)]
    pub seed: u64,
}

impl HsiDatasetConfig {
    /// Check the configuration.
    pub fn try_validate(&self) -> anyhow::Result<()> {
        ensure!(
            self.patch_size % 2 == 1,
            "patch_size must be odd, got {}",
            self.patch_size
        );
        if let Some(ratio) = self.test_ratio {
            ensure!(
                (0.0..=1.0).contains(&ratio),
                "test_ratio must be in [0, 1], got {ratio}"
            );
        }
        if self.samples_per_class == Some(0) {
            bail!("samples_per_class must be positive");
        }
        Ok(())
    }

    /// Build the dataset over every labeled pixel of `labels`.
    ///
    /// Labels must be contiguous ``1..=n``; item labels are ``label - 1``.
    pub fn init(
        &self,
        cube: Arc<HyperspectralCube>,
        labels: &LabelMap,
    ) -> anyhow::Result<HsiDataset> {
        self.try_validate()?;
        ensure!(
            (cube.height(), cube.width()) == (labels.height(), labels.width()),
            "cube is {}x{} but label map is {}x{}",
            cube.height(),
            cube.width(),
            labels.height(),
            labels.width()
        );

        let num_classes = labels.num_classes();
        let max_label = labels.max_label() as usize;
        ensure!(
            max_label == num_classes,
            "labels must be contiguous 1..={num_classes}, found label {max_label}"
        );

        let mut pixels = labels.labeled_pixels();
        if let Some(cap) = self.samples_per_class {
            pixels = cap_per_class(pixels, cap, self.seed);
        }

        tracing::debug!(
            height = cube.height(),
            width = cube.width(),
            bands = cube.bands(),
            num_classes,
            samples = pixels.len(),
            "built hyperspectral dataset"
        );

        Ok(HsiDataset {
            cube,
            pixels,
            num_classes,
            patch_size: self.patch_size,
            padding: self.padding,
            test_ratio: self.test_ratio,
            seed: self.seed,
        })
    }
}

fn group_by_class(pixels: Vec<LabeledPixel>) -> BTreeMap<u32, Vec<LabeledPixel>> {
    let mut groups: BTreeMap<u32, Vec<LabeledPixel>> = BTreeMap::new();
    for pixel in pixels {
        groups.entry(pixel.label).or_default().push(pixel);
    }
    groups
}

fn row_major(pixels: &mut [LabeledPixel]) {
    pixels.sort_by_key(|p| (p.row, p.col));
}

fn cap_per_class(
    pixels: Vec<LabeledPixel>,
    cap: usize,
    seed: u64,
) -> Vec<LabeledPixel> {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut kept = Vec::new();
    for (_, mut group) in group_by_class(pixels) {
        if group.len() > cap {
            group.shuffle(&mut rng);
            group.truncate(cap);
        }
        kept.extend(group);
    }
    row_major(&mut kept);
    kept
}

/// One labeled patch.
#[derive(Debug, Clone, PartialEq)]
pub struct HsiItem {
    /// ``[bands, patch_size, patch_size]`` values, row-major.
    pub patch: Vec<f32>,

    /// Spectral bands.
    pub bands: usize,

    /// Patch side.
    pub patch_size: usize,

    /// Zero-based class index.
    pub label: usize,

    /// Centre row.
    pub row: usize,

    /// Centre column.
    pub col: usize,
}

/// Labeled patches of a hyperspectral cube.
#[derive(Debug, Clone)]
pub struct HsiDataset {
    cube: Arc<HyperspectralCube>,
    pixels: Vec<LabeledPixel>,
    num_classes: usize,
    patch_size: usize,
    padding: PatchPadding,
    test_ratio: Option<f64>,
    seed: u64,
}

impl HsiDataset {
    /// The underlying cube.
    pub fn cube(&self) -> &Arc<HyperspectralCube> {
        &self.cube
    }

    /// Selected pixels, in row-major order.
    pub fn pixels(&self) -> &[LabeledPixel] {
        &self.pixels
    }

    /// The number of classes in the label map.
    pub fn num_classes(&self) -> usize {
        self.num_classes
    }

    /// Patch side.
    pub fn patch_size(&self) -> usize {
        self.patch_size
    }

    /// Spectral bands.
    pub fn bands(&self) -> usize {
        self.cube.bands()
    }

    /// Items per class index.
    pub fn class_counts(&self) -> Vec<usize> {
        let mut counts = vec![0; self.num_classes];
        for pixel in &self.pixels {
            counts[pixel.label as usize - 1] += 1;
        }
        counts
    }

    /// Extract the patch centred on ``(row, col)``.
    pub fn patch(
        &self,
        row: usize,
        col: usize,
    ) -> Vec<f32> {
        let p = self.patch_size;
        let half = (p / 2) as isize;
        let bands = self.cube.bands();
        let mut patch = vec![0.0; bands * p * p];

        for dr in 0..p {
            let r = self
                .padding
                .resolve(row as isize + dr as isize - half, self.cube.height());
            for dc in 0..p {
                let c = self
                    .padding
                    .resolve(col as isize + dc as isize - half, self.cube.width());
                if let (Some(r), Some(c)) = (r, c) {
                    for (band, value) in self.cube.pixel(r, c).iter().enumerate() {
                        patch[(band * p + dr) * p + dc] = *value;
                    }
                }
            }
        }
        patch
    }

    fn with_pixels(
        &self,
        pixels: Vec<LabeledPixel>,
    ) -> Self {
        Self {
            cube: self.cube.clone(),
            pixels,
            num_classes: self.num_classes,
            patch_size: self.patch_size,
            padding: self.padding,
            test_ratio: self.test_ratio,
            seed: self.seed,
        }
    }

    /// Split into ``(train, test)`` by holding out `test_ratio` of each class.
    ///
    /// Each class keeps at least one training item when it has one to give.
    /// Without a `test_ratio`, everything is training data.
    pub fn split(&self) -> (Self, Self) {
        let Some(ratio) = self.test_ratio else {
            return (self.clone(), self.with_pixels(Vec::new()));
        };

        // Offset the seed so the split is independent of the per-class cap.
        let mut rng = StdRng::seed_from_u64(self.seed.wrapping_add(1));
        let mut train = Vec::new();
        let mut test = Vec::new();
        for (_, mut group) in group_by_class(self.pixels.clone()) {
            group.shuffle(&mut rng);
            let n = group.len();
            let n_test = ((n as f64 * ratio).round() as usize).min(n.saturating_sub(1));
            test.extend(group.drain(..n_test));
            train.extend(group);
        }
        row_major(&mut train);
        row_major(&mut test);

        tracing::debug!(
            train = train.len(),
            test = test.len(),
            ratio,
            "split hyperspectral dataset"
        );
        (self.with_pixels(train), self.with_pixels(test))
    }
}

impl Dataset<HsiItem> for HsiDataset {
    fn get(
        &self,
        index: usize,
    ) -> Option<HsiItem> {
        let pixel = self.pixels.get(index)?;
        Some(HsiItem {
            patch: self.patch(pixel.row, pixel.col),
            bands: self.cube.bands(),
            patch_size: self.patch_size,
            label: pixel.label as usize - 1,
            row: pixel.row,
            col: pixel.col,
        })
    }

    fn len(&self) -> usize {
        self.pixels.len()
    }
}
