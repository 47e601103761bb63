//! # Hyperspectral Cubes and Label Maps

use crate::data::mat::MatArray;
use anyhow::{bail, ensure};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Per-band normalization applied to a [`HyperspectralCube`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum BandNormalization {
    /// Leave values untouched.
    #[default]
    None,

    /// ``(x - mean) / std`` per band.
    ZScore,

    /// ``(x - min) / (max - min)`` per band.
    MinMax,
}

/// A ``height x width x bands`` cube, stored row-major as ``(row, col, band)``.
#[derive(Debug, Clone, PartialEq)]
pub struct HyperspectralCube {
    height: usize,
    width: usize,
    bands: usize,
    data: Vec<f32>,
}

impl HyperspectralCube {
    /// Wrap row-major ``(row, col, band)`` data.
    pub fn new(
        height: usize,
        width: usize,
        bands: usize,
        data: Vec<f32>,
    ) -> anyhow::Result<Self> {
        ensure!(
            height > 0 && width > 0 && bands > 0,
            "empty cube: {height}x{width}x{bands}"
        );
        ensure!(
            data.len() == height * width * bands,
            "cube data has {} values, expected {height}x{width}x{bands}",
            data.len()
        );
        Ok(Self {
            height,
            width,
            bands,
            data,
        })
    }

    /// Build from a ``(height, width, bands)`` or ``(height, width)`` variable.
    pub fn from_mat(array: &MatArray) -> anyhow::Result<Self> {
        let (height, width, bands) = match array.dims.as_slice() {
            [h, w] => (*h, *w, 1),
            [h, w, b] => (*h, *w, *b),
            dims => bail!(
                "variable {:?} is not a cube: dims {dims:?}",
                array.name
            ),
        };
        Self::new(height, width, bands, array.to_row_major_f32())
    }

    /// Rows.
    pub fn height(&self) -> usize {
        self.height
    }

    /// Columns.
    pub fn width(&self) -> usize {
        self.width
    }

    /// Spectral bands.
    pub fn bands(&self) -> usize {
        self.bands
    }

    /// The value at ``(row, col, band)``.
    ///
    /// # Panics
    ///
    /// If the index is out of bounds.
    pub fn get(
        &self,
        row: usize,
        col: usize,
        band: usize,
    ) -> f32 {
        assert!(
            row < self.height && col < self.width && band < self.bands,
            "({row}, {col}, {band}) outside {}x{}x{}",
            self.height,
            self.width,
            self.bands
        );
        self.data[(row * self.width + col) * self.bands + band]
    }

    /// The spectrum at ``(row, col)``.
    pub fn pixel(
        &self,
        row: usize,
        col: usize,
    ) -> &[f32] {
        let start = (row * self.width + col) * self.bands;
        &self.data[start..start + self.bands]
    }

    /// Apply a per-band normalization.
    ///
    /// Constant bands map to zero.
    pub fn normalized(
        mut self,
        normalization: BandNormalization,
    ) -> Self {
        if normalization == BandNormalization::None {
            return self;
        }
        let pixels = self.height * self.width;
        let bands = self.bands;
        for band in 0..bands {
            let data = &self.data;
            let values = || (0..pixels).map(move |p| data[p * bands + band]);

            let (offset, scale) = match normalization {
                BandNormalization::None => (0.0, 1.0),
                BandNormalization::ZScore => {
                    let mean = values().map(f64::from).sum::<f64>() / pixels as f64;
                    let var = values()
                        .map(|v| (f64::from(v) - mean).powi(2))
                        .sum::<f64>()
                        / pixels as f64;
                    (mean, var.sqrt())
                }
                BandNormalization::MinMax => {
                    let min = values().fold(f32::INFINITY, f32::min);
                    let max = values().fold(f32::NEG_INFINITY, f32::max);
                    (f64::from(min), f64::from(max - min))
                }
            };

            for p in 0..pixels {
                let v = &mut self.data[p * bands + band];
                *v = if scale > f64::EPSILON {
                    ((f64::from(*v) - offset) / scale) as f32
                } else {
                    0.0
                };
            }
        }
        self
    }
}

/// A pixel with a non-zero label.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LabeledPixel {
    /// Row.
    pub row: usize,

    /// Column.
    pub col: usize,

    /// Label, ``>= 1``.
    pub label: u32,
}

/// A ``height x width`` map of class labels; ``0`` marks unlabeled pixels.
#[derive(Debug, Clone, PartialEq)]
pub struct LabelMap {
    height: usize,
    width: usize,
    labels: Vec<u32>,
}

impl LabelMap {
    /// Wrap row-major labels.
    pub fn new(
        height: usize,
        width: usize,
        labels: Vec<u32>,
    ) -> anyhow::Result<Self> {
        ensure!(
            labels.len() == height * width,
            "label map has {} values, expected {height}x{width}",
            labels.len()
        );
        Ok(Self {
            height,
            width,
            labels,
        })
    }

    /// Build from a ``(height, width)`` variable.
    ///
    /// Singleton dimensions are squeezed first.
    pub fn from_mat(array: &MatArray) -> anyhow::Result<Self> {
        let array = array.clone().squeeze();
        match array.dims.as_slice() {
            [h, w] => Self::new(*h, *w, array.to_row_major_u32()?),
            dims => bail!(
                "variable {:?} is not a label map: dims {dims:?}",
                array.name
            ),
        }
    }

    /// Rows.
    pub fn height(&self) -> usize {
        self.height
    }

    /// Columns.
    pub fn width(&self) -> usize {
        self.width
    }

    /// The label at ``(row, col)``.
    pub fn get(
        &self,
        row: usize,
        col: usize,
    ) -> u32 {
        self.labels[row * self.width + col]
    }

    /// All labeled pixels, in row-major order.
    pub fn labeled_pixels(&self) -> Vec<LabeledPixel> {
        self.labels
            .iter()
            .enumerate()
            .filter(|(_, label)| **label != 0)
            .map(|(i, &label)| LabeledPixel {
                row: i / self.width,
                col: i % self.width,
                label,
            })
            .collect()
    }

    /// Pixel counts per non-zero label.
    pub fn class_counts(&self) -> BTreeMap<u32, usize> {
        let mut counts = BTreeMap::new();
        for &label in self.labels.iter().filter(|l| **l != 0) {
            *counts.entry(label).or_default() += 1;
        }
        counts
    }

    /// The number of distinct non-zero labels.
    pub fn num_classes(&self) -> usize {
        self.class_counts().len()
    }

    /// The largest label.
    pub fn max_label(&self) -> u32 {
        self.labels.iter().copied().max().unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hamcrest::prelude::*;

    fn ramp_cube() -> HyperspectralCube {
        // value = 10 * pixel + band
        let data = (0..6)
            .flat_map(|p| (0..2).map(move |b| (10 * p + b) as f32))
            .collect();
        HyperspectralCube::new(2, 3, 2, data).unwrap()
    }

    #[test]
    fn test_cube_get() {
        let cube = ramp_cube();
        assert_eq!(cube.get(0, 0, 0), 0.0);
        assert_eq!(cube.get(1, 2, 1), 51.0);
        assert_eq!(cube.pixel(0, 1), &[10.0, 11.0]);

        assert!(HyperspectralCube::new(2, 2, 2, vec![0.0; 7]).is_err());
        assert!(HyperspectralCube::new(0, 2, 2, vec![]).is_err());
    }

    #[test]
    #[should_panic(expected = "outside")]
    fn test_cube_get_out_of_bounds() {
        ramp_cube().get(2, 0, 0);
    }

    #[test]
    fn test_cube_from_mat() {
        let array = MatArray {
            name: "ori_data".to_string(),
            dims: vec![1, 2, 2],
            values: vec![1.0, 2.0, 3.0, 4.0],
        };
        let cube = HyperspectralCube::from_mat(&array).unwrap();
        assert_eq!((cube.height(), cube.width(), cube.bands()), (1, 2, 2));
        // column-major [1, 2, 3, 4] -> x[0, j, k] = values[j + 2k]
        assert_eq!(cube.pixel(0, 0), &[1.0, 3.0]);
        assert_eq!(cube.pixel(0, 1), &[2.0, 4.0]);

        let flat = MatArray {
            name: "v".to_string(),
            dims: vec![4],
            values: vec![0.0; 4],
        };
        assert!(HyperspectralCube::from_mat(&flat).is_err());
    }

    #[test]
    fn test_normalization() {
        let cube = ramp_cube().normalized(BandNormalization::MinMax);
        assert_eq!(cube.get(0, 0, 0), 0.0);
        assert_eq!(cube.get(1, 2, 1), 1.0);
        assert_that!(cube.get(0, 1, 0) as f64, is(close_to(0.2, 1e-6)));

        let cube = ramp_cube().normalized(BandNormalization::ZScore);
        for band in 0..2 {
            let values: Vec<f64> = (0..2)
                .flat_map(|r| (0..3).map(move |c| (r, c)))
                .map(|(r, c)| cube.get(r, c, band) as f64)
                .collect();
            let mean = values.iter().sum::<f64>() / 6.0;
            let var = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / 6.0;
            assert_that!(mean, is(close_to(0.0, 1e-6)));
            assert_that!(var, is(close_to(1.0, 1e-5)));
        }

        let constant = HyperspectralCube::new(1, 2, 1, vec![3.0, 3.0])
            .unwrap()
            .normalized(BandNormalization::ZScore);
        assert_eq!(constant.pixel(0, 1), &[0.0]);

        assert_eq!(ramp_cube().normalized(BandNormalization::None), ramp_cube());
    }

    #[test]
    fn test_label_map() {
        let labels = LabelMap::new(2, 3, vec![0, 1, 2, 2, 0, 5]).unwrap();
        assert_eq!(labels.get(1, 2), 5);
        assert_eq!(labels.num_classes(), 3);
        assert_eq!(labels.max_label(), 5);
        assert_eq!(
            labels.class_counts().into_iter().collect::<Vec<_>>(),
            vec![(1, 1), (2, 2), (5, 1)]
        );

        let pixels = labels.labeled_pixels();
        assert_eq!(pixels.len(), 4);
        assert_eq!(
            pixels[2],
            LabeledPixel {
                row: 1,
                col: 0,
                label: 2
            }
        );

        assert!(LabelMap::new(2, 2, vec![0; 3]).is_err());
    }

    #[test]
    fn test_label_map_from_mat() {
        let array = MatArray {
            name: "map".to_string(),
            dims: vec![2, 1, 2],
            values: vec![1.0, 0.0, 3.0, 2.0],
        };
        let labels = LabelMap::from_mat(&array).unwrap();
        assert_eq!((labels.height(), labels.width()), (2, 2));
        assert_eq!(labels.get(0, 1), 3);
        assert_eq!(labels.get(1, 0), 0);
    }
}
