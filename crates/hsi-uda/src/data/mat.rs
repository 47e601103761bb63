//! # MATLAB v5 Variables
//!
//! Reads named numeric variables out of ``.mat`` (v5) files and converts
//! MATLAB's column-major layout to row-major.

use anyhow::{Context, anyhow, bail};
use matfile::{MatFile, NumericData};
use std::fs::File;
use std::io::BufReader;
use std::path::Path;

/// A real numeric array read from a ``.mat`` file.
///
/// `values` keeps MATLAB's column-major order, widened to `f64`.
#[derive(Debug, Clone, PartialEq)]
pub struct MatArray {
    /// Variable name.
    pub name: String,

    /// Dimensions, in MATLAB order.
    pub dims: Vec<usize>,

    /// Column-major values.
    pub values: Vec<f64>,
}

fn widen<T: Copy>(
    real: &[T],
    imag: &Option<Vec<T>>,
    convert: impl Fn(T) -> f64,
) -> anyhow::Result<Vec<f64>> {
    if imag.is_some() {
        bail!("complex arrays are not supported");
    }
    Ok(real.iter().map(|&v| convert(v)).collect())
}

impl MatArray {
    /// Convert a parsed [`matfile::Array`].
    pub fn from_matfile_array(array: &matfile::Array) -> anyhow::Result<Self> {
        let values = match array.data() {
            NumericData::Int8 { real, imag } => widen(real, imag, f64::from),
            NumericData::UInt8 { real, imag } => widen(real, imag, f64::from),
            NumericData::Int16 { real, imag } => widen(real, imag, f64::from),
            NumericData::UInt16 { real, imag } => widen(real, imag, f64::from),
            NumericData::Int32 { real, imag } => widen(real, imag, f64::from),
            NumericData::UInt32 { real, imag } => widen(real, imag, f64::from),
            NumericData::Int64 { real, imag } => widen(real, imag, |v| v as f64),
            NumericData::UInt64 { real, imag } => widen(real, imag, |v| v as f64),
            NumericData::Single { real, imag } => widen(real, imag, f64::from),
            NumericData::Double { real, imag } => widen(real, imag, |v| v),
        }
        .with_context(|| format!("reading variable {:?}", array.name()))?;

        let dims = array.size().clone();
        let expected: usize = dims.iter().product();
        if values.len() != expected {
            bail!(
                "variable {:?} has {} values for dims {dims:?}",
                array.name(),
                values.len()
            );
        }

        Ok(Self {
            name: array.name().to_string(),
            dims,
            values,
        })
    }

    /// Drop singleton dimensions.
    pub fn squeeze(mut self) -> Self {
        self.dims.retain(|&d| d != 1);
        self
    }

    /// The number of elements.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Is the array empty?
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Values in row-major (C) order.
    pub fn to_row_major(&self) -> Vec<f64> {
        let n = self.values.len();
        if self.dims.len() < 2 {
            return self.values.clone();
        }

        let mut col_strides = vec![1usize; self.dims.len()];
        for i in 1..self.dims.len() {
            col_strides[i] = col_strides[i - 1] * self.dims[i - 1];
        }

        let mut out = Vec::with_capacity(n);
        let mut index = vec![0usize; self.dims.len()];
        for _ in 0..n {
            let offset: usize = index.iter().zip(&col_strides).map(|(i, s)| i * s).sum();
            out.push(self.values[offset]);

            // Advance the row-major multi-index; the last axis moves fastest.
            for axis in (0..index.len()).rev() {
                index[axis] += 1;
                if index[axis] < self.dims[axis] {
                    break;
                }
                index[axis] = 0;
            }
        }
        out
    }

    /// Row-major values as `f32`.
    pub fn to_row_major_f32(&self) -> Vec<f32> {
        self.to_row_major().into_iter().map(|v| v as f32).collect()
    }

    /// Row-major values as `u32`.
    ///
    /// # Errors
    ///
    /// If any value is negative, fractional, non-finite, or too large.
    pub fn to_row_major_u32(&self) -> anyhow::Result<Vec<u32>> {
        self.to_row_major()
            .into_iter()
            .map(|v| {
                if v.is_finite() && v >= 0.0 && v.fract() == 0.0 && v <= u32::MAX as f64 {
                    Ok(v as u32)
                } else {
                    Err(anyhow!("variable {:?} holds non-label value {v}", self.name))
                }
            })
            .collect()
    }
}

/// Parse a ``.mat`` file.
pub fn read_mat_file(path: &Path) -> anyhow::Result<MatFile> {
    let file = File::open(path).with_context(|| format!("opening {}", path.display()))?;
    MatFile::parse(BufReader::new(file))
        .map_err(|err| anyhow!("parsing {}: {err:?}", path.display()))
}

/// Read the variable `name` from a ``.mat`` file.
pub fn load_mat_variable(
    path: &Path,
    name: &str,
) -> anyhow::Result<MatArray> {
    let mat = read_mat_file(path)?;
    let Some(array) = mat.find_by_name(name) else {
        let names: Vec<&str> = mat.arrays().iter().map(|a| a.name()).collect();
        bail!(
            "{} has no variable {name:?}; found {names:?}",
            path.display()
        );
    };
    let array = MatArray::from_matfile_array(array)?;
    tracing::info!(
        path = %path.display(),
        variable = name,
        dims = ?array.dims,
        "loaded mat variable"
    );
    Ok(array)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{MatTestData, write_mat_v5};

    #[test]
    fn test_row_major() {
        // [[1, 2, 3], [4, 5, 6]] in column-major order.
        let array = MatArray {
            name: "x".to_string(),
            dims: vec![2, 3],
            values: vec![1.0, 4.0, 2.0, 5.0, 3.0, 6.0],
        };
        assert_eq!(array.to_row_major(), vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);

        // x[i, j, k] = 100 i + 10 j + k, dims [2, 2, 3].
        let dims = [2usize, 2, 3];
        let mut values = Vec::new();
        for k in 0..3 {
            for j in 0..2 {
                for i in 0..2 {
                    values.push((100 * i + 10 * j + k) as f64);
                }
            }
        }
        let array = MatArray {
            name: "cube".to_string(),
            dims: dims.to_vec(),
            values,
        };
        let row_major = array.to_row_major();
        assert_eq!(&row_major[..4], &[0.0, 1.0, 2.0, 10.0]);
        assert_eq!(row_major[11], 112.0);
    }

    #[test]
    fn test_squeeze_and_labels() {
        let array = MatArray {
            name: "map".to_string(),
            dims: vec![1, 3, 1],
            values: vec![0.0, 2.0, 1.0],
        }
        .squeeze();
        assert_eq!(array.dims, vec![3]);
        assert_eq!(array.to_row_major_u32().unwrap(), vec![0, 2, 1]);

        let bad = MatArray {
            name: "map".to_string(),
            dims: vec![2],
            values: vec![1.0, 1.5],
        };
        assert!(bad.to_row_major_u32().is_err());
    }

    #[test]
    fn test_read_mat_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("Source.mat");
        write_mat_v5(
            &path,
            &[
                (
                    "ori_data",
                    &[2, 3],
                    MatTestData::Double(vec![1.0, 4.0, 2.0, 5.0, 3.0, 6.0]),
                ),
                ("map", &[2, 2], MatTestData::UInt8(vec![0, 1, 2, 1])),
            ],
        );

        let data = load_mat_variable(&path, "ori_data").unwrap();
        assert_eq!(data.dims, vec![2, 3]);
        assert_eq!(
            data.to_row_major_f32(),
            vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0]
        );

        let labels = load_mat_variable(&path, "map").unwrap();
        assert_eq!(labels.to_row_major_u32().unwrap(), vec![0, 2, 1, 1]);

        let err = load_mat_variable(&path, "missing").unwrap_err();
        assert!(err.to_string().contains("ori_data"), "{err}");

        assert!(load_mat_variable(&dir.path().join("nope.mat"), "map").is_err());
    }
}
