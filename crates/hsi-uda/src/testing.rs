//! Test helpers.
use burn::prelude::{Backend, Tensor};
use hamcrest::prelude::*;

/// Read a float tensor back to the host.
pub fn to_vec<B: Backend, const D: usize>(tensor: Tensor<B, D>) -> Vec<f32> {
    tensor.into_data().convert::<f32>().to_vec::<f32>().unwrap()
}

/// Assert element-wise closeness against a flat, row-major expectation.
pub fn assert_tensor_close<B: Backend, const D: usize>(
    actual: Tensor<B, D>,
    expected: &[f32],
    epsilon: f32,
) {
    let actual = to_vec(actual);
    assert_eq!(actual.len(), expected.len(), "element count");
    for (a, e) in actual.iter().zip(expected.iter()) {
        assert_that!(*a as f64, is(close_to(*e as f64, epsilon as f64)));
    }
}

/// Payload of a variable written by [`write_mat_v5`].
pub enum MatTestData {
    /// ``double`` class, ``miDOUBLE`` storage.
    Double(Vec<f64>),

    /// ``uint8`` class, ``miUINT8`` storage.
    UInt8(Vec<u8>),
}

fn push_mat_element(
    out: &mut Vec<u8>,
    data_type: u32,
    payload: &[u8],
) {
    out.extend(data_type.to_le_bytes());
    out.extend((payload.len() as u32).to_le_bytes());
    out.extend(payload);
    while out.len() % 8 != 0 {
        out.push(0);
    }
}

/// Write a little-endian, uncompressed MAT v5 file.
///
/// Each variable is ``(name, dims, column-major data)``.
pub fn write_mat_v5(
    path: &std::path::Path,
    variables: &[(&str, &[usize], MatTestData)],
) {
    let mut out = Vec::new();
    let mut text = b"MATLAB 5.0 MAT-file, written by hsi-uda tests".to_vec();
    text.resize(116, b' ');
    out.extend(text);
    out.extend([0u8; 8]);
    out.extend(0x0100u16.to_le_bytes());
    out.extend(b"IM");

    for (name, dims, data) in variables {
        let (class, data_type, payload): (u32, u32, Vec<u8>) = match data {
            MatTestData::Double(values) => (
                6,
                9,
                values.iter().flat_map(|v| v.to_le_bytes()).collect(),
            ),
            MatTestData::UInt8(values) => (9, 2, values.clone()),
        };

        let mut body = Vec::new();
        let flags: Vec<u8> = [class, 0u32].iter().flat_map(|v| v.to_le_bytes()).collect();
        push_mat_element(&mut body, 6, &flags);
        let dims: Vec<u8> = dims
            .iter()
            .flat_map(|d| (*d as i32).to_le_bytes())
            .collect();
        push_mat_element(&mut body, 5, &dims);
        push_mat_element(&mut body, 1, name.as_bytes());
        push_mat_element(&mut body, data_type, &payload);

        out.extend(14u32.to_le_bytes());
        out.extend((body.len() as u32).to_le_bytes());
        out.extend(body);
    }

    std::fs::write(path, out).unwrap();
}
