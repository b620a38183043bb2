/// Raw sensor dumps: a headerless stream of samples with a fixed geometry.
///
/// The stream is stored column after column (all rows of column 0, then
/// column 1, ...). It is transposed on read into `[row, col]` order.

use std::fs;
use std::path::Path;

use ndarray::Array2;

use crate::error::{Result, SpotError};

/// Sensor rows (y direction).
pub const SENSOR_ROWS: usize = 160;
/// Sensor columns (x direction).
pub const SENSOR_COLS: usize = 120;

/// Little-endian element type of a raw stream.
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum SampleType {
    F64,
    F32,
    U16,
}

impl SampleType {
    pub fn size(self) -> usize {
        match self {
            SampleType::F64 => 8,
            SampleType::F32 => 4,
            SampleType::U16 => 2,
        }
    }

    /// `bytes` must hold exactly `self.size()` bytes.
    fn decode(self, bytes: &[u8]) -> f64 {
        match self {
            SampleType::F64 => {
                let mut b = [0u8; 8];
                b.copy_from_slice(bytes);
                f64::from_le_bytes(b)
            }
            SampleType::F32 => {
                let mut b = [0u8; 4];
                b.copy_from_slice(bytes);
                f32::from_le_bytes(b) as f64
            }
            SampleType::U16 => u16::from_le_bytes([bytes[0], bytes[1]]) as f64,
        }
    }
}

#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub struct BinaryLayout {
    pub rows: usize,
    pub cols: usize,
    pub sample: SampleType,
}

impl Default for BinaryLayout {
    fn default() -> Self {
        BinaryLayout {
            rows: SENSOR_ROWS,
            cols: SENSOR_COLS,
            sample: SampleType::F64,
        }
    }
}

impl BinaryLayout {
    /// Expected file size, `None` if it does not fit in `usize`.
    pub fn byte_len(&self) -> Option<usize> {
        self.rows
            .checked_mul(self.cols)?
            .checked_mul(self.sample.size())
    }
}

pub fn read_raw(path: &Path, layout: &BinaryLayout) -> Result<Array2<f64>> {
    let bytes = fs::read(path).map_err(|e| SpotError::io(path, e))?;
    decode_raw(&bytes, layout).ok_or_else(|| SpotError::SizeMismatch {
        path: path.to_path_buf(),
        expected: layout.byte_len().unwrap_or(usize::MAX),
        actual: bytes.len(),
    })
}

/// `None` when the byte count does not match the layout.
pub(crate) fn decode_raw(bytes: &[u8], layout: &BinaryLayout) -> Option<Array2<f64>> {
    if layout.byte_len() != Some(bytes.len()) {
        return None;
    }
    let size = layout.sample.size();
    let rows = layout.rows;

    Some(Array2::from_shape_fn((rows, layout.cols), |(r, c)| {
        let offset = (c * rows + r) * size;
        layout.sample.decode(&bytes[offset..offset + size])
    }))
}
