/// Pixel index to physical coordinate mapping (micrometres).

use ndarray::{Array1, Array2};

use crate::types::CalibratedImage;

/// Distance between neighbouring pixel centres.
pub const PIXEL_PITCH: f64 = 25.0;
/// Physical position subtracted from column coordinates.
pub const OFFSET_X: f64 = 1500.0;
/// Physical position subtracted from row coordinates.
pub const OFFSET_Y: f64 = 2000.0;

/// Linear axis calibration: `axis[i] = i * pitch - offset`.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Calibration {
    pub pitch: f64,
    pub offset_x: f64,
    pub offset_y: f64,
}

impl Default for Calibration {
    fn default() -> Self {
        Calibration {
            pitch: PIXEL_PITCH,
            offset_x: OFFSET_X,
            offset_y: OFFSET_Y,
        }
    }
}

impl Calibration {
    /// x axis has `cols` entries, y axis has `rows` entries.
    pub fn axes(&self, rows: usize, cols: usize) -> (Array1<f64>, Array1<f64>) {
        (
            linear_axis(cols, self.pitch, self.offset_x),
            linear_axis(rows, self.pitch, self.offset_y),
        )
    }

    /// Attach physical axes to a decoded array.
    pub fn calibrate(&self, data: Array2<f64>) -> CalibratedImage {
        let (rows, cols) = data.dim();
        let (x, y) = self.axes(rows, cols);
        CalibratedImage::from_shape_axes(x, y, data)
    }
}

fn linear_axis(len: usize, pitch: f64, offset: f64) -> Array1<f64> {
    Array1::from_iter((0..len).map(|i| i as f64 * pitch - offset))
}
