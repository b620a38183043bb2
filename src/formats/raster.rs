/// 8-bit raster images (JPEG, TIFF) reduced to single-channel luma.

use std::path::Path;

use log::warn;
use ndarray::Array2;

use crate::error::{Result, SpotError};
use crate::types::Warning;

/// Decode a raster image.
///
/// Always returns a [`Warning::Precision`]: 8 bits of dynamic range are not
/// enough for beam profiling, so widths fitted from this path are approximate.
pub fn read_raster(path: &Path) -> Result<(Array2<f64>, Warning)> {
    let img = image::open(path).map_err(|e| match e {
        image::ImageError::IoError(source) => SpotError::io(path, source),
        other => SpotError::malformed(path, other.to_string()),
    })?;

    let luma = img.to_luma8();
    let (width, height) = luma.dimensions();
    let data = Array2::from_shape_fn((height as usize, width as usize), |(r, c)| {
        luma.get_pixel(c as u32, r as u32)[0] as f64
    });

    let warning = Warning::Precision {
        path: path.to_path_buf(),
    };
    warn!("{}", warning);

    Ok((data, warning))
}
