use std::path::Path;

use log::debug;

use crate::calibration::Calibration;
use crate::error::{Result, SpotError};
use crate::formats::{self, ReaderRegistry};
use crate::types::{CalibratedImage, SourceInfo};

/// Read a file with the default decoders and attach the default axes.
pub fn ingest(path: &Path) -> Result<(SourceInfo, CalibratedImage)> {
    let (info, data) = formats::read_image(path)?;
    Ok((info, Calibration::default().calibrate(data)))
}

/// Like [`ingest`], with explicit decoder settings and calibration.
pub fn ingest_with(
    path: &Path,
    readers: &ReaderRegistry,
    calibration: &Calibration,
) -> Result<(SourceInfo, CalibratedImage)> {
    let (info, data) = readers.read(path)?;
    Ok((info, calibration.calibrate(data)))
}

/// Element-wise `primary - background`, axes taken from `primary`.
///
/// Negative results are kept. Neither input is modified.
pub fn subtract_background(
    primary: &CalibratedImage,
    background: &CalibratedImage,
) -> Result<CalibratedImage> {
    if primary.shape() != background.shape() {
        return Err(SpotError::ShapeMismatch {
            primary: primary.shape(),
            background: background.shape(),
        });
    }

    debug!("Subtracting background ({}x{})", primary.shape().0, primary.shape().1);
    let data = primary.data() - background.data();
    Ok(CalibratedImage::from_shape_axes(
        primary.x().clone(),
        primary.y().clone(),
        data,
    ))
}
