/// Format reader registry: file extension → decoder → `[row, col]` f64 array.

pub mod binary;
pub mod raster;
pub mod text;

use std::path::Path;

use log::debug;
use ndarray::Array2;

use crate::error::{Result, SpotError};
use crate::types::{FormatKind, SourceInfo};

pub use binary::{BinaryLayout, SampleType};

impl FormatKind {
    /// Pick a decoder from the lowercased extension. Never touches the file.
    pub fn from_path(path: &Path) -> Result<FormatKind> {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase())
            .unwrap_or_default();

        match ext.as_str() {
            "csv" => Ok(FormatKind::DelimitedText),
            "dat" => Ok(FormatKind::RawBinary),
            "jpg" | "jpeg" | "tif" | "tiff" => Ok(FormatKind::Raster),
            "" => Err(SpotError::UnsupportedFormat {
                extension: "unknown".to_string(),
            }),
            _ => Err(SpotError::UnsupportedFormat { extension: ext }),
        }
    }
}

/// Decoder settings shared by every read.
#[derive(Clone, Debug, PartialEq)]
pub struct ReaderRegistry {
    /// Field separator of the delimited-text format.
    pub delimiter: char,
    /// Geometry and sample type of the raw binary format.
    pub binary_layout: BinaryLayout,
}

impl Default for ReaderRegistry {
    fn default() -> Self {
        ReaderRegistry {
            delimiter: ',',
            binary_layout: BinaryLayout::default(),
        }
    }
}

impl ReaderRegistry {
    pub fn read(&self, path: &Path) -> Result<(SourceInfo, Array2<f64>)> {
        let format = FormatKind::from_path(path)?;

        let (data, warnings) = match format {
            FormatKind::DelimitedText => (text::read_delimited(path, self.delimiter)?, Vec::new()),
            FormatKind::RawBinary => (binary::read_raw(path, &self.binary_layout)?, Vec::new()),
            FormatKind::Raster => {
                let (data, warning) = raster::read_raster(path)?;
                (data, vec![warning])
            }
        };

        let (rows, cols) = data.dim();
        debug!("Decoded {} as {:?}: {}x{}", path.display(), format, rows, cols);

        Ok((
            SourceInfo {
                path: path.to_path_buf(),
                format,
                rows,
                cols,
                warnings,
            },
            data,
        ))
    }
}

/// Read with the default decoder settings.
pub fn read_image(path: &Path) -> Result<(SourceInfo, Array2<f64>)> {
    ReaderRegistry::default().read(path)
}
