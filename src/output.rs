use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use anyhow::{Context, Result};
use image::{ImageBuffer, Luma};
use ndarray::Array2;

use crate::analysis::derive::Projection;
use crate::analysis::SpotReport;

/// Write a grid as comma-separated rows. NaN is written as `NaN`.
pub fn save_csv<P: AsRef<Path>>(data: &Array2<f64>, path: P) -> Result<()> {
    let path = path.as_ref();
    let file = File::create(path)
        .with_context(|| format!("Failed to create {}", path.display()))?;
    let mut out = BufWriter::new(file);

    for row in data.rows() {
        let line: Vec<String> = row.iter().map(|v| v.to_string()).collect();
        writeln!(out, "{}", line.join(","))?;
    }
    out.flush().context("Failed to write CSV")?;
    Ok(())
}

/// Write `axis,data,fit` columns with a header line.
pub fn save_projection_csv<P: AsRef<Path>>(projection: &Projection, path: P) -> Result<()> {
    let path = path.as_ref();
    let file = File::create(path)
        .with_context(|| format!("Failed to create {}", path.display()))?;
    let mut out = BufWriter::new(file);

    writeln!(out, "# axis,data,fit")?;
    for ((a, d), f) in projection
        .axis
        .iter()
        .zip(projection.data.iter())
        .zip(projection.fit.iter())
    {
        writeln!(out, "{},{},{}", a, d, f)?;
    }
    out.flush().context("Failed to write projection")?;
    Ok(())
}

/// Save a grid as a 16-bit grayscale TIFF, mapping `[low, high]` to `[0, 65535]`.
/// NaN maps to 0.
pub fn save_tiff_16bit<P: AsRef<Path>>(data: &Array2<f64>, low: f64, high: f64, path: P) -> Result<()> {
    let (height, width) = data.dim();
    let span = if high > low { high - low } else { 1.0 };

    let pixels: Vec<u16> = data
        .iter()
        .map(|&v| {
            if v.is_nan() {
                0
            } else {
                ((v - low) / span * 65535.0).round().clamp(0.0, 65535.0) as u16
            }
        })
        .collect();

    let img_buffer: ImageBuffer<Luma<u16>, Vec<u16>> =
        ImageBuffer::from_raw(width as u32, height as u32, pixels)
            .context("Failed to create image buffer")?;

    img_buffer
        .save(path.as_ref())
        .context("Failed to save TIFF")?;

    Ok(())
}

/// Write every artifact of a report into `dir`.
///
/// `data.csv`, `fit.csv`, `residual.csv`, `projection_x.csv`,
/// `projection_y.csv` and `fit.tiff` (scaled to the fitted range).
pub fn save_report<P: AsRef<Path>>(report: &SpotReport, dir: P) -> Result<()> {
    let dir = dir.as_ref();
    std::fs::create_dir_all(dir)
        .with_context(|| format!("Failed to create {}", dir.display()))?;

    save_csv(report.image.data(), dir.join("data.csv"))?;
    save_csv(report.fitted(), dir.join("fit.csv"))?;
    save_csv(report.residual(), dir.join("residual.csv"))?;
    save_projection_csv(&report.metrics.projection_x, dir.join("projection_x.csv"))?;
    save_projection_csv(&report.metrics.projection_y, dir.join("projection_y.csv"))?;

    let (low, high) = report
        .fitted()
        .iter()
        .filter(|v| v.is_finite())
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &v| (lo.min(v), hi.max(v)));
    save_tiff_16bit(report.fitted(), low, high, dir.join("fit.tiff"))?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::formats::text::read_delimited;
    use ndarray::{array, Array1};

    #[test]
    fn test_csv_roundtrip_keeps_nan_and_precision() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("grid.csv");
        let data = array![[0.1, -2.5e-7, f64::NAN], [1234567.891, 0.0, 3.0]];
        save_csv(&data, &path).unwrap();

        let back = read_delimited(&path, ',').unwrap();
        assert_eq!(back.dim(), (2, 3));
        assert!(back[[0, 2]].is_nan());
        assert_eq!(back[[0, 0]], 0.1);
        assert_eq!(back[[0, 1]], -2.5e-7);
        assert_eq!(back[[1, 0]], 1234567.891);
    }

    #[test]
    fn test_projection_csv_rereads_as_grid() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("px.csv");
        let projection = Projection {
            axis: Array1::from(vec![-25.0, 0.0]),
            data: Array1::from(vec![10.0, 20.0]),
            fit: Array1::from(vec![11.0, 19.0]),
        };
        save_projection_csv(&projection, &path).unwrap();

        let back = read_delimited(&path, ',').unwrap();
        assert_eq!(back, array![[-25.0, 10.0, 11.0], [0.0, 20.0, 19.0]]);
    }

    #[test]
    fn test_tiff_scaling() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("fit.tiff");
        let data = array![[0.0, 50.0], [100.0, f64::NAN]];
        save_tiff_16bit(&data, 0.0, 100.0, &path).unwrap();

        let img = image::open(&path).unwrap().to_luma16();
        assert_eq!(img.get_pixel(0, 0)[0], 0);
        assert_eq!(img.get_pixel(1, 0)[0], 32768);
        assert_eq!(img.get_pixel(0, 1)[0], 65535);
        assert_eq!(img.get_pixel(1, 1)[0], 0);
    }
}
