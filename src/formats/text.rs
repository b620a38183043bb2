/// Delimited-text numeric grids: one image row per line.

use std::fs;
use std::path::Path;

use ndarray::Array2;

use crate::error::{Result, SpotError};

pub fn read_delimited(path: &Path, delimiter: char) -> Result<Array2<f64>> {
    let text = fs::read_to_string(path).map_err(|e| SpotError::io(path, e))?;
    parse_delimited(&text, delimiter).map_err(|reason| SpotError::malformed(path, reason))
}

/// Parse a grid of numbers.
///
/// Blank lines and `#` comments are skipped. An empty field or `nan` is a
/// missing sample and becomes NaN. Every row must have the same field count.
pub(crate) fn parse_delimited(text: &str, delimiter: char) -> std::result::Result<Array2<f64>, String> {
    let mut values = Vec::new();
    let mut cols: Option<usize> = None;
    let mut rows = 0usize;

    for (line_idx, line) in text.lines().enumerate() {
        let line = line.trim_start_matches('\u{feff}').trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let mut count = 0usize;
        for (col_idx, token) in line.split(delimiter).enumerate() {
            let token = token.trim();
            let value = parse_sample(token).ok_or_else(|| {
                format!(
                    "line {}, column {}: '{}' is not a number",
                    line_idx + 1,
                    col_idx + 1,
                    token
                )
            })?;
            values.push(value);
            count += 1;
        }

        match cols {
            None => cols = Some(count),
            Some(expected) if expected != count => {
                return Err(format!(
                    "line {}: expected {} values, found {}",
                    line_idx + 1,
                    expected,
                    count
                ));
            }
            Some(_) => {}
        }
        rows += 1;
    }

    let cols = cols.ok_or_else(|| "no data rows".to_string())?;
    Array2::from_shape_vec((rows, cols), values).map_err(|e| e.to_string())
}

fn parse_sample(token: &str) -> Option<f64> {
    if token.is_empty() {
        return Some(f64::NAN);
    }
    token.parse::<f64>().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_grid() {
        let grid = parse_delimited("1, 2, 3\n4,5,6.5\n", ',').unwrap();
        assert_eq!(grid.dim(), (2, 3));
        assert_eq!(grid[[0, 1]], 2.0);
        assert_eq!(grid[[1, 2]], 6.5);
    }

    #[test]
    fn test_comments_blank_lines_and_bom() {
        let grid = parse_delimited("\u{feff}# header\n\n1,2\n\n3,4\n", ',').unwrap();
        assert_eq!(grid.dim(), (2, 2));
        assert_eq!(grid[[1, 0]], 3.0);
    }

    #[test]
    fn test_missing_samples_become_nan() {
        let grid = parse_delimited("1,,3\nnan,5,NaN\n", ',').unwrap();
        assert!(grid[[0, 1]].is_nan());
        assert!(grid[[1, 0]].is_nan());
        assert!(grid[[1, 2]].is_nan());
        assert_eq!(grid[[1, 1]], 5.0);
    }

    #[test]
    fn test_ragged_rows_rejected() {
        let err = parse_delimited("1,2,3\n4,5\n", ',').unwrap_err();
        assert!(err.contains("line 2"), "{}", err);
    }

    #[test]
    fn test_non_numeric_token_rejected() {
        let err = parse_delimited("1,2\n3,abc\n", ',').unwrap_err();
        assert!(err.contains("abc"), "{}", err);
    }

    #[test]
    fn test_empty_input_rejected() {
        assert!(parse_delimited("", ',').is_err());
        assert!(parse_delimited("# only a comment\n", ',').is_err());
    }

    #[test]
    fn test_other_delimiter() {
        let grid = parse_delimited("1;2\n3;4\n", ';').unwrap();
        assert_eq!(grid[[1, 1]], 4.0);
    }

    #[test]
    fn test_read_delimited_reports_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.csv");
        std::fs::write(&path, "1,2\nx,4\n").unwrap();

        match read_delimited(&path, ',') {
            Err(SpotError::MalformedData { path: p, reason }) => {
                assert_eq!(p, path);
                assert!(reason.contains("line 2"), "{}", reason);
            }
            other => panic!("expected MalformedData, got {:?}", other),
        }
    }
}
