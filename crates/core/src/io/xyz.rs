//! ASCII gridded XYZ
//!
//! One `x y z` line per cell, cells in row-major order, coordinates at pixel
//! centres. No-data cells are written as `NaN`.

use crate::error::{Error, Result};
use crate::raster::{GeoTransform, MultiBandRaster, Raster};
use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::Path;

/// Write a single-band raster as gridded XYZ
pub fn write_xyz<P: AsRef<Path>>(raster: &Raster, path: P) -> Result<()> {
    let path = path.as_ref();
    let file = File::create(path).map_err(|e| Error::output(path, e))?;
    let mut writer = BufWriter::new(file);
    let transform = raster.transform();

    for ((row, col), value) in raster.data().indexed_iter() {
        let (x, y) = transform.pixel_to_geo(col, row);
        writeln!(writer, "{} {} {}", x, y, value).map_err(|e| Error::output(path, e))?;
    }
    writer.flush().map_err(|e| Error::output(path, e))
}

/// Read a gridded XYZ file into a single-band image.
///
/// The grid is inferred from the distinct x and y coordinates; cells absent
/// from the file are NaN. Lines that are empty or start with `#` are skipped.
pub fn read_xyz<P: AsRef<Path>>(path: P) -> Result<MultiBandRaster> {
    let path = path.as_ref();
    let file = File::open(path).map_err(|e| Error::ingestion(path, e))?;

    let mut points = Vec::new();
    for (index, line) in BufReader::new(file).lines().enumerate() {
        let line = line.map_err(|e| Error::ingestion(path, e))?;
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }
        let fields: Vec<&str> = trimmed
            .split(|c: char| c.is_whitespace() || c == ',' || c == ';')
            .filter(|s| !s.is_empty())
            .collect();
        let parsed: Option<Vec<f64>> = fields.iter().take(3).map(|f| f.parse().ok()).collect();
        match parsed {
            Some(v) if v.len() == 3 => points.push((v[0], v[1], v[2])),
            _ => {
                return Err(Error::Parse {
                    path: path.to_path_buf(),
                    line: index as u64 + 1,
                    reason: format!("expected three numeric fields, found '{}'", trimmed),
                })
            }
        }
    }

    if points.is_empty() {
        return Err(Error::ingestion(path, "no XYZ records"));
    }

    let xs = distinct(points.iter().map(|p| p.0), false);
    let ys = distinct(points.iter().map(|p| p.1), true);
    let (cols, rows) = (xs.len(), ys.len());

    let step_x = spacing(&xs);
    let step_y = spacing(&ys);
    let pixel_width = step_x.or(step_y.map(f64::abs)).unwrap_or(1.0);
    let pixel_height = step_y.or(step_x.map(|s| -s.abs())).unwrap_or(-1.0);

    let mut grid = vec![f64::NAN; rows * cols];
    for &(x, y, z) in &points {
        let col = ((x - xs[0]) / pixel_width).round() as usize;
        let row = ((y - ys[0]) / pixel_height).round() as usize;
        if col >= cols || row >= rows {
            return Err(Error::ingestion(path, "points do not lie on a regular grid"));
        }
        grid[row * cols + col] = z;
    }

    let mut raster = MultiBandRaster::from_interleaved(grid, rows, cols, 1)?;
    raster.set_transform(GeoTransform::new(
        xs[0] - pixel_width / 2.0,
        ys[0] - pixel_height / 2.0,
        pixel_width,
        pixel_height,
    ));
    Ok(raster)
}

/// Sorted distinct coordinates (descending when `descending`)
fn distinct(values: impl Iterator<Item = f64>, descending: bool) -> Vec<f64> {
    let mut v: Vec<f64> = values.collect();
    v.sort_by(|a, b| a.total_cmp(b));
    if descending {
        v.reverse();
    }
    v.dedup_by(|a, b| (*a - *b).abs() <= 1e-9 * a.abs().max(1.0));
    v
}

fn spacing(coords: &[f64]) -> Option<f64> {
    (coords.len() > 1).then(|| coords[1] - coords[0])
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_write_read_grid() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("depth.xyz");

        let mut raster = Raster::from_vec(vec![-1.0, -2.0, -3.0, f64::NAN, -5.0, -6.0], 2, 3).unwrap();
        raster.set_transform(GeoTransform::new(100.0, 200.0, 2.0, -2.0));
        write_xyz(&raster, &path).unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        assert_eq!(text.lines().next(), Some("101 199 -1"));
        assert_eq!(text.lines().count(), 6);

        let image = read_xyz(&path).unwrap();
        assert_eq!((image.height(), image.width(), image.band_count()), (2, 3, 1));
        assert_eq!(image.transform(), raster.transform());
        let band = image.band(0).unwrap();
        assert_relative_eq!(band.get(1, 2).unwrap(), -6.0);
        assert!(band.get(1, 0).unwrap().is_nan());
    }

    #[test]
    fn test_bad_line_reports_line_number() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.xyz");
        std::fs::write(&path, "0 0 1\n1 0 two\n").unwrap();
        match read_xyz(&path) {
            Err(Error::Parse { line, .. }) => assert_eq!(line, 2),
            other => panic!("expected parse error, got {:?}", other),
        }
    }
}
