//! Writing predictions and reports to disk

use super::report::{megabytes, RunReport};
use sdb_core::io::{write_raster, OutputFormat};
use sdb_core::{Error, MultiBandRaster, Result};
use std::fs;
use std::path::{Path, PathBuf};

/// Reshape a per-pixel prediction onto the grid of `reference` and write it
/// as a single-band raster with the reference CRS and transform. No-data is
/// NaN.
pub fn write_prediction<P: AsRef<Path>>(
    values: &[f64],
    reference: &MultiBandRaster,
    path: P,
    format: OutputFormat,
) -> Result<()> {
    let mut raster = reference.reshape_prediction(values.to_vec())?;
    raster.set_nodata(Some(f64::NAN));
    write_raster(&raster, path, format)
}

/// `<dir>/<stem>_report.txt` for an output raster at `<dir>/<stem>.<ext>`
pub fn report_path(output: &Path) -> PathBuf {
    let stem = output
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    output.with_file_name(format!("{}_report.txt", stem))
}

/// Write the report text next to an already written output raster, closing
/// with an `Output:` line that carries the raster's size. Returns the
/// report path.
pub fn write_report<P: AsRef<Path>>(report: &RunReport, output: P) -> Result<PathBuf> {
    let output = output.as_ref();
    let bytes = fs::metadata(output)
        .map_err(|e| Error::output(output, format!("output raster not found: {}", e)))?
        .len();

    let path = report_path(output);
    let text = format!(
        "{}Output:\t\t{} ({} MB)",
        report,
        output.display(),
        megabytes(bytes)
    );
    fs::write(&path, text).map_err(|e| Error::output(&path, e))?;
    tracing::info!(report = %path.display(), "report written");
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use sdb_core::io::open_raster;
    use sdb_core::{GeoTransform, CRS};
    use tempfile::tempdir;

    fn reference() -> MultiBandRaster {
        let mut image =
            MultiBandRaster::from_interleaved(vec![0.1; 2 * 3 * 2], 2, 3, 2).unwrap();
        image.set_transform(GeoTransform::new(500_000.0, 9_000_000.0, 10.0, -10.0));
        image.set_crs(Some(CRS::from_epsg(32750)));
        image
    }

    #[test]
    fn test_report_path() {
        assert_eq!(
            report_path(Path::new("/data/out/depth.tif")),
            PathBuf::from("/data/out/depth_report.txt")
        );
        assert_eq!(
            report_path(Path::new("depth.v2.img")),
            PathBuf::from("depth.v2_report.txt")
        );
    }

    #[test]
    fn test_write_prediction_geotiff() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("depth.tif");
        let values = [-1.0, -2.0, f64::NAN, -4.0, -5.0, -6.0];
        write_prediction(&values, &reference(), &path, OutputFormat::GeoTiff).unwrap();

        let back = open_raster(&path).unwrap();
        assert_eq!((back.height(), back.width(), back.band_count()), (2, 3, 1));
        assert_eq!(back.crs().and_then(|c| c.epsg()), Some(32750));
        assert_eq!(back.transform(), reference().transform());
        let band = back.band(0).unwrap();
        assert_eq!(band.get(0, 1).unwrap(), -2.0);
        assert!(band.get(0, 2).unwrap().is_nan());
        assert_eq!(band.get(1, 2).unwrap(), -6.0);
    }

    #[test]
    fn test_write_prediction_wrong_length() {
        let dir = tempdir().unwrap();
        let result = write_prediction(
            &[-1.0, -2.0],
            &reference(),
            dir.path().join("x.tif"),
            OutputFormat::GeoTiff,
        );
        assert!(matches!(result, Err(Error::SchemaMismatch(_))));
    }

    #[test]
    fn test_write_prediction_xyz() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("depth.xyz");
        let values = [-1.0, -2.0, -3.0, -4.0, -5.0, -6.0];
        write_prediction(&values, &reference(), &path, OutputFormat::AsciiXyz).unwrap();
        let text = fs::read_to_string(&path).unwrap();
        assert_eq!(text.lines().count(), 6);
        assert_eq!(text.lines().next().unwrap(), "500005 8999995 -1");
    }
}
