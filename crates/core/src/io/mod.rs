//! I/O operations for reading imagery and writing predictions
//!
//! Imagery is opened through GDAL when the `gdal` feature is enabled and
//! through the native `tiff` reader otherwise. ASCII gridded XYZ is always
//! handled natively.

mod format;
#[cfg(feature = "gdal")]
mod gdal_io;
mod geokeys;
mod native;
mod xyz;

pub use format::OutputFormat;
pub use native::{read_geotiff, read_geotiff_from_buffer, write_geotiff, write_geotiff_to_buffer};
pub use xyz::{read_xyz, write_xyz};

use crate::error::{Error, Result};
use crate::raster::{MultiBandRaster, Raster};
use std::path::Path;

/// Open a multi-band image.
///
/// Files ending in `.xyz` are read as a single-band gridded XYZ; anything
/// else is treated as a GDAL-readable (or, natively, TIFF) image.
pub fn open_raster<P: AsRef<Path>>(path: P) -> Result<MultiBandRaster> {
    let path = path.as_ref();
    if !path.is_file() {
        return Err(Error::ingestion(path, "file does not exist"));
    }

    let raster = match OutputFormat::from_path(path) {
        Some(OutputFormat::AsciiXyz) => read_xyz(path)?,
        _ => open_image(path)?,
    };

    if raster.band_count() == 0 || raster.pixel_count() == 0 {
        return Err(Error::ingestion(path, "image has no bands or no pixels"));
    }

    tracing::debug!(
        path = %path.display(),
        width = raster.width(),
        height = raster.height(),
        bands = raster.band_count(),
        "opened image"
    );
    Ok(raster)
}

#[cfg(feature = "gdal")]
fn open_image(path: &Path) -> Result<MultiBandRaster> {
    gdal_io::read_image(path)
}

#[cfg(not(feature = "gdal"))]
fn open_image(path: &Path) -> Result<MultiBandRaster> {
    read_geotiff(path)
}

/// Write a single-band raster in the requested format.
///
/// Without the `gdal` feature only GeoTIFF and ASCII XYZ can be written;
/// Erdas Imagine yields [`Error::UnsupportedFormat`].
pub fn write_raster<P: AsRef<Path>>(raster: &Raster, path: P, format: OutputFormat) -> Result<()> {
    let path = path.as_ref();
    tracing::debug!(path = %path.display(), driver = format.driver_name(), "writing raster");
    match format {
        OutputFormat::AsciiXyz => write_xyz(raster, path),
        _ => write_driver(raster, path, format),
    }
}

#[cfg(feature = "gdal")]
fn write_driver(raster: &Raster, path: &Path, format: OutputFormat) -> Result<()> {
    gdal_io::write_with_driver(raster, path, format.driver_name())
}

#[cfg(not(feature = "gdal"))]
fn write_driver(raster: &Raster, path: &Path, format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::GeoTiff => write_geotiff(raster, path),
        other => Err(Error::UnsupportedFormat(format!(
            "{} output requires the `gdal` feature",
            other.driver_name()
        ))),
    }
}
