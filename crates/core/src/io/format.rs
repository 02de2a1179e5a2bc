//! Output raster formats

use crate::error::{Error, Result};
use std::fmt;
use std::path::Path;
use std::str::FromStr;

/// Raster formats a prediction can be written as.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputFormat {
    /// GeoTIFF (`.tif`)
    #[default]
    GeoTiff,
    /// Erdas Imagine image (`.img`), requires the `gdal` feature
    ErdasImagine,
    /// ASCII gridded XYZ (`.xyz`)
    AsciiXyz,
}

impl OutputFormat {
    pub const ALL: [OutputFormat; 3] = [
        OutputFormat::AsciiXyz,
        OutputFormat::ErdasImagine,
        OutputFormat::GeoTiff,
    ];

    /// GDAL short driver name
    pub fn driver_name(&self) -> &'static str {
        match self {
            OutputFormat::GeoTiff => "GTiff",
            OutputFormat::ErdasImagine => "HFA",
            OutputFormat::AsciiXyz => "XYZ",
        }
    }

    /// Conventional file extension (without the dot)
    pub fn extension(&self) -> &'static str {
        match self {
            OutputFormat::GeoTiff => "tif",
            OutputFormat::ErdasImagine => "img",
            OutputFormat::AsciiXyz => "xyz",
        }
    }

    /// Human-readable format name as shown in file filters
    pub fn description(&self) -> &'static str {
        match self {
            OutputFormat::GeoTiff => "GeoTIFF (*.tif)",
            OutputFormat::ErdasImagine => "Erdas Imagine image (*.img)",
            OutputFormat::AsciiXyz => "ASCII Gridded XYZ (*.xyz)",
        }
    }

    /// Infer the format from a path's extension (case-insensitive)
    pub fn from_path(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?.to_ascii_lowercase();
        match ext.as_str() {
            "tif" | "tiff" => Some(OutputFormat::GeoTiff),
            "img" => Some(OutputFormat::ErdasImagine),
            "xyz" => Some(OutputFormat::AsciiXyz),
            _ => None,
        }
    }
}

impl FromStr for OutputFormat {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "gtiff" | "geotiff" | "tif" | "tiff" => Ok(OutputFormat::GeoTiff),
            "hfa" | "erdas" | "img" => Ok(OutputFormat::ErdasImagine),
            "xyz" | "ascii" => Ok(OutputFormat::AsciiXyz),
            _ => Err(Error::UnsupportedFormat(s.to_string())),
        }
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.description())
    }
}
