//! # SDB Core
//!
//! Core types and I/O for the satellite-derived bathymetry workspace.
//!
//! This crate provides:
//! - `MultiBandRaster`: a georeferenced pixel-by-band grid read from imagery
//! - `Raster`: a single-band georeferenced grid (prediction output)
//! - `GeoTransform`: Affine transformation for georeferencing
//! - `CRS`: Coordinate Reference System handling
//! - `SampleTable`: merged depth/reflectance samples from delimited files
//! - I/O for GeoTIFF, ASCII gridded XYZ and (with `gdal`) Erdas Imagine

pub mod crs;
pub mod error;
pub mod io;
pub mod raster;
pub mod samples;

pub use crs::CRS;
pub use error::{Error, Result};
pub use raster::{GeoTransform, MultiBandRaster, Raster};
pub use samples::{SampleFormat, SampleTable};

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::crs::CRS;
    pub use crate::error::{Error, Result};
    pub use crate::io::{open_raster, write_raster, OutputFormat};
    pub use crate::raster::{GeoTransform, MultiBandRaster, Raster};
    pub use crate::samples::{discover_in_folder, load_many, Delimiter, SampleFormat, SampleTable};
}
