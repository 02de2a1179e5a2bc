//! Raster data structures

mod geotransform;
mod grid;
mod multiband;

pub use geotransform::GeoTransform;
pub use grid::{Raster, RasterStatistics};
pub use multiband::MultiBandRaster;
