//! Multi-band imagery grid

use crate::crs::CRS;
use crate::error::{Error, Result};
use crate::raster::{GeoTransform, Raster};
use ndarray::{s, Array2, Array3, ArrayView1};

/// A georeferenced multi-band image.
///
/// Samples are held pixel-interleaved as `(row, col, band)`, which is the
/// layout chunky GeoTIFFs decode to and the layout the feature matrix needs:
/// flattening the first two axes yields one row per pixel in raster
/// row-major order.
#[derive(Debug, Clone)]
pub struct MultiBandRaster {
    data: Array3<f64>,
    transform: GeoTransform,
    crs: Option<CRS>,
    nodata: Option<f64>,
}

impl MultiBandRaster {
    /// Build from pixel-interleaved samples (`rows * cols * bands` values).
    pub fn from_interleaved(data: Vec<f64>, rows: usize, cols: usize, bands: usize) -> Result<Self> {
        if bands == 0 || data.len() != rows * cols * bands {
            return Err(Error::InvalidDimensions {
                width: cols,
                height: rows,
                bands,
            });
        }
        let array = Array3::from_shape_vec((rows, cols, bands), data)
            .map_err(|e| Error::Other(e.to_string()))?;
        Ok(Self::from_array(array))
    }

    /// Build from a stack of equally-sized single-band grids.
    pub fn from_bands(bands: &[Array2<f64>]) -> Result<Self> {
        let first = bands.first().ok_or(Error::InvalidDimensions {
            width: 0,
            height: 0,
            bands: 0,
        })?;
        let (rows, cols) = first.dim();
        let mut data = Array3::zeros((rows, cols, bands.len()));
        for (b, band) in bands.iter().enumerate() {
            if band.dim() != (rows, cols) {
                return Err(Error::InvalidDimensions {
                    width: band.ncols(),
                    height: band.nrows(),
                    bands: bands.len(),
                });
            }
            data.slice_mut(s![.., .., b]).assign(band);
        }
        Ok(Self::from_array(data))
    }

    /// Wrap an existing `(row, col, band)` array
    pub fn from_array(data: Array3<f64>) -> Self {
        Self {
            data,
            transform: GeoTransform::default(),
            crs: None,
            nodata: None,
        }
    }

    /// Image width in pixels
    pub fn width(&self) -> usize {
        self.data.dim().1
    }

    /// Image height in pixels
    pub fn height(&self) -> usize {
        self.data.dim().0
    }

    /// Number of bands
    pub fn band_count(&self) -> usize {
        self.data.dim().2
    }

    /// Number of pixels (`width * height`)
    pub fn pixel_count(&self) -> usize {
        self.width() * self.height()
    }

    /// Band vector of the pixel at (row, col)
    pub fn pixel(&self, row: usize, col: usize) -> Result<ArrayView1<'_, f64>> {
        if row >= self.height() || col >= self.width() {
            return Err(Error::IndexOutOfBounds {
                row,
                col,
                rows: self.height(),
                cols: self.width(),
            });
        }
        Ok(self.data.slice(s![row, col, ..]))
    }

    /// Extract one band (0-based) as a single-band raster sharing this
    /// image's georeferencing.
    pub fn band(&self, index: usize) -> Result<Raster> {
        if index >= self.band_count() {
            return Err(Error::Other(format!(
                "band {} out of range (image has {} bands)",
                index + 1,
                self.band_count()
            )));
        }
        let mut raster = Raster::from_array(self.data.slice(s![.., .., index]).to_owned());
        self.copy_meta_to(&mut raster);
        Ok(raster)
    }

    /// Flatten into a `(height * width, bands)` matrix, one row per pixel in
    /// row-major pixel order.
    pub fn to_feature_matrix(&self) -> Array2<f64> {
        let (rows, cols, bands) = self.data.dim();
        Array2::from_shape_fn((rows * cols, bands), |(pixel, band)| {
            self.data[[pixel / cols, pixel % cols, band]]
        })
    }

    /// Reshape a per-pixel vector (as produced from the feature matrix) into
    /// a single-band raster on this image's grid.
    pub fn reshape_prediction(&self, values: Vec<f64>) -> Result<Raster> {
        if values.len() != self.pixel_count() {
            return Err(Error::SchemaMismatch(format!(
                "prediction has {} values but the image has {} x {} = {} pixels",
                values.len(),
                self.width(),
                self.height(),
                self.pixel_count()
            )));
        }
        let mut raster = Raster::from_vec(values, self.height(), self.width())?;
        self.copy_meta_to(&mut raster);
        Ok(raster)
    }

    fn copy_meta_to(&self, raster: &mut Raster) {
        raster.set_transform(self.transform);
        raster.set_crs(self.crs.clone());
        raster.set_nodata(self.nodata);
    }

    // Metadata

    pub fn transform(&self) -> &GeoTransform {
        &self.transform
    }

    pub fn set_transform(&mut self, transform: GeoTransform) {
        self.transform = transform;
    }

    pub fn crs(&self) -> Option<&CRS> {
        self.crs.as_ref()
    }

    pub fn set_crs(&mut self, crs: Option<CRS>) {
        self.crs = crs;
    }

    /// No-data sentinel, if any. Predictions always use NaN.
    pub fn nodata(&self) -> Option<f64> {
        self.nodata
    }

    pub fn set_nodata(&mut self, nodata: Option<f64>) {
        self.nodata = nodata;
    }

    /// Geo offset between the corners of pixel (0,0) and (1,1)
    pub fn pixel_size(&self) -> (f64, f64) {
        self.transform.pixel_size()
    }

    /// Geographic bounds (min_x, min_y, max_x, max_y)
    pub fn bounds(&self) -> (f64, f64, f64, f64) {
        self.transform.bounds(self.width(), self.height())
    }
}
