//! Image reading and prediction writing through GDAL

use crate::crs::CRS;
use crate::error::{Error, Result};
use crate::raster::{GeoTransform, MultiBandRaster, Raster};
use gdal::spatial_ref::SpatialRef;
use gdal::{Dataset, DriverManager};
use ndarray::Array2;
use std::path::Path;

/// Read every band of a GDAL-readable image
pub fn read_image(path: &Path) -> Result<MultiBandRaster> {
    let dataset = Dataset::open(path).map_err(|e| Error::ingestion(path, e))?;
    let (cols, rows) = dataset.raster_size();
    let count = dataset.raster_count() as usize;

    let mut bands = Vec::with_capacity(count);
    let mut nodata = None;
    for index in 1..=count {
        let band = dataset
            .rasterband(index as isize)
            .map_err(|e| Error::ingestion(path, e))?;
        let buffer = band
            .read_as::<f64>((0, 0), (cols, rows), (cols, rows), None)
            .map_err(|e| Error::ingestion(path, e))?;
        let grid = Array2::from_shape_vec((rows, cols), buffer.data().to_vec())
            .map_err(|e| Error::ingestion(path, e))?;
        if nodata.is_none() {
            nodata = band.no_data_value();
        }
        bands.push(grid);
    }

    let mut raster = MultiBandRaster::from_bands(&bands)?;

    if let Ok(gt) = dataset.geo_transform() {
        raster.set_transform(GeoTransform::from_gdal(gt));
    }

    if let Ok(srs) = dataset.spatial_ref() {
        // Prefer the authority code when GDAL can resolve one
        let crs = match srs.auth_code() {
            Ok(code) => Some(CRS::from_epsg(code as u32)),
            Err(_) => srs.to_wkt().ok().map(CRS::from_wkt),
        };
        raster.set_crs(crs);
    }

    raster.set_nodata(nodata);
    Ok(raster)
}

/// Write a single-band raster with the named GDAL driver
pub fn write_with_driver(raster: &Raster, path: &Path, driver_name: &str) -> Result<()> {
    let out = |e: gdal::errors::GdalError| Error::output(path, e);
    let driver = DriverManager::get_driver_by_name(driver_name).map_err(out)?;

    let (rows, cols) = raster.shape();
    let options: Vec<&str> = match driver_name {
        "GTiff" => vec!["COMPRESS=DEFLATE"],
        _ => Vec::new(),
    };

    let mut dataset = driver
        .create_with_band_type_with_options::<f64, _>(
            path,
            cols as isize,
            rows as isize,
            1,
            &options,
        )
        .map_err(out)?;

    dataset
        .set_geo_transform(&raster.transform().to_gdal())
        .map_err(out)?;

    if let Some(crs) = raster.crs() {
        let srs = match (crs.epsg(), crs.wkt()) {
            (Some(epsg), _) => Some(SpatialRef::from_epsg(epsg).map_err(out)?),
            (None, Some(wkt)) => Some(SpatialRef::from_wkt(wkt).map_err(out)?),
            (None, None) => None,
        };
        if let Some(srs) = srs {
            dataset.set_spatial_ref(&srs).map_err(out)?;
        }
    }

    let mut band = dataset.rasterband(1).map_err(out)?;
    band.set_no_data_value(Some(raster.nodata().unwrap_or(f64::NAN)))
        .map_err(out)?;

    let data = raster.to_vec();
    band.write((0, 0), (cols, rows), &data).map_err(out)?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_write_read_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("depth.img");

        let mut raster = Raster::from_vec((0..12).map(|v| -(v as f64)).collect(), 3, 4).unwrap();
        raster.set_transform(GeoTransform::new(0.0, 30.0, 10.0, -10.0));
        raster.set_crs(Some(CRS::from_epsg(32750)));

        write_with_driver(&raster, &path, "HFA").unwrap();
        let image = read_image(&path).unwrap();

        assert_eq!((image.height(), image.width()), (3, 4));
        assert_eq!(image.band(0).unwrap().get(2, 3).unwrap(), -11.0);
        assert_eq!(image.transform(), raster.transform());
    }
}
