//! Native GeoTIFF reading/writing (without GDAL dependency)
//!
//! Uses the `tiff` crate for TIFF I/O. Reads chunky or planar images with any
//! number of samples per pixel and any integer/float sample type; writes
//! single-band 64-bit float images. Georeferencing is carried by the
//! ModelPixelScale/ModelTiepoint (or ModelTransformation) tags, the CRS by the
//! GeoKeyDirectory, and the no-data value by the GDAL_NODATA tag.

use super::geokeys::{self, GDAL_NODATA, GEO_ASCII_PARAMS, GEO_KEY_DIRECTORY};
use crate::error::{Error, Result};
use crate::raster::{GeoTransform, MultiBandRaster, Raster};
use ndarray::Array2;
use num_traits::ToPrimitive;
use std::fs::File;
use std::io::{BufWriter, Cursor, Read, Seek, Write};
use std::path::Path;
use tiff::decoder::{Decoder, DecodingResult, Limits};
use tiff::encoder::colortype::Gray64Float;
use tiff::encoder::TiffEncoder;
use tiff::tags::Tag;

const PLANAR_SEPARATE: u32 = 2;

/// Read a GeoTIFF file with all of its bands
pub fn read_geotiff<P: AsRef<Path>>(path: P) -> Result<MultiBandRaster> {
    let path = path.as_ref();
    let file = File::open(path).map_err(|e| Error::ingestion(path, e))?;
    decode_geotiff(file).map_err(|reason| Error::ingestion(path, reason))
}

/// Read a GeoTIFF from an in-memory buffer
pub fn read_geotiff_from_buffer(data: &[u8]) -> Result<MultiBandRaster> {
    decode_geotiff(Cursor::new(data)).map_err(|reason| Error::ingestion("<buffer>", reason))
}

fn geo_tag(code: u16) -> Tag {
    Tag::from_u16_exhaustive(code)
}

fn widen<T: ToPrimitive>(buf: Vec<T>) -> Vec<f64> {
    buf.into_iter().map(|v| v.to_f64().unwrap_or(f64::NAN)).collect()
}

/// Internal: decode a GeoTIFF from any `Read + Seek` source
fn decode_geotiff<R: Read + Seek>(reader: R) -> std::result::Result<MultiBandRaster, String> {
    // Scenes routinely exceed the decoder's default buffer limits
    let mut decoder = Decoder::new(reader)
        .map_err(|e| format!("TIFF decode error: {}", e))?
        .with_limits(Limits::unlimited());

    let (width, height) = decoder
        .dimensions()
        .map_err(|e| format!("cannot read dimensions: {}", e))?;
    let rows = height as usize;
    let cols = width as usize;

    let bands = decoder.get_tag_u32(Tag::SamplesPerPixel).unwrap_or(1) as usize;
    if bands == 0 {
        return Err("image has zero bands".to_string());
    }
    let planar = decoder.get_tag_u32(Tag::PlanarConfiguration).unwrap_or(1);

    let samples = match decoder
        .read_image()
        .map_err(|e| format!("cannot read image data: {}", e))?
    {
        DecodingResult::U8(buf) => widen(buf),
        DecodingResult::U16(buf) => widen(buf),
        DecodingResult::U32(buf) => widen(buf),
        DecodingResult::U64(buf) => widen(buf),
        DecodingResult::I8(buf) => widen(buf),
        DecodingResult::I16(buf) => widen(buf),
        DecodingResult::I32(buf) => widen(buf),
        DecodingResult::I64(buf) => widen(buf),
        DecodingResult::F32(buf) => widen(buf),
        DecodingResult::F64(buf) => buf,
        #[allow(unreachable_patterns)]
        _ => return Err("unsupported TIFF sample format".to_string()),
    };

    if samples.len() != rows * cols * bands {
        return Err(format!(
            "expected {} x {} x {} samples, decoded {}",
            cols,
            rows,
            bands,
            samples.len()
        ));
    }

    let mut raster = if planar == PLANAR_SEPARATE && bands > 1 {
        let planes: Vec<Array2<f64>> = samples
            .chunks_exact(rows * cols)
            .map(|plane| Array2::from_shape_vec((rows, cols), plane.to_vec()))
            .collect::<std::result::Result<_, _>>()
            .map_err(|e| e.to_string())?;
        MultiBandRaster::from_bands(&planes).map_err(|e| e.to_string())?
    } else {
        MultiBandRaster::from_interleaved(samples, rows, cols, bands).map_err(|e| e.to_string())?
    };

    if let Some(transform) = read_geotransform(&mut decoder) {
        raster.set_transform(transform);
    }

    if let Ok(directory) = decoder.get_tag_u16_vec(geo_tag(GEO_KEY_DIRECTORY)) {
        let ascii = decoder.get_tag_ascii_string(geo_tag(GEO_ASCII_PARAMS)).ok();
        raster.set_crs(geokeys::decode(&directory, ascii.as_deref()));
    }

    if let Ok(text) = decoder.get_tag_ascii_string(geo_tag(GDAL_NODATA)) {
        raster.set_nodata(text.trim_end_matches('\0').trim().parse::<f64>().ok());
    }

    Ok(raster)
}

/// Attempt to read the GeoTransform from TIFF tags
fn read_geotransform<R: Read + Seek>(decoder: &mut Decoder<R>) -> Option<GeoTransform> {
    let scale = decoder.get_tag_f64_vec(geo_tag(geokeys::MODEL_PIXEL_SCALE)).ok();
    let tiepoint = decoder.get_tag_f64_vec(geo_tag(geokeys::MODEL_TIEPOINT)).ok();

    if let (Some(scale), Some(tiepoint)) = (scale, tiepoint) {
        if let Some(transform) = GeoTransform::from_tiepoint(&tiepoint, &scale) {
            return Some(transform);
        }
    }

    decoder
        .get_tag_f64_vec(geo_tag(geokeys::MODEL_TRANSFORMATION))
        .ok()
        .and_then(|m| GeoTransform::from_model_transformation(&m))
}

/// Write a single-band raster to a GeoTIFF file
///
/// Cells are written as 64-bit floats together with the raster's transform,
/// CRS and no-data value.
pub fn write_geotiff<P: AsRef<Path>>(raster: &Raster, path: P) -> Result<()> {
    let path = path.as_ref();
    let file = File::create(path).map_err(|e| Error::output(path, e))?;
    let mut writer = BufWriter::new(file);
    encode_geotiff(raster, &mut writer).map_err(|reason| Error::output(path, reason))?;
    writer.flush().map_err(|e| Error::output(path, e))
}

/// Write a single-band raster to an in-memory GeoTIFF buffer
pub fn write_geotiff_to_buffer(raster: &Raster) -> Result<Vec<u8>> {
    let mut buf = Vec::new();
    encode_geotiff(raster, &mut Cursor::new(&mut buf))
        .map_err(|reason| Error::output("<buffer>", reason))?;
    Ok(buf)
}

/// Internal: encode a Raster as GeoTIFF into any `Write + Seek` sink
fn encode_geotiff<W: Write + Seek>(raster: &Raster, writer: W) -> std::result::Result<(), String> {
    let mut encoder = TiffEncoder::new(writer).map_err(|e| format!("TIFF encoder error: {}", e))?;

    let (rows, cols) = raster.shape();
    let data = raster.to_vec();

    let mut image = encoder
        .new_image::<Gray64Float>(cols as u32, rows as u32)
        .map_err(|e| format!("cannot create TIFF image: {}", e))?;

    let tag_err = |name: &str, e: tiff::TiffError| format!("cannot write {} tag: {}", name, e);
    let gt = raster.transform();

    if gt.row_rotation == 0.0 && gt.col_rotation == 0.0 {
        let scale = [gt.pixel_width, -gt.pixel_height, 0.0];
        image
            .encoder()
            .write_tag(geo_tag(geokeys::MODEL_PIXEL_SCALE), &scale[..])
            .map_err(|e| tag_err("pixel scale", e))?;

        let tiepoint = [0.0, 0.0, 0.0, gt.origin_x, gt.origin_y, 0.0];
        image
            .encoder()
            .write_tag(geo_tag(geokeys::MODEL_TIEPOINT), &tiepoint[..])
            .map_err(|e| tag_err("tiepoint", e))?;
    } else {
        let matrix = gt.to_model_transformation();
        image
            .encoder()
            .write_tag(geo_tag(geokeys::MODEL_TRANSFORMATION), &matrix[..])
            .map_err(|e| tag_err("transformation", e))?;
    }

    let keys = geokeys::encode(raster.crs());
    image
        .encoder()
        .write_tag(geo_tag(GEO_KEY_DIRECTORY), keys.directory.as_slice())
        .map_err(|e| tag_err("geokey directory", e))?;
    if let Some(ascii) = &keys.ascii {
        image
            .encoder()
            .write_tag(geo_tag(GEO_ASCII_PARAMS), ascii.as_str())
            .map_err(|e| tag_err("geo ascii params", e))?;
    }

    if let Some(nodata) = raster.nodata() {
        let text = if nodata.is_nan() {
            "nan".to_string()
        } else {
            nodata.to_string()
        };
        image
            .encoder()
            .write_tag(geo_tag(GDAL_NODATA), text.as_str())
            .map_err(|e| tag_err("nodata", e))?;
    }

    image
        .write_data(&data)
        .map_err(|e| format!("cannot write image data: {}", e))?;

    Ok(())
}
