//! GeoTIFF tag codes and GeoKeyDirectory encoding.
//!
//! Only the keys needed to carry a CRS through a read/write cycle are
//! handled: GTModelType, GTRasterType, GTCitation (pointing into
//! GeoAsciiParams), GeographicType and ProjectedCSType.

use crate::crs::CRS;

pub(crate) const MODEL_PIXEL_SCALE: u16 = 33550;
pub(crate) const MODEL_TIEPOINT: u16 = 33922;
pub(crate) const MODEL_TRANSFORMATION: u16 = 34264;
pub(crate) const GEO_KEY_DIRECTORY: u16 = 34735;
pub(crate) const GEO_ASCII_PARAMS: u16 = 34737;
pub(crate) const GDAL_NODATA: u16 = 42113;

const GT_MODEL_TYPE: u16 = 1024;
const GT_RASTER_TYPE: u16 = 1025;
const GT_CITATION: u16 = 1026;
const GEOGRAPHIC_TYPE: u16 = 2048;
const PROJECTED_CS_TYPE: u16 = 3072;

const MODEL_PROJECTED: u16 = 1;
const MODEL_GEOGRAPHIC: u16 = 2;
const MODEL_USER_DEFINED: u16 = 32767;
const RASTER_PIXEL_IS_AREA: u16 = 1;

/// Encoded GeoKeyDirectory plus the GeoAsciiParams string it references.
pub(crate) struct EncodedKeys {
    pub directory: Vec<u16>,
    pub ascii: Option<String>,
}

/// Encode a CRS as GeoKeys.
///
/// An EPSG code that fits in a key value wins; otherwise the WKT is stored as
/// a GTCitation. Keys are emitted in ascending id order.
pub(crate) fn encode(crs: Option<&CRS>) -> EncodedKeys {
    let epsg = crs.and_then(|c| c.epsg()).and_then(|code| u16::try_from(code).ok());
    let wkt = crs.and_then(|c| c.wkt()).filter(|_| epsg.is_none());

    let model_type = match (epsg, crs) {
        (Some(_), Some(c)) if c.is_geographic() => MODEL_GEOGRAPHIC,
        (Some(_), _) => MODEL_PROJECTED,
        (None, _) if wkt.is_some() => MODEL_USER_DEFINED,
        _ => MODEL_PROJECTED,
    };

    let mut keys: Vec<[u16; 4]> = vec![
        [GT_MODEL_TYPE, 0, 1, model_type],
        [GT_RASTER_TYPE, 0, 1, RASTER_PIXEL_IS_AREA],
    ];

    let mut ascii = None;
    if let Some(text) = wkt {
        let citation = format!("{}|", text);
        keys.push([GT_CITATION, GEO_ASCII_PARAMS, citation.len() as u16, 0]);
        ascii = Some(citation);
    }

    if let Some(code) = epsg {
        let key = if model_type == MODEL_GEOGRAPHIC {
            GEOGRAPHIC_TYPE
        } else {
            PROJECTED_CS_TYPE
        };
        keys.push([key, 0, 1, code]);
    }

    let mut directory = vec![1, 1, 0, keys.len() as u16];
    directory.extend(keys.iter().flatten());

    EncodedKeys { directory, ascii }
}

/// Decode a CRS from a GeoKeyDirectory and optional GeoAsciiParams.
pub(crate) fn decode(directory: &[u16], ascii: Option<&str>) -> Option<CRS> {
    if directory.len() < 4 {
        return None;
    }
    let num_keys = directory[3] as usize;

    let mut epsg = None;
    let mut citation = None;

    for key in directory[4..].chunks_exact(4).take(num_keys) {
        let (id, location, count, value) = (key[0], key[1], key[2] as usize, key[3] as usize);
        match id {
            PROJECTED_CS_TYPE | GEOGRAPHIC_TYPE if location == 0 && value > 0 && value < 32767 => {
                // Projected wins over its underlying geographic CRS
                if id == PROJECTED_CS_TYPE || epsg.is_none() {
                    epsg = Some(value as u32);
                }
            }
            GT_CITATION if location == GEO_ASCII_PARAMS => {
                citation = ascii
                    .and_then(|s| s.get(value..value + count))
                    .map(|s| s.trim_end_matches(&['|', '\0'][..]).to_string())
                    .filter(|s| !s.is_empty());
            }
            _ => {}
        }
    }

    match (epsg, citation) {
        (Some(code), _) => Some(CRS::from_epsg(code)),
        (None, Some(wkt)) => Some(CRS::from_wkt(wkt)),
        (None, None) => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_projected_epsg_roundtrip() {
        let crs = CRS::from_epsg(32750);
        let keys = encode(Some(&crs));
        assert!(keys.ascii.is_none());
        assert_eq!(decode(&keys.directory, None), Some(crs));
    }

    #[test]
    fn test_geographic_uses_geographic_key() {
        let keys = encode(Some(&CRS::wgs84()));
        assert!(keys.directory.chunks(4).any(|k| k[0] == GEOGRAPHIC_TYPE && k[3] == 4326));
        assert_eq!(decode(&keys.directory, None), Some(CRS::wgs84()));
    }

    #[test]
    fn test_wkt_citation_roundtrip() {
        let crs = CRS::from_wkt("LOCAL_CS[\"harbour grid\"]");
        let keys = encode(Some(&crs));
        let ascii = keys.ascii.as_deref();
        assert_eq!(ascii, Some("LOCAL_CS[\"harbour grid\"]|"));
        assert_eq!(decode(&keys.directory, ascii), Some(crs));
    }

    #[test]
    fn test_no_crs() {
        let keys = encode(None);
        assert_eq!(keys.directory[3], 2);
        assert_eq!(decode(&keys.directory, None), None);
    }
}
