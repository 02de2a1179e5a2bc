//! Coordinate reference systems

use serde::{Deserialize, Serialize};
use std::fmt;

/// Coordinate Reference System carried from the input image to the output.
///
/// The native GeoTIFF path understands EPSG codes (via GeoKeys) and free-form
/// WKT citations; GDAL-backed I/O can populate both.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CRS {
    /// WKT representation
    wkt: Option<String>,
    /// EPSG code if known
    epsg: Option<u32>,
}

impl CRS {
    /// Create a CRS from an EPSG code
    pub fn from_epsg(code: u32) -> Self {
        Self {
            wkt: None,
            epsg: Some(code),
        }
    }

    /// Create a CRS from a WKT string
    pub fn from_wkt(wkt: impl Into<String>) -> Self {
        Self {
            wkt: Some(wkt.into()),
            epsg: None,
        }
    }

    /// WGS84 geographic CRS (EPSG:4326)
    pub fn wgs84() -> Self {
        Self::from_epsg(4326)
    }

    pub fn epsg(&self) -> Option<u32> {
        self.epsg
    }

    pub fn wkt(&self) -> Option<&str> {
        self.wkt.as_deref()
    }

    /// Whether the EPSG code falls in the geographic 2D range (4000..5000).
    ///
    /// Used to choose between GeographicTypeGeoKey and ProjectedCSTypeGeoKey
    /// when writing GeoTIFF keys. Unknown codes are treated as projected.
    pub fn is_geographic(&self) -> bool {
        matches!(self.epsg, Some(code) if (4000..5000).contains(&code))
    }

    /// `EPSG:<code>` when the code is known, else the WKT, else `Unknown`.
    /// This is what reports print.
    pub fn identifier(&self) -> String {
        if let Some(code) = self.epsg {
            return format!("EPSG:{}", code);
        }
        if let Some(wkt) = &self.wkt {
            return wkt.clone();
        }
        "Unknown".to_string()
    }
}

impl fmt::Display for CRS {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.identifier())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_crs_epsg() {
        let crs = CRS::from_epsg(32750);
        assert_eq!(crs.epsg(), Some(32750));
        assert_eq!(crs.identifier(), "EPSG:32750");
        assert!(!crs.is_geographic());
    }

    #[test]
    fn test_crs_geographic_range() {
        assert!(CRS::wgs84().is_geographic());
        assert!(!CRS::from_wkt("LOCAL_CS[\"grid\"]").is_geographic());
    }
}
