//! Coordinate reference systems and the transforms into the corpus target.
//!
//! The corpus normalizes everything to WGS84 (EPSG:4326), so only the inverse
//! transforms of the CRS that Dutch municipal publishers actually use are
//! implemented. The set is closed on purpose: an unknown CRS is a
//! configuration error for that dataset, never a silent passthrough.

use std::fmt;
use std::str::FromStr;

use geo_types::Geometry;
use serde::{Deserialize, Serialize};

use crate::error::CrsError;
use crate::geometry;

/// Supported coordinate reference systems.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Crs {
    /// WGS84 geographic, lon/lat in degrees (EPSG:4326). The corpus target.
    Wgs84,
    /// ETRS89 geographic (EPSG:4258). Differs from WGS84 by well under a
    /// meter in the Netherlands, which is below corpus precision, so it is
    /// treated as WGS84-equivalent.
    Etrs89,
    /// Spherical Web Mercator, meters (EPSG:3857).
    WebMercator,
    /// Amersfoort / RD New, the Dutch national grid, meters (EPSG:28992).
    RdNew,
}

impl Crs {
    /// Resolve a numeric EPSG code.
    ///
    /// # Errors
    ///
    /// Returns [`CrsError::Unsupported`] for codes outside the supported set.
    pub fn from_epsg(code: u32) -> Result<Self, CrsError> {
        match code {
            4326 => Ok(Crs::Wgs84),
            4258 => Ok(Crs::Etrs89),
            3857 | 900_913 => Ok(Crs::WebMercator),
            28_992 => Ok(Crs::RdNew),
            other => Err(CrsError::Unsupported { epsg: other }),
        }
    }

    /// The EPSG code of this CRS.
    #[must_use]
    pub fn epsg_code(&self) -> u32 {
        match self {
            Crs::Wgs84 => 4326,
            Crs::Etrs89 => 4258,
            Crs::WebMercator => 3857,
            Crs::RdNew => 28_992,
        }
    }

    /// Check if this is a geographic (lon/lat degrees) CRS.
    #[must_use]
    pub fn is_geographic(&self) -> bool {
        matches!(self, Crs::Wgs84 | Crs::Etrs89)
    }

    /// Transform a single coordinate into WGS84 lon/lat degrees.
    #[must_use]
    pub fn to_wgs84(&self, x: f64, y: f64) -> (f64, f64) {
        match self {
            Crs::Wgs84 | Crs::Etrs89 => (x, y),
            Crs::WebMercator => web_mercator_to_wgs84(x, y),
            Crs::RdNew => rd_new_to_wgs84(x, y),
        }
    }

    /// Reproject a geometry in place from this CRS into `target`.
    ///
    /// # Errors
    ///
    /// Returns [`CrsError::UnsupportedTarget`] when `target` is anything other
    /// than the CRS itself or WGS84; only inverse transforms into the corpus
    /// target are implemented.
    pub fn transform_geometry(
        &self,
        geom: &mut Geometry<f64>,
        target: Crs,
    ) -> Result<(), CrsError> {
        if *self == target {
            return Ok(());
        }
        if target != Crs::Wgs84 {
            return Err(CrsError::UnsupportedTarget {
                epsg: target.epsg_code(),
            });
        }
        geometry::map_coords_mut(geom, &|x, y| self.to_wgs84(x, y));
        Ok(())
    }
}

impl Default for Crs {
    fn default() -> Self {
        Crs::Wgs84
    }
}

impl FromStr for Crs {
    type Err = CrsError;

    /// Parse a CRS designation.
    ///
    /// Accepts `EPSG:4326` (any case), bare numeric codes, URN form
    /// (`urn:ogc:def:crs:EPSG::28992`) and the OGC aliases `OGC:CRS84` /
    /// `CRS:84`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_uppercase();

        if normalized == "OGC:CRS84" || normalized == "CRS:84" || normalized == "CRS84" {
            return Ok(Crs::Wgs84);
        }

        let code_part = normalized
            .strip_prefix("URN:OGC:DEF:CRS:EPSG::")
            .or_else(|| normalized.strip_prefix("EPSG:"))
            .unwrap_or(&normalized);

        let code: u32 = code_part
            .parse()
            .map_err(|_| CrsError::Unrecognized {
                value: s.to_string(),
            })?;

        Crs::from_epsg(code)
    }
}

impl TryFrom<String> for Crs {
    type Error = CrsError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Crs> for String {
    fn from(crs: Crs) -> Self {
        crs.to_string()
    }
}

impl fmt::Display for Crs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EPSG:{}", self.epsg_code())
    }
}

/// WGS84 semi-major axis, the sphere radius Web Mercator is defined on.
const EARTH_RADIUS_M: f64 = 6_378_137.0;

fn web_mercator_to_wgs84(x: f64, y: f64) -> (f64, f64) {
    let lon = (x / EARTH_RADIUS_M).to_degrees();
    let lat = (y / EARTH_RADIUS_M).sinh().atan().to_degrees();
    (lon, lat)
}

// RD New -> WGS84 via the Schreutelkamp & Strang van Hees approximation
// polynomial. Accurate to roughly one meter inside the Dutch RD domain,
// which is within corpus precision for municipal tree positions.

/// RD base point (Onze Lieve Vrouwetoren, Amersfoort), easting.
const RD_X0: f64 = 155_000.0;
/// RD base point, northing.
const RD_Y0: f64 = 463_000.0;
/// Latitude of the base point, degrees.
const RD_PHI0: f64 = 52.155_174_40;
/// Longitude of the base point, degrees.
const RD_LAM0: f64 = 5.387_206_21;

/// Latitude terms: (power of dX, power of dY, coefficient in arc-seconds).
const RD_K: [(i32, i32, f64); 11] = [
    (0, 1, 3235.653_89),
    (2, 0, -32.582_97),
    (0, 2, -0.247_50),
    (2, 1, -0.849_78),
    (0, 3, -0.065_50),
    (2, 2, -0.017_09),
    (1, 0, -0.007_38),
    (4, 0, 0.005_30),
    (2, 3, -0.000_39),
    (4, 1, 0.000_33),
    (1, 1, -0.000_12),
];

/// Longitude terms: (power of dX, power of dY, coefficient in arc-seconds).
const RD_L: [(i32, i32, f64); 12] = [
    (1, 0, 5260.529_16),
    (1, 1, 105.946_84),
    (1, 2, 2.456_56),
    (3, 0, -0.818_85),
    (1, 3, 0.055_94),
    (3, 1, -0.056_07),
    (0, 1, 0.011_99),
    (3, 2, -0.002_56),
    (1, 4, 0.001_28),
    (0, 2, 0.000_22),
    (2, 0, -0.000_22),
    (5, 0, 0.000_26),
];

fn rd_new_to_wgs84(x: f64, y: f64) -> (f64, f64) {
    let dx = (x - RD_X0) * 1e-5;
    let dy = (y - RD_Y0) * 1e-5;

    let mut phi_sec = 0.0;
    for (p, q, k) in RD_K {
        phi_sec += k * dx.powi(p) * dy.powi(q);
    }
    let mut lam_sec = 0.0;
    for (p, q, l) in RD_L {
        lam_sec += l * dx.powi(p) * dy.powi(q);
    }

    let lat = RD_PHI0 + phi_sec / 3600.0;
    let lon = RD_LAM0 + lam_sec / 3600.0;
    (lon, lat)
}
