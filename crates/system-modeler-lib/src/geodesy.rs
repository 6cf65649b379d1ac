//! Coordinate projection and planar geodesy helpers
//!
//! All metric operations (distance, bearing, destination) work in the spherical Web Mercator
//! plane: inputs are geographic `(lon, lat)` coordinates, projected, measured with planar
//! trigonometry and projected back. This is accurate enough at intersection scale and keeps
//! every helper an exact inverse of its counterpart.

use crate::{ModelerError, Result};
use geo::Coord;
use serde::{Deserialize, Serialize};
use std::f64::consts::{FRAC_PI_2, PI};
use std::fmt;
use std::str::FromStr;

/// Sphere radius used by the spherical Mercator projection, in meters
pub const EARTH_RADIUS_METERS: f64 = 6_378_136.98;

/// Web Mercator bounds in meters
pub const EARTH_MERCATOR_MAX: f64 = EARTH_RADIUS_METERS * PI;
pub const EARTH_MERCATOR_MIN: f64 = -EARTH_MERCATOR_MAX;

/// Maximum latitude that can be represented in Web Mercator
pub const MAX_LATITUDE: f64 = 85.05112878;

/// Mean Earth radius for great-circle distances, in meters
pub const MEAN_EARTH_RADIUS_METERS: f64 = 6_371_000.0;

/// Meters in one statute mile
pub const METERS_PER_MILE: f64 = 1609.34;

/// Offset of the points produced by the cardinal-bound helpers, in meters
pub const CARDINAL_OFFSET_METERS: f64 = 100.0;

/// Two bearings closer than this are treated as equally close during classification
const BEARING_TIE_EPSILON: f64 = 1e-9;

/// Coordinate reference system of a geometry, identified by EPSG code
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "u32", into = "u32")]
pub enum Crs {
    /// Geographic longitude/latitude in degrees (EPSG:4326)
    #[default]
    Wgs84,
    /// Spherical Web Mercator in meters (EPSG:3857)
    WebMercator,
    /// Any other EPSG-identified system; carried through but never projected
    Other(u32),
}

impl Crs {
    /// EPSG code of this reference system
    #[inline]
    pub fn epsg(self) -> u32 {
        match self {
            Crs::Wgs84 => 4326,
            Crs::WebMercator => 3857,
            Crs::Other(code) => code,
        }
    }

    /// Resolve an EPSG code, accepting the legacy 900913 alias for Web Mercator
    pub fn from_epsg(code: u32) -> Self {
        match code {
            4326 => Crs::Wgs84,
            3857 | 900913 => Crs::WebMercator,
            other => Crs::Other(other),
        }
    }

    #[inline]
    pub fn is_wgs84(&self) -> bool {
        matches!(self, Crs::Wgs84)
    }
}

impl From<u32> for Crs {
    fn from(code: u32) -> Self {
        Crs::from_epsg(code)
    }
}

impl From<Crs> for u32 {
    fn from(crs: Crs) -> Self {
        crs.epsg()
    }
}

impl fmt::Display for Crs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EPSG:{}", self.epsg())
    }
}

/// Convert a geographic `(lon, lat)` coordinate to Web Mercator meters
///
/// Latitude is clamped to the representable Web Mercator range.
#[inline(always)]
pub fn wgs84_to_mercator(coord: Coord<f64>) -> Coord<f64> {
    let lat = coord.y.clamp(-MAX_LATITUDE, MAX_LATITUDE);
    let lat_rad = lat.to_radians();
    Coord {
        x: coord.x.to_radians() * EARTH_RADIUS_METERS,
        y: (lat_rad.tan() + (1.0 / lat_rad.cos())).ln() * EARTH_RADIUS_METERS,
    }
}

/// Convert Web Mercator meters back to a geographic `(lon, lat)` coordinate
#[inline(always)]
pub fn mercator_to_wgs84(coord: Coord<f64>) -> Coord<f64> {
    Coord {
        x: (coord.x / EARTH_RADIUS_METERS).to_degrees(),
        y: (FRAC_PI_2 - 2.0 * (-coord.y / EARTH_RADIUS_METERS).exp().atan()).to_degrees(),
    }
}

/// Resolve the per-coordinate transform between two reference systems
///
/// Identity for equal systems; fails with [`ModelerError::UnsupportedProjection`] for any pair
/// other than WGS84 <-> Web Mercator.
pub fn transform(from: Crs, to: Crs) -> Result<fn(Coord<f64>) -> Coord<f64>> {
    let f: fn(Coord<f64>) -> Coord<f64> = match (from, to) {
        (a, b) if a == b => identity,
        (Crs::Wgs84, Crs::WebMercator) => wgs84_to_mercator,
        (Crs::WebMercator, Crs::Wgs84) => mercator_to_wgs84,
        (from, to) => return Err(ModelerError::UnsupportedProjection { from, to }),
    };
    Ok(f)
}

#[inline(always)]
fn identity(coord: Coord<f64>) -> Coord<f64> {
    coord
}

/// Project a single coordinate between reference systems
pub fn project(coord: Coord<f64>, from: Crs, to: Crs) -> Result<Coord<f64>> {
    transform(from, to).map(|f| f(coord))
}

/// Planar distance in meters between two geographic coordinates
#[inline]
pub fn distance(a: Coord<f64>, b: Coord<f64>) -> f64 {
    let a = wgs84_to_mercator(a);
    let b = wgs84_to_mercator(b);
    (b.x - a.x).hypot(b.y - a.y)
}

/// Great-circle distance in meters between two geographic coordinates (haversine)
#[inline]
pub fn great_circle_distance(a: Coord<f64>, b: Coord<f64>) -> f64 {
    let lat1 = a.y.to_radians();
    let lat2 = b.y.to_radians();
    let delta_lat = (b.y - a.y).to_radians();
    let delta_lon = (b.x - a.x).to_radians();

    let h = (delta_lat / 2.0).sin().powi(2)
        + lat1.cos() * lat2.cos() * (delta_lon / 2.0).sin().powi(2);
    let c = 2.0 * h.sqrt().atan2((1.0 - h).sqrt());

    MEAN_EARTH_RADIUS_METERS * c
}

/// Mathematical angle in degrees of the planar vector `a -> b`, measured counter-clockwise from
/// east, in `(-180, 180]`
///
/// Both inputs are already planar (projected) coordinates.
#[inline]
pub fn planar_angle(a: Coord<f64>, b: Coord<f64>) -> f64 {
    (b.y - a.y).atan2(b.x - a.x).to_degrees()
}

/// Compass bearing in degrees `[0, 360)` from `a` to `b`, clockwise from north
#[inline]
pub fn bearing(a: Coord<f64>, b: Coord<f64>) -> f64 {
    let angle = planar_angle(wgs84_to_mercator(a), wgs84_to_mercator(b));
    normalize_bearing(90.0 - angle)
}

/// Coordinate reached from `origin` after `distance` meters along compass `bearing` degrees
///
/// Exact inverse of [`distance`] and [`bearing`] in the projected plane.
#[inline]
pub fn destination(origin: Coord<f64>, distance: f64, bearing: f64) -> Coord<f64> {
    if distance == 0.0 {
        return origin;
    }
    let start = wgs84_to_mercator(origin);
    let rad = bearing.to_radians();
    mercator_to_wgs84(Coord {
        x: start.x + distance * rad.sin(),
        y: start.y + distance * rad.cos(),
    })
}

/// Wrap any bearing in degrees into `[0, 360)`
#[inline]
pub fn normalize_bearing(degrees: f64) -> f64 {
    let wrapped = degrees.rem_euclid(360.0);
    // rem_euclid can round up to exactly 360 for tiny negative inputs
    if wrapped >= 360.0 { 0.0 } else { wrapped }
}

/// Smallest absolute difference between two bearings, in `[0, 180]`
#[inline]
pub fn bearing_difference(a: f64, b: f64) -> f64 {
    let d = (a - b).rem_euclid(360.0);
    d.min(360.0 - d)
}

/// Upstream reference point for northbound traffic at `point` (lies due south of it)
pub fn north_bound(point: Coord<f64>) -> Coord<f64> {
    destination(point, CARDINAL_OFFSET_METERS, 180.0)
}

/// Upstream reference point for southbound traffic at `point` (lies due north of it)
pub fn south_bound(point: Coord<f64>) -> Coord<f64> {
    destination(point, CARDINAL_OFFSET_METERS, 0.0)
}

/// Upstream reference point for eastbound traffic at `point` (lies due west of it)
pub fn east_bound(point: Coord<f64>) -> Coord<f64> {
    destination(point, CARDINAL_OFFSET_METERS, 270.0)
}

/// Upstream reference point for westbound traffic at `point` (lies due east of it)
pub fn west_bound(point: Coord<f64>) -> Coord<f64> {
    destination(point, CARDINAL_OFFSET_METERS, 90.0)
}

/// Direction of travel of a traffic approach
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Bearing {
    #[serde(rename = "NB")]
    NorthBound,
    #[serde(rename = "SB")]
    SouthBound,
    #[serde(rename = "EB")]
    EastBound,
    #[serde(rename = "WB")]
    WestBound,
}

impl Bearing {
    /// All bearings, in classification tie-break order
    pub const ALL: [Bearing; 4] = [
        Bearing::NorthBound,
        Bearing::SouthBound,
        Bearing::EastBound,
        Bearing::WestBound,
    ];

    /// Upstream reference point for this direction of travel at `point`
    pub fn reference_point(self, point: Coord<f64>) -> Coord<f64> {
        match self {
            Bearing::NorthBound => north_bound(point),
            Bearing::SouthBound => south_bound(point),
            Bearing::EastBound => east_bound(point),
            Bearing::WestBound => west_bound(point),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Bearing::NorthBound => "NB",
            Bearing::SouthBound => "SB",
            Bearing::EastBound => "EB",
            Bearing::WestBound => "WB",
        }
    }
}

impl fmt::Display for Bearing {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Bearing {
    type Err = ModelerError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_uppercase().as_str() {
            "NB" => Ok(Bearing::NorthBound),
            "SB" => Ok(Bearing::SouthBound),
            "EB" => Ok(Bearing::EastBound),
            "WB" => Ok(Bearing::WestBound),
            _ => Err(ModelerError::InvalidGeometry(format!(
                "unknown bearing '{s}'"
            ))),
        }
    }
}

/// Two-point line from `point` to its upstream reference point for `direction`
pub fn line_from_direction(point: Coord<f64>, direction: Bearing) -> [Coord<f64>; 2] {
    [point, direction.reference_point(point)]
}

/// Classify a path into the cardinal [`Bearing`] whose reference direction is closest to the
/// bearing from its first to its last vertex
///
/// Ties resolve in [`Bearing::ALL`] order.
pub fn classify_bearing(path: &[Coord<f64>]) -> Result<Bearing> {
    let (first, last) = match (path.first(), path.last()) {
        (Some(first), Some(last)) if path.len() >= 2 => (*first, *last),
        _ => {
            return Err(ModelerError::InvalidPath(format!(
                "need at least 2 points to classify a bearing, got {}",
                path.len()
            )));
        }
    };
    if first == last {
        return Err(ModelerError::InvalidPath(
            "path starts and ends at the same point".to_string(),
        ));
    }

    let path_bearing = bearing(first, last);
    let mut best = Bearing::NorthBound;
    let mut best_diff = f64::INFINITY;
    for candidate in Bearing::ALL {
        let reference = bearing(first, candidate.reference_point(first));
        let diff = bearing_difference(path_bearing, reference);
        if diff < best_diff - BEARING_TIE_EPSILON {
            best = candidate;
            best_diff = diff;
        }
    }
    Ok(best)
}
