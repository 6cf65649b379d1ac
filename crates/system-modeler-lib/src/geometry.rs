//! Geometry values with an explicit reference system, plus geofence and path operations
//!
//! [`Geometry`] serializes as a GeoJSON geometry object (`{"type": ..., "coordinates": ...}`)
//! and only writes a `crs` EPSG code when it is not WGS84, so documents stay readable by any
//! GeoJSON consumer.

use crate::geodesy::{self, Crs};
use crate::{ModelerError, Result};
use geo::{Area, BoundingRect, Buffer, Coord, Intersects, LineString, MapCoords, Polygon, Rect};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Lane width used as the default geofence radius (12 ft), in meters
pub const LANE_WIDTH_METERS: f64 = 2286.0 / 625.0;

/// Concrete shape of a [`Geometry`]
#[derive(Debug, Clone, PartialEq)]
pub enum Shape {
    Point(Coord<f64>),
    LineString(LineString<f64>),
    Polygon(Polygon<f64>),
}

/// A point, path or area tagged with the reference system of its coordinates
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "GeometryWire", into = "GeometryWire")]
pub struct Geometry {
    crs: Crs,
    shape: Shape,
}

#[cfg_attr(feature = "profiling", profiling::all_functions)]
impl Geometry {
    pub fn new(crs: Crs, shape: Shape) -> Self {
        Self { crs, shape }
    }

    /// Geographic point
    pub fn point(coord: Coord<f64>) -> Self {
        Self::new(Crs::Wgs84, Shape::Point(coord))
    }

    /// Geographic path
    pub fn line_string(coords: impl Into<LineString<f64>>) -> Self {
        Self::new(Crs::Wgs84, Shape::LineString(coords.into()))
    }

    /// Geographic area
    pub fn polygon(polygon: Polygon<f64>) -> Self {
        Self::new(Crs::Wgs84, Shape::Polygon(polygon))
    }

    #[inline]
    pub fn crs(&self) -> Crs {
        self.crs
    }

    #[inline]
    pub fn shape(&self) -> &Shape {
        &self.shape
    }

    /// GeoJSON type name of the shape
    pub fn kind(&self) -> &'static str {
        match self.shape {
            Shape::Point(_) => "Point",
            Shape::LineString(_) => "LineString",
            Shape::Polygon(_) => "Polygon",
        }
    }

    pub fn as_point(&self) -> Option<Coord<f64>> {
        match &self.shape {
            Shape::Point(c) => Some(*c),
            _ => None,
        }
    }

    pub fn as_line_string(&self) -> Option<&LineString<f64>> {
        match &self.shape {
            Shape::LineString(line) => Some(line),
            _ => None,
        }
    }

    pub fn as_polygon(&self) -> Option<&Polygon<f64>> {
        match &self.shape {
            Shape::Polygon(polygon) => Some(polygon),
            _ => None,
        }
    }

    /// Reproject every coordinate into `to`
    pub fn to_crs(&self, to: Crs) -> Result<Geometry> {
        let f = geodesy::transform(self.crs, to)?;
        let shape = match &self.shape {
            Shape::Point(c) => Shape::Point(f(*c)),
            Shape::LineString(line) => Shape::LineString(line.map_coords(f)),
            Shape::Polygon(polygon) => Shape::Polygon(polygon.map_coords(f)),
        };
        Ok(Geometry::new(to, shape))
    }

    /// Equivalent `geo` geometry, in this geometry's own reference system
    pub fn to_geo(&self) -> geo::Geometry<f64> {
        match &self.shape {
            Shape::Point(c) => geo::Geometry::Point((*c).into()),
            Shape::LineString(line) => geo::Geometry::LineString(line.clone()),
            Shape::Polygon(polygon) => geo::Geometry::Polygon(polygon.clone()),
        }
    }

    /// Axis-aligned bounds, in this geometry's own reference system
    pub fn bounding_rect(&self) -> Option<Rect<f64>> {
        match &self.shape {
            Shape::Point(c) => Some(Rect::new(*c, *c)),
            Shape::LineString(line) => line.bounding_rect(),
            Shape::Polygon(polygon) => polygon.bounding_rect(),
        }
    }
}

/// Inflate a geometry by `radius_meters` into a geofence polygon
///
/// The geometry is buffered in the Web Mercator plane with round joins, then projected back to
/// the input's reference system. Point and path inputs yield a single polygon; for a multi-part
/// result the largest part is kept.
#[cfg_attr(feature = "profiling", profiling::function)]
pub fn buffer_polygon(geometry: &Geometry, radius_meters: f64) -> Result<Geometry> {
    if !(radius_meters.is_finite() && radius_meters > 0.0) {
        return Err(ModelerError::InvalidBufferRadius(radius_meters));
    }

    let planar = geometry.to_crs(Crs::WebMercator)?;
    let inflated = planar.to_geo().buffer(radius_meters);
    let polygon = inflated
        .0
        .into_iter()
        .max_by(|a, b| a.unsigned_area().total_cmp(&b.unsigned_area()))
        .ok_or_else(|| {
            ModelerError::InvalidGeometry(format!(
                "buffering a {} produced an empty polygon",
                geometry.kind()
            ))
        })?;

    Geometry::new(Crs::WebMercator, Shape::Polygon(polygon)).to_crs(geometry.crs())
}

/// Whether two geometries share at least one point
///
/// Evaluated directly in the geometries' common reference system; mixed systems never
/// intersect.
#[cfg_attr(feature = "profiling", profiling::function)]
pub fn intersects(a: &Geometry, b: &Geometry) -> bool {
    if a.crs() != b.crs() {
        tracing::warn!(
            a = %a.crs(),
            b = %b.crs(),
            "Intersection test between geometries in different reference systems"
        );
        return false;
    }
    a.to_geo().intersects(&b.to_geo())
}

/// Total planar length of a geographic path, in meters
pub fn path_length(path: &LineString<f64>) -> Result<f64> {
    Ok(MeasuredPath::new(&path.0)?.total())
}

/// Coordinate at `distance` meters along a geographic path
///
/// Distances at or below zero return the first vertex; distances at or beyond the path length
/// return the final vertex.
pub fn point_at_distance(path: &LineString<f64>, distance: f64) -> Result<Coord<f64>> {
    Ok(MeasuredPath::new(&path.0)?.point_at(distance))
}

/// A path with precomputed cumulative vertex distances
#[derive(Debug, Clone)]
pub(crate) struct MeasuredPath {
    coords: Vec<Coord<f64>>,
    /// `cumulative[i]` is the distance from the first vertex to vertex `i`
    cumulative: Vec<f64>,
}

#[cfg_attr(feature = "profiling", profiling::all_functions)]
impl MeasuredPath {
    pub(crate) fn new(coords: &[Coord<f64>]) -> Result<Self> {
        if coords.len() < 2 {
            return Err(ModelerError::InvalidPath(format!(
                "need at least 2 points, got {}",
                coords.len()
            )));
        }

        let mut cumulative = Vec::with_capacity(coords.len());
        let mut total = 0.0;
        cumulative.push(total);
        for pair in coords.windows(2) {
            total += geodesy::distance(pair[0], pair[1]);
            cumulative.push(total);
        }

        Ok(Self {
            coords: coords.to_vec(),
            cumulative,
        })
    }

    #[inline]
    pub(crate) fn total(&self) -> f64 {
        self.cumulative[self.cumulative.len() - 1]
    }

    #[inline]
    pub(crate) fn first(&self) -> Coord<f64> {
        self.coords[0]
    }

    #[inline]
    pub(crate) fn last(&self) -> Coord<f64> {
        self.coords[self.coords.len() - 1]
    }

    /// Index of the segment containing `distance`, skipping zero-length segments
    #[inline]
    fn segment_at(&self, distance: f64) -> usize {
        let after = self.cumulative.partition_point(|&c| c <= distance);
        after.saturating_sub(1).min(self.coords.len() - 2)
    }

    /// Compass bearing of segment `index`
    #[inline]
    pub(crate) fn segment_bearing(&self, index: usize) -> f64 {
        geodesy::bearing(self.coords[index], self.coords[index + 1])
    }

    /// Compass bearing of the segment containing `distance`
    pub(crate) fn bearing_at(&self, distance: f64) -> f64 {
        let index = if distance >= self.total() {
            self.last_segment()
        } else {
            self.segment_at(distance.max(0.0))
        };
        self.segment_bearing(index)
    }

    /// Index of the last segment with non-zero length (the last segment if all are degenerate)
    pub(crate) fn last_segment(&self) -> usize {
        (0..self.coords.len() - 1)
            .rev()
            .find(|&i| self.cumulative[i + 1] > self.cumulative[i])
            .unwrap_or(self.coords.len() - 2)
    }

    pub(crate) fn point_at(&self, distance: f64) -> Coord<f64> {
        if distance <= 0.0 {
            return self.first();
        }
        if distance >= self.total() {
            return self.last();
        }
        let index = self.segment_at(distance);
        geodesy::destination(
            self.coords[index],
            distance - self.cumulative[index],
            self.segment_bearing(index),
        )
    }
}

/// Serialize a [`Coord`] as a `[x, y]` array
pub(crate) mod coord_array {
    use geo::Coord;
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S: Serializer>(coord: &Coord<f64>, serializer: S) -> Result<S::Ok, S::Error> {
        [coord.x, coord.y].serialize(serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Coord<f64>, D::Error> {
        let [x, y] = <[f64; 2]>::deserialize(deserializer)?;
        Ok(Coord { x, y })
    }
}

/// GeoJSON-shaped representation of [`Geometry`]
#[derive(Serialize, Deserialize)]
struct GeometryWire {
    #[serde(rename = "type")]
    kind: String,
    coordinates: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    crs: Option<u32>,
}

fn parse_position(value: Value) -> Result<Coord<f64>> {
    let numbers: Vec<f64> = serde_json::from_value(value)?;
    match numbers.as_slice() {
        // Extra ordinates (altitude) are ignored
        [x, y, ..] => Ok(Coord { x: *x, y: *y }),
        _ => Err(ModelerError::InvalidGeometry(format!(
            "position needs 2 ordinates, got {}",
            numbers.len()
        ))),
    }
}

fn parse_positions(value: Value) -> Result<Vec<Coord<f64>>> {
    let positions: Vec<Value> = serde_json::from_value(value)?;
    positions.into_iter().map(parse_position).collect()
}

fn positions_to_value(coords: impl Iterator<Item = Coord<f64>>) -> Value {
    Value::Array(coords.map(|c| Value::from(vec![c.x, c.y])).collect())
}

impl TryFrom<GeometryWire> for Geometry {
    type Error = ModelerError;

    fn try_from(wire: GeometryWire) -> Result<Self> {
        let shape = match wire.kind.to_ascii_lowercase().as_str() {
            "point" => Shape::Point(parse_position(wire.coordinates)?),
            "linestring" => Shape::LineString(LineString::new(parse_positions(wire.coordinates)?)),
            "polygon" => {
                let rings: Vec<Value> = serde_json::from_value(wire.coordinates)?;
                let mut rings = rings
                    .into_iter()
                    .map(|ring| parse_positions(ring).map(LineString::new));
                let exterior = rings.next().transpose()?.ok_or_else(|| {
                    ModelerError::InvalidGeometry("polygon has no exterior ring".to_string())
                })?;
                let interiors = rings.collect::<Result<Vec<_>>>()?;
                Shape::Polygon(Polygon::new(exterior, interiors))
            }
            other => {
                return Err(ModelerError::InvalidGeometry(format!(
                    "unsupported geometry type '{other}'"
                )));
            }
        };
        let crs = wire.crs.map(Crs::from_epsg).unwrap_or_default();
        Ok(Geometry::new(crs, shape))
    }
}

impl From<Geometry> for GeometryWire {
    fn from(geometry: Geometry) -> Self {
        let kind = geometry.kind().to_string();
        let coordinates = match geometry.shape {
            Shape::Point(c) => Value::from(vec![c.x, c.y]),
            Shape::LineString(line) => positions_to_value(line.0.into_iter()),
            Shape::Polygon(polygon) => {
                let (exterior, interiors) = polygon.into_inner();
                Value::Array(
                    std::iter::once(exterior)
                        .chain(interiors)
                        .map(|ring| positions_to_value(ring.0.into_iter()))
                        .collect(),
                )
            }
        };
        GeometryWire {
            kind,
            coordinates,
            crs: (!geometry.crs.is_wgs84()).then(|| geometry.crs.epsg()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo::{Contains, coord};
    use serde_json::json;

    fn test_path() -> LineString<f64> {
        LineString::from(vec![
            (-84.190029501915, 34.017980435211),
            (-84.1900938749313, 34.0177892414078),
            (-84.190571308136, 34.0163397115892),
            (-84.1910004615784, 34.0149657479003),
        ])
    }

    #[test]
    fn test_point_deserializes_from_geojson() {
        let geometry: Geometry =
            serde_json::from_value(json!({"type": "Point", "coordinates": [-84.19, 34.01]}))
                .unwrap();
        assert_eq!(geometry.crs(), Crs::Wgs84);
        assert_eq!(geometry.as_point(), Some(coord! { x: -84.19, y: 34.01 }));

        let written = serde_json::to_value(&geometry).unwrap();
        assert_eq!(written, json!({"type": "Point", "coordinates": [-84.19, 34.01]}));
    }

    #[test]
    fn test_non_geographic_crs_is_written() {
        let geometry = Geometry::new(Crs::WebMercator, Shape::Point(coord! { x: 1.0, y: 2.0 }));
        let written = serde_json::to_value(&geometry).unwrap();
        assert_eq!(written["crs"], json!(3857));
        let back: Geometry = serde_json::from_value(written).unwrap();
        assert_eq!(back, geometry);
    }

    #[test]
    fn test_polygon_rings_are_closed() {
        let geometry: Geometry = serde_json::from_value(json!({
            "type": "Polygon",
            "coordinates": [[[0.0, 0.0], [1.0, 0.0], [1.0, 1.0]]]
        }))
        .unwrap();
        let polygon = geometry.as_polygon().unwrap();
        assert_eq!(polygon.exterior().0.len(), 4);
        assert!(polygon.exterior().is_closed());
    }

    #[test]
    fn test_unknown_geometry_type_is_rejected() {
        let result: std::result::Result<Geometry, _> =
            serde_json::from_value(json!({"type": "Circle", "coordinates": [0.0, 0.0]}));
        assert!(result.is_err());
    }

    #[test]
    fn test_buffer_rejects_non_positive_radius() {
        let point = Geometry::point(coord! { x: -84.19, y: 34.01 });
        for radius in [0.0, -1.0, f64::NAN, f64::INFINITY] {
            assert!(matches!(
                buffer_polygon(&point, radius),
                Err(ModelerError::InvalidBufferRadius(_))
            ));
        }
    }

    #[test]
    fn test_buffer_point_is_a_circle_of_radius() {
        let center = coord! { x: -84.19, y: 34.01 };
        let fence = buffer_polygon(&Geometry::point(center), 10.0).unwrap();
        assert_eq!(fence.crs(), Crs::Wgs84);

        let polygon = fence.as_polygon().unwrap();
        assert!(polygon.contains(&geo::Point::from(center)));

        let planar = fence.to_crs(Crs::WebMercator).unwrap();
        let area = planar.as_polygon().unwrap().unsigned_area();
        let circle = std::f64::consts::PI * 100.0;
        assert!((area - circle).abs() / circle < 0.05, "area {area}");
    }

    #[test]
    fn test_buffer_line_contains_line() {
        let path = test_path();
        let fence = buffer_polygon(&Geometry::line_string(path.clone()), LANE_WIDTH_METERS).unwrap();
        assert!(fence.as_polygon().unwrap().contains(&path));
    }

    #[test]
    fn test_buffer_unsupported_crs() {
        let geometry = Geometry::new(Crs::Other(2926), Shape::Point(coord! { x: 0.0, y: 0.0 }));
        assert!(matches!(
            buffer_polygon(&geometry, 1.0),
            Err(ModelerError::UnsupportedProjection { .. })
        ));
    }

    #[test]
    fn test_intersects() {
        let square = Geometry::polygon(Polygon::new(
            LineString::from(vec![(0.0, 0.0), (1.0, 0.0), (1.0, 1.0), (0.0, 1.0)]),
            vec![],
        ));
        let crossing = Geometry::line_string(vec![(-1.0, 0.5), (2.0, 0.5)]);
        let outside = Geometry::line_string(vec![(-1.0, 2.0), (2.0, 2.0)]);
        let inside = Geometry::point(coord! { x: 0.5, y: 0.5 });

        assert!(intersects(&square, &crossing));
        assert!(intersects(&crossing, &square));
        assert!(intersects(&square, &inside));
        assert!(!intersects(&square, &outside));

        let planar_square = square.to_crs(Crs::WebMercator).unwrap();
        assert!(!intersects(&planar_square, &crossing));
    }

    #[test]
    fn test_path_length() {
        let length = path_length(&test_path()).unwrap();
        assert!((length - 419.067).abs() < 0.05, "length {length}");
    }

    #[test]
    fn test_path_needs_two_points() {
        let single = LineString::from(vec![(0.0, 0.0)]);
        assert!(matches!(
            path_length(&single),
            Err(ModelerError::InvalidPath(_))
        ));
        assert!(matches!(
            point_at_distance(&single, 1.0),
            Err(ModelerError::InvalidPath(_))
        ));
    }

    #[test]
    fn test_point_at_distance_clamps_to_endpoints() {
        let path = test_path();
        assert_eq!(point_at_distance(&path, -5.0).unwrap(), path.0[0]);
        assert_eq!(point_at_distance(&path, 0.0).unwrap(), path.0[0]);
        assert_eq!(point_at_distance(&path, 10_000.0).unwrap(), path.0[3]);
    }

    #[test]
    fn test_point_at_distance_lands_on_vertices() {
        let path = test_path();
        let to_second = geodesy::distance(path.0[0], path.0[1]);
        let at = point_at_distance(&path, to_second).unwrap();
        assert!((at.x - path.0[1].x).abs() < 1e-9);
        assert!((at.y - path.0[1].y).abs() < 1e-9);

        let midway = point_at_distance(&path, to_second / 2.0).unwrap();
        assert!((geodesy::distance(path.0[0], midway) - to_second / 2.0).abs() < 1e-6);
    }

    #[test]
    fn test_point_at_distance_skips_repeated_vertices() {
        let path = LineString::from(vec![(0.0, 0.0), (0.0, 0.0), (0.0, 0.001)]);
        let at = point_at_distance(&path, 10.0).unwrap();
        assert!(at.y > 0.0);
        assert!(at.x.abs() < 1e-12);
    }
}
