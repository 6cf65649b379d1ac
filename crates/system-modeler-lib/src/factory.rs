//! EntityModelFactory - derives the computed parts of an entity before it is stored
//!
//! Every add and update passes through the factory, so stored entities always carry a geofence
//! consistent with their geometry, street segments carry trip points and approaches carry a
//! direction of travel.

use crate::geodesy::{self, Crs};
use crate::geometry::{self, Geometry, LANE_WIDTH_METERS, Shape};
use crate::model::{BEARING_PROPERTY, EntityModel, EntityType, TRIP_POINTS_PROPERTY};
use crate::trip_point::{TripPointConfig, TripPointSampler};
use crate::{ModelerError, Result};
use serde::{Deserialize, Serialize};

/// Geofence radii per entity type and trip-point sampling settings
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GeoFenceConfig {
    pub intersection_radius_meters: f64,
    pub approach_radius_meters: f64,
    pub street_segment_radius_meters: f64,
    /// Radius for entity types without a dedicated setting
    pub default_radius_meters: f64,
    pub trip_points: TripPointConfig,
}

impl Default for GeoFenceConfig {
    fn default() -> Self {
        Self {
            intersection_radius_meters: LANE_WIDTH_METERS,
            approach_radius_meters: LANE_WIDTH_METERS,
            street_segment_radius_meters: LANE_WIDTH_METERS,
            default_radius_meters: LANE_WIDTH_METERS,
            trip_points: TripPointConfig::default(),
        }
    }
}

impl GeoFenceConfig {
    /// Geofence radius for entities of `entity_type`
    pub fn radius_for(&self, entity_type: &EntityType) -> f64 {
        match entity_type {
            EntityType::Intersection => self.intersection_radius_meters,
            EntityType::Approach => self.approach_radius_meters,
            EntityType::StreetSegment => self.street_segment_radius_meters,
            EntityType::Other(_) => self.default_radius_meters,
        }
    }
}

/// Builds store-ready entities from user-supplied ones
#[derive(Debug, Clone, Default)]
pub struct EntityModelFactory {
    config: GeoFenceConfig,
}

#[cfg_attr(feature = "profiling", profiling::all_functions)]
impl EntityModelFactory {
    pub fn new(config: GeoFenceConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &GeoFenceConfig {
        &self.config
    }

    /// Normalize the geometry to WGS84 and derive geofence, trip points and bearing
    ///
    /// Entities without geometry lose any geofence they carried and are otherwise unchanged;
    /// they never match spatial queries.
    pub fn create(&self, mut model: EntityModel) -> Result<EntityModel> {
        let Some(geometry) = model.geometry.take() else {
            tracing::debug!(id = %model.id, entity_type = %model.entity_type, "Entity has no geometry");
            model.geo_fence = None;
            return Ok(model);
        };
        let geometry = geometry.to_crs(Crs::Wgs84)?;
        validate(&geometry)?;

        let radius = self.config.radius_for(&model.entity_type);
        model.geo_fence = Some(geometry::buffer_polygon(&geometry, radius)?);

        if let Some(line) = geometry.as_line_string() {
            match model.entity_type {
                EntityType::StreetSegment => {
                    let samples = TripPointSampler::new(self.config.trip_points)?.sample(line)?;
                    tracing::debug!(id = %model.id, count = samples.len(), "Computed trip points");
                    model
                        .properties
                        .insert(TRIP_POINTS_PROPERTY.to_string(), serde_json::to_value(samples)?);
                }
                EntityType::Approach if !model.properties.contains_key(BEARING_PROPERTY) => {
                    let bearing = geodesy::classify_bearing(&line.0)?;
                    tracing::debug!(id = %model.id, %bearing, "Classified approach bearing");
                    model
                        .properties
                        .insert(BEARING_PROPERTY.to_string(), bearing.as_str().into());
                }
                _ => {}
            }
        }

        model.geometry = Some(geometry);
        Ok(model)
    }
}

fn validate(geometry: &Geometry) -> Result<()> {
    match geometry.shape() {
        Shape::Point(c) if !(c.x.is_finite() && c.y.is_finite()) => Err(
            ModelerError::InvalidGeometry(format!("non-finite point ({}, {})", c.x, c.y)),
        ),
        Shape::LineString(line) if line.0.len() < 2 => Err(ModelerError::InvalidPath(format!(
            "line needs at least 2 points, got {}",
            line.0.len()
        ))),
        // A closed ring of a triangle has 4 coordinates
        Shape::Polygon(polygon) if polygon.exterior().0.len() < 4 => {
            Err(ModelerError::InvalidGeometry(
                "polygon exterior needs at least 3 distinct points".to_string(),
            ))
        }
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geodesy::Bearing;
    use geo::{Contains, LineString, coord};

    fn segment_line() -> LineString<f64> {
        LineString::from(vec![
            (-84.190029501915, 34.017980435211),
            (-84.1900938749313, 34.0177892414078),
            (-84.190571308136, 34.0163397115892),
            (-84.1910004615784, 34.0149657479003),
        ])
    }

    #[test]
    fn test_street_segment_gets_trip_points_and_fence() {
        let model = EntityModel::new(
            EntityType::StreetSegment,
            Geometry::line_string(segment_line()),
        )
        .with_property("speedLimit", 35);

        let created = EntityModelFactory::default().create(model).unwrap();

        let props = created.street_segment_properties().unwrap();
        assert_eq!(props.trip_points.len(), 29);
        assert_eq!(props.speed_limit, Some(35));

        let fence = created.geo_fence.as_ref().unwrap();
        assert!(fence.as_polygon().unwrap().contains(&segment_line()));
    }

    #[test]
    fn test_approach_bearing_is_classified() {
        let start = coord! { x: -84.19, y: 34.01 };
        let line = geodesy::line_from_direction(start, Bearing::EastBound);
        let model = EntityModel::new(EntityType::Approach, Geometry::line_string(line.to_vec()));

        let created = EntityModelFactory::default().create(model).unwrap();
        assert_eq!(
            created.approach_properties().unwrap().bearing,
            Some(Bearing::EastBound)
        );
    }

    #[test]
    fn test_existing_approach_bearing_is_kept() {
        let start = coord! { x: -84.19, y: 34.01 };
        let line = geodesy::line_from_direction(start, Bearing::EastBound);
        let model = EntityModel::new(EntityType::Approach, Geometry::line_string(line.to_vec()))
            .with_property(BEARING_PROPERTY, "NB");

        let created = EntityModelFactory::default().create(model).unwrap();
        assert_eq!(
            created.approach_properties().unwrap().bearing,
            Some(Bearing::NorthBound)
        );
    }

    #[test]
    fn test_intersection_point_fence_uses_configured_radius() {
        let center = coord! { x: -83.0479, y: 42.5361 };
        let factory = EntityModelFactory::new(GeoFenceConfig {
            intersection_radius_meters: 30.0,
            ..Default::default()
        });
        let created = factory
            .create(EntityModel::new(EntityType::Intersection, Geometry::point(center)))
            .unwrap();

        let fence = created.geo_fence.unwrap();
        let polygon = fence.as_polygon().unwrap();
        let inside = geodesy::destination(center, 25.0, 45.0);
        let outside = geodesy::destination(center, 35.0, 45.0);
        assert!(polygon.contains(&geo::Point::from(inside)));
        assert!(!polygon.contains(&geo::Point::from(outside)));
    }

    #[test]
    fn test_projected_geometry_is_stored_geographic() {
        let center = coord! { x: -84.19, y: 34.01 };
        let planar = Geometry::point(center).to_crs(Crs::WebMercator).unwrap();
        let created = EntityModelFactory::default()
            .create(EntityModel::new(EntityType::Intersection, planar))
            .unwrap();

        let stored = created.geometry.unwrap();
        assert_eq!(stored.crs(), Crs::Wgs84);
        let c = stored.as_point().unwrap();
        assert!((c.x - center.x).abs() < 1e-9 && (c.y - center.y).abs() < 1e-9);
    }

    #[test]
    fn test_missing_geometry_passes_through() {
        let mut model = EntityModel::new(EntityType::Intersection, Geometry::point(coord! { x: 0.0, y: 0.0 }));
        model.geometry = None;
        let created = EntityModelFactory::default().create(model.clone()).unwrap();
        assert_eq!(created, model);
    }

    #[test]
    fn test_removing_geometry_drops_stale_fence() {
        let factory = EntityModelFactory::default();
        let mut model = factory
            .create(EntityModel::new(
                EntityType::Intersection,
                Geometry::point(coord! { x: -83.0479, y: 42.5361 }),
            ))
            .unwrap();
        assert!(model.geo_fence.is_some());

        model.geometry = None;
        let created = factory.create(model).unwrap();
        assert!(created.geo_fence.is_none());
    }

    #[test]
    fn test_invalid_geometry_is_rejected() {
        let line = EntityModel::new(
            EntityType::StreetSegment,
            Geometry::line_string(vec![(0.0, 0.0)]),
        );
        assert!(matches!(
            EntityModelFactory::default().create(line),
            Err(ModelerError::InvalidPath(_))
        ));

        let unprojectable = EntityModel::new(
            EntityType::Intersection,
            Geometry::new(Crs::Other(2926), Shape::Point(coord! { x: 0.0, y: 0.0 })),
        );
        assert!(matches!(
            EntityModelFactory::default().create(unprojectable),
            Err(ModelerError::UnsupportedProjection { .. })
        ));
    }
}
