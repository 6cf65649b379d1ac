//! EntityModel - the stored unit of the traffic system layout
//!
//! An entity is identified by a UUID, typed by an [`EntityType`], located by an optional
//! geometry and, once created through the factory, fenced by a derived geofence polygon.
//! Type-specific attributes live in a free-form `properties` object; the typed views
//! ([`ApproachProperties`], [`StreetSegmentProperties`]) are parsed on demand.

use crate::geodesy::Bearing;
use crate::geometry::Geometry;
use crate::trip_point::TripPointLocation;
use crate::Result;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use uuid::Uuid;

/// Property holding the owning intersection id of approaches and street segments
pub const INTERSECTION_PROPERTY: &str = "intersection";
/// Property holding an approach's direction of travel
pub const BEARING_PROPERTY: &str = "bearing";
/// Property holding a street segment's sampled trip points
pub const TRIP_POINTS_PROPERTY: &str = "tripPoints";

/// Kind of traffic system entity
///
/// Unknown kinds are preserved verbatim so documents written by newer producers survive a
/// read-modify-write cycle.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum EntityType {
    Intersection,
    Approach,
    StreetSegment,
    Other(String),
}

impl EntityType {
    pub fn as_str(&self) -> &str {
        match self {
            EntityType::Intersection => "Intersection",
            EntityType::Approach => "Approach",
            EntityType::StreetSegment => "StreetSegment",
            EntityType::Other(name) => name,
        }
    }
}

impl From<&str> for EntityType {
    fn from(name: &str) -> Self {
        if name.eq_ignore_ascii_case("Intersection") {
            EntityType::Intersection
        } else if name.eq_ignore_ascii_case("Approach") {
            EntityType::Approach
        } else if name.eq_ignore_ascii_case("StreetSegment") {
            EntityType::StreetSegment
        } else {
            EntityType::Other(name.to_string())
        }
    }
}

impl From<String> for EntityType {
    fn from(name: String) -> Self {
        match EntityType::from(name.as_str()) {
            EntityType::Other(_) => EntityType::Other(name),
            known => known,
        }
    }
}

impl From<EntityType> for String {
    fn from(entity_type: EntityType) -> Self {
        match entity_type {
            EntityType::Other(name) => name,
            known => known.as_str().to_string(),
        }
    }
}

impl fmt::Display for EntityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A stored traffic system entity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntityModel {
    pub id: Uuid,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub entity_type: EntityType,
    #[serde(default)]
    pub geometry: Option<Geometry>,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub properties: Map<String, Value>,
    /// Buffered area derived from `geometry`, used for spatial queries
    #[serde(default)]
    pub geo_fence: Option<Geometry>,
    #[serde(default)]
    pub is_deleted: Option<bool>,
}

impl EntityModel {
    /// New entity with a fresh id and no properties
    pub fn new(entity_type: EntityType, geometry: Geometry) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: None,
            entity_type,
            geometry: Some(geometry),
            properties: Map::new(),
            geo_fence: None,
            is_deleted: None,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_property(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.properties.insert(key.into(), value.into());
        self
    }

    /// Approach or street segment owned by `intersection`
    pub fn with_intersection(self, intersection: Uuid) -> Self {
        self.with_property(INTERSECTION_PROPERTY, intersection.to_string())
    }

    /// Whether the entity has been soft-deleted
    #[inline]
    pub fn is_deleted(&self) -> bool {
        self.is_deleted == Some(true)
    }

    /// Intersection id referenced by the `intersection` property, if present and well-formed
    pub fn intersection_reference(&self) -> Option<Uuid> {
        self.properties
            .get(INTERSECTION_PROPERTY)
            .and_then(Value::as_str)
            .and_then(|s| Uuid::parse_str(s).ok())
    }

    /// Intersection this entity belongs to: its own id for intersections, otherwise the
    /// referenced intersection
    pub fn intersection_id(&self) -> Option<Uuid> {
        match self.entity_type {
            EntityType::Intersection => Some(self.id),
            _ => self.intersection_reference(),
        }
    }

    /// Whether this entity is `intersection` itself or references it
    #[inline]
    pub fn belongs_to_intersection(&self, intersection: Uuid) -> bool {
        self.id == intersection || self.intersection_reference() == Some(intersection)
    }

    /// Typed view of the properties of an approach
    pub fn approach_properties(&self) -> Result<ApproachProperties> {
        Ok(serde_json::from_value(Value::Object(self.properties.clone()))?)
    }

    /// Typed view of the properties of a street segment
    pub fn street_segment_properties(&self) -> Result<StreetSegmentProperties> {
        Ok(serde_json::from_value(Value::Object(self.properties.clone()))?)
    }
}

fn null_as_empty<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> std::result::Result<Map<String, Value>, D::Error> {
    Ok(Option::<Map<String, Value>>::deserialize(deserializer)?.unwrap_or_default())
}

/// Properties of an approach: one direction of travel into an intersection
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApproachProperties {
    #[serde(default)]
    pub intersection: Option<Uuid>,
    #[serde(default)]
    pub bearing: Option<Bearing>,
    #[serde(default)]
    pub speed_limit: Option<u32>,
    #[serde(default)]
    pub phases: Vec<Phase>,
}

/// Signal phase serving an approach
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Phase {
    pub number: u32,
    /// Movement served by the phase ("Thru", "Left", "Right", ...)
    #[serde(default)]
    pub movement: Option<String>,
    #[serde(default)]
    pub lanes: Option<u32>,
    #[serde(default)]
    pub detectors: Vec<Detector>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Detector {
    #[serde(default)]
    pub number: Option<u32>,
    /// Upstream (advance) detector rather than a stop-bar detector
    #[serde(default)]
    pub advanced: bool,
    #[serde(default)]
    pub distance_from_stop_bar: Option<f64>,
}

/// Properties of a street segment: a stretch of road between two intersections
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StreetSegmentProperties {
    #[serde(default)]
    pub intersection: Option<Uuid>,
    /// Intersection the segment leaves from
    #[serde(default)]
    pub origin: Option<Uuid>,
    /// Intersection the segment leads to
    #[serde(default)]
    pub destination: Option<Uuid>,
    #[serde(default)]
    pub speed_limit: Option<u32>,
    #[serde(default)]
    pub trip_points: Vec<TripPointLocation>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo::coord;
    use serde_json::json;

    #[test]
    fn test_entity_type_names() {
        assert_eq!(EntityType::from("streetsegment"), EntityType::StreetSegment);
        assert_eq!(EntityType::from("Signal"), EntityType::Other("Signal".to_string()));
        assert_eq!(String::from(EntityType::Approach), "Approach");
        assert_eq!(
            serde_json::to_value(EntityType::Other("Signal".into())).unwrap(),
            json!("Signal")
        );
    }

    #[test]
    fn test_entity_model_serializes_camel_case() {
        let id = Uuid::new_v4();
        let model = EntityModel::new(
            EntityType::Approach,
            Geometry::line_string(vec![(0.0, 0.0), (0.0, 0.001)]),
        )
        .with_intersection(id);

        let value = serde_json::to_value(&model).unwrap();
        assert_eq!(value["entityType"], json!("Approach"));
        assert_eq!(value["properties"]["intersection"], json!(id.to_string()));
        assert_eq!(value["geometry"]["type"], json!("LineString"));
        assert!(value["geoFence"].is_null());
        assert!(value.get("name").is_none());

        let back: EntityModel = serde_json::from_value(value).unwrap();
        assert_eq!(back, model);
    }

    #[test]
    fn test_missing_and_null_fields_default() {
        let model: EntityModel = serde_json::from_value(json!({
            "id": "8e0e4c4e-8f63-4b55-9f5d-6e3c2a4a7f10",
            "entityType": "Intersection",
            "properties": null
        }))
        .unwrap();
        assert!(model.properties.is_empty());
        assert!(model.geometry.is_none());
        assert!(!model.is_deleted());
    }

    #[test]
    fn test_intersection_id() {
        let intersection = EntityModel::new(
            EntityType::Intersection,
            Geometry::point(coord! { x: 0.0, y: 0.0 }),
        );
        assert_eq!(intersection.intersection_id(), Some(intersection.id));

        let approach = EntityModel::new(
            EntityType::Approach,
            Geometry::point(coord! { x: 0.0, y: 0.0 }),
        )
        .with_intersection(intersection.id);
        assert_eq!(approach.intersection_id(), Some(intersection.id));
        assert!(approach.belongs_to_intersection(intersection.id));
        assert!(intersection.belongs_to_intersection(intersection.id));

        let orphan = EntityModel::new(
            EntityType::StreetSegment,
            Geometry::point(coord! { x: 0.0, y: 0.0 }),
        )
        .with_property(INTERSECTION_PROPERTY, "not-a-uuid");
        assert_eq!(orphan.intersection_id(), None);
        assert!(!orphan.belongs_to_intersection(intersection.id));
    }

    #[test]
    fn test_approach_properties() {
        let model = EntityModel::new(
            EntityType::Approach,
            Geometry::line_string(vec![(0.0, 0.0), (0.0, 0.001)]),
        )
        .with_property(BEARING_PROPERTY, "SB")
        .with_property("speedLimit", 35)
        .with_property(
            "phases",
            json!([{"number": 2, "movement": "Thru", "lanes": 2,
                    "detectors": [{"number": 1, "advanced": true}]}]),
        );

        let props = model.approach_properties().unwrap();
        assert_eq!(props.bearing, Some(Bearing::SouthBound));
        assert_eq!(props.speed_limit, Some(35));
        assert_eq!(props.phases[0].movement.as_deref(), Some("Thru"));
        assert!(props.phases[0].detectors[0].advanced);
    }
}
