//! Authoritative document store boundary
//!
//! The server engine never builds store-native queries. It describes what it wants as a
//! [`SpatialFilter`] and hands it to a [`DocumentStore`], which is free to answer from an index
//! as long as the result equals [`SpatialFilter::matches`] applied to every document.

use crate::geodesy;
use crate::geometry::{self, Geometry};
use crate::model::{EntityModel, EntityType};
use crate::Result;
use async_trait::async_trait;
use geo::{Closest, ClosestPoint, Coord, Intersects, Point, Rect};
use uuid::Uuid;

/// Spatially indexed document field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IndexedField {
    GeoFence,
    Geometry,
}

impl IndexedField {
    /// Document field name
    pub fn as_str(self) -> &'static str {
        match self {
            IndexedField::GeoFence => "geoFence",
            IndexedField::Geometry => "geometry",
        }
    }

    /// Value of this field in `model`
    #[inline]
    pub fn of(self, model: &EntityModel) -> Option<&Geometry> {
        match self {
            IndexedField::GeoFence => model.geo_fence.as_ref(),
            IndexedField::Geometry => model.geometry.as_ref(),
        }
    }
}

/// Store-independent query predicate over entity documents
#[derive(Debug, Clone, PartialEq)]
pub enum SpatialFilter {
    /// Every document
    All,
    And(Vec<SpatialFilter>),
    Or(Vec<SpatialFilter>),
    EntityTypeEq(EntityType),
    IdEq(Uuid),
    /// `properties.intersection` equals the id
    IntersectionRefEq(Uuid),
    /// `isDeleted` is absent or false
    NotDeleted,
    /// The field shares at least one point with `geometry`
    GeoIntersects {
        field: IndexedField,
        geometry: Geometry,
    },
    /// The field lies within `max_meters` of `point`, measured on the sphere
    NearSphere {
        field: IndexedField,
        point: Coord<f64>,
        max_meters: f64,
    },
}

#[cfg_attr(feature = "profiling", profiling::all_functions)]
impl SpatialFilter {
    /// Reference evaluation of the predicate against one document
    pub fn matches(&self, model: &EntityModel) -> bool {
        match self {
            SpatialFilter::All => true,
            SpatialFilter::And(filters) => filters.iter().all(|f| f.matches(model)),
            SpatialFilter::Or(filters) => filters.iter().any(|f| f.matches(model)),
            SpatialFilter::EntityTypeEq(entity_type) => &model.entity_type == entity_type,
            SpatialFilter::IdEq(id) => model.id == *id,
            SpatialFilter::IntersectionRefEq(id) => model.intersection_reference() == Some(*id),
            SpatialFilter::NotDeleted => !model.is_deleted(),
            SpatialFilter::GeoIntersects { field, geometry } => field
                .of(model)
                .is_some_and(|value| geometry::intersects(value, geometry)),
            SpatialFilter::NearSphere {
                field,
                point,
                max_meters,
            } => field
                .of(model)
                .and_then(|value| sphere_distance(value, *point))
                .is_some_and(|distance| distance <= *max_meters),
        }
    }

    /// Field and geographic bounds any match must intersect, if the filter implies one
    pub(crate) fn index_hint(&self) -> Option<(IndexedField, Rect<f64>)> {
        match self {
            SpatialFilter::GeoIntersects { field, geometry } if geometry.crs().is_wgs84() => {
                geometry.bounding_rect().map(|rect| (*field, rect))
            }
            SpatialFilter::And(filters) => filters.iter().find_map(SpatialFilter::index_hint),
            _ => None,
        }
    }
}

/// Great-circle distance from `point` to the closest part of a geographic geometry
fn sphere_distance(geometry: &Geometry, point: Coord<f64>) -> Option<f64> {
    if !geometry.crs().is_wgs84() {
        return None;
    }
    let shape = geometry.to_geo();
    let target = Point::from(point);
    if shape.intersects(&target) {
        return Some(0.0);
    }
    match shape.closest_point(&target) {
        Closest::Intersection(p) | Closest::SinglePoint(p) => {
            Some(geodesy::great_circle_distance(point, p.0))
        }
        Closest::Indeterminate => None,
    }
}

/// An externally indexed store of entity documents
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// All documents matching `filter`, in store-defined order
    async fn find(&self, filter: &SpatialFilter) -> Result<Vec<EntityModel>>;

    /// Insert a new document; fails with `DuplicateEntity` if the id exists
    async fn insert(&self, document: EntityModel) -> Result<()>;

    /// Replace the document with the same id; fails with `EntityNotFound` if absent
    async fn replace(&self, document: EntityModel) -> Result<()>;

    /// Physically delete a document; fails with `EntityNotFound` if absent
    async fn delete(&self, id: Uuid) -> Result<()>;
}
