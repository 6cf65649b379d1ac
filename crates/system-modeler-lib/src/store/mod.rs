//! Entity store abstraction - one query contract, two backends
//!
//! [`EntityStore`] is what services program against. [`ServerQueryEngine`] translates each query
//! into a [`SpatialFilter`] for an indexed [`DocumentStore`]; [`EdgeQueryEngine`] evaluates the
//! very same filters by scanning a cached snapshot. Because both sides share the filter
//! semantics, a given data set answers every query identically on either backend.

mod document;
mod edge;
mod memory;
mod server;

pub use document::{DocumentStore, IndexedField, SpatialFilter};
pub use edge::EdgeQueryEngine;
pub use memory::MemoryDocumentStore;
pub use server::ServerQueryEngine;

use crate::geometry::Geometry;
use crate::model::{EntityModel, EntityType};
use crate::{ModelerError, Result};
use async_trait::async_trait;
use geo::{Coord, LineString};
use uuid::Uuid;

/// Spatial and lifecycle queries over the stored entities
///
/// Result sequences are sets; their order is backend-defined. Spatial queries consider
/// soft-deleted entities too, and entities without the queried field never match.
#[async_trait]
pub trait EntityStore: Send + Sync {
    /// Entities whose geofence contains `point`, optionally restricted to one type
    async fn query_by_geo_fence_containing_point(
        &self,
        point: Coord<f64>,
        entity_type: Option<&EntityType>,
    ) -> Result<Vec<EntityModel>>;

    /// Entities of `entity_type` whose geofence intersects `route`
    async fn query_by_geo_fence_intersecting_route(
        &self,
        entity_type: &EntityType,
        route: &LineString<f64>,
    ) -> Result<Vec<EntityModel>>;

    /// Entities of `entity_type` whose own geometry intersects `route`
    async fn query_by_geometry_intersecting_route(
        &self,
        entity_type: &EntityType,
        route: &LineString<f64>,
    ) -> Result<Vec<EntityModel>>;

    /// The entity with `id`, or `EntityNotFound`
    async fn get_by_id(&self, id: Uuid) -> Result<EntityModel>;

    async fn get_all(&self) -> Result<Vec<EntityModel>>;

    /// Entities that are not soft-deleted
    async fn get_all_except_deleted(&self) -> Result<Vec<EntityModel>>;

    /// The intersection `id` itself plus every entity referencing it
    async fn get_by_intersection_id(&self, id: Uuid) -> Result<Vec<EntityModel>>;

    async fn add(&self, model: EntityModel) -> Result<()>;

    /// Replace a stored entity; its type cannot change
    async fn update(&self, model: EntityModel) -> Result<()>;

    /// Mark an entity deleted without removing it
    async fn soft_delete(&self, id: Uuid) -> Result<()>;

    /// Physically delete an entity
    async fn remove(&self, id: Uuid) -> Result<()>;

    async fn query_intersecting_intersections(
        &self,
        route: &LineString<f64>,
    ) -> Result<Vec<EntityModel>> {
        self.query_by_geo_fence_intersecting_route(&EntityType::Intersection, route)
            .await
    }

    async fn query_intersecting_approaches(
        &self,
        route: &LineString<f64>,
    ) -> Result<Vec<EntityModel>> {
        self.query_by_geometry_intersecting_route(&EntityType::Approach, route)
            .await
    }

    async fn query_intersecting_street_segments(
        &self,
        point: Coord<f64>,
    ) -> Result<Vec<EntityModel>> {
        self.query_by_geo_fence_containing_point(point, Some(&EntityType::StreetSegment))
            .await
    }
}

/// Filters shared by both engines, so their semantics cannot drift apart
pub(crate) mod filters {
    use super::*;

    pub fn containing_point(point: Coord<f64>, entity_type: Option<&EntityType>) -> SpatialFilter {
        let intersects = SpatialFilter::GeoIntersects {
            field: IndexedField::GeoFence,
            geometry: Geometry::point(point),
        };
        match entity_type {
            Some(entity_type) => {
                SpatialFilter::And(vec![SpatialFilter::EntityTypeEq(entity_type.clone()), intersects])
            }
            None => intersects,
        }
    }

    pub fn intersecting_route(
        field: IndexedField,
        entity_type: &EntityType,
        route: &LineString<f64>,
    ) -> Result<SpatialFilter> {
        Ok(SpatialFilter::And(vec![
            SpatialFilter::EntityTypeEq(entity_type.clone()),
            SpatialFilter::GeoIntersects {
                field,
                geometry: route_geometry(route)?,
            },
        ]))
    }

    pub fn by_intersection(id: Uuid) -> SpatialFilter {
        SpatialFilter::Or(vec![
            SpatialFilter::IntersectionRefEq(id),
            SpatialFilter::IdEq(id),
        ])
    }

    fn route_geometry(route: &LineString<f64>) -> Result<Geometry> {
        if route.0.len() < 2 {
            return Err(ModelerError::InvalidPath(format!(
                "route needs at least 2 points, got {}",
                route.0.len()
            )));
        }
        Ok(Geometry::line_string(route.clone()))
    }
}

/// Reject updates that would change an entity's type
pub(crate) fn ensure_same_type(existing: &EntityModel, update: &EntityModel) -> Result<()> {
    if existing.entity_type != update.entity_type {
        return Err(ModelerError::EntityTypeChanged {
            id: update.id,
            from: existing.entity_type.clone(),
            to: update.entity_type.clone(),
        });
    }
    Ok(())
}
