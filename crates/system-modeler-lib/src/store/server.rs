//! Server query engine - delegates every query to the authoritative document store

use super::document::{DocumentStore, IndexedField, SpatialFilter};
use super::{EntityStore, ensure_same_type, filters};
use crate::geodesy::METERS_PER_MILE;
use crate::model::{EntityModel, EntityType};
use crate::{ModelerError, Result};
use async_trait::async_trait;
use geo::{Coord, LineString};
use std::sync::Arc;
use uuid::Uuid;

/// [`EntityStore`] backed by an indexed [`DocumentStore`]
#[derive(Clone)]
pub struct ServerQueryEngine {
    store: Arc<dyn DocumentStore>,
}

impl ServerQueryEngine {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self { store }
    }

    /// Entities whose geofence lies within `miles` of `point` (great-circle distance),
    /// optionally restricted to one type
    pub async fn query_near(
        &self,
        point: Coord<f64>,
        miles: f64,
        entity_type: Option<&EntityType>,
    ) -> Result<Vec<EntityModel>> {
        let near = SpatialFilter::NearSphere {
            field: IndexedField::GeoFence,
            point,
            max_meters: miles * METERS_PER_MILE,
        };
        let filter = match entity_type {
            Some(entity_type) => {
                SpatialFilter::And(vec![SpatialFilter::EntityTypeEq(entity_type.clone()), near])
            }
            None => near,
        };
        self.store.find(&filter).await
    }
}

#[async_trait]
impl EntityStore for ServerQueryEngine {
    async fn query_by_geo_fence_containing_point(
        &self,
        point: Coord<f64>,
        entity_type: Option<&EntityType>,
    ) -> Result<Vec<EntityModel>> {
        self.store
            .find(&filters::containing_point(point, entity_type))
            .await
    }

    async fn query_by_geo_fence_intersecting_route(
        &self,
        entity_type: &EntityType,
        route: &LineString<f64>,
    ) -> Result<Vec<EntityModel>> {
        let filter = filters::intersecting_route(IndexedField::GeoFence, entity_type, route)?;
        self.store.find(&filter).await
    }

    async fn query_by_geometry_intersecting_route(
        &self,
        entity_type: &EntityType,
        route: &LineString<f64>,
    ) -> Result<Vec<EntityModel>> {
        let filter = filters::intersecting_route(IndexedField::Geometry, entity_type, route)?;
        self.store.find(&filter).await
    }

    async fn get_by_id(&self, id: Uuid) -> Result<EntityModel> {
        self.store
            .find(&SpatialFilter::IdEq(id))
            .await?
            .into_iter()
            .next()
            .ok_or(ModelerError::EntityNotFound(id))
    }

    async fn get_all(&self) -> Result<Vec<EntityModel>> {
        self.store.find(&SpatialFilter::All).await
    }

    async fn get_all_except_deleted(&self) -> Result<Vec<EntityModel>> {
        self.store.find(&SpatialFilter::NotDeleted).await
    }

    async fn get_by_intersection_id(&self, id: Uuid) -> Result<Vec<EntityModel>> {
        self.store.find(&filters::by_intersection(id)).await
    }

    async fn add(&self, model: EntityModel) -> Result<()> {
        tracing::debug!(id = %model.id, entity_type = %model.entity_type, "Adding entity");
        self.store.insert(model).await
    }

    async fn update(&self, model: EntityModel) -> Result<()> {
        let existing = self.get_by_id(model.id).await?;
        ensure_same_type(&existing, &model)?;
        tracing::debug!(id = %model.id, "Updating entity");
        self.store.replace(model).await
    }

    async fn soft_delete(&self, id: Uuid) -> Result<()> {
        let mut model = self.get_by_id(id).await?;
        model.is_deleted = Some(true);
        tracing::debug!(%id, "Soft-deleting entity");
        self.store.replace(model).await
    }

    async fn remove(&self, _id: Uuid) -> Result<()> {
        Err(ModelerError::UnsupportedOperation(
            "physical removal from the authoritative store; use soft_delete",
        ))
    }
}
