//! Edge query engine - scans the cached local snapshot in-process
//!
//! Reads go through the [`SnapshotCache`]; writes read the file directly, apply the change and
//! rewrite the whole file under the file's write lock. Writes do not touch the cache, so a read
//! after a write may return the previous snapshot until the cache entry expires.

use super::document::{IndexedField, SpatialFilter};
use super::{EntityStore, ensure_same_type, filters};
use crate::model::{EntityModel, EntityType};
use crate::snapshot::{SnapshotCache, SnapshotFile};
use crate::{ModelerError, Result};
use async_trait::async_trait;
use geo::{Coord, LineString};
use rayon::prelude::*;
use std::sync::Arc;
use uuid::Uuid;

/// [`EntityStore`] over a JSON snapshot on local storage
#[derive(Clone)]
pub struct EdgeQueryEngine {
    file: SnapshotFile,
    cache: Arc<SnapshotCache<Vec<EntityModel>>>,
}

impl EdgeQueryEngine {
    pub fn new(file: SnapshotFile, cache: Arc<SnapshotCache<Vec<EntityModel>>>) -> Self {
        Self { file, cache }
    }

    pub fn snapshot_file(&self) -> &SnapshotFile {
        &self.file
    }

    /// Current snapshot, from the cache or freshly loaded
    pub async fn snapshot(&self) -> Result<Arc<Vec<EntityModel>>> {
        let key = self.cache.config().key.as_str();
        self.cache.get_or_load(key, || self.file.load()).await
    }

    /// Replace the whole snapshot, as a configuration sync does
    pub async fn replace_all(&self, models: &[EntityModel]) -> Result<()> {
        self.file.save(models).await
    }

    /// Entities of the snapshot matching `filter`, in snapshot order
    ///
    /// The scan runs on the blocking pool so large snapshots do not stall the runtime.
    pub async fn scan(&self, filter: &SpatialFilter) -> Result<Vec<EntityModel>> {
        let models = self.snapshot().await?;
        let filter = filter.clone();
        tokio::task::spawn_blocking(move || {
            models
                .par_iter()
                .filter(|model| filter.matches(model))
                .cloned()
                .collect::<Vec<_>>()
        })
        .await
        .map_err(|e| ModelerError::Store(format!("snapshot scan failed: {e}")))
    }
}

fn position(models: &[EntityModel], id: Uuid) -> Result<usize> {
    models
        .iter()
        .position(|m| m.id == id)
        .ok_or(ModelerError::EntityNotFound(id))
}

#[async_trait]
impl EntityStore for EdgeQueryEngine {
    async fn query_by_geo_fence_containing_point(
        &self,
        point: Coord<f64>,
        entity_type: Option<&EntityType>,
    ) -> Result<Vec<EntityModel>> {
        self.scan(&filters::containing_point(point, entity_type))
            .await
    }

    async fn query_by_geo_fence_intersecting_route(
        &self,
        entity_type: &EntityType,
        route: &LineString<f64>,
    ) -> Result<Vec<EntityModel>> {
        let filter = filters::intersecting_route(IndexedField::GeoFence, entity_type, route)?;
        self.scan(&filter).await
    }

    async fn query_by_geometry_intersecting_route(
        &self,
        entity_type: &EntityType,
        route: &LineString<f64>,
    ) -> Result<Vec<EntityModel>> {
        let filter = filters::intersecting_route(IndexedField::Geometry, entity_type, route)?;
        self.scan(&filter).await
    }

    async fn get_by_id(&self, id: Uuid) -> Result<EntityModel> {
        let models = self.snapshot().await?;
        models
            .iter()
            .find(|m| m.id == id)
            .cloned()
            .ok_or(ModelerError::EntityNotFound(id))
    }

    async fn get_all(&self) -> Result<Vec<EntityModel>> {
        Ok(self.snapshot().await?.as_ref().clone())
    }

    async fn get_all_except_deleted(&self) -> Result<Vec<EntityModel>> {
        self.scan(&SpatialFilter::NotDeleted).await
    }

    async fn get_by_intersection_id(&self, id: Uuid) -> Result<Vec<EntityModel>> {
        self.scan(&filters::by_intersection(id)).await
    }

    async fn add(&self, model: EntityModel) -> Result<()> {
        tracing::debug!(id = %model.id, entity_type = %model.entity_type, "Adding entity to snapshot");
        self.file.modify(move |models| {
            if models.iter().any(|m| m.id == model.id) {
                return Err(ModelerError::DuplicateEntity(model.id));
            }
            models.push(model);
            Ok(())
        })
        .await
    }

    async fn update(&self, model: EntityModel) -> Result<()> {
        tracing::debug!(id = %model.id, "Updating entity in snapshot");
        self.file.modify(move |models| {
            let index = position(models, model.id)?;
            ensure_same_type(&models[index], &model)?;
            models[index] = model;
            Ok(())
        })
        .await
    }

    async fn soft_delete(&self, id: Uuid) -> Result<()> {
        tracing::debug!(%id, "Soft-deleting entity in snapshot");
        self.file.modify(move |models| {
            let index = position(models, id)?;
            models[index].is_deleted = Some(true);
            Ok(())
        })
        .await
    }

    async fn remove(&self, id: Uuid) -> Result<()> {
        tracing::debug!(%id, "Removing entity from snapshot");
        self.file.modify(move |models| {
            let index = position(models, id)?;
            models.remove(index);
            Ok(())
        })
        .await
    }
}
