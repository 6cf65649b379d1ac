//! Modeler services - the operations exposed to callers on either side of the sync protocol
//!
//! Both services run every add and update through the [`EntityModelFactory`] so stored entities
//! always carry derived geofences. Removal operations report failure as `false` after logging;
//! add and update log and return the error.
//!
//! [`EntityModelFactory`]: system_modeler_lib::EntityModelFactory

mod edge;
mod system;

pub use edge::EdgeModelerService;
pub use system::SystemModelerService;

use crate::Result;
use async_trait::async_trait;
use system_modeler_lib::{EntityModel, EntityStore};
use uuid::Uuid;

#[async_trait]
pub trait ModelerService: Send + Sync {
    /// Every entity that is not soft-deleted
    async fn get_all(&self) -> Result<Vec<EntityModel>>;

    /// The intersection `id` and every entity referencing it
    async fn get_all_by_intersection_id(&self, id: Uuid) -> Result<Vec<EntityModel>>;

    async fn get_by_id(&self, id: Uuid) -> Result<EntityModel>;

    /// Derive geofence and properties, then store; returns the stored entity
    async fn add(&self, model: EntityModel) -> Result<EntityModel>;

    /// Derive geofence and properties, then replace; returns the stored entity
    async fn update(&self, model: EntityModel) -> Result<EntityModel>;

    async fn soft_delete(&self, id: Uuid) -> bool;

    /// Physically delete an entity
    async fn delete(&self, id: Uuid) -> bool;

    /// Soft-delete the intersection `id` and every entity referencing it
    async fn soft_delete_by_intersection(&self, id: Uuid) -> bool;

    /// Send the current configuration of intersection `id` to its edge device
    async fn publish_config(&self, id: Uuid) -> Result<()>;
}

/// Soft-delete every entity of intersection `id`, returning how many were marked
async fn soft_delete_intersection(store: &dyn EntityStore, id: Uuid) -> Result<usize> {
    let models = store.get_by_intersection_id(id).await?;
    for model in &models {
        store.soft_delete(model.id).await?;
    }
    Ok(models.len())
}

/// Log a failed removal and turn the outcome into a success flag
fn report(operation: &str, id: Uuid, result: Result<()>) -> bool {
    match result {
        Ok(()) => true,
        Err(e) => {
            tracing::error!(%id, "{operation} failed: {e}");
            false
        }
    }
}
