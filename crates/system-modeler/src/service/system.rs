//! Authoritative modeler service

use super::{ModelerService, report, soft_delete_intersection};
use crate::bus::MessageBus;
use crate::sync::{ConfigResponse, response_topic};
use crate::Result;
use async_trait::async_trait;
use std::sync::Arc;
use system_modeler_lib::{EntityModel, EntityModelFactory, EntityStore};
use uuid::Uuid;

/// Owns the authoritative store and pushes every change to the affected edge device
#[derive(Clone)]
pub struct SystemModelerService {
    factory: EntityModelFactory,
    store: Arc<dyn EntityStore>,
    bus: Arc<dyn MessageBus>,
    response_topic: String,
}

impl SystemModelerService {
    pub fn new(
        factory: EntityModelFactory,
        store: Arc<dyn EntityStore>,
        bus: Arc<dyn MessageBus>,
        response_topic: impl Into<String>,
    ) -> Self {
        Self {
            factory,
            store,
            bus,
            response_topic: response_topic.into(),
        }
    }

    /// Publish the configuration of the intersection `model` belongs to, if any
    ///
    /// The mutation already succeeded, so a failed publish is only logged; the edge catches up
    /// on its next request.
    async fn send_update(&self, model: &EntityModel) {
        match model.intersection_id() {
            Some(intersection) => self.push_config(intersection).await,
            None => {
                tracing::debug!(id = %model.id, "Entity belongs to no intersection, nothing to publish")
            }
        }
    }

    async fn push_config(&self, intersection: Uuid) {
        if let Err(e) = self.publish_config(intersection).await {
            tracing::error!(%intersection, "Failed to publish config update: {e}");
        }
    }

    async fn delete_with(&self, id: Uuid, soft: bool) -> Result<()> {
        let model = self.store.get_by_id(id).await?;
        if soft {
            self.store.soft_delete(id).await?;
        } else {
            self.store.remove(id).await?;
        }
        self.send_update(&model).await;
        Ok(())
    }
}

#[async_trait]
impl ModelerService for SystemModelerService {
    async fn get_all(&self) -> Result<Vec<EntityModel>> {
        Ok(self.store.get_all_except_deleted().await?)
    }

    async fn get_all_by_intersection_id(&self, id: Uuid) -> Result<Vec<EntityModel>> {
        Ok(self.store.get_by_intersection_id(id).await?)
    }

    async fn get_by_id(&self, id: Uuid) -> Result<EntityModel> {
        Ok(self.store.get_by_id(id).await?)
    }

    async fn add(&self, model: EntityModel) -> Result<EntityModel> {
        let created = self.factory.create(model)?;
        if let Err(e) = self.store.add(created.clone()).await {
            tracing::error!(id = %created.id, "Add failed: {e}");
            return Err(e.into());
        }
        tracing::info!(id = %created.id, entity_type = %created.entity_type, "Entity added");
        self.send_update(&created).await;
        Ok(created)
    }

    async fn update(&self, model: EntityModel) -> Result<EntityModel> {
        let updated = self.factory.create(model)?;
        // A missing entity fails the update below
        let previous = self
            .store
            .get_by_id(updated.id)
            .await
            .ok()
            .and_then(|stored| stored.intersection_id());
        if let Err(e) = self.store.update(updated.clone()).await {
            tracing::error!(id = %updated.id, "Update failed: {e}");
            return Err(e.into());
        }
        tracing::info!(id = %updated.id, "Entity updated");
        self.send_update(&updated).await;
        if let Some(previous) = previous.filter(|&id| Some(id) != updated.intersection_id()) {
            tracing::info!(id = %updated.id, from = %previous, "Entity moved between intersections");
            self.push_config(previous).await;
        }
        Ok(updated)
    }

    async fn soft_delete(&self, id: Uuid) -> bool {
        report("Soft delete", id, self.delete_with(id, true).await)
    }

    async fn delete(&self, id: Uuid) -> bool {
        report("Delete", id, self.delete_with(id, false).await)
    }

    async fn soft_delete_by_intersection(&self, id: Uuid) -> bool {
        let result = soft_delete_intersection(self.store.as_ref(), id).await;
        if let Ok(count) = &result {
            tracing::info!(intersection = %id, count, "Intersection soft-deleted");
            if let Err(e) = self.publish_config(id).await {
                tracing::error!(intersection = %id, "Failed to publish config update: {e}");
            }
        }
        report("Soft delete by intersection", id, result.map(|_| ()))
    }

    async fn publish_config(&self, id: Uuid) -> Result<()> {
        let models = self.store.get_by_intersection_id(id).await?;
        let topic = response_topic(&self.response_topic, id);
        let message = ConfigResponse::from_models(&models)?.into_message(id)?;
        self.bus.publish(&topic, message).await?;
        tracing::info!(intersection = %id, %topic, count = models.len(), "Published config");
        Ok(())
    }
}
