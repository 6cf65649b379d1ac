//! Edge modeler service - the same operations against the local snapshot

use super::{ModelerService, report, soft_delete_intersection};
use crate::Result;
use async_trait::async_trait;
use system_modeler_lib::{EdgeQueryEngine, EntityModel, EntityModelFactory, EntityStore};
use uuid::Uuid;

/// Serves one intersection from its synced snapshot; never publishes
#[derive(Clone)]
pub struct EdgeModelerService {
    factory: EntityModelFactory,
    store: EdgeQueryEngine,
}

impl EdgeModelerService {
    pub fn new(factory: EntityModelFactory, store: EdgeQueryEngine) -> Self {
        Self { factory, store }
    }

    pub fn store(&self) -> &EdgeQueryEngine {
        &self.store
    }
}

#[async_trait]
impl ModelerService for EdgeModelerService {
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
        Ok(created)
    }

    async fn update(&self, model: EntityModel) -> Result<EntityModel> {
        let updated = self.factory.create(model)?;
        if let Err(e) = self.store.update(updated.clone()).await {
            tracing::error!(id = %updated.id, "Update failed: {e}");
            return Err(e.into());
        }
        Ok(updated)
    }

    async fn soft_delete(&self, id: Uuid) -> bool {
        let result = self.store.soft_delete(id).await.map_err(Into::into);
        report("Soft delete", id, result)
    }

    async fn delete(&self, id: Uuid) -> bool {
        let result = self.store.remove(id).await.map_err(Into::into);
        report("Delete", id, result)
    }

    async fn soft_delete_by_intersection(&self, id: Uuid) -> bool {
        let result = soft_delete_intersection(&self.store, id).await;
        report("Soft delete by intersection", id, result.map(|_| ()))
    }

    /// Edge devices only consume configuration
    async fn publish_config(&self, _id: Uuid) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo::coord;
    use std::sync::Arc;
    use system_modeler_lib::{EntityType, Geometry, SnapshotCache, SnapshotFile};

    fn service(dir: &tempfile::TempDir) -> EdgeModelerService {
        EdgeModelerService::new(
            EntityModelFactory::default(),
            EdgeQueryEngine::new(
                SnapshotFile::new(dir.path().join("config.json")),
                Arc::new(SnapshotCache::default()),
            ),
        )
    }

    #[tokio::test]
    async fn test_delete_removes_from_snapshot() {
        let dir = tempfile::tempdir().unwrap();
        let service = service(&dir);
        let created = service
            .add(EntityModel::new(
                EntityType::Intersection,
                Geometry::point(coord! { x: -83.0479, y: 42.5361 }),
            ))
            .await
            .unwrap();

        assert!(service.delete(created.id).await);
        assert!(!service.delete(created.id).await);
        assert!(service.store().snapshot_file().load().await.unwrap().is_empty());
        service.publish_config(created.id).await.unwrap();
    }
}
