//! In-process authoritative store with R-tree indexes over the spatial fields

use super::document::{DocumentStore, IndexedField, SpatialFilter};
use crate::model::EntityModel;
use crate::{ModelerError, Result};
use async_trait::async_trait;
use geo::Rect;
use rstar::{AABB, RTree, RTreeObject};
use std::collections::HashMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use uuid::Uuid;

/// Bounding box of one document field
#[derive(Debug, Clone, PartialEq)]
struct IndexEntry {
    id: Uuid,
    envelope: AABB<[f64; 2]>,
}

impl RTreeObject for IndexEntry {
    type Envelope = AABB<[f64; 2]>;

    fn envelope(&self) -> Self::Envelope {
        self.envelope
    }
}

#[inline]
fn to_aabb(rect: Rect<f64>) -> AABB<[f64; 2]> {
    AABB::from_corners([rect.min().x, rect.min().y], [rect.max().x, rect.max().y])
}

/// Index entry for `field` of `model`; only geographic geometries are indexed
fn index_entry(model: &EntityModel, field: IndexedField) -> Option<IndexEntry> {
    field
        .of(model)
        .filter(|g| g.crs().is_wgs84())
        .and_then(|g| g.bounding_rect())
        .map(|rect| IndexEntry {
            id: model.id,
            envelope: to_aabb(rect),
        })
}

#[derive(Default)]
struct Inner {
    documents: HashMap<Uuid, EntityModel>,
    geo_fence_index: RTree<IndexEntry>,
    geometry_index: RTree<IndexEntry>,
}

impl Inner {
    fn index_mut(&mut self, field: IndexedField) -> &mut RTree<IndexEntry> {
        match field {
            IndexedField::GeoFence => &mut self.geo_fence_index,
            IndexedField::Geometry => &mut self.geometry_index,
        }
    }

    fn index(&self, field: IndexedField) -> &RTree<IndexEntry> {
        match field {
            IndexedField::GeoFence => &self.geo_fence_index,
            IndexedField::Geometry => &self.geometry_index,
        }
    }

    fn add_to_indexes(&mut self, model: &EntityModel) {
        for field in [IndexedField::GeoFence, IndexedField::Geometry] {
            if let Some(entry) = index_entry(model, field) {
                self.index_mut(field).insert(entry);
            }
        }
    }

    fn remove_from_indexes(&mut self, model: &EntityModel) {
        for field in [IndexedField::GeoFence, IndexedField::Geometry] {
            if let Some(entry) = index_entry(model, field) {
                self.index_mut(field).remove(&entry);
            }
        }
    }

    fn find(&self, filter: &SpatialFilter) -> Vec<EntityModel> {
        match filter.index_hint() {
            Some((field, rect)) => self
                .index(field)
                .locate_in_envelope_intersecting(&to_aabb(rect))
                .filter_map(|entry| self.documents.get(&entry.id))
                .filter(|model| filter.matches(model))
                .cloned()
                .collect(),
            None => self
                .documents
                .values()
                .filter(|model| filter.matches(model))
                .cloned()
                .collect(),
        }
    }
}

/// Thread-safe in-memory [`DocumentStore`]
///
/// Spatial predicates are pre-filtered through an R-tree of field bounding boxes and then
/// checked exactly, the way a database answers geo queries from a 2dsphere index.
#[derive(Default)]
pub struct MemoryDocumentStore {
    inner: RwLock<Inner>,
}

#[cfg_attr(feature = "profiling", profiling::all_functions)]
impl MemoryDocumentStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store seeded with `documents`; later duplicates replace earlier ones
    pub fn with_documents(documents: impl IntoIterator<Item = EntityModel>) -> Self {
        let mut inner = Inner::default();
        for model in documents {
            if let Some(previous) = inner.documents.insert(model.id, model.clone()) {
                inner.remove_from_indexes(&previous);
            }
            inner.add_to_indexes(&model);
        }
        tracing::info!(count = inner.documents.len(), "Seeded document store");
        Self {
            inner: RwLock::new(inner),
        }
    }

    pub fn len(&self) -> usize {
        self.read().map(|inner| inner.documents.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, Inner>> {
        self.inner
            .read()
            .map_err(|_| ModelerError::Store("document store lock poisoned".to_string()))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, Inner>> {
        self.inner
            .write()
            .map_err(|_| ModelerError::Store("document store lock poisoned".to_string()))
    }
}

#[async_trait]
impl DocumentStore for MemoryDocumentStore {
    async fn find(&self, filter: &SpatialFilter) -> Result<Vec<EntityModel>> {
        Ok(self.read()?.find(filter))
    }

    async fn insert(&self, document: EntityModel) -> Result<()> {
        let mut inner = self.write()?;
        if inner.documents.contains_key(&document.id) {
            return Err(ModelerError::DuplicateEntity(document.id));
        }
        inner.add_to_indexes(&document);
        inner.documents.insert(document.id, document);
        Ok(())
    }

    async fn replace(&self, document: EntityModel) -> Result<()> {
        let mut inner = self.write()?;
        let previous = inner
            .documents
            .remove(&document.id)
            .ok_or(ModelerError::EntityNotFound(document.id))?;
        inner.remove_from_indexes(&previous);
        inner.add_to_indexes(&document);
        inner.documents.insert(document.id, document);
        Ok(())
    }

    async fn delete(&self, id: Uuid) -> Result<()> {
        let mut inner = self.write()?;
        let previous = inner
            .documents
            .remove(&id)
            .ok_or(ModelerError::EntityNotFound(id))?;
        inner.remove_from_indexes(&previous);
        Ok(())
    }
}
