//! Persisted edge snapshot: the intersection's entities as an indented JSON array
//!
//! Reads accept property names in any letter case; writes always use camelCase. Every write
//! replaces the whole file. Clones of a [`SnapshotFile`] share one write lock, so a
//! [`modify`](SnapshotFile::modify) never interleaves with another write through any clone.

use crate::model::EntityModel;
use crate::{ModelerError, Result};
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

/// Default location of the edge snapshot
pub const DEFAULT_SNAPSHOT_PATH: &str = "./data/config.json";

/// Canonical spelling of every key the snapshot format defines
const ENTITY_KEYS: &[&str] = &[
    "id",
    "name",
    "entityType",
    "geometry",
    "properties",
    "geoFence",
    "isDeleted",
];
const GEOMETRY_KEYS: &[&str] = &["type", "coordinates", "crs"];

/// Snapshot file on local storage
#[derive(Debug, Clone)]
pub struct SnapshotFile {
    path: PathBuf,
    write_lock: Arc<Mutex<()>>,
}

impl Default for SnapshotFile {
    fn default() -> Self {
        Self::new(DEFAULT_SNAPSHOT_PATH)
    }
}

impl SnapshotFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Arc::new(Mutex::new(())),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read every entity in the snapshot
    ///
    /// A missing file is an empty snapshot: the device has not been synced yet.
    pub async fn load(&self) -> Result<Vec<EntityModel>> {
        let bytes = match tokio::fs::read(&self.path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!(path = %self.path.display(), "No snapshot yet, serving empty data");
                return Ok(Vec::new());
            }
            Err(e) => return Err(self.read_failure(e)),
        };

        let raw: Value = serde_json::from_slice(&bytes).map_err(|e| self.read_failure(e))?;
        let models: Vec<EntityModel> =
            serde_json::from_value(normalize_snapshot(raw)).map_err(|e| self.read_failure(e))?;
        tracing::info!(path = %self.path.display(), count = models.len(), "Loaded snapshot");
        Ok(models)
    }

    /// Replace the snapshot with `models`
    pub async fn save(&self, models: &[EntityModel]) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        self.write(models).await
    }

    /// Load, apply `change` and save, holding the write lock throughout
    ///
    /// Nothing is written when `change` fails.
    pub async fn modify<F, T>(&self, change: F) -> Result<T>
    where
        F: FnOnce(&mut Vec<EntityModel>) -> Result<T>,
    {
        let _guard = self.write_lock.lock().await;
        let mut models = self.load().await?;
        let outcome = change(&mut models)?;
        self.write(&models).await?;
        Ok(outcome)
    }

    async fn write(&self, models: &[EntityModel]) -> Result<()> {
        let json = serde_json::to_vec_pretty(models)?;
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| self.write_failure(e))?;
        }

        let mut file = tokio::fs::File::create(&self.path)
            .await
            .map_err(|e| self.write_failure(e))?;
        file.write_all(&json).await.map_err(|e| self.write_failure(e))?;
        file.flush().await.map_err(|e| self.write_failure(e))?;

        tracing::info!(path = %self.path.display(), count = models.len(), "Saved snapshot");
        Ok(())
    }

    fn read_failure(&self, e: impl std::fmt::Display) -> ModelerError {
        ModelerError::PersistenceReadFailure(format!("{}: {e}", self.path.display()))
    }

    fn write_failure(&self, e: impl std::fmt::Display) -> ModelerError {
        ModelerError::PersistenceWriteFailure(format!("{}: {e}", self.path.display()))
    }
}

/// Rewrite entity and geometry keys to their canonical spelling
fn normalize_snapshot(value: Value) -> Value {
    match value {
        Value::Array(items) => Value::Array(items.into_iter().map(normalize_entity).collect()),
        other => other,
    }
}

fn normalize_entity(value: Value) -> Value {
    let Value::Object(map) = value else {
        return value;
    };
    let mut normalized = Map::with_capacity(map.len());
    for (key, value) in map {
        let key = canonical_key(&key, ENTITY_KEYS);
        let value = match key.as_str() {
            "geometry" | "geoFence" => normalize_keys(value, GEOMETRY_KEYS),
            _ => value,
        };
        normalized.insert(key, value);
    }
    Value::Object(normalized)
}

fn normalize_keys(value: Value, known: &[&str]) -> Value {
    match value {
        Value::Object(map) => Value::Object(
            map.into_iter()
                .map(|(key, value)| (canonical_key(&key, known), value))
                .collect(),
        ),
        other => other,
    }
}

fn canonical_key(key: &str, known: &[&str]) -> String {
    known
        .iter()
        .find(|k| k.eq_ignore_ascii_case(key))
        .map_or_else(|| key.to_string(), |k| k.to_string())
}
