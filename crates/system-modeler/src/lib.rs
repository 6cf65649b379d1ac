//! System Modeler - Service Library
//!
//! This crate wires the modeling library into running services: the authoritative side that
//! owns the entity store and answers config requests, and the edge side that serves one
//! intersection from a synced local snapshot.

pub mod bus;
mod error;
pub mod service;
mod settings;
pub mod sync;

pub use error::{Result, SyncError};
pub use settings::{Mode, Settings};

use bus::{MemoryBus, MessageBus};
use service::{EdgeModelerService, ModelerService, SystemModelerService};
use service_entrypoints::spawn;
use std::sync::Arc;
use sync::{ConfigRequestWorker, EdgeConfigWorker};
use system_modeler_lib::{
    EdgeQueryEngine, EntityModelFactory, MemoryDocumentStore, ServerQueryEngine, SnapshotCache,
    SnapshotFile,
};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Run the services selected by `settings.mode` until `cancel` fires
pub async fn run(settings: Settings, cancel: CancellationToken) -> Result<()> {
    let bus = connect_bus(&settings).await?;
    let mut workers = Vec::new();

    if matches!(settings.mode, Mode::Authority | Mode::Standalone) {
        let service = authority_service(&settings, bus.clone()).await?;
        let worker =
            ConfigRequestWorker::subscribe(service, bus.as_ref(), &settings.request_topic).await?;
        workers.push(spawn(worker.run(cancel.clone())));
    }

    if matches!(settings.mode, Mode::Edge | Mode::Standalone) {
        let (service, worker) = edge_service(&settings, bus.clone()).await?;
        let live = service.get_all().await?.len();
        tracing::info!(live, "Edge snapshot ready");
        workers.push(spawn(worker.run(cancel.clone())));
    }

    tracing::info!(mode = ?settings.mode, "System modeler running");
    join_all(workers).await;
    Ok(())
}

async fn join_all(workers: Vec<JoinHandle<()>>) {
    for worker in workers {
        if let Err(e) = worker.await {
            tracing::error!("Worker task failed: {e}");
        }
    }
}

async fn connect_bus(settings: &Settings) -> Result<Arc<dyn MessageBus>> {
    #[cfg(feature = "nats")]
    if let Some(url) = &settings.nats_url {
        return Ok(Arc::new(bus::NatsBus::connect(url, "system-modeler").await?));
    }

    if settings.mode != Mode::Standalone {
        tracing::warn!(mode = ?settings.mode, "No broker configured, using the in-memory bus");
    }
    Ok(Arc::new(MemoryBus::new()))
}

/// Authoritative service over an in-memory store, seeded from `--seed-path`
pub async fn authority_service(
    settings: &Settings,
    bus: Arc<dyn MessageBus>,
) -> Result<Arc<dyn ModelerService>> {
    let factory = EntityModelFactory::default();
    let seed = match &settings.seed_path {
        Some(path) => SnapshotFile::new(path)
            .load()
            .await?
            .into_iter()
            .map(|model| factory.create(model))
            .collect::<system_modeler_lib::Result<Vec<_>>>()?,
        None => Vec::new(),
    };
    let store = ServerQueryEngine::new(Arc::new(MemoryDocumentStore::with_documents(seed)));
    Ok(Arc::new(SystemModelerService::new(
        factory,
        Arc::new(store),
        bus,
        settings.response_topic.clone(),
    )))
}

/// Edge service over the local snapshot, plus the worker keeping that snapshot in sync
pub async fn edge_service(
    settings: &Settings,
    bus: Arc<dyn MessageBus>,
) -> Result<(EdgeModelerService, EdgeConfigWorker)> {
    let intersection = settings.edge_intersection()?;
    let snapshot = SnapshotFile::new(&settings.snapshot_path);
    let cache = Arc::new(SnapshotCache::new(settings.snapshot_cache_config()));
    let service = EdgeModelerService::new(
        EntityModelFactory::default(),
        EdgeQueryEngine::new(snapshot.clone(), cache),
    );
    let worker = EdgeConfigWorker::subscribe(
        intersection,
        snapshot,
        bus,
        settings.request_topic.clone(),
        &settings.response_topic,
    )
    .await?;
    Ok((service, worker))
}
