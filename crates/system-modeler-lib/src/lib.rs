//! System Modeler Library - Geospatial entity models for traffic system configuration
//!
//! This library stores the physical layout of a traffic system (intersections, approaches and
//! street segments) as geospatial [`EntityModel`]s and answers the spatial questions a
//! connected-vehicle pipeline asks of it: which approach geofence contains this vehicle, which
//! intersections does this route cross, where along a street segment is this probe.
//!
//! # Architecture
//!
//! - **[`geodesy`]**: Web Mercator projection, planar distance/bearing and cardinal helpers
//! - **[`geometry`]**: Tagged geometry values, geofence buffering and path interpolation
//! - **[`TripPointSampler`]**: Equal-interval reference points along a path
//! - **[`EntityModelFactory`]**: Derives geofences and trip points on creation
//! - **[`EntityStore`]**: Shared query contract, implemented by
//!   [`ServerQueryEngine`] (delegates to an indexed [`DocumentStore`]) and
//!   [`EdgeQueryEngine`] (scans a cached JSON snapshot)
//! - **[`SnapshotCache`]** / **[`SnapshotFile`]**: Edge-side persistence and TTL caching
//!
//! Both query engines answer every spatial query identically for the same data set; the edge
//! engine trades index lookups for a parallel linear scan over a small, local snapshot.

mod factory;
pub mod geodesy;
pub mod geometry;
mod model;
pub mod snapshot;
pub mod store;
mod trip_point;

// Public API exports
pub use factory::{EntityModelFactory, GeoFenceConfig};
pub use geodesy::{Bearing, Crs};
pub use geometry::Geometry;
pub use model::{
    ApproachProperties, Detector, EntityModel, EntityType, Phase, StreetSegmentProperties,
};
pub use snapshot::{SnapshotCache, SnapshotCacheConfig, SnapshotFile};
pub use store::{
    DocumentStore, EdgeQueryEngine, EntityStore, IndexedField, MemoryDocumentStore,
    ServerQueryEngine, SpatialFilter,
};
pub use trip_point::{TripPointConfig, TripPointLocation, TripPointSampler, order_along_route};

use uuid::Uuid;

/// Error types for the modeling library
#[derive(Debug, thiserror::Error)]
pub enum ModelerError {
    #[error("Unsupported projection from {from} to {to}")]
    UnsupportedProjection { from: Crs, to: Crs },

    #[error("Invalid buffer radius: {0} (must be a positive, finite distance in meters)")]
    InvalidBufferRadius(f64),

    #[error("Invalid sampling interval: {0} (must be a positive, finite distance in meters, coarse enough for the path)")]
    InvalidInterval(f64),

    #[error("Invalid path: {0}")]
    InvalidPath(String),

    #[error("Invalid geometry: {0}")]
    InvalidGeometry(String),

    #[error("Entity not found: {0}")]
    EntityNotFound(Uuid),

    #[error("Entity already exists: {0}")]
    DuplicateEntity(Uuid),

    #[error("Entity type of {id} cannot change from {from} to {to}")]
    EntityTypeChanged {
        id: Uuid,
        from: EntityType,
        to: EntityType,
    },

    #[error("Failed to write snapshot: {0}")]
    PersistenceWriteFailure(String),

    #[error("Failed to read snapshot: {0}")]
    PersistenceReadFailure(String),

    #[error("Document store error: {0}")]
    Store(String),

    #[error("Unsupported operation: {0}")]
    UnsupportedOperation(&'static str),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, ModelerError>;
