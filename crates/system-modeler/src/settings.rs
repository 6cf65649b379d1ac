use clap::{Parser, ValueEnum};
use std::path::PathBuf;
use std::time::Duration;
use system_modeler_lib::SnapshotCacheConfig;
use system_modeler_lib::snapshot::DEFAULT_SNAPSHOT_PATH;
use uuid::Uuid;

/// Which side of the sync protocol this process plays
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// Owns the entity store, answers config requests and pushes updates
    Authority,
    /// Serves one intersection from its local snapshot
    Edge,
    /// Both sides in one process over the in-memory bus
    Standalone,
}

#[derive(Parser, Debug, Clone)]
#[clap(author, version, about, long_about = None)]
/// System Modeler - Keeps intersection configuration in sync between the authoritative store and
/// edge devices
pub struct Settings {
    /// Role of this process
    #[clap(long, env = "MODE", value_enum, default_value = "standalone")]
    pub mode: Mode,

    /// Intersection served by this edge device
    #[clap(long, env = "INTERSECTION")]
    pub intersection: Option<Uuid>,

    /// Topic edge devices publish config requests to
    #[clap(
        long,
        env = "TOPICS_CONFIG_PRIORITY_REQUEST",
        default_value = "topic.ConfigPriorityRequest"
    )]
    pub request_topic: String,

    /// Base topic for config responses; each intersection listens on `<base>.<intersection>`
    #[clap(
        long,
        env = "TOPICS_CONFIG_PRIORITY_RESPONSE",
        default_value = "topic.ConfigPriorityResponse"
    )]
    pub response_topic: String,

    /// Local snapshot file of the edge device
    #[clap(
        long,
        env = "SNAPSHOT_PATH",
        value_name = "FILE",
        default_value = DEFAULT_SNAPSHOT_PATH
    )]
    pub snapshot_path: PathBuf,

    /// JSON array of entities loaded into the authoritative store at startup
    #[clap(long, env = "SEED_PATH", value_name = "FILE")]
    pub seed_path: Option<PathBuf>,

    /// NATS server; the in-memory bus is used when unset
    #[cfg(feature = "nats")]
    #[clap(long, env = "NATS_URL")]
    pub nats_url: Option<String>,

    /// Seconds an unread snapshot stays cached
    #[clap(long, default_value = "10")]
    pub cache_sliding_secs: u64,

    /// Seconds a snapshot stays cached regardless of reads
    #[clap(long, default_value = "60")]
    pub cache_absolute_secs: u64,
}

impl Settings {
    pub fn snapshot_cache_config(&self) -> SnapshotCacheConfig {
        SnapshotCacheConfig {
            sliding_expiration: Duration::from_secs(self.cache_sliding_secs),
            absolute_expiration: Duration::from_secs(self.cache_absolute_secs),
            ..Default::default()
        }
    }

    /// Intersection id, required by every mode that runs an edge
    pub fn edge_intersection(&self) -> crate::Result<Uuid> {
        self.intersection.ok_or_else(|| {
            crate::SyncError::Configuration(format!(
                "--intersection is required in {:?} mode",
                self.mode
            ))
        })
    }
}
