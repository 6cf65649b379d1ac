use system_modeler_lib::ModelerError;

/// Error types for the sync services
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    /// Publish or subscribe failed on the message bus
    #[error("Sync transport failure: {0}")]
    Transport(String),

    /// The owning task was asked to stop; normal shutdown, not a failure
    #[error("Cancelled")]
    Cancelled,

    #[error("Invalid message payload: {0}")]
    Payload(#[from] serde_json::Error),

    #[error("Invalid configuration: {0}")]
    Configuration(String),

    #[error(transparent)]
    Model(#[from] ModelerError),
}

pub type Result<T> = std::result::Result<T, SyncError>;
