//! Sync layer error types.

use thiserror::Error;

/// Errors surfaced by the store and bridge.
#[derive(Debug, Error)]
pub enum SyncError {
    /// The persistent store rejected an operation.
    #[error("store error: {0}")]
    Store(String),

    /// A value could not be serialized or deserialized.
    #[error("serialization error: {0}")]
    Serialize(#[from] serde_json::Error),
}
