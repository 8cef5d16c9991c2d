//! Error types for the snapshot store.

use thiserror::Error;

/// Main error type for store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Deserialization error: {0}")]
    Deserialization(String),

    #[error("Corruption detected: {0}")]
    Corruption(String),

    #[error("Invalid cache format: {0}")]
    InvalidFormat(String),

    #[error("Checksum mismatch: expected {expected}, got {got}")]
    ChecksumMismatch { expected: u32, got: u32 },

    #[error("Cache directory is locked by another process")]
    Locked,

    #[error("Cache directory not initialized")]
    NotInitialized,

    #[error("Remote sync error: {0}")]
    RemoteSync(String),

    #[error("Authentication error: {0}")]
    Auth(String),

    #[error("Invalid value: {0}")]
    InvalidValue(String),

    #[error("Store engine has stopped")]
    EngineStopped,
}

impl StoreError {
    /// Errors raised while reading a cached snapshot. These never escape the
    /// façade: the engine falls back to an empty snapshot instead.
    pub fn is_local_decode(&self) -> bool {
        matches!(
            self,
            StoreError::Deserialization(_)
                | StoreError::Corruption(_)
                | StoreError::InvalidFormat(_)
                | StoreError::ChecksumMismatch { .. }
        )
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(e: serde_json::Error) -> Self {
        if e.is_data() || e.is_syntax() || e.is_eof() {
            StoreError::Deserialization(e.to_string())
        } else {
            StoreError::Serialization(e.to_string())
        }
    }
}

impl<T> From<crossbeam_channel::SendError<T>> for StoreError {
    fn from(_: crossbeam_channel::SendError<T>) -> Self {
        StoreError::EngineStopped
    }
}

impl From<crossbeam_channel::RecvError> for StoreError {
    fn from(_: crossbeam_channel::RecvError) -> Self {
        StoreError::EngineStopped
    }
}

/// Result type for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;
