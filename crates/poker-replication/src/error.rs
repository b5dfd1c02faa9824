//! Error types for the replication layer.

use thiserror::Error;

use poker_registry::RegistryError;

/// Errors that can occur during replication.
#[derive(Debug, Error)]
pub enum ReplicationError {
    /// A wire message could not be decoded.
    #[error("invalid message: {0}")]
    InvalidMessage(String),

    /// A wire message carried an unknown protocol version.
    #[error("unsupported protocol version: {0}")]
    UnsupportedVersion(u8),

    /// The message bus rejected an operation.
    #[error("bus error: {0}")]
    Bus(String),

    /// The node is not running.
    #[error("node not running")]
    NotRunning,

    /// Applying a replicated operation on the local registry failed.
    #[error("registry error: {0}")]
    Registry(#[from] RegistryError),
}

/// A specialized Result type for replication operations.
pub type Result<T> = std::result::Result<T, ReplicationError>;
