//! Error types for registry operations.

use thiserror::Error;

use crate::repository::RepositoryError;
use poker_domain::TeamError;

/// Errors that can occur while operating on the team registry.
#[derive(Debug, Error)]
pub enum RegistryError {
    /// A team with this name already exists, locally or on a peer.
    #[error("team already exists: {name}")]
    TeamAlreadyExists { name: String },

    /// No team with this name.
    #[error("team not found: {name}")]
    TeamNotFound { name: String },

    /// The operation is reserved for the team's scrum master.
    #[error("only the scrum master can {action}")]
    NotScrumMaster { action: &'static str },

    /// Waiting for the per-team lock exceeded the configured bound.
    #[error("timed out waiting for team lock: {team}")]
    LockTimeout { team: String },

    /// Waiting for the bootstrap barrier exceeded the configured bound.
    #[error("timed out waiting for team list initialization")]
    InitializationTimeout,

    /// Team operation failed.
    #[error("team operation failed: {0}")]
    Team(#[from] TeamError),

    /// Snapshot store failure.
    #[error("repository error: {0}")]
    Repository(#[from] RepositoryError),
}

/// A specialized Result type for registry operations.
pub type Result<T> = std::result::Result<T, RegistryError>;
