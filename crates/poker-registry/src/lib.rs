//! # Poker Registry
//!
//! In-memory registry of planning-poker teams for one server process.
//!
//! The registry owns a per-team [`ScrumTeamLock`], gates create/get behind
//! the [`InitializationList`] bootstrap barrier until the node knows which
//! team names already exist cluster-wide, serves long-poll mailbox reads,
//! and publishes every locally originated domain event on a broadcast
//! stream for the replication layer to forward.
//!
//! Mutations replayed from peers enter through a separate surface
//! ([`TeamRegistry::apply_remote`] and the bootstrap registrations) that
//! never reaches that stream, which is what keeps events from echoing
//! around the cluster.

pub mod barrier;
pub mod error;
pub mod lock;
pub mod registry;
pub mod repository;

pub use barrier::InitializationList;
pub use error::{RegistryError, Result};
pub use lock::ScrumTeamLock;
pub use registry::{RegistryConfig, RegistryEvent, RemoteTeamEvent, TeamRegistry};
pub use repository::{
    MemoryTeamRepository, NullTeamRepository, RepositoryError, RepositoryResult, TeamRepository,
};
