//! # Poker Replication
//!
//! Multi-node replication for planning-poker teams over a pub/sub bus.
//!
//! Each server process runs one [`ReplicationNode`] with a unique
//! [`NodeId`]. A starting node broadcasts `RequestTeamList`, seeds its
//! registry from the snapshots a live peer returns, and only then serves
//! create/get: the bootstrap barrier in the registry holds callers back
//! until the pending names resolve. From then on every locally originated
//! domain event is forwarded as a lightweight [`NodeMessage`] and replayed
//! by the peers on their own replicas, converging all nodes' in-memory
//! state.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod bus;
pub mod codec;
pub mod error;
pub mod message;
pub mod node;

pub use bus::{BusReceiver, InMemoryBus, MessageBus};
pub use codec::{decode_team, encode_team, SNAPSHOT_VERSION};
pub use error::{ReplicationError, Result};
pub use message::{NodeId, NodeMessage, NodeMessageType, NodePayload, PROTOCOL_VERSION};
pub use node::{NodeConfig, ReplicationNode};
