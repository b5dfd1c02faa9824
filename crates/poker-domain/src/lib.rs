//! # Poker Domain
//!
//! Core domain model for distributed planning-poker estimation sessions.
//!
//! A [`ScrumTeam`] owns its participants, the running estimation round and
//! a team-wide message sequence. Every mutation fans an immutable
//! [`Message`] out to the current participants' mailboxes and returns the
//! same event to the caller, which is how the registry and replication
//! layers observe the team without the team knowing about either.

pub mod clock;
pub mod error;
pub mod estimate;
pub mod message;
pub mod participant;
pub mod result;
pub mod snapshot;
pub mod team;

pub use clock::{Clock, ManualClock, SystemClock};
pub use error::{Result, TeamError};
pub use estimate::{Estimate, DECK};
pub use message::{Message, MessageBody, MessageId, MessageType};
pub use participant::{Participant, ParticipantRole};
pub use result::{EstimateParticipantStatus, EstimateResult};
pub use snapshot::{ParticipantSnapshot, TeamSnapshot};
pub use team::{ScrumTeam, TeamState, MAX_NAME_LENGTH};

pub(crate) use participant::names_match;

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_public_api() {
        let mut team = ScrumTeam::new("demo", Arc::new(SystemClock)).unwrap();
        team.set_scrum_master("alice").unwrap();
        assert_eq!(team.state(), TeamState::Initial);
        assert_eq!(team.available_estimates().len(), DECK.len());
    }
}
