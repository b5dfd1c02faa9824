//! Plain-data copies of whole teams.

use crate::{Estimate, EstimateParticipantStatus, Message, MessageId, ParticipantRole, TeamState};

/// Serializable copy of one participant, including the mailbox backlog.
#[derive(Debug, Clone, PartialEq)]
pub struct ParticipantSnapshot {
    /// Participant name.
    pub name: String,
    /// Participant role.
    pub role: ParticipantRole,
    /// Unix timestamp of the last observed activity.
    pub last_activity: u64,
    /// The vote cast this round, if any.
    pub estimate: Option<Estimate>,
    /// Pending messages, oldest first.
    pub mailbox: Vec<Message>,
}

/// Full copy of one team's state.
///
/// Used both by the persistence contract and as the payload that seeds a
/// peer node from scratch; conversion to and from a live team is lossless,
/// so a freshly seeded peer resumes long-polls mid-stream.
#[derive(Debug, Clone, PartialEq)]
pub struct TeamSnapshot {
    /// Team name.
    pub name: String,
    /// Round lifecycle state.
    pub state: TeamState,
    /// Last assigned id of the team-wide message sequence.
    pub last_message_id: MessageId,
    /// Every participant, scrum master first.
    pub participants: Vec<ParticipantSnapshot>,
    /// The round result, as `(name, estimate)` pairs in round-start order.
    pub estimate_result: Option<Vec<(String, Option<Estimate>)>>,
    /// Round progress entries, if a round started.
    pub estimate_participants: Option<Vec<EstimateParticipantStatus>>,
}
