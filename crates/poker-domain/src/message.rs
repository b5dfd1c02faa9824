//! Team-sequenced messages delivered to participant mailboxes.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::{Estimate, EstimateResult};

/// Position in a team's message sequence.
///
/// One sequence per team, shared across all recipients: an event enqueued
/// into N mailboxes carries the same id in all N.
pub type MessageId = i64;

/// Message type discriminator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageType {
    /// Wake-up with no content.
    Empty,
    /// A member or observer joined the team.
    MemberJoined,
    /// A member or observer left the team.
    MemberDisconnected,
    /// A new estimation round started.
    EstimateStarted,
    /// All votes are in.
    EstimateEnded,
    /// The running round was canceled.
    EstimateCanceled,
    /// A member cast a vote.
    MemberEstimated,
    /// A member showed activity.
    MemberActivity,
}

impl std::fmt::Display for MessageType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MessageType::Empty => write!(f, "empty"),
            MessageType::MemberJoined => write!(f, "member.joined"),
            MessageType::MemberDisconnected => write!(f, "member.disconnected"),
            MessageType::EstimateStarted => write!(f, "estimate.started"),
            MessageType::EstimateEnded => write!(f, "estimate.ended"),
            MessageType::EstimateCanceled => write!(f, "estimate.canceled"),
            MessageType::MemberEstimated => write!(f, "member.estimated"),
            MessageType::MemberActivity => write!(f, "member.activity"),
        }
    }
}

/// Payload of a team message.
#[derive(Debug, Clone, PartialEq)]
pub enum MessageBody {
    /// Wake-up with no content, used to unblock a reader of a mailbox that
    /// is going away.
    Empty,
    /// A participant joined the team.
    MemberJoined {
        /// Name of the new participant.
        name: String,
        /// True when the participant joined as a non-voting observer.
        observer: bool,
    },
    /// A participant left the team.
    MemberDisconnected {
        /// Name of the departed participant.
        name: String,
        /// True when the departed participant was a non-voting observer.
        observer: bool,
    },
    /// A new estimation round started.
    EstimateStarted,
    /// All votes are in; carries the finalized round result.
    EstimateEnded(Arc<EstimateResult>),
    /// The running round was canceled.
    EstimateCanceled,
    /// A member cast a vote.
    MemberEstimated {
        /// Name of the voting member.
        name: String,
        /// The card the member picked.
        estimate: Estimate,
    },
    /// A member showed activity (long-poll heartbeat). Never enqueued into
    /// mailboxes; it exists for liveness tracking and replication.
    MemberActivity {
        /// Name of the active participant.
        name: String,
    },
}

impl MessageBody {
    /// Returns the type discriminator for this payload.
    pub fn message_type(&self) -> MessageType {
        match self {
            MessageBody::Empty => MessageType::Empty,
            MessageBody::MemberJoined { .. } => MessageType::MemberJoined,
            MessageBody::MemberDisconnected { .. } => MessageType::MemberDisconnected,
            MessageBody::EstimateStarted => MessageType::EstimateStarted,
            MessageBody::EstimateEnded(_) => MessageType::EstimateEnded,
            MessageBody::EstimateCanceled => MessageType::EstimateCanceled,
            MessageBody::MemberEstimated { .. } => MessageType::MemberEstimated,
            MessageBody::MemberActivity { .. } => MessageType::MemberActivity,
        }
    }
}

/// One event in a team's totally ordered message sequence.
///
/// Immutable value; fan-out clones it into every eligible mailbox, so
/// consumers read independently and at their own pace.
#[derive(Debug, Clone, PartialEq)]
pub struct Message {
    /// Position in the team-wide sequence.
    pub id: MessageId,
    /// Event payload.
    pub body: MessageBody,
}

impl Message {
    /// Creates a new message.
    pub fn new(id: MessageId, body: MessageBody) -> Self {
        Self { id, body }
    }

    /// Returns the type discriminator of the payload.
    pub fn message_type(&self) -> MessageType {
        self.body.message_type()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_type_display() {
        assert_eq!(MessageType::MemberJoined.to_string(), "member.joined");
        assert_eq!(MessageType::EstimateEnded.to_string(), "estimate.ended");
        assert_eq!(MessageType::Empty.to_string(), "empty");
    }

    #[test]
    fn test_body_discriminator() {
        let body = MessageBody::MemberEstimated {
            name: "alice".to_string(),
            estimate: Estimate::new(5.0),
        };
        assert_eq!(body.message_type(), MessageType::MemberEstimated);

        let msg = Message::new(7, MessageBody::EstimateStarted);
        assert_eq!(msg.id, 7);
        assert_eq!(msg.message_type(), MessageType::EstimateStarted);
    }
}
