//! Team participants and their mailboxes.

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};

use crate::{Estimate, Message, MessageId};

/// Compares two participant or team names.
///
/// Names are unique case-insensitively; original casing is preserved for
/// display.
pub(crate) fn names_match(a: &str, b: &str) -> bool {
    a.eq_ignore_ascii_case(b)
}

/// Role of a participant within a team.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParticipantRole {
    /// Watches the session without voting.
    Observer,
    /// Votes in estimation rounds.
    Member,
    /// Votes and controls the round lifecycle. Exactly one per team.
    ScrumMaster,
}

impl ParticipantRole {
    /// Returns true if this role casts votes.
    pub fn votes(&self) -> bool {
        !matches!(self, ParticipantRole::Observer)
    }
}

impl std::fmt::Display for ParticipantRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ParticipantRole::Observer => write!(f, "observer"),
            ParticipantRole::Member => write!(f, "member"),
            ParticipantRole::ScrumMaster => write!(f, "scrum master"),
        }
    }
}

/// A connected participant with its pending-message mailbox.
///
/// Every participant owns an unbounded FIFO of team messages and reads it
/// at its own pace; different participants may sit at different offsets of
/// the same event stream.
#[derive(Debug, Clone)]
pub struct Participant {
    name: String,
    role: ParticipantRole,
    last_activity: u64,
    estimate: Option<Estimate>,
    mailbox: VecDeque<Message>,
}

impl Participant {
    pub(crate) fn new(name: impl Into<String>, role: ParticipantRole, now: u64) -> Self {
        Self {
            name: name.into(),
            role,
            last_activity: now,
            estimate: None,
            mailbox: VecDeque::new(),
        }
    }

    pub(crate) fn from_parts(
        name: String,
        role: ParticipantRole,
        last_activity: u64,
        estimate: Option<Estimate>,
        mailbox: Vec<Message>,
    ) -> Self {
        Self {
            name,
            role,
            last_activity,
            estimate,
            mailbox: mailbox.into(),
        }
    }

    /// The participant's unique (case-insensitive) name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The participant's role.
    pub fn role(&self) -> ParticipantRole {
        self.role
    }

    /// Unix timestamp of the last observed activity.
    pub fn last_activity(&self) -> u64 {
        self.last_activity
    }

    /// The vote cast this round, if any. Always `None` for observers.
    pub fn estimate(&self) -> Option<Estimate> {
        self.estimate
    }

    pub(crate) fn set_estimate(&mut self, estimate: Estimate) {
        self.estimate = Some(estimate);
    }

    pub(crate) fn clear_estimate(&mut self) {
        self.estimate = None;
    }

    pub(crate) fn touch(&mut self, now: u64) {
        self.last_activity = now;
    }

    pub(crate) fn enqueue(&mut self, message: Message) {
        self.mailbox.push_back(message);
    }

    /// Dequeues the oldest pending message.
    pub fn pop_message(&mut self) -> Option<Message> {
        self.mailbox.pop_front()
    }

    /// Returns true while the mailbox holds pending messages.
    pub fn has_messages(&self) -> bool {
        !self.mailbox.is_empty()
    }

    /// Non-destructive snapshot of the pending messages, oldest first.
    pub fn messages(&self) -> Vec<Message> {
        self.mailbox.iter().cloned().collect()
    }

    /// Drains the mailbox and returns how many messages were dropped.
    pub fn clear_messages(&mut self) -> usize {
        let drained = self.mailbox.len();
        self.mailbox.clear();
        drained
    }

    /// Drops every pending message with an id up to and including
    /// `last_id`, returning how many were acknowledged.
    pub fn acknowledge(&mut self, last_id: MessageId) -> usize {
        let before = self.mailbox.len();
        self.mailbox.retain(|m| m.id > last_id);
        before - self.mailbox.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::MessageBody;

    fn participant() -> Participant {
        Participant::new("alice", ParticipantRole::Member, 0)
    }

    fn message(id: MessageId) -> Message {
        Message::new(id, MessageBody::EstimateStarted)
    }

    #[test]
    fn test_mailbox_is_fifo() {
        let mut p = participant();
        assert!(!p.has_messages());

        p.enqueue(message(1));
        p.enqueue(message(2));
        p.enqueue(message(3));

        assert!(p.has_messages());
        assert_eq!(p.pop_message().unwrap().id, 1);
        assert_eq!(p.pop_message().unwrap().id, 2);
        assert_eq!(p.pop_message().unwrap().id, 3);
        assert!(p.pop_message().is_none());
    }

    #[test]
    fn test_messages_snapshot_is_non_destructive() {
        let mut p = participant();
        p.enqueue(message(1));
        p.enqueue(message(2));

        let snapshot = p.messages();
        assert_eq!(snapshot.len(), 2);
        assert_eq!(snapshot[0].id, 1);
        // snapshot did not consume anything
        assert_eq!(p.messages().len(), 2);
    }

    #[test]
    fn test_clear_messages_reports_count() {
        let mut p = participant();
        p.enqueue(message(1));
        p.enqueue(message(2));

        assert_eq!(p.clear_messages(), 2);
        assert!(!p.has_messages());
        assert_eq!(p.clear_messages(), 0);
    }

    #[test]
    fn test_acknowledge_drops_up_to_id() {
        let mut p = participant();
        for id in 1..=5 {
            p.enqueue(message(id));
        }

        assert_eq!(p.acknowledge(3), 3);
        assert_eq!(p.pop_message().unwrap().id, 4);

        // acknowledging an id we never saw drops nothing further
        assert_eq!(p.acknowledge(3), 0);
    }

    #[test]
    fn test_roles() {
        assert!(ParticipantRole::Member.votes());
        assert!(ParticipantRole::ScrumMaster.votes());
        assert!(!ParticipantRole::Observer.votes());
        assert_eq!(ParticipantRole::ScrumMaster.to_string(), "scrum master");
    }
}
