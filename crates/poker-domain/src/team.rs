//! The scrum team aggregate and its round state machine.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::{
    names_match, Clock, Estimate, EstimateParticipantStatus, EstimateResult, Message, MessageBody,
    MessageId, Participant, ParticipantRole, ParticipantSnapshot, Result, TeamError, TeamSnapshot,
    DECK,
};

/// Maximum length of team and participant names.
pub const MAX_NAME_LENGTH: usize = 50;

/// Lifecycle state of a team's estimation round.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TeamState {
    /// No round has been started yet.
    Initial,
    /// A round is collecting votes.
    EstimateInProgress,
    /// Every round voter submitted; the result is final.
    EstimateFinished,
    /// The scrum master canceled the round.
    EstimateCanceled,
}

impl std::fmt::Display for TeamState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TeamState::Initial => write!(f, "initial"),
            TeamState::EstimateInProgress => write!(f, "estimate in progress"),
            TeamState::EstimateFinished => write!(f, "estimate finished"),
            TeamState::EstimateCanceled => write!(f, "estimate canceled"),
        }
    }
}

fn validate_name(name: &str) -> Result<()> {
    if name.trim().is_empty() {
        return Err(TeamError::Validation("name is empty".to_string()));
    }
    if name.len() > MAX_NAME_LENGTH {
        return Err(TeamError::Validation(format!(
            "name exceeds {} characters: {}",
            MAX_NAME_LENGTH, name
        )));
    }
    Ok(())
}

/// The aggregate root of one planning-poker team.
///
/// Owns the participants, the running round and the team-wide message
/// sequence. Every mutation stamps the next sequence id onto the event it
/// produces, fans the event out to the current mailboxes, and returns it so
/// the caller can forward it to the replication layer. The team itself
/// never talks to the bus.
pub struct ScrumTeam {
    name: String,
    scrum_master: Option<Participant>,
    members: Vec<Participant>,
    observers: Vec<Participant>,
    state: TeamState,
    estimate_result: Option<EstimateResult>,
    estimate_participants: Option<Vec<EstimateParticipantStatus>>,
    last_message_id: MessageId,
    clock: Arc<dyn Clock>,
}

impl ScrumTeam {
    /// Creates an empty team.
    ///
    /// # Errors
    ///
    /// Fails when the name is empty or too long.
    pub fn new(name: impl Into<String>, clock: Arc<dyn Clock>) -> Result<Self> {
        let name = name.into();
        validate_name(&name)?;
        Ok(Self {
            name,
            scrum_master: None,
            members: Vec::new(),
            observers: Vec::new(),
            state: TeamState::Initial,
            estimate_result: None,
            estimate_participants: None,
            last_message_id: 0,
            clock,
        })
    }

    /// The team's unique, immutable name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Current round lifecycle state.
    pub fn state(&self) -> TeamState {
        self.state
    }

    /// The scrum master, once set.
    pub fn scrum_master(&self) -> Option<&Participant> {
        self.scrum_master.as_ref()
    }

    /// Voting members other than the scrum master.
    pub fn members(&self) -> &[Participant] {
        &self.members
    }

    /// Non-voting observers.
    pub fn observers(&self) -> &[Participant] {
        &self.observers
    }

    /// The current (or last) round result.
    pub fn estimate_result(&self) -> Option<&EstimateResult> {
        self.estimate_result.as_ref()
    }

    /// Round progress entries, if a round started.
    pub fn estimate_participants(&self) -> Option<&[EstimateParticipantStatus]> {
        self.estimate_participants.as_deref()
    }

    /// Last assigned message sequence id.
    pub fn last_message_id(&self) -> MessageId {
        self.last_message_id
    }

    /// The fixed deck this team estimates with.
    pub fn available_estimates(&self) -> &'static [Estimate] {
        &DECK
    }

    /// Returns true when nobody is connected.
    pub fn is_empty(&self) -> bool {
        self.scrum_master.is_none() && self.members.is_empty() && self.observers.is_empty()
    }

    /// Looks a participant up across all three namespaces,
    /// case-insensitively.
    pub fn find_member_or_observer(&self, name: &str) -> Option<&Participant> {
        self.all_participants().find(|p| names_match(p.name(), name))
    }

    /// Sets the scrum master. Allowed at most once.
    pub fn set_scrum_master(&mut self, name: &str) -> Result<()> {
        validate_name(name)?;
        if let Some(master) = &self.scrum_master {
            return Err(TeamError::ScrumMasterAlreadySet {
                name: master.name().to_string(),
            });
        }
        if self.find_member_or_observer(name).is_some() {
            return Err(TeamError::NameCollision {
                name: name.to_string(),
            });
        }
        let now = self.clock.now();
        self.scrum_master = Some(Participant::new(name, ParticipantRole::ScrumMaster, now));
        Ok(())
    }

    /// Adds a member or observer.
    ///
    /// The join event goes to every *already-joined* participant; the new
    /// participant starts with an empty mailbox. A member joining mid-round
    /// stays out of the running round.
    pub fn join(&mut self, name: &str, as_observer: bool) -> Result<Message> {
        validate_name(name)?;
        if self.find_member_or_observer(name).is_some() {
            return Err(TeamError::NameCollision {
                name: name.to_string(),
            });
        }
        let message = self.next_message(MessageBody::MemberJoined {
            name: name.to_string(),
            observer: as_observer,
        });
        self.broadcast(&message);

        let now = self.clock.now();
        let role = if as_observer {
            ParticipantRole::Observer
        } else {
            ParticipantRole::Member
        };
        let participant = Participant::new(name, role, now);
        if as_observer {
            self.observers.push(participant);
        } else {
            self.members.push(participant);
        }
        Ok(message)
    }

    /// Removes a participant. Silently does nothing when the name is
    /// unknown.
    ///
    /// Emits `MemberDisconnected` to the remaining participants. When the
    /// departing member was the last outstanding voter of a running round,
    /// the round finalizes and the `EstimateEnded` event follows in the
    /// returned list.
    pub fn disconnect(&mut self, name: &str) -> Vec<Message> {
        let Some(mut removed) = self.take_participant(name) else {
            return Vec::new();
        };

        let mut events = Vec::new();
        let message = self.next_message(MessageBody::MemberDisconnected {
            name: removed.name().to_string(),
            observer: !removed.role().votes(),
        });
        self.broadcast(&message);
        events.push(message);

        // Trailing wake-up for a reader still blocked on the departing
        // mailbox; it also keeps the id sequence advancing identically on
        // every replica.
        let empty = self.next_message(MessageBody::Empty);
        removed.enqueue(empty);

        if removed.role().votes() {
            if let Some(message) = self.try_finish_estimate() {
                events.push(message);
            }
        }
        events
    }

    /// Disconnects every participant idle for longer than `max_idle_secs`,
    /// with full per-participant disconnect side effects.
    pub fn disconnect_inactive(&mut self, max_idle_secs: u64) -> Vec<Message> {
        let threshold = self.clock.now().saturating_sub(max_idle_secs);
        let stale: Vec<String> = self
            .all_participants()
            .filter(|p| p.last_activity() < threshold)
            .map(|p| p.name().to_string())
            .collect();

        let mut events = Vec::new();
        for name in stale {
            events.extend(self.disconnect(&name));
        }
        events
    }

    /// Starts a new estimation round.
    ///
    /// Allowed from `Initial`, `EstimateFinished` and `EstimateCanceled`;
    /// clears every voter's previous estimate and the previous result.
    pub fn start_estimate(&mut self) -> Result<Message> {
        if self.state == TeamState::EstimateInProgress {
            return Err(TeamError::InvalidStateTransition {
                action: "start estimate".to_string(),
                current_state: self.state.to_string(),
            });
        }

        for voter in self.voters_mut() {
            voter.clear_estimate();
        }
        let names: Vec<String> = self.voters().map(|p| p.name().to_string()).collect();
        self.estimate_participants = Some(
            names
                .iter()
                .cloned()
                .map(EstimateParticipantStatus::new)
                .collect(),
        );
        self.estimate_result = Some(EstimateResult::new(names)?);
        self.state = TeamState::EstimateInProgress;

        let message = self.next_message(MessageBody::EstimateStarted);
        self.broadcast(&message);
        Ok(message)
    }

    /// Cancels the running round. A no-op returning `None` when no round is
    /// in progress.
    pub fn cancel_estimate(&mut self) -> Option<Message> {
        if self.state != TeamState::EstimateInProgress {
            return None;
        }
        self.state = TeamState::EstimateCanceled;
        let message = self.next_message(MessageBody::EstimateCanceled);
        self.broadcast(&message);
        Some(message)
    }

    /// Records a member's vote.
    ///
    /// Re-submitting the same card is a no-op; changing a cast vote is a
    /// conflict. When the vote completes the round, the `EstimateEnded`
    /// event follows the `MemberEstimated` event in the returned list.
    pub fn set_estimate(&mut self, name: &str, estimate: Estimate) -> Result<Vec<Message>> {
        if !estimate.is_in_deck() {
            return Err(TeamError::EstimateNotAvailable {
                estimate: estimate.to_string(),
            });
        }
        if self.state != TeamState::EstimateInProgress {
            return Err(TeamError::InvalidStateTransition {
                action: "estimate".to_string(),
                current_state: self.state.to_string(),
            });
        }

        let (canonical, previous) = match self.voters().find(|p| names_match(p.name(), name)) {
            Some(voter) => (voter.name().to_string(), voter.estimate()),
            None => {
                if self.observers.iter().any(|p| names_match(p.name(), name)) {
                    return Err(TeamError::ObserverCannotEstimate {
                        name: name.to_string(),
                    });
                }
                return Err(TeamError::MemberNotFound {
                    name: name.to_string(),
                });
            }
        };
        if let Some(previous) = previous {
            if previous == estimate {
                return Ok(Vec::new());
            }
            return Err(TeamError::AlreadyEstimated { name: canonical });
        }

        if let Some(voter) = self.voters_mut().find(|p| names_match(p.name(), name)) {
            voter.set_estimate(estimate);
        }

        // A member who joined mid-round votes outside the running round:
        // the vote is recorded and announced but never enters the result.
        let in_round = self
            .estimate_result
            .as_ref()
            .is_some_and(|r| r.contains(&canonical));
        if in_round {
            if let Some(result) = self.estimate_result.as_mut() {
                result.set(&canonical, estimate)?;
            }
            if let Some(statuses) = self.estimate_participants.as_mut() {
                if let Some(status) = statuses
                    .iter_mut()
                    .find(|s| names_match(&s.member_name, &canonical))
                {
                    status.estimated = true;
                }
            }
        }

        let mut events = Vec::new();
        let message = self.next_message(MessageBody::MemberEstimated {
            name: canonical,
            estimate,
        });
        self.broadcast(&message);
        events.push(message);

        if in_round {
            if let Some(message) = self.try_finish_estimate() {
                events.push(message);
            }
        }
        Ok(events)
    }

    /// Refreshes a participant's last-activity timestamp.
    ///
    /// Produces a `MemberActivity` beacon that consumes a sequence id and
    /// reaches the replication layer, but is never enqueued into mailboxes.
    pub fn update_activity(&mut self, name: &str) -> Result<Message> {
        let now = self.clock.now();
        let canonical = {
            let participant = self
                .all_participants_mut()
                .find(|p| names_match(p.name(), name))
                .ok_or_else(|| TeamError::MemberNotFound {
                    name: name.to_string(),
                })?;
            participant.touch(now);
            participant.name().to_string()
        };
        Ok(self.next_message(MessageBody::MemberActivity { name: canonical }))
    }

    /// Non-destructive snapshot of a participant's pending messages.
    pub fn pending_messages(&self, name: &str) -> Result<Vec<Message>> {
        self.find_member_or_observer(name)
            .map(Participant::messages)
            .ok_or_else(|| TeamError::MemberNotFound {
                name: name.to_string(),
            })
    }

    /// Dequeues a participant's oldest pending message.
    pub fn pop_message(&mut self, name: &str) -> Result<Option<Message>> {
        self.all_participants_mut()
            .find(|p| names_match(p.name(), name))
            .map(Participant::pop_message)
            .ok_or_else(|| TeamError::MemberNotFound {
                name: name.to_string(),
            })
    }

    /// Drops a participant's pending messages up to and including
    /// `last_id`, returning how many were acknowledged.
    pub fn acknowledge_messages(&mut self, name: &str, last_id: MessageId) -> Result<usize> {
        self.all_participants_mut()
            .find(|p| names_match(p.name(), name))
            .map(|p| p.acknowledge(last_id))
            .ok_or_else(|| TeamError::MemberNotFound {
                name: name.to_string(),
            })
    }

    /// Captures the whole team as plain data.
    pub fn snapshot(&self) -> TeamSnapshot {
        TeamSnapshot {
            name: self.name.clone(),
            state: self.state,
            last_message_id: self.last_message_id,
            participants: self
                .all_participants()
                .map(|p| ParticipantSnapshot {
                    name: p.name().to_string(),
                    role: p.role(),
                    last_activity: p.last_activity(),
                    estimate: p.estimate(),
                    mailbox: p.messages(),
                })
                .collect(),
            estimate_result: self
                .estimate_result
                .as_ref()
                .map(|r| r.iter().map(|(n, e)| (n.to_string(), e)).collect()),
            estimate_participants: self.estimate_participants.clone(),
        }
    }

    /// Revives a team from snapshot data.
    ///
    /// # Errors
    ///
    /// Fails on invalid names, duplicate participants or a second scrum
    /// master.
    pub fn from_snapshot(snapshot: TeamSnapshot, clock: Arc<dyn Clock>) -> Result<Self> {
        validate_name(&snapshot.name)?;
        let mut team = Self {
            name: snapshot.name,
            scrum_master: None,
            members: Vec::new(),
            observers: Vec::new(),
            state: snapshot.state,
            estimate_result: None,
            estimate_participants: snapshot.estimate_participants,
            last_message_id: snapshot.last_message_id,
            clock,
        };
        for p in snapshot.participants {
            validate_name(&p.name)?;
            if team.find_member_or_observer(&p.name).is_some() {
                return Err(TeamError::NameCollision { name: p.name });
            }
            let participant =
                Participant::from_parts(p.name, p.role, p.last_activity, p.estimate, p.mailbox);
            match participant.role() {
                ParticipantRole::ScrumMaster => {
                    if team.scrum_master.is_some() {
                        return Err(TeamError::Validation(
                            "snapshot contains two scrum masters".to_string(),
                        ));
                    }
                    team.scrum_master = Some(participant);
                }
                ParticipantRole::Member => team.members.push(participant),
                ParticipantRole::Observer => team.observers.push(participant),
            }
        }
        if let Some(items) = snapshot.estimate_result {
            let read_only = team.state == TeamState::EstimateFinished;
            team.estimate_result = Some(EstimateResult::from_items(items, read_only)?);
        }
        Ok(team)
    }

    fn next_message(&mut self, body: MessageBody) -> Message {
        self.last_message_id += 1;
        Message::new(self.last_message_id, body)
    }

    /// Enqueues a copy of the message into every current mailbox.
    fn broadcast(&mut self, message: &Message) {
        for participant in self.all_participants_mut() {
            participant.enqueue(message.clone());
        }
    }

    /// Finalizes the round once no connected round voter is outstanding.
    fn try_finish_estimate(&mut self) -> Option<Message> {
        if self.state != TeamState::EstimateInProgress {
            return None;
        }
        let outstanding = {
            let result = self.estimate_result.as_ref()?;
            self.voters()
                .any(|p| result.contains(p.name()) && p.estimate().is_none())
        };
        if outstanding {
            return None;
        }

        let mut result = self.estimate_result.take()?;
        result.finalize();
        self.state = TeamState::EstimateFinished;
        let shared = Arc::new(result.clone());
        self.estimate_result = Some(result);

        let message = self.next_message(MessageBody::EstimateEnded(shared));
        self.broadcast(&message);
        Some(message)
    }

    fn take_participant(&mut self, name: &str) -> Option<Participant> {
        if let Some(master) = &self.scrum_master {
            if names_match(master.name(), name) {
                return self.scrum_master.take();
            }
        }
        if let Some(pos) = self
            .members
            .iter()
            .position(|p| names_match(p.name(), name))
        {
            return Some(self.members.remove(pos));
        }
        if let Some(pos) = self
            .observers
            .iter()
            .position(|p| names_match(p.name(), name))
        {
            return Some(self.observers.remove(pos));
        }
        None
    }

    fn all_participants(&self) -> impl Iterator<Item = &Participant> {
        self.scrum_master
            .iter()
            .chain(self.members.iter())
            .chain(self.observers.iter())
    }

    fn all_participants_mut(&mut self) -> impl Iterator<Item = &mut Participant> {
        self.scrum_master
            .iter_mut()
            .chain(self.members.iter_mut())
            .chain(self.observers.iter_mut())
    }

    fn voters(&self) -> impl Iterator<Item = &Participant> {
        self.scrum_master.iter().chain(self.members.iter())
    }

    fn voters_mut(&mut self) -> impl Iterator<Item = &mut Participant> {
        self.scrum_master.iter_mut().chain(self.members.iter_mut())
    }
}

impl std::fmt::Debug for ScrumTeam {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScrumTeam")
            .field("name", &self.name)
            .field("state", &self.state)
            .field("members", &self.members.len())
            .field("observers", &self.observers.len())
            .field("last_message_id", &self.last_message_id)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{ManualClock, MessageType};

    fn team() -> ScrumTeam {
        let mut team = ScrumTeam::new("web", Arc::new(ManualClock::new(1_000))).unwrap();
        team.set_scrum_master("Mary").unwrap();
        team
    }

    fn drain_types(team: &mut ScrumTeam, name: &str) -> Vec<MessageType> {
        let mut types = Vec::new();
        while let Some(message) = team.pop_message(name).unwrap() {
            types.push(message.message_type());
        }
        types
    }

    #[test]
    fn test_join_member() {
        let mut team = team();
        team.join("mike", false).unwrap();

        assert_eq!(team.members().len(), 1);
        assert!(team.observers().is_empty());
        assert_eq!(team.state(), TeamState::Initial);
        assert_eq!(team.members()[0].name(), "mike");
    }

    #[test]
    fn test_names_disjoint_across_namespaces() {
        let mut team = team();
        team.join("mike", false).unwrap();
        team.join("olga", true).unwrap();

        assert!(matches!(
            team.join("MARY", false),
            Err(TeamError::NameCollision { .. })
        ));
        assert!(matches!(
            team.join("Mike", true),
            Err(TeamError::NameCollision { .. })
        ));
        assert!(matches!(
            team.join("olga", false),
            Err(TeamError::NameCollision { .. })
        ));
        assert!(matches!(
            team.set_scrum_master("john"),
            Err(TeamError::ScrumMasterAlreadySet { .. })
        ));
    }

    #[test]
    fn test_joiner_mailbox_is_empty() {
        let mut team = team();
        team.join("mike", false).unwrap();

        // the master saw the join, the joiner did not
        assert!(team
            .find_member_or_observer("Mary")
            .unwrap()
            .has_messages());
        assert!(!team
            .find_member_or_observer("mike")
            .unwrap()
            .has_messages());
    }

    #[test]
    fn test_message_ids_are_shared_and_increasing() {
        let mut team = team();
        team.join("mike", false).unwrap();
        team.join("olga", true).unwrap();
        team.start_estimate().unwrap();

        let mary: Vec<_> = team.pending_messages("Mary").unwrap();
        let mike: Vec<_> = team.pending_messages("mike").unwrap();
        let started_id = mary.last().unwrap().id;

        // same event, same id, in both mailboxes
        assert_eq!(mike.last().unwrap().id, started_id);
        // ids strictly increase within a mailbox
        let ids: Vec<_> = mary.iter().map(|m| m.id).collect();
        let mut sorted = ids.clone();
        sorted.sort_unstable();
        sorted.dedup();
        assert_eq!(ids, sorted);
    }

    #[test]
    fn test_full_round() {
        let mut team = team();
        team.join("mike", false).unwrap();
        team.start_estimate().unwrap();
        assert_eq!(team.state(), TeamState::EstimateInProgress);

        let events = team.set_estimate("mike", Estimate::new(5.0)).unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(team.state(), TeamState::EstimateInProgress);

        let statuses = team.estimate_participants().unwrap();
        assert!(statuses.iter().any(|s| s.member_name == "mike" && s.estimated));
        assert!(statuses.iter().any(|s| s.member_name == "Mary" && !s.estimated));

        let events = team.set_estimate("Mary", Estimate::new(5.0)).unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].message_type(), MessageType::MemberEstimated);
        assert_eq!(events[1].message_type(), MessageType::EstimateEnded);
        assert_eq!(team.state(), TeamState::EstimateFinished);

        let result = team.estimate_result().unwrap();
        assert!(result.is_read_only());
        assert_eq!(result.get("Mary"), Some(Some(Estimate::new(5.0))));
        assert_eq!(result.get("mike"), Some(Some(Estimate::new(5.0))));

        // every participant saw the estimate end exactly once, after the
        // voter's own estimate event
        for name in ["Mary", "mike"] {
            let types = drain_types(&mut team, name);
            let estimated = types
                .iter()
                .rposition(|t| *t == MessageType::MemberEstimated)
                .unwrap();
            let ended: Vec<_> = types
                .iter()
                .enumerate()
                .filter(|(_, t)| **t == MessageType::EstimateEnded)
                .map(|(i, _)| i)
                .collect();
            assert_eq!(ended.len(), 1);
            assert!(ended[0] > estimated);
        }
    }

    #[test]
    fn test_start_rejected_while_in_progress() {
        let mut team = team();
        team.start_estimate().unwrap();
        assert!(matches!(
            team.start_estimate(),
            Err(TeamError::InvalidStateTransition { .. })
        ));
    }

    #[test]
    fn test_restart_clears_previous_result() {
        let mut team = team();
        team.start_estimate().unwrap();
        team.set_estimate("Mary", Estimate::new(8.0)).unwrap();
        assert_eq!(team.state(), TeamState::EstimateFinished);

        team.start_estimate().unwrap();
        assert_eq!(team.state(), TeamState::EstimateInProgress);
        assert_eq!(team.estimate_result().unwrap().get("Mary"), Some(None));
        assert_eq!(
            team.scrum_master().unwrap().estimate(),
            None,
            "votes reset on restart"
        );
    }

    #[test]
    fn test_cancel() {
        let mut team = team();
        assert!(team.cancel_estimate().is_none());

        team.start_estimate().unwrap();
        let message = team.cancel_estimate().unwrap();
        assert_eq!(message.message_type(), MessageType::EstimateCanceled);
        assert_eq!(team.state(), TeamState::EstimateCanceled);

        // canceled rounds can restart
        team.start_estimate().unwrap();
        assert_eq!(team.state(), TeamState::EstimateInProgress);
    }

    #[test]
    fn test_estimate_must_be_in_deck() {
        let mut team = team();
        team.start_estimate().unwrap();
        assert!(matches!(
            team.set_estimate("Mary", Estimate::new(7.0)),
            Err(TeamError::EstimateNotAvailable { .. })
        ));
        assert!(matches!(
            team.set_estimate("Mary", Estimate::new(f64::NAN)),
            Err(TeamError::EstimateNotAvailable { .. })
        ));
    }

    #[test]
    fn test_estimate_outside_round_rejected() {
        let mut team = team();
        assert!(matches!(
            team.set_estimate("Mary", Estimate::new(5.0)),
            Err(TeamError::InvalidStateTransition { .. })
        ));
    }

    #[test]
    fn test_resubmitting_same_value_is_noop() {
        let mut team = team();
        team.join("mike", false).unwrap();
        team.start_estimate().unwrap();

        team.set_estimate("mike", Estimate::new(3.0)).unwrap();
        let events = team.set_estimate("mike", Estimate::new(3.0)).unwrap();
        assert!(events.is_empty());

        assert!(matches!(
            team.set_estimate("mike", Estimate::new(5.0)),
            Err(TeamError::AlreadyEstimated { .. })
        ));
    }

    #[test]
    fn test_observer_cannot_estimate() {
        let mut team = team();
        team.join("olga", true).unwrap();
        team.start_estimate().unwrap();
        assert!(matches!(
            team.set_estimate("olga", Estimate::new(1.0)),
            Err(TeamError::ObserverCannotEstimate { .. })
        ));
    }

    #[test]
    fn test_mid_round_joiner_excluded() {
        let mut team = team();
        team.start_estimate().unwrap();
        team.join("mike", false).unwrap();

        assert!(!team.estimate_result().unwrap().contains("mike"));

        // the round finishes without mike's vote
        let events = team.set_estimate("Mary", Estimate::new(2.0)).unwrap();
        assert_eq!(team.state(), TeamState::EstimateFinished);
        assert_eq!(events.last().unwrap().message_type(), MessageType::EstimateEnded);
        let result = team.estimate_result().unwrap();
        assert_eq!(result.len(), 1);
        assert!(!result.contains("mike"));
    }

    #[test]
    fn test_disconnect_unknown_is_silent() {
        let mut team = team();
        assert!(team.disconnect("ghost").is_empty());
    }

    #[test]
    fn test_disconnect_notifies_remaining() {
        let mut team = team();
        team.join("mike", false).unwrap();
        team.join("olga", true).unwrap();

        let events = team.disconnect("mike");
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].message_type(), MessageType::MemberDisconnected);
        assert!(team.find_member_or_observer("mike").is_none());

        let types = drain_types(&mut team, "olga");
        assert!(types.contains(&MessageType::MemberDisconnected));
    }

    #[test]
    fn test_last_voter_disconnect_finishes_round() {
        let mut team = team();
        team.join("mike", false).unwrap();
        team.start_estimate().unwrap();
        team.set_estimate("Mary", Estimate::new(13.0)).unwrap();

        let events = team.disconnect("mike");
        assert_eq!(events.len(), 2);
        assert_eq!(events[1].message_type(), MessageType::EstimateEnded);
        assert_eq!(team.state(), TeamState::EstimateFinished);

        // the departed member stays in the result, with no estimate
        let result = team.estimate_result().unwrap();
        assert_eq!(result.get("mike"), Some(None));
        assert_eq!(result.get("Mary"), Some(Some(Estimate::new(13.0))));
    }

    #[test]
    fn test_disconnect_inactive() {
        let clock = Arc::new(ManualClock::new(1_000));
        let mut team = ScrumTeam::new("web", clock.clone()).unwrap();
        team.set_scrum_master("Mary").unwrap();
        team.join("mike", false).unwrap();

        clock.advance(600);
        team.update_activity("Mary").unwrap();

        let events = team.disconnect_inactive(300);
        assert_eq!(events.len(), 1);
        assert!(team.find_member_or_observer("mike").is_none());
        assert!(team.find_member_or_observer("Mary").is_some());
    }

    #[test]
    fn test_activity_beacon_skips_mailboxes() {
        let mut team = team();
        team.join("mike", false).unwrap();
        let before = team.pending_messages("Mary").unwrap().len();

        let message = team.update_activity("mike").unwrap();
        assert_eq!(message.message_type(), MessageType::MemberActivity);
        assert_eq!(team.pending_messages("Mary").unwrap().len(), before);
        assert_eq!(team.last_message_id(), message.id);
    }

    #[test]
    fn test_snapshot_round_trip() {
        let clock = Arc::new(ManualClock::new(1_000));
        let mut team = ScrumTeam::new("web", clock.clone()).unwrap();
        team.set_scrum_master("Mary").unwrap();
        team.join("mike", false).unwrap();
        team.join("olga", true).unwrap();
        team.start_estimate().unwrap();
        team.set_estimate("mike", Estimate::POSITIVE_INFINITY).unwrap();

        let snapshot = team.snapshot();
        let restored = ScrumTeam::from_snapshot(snapshot.clone(), clock).unwrap();

        assert_eq!(restored.name(), team.name());
        assert_eq!(restored.state(), TeamState::EstimateInProgress);
        assert_eq!(restored.last_message_id(), team.last_message_id());
        assert_eq!(
            restored.estimate_result().unwrap().get("mike"),
            Some(Some(Estimate::POSITIVE_INFINITY))
        );
        assert_eq!(
            restored.pending_messages("olga").unwrap(),
            team.pending_messages("olga").unwrap()
        );

        // the restored replica keeps numbering where the original stopped
        assert_eq!(restored.snapshot(), snapshot);
    }

    #[test]
    fn test_snapshot_rejects_duplicates() {
        let clock: Arc<dyn Clock> = Arc::new(ManualClock::new(0));
        let mut team = team();
        team.join("mike", false).unwrap();
        let mut snapshot = team.snapshot();
        let mut dup = snapshot.participants[1].clone();
        dup.name = "MIKE".to_string();
        snapshot.participants.push(dup);

        assert!(matches!(
            ScrumTeam::from_snapshot(snapshot, clock),
            Err(TeamError::NameCollision { .. })
        ));
    }

    #[test]
    fn test_name_validation() {
        let clock: Arc<dyn Clock> = Arc::new(ManualClock::new(0));
        assert!(matches!(
            ScrumTeam::new("", clock.clone()),
            Err(TeamError::Validation(_))
        ));
        assert!(matches!(
            ScrumTeam::new("x".repeat(MAX_NAME_LENGTH + 1), clock),
            Err(TeamError::Validation(_))
        ));
    }
}
