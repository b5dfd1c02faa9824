//! In-memory registry of teams, gated by the bootstrap barrier.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use tokio::sync::{broadcast, Notify};
use tracing::{debug, info, warn};

use poker_domain::{
    Clock, Estimate, Message, MessageId, ScrumTeam, SystemClock, TeamSnapshot,
};

use crate::{
    InitializationList, NullTeamRepository, RegistryError, Result, ScrumTeamLock, TeamRepository,
};

/// Capacity of the registry's outward event channel.
const EVENT_CAPACITY: usize = 1024;

/// Bounded-wait configuration for registry operations.
#[derive(Debug, Clone)]
pub struct RegistryConfig {
    /// Longest wait for a per-team lock.
    pub lock_timeout: Duration,
    /// Longest wait on the bootstrap barrier before create/get give up.
    pub init_timeout: Duration,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            lock_timeout: Duration::from_secs(10),
            init_timeout: Duration::from_secs(60),
        }
    }
}

/// Event published on the registry's outward stream for the replication
/// layer.
///
/// Only mutations performed through the local API surface end up here;
/// replayed peer events never do.
#[derive(Debug, Clone)]
pub enum RegistryEvent {
    /// A brand-new team was created locally.
    TeamCreated {
        /// Name of the created team.
        team: String,
    },
    /// A locally held team emitted a message.
    TeamMessage {
        /// Name of the team.
        team: String,
        /// The emitted domain message.
        message: Message,
    },
}

/// A domain mutation replayed from a peer node.
#[derive(Debug, Clone, PartialEq)]
pub enum RemoteTeamEvent {
    /// A participant joined on the peer.
    MemberJoined {
        /// Participant name.
        name: String,
        /// True for a non-voting observer.
        observer: bool,
    },
    /// A participant left on the peer.
    MemberDisconnected {
        /// Participant name.
        name: String,
    },
    /// The peer's scrum master started a round.
    EstimateStarted,
    /// The peer's scrum master canceled the round.
    EstimateCanceled,
    /// A member voted on the peer.
    MemberEstimated {
        /// Member name.
        name: String,
        /// The card the member picked.
        estimate: Estimate,
    },
    /// A participant showed activity on the peer.
    MemberActivity {
        /// Participant name.
        name: String,
    },
}

#[derive(Clone)]
struct TeamSlot {
    lock: ScrumTeamLock,
    changed: Arc<Notify>,
}

impl TeamSlot {
    fn new(team: ScrumTeam) -> Self {
        Self {
            lock: ScrumTeamLock::new(team),
            changed: Arc::new(Notify::new()),
        }
    }

    fn team_name(&self) -> &str {
        self.lock.team_name()
    }
}

/// In-memory map of team name to team, shared by every caller of one
/// process.
///
/// Create and get block on the [`InitializationList`] until this node
/// knows which team names already exist cluster-wide. All mutation happens
/// under the per-team lock; mutations performed through the local API are
/// broadcast on [`subscribe`](TeamRegistry::subscribe), mutations replayed
/// from peers ([`apply_remote`](TeamRegistry::apply_remote) and the
/// bootstrap registrations) are not. That asymmetry is what keeps events
/// from echoing around the cluster.
pub struct TeamRegistry {
    teams: RwLock<HashMap<String, TeamSlot>>,
    init: InitializationList,
    event_tx: broadcast::Sender<RegistryEvent>,
    repository: Arc<dyn TeamRepository>,
    clock: Arc<dyn Clock>,
    config: RegistryConfig,
}

impl TeamRegistry {
    /// Creates a registry with no persistence and the system clock.
    pub fn new(config: RegistryConfig) -> Self {
        let (event_tx, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            teams: RwLock::new(HashMap::new()),
            init: InitializationList::new(),
            event_tx,
            repository: Arc::new(NullTeamRepository),
            clock: Arc::new(SystemClock),
            config,
        }
    }

    /// Replaces the snapshot store.
    pub fn with_repository(mut self, repository: Arc<dyn TeamRepository>) -> Self {
        self.repository = repository;
        self
    }

    /// Replaces the time source.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Subscribes to the outward event stream.
    pub fn subscribe(&self) -> broadcast::Receiver<RegistryEvent> {
        self.event_tx.subscribe()
    }

    // ==================== Local API surface ====================

    /// Creates a team with its scrum master.
    ///
    /// Fails immediately when a peer is known to own the name; otherwise
    /// blocks on the bootstrap barrier (bounded) before deciding.
    pub async fn create_team(&self, name: &str, scrum_master: &str) -> Result<()> {
        if self.init.is_known_pending(name) {
            return Err(RegistryError::TeamAlreadyExists {
                name: name.to_string(),
            });
        }
        self.init
            .wait_resolved(name, self.config.init_timeout)
            .await?;

        if self.load_persisted(name).is_some() {
            return Err(RegistryError::TeamAlreadyExists {
                name: name.to_string(),
            });
        }

        let mut team = ScrumTeam::new(name, self.clock.clone())?;
        team.set_scrum_master(scrum_master)?;
        let snapshot = team.snapshot();

        {
            let mut teams = self.teams.write();
            if teams.contains_key(&name.to_lowercase()) {
                return Err(RegistryError::TeamAlreadyExists {
                    name: name.to_string(),
                });
            }
            teams.insert(name.to_lowercase(), TeamSlot::new(team));
        }

        self.persist(&snapshot);
        self.publish(RegistryEvent::TeamCreated {
            team: name.to_string(),
        });
        info!(team = %name, scrum_master = %scrum_master, "team created");
        Ok(())
    }

    /// Returns true when the team is held in memory.
    pub fn contains_team(&self, name: &str) -> bool {
        self.teams.read().contains_key(&name.to_lowercase())
    }

    /// Names of all teams held in memory.
    pub fn team_names(&self) -> Vec<String> {
        self.teams
            .read()
            .values()
            .map(|slot| slot.team_name().to_string())
            .collect()
    }

    /// Captures a team's full state, gated by the bootstrap barrier.
    pub async fn team_snapshot(&self, name: &str) -> Result<TeamSnapshot> {
        let slot = self.slot_gated(name).await?;
        let guard = slot.lock.lock(self.config.lock_timeout).await?;
        Ok(guard.snapshot())
    }

    /// Adds a member or observer to a team.
    pub async fn join(&self, team: &str, name: &str, as_observer: bool) -> Result<()> {
        let slot = self.slot_gated(team).await?;
        self.mutate_slot(&slot, true, |t| {
            let message = t.join(name, as_observer)?;
            Ok(((), vec![message]))
        })
        .await
    }

    /// Removes a participant from a team.
    pub async fn disconnect(&self, team: &str, name: &str) -> Result<()> {
        let slot = self.slot_gated(team).await?;
        self.mutate_slot(&slot, true, |t| Ok(((), t.disconnect(name))))
            .await
    }

    /// Starts an estimation round. Reserved for the scrum master.
    pub async fn start_estimate(&self, team: &str, caller: &str) -> Result<()> {
        let slot = self.slot_gated(team).await?;
        self.mutate_slot(&slot, true, |t| {
            ensure_scrum_master(t, caller, "start an estimate")?;
            let message = t.start_estimate()?;
            Ok(((), vec![message]))
        })
        .await
    }

    /// Cancels the running round. Reserved for the scrum master.
    pub async fn cancel_estimate(&self, team: &str, caller: &str) -> Result<()> {
        let slot = self.slot_gated(team).await?;
        self.mutate_slot(&slot, true, |t| {
            ensure_scrum_master(t, caller, "cancel an estimate")?;
            Ok(((), t.cancel_estimate().into_iter().collect()))
        })
        .await
    }

    /// Records a member's vote.
    pub async fn submit_estimate(
        &self,
        team: &str,
        member: &str,
        estimate: Estimate,
    ) -> Result<()> {
        let slot = self.slot_gated(team).await?;
        self.mutate_slot(&slot, true, |t| Ok(((), t.set_estimate(member, estimate)?)))
            .await
    }

    /// Long-poll read of a participant's mailbox.
    ///
    /// Acknowledges everything up to `last_id`, refreshes the participant's
    /// activity, and returns the pending messages: immediately when there
    /// are any, otherwise after suspending (lock released) until new
    /// fan-out arrives or `wait` elapses. An elapsed wait returns an empty
    /// list, not an error.
    pub async fn poll_messages(
        &self,
        team: &str,
        participant: &str,
        last_id: Option<MessageId>,
        wait: Duration,
    ) -> Result<Vec<Message>> {
        let slot = self.slot_gated(team).await?;
        let deadline = tokio::time::Instant::now() + wait;
        let mut beacon = None;
        let mut first = true;
        loop {
            let mut guard = slot.lock.lock(self.config.lock_timeout).await?;
            if first {
                first = false;
                if let Some(last_id) = last_id {
                    guard.acknowledge_messages(participant, last_id)?;
                }
                beacon = Some(guard.update_activity(participant)?);
            }
            let pending = guard.pending_messages(participant)?;
            if !pending.is_empty() {
                drop(guard);
                self.flush_beacon(&slot, beacon.take());
                return Ok(pending);
            }

            // Register for the wake-up before releasing the lock, or a
            // fan-out landing in between would be missed.
            let notified = slot.changed.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            drop(guard);
            self.flush_beacon(&slot, beacon.take());

            if tokio::time::timeout_at(deadline, notified).await.is_err() {
                return Ok(Vec::new());
            }
        }
    }

    /// Disconnects every participant idle for longer than `max_idle`
    /// across all teams, and drops teams left empty.
    pub async fn disconnect_inactive(&self, max_idle: Duration) -> Result<()> {
        let slots: Vec<TeamSlot> = self.teams.read().values().cloned().collect();
        for slot in slots {
            let mut guard = slot.lock.lock(self.config.lock_timeout).await?;
            let events = guard.disconnect_inactive(max_idle.as_secs());
            let emptied = guard.is_empty();
            let snapshot = (!events.is_empty() && !emptied).then(|| guard.snapshot());
            drop(guard);

            if !events.is_empty() {
                slot.changed.notify_waiters();
                for message in events {
                    self.publish(RegistryEvent::TeamMessage {
                        team: slot.team_name().to_string(),
                        message,
                    });
                }
            }
            if emptied {
                info!(team = %slot.team_name(), "dropping empty team");
                self.teams.write().remove(&slot.team_name().to_lowercase());
                if let Err(err) = self.repository.delete(slot.team_name()) {
                    warn!(team = %slot.team_name(), error = %err, "failed to delete persisted team");
                }
            } else if let Some(snapshot) = snapshot {
                self.persist(&snapshot);
            }
        }

        let threshold = self.clock.now().saturating_sub(max_idle.as_secs());
        if let Err(err) = self.repository.delete_expired(threshold) {
            warn!(error = %err, "failed to expire persisted teams");
        }
        Ok(())
    }

    // ==================== Replication surface ====================

    /// One-time barrier setup with the team names owned elsewhere in the
    /// cluster.
    ///
    /// A non-empty list also discards every locally persisted snapshot:
    /// the authoritative copies arrive via replication, not from stale
    /// local state. Returns false when an earlier setup already won.
    pub fn set_teams_initializing_list<I, S>(&self, names: I) -> bool
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let names: Vec<String> = names
            .into_iter()
            .map(|n| n.as_ref().to_string())
            .collect();
        let applied = self.init.setup(names.iter());
        if applied && !names.is_empty() {
            match self.repository.list_names() {
                Ok(stored) => {
                    for name in stored {
                        if let Err(err) = self.repository.delete(&name) {
                            warn!(team = %name, error = %err, "failed to discard stale snapshot");
                        }
                    }
                }
                Err(err) => warn!(error = %err, "failed to list persisted teams"),
            }
            info!(pending = names.len(), "bootstrap started");
        }
        applied
    }

    /// Registers a team fetched from a peer and resolves its name from the
    /// pending set. The barrier clears itself once the set empties.
    pub fn initialize_team(&self, snapshot: TeamSnapshot) -> Result<()> {
        let team = ScrumTeam::from_snapshot(snapshot.clone(), self.clock.clone())?;
        let name = team.name().to_string();
        self.teams
            .write()
            .insert(name.to_lowercase(), TeamSlot::new(team));
        self.persist(&snapshot);
        self.init.remove(&name);
        info!(team = %name, "team initialized from peer");
        Ok(())
    }

    /// Resolves a pending name without attaching a team (it vanished on
    /// the peer before it could be fetched).
    pub fn resolve_initializing_team(&self, name: &str) {
        if self.init.remove(name) {
            debug!(team = %name, "pending team resolved without snapshot");
        }
    }

    /// Registers a peer-announced team unconditionally. Used after
    /// bootstrap for brand-new teams created elsewhere.
    pub fn attach_team(&self, snapshot: TeamSnapshot) -> Result<()> {
        let team = ScrumTeam::from_snapshot(snapshot.clone(), self.clock.clone())?;
        let name = team.name().to_string();
        self.teams
            .write()
            .insert(name.to_lowercase(), TeamSlot::new(team));
        self.persist(&snapshot);
        info!(team = %name, "team attached from peer");
        Ok(())
    }

    /// Ends the bootstrap; create/get stop blocking.
    pub fn end_initialization(&self) {
        self.init.clear();
        info!("registry live");
    }

    /// True once the bootstrap barrier cleared.
    pub fn is_initialized(&self) -> bool {
        self.init.is_cleared()
    }

    /// True once a teams-initializing list arrived (even a non-empty one
    /// still being worked through).
    pub fn is_bootstrap_started(&self) -> bool {
        self.init.is_set_up()
    }

    /// True while the barrier would hold back operations on this name.
    pub fn is_team_pending(&self, name: &str) -> bool {
        self.init.contains_or_not_init(name)
    }

    /// Replays one peer event on the local replica, under the team lock.
    ///
    /// Never publishes to the outward stream: a node forwards only events
    /// produced through its own local API, so replayed events cannot echo
    /// back onto the bus.
    pub async fn apply_remote(&self, team: &str, event: RemoteTeamEvent) -> Result<()> {
        let slot = self.slot(team)?;
        self.mutate_slot(&slot, false, |t| {
            let events = match event {
                RemoteTeamEvent::MemberJoined { name, observer } => {
                    vec![t.join(&name, observer)?]
                }
                RemoteTeamEvent::MemberDisconnected { name } => t.disconnect(&name),
                RemoteTeamEvent::EstimateStarted => vec![t.start_estimate()?],
                RemoteTeamEvent::EstimateCanceled => {
                    t.cancel_estimate().into_iter().collect()
                }
                RemoteTeamEvent::MemberEstimated { name, estimate } => {
                    t.set_estimate(&name, estimate)?
                }
                RemoteTeamEvent::MemberActivity { name } => {
                    t.update_activity(&name)?;
                    Vec::new()
                }
            };
            Ok(((), events))
        })
        .await
    }

    // ==================== Internals ====================

    async fn slot_gated(&self, name: &str) -> Result<TeamSlot> {
        self.init
            .wait_resolved(name, self.config.init_timeout)
            .await?;
        self.slot(name)
    }

    fn slot(&self, name: &str) -> Result<TeamSlot> {
        if let Some(slot) = self.teams.read().get(&name.to_lowercase()).cloned() {
            return Ok(slot);
        }

        // Revive from the snapshot store; anything unreadable counts as
        // absent.
        if let Some(snapshot) = self.load_persisted(name) {
            match ScrumTeam::from_snapshot(snapshot, self.clock.clone()) {
                Ok(team) => {
                    let mut teams = self.teams.write();
                    let slot = teams
                        .entry(name.to_lowercase())
                        .or_insert_with(|| TeamSlot::new(team))
                        .clone();
                    debug!(team = %name, "team revived from snapshot store");
                    return Ok(slot);
                }
                Err(err) => {
                    warn!(team = %name, error = %err, "discarding corrupt persisted team")
                }
            }
        }

        Err(RegistryError::TeamNotFound {
            name: name.to_string(),
        })
    }

    async fn mutate_slot<T, F>(&self, slot: &TeamSlot, publish: bool, op: F) -> Result<T>
    where
        F: FnOnce(&mut ScrumTeam) -> Result<(T, Vec<Message>)>,
    {
        let mut guard = slot.lock.lock(self.config.lock_timeout).await?;
        let (output, events) = op(&mut guard)?;
        let snapshot = (!events.is_empty()).then(|| guard.snapshot());
        drop(guard);

        if let Some(snapshot) = snapshot {
            self.persist(&snapshot);
            slot.changed.notify_waiters();
            if publish {
                for message in events {
                    self.publish(RegistryEvent::TeamMessage {
                        team: slot.team_name().to_string(),
                        message,
                    });
                }
            }
        }
        Ok(output)
    }

    fn load_persisted(&self, name: &str) -> Option<TeamSnapshot> {
        match self.repository.load(name) {
            Ok(snapshot) => snapshot,
            Err(err) => {
                warn!(team = %name, error = %err, "failed to load persisted team");
                None
            }
        }
    }

    fn persist(&self, snapshot: &TeamSnapshot) {
        if let Err(err) = self.repository.save(snapshot) {
            warn!(team = %snapshot.name, error = %err, "failed to persist team snapshot");
        }
    }

    fn flush_beacon(&self, slot: &TeamSlot, beacon: Option<Message>) {
        if let Some(message) = beacon {
            self.publish(RegistryEvent::TeamMessage {
                team: slot.team_name().to_string(),
                message,
            });
        }
    }

    fn publish(&self, event: RegistryEvent) {
        let _ = self.event_tx.send(event);
    }
}

fn ensure_scrum_master(team: &ScrumTeam, caller: &str, action: &'static str) -> Result<()> {
    let is_master = team
        .scrum_master()
        .is_some_and(|m| m.name().eq_ignore_ascii_case(caller));
    if is_master {
        Ok(())
    } else {
        Err(RegistryError::NotScrumMaster { action })
    }
}

impl std::fmt::Debug for TeamRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TeamRegistry")
            .field("teams", &self.teams.read().len())
            .field("initialized", &self.init.is_cleared())
            .finish()
    }
}
