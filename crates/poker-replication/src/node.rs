//! Replication agent bridging a registry to the message bus.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use poker_domain::{Message, MessageBody};
use poker_registry::{RegistryError, RegistryEvent, RemoteTeamEvent, TeamRegistry};

use crate::codec::{decode_team, encode_team};
use crate::{MessageBus, NodeId, NodeMessage, NodePayload, Result};

/// Configuration for a replication node.
#[derive(Debug, Clone)]
pub struct NodeConfig {
    /// How long a starting node waits for a `TeamList` answer before
    /// assuming it is alone in the cluster and going live.
    pub bootstrap_timeout: Duration,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            bootstrap_timeout: Duration::from_secs(5),
        }
    }
}

/// Per-process replication agent.
///
/// Bridges two independent flows: the registry's outward event stream onto
/// the bus (only events produced through the local API surface ever reach
/// it, so nothing a node merely replayed is forwarded again), and the
/// bus's inbound stream back into the registry (bootstrap fetches plus
/// incremental replays). Bad inbound traffic is logged and dropped; the
/// bootstrap resync path recovers whatever got lost.
pub struct ReplicationNode {
    id: NodeId,
    registry: Arc<TeamRegistry>,
    bus: Arc<dyn MessageBus>,
    config: NodeConfig,
    tasks: Mutex<Vec<JoinHandle<()>>>,
    running: AtomicBool,
}

impl ReplicationNode {
    /// Creates a node over the given registry and bus.
    pub fn new(
        id: NodeId,
        registry: Arc<TeamRegistry>,
        bus: Arc<dyn MessageBus>,
        config: NodeConfig,
    ) -> Self {
        Self {
            id,
            registry,
            bus,
            config,
            tasks: Mutex::new(Vec::new()),
            running: AtomicBool::new(false),
        }
    }

    /// The node's unique id.
    pub fn id(&self) -> &NodeId {
        &self.id
    }

    /// Returns true while the node's tasks are running.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Registers on the bus, spawns the outbound and inbound tasks, and
    /// broadcasts the team-list request that starts the bootstrap.
    ///
    /// # Errors
    ///
    /// Returns an error when the bus rejects the registration or the
    /// initial broadcast.
    pub async fn start(&self) -> Result<()> {
        if self.running.swap(true, Ordering::SeqCst) {
            return Ok(());
        }

        let inbound_rx = self.bus.register(&self.id).await?;
        let events = self.registry.subscribe();

        let outbound = tokio::spawn(outbound_task(
            self.id.clone(),
            self.registry.clone(),
            self.bus.clone(),
            events,
        ));
        let inbound = tokio::spawn(inbound_task(
            self.id.clone(),
            self.registry.clone(),
            self.bus.clone(),
            inbound_rx,
        ));
        let grace = tokio::spawn(bootstrap_grace(
            self.id.clone(),
            self.registry.clone(),
            self.config.bootstrap_timeout,
        ));
        self.tasks.lock().extend([outbound, inbound, grace]);

        self.bus
            .send(NodeMessage::broadcast(
                self.id.clone(),
                NodePayload::RequestTeamList,
            ))
            .await?;
        info!(node = %self.id, "replication node started; requesting team list");
        Ok(())
    }

    /// Aborts the node's tasks and unregisters from the bus.
    pub async fn stop(&self) {
        if !self.running.swap(false, Ordering::SeqCst) {
            return;
        }
        for task in self.tasks.lock().drain(..) {
            task.abort();
        }
        if let Err(err) = self.bus.unregister(&self.id).await {
            warn!(node = %self.id, error = %err, "failed to unregister from bus");
        }
        info!(node = %self.id, "replication node stopped");
    }
}

impl std::fmt::Debug for ReplicationNode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReplicationNode")
            .field("id", &self.id)
            .field("running", &self.is_running())
            .finish()
    }
}

/// Maps a locally emitted domain message to its replayable wire event.
///
/// `EstimateEnded` is deliberately absent: every node derives the same
/// round finish from the member-estimate events it replays, so re-sending
/// the (larger) result would be redundant. `Empty` is a mailbox-local
/// wake-up with no meaning to peers.
fn replicable_event(message: &Message) -> Option<RemoteTeamEvent> {
    match &message.body {
        MessageBody::MemberJoined { name, observer } => Some(RemoteTeamEvent::MemberJoined {
            name: name.clone(),
            observer: *observer,
        }),
        MessageBody::MemberDisconnected { name, .. } => {
            Some(RemoteTeamEvent::MemberDisconnected { name: name.clone() })
        }
        MessageBody::EstimateStarted => Some(RemoteTeamEvent::EstimateStarted),
        MessageBody::EstimateCanceled => Some(RemoteTeamEvent::EstimateCanceled),
        MessageBody::MemberEstimated { name, estimate } => {
            Some(RemoteTeamEvent::MemberEstimated {
                name: name.clone(),
                estimate: *estimate,
            })
        }
        MessageBody::MemberActivity { name } => {
            Some(RemoteTeamEvent::MemberActivity { name: name.clone() })
        }
        MessageBody::EstimateEnded(_) | MessageBody::Empty => None,
    }
}

async fn outbound_task(
    id: NodeId,
    registry: Arc<TeamRegistry>,
    bus: Arc<dyn MessageBus>,
    mut events: broadcast::Receiver<RegistryEvent>,
) {
    loop {
        match events.recv().await {
            Ok(RegistryEvent::TeamCreated { team }) => match registry.team_snapshot(&team).await {
                Ok(snapshot) => {
                    let message = NodeMessage::broadcast(
                        id.clone(),
                        NodePayload::TeamCreated {
                            snapshot: encode_team(&snapshot),
                        },
                    );
                    if let Err(err) = bus.send(message).await {
                        warn!(node = %id, team = %team, error = %err, "failed to publish team creation");
                    } else {
                        debug!(node = %id, team = %team, "published team creation");
                    }
                }
                Err(err) => {
                    warn!(node = %id, team = %team, error = %err, "failed to snapshot created team")
                }
            },
            Ok(RegistryEvent::TeamMessage { team, message }) => {
                let Some(event) = replicable_event(&message) else {
                    continue;
                };
                let wire = NodeMessage::broadcast(
                    id.clone(),
                    NodePayload::ScrumTeamMessage { team: team.clone(), event },
                );
                if let Err(err) = bus.send(wire).await {
                    warn!(node = %id, team = %team, error = %err, "failed to publish team event");
                }
            }
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                warn!(node = %id, skipped, "outbound stream lagged; peers recover via resync");
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}

async fn inbound_task(
    id: NodeId,
    registry: Arc<TeamRegistry>,
    bus: Arc<dyn MessageBus>,
    mut inbound: crate::BusReceiver,
) {
    while let Some(message) = inbound.recv().await {
        if message.sender == id {
            continue;
        }
        if message.recipient.as_ref().is_some_and(|r| *r != id) {
            continue;
        }
        if let Err(err) = handle_message(&id, &registry, &bus, message).await {
            // a dropped message is recovered by the next full resync
            warn!(node = %id, error = %err, "dropping replication message");
        }
    }
}

async fn handle_message(
    id: &NodeId,
    registry: &Arc<TeamRegistry>,
    bus: &Arc<dyn MessageBus>,
    message: NodeMessage,
) -> Result<()> {
    let sender = message.sender;
    match message.payload {
        NodePayload::RequestTeamList => {
            // only a live node answers; one still bootstrapping has nothing
            // authoritative to offer
            if !registry.is_initialized() {
                debug!(node = %id, "ignoring team list request while bootstrapping");
                return Ok(());
            }
            let names = registry.team_names();
            debug!(node = %id, requester = %sender, teams = names.len(), "answering team list request");
            bus.send(NodeMessage::direct(
                id.clone(),
                sender,
                NodePayload::TeamList { names },
            ))
            .await
        }
        NodePayload::TeamList { names } => {
            // first answer wins; every later one is ignored
            if !registry.set_teams_initializing_list(&names) {
                return Ok(());
            }
            info!(node = %id, teams = names.len(), "received team list");
            if !names.is_empty() {
                bus.send(NodeMessage::broadcast(
                    id.clone(),
                    NodePayload::RequestTeams { names },
                ))
                .await?;
            }
            Ok(())
        }
        NodePayload::RequestTeams { names } => {
            // a bootstrapping node has nothing authoritative to serve, and
            // its barrier-gated snapshot calls would stall the inbound task
            if !registry.is_initialized() {
                debug!(node = %id, "ignoring team request while bootstrapping");
                return Ok(());
            }
            for name in names {
                let payload = match registry.team_snapshot(&name).await {
                    Ok(snapshot) => NodePayload::InitializeTeam {
                        name: name.clone(),
                        snapshot: Some(encode_team(&snapshot)),
                    },
                    // the team vanished since we listed it; a bare name
                    // lets the requester drop it from the pending set
                    Err(RegistryError::TeamNotFound { .. }) => NodePayload::InitializeTeam {
                        name: name.clone(),
                        snapshot: None,
                    },
                    Err(err) => {
                        warn!(node = %id, team = %name, error = %err, "failed to snapshot requested team");
                        continue;
                    }
                };
                bus.send(NodeMessage::direct(id.clone(), sender.clone(), payload))
                    .await?;
            }
            Ok(())
        }
        NodePayload::InitializeTeam { name, snapshot } => {
            match snapshot {
                Some(bytes) => {
                    let snapshot = decode_team(&bytes)?;
                    registry.initialize_team(snapshot)?;
                }
                None => registry.resolve_initializing_team(&name),
            }
            Ok(())
        }
        NodePayload::TeamCreated { snapshot } => {
            let snapshot = decode_team(&snapshot)?;
            if registry.is_team_pending(&snapshot.name) {
                // the authoritative copy is still in flight on the
                // bootstrap path
                debug!(node = %id, team = %snapshot.name, "ignoring creation of a pending team");
                return Ok(());
            }
            registry.attach_team(snapshot)?;
            Ok(())
        }
        NodePayload::ScrumTeamMessage { team, event } => {
            if registry.is_team_pending(&team) {
                debug!(node = %id, team = %team, "ignoring event for a pending team");
                return Ok(());
            }
            registry.apply_remote(&team, event).await?;
            Ok(())
        }
    }
}

async fn bootstrap_grace(id: NodeId, registry: Arc<TeamRegistry>, wait: Duration) {
    tokio::time::sleep(wait).await;
    if !registry.is_bootstrap_started() {
        info!(node = %id, "no team list answer; assuming first node and going live");
        registry.end_initialization();
    }
}
