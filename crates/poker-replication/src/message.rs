//! Wire protocol messages exchanged between replication nodes.

use bytes::{Buf, BufMut, Bytes, BytesMut};

use poker_registry::RemoteTeamEvent;

use crate::codec::{get_bool, get_card, get_string, get_u8, put_bool, put_card, put_string};
use crate::{ReplicationError, Result};

/// Version byte leading every encoded node message.
pub const PROTOCOL_VERSION: u8 = 1;

/// Unique identifier of one replication node.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct NodeId(String);

impl NodeId {
    /// Wraps an explicit node id.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Generates a random node id.
    pub fn random() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    /// The id as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for NodeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Message type discriminator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum NodeMessageType {
    /// Incremental domain event for one team.
    ScrumTeamMessage = 1,
    /// Full snapshot of a freshly created team.
    TeamCreated = 2,
    /// Broadcast by a starting node to discover existing teams.
    RequestTeamList = 3,
    /// A live node's answer with all its team names.
    TeamList = 4,
    /// Request for full snapshots of named teams.
    RequestTeams = 5,
    /// One requested team: a snapshot, or a bare name when it vanished.
    InitializeTeam = 6,
}

impl NodeMessageType {
    /// Parses a message type from a byte.
    pub fn from_byte(b: u8) -> Result<Self> {
        match b {
            1 => Ok(NodeMessageType::ScrumTeamMessage),
            2 => Ok(NodeMessageType::TeamCreated),
            3 => Ok(NodeMessageType::RequestTeamList),
            4 => Ok(NodeMessageType::TeamList),
            5 => Ok(NodeMessageType::RequestTeams),
            6 => Ok(NodeMessageType::InitializeTeam),
            _ => Err(ReplicationError::InvalidMessage(format!(
                "unknown message type: {}",
                b
            ))),
        }
    }
}

/// Payload of a node message.
#[derive(Debug, Clone, PartialEq)]
pub enum NodePayload {
    /// Incremental domain event for one team.
    ScrumTeamMessage {
        /// Name of the team the event belongs to.
        team: String,
        /// The replayable event.
        event: RemoteTeamEvent,
    },
    /// Full snapshot of a freshly created team.
    TeamCreated {
        /// Encoded [`TeamSnapshot`](poker_domain::TeamSnapshot).
        snapshot: Bytes,
    },
    /// Broadcast by a starting node to discover existing teams.
    RequestTeamList,
    /// A live node's answer, addressed to the requester.
    TeamList {
        /// Every team name the answering node holds.
        names: Vec<String>,
    },
    /// Request for full snapshots of the named teams.
    RequestTeams {
        /// The still-pending team names.
        names: Vec<String>,
    },
    /// One requested team, addressed to the requester.
    InitializeTeam {
        /// Name of the team.
        name: String,
        /// Encoded snapshot, or `None` when the team vanished and the
        /// requester should just drop the pending name.
        snapshot: Option<Bytes>,
    },
}

impl NodePayload {
    /// Returns the type discriminator for this payload.
    pub fn message_type(&self) -> NodeMessageType {
        match self {
            NodePayload::ScrumTeamMessage { .. } => NodeMessageType::ScrumTeamMessage,
            NodePayload::TeamCreated { .. } => NodeMessageType::TeamCreated,
            NodePayload::RequestTeamList => NodeMessageType::RequestTeamList,
            NodePayload::TeamList { .. } => NodeMessageType::TeamList,
            NodePayload::RequestTeams { .. } => NodeMessageType::RequestTeams,
            NodePayload::InitializeTeam { .. } => NodeMessageType::InitializeTeam,
        }
    }
}

/// One message on the bus.
#[derive(Debug, Clone, PartialEq)]
pub struct NodeMessage {
    /// Node that published the message.
    pub sender: NodeId,
    /// Addressee; `None` broadcasts to every other node.
    pub recipient: Option<NodeId>,
    /// Typed payload.
    pub payload: NodePayload,
}

impl NodeMessage {
    /// Creates a broadcast message.
    pub fn broadcast(sender: NodeId, payload: NodePayload) -> Self {
        Self {
            sender,
            recipient: None,
            payload,
        }
    }

    /// Creates a message addressed to one node.
    pub fn direct(sender: NodeId, recipient: NodeId, payload: NodePayload) -> Self {
        Self {
            sender,
            recipient: Some(recipient),
            payload,
        }
    }

    /// Returns the type discriminator of the payload.
    pub fn message_type(&self) -> NodeMessageType {
        self.payload.message_type()
    }

    /// Encodes the message to its wire form.
    pub fn encode(&self) -> Bytes {
        let mut buf = BytesMut::new();
        buf.put_u8(PROTOCOL_VERSION);
        buf.put_u8(self.message_type() as u8);
        put_string(&mut buf, self.sender.as_str());
        match &self.recipient {
            None => buf.put_u8(0),
            Some(recipient) => {
                buf.put_u8(1);
                put_string(&mut buf, recipient.as_str());
            }
        }

        match &self.payload {
            NodePayload::ScrumTeamMessage { team, event } => {
                put_string(&mut buf, team);
                put_event(&mut buf, event);
            }
            NodePayload::TeamCreated { snapshot } => {
                buf.put_u32(snapshot.len() as u32);
                buf.put_slice(snapshot);
            }
            NodePayload::RequestTeamList => {}
            NodePayload::TeamList { names } | NodePayload::RequestTeams { names } => {
                put_names(&mut buf, names);
            }
            NodePayload::InitializeTeam { name, snapshot } => {
                put_string(&mut buf, name);
                match snapshot {
                    None => buf.put_u8(0),
                    Some(snapshot) => {
                        buf.put_u8(1);
                        buf.put_u32(snapshot.len() as u32);
                        buf.put_slice(snapshot);
                    }
                }
            }
        }
        buf.freeze()
    }

    /// Decodes a message from its wire form.
    ///
    /// # Errors
    ///
    /// Fails on an unknown version, unknown type tag, or truncated input.
    pub fn decode(data: &[u8]) -> Result<Self> {
        let mut buf = data;
        let version = get_u8(&mut buf)?;
        if version != PROTOCOL_VERSION {
            return Err(ReplicationError::UnsupportedVersion(version));
        }
        let message_type = NodeMessageType::from_byte(get_u8(&mut buf)?)?;
        let sender = NodeId::new(get_string(&mut buf)?);
        let recipient = match get_u8(&mut buf)? {
            0 => None,
            1 => Some(NodeId::new(get_string(&mut buf)?)),
            t => {
                return Err(ReplicationError::InvalidMessage(format!(
                    "invalid recipient tag: {}",
                    t
                )))
            }
        };

        let payload = match message_type {
            NodeMessageType::ScrumTeamMessage => NodePayload::ScrumTeamMessage {
                team: get_string(&mut buf)?,
                event: get_event(&mut buf)?,
            },
            NodeMessageType::TeamCreated => NodePayload::TeamCreated {
                snapshot: get_bytes(&mut buf)?,
            },
            NodeMessageType::RequestTeamList => NodePayload::RequestTeamList,
            NodeMessageType::TeamList => NodePayload::TeamList {
                names: get_names(&mut buf)?,
            },
            NodeMessageType::RequestTeams => NodePayload::RequestTeams {
                names: get_names(&mut buf)?,
            },
            NodeMessageType::InitializeTeam => {
                let name = get_string(&mut buf)?;
                let snapshot = match get_u8(&mut buf)? {
                    0 => None,
                    1 => Some(get_bytes(&mut buf)?),
                    t => {
                        return Err(ReplicationError::InvalidMessage(format!(
                            "invalid snapshot tag: {}",
                            t
                        )))
                    }
                };
                NodePayload::InitializeTeam { name, snapshot }
            }
        };

        Ok(Self {
            sender,
            recipient,
            payload,
        })
    }
}

fn put_names(buf: &mut BytesMut, names: &[String]) {
    buf.put_u32(names.len() as u32);
    for name in names {
        put_string(buf, name);
    }
}

fn get_names(buf: &mut &[u8]) -> Result<Vec<String>> {
    if buf.remaining() < 4 {
        return Err(ReplicationError::InvalidMessage(
            "truncated name count".into(),
        ));
    }
    let count = buf.get_u32() as usize;
    let mut names = Vec::with_capacity(count);
    for _ in 0..count {
        names.push(get_string(buf)?);
    }
    Ok(names)
}

fn get_bytes(buf: &mut &[u8]) -> Result<Bytes> {
    if buf.remaining() < 4 {
        return Err(ReplicationError::InvalidMessage(
            "truncated payload length".into(),
        ));
    }
    let len = buf.get_u32() as usize;
    if buf.remaining() < len {
        return Err(ReplicationError::InvalidMessage("truncated payload".into()));
    }
    let bytes = Bytes::copy_from_slice(&buf[..len]);
    buf.advance(len);
    Ok(bytes)
}

fn put_event(buf: &mut BytesMut, event: &RemoteTeamEvent) {
    match event {
        RemoteTeamEvent::MemberJoined { name, observer } => {
            buf.put_u8(1);
            put_string(buf, name);
            put_bool(buf, *observer);
        }
        RemoteTeamEvent::MemberDisconnected { name } => {
            buf.put_u8(2);
            put_string(buf, name);
        }
        RemoteTeamEvent::EstimateStarted => buf.put_u8(3),
        RemoteTeamEvent::EstimateCanceled => buf.put_u8(4),
        RemoteTeamEvent::MemberEstimated { name, estimate } => {
            buf.put_u8(5);
            put_string(buf, name);
            put_card(buf, *estimate);
        }
        RemoteTeamEvent::MemberActivity { name } => {
            buf.put_u8(6);
            put_string(buf, name);
        }
    }
}

fn get_event(buf: &mut &[u8]) -> Result<RemoteTeamEvent> {
    match get_u8(buf)? {
        1 => Ok(RemoteTeamEvent::MemberJoined {
            name: get_string(buf)?,
            observer: get_bool(buf)?,
        }),
        2 => Ok(RemoteTeamEvent::MemberDisconnected {
            name: get_string(buf)?,
        }),
        3 => Ok(RemoteTeamEvent::EstimateStarted),
        4 => Ok(RemoteTeamEvent::EstimateCanceled),
        5 => Ok(RemoteTeamEvent::MemberEstimated {
            name: get_string(buf)?,
            estimate: get_card(buf)?,
        }),
        6 => Ok(RemoteTeamEvent::MemberActivity {
            name: get_string(buf)?,
        }),
        t => Err(ReplicationError::InvalidMessage(format!(
            "invalid event tag: {}",
            t
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use poker_domain::Estimate;

    fn round_trip(message: NodeMessage) {
        let encoded = message.encode();
        let decoded = NodeMessage::decode(&encoded).unwrap();
        assert_eq!(decoded, message);
    }

    #[test]
    fn test_request_team_list_round_trip() {
        round_trip(NodeMessage::broadcast(
            NodeId::new("node-a"),
            NodePayload::RequestTeamList,
        ));
    }

    #[test]
    fn test_team_list_round_trip() {
        round_trip(NodeMessage::direct(
            NodeId::new("node-a"),
            NodeId::new("node-b"),
            NodePayload::TeamList {
                names: vec!["web".to_string(), "mobile".to_string()],
            },
        ));
        round_trip(NodeMessage::direct(
            NodeId::new("node-a"),
            NodeId::new("node-b"),
            NodePayload::TeamList { names: Vec::new() },
        ));
    }

    #[test]
    fn test_scrum_team_message_round_trip() {
        round_trip(NodeMessage::broadcast(
            NodeId::new("node-a"),
            NodePayload::ScrumTeamMessage {
                team: "web".to_string(),
                event: RemoteTeamEvent::MemberEstimated {
                    name: "mike".to_string(),
                    estimate: Estimate::POSITIVE_INFINITY,
                },
            },
        ));
        round_trip(NodeMessage::broadcast(
            NodeId::new("node-a"),
            NodePayload::ScrumTeamMessage {
                team: "web".to_string(),
                event: RemoteTeamEvent::MemberJoined {
                    name: "olga".to_string(),
                    observer: true,
                },
            },
        ));
        round_trip(NodeMessage::broadcast(
            NodeId::new("node-a"),
            NodePayload::ScrumTeamMessage {
                team: "web".to_string(),
                event: RemoteTeamEvent::EstimateStarted,
            },
        ));
    }

    #[test]
    fn test_initialize_team_round_trip() {
        round_trip(NodeMessage::direct(
            NodeId::new("node-a"),
            NodeId::new("node-b"),
            NodePayload::InitializeTeam {
                name: "web".to_string(),
                snapshot: Some(Bytes::from_static(b"snapshot-bytes")),
            },
        ));
        round_trip(NodeMessage::direct(
            NodeId::new("node-a"),
            NodeId::new("node-b"),
            NodePayload::InitializeTeam {
                name: "vanished".to_string(),
                snapshot: None,
            },
        ));
    }

    #[test]
    fn test_unknown_version_rejected() {
        let mut encoded = NodeMessage::broadcast(NodeId::new("a"), NodePayload::RequestTeamList)
            .encode()
            .to_vec();
        encoded[0] = 42;
        assert!(matches!(
            NodeMessage::decode(&encoded),
            Err(ReplicationError::UnsupportedVersion(42))
        ));
    }

    #[test]
    fn test_unknown_type_rejected() {
        let encoded = vec![PROTOCOL_VERSION, 200];
        assert!(NodeMessage::decode(&encoded).is_err());
    }

    #[test]
    fn test_empty_input_rejected() {
        assert!(NodeMessage::decode(&[]).is_err());
    }

    #[test]
    fn test_random_node_ids_are_unique() {
        assert_ne!(NodeId::random(), NodeId::random());
    }
}
