//! Versioned binary codec for team snapshots.
//!
//! Snapshots cross node boundaries, so the encoding is explicit and
//! version-tagged rather than delegated to a generic serializer: a leading
//! version byte, length-prefixed UTF-8 strings, `u32` counts, and IEEE
//! bits for estimate values (infinity travels unharmed). Unknown versions
//! and truncated input are decode errors, never panics.

use std::sync::Arc;

use bytes::{Buf, BufMut, Bytes, BytesMut};

use poker_domain::{
    Estimate, EstimateParticipantStatus, EstimateResult, Message, MessageBody, ParticipantRole,
    ParticipantSnapshot, TeamSnapshot, TeamState,
};

use crate::{ReplicationError, Result};

/// Version byte leading every encoded snapshot.
pub const SNAPSHOT_VERSION: u8 = 1;

// ==================== Primitives ====================

pub(crate) fn put_string(buf: &mut BytesMut, s: &str) {
    let bytes = s.as_bytes();
    buf.put_u16(bytes.len() as u16);
    buf.put_slice(bytes);
}

pub(crate) fn get_string(buf: &mut &[u8]) -> Result<String> {
    if buf.remaining() < 2 {
        return Err(ReplicationError::InvalidMessage(
            "truncated string length".into(),
        ));
    }
    let len = buf.get_u16() as usize;
    if buf.remaining() < len {
        return Err(ReplicationError::InvalidMessage("truncated string".into()));
    }
    let s = String::from_utf8(buf[..len].to_vec())
        .map_err(|e| ReplicationError::InvalidMessage(format!("invalid utf-8: {}", e)))?;
    buf.advance(len);
    Ok(s)
}

pub(crate) fn put_bool(buf: &mut BytesMut, value: bool) {
    buf.put_u8(u8::from(value));
}

pub(crate) fn get_bool(buf: &mut &[u8]) -> Result<bool> {
    match get_u8(buf)? {
        0 => Ok(false),
        1 => Ok(true),
        b => Err(ReplicationError::InvalidMessage(format!(
            "invalid bool: {}",
            b
        ))),
    }
}

pub(crate) fn get_u8(buf: &mut &[u8]) -> Result<u8> {
    if buf.remaining() < 1 {
        return Err(ReplicationError::InvalidMessage("truncated byte".into()));
    }
    Ok(buf.get_u8())
}

fn get_u32(buf: &mut &[u8]) -> Result<u32> {
    if buf.remaining() < 4 {
        return Err(ReplicationError::InvalidMessage("truncated count".into()));
    }
    Ok(buf.get_u32())
}

fn get_u64(buf: &mut &[u8]) -> Result<u64> {
    if buf.remaining() < 8 {
        return Err(ReplicationError::InvalidMessage("truncated u64".into()));
    }
    Ok(buf.get_u64())
}

fn get_i64(buf: &mut &[u8]) -> Result<i64> {
    if buf.remaining() < 8 {
        return Err(ReplicationError::InvalidMessage("truncated i64".into()));
    }
    Ok(buf.get_i64())
}

/// A card that was actually played: the no-estimate card or a numeric
/// value (IEEE bits, so infinity round-trips).
pub(crate) fn put_card(buf: &mut BytesMut, estimate: Estimate) {
    match estimate.value() {
        None => buf.put_u8(0),
        Some(v) => {
            buf.put_u8(1);
            buf.put_u64(v.to_bits());
        }
    }
}

pub(crate) fn get_card(buf: &mut &[u8]) -> Result<Estimate> {
    match get_u8(buf)? {
        0 => Ok(Estimate::NO_ESTIMATE),
        1 => Ok(Estimate::new(f64::from_bits(get_u64(buf)?))),
        t => Err(ReplicationError::InvalidMessage(format!(
            "invalid estimate tag: {}",
            t
        ))),
    }
}

/// A vote slot: not voted yet, or a played card.
fn put_card_slot(buf: &mut BytesMut, slot: Option<Estimate>) {
    match slot {
        None => buf.put_u8(0),
        Some(estimate) => {
            buf.put_u8(1);
            put_card(buf, estimate);
        }
    }
}

fn get_card_slot(buf: &mut &[u8]) -> Result<Option<Estimate>> {
    match get_u8(buf)? {
        0 => Ok(None),
        1 => Ok(Some(get_card(buf)?)),
        t => Err(ReplicationError::InvalidMessage(format!(
            "invalid vote slot tag: {}",
            t
        ))),
    }
}

// ==================== Composite values ====================

fn put_result_items(buf: &mut BytesMut, items: &[(String, Option<Estimate>)]) {
    buf.put_u32(items.len() as u32);
    for (name, estimate) in items {
        put_string(buf, name);
        put_card_slot(buf, *estimate);
    }
}

fn get_result_items(buf: &mut &[u8]) -> Result<Vec<(String, Option<Estimate>)>> {
    let count = get_u32(buf)? as usize;
    let mut items = Vec::with_capacity(count);
    for _ in 0..count {
        let name = get_string(buf)?;
        let estimate = get_card_slot(buf)?;
        items.push((name, estimate));
    }
    Ok(items)
}

fn put_message(buf: &mut BytesMut, message: &Message) {
    buf.put_i64(message.id);
    match &message.body {
        MessageBody::Empty => buf.put_u8(0),
        MessageBody::MemberJoined { name, observer } => {
            buf.put_u8(1);
            put_string(buf, name);
            put_bool(buf, *observer);
        }
        MessageBody::MemberDisconnected { name, observer } => {
            buf.put_u8(2);
            put_string(buf, name);
            put_bool(buf, *observer);
        }
        MessageBody::EstimateStarted => buf.put_u8(3),
        MessageBody::EstimateEnded(result) => {
            buf.put_u8(4);
            let items: Vec<_> = result
                .iter()
                .map(|(n, e)| (n.to_string(), e))
                .collect();
            put_result_items(buf, &items);
        }
        MessageBody::EstimateCanceled => buf.put_u8(5),
        MessageBody::MemberEstimated { name, estimate } => {
            buf.put_u8(6);
            put_string(buf, name);
            put_card(buf, *estimate);
        }
        MessageBody::MemberActivity { name } => {
            buf.put_u8(7);
            put_string(buf, name);
        }
    }
}

fn get_message(buf: &mut &[u8]) -> Result<Message> {
    let id = get_i64(buf)?;
    let body = match get_u8(buf)? {
        0 => MessageBody::Empty,
        1 => MessageBody::MemberJoined {
            name: get_string(buf)?,
            observer: get_bool(buf)?,
        },
        2 => MessageBody::MemberDisconnected {
            name: get_string(buf)?,
            observer: get_bool(buf)?,
        },
        3 => MessageBody::EstimateStarted,
        4 => {
            let items = get_result_items(buf)?;
            let result = EstimateResult::from_items(items, true)
                .map_err(|e| ReplicationError::InvalidMessage(e.to_string()))?;
            MessageBody::EstimateEnded(Arc::new(result))
        }
        5 => MessageBody::EstimateCanceled,
        6 => MessageBody::MemberEstimated {
            name: get_string(buf)?,
            estimate: get_card(buf)?,
        },
        7 => MessageBody::MemberActivity {
            name: get_string(buf)?,
        },
        t => {
            return Err(ReplicationError::InvalidMessage(format!(
                "invalid message body tag: {}",
                t
            )))
        }
    };
    Ok(Message::new(id, body))
}

fn put_role(buf: &mut BytesMut, role: ParticipantRole) {
    buf.put_u8(match role {
        ParticipantRole::Observer => 0,
        ParticipantRole::Member => 1,
        ParticipantRole::ScrumMaster => 2,
    });
}

fn get_role(buf: &mut &[u8]) -> Result<ParticipantRole> {
    match get_u8(buf)? {
        0 => Ok(ParticipantRole::Observer),
        1 => Ok(ParticipantRole::Member),
        2 => Ok(ParticipantRole::ScrumMaster),
        b => Err(ReplicationError::InvalidMessage(format!(
            "invalid role: {}",
            b
        ))),
    }
}

fn put_state(buf: &mut BytesMut, state: TeamState) {
    buf.put_u8(match state {
        TeamState::Initial => 0,
        TeamState::EstimateInProgress => 1,
        TeamState::EstimateFinished => 2,
        TeamState::EstimateCanceled => 3,
    });
}

fn get_state(buf: &mut &[u8]) -> Result<TeamState> {
    match get_u8(buf)? {
        0 => Ok(TeamState::Initial),
        1 => Ok(TeamState::EstimateInProgress),
        2 => Ok(TeamState::EstimateFinished),
        3 => Ok(TeamState::EstimateCanceled),
        b => Err(ReplicationError::InvalidMessage(format!(
            "invalid team state: {}",
            b
        ))),
    }
}

// ==================== Whole-team snapshots ====================

/// Encodes a full team snapshot, mailbox backlogs included.
pub fn encode_team(snapshot: &TeamSnapshot) -> Bytes {
    let mut buf = BytesMut::new();
    buf.put_u8(SNAPSHOT_VERSION);
    put_string(&mut buf, &snapshot.name);
    put_state(&mut buf, snapshot.state);
    buf.put_i64(snapshot.last_message_id);

    buf.put_u32(snapshot.participants.len() as u32);
    for participant in &snapshot.participants {
        put_string(&mut buf, &participant.name);
        put_role(&mut buf, participant.role);
        buf.put_u64(participant.last_activity);
        put_card_slot(&mut buf, participant.estimate);
        buf.put_u32(participant.mailbox.len() as u32);
        for message in &participant.mailbox {
            put_message(&mut buf, message);
        }
    }

    match &snapshot.estimate_result {
        None => buf.put_u8(0),
        Some(items) => {
            buf.put_u8(1);
            put_result_items(&mut buf, items);
        }
    }
    match &snapshot.estimate_participants {
        None => buf.put_u8(0),
        Some(statuses) => {
            buf.put_u8(1);
            buf.put_u32(statuses.len() as u32);
            for status in statuses {
                put_string(&mut buf, &status.member_name);
                put_bool(&mut buf, status.estimated);
            }
        }
    }

    buf.freeze()
}

/// Decodes a full team snapshot.
///
/// # Errors
///
/// Fails on an unknown version byte, truncated input, or any invalid tag.
pub fn decode_team(data: &[u8]) -> Result<TeamSnapshot> {
    let mut buf = data;
    let version = get_u8(&mut buf)?;
    if version != SNAPSHOT_VERSION {
        return Err(ReplicationError::UnsupportedVersion(version));
    }

    let name = get_string(&mut buf)?;
    let state = get_state(&mut buf)?;
    let last_message_id = get_i64(&mut buf)?;

    let participant_count = get_u32(&mut buf)? as usize;
    let mut participants = Vec::with_capacity(participant_count);
    for _ in 0..participant_count {
        let name = get_string(&mut buf)?;
        let role = get_role(&mut buf)?;
        let last_activity = get_u64(&mut buf)?;
        let estimate = get_card_slot(&mut buf)?;
        let mailbox_len = get_u32(&mut buf)? as usize;
        let mut mailbox = Vec::with_capacity(mailbox_len);
        for _ in 0..mailbox_len {
            mailbox.push(get_message(&mut buf)?);
        }
        participants.push(ParticipantSnapshot {
            name,
            role,
            last_activity,
            estimate,
            mailbox,
        });
    }

    let estimate_result = match get_u8(&mut buf)? {
        0 => None,
        1 => Some(get_result_items(&mut buf)?),
        t => {
            return Err(ReplicationError::InvalidMessage(format!(
                "invalid result tag: {}",
                t
            )))
        }
    };
    let estimate_participants = match get_u8(&mut buf)? {
        0 => None,
        1 => {
            let count = get_u32(&mut buf)? as usize;
            let mut statuses = Vec::with_capacity(count);
            for _ in 0..count {
                let member_name = get_string(&mut buf)?;
                let estimated = get_bool(&mut buf)?;
                statuses.push(EstimateParticipantStatus {
                    member_name,
                    estimated,
                });
            }
            Some(statuses)
        }
        t => {
            return Err(ReplicationError::InvalidMessage(format!(
                "invalid statuses tag: {}",
                t
            )))
        }
    };

    Ok(TeamSnapshot {
        name,
        state,
        last_message_id,
        participants,
        estimate_result,
        estimate_participants,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use poker_domain::{ManualClock, ScrumTeam};

    fn busy_team_snapshot() -> TeamSnapshot {
        let clock = Arc::new(ManualClock::new(1_000));
        let mut team = ScrumTeam::new("web", clock).unwrap();
        team.set_scrum_master("Mary").unwrap();
        team.join("mike", false).unwrap();
        team.join("olga", true).unwrap();
        team.start_estimate().unwrap();
        team.set_estimate("mike", Estimate::POSITIVE_INFINITY)
            .unwrap();
        team.snapshot()
    }

    #[test]
    fn test_snapshot_round_trip() {
        let snapshot = busy_team_snapshot();
        let encoded = encode_team(&snapshot);
        let decoded = decode_team(&encoded).unwrap();
        assert_eq!(decoded, snapshot);
    }

    #[test]
    fn test_round_trip_revives_a_working_team() {
        let snapshot = busy_team_snapshot();
        let decoded = decode_team(&encode_team(&snapshot)).unwrap();

        let clock = Arc::new(ManualClock::new(2_000));
        let mut team = ScrumTeam::from_snapshot(decoded, clock).unwrap();
        // the revived replica can finish the in-flight round
        let events = team.set_estimate("Mary", Estimate::new(8.0)).unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(
            team.estimate_result().unwrap().get("mike"),
            Some(Some(Estimate::POSITIVE_INFINITY))
        );
    }

    #[test]
    fn test_finished_round_round_trip() {
        let clock = Arc::new(ManualClock::new(0));
        let mut team = ScrumTeam::new("web", clock).unwrap();
        team.set_scrum_master("Mary").unwrap();
        team.start_estimate().unwrap();
        team.set_estimate("Mary", Estimate::new(3.0)).unwrap();

        let snapshot = team.snapshot();
        let decoded = decode_team(&encode_team(&snapshot)).unwrap();
        assert_eq!(decoded, snapshot);
        // the finished result inside the mailboxes survived
        let ended = decoded.participants[0]
            .mailbox
            .iter()
            .find(|m| matches!(m.body, MessageBody::EstimateEnded(_)))
            .unwrap();
        match &ended.body {
            MessageBody::EstimateEnded(result) => {
                assert!(result.is_read_only());
                assert_eq!(result.get("Mary"), Some(Some(Estimate::new(3.0))));
            }
            _ => unreachable!(),
        }
    }

    #[test]
    fn test_unknown_version_rejected() {
        let snapshot = busy_team_snapshot();
        let mut encoded = encode_team(&snapshot).to_vec();
        encoded[0] = 99;
        assert!(matches!(
            decode_team(&encoded),
            Err(ReplicationError::UnsupportedVersion(99))
        ));
    }

    #[test]
    fn test_truncated_input_rejected() {
        let snapshot = busy_team_snapshot();
        let encoded = encode_team(&snapshot);
        for cut in [0, 1, 5, encoded.len() / 2, encoded.len() - 1] {
            assert!(
                decode_team(&encoded[..cut]).is_err(),
                "cut at {} must fail",
                cut
            );
        }
    }

    #[test]
    fn test_garbage_rejected() {
        assert!(decode_team(&[]).is_err());
        assert!(decode_team(&[SNAPSHOT_VERSION, 0xff, 0xff]).is_err());
    }
}
