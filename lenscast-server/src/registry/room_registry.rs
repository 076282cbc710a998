use crate::relay::RelaySink;
use dashmap::DashMap;
use lenscast_core::{MemberInfo, ParticipantId, RoomId, SignalMessage, StreamId};
use std::sync::Arc;
use tracing::{debug, info, warn};

#[derive(Debug, Default)]
struct Member {
    id: ParticipantId,
    streams: Vec<StreamId>,
}

impl Member {
    fn info(&self) -> MemberInfo {
        MemberInfo {
            participant: self.id.clone(),
            streams: self.streams.clone(),
        }
    }
}

#[derive(Debug, Default)]
struct RoomState {
    members: Vec<Member>,
}

/// Totals reported after an administrative clear.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClearReport {
    pub rooms: usize,
    pub participants: usize,
}

/// In-memory room membership plus the relay between members of a room.
///
/// Rooms exist exactly while they have members: the first join creates the
/// entry, removing the last member deletes it. Mutations on one room are
/// serialized by the map's per-entry locking; fan-out always works from a
/// snapshot taken under that lock. Operations on an unknown room are silent
/// no-ops, so late or duplicate messages after teardown are simply dropped.
pub struct RoomRegistry {
    rooms: DashMap<RoomId, RoomState>,
    membership: DashMap<ParticipantId, RoomId>,
    sink: Arc<dyn RelaySink>,
}

impl RoomRegistry {
    pub fn new(sink: Arc<dyn RelaySink>) -> Self {
        Self {
            rooms: DashMap::new(),
            membership: DashMap::new(),
            sink,
        }
    }

    /// Insert a participant into a room, creating the room if absent.
    ///
    /// Returns the members present before the join, with their announced
    /// streams, and notifies each of them with `user-connected`. A
    /// participant already in a different room is moved: the old room sees
    /// the full leave sequence first. Re-joining the current room is
    /// idempotent.
    pub async fn join(&self, room: &RoomId, participant: &ParticipantId) -> Vec<MemberInfo> {
        if let Some(prev) = self.membership.get(participant).map(|r| r.value().clone()) {
            if prev == *room {
                return self.list_members_excluding(room, participant);
            }
            info!(%participant, from = %prev, to = %room, "participant switching rooms");
            self.leave(&prev, participant).await;
        }

        let existing: Vec<MemberInfo> = {
            let mut state = self.rooms.entry(room.clone()).or_default();
            let existing = state.members.iter().map(Member::info).collect();
            state.members.push(Member {
                id: participant.clone(),
                streams: Vec::new(),
            });
            existing
        };
        self.membership.insert(participant.clone(), room.clone());
        info!(%participant, %room, others = existing.len(), "participant joined");

        for member in &existing {
            self.sink
                .deliver(
                    &member.participant,
                    SignalMessage::UserConnected {
                        participant: participant.clone(),
                    },
                )
                .await;
        }
        existing
    }

    /// Remove a participant from a room.
    ///
    /// Every stream the participant had announced is reported stopped to the
    /// remaining members, in announcement order, before the membership
    /// removal is reported; the room is deleted the moment it is empty.
    pub async fn leave(&self, room: &RoomId, participant: &ParticipantId) {
        let (removed, remaining) = {
            let Some(mut state) = self.rooms.get_mut(room) else {
                return;
            };
            let Some(pos) = state.members.iter().position(|m| &m.id == participant) else {
                return;
            };
            let removed = state.members.remove(pos);
            let remaining: Vec<ParticipantId> =
                state.members.iter().map(|m| m.id.clone()).collect();
            (removed, remaining)
        };
        self.membership
            .remove_if(participant, |_, r| r == room);
        info!(%participant, %room, "participant left");

        for stream in &removed.streams {
            for peer in &remaining {
                self.sink
                    .deliver(
                        peer,
                        SignalMessage::StreamStopped {
                            from: Some(participant.clone()),
                            stream: stream.clone(),
                        },
                    )
                    .await;
            }
        }
        for peer in &remaining {
            self.sink
                .deliver(
                    peer,
                    SignalMessage::UserDisconnected {
                        participant: participant.clone(),
                    },
                )
                .await;
        }

        if self.rooms.remove_if(room, |_, s| s.members.is_empty()).is_some() {
            info!(%room, "room emptied, deleting");
        }
    }

    /// Transport-level disconnect: leave whatever room the participant is in.
    pub async fn disconnect(&self, participant: &ParticipantId) {
        let Some(room) = self.membership.get(participant).map(|r| r.value().clone()) else {
            return;
        };
        self.leave(&room, participant).await;
    }

    /// Forward a negotiation or stream announcement to every other member of
    /// the room, stamped with the sender. The payload is never inspected.
    pub async fn relay(&self, room: &RoomId, sender: &ParticipantId, message: SignalMessage) {
        if !message.is_relayable() {
            warn!(%sender, kind = %message, "refusing to relay non-relayable message");
            return;
        }

        let recipients: Vec<ParticipantId> = {
            let Some(mut state) = self.rooms.get_mut(room) else {
                debug!(%room, kind = %message, "relay into unknown room dropped");
                return;
            };
            if let Some(member) = state.members.iter_mut().find(|m| &m.id == sender) {
                match &message {
                    SignalMessage::StreamStarted { stream, .. } => {
                        if !member.streams.contains(stream) {
                            member.streams.push(stream.clone());
                        }
                    }
                    SignalMessage::StreamStopped { stream, .. } => {
                        member.streams.retain(|s| s != stream);
                    }
                    _ => {}
                }
            } else {
                debug!(%sender, %room, "relay from non-member dropped");
                return;
            }
            state
                .members
                .iter()
                .filter(|m| &m.id != sender)
                .map(|m| m.id.clone())
                .collect()
        };

        let message = message.with_sender(sender);
        debug!(%sender, %room, kind = %message, recipients = recipients.len(), "relaying");
        for peer in &recipients {
            self.sink.deliver(peer, message.clone()).await;
        }
    }

    /// Current member list with announced streams; empty for unknown rooms.
    pub fn list_members(&self, room: &RoomId) -> Vec<MemberInfo> {
        self.rooms
            .get(room)
            .map(|state| state.members.iter().map(Member::info).collect())
            .unwrap_or_default()
    }

    fn list_members_excluding(
        &self,
        room: &RoomId,
        excluded: &ParticipantId,
    ) -> Vec<MemberInfo> {
        self.rooms
            .get(room)
            .map(|state| {
                state
                    .members
                    .iter()
                    .filter(|m| &m.id != excluded)
                    .map(Member::info)
                    .collect()
            })
            .unwrap_or_default()
    }

    /// The room a participant is currently in, if any.
    pub fn room_of(&self, participant: &ParticipantId) -> Option<RoomId> {
        self.membership.get(participant).map(|r| r.value().clone())
    }

    /// Point-in-time view of every room, for operator reports.
    pub fn snapshot(&self) -> Vec<(RoomId, Vec<MemberInfo>)> {
        self.rooms
            .iter()
            .map(|entry| {
                (
                    entry.key().clone(),
                    entry.value().members.iter().map(Member::info).collect(),
                )
            })
            .collect()
    }

    /// Forcibly disconnect every participant and empty the registry.
    pub async fn clear(&self, reason: &str) -> ClearReport {
        let snapshot = self.snapshot();
        let report = ClearReport {
            rooms: snapshot.len(),
            participants: snapshot.iter().map(|(_, members)| members.len()).sum(),
        };

        for (_, members) in &snapshot {
            for member in members {
                self.sink
                    .deliver(
                        &member.participant,
                        SignalMessage::ForceDisconnect {
                            reason: reason.to_string(),
                        },
                    )
                    .await;
            }
        }
        self.rooms.clear();
        self.membership.clear();
        for (_, members) in &snapshot {
            for member in members {
                self.sink.kick(&member.participant).await;
            }
        }
        info!(rooms = report.rooms, participants = report.participants, "registry cleared");
        report
    }
}
