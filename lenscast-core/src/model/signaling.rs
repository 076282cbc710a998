use crate::model::participant::ParticipantId;
use crate::model::room::RoomId;
use crate::model::stream::StreamId;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct IceServerConfig {
    pub urls: Vec<String>,
    pub username: Option<String>,
    pub credential: Option<String>,
}

impl IceServerConfig {
    pub fn stun(url: impl Into<String>) -> Self {
        Self {
            urls: vec![url.into()],
            username: None,
            credential: None,
        }
    }

    pub fn turn(
        url: impl Into<String>,
        username: impl Into<String>,
        credential: impl Into<String>,
    ) -> Self {
        Self {
            urls: vec![url.into()],
            username: Some(username.into()),
            credential: Some(credential.into()),
        }
    }
}

/// One room member as reported by `existing-users` / `list-users`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MemberInfo {
    pub participant: ParticipantId,
    pub streams: Vec<StreamId>,
}

/// Operator command, accepted over the wire (`console-command`) and on the
/// server's stdin console.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum ConsoleCommand {
    People,
    Clear,
}

impl FromStr for ConsoleCommand {
    type Err = UnknownCommand;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "people" => Ok(Self::People),
            "clear" => Ok(Self::Clear),
            other => Err(UnknownCommand(other.to_string())),
        }
    }
}

#[derive(Debug, thiserror::Error)]
#[error("unknown console command: {0}")]
pub struct UnknownCommand(pub String);

/// The signaling wire catalogue. One tagged union for both directions; the
/// relay stamps `from` on relayed messages and otherwise treats SDP and
/// candidate payloads as opaque strings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum SignalMessage {
    /// Client asks to enter a room, creating it if absent.
    JoinRoom { room: RoomId },
    /// Relay assigns the connection its participant identifier.
    Welcome { participant: ParticipantId },
    /// STUN/TURN endpoints the relay wants clients to use.
    IceConfig { ice_servers: Vec<IceServerConfig> },
    /// A new participant entered the sender's room.
    UserConnected { participant: ParticipantId },
    /// Membership snapshot, sent on join and in reply to `list-users`.
    ExistingUsers { users: Vec<MemberInfo> },
    /// Diagnostic request for the membership of an arbitrary room.
    ListUsers { room: RoomId },
    Offer {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        from: Option<ParticipantId>,
        sdp: String,
    },
    Answer {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        from: Option<ParticipantId>,
        sdp: String,
    },
    IceCandidate {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        from: Option<ParticipantId>,
        candidate: String,
        sdp_mid: Option<String>,
        sdp_m_line_index: Option<u16>,
    },
    StreamStarted {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        from: Option<ParticipantId>,
        stream: StreamId,
    },
    StreamStopped {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        from: Option<ParticipantId>,
        stream: StreamId,
    },
    /// A participant left the sender's room.
    UserDisconnected { participant: ParticipantId },
    /// Server-initiated teardown, or a client asking to be dropped.
    ForceDisconnect { reason: String },
    ConsoleCommand { command: ConsoleCommand },
    ConsoleResponse { report: String },
}

impl SignalMessage {
    /// Whether the relay forwards this message to the other room members.
    pub fn is_relayable(&self) -> bool {
        matches!(
            self,
            Self::Offer { .. }
                | Self::Answer { .. }
                | Self::IceCandidate { .. }
                | Self::StreamStarted { .. }
                | Self::StreamStopped { .. }
        )
    }

    /// Stamp the sender onto a relayable message before fan-out.
    pub fn with_sender(mut self, sender: &ParticipantId) -> Self {
        match &mut self {
            Self::Offer { from, .. }
            | Self::Answer { from, .. }
            | Self::IceCandidate { from, .. }
            | Self::StreamStarted { from, .. }
            | Self::StreamStopped { from, .. } => *from = Some(sender.clone()),
            _ => {}
        }
        self
    }

    /// The stamped sender of a relayed message, if any.
    pub fn sender(&self) -> Option<&ParticipantId> {
        match self {
            Self::Offer { from, .. }
            | Self::Answer { from, .. }
            | Self::IceCandidate { from, .. }
            | Self::StreamStarted { from, .. }
            | Self::StreamStopped { from, .. } => from.as_ref(),
            _ => None,
        }
    }
}

impl fmt::Display for SignalMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::JoinRoom { .. } => "join-room",
            Self::Welcome { .. } => "welcome",
            Self::IceConfig { .. } => "ice-config",
            Self::UserConnected { .. } => "user-connected",
            Self::ExistingUsers { .. } => "existing-users",
            Self::ListUsers { .. } => "list-users",
            Self::Offer { .. } => "offer",
            Self::Answer { .. } => "answer",
            Self::IceCandidate { .. } => "ice-candidate",
            Self::StreamStarted { .. } => "stream-started",
            Self::StreamStopped { .. } => "stream-stopped",
            Self::UserDisconnected { .. } => "user-disconnected",
            Self::ForceDisconnect { .. } => "force-disconnect",
            Self::ConsoleCommand { .. } => "console-command",
            Self::ConsoleResponse { .. } => "console-response",
        };
        f.write_str(name)
    }
}
