pub mod rtc;

use crate::error::EngineError;
use crate::media::LocalTrack;
use async_trait::async_trait;
use lenscast_core::{IceServerConfig, StreamId};
use std::fmt;
use std::sync::Arc;
use tokio::sync::mpsc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SdpKind {
    Offer,
    Answer,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SessionDescription {
    pub kind: SdpKind,
    pub sdp: String,
}

impl SessionDescription {
    pub fn offer(sdp: impl Into<String>) -> Self {
        Self {
            kind: SdpKind::Offer,
            sdp: sdp.into(),
        }
    }

    pub fn answer(sdp: impl Into<String>) -> Self {
        Self {
            kind: SdpKind::Answer,
            sdp: sdp.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct IceCandidate {
    pub candidate: String,
    pub sdp_mid: Option<String>,
    pub sdp_m_line_index: Option<u16>,
}

/// Negotiation state of a connection, as reported by the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignalingState {
    Stable,
    HaveLocalOffer,
    HaveRemoteOffer,
    Closed,
}

/// Connectivity of the underlying transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectivityState {
    New,
    Checking,
    Connected,
    Disconnected,
    Failed,
    Closed,
}

impl fmt::Display for ConnectivityState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::New => "new",
            Self::Checking => "checking",
            Self::Connected => "connected",
            Self::Disconnected => "disconnected",
            Self::Failed => "failed",
            Self::Closed => "closed",
        };
        f.write_str(s)
    }
}

/// Events pushed by the engine into the channel supplied at connection
/// creation.
#[derive(Debug, Clone)]
pub enum ConnectionEvent {
    Connectivity(ConnectivityState),
    LocalCandidate(IceCandidate),
    RemoteTrack { stream: StreamId },
}

/// The media/connection engine capability. ICE, DTLS, SRTP and congestion
/// control all live behind this seam; the negotiation coordinator only
/// drives descriptions and candidates through it.
#[async_trait]
pub trait PeerConnection: Send + Sync {
    async fn create_offer(&self) -> Result<SessionDescription, EngineError>;

    async fn create_answer(&self) -> Result<SessionDescription, EngineError>;

    async fn set_local_description(&self, desc: SessionDescription) -> Result<(), EngineError>;

    /// Fails if the current signaling state cannot accept the description.
    async fn set_remote_description(&self, desc: SessionDescription) -> Result<(), EngineError>;

    /// Requires the remote description to be set already.
    async fn add_ice_candidate(&self, candidate: IceCandidate) -> Result<(), EngineError>;

    async fn add_track(&self, track: LocalTrack) -> Result<(), EngineError>;

    fn signaling_state(&self) -> SignalingState;

    async fn close(&self);
}

#[async_trait]
pub trait ConnectionFactory: Send + Sync {
    async fn create_connection(
        &self,
        ice_servers: &[IceServerConfig],
        events: mpsc::Sender<ConnectionEvent>,
    ) -> Result<Arc<dyn PeerConnection>, EngineError>;
}
