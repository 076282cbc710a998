use crate::engine::{
    ConnectionEvent, ConnectionFactory, ConnectivityState, IceCandidate, PeerConnection,
    SdpKind, SessionDescription, SignalingState,
};
use crate::error::EngineError;
use crate::media::LocalTrack;
use async_trait::async_trait;
use lenscast_core::{IceServerConfig, StreamId};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::debug;
use webrtc::api::APIBuilder;
use webrtc::api::interceptor_registry::register_default_interceptors;
use webrtc::api::media_engine::MediaEngine;
use webrtc::ice_transport::ice_candidate::RTCIceCandidate;
use webrtc::ice_transport::ice_candidate::RTCIceCandidateInit;
use webrtc::ice_transport::ice_connection_state::RTCIceConnectionState;
use webrtc::ice_transport::ice_server::RTCIceServer;
use webrtc::interceptor::registry::Registry;
use webrtc::peer_connection::RTCPeerConnection;
use webrtc::peer_connection::configuration::RTCConfiguration;
use webrtc::peer_connection::sdp::session_description::RTCSessionDescription;
use webrtc::peer_connection::signaling_state::RTCSignalingState;

/// Production [`ConnectionFactory`] backed by the `webrtc` crate.
pub struct RtcFactory;

impl RtcFactory {
    pub fn new() -> Self {
        Self
    }
}

impl Default for RtcFactory {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ConnectionFactory for RtcFactory {
    async fn create_connection(
        &self,
        ice_servers: &[IceServerConfig],
        events: mpsc::Sender<ConnectionEvent>,
    ) -> Result<Arc<dyn PeerConnection>, EngineError> {
        let mut media_engine = MediaEngine::default();
        media_engine
            .register_default_codecs()
            .map_err(|e| EngineError::Setup(e.to_string()))?;
        let registry = register_default_interceptors(Registry::new(), &mut media_engine)
            .map_err(|e| EngineError::Setup(e.to_string()))?;

        let api = APIBuilder::new()
            .with_media_engine(media_engine)
            .with_interceptor_registry(registry)
            .build();

        let config = RTCConfiguration {
            ice_servers: ice_servers
                .iter()
                .map(|s| RTCIceServer {
                    urls: s.urls.clone(),
                    username: s.username.clone().unwrap_or_default(),
                    credential: s.credential.clone().unwrap_or_default(),
                })
                .collect(),
            ..Default::default()
        };

        let pc = Arc::new(
            api.new_peer_connection(config)
                .await
                .map_err(|e| EngineError::Setup(e.to_string()))?,
        );

        let state_tx = events.clone();
        pc.on_ice_connection_state_change(Box::new(move |state: RTCIceConnectionState| {
            let tx = state_tx.clone();
            Box::pin(async move {
                let _ = tx
                    .send(ConnectionEvent::Connectivity(map_connectivity(state)))
                    .await;
            })
        }));

        let candidate_tx = events.clone();
        pc.on_ice_candidate(Box::new(move |candidate: Option<RTCIceCandidate>| {
            let tx = candidate_tx.clone();
            Box::pin(async move {
                let Some(candidate) = candidate else { return };
                let Ok(init) = candidate.to_json() else {
                    return;
                };
                let _ = tx
                    .send(ConnectionEvent::LocalCandidate(IceCandidate {
                        candidate: init.candidate,
                        sdp_mid: init.sdp_mid,
                        sdp_m_line_index: init.sdp_mline_index,
                    }))
                    .await;
            })
        }));

        let track_tx = events;
        pc.on_track(Box::new(move |track, _receiver, _transceiver| {
            let tx = track_tx.clone();
            let stream = StreamId::from(track.stream_id());
            Box::pin(async move {
                debug!(%stream, "remote track arrived");
                let _ = tx.send(ConnectionEvent::RemoteTrack { stream }).await;
            })
        }));

        Ok(Arc::new(RtcConnection { pc }))
    }
}

pub struct RtcConnection {
    pc: Arc<RTCPeerConnection>,
}

fn map_connectivity(state: RTCIceConnectionState) -> ConnectivityState {
    match state {
        RTCIceConnectionState::New | RTCIceConnectionState::Unspecified => ConnectivityState::New,
        RTCIceConnectionState::Checking => ConnectivityState::Checking,
        RTCIceConnectionState::Connected | RTCIceConnectionState::Completed => {
            ConnectivityState::Connected
        }
        RTCIceConnectionState::Disconnected => ConnectivityState::Disconnected,
        RTCIceConnectionState::Failed => ConnectivityState::Failed,
        RTCIceConnectionState::Closed => ConnectivityState::Closed,
    }
}

fn to_rtc_description(desc: SessionDescription) -> Result<RTCSessionDescription, EngineError> {
    let result = match desc.kind {
        SdpKind::Offer => RTCSessionDescription::offer(desc.sdp),
        SdpKind::Answer => RTCSessionDescription::answer(desc.sdp),
    };
    result.map_err(|e| EngineError::Sdp(e.to_string()))
}

#[async_trait]
impl PeerConnection for RtcConnection {
    async fn create_offer(&self) -> Result<SessionDescription, EngineError> {
        let offer = self
            .pc
            .create_offer(None)
            .await
            .map_err(|e| EngineError::Sdp(e.to_string()))?;
        Ok(SessionDescription::offer(offer.sdp))
    }

    async fn create_answer(&self) -> Result<SessionDescription, EngineError> {
        let answer = self
            .pc
            .create_answer(None)
            .await
            .map_err(|e| EngineError::Sdp(e.to_string()))?;
        Ok(SessionDescription::answer(answer.sdp))
    }

    async fn set_local_description(&self, desc: SessionDescription) -> Result<(), EngineError> {
        self.pc
            .set_local_description(to_rtc_description(desc)?)
            .await
            .map_err(|e| EngineError::Sdp(e.to_string()))
    }

    async fn set_remote_description(&self, desc: SessionDescription) -> Result<(), EngineError> {
        self.pc
            .set_remote_description(to_rtc_description(desc)?)
            .await
            .map_err(|e| EngineError::Sdp(e.to_string()))
    }

    async fn add_ice_candidate(&self, candidate: IceCandidate) -> Result<(), EngineError> {
        self.pc
            .add_ice_candidate(RTCIceCandidateInit {
                candidate: candidate.candidate,
                sdp_mid: candidate.sdp_mid,
                sdp_mline_index: candidate.sdp_m_line_index,
                username_fragment: None,
            })
            .await
            .map_err(|e| EngineError::Candidate(e.to_string()))
    }

    async fn add_track(&self, track: LocalTrack) -> Result<(), EngineError> {
        self.pc
            .add_track(track)
            .await
            .map(|_| ())
            .map_err(|e| EngineError::Setup(e.to_string()))
    }

    fn signaling_state(&self) -> SignalingState {
        match self.pc.signaling_state() {
            RTCSignalingState::Stable => SignalingState::Stable,
            RTCSignalingState::HaveLocalOffer | RTCSignalingState::HaveLocalPranswer => {
                SignalingState::HaveLocalOffer
            }
            RTCSignalingState::HaveRemoteOffer | RTCSignalingState::HaveRemotePranswer => {
                SignalingState::HaveRemoteOffer
            }
            RTCSignalingState::Closed | RTCSignalingState::Unspecified => SignalingState::Closed,
        }
    }

    async fn close(&self) {
        let _ = self.pc.close().await;
    }
}
