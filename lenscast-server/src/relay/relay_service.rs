use crate::relay::RelaySink;
use async_trait::async_trait;
use axum::extract::ws::Message;
use dashmap::DashMap;
use lenscast_core::{ParticipantId, SignalMessage};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, error};

struct RelayInner {
    peers: DashMap<ParticipantId, mpsc::UnboundedSender<Message>>,
}

/// Tracks the outbound channel of every live WebSocket connection.
#[derive(Clone)]
pub struct RelayService {
    inner: Arc<RelayInner>,
}

impl RelayService {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(RelayInner {
                peers: DashMap::new(),
            }),
        }
    }

    pub fn add_peer(&self, participant: ParticipantId, tx: mpsc::UnboundedSender<Message>) {
        self.inner.peers.insert(participant, tx);
    }

    pub fn remove_peer(&self, participant: &ParticipantId) {
        self.inner.peers.remove(participant);
    }

    pub fn send(&self, participant: &ParticipantId, msg: SignalMessage) {
        let Some(peer) = self.inner.peers.get(participant) else {
            debug!(%participant, kind = %msg, "send to disconnected participant dropped");
            return;
        };
        match serde_json::to_string(&msg) {
            Ok(json) => {
                if peer.send(Message::Text(json.into())).is_err() {
                    debug!(%participant, "outbound channel closed");
                }
            }
            Err(e) => error!("failed to serialize signal message: {e}"),
        }
    }
}

impl Default for RelayService {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RelaySink for RelayService {
    async fn deliver(&self, to: &ParticipantId, message: SignalMessage) {
        self.send(to, message);
    }

    async fn kick(&self, to: &ParticipantId) {
        // Dropping the sender ends the connection's send task, which tears
        // down the socket.
        self.remove_peer(to);
    }
}
