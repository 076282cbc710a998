use crate::error::LinkError;
use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use lenscast_core::SignalMessage;
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tracing::{debug, warn};

/// Connection to the signaling relay. The session controller only ever sees
/// this seam, so tests can drive it with an in-memory implementation.
#[async_trait]
pub trait RelayLink: Send {
    async fn send(&mut self, msg: SignalMessage) -> Result<(), LinkError>;

    /// Next message from the relay; `None` once the link is closed.
    async fn recv(&mut self) -> Option<SignalMessage>;
}

/// WebSocket link to a lenscast relay.
pub struct WsRelayLink {
    ws: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

impl WsRelayLink {
    pub async fn connect(url: &str) -> Result<Self, LinkError> {
        let (ws, _) = connect_async(url)
            .await
            .map_err(|e| LinkError::Transport(e.to_string()))?;
        debug!(%url, "relay link connected");
        Ok(Self { ws })
    }
}

#[async_trait]
impl RelayLink for WsRelayLink {
    async fn send(&mut self, msg: SignalMessage) -> Result<(), LinkError> {
        let json = serde_json::to_string(&msg).map_err(|e| LinkError::Transport(e.to_string()))?;
        self.ws
            .send(Message::Text(json))
            .await
            .map_err(|e| LinkError::Transport(e.to_string()))
    }

    async fn recv(&mut self) -> Option<SignalMessage> {
        while let Some(msg) = self.ws.next().await {
            match msg {
                Ok(Message::Text(text)) => match serde_json::from_str(&text) {
                    Ok(signal) => return Some(signal),
                    Err(e) => warn!("invalid signal message from relay: {e}"),
                },
                Ok(Message::Close(_)) => return None,
                Ok(_) => {}
                Err(e) => {
                    debug!("relay link error: {e}");
                    return None;
                }
            }
        }
        None
    }
}
