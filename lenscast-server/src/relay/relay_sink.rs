use async_trait::async_trait;
use lenscast_core::{ParticipantId, SignalMessage};

/// Outbound side of the relay, implemented by the WebSocket layer so the
/// registry can notify participants without knowing about transports.
#[async_trait]
pub trait RelaySink: Send + Sync {
    /// Deliver a message to one connected participant. Delivery to a
    /// participant that is no longer connected is a silent no-op.
    async fn deliver(&self, to: &ParticipantId, message: SignalMessage);

    /// Drop the participant's transport connection.
    async fn kick(&self, to: &ParticipantId);
}
