use thiserror::Error;

/// Failures reported by the media/connection engine behind
/// [`crate::engine::PeerConnection`].
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("connection setup failed: {0}")]
    Setup(String),

    #[error("description rejected: {0}")]
    Sdp(String),

    #[error("ice candidate rejected: {0}")]
    Candidate(String),

    #[error("operation on closed connection")]
    Closed,
}

/// Failures on the WebSocket link to the signaling relay.
#[derive(Debug, Error)]
pub enum LinkError {
    #[error("relay transport: {0}")]
    Transport(String),

    #[error("relay link closed")]
    Closed,
}

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("relay link closed")]
    RelayClosed,

    #[error("local media unavailable: {0}")]
    MediaUnavailable(String),

    #[error("session terminated")]
    Terminated,

    #[error(transparent)]
    Link(#[from] LinkError),
}
