pub mod coordinator;
pub mod engine;
pub mod error;
pub mod link;
pub mod media;
pub mod session;
pub mod supervisor;

pub use coordinator::{
    CoordinatorEvent, CoordinatorHandle, CoordinatorSetup, NegotiationCoordinator, PeerRole,
};
pub use engine::{
    ConnectionEvent, ConnectionFactory, ConnectivityState, IceCandidate, PeerConnection,
    SdpKind, SessionDescription, SignalingState,
};
pub use engine::rtc::RtcFactory;
pub use error::{EngineError, LinkError, SessionError};
pub use link::{RelayLink, WsRelayLink};
pub use media::{LocalTrack, MediaStream};
pub use session::{
    SessionConfig, SessionController, SessionEvent, SessionHandle, SessionRole,
};
pub use supervisor::{ReconnectSupervisor, SupervisorConfig};
