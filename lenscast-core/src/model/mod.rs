mod participant;
mod room;
mod signaling;
mod stream;

pub use participant::ParticipantId;
pub use room::RoomId;
pub use signaling::{ConsoleCommand, IceServerConfig, MemberInfo, SignalMessage, UnknownCommand};
pub use stream::StreamId;
