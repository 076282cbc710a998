pub use lenscast_core::model::ParticipantId;

pub mod model {
    pub use lenscast_core::model::*;
}

#[cfg(feature = "server")]
pub mod server {
    pub use lenscast_server::*;
}

#[cfg(feature = "client")]
pub mod client {
    pub use lenscast_client::*;
}
