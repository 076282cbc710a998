pub mod admin;
pub mod registry;
pub mod relay;

pub use admin::{execute_command, run_console};
pub use registry::{ClearReport, RoomRegistry};
pub use relay::{AppState, RelayService, RelaySink, ws_handler};
