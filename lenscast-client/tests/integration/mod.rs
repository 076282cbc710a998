//! Integration tests for lenscast-client.
//!
//! Organized by functionality:
//! - `coordinator_tests` - the offer/answer/ICE state machine
//! - `supervisor_tests` - reconnect timing (paused clock)
//! - `session_tests` - controller fan-out over a fake relay link

pub mod coordinator_tests;

use std::time::Duration;
use tokio::sync::mpsc;
use tracing::Level;

use lenscast_client::{
    CoordinatorEvent, CoordinatorHandle, CoordinatorSetup, NegotiationCoordinator, PeerRole,
    SupervisorConfig,
};
use lenscast_core::SignalMessage;

use crate::utils::FakeFactory;

/// Initialize tracing for tests (call once per test).
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_max_level(Level::DEBUG)
        .with_test_writer()
        .try_init();
}

/// Give spawned coordinator steps a chance to run to completion.
pub async fn settle() {
    for _ in 0..100 {
        tokio::task::yield_now().await;
    }
}

/// Next outbound signal, failing the test after a real-time timeout.
pub async fn next_signal(rx: &mut mpsc::UnboundedReceiver<SignalMessage>) -> SignalMessage {
    tokio::time::timeout(Duration::from_secs(2), rx.recv())
        .await
        .expect("timed out waiting for a signal")
        .expect("signal channel closed")
}

pub struct CoordinatorFixture {
    pub factory: FakeFactory,
    pub handle: CoordinatorHandle,
    pub signals: mpsc::UnboundedReceiver<SignalMessage>,
    pub events: mpsc::UnboundedReceiver<CoordinatorEvent>,
}

/// Coordinator wired to a fake engine, no media attached.
pub fn spawn_coordinator(role: PeerRole) -> CoordinatorFixture {
    spawn_coordinator_with(role, FakeFactory::new())
}

pub fn spawn_coordinator_with(role: PeerRole, factory: FakeFactory) -> CoordinatorFixture {
    let (signal_tx, signals) = mpsc::unbounded_channel();
    let (event_tx, events) = mpsc::unbounded_channel();
    let handle = NegotiationCoordinator::spawn(CoordinatorSetup {
        remote: lenscast_core::ParticipantId::new(),
        role,
        factory: std::sync::Arc::new(factory.clone()),
        ice_servers: Vec::new(),
        media: None,
        supervisor: SupervisorConfig::default(),
        signals: signal_tx,
        events: event_tx,
    });
    CoordinatorFixture {
        factory,
        handle,
        signals,
        events,
    }
}
