use crate::admin;
use crate::registry::RoomRegistry;
use crate::relay::RelayService;
use axum::extract::ws::{Message, WebSocket};
use axum::extract::{State, WebSocketUpgrade};
use axum::response::IntoResponse;
use futures::{SinkExt, StreamExt};
use lenscast_core::{IceServerConfig, ParticipantId, SignalMessage};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Shared state handed to the WebSocket route.
pub struct AppState {
    pub registry: Arc<RoomRegistry>,
    pub relay: RelayService,
    pub ice_servers: Vec<IceServerConfig>,
}

pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: Arc<AppState>) {
    let participant = ParticipantId::new();
    info!(%participant, "new WebSocket connection");

    let (mut sender, mut receiver) = socket.split();
    let (tx, mut rx) = mpsc::unbounded_channel();

    state.relay.add_peer(participant.clone(), tx);
    state.relay.send(
        &participant,
        SignalMessage::Welcome {
            participant: participant.clone(),
        },
    );
    if !state.ice_servers.is_empty() {
        state.relay.send(
            &participant,
            SignalMessage::IceConfig {
                ice_servers: state.ice_servers.clone(),
            },
        );
    }

    let mut send_task = tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            if sender.send(msg).await.is_err() {
                break;
            }
        }
        let _ = sender.close().await;
    });

    let mut recv_task = tokio::spawn({
        let state = state.clone();
        let participant = participant.clone();

        async move {
            while let Some(Ok(msg)) = receiver.next().await {
                match msg {
                    Message::Text(text) => match serde_json::from_str::<SignalMessage>(&text) {
                        Ok(signal) => {
                            if handle_signal(&state, &participant, signal).await.is_break() {
                                break;
                            }
                        }
                        Err(e) => warn!(%participant, "invalid signal message: {e}"),
                    },
                    Message::Close(_) => break,
                    _ => {}
                }
            }
        }
    });

    tokio::select! {
        _ = (&mut send_task) => recv_task.abort(),
        _ = (&mut recv_task) => send_task.abort(),
    };

    state.registry.disconnect(&participant).await;
    state.relay.remove_peer(&participant);
    info!(%participant, "WebSocket disconnected");
}

async fn handle_signal(
    state: &Arc<AppState>,
    participant: &ParticipantId,
    signal: SignalMessage,
) -> std::ops::ControlFlow<()> {
    use std::ops::ControlFlow;

    match signal {
        SignalMessage::JoinRoom { room } => {
            let users = state.registry.join(&room, participant).await;
            state
                .relay
                .send(participant, SignalMessage::ExistingUsers { users });
        }
        SignalMessage::ListUsers { room } => {
            let users = state.registry.list_members(&room);
            state
                .relay
                .send(participant, SignalMessage::ExistingUsers { users });
        }
        msg if msg.is_relayable() => match state.registry.room_of(participant) {
            Some(room) => state.registry.relay(&room, participant, msg).await,
            None => debug!(%participant, kind = %msg, "relay before join dropped"),
        },
        SignalMessage::ConsoleCommand { command } => {
            let report = admin::execute_command(&state.registry, command).await;
            state
                .relay
                .send(participant, SignalMessage::ConsoleResponse { report });
        }
        SignalMessage::ForceDisconnect { reason } => {
            info!(%participant, %reason, "client requested disconnect");
            return ControlFlow::Break(());
        }
        other => warn!(%participant, kind = %other, "unexpected message from client"),
    }
    ControlFlow::Continue(())
}
