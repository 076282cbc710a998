use crate::coordinator::{
    CoordinatorEvent, CoordinatorHandle, CoordinatorSetup, NegotiationCoordinator, PeerRole,
};
use crate::engine::{ConnectionFactory, ConnectivityState, IceCandidate};
use crate::error::SessionError;
use crate::link::RelayLink;
use crate::media::MediaStream;
use crate::supervisor::SupervisorConfig;
use lenscast_core::{
    ConsoleCommand, IceServerConfig, MemberInfo, ParticipantId, RoomId, SignalMessage, StreamId,
};
use std::collections::HashMap;
use std::ops::ControlFlow;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Room to join as a viewer; absent means this participant is the host
    /// and mints a room when it shares.
    pub room: Option<RoomId>,
    /// STUN/TURN endpoints. When empty, the relay-provided `ice-config` is
    /// used instead.
    pub ice_servers: Vec<IceServerConfig>,
    pub supervisor: SupervisorConfig,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            room: None,
            ice_servers: Vec::new(),
            supervisor: SupervisorConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionRole {
    Host,
    Viewer,
}

/// What the session surfaces to the embedding application.
#[derive(Debug, Clone)]
pub enum SessionEvent {
    Welcome { participant: ParticipantId },
    Members { users: Vec<MemberInfo> },
    PeerJoined { participant: ParticipantId },
    PeerLeft { participant: ParticipantId },
    PeerConnectivity {
        participant: ParticipantId,
        state: ConnectivityState,
    },
    RemoteTrack { from: ParticipantId, stream: StreamId },
    RemoteStreamStarted { from: ParticipantId, stream: StreamId },
    RemoteStreamStopped { from: ParticipantId, stream: StreamId },
    ForceDisconnected { reason: String },
    ConsoleReport { report: String },
    RelayClosed,
}

enum Command {
    Share {
        media: MediaStream,
        reply: oneshot::Sender<RoomId>,
    },
    StopMedia,
    ListUsers { room: RoomId },
    Console { command: ConsoleCommand },
    Shutdown,
}

/// Handle for driving a running session.
#[derive(Clone)]
pub struct SessionHandle {
    tx: mpsc::UnboundedSender<Command>,
}

impl SessionHandle {
    /// Publish the local capture. Host only; mints and returns the room
    /// identifier on first share.
    pub async fn share(&self, media: MediaStream) -> Result<RoomId, SessionError> {
        if media.is_empty() {
            return Err(SessionError::MediaUnavailable(
                "capture produced no tracks".into(),
            ));
        }
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(Command::Share { media, reply })
            .map_err(|_| SessionError::Terminated)?;
        rx.await.map_err(|_| SessionError::Terminated)
    }

    /// Stop publishing; tears down outgoing tracks on every connection.
    pub fn stop_media(&self) {
        let _ = self.tx.send(Command::StopMedia);
    }

    pub fn list_users(&self, room: RoomId) {
        let _ = self.tx.send(Command::ListUsers { room });
    }

    pub fn console(&self, command: ConsoleCommand) {
        let _ = self.tx.send(Command::Console { command });
    }

    pub fn shutdown(&self) {
        let _ = self.tx.send(Command::Shutdown);
    }
}

/// Top-level orchestration: one session per relay connection, one
/// coordinator per remote participant.
pub struct SessionController<L: RelayLink> {
    link: L,
    commands: mpsc::UnboundedReceiver<Command>,
    signal_rx: mpsc::UnboundedReceiver<SignalMessage>,
    coord_rx: mpsc::UnboundedReceiver<CoordinatorEvent>,
    state: SessionState,
}

struct SessionState {
    role: SessionRole,
    room: Option<RoomId>,
    local: Option<ParticipantId>,
    media: Option<MediaStream>,
    ice_servers: Vec<IceServerConfig>,
    supervisor: SupervisorConfig,
    factory: Arc<dyn ConnectionFactory>,
    coordinators: HashMap<ParticipantId, CoordinatorHandle>,
    awaiting_roster: bool,
    signal_tx: mpsc::UnboundedSender<SignalMessage>,
    coord_tx: mpsc::UnboundedSender<CoordinatorEvent>,
    events: mpsc::UnboundedSender<SessionEvent>,
}

enum Tick {
    Cmd(Option<Command>),
    Link(Option<SignalMessage>),
    Outbound(SignalMessage),
    Coordinator(CoordinatorEvent),
}

impl<L: RelayLink> SessionController<L> {
    pub fn new(
        config: SessionConfig,
        factory: Arc<dyn ConnectionFactory>,
        link: L,
    ) -> (Self, SessionHandle, mpsc::UnboundedReceiver<SessionEvent>) {
        let (cmd_tx, commands) = mpsc::unbounded_channel();
        let (signal_tx, signal_rx) = mpsc::unbounded_channel();
        let (coord_tx, coord_rx) = mpsc::unbounded_channel();
        let (events, events_rx) = mpsc::unbounded_channel();

        let role = if config.room.is_some() {
            SessionRole::Viewer
        } else {
            SessionRole::Host
        };

        let controller = Self {
            link,
            commands,
            signal_rx,
            coord_rx,
            state: SessionState {
                role,
                room: config.room,
                local: None,
                media: None,
                ice_servers: config.ice_servers,
                supervisor: config.supervisor,
                factory,
                coordinators: HashMap::new(),
                awaiting_roster: false,
                signal_tx,
                coord_tx,
                events,
            },
        };
        (controller, SessionHandle { tx: cmd_tx }, events_rx)
    }

    /// Run the session until shutdown, administrative disconnect, or relay
    /// loss.
    pub async fn run(self) -> Result<(), SessionError> {
        let Self {
            mut link,
            mut commands,
            mut signal_rx,
            mut coord_rx,
            mut state,
        } = self;

        info!(role = ?state.role, "session started");
        if state.role == SessionRole::Viewer {
            if let Some(room) = state.room.clone() {
                state.awaiting_roster = true;
                link.send(SignalMessage::JoinRoom { room }).await?;
            }
        }

        loop {
            let tick = tokio::select! {
                cmd = commands.recv() => Tick::Cmd(cmd),
                msg = link.recv() => Tick::Link(msg),
                Some(signal) = signal_rx.recv() => Tick::Outbound(signal),
                Some(event) = coord_rx.recv() => Tick::Coordinator(event),
            };

            match tick {
                Tick::Cmd(None) | Tick::Cmd(Some(Command::Shutdown)) => {
                    state.teardown();
                    return Ok(());
                }
                Tick::Cmd(Some(cmd)) => state.handle_command(cmd, &mut link).await?,
                Tick::Link(Some(signal)) => {
                    if state.handle_signal(signal).is_break() {
                        return Ok(());
                    }
                }
                Tick::Link(None) => {
                    state.teardown();
                    let _ = state.events.send(SessionEvent::RelayClosed);
                    return Err(SessionError::RelayClosed);
                }
                Tick::Outbound(signal) => link.send(signal).await?,
                Tick::Coordinator(event) => state.handle_coordinator_event(event),
            }
        }
    }
}

impl SessionState {
    async fn handle_command(
        &mut self,
        cmd: Command,
        link: &mut impl RelayLink,
    ) -> Result<(), SessionError> {
        match cmd {
            Command::Share { media, reply } => {
                if self.role != SessionRole::Host {
                    warn!("viewers cannot share media");
                    return Ok(());
                }
                let room = self.room.clone().unwrap_or_else(RoomId::generate);
                if self.room.is_none() {
                    info!(%room, "sharing into new room");
                    self.awaiting_roster = true;
                    link.send(SignalMessage::JoinRoom { room: room.clone() })
                        .await?;
                    self.room = Some(room.clone());
                }
                self.media = Some(media.clone());
                for handle in self.coordinators.values() {
                    handle.set_media(Some(media.clone()));
                }
                link.send(SignalMessage::StreamStarted {
                    from: None,
                    stream: media.id().clone(),
                })
                .await?;
                let _ = reply.send(room);
            }
            Command::StopMedia => {
                let Some(media) = self.media.take() else {
                    return Ok(());
                };
                link.send(SignalMessage::StreamStopped {
                    from: None,
                    stream: media.id().clone(),
                })
                .await?;
                for handle in self.coordinators.values() {
                    handle.set_media(None);
                }
            }
            Command::ListUsers { room } => {
                link.send(SignalMessage::ListUsers { room }).await?;
            }
            Command::Console { command } => {
                link.send(SignalMessage::ConsoleCommand { command }).await?;
            }
            Command::Shutdown => unreachable!("handled in the run loop"),
        }
        Ok(())
    }

    fn handle_signal(&mut self, signal: SignalMessage) -> ControlFlow<()> {
        match signal {
            SignalMessage::Welcome { participant } => {
                debug!(%participant, "assigned participant id");
                self.local = Some(participant.clone());
                let _ = self.events.send(SessionEvent::Welcome { participant });
            }
            SignalMessage::IceConfig { ice_servers } => {
                if self.ice_servers.is_empty() {
                    debug!(count = ice_servers.len(), "adopting relay ice config");
                    self.ice_servers = ice_servers;
                }
            }
            SignalMessage::ExistingUsers { users } => {
                let _ = self.events.send(SessionEvent::Members {
                    users: users.clone(),
                });
                if !self.awaiting_roster {
                    return ControlFlow::Continue(());
                }
                self.awaiting_roster = false;
                for user in users {
                    let handle = self.fresh_coordinator(&user.participant);
                    if self.role == SessionRole::Host {
                        handle.initiate();
                    }
                    for stream in user.streams {
                        let _ = self.events.send(SessionEvent::RemoteStreamStarted {
                            from: user.participant.clone(),
                            stream,
                        });
                    }
                }
            }
            SignalMessage::UserConnected { participant } => {
                info!(%participant, "peer joined the room");
                let _ = self.events.send(SessionEvent::PeerJoined {
                    participant: participant.clone(),
                });
                let handle = self.fresh_coordinator(&participant);
                if self.role == SessionRole::Host {
                    handle.initiate();
                }
            }
            SignalMessage::Offer { from: Some(from), sdp } => {
                self.coordinator(&from).remote_offer(sdp);
            }
            SignalMessage::Answer { from: Some(from), sdp } => {
                match self.coordinators.get(&from) {
                    Some(handle) => handle.remote_answer(sdp),
                    None => debug!(%from, "answer for unknown peer dropped"),
                }
            }
            SignalMessage::IceCandidate {
                from: Some(from),
                candidate,
                sdp_mid,
                sdp_m_line_index,
            } => match self.coordinators.get(&from) {
                Some(handle) => handle.remote_candidate(IceCandidate {
                    candidate,
                    sdp_mid,
                    sdp_m_line_index,
                }),
                None => debug!(%from, "candidate for unknown peer dropped"),
            },
            SignalMessage::StreamStarted { from: Some(from), stream } => {
                let _ = self
                    .events
                    .send(SessionEvent::RemoteStreamStarted { from, stream });
            }
            SignalMessage::StreamStopped { from: Some(from), stream } => {
                let _ = self
                    .events
                    .send(SessionEvent::RemoteStreamStopped { from, stream });
            }
            SignalMessage::UserDisconnected { participant } => {
                info!(%participant, "peer left the room");
                if let Some(handle) = self.coordinators.remove(&participant) {
                    handle.close();
                }
                let _ = self.events.send(SessionEvent::PeerLeft { participant });
            }
            SignalMessage::ForceDisconnect { reason } => {
                warn!(%reason, "disconnected by the relay");
                self.teardown();
                let _ = self
                    .events
                    .send(SessionEvent::ForceDisconnected { reason });
                return ControlFlow::Break(());
            }
            SignalMessage::ConsoleResponse { report } => {
                let _ = self.events.send(SessionEvent::ConsoleReport { report });
            }
            other => debug!(kind = %other, "ignoring unexpected relay message"),
        }
        ControlFlow::Continue(())
    }

    fn handle_coordinator_event(&mut self, event: CoordinatorEvent) {
        match event {
            CoordinatorEvent::Connectivity { remote, state } => {
                let _ = self.events.send(SessionEvent::PeerConnectivity {
                    participant: remote,
                    state,
                });
            }
            CoordinatorEvent::RemoteTrack { remote, stream } => {
                let _ = self
                    .events
                    .send(SessionEvent::RemoteTrack { from: remote, stream });
            }
        }
    }

    /// Get the coordinator for a peer, creating one on demand (a remote
    /// offer may arrive before we processed `user-connected`).
    fn coordinator(&mut self, remote: &ParticipantId) -> CoordinatorHandle {
        if let Some(handle) = self.coordinators.get(remote) {
            return handle.clone();
        }
        self.spawn_coordinator(remote)
    }

    /// A new negotiation session always replaces (and closes) any prior one
    /// for the same peer.
    fn fresh_coordinator(&mut self, remote: &ParticipantId) -> CoordinatorHandle {
        if let Some(old) = self.coordinators.remove(remote) {
            old.close();
        }
        self.spawn_coordinator(remote)
    }

    fn spawn_coordinator(&mut self, remote: &ParticipantId) -> CoordinatorHandle {
        let role = match self.role {
            SessionRole::Host => PeerRole::Initiator,
            SessionRole::Viewer => PeerRole::Responder,
        };
        let handle = NegotiationCoordinator::spawn(CoordinatorSetup {
            remote: remote.clone(),
            role,
            factory: self.factory.clone(),
            ice_servers: self.ice_servers.clone(),
            media: self.media.clone(),
            supervisor: self.supervisor.clone(),
            signals: self.signal_tx.clone(),
            events: self.coord_tx.clone(),
        });
        self.coordinators.insert(remote.clone(), handle.clone());
        handle
    }

    fn teardown(&mut self) {
        for (_, handle) in self.coordinators.drain() {
            handle.close();
        }
        self.media = None;
    }
}
