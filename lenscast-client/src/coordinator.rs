use crate::engine::{
    ConnectionEvent, ConnectionFactory, ConnectivityState, IceCandidate, PeerConnection,
    SessionDescription, SignalingState,
};
use crate::error::EngineError;
use crate::media::MediaStream;
use crate::supervisor::{ReconnectSupervisor, SupervisorConfig};
use lenscast_core::{IceServerConfig, ParticipantId, SignalMessage, StreamId};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Which side of the offer/answer exchange this coordinator plays.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PeerRole {
    Initiator,
    Responder,
}

/// Notifications the coordinator surfaces to its owner.
#[derive(Debug, Clone)]
pub enum CoordinatorEvent {
    Connectivity {
        remote: ParticipantId,
        state: ConnectivityState,
    },
    RemoteTrack {
        remote: ParticipantId,
        stream: StreamId,
    },
}

enum Input {
    // driven by the session controller
    Initiate,
    SetMedia(Option<MediaStream>),
    RemoteOffer { sdp: String },
    RemoteAnswer { sdp: String },
    RemoteCandidate(IceCandidate),
    Close,
    // completions of suspended engine steps, stamped with the generation
    // they started under; stale ones are discarded
    OfferReady { generation: u64, sdp: String },
    AnswerReady { generation: u64, sdp: String },
    RemoteDescriptionSet { generation: u64 },
    StepFailed { generation: u64, error: EngineError },
    Engine { generation: u64, event: ConnectionEvent },
    CheckingExpired { generation: u64 },
    RetryDue { generation: u64 },
}

/// Owner-side handle to a running coordinator. Dropping every handle does
/// not stop the loop; send [`CoordinatorHandle::close`] for that.
#[derive(Clone)]
pub struct CoordinatorHandle {
    remote: ParticipantId,
    tx: mpsc::UnboundedSender<Input>,
}

impl CoordinatorHandle {
    pub fn remote(&self) -> &ParticipantId {
        &self.remote
    }

    pub fn initiate(&self) {
        let _ = self.tx.send(Input::Initiate);
    }

    /// Replace the attached local media; triggers renegotiation for an
    /// initiator.
    pub fn set_media(&self, media: Option<MediaStream>) {
        let _ = self.tx.send(Input::SetMedia(media));
    }

    pub fn remote_offer(&self, sdp: String) {
        let _ = self.tx.send(Input::RemoteOffer { sdp });
    }

    pub fn remote_answer(&self, sdp: String) {
        let _ = self.tx.send(Input::RemoteAnswer { sdp });
    }

    pub fn remote_candidate(&self, candidate: IceCandidate) {
        let _ = self.tx.send(Input::RemoteCandidate(candidate));
    }

    pub fn close(&self) {
        let _ = self.tx.send(Input::Close);
    }
}

/// Everything a coordinator needs at spawn time.
pub struct CoordinatorSetup {
    pub remote: ParticipantId,
    pub role: PeerRole,
    pub factory: Arc<dyn ConnectionFactory>,
    pub ice_servers: Vec<IceServerConfig>,
    pub media: Option<MediaStream>,
    pub supervisor: SupervisorConfig,
    /// Outbound signaling (offers, answers, candidates) toward the relay.
    pub signals: mpsc::UnboundedSender<SignalMessage>,
    pub events: mpsc::UnboundedSender<CoordinatorEvent>,
}

/// Drives one peer connection through offer/answer/ICE exchange.
///
/// Runs as a single event loop per remote participant. Suspending engine
/// calls execute in spawned steps that post their completion back into the
/// loop together with the generation they were started under; a reset bumps
/// the generation, which makes every in-flight step inert on completion.
pub struct NegotiationCoordinator {
    remote: ParticipantId,
    role: PeerRole,
    factory: Arc<dyn ConnectionFactory>,
    ice_servers: Vec<IceServerConfig>,
    media: Option<MediaStream>,
    conn: Option<Arc<dyn PeerConnection>>,
    generation: u64,
    remote_description_set: bool,
    pending_candidates: Vec<IceCandidate>,
    last_connectivity: ConnectivityState,
    supervisor: ReconnectSupervisor,
    signals: mpsc::UnboundedSender<SignalMessage>,
    events: mpsc::UnboundedSender<CoordinatorEvent>,
    tx: mpsc::UnboundedSender<Input>,
}

impl NegotiationCoordinator {
    /// Spawn the coordinator loop and return the handle driving it.
    pub fn spawn(setup: CoordinatorSetup) -> CoordinatorHandle {
        let (tx, rx) = mpsc::unbounded_channel();
        let handle = CoordinatorHandle {
            remote: setup.remote.clone(),
            tx: tx.clone(),
        };

        let coordinator = Self {
            remote: setup.remote,
            role: setup.role,
            factory: setup.factory,
            ice_servers: setup.ice_servers,
            media: setup.media,
            conn: None,
            generation: 0,
            remote_description_set: false,
            pending_candidates: Vec::new(),
            last_connectivity: ConnectivityState::New,
            supervisor: ReconnectSupervisor::new(setup.supervisor),
            signals: setup.signals,
            events: setup.events,
            tx,
        };
        tokio::spawn(coordinator.run(rx));
        handle
    }

    async fn run(mut self, mut rx: mpsc::UnboundedReceiver<Input>) {
        info!(remote = %self.remote, role = ?self.role, "negotiation coordinator started");

        while let Some(input) = rx.recv().await {
            match input {
                Input::Initiate => self.handle_initiate().await,
                Input::SetMedia(media) => self.handle_set_media(media).await,
                Input::RemoteOffer { sdp } => self.handle_remote_offer(sdp).await,
                Input::RemoteAnswer { sdp } => self.handle_remote_answer(sdp).await,
                Input::RemoteCandidate(candidate) => {
                    self.handle_remote_candidate(candidate).await
                }
                Input::OfferReady { generation, sdp } => {
                    if self.is_stale(generation, "offer completion") {
                        continue;
                    }
                    let _ = self.signals.send(SignalMessage::Offer { from: None, sdp });
                }
                Input::AnswerReady { generation, sdp } => {
                    if self.is_stale(generation, "answer completion") {
                        continue;
                    }
                    let _ = self.signals.send(SignalMessage::Answer { from: None, sdp });
                }
                Input::RemoteDescriptionSet { generation } => {
                    if self.is_stale(generation, "remote description completion") {
                        continue;
                    }
                    self.remote_description_set = true;
                    self.flush_pending_candidates().await;
                }
                Input::StepFailed { generation, error } => {
                    if self.is_stale(generation, "failed step") {
                        continue;
                    }
                    warn!(remote = %self.remote, %error, "negotiation step failed");
                    self.arm_retry();
                }
                Input::Engine { generation, event } => {
                    if self.is_stale(generation, "engine event") {
                        continue;
                    }
                    self.handle_engine_event(event);
                }
                Input::CheckingExpired { generation } => {
                    if self.is_stale(generation, "checking timeout") {
                        continue;
                    }
                    if self.last_connectivity == ConnectivityState::Checking {
                        warn!(remote = %self.remote, "stuck in checking, treating as failed");
                        self.arm_retry();
                    }
                }
                Input::RetryDue { generation } => {
                    self.supervisor.retry_fired();
                    if self.is_stale(generation, "retry timer") {
                        continue;
                    }
                    if self.last_connectivity == ConnectivityState::Connected {
                        debug!(remote = %self.remote, "connection recovered, skipping retry");
                        continue;
                    }
                    info!(remote = %self.remote, "retrying negotiation");
                    self.reset().await;
                    if self.role == PeerRole::Initiator {
                        self.spawn_offer_step();
                    }
                }
                Input::Close => break,
            }
        }

        if let Some(conn) = self.conn.take() {
            conn.close().await;
        }
        info!(remote = %self.remote, "negotiation coordinator closed");
    }

    fn is_stale(&self, generation: u64, what: &str) -> bool {
        if generation == self.generation {
            return false;
        }
        debug!(
            remote = %self.remote,
            stale = generation,
            current = self.generation,
            "discarding stale {what}"
        );
        true
    }

    /// Discard the connection (if any) and build a fresh one with the local
    /// media re-attached. Bumping the generation first makes every pending
    /// completion for the old connection inert.
    async fn reset(&mut self) {
        self.generation += 1;
        self.remote_description_set = false;
        self.pending_candidates.clear();
        self.last_connectivity = ConnectivityState::New;
        if let Some(conn) = self.conn.take() {
            conn.close().await;
        }

        let (engine_tx, mut engine_rx) = mpsc::channel(64);
        match self
            .factory
            .create_connection(&self.ice_servers, engine_tx)
            .await
        {
            Ok(conn) => {
                if let Some(media) = &self.media {
                    for track in media.tracks() {
                        if let Err(e) = conn.add_track(track.clone()).await {
                            warn!(remote = %self.remote, %e, "failed to attach local track");
                        }
                    }
                }
                let generation = self.generation;
                let tx = self.tx.clone();
                tokio::spawn(async move {
                    while let Some(event) = engine_rx.recv().await {
                        if tx.send(Input::Engine { generation, event }).is_err() {
                            break;
                        }
                    }
                });
                self.conn = Some(conn);
            }
            Err(e) => {
                warn!(remote = %self.remote, %e, "failed to create connection");
                self.arm_retry();
            }
        }
    }

    /// Start (or restart) negotiation. Only a connection sitting in `stable`
    /// may produce an offer; anything else gets a reset first, then one
    /// attempt.
    async fn handle_initiate(&mut self) {
        let eligible = self
            .conn
            .as_ref()
            .is_some_and(|c| c.signaling_state() == SignalingState::Stable);
        if !eligible {
            self.reset().await;
        }
        self.spawn_offer_step();
    }

    async fn handle_set_media(&mut self, media: Option<MediaStream>) {
        let stopping = media.is_none();
        self.media = media;
        if stopping {
            if self.conn.is_some() {
                self.reset().await;
            }
            return;
        }
        // Renegotiation after a media change follows the initiate path; the
        // reset inside it attaches the new tracks.
        if self.role == PeerRole::Initiator {
            self.reset().await;
            self.spawn_offer_step();
        }
    }

    /// An incoming offer always gets a fresh connection, whatever state the
    /// old one was in. The answer is produced only when applying the offer
    /// leaves the engine in `have-remote-offer`; otherwise the session stays
    /// as-is and the caller decides when to reset.
    async fn handle_remote_offer(&mut self, sdp: String) {
        self.reset().await;
        let Some(conn) = self.conn.clone() else {
            return;
        };
        let generation = self.generation;
        let tx = self.tx.clone();
        let remote = self.remote.clone();
        tokio::spawn(async move {
            if let Err(error) = conn
                .set_remote_description(SessionDescription::offer(sdp))
                .await
            {
                let _ = tx.send(Input::StepFailed { generation, error });
                return;
            }
            let _ = tx.send(Input::RemoteDescriptionSet { generation });

            let state = conn.signaling_state();
            if state != SignalingState::HaveRemoteOffer {
                warn!(%remote, ?state, "not answering: unexpected state after applying offer");
                return;
            }
            let step = async {
                let answer = conn.create_answer().await?;
                let sdp = answer.sdp.clone();
                conn.set_local_description(answer).await?;
                Ok::<_, EngineError>(sdp)
            };
            let input = match step.await {
                Ok(sdp) => Input::AnswerReady { generation, sdp },
                Err(error) => Input::StepFailed { generation, error },
            };
            let _ = tx.send(input);
        });
    }

    /// An answer is only meaningful while our own offer is outstanding. In
    /// any other state the exchange has been crossed up, so start over.
    async fn handle_remote_answer(&mut self, sdp: String) {
        let in_offer_state = self
            .conn
            .as_ref()
            .is_some_and(|c| c.signaling_state() == SignalingState::HaveLocalOffer);
        if !in_offer_state {
            warn!(remote = %self.remote, "answer arrived in wrong state, resetting");
            self.reset().await;
            if self.role == PeerRole::Initiator {
                self.spawn_offer_step();
            }
            return;
        }

        let Some(conn) = self.conn.clone() else {
            return;
        };
        let generation = self.generation;
        let tx = self.tx.clone();
        tokio::spawn(async move {
            let input = match conn
                .set_remote_description(SessionDescription::answer(sdp))
                .await
            {
                Ok(()) => Input::RemoteDescriptionSet { generation },
                Err(error) => Input::StepFailed { generation, error },
            };
            let _ = tx.send(input);
        });
    }

    /// Candidates arriving before the remote description are queued;
    /// candidates with no connection at all are dropped.
    async fn handle_remote_candidate(&mut self, candidate: IceCandidate) {
        let Some(conn) = self.conn.clone() else {
            debug!(remote = %self.remote, "candidate with no connection dropped");
            return;
        };
        if !self.remote_description_set {
            self.pending_candidates.push(candidate);
            return;
        }
        if let Err(e) = conn.add_ice_candidate(candidate).await {
            warn!(remote = %self.remote, %e, "failed to apply ICE candidate");
        }
    }

    /// Applies queued candidates in receipt order. Runs once per accepted
    /// remote description; later candidates apply directly.
    async fn flush_pending_candidates(&mut self) {
        let Some(conn) = self.conn.clone() else {
            return;
        };
        let queued = std::mem::take(&mut self.pending_candidates);
        if queued.is_empty() {
            return;
        }
        debug!(remote = %self.remote, count = queued.len(), "flushing queued candidates");
        for candidate in queued {
            if let Err(e) = conn.add_ice_candidate(candidate).await {
                warn!(remote = %self.remote, %e, "failed to apply queued candidate");
            }
        }
    }

    fn spawn_offer_step(&self) {
        let Some(conn) = self.conn.clone() else {
            return;
        };
        let generation = self.generation;
        let tx = self.tx.clone();
        tokio::spawn(async move {
            let step = async {
                let offer = conn.create_offer().await?;
                let sdp = offer.sdp.clone();
                conn.set_local_description(offer).await?;
                Ok::<_, EngineError>(sdp)
            };
            let input = match step.await {
                Ok(sdp) => Input::OfferReady { generation, sdp },
                Err(error) => Input::StepFailed { generation, error },
            };
            let _ = tx.send(input);
        });
    }

    fn handle_engine_event(&mut self, event: ConnectionEvent) {
        match event {
            ConnectionEvent::Connectivity(state) => {
                self.last_connectivity = state;
                let _ = self.events.send(CoordinatorEvent::Connectivity {
                    remote: self.remote.clone(),
                    state,
                });
                match state {
                    ConnectivityState::Checking => self.arm_checking_timer(),
                    ConnectivityState::Connected => self.supervisor.note_connected(),
                    ConnectivityState::Disconnected | ConnectivityState::Failed => {
                        self.arm_retry()
                    }
                    ConnectivityState::New | ConnectivityState::Closed => {}
                }
            }
            ConnectionEvent::LocalCandidate(candidate) => {
                let _ = self.signals.send(SignalMessage::IceCandidate {
                    from: None,
                    candidate: candidate.candidate,
                    sdp_mid: candidate.sdp_mid,
                    sdp_m_line_index: candidate.sdp_m_line_index,
                });
            }
            ConnectionEvent::RemoteTrack { stream } => {
                let _ = self.events.send(CoordinatorEvent::RemoteTrack {
                    remote: self.remote.clone(),
                    stream,
                });
            }
        }
    }

    fn arm_checking_timer(&self) {
        let generation = self.generation;
        let timeout = self.supervisor.checking_timeout();
        let tx = self.tx.clone();
        tokio::spawn(async move {
            tokio::time::sleep(timeout).await;
            let _ = tx.send(Input::CheckingExpired { generation });
        });
    }

    fn arm_retry(&mut self) {
        let Some(delay) = self.supervisor.schedule_retry() else {
            return;
        };
        debug!(remote = %self.remote, ?delay, "scheduling reconnect attempt");
        let generation = self.generation;
        let tx = self.tx.clone();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = tx.send(Input::RetryDue { generation });
        });
    }
}
