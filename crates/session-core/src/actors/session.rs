//! `SessionManager` - the one actor the presentation layer talks to.
//!
//! Owns the authoritative meeting state machine
//! (`Joining -> Active -> Leaving -> Closed`), the Participant table, the
//! local media state, and the chat channel. Peer sessions report through
//! typed events and never mutate manager state directly.
//!
//! # Joining
//!
//! Media is acquired in a spawned task so a concurrent teardown can always
//! proceed; a stream that finishes acquiring after the session closed is
//! released, never attached. A meeting cannot start without at least one
//! local media capability: probe or camera failure is fatal and surfaces
//! exactly one `MediaUnavailable` error.

use crate::actors::messages::{PeerEvent, SessionCommand, SessionMessage};
use crate::actors::metrics::{self, ActorType, MailboxMonitor};
use crate::actors::peer::{PeerSession, PeerSessionHandle, PeerTiming};
use crate::chat::{self, ChatChannel, ChatDelivery, ChatMessage};
use crate::config::SessionConfig;
use crate::errors::SessionError;
use crate::events::{
    ConnectionQuality, LocalMediaInfo, ParticipantInfo, PeerStatus, SessionEvent, SessionState,
};
use crate::invite;
use crate::media::controller::PendingSwap;
use crate::media::provider::{MediaError, MediaProvider};
use crate::media::stream::{LocalStream, StreamSource, TrackKind};
use crate::media::MediaController;
use crate::signaling::SignalingClient;
use crate::transport::PeerConnector;

use common::{MeetingId, PeerId};
use signal_protocol::{SignalBody, SignalMessage};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

/// Default channel buffer size for the session mailbox.
const SESSION_CHANNEL_BUFFER: usize = 500;

/// Buffer for the presentation-layer event stream.
const EVENT_CHANNEL_BUFFER: usize = 256;

/// Bounded wait for each peer task during teardown.
const PEER_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);

/// Everything needed to join one meeting.
pub struct JoinOptions {
    /// The meeting to join.
    pub meeting_id: MeetingId,
    /// Our peer id on the signaling plane.
    pub self_id: PeerId,
    /// Our display name (also the invite-link host name).
    pub display_name: String,
    /// Whether we have host privileges.
    pub is_host: bool,
    /// Timing and media configuration.
    pub config: SessionConfig,
    /// Platform media capability.
    pub media: Arc<dyn MediaProvider>,
    /// Outbound signaling.
    pub signaling: Arc<dyn SignalingClient>,
    /// Inbound signaling messages for this meeting.
    pub signals: mpsc::Receiver<SignalMessage>,
    /// Peer connection engine factory.
    pub connector: Arc<dyn PeerConnector>,
}

/// Handle to a running `SessionManager`.
#[derive(Clone)]
pub struct SessionHandle {
    sender: mpsc::Sender<SessionMessage>,
    events: broadcast::Sender<SessionEvent>,
    state_rx: watch::Receiver<SessionState>,
    meeting_id: MeetingId,
    self_id: PeerId,
    display_name: String,
}

impl SessionHandle {
    /// Subscribe to session events. The UI never polls.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    /// Current session state.
    #[must_use]
    pub fn state(&self) -> SessionState {
        *self.state_rx.borrow()
    }

    /// Watch session state transitions.
    #[must_use]
    pub fn state_changes(&self) -> watch::Receiver<SessionState> {
        self.state_rx.clone()
    }

    /// The meeting this session belongs to.
    #[must_use]
    pub fn meeting_id(&self) -> &MeetingId {
        &self.meeting_id
    }

    /// Our peer id.
    #[must_use]
    pub fn self_id(&self) -> &PeerId {
        &self.self_id
    }

    /// Build the shareable join link for this meeting. Pure; callable in any
    /// state.
    #[must_use]
    pub fn invite_link(&self, origin: &str) -> String {
        invite::build_link(origin, &self.meeting_id, &self.display_name)
    }

    /// Begin negotiation with an announced remote peer (we offer).
    pub async fn connect_peer(&self, peer_id: PeerId) -> Result<(), SessionError> {
        self.request(|respond_to| {
            SessionCommand::ConnectPeer {
                peer_id,
                respond_to,
            }
        })
        .await?
    }

    /// Enable or disable the microphone track.
    pub async fn set_audio_enabled(&self, enabled: bool) -> Result<(), SessionError> {
        self.request(|respond_to| SessionCommand::SetTrackEnabled {
            kind: TrackKind::Audio,
            enabled,
            respond_to,
        })
        .await?
    }

    /// Enable or disable the video track.
    pub async fn set_video_enabled(&self, enabled: bool) -> Result<(), SessionError> {
        self.request(|respond_to| SessionCommand::SetTrackEnabled {
            kind: TrackKind::Video,
            enabled,
            respond_to,
        })
        .await?
    }

    /// Swap the camera for a screen stream.
    pub async fn start_screen_share(&self) -> Result<(), SessionError> {
        self.request(|respond_to| SessionCommand::StartScreenShare { respond_to })
            .await?
    }

    /// Swap the screen stream back to the camera.
    pub async fn stop_screen_share(&self) -> Result<(), SessionError> {
        self.request(|respond_to| SessionCommand::StopScreenShare { respond_to })
            .await?
    }

    /// Compose and transmit a chat message.
    pub async fn send_chat(&self, body: impl Into<String>) -> Result<ChatDelivery, SessionError> {
        let body = body.into();
        self.request(|respond_to| SessionCommand::SendChat { body, respond_to })
            .await?
    }

    /// Snapshot the participant list, self entry first.
    pub async fn participants(&self) -> Result<Vec<ParticipantInfo>, SessionError> {
        self.request(|respond_to| SessionCommand::GetParticipants { respond_to })
            .await
    }

    /// Snapshot the retained chat history.
    pub async fn chat_history(&self) -> Result<Vec<ChatMessage>, SessionError> {
        self.request(|respond_to| SessionCommand::GetChatHistory { respond_to })
            .await
    }

    /// Explicit end-call: teardown of every resource.
    pub async fn leave(&self) -> Result<(), SessionError> {
        self.request(|respond_to| SessionCommand::Leave { respond_to })
            .await?
    }

    async fn request<R>(
        &self,
        build: impl FnOnce(oneshot::Sender<R>) -> SessionCommand,
    ) -> Result<R, SessionError> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(SessionMessage::Command(build(tx)))
            .await
            .map_err(|_| SessionError::SessionClosed)?;

        rx.await.map_err(|_| SessionError::SessionClosed)
    }
}

/// One supervised peer session.
struct ManagedPeer {
    handle: PeerSessionHandle,
    task_handle: JoinHandle<()>,
    display_name: String,
    status: PeerStatus,
    /// Present once the peer first reached `Connected`.
    participant: Option<RemoteParticipant>,
    chat_open: bool,
}

/// Manager-owned state for one remote participant.
struct RemoteParticipant {
    quality: ConnectionQuality,
}

/// The `SessionManager` implementation.
pub struct SessionManager {
    meeting_id: MeetingId,
    self_id: PeerId,
    display_name: String,
    is_host: bool,
    config: SessionConfig,
    media: MediaController,
    signaling: Arc<dyn SignalingClient>,
    connector: Arc<dyn PeerConnector>,
    receiver: mpsc::Receiver<SessionMessage>,
    internal_tx: mpsc::Sender<SessionMessage>,
    state: SessionState,
    state_tx: watch::Sender<SessionState>,
    events: broadcast::Sender<SessionEvent>,
    local: Option<LocalStream>,
    peers: HashMap<PeerId, ManagedPeer>,
    chat: ChatChannel,
    swap_in_flight: bool,
    peer_seq: usize,
    cancel_token: CancellationToken,
    mailbox: MailboxMonitor,
}

impl SessionManager {
    /// Spawn the session manager for one meeting.
    ///
    /// Returns a handle and the task join handle. The session starts in
    /// `Joining`; subscribe immediately to observe the outcome.
    pub fn spawn(options: JoinOptions) -> (SessionHandle, JoinHandle<()>) {
        let JoinOptions {
            meeting_id,
            self_id,
            display_name,
            is_host,
            config,
            media,
            signaling,
            signals,
            connector,
        } = options;

        let (sender, receiver) = mpsc::channel(SESSION_CHANNEL_BUFFER);
        let (events, _) = broadcast::channel(EVENT_CHANNEL_BUFFER);
        let (state_tx, state_rx) = watch::channel(SessionState::Joining);
        let cancel_token = CancellationToken::new();

        // Pump inbound signaling into the mailbox.
        tokio::spawn(signal_pump(signals, sender.clone(), cancel_token.clone()));

        let actor = Self {
            meeting_id: meeting_id.clone(),
            self_id: self_id.clone(),
            display_name: display_name.clone(),
            is_host,
            media: MediaController::new(media, config.camera),
            chat: ChatChannel::new(config.chat_history_limit),
            config,
            signaling,
            connector,
            receiver,
            internal_tx: sender.clone(),
            state: SessionState::Joining,
            state_tx,
            events: events.clone(),
            local: None,
            peers: HashMap::new(),
            swap_in_flight: false,
            peer_seq: 0,
            cancel_token: cancel_token.clone(),
            mailbox: MailboxMonitor::new(ActorType::Session, meeting_id.as_str()),
        };

        let task_handle = tokio::spawn(actor.run());

        let handle = SessionHandle {
            sender,
            events,
            state_rx,
            meeting_id,
            self_id,
            display_name,
        };

        (handle, task_handle)
    }

    /// Run the actor.
    #[instrument(skip_all, name = "meet.session", fields(meeting_id = %self.meeting_id))]
    async fn run(mut self) {
        info!(
            target: "meet.session",
            meeting_id = %self.meeting_id,
            "SessionManager started, acquiring local media"
        );

        if !self.join().await {
            self.set_state(SessionState::Closed);
            self.cancel_token.cancel();
            return;
        }

        loop {
            // Watch for an OS-level end of the active screen share, but not
            // while a swap is already in flight.
            let screen_ended = match (&self.local, self.swap_in_flight) {
                (Some(stream), false) if stream.source() == StreamSource::Screen => {
                    Some(stream.ended_token())
                }
                _ => None,
            };

            tokio::select! {
                () = self.cancel_token.cancelled() => {
                    self.shutdown().await;
                    break;
                }

                () = wait_ended(screen_ended) => {
                    info!(
                        target: "meet.session",
                        meeting_id = %self.meeting_id,
                        "Screen share ended at OS level, swapping back to camera"
                    );
                    self.begin_swap(StreamSource::Camera, None);
                }

                msg = self.receiver.recv() => {
                    match msg {
                        Some(message) => {
                            self.mailbox.record_enqueue();
                            let should_exit = self.handle_message(message).await;
                            self.mailbox.record_dequeue();

                            if should_exit {
                                break;
                            }
                        }
                        None => break,
                    }
                }
            }
        }

        info!(
            target: "meet.session",
            meeting_id = %self.meeting_id,
            messages_processed = self.mailbox.messages_processed(),
            "SessionManager stopped"
        );
    }

    /// Acquire local media. Returns false when the session is dead on
    /// arrival (probe/camera failure, or torn down mid-acquisition).
    async fn join(&mut self) -> bool {
        let media = self.media.clone();
        let mut acquisition = tokio::spawn(async move {
            let devices = media.probe().await;
            if !devices.can_join() {
                return Err(MediaError::Unavailable(
                    "no camera or microphone available".to_string(),
                ));
            }
            media.acquire_camera().await
        });

        let acquired = tokio::select! {
            () = self.cancel_token.cancelled() => {
                // Closed while acquiring: make sure the eventual stream is
                // released, never attached.
                tokio::spawn(async move {
                    if let Ok(Ok(stream)) = acquisition.await {
                        MediaController::release(&stream);
                    }
                });
                return false;
            }
            result = &mut acquisition => result,
        };

        match acquired {
            Ok(Ok(stream)) => {
                self.local = Some(stream);
                self.set_state(SessionState::Active);
                self.emit(SessionEvent::MediaStateChanged {
                    state: self.local_media_info(),
                });
                self.emit_participants();
                info!(
                    target: "meet.session",
                    meeting_id = %self.meeting_id,
                    "Local media live, session active"
                );
                true
            }
            Ok(Err(e)) => {
                self.emit_error(&SessionError::from(e));
                false
            }
            Err(e) => {
                self.emit_error(&SessionError::Internal(format!(
                    "media acquisition task failed: {e}"
                )));
                false
            }
        }
    }

    /// Handle one mailbox message. Returns true if the actor should exit.
    async fn handle_message(&mut self, message: SessionMessage) -> bool {
        match message {
            SessionMessage::Command(command) => self.handle_command(command).await,
            SessionMessage::Signal(message) => {
                self.handle_signal(message).await;
                false
            }
            SessionMessage::Peer { peer_id, event } => {
                self.handle_peer_event(&peer_id, event).await;
                false
            }
            SessionMessage::SwapReady { result, reply } => {
                self.handle_swap_ready(result, reply).await;
                false
            }
        }
    }

    /// Handle one handle operation. Returns true if the actor should exit.
    async fn handle_command(&mut self, command: SessionCommand) -> bool {
        match command {
            SessionCommand::ConnectPeer {
                peer_id,
                respond_to,
            } => {
                let result = if self.state != SessionState::Active {
                    Err(SessionError::SessionClosed)
                } else if self.peers.contains_key(&peer_id) {
                    Err(SessionError::Internal(
                        "peer already connected".to_string(),
                    ))
                } else {
                    self.create_peer(peer_id, None);
                    Ok(())
                };
                let _ = respond_to.send(result);
                false
            }

            SessionCommand::SetTrackEnabled {
                kind,
                enabled,
                respond_to,
            } => {
                let _ = respond_to.send(self.set_track_enabled(kind, enabled));
                false
            }

            SessionCommand::StartScreenShare { respond_to } => {
                self.request_swap(StreamSource::Screen, respond_to);
                false
            }

            SessionCommand::StopScreenShare { respond_to } => {
                self.request_swap(StreamSource::Camera, respond_to);
                false
            }

            SessionCommand::SendChat { body, respond_to } => {
                let _ = respond_to.send(self.send_chat(body).await);
                false
            }

            SessionCommand::GetParticipants { respond_to } => {
                let _ = respond_to.send(self.participants_snapshot());
                false
            }

            SessionCommand::GetChatHistory { respond_to } => {
                let _ = respond_to.send(self.chat.history().to_vec());
                false
            }

            SessionCommand::Leave { respond_to } => {
                if self.state != SessionState::Active {
                    let _ = respond_to.send(Err(SessionError::SessionClosed));
                    return false;
                }
                self.shutdown().await;
                let _ = respond_to.send(Ok(()));
                true
            }
        }
    }

    /// Flip a local track flag. Repeated identical toggles are no-ops.
    fn set_track_enabled(&mut self, kind: TrackKind, enabled: bool) -> Result<(), SessionError> {
        if self.state != SessionState::Active {
            return Err(SessionError::SessionClosed);
        }
        let Some(stream) = &self.local else {
            return Err(SessionError::Internal("no local stream".to_string()));
        };

        let changed = stream.is_track_enabled(kind) != Some(enabled);
        if stream.set_track_enabled(kind, enabled) && changed {
            self.emit(SessionEvent::MediaStateChanged {
                state: self.local_media_info(),
            });
        }
        Ok(())
    }

    /// Validate and kick off a user-requested swap.
    fn request_swap(
        &mut self,
        target: StreamSource,
        respond_to: oneshot::Sender<Result<(), SessionError>>,
    ) {
        if self.state != SessionState::Active {
            let _ = respond_to.send(Err(SessionError::SessionClosed));
            return;
        }
        let Some(stream) = &self.local else {
            let _ = respond_to.send(Err(SessionError::Internal("no local stream".to_string())));
            return;
        };
        if stream.source() == target {
            // Already there; idempotent.
            let _ = respond_to.send(Ok(()));
            return;
        }
        if self.swap_in_flight {
            let _ = respond_to.send(Err(SessionError::Internal(
                "another swap is in flight".to_string(),
            )));
            return;
        }

        self.begin_swap(target, Some(respond_to));
    }

    /// Acquire the replacement stream off the actor loop.
    fn begin_swap(
        &mut self,
        target: StreamSource,
        reply: Option<oneshot::Sender<Result<(), SessionError>>>,
    ) {
        let Some(current) = self.local.clone() else {
            if let Some(reply) = reply {
                let _ = reply.send(Err(SessionError::Internal("no local stream".to_string())));
            }
            return;
        };

        self.swap_in_flight = true;
        let media = self.media.clone();
        let tx = self.internal_tx.clone();

        tokio::spawn(async move {
            let result = match target {
                StreamSource::Screen => media.swap_to_screen(current).await,
                StreamSource::Camera => media.swap_to_camera(current).await,
            };
            let _ = tx.send(SessionMessage::SwapReady { result, reply }).await;
        });
    }

    /// Finish a swap: re-attach to every peer, then commit.
    async fn handle_swap_ready(
        &mut self,
        result: Result<PendingSwap, MediaError>,
        reply: Option<oneshot::Sender<Result<(), SessionError>>>,
    ) {
        self.swap_in_flight = false;

        let swap = match result {
            Ok(swap) => swap,
            Err(e) => {
                let error = SessionError::from(e);
                self.emit_error(&error);
                if let Some(reply) = reply {
                    let _ = reply.send(Err(error));
                }
                return;
            }
        };

        if self.state != SessionState::Active {
            // Torn down while acquiring: discard the replacement.
            swap.abort();
            if let Some(reply) = reply {
                let _ = reply.send(Err(SessionError::SessionClosed));
            }
            return;
        }

        // Re-attach before the old stream is released so remote peers never
        // observe a gap. A peer that fails here has a peer-level problem; it
        // does not abort the swap for everyone else.
        for peer in self.peers.values() {
            if let Err(e) = peer.handle.attach_stream(swap.stream().clone()).await {
                warn!(
                    target: "meet.session",
                    meeting_id = %self.meeting_id,
                    peer_id = %peer.handle.peer_id(),
                    error = %e,
                    "Stream re-attach failed for peer"
                );
            }
        }

        let stream = swap.commit();
        self.local = Some(stream);
        self.emit(SessionEvent::MediaStateChanged {
            state: self.local_media_info(),
        });
        if let Some(reply) = reply {
            let _ = reply.send(Ok(()));
        }
    }

    /// Compose, emit, and transmit (or queue) one chat message.
    async fn send_chat(&mut self, body: String) -> Result<ChatDelivery, SessionError> {
        if self.state != SessionState::Active {
            return Err(SessionError::SessionClosed);
        }

        let message = self.chat.compose(self.self_id.clone(), body);
        self.emit(SessionEvent::Chat {
            message: message.clone(),
        });

        let data = chat::encode_wire(&message)
            .map_err(|e| SessionError::Internal(format!("chat encode failed: {e}")))?;

        let open: Vec<&ManagedPeer> = self.peers.values().filter(|p| p.chat_open).collect();
        if open.is_empty() {
            self.chat.mark_pending(message);
            metrics::record_chat_message("pending");
            let error = SessionError::DeliveryFailed("no data channel open".to_string());
            self.emit_error(&error);
            return Ok(ChatDelivery::Pending);
        }

        for peer in open {
            let _ = peer.handle.send_data(data.clone()).await;
        }
        metrics::record_chat_message("sent");
        Ok(ChatDelivery::Sent)
    }

    /// Route one inbound signaling message.
    async fn handle_signal(&mut self, message: SignalMessage) {
        if self.state != SessionState::Active {
            debug!(
                target: "meet.session",
                meeting_id = %self.meeting_id,
                "Dropping signal, session not active"
            );
            return;
        }
        if message.to != self.self_id {
            warn!(
                target: "meet.session",
                meeting_id = %self.meeting_id,
                to = %message.to,
                "Dropping misrouted signal"
            );
            return;
        }

        let from = message.from.clone();
        if !self.peers.contains_key(&from) {
            match message.body {
                // Offer from an unknown peer: they are joining, we answer.
                SignalBody::Offer(description) => {
                    self.create_peer(from, Some(description));
                }
                // Candidate/answer/bye for a peer we no longer track.
                other => {
                    debug!(
                        target: "meet.session",
                        meeting_id = %self.meeting_id,
                        peer_id = %from,
                        kind = other.kind(),
                        "Dropping signal for unknown peer"
                    );
                }
            }
            return;
        }

        if let Some(peer) = self.peers.get(&from) {
            if peer.handle.signal(message).await.is_err() {
                warn!(
                    target: "meet.session",
                    meeting_id = %self.meeting_id,
                    peer_id = %from,
                    "Peer mailbox gone, dropping signal"
                );
            }
        }
    }

    /// Create and supervise a peer session.
    fn create_peer(
        &mut self,
        peer_id: PeerId,
        initial_offer: Option<signal_protocol::SessionDescription>,
    ) {
        let (transport, transport_events) = match self.connector.connect(&peer_id) {
            Ok(pair) => pair,
            Err(e) => {
                self.emit_error(&SessionError::NegotiationFailed {
                    peer_id: peer_id.clone(),
                    cause: format!("engine construction failed: {e}"),
                });
                return;
            }
        };

        self.peer_seq += 1;
        let display_name = format!("Participant {}", self.peer_seq);

        let timing = PeerTiming {
            reconnect_window: self.config.reconnect_window,
            quality_sample_interval: self.config.quality_sample_interval,
        };

        let (handle, task_handle) = PeerSession::spawn(
            self.self_id.clone(),
            peer_id.clone(),
            timing,
            transport,
            transport_events,
            Arc::clone(&self.signaling),
            self.internal_tx.clone(),
            self.local.clone(),
            initial_offer,
            self.cancel_token.child_token(),
        );

        self.peers.insert(
            peer_id.clone(),
            ManagedPeer {
                handle,
                task_handle,
                display_name,
                status: PeerStatus::Negotiating,
                participant: None,
                chat_open: false,
            },
        );

        metrics::set_peer_sessions_active(self.peers.len());
        self.emit(SessionEvent::ConnectionStatusChanged {
            peer_id,
            status: PeerStatus::Negotiating,
        });
    }

    /// Handle one report from a peer session.
    async fn handle_peer_event(&mut self, peer_id: &PeerId, event: PeerEvent) {
        if self.state != SessionState::Active {
            return;
        }
        if !self.peers.contains_key(peer_id) {
            return;
        }

        match event {
            PeerEvent::Connected => {
                if let Some(peer) = self.peers.get_mut(peer_id) {
                    peer.status = PeerStatus::Connected;
                    peer.participant = Some(RemoteParticipant {
                        quality: ConnectionQuality::Good,
                    });
                }
                self.emit(SessionEvent::ConnectionStatusChanged {
                    peer_id: peer_id.clone(),
                    status: PeerStatus::Connected,
                });
                self.emit_participants();
            }

            PeerEvent::Reconnecting => {
                if let Some(peer) = self.peers.get_mut(peer_id) {
                    peer.status = PeerStatus::Reconnecting;
                    if let Some(participant) = &mut peer.participant {
                        participant.quality = ConnectionQuality::Reconnecting;
                    }
                }
                self.emit(SessionEvent::ConnectionStatusChanged {
                    peer_id: peer_id.clone(),
                    status: PeerStatus::Reconnecting,
                });
                self.emit_participants();
            }

            PeerEvent::Reconnected => {
                if let Some(peer) = self.peers.get_mut(peer_id) {
                    peer.status = PeerStatus::Connected;
                    if let Some(participant) = &mut peer.participant {
                        participant.quality = ConnectionQuality::Good;
                    }
                }
                self.emit(SessionEvent::ConnectionStatusChanged {
                    peer_id: peer_id.clone(),
                    status: PeerStatus::Connected,
                });
                self.emit_participants();
            }

            PeerEvent::QualitySampled(quality) => {
                let changed = match self.peers.get_mut(peer_id) {
                    Some(ManagedPeer {
                        participant: Some(participant),
                        ..
                    }) if participant.quality != quality => {
                        participant.quality = quality;
                        true
                    }
                    _ => false,
                };
                if changed {
                    self.emit_participants();
                }
            }

            PeerEvent::Failed(error) => {
                // One bad peer never closes the meeting.
                self.emit_error(&error);
                self.remove_peer(peer_id, PeerStatus::Failed);
            }

            PeerEvent::Closed => {
                self.remove_peer(peer_id, PeerStatus::Closed);
            }

            PeerEvent::ChatOpen => {
                if let Some(peer) = self.peers.get_mut(peer_id) {
                    peer.chat_open = true;
                }
                self.flush_pending_chat().await;
            }

            PeerEvent::ChatClosed => {
                if let Some(peer) = self.peers.get_mut(peer_id) {
                    peer.chat_open = false;
                }
            }

            PeerEvent::ChatReceived(message) => {
                if self.chat.accept_remote(message.clone()) {
                    metrics::record_chat_message("received");
                    self.emit(SessionEvent::Chat { message });
                }
            }
        }
    }

    /// Retry queued chat messages now that a channel (re)opened. Send order
    /// per sender is preserved.
    async fn flush_pending_chat(&mut self) {
        if !self.chat.has_pending() {
            return;
        }

        let pending = self.chat.take_pending();
        let open: Vec<PeerSessionHandle> = self
            .peers
            .values()
            .filter(|p| p.chat_open)
            .map(|p| p.handle.clone())
            .collect();

        for message in pending {
            match chat::encode_wire(&message) {
                Ok(data) => {
                    for handle in &open {
                        let _ = handle.send_data(data.clone()).await;
                    }
                    metrics::record_chat_message("sent");
                }
                Err(e) => {
                    warn!(
                        target: "meet.session",
                        meeting_id = %self.meeting_id,
                        error = %e,
                        "Dropping unencodable pending chat message"
                    );
                }
            }
        }
    }

    /// Drop one peer and its Participant entry.
    fn remove_peer(&mut self, peer_id: &PeerId, status: PeerStatus) {
        if let Some(peer) = self.peers.remove(peer_id) {
            peer.handle.cancel();
            metrics::set_peer_sessions_active(self.peers.len());

            self.emit(SessionEvent::ConnectionStatusChanged {
                peer_id: peer_id.clone(),
                status,
            });
            if peer.participant.is_some() {
                self.emit_participants();
            }

            info!(
                target: "meet.session",
                meeting_id = %self.meeting_id,
                peer_id = %peer_id,
                remaining_peers = self.peers.len(),
                "Peer removed"
            );
            // Zero peers: the meeting continues solo, no state change.
        }
    }

    /// Explicit teardown: `Leaving`, then `Closed`.
    async fn shutdown(&mut self) {
        if self.state == SessionState::Closed {
            return;
        }
        self.set_state(SessionState::Leaving);

        info!(
            target: "meet.session",
            meeting_id = %self.meeting_id,
            peers = self.peers.len(),
            "Leaving meeting"
        );

        // Stop local tracks first so capture indicators go dark immediately.
        if let Some(stream) = self.local.take() {
            MediaController::release(&stream);
        }

        // Bye to every open peer session, then bounded waits on their tasks.
        for peer in self.peers.values() {
            let _ = peer.handle.bye().await;
        }

        for (peer_id, peer) in self.peers.drain() {
            peer.handle.cancel();
            match tokio::time::timeout(PEER_SHUTDOWN_TIMEOUT, peer.task_handle).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    warn!(
                        target: "meet.session",
                        meeting_id = %self.meeting_id,
                        peer_id = %peer_id,
                        error = ?e,
                        "Peer task panicked during teardown"
                    );
                }
                Err(_) => {
                    warn!(
                        target: "meet.session",
                        meeting_id = %self.meeting_id,
                        peer_id = %peer_id,
                        "Peer teardown timed out"
                    );
                }
            }
        }
        metrics::set_peer_sessions_active(0);

        self.set_state(SessionState::Closed);
        self.cancel_token.cancel();
    }

    fn set_state(&mut self, state: SessionState) {
        self.state = state;
        let _ = self.state_tx.send(state);
    }

    fn local_media_info(&self) -> LocalMediaInfo {
        match &self.local {
            Some(stream) => LocalMediaInfo {
                source: stream.source(),
                audio_enabled: stream.is_track_enabled(TrackKind::Audio).unwrap_or(false),
                video_enabled: stream.is_track_enabled(TrackKind::Video).unwrap_or(false),
            },
            None => LocalMediaInfo {
                source: StreamSource::Camera,
                audio_enabled: false,
                video_enabled: false,
            },
        }
    }

    /// Participant snapshot, self entry first, then connected remote peers.
    fn participants_snapshot(&self) -> Vec<ParticipantInfo> {
        let media = self.local_media_info();
        let mut participants = vec![ParticipantInfo {
            id: self.self_id.clone(),
            display_name: self.display_name.clone(),
            is_host: self.is_host,
            is_self: true,
            audio_enabled: media.audio_enabled,
            video_enabled: media.video_enabled,
            quality: ConnectionQuality::Good,
        }];

        participants.extend(self.peers.iter().filter_map(|(peer_id, peer)| {
            peer.participant.as_ref().map(|participant| ParticipantInfo {
                id: peer_id.clone(),
                display_name: peer.display_name.clone(),
                is_host: false,
                is_self: false,
                audio_enabled: true,
                video_enabled: true,
                quality: participant.quality,
            })
        }));

        participants
    }

    fn emit_participants(&self) {
        self.emit(SessionEvent::ParticipantsChanged {
            participants: self.participants_snapshot(),
        });
    }

    /// Surface a user-visible failure exactly once.
    fn emit_error(&self, error: &SessionError) {
        warn!(
            target: "meet.session",
            meeting_id = %self.meeting_id,
            error = %error,
            "Session error"
        );
        self.emit(SessionEvent::Error {
            kind: error.kind(),
            message: error.to_string(),
        });
    }

    fn emit(&self, event: SessionEvent) {
        // No subscribers is fine; the UI may not have attached yet.
        let _ = self.events.send(event);
    }
}

/// Forward inbound signaling into the session mailbox.
async fn signal_pump(
    mut signals: mpsc::Receiver<SignalMessage>,
    tx: mpsc::Sender<SessionMessage>,
    cancel: CancellationToken,
) {
    loop {
        tokio::select! {
            () = cancel.cancelled() => break,
            message = signals.recv() => {
                match message {
                    Some(message) => {
                        if tx.send(SessionMessage::Signal(message)).await.is_err() {
                            break;
                        }
                    }
                    None => break,
                }
            }
        }
    }
}

/// Wait for the active screen stream to end, or forever when not sharing.
async fn wait_ended(token: Option<CancellationToken>) {
    match token {
        Some(token) => token.cancelled_owned().await,
        None => std::future::pending().await,
    }
}
