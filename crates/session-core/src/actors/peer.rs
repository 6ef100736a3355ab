//! `PeerSession` - per-remote-peer actor.
//!
//! Each `PeerSession`:
//! - Owns exactly one `NegotiationSession` and one transport instance
//! - Drives the offer/answer/candidate exchange over signaling
//! - Watches transport connectivity and runs the reconnect window
//! - Samples connection quality on a fixed cadence
//! - Relays data-channel traffic for chat
//!
//! # Lifecycle
//!
//! 1. Spawned by the session manager when a peer is announced (offerer) or
//!    when an offer arrives from an unknown peer (answerer)
//! 2. Runs until `Bye`, negotiation failure, or session teardown
//! 3. Cancellation via child token propagates from the session manager

use crate::actors::messages::{PeerCommand, PeerEvent, SessionMessage};
use crate::actors::metrics::{self, ActorType, MailboxMonitor};
use crate::actors::negotiation::{NegotiationPhase, NegotiationSession, Role};
use crate::chat;
use crate::config;
use crate::errors::SessionError;
use crate::events::ConnectionQuality;
use crate::media::LocalStream;
use crate::signaling::SignalingClient;
use crate::transport::{ConnectivityState, PeerTransport, TransportEvent, TransportStats};

use common::PeerId;
use signal_protocol::{SessionDescription, SignalBody, SignalMessage};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

/// Default channel buffer size for the peer mailbox.
const PEER_CHANNEL_BUFFER: usize = 200;

/// Timing knobs a peer session needs from the session config.
#[derive(Debug, Clone, Copy)]
pub struct PeerTiming {
    /// ICE-restart window after transport loss.
    pub reconnect_window: Duration,
    /// Quality sampling cadence.
    pub quality_sample_interval: Duration,
}

/// Handle to a `PeerSession`.
#[derive(Clone)]
pub struct PeerSessionHandle {
    sender: mpsc::Sender<PeerCommand>,
    cancel_token: CancellationToken,
    peer_id: PeerId,
}

impl PeerSessionHandle {
    /// The remote peer this session negotiates with.
    #[must_use]
    pub fn peer_id(&self) -> &PeerId {
        &self.peer_id
    }

    /// Route a signaling message to this peer's negotiation.
    pub async fn signal(&self, message: SignalMessage) -> Result<(), SessionError> {
        self.sender
            .send(PeerCommand::Signal(message))
            .await
            .map_err(|_| SessionError::SessionClosed)
    }

    /// Re-attach the local stream (after a camera/screen swap).
    pub async fn attach_stream(&self, stream: LocalStream) -> Result<(), SessionError> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(PeerCommand::AttachStream {
                stream,
                respond_to: tx,
            })
            .await
            .map_err(|_| SessionError::SessionClosed)?;

        rx.await.map_err(|_| SessionError::SessionClosed)?
    }

    /// Transmit bytes on this peer's data channel.
    pub async fn send_data(&self, data: bytes::Bytes) -> Result<(), SessionError> {
        self.sender
            .send(PeerCommand::SendData { data })
            .await
            .map_err(|_| SessionError::SessionClosed)
    }

    /// Send `Bye` and tear the session down. Resolves once the peer actor
    /// processed the teardown, so callers can cancel safely afterwards.
    pub async fn bye(&self) -> Result<(), SessionError> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(PeerCommand::Bye { respond_to: tx })
            .await
            .map_err(|_| SessionError::SessionClosed)?;

        // An already-dead actor is fine; the teardown goal is met either way.
        let _ = rx.await;
        Ok(())
    }

    /// Cancel the peer actor.
    pub fn cancel(&self) {
        self.cancel_token.cancel();
    }

    /// Check if the actor is cancelled.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancel_token.is_cancelled()
    }
}

/// The `PeerSession` implementation.
pub struct PeerSession {
    self_id: PeerId,
    peer_id: PeerId,
    negotiation: NegotiationSession,
    transport: Arc<dyn PeerTransport>,
    transport_events: mpsc::Receiver<TransportEvent>,
    signaling: Arc<dyn SignalingClient>,
    session_tx: mpsc::Sender<SessionMessage>,
    receiver: mpsc::Receiver<PeerCommand>,
    cancel_token: CancellationToken,
    timing: PeerTiming,
    quality_timer: tokio::time::Interval,
    reconnect_deadline: Option<Instant>,
    last_quality: Option<ConnectionQuality>,
    local_stream: Option<LocalStream>,
    initial_offer: Option<SessionDescription>,
    chat_open: bool,
    mailbox: MailboxMonitor,
}

impl PeerSession {
    /// Spawn a peer session.
    ///
    /// `initial_offer` decides the role: `Some` answers the given remote
    /// offer, `None` creates and sends our own offer.
    ///
    /// Returns a handle and the task join handle.
    #[allow(clippy::too_many_arguments)]
    pub fn spawn(
        self_id: PeerId,
        peer_id: PeerId,
        timing: PeerTiming,
        transport: Arc<dyn PeerTransport>,
        transport_events: mpsc::Receiver<TransportEvent>,
        signaling: Arc<dyn SignalingClient>,
        session_tx: mpsc::Sender<SessionMessage>,
        local_stream: Option<LocalStream>,
        initial_offer: Option<SessionDescription>,
        cancel_token: CancellationToken,
    ) -> (PeerSessionHandle, JoinHandle<()>) {
        let (sender, receiver) = mpsc::channel(PEER_CHANNEL_BUFFER);

        let role = if initial_offer.is_some() {
            Role::Answerer
        } else {
            Role::Offerer
        };

        let actor = Self {
            self_id,
            peer_id: peer_id.clone(),
            negotiation: NegotiationSession::new(peer_id.clone(), role),
            transport,
            transport_events,
            signaling,
            session_tx,
            receiver,
            cancel_token: cancel_token.clone(),
            timing,
            quality_timer: tokio::time::interval(timing.quality_sample_interval),
            reconnect_deadline: None,
            last_quality: None,
            local_stream,
            initial_offer,
            chat_open: false,
            mailbox: MailboxMonitor::new(ActorType::Peer, peer_id.as_str()),
        };

        let task_handle = tokio::spawn(actor.run());

        let handle = PeerSessionHandle {
            sender,
            cancel_token,
            peer_id,
        };

        (handle, task_handle)
    }

    /// Run the actor message loop.
    #[instrument(skip_all, name = "meet.peer", fields(peer_id = %self.peer_id))]
    async fn run(mut self) {
        debug!(
            target: "meet.peer",
            peer_id = %self.peer_id,
            role = ?self.negotiation.role(),
            "PeerSession started"
        );

        let cancel = self.cancel_token.clone();
        let started = tokio::select! {
            () = cancel.cancelled() => {
                self.transport.close().await;
                return;
            }
            result = self.start_negotiation() => result,
        };

        if let Err(err) = started {
            self.fail(err).await;
            return;
        }

        loop {
            let deadline = self.reconnect_deadline;

            tokio::select! {
                () = self.cancel_token.cancelled() => {
                    debug!(
                        target: "meet.peer",
                        peer_id = %self.peer_id,
                        "PeerSession received cancellation signal"
                    );
                    self.negotiation.close();
                    self.transport.close().await;
                    break;
                }

                () = wait_deadline(deadline) => {
                    self.negotiation.mark_failed();
                    self.fail(SessionError::NegotiationFailed {
                        peer_id: self.peer_id.clone(),
                        cause: "reconnect window expired".to_string(),
                    })
                    .await;
                    break;
                }

                _ = self.quality_timer.tick() => {
                    self.sample_quality().await;
                }

                event = self.transport_events.recv() => {
                    match event {
                        Some(event) => {
                            if self.handle_transport_event(event).await {
                                break;
                            }
                        }
                        None => {
                            // Engine dropped its event channel; treat as closed.
                            if !self.negotiation.is_terminal() {
                                self.negotiation.close();
                                self.notify(PeerEvent::Closed).await;
                            }
                            self.transport.close().await;
                            break;
                        }
                    }
                }

                msg = self.receiver.recv() => {
                    match msg {
                        Some(command) => {
                            self.mailbox.record_enqueue();
                            let should_exit = self.handle_command(command).await;
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
            target: "meet.peer",
            peer_id = %self.peer_id,
            phase = ?self.negotiation.phase(),
            messages_processed = self.mailbox.messages_processed(),
            "PeerSession stopped"
        );
    }

    /// First negotiation step for either role.
    async fn start_negotiation(&mut self) -> Result<(), SessionError> {
        if let Some(stream) = self.local_stream.clone() {
            self.transport
                .attach_stream(&stream)
                .await
                .map_err(|e| self.negotiation_error(format!("stream attach failed: {e}")))?;
        }

        match self.initial_offer.take() {
            // Answerer: apply the remote offer, answer it.
            Some(offer) => {
                let drained = self.negotiation.set_remote_description(offer.clone());
                self.transport
                    .set_remote_description(offer)
                    .await
                    .map_err(|e| self.negotiation_error(format!("remote offer rejected: {e}")))?;
                self.apply_candidates(drained).await;

                let answer = self
                    .transport
                    .create_answer()
                    .await
                    .map_err(|e| self.negotiation_error(format!("answer failed: {e}")))?;
                self.negotiation.set_local_description(answer.clone());

                self.signaling
                    .send(SignalMessage::answer(
                        self.self_id.clone(),
                        self.peer_id.clone(),
                        answer,
                    ))
                    .await
                    .map_err(SessionError::from)?;
            }

            // Offerer: create and send our offer, then wait for the answer.
            None => {
                let offer = self
                    .transport
                    .create_offer()
                    .await
                    .map_err(|e| self.negotiation_error(format!("offer failed: {e}")))?;
                self.negotiation.set_local_description(offer.clone());

                self.signaling
                    .send(SignalMessage::offer(
                        self.self_id.clone(),
                        self.peer_id.clone(),
                        offer,
                    ))
                    .await
                    .map_err(SessionError::from)?;
            }
        }

        Ok(())
    }

    /// Handle one engine event. Returns true if the actor should exit.
    async fn handle_transport_event(&mut self, event: TransportEvent) -> bool {
        match event {
            TransportEvent::LocalCandidate(candidate) => {
                // Trickle to the remote side, best effort.
                let message = SignalMessage::candidate(
                    self.self_id.clone(),
                    self.peer_id.clone(),
                    candidate,
                );
                if let Err(e) = self.signaling.send(message).await {
                    warn!(
                        target: "meet.peer",
                        peer_id = %self.peer_id,
                        error = %e,
                        "Dropping local candidate, signaling down"
                    );
                }
                false
            }

            TransportEvent::Connectivity(state) => self.handle_connectivity(state).await,

            TransportEvent::DataChannelOpen => {
                self.chat_open = true;
                self.notify(PeerEvent::ChatOpen).await;
                false
            }

            TransportEvent::DataChannelClosed => {
                self.chat_open = false;
                self.notify(PeerEvent::ChatClosed).await;
                false
            }

            TransportEvent::Data(data) => {
                match chat::decode_wire(&data) {
                    Ok(message) => self.notify(PeerEvent::ChatReceived(message)).await,
                    Err(e) => {
                        warn!(
                            target: "meet.peer",
                            peer_id = %self.peer_id,
                            error = %e,
                            "Dropping malformed data channel payload"
                        );
                    }
                }
                false
            }
        }
    }

    /// Handle a connectivity change. Returns true if the actor should exit.
    async fn handle_connectivity(&mut self, state: ConnectivityState) -> bool {
        match state {
            ConnectivityState::Checking => false,

            ConnectivityState::Connected => {
                self.reconnect_deadline = None;
                if self.negotiation.mark_connected() {
                    self.notify(PeerEvent::Connected).await;
                } else {
                    self.notify(PeerEvent::Reconnected).await;
                }
                false
            }

            ConnectivityState::Disconnected => {
                if self.negotiation.mark_disconnected() {
                    if let Err(e) = self.transport.restart_ice().await {
                        warn!(
                            target: "meet.peer",
                            peer_id = %self.peer_id,
                            error = %e,
                            "ICE restart rejected"
                        );
                    }
                    self.reconnect_deadline = Some(Instant::now() + self.timing.reconnect_window);
                    self.notify(PeerEvent::Reconnecting).await;
                }
                false
            }

            ConnectivityState::Failed => {
                self.negotiation.mark_failed();
                self.fail(SessionError::NegotiationFailed {
                    peer_id: self.peer_id.clone(),
                    cause: "no viable connection path".to_string(),
                })
                .await;
                true
            }

            ConnectivityState::Closed => {
                if !self.negotiation.is_terminal() {
                    self.negotiation.close();
                    self.notify(PeerEvent::Closed).await;
                }
                self.transport.close().await;
                true
            }
        }
    }

    /// Handle one command. Returns true if the actor should exit.
    async fn handle_command(&mut self, command: PeerCommand) -> bool {
        match command {
            PeerCommand::Signal(message) => self.handle_signal(message).await,

            PeerCommand::AttachStream { stream, respond_to } => {
                self.local_stream = Some(stream.clone());
                let result = self
                    .transport
                    .attach_stream(&stream)
                    .await
                    .map_err(|e| SessionError::Internal(format!("stream attach failed: {e}")));
                let _ = respond_to.send(result);
                false
            }

            PeerCommand::SendData { data } => {
                if self.chat_open {
                    if let Err(e) = self.transport.send_data(data).await {
                        warn!(
                            target: "meet.peer",
                            peer_id = %self.peer_id,
                            error = %e,
                            "Data channel send failed"
                        );
                    }
                }
                false
            }

            PeerCommand::Bye { respond_to } => {
                let message = SignalMessage::bye(self.self_id.clone(), self.peer_id.clone());
                if let Err(e) = self.signaling.send(message).await {
                    debug!(
                        target: "meet.peer",
                        peer_id = %self.peer_id,
                        error = %e,
                        "Bye not delivered, tearing down anyway"
                    );
                }
                self.negotiation.close();
                self.transport.close().await;
                self.notify(PeerEvent::Closed).await;
                let _ = respond_to.send(());
                true
            }
        }
    }

    /// Handle a routed signaling message. Returns true on teardown.
    async fn handle_signal(&mut self, message: SignalMessage) -> bool {
        match message.body {
            SignalBody::Answer(description) => {
                if self.negotiation.role() != Role::Offerer
                    || self.negotiation.has_remote_description()
                {
                    warn!(
                        target: "meet.peer",
                        peer_id = %self.peer_id,
                        "Unexpected answer, ignoring"
                    );
                    return false;
                }

                let drained = self.negotiation.set_remote_description(description.clone());
                if let Err(e) = self.transport.set_remote_description(description).await {
                    self.negotiation.mark_failed();
                    self.fail(self.negotiation_error(format!("remote answer rejected: {e}")))
                        .await;
                    return true;
                }
                self.apply_candidates(drained).await;
                false
            }

            SignalBody::Offer(_) => {
                // Mid-session renegotiation is not part of this design.
                warn!(
                    target: "meet.peer",
                    peer_id = %self.peer_id,
                    "Unexpected offer for established session, ignoring"
                );
                false
            }

            SignalBody::Candidate(candidate) => {
                if let Some(ready) = self.negotiation.route_candidate(candidate) {
                    self.apply_candidates(vec![ready]).await;
                }
                false
            }

            SignalBody::Bye => {
                debug!(target: "meet.peer", peer_id = %self.peer_id, "Bye received");
                self.negotiation.close();
                self.reconnect_deadline = None;
                self.transport.close().await;
                self.notify(PeerEvent::Closed).await;
                true
            }
        }
    }

    /// Apply candidates to the engine in the given (arrival) order.
    async fn apply_candidates(&mut self, candidates: Vec<signal_protocol::IceCandidate>) {
        for candidate in candidates {
            if let Err(e) = self.transport.add_remote_candidate(candidate).await {
                warn!(
                    target: "meet.peer",
                    peer_id = %self.peer_id,
                    error = %e,
                    "Candidate rejected by engine"
                );
            }
        }
    }

    /// One quality sample; skipped unless connected so sampling never delays
    /// signaling work.
    async fn sample_quality(&mut self) {
        if self.negotiation.phase() != NegotiationPhase::Connected {
            return;
        }

        match self.transport.stats().await {
            Ok(stats) => {
                let quality = classify_quality(stats);
                if self.last_quality != Some(quality) {
                    self.last_quality = Some(quality);
                    self.notify(PeerEvent::QualitySampled(quality)).await;
                }
            }
            Err(e) => {
                debug!(
                    target: "meet.peer",
                    peer_id = %self.peer_id,
                    error = %e,
                    "Stats sample unavailable"
                );
            }
        }
    }

    /// Terminal failure: report, count, release the engine.
    async fn fail(&mut self, error: SessionError) {
        metrics::record_negotiation_failure();
        self.notify(PeerEvent::Failed(error)).await;
        self.transport.close().await;
    }

    fn negotiation_error(&self, cause: String) -> SessionError {
        SessionError::NegotiationFailed {
            peer_id: self.peer_id.clone(),
            cause,
        }
    }

    async fn notify(&self, event: PeerEvent) {
        let _ = self
            .session_tx
            .send(SessionMessage::Peer {
                peer_id: self.peer_id.clone(),
                event,
            })
            .await;
    }
}

/// Sleep until the reconnect deadline, or forever when none is armed.
async fn wait_deadline(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

/// Classify one stats sample against the documented thresholds.
#[must_use]
pub fn classify_quality(stats: TransportStats) -> ConnectionQuality {
    if stats.round_trip_ms > config::QUALITY_POOR_MIN_RTT_MS
        || stats.packet_loss_pct > config::QUALITY_POOR_MIN_LOSS_PCT
    {
        ConnectionQuality::Poor
    } else if stats.round_trip_ms < config::QUALITY_GOOD_MAX_RTT_MS
        && stats.packet_loss_pct < config::QUALITY_GOOD_MAX_LOSS_PCT
    {
        ConnectionQuality::Good
    } else {
        ConnectionQuality::Fair
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_quality_classification_thresholds() {
        assert_eq!(
            classify_quality(TransportStats {
                round_trip_ms: 40,
                packet_loss_pct: 0.0
            }),
            ConnectionQuality::Good
        );
        assert_eq!(
            classify_quality(TransportStats {
                round_trip_ms: 200,
                packet_loss_pct: 1.0
            }),
            ConnectionQuality::Fair
        );
        assert_eq!(
            classify_quality(TransportStats {
                round_trip_ms: 500,
                packet_loss_pct: 0.0
            }),
            ConnectionQuality::Poor
        );
        assert_eq!(
            classify_quality(TransportStats {
                round_trip_ms: 40,
                packet_loss_pct: 12.0
            }),
            ConnectionQuality::Poor
        );
    }
}
