//! Scriptable peer engine mock.
//!
//! The connector records one `MockPeerTransport` per peer; tests fetch a
//! [`PeerControl`] to drive connectivity, the data channel, and candidate
//! trickle, and to assert on what the session applied.

use async_trait::async_trait;
use bytes::Bytes;
use common::PeerId;
use session_core::media::LocalStream;
use session_core::transport::{
    ConnectivityState, PeerConnector, PeerTransport, TransportError, TransportEvent,
    TransportStats,
};
use signal_protocol::{IceCandidate, SessionDescription};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;

/// Transport event channel buffer.
const EVENT_BUFFER: usize = 64;

/// How long `control()` waits for the session to construct the engine.
const CONTROL_WAIT: Duration = Duration::from_secs(2);

#[derive(Debug, Default)]
struct TransportState {
    local_description: Option<SessionDescription>,
    remote_description: Option<SessionDescription>,
    applied_candidates: Vec<IceCandidate>,
    attached_streams: Vec<LocalStream>,
    sent_data: Vec<Bytes>,
    restart_ice_calls: usize,
    closed: bool,
    stats: Option<TransportStats>,
}

/// One mock engine instance.
#[derive(Debug)]
pub struct MockPeerTransport {
    peer_id: PeerId,
    state: Mutex<TransportState>,
}

impl MockPeerTransport {
    fn new(peer_id: PeerId) -> Self {
        Self {
            peer_id,
            state: Mutex::new(TransportState {
                stats: Some(TransportStats {
                    round_trip_ms: 50,
                    packet_loss_pct: 0.0,
                }),
                ..TransportState::default()
            }),
        }
    }

    /// Candidates applied by the session, in application order.
    #[must_use]
    pub fn applied_candidates(&self) -> Vec<IceCandidate> {
        self.state.lock().unwrap().applied_candidates.clone()
    }

    /// The remote description applied by the session, if any.
    #[must_use]
    pub fn remote_description(&self) -> Option<SessionDescription> {
        self.state.lock().unwrap().remote_description.clone()
    }

    /// The local description the engine produced, if any.
    #[must_use]
    pub fn local_description(&self) -> Option<SessionDescription> {
        self.state.lock().unwrap().local_description.clone()
    }

    /// Streams attached by the session, in attachment order.
    #[must_use]
    pub fn attached_streams(&self) -> Vec<LocalStream> {
        self.state.lock().unwrap().attached_streams.clone()
    }

    /// Data-channel payloads sent by the session, in send order.
    #[must_use]
    pub fn sent_data(&self) -> Vec<Bytes> {
        self.state.lock().unwrap().sent_data.clone()
    }

    /// Number of ICE restarts requested.
    #[must_use]
    pub fn restart_ice_calls(&self) -> usize {
        self.state.lock().unwrap().restart_ice_calls
    }

    /// Whether the session closed the engine.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.state.lock().unwrap().closed
    }

    /// Script the next stats sample.
    pub fn set_stats(&self, round_trip_ms: u32, packet_loss_pct: f32) {
        self.state.lock().unwrap().stats = Some(TransportStats {
            round_trip_ms,
            packet_loss_pct,
        });
    }
}

#[async_trait]
impl PeerTransport for MockPeerTransport {
    async fn create_offer(&self) -> Result<SessionDescription, TransportError> {
        let mut state = self.state.lock().unwrap();
        let description = SessionDescription::new(format!("offer-for-{}", self.peer_id));
        state.local_description = Some(description.clone());
        Ok(description)
    }

    async fn create_answer(&self) -> Result<SessionDescription, TransportError> {
        let mut state = self.state.lock().unwrap();
        if state.remote_description.is_none() {
            return Err(TransportError::Failed(
                "create_answer before remote description".to_string(),
            ));
        }
        let description = SessionDescription::new(format!("answer-for-{}", self.peer_id));
        state.local_description = Some(description.clone());
        Ok(description)
    }

    async fn set_remote_description(
        &self,
        description: SessionDescription,
    ) -> Result<(), TransportError> {
        self.state.lock().unwrap().remote_description = Some(description);
        Ok(())
    }

    async fn add_remote_candidate(&self, candidate: IceCandidate) -> Result<(), TransportError> {
        let mut state = self.state.lock().unwrap();
        // A real engine rejects this; the negotiation queue must prevent it.
        if state.remote_description.is_none() {
            return Err(TransportError::Failed(
                "candidate before remote description".to_string(),
            ));
        }
        state.applied_candidates.push(candidate);
        Ok(())
    }

    async fn restart_ice(&self) -> Result<(), TransportError> {
        self.state.lock().unwrap().restart_ice_calls += 1;
        Ok(())
    }

    async fn attach_stream(&self, stream: &LocalStream) -> Result<(), TransportError> {
        let mut state = self.state.lock().unwrap();
        if state.closed {
            return Err(TransportError::Closed);
        }
        state.attached_streams.push(stream.clone());
        Ok(())
    }

    async fn send_data(&self, data: Bytes) -> Result<(), TransportError> {
        self.state.lock().unwrap().sent_data.push(data);
        Ok(())
    }

    async fn stats(&self) -> Result<TransportStats, TransportError> {
        self.state
            .lock()
            .unwrap()
            .stats
            .ok_or_else(|| TransportError::Failed("no stats available".to_string()))
    }

    async fn close(&self) {
        self.state.lock().unwrap().closed = true;
    }
}

#[derive(Default)]
struct ConnectorInner {
    transports: HashMap<PeerId, Arc<MockPeerTransport>>,
    event_senders: HashMap<PeerId, mpsc::Sender<TransportEvent>>,
}

/// Mock engine factory handing out one transport per peer.
#[derive(Clone, Default)]
pub struct MockConnector {
    inner: Arc<Mutex<ConnectorInner>>,
}

impl MockConnector {
    /// Create an empty connector.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Fetch the control handle for a peer, waiting for the session to
    /// construct its engine first.
    ///
    /// # Panics
    ///
    /// Panics if the engine is not constructed within two seconds.
    pub async fn control(&self, peer_id: &PeerId) -> PeerControl {
        let deadline = tokio::time::Instant::now() + CONTROL_WAIT;
        loop {
            {
                let inner = self.inner.lock().unwrap();
                if let (Some(transport), Some(events)) = (
                    inner.transports.get(peer_id),
                    inner.event_senders.get(peer_id),
                ) {
                    return PeerControl {
                        transport: Arc::clone(transport),
                        events: events.clone(),
                    };
                }
            }
            assert!(
                tokio::time::Instant::now() < deadline,
                "no engine constructed for peer {peer_id}"
            );
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    }

    /// The transport for a peer, if the session constructed one.
    #[must_use]
    pub fn transport(&self, peer_id: &PeerId) -> Option<Arc<MockPeerTransport>> {
        self.inner.lock().unwrap().transports.get(peer_id).cloned()
    }
}

impl PeerConnector for MockConnector {
    fn connect(
        &self,
        peer_id: &PeerId,
    ) -> Result<(Arc<dyn PeerTransport>, mpsc::Receiver<TransportEvent>), TransportError> {
        let (tx, rx) = mpsc::channel(EVENT_BUFFER);
        let transport = Arc::new(MockPeerTransport::new(peer_id.clone()));

        let mut inner = self.inner.lock().unwrap();
        inner.transports.insert(peer_id.clone(), Arc::clone(&transport));
        inner.event_senders.insert(peer_id.clone(), tx);

        Ok((transport, rx))
    }
}

/// Test-side driver for one peer's engine.
#[derive(Clone)]
pub struct PeerControl {
    transport: Arc<MockPeerTransport>,
    events: mpsc::Sender<TransportEvent>,
}

impl PeerControl {
    /// The underlying transport, for assertions.
    #[must_use]
    pub fn transport(&self) -> &Arc<MockPeerTransport> {
        &self.transport
    }

    /// Report connectivity success.
    pub async fn connected(&self) {
        self.emit(TransportEvent::Connectivity(ConnectivityState::Connected))
            .await;
    }

    /// Report transport loss without teardown.
    pub async fn disconnect(&self) {
        self.emit(TransportEvent::Connectivity(ConnectivityState::Disconnected))
            .await;
    }

    /// Report terminal engine failure.
    pub async fn fail(&self) {
        self.emit(TransportEvent::Connectivity(ConnectivityState::Failed))
            .await;
    }

    /// Report engine closure.
    pub async fn closed(&self) {
        self.emit(TransportEvent::Connectivity(ConnectivityState::Closed))
            .await;
    }

    /// Open the data channel.
    pub async fn open_data_channel(&self) {
        self.emit(TransportEvent::DataChannelOpen).await;
    }

    /// Close the data channel.
    pub async fn close_data_channel(&self) {
        self.emit(TransportEvent::DataChannelClosed).await;
    }

    /// Trickle a local candidate out of the engine.
    pub async fn emit_candidate(&self, raw: impl Into<String>) {
        self.emit(TransportEvent::LocalCandidate(IceCandidate::new(raw)))
            .await;
    }

    /// Deliver inbound data-channel bytes.
    pub async fn deliver_data(&self, data: Bytes) {
        self.emit(TransportEvent::Data(data)).await;
    }

    async fn emit(&self, event: TransportEvent) {
        self.events
            .send(event)
            .await
            .expect("peer session dropped its transport event channel");
    }
}
