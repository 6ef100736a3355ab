//! In-memory signaling hub.
//!
//! Routes messages between registered test peers over plain `mpsc` channels,
//! preserving per-peer send order the way a real signaling server would. The
//! hub can be taken down to inject `SignalingUnavailable`.

use async_trait::async_trait;
use common::PeerId;
use session_core::signaling::{SignalingClient, SignalingError};
use signal_protocol::SignalMessage;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;

/// Per-peer inbound channel buffer.
const ROUTE_BUFFER: usize = 64;

#[derive(Debug, Default)]
struct HubInner {
    routes: HashMap<PeerId, mpsc::Sender<SignalMessage>>,
    down: bool,
    sent: Vec<SignalMessage>,
}

/// In-memory signaling fabric shared by every test peer.
#[derive(Debug, Clone, Default)]
pub struct SignalingHub {
    inner: Arc<Mutex<HubInner>>,
}

impl SignalingHub {
    /// Create an empty hub.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a peer and return its outbound client plus inbound stream.
    #[must_use]
    pub fn client(&self, peer_id: impl Into<PeerId>) -> (Arc<HubClient>, mpsc::Receiver<SignalMessage>) {
        let peer_id = peer_id.into();
        let (tx, rx) = mpsc::channel(ROUTE_BUFFER);
        self.inner.lock().unwrap().routes.insert(peer_id.clone(), tx);

        (
            Arc::new(HubClient {
                inner: Arc::clone(&self.inner),
                peer_id,
            }),
            rx,
        )
    }

    /// Take the hub down (sends fail) or bring it back up.
    pub fn set_down(&self, down: bool) {
        self.inner.lock().unwrap().down = down;
    }

    /// Every message successfully submitted so far, in submission order.
    #[must_use]
    pub fn sent_log(&self) -> Vec<SignalMessage> {
        self.inner.lock().unwrap().sent.clone()
    }
}

/// Outbound signaling for one registered peer.
#[derive(Debug)]
pub struct HubClient {
    inner: Arc<Mutex<HubInner>>,
    peer_id: PeerId,
}

impl HubClient {
    /// The peer this client sends as.
    #[must_use]
    pub fn peer_id(&self) -> &PeerId {
        &self.peer_id
    }
}

#[async_trait]
impl SignalingClient for HubClient {
    async fn send(&self, message: SignalMessage) -> Result<(), SignalingError> {
        let route = {
            let mut inner = self.inner.lock().unwrap();
            if inner.down {
                return Err(SignalingError::Unavailable("hub is down".to_string()));
            }
            inner.sent.push(message.clone());
            inner.routes.get(&message.to).cloned()
        };

        // Unknown or departed destination: best effort, silently dropped.
        if let Some(route) = route {
            let _ = route.send(message).await;
        }
        Ok(())
    }
}
