//! Pre-wired sessions and event assertion helpers.

use crate::mock_media::MockMediaProvider;
use crate::mock_signaling::SignalingHub;
use crate::mock_transport::MockConnector;
use common::{MeetingId, PeerId};
use session_core::{
    ErrorKind, JoinOptions, SessionConfig, SessionEvent, SessionHandle, SessionManager,
    SessionState,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

/// Default assertion timeout.
pub const EVENT_TIMEOUT: Duration = Duration::from_secs(2);

/// A session wired to mocks, plus handles to drive them.
pub struct TestSession {
    /// The handle under test.
    pub handle: SessionHandle,
    /// The manager task.
    pub task: JoinHandle<()>,
    /// The signaling fabric (register remote peers here).
    pub hub: SignalingHub,
    /// The engine factory (fetch per-peer controls here).
    pub connector: Arc<MockConnector>,
    /// The media provider.
    pub media: Arc<MockMediaProvider>,
    /// An event subscription opened before the session could emit anything.
    pub events: broadcast::Receiver<SessionEvent>,
}

impl TestSession {
    /// Spawn a session wired to fresh mocks, without waiting for `Active`.
    #[must_use]
    pub fn spawn(self_id: &str, meeting_id: &str, media: MockMediaProvider) -> Self {
        Self::spawn_with_config(self_id, meeting_id, media, SessionConfig::default())
    }

    /// Spawn with an explicit config (e.g. a short reconnect window).
    #[must_use]
    pub fn spawn_with_config(
        self_id: &str,
        meeting_id: &str,
        media: MockMediaProvider,
        config: SessionConfig,
    ) -> Self {
        let hub = SignalingHub::new();
        let connector = Arc::new(MockConnector::new());
        let media = Arc::new(media);
        let (signaling, signals) = hub.client(self_id);

        let media_provider =
            Arc::clone(&media) as Arc<dyn session_core::media::MediaProvider>;
        let signaling_client: Arc<dyn session_core::signaling::SignalingClient> = signaling;
        let peer_connector =
            Arc::clone(&connector) as Arc<dyn session_core::transport::PeerConnector>;

        let (handle, task) = SessionManager::spawn(JoinOptions {
            meeting_id: MeetingId::from(meeting_id),
            self_id: PeerId::from(self_id),
            display_name: format!("{self_id} (test)"),
            is_host: true,
            config,
            media: media_provider,
            signaling: signaling_client,
            signals,
            connector: peer_connector,
        });

        let events = handle.subscribe();

        Self {
            handle,
            task,
            hub,
            connector,
            media,
            events,
        }
    }

    /// Spawn with working media and wait until the session is `Active`.
    pub async fn join_active(self_id: &str, meeting_id: &str) -> Self {
        let session = Self::spawn(self_id, meeting_id, MockMediaProvider::new());
        session.wait_for_state(SessionState::Active).await;
        session
    }

    /// Wait for the session to reach `state`.
    ///
    /// # Panics
    ///
    /// Panics when the state is not reached within [`EVENT_TIMEOUT`].
    pub async fn wait_for_state(&self, state: SessionState) {
        let mut rx = self.handle.state_changes();
        tokio::time::timeout(EVENT_TIMEOUT, rx.wait_for(|s| *s == state))
            .await
            .unwrap_or_else(|_| panic!("session never reached {state:?}"))
            .expect("state channel closed");
    }
}

/// Receive events until `pred` matches, returning the matching event.
///
/// # Panics
///
/// Panics when no matching event arrives within [`EVENT_TIMEOUT`].
pub async fn expect_event(
    rx: &mut broadcast::Receiver<SessionEvent>,
    pred: impl Fn(&SessionEvent) -> bool,
) -> SessionEvent {
    let wait = async {
        loop {
            match rx.recv().await {
                Ok(event) if pred(&event) => return event,
                Ok(_) | Err(broadcast::error::RecvError::Lagged(_)) => {}
                Err(broadcast::error::RecvError::Closed) => {
                    panic!("event channel closed before a matching event")
                }
            }
        }
    };

    tokio::time::timeout(EVENT_TIMEOUT, wait)
        .await
        .expect("no matching event within timeout")
}

/// Expect an `Error` event of the given kind.
pub async fn expect_error(
    rx: &mut broadcast::Receiver<SessionEvent>,
    kind: ErrorKind,
) -> SessionEvent {
    expect_event(rx, |e| matches!(e, SessionEvent::Error { kind: k, .. } if *k == kind)).await
}

/// Drain currently queued events, returning them without blocking.
pub fn drain_events(rx: &mut broadcast::Receiver<SessionEvent>) -> Vec<SessionEvent> {
    let mut drained = Vec::new();
    while let Ok(event) = rx.try_recv() {
        drained.push(event);
    }
    drained
}
