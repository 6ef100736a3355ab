//! The peer-connection engine seam.
//!
//! A [`PeerTransport`] turns opaque session descriptions and candidates into
//! flowing media and a data channel; the embedding application supplies an
//! implementation for its platform engine. The session core drives it through
//! the negotiation state machine and listens on its event channel.

use crate::media::LocalStream;
use async_trait::async_trait;
use bytes::Bytes;
use common::PeerId;
use signal_protocol::{IceCandidate, SessionDescription};
use thiserror::Error;
use tokio::sync::mpsc;
use std::sync::Arc;

/// Transport-level connectivity, as reported by the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectivityState {
    /// Connectivity checks in progress.
    Checking,
    /// A viable path is established and media can flow.
    Connected,
    /// The established path was lost without an explicit teardown.
    Disconnected,
    /// No viable path; the engine has given up.
    Failed,
    /// The engine was closed.
    Closed,
}

/// One round of connection statistics.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TransportStats {
    /// Round-trip time in milliseconds.
    pub round_trip_ms: u32,
    /// Packet loss percentage over the sample window.
    pub packet_loss_pct: f32,
}

/// Events pushed by the engine to its peer session.
#[derive(Debug, Clone)]
pub enum TransportEvent {
    /// A local network path candidate to trickle to the remote peer.
    LocalCandidate(IceCandidate),
    /// Connectivity changed.
    Connectivity(ConnectivityState),
    /// The reliable/ordered data channel opened.
    DataChannelOpen,
    /// The data channel closed.
    DataChannelClosed,
    /// Bytes received on the data channel.
    Data(Bytes),
}

/// Transport errors.
#[derive(Debug, Error)]
pub enum TransportError {
    /// The engine rejected or failed an operation.
    #[error("Transport operation failed: {0}")]
    Failed(String),

    /// The engine is already closed.
    #[error("Transport closed")]
    Closed,
}

/// One peer connection engine instance.
#[async_trait]
pub trait PeerTransport: Send + Sync {
    /// Build the local offer description (and set it locally).
    ///
    /// # Errors
    ///
    /// Fails when the engine cannot produce a description.
    async fn create_offer(&self) -> Result<SessionDescription, TransportError>;

    /// Build the local answer description (and set it locally).
    ///
    /// Requires a remote description to have been applied first.
    ///
    /// # Errors
    ///
    /// Fails when no remote description is set or the engine errors.
    async fn create_answer(&self) -> Result<SessionDescription, TransportError>;

    /// Apply the remote description.
    ///
    /// # Errors
    ///
    /// Fails when the engine rejects the description.
    async fn set_remote_description(
        &self,
        description: SessionDescription,
    ) -> Result<(), TransportError>;

    /// Apply one remote candidate. Callers guarantee a remote description is
    /// already set; ordering is the caller's responsibility.
    ///
    /// # Errors
    ///
    /// Fails when the engine rejects the candidate.
    async fn add_remote_candidate(&self, candidate: IceCandidate) -> Result<(), TransportError>;

    /// Re-negotiate network paths without tearing down media.
    ///
    /// # Errors
    ///
    /// Fails when the engine cannot restart.
    async fn restart_ice(&self) -> Result<(), TransportError>;

    /// Attach (or re-attach, after a swap) the local stream.
    ///
    /// # Errors
    ///
    /// Fails when the engine rejects the stream.
    async fn attach_stream(&self, stream: &LocalStream) -> Result<(), TransportError>;

    /// Send bytes on the data channel.
    ///
    /// # Errors
    ///
    /// Fails when the channel is not open.
    async fn send_data(&self, data: Bytes) -> Result<(), TransportError>;

    /// Sample current connection statistics.
    ///
    /// # Errors
    ///
    /// Fails when no statistics are available (e.g. not connected).
    async fn stats(&self) -> Result<TransportStats, TransportError>;

    /// Release all engine resources. Idempotent.
    async fn close(&self);
}

/// Factory for peer transports, one per remote peer.
pub trait PeerConnector: Send + Sync {
    /// Create an engine instance for `peer_id`, returning the transport and
    /// its event stream.
    ///
    /// # Errors
    ///
    /// Fails when the engine cannot be constructed.
    fn connect(
        &self,
        peer_id: &PeerId,
    ) -> Result<(Arc<dyn PeerTransport>, mpsc::Receiver<TransportEvent>), TransportError>;
}
