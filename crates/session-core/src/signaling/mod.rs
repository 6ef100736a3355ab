//! The signaling transport seam.
//!
//! Signaling only bootstraps negotiation: once a peer connection is
//! established, media no longer depends on it. A signaling outage therefore
//! blocks *new* joins but never tears down connected peer sessions.

pub mod ws;

use async_trait::async_trait;
use signal_protocol::{CodecError, SignalMessage};
use thiserror::Error;

pub use ws::WsSignalingClient;

/// Signaling transport errors.
#[derive(Debug, Error)]
pub enum SignalingError {
    /// The transport is currently down. Sends fail fast; the transport
    /// retries its connection in the background.
    #[error("Signaling unavailable: {0}")]
    Unavailable(String),

    /// A message could not be encoded for the wire.
    #[error(transparent)]
    Codec(#[from] CodecError),
}

/// Outbound half of a signaling connection.
///
/// Implementations must preserve send order per destination peer; cross-peer
/// ordering is unspecified. Inbound messages arrive on the `mpsc` receiver
/// returned by the implementation's constructor.
#[async_trait]
pub trait SignalingClient: Send + Sync {
    /// Send one message, best effort.
    ///
    /// # Errors
    ///
    /// Fails with [`SignalingError::Unavailable`] while the transport is
    /// down.
    async fn send(&self, message: SignalMessage) -> Result<(), SignalingError>;
}
