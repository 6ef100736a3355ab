//! Session error types.
//!
//! Every user-visible failure carries one of the [`ErrorKind`] taxonomy
//! values plus a human-readable cause. Internal plumbing details are logged
//! but kept out of the user-facing message.

use crate::media::provider::MediaError;
use crate::signaling::SignalingError;
use common::PeerId;
use thiserror::Error;

/// Session error type.
#[derive(Debug, Error)]
pub enum SessionError {
    /// Local media hardware missing, or permission denied.
    #[error("Media unavailable: {0}")]
    MediaUnavailable(String),

    /// The signaling transport is down; new negotiations are blocked.
    #[error("Signaling unavailable: {0}")]
    SignalingUnavailable(String),

    /// No viable connection path was found for a peer within the window.
    #[error("Negotiation failed with {peer_id}: {cause}")]
    NegotiationFailed {
        /// The peer whose negotiation failed.
        peer_id: PeerId,
        /// What went wrong.
        cause: String,
    },

    /// A chat message could not be transmitted right now.
    #[error("Chat delivery failed: {0}")]
    DeliveryFailed(String),

    /// Operation attempted on a session that has already closed.
    #[error("Session is closed")]
    SessionClosed,

    /// Internal plumbing error (channel wiring, task supervision).
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Taxonomy kind attached to the `error` event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Local media hardware missing or permission denied.
    MediaUnavailable,
    /// Signaling transport down.
    SignalingUnavailable,
    /// Peer negotiation gave up.
    NegotiationFailed,
    /// Chat message not transmitted.
    DeliveryFailed,
    /// Operation on a terminal session.
    SessionClosed,
    /// Internal plumbing error.
    Internal,
}

impl SessionError {
    /// Returns the taxonomy kind for this error.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            SessionError::MediaUnavailable(_) => ErrorKind::MediaUnavailable,
            SessionError::SignalingUnavailable(_) => ErrorKind::SignalingUnavailable,
            SessionError::NegotiationFailed { .. } => ErrorKind::NegotiationFailed,
            SessionError::DeliveryFailed(_) => ErrorKind::DeliveryFailed,
            SessionError::SessionClosed => ErrorKind::SessionClosed,
            SessionError::Internal(_) => ErrorKind::Internal,
        }
    }

    /// Returns a user-facing message (no internal plumbing details).
    #[must_use]
    pub fn user_message(&self) -> String {
        match self {
            SessionError::MediaUnavailable(cause) => {
                format!("Camera or microphone is unavailable: {cause}")
            }
            SessionError::SignalingUnavailable(_) => {
                "Connection service is unreachable, retrying".to_string()
            }
            SessionError::NegotiationFailed { .. } => {
                "Could not establish a connection to a participant".to_string()
            }
            SessionError::DeliveryFailed(_) => {
                "Message not delivered yet, it will be retried".to_string()
            }
            SessionError::SessionClosed => "The meeting has ended".to_string(),
            SessionError::Internal(_) => "An internal error occurred".to_string(),
        }
    }
}

impl From<MediaError> for SessionError {
    fn from(err: MediaError) -> Self {
        let MediaError::Unavailable(cause) = err;
        SessionError::MediaUnavailable(cause)
    }
}

impl From<SignalingError> for SessionError {
    fn from(err: SignalingError) -> Self {
        match err {
            SignalingError::Unavailable(cause) => SessionError::SignalingUnavailable(cause),
            SignalingError::Codec(e) => SessionError::SignalingUnavailable(e.to_string()),
        }
    }
}
