//! Signaling message types.

use common::PeerId;
use serde::{Deserialize, Serialize};
use std::fmt;

/// An opaque session description produced and consumed by peer transports.
///
/// The session core never parses this; it is relayed byte-for-byte.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionDescription(String);

impl SessionDescription {
    /// Wrap raw description text.
    #[must_use]
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    /// The raw description text.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionDescription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// An opaque network path descriptor exchanged during negotiation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct IceCandidate(String);

impl IceCandidate {
    /// Wrap a raw candidate line.
    #[must_use]
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    /// The raw candidate line.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for IceCandidate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// The negotiation content of a signaling message.
///
/// Serialized adjacently tagged so the wire shape stays
/// `{"type": "offer", "payload": "..."}` with `payload` absent for `bye`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "lowercase")]
pub enum SignalBody {
    /// Offer a new or restarted peer connection.
    Offer(SessionDescription),
    /// Answer a previously received offer.
    Answer(SessionDescription),
    /// Trickle one network path candidate.
    Candidate(IceCandidate),
    /// Orderly teardown of the peer connection.
    Bye,
}

impl SignalBody {
    /// The wire name of this message type.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            SignalBody::Offer(_) => "offer",
            SignalBody::Answer(_) => "answer",
            SignalBody::Candidate(_) => "candidate",
            SignalBody::Bye => "bye",
        }
    }
}

/// A routed signaling message between two peers in a meeting.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignalMessage {
    /// Negotiation content, flattened into the outer object.
    #[serde(flatten)]
    pub body: SignalBody,
    /// Sending peer.
    pub from: PeerId,
    /// Receiving peer.
    pub to: PeerId,
}

impl SignalMessage {
    /// Build an offer from `from` to `to`.
    #[must_use]
    pub fn offer(from: PeerId, to: PeerId, description: SessionDescription) -> Self {
        Self {
            body: SignalBody::Offer(description),
            from,
            to,
        }
    }

    /// Build an answer from `from` to `to`.
    #[must_use]
    pub fn answer(from: PeerId, to: PeerId, description: SessionDescription) -> Self {
        Self {
            body: SignalBody::Answer(description),
            from,
            to,
        }
    }

    /// Build a trickled candidate from `from` to `to`.
    #[must_use]
    pub fn candidate(from: PeerId, to: PeerId, candidate: IceCandidate) -> Self {
        Self {
            body: SignalBody::Candidate(candidate),
            from,
            to,
        }
    }

    /// Build a teardown notice from `from` to `to`.
    #[must_use]
    pub fn bye(from: PeerId, to: PeerId) -> Self {
        Self {
            body: SignalBody::Bye,
            from,
            to,
        }
    }
}
