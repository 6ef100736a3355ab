//! Session events and the presentation-layer subscription contract.
//!
//! The UI never polls: it subscribes via [`crate::SessionHandle::subscribe`]
//! and renders from these events. Events are snapshots, not deltas, so a
//! late subscriber converges after its first `ParticipantsChanged`.

use crate::chat::ChatMessage;
use crate::errors::ErrorKind;
use crate::media::StreamSource;
use common::PeerId;

/// Lifecycle state of the whole session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Acquiring local media; no peers yet.
    Joining,
    /// Media is live; peers may come and go.
    Active,
    /// Tearing down on explicit leave.
    Leaving,
    /// Terminal. Every further operation fails with `SessionClosed`.
    Closed,
}

/// Connection status of one peer, as surfaced to the UI.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PeerStatus {
    /// Offer/answer/candidate exchange in progress.
    Negotiating,
    /// Media flowing.
    Connected,
    /// Transport lost; ICE restart in progress within the window.
    Reconnecting,
    /// Gave up within the window.
    Failed,
    /// Orderly teardown (Bye or local close).
    Closed,
}

/// Coarse connection quality classification for one peer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionQuality {
    /// Low latency, negligible loss.
    Good,
    /// Usable but degraded.
    Fair,
    /// Barely usable.
    Poor,
    /// Transport currently lost; displayed while the window runs.
    Reconnecting,
}

/// One participant as rendered by the UI (remote peers plus the self entry).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParticipantInfo {
    /// Peer identifier (the self entry carries the local peer id).
    pub id: PeerId,
    /// Display name.
    pub display_name: String,
    /// Whether this participant has host privileges.
    pub is_host: bool,
    /// Whether this entry is the local participant.
    pub is_self: bool,
    /// Audio track enabled.
    pub audio_enabled: bool,
    /// Video track enabled.
    pub video_enabled: bool,
    /// Latest quality classification.
    pub quality: ConnectionQuality,
}

/// Snapshot of the local media state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LocalMediaInfo {
    /// Which source currently feeds the outgoing stream.
    pub source: StreamSource,
    /// Microphone track enabled.
    pub audio_enabled: bool,
    /// Camera/screen track enabled.
    pub video_enabled: bool,
}

/// Events delivered to presentation-layer subscribers.
#[derive(Debug, Clone)]
pub enum SessionEvent {
    /// The participant list (including the self entry) changed.
    ParticipantsChanged {
        /// Full snapshot, self entry first.
        participants: Vec<ParticipantInfo>,
    },

    /// The local media state changed (mute, camera, screen-share swap).
    MediaStateChanged {
        /// New local media snapshot.
        state: LocalMediaInfo,
    },

    /// A chat message was appended (local optimistic or remote).
    Chat {
        /// The appended message.
        message: ChatMessage,
    },

    /// One peer's connection status changed.
    ConnectionStatusChanged {
        /// The peer in question.
        peer_id: PeerId,
        /// Its new status.
        status: PeerStatus,
    },

    /// A user-visible failure. Emitted exactly once per failure.
    Error {
        /// Taxonomy kind.
        kind: ErrorKind,
        /// Human-readable cause.
        message: String,
    },
}
