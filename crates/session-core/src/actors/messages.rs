//! Message types for actor communication.
//!
//! All inter-actor communication uses strongly-typed message passing via
//! `tokio::sync::mpsc`. Request-reply operations carry a
//! `tokio::sync::oneshot` response channel.

use crate::chat::{ChatDelivery, ChatMessage};
use crate::errors::SessionError;
use crate::events::ParticipantInfo;
use crate::media::controller::PendingSwap;
use crate::media::provider::MediaError;
use crate::media::stream::{LocalStream, TrackKind};
use bytes::Bytes;
use common::PeerId;
use signal_protocol::SignalMessage;
use tokio::sync::oneshot;

/// Operations requested through the `SessionHandle`.
#[derive(Debug)]
pub enum SessionCommand {
    /// Begin negotiation with a newly announced remote peer (offerer role).
    ConnectPeer {
        peer_id: PeerId,
        /// Response channel for acceptance (negotiation completes async).
        respond_to: oneshot::Sender<Result<(), SessionError>>,
    },

    /// Flip a local track's enabled flag (mute/unmute, camera on/off).
    SetTrackEnabled {
        kind: TrackKind,
        enabled: bool,
        /// Response channel for confirmation.
        respond_to: oneshot::Sender<Result<(), SessionError>>,
    },

    /// Swap the camera stream for a screen stream.
    StartScreenShare {
        /// Responds once the swap committed (or failed).
        respond_to: oneshot::Sender<Result<(), SessionError>>,
    },

    /// Swap the screen stream back to the camera.
    StopScreenShare {
        /// Responds once the swap committed (or failed).
        respond_to: oneshot::Sender<Result<(), SessionError>>,
    },

    /// Compose and transmit a chat message.
    SendChat {
        body: String,
        /// Whether the message went out now or is pending a channel.
        respond_to: oneshot::Sender<Result<ChatDelivery, SessionError>>,
    },

    /// Snapshot the participant list (self entry first).
    GetParticipants {
        respond_to: oneshot::Sender<Vec<ParticipantInfo>>,
    },

    /// Snapshot the retained chat history.
    GetChatHistory {
        respond_to: oneshot::Sender<Vec<ChatMessage>>,
    },

    /// Explicit end-call: teardown of every resource, then `Closed`.
    Leave {
        respond_to: oneshot::Sender<Result<(), SessionError>>,
    },
}

/// Everything that lands in the session manager's mailbox.
#[derive(Debug)]
pub enum SessionMessage {
    /// A handle operation.
    Command(SessionCommand),

    /// An inbound signaling message (from the signaling pump).
    Signal(SignalMessage),

    /// A report from one peer session.
    Peer {
        peer_id: PeerId,
        event: PeerEvent,
    },

    /// A camera/screen swap acquisition finished.
    SwapReady {
        result: Result<PendingSwap, MediaError>,
        /// Present for user-requested swaps; absent for the automatic
        /// swap-back when an OS-level screen share ends.
        reply: Option<oneshot::Sender<Result<(), SessionError>>>,
    },
}

/// Reports from a peer session to the session manager.
///
/// Peer sessions never mutate manager state directly; these events are the
/// only channel.
#[derive(Debug)]
pub enum PeerEvent {
    /// First connectivity success; the Participant entry may now exist.
    Connected,
    /// Transport lost; ICE restart running within the window.
    Reconnecting,
    /// Connectivity re-established after a loss.
    Reconnected,
    /// Periodic quality classification changed.
    QualitySampled(crate::events::ConnectionQuality),
    /// Negotiation gave up; the manager removes the Participant.
    Failed(SessionError),
    /// Orderly teardown (Bye or local close).
    Closed,
    /// The data channel to this peer opened.
    ChatOpen,
    /// The data channel to this peer closed.
    ChatClosed,
    /// A decoded chat message arrived on the data channel.
    ChatReceived(ChatMessage),
}

/// Messages sent to a `PeerSession`.
#[derive(Debug)]
pub enum PeerCommand {
    /// A signaling message routed to this peer's negotiation.
    Signal(SignalMessage),

    /// (Re-)attach the local stream, e.g. after a camera/screen swap.
    AttachStream {
        stream: LocalStream,
        /// Response channel for the attachment result.
        respond_to: oneshot::Sender<Result<(), SessionError>>,
    },

    /// Transmit bytes on the data channel (dropped if it is not open).
    SendData { data: Bytes },

    /// Send `Bye` to the remote side and tear the session down.
    Bye {
        /// Responds once the teardown message went out (or was abandoned).
        respond_to: oneshot::Sender<()>,
    },
}
