//! Per-peer negotiation state.
//!
//! Owned exclusively by one `PeerSession`; never shared. The state machine
//! is pure so every transition and the candidate-queue ordering can be
//! tested without a transport.
//!
//! ```text
//! Idle -> Negotiating -> Connected <-> Reconnecting
//!              |                            |
//!              +--------> Failed <----------+
//!
//! Closed is terminal and reachable from every state.
//! ```

use common::PeerId;
use signal_protocol::{IceCandidate, SessionDescription};
use std::collections::VecDeque;

/// Which side of the offer/answer exchange this peer session plays.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    /// We create the offer.
    Offerer,
    /// We answer a received offer.
    Answerer,
}

/// Negotiation phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NegotiationPhase {
    /// Nothing exchanged yet.
    Idle,
    /// Descriptions in flight.
    Negotiating,
    /// A viable path is established.
    Connected,
    /// Path lost; ICE restart within the window.
    Reconnecting,
    /// Gave up.
    Failed,
    /// Terminal teardown.
    Closed,
}

/// Per-peer negotiation state.
#[derive(Debug)]
pub struct NegotiationSession {
    peer_id: PeerId,
    role: Role,
    phase: NegotiationPhase,
    local_description: Option<SessionDescription>,
    remote_description: Option<SessionDescription>,
    pending_candidates: VecDeque<IceCandidate>,
    ever_connected: bool,
}

impl NegotiationSession {
    /// Start a fresh negotiation for `peer_id`.
    #[must_use]
    pub fn new(peer_id: PeerId, role: Role) -> Self {
        Self {
            peer_id,
            role,
            phase: NegotiationPhase::Idle,
            local_description: None,
            remote_description: None,
            pending_candidates: VecDeque::new(),
            ever_connected: false,
        }
    }

    /// The peer this session negotiates with.
    #[must_use]
    pub fn peer_id(&self) -> &PeerId {
        &self.peer_id
    }

    /// Offerer or answerer.
    #[must_use]
    pub fn role(&self) -> Role {
        self.role
    }

    /// Current phase.
    #[must_use]
    pub fn phase(&self) -> NegotiationPhase {
        self.phase
    }

    /// Whether the remote description has been applied.
    #[must_use]
    pub fn has_remote_description(&self) -> bool {
        self.remote_description.is_some()
    }

    /// Whether this session ever reached `Connected`.
    #[must_use]
    pub fn ever_connected(&self) -> bool {
        self.ever_connected
    }

    /// Whether the session is terminally done.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(
            self.phase,
            NegotiationPhase::Closed | NegotiationPhase::Failed
        )
    }

    /// Record the local description; `Idle` moves to `Negotiating`.
    pub fn set_local_description(&mut self, description: SessionDescription) {
        if self.is_terminal() {
            return;
        }
        self.local_description = Some(description);
        if self.phase == NegotiationPhase::Idle {
            self.phase = NegotiationPhase::Negotiating;
        }
    }

    /// Record the remote description and drain every candidate queued before
    /// it existed, in arrival order, for immediate application.
    pub fn set_remote_description(&mut self, description: SessionDescription) -> Vec<IceCandidate> {
        if self.is_terminal() {
            return Vec::new();
        }
        self.remote_description = Some(description);
        if self.phase == NegotiationPhase::Idle {
            self.phase = NegotiationPhase::Negotiating;
        }
        self.pending_candidates.drain(..).collect()
    }

    /// Route one remote candidate.
    ///
    /// Returns the candidate when it can be applied now (remote description
    /// present); otherwise it is queued silently, never an error.
    pub fn route_candidate(&mut self, candidate: IceCandidate) -> Option<IceCandidate> {
        if self.is_terminal() {
            return None;
        }
        if self.remote_description.is_some() {
            Some(candidate)
        } else {
            self.pending_candidates.push_back(candidate);
            None
        }
    }

    /// Connectivity succeeded. Returns `true` on the first-ever connect.
    pub fn mark_connected(&mut self) -> bool {
        if self.is_terminal() {
            return false;
        }
        self.phase = NegotiationPhase::Connected;
        let first = !self.ever_connected;
        self.ever_connected = true;
        first
    }

    /// Transport lost without an explicit teardown.
    ///
    /// Returns `true` when this started a reconnection attempt.
    pub fn mark_disconnected(&mut self) -> bool {
        if self.phase == NegotiationPhase::Connected {
            self.phase = NegotiationPhase::Reconnecting;
            true
        } else {
            false
        }
    }

    /// No viable path within the window.
    pub fn mark_failed(&mut self) {
        if matches!(
            self.phase,
            NegotiationPhase::Negotiating | NegotiationPhase::Reconnecting
        ) {
            self.phase = NegotiationPhase::Failed;
        }
    }

    /// Terminal teardown from any state; idempotent. Releases queued
    /// candidates and descriptions.
    pub fn close(&mut self) {
        self.phase = NegotiationPhase::Closed;
        self.pending_candidates.clear();
        self.local_description = None;
        self.remote_description = None;
    }
}
