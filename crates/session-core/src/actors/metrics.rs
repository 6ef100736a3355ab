//! Actor metrics and mailbox monitoring.
//!
//! Mailbox depth thresholds:
//!
//! | Actor Type | Normal | Warning |
//! |------------|--------|---------|
//! | Session    | < 100  | < 500   |
//! | Peer       | < 50   | < 200   |
//!
//! Facade metrics are emitted with the `meet_` prefix; installing a recorder
//! is the embedding application's concern.

use metrics::{counter, gauge};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use tracing::{debug, warn};

/// Mailbox depth thresholds for the session actor.
pub const SESSION_MAILBOX_NORMAL: usize = 100;
pub const SESSION_MAILBOX_WARNING: usize = 500;

/// Mailbox depth thresholds for peer actors.
pub const PEER_MAILBOX_NORMAL: usize = 50;
pub const PEER_MAILBOX_WARNING: usize = 200;

/// Actor type for metrics labeling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActorType {
    /// The session manager (one per meeting).
    Session,
    /// A peer session (one per remote participant).
    Peer,
}

impl ActorType {
    /// Returns the actor type as a string for metric labels.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            ActorType::Session => "session",
            ActorType::Peer => "peer",
        }
    }

    /// Returns the warning threshold for this actor type.
    #[must_use]
    pub const fn warning_threshold(&self) -> usize {
        match self {
            ActorType::Session => SESSION_MAILBOX_WARNING,
            ActorType::Peer => PEER_MAILBOX_WARNING,
        }
    }

    /// Returns the normal threshold for this actor type.
    #[must_use]
    pub const fn normal_threshold(&self) -> usize {
        match self {
            ActorType::Session => SESSION_MAILBOX_NORMAL,
            ActorType::Peer => PEER_MAILBOX_NORMAL,
        }
    }
}

/// Mailbox monitor for tracking queue depth.
#[derive(Debug)]
pub struct MailboxMonitor {
    actor_type: ActorType,
    actor_id: String,
    depth: AtomicUsize,
    messages_processed: AtomicU64,
}

impl MailboxMonitor {
    /// Create a new mailbox monitor for the given actor.
    #[must_use]
    pub fn new(actor_type: ActorType, actor_id: impl Into<String>) -> Self {
        Self {
            actor_type,
            actor_id: actor_id.into(),
            depth: AtomicUsize::new(0),
            messages_processed: AtomicU64::new(0),
        }
    }

    /// Record a message being added to the mailbox.
    pub fn record_enqueue(&self) {
        let new_depth = self.depth.fetch_add(1, Ordering::Relaxed) + 1;

        if new_depth > self.actor_type.warning_threshold() {
            warn!(
                target: "meet.actor.mailbox",
                actor_type = self.actor_type.as_str(),
                actor_id = %self.actor_id,
                depth = new_depth,
                "Mailbox depth critical"
            );
        } else if new_depth == self.actor_type.normal_threshold() {
            debug!(
                target: "meet.actor.mailbox",
                actor_type = self.actor_type.as_str(),
                actor_id = %self.actor_id,
                depth = new_depth,
                "Mailbox depth elevated"
            );
        }
    }

    /// Record a message being processed.
    pub fn record_dequeue(&self) {
        self.depth.fetch_sub(1, Ordering::Relaxed);
        self.messages_processed.fetch_add(1, Ordering::Relaxed);
        counter!(
            "meet_actor_messages_total",
            "actor_type" => self.actor_type.as_str()
        )
        .increment(1);
    }

    /// Get the current mailbox depth.
    #[must_use]
    pub fn current_depth(&self) -> usize {
        self.depth.load(Ordering::Relaxed)
    }

    /// Get total messages processed.
    #[must_use]
    pub fn messages_processed(&self) -> u64 {
        self.messages_processed.load(Ordering::Relaxed)
    }
}

/// Set the number of live peer sessions.
///
/// Metric: `meet_peer_sessions_active`
pub fn set_peer_sessions_active(count: usize) {
    gauge!("meet_peer_sessions_active").set(usize_to_f64(count));
}

/// Count one failed negotiation.
///
/// Metric: `meet_negotiation_failures_total`
pub fn record_negotiation_failure() {
    counter!("meet_negotiation_failures_total").increment(1);
}

/// Count one chat message, by direction.
///
/// Metric: `meet_chat_messages_total`
/// Labels: `direction` = `sent` | `received` | `pending`
pub fn record_chat_message(direction: &'static str) {
    counter!("meet_chat_messages_total", "direction" => direction).increment(1);
}

// Peer counts are far below 2^52; the cast is lossless in practice.
#[allow(clippy::cast_precision_loss)]
fn usize_to_f64(value: usize) -> f64 {
    value as f64
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_mailbox_depth_tracking() {
        let monitor = MailboxMonitor::new(ActorType::Peer, "peer-1");
        monitor.record_enqueue();
        monitor.record_enqueue();
        assert_eq!(monitor.current_depth(), 2);

        monitor.record_dequeue();
        assert_eq!(monitor.current_depth(), 1);
        assert_eq!(monitor.messages_processed(), 1);
    }

    #[test]
    fn test_thresholds_by_actor_type() {
        assert!(ActorType::Session.warning_threshold() > ActorType::Peer.warning_threshold());
        assert_eq!(ActorType::Session.as_str(), "session");
        assert_eq!(ActorType::Peer.as_str(), "peer");
    }
}
