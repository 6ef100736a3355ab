//! In-meeting text chat state.
//!
//! `ChatChannel` is plain state owned by the session manager: an append-only
//! history plus a pending queue for messages composed while no data channel
//! was open. Transmission itself goes through the peer sessions; this module
//! only decides what to send, in what order, and what to keep.
//!
//! Ordering guarantee: per-sender send order is preserved (pending messages
//! flush in compose order). There is no total order across senders beyond
//! transport arrival order.

use bytes::Bytes;
use chrono::{DateTime, Utc};
use common::PeerId;
use serde::{Deserialize, Serialize};
use std::collections::{HashSet, VecDeque};
use uuid::Uuid;

/// One chat message, immutable once appended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    /// Globally unique message id.
    pub id: Uuid,
    /// Sending participant.
    pub sender: PeerId,
    /// Message text.
    pub body: String,
    /// Sender-side timestamp.
    pub sent_at: DateTime<Utc>,
}

/// Outcome of composing a message: transmitted now, or queued for later.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChatDelivery {
    /// Handed to at least one open data channel.
    Sent,
    /// No channel open; queued and retried on (re)open.
    Pending,
}

/// Chat history plus the pending-outbound queue.
#[derive(Debug)]
pub struct ChatChannel {
    history: Vec<ChatMessage>,
    pending: VecDeque<ChatMessage>,
    seen: HashSet<Uuid>,
    history_limit: usize,
}

impl ChatChannel {
    /// Create an empty channel retaining at most `history_limit` messages.
    #[must_use]
    pub fn new(history_limit: usize) -> Self {
        Self {
            history: Vec::new(),
            pending: VecDeque::new(),
            seen: HashSet::new(),
            history_limit,
        }
    }

    /// Compose a local message: appended to history immediately (optimistic),
    /// regardless of whether transmission succeeds.
    pub fn compose(&mut self, sender: PeerId, body: impl Into<String>) -> ChatMessage {
        let message = ChatMessage {
            id: Uuid::new_v4(),
            sender,
            body: body.into(),
            sent_at: Utc::now(),
        };
        self.seen.insert(message.id);
        self.append(message.clone());
        message
    }

    /// Queue a composed message that could not be transmitted.
    pub fn mark_pending(&mut self, message: ChatMessage) {
        self.pending.push_back(message);
    }

    /// Drain the pending queue in compose order for a flush.
    pub fn take_pending(&mut self) -> Vec<ChatMessage> {
        self.pending.drain(..).collect()
    }

    /// Whether any messages await a channel (re)open.
    #[must_use]
    pub fn has_pending(&self) -> bool {
        !self.pending.is_empty()
    }

    /// Accept a remote message in transport arrival order.
    ///
    /// Returns `false` for duplicates (a reconnect flush may resend).
    pub fn accept_remote(&mut self, message: ChatMessage) -> bool {
        if !self.seen.insert(message.id) {
            return false;
        }
        self.append(message);
        true
    }

    /// The retained history, oldest first.
    #[must_use]
    pub fn history(&self) -> &[ChatMessage] {
        &self.history
    }

    fn append(&mut self, message: ChatMessage) {
        self.history.push(message);
        if self.history.len() > self.history_limit {
            let overflow = self.history.len() - self.history_limit;
            self.history.drain(..overflow);
        }
    }
}

/// Encode a chat message for the data channel.
///
/// # Errors
///
/// Returns an error if serialization fails.
pub fn encode_wire(message: &ChatMessage) -> Result<Bytes, serde_json::Error> {
    serde_json::to_vec(message).map(Bytes::from)
}

/// Decode a chat message received from the data channel.
///
/// # Errors
///
/// Returns an error for malformed payloads (which are dropped by the caller).
pub fn decode_wire(data: &[u8]) -> Result<ChatMessage, serde_json::Error> {
    serde_json::from_slice(data)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    fn channel() -> ChatChannel {
        ChatChannel::new(100)
    }

    #[test]
    fn test_compose_appends_optimistically() {
        let mut chat = channel();
        let msg = chat.compose(PeerId::from("alice"), "hello");
        assert_eq!(chat.history(), &[msg]);
    }

    #[test]
    fn test_pending_flushes_in_compose_order() {
        let mut chat = channel();
        let first = chat.compose(PeerId::from("alice"), "one");
        let second = chat.compose(PeerId::from("alice"), "two");
        chat.mark_pending(first.clone());
        chat.mark_pending(second.clone());

        assert_eq!(chat.take_pending(), vec![first, second]);
        assert!(!chat.has_pending());
    }

    #[test]
    fn test_remote_duplicates_are_suppressed() {
        let mut chat = channel();
        let msg = ChatMessage {
            id: Uuid::new_v4(),
            sender: PeerId::from("bob"),
            body: "hi".to_string(),
            sent_at: Utc::now(),
        };

        assert!(chat.accept_remote(msg.clone()));
        assert!(!chat.accept_remote(msg));
        assert_eq!(chat.history().len(), 1);
    }

    #[test]
    fn test_own_message_echoed_back_is_suppressed() {
        let mut chat = channel();
        let msg = chat.compose(PeerId::from("alice"), "hello");
        assert!(!chat.accept_remote(msg));
        assert_eq!(chat.history().len(), 1);
    }

    #[test]
    fn test_history_is_bounded() {
        let mut chat = ChatChannel::new(3);
        for i in 0..5 {
            chat.compose(PeerId::from("alice"), format!("msg {i}"));
        }
        assert_eq!(chat.history().len(), 3);
        assert_eq!(
            chat.history().first().map(|m| m.body.as_str()),
            Some("msg 2")
        );
    }

    #[test]
    fn test_wire_roundtrip() {
        let mut chat = channel();
        let msg = chat.compose(PeerId::from("alice"), "over the wire");
        let bytes = encode_wire(&msg).unwrap();
        assert_eq!(decode_wire(&bytes).unwrap(), msg);
    }

    #[test]
    fn test_malformed_wire_is_an_error() {
        assert!(decode_wire(b"not json").is_err());
    }
}
