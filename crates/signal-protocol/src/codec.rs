//! Codec for encoding and decoding signaling messages.
//!
//! Messages are JSON objects, one per line, so the same encoding works for
//! stream transports (one frame per line) and message transports (one frame
//! per WebSocket text message).

use crate::message::SignalMessage;
use bytes::{BufMut, Bytes, BytesMut};

/// Hard cap on a single encoded message. Session descriptions are a few KiB;
/// anything larger is a malfunctioning or hostile sender.
pub const MAX_MESSAGE_BYTES: usize = 64 * 1024;

/// Error type for codec operations
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    /// Message does not parse as a known signaling message
    #[error("Malformed signaling message: {0}")]
    Malformed(String),

    /// A single message exceeded [`MAX_MESSAGE_BYTES`]
    #[error("Signaling message too large: {0} bytes")]
    MessageTooLarge(usize),
}

/// Encode a signaling message as one JSON line.
///
/// # Errors
///
/// Returns an error if serialization fails or the result exceeds
/// [`MAX_MESSAGE_BYTES`].
pub fn encode(message: &SignalMessage) -> Result<Bytes, CodecError> {
    let json = serde_json::to_vec(message).map_err(|e| CodecError::Malformed(e.to_string()))?;
    if json.len() >= MAX_MESSAGE_BYTES {
        return Err(CodecError::MessageTooLarge(json.len()));
    }

    let mut buf = BytesMut::with_capacity(json.len() + 1);
    buf.extend_from_slice(&json);
    buf.put_u8(b'\n');
    Ok(buf.freeze())
}

/// Decode a single message from text (e.g. one WebSocket text frame).
///
/// # Errors
///
/// Returns an error if the text is not a valid signaling message.
pub fn decode_str(text: &str) -> Result<SignalMessage, CodecError> {
    if text.len() >= MAX_MESSAGE_BYTES {
        return Err(CodecError::MessageTooLarge(text.len()));
    }
    serde_json::from_str(text).map_err(|e| CodecError::Malformed(e.to_string()))
}

/// Incremental decoder for line-framed stream transports.
///
/// Feed raw bytes with [`LineDecoder::push`], then drain complete messages
/// with [`LineDecoder::next_message`]. Partial lines stay buffered until the
/// terminating newline arrives.
#[derive(Debug, Default)]
pub struct LineDecoder {
    buf: BytesMut,
}

impl LineDecoder {
    /// Create an empty decoder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append raw bytes received from the transport.
    pub fn push(&mut self, data: &[u8]) {
        self.buf.extend_from_slice(data);
    }

    /// Number of buffered, not-yet-decoded bytes.
    #[must_use]
    pub fn buffered(&self) -> usize {
        self.buf.len()
    }

    /// Decode the next complete message, if one is buffered.
    ///
    /// # Errors
    ///
    /// Returns an error for a malformed line or when the partial line grows
    /// past [`MAX_MESSAGE_BYTES`]. The offending line is discarded so the
    /// stream can resynchronize on the next newline.
    pub fn next_message(&mut self) -> Result<Option<SignalMessage>, CodecError> {
        loop {
            let Some(newline) = self.buf.iter().position(|&b| b == b'\n') else {
                if self.buf.len() >= MAX_MESSAGE_BYTES {
                    let len = self.buf.len();
                    self.buf.clear();
                    return Err(CodecError::MessageTooLarge(len));
                }
                return Ok(None);
            };

            let line = self.buf.split_to(newline + 1);
            let line = line.get(..newline).unwrap_or_default();
            if line.is_empty() {
                // Tolerate keep-alive blank lines.
                continue;
            }

            return serde_json::from_slice(line)
                .map(Some)
                .map_err(|e| CodecError::Malformed(e.to_string()));
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::message::{IceCandidate, SessionDescription};
    use common::PeerId;

    fn offer() -> SignalMessage {
        SignalMessage::offer(
            PeerId::from("alice"),
            PeerId::from("bob"),
            SessionDescription::new("v=0"),
        )
    }

    #[test]
    fn test_encode_terminates_with_newline() {
        let encoded = encode(&offer()).unwrap();
        assert_eq!(encoded.last(), Some(&b'\n'));
    }

    #[test]
    fn test_decoder_roundtrip() {
        let mut decoder = LineDecoder::new();
        decoder.push(&encode(&offer()).unwrap());

        let decoded = decoder.next_message().unwrap().unwrap();
        assert_eq!(decoded, offer());
        assert!(decoder.next_message().unwrap().is_none());
    }

    #[test]
    fn test_decoder_buffers_partial_lines() {
        let encoded = encode(&offer()).unwrap();
        let (head, tail) = encoded.split_at(10);

        let mut decoder = LineDecoder::new();
        decoder.push(head);
        assert!(decoder.next_message().unwrap().is_none());

        decoder.push(tail);
        assert_eq!(decoder.next_message().unwrap(), Some(offer()));
    }

    #[test]
    fn test_decoder_preserves_arrival_order() {
        let first = SignalMessage::candidate(
            PeerId::from("a"),
            PeerId::from("b"),
            IceCandidate::new("candidate-1"),
        );
        let second = SignalMessage::candidate(
            PeerId::from("a"),
            PeerId::from("b"),
            IceCandidate::new("candidate-2"),
        );

        let mut decoder = LineDecoder::new();
        decoder.push(&encode(&first).unwrap());
        decoder.push(&encode(&second).unwrap());

        assert_eq!(decoder.next_message().unwrap(), Some(first));
        assert_eq!(decoder.next_message().unwrap(), Some(second));
    }

    #[test]
    fn test_malformed_line_is_discarded_and_stream_recovers() {
        let mut decoder = LineDecoder::new();
        decoder.push(b"{not json}\n");
        decoder.push(&encode(&offer()).unwrap());

        assert!(matches!(
            decoder.next_message(),
            Err(CodecError::Malformed(_))
        ));
        // The bad line is gone; the next message decodes normally.
        assert_eq!(decoder.next_message().unwrap(), Some(offer()));
    }

    #[test]
    fn test_unknown_type_is_malformed() {
        let mut decoder = LineDecoder::new();
        decoder.push(b"{\"type\":\"renegotiate\",\"from\":\"a\",\"to\":\"b\"}\n");
        assert!(matches!(
            decoder.next_message(),
            Err(CodecError::Malformed(_))
        ));
    }

    #[test]
    fn test_oversized_partial_line_errors() {
        let mut decoder = LineDecoder::new();
        decoder.push(&vec![b'x'; MAX_MESSAGE_BYTES]);
        assert!(matches!(
            decoder.next_message(),
            Err(CodecError::MessageTooLarge(_))
        ));
        assert_eq!(decoder.buffered(), 0);
    }

    #[test]
    fn test_blank_lines_are_skipped() {
        let mut decoder = LineDecoder::new();
        decoder.push(b"\n\n");
        decoder.push(&encode(&offer()).unwrap());
        assert_eq!(decoder.next_message().unwrap(), Some(offer()));
    }
}
