//! Signaling wire protocol for the Waypoint meeting session core.
//!
//! Session negotiation messages (`offer`, `answer`, `candidate`, `bye`) are
//! exchanged as JSON objects of the shape
//! `{"type": ..., "from": ..., "to": ..., "payload": ...}` over whatever
//! transport the signaling implementation provides. Payloads are opaque to
//! this crate: session descriptions and ICE candidates are carried verbatim
//! for the peer transport on the other side.

#![warn(clippy::pedantic)]

pub mod codec;
pub mod message;

pub use codec::{decode_str, encode, CodecError, LineDecoder};
pub use message::{IceCandidate, SessionDescription, SignalBody, SignalMessage};
