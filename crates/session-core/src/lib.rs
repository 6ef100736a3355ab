//! Waypoint meeting session core.
//!
//! Owns the lifecycle of one real-time meeting from join to teardown,
//! independent of any UI framework: local media acquisition and swaps, peer
//! negotiation, reconnects, quality sampling, in-meeting chat, and invite
//! links.
//!
//! # Architecture
//!
//! The presentation layer talks to exactly one component:
//!
//! ```text
//! UI ──commands──▶ SessionManager ──▶ MediaController / PeerSessions / Chat
//! UI ◀──events──── SessionManager ◀── typed reports from subcomponents
//! ```
//!
//! Three seams are supplied by the embedding application:
//!
//! - [`media::MediaProvider`] - camera / microphone / screen acquisition
//! - [`signaling::SignalingClient`] - negotiation message transport (a
//!   WebSocket implementation ships in [`signaling::ws`])
//! - [`transport::PeerConnector`] - the peer connection engine
//!
//! # Example
//!
//! ```rust,ignore
//! use session_core::{JoinOptions, SessionConfig, SessionManager};
//!
//! let (signaling, signals) = WsSignalingClient::connect(url, retry);
//! let (session, _task) = SessionManager::spawn(JoinOptions {
//!     meeting_id: "standup-42".into(),
//!     self_id: my_peer_id,
//!     display_name: "Jane Doe".to_string(),
//!     is_host: true,
//!     config: SessionConfig::from_env()?,
//!     media: platform_media_provider,
//!     signaling,
//!     signals,
//!     connector: platform_engine,
//! });
//!
//! let mut events = session.subscribe();
//! session.connect_peer(remote_peer).await?;
//! ```

#![warn(clippy::pedantic)]

pub mod actors;
pub mod chat;
pub mod config;
pub mod errors;
pub mod events;
pub mod invite;
pub mod media;
pub mod signaling;
pub mod transport;

pub use actors::{JoinOptions, SessionHandle, SessionManager};
pub use chat::{ChatDelivery, ChatMessage};
pub use config::SessionConfig;
pub use errors::{ErrorKind, SessionError};
pub use events::{
    ConnectionQuality, LocalMediaInfo, ParticipantInfo, PeerStatus, SessionEvent, SessionState,
};
pub use invite::build_link;
