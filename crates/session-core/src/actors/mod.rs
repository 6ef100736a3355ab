//! Actor model implementation.
//!
//! Hierarchy:
//!
//! ```text
//! SessionManager (one per meeting)
//! ├── owns the Participant table, local media state, and chat
//! └── supervises N PeerSessions
//!     └── PeerSession (one per remote participant)
//!         └── owns its NegotiationSession and transport instance
//! ```
//!
//! Cancellation flows through child tokens; state reports flow back up as
//! typed events. No component mutates another's state directly.

pub mod messages;
pub mod metrics;
pub mod negotiation;
pub mod peer;
pub mod session;

pub use messages::{PeerEvent, SessionCommand, SessionMessage};
pub use negotiation::{NegotiationPhase, NegotiationSession, Role};
pub use peer::{classify_quality, PeerSession, PeerSessionHandle, PeerTiming};
pub use session::{JoinOptions, SessionHandle, SessionManager};
