//! # Session Test Utilities
//!
//! Shared test utilities for the Waypoint meeting session core.
//!
//! Provides mock implementations of the three external seams plus fixtures
//! for isolated session testing without real hardware or networking:
//!
//! - `mock_media` - scriptable `MediaProvider` (deniable camera/screen)
//! - `mock_signaling` - in-memory signaling hub routing between test peers
//! - `mock_transport` - scriptable peer engine with a per-peer control handle
//! - `fixtures` - pre-wired sessions and event assertion helpers
//!
//! ## Usage
//!
//! ```rust,ignore
//! use session_test_utils::*;
//!
//! #[tokio::test]
//! async fn test_example() {
//!     let mut session = TestSession::join_active("alice", "meeting-1").await;
//!
//!     session.handle.connect_peer("bob".into()).await.unwrap();
//!     let bob = session.connector.control(&"bob".into()).await;
//!     bob.connected().await;
//!
//!     expect_event(&mut session.events, |e| {
//!         matches!(e, SessionEvent::ParticipantsChanged { .. })
//!     })
//!     .await;
//! }
//! ```

pub mod fixtures;
pub mod mock_media;
pub mod mock_signaling;
pub mod mock_transport;

// Re-export commonly used items
pub use fixtures::*;
pub use mock_media::*;
pub use mock_signaling::*;
pub use mock_transport::*;
