//! Common types shared across the Waypoint meeting session crates.

#![warn(clippy::pedantic)]

/// Module for shared identifier types
pub mod types;

pub use types::{MeetingId, PeerId, StreamId};
