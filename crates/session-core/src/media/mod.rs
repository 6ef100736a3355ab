//! Local media acquisition and lifecycle.
//!
//! The platform capture capability sits behind the [`MediaProvider`] trait;
//! [`MediaController`] layers acquisition policy on top: constraints,
//! enabled-flag carryover, and the two-phase camera/screen swap.

pub mod controller;
pub mod provider;
pub mod stream;

pub use controller::{MediaController, PendingSwap};
pub use provider::{CameraConstraints, DeviceAvailability, MediaError, MediaProvider};
pub use stream::{LocalStream, StreamSource, TrackKind};
