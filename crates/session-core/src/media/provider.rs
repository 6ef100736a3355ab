//! The platform media capability seam.
//!
//! The session core never talks to capture hardware directly. The embedding
//! application supplies a [`MediaProvider`] for whatever platform it runs on;
//! tests use the mock from `session-test-utils`.

use crate::media::stream::LocalStream;
use async_trait::async_trait;
use thiserror::Error;

/// Camera acquisition preferences.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CameraConstraints {
    /// Requested capture width.
    pub width: u32,
    /// Requested capture height.
    pub height: u32,
    /// Request echo cancellation on the microphone track.
    pub echo_cancellation: bool,
}

impl Default for CameraConstraints {
    fn default() -> Self {
        Self {
            width: crate::config::DEFAULT_CAMERA_WIDTH,
            height: crate::config::DEFAULT_CAMERA_HEIGHT,
            echo_cancellation: true,
        }
    }
}

/// Result of the pre-join device probe.
#[derive(Debug, Clone, Copy, Default)]
pub struct DeviceAvailability {
    /// A camera is present and permitted.
    pub has_camera: bool,
    /// A microphone is present and permitted.
    pub has_microphone: bool,
    /// The platform supports screen capture.
    pub can_capture_screen: bool,
}

impl DeviceAvailability {
    /// A meeting cannot start without at least one local media capability.
    #[must_use]
    pub fn can_join(&self) -> bool {
        self.has_camera || self.has_microphone
    }
}

/// Media acquisition errors.
#[derive(Debug, Error)]
pub enum MediaError {
    /// Hardware missing, permission denied, or the user cancelled a picker.
    #[error("Media unavailable: {0}")]
    Unavailable(String),
}

/// Platform capability to acquire local media streams.
#[async_trait]
pub trait MediaProvider: Send + Sync {
    /// Probe device availability before joining.
    async fn probe(&self) -> DeviceAvailability;

    /// Acquire the camera+microphone stream.
    ///
    /// # Errors
    ///
    /// Fails with [`MediaError::Unavailable`] on hardware or permission
    /// denial.
    async fn acquire_camera(
        &self,
        constraints: &CameraConstraints,
    ) -> Result<LocalStream, MediaError>;

    /// Acquire a screen-capture stream.
    ///
    /// # Errors
    ///
    /// Fails with [`MediaError::Unavailable`] when the user cancels the share
    /// picker or the platform lacks support.
    async fn acquire_screen(&self) -> Result<LocalStream, MediaError>;
}
