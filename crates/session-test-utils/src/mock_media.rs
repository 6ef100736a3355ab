//! Scriptable `MediaProvider` mock.
//!
//! Hands out streams with predictable device labels and records every
//! acquisition so tests can assert release behavior and trigger OS-level
//! "source ended" signals.

use async_trait::async_trait;
use session_core::media::{
    CameraConstraints, DeviceAvailability, LocalStream, MediaError, MediaProvider, StreamSource,
    TrackKind,
};
use std::sync::{Arc, Mutex};

/// Device label used for mock camera streams.
pub const MOCK_CAMERA_DEVICE: &str = "mock-camera-0";

/// Device label used for mock screen streams.
pub const MOCK_SCREEN_DEVICE: &str = "mock-screen-0";

#[derive(Debug)]
struct MockMediaInner {
    availability: DeviceAvailability,
    deny_camera: Option<String>,
    deny_screen: Option<String>,
    acquired_cameras: Vec<LocalStream>,
    acquired_screens: Vec<LocalStream>,
}

/// Mock media provider for session testing.
#[derive(Debug, Clone)]
pub struct MockMediaProvider {
    inner: Arc<Mutex<MockMediaInner>>,
}

impl Default for MockMediaProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl MockMediaProvider {
    /// Full capabilities: camera, microphone, and screen capture all work.
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(MockMediaInner {
                availability: DeviceAvailability {
                    has_camera: true,
                    has_microphone: true,
                    can_capture_screen: true,
                },
                deny_camera: None,
                deny_screen: None,
                acquired_cameras: Vec::new(),
                acquired_screens: Vec::new(),
            })),
        }
    }

    /// Report no devices at all (probe precondition failure).
    #[must_use]
    pub fn without_devices(self) -> Self {
        self.inner.lock().unwrap().availability = DeviceAvailability::default();
        self
    }

    /// Make camera acquisition fail with the given cause.
    #[must_use]
    pub fn deny_camera(self, cause: impl Into<String>) -> Self {
        self.inner.lock().unwrap().deny_camera = Some(cause.into());
        self
    }

    /// Make screen acquisition fail with the given cause (picker cancelled).
    #[must_use]
    pub fn deny_screen(self, cause: impl Into<String>) -> Self {
        self.inner.lock().unwrap().deny_screen = Some(cause.into());
        self
    }

    /// Every camera stream handed out so far, oldest first.
    #[must_use]
    pub fn acquired_cameras(&self) -> Vec<LocalStream> {
        self.inner.lock().unwrap().acquired_cameras.clone()
    }

    /// Every screen stream handed out so far, oldest first.
    #[must_use]
    pub fn acquired_screens(&self) -> Vec<LocalStream> {
        self.inner.lock().unwrap().acquired_screens.clone()
    }

    /// The most recently acquired screen stream.
    #[must_use]
    pub fn last_screen(&self) -> Option<LocalStream> {
        self.inner.lock().unwrap().acquired_screens.last().cloned()
    }

    /// The most recently acquired camera stream.
    #[must_use]
    pub fn last_camera(&self) -> Option<LocalStream> {
        self.inner.lock().unwrap().acquired_cameras.last().cloned()
    }

    /// Number of camera acquisitions so far.
    #[must_use]
    pub fn camera_acquire_count(&self) -> usize {
        self.inner.lock().unwrap().acquired_cameras.len()
    }
}

#[async_trait]
impl MediaProvider for MockMediaProvider {
    async fn probe(&self) -> DeviceAvailability {
        self.inner.lock().unwrap().availability
    }

    async fn acquire_camera(
        &self,
        _constraints: &CameraConstraints,
    ) -> Result<LocalStream, MediaError> {
        let mut inner = self.inner.lock().unwrap();
        if let Some(cause) = &inner.deny_camera {
            return Err(MediaError::Unavailable(cause.clone()));
        }

        let stream = LocalStream::new(
            StreamSource::Camera,
            MOCK_CAMERA_DEVICE,
            &[TrackKind::Audio, TrackKind::Video],
        );
        inner.acquired_cameras.push(stream.clone());
        Ok(stream)
    }

    async fn acquire_screen(&self) -> Result<LocalStream, MediaError> {
        let mut inner = self.inner.lock().unwrap();
        if let Some(cause) = &inner.deny_screen {
            return Err(MediaError::Unavailable(cause.clone()));
        }

        let stream = LocalStream::new(
            StreamSource::Screen,
            MOCK_SCREEN_DEVICE,
            &[TrackKind::Audio, TrackKind::Video],
        );
        inner.acquired_screens.push(stream.clone());
        Ok(stream)
    }
}
