//! Acquisition policy over the media provider.
//!
//! Swaps between camera and screen are two-phase: the replacement stream is
//! acquired first and handed to the caller; the old stream is only released
//! once the caller confirms re-attachment via [`PendingSwap::commit`]. This
//! avoids both a visible gap and a double release when the swap is abandoned.

use crate::media::provider::{CameraConstraints, DeviceAvailability, MediaError, MediaProvider};
use crate::media::stream::{LocalStream, StreamSource, TrackKind};
use std::sync::Arc;
use tracing::debug;

/// Acquires and releases local streams on behalf of the session manager.
#[derive(Clone)]
pub struct MediaController {
    provider: Arc<dyn MediaProvider>,
    constraints: CameraConstraints,
}

impl MediaController {
    /// Create a controller using the given provider and camera constraints.
    #[must_use]
    pub fn new(provider: Arc<dyn MediaProvider>, constraints: CameraConstraints) -> Self {
        Self {
            provider,
            constraints,
        }
    }

    /// Probe device availability.
    pub async fn probe(&self) -> DeviceAvailability {
        self.provider.probe().await
    }

    /// Acquire the camera+microphone stream with the configured constraints.
    ///
    /// # Errors
    ///
    /// Propagates [`MediaError::Unavailable`] from the provider.
    pub async fn acquire_camera(&self) -> Result<LocalStream, MediaError> {
        self.provider.acquire_camera(&self.constraints).await
    }

    /// Swap the active camera stream for a screen stream.
    ///
    /// # Errors
    ///
    /// Fails without touching `current` when screen acquisition fails (e.g.
    /// the user cancels the picker).
    pub async fn swap_to_screen(&self, current: LocalStream) -> Result<PendingSwap, MediaError> {
        let replacement = self.provider.acquire_screen().await?;
        carry_over_flags(&current, &replacement);
        debug!(
            target: "meet.media",
            old = %current.id(),
            new = %replacement.id(),
            "Screen stream acquired, awaiting re-attachment"
        );
        Ok(PendingSwap {
            replacement,
            old: current,
        })
    }

    /// Swap the active screen stream back to a camera stream.
    ///
    /// The camera is re-acquired with the same constraints as the original
    /// acquisition, so stopping a screen share restores the stream that was
    /// active before it started.
    ///
    /// # Errors
    ///
    /// Fails without touching `current` when camera acquisition fails.
    pub async fn swap_to_camera(&self, current: LocalStream) -> Result<PendingSwap, MediaError> {
        let replacement = self.provider.acquire_camera(&self.constraints).await?;
        carry_over_flags(&current, &replacement);
        debug!(
            target: "meet.media",
            old = %current.id(),
            new = %replacement.id(),
            "Camera stream re-acquired, awaiting re-attachment"
        );
        Ok(PendingSwap {
            replacement,
            old: current,
        })
    }

    /// Stop all tracks of a stream. Idempotent.
    pub fn release(stream: &LocalStream) {
        if stream.release() {
            debug!(target: "meet.media", stream = %stream.id(), "Stream released");
        }
    }
}

/// Enabled flags survive a source swap: a muted microphone stays muted on the
/// screen stream and again on the restored camera stream.
fn carry_over_flags(old: &LocalStream, new: &LocalStream) {
    for kind in [TrackKind::Audio, TrackKind::Video] {
        if let Some(enabled) = old.is_track_enabled(kind) {
            new.set_track_enabled(kind, enabled);
        }
    }
}

/// A swap whose replacement stream is live but whose old stream has not been
/// released yet.
#[derive(Debug)]
#[must_use = "a pending swap must be committed or aborted"]
pub struct PendingSwap {
    replacement: LocalStream,
    old: LocalStream,
}

impl PendingSwap {
    /// The replacement stream to re-attach to peer connections.
    #[must_use]
    pub fn stream(&self) -> &LocalStream {
        &self.replacement
    }

    /// The source of the replacement stream.
    #[must_use]
    pub fn target_source(&self) -> StreamSource {
        self.replacement.source()
    }

    /// Re-attachment confirmed: release the old stream, keep the new one.
    pub fn commit(self) -> LocalStream {
        MediaController::release(&self.old);
        self.replacement
    }

    /// Swap abandoned: release the new stream, keep the old one.
    pub fn abort(self) -> LocalStream {
        MediaController::release(&self.replacement);
        self.old
    }
}
