//! Local media stream handles.
//!
//! A [`LocalStream`] is a cheap clone-able handle to one acquired source
//! (camera+mic, or screen). Track enable flags flip atomically without
//! renegotiation: the track stays attached and the far side sees a frozen or
//! silent track, not a dropped connection.

use common::StreamId;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Kind of media carried by a track.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackKind {
    /// Microphone (or screen-share system) audio.
    Audio,
    /// Camera or screen video.
    Video,
}

/// Which source feeds a stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamSource {
    /// Camera plus microphone.
    Camera,
    /// Screen capture.
    Screen,
}

#[derive(Debug)]
struct Track {
    kind: TrackKind,
    enabled: AtomicBool,
}

#[derive(Debug)]
struct StreamInner {
    id: StreamId,
    source: StreamSource,
    device: String,
    tracks: Vec<Track>,
    ended: CancellationToken,
    released: AtomicBool,
}

/// Handle to one acquired local stream.
#[derive(Debug, Clone)]
pub struct LocalStream {
    inner: Arc<StreamInner>,
}

impl LocalStream {
    /// Create a stream handle for an acquired source.
    ///
    /// Providers call this; session code only consumes the handle.
    #[must_use]
    pub fn new(source: StreamSource, device: impl Into<String>, kinds: &[TrackKind]) -> Self {
        let tracks = kinds
            .iter()
            .map(|&kind| Track {
                kind,
                enabled: AtomicBool::new(true),
            })
            .collect();

        Self {
            inner: Arc::new(StreamInner {
                id: StreamId::new(),
                source,
                device: device.into(),
                tracks,
                ended: CancellationToken::new(),
                released: AtomicBool::new(false),
            }),
        }
    }

    /// Stream identifier.
    #[must_use]
    pub fn id(&self) -> StreamId {
        self.inner.id
    }

    /// Which source feeds this stream.
    #[must_use]
    pub fn source(&self) -> StreamSource {
        self.inner.source
    }

    /// Provider device label (e.g. the camera the stream came from).
    #[must_use]
    pub fn device(&self) -> &str {
        &self.inner.device
    }

    /// Whether the stream carries a track of the given kind.
    #[must_use]
    pub fn has_track(&self, kind: TrackKind) -> bool {
        self.inner.tracks.iter().any(|t| t.kind == kind)
    }

    /// Flip a track's enabled flag. Returns `false` when no such track exists.
    ///
    /// Idempotent: setting the current value again is a no-op.
    pub fn set_track_enabled(&self, kind: TrackKind, enabled: bool) -> bool {
        match self.inner.tracks.iter().find(|t| t.kind == kind) {
            Some(track) => {
                track.enabled.store(enabled, Ordering::Release);
                true
            }
            None => false,
        }
    }

    /// Current enabled flag for a track kind, `None` if the track is absent.
    #[must_use]
    pub fn is_track_enabled(&self, kind: TrackKind) -> Option<bool> {
        self.inner
            .tracks
            .iter()
            .find(|t| t.kind == kind)
            .map(|t| t.enabled.load(Ordering::Acquire))
    }

    /// Stop all tracks. Idempotent; returns `true` on the first call only.
    pub fn release(&self) -> bool {
        !self.inner.released.swap(true, Ordering::AcqRel)
    }

    /// Whether the stream has been released.
    #[must_use]
    pub fn is_released(&self) -> bool {
        self.inner.released.load(Ordering::Acquire)
    }

    /// Provider-side signal: the source ended outside our control (e.g. the
    /// user stopped an OS-level screen share).
    pub fn mark_ended(&self) {
        self.inner.ended.cancel();
    }

    /// Whether the source has ended outside our control.
    #[must_use]
    pub fn is_ended(&self) -> bool {
        self.inner.ended.is_cancelled()
    }

    /// Token that fires when the source ends outside our control.
    #[must_use]
    pub fn ended_token(&self) -> CancellationToken {
        self.inner.ended.clone()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    fn camera() -> LocalStream {
        LocalStream::new(
            StreamSource::Camera,
            "cam-0",
            &[TrackKind::Audio, TrackKind::Video],
        )
    }

    #[test]
    fn test_tracks_start_enabled() {
        let stream = camera();
        assert_eq!(stream.is_track_enabled(TrackKind::Audio), Some(true));
        assert_eq!(stream.is_track_enabled(TrackKind::Video), Some(true));
    }

    #[test]
    fn test_toggle_reflects_last_call() {
        let stream = camera();
        stream.set_track_enabled(TrackKind::Video, false);
        stream.set_track_enabled(TrackKind::Video, false);
        assert_eq!(stream.is_track_enabled(TrackKind::Video), Some(false));

        stream.set_track_enabled(TrackKind::Video, true);
        assert_eq!(stream.is_track_enabled(TrackKind::Video), Some(true));
    }

    #[test]
    fn test_missing_track_reports_false() {
        let video_only = LocalStream::new(StreamSource::Screen, "screen-0", &[TrackKind::Video]);
        assert!(!video_only.set_track_enabled(TrackKind::Audio, false));
        assert_eq!(video_only.is_track_enabled(TrackKind::Audio), None);
    }

    #[test]
    fn test_release_is_idempotent() {
        let stream = camera();
        assert!(stream.release());
        assert!(!stream.release());
        assert!(stream.is_released());
    }

    #[test]
    fn test_ended_token_fires_once_marked() {
        let stream = camera();
        let token = stream.ended_token();
        assert!(!token.is_cancelled());
        stream.mark_ended();
        assert!(token.is_cancelled());
        assert!(stream.is_ended());
    }
}
