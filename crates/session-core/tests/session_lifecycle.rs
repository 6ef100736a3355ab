//! Session lifecycle integration tests: joining, local media, teardown.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use session_core::media::{StreamSource, TrackKind};
use session_core::{ChatDelivery, ErrorKind, SessionError, SessionEvent, SessionState};
use session_test_utils::{
    drain_events, expect_error, expect_event, MockMediaProvider, TestSession, MOCK_CAMERA_DEVICE,
};
use std::time::Duration;

#[tokio::test]
async fn test_join_reaches_active_and_reports_local_media() {
    let mut session = TestSession::join_active("alice", "meeting-1").await;

    let media_event = expect_event(&mut session.events, |e| {
        matches!(e, SessionEvent::MediaStateChanged { .. })
    })
    .await;

    if let SessionEvent::MediaStateChanged { state } = media_event {
        assert_eq!(state.source, StreamSource::Camera);
        assert!(state.audio_enabled);
        assert!(state.video_enabled);
    }

    let participants = session.handle.participants().await.unwrap();
    assert_eq!(participants.len(), 1);
    let me = participants.first().unwrap();
    assert!(me.is_self);
    assert!(me.is_host);
}

#[tokio::test]
async fn test_camera_denial_closes_with_exactly_one_media_error() {
    let mut session = TestSession::spawn(
        "alice",
        "meeting-1",
        MockMediaProvider::new().deny_camera("permission denied"),
    );

    expect_error(&mut session.events, ErrorKind::MediaUnavailable).await;
    session.wait_for_state(SessionState::Closed).await;

    // Exactly one error, and the session was never active: no media event,
    // no second error.
    let rest = drain_events(&mut session.events);
    assert!(!rest
        .iter()
        .any(|e| matches!(e, SessionEvent::Error { .. })));
    assert!(!rest
        .iter()
        .any(|e| matches!(e, SessionEvent::MediaStateChanged { .. })));
    assert_eq!(session.handle.state(), SessionState::Closed);
}

#[tokio::test]
async fn test_no_devices_at_all_is_a_precondition_failure() {
    let mut session = TestSession::spawn(
        "alice",
        "meeting-1",
        MockMediaProvider::new().without_devices(),
    );

    expect_error(&mut session.events, ErrorKind::MediaUnavailable).await;
    session.wait_for_state(SessionState::Closed).await;
    // The probe failed before any acquisition was attempted.
    assert_eq!(session.media.camera_acquire_count(), 0);
}

#[tokio::test]
async fn test_mute_reflects_last_call_and_repeats_are_no_ops() {
    let mut session = TestSession::join_active("alice", "meeting-1").await;
    drain_events(&mut session.events);

    session.handle.set_audio_enabled(false).await.unwrap();
    session.handle.set_audio_enabled(false).await.unwrap();
    session.handle.set_audio_enabled(false).await.unwrap();

    let events = drain_events(&mut session.events);
    let media_changes: Vec<_> = events
        .iter()
        .filter(|e| matches!(e, SessionEvent::MediaStateChanged { .. }))
        .collect();
    assert_eq!(media_changes.len(), 1, "repeated toggles must not re-emit");

    let camera = session.media.last_camera().unwrap();
    assert_eq!(camera.is_track_enabled(TrackKind::Audio), Some(false));

    session.handle.set_audio_enabled(true).await.unwrap();
    assert_eq!(camera.is_track_enabled(TrackKind::Audio), Some(true));
}

#[tokio::test]
async fn test_screen_share_round_trip_restores_camera() {
    let session = TestSession::join_active("alice", "meeting-1").await;
    let original_camera = session.media.last_camera().unwrap();

    session.handle.start_screen_share().await.unwrap();
    let screen = session.media.last_screen().unwrap();
    assert!(original_camera.is_released());
    assert!(!screen.is_released());

    // Mute video mid-share; the flag must survive the swap back.
    session.handle.set_video_enabled(false).await.unwrap();

    session.handle.stop_screen_share().await.unwrap();
    assert!(screen.is_released());

    let restored = session.media.last_camera().unwrap();
    assert_eq!(session.media.camera_acquire_count(), 2);
    assert_eq!(restored.device(), MOCK_CAMERA_DEVICE);
    assert_eq!(restored.source(), StreamSource::Camera);
    assert!(!restored.is_released());
    assert_eq!(restored.is_track_enabled(TrackKind::Video), Some(false));
    assert_eq!(restored.is_track_enabled(TrackKind::Audio), Some(true));
}

#[tokio::test]
async fn test_screen_share_is_idempotent() {
    let session = TestSession::join_active("alice", "meeting-1").await;

    session.handle.start_screen_share().await.unwrap();
    session.handle.start_screen_share().await.unwrap();

    // The second call found the screen already active and acquired nothing.
    assert_eq!(session.media.acquired_screens().len(), 1);
}

#[tokio::test]
async fn test_cancelled_share_picker_keeps_camera() {
    let mut session = TestSession::spawn(
        "alice",
        "meeting-1",
        MockMediaProvider::new().deny_screen("share picker cancelled"),
    );
    session.wait_for_state(SessionState::Active).await;

    let result = session.handle.start_screen_share().await;
    assert!(matches!(result, Err(SessionError::MediaUnavailable(_))));
    expect_error(&mut session.events, ErrorKind::MediaUnavailable).await;

    // Still active on the original camera stream.
    assert_eq!(session.handle.state(), SessionState::Active);
    let camera = session.media.last_camera().unwrap();
    assert!(!camera.is_released());
}

#[tokio::test]
async fn test_os_level_screen_stop_swaps_back_to_camera() {
    let mut session = TestSession::join_active("alice", "meeting-1").await;

    session.handle.start_screen_share().await.unwrap();
    drain_events(&mut session.events);

    // The user stops sharing from the OS tray, not through our UI.
    session.media.last_screen().unwrap().mark_ended();

    let event = expect_event(&mut session.events, |e| {
        matches!(e, SessionEvent::MediaStateChanged { .. })
    })
    .await;
    if let SessionEvent::MediaStateChanged { state } = event {
        assert_eq!(state.source, StreamSource::Camera);
    }
    assert_eq!(session.media.camera_acquire_count(), 2);
    assert!(session.media.last_screen().unwrap().is_released());
}

#[tokio::test]
async fn test_leave_releases_media_and_closes() {
    let session = TestSession::join_active("alice", "meeting-1").await;
    let camera = session.media.last_camera().unwrap();

    session.handle.leave().await.unwrap();
    session.wait_for_state(SessionState::Closed).await;
    assert!(camera.is_released());

    // Every further operation fails with SessionClosed.
    assert!(matches!(
        session.handle.send_chat("too late").await,
        Err(SessionError::SessionClosed)
    ));
    assert!(matches!(
        session.handle.set_audio_enabled(false).await,
        Err(SessionError::SessionClosed)
    ));
    assert!(matches!(
        session.handle.leave().await,
        Err(SessionError::SessionClosed)
    ));
}

#[tokio::test]
async fn test_chat_is_optimistic_and_pending_without_peers() {
    let mut session = TestSession::join_active("alice", "meeting-1").await;
    drain_events(&mut session.events);

    let delivery = session.handle.send_chat("anyone here?").await.unwrap();
    assert_eq!(delivery, ChatDelivery::Pending);

    // Appended locally immediately despite no open channel.
    let chat_event = expect_event(&mut session.events, |e| {
        matches!(e, SessionEvent::Chat { .. })
    })
    .await;
    if let SessionEvent::Chat { message } = chat_event {
        assert_eq!(message.body, "anyone here?");
    }
    expect_error(&mut session.events, ErrorKind::DeliveryFailed).await;

    let history = session.handle.chat_history().await.unwrap();
    assert_eq!(history.len(), 1);
}

#[tokio::test]
async fn test_invite_link_is_deterministic_and_encoded() {
    let session = TestSession::join_active("alice", "meeting-7").await;

    let first = session.handle.invite_link("https://waypoint.example");
    let second = session.handle.invite_link("https://waypoint.example");
    assert_eq!(first, second);
    assert_eq!(
        first,
        "https://waypoint.example/join-meeting/meeting-7?host=alice%20%28test%29"
    );

    // Callable after close too: no session state involved.
    session.handle.leave().await.unwrap();
    tokio::time::sleep(Duration::from_millis(10)).await;
    assert_eq!(
        session.handle.invite_link("https://waypoint.example"),
        first
    );
}
