//! Peer negotiation, reconnect, and chat integration tests.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use common::PeerId;
use session_core::{ChatDelivery, ErrorKind, PeerStatus, SessionEvent, SessionState};
use session_core::signaling::SignalingClient;
use session_test_utils::{
    drain_events, expect_error, expect_event, PeerControl, TestSession,
};
use signal_protocol::{IceCandidate, SessionDescription, SignalBody, SignalMessage};
use std::time::Duration;

fn peer(name: &str) -> PeerId {
    PeerId::from(name)
}

/// Drive the offerer flow for one remote peer up to `Connected`:
/// register the remote on the hub, connect, answer the offer, report
/// connectivity.
async fn connect_remote(session: &mut TestSession, remote: &str) -> PeerControl {
    let (remote_client, mut remote_rx) = session.hub.client(remote);

    session.handle.connect_peer(peer(remote)).await.unwrap();
    let control = session.connector.control(&peer(remote)).await;

    // The remote side sees our offer and answers it.
    let offer = tokio::time::timeout(Duration::from_secs(2), remote_rx.recv())
        .await
        .expect("no offer within timeout")
        .expect("hub route closed");
    assert!(matches!(offer.body, SignalBody::Offer(_)));

    remote_client
        .send(SignalMessage::answer(
            peer(remote),
            session.handle.self_id().clone(),
            SessionDescription::new(format!("answer-from-{remote}")),
        ))
        .await
        .unwrap();

    control.connected().await;
    expect_event(&mut session.events, |e| {
        matches!(
            e,
            SessionEvent::ConnectionStatusChanged {
                status: PeerStatus::Connected,
                ..
            }
        )
    })
    .await;

    control
}

#[tokio::test]
async fn test_offerer_flow_creates_participant_on_connect() {
    let mut session = TestSession::join_active("alice", "meeting-1").await;
    let control = connect_remote(&mut session, "bob").await;

    let participants = session.handle.participants().await.unwrap();
    assert_eq!(participants.len(), 2);
    assert!(participants.iter().any(|p| p.id == peer("bob")));

    // The engine got our stream and the remote answer.
    assert_eq!(control.transport().attached_streams().len(), 1);
    assert!(control.transport().remote_description().is_some());
}

#[tokio::test]
async fn test_incoming_offer_spawns_answerer_and_sends_answer() {
    let mut session = TestSession::join_active("alice", "meeting-1").await;
    let (bob_client, mut bob_rx) = session.hub.client("bob");

    bob_client
        .send(SignalMessage::offer(
            peer("bob"),
            peer("alice"),
            SessionDescription::new("offer-from-bob"),
        ))
        .await
        .unwrap();

    let control = session.connector.control(&peer("bob")).await;

    // Our answer reaches bob.
    let answer = tokio::time::timeout(Duration::from_secs(2), bob_rx.recv())
        .await
        .expect("no answer within timeout")
        .expect("hub route closed");
    assert!(matches!(answer.body, SignalBody::Answer(_)));
    assert_eq!(
        control.transport().remote_description(),
        Some(SessionDescription::new("offer-from-bob"))
    );

    control.connected().await;
    expect_event(&mut session.events, |e| {
        matches!(e, SessionEvent::ParticipantsChanged { participants } if participants.len() == 2)
    })
    .await;
}

#[tokio::test]
async fn test_candidates_before_answer_apply_in_arrival_order() {
    let mut session = TestSession::join_active("alice", "meeting-1").await;
    let (bob_client, mut bob_rx) = session.hub.client("bob");

    session.handle.connect_peer(peer("bob")).await.unwrap();
    let control = session.connector.control(&peer("bob")).await;

    let _offer = tokio::time::timeout(Duration::from_secs(2), bob_rx.recv())
        .await
        .unwrap()
        .unwrap();

    // Bob trickles candidates before his answer arrives. They must queue
    // (the engine would reject them) and apply in order after the answer.
    for n in 1..=3 {
        bob_client
            .send(SignalMessage::candidate(
                peer("bob"),
                peer("alice"),
                IceCandidate::new(format!("bob-candidate-{n}")),
            ))
            .await
            .unwrap();
    }
    bob_client
        .send(SignalMessage::answer(
            peer("bob"),
            peer("alice"),
            SessionDescription::new("answer-from-bob"),
        ))
        .await
        .unwrap();

    control.connected().await;
    expect_event(&mut session.events, |e| {
        matches!(
            e,
            SessionEvent::ConnectionStatusChanged {
                status: PeerStatus::Connected,
                ..
            }
        )
    })
    .await;

    // The answer travels through the signaling pump; wait for the drain.
    tokio::time::timeout(Duration::from_secs(2), async {
        while control.transport().applied_candidates().len() < 3 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("queued candidates never applied");

    assert_eq!(
        control.transport().applied_candidates(),
        vec![
            IceCandidate::new("bob-candidate-1"),
            IceCandidate::new("bob-candidate-2"),
            IceCandidate::new("bob-candidate-3"),
        ]
    );
}

#[tokio::test]
async fn test_local_candidates_are_trickled_to_the_remote() {
    let mut session = TestSession::join_active("alice", "meeting-1").await;
    let control = connect_remote(&mut session, "bob").await;

    control.emit_candidate("alice-host-candidate").await;

    // The candidate goes out through signaling, addressed to bob.
    tokio::time::timeout(Duration::from_secs(2), async {
        loop {
            let log = session.hub.sent_log();
            if log.iter().any(|m| {
                m.to == peer("bob") && matches!(&m.body, SignalBody::Candidate(c) if c.as_str() == "alice-host-candidate")
            }) {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("candidate never reached signaling");
}

#[tokio::test]
async fn test_one_failing_peer_does_not_close_the_meeting() {
    let mut session = TestSession::join_active("alice", "meeting-1").await;

    // A connects fully; B's engine finds no path.
    let _control_a = connect_remote(&mut session, "peer-a").await;

    let (_b_client, _b_rx) = session.hub.client("peer-b");
    session.handle.connect_peer(peer("peer-b")).await.unwrap();
    let control_b = session.connector.control(&peer("peer-b")).await;
    control_b.fail().await;

    expect_error(&mut session.events, ErrorKind::NegotiationFailed).await;

    let participants = session.handle.participants().await.unwrap();
    assert!(participants.iter().any(|p| p.id == peer("peer-a")));
    assert!(!participants.iter().any(|p| p.id == peer("peer-b")));
    assert_eq!(session.handle.state(), SessionState::Active);
}

#[tokio::test]
async fn test_bye_mid_reconnecting_closes_without_further_attempts() {
    let mut session = TestSession::join_active("alice", "meeting-1").await;
    let (bob_client, _bob_rx) = session.hub.client("bob2");

    // Bring bob2 up via the answerer path so the hub client stays routable.
    bob_client
        .send(SignalMessage::offer(
            peer("bob2"),
            peer("alice"),
            SessionDescription::new("offer-from-bob2"),
        ))
        .await
        .unwrap();
    let control = session.connector.control(&peer("bob2")).await;
    control.connected().await;
    expect_event(&mut session.events, |e| {
        matches!(
            e,
            SessionEvent::ConnectionStatusChanged {
                status: PeerStatus::Connected,
                ..
            }
        )
    })
    .await;

    // Transport drops; the reconnect window starts.
    control.disconnect().await;
    expect_event(&mut session.events, |e| {
        matches!(
            e,
            SessionEvent::ConnectionStatusChanged {
                status: PeerStatus::Reconnecting,
                ..
            }
        )
    })
    .await;
    assert_eq!(control.transport().restart_ice_calls(), 1);

    // Bye lands mid-window: straight to Closed, participant removed.
    bob_client
        .send(SignalMessage::bye(peer("bob2"), peer("alice")))
        .await
        .unwrap();

    expect_event(&mut session.events, |e| {
        matches!(
            e,
            SessionEvent::ConnectionStatusChanged {
                status: PeerStatus::Closed,
                ..
            }
        )
    })
    .await;

    let participants = session.handle.participants().await.unwrap();
    assert_eq!(participants.len(), 1);
    assert!(control.transport().is_closed());
    assert_eq!(control.transport().restart_ice_calls(), 1);

    // No failure surfaced: this was an orderly teardown.
    let rest = drain_events(&mut session.events);
    assert!(!rest.iter().any(|e| matches!(e, SessionEvent::Error { .. })));
    assert_eq!(session.handle.state(), SessionState::Active);
}

#[tokio::test(start_paused = true)]
async fn test_reconnect_window_expiry_fails_the_peer() {
    let mut session = TestSession::join_active("alice", "meeting-1").await;
    let control = connect_remote(&mut session, "bob").await;

    control.disconnect().await;
    expect_event(&mut session.events, |e| {
        matches!(
            e,
            SessionEvent::ConnectionStatusChanged {
                status: PeerStatus::Reconnecting,
                ..
            }
        )
    })
    .await;

    // Inside the 15-second window the participant stays, shown reconnecting.
    tokio::time::advance(Duration::from_secs(10)).await;
    tokio::time::sleep(Duration::from_millis(10)).await;
    let participants = session.handle.participants().await.unwrap();
    assert_eq!(participants.len(), 2);

    // Past the window: the peer fails and is removed.
    tokio::time::advance(Duration::from_secs(6)).await;
    tokio::time::sleep(Duration::from_millis(10)).await;

    expect_error(&mut session.events, ErrorKind::NegotiationFailed).await;
    let participants = session.handle.participants().await.unwrap();
    assert_eq!(participants.len(), 1);
    assert!(control.transport().is_closed());
}

#[tokio::test(start_paused = true)]
async fn test_reconnect_success_within_window_keeps_participant() {
    let mut session = TestSession::join_active("alice", "meeting-1").await;
    let control = connect_remote(&mut session, "bob").await;

    control.disconnect().await;
    expect_event(&mut session.events, |e| {
        matches!(
            e,
            SessionEvent::ConnectionStatusChanged {
                status: PeerStatus::Reconnecting,
                ..
            }
        )
    })
    .await;

    tokio::time::advance(Duration::from_secs(5)).await;
    control.connected().await;
    expect_event(&mut session.events, |e| {
        matches!(
            e,
            SessionEvent::ConnectionStatusChanged {
                status: PeerStatus::Connected,
                ..
            }
        )
    })
    .await;

    // Well past the original window: the cleared deadline must not fire.
    tokio::time::advance(Duration::from_secs(30)).await;
    tokio::time::sleep(Duration::from_millis(10)).await;

    let participants = session.handle.participants().await.unwrap();
    assert_eq!(participants.len(), 2);
    let rest = drain_events(&mut session.events);
    assert!(!rest.iter().any(|e| matches!(e, SessionEvent::Error { .. })));
}

#[tokio::test(start_paused = true)]
async fn test_quality_degradation_is_sampled_and_reported() {
    let mut session = TestSession::join_active("alice", "meeting-1").await;
    let control = connect_remote(&mut session, "bob").await;
    drain_events(&mut session.events);

    control.transport().set_stats(600, 12.0);

    expect_event(&mut session.events, |e| {
        matches!(e, SessionEvent::ParticipantsChanged { participants } if participants
            .iter()
            .any(|p| p.id == peer("bob") && p.quality == session_core::ConnectionQuality::Poor))
    })
    .await;
}

#[tokio::test]
async fn test_pending_chat_flushes_in_order_when_channel_opens() {
    let mut session = TestSession::join_active("alice", "meeting-1").await;

    assert_eq!(
        session.handle.send_chat("first").await.unwrap(),
        ChatDelivery::Pending
    );
    assert_eq!(
        session.handle.send_chat("second").await.unwrap(),
        ChatDelivery::Pending
    );

    let control = connect_remote(&mut session, "bob").await;
    control.open_data_channel().await;

    // Both queued messages flush, in compose order.
    tokio::time::timeout(Duration::from_secs(2), async {
        while control.transport().sent_data().len() < 2 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("pending chat never flushed");

    let bodies: Vec<String> = control
        .transport()
        .sent_data()
        .iter()
        .map(|data| session_core::chat::decode_wire(data).unwrap().body)
        .collect();
    assert_eq!(bodies, vec!["first".to_string(), "second".to_string()]);

    // With the channel open, new messages go straight out.
    assert_eq!(
        session.handle.send_chat("third").await.unwrap(),
        ChatDelivery::Sent
    );
    assert_eq!(control.transport().sent_data().len(), 3);
}

#[tokio::test]
async fn test_remote_chat_is_delivered_once() {
    let mut session = TestSession::join_active("alice", "meeting-1").await;
    let control = connect_remote(&mut session, "bob").await;
    control.open_data_channel().await;
    drain_events(&mut session.events);

    let message = session_core::ChatMessage {
        id: uuid::Uuid::new_v4(),
        sender: peer("bob"),
        body: "hello from bob".to_string(),
        sent_at: chrono::Utc::now(),
    };
    let wire = session_core::chat::encode_wire(&message).unwrap();

    control.deliver_data(wire.clone()).await;
    let event = expect_event(&mut session.events, |e| {
        matches!(e, SessionEvent::Chat { .. })
    })
    .await;
    if let SessionEvent::Chat { message: received } = event {
        assert_eq!(received, message);
    }

    // A reconnect flush may resend; the duplicate is suppressed.
    control.deliver_data(wire).await;
    tokio::time::sleep(Duration::from_millis(20)).await;
    let rest = drain_events(&mut session.events);
    assert!(!rest.iter().any(|e| matches!(e, SessionEvent::Chat { .. })));
}

#[tokio::test]
async fn test_signaling_outage_blocks_new_joins_only() {
    let mut session = TestSession::join_active("alice", "meeting-1").await;
    let _control_a = connect_remote(&mut session, "peer-a").await;

    session.hub.set_down(true);

    session.handle.connect_peer(peer("peer-b")).await.unwrap();
    expect_error(&mut session.events, ErrorKind::SignalingUnavailable).await;

    // The established peer is untouched; the meeting stays up.
    let participants = session.handle.participants().await.unwrap();
    assert!(participants.iter().any(|p| p.id == peer("peer-a")));
    assert!(!participants.iter().any(|p| p.id == peer("peer-b")));
    assert_eq!(session.handle.state(), SessionState::Active);

    // Back up: joining works again.
    session.hub.set_down(false);
    let _control_c = connect_remote(&mut session, "peer-c").await;
}

#[tokio::test]
async fn test_meeting_continues_solo_after_last_peer_leaves() {
    let mut session = TestSession::join_active("alice", "meeting-1").await;
    let (bob_client, _bob_rx) = session.hub.client("bob");

    bob_client
        .send(SignalMessage::offer(
            peer("bob"),
            peer("alice"),
            SessionDescription::new("offer-from-bob"),
        ))
        .await
        .unwrap();
    let control = session.connector.control(&peer("bob")).await;
    control.connected().await;
    expect_event(&mut session.events, |e| {
        matches!(e, SessionEvent::ParticipantsChanged { participants } if participants.len() == 2)
    })
    .await;

    bob_client
        .send(SignalMessage::bye(peer("bob"), peer("alice")))
        .await
        .unwrap();
    expect_event(&mut session.events, |e| {
        matches!(e, SessionEvent::ParticipantsChanged { participants } if participants.len() == 1)
    })
    .await;

    // Solo but very much alive.
    assert_eq!(session.handle.state(), SessionState::Active);
    assert!(session.handle.send_chat("still here").await.is_ok());
}

#[tokio::test]
async fn test_leave_sends_bye_to_every_peer() {
    let mut session = TestSession::join_active("alice", "meeting-1").await;
    let control_a = connect_remote(&mut session, "peer-a").await;
    let control_b = connect_remote(&mut session, "peer-b").await;

    session.handle.leave().await.unwrap();
    session.wait_for_state(SessionState::Closed).await;

    let byes: Vec<_> = session
        .hub
        .sent_log()
        .into_iter()
        .filter(|m| matches!(m.body, SignalBody::Bye))
        .map(|m| m.to)
        .collect();
    assert!(byes.contains(&peer("peer-a")));
    assert!(byes.contains(&peer("peer-b")));
    assert!(control_a.transport().is_closed());
    assert!(control_b.transport().is_closed());
}
