#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::indexing_slicing
)]
//! Integration-style socket tests for the Trackline client.
//!
//! Uses the shared `MockConnector` from `tests/common` to script push-server
//! behavior and verify that `SessionSocket` handshakes, maps events,
//! reconnects, and shuts down correctly.

mod common;

use std::time::Duration;

use common::{
    card_placed_json, game_started_json, new_track_json, player_joined_json, player_left_json,
    session_closed_json, token_action_used_json, MockConnector,
};
use trackline_client::protocol::{ClientMessage, TokenActionKind};
use trackline_client::socket::{SessionSocket, SocketConfig};
use trackline_client::{TracklineError, TracklineEvent};
use uuid::Uuid;

fn session_id() -> Uuid {
    Uuid::from_u128(0x1157E5)
}

fn config() -> SocketConfig {
    SocketConfig::new(session_id()).with_player("Alice", Uuid::from_u128(1))
}

#[tokio::test]
async fn join_lobby_handshake_precedes_everything() {
    let (connector, sent, _closed) =
        MockConnector::new(vec![vec![Some(Ok(game_started_json()))]]);
    let (mut socket, mut events) = SessionSocket::start(connector, config());

    let ev = events.recv().await.expect("event");
    assert!(matches!(ev, TracklineEvent::Connected));
    let ev = events.recv().await.expect("event");
    assert!(matches!(ev, TracklineEvent::GameStarted));

    {
        let messages = sent.lock().unwrap();
        let first: ClientMessage = serde_json::from_str(&messages[0]).expect("parse handshake");
        if let ClientMessage::JoinLobby {
            session_id: sid,
            player_name,
            player_id,
        } = first
        {
            assert_eq!(sid, session_id());
            assert_eq!(player_name.as_deref(), Some("Alice"));
            assert_eq!(player_id, Some(Uuid::from_u128(1)));
        } else {
            panic!("expected JoinLobby handshake, got {first:?}");
        }
    }

    socket.shutdown().await;
}

#[tokio::test]
async fn full_session_event_sequence_is_mapped() {
    let bob = Uuid::from_u128(2);
    let (connector, _sent, _closed) = MockConnector::new(vec![vec![
        Some(Ok(player_joined_json("Bob", bob))),
        Some(Ok(game_started_json())),
        Some(Ok(new_track_json())),
        Some(Ok(card_placed_json(bob))),
        Some(Ok(token_action_used_json(TokenActionKind::SkipSong))),
        Some(Ok(player_left_json(bob, false))),
    ]]);
    let (mut socket, mut events) = SessionSocket::start(connector, config());

    let ev = events.recv().await.unwrap();
    assert!(matches!(ev, TracklineEvent::Connected));

    let ev = events.recv().await.unwrap();
    if let TracklineEvent::PlayerJoined { player } = ev {
        assert_eq!(player.player_id, bob);
        assert_eq!(player.name, "Bob");
    } else {
        panic!("expected PlayerJoined, got {ev:?}");
    }

    assert!(matches!(
        events.recv().await.unwrap(),
        TracklineEvent::GameStarted
    ));
    assert!(matches!(
        events.recv().await.unwrap(),
        TracklineEvent::NewTrack
    ));
    assert!(matches!(
        events.recv().await.unwrap(),
        TracklineEvent::CardPlaced { player_id } if player_id == bob
    ));
    assert!(matches!(
        events.recv().await.unwrap(),
        TracklineEvent::TokenActionUsed {
            action_type: TokenActionKind::SkipSong
        }
    ));
    assert!(matches!(
        events.recv().await.unwrap(),
        TracklineEvent::PlayerLeft { player_id, was_host: false } if player_id == bob
    ));

    socket.shutdown().await;
}

#[tokio::test]
async fn session_closed_reaches_the_consumer() {
    let (connector, _sent, _closed) = MockConnector::new(vec![vec![Some(Ok(
        session_closed_json("the host left the session"),
    ))]]);
    let (mut socket, mut events) = SessionSocket::start(connector, config());

    let _ = events.recv().await; // Connected
    let ev = events.recv().await.unwrap();
    if let TracklineEvent::SessionClosed { message } = ev {
        assert_eq!(message, "the host left the session");
    } else {
        panic!("expected SessionClosed, got {ev:?}");
    }

    socket.shutdown().await;
}

#[tokio::test]
async fn reconnect_rehandshakes_with_same_session() {
    // Transport drops after one event; the replacement transport records a
    // second handshake for the same session id.
    let (connector, sent, _closed) = MockConnector::new(vec![
        vec![Some(Ok(game_started_json())), None],
        vec![],
    ]);
    let cfg = config().with_reconnect(3, Duration::from_millis(10));
    let (mut socket, mut events) = SessionSocket::start(connector, cfg);

    let _ = events.recv().await; // Connected
    let _ = events.recv().await; // GameStarted

    // Reconnect happens transparently; the next Connected marks it.
    loop {
        match events.recv().await.unwrap() {
            TracklineEvent::Reconnecting { .. } => continue,
            TracklineEvent::Connected => break,
            other => panic!("unexpected event {other:?}"),
        }
    }

    {
        let messages = sent.lock().unwrap();
        let handshakes: Vec<ClientMessage> = messages
            .iter()
            .map(|m| serde_json::from_str(m).unwrap())
            .filter(|m| matches!(m, ClientMessage::JoinLobby { .. }))
            .collect();
        assert_eq!(handshakes.len(), 2, "one handshake per connect");
        for handshake in handshakes {
            if let ClientMessage::JoinLobby { session_id: sid, .. } = handshake {
                assert_eq!(sid, session_id(), "reconnect reuses the session id");
            }
        }
    }

    socket.shutdown().await;
}

#[tokio::test]
async fn no_events_after_shutdown_returns() {
    let (connector, _sent, closed) = MockConnector::new(vec![vec![]]);
    let (mut socket, mut events) = SessionSocket::start(connector, config());

    let _ = events.recv().await; // Connected
    socket.shutdown().await;

    // The terminal Disconnected is the last event; the channel then closes.
    let ev = events.recv().await.unwrap();
    assert!(matches!(ev, TracklineEvent::Disconnected { .. }));
    assert!(events.recv().await.is_none());
    assert!(closed.load(std::sync::atomic::Ordering::Relaxed));
}

#[tokio::test]
async fn send_fails_cleanly_when_disconnected() {
    let (connector, _sent, _closed) = MockConnector::new(vec![vec![None]]);
    let cfg = config().with_reconnect(0, Duration::from_millis(5));
    let (mut socket, mut events) = SessionSocket::start(connector, cfg);

    let _ = events.recv().await; // Connected
    let ev = events.recv().await.unwrap();
    assert!(matches!(ev, TracklineEvent::Disconnected { .. }));

    let result = socket.start_game();
    assert!(matches!(result, Err(TracklineError::NotConnected)));

    socket.shutdown().await;
}
