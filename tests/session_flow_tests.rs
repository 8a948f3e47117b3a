#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::indexing_slicing
)]
//! Store + controller flow tests against a scripted REST backend.
//!
//! These exercise the session state machine end to end: local guards,
//! pending-intent reconciliation, refresh effects, and the token economy —
//! asserting on exactly which network calls were made.

mod common;

use std::sync::Arc;

use common::{ApiCall, MockApi};
use trackline_client::api::{PlacementResult, TokenActionResult};
use trackline_client::error::TracklineError;
use trackline_client::placement::{PlacementController, SelectOutcome};
use trackline_client::protocol::{GameMode, PlayerSnapshot, TimelineCard};
use trackline_client::store::{
    IntentKind, PlacementGuess, SessionStore, StoreEffect, StoreInput,
};
use trackline_client::tokens::{StealRequest, TokenActionController};
use trackline_client::TracklineEvent;
use uuid::Uuid;

// ── Helpers ─────────────────────────────────────────────────────────

fn sid() -> Uuid {
    Uuid::from_u128(0x5E55)
}

fn pid(n: u128) -> Uuid {
    Uuid::from_u128(n)
}

fn snapshot(n: u128, name: &str, score: u32, tokens: u32) -> PlayerSnapshot {
    PlayerSnapshot {
        player_id: pid(n),
        name: name.into(),
        score,
        tokens,
    }
}

fn card(title: &str, year: i32) -> TimelineCard {
    TimelineCard {
        track_id: format!("track-{year}"),
        title: title.into(),
        artist: "Artist".into(),
        year,
    }
}

fn correct_placement() -> PlacementResult {
    PlacementResult {
        correct: true,
        correct_title: "Hey Jude".into(),
        correct_artist: "The Beatles".into(),
        correct_year: 1968,
        earned_token: false,
    }
}

/// A started session seen by player `local` with Alice (1, host, 2 tokens)
/// and Bob (2, 1 token); it is player 1's turn.
fn started_store(local: u128, mode: GameMode) -> SessionStore {
    let mut store = SessionStore::new(sid(), pid(local), mode);
    store.apply(StoreInput::PlayersFetched(vec![
        snapshot(1, "Alice", 0, 2),
        snapshot(2, "Bob", 0, 1),
    ]));
    store.apply(StoreInput::Push(TracklineEvent::GameStarted));
    store
}

/// Execute reducer effects the way an embedder would: refreshes hit the
/// API and feed back into the store; notices are collected.
async fn run_effects(
    store: &mut SessionStore,
    api: &Arc<MockApi>,
    effects: Vec<StoreEffect>,
) -> Vec<String> {
    let mut notices = Vec::new();
    for effect in effects {
        match effect {
            StoreEffect::RefreshPlayers => {
                let players = trackline_client::GameApi::players(api.as_ref(), store.session_id())
                    .await
                    .unwrap();
                store.apply(StoreInput::PlayersFetched(players));
            }
            StoreEffect::RefreshTimeline(player_id) => {
                let cards =
                    trackline_client::GameApi::timeline(api.as_ref(), store.session_id(), player_id)
                        .await
                        .unwrap();
                store.apply(StoreInput::TimelineFetched { player_id, cards });
            }
            StoreEffect::SessionEnded { .. } => {}
            StoreEffect::Notice(message) => notices.push(message),
        }
    }
    notices
}

// ── Placement flow ──────────────────────────────────────────────────

#[tokio::test]
async fn original_mode_selection_arms_immediate_submission() {
    let api = MockApi::new();
    let mut store = started_store(1, GameMode::Original);
    let mut controller = PlacementController::new(api.clone());

    let outcome = controller.select_position(&store, 0).unwrap();
    assert_eq!(outcome, SelectOutcome::ReadyToSubmit);

    api.set_placement(Ok(correct_placement()));
    api.set_players(vec![snapshot(1, "Alice", 1, 2), snapshot(2, "Bob", 0, 1)]);
    controller
        .submit(&mut store, PlacementGuess::default())
        .await
        .unwrap();

    // Exactly one submission, carrying the selected position and no guess.
    let placements: Vec<_> = api
        .calls()
        .into_iter()
        .filter_map(|c| match c {
            ApiCall::PlaceCard(req) => Some(req),
            _ => None,
        })
        .collect();
    assert_eq!(placements.len(), 1);
    assert_eq!(placements[0].position, 0);
    assert!(placements[0].title_guess.is_none());
}

#[tokio::test]
async fn pro_mode_waits_for_guess() {
    let api = MockApi::new();
    let store = started_store(1, GameMode::Pro);
    let mut controller = PlacementController::new(api.clone());

    let outcome = controller.select_position(&store, 0).unwrap();
    assert_eq!(outcome, SelectOutcome::AwaitingGuess);
    assert_eq!(api.submission_count(), 0);
}

#[tokio::test]
async fn correct_placement_applies_card_and_host_advances_track() {
    let api = MockApi::new();
    let mut store = started_store(1, GameMode::Original);
    let mut controller = PlacementController::new(api.clone());

    controller.select_position(&store, 0).unwrap();
    api.set_placement(Ok(correct_placement()));
    let outcome = controller
        .submit(&mut store, PlacementGuess::default())
        .await
        .unwrap();

    assert!(outcome.result.correct);
    let local = store.local_player().unwrap();
    assert_eq!(local.timeline.len(), 1);
    assert_eq!(local.timeline[0].title, "Hey Jude");
    assert!(store.pending_intent().is_none());

    // Player 1 is the host: next-track fires, sequenced after the result
    // was applied.
    assert_eq!(api.next_track_calls.load(std::sync::atomic::Ordering::SeqCst), 1);
    let calls = api.calls();
    let place_idx = calls
        .iter()
        .position(|c| matches!(c, ApiCall::PlaceCard(_)))
        .unwrap();
    let next_idx = calls
        .iter()
        .position(|c| matches!(c, ApiCall::NextTrack(_)))
        .unwrap();
    assert!(place_idx < next_idx);
}

#[tokio::test]
async fn non_host_does_not_advance_track() {
    let api = MockApi::new();
    // Player 2's view; make it their turn first.
    let mut store = started_store(2, GameMode::Original);
    store.apply(StoreInput::Push(TracklineEvent::NewTrack));
    assert!(store.is_local_turn());

    let mut controller = PlacementController::new(api.clone());
    controller.select_position(&store, 0).unwrap();
    api.set_placement(Ok(correct_placement()));
    controller
        .submit(&mut store, PlacementGuess::default())
        .await
        .unwrap();

    assert_eq!(api.next_track_calls.load(std::sync::atomic::Ordering::SeqCst), 0);
}

#[tokio::test]
async fn submission_out_of_turn_is_local_rejection() {
    let api = MockApi::new();
    // Player 2's view while it is player 1's turn.
    let store = started_store(2, GameMode::Original);
    let mut controller = PlacementController::new(api.clone());

    let err = controller.select_position(&store, 0).unwrap_err();
    assert!(matches!(err, TracklineError::NotYourTurn));
    assert_eq!(api.submission_count(), 0);
}

#[tokio::test]
async fn second_submission_while_pending_is_a_no_op() {
    let api = MockApi::new();
    let mut store = started_store(1, GameMode::Original);
    let mut controller = PlacementController::new(api.clone());

    // First click: position chosen, request in flight (simulated by the
    // registered intent).
    controller.select_position(&store, 0).unwrap();
    store
        .begin_intent(IntentKind::Placement {
            position: 0,
            guess: PlacementGuess::default(),
        })
        .unwrap();

    // Second rapid click at a different position: rejected locally, no
    // network call of any kind.
    let err = controller.select_position(&store, 1).unwrap_err();
    assert!(matches!(err, TracklineError::SubmissionPending));
    let err = controller
        .submit(&mut store, PlacementGuess::default())
        .await
        .unwrap_err();
    assert!(matches!(err, TracklineError::SubmissionPending));
    assert_eq!(api.submission_count(), 0);
}

#[tokio::test]
async fn out_of_range_position_is_rejected() {
    let api = MockApi::new();
    let store = started_store(1, GameMode::Original);
    let mut controller = PlacementController::new(api.clone());

    // Empty timeline: only position 0 is valid.
    assert!(controller.select_position(&store, 0).is_ok());
    let err = controller.select_position(&store, 1).unwrap_err();
    assert!(matches!(
        err,
        TracklineError::InvalidPosition { position: 1, len: 0 }
    ));
}

#[tokio::test]
async fn failed_placement_leaves_state_untouched() {
    let api = MockApi::new();
    let mut store = started_store(1, GameMode::Original);
    let mut controller = PlacementController::new(api.clone());

    controller.select_position(&store, 0).unwrap();
    api.set_placement(Err(TracklineError::Timeout));
    let err = controller
        .submit(&mut store, PlacementGuess::default())
        .await
        .unwrap_err();
    assert!(matches!(err, TracklineError::Timeout));

    assert!(store.pending_intent().is_none(), "intent cleared on failure");
    assert!(store.local_player().unwrap().timeline.is_empty());
    // The user may retry: the guard is open again.
    assert!(controller.select_position(&store, 0).is_ok());
}

// ── Token economy ───────────────────────────────────────────────────

#[tokio::test]
async fn skip_with_zero_tokens_is_local_rejection() {
    let api = MockApi::new();
    let mut store = started_store(1, GameMode::Original);
    store.apply(StoreInput::PlayersFetched(vec![
        snapshot(1, "Alice", 0, 0),
        snapshot(2, "Bob", 0, 1),
    ]));

    let controller = TokenActionController::new(api.clone());
    let err = controller.skip(&mut store).await.unwrap_err();
    assert!(matches!(
        err,
        TracklineError::InsufficientTokens {
            needed: 1,
            available: 0
        }
    ));
    assert_eq!(api.submission_count(), 0);
}

#[tokio::test]
async fn buy_requires_three_tokens() {
    let api = MockApi::new();
    let mut store = started_store(1, GameMode::Original); // Alice has 2
    let controller = TokenActionController::new(api.clone());

    let err = controller.buy(&mut store).await.unwrap_err();
    assert!(matches!(
        err,
        TracklineError::InsufficientTokens {
            needed: 3,
            available: 2
        }
    ));
    assert_eq!(api.submission_count(), 0);
}

#[tokio::test]
async fn steal_with_empty_guess_is_rejected_before_any_request() {
    let api = MockApi::new();
    let mut store = started_store(1, GameMode::Original);
    store.apply(StoreInput::TimelineFetched {
        player_id: pid(2),
        cards: vec![card("A", 1960)],
    });
    let controller = TokenActionController::new(api.clone());

    for (title, artist) in [("", "Queen"), ("Bohemian Rhapsody", ""), ("  ", "Queen")] {
        let err = controller
            .steal(
                &mut store,
                StealRequest {
                    target_player_id: pid(2),
                    target_position: 0,
                    title_guess: title.into(),
                    artist_guess: artist.into(),
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, TracklineError::MissingGuess));
    }
    assert_eq!(api.submission_count(), 0);
}

#[tokio::test]
async fn steal_from_empty_timeline_is_rejected() {
    let api = MockApi::new();
    let mut store = started_store(1, GameMode::Original);
    let controller = TokenActionController::new(api.clone());

    let err = controller
        .steal(
            &mut store,
            StealRequest {
                target_player_id: pid(2),
                target_position: 0,
                title_guess: "T".into(),
                artist_guess: "A".into(),
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(err, TracklineError::EmptyTimeline));
    assert_eq!(api.submission_count(), 0);
}

#[tokio::test]
async fn wrong_steal_guess_spends_token_and_keeps_target_timeline() {
    let api = MockApi::new();
    // Alice has exactly 1 token; Bob holds 3 cards.
    let mut store = started_store(1, GameMode::Original);
    store.apply(StoreInput::PlayersFetched(vec![
        snapshot(1, "Alice", 0, 1),
        snapshot(2, "Bob", 3, 0),
    ]));
    store.apply(StoreInput::TimelineFetched {
        player_id: pid(2),
        cards: vec![card("A", 1960), card("B", 1970), card("C", 1980)],
    });

    let controller = TokenActionController::new(api.clone());
    api.set_token(Ok(TokenActionResult {
        success: false,
        message: "Wrong guess! The token is spent.".into(),
    }));
    // The refresh after resolution reflects the spent token.
    api.set_players(vec![snapshot(1, "Alice", 0, 0), snapshot(2, "Bob", 3, 0)]);

    let outcome = controller
        .steal(
            &mut store,
            StealRequest {
                target_player_id: pid(2),
                target_position: 1,
                title_guess: "Wrong".into(),
                artist_guess: "Guess".into(),
            },
        )
        .await
        .unwrap();

    assert!(!outcome.result.success);
    let notices = run_effects(&mut store, &api, outcome.effects).await;

    assert_eq!(store.local_tokens(), 0, "token spent despite failure");
    assert_eq!(
        store.player(pid(2)).unwrap().timeline.len(),
        3,
        "target timeline unchanged"
    );
    assert_eq!(notices, vec!["Wrong guess! The token is spent.".to_string()]);
}

#[tokio::test]
async fn successful_steal_sends_mandatory_guess_fields() {
    let api = MockApi::new();
    let mut store = started_store(1, GameMode::Original);
    store.apply(StoreInput::TimelineFetched {
        player_id: pid(2),
        cards: vec![card("A", 1960)],
    });

    let controller = TokenActionController::new(api.clone());
    api.set_token(Ok(TokenActionResult {
        success: true,
        message: "Card stolen!".into(),
    }));

    controller
        .steal(
            &mut store,
            StealRequest {
                target_player_id: pid(2),
                target_position: 0,
                title_guess: "Bohemian Rhapsody".into(),
                artist_guess: "Queen".into(),
            },
        )
        .await
        .unwrap();

    let token_calls: Vec<_> = api
        .calls()
        .into_iter()
        .filter_map(|c| match c {
            ApiCall::TokenAction(req) => Some(req),
            _ => None,
        })
        .collect();
    assert_eq!(token_calls.len(), 1);
    assert_eq!(token_calls[0].target_player_id, Some(pid(2)));
    assert_eq!(token_calls[0].target_position, Some(0));
    assert_eq!(token_calls[0].title_guess.as_deref(), Some("Bohemian Rhapsody"));
    assert_eq!(token_calls[0].artist_guess.as_deref(), Some("Queen"));
}

#[tokio::test]
async fn token_action_blocked_while_placement_pending() {
    let api = MockApi::new();
    let mut store = started_store(1, GameMode::Original);
    store
        .begin_intent(IntentKind::Placement {
            position: 0,
            guess: PlacementGuess::default(),
        })
        .unwrap();

    let controller = TokenActionController::new(api.clone());
    let err = controller.skip(&mut store).await.unwrap_err();
    assert!(matches!(err, TracklineError::SubmissionPending));
    assert_eq!(api.submission_count(), 0);
}

// ── Refresh reconciliation ──────────────────────────────────────────

#[tokio::test]
async fn applying_the_same_refresh_twice_is_idempotent() {
    let api = MockApi::new();
    let mut store = started_store(1, GameMode::Original);

    // A placement signal for Bob arrives, then the refresh lands — twice.
    api.set_players(vec![snapshot(1, "Alice", 0, 2), snapshot(2, "Bob", 1, 1)]);
    api.set_timeline(vec![card("B", 1970)]);
    let effects = store.apply(StoreInput::Push(TracklineEvent::CardPlaced {
        player_id: pid(2),
    }));
    run_effects(&mut store, &api, effects.clone()).await;
    let first: Vec<_> = store
        .players()
        .iter()
        .map(|p| (p.id, p.score, p.tokens, p.timeline.len(), p.is_host))
        .collect();

    api.set_players(vec![snapshot(1, "Alice", 0, 2), snapshot(2, "Bob", 1, 1)]);
    api.set_timeline(vec![card("B", 1970)]);
    run_effects(&mut store, &api, effects).await;
    let second: Vec<_> = store
        .players()
        .iter()
        .map(|p| (p.id, p.score, p.tokens, p.timeline.len(), p.is_host))
        .collect();

    assert_eq!(first, second);
}

#[tokio::test]
async fn reconnect_resyncs_players_over_rest() {
    let api = MockApi::new();
    let mut store = started_store(1, GameMode::Original);

    // Push channel drops; a player joins while we are away (event missed).
    store.apply(StoreInput::Push(TracklineEvent::Reconnecting { attempt: 1 }));
    assert_eq!(store.players().len(), 2);

    // Reconnected: the store asks for a refresh and REST is authoritative.
    api.set_players(vec![
        snapshot(1, "Alice", 0, 2),
        snapshot(2, "Bob", 0, 1),
        snapshot(3, "Carol", 0, 0),
    ]);
    let effects = store.apply(StoreInput::Push(TracklineEvent::Connected));
    assert!(effects.contains(&StoreEffect::RefreshPlayers));
    run_effects(&mut store, &api, effects).await;

    assert_eq!(store.players().len(), 3);
    assert!(store.player(pid(3)).is_some());
}
