#![allow(
    dead_code,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::todo,
    clippy::unimplemented,
    clippy::indexing_slicing
)]
//! Shared test utilities for Trackline client integration tests.
//!
//! Provides a scripted [`MockTransport`]/[`MockConnector`] pair for driving
//! the push channel, a scripted [`MockApi`] standing in for the REST
//! channel, and helpers for constructing server-message JSON.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex as StdMutex};

use async_trait::async_trait;
use trackline_client::api::{
    AddPlayerResponse, CreateSessionResponse, GameApi, LobbySummary, PlacementRequest,
    PlacementResult, TokenActionRequest, TokenActionResult,
};
use trackline_client::error::{Result, TracklineError};
use trackline_client::protocol::{
    GameMode, PlayerId, PlayerSnapshot, ServerMessage, SessionId, TimelineCard, TokenActionKind,
};

// ── MockTransport / MockConnector ───────────────────────────────────

/// A scripted push transport for integration testing.
///
/// Scripted server messages are consumed in order by `recv()`; an explicit
/// `None` entry closes the transport. All client messages are recorded in
/// `sent`.
pub struct MockTransport {
    incoming: VecDeque<Option<Result<String>>>,
    pub sent: Arc<StdMutex<Vec<String>>>,
    pub closed: Arc<AtomicBool>,
}

#[async_trait]
impl trackline_client::Transport for MockTransport {
    async fn send(&mut self, message: String) -> Result<()> {
        self.sent.lock().unwrap().push(message);
        Ok(())
    }

    async fn recv(&mut self) -> Option<Result<String>> {
        if let Some(item) = self.incoming.pop_front() {
            item
        } else {
            // Script exhausted — hang so the socket loop stays alive until
            // shutdown.
            std::future::pending().await
        }
    }

    async fn close(&mut self) -> Result<()> {
        self.closed.store(true, Ordering::Relaxed);
        Ok(())
    }
}

/// A connector serving a scripted sequence of transports, one per
/// (re)connect. Redials past the end of the script fail.
pub struct MockConnector {
    transports: VecDeque<MockTransport>,
}

impl MockConnector {
    /// Build a connector whose n-th connect yields a transport scripted
    /// with the n-th message list. Returns shared handles to the recorded
    /// outgoing messages and the closed flag.
    #[allow(clippy::type_complexity)]
    pub fn new(
        scripts: Vec<Vec<Option<Result<String>>>>,
    ) -> (Self, Arc<StdMutex<Vec<String>>>, Arc<AtomicBool>) {
        let sent = Arc::new(StdMutex::new(Vec::new()));
        let closed = Arc::new(AtomicBool::new(false));
        let transports = scripts
            .into_iter()
            .map(|incoming| MockTransport {
                incoming: VecDeque::from(incoming),
                sent: Arc::clone(&sent),
                closed: Arc::clone(&closed),
            })
            .collect();
        (Self { transports }, sent, closed)
    }
}

#[async_trait]
impl trackline_client::Connector for MockConnector {
    type Conn = MockTransport;

    async fn connect(&mut self) -> Result<MockTransport> {
        self.transports
            .pop_front()
            .ok_or(TracklineError::NotConnected)
    }
}

// ── JSON helper functions ───────────────────────────────────────────

pub fn player_joined_json(name: &str, player_id: PlayerId) -> String {
    serde_json::to_string(&ServerMessage::PlayerJoined {
        player: PlayerSnapshot {
            player_id,
            name: name.into(),
            score: 0,
            tokens: 0,
        },
    })
    .expect("player_joined_json serialization")
}

pub fn player_left_json(player_id: PlayerId, was_host: bool) -> String {
    serde_json::to_string(&ServerMessage::PlayerLeft {
        player_id,
        was_host,
    })
    .expect("player_left_json serialization")
}

pub fn game_started_json() -> String {
    serde_json::to_string(&ServerMessage::GameStarted).expect("game_started_json serialization")
}

pub fn session_closed_json(message: &str) -> String {
    serde_json::to_string(&ServerMessage::SessionClosed {
        message: message.into(),
    })
    .expect("session_closed_json serialization")
}

pub fn new_track_json() -> String {
    serde_json::to_string(&ServerMessage::NewTrack).expect("new_track_json serialization")
}

pub fn card_placed_json(player_id: PlayerId) -> String {
    serde_json::to_string(&ServerMessage::CardPlaced { player_id })
        .expect("card_placed_json serialization")
}

pub fn token_action_used_json(action_type: TokenActionKind) -> String {
    serde_json::to_string(&ServerMessage::TokenActionUsed { action_type })
        .expect("token_action_used_json serialization")
}

// ── MockApi ─────────────────────────────────────────────────────────

/// Everything the [`MockApi`] was asked to do, for assertions.
#[derive(Debug, Clone, PartialEq)]
pub enum ApiCall {
    Players(SessionId),
    Timeline(SessionId, PlayerId),
    PlaceCard(PlacementRequest2),
    TokenAction(TokenActionRequest2),
    NextTrack(SessionId),
    Lobbies,
}

/// Owned copy of the fields asserted on in tests.
#[derive(Debug, Clone, PartialEq)]
pub struct PlacementRequest2 {
    pub position: usize,
    pub title_guess: Option<String>,
    pub artist_guess: Option<String>,
    pub year_guess: Option<i32>,
}

/// Owned copy of the fields asserted on in tests.
#[derive(Debug, Clone, PartialEq)]
pub struct TokenActionRequest2 {
    pub action_type: TokenActionKind,
    pub target_player_id: Option<PlayerId>,
    pub target_position: Option<usize>,
    pub title_guess: Option<String>,
    pub artist_guess: Option<String>,
}

/// A scripted REST backend.
///
/// Responses are configured per endpoint; every invocation is recorded so
/// tests can assert exactly which network calls were (or were not) made.
#[derive(Default)]
pub struct MockApi {
    pub calls: StdMutex<Vec<ApiCall>>,
    pub players_response: StdMutex<Vec<PlayerSnapshot>>,
    pub timeline_response: StdMutex<Vec<TimelineCard>>,
    pub placement_response: StdMutex<Option<Result<PlacementResult>>>,
    pub token_response: StdMutex<Option<Result<TokenActionResult>>>,
    pub next_track_calls: AtomicUsize,
}

impl MockApi {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn set_players(&self, players: Vec<PlayerSnapshot>) {
        *self.players_response.lock().unwrap() = players;
    }

    pub fn set_timeline(&self, cards: Vec<TimelineCard>) {
        *self.timeline_response.lock().unwrap() = cards;
    }

    pub fn set_placement(&self, response: Result<PlacementResult>) {
        *self.placement_response.lock().unwrap() = Some(response);
    }

    pub fn set_token(&self, response: Result<TokenActionResult>) {
        *self.token_response.lock().unwrap() = Some(response);
    }

    pub fn calls(&self) -> Vec<ApiCall> {
        self.calls.lock().unwrap().clone()
    }

    /// Network calls that submit something (placement or token action).
    pub fn submission_count(&self) -> usize {
        self.calls()
            .iter()
            .filter(|c| matches!(c, ApiCall::PlaceCard(_) | ApiCall::TokenAction(_)))
            .count()
    }
}

#[async_trait]
impl GameApi for MockApi {
    async fn create_session(
        &self,
        _host_name: &str,
        _mode: GameMode,
    ) -> Result<CreateSessionResponse> {
        Err(TracklineError::NotConnected)
    }

    async fn add_player(
        &self,
        _session_id: SessionId,
        _player_name: &str,
    ) -> Result<AddPlayerResponse> {
        Err(TracklineError::NotConnected)
    }

    async fn lobbies(&self) -> Result<Vec<LobbySummary>> {
        self.calls.lock().unwrap().push(ApiCall::Lobbies);
        Ok(Vec::new())
    }

    async fn players(&self, session_id: SessionId) -> Result<Vec<PlayerSnapshot>> {
        self.calls.lock().unwrap().push(ApiCall::Players(session_id));
        Ok(self.players_response.lock().unwrap().clone())
    }

    async fn timeline(
        &self,
        session_id: SessionId,
        player_id: PlayerId,
    ) -> Result<Vec<TimelineCard>> {
        self.calls
            .lock()
            .unwrap()
            .push(ApiCall::Timeline(session_id, player_id));
        Ok(self.timeline_response.lock().unwrap().clone())
    }

    async fn place_card(&self, request: &PlacementRequest) -> Result<PlacementResult> {
        self.calls
            .lock()
            .unwrap()
            .push(ApiCall::PlaceCard(PlacementRequest2 {
                position: request.position,
                title_guess: request.title_guess.clone(),
                artist_guess: request.artist_guess.clone(),
                year_guess: request.year_guess,
            }));
        self.placement_response
            .lock()
            .unwrap()
            .take()
            .unwrap_or(Err(TracklineError::Timeout))
    }

    async fn token_action(&self, request: &TokenActionRequest) -> Result<TokenActionResult> {
        self.calls
            .lock()
            .unwrap()
            .push(ApiCall::TokenAction(TokenActionRequest2 {
                action_type: request.action_type,
                target_player_id: request.target_player_id,
                target_position: request.target_position,
                title_guess: request.title_guess.clone(),
                artist_guess: request.artist_guess.clone(),
            }));
        self.token_response
            .lock()
            .unwrap()
            .take()
            .unwrap_or(Err(TracklineError::Timeout))
    }

    async fn next_track(&self, session_id: SessionId) -> Result<()> {
        self.next_track_calls.fetch_add(1, Ordering::SeqCst);
        self.calls.lock().unwrap().push(ApiCall::NextTrack(session_id));
        Ok(())
    }
}
