//! REST channel for the Trackline game.
//!
//! The push channel notifies; this channel is the consistency source. All
//! snapshot state (player counters, timelines) and all turn/economy
//! submissions go through here.
//!
//! [`GameApi`] is the seam the controllers and the lobby poller depend on;
//! [`RestClient`] is the `reqwest`-backed implementation. Tests script a
//! mock implementation instead of standing up a server.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::{Result, TracklineError};
use crate::protocol::{
    GameMode, PlayerId, PlayerSnapshot, SessionId, SessionStatus, TimelineCard, TokenActionKind,
};

// ── Request / response bodies ───────────────────────────────────────

/// Body for `POST session/create`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateSessionRequest {
    pub host_name: String,
    #[serde(default)]
    pub game_mode: GameMode,
}

/// Response of `POST session/create`.
///
/// The host is entered as the session's first player; their id comes back
/// here so the client can identify itself on both channels.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateSessionResponse {
    pub session_id: SessionId,
    pub host_player_id: PlayerId,
}

/// Response of `POST session/player/add`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AddPlayerResponse {
    pub player_id: PlayerId,
}

/// One entry of the `GET lobbies` discovery listing.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LobbySummary {
    pub session_id: SessionId,
    pub host_name: String,
    pub player_count: u32,
    pub status: SessionStatus,
}

/// Body for `POST place-card`.
///
/// The guess fields are each optional: absence means "not attempted", and
/// the server scores them independently.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlacementRequest {
    pub session_id: SessionId,
    pub player_id: PlayerId,
    /// Insertion index into the player's timeline, `0 ≤ position ≤ len`.
    pub position: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title_guess: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub artist_guess: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub year_guess: Option<i32>,
}

/// Response of `POST place-card`.
///
/// `correct` refers to the *placement*; the `correct_*` fields reveal the
/// track so the UI can show the answer either way. `earned_token` reports
/// whether the optional guess earned a bonus token.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlacementResult {
    pub correct: bool,
    pub correct_title: String,
    pub correct_artist: String,
    pub correct_year: i32,
    #[serde(default)]
    pub earned_token: bool,
}

impl PlacementResult {
    /// The placed card as confirmed by the server.
    ///
    /// Only meaningful when `correct` is true; an incorrectly placed card is
    /// discarded and never enters the timeline. The response does not carry
    /// the track id — it arrives with the next timeline refresh.
    pub fn card(&self) -> TimelineCard {
        TimelineCard {
            track_id: String::new(),
            title: self.correct_title.clone(),
            artist: self.correct_artist.clone(),
            year: self.correct_year,
        }
    }
}

/// Body for `POST token-action`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenActionRequest {
    pub action_type: TokenActionKind,
    pub session_id: SessionId,
    pub player_id: PlayerId,
    /// Steal only: whose card is guessed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target_player_id: Option<PlayerId>,
    /// Steal only: which card in the target's timeline.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target_position: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title_guess: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub artist_guess: Option<String>,
}

/// Response of `POST token-action`.
///
/// `success: false` is a normal outcome (e.g., a wrong steal guess), not an
/// error — the token is spent either way and `message` explains what
/// happened, verbatim from the server.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenActionResult {
    pub success: bool,
    pub message: String,
}

/// Wrapper shape of the `GET session/{id}/players` response.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct PlayersResponse {
    players: Vec<PlayerSnapshot>,
}

// ── The API seam ────────────────────────────────────────────────────

/// Typed access to the Trackline REST endpoints.
///
/// Object-safe so controllers can hold `Arc<dyn GameApi>`.
#[async_trait]
pub trait GameApi: Send + Sync {
    /// `POST session/create` — create a session; the host becomes its first
    /// player.
    async fn create_session(&self, host_name: &str, mode: GameMode)
        -> Result<CreateSessionResponse>;

    /// `POST session/player/add` — join an existing session.
    async fn add_player(&self, session_id: SessionId, player_name: &str)
        -> Result<AddPlayerResponse>;

    /// `GET lobbies` — list discoverable sessions.
    async fn lobbies(&self) -> Result<Vec<LobbySummary>>;

    /// `GET session/{id}/players` — snapshot of every player's counters.
    async fn players(&self, session_id: SessionId) -> Result<Vec<PlayerSnapshot>>;

    /// `GET session/{id}/timeline/{player}` — a player's timeline, ordered
    /// oldest→newest.
    async fn timeline(&self, session_id: SessionId, player_id: PlayerId)
        -> Result<Vec<TimelineCard>>;

    /// `POST place-card` — submit a placement (and optional guess).
    async fn place_card(&self, request: &PlacementRequest) -> Result<PlacementResult>;

    /// `POST token-action` — submit a skip/steal/buy action.
    async fn token_action(&self, request: &TokenActionRequest) -> Result<TokenActionResult>;

    /// `POST next-track` — host only: advance to the next track.
    async fn next_track(&self, session_id: SessionId) -> Result<()>;
}

// ── reqwest implementation ──────────────────────────────────────────

/// [`GameApi`] implementation over HTTP.
#[derive(Debug, Clone)]
pub struct RestClient {
    http: reqwest::Client,
    base_url: String,
}

impl RestClient {
    /// Create a client for the given base URL (e.g. `http://localhost:8000`).
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    /// Create a client from a preconfigured `reqwest::Client` (custom TLS,
    /// proxies, timeouts).
    pub fn with_http_client(http: reqwest::Client, base_url: impl Into<String>) -> Self {
        Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{path}", self.base_url)
    }

    /// Decode a response, mapping non-2xx statuses to
    /// [`TracklineError::Api`] with the body preserved as the message.
    async fn decode<T: serde::de::DeserializeOwned>(response: reqwest::Response) -> Result<T> {
        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(TracklineError::Api {
                status: status.as_u16(),
                message,
            });
        }
        Ok(response.json::<T>().await?)
    }
}

#[async_trait]
impl GameApi for RestClient {
    async fn create_session(
        &self,
        host_name: &str,
        mode: GameMode,
    ) -> Result<CreateSessionResponse> {
        tracing::debug!(host_name, "creating session");
        let body = CreateSessionRequest {
            host_name: host_name.to_string(),
            game_mode: mode,
        };
        let response = self
            .http
            .post(self.url("game/session/create"))
            .json(&body)
            .send()
            .await?;
        Self::decode(response).await
    }

    async fn add_player(
        &self,
        session_id: SessionId,
        player_name: &str,
    ) -> Result<AddPlayerResponse> {
        tracing::debug!(%session_id, player_name, "adding player");
        let body = serde_json::json!({
            "session_id": session_id,
            "player_name": player_name,
        });
        let response = self
            .http
            .post(self.url("game/session/player/add"))
            .json(&body)
            .send()
            .await?;
        Self::decode(response).await
    }

    async fn lobbies(&self) -> Result<Vec<LobbySummary>> {
        let response = self.http.get(self.url("game/lobbies")).send().await?;
        Self::decode(response).await
    }

    async fn players(&self, session_id: SessionId) -> Result<Vec<PlayerSnapshot>> {
        let response = self
            .http
            .get(self.url(&format!("game/session/{session_id}/players")))
            .send()
            .await?;
        let wrapper: PlayersResponse = Self::decode(response).await?;
        Ok(wrapper.players)
    }

    async fn timeline(
        &self,
        session_id: SessionId,
        player_id: PlayerId,
    ) -> Result<Vec<TimelineCard>> {
        let response = self
            .http
            .get(self.url(&format!("game/session/{session_id}/timeline/{player_id}")))
            .send()
            .await?;
        Self::decode(response).await
    }

    async fn place_card(&self, request: &PlacementRequest) -> Result<PlacementResult> {
        tracing::debug!(
            %request.session_id,
            position = request.position,
            "submitting placement"
        );
        let response = self
            .http
            .post(self.url("game/place-card"))
            .json(request)
            .send()
            .await?;
        Self::decode(response).await
    }

    async fn token_action(&self, request: &TokenActionRequest) -> Result<TokenActionResult> {
        tracing::debug!(
            %request.session_id,
            action = ?request.action_type,
            "submitting token action"
        );
        let response = self
            .http
            .post(self.url("game/token-action"))
            .json(request)
            .send()
            .await?;
        Self::decode(response).await
    }

    async fn next_track(&self, session_id: SessionId) -> Result<()> {
        tracing::debug!(%session_id, "requesting next track");
        let body = serde_json::json!({ "session_id": session_id });
        let response = self
            .http
            .post(self.url("game/next"))
            .json(&body)
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(TracklineError::Api {
                status: status.as_u16(),
                message,
            });
        }
        Ok(())
    }
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::indexing_slicing
)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn base_url_trailing_slash_is_normalized() {
        let client = RestClient::new("http://localhost:8000/");
        assert_eq!(client.url("game/lobbies"), "http://localhost:8000/game/lobbies");
    }

    #[test]
    fn placement_request_omits_absent_guesses() {
        let request = PlacementRequest {
            session_id: Uuid::nil(),
            player_id: Uuid::nil(),
            position: 2,
            title_guess: None,
            artist_guess: None,
            year_guess: None,
        };
        let json = serde_json::to_string(&request).unwrap();
        assert!(!json.contains("title_guess"));
        assert!(!json.contains("artist_guess"));
        assert!(!json.contains("year_guess"));
        assert!(json.contains(r#""position":2"#));
    }

    #[test]
    fn token_action_request_serializes_kind_snake_case() {
        let request = TokenActionRequest {
            action_type: TokenActionKind::StealCard,
            session_id: Uuid::nil(),
            player_id: Uuid::nil(),
            target_player_id: Some(Uuid::from_u128(5)),
            target_position: Some(0),
            title_guess: Some("Hey Jude".into()),
            artist_guess: Some("The Beatles".into()),
        };
        let json = serde_json::to_string(&request).unwrap();
        assert!(json.contains(r#""action_type":"steal_card""#));
        assert!(json.contains(r#""target_position":0"#));
    }

    #[test]
    fn placement_result_builds_confirmed_card() {
        let result = PlacementResult {
            correct: true,
            correct_title: "Hey Jude".into(),
            correct_artist: "The Beatles".into(),
            correct_year: 1968,
            earned_token: true,
        };
        let card = result.card();
        assert_eq!(card.title, "Hey Jude");
        assert_eq!(card.year, 1968);
        assert!(card.track_id.is_empty());
    }

    #[test]
    fn players_response_unwraps_list() {
        let json = r#"{"players":[{"player_id":"00000000-0000-0000-0000-000000000001","name":"A","score":2,"tokens":1}]}"#;
        let wrapper: PlayersResponse = serde_json::from_str(json).unwrap();
        assert_eq!(wrapper.players.len(), 1);
        assert_eq!(wrapper.players[0].score, 2);
    }
}
