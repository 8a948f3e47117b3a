//! Wire types for the Trackline game protocol.
//!
//! Covers both channels: the tagged JSON messages exchanged over the push
//! channel ([`ClientMessage`] / [`ServerMessage`]) and the shared data model
//! both channels refer to (players, cards, session status). REST
//! request/response bodies live in [`crate::api`].
//!
//! The push channel is a *notification* transport: its payloads are small by
//! design and never carry full state snapshots. The REST channel is the
//! consistency source; see [`crate::store`] for how the two are reconciled.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ── Type aliases ────────────────────────────────────────────────────

/// Unique identifier for players.
pub type PlayerId = Uuid;

/// Unique identifier for game sessions.
pub type SessionId = Uuid;

// ── Enums ───────────────────────────────────────────────────────────

/// Lifecycle status of a session.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    /// Session created, players may still join.
    #[default]
    Waiting,
    /// Game running; joining is closed.
    InProgress,
    /// Session ended; terminal.
    Closed,
}

impl SessionStatus {
    /// Whether the session accepts new players.
    pub fn is_joinable(&self) -> bool {
        matches!(self, Self::Waiting)
    }

    /// Whether the session has ended and cannot change again.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Closed)
    }
}

/// Game difficulty mode, chosen at session creation.
///
/// The mode decides which guess fields the placement flow offers. Correct
/// pro/expert guesses are what earn tokens; `Original` mode plays placement
/// only.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum GameMode {
    /// Placement only, no guess capture.
    #[default]
    Original,
    /// Title + artist guesses offered.
    Pro,
    /// Title + artist + year guesses offered.
    Expert,
}

impl GameMode {
    /// Whether placing a card in this mode captures a guess first.
    pub fn requires_guess(&self) -> bool {
        !matches!(self, Self::Original)
    }

    /// Whether the mode offers a release-year guess.
    pub fn offers_year_guess(&self) -> bool {
        matches!(self, Self::Expert)
    }
}

/// The three token-spending actions.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TokenActionKind {
    /// Skip the current track (1 token).
    SkipSong,
    /// Guess another player's card to take it (1 token).
    StealCard,
    /// Buy a card, placed correctly by the server (3 tokens).
    BuyCard,
}

impl TokenActionKind {
    /// Token cost of the action, validated locally before submission.
    pub fn cost(&self) -> u32 {
        match self {
            Self::SkipSong | Self::StealCard => 1,
            Self::BuyCard => 3,
        }
    }
}

// ── Structs ─────────────────────────────────────────────────────────

/// One card in a player's timeline.
///
/// Cards are immutable once placed; insertion is the only timeline mutation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TimelineCard {
    /// Opaque track identifier assigned by the server.
    pub track_id: String,
    pub title: String,
    pub artist: String,
    /// Release year.
    pub year: i32,
}

/// Per-player counters as carried on the wire.
///
/// Both channels use this shape: the push `player_joined` payload and the
/// REST players snapshot. Timelines are fetched separately.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PlayerSnapshot {
    pub player_id: PlayerId,
    pub name: String,
    /// Cards placed so far (the visible score).
    #[serde(default)]
    pub score: u32,
    /// Spendable token balance.
    #[serde(default)]
    pub tokens: u32,
}

// ── Messages ────────────────────────────────────────────────────────

/// Message types sent from client to server over the push channel.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Subscribe this connection to a session's event stream.
    /// MUST be the first message after every (re)connect.
    JoinLobby {
        session_id: SessionId,
        #[serde(skip_serializing_if = "Option::is_none")]
        player_name: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        player_id: Option<PlayerId>,
    },
    /// Host starts the game for everyone in the session.
    StartGame { session_id: SessionId },
}

/// Message types sent from server to client over the push channel.
///
/// These are advisory notifications, not state replicas: payloads carry just
/// enough to know *what* changed, and the store refreshes counters over REST
/// in response. Unknown tags fail deserialization and are logged by the
/// socket loop rather than silently dropped.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum ServerMessage {
    /// A player joined the session.
    PlayerJoined { player: PlayerSnapshot },
    /// A player left the session.
    PlayerLeft {
        player_id: PlayerId,
        /// Whether the departed player was the session host. A host
        /// departure ends the session for everyone else.
        #[serde(default)]
        was_host: bool,
    },
    /// The host started the game.
    GameStarted,
    /// The session was closed; terminal.
    SessionClosed { message: String },
    /// A new track is playing (turn advances).
    NewTrack,
    /// Some player's placement was resolved. Signal to refresh; the local
    /// player's own result arrives on the REST confirmation instead.
    CardPlaced { player_id: PlayerId },
    /// Some player used a token action. Signal to refresh.
    TokenActionUsed { action_type: TokenActionKind },
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use super::*;

    fn round_trip<T: Serialize + serde::de::DeserializeOwned>(val: &T) -> T {
        let json = serde_json::to_string(val).expect("serialize");
        serde_json::from_str(&json).expect("deserialize")
    }

    #[test]
    fn join_lobby_round_trip() {
        let msg = ClientMessage::JoinLobby {
            session_id: Uuid::from_u128(7),
            player_name: Some("Alice".into()),
            player_id: Some(Uuid::from_u128(9)),
        };
        let deser = round_trip(&msg);
        if let ClientMessage::JoinLobby {
            session_id,
            player_name,
            player_id,
        } = deser
        {
            assert_eq!(session_id, Uuid::from_u128(7));
            assert_eq!(player_name.as_deref(), Some("Alice"));
            assert_eq!(player_id, Some(Uuid::from_u128(9)));
        } else {
            panic!("expected JoinLobby variant");
        }
    }

    #[test]
    fn join_lobby_omits_absent_identity_fields() {
        let msg = ClientMessage::JoinLobby {
            session_id: Uuid::nil(),
            player_name: None,
            player_id: None,
        };
        let json = serde_json::to_string(&msg).unwrap();
        assert!(!json.contains("player_name"));
        assert!(!json.contains("player_id"));
        assert!(json.contains(r#""type":"join_lobby""#));
    }

    #[test]
    fn server_message_tags_are_snake_case() {
        let msg = ServerMessage::TokenActionUsed {
            action_type: TokenActionKind::SkipSong,
        };
        let json = serde_json::to_string(&msg).unwrap();
        assert!(json.contains(r#""type":"token_action_used""#));
        assert!(json.contains(r#""action_type":"skip_song""#));
    }

    #[test]
    fn player_left_defaults_was_host() {
        let json = format!(
            r#"{{"type":"player_left","data":{{"player_id":"{}"}}}}"#,
            Uuid::from_u128(3)
        );
        let msg: ServerMessage = serde_json::from_str(&json).unwrap();
        if let ServerMessage::PlayerLeft { was_host, .. } = msg {
            assert!(!was_host);
        } else {
            panic!("expected PlayerLeft variant");
        }
    }

    #[test]
    fn unknown_tag_is_rejected() {
        let json = r#"{"type":"spectator_joined","data":{}}"#;
        assert!(serde_json::from_str::<ServerMessage>(json).is_err());
    }

    #[test]
    fn token_action_costs() {
        assert_eq!(TokenActionKind::SkipSong.cost(), 1);
        assert_eq!(TokenActionKind::StealCard.cost(), 1);
        assert_eq!(TokenActionKind::BuyCard.cost(), 3);
    }

    #[test]
    fn game_mode_guess_gating() {
        assert!(!GameMode::Original.requires_guess());
        assert!(GameMode::Pro.requires_guess());
        assert!(GameMode::Expert.requires_guess());
        assert!(!GameMode::Pro.offers_year_guess());
        assert!(GameMode::Expert.offers_year_guess());
    }

    #[test]
    fn session_status_predicates() {
        assert!(SessionStatus::Waiting.is_joinable());
        assert!(!SessionStatus::InProgress.is_joinable());
        assert!(SessionStatus::Closed.is_terminal());
        assert!(!SessionStatus::Waiting.is_terminal());
    }

    #[test]
    fn card_placed_round_trip() {
        let msg = ServerMessage::CardPlaced {
            player_id: Uuid::from_u128(12),
        };
        let deser = round_trip(&msg);
        assert!(matches!(
            deser,
            ServerMessage::CardPlaced { player_id } if player_id == Uuid::from_u128(12)
        ));
    }
}
