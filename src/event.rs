//! Typed events emitted by the push channel.
//!
//! [`TracklineEvent`] is what consumers receive from the event channel
//! returned by [`SessionSocket::start`](crate::socket::SessionSocket::start).
//! Most variants mirror a [`ServerMessage`]; `Connected`, `Reconnecting` and
//! `Disconnected` are synthesized by the socket loop from transport state.

use crate::protocol::{PlayerId, PlayerSnapshot, ServerMessage, TokenActionKind};

/// Events delivered to the consumer of a session's push channel.
#[derive(Debug, Clone)]
pub enum TracklineEvent {
    /// The push channel is up and the join handshake has been sent.
    ///
    /// Emitted after the initial connect *and* after every successful
    /// reconnect — a consumer should treat any `Connected` following a
    /// `Reconnecting` as a cue to resynchronize over REST, since missed
    /// events are not replayed.
    Connected,

    /// The transport was lost; the socket is attempting to reconnect with
    /// the same session id.
    Reconnecting {
        /// 1-based attempt counter, reset after each successful connect.
        attempt: u32,
    },

    /// The push channel is gone and no further reconnect will be attempted.
    /// Always the last event on the channel.
    Disconnected { reason: Option<String> },

    /// A player joined the session.
    PlayerJoined { player: PlayerSnapshot },

    /// A player left the session.
    PlayerLeft {
        player_id: PlayerId,
        was_host: bool,
    },

    /// The host started the game.
    GameStarted,

    /// The session was closed; terminal.
    SessionClosed { message: String },

    /// A new track is playing.
    NewTrack,

    /// Some player's placement was resolved.
    CardPlaced { player_id: PlayerId },

    /// Some player used a token action.
    TokenActionUsed { action_type: TokenActionKind },
}

impl From<ServerMessage> for TracklineEvent {
    fn from(msg: ServerMessage) -> Self {
        match msg {
            ServerMessage::PlayerJoined { player } => Self::PlayerJoined { player },
            ServerMessage::PlayerLeft {
                player_id,
                was_host,
            } => Self::PlayerLeft {
                player_id,
                was_host,
            },
            ServerMessage::GameStarted => Self::GameStarted,
            ServerMessage::SessionClosed { message } => Self::SessionClosed { message },
            ServerMessage::NewTrack => Self::NewTrack,
            ServerMessage::CardPlaced { player_id } => Self::CardPlaced { player_id },
            ServerMessage::TokenActionUsed { action_type } => {
                Self::TokenActionUsed { action_type }
            }
        }
    }
}
