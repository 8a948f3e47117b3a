//! Error types for the Trackline client.

use thiserror::Error;

/// Errors that can occur when using the Trackline client.
#[derive(Debug, Error)]
pub enum TracklineError {
    /// Failed to send a message through the push transport.
    #[error("transport send error: {0}")]
    TransportSend(String),

    /// Failed to receive a message from the push transport.
    #[error("transport receive error: {0}")]
    TransportReceive(String),

    /// The push transport connection was closed unexpectedly.
    #[error("transport connection closed")]
    TransportClosed,

    /// Failed to serialize or deserialize a protocol message.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Attempted an operation that requires an active push channel, but the
    /// socket is not connected.
    #[error("not connected to server")]
    NotConnected,

    /// A REST request failed at the HTTP layer.
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// The REST endpoint returned a non-success status.
    #[error("server returned {status}: {message}")]
    Api {
        /// HTTP status code.
        status: u16,
        /// Response body, as far as it could be read.
        message: String,
    },

    /// An operation timed out.
    #[error("operation timed out")]
    Timeout,

    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    // ── Local validation failures ───────────────────────────────────
    // Rejected before any network call; state is unchanged.
    /// A turn action was attempted out of turn.
    #[error("it is not your turn")]
    NotYourTurn,

    /// A second submission was attempted while one is outstanding.
    #[error("a submission is already pending")]
    SubmissionPending,

    /// A placement was submitted without a selected position.
    #[error("no position selected")]
    NoPositionSelected,

    /// The requested timeline position is out of bounds.
    #[error("position {position} is invalid for a timeline of {len} cards")]
    InvalidPosition {
        /// Requested insertion index.
        position: usize,
        /// Current timeline length.
        len: usize,
    },

    /// The token balance does not cover the action's cost.
    #[error("not enough tokens: need {needed}, have {available}")]
    InsufficientTokens {
        /// Tokens the action costs.
        needed: u32,
        /// Tokens the player currently holds.
        available: u32,
    },

    /// A steal was submitted without both a title and an artist guess.
    #[error("steal requires both a title and an artist guess")]
    MissingGuess,

    /// A steal targeted a player whose timeline holds no cards.
    #[error("target player has no cards to steal")]
    EmptyTimeline,
}

/// A specialized [`Result`] type for Trackline client operations.
pub type Result<T> = std::result::Result<T, TracklineError>;
