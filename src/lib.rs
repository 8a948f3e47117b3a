//! # Trackline Client
//!
//! Async Rust client runtime for the Trackline multiplayer music-guessing
//! game: players join a session, a track plays, and each player races to
//! place a timeline card into the chronologically-correct slot — optionally
//! guessing title/artist/year for bonus tokens, and optionally spending
//! tokens on skip/steal/buy actions.
//!
//! The crate reconciles two channels into one consistent view:
//!
//! - the **push channel** ([`SessionSocket`]) — low-latency notifications,
//!   advisory only, no replay of missed events
//! - the **REST channel** ([`RestClient`]) — the consistency source for
//!   membership, counters, and timelines
//!
//! ## Architecture
//!
//! - [`SessionStore`] — single source of truth; a reducer over push events,
//!   REST snapshots, and intent results, returning effects to execute
//! - [`PlacementController`] / [`TokenActionController`] — drive the
//!   place-card and skip/steal/buy workflows with local guards (turn,
//!   balance, one outstanding submission) enforced before any network call
//! - [`LobbyPoller`] — pre-session discovery polling
//! - [`Transport`] / [`Connector`] — pluggable push-channel backends; the
//!   default `transport-websocket` feature provides [`WebSocketTransport`]

pub mod api;
pub mod discovery;
pub mod error;
pub mod event;
pub mod placement;
pub mod protocol;
pub mod socket;
pub mod store;
pub mod tokens;
pub mod transport;
pub mod transports;

// Re-export primary types for ergonomic imports.
pub use api::{GameApi, RestClient};
pub use discovery::LobbyPoller;
pub use error::TracklineError;
pub use event::TracklineEvent;
pub use placement::PlacementController;
pub use protocol::{ClientMessage, GameMode, ServerMessage, SessionStatus, TokenActionKind};
pub use socket::{SessionSocket, SocketConfig};
pub use store::{SessionStore, StoreEffect, StoreInput};
pub use tokens::TokenActionController;
pub use transport::{Connector, Transport};

#[cfg(feature = "transport-websocket")]
pub use transports::{WebSocketConnector, WebSocketTransport};
