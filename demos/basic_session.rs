//! # Basic Session Example
//!
//! Demonstrates a complete Trackline client lifecycle:
//!
//! 1. Discover open lobbies over REST (or create a session when none exist)
//! 2. Join the session and open the push channel
//! 3. Feed push events into the session store and execute its effects
//! 4. Shut down gracefully on Ctrl+C or disconnect
//!
//! ## Running
//!
//! ```sh
//! # Start a Trackline server on localhost:8000, then:
//! cargo run --example basic_session
//!
//! # Override the endpoints:
//! TRACKLINE_API_URL=http://my-server:8000 \
//! TRACKLINE_PUSH_URL=ws://my-server:8000/ws cargo run --example basic_session
//! ```

use std::sync::Arc;

use trackline_client::socket::SocketConfig;
use trackline_client::store::{SessionStore, StoreEffect, StoreInput};
use trackline_client::{
    GameApi, GameMode, RestClient, SessionSocket, TracklineEvent, WebSocketConnector,
};

/// Default REST endpoint when `TRACKLINE_API_URL` is not set.
const DEFAULT_API_URL: &str = "http://localhost:8000";

/// Default push endpoint when `TRACKLINE_PUSH_URL` is not set.
const DEFAULT_PUSH_URL: &str = "ws://localhost:8000/ws";

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // ── Logging ─────────────────────────────────────────────────────
    // Set `RUST_LOG=debug` for verbose output.
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let api_url = std::env::var("TRACKLINE_API_URL").unwrap_or_else(|_| DEFAULT_API_URL.into());
    let push_url = std::env::var("TRACKLINE_PUSH_URL").unwrap_or_else(|_| DEFAULT_PUSH_URL.into());
    let api: Arc<RestClient> = Arc::new(RestClient::new(api_url));

    // ── Discover or create a session ────────────────────────────────
    let lobbies = api.lobbies().await?;
    let (session_id, player_id) = match lobbies.iter().find(|l| l.status.is_joinable()) {
        Some(lobby) => {
            tracing::info!("joining {}'s lobby ({} players)", lobby.host_name, lobby.player_count);
            let joined = api.add_player(lobby.session_id, "RustPlayer").await?;
            (lobby.session_id, joined.player_id)
        }
        None => {
            tracing::info!("no open lobby found, creating one");
            let created = api.create_session("RustPlayer", GameMode::Original).await?;
            (created.session_id, created.host_player_id)
        }
    };

    // ── Store + push channel ────────────────────────────────────────
    let mut store = SessionStore::new(session_id, player_id, GameMode::Original);

    let connector = WebSocketConnector::new(push_url);
    let config = SocketConfig::new(session_id).with_player("RustPlayer", player_id);
    let (mut socket, mut events) = SessionSocket::start(connector, config);

    // ── Event loop ──────────────────────────────────────────────────
    loop {
        tokio::select! {
            event = events.recv() => {
                let Some(event) = event else {
                    tracing::info!("event channel closed, exiting");
                    break;
                };

                if let TracklineEvent::Disconnected { ref reason } = event {
                    tracing::warn!("disconnected: {}", reason.as_deref().unwrap_or("unknown"));
                    break;
                }

                let effects = store.apply(StoreInput::Push(event));
                if let Err(e) = run_effects(&mut store, api.as_ref(), effects).await {
                    tracing::warn!("refresh failed: {e}");
                }

                tracing::info!(
                    "session: {} player(s), status {:?}, my tokens: {}",
                    store.players().len(),
                    store.status(),
                    store.local_tokens(),
                );

                if store.status().is_terminal() {
                    tracing::info!("session over");
                    break;
                }
            }

            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Ctrl+C received, shutting down…");
                break;
            }
        }
    }

    // ── Cleanup ─────────────────────────────────────────────────────
    socket.shutdown().await;
    tracing::info!("client shut down. Goodbye!");
    Ok(())
}

/// Execute reducer effects: refreshes go back to REST, the rest is logged.
async fn run_effects(
    store: &mut SessionStore,
    api: &RestClient,
    effects: Vec<StoreEffect>,
) -> Result<(), trackline_client::TracklineError> {
    for effect in effects {
        match effect {
            StoreEffect::RefreshPlayers => {
                let players = api.players(store.session_id()).await?;
                store.apply(StoreInput::PlayersFetched(players));
            }
            StoreEffect::RefreshTimeline(player_id) => {
                let cards = api.timeline(store.session_id(), player_id).await?;
                store.apply(StoreInput::TimelineFetched { player_id, cards });
            }
            StoreEffect::SessionEnded { reason } => {
                tracing::info!("session ended: {reason}");
            }
            StoreEffect::Notice(message) => {
                tracing::info!("notice: {message}");
            }
        }
    }
    Ok(())
}
