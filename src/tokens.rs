//! Token economy controller.
//!
//! Drives the three token-spending actions — skip, steal, buy — with local
//! balance gates checked before any network call. The steal sub-flow
//! additionally validates the target and its mandatory title+artist guess.
//!
//! A spent steal token is gone whether or not the guess was right; the
//! server's `success: false` answer is a normal outcome, surfaced verbatim,
//! never retried and never refunded locally.

use std::sync::Arc;

use tracing::debug;

use crate::api::{GameApi, TokenActionRequest, TokenActionResult};
use crate::error::{Result, TracklineError};
use crate::protocol::{PlayerId, TokenActionKind};
use crate::store::{IntentKind, SessionStore, StealGuess, StealTarget, StoreEffect, StoreInput};

/// Parameters of a steal attempt.
#[derive(Debug, Clone)]
pub struct StealRequest {
    /// Whose card is being guessed.
    pub target_player_id: PlayerId,
    /// Which card in the target's timeline (offered only when the target
    /// has at least one card).
    pub target_position: usize,
    /// Mandatory, unlike placement guesses.
    pub title_guess: String,
    /// Mandatory, unlike placement guesses.
    pub artist_guess: String,
}

/// The resolved token action, as applied to the store.
#[derive(Debug, Clone)]
pub struct TokenActionOutcome {
    pub result: TokenActionResult,
    /// Effects the reducer returned; the embedder executes them.
    pub effects: Vec<StoreEffect>,
}

/// Controller for skip/steal/buy submissions by the local player.
pub struct TokenActionController<A: GameApi + ?Sized> {
    api: Arc<A>,
}

impl<A: GameApi + ?Sized> TokenActionController<A> {
    pub fn new(api: Arc<A>) -> Self {
        Self { api }
    }

    /// Skip the current track (1 token).
    pub async fn skip(&self, store: &mut SessionStore) -> Result<TokenActionOutcome> {
        self.check_balance(store, TokenActionKind::SkipSong)?;
        self.submit(store, TokenActionKind::SkipSong, None).await
    }

    /// Buy a card (3 tokens); the server always places it correctly, so
    /// there is no local correctness check.
    pub async fn buy(&self, store: &mut SessionStore) -> Result<TokenActionOutcome> {
        self.check_balance(store, TokenActionKind::BuyCard)?;
        self.submit(store, TokenActionKind::BuyCard, None).await
    }

    /// Steal a card from another player (1 token + mandatory guess).
    ///
    /// # Errors
    ///
    /// Locally rejected, before any request:
    /// - [`TracklineError::InsufficientTokens`] below 1 token
    /// - [`TracklineError::MissingGuess`] when title or artist is empty
    /// - [`TracklineError::EmptyTimeline`] when the target has no cards
    /// - [`TracklineError::InvalidPosition`] for an out-of-range card index
    pub async fn steal(
        &self,
        store: &mut SessionStore,
        request: StealRequest,
    ) -> Result<TokenActionOutcome> {
        self.check_balance(store, TokenActionKind::StealCard)?;

        if request.title_guess.trim().is_empty() || request.artist_guess.trim().is_empty() {
            return Err(TracklineError::MissingGuess);
        }
        let target_len = store
            .player(request.target_player_id)
            .map_or(0, |p| p.timeline.len());
        if target_len == 0 {
            return Err(TracklineError::EmptyTimeline);
        }
        if request.target_position >= target_len {
            return Err(TracklineError::InvalidPosition {
                position: request.target_position,
                len: target_len,
            });
        }

        let target = StealTarget {
            player_id: request.target_player_id,
            position: request.target_position,
            guess: StealGuess {
                title: request.title_guess,
                artist: request.artist_guess,
            },
        };
        self.submit(store, TokenActionKind::StealCard, Some(target))
            .await
    }

    // ── Internals ───────────────────────────────────────────────────

    /// Local balance gate: insufficient tokens is a local, non-network
    /// rejection. The server re-validates authoritatively either way.
    fn check_balance(&self, store: &SessionStore, action: TokenActionKind) -> Result<()> {
        let available = store.local_tokens();
        let needed = action.cost();
        if available < needed {
            return Err(TracklineError::InsufficientTokens { needed, available });
        }
        Ok(())
    }

    async fn submit(
        &self,
        store: &mut SessionStore,
        action: TokenActionKind,
        target: Option<StealTarget>,
    ) -> Result<TokenActionOutcome> {
        // Shares the single pending-intent slot with placement: one
        // outstanding turn action per player.
        let correlation_id = store.begin_intent(IntentKind::TokenAction {
            action,
            target: target.clone(),
        })?;

        let request = TokenActionRequest {
            action_type: action,
            session_id: store.session_id(),
            player_id: store.local_player_id(),
            target_player_id: target.as_ref().map(|t| t.player_id),
            target_position: target.as_ref().map(|t| t.position),
            title_guess: target.as_ref().map(|t| t.guess.title.clone()),
            artist_guess: target.as_ref().map(|t| t.guess.artist.clone()),
        };

        debug!(?action, "submitting token action");
        let session_id = store.session_id();
        match self.api.token_action(&request).await {
            Ok(result) => {
                let effects = store.apply(StoreInput::TokenActionResolved {
                    correlation_id,
                    session_id,
                    result: result.clone(),
                });
                Ok(TokenActionOutcome { result, effects })
            }
            Err(e) => {
                // Transport-level failure: clear the intent, mutate
                // nothing; the user may retry by re-invoking the action.
                let _ = store.apply(StoreInput::TokenActionFailed {
                    correlation_id,
                    session_id,
                    message: e.to_string(),
                });
                Err(e)
            }
        }
    }
}

impl<A: GameApi + ?Sized> std::fmt::Debug for TokenActionController<A> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenActionController").finish()
    }
}
