//! Turn & placement controller.
//!
//! Drives the place-card workflow: position selection → optional guess
//! capture (mode-dependent) → submission → result application. The
//! controller owns only its phase; all session state lives in the
//! [`SessionStore`], and the store's pending-intent slot is the sole
//! concurrency guard — while a submission is in flight every further turn
//! or token submission is rejected locally, before any network call.

use std::sync::Arc;

use tracing::{debug, warn};

use crate::api::{GameApi, PlacementRequest, PlacementResult};
use crate::error::{Result, TracklineError};
use crate::store::{IntentKind, PlacementGuess, SessionStore, StoreEffect, StoreInput};

/// Where the local player is in the place-card workflow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PlacementPhase {
    /// Nothing selected.
    #[default]
    Idle,
    /// A position was chosen; ready to submit (`Original` mode).
    PositionSelected(usize),
    /// A position was chosen; a guess is being captured (`Pro`/`Expert`).
    AwaitingGuess(usize),
    /// Request in flight.
    Submitting,
}

/// Outcome of [`PlacementController::select_position`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SelectOutcome {
    /// `Original` mode: no guess to capture, ready to submit immediately.
    ReadyToSubmit,
    /// `Pro`/`Expert` mode: capture a guess, then submit.
    AwaitingGuess,
}

/// The completed placement, as applied to the store.
#[derive(Debug, Clone)]
pub struct PlacementOutcome {
    /// The server's verdict and revealed track.
    pub result: PlacementResult,
    /// Effects the reducer returned; the embedder executes them (refreshes
    /// and notices).
    pub effects: Vec<StoreEffect>,
}

/// State machine driving card placement for the local player.
pub struct PlacementController<A: GameApi + ?Sized> {
    api: Arc<A>,
    phase: PlacementPhase,
}

impl<A: GameApi + ?Sized> PlacementController<A> {
    pub fn new(api: Arc<A>) -> Self {
        Self {
            api,
            phase: PlacementPhase::Idle,
        }
    }

    /// Current workflow phase.
    pub fn phase(&self) -> PlacementPhase {
        self.phase
    }

    /// Choose the timeline slot to place the current track into.
    ///
    /// Re-selection replaces the previous choice (and restarts guess
    /// capture). In `Original` mode this arms the submission directly;
    /// guess-capturing modes move to `AwaitingGuess` and wait for
    /// [`submit`](Self::submit).
    ///
    /// # Errors
    ///
    /// - [`TracklineError::SubmissionPending`] while a request is in flight
    /// - [`TracklineError::NotYourTurn`] when another player is up
    /// - [`TracklineError::InvalidPosition`] for `position > timeline len`
    pub fn select_position(
        &mut self,
        store: &SessionStore,
        position: usize,
    ) -> Result<SelectOutcome> {
        if self.phase == PlacementPhase::Submitting || store.pending_intent().is_some() {
            return Err(TracklineError::SubmissionPending);
        }
        if !store.is_local_turn() {
            return Err(TracklineError::NotYourTurn);
        }
        let len = store.local_player().map_or(0, |p| p.timeline.len());
        if position > len {
            return Err(TracklineError::InvalidPosition { position, len });
        }

        debug!(position, "placement position selected");
        if store.mode().requires_guess() {
            self.phase = PlacementPhase::AwaitingGuess(position);
            Ok(SelectOutcome::AwaitingGuess)
        } else {
            self.phase = PlacementPhase::PositionSelected(position);
            Ok(SelectOutcome::ReadyToSubmit)
        }
    }

    /// Submit the placement with the captured guess (pass
    /// [`PlacementGuess::default()`] in `Original` mode).
    ///
    /// Rejected locally — no request sent — when it is not the local
    /// player's turn, no position is selected, or an intent is already
    /// outstanding. On success the confirmed result is applied to the
    /// timeline and, if the local player hosts the session, the
    /// `next-track` request is issued strictly *after* the result was
    /// applied. On failure the intent is cleared and nothing is mutated.
    pub async fn submit(
        &mut self,
        store: &mut SessionStore,
        guess: PlacementGuess,
    ) -> Result<PlacementOutcome> {
        let position = match self.phase {
            PlacementPhase::PositionSelected(position)
            | PlacementPhase::AwaitingGuess(position) => position,
            PlacementPhase::Idle | PlacementPhase::Submitting => {
                return Err(TracklineError::NoPositionSelected);
            }
        };
        if !store.is_local_turn() {
            return Err(TracklineError::NotYourTurn);
        }
        // One outstanding turn action per player; `begin_intent` enforces it
        // and a rejection here means no network call was made.
        let correlation_id = store.begin_intent(IntentKind::Placement {
            position,
            guess: guess.clone(),
        })?;
        self.phase = PlacementPhase::Submitting;

        let request = PlacementRequest {
            session_id: store.session_id(),
            player_id: store.local_player_id(),
            position,
            title_guess: guess.title,
            artist_guess: guess.artist,
            year_guess: guess.year,
        };

        let session_id = store.session_id();
        let response = self.api.place_card(&request).await;
        self.phase = PlacementPhase::Idle;

        match response {
            Ok(result) => {
                let effects = store.apply(StoreInput::PlacementConfirmed {
                    correlation_id,
                    session_id,
                    result: result.clone(),
                });

                // Host side effect: advance to the next track, sequenced
                // after the placement confirmation was applied so the next
                // track never races an unprocessed result. The placement
                // itself stands either way.
                if store.is_local_host() {
                    if let Err(e) = self.api.next_track(session_id).await {
                        warn!("next-track request failed: {e}");
                    }
                }

                Ok(PlacementOutcome { result, effects })
            }
            Err(e) => {
                let _ = store.apply(StoreInput::PlacementFailed {
                    correlation_id,
                    session_id,
                    message: e.to_string(),
                });
                Err(e)
            }
        }
    }

    /// Abandon the current selection (e.g., the guess dialog was closed).
    /// No-op while a submission is in flight.
    pub fn clear_selection(&mut self) {
        if self.phase != PlacementPhase::Submitting {
            self.phase = PlacementPhase::Idle;
        }
    }
}

impl<A: GameApi + ?Sized> std::fmt::Debug for PlacementController<A> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PlacementController")
            .field("phase", &self.phase)
            .finish()
    }
}
