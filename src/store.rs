//! Session state store.
//!
//! [`SessionStore`] is the single source of truth for session membership,
//! per-player timelines and token balances, the turn pointer, connection
//! status, and the one pending-intent slot. Everything the UI shows derives
//! from it; nothing else holds session state.
//!
//! All mutation goes through [`SessionStore::apply`], a reducer over
//! [`StoreInput`]s: push events, connection transitions, REST snapshots, and
//! intent results. Each application returns [`StoreEffect`]s for the
//! embedding layer to execute (REST refreshes, terminal-session signals,
//! user-visible notices). The scheduling model is single-threaded and
//! event-driven, so no two applications ever interleave and the store needs
//! no locking.
//!
//! Two reconciliation rules shape everything here:
//!
//! 1. **Push is advisory, REST is authoritative.** Push payloads are refresh
//!    signals; counters are only ever overwritten from a REST snapshot.
//! 2. **Intent results reconcile by correlation id.** The local player's own
//!    placement/token outcome is applied exclusively from its REST
//!    confirmation, so a duplicate or dropped push event can neither
//!    double-apply nor lose it.

use std::time::Instant;

use tracing::{debug, warn};
use uuid::Uuid;

use crate::api::{PlacementResult, TokenActionResult};
use crate::event::TracklineEvent;
use crate::protocol::{
    GameMode, PlayerId, PlayerSnapshot, SessionId, SessionStatus, TimelineCard, TokenActionKind,
};

// ── Connection state ────────────────────────────────────────────────

/// Push-channel connection state, process-wide per active session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionState {
    /// Initial dial or reconnect in progress.
    #[default]
    Connecting,
    /// Push channel up.
    Connected,
    /// Push channel gone for good (reconnects exhausted or shut down).
    Disconnected,
}

// ── Pending intents ─────────────────────────────────────────────────

/// Guess payload captured by the placement flow. Every field is optional:
/// absence means "not attempted".
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PlacementGuess {
    pub title: Option<String>,
    pub artist: Option<String>,
    pub year: Option<i32>,
}

/// Guess payload for a steal. Unlike placement guesses, both fields are
/// mandatory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StealGuess {
    pub title: String,
    pub artist: String,
}

/// Target of a steal: whose card, and which one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StealTarget {
    pub player_id: PlayerId,
    pub position: usize,
    pub guess: StealGuess,
}

/// What a pending intent is waiting on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IntentKind {
    /// A card placement (with optional guess).
    Placement {
        position: usize,
        guess: PlacementGuess,
    },
    /// A token action; `target` is set for steals only.
    TokenAction {
        action: TokenActionKind,
        target: Option<StealTarget>,
    },
}

/// A client-local record of a submitted-but-unconfirmed turn action.
///
/// At most one exists per local player. It is removed on matching
/// confirmation or explicit failure — never silently superseded.
#[derive(Debug, Clone)]
pub struct PendingIntent {
    /// Client-generated correlation id the result is matched against.
    pub correlation_id: Uuid,
    /// Session the intent was submitted under; results for another session
    /// are stale and discarded.
    pub session_id: SessionId,
    pub kind: IntentKind,
    pub created_at: Instant,
}

// ── Players ─────────────────────────────────────────────────────────

/// One roster entry. Order within the store is join order; the host is the
/// first entrant and the flag is keyed by id once assigned.
#[derive(Debug, Clone)]
pub struct PlayerEntry {
    pub id: PlayerId,
    pub name: String,
    pub is_host: bool,
    /// Cards placed (visible score).
    pub score: u32,
    /// Spendable token balance. Unsigned, so it cannot go negative.
    pub tokens: u32,
    /// Ordered timeline, oldest→newest. Indices are contiguous from 0.
    pub timeline: Vec<TimelineCard>,
}

impl PlayerEntry {
    fn from_snapshot(snapshot: &PlayerSnapshot) -> Self {
        Self {
            id: snapshot.player_id,
            name: snapshot.name.clone(),
            is_host: false,
            score: snapshot.score,
            tokens: snapshot.tokens,
            timeline: Vec::new(),
        }
    }
}

// ── Inputs and effects ──────────────────────────────────────────────

/// Everything the reducer consumes.
#[derive(Debug)]
pub enum StoreInput {
    /// A typed event from the push channel.
    Push(TracklineEvent),
    /// Result of a `GET session/{id}/players` refresh.
    PlayersFetched(Vec<PlayerSnapshot>),
    /// Result of a `GET session/{id}/timeline/{player}` refresh.
    TimelineFetched {
        player_id: PlayerId,
        cards: Vec<TimelineCard>,
    },
    /// The local player's placement was confirmed by the REST channel.
    PlacementConfirmed {
        correlation_id: Uuid,
        session_id: SessionId,
        result: PlacementResult,
    },
    /// The placement request failed (network or rejection); nothing was
    /// applied server-side that the client should mirror.
    PlacementFailed {
        correlation_id: Uuid,
        session_id: SessionId,
        message: String,
    },
    /// A token action round-trip completed (successfully or not — a failed
    /// steal guess still consumed the token).
    TokenActionResolved {
        correlation_id: Uuid,
        session_id: SessionId,
        result: TokenActionResult,
    },
    /// The token-action request failed at the transport layer; nothing was
    /// committed.
    TokenActionFailed {
        correlation_id: Uuid,
        session_id: SessionId,
        message: String,
    },
}

/// Side effects the embedding layer executes after a reduction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreEffect {
    /// Re-fetch the player list over REST (counters may have changed).
    RefreshPlayers,
    /// Re-fetch one player's timeline over REST.
    RefreshTimeline(PlayerId),
    /// The session is over for the local viewer; leave the session view.
    SessionEnded { reason: String },
    /// A user-visible message (consumed by the presentation layer's
    /// notification queue; never a blocking dialog).
    Notice(String),
}

// ── The store ───────────────────────────────────────────────────────

/// Single source of truth for one session, driven by [`apply`](Self::apply).
#[derive(Debug)]
pub struct SessionStore {
    session_id: SessionId,
    local_player_id: PlayerId,
    mode: GameMode,
    status: SessionStatus,
    connection: ConnectionState,
    players: Vec<PlayerEntry>,
    current_turn: Option<PlayerId>,
    pending: Option<PendingIntent>,
}

impl SessionStore {
    /// Create a store for a freshly joined session. The roster is filled by
    /// the first players refresh.
    pub fn new(session_id: SessionId, local_player_id: PlayerId, mode: GameMode) -> Self {
        Self {
            session_id,
            local_player_id,
            mode,
            status: SessionStatus::Waiting,
            connection: ConnectionState::Connecting,
            players: Vec::new(),
            current_turn: None,
            pending: None,
        }
    }

    // ── Read access ─────────────────────────────────────────────────

    pub fn session_id(&self) -> SessionId {
        self.session_id
    }

    pub fn local_player_id(&self) -> PlayerId {
        self.local_player_id
    }

    pub fn mode(&self) -> GameMode {
        self.mode
    }

    pub fn status(&self) -> SessionStatus {
        self.status
    }

    pub fn connection(&self) -> ConnectionState {
        self.connection
    }

    /// Roster in join order.
    pub fn players(&self) -> &[PlayerEntry] {
        &self.players
    }

    pub fn player(&self, id: PlayerId) -> Option<&PlayerEntry> {
        self.players.iter().find(|p| p.id == id)
    }

    pub fn local_player(&self) -> Option<&PlayerEntry> {
        self.player(self.local_player_id)
    }

    /// Whose turn it is, if the game has started.
    pub fn current_turn(&self) -> Option<PlayerId> {
        self.current_turn
    }

    /// Whether the local player may submit a turn action right now.
    pub fn is_local_turn(&self) -> bool {
        self.current_turn == Some(self.local_player_id)
    }

    /// Whether the local viewer is the session host.
    pub fn is_local_host(&self) -> bool {
        self.local_player().is_some_and(|p| p.is_host)
    }

    /// The local player's token balance (0 before the first refresh).
    pub fn local_tokens(&self) -> u32 {
        self.local_player().map_or(0, |p| p.tokens)
    }

    /// The outstanding intent, if any.
    pub fn pending_intent(&self) -> Option<&PendingIntent> {
        self.pending.as_ref()
    }

    // ── Intent registration (controller use) ────────────────────────

    /// Register a pending intent, enforcing the one-outstanding rule.
    ///
    /// # Errors
    ///
    /// [`TracklineError::SubmissionPending`](crate::error::TracklineError::SubmissionPending)
    /// if an intent is already outstanding — the caller must not issue a
    /// network request in that case.
    pub fn begin_intent(&mut self, kind: IntentKind) -> crate::error::Result<Uuid> {
        if self.pending.is_some() {
            return Err(crate::error::TracklineError::SubmissionPending);
        }
        let correlation_id = Uuid::new_v4();
        self.pending = Some(PendingIntent {
            correlation_id,
            session_id: self.session_id,
            kind,
            created_at: Instant::now(),
        });
        debug!(%correlation_id, "pending intent registered");
        Ok(correlation_id)
    }

    // ── The reducer ─────────────────────────────────────────────────

    /// Apply one input and return the effects to execute.
    pub fn apply(&mut self, input: StoreInput) -> Vec<StoreEffect> {
        match input {
            StoreInput::Push(event) => self.apply_push(event),
            StoreInput::PlayersFetched(snapshots) => self.apply_players(snapshots),
            StoreInput::TimelineFetched { player_id, cards } => {
                if let Some(player) = self.players.iter_mut().find(|p| p.id == player_id) {
                    player.timeline = cards;
                } else {
                    debug!(%player_id, "timeline fetched for unknown player, dropped");
                }
                Vec::new()
            }
            StoreInput::PlacementConfirmed {
                correlation_id,
                session_id,
                result,
            } => self.apply_placement_confirmed(correlation_id, session_id, result),
            StoreInput::PlacementFailed {
                correlation_id,
                session_id,
                message,
            } => {
                if !self.take_intent(correlation_id, session_id) {
                    return Vec::new();
                }
                // Failures never partially apply: intent gone, state intact.
                vec![StoreEffect::Notice(message)]
            }
            StoreInput::TokenActionResolved {
                correlation_id,
                session_id,
                result,
            } => self.apply_token_resolved(correlation_id, session_id, result),
            StoreInput::TokenActionFailed {
                correlation_id,
                session_id,
                message,
            } => {
                if !self.take_intent(correlation_id, session_id) {
                    return Vec::new();
                }
                vec![StoreEffect::Notice(message)]
            }
        }
    }

    fn apply_push(&mut self, event: TracklineEvent) -> Vec<StoreEffect> {
        match event {
            TracklineEvent::Connected => {
                self.connection = ConnectionState::Connected;
                // REST is the consistency source: resynchronize on every
                // (re)connect since missed events are not replayed.
                vec![StoreEffect::RefreshPlayers]
            }
            TracklineEvent::Reconnecting { .. } => {
                self.connection = ConnectionState::Connecting;
                Vec::new()
            }
            TracklineEvent::Disconnected { .. } => {
                self.connection = ConnectionState::Disconnected;
                Vec::new()
            }
            TracklineEvent::PlayerJoined { player } => {
                if self.players.iter().any(|p| p.id == player.player_id) {
                    // Duplicate delivery; membership is deduped by id.
                    return Vec::new();
                }
                // Host identity comes from the REST snapshot only: an empty
                // client-side roster says nothing about the session's first
                // entrant.
                self.players.push(PlayerEntry::from_snapshot(&player));
                Vec::new()
            }
            TracklineEvent::PlayerLeft {
                player_id,
                was_host,
            } => {
                self.players.retain(|p| p.id != player_id);
                if self.current_turn == Some(player_id) {
                    self.current_turn = self.players.first().map(|p| p.id);
                }
                if was_host && player_id != self.local_player_id && !self.is_local_host() {
                    self.status = SessionStatus::Closed;
                    return vec![StoreEffect::SessionEnded {
                        reason: "the host left the session".into(),
                    }];
                }
                Vec::new()
            }
            TracklineEvent::GameStarted => {
                self.status = SessionStatus::InProgress;
                self.current_turn = self.players.first().map(|p| p.id);
                Vec::new()
            }
            TracklineEvent::SessionClosed { message } => {
                self.status = SessionStatus::Closed;
                vec![StoreEffect::SessionEnded { reason: message }]
            }
            TracklineEvent::NewTrack => {
                self.advance_turn();
                Vec::new()
            }
            TracklineEvent::CardPlaced { player_id } => {
                // Signal to refresh — the payload carries no counters, and
                // the local player's own result arrives over REST.
                vec![
                    StoreEffect::RefreshPlayers,
                    StoreEffect::RefreshTimeline(player_id),
                ]
            }
            TracklineEvent::TokenActionUsed { action_type } => {
                debug!(?action_type, "token action signal");
                vec![StoreEffect::RefreshPlayers]
            }
        }
    }

    /// Wholesale replacement of every player's counters from a REST
    /// snapshot (last write wins), preserving join order, assigned host
    /// flags, and locally held timelines.
    ///
    /// A player referenced by the outstanding pending intent is never
    /// dropped here, even when the snapshot omits them — removing them
    /// mid-flight would briefly show reverted state until the intent
    /// resolves.
    fn apply_players(&mut self, snapshots: Vec<PlayerSnapshot>) -> Vec<StoreEffect> {
        let mut next: Vec<PlayerEntry> = Vec::with_capacity(snapshots.len());
        for snapshot in &snapshots {
            match self.players.iter().position(|p| p.id == snapshot.player_id) {
                Some(idx) => {
                    let mut entry = self.players.swap_remove(idx);
                    entry.name = snapshot.name.clone();
                    entry.score = snapshot.score;
                    entry.tokens = snapshot.tokens;
                    next.push(entry);
                }
                None => next.push(PlayerEntry::from_snapshot(snapshot)),
            }
        }

        // Retain players the pending intent still refers to.
        for id in self.pending_player_refs() {
            if !next.iter().any(|p| p.id == id) {
                if let Some(idx) = self.players.iter().position(|p| p.id == id) {
                    let entry = self.players.swap_remove(idx);
                    debug!(player_id = %id, "retaining player referenced by pending intent");
                    next.push(entry);
                }
            }
        }

        self.players = next;

        // The snapshot is ordered by join; the first entrant is the host.
        // Assign once, then the flag sticks to that id.
        if !self.players.iter().any(|p| p.is_host) {
            if let Some(first) = self.players.first_mut() {
                first.is_host = true;
            }
        }

        // Drop a dangling turn pointer if its player is gone.
        if let Some(turn) = self.current_turn {
            if self.player(turn).is_none() {
                self.current_turn = self.players.first().map(|p| p.id);
            }
        }

        Vec::new()
    }

    fn apply_placement_confirmed(
        &mut self,
        correlation_id: Uuid,
        session_id: SessionId,
        result: PlacementResult,
    ) -> Vec<StoreEffect> {
        let Some(intent) = self.match_intent(correlation_id, session_id) else {
            return Vec::new();
        };
        let position = match &intent.kind {
            IntentKind::Placement { position, .. } => *position,
            IntentKind::TokenAction { .. } => {
                warn!(%correlation_id, "placement result for a non-placement intent, dropped");
                return Vec::new();
            }
        };
        self.pending = None;

        if result.correct {
            let local_id = self.local_player_id;
            if let Some(player) = self.players.iter_mut().find(|p| p.id == local_id) {
                let at = position.min(player.timeline.len());
                player.timeline.insert(at, result.card());
                player.score = player.score.saturating_add(1);
            }
        }

        // Counters for every player (and the authoritative track id) come
        // from the refresh.
        vec![
            StoreEffect::RefreshPlayers,
            StoreEffect::RefreshTimeline(self.local_player_id),
        ]
    }

    fn apply_token_resolved(
        &mut self,
        correlation_id: Uuid,
        session_id: SessionId,
        result: TokenActionResult,
    ) -> Vec<StoreEffect> {
        let Some(intent) = self.match_intent(correlation_id, session_id) else {
            return Vec::new();
        };
        let IntentKind::TokenAction { target, .. } = intent.kind.clone() else {
            warn!(%correlation_id, "token result for a non-token intent, dropped");
            return Vec::new();
        };
        self.pending = None;

        let mut effects = vec![StoreEffect::RefreshPlayers];
        if result.success {
            effects.push(StoreEffect::RefreshTimeline(self.local_player_id));
            if let Some(target) = target {
                effects.push(StoreEffect::RefreshTimeline(target.player_id));
            }
        } else {
            // The committed token is spent regardless (picked up by the
            // players refresh); only the message is surfaced.
            effects.push(StoreEffect::Notice(result.message));
        }
        effects
    }

    // ── Internals ───────────────────────────────────────────────────

    /// The intent matching this correlation id, if it is still current.
    /// A result from a different session is stale (the view switched
    /// sessions while the request was in flight) and is discarded.
    fn match_intent(&self, correlation_id: Uuid, session_id: SessionId) -> Option<&PendingIntent> {
        let intent = self.pending.as_ref()?;
        if intent.correlation_id != correlation_id {
            warn!(%correlation_id, "intent result does not match the outstanding intent, dropped");
            return None;
        }
        if session_id != self.session_id || intent.session_id != self.session_id {
            warn!(%correlation_id, "intent result for an inactive session, dropped");
            return None;
        }
        Some(intent)
    }

    /// Clear the matching intent; returns whether one was cleared.
    fn take_intent(&mut self, correlation_id: Uuid, session_id: SessionId) -> bool {
        if self.match_intent(correlation_id, session_id).is_none() {
            return false;
        }
        self.pending = None;
        true
    }

    /// Player ids the outstanding intent refers to.
    fn pending_player_refs(&self) -> Vec<PlayerId> {
        let Some(intent) = &self.pending else {
            return Vec::new();
        };
        let mut refs = vec![self.local_player_id];
        if let IntentKind::TokenAction {
            target: Some(target),
            ..
        } = &intent.kind
        {
            refs.push(target.player_id);
        }
        refs
    }

    /// Round-robin turn advance over the roster in join order.
    ///
    /// The wire carries no turn field; one track is one turn, so `new_track`
    /// rotates the pointer.
    fn advance_turn(&mut self) {
        if self.players.is_empty() || self.status != SessionStatus::InProgress {
            return;
        }
        self.current_turn = match self.current_turn {
            Some(current) => {
                let idx = self.players.iter().position(|p| p.id == current).unwrap_or(0);
                self.players.get((idx + 1) % self.players.len()).map(|p| p.id)
            }
            None => self.players.first().map(|p| p.id),
        };
    }
}

// ── Tests ───────────────────────────────────────────────────────────

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::indexing_slicing
)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn sid() -> SessionId {
        Uuid::from_u128(0x5E55)
    }

    fn pid(n: u128) -> PlayerId {
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

    /// A store with players 1 (local, host) and 2, game in progress, local
    /// player's turn.
    fn started_store() -> SessionStore {
        let mut store = SessionStore::new(sid(), pid(1), GameMode::Original);
        store.apply(StoreInput::PlayersFetched(vec![
            snapshot(1, "Alice", 0, 2),
            snapshot(2, "Bob", 0, 1),
        ]));
        store.apply(StoreInput::Push(TracklineEvent::GameStarted));
        store
    }

    fn placement_result(correct: bool) -> PlacementResult {
        PlacementResult {
            correct,
            correct_title: "Hey Jude".into(),
            correct_artist: "The Beatles".into(),
            correct_year: 1968,
            earned_token: false,
        }
    }

    // ── Membership ──────────────────────────────────────────────────

    #[test]
    fn player_joined_appends_and_dedupes() {
        let mut store = SessionStore::new(sid(), pid(1), GameMode::Original);
        store.apply(StoreInput::Push(TracklineEvent::PlayerJoined {
            player: snapshot(1, "Alice", 0, 0),
        }));
        store.apply(StoreInput::Push(TracklineEvent::PlayerJoined {
            player: snapshot(2, "Bob", 0, 0),
        }));
        // Duplicate delivery of the same join.
        store.apply(StoreInput::Push(TracklineEvent::PlayerJoined {
            player: snapshot(2, "Bob", 0, 0),
        }));

        assert_eq!(store.players().len(), 2);
        // A push join says nothing about host identity …
        assert!(store.players().iter().all(|p| !p.is_host));

        // … the REST snapshot does: its first entry is the first entrant.
        store.apply(StoreInput::PlayersFetched(vec![
            snapshot(1, "Alice", 0, 0),
            snapshot(2, "Bob", 0, 0),
        ]));
        assert!(store.players()[0].is_host, "first entrant is host");
        assert!(!store.players()[1].is_host);
    }

    #[test]
    fn host_flag_is_keyed_by_id_not_name() {
        // Two players sharing a display name must not confuse host
        // identity.
        let mut store = SessionStore::new(sid(), pid(2), GameMode::Original);
        store.apply(StoreInput::PlayersFetched(vec![
            snapshot(1, "Sam", 0, 0),
            snapshot(2, "Sam", 0, 0),
        ]));
        assert!(store.players()[0].is_host);
        assert!(!store.players()[1].is_host);
        assert!(!store.is_local_host());

        // Reordered refresh: the flag follows player 1, not position.
        store.apply(StoreInput::PlayersFetched(vec![
            snapshot(2, "Sam", 1, 0),
            snapshot(1, "Sam", 0, 0),
        ]));
        let host: Vec<_> = store.players().iter().filter(|p| p.is_host).collect();
        assert_eq!(host.len(), 1);
        assert_eq!(host[0].id, pid(1));
    }

    #[test]
    fn host_left_ends_session_for_non_host() {
        let mut store = started_store();
        // Make the local player the non-host (player 2's view).
        let mut store2 = SessionStore::new(sid(), pid(2), GameMode::Original);
        store2.apply(StoreInput::PlayersFetched(vec![
            snapshot(1, "Alice", 0, 0),
            snapshot(2, "Bob", 0, 0),
        ]));
        let effects = store2.apply(StoreInput::Push(TracklineEvent::PlayerLeft {
            player_id: pid(1),
            was_host: true,
        }));
        assert!(matches!(effects[..], [StoreEffect::SessionEnded { .. }]));
        assert_eq!(store2.status(), SessionStatus::Closed);

        // The host's own view does not end when someone else leaves.
        let effects = store.apply(StoreInput::Push(TracklineEvent::PlayerLeft {
            player_id: pid(2),
            was_host: false,
        }));
        assert!(effects.is_empty());
        assert_eq!(store.status(), SessionStatus::InProgress);
    }

    #[test]
    fn session_closed_is_terminal() {
        let mut store = started_store();
        let effects = store.apply(StoreInput::Push(TracklineEvent::SessionClosed {
            message: "host closed the lobby".into(),
        }));
        assert_eq!(
            effects,
            vec![StoreEffect::SessionEnded {
                reason: "host closed the lobby".into()
            }]
        );
        assert!(store.status().is_terminal());
    }

    // ── Refresh reconciliation ──────────────────────────────────────

    #[test]
    fn players_refresh_is_idempotent() {
        let mut store = started_store();
        let payload = vec![snapshot(1, "Alice", 3, 1), snapshot(2, "Bob", 2, 0)];

        store.apply(StoreInput::PlayersFetched(payload.clone()));
        let first: Vec<_> = store
            .players()
            .iter()
            .map(|p| (p.id, p.name.clone(), p.score, p.tokens, p.is_host))
            .collect();

        store.apply(StoreInput::PlayersFetched(payload));
        let second: Vec<_> = store
            .players()
            .iter()
            .map(|p| (p.id, p.name.clone(), p.score, p.tokens, p.is_host))
            .collect();

        assert_eq!(first, second);
    }

    #[test]
    fn players_refresh_preserves_timelines() {
        let mut store = started_store();
        store.apply(StoreInput::TimelineFetched {
            player_id: pid(1),
            cards: vec![card("Older", 1970), card("Newer", 1990)],
        });

        store.apply(StoreInput::PlayersFetched(vec![
            snapshot(1, "Alice", 2, 5),
            snapshot(2, "Bob", 0, 0),
        ]));

        let alice = store.player(pid(1)).unwrap();
        assert_eq!(alice.tokens, 5, "counters replaced wholesale");
        assert_eq!(alice.timeline.len(), 2, "timeline untouched by refresh");
    }

    #[test]
    fn players_refresh_keeps_intent_referenced_player() {
        let mut store = started_store();
        store
            .begin_intent(IntentKind::TokenAction {
                action: TokenActionKind::StealCard,
                target: Some(StealTarget {
                    player_id: pid(2),
                    position: 0,
                    guess: StealGuess {
                        title: "t".into(),
                        artist: "a".into(),
                    },
                }),
            })
            .unwrap();

        // A refresh that no longer lists the steal target must not drop
        // them while the steal is in flight.
        store.apply(StoreInput::PlayersFetched(vec![snapshot(1, "Alice", 0, 2)]));
        assert!(store.player(pid(2)).is_some());
    }

    #[test]
    fn players_refresh_drops_departed_players_without_intent() {
        let mut store = started_store();
        store.apply(StoreInput::PlayersFetched(vec![snapshot(1, "Alice", 0, 2)]));
        assert!(store.player(pid(2)).is_none());
    }

    // ── Turn rotation ───────────────────────────────────────────────

    #[test]
    fn game_started_sets_first_turn() {
        let store = started_store();
        assert_eq!(store.current_turn(), Some(pid(1)));
        assert!(store.is_local_turn());
    }

    #[test]
    fn new_track_rotates_turn_in_join_order() {
        let mut store = started_store();
        store.apply(StoreInput::Push(TracklineEvent::NewTrack));
        assert_eq!(store.current_turn(), Some(pid(2)));
        store.apply(StoreInput::Push(TracklineEvent::NewTrack));
        assert_eq!(store.current_turn(), Some(pid(1)));
    }

    #[test]
    fn new_track_before_start_is_ignored() {
        let mut store = SessionStore::new(sid(), pid(1), GameMode::Original);
        store.apply(StoreInput::PlayersFetched(vec![snapshot(1, "Alice", 0, 0)]));
        store.apply(StoreInput::Push(TracklineEvent::NewTrack));
        assert_eq!(store.current_turn(), None);
    }

    #[test]
    fn turn_passes_on_when_current_player_leaves() {
        let mut store = started_store();
        store.apply(StoreInput::Push(TracklineEvent::NewTrack)); // Bob's turn
        store.apply(StoreInput::Push(TracklineEvent::PlayerLeft {
            player_id: pid(2),
            was_host: false,
        }));
        assert_eq!(store.current_turn(), Some(pid(1)));
    }

    // ── Push signals ────────────────────────────────────────────────

    #[test]
    fn card_placed_signal_triggers_refresh() {
        let mut store = started_store();
        let effects = store.apply(StoreInput::Push(TracklineEvent::CardPlaced {
            player_id: pid(2),
        }));
        assert_eq!(
            effects,
            vec![
                StoreEffect::RefreshPlayers,
                StoreEffect::RefreshTimeline(pid(2)),
            ]
        );
        // The signal alone never mutates counters.
        assert_eq!(store.player(pid(2)).unwrap().score, 0);
    }

    #[test]
    fn reconnect_triggers_rest_resync() {
        let mut store = started_store();
        store.apply(StoreInput::Push(TracklineEvent::Reconnecting { attempt: 1 }));
        assert_eq!(store.connection(), ConnectionState::Connecting);

        let effects = store.apply(StoreInput::Push(TracklineEvent::Connected));
        assert_eq!(store.connection(), ConnectionState::Connected);
        assert_eq!(effects, vec![StoreEffect::RefreshPlayers]);
    }

    // ── Intent lifecycle ────────────────────────────────────────────

    #[test]
    fn second_intent_is_rejected() {
        let mut store = started_store();
        store
            .begin_intent(IntentKind::Placement {
                position: 0,
                guess: PlacementGuess::default(),
            })
            .unwrap();
        let err = store
            .begin_intent(IntentKind::Placement {
                position: 1,
                guess: PlacementGuess::default(),
            })
            .unwrap_err();
        assert!(matches!(
            err,
            crate::error::TracklineError::SubmissionPending
        ));
    }

    #[test]
    fn correct_placement_inserts_card_and_clears_intent() {
        let mut store = started_store();
        store.apply(StoreInput::TimelineFetched {
            player_id: pid(1),
            cards: vec![card("Older", 1950), card("Newer", 1990)],
        });
        let correlation_id = store
            .begin_intent(IntentKind::Placement {
                position: 1,
                guess: PlacementGuess::default(),
            })
            .unwrap();

        let effects = store.apply(StoreInput::PlacementConfirmed {
            correlation_id,
            session_id: sid(),
            result: placement_result(true),
        });

        assert!(store.pending_intent().is_none());
        let alice = store.player(pid(1)).unwrap();
        assert_eq!(alice.timeline.len(), 3);
        assert_eq!(alice.timeline[1].title, "Hey Jude");
        assert_eq!(alice.score, 1);
        assert!(effects.contains(&StoreEffect::RefreshPlayers));
        assert!(effects.contains(&StoreEffect::RefreshTimeline(pid(1))));
    }

    #[test]
    fn incorrect_placement_leaves_timeline_unchanged() {
        let mut store = started_store();
        let correlation_id = store
            .begin_intent(IntentKind::Placement {
                position: 0,
                guess: PlacementGuess::default(),
            })
            .unwrap();

        store.apply(StoreInput::PlacementConfirmed {
            correlation_id,
            session_id: sid(),
            result: placement_result(false),
        });

        assert!(store.pending_intent().is_none());
        assert!(store.player(pid(1)).unwrap().timeline.is_empty());
        assert_eq!(store.player(pid(1)).unwrap().score, 0);
    }

    #[test]
    fn placement_failure_clears_intent_without_mutation() {
        let mut store = started_store();
        let correlation_id = store
            .begin_intent(IntentKind::Placement {
                position: 0,
                guess: PlacementGuess::default(),
            })
            .unwrap();

        let effects = store.apply(StoreInput::PlacementFailed {
            correlation_id,
            session_id: sid(),
            message: "request timed out".into(),
        });

        assert!(store.pending_intent().is_none());
        assert_eq!(
            effects,
            vec![StoreEffect::Notice("request timed out".into())]
        );
        assert!(store.player(pid(1)).unwrap().timeline.is_empty());
    }

    #[test]
    fn stale_session_result_is_discarded() {
        let mut store = started_store();
        let correlation_id = store
            .begin_intent(IntentKind::Placement {
                position: 0,
                guess: PlacementGuess::default(),
            })
            .unwrap();

        // A result that arrives tagged with another session (the view
        // switched mid-flight) must not touch state — but the intent for
        // the dead session stays out of the new session's way only once
        // the embedder rebuilds the store, so here it simply stays.
        let effects = store.apply(StoreInput::PlacementConfirmed {
            correlation_id,
            session_id: Uuid::from_u128(0xDEAD),
            result: placement_result(true),
        });
        assert!(effects.is_empty());
        assert!(store.pending_intent().is_some());
        assert!(store.player(pid(1)).unwrap().timeline.is_empty());
    }

    #[test]
    fn mismatched_correlation_id_is_discarded() {
        let mut store = started_store();
        store
            .begin_intent(IntentKind::Placement {
                position: 0,
                guess: PlacementGuess::default(),
            })
            .unwrap();

        let effects = store.apply(StoreInput::PlacementConfirmed {
            correlation_id: Uuid::from_u128(0xBEEF),
            session_id: sid(),
            result: placement_result(true),
        });
        assert!(effects.is_empty());
        assert!(store.pending_intent().is_some());
    }

    #[test]
    fn failed_steal_keeps_target_timeline_and_notices() {
        let mut store = started_store();
        store.apply(StoreInput::TimelineFetched {
            player_id: pid(2),
            cards: vec![card("A", 1960), card("B", 1970), card("C", 1980)],
        });
        let correlation_id = store
            .begin_intent(IntentKind::TokenAction {
                action: TokenActionKind::StealCard,
                target: Some(StealTarget {
                    player_id: pid(2),
                    position: 1,
                    guess: StealGuess {
                        title: "Wrong".into(),
                        artist: "Guess".into(),
                    },
                }),
            })
            .unwrap();

        let effects = store.apply(StoreInput::TokenActionResolved {
            correlation_id,
            session_id: sid(),
            result: TokenActionResult {
                success: false,
                message: "wrong guess — token spent".into(),
            },
        });

        assert!(store.pending_intent().is_none());
        assert_eq!(store.player(pid(2)).unwrap().timeline.len(), 3);
        assert!(effects.contains(&StoreEffect::RefreshPlayers));
        assert!(effects.contains(&StoreEffect::Notice("wrong guess — token spent".into())));
    }

    #[test]
    fn successful_steal_refreshes_both_timelines() {
        let mut store = started_store();
        let correlation_id = store
            .begin_intent(IntentKind::TokenAction {
                action: TokenActionKind::StealCard,
                target: Some(StealTarget {
                    player_id: pid(2),
                    position: 0,
                    guess: StealGuess {
                        title: "Right".into(),
                        artist: "Guess".into(),
                    },
                }),
            })
            .unwrap();

        let effects = store.apply(StoreInput::TokenActionResolved {
            correlation_id,
            session_id: sid(),
            result: TokenActionResult {
                success: true,
                message: "card stolen".into(),
            },
        });

        assert_eq!(
            effects,
            vec![
                StoreEffect::RefreshPlayers,
                StoreEffect::RefreshTimeline(pid(1)),
                StoreEffect::RefreshTimeline(pid(2)),
            ]
        );
    }

    #[test]
    fn token_transport_failure_clears_intent_without_refresh() {
        let mut store = started_store();
        let correlation_id = store
            .begin_intent(IntentKind::TokenAction {
                action: TokenActionKind::SkipSong,
                target: None,
            })
            .unwrap();

        let effects = store.apply(StoreInput::TokenActionFailed {
            correlation_id,
            session_id: sid(),
            message: "request timed out".into(),
        });

        assert!(store.pending_intent().is_none());
        assert_eq!(
            effects,
            vec![StoreEffect::Notice("request timed out".into())]
        );
    }

    #[test]
    fn balance_never_negative_via_refresh_cycle() {
        // Local guard + authoritative refresh: whatever sequence arrives,
        // the balance type itself cannot underflow, and refreshes replace
        // rather than subtract.
        let mut store = started_store();
        store.apply(StoreInput::PlayersFetched(vec![
            snapshot(1, "Alice", 0, 0),
            snapshot(2, "Bob", 0, 0),
        ]));
        assert_eq!(store.local_tokens(), 0);
        store.apply(StoreInput::PlayersFetched(vec![
            snapshot(1, "Alice", 0, 3),
            snapshot(2, "Bob", 0, 0),
        ]));
        assert_eq!(store.local_tokens(), 3);
    }
}
