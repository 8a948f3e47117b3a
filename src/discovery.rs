//! Lobby discovery poller.
//!
//! Runs only in the pre-session "join" context — no session id has been
//! chosen yet, so there is no push channel to subscribe to. A background
//! task polls `GET lobbies` on a fixed interval and publishes each
//! successful result wholesale on a [`watch`] channel: the list is replaced,
//! never merged, so a lobby that closed between polls cannot linger.
//!
//! Exactly one poll is in flight at a time; a tick that fires while a
//! request is still outstanding is delayed, not queued.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tracing::{debug, warn};

use crate::api::{GameApi, LobbySummary};

/// Fixed polling interval.
const POLL_INTERVAL: Duration = Duration::from_secs(5);

/// Handle to the background discovery task.
///
/// Subscribe via [`subscribe`](Self::subscribe) (or read the latest list
/// with [`lobbies`](Self::lobbies)); call [`stop`](Self::stop) — or just
/// drop the handle — when a session has been chosen. The task is cancelled
/// on every exit path.
#[derive(Debug)]
pub struct LobbyPoller {
    task: Option<tokio::task::JoinHandle<()>>,
    rx: watch::Receiver<Vec<LobbySummary>>,
}

impl LobbyPoller {
    /// Spawn the poller with the default 5 s interval.
    pub fn start(api: Arc<dyn GameApi>) -> Self {
        Self::start_with_interval(api, POLL_INTERVAL)
    }

    /// Spawn the poller with a custom interval (used by tests).
    pub fn start_with_interval(api: Arc<dyn GameApi>, interval: Duration) -> Self {
        let (tx, rx) = watch::channel(Vec::new());
        let task = tokio::spawn(poll_loop(api, tx, interval));
        Self {
            task: Some(task),
            rx,
        }
    }

    /// A receiver that observes every published lobby list.
    pub fn subscribe(&self) -> watch::Receiver<Vec<LobbySummary>> {
        self.rx.clone()
    }

    /// The most recently published lobby list.
    pub fn lobbies(&self) -> Vec<LobbySummary> {
        self.rx.borrow().clone()
    }

    /// Stop polling. Idempotent.
    pub fn stop(&mut self) {
        if let Some(task) = self.task.take() {
            debug!("lobby poller stopped");
            task.abort();
        }
    }
}

impl Drop for LobbyPoller {
    fn drop(&mut self) {
        self.stop();
    }
}

/// The polling task: one request per tick, sequentially.
///
/// The await inside the loop is what guarantees a single in-flight request;
/// `MissedTickBehavior::Delay` keeps a slow response from causing a burst
/// of catch-up polls afterwards.
async fn poll_loop(
    api: Arc<dyn GameApi>,
    tx: watch::Sender<Vec<LobbySummary>>,
    interval: Duration,
) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        ticker.tick().await;
        match api.lobbies().await {
            Ok(lobbies) => {
                debug!(count = lobbies.len(), "lobby poll completed");
                if tx.send(lobbies).is_err() {
                    // All receivers (including the handle) are gone.
                    return;
                }
            }
            Err(e) => {
                // Keep the previous snapshot; the next tick retries anyway.
                warn!("lobby poll failed: {e}");
            }
        }
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
    use crate::api::{
        AddPlayerResponse, CreateSessionResponse, PlacementRequest, PlacementResult,
        TokenActionRequest, TokenActionResult,
    };
    use crate::error::{Result, TracklineError};
    use crate::protocol::{
        GameMode, PlayerId, PlayerSnapshot, SessionId, SessionStatus, TimelineCard,
    };
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex as StdMutex;
    use uuid::Uuid;

    /// Scripted lobby listings; everything else is unreachable in these
    /// tests.
    struct ScriptedApi {
        responses: StdMutex<Vec<Result<Vec<LobbySummary>>>>,
        calls: AtomicUsize,
        in_flight: AtomicUsize,
        max_in_flight: AtomicUsize,
        delay: Duration,
    }

    impl ScriptedApi {
        fn new(responses: Vec<Result<Vec<LobbySummary>>>, delay: Duration) -> Self {
            Self {
                responses: StdMutex::new(responses),
                calls: AtomicUsize::new(0),
                in_flight: AtomicUsize::new(0),
                max_in_flight: AtomicUsize::new(0),
                delay,
            }
        }
    }

    #[async_trait]
    impl GameApi for ScriptedApi {
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
            let current = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_in_flight.fetch_max(current, Ordering::SeqCst);
            tokio::time::sleep(self.delay).await;
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            self.calls.fetch_add(1, Ordering::SeqCst);

            let mut responses = self.responses.lock().unwrap();
            if responses.is_empty() {
                Ok(Vec::new())
            } else {
                responses.remove(0)
            }
        }

        async fn players(&self, _session_id: SessionId) -> Result<Vec<PlayerSnapshot>> {
            Err(TracklineError::NotConnected)
        }

        async fn timeline(
            &self,
            _session_id: SessionId,
            _player_id: PlayerId,
        ) -> Result<Vec<TimelineCard>> {
            Err(TracklineError::NotConnected)
        }

        async fn place_card(&self, _request: &PlacementRequest) -> Result<PlacementResult> {
            Err(TracklineError::NotConnected)
        }

        async fn token_action(&self, _request: &TokenActionRequest) -> Result<TokenActionResult> {
            Err(TracklineError::NotConnected)
        }

        async fn next_track(&self, _session_id: SessionId) -> Result<()> {
            Err(TracklineError::NotConnected)
        }
    }

    fn lobby(n: u128, host: &str) -> LobbySummary {
        LobbySummary {
            session_id: Uuid::from_u128(n),
            host_name: host.into(),
            player_count: 1,
            status: SessionStatus::Waiting,
        }
    }

    #[tokio::test]
    async fn publishes_full_replacement_lists() {
        let api = Arc::new(ScriptedApi::new(
            vec![
                Ok(vec![lobby(1, "Alice"), lobby(2, "Bob")]),
                Ok(vec![lobby(2, "Bob")]),
            ],
            Duration::from_millis(1),
        ));
        let mut poller =
            LobbyPoller::start_with_interval(api.clone(), Duration::from_millis(20));
        let mut rx = poller.subscribe();

        rx.changed().await.unwrap();
        assert_eq!(rx.borrow().len(), 2);

        rx.changed().await.unwrap();
        // Lobby 1 closed between polls: it must be gone, not merged.
        let lobbies = rx.borrow().clone();
        assert_eq!(lobbies.len(), 1);
        assert_eq!(lobbies[0].session_id, Uuid::from_u128(2));

        poller.stop();
    }

    #[tokio::test]
    async fn poll_error_keeps_previous_snapshot() {
        let api = Arc::new(ScriptedApi::new(
            vec![
                Ok(vec![lobby(1, "Alice")]),
                Err(TracklineError::Timeout),
                Ok(vec![]),
            ],
            Duration::from_millis(1),
        ));
        let mut poller =
            LobbyPoller::start_with_interval(api.clone(), Duration::from_millis(20));
        let mut rx = poller.subscribe();

        rx.changed().await.unwrap();
        assert_eq!(rx.borrow().len(), 1);

        // The failed poll publishes nothing; the next successful (empty)
        // poll does.
        rx.changed().await.unwrap();
        assert!(rx.borrow().is_empty());

        poller.stop();
    }

    #[tokio::test]
    async fn never_more_than_one_in_flight() {
        // Response latency far above the interval: ticks pile up but the
        // loop awaits each request before the next.
        let api = Arc::new(ScriptedApi::new(Vec::new(), Duration::from_millis(50)));
        let mut poller = LobbyPoller::start_with_interval(api.clone(), Duration::from_millis(5));

        tokio::time::sleep(Duration::from_millis(160)).await;
        poller.stop();

        assert_eq!(api.max_in_flight.load(Ordering::SeqCst), 1);
        assert!(api.calls.load(Ordering::SeqCst) >= 2);
    }

    #[tokio::test]
    async fn drop_cancels_the_task() {
        let api = Arc::new(ScriptedApi::new(Vec::new(), Duration::from_millis(1)));
        let poller = LobbyPoller::start_with_interval(api.clone(), Duration::from_millis(5));
        drop(poller);

        let before = api.calls.load(Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(40)).await;
        let after = api.calls.load(Ordering::SeqCst);
        // At most one already-started request can complete after the drop.
        assert!(after <= before + 1, "poller kept polling after drop");
    }
}
