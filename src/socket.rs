//! Async push-channel socket for a Trackline session.
//!
//! [`SessionSocket`] is a thin handle that communicates with a background
//! transport loop task via an unbounded MPSC channel. Events are emitted on
//! a bounded channel ([`tokio::sync::mpsc::Receiver<TracklineEvent>`])
//! returned from [`SessionSocket::start`].
//!
//! The loop owns a [`Connector`] rather than a single transport: after every
//! (re)connect it sends the `join_lobby` handshake tagged with the session
//! id, and on transport loss it redials with the same connector. Missed
//! events are not replayed — the session store resynchronizes over REST when
//! it sees `Connected` again.
//!
//! # Example
//!
//! ```rust,ignore
//! let connector = WebSocketConnector::new("ws://localhost:8000/ws");
//! let config = SocketConfig::new(session_id).with_player(player_name, player_id);
//! let (socket, mut events) = SessionSocket::start(connector, config);
//!
//! while let Some(event) = events.recv().await {
//!     match event {
//!         TracklineEvent::GameStarted => { /* … */ }
//!         TracklineEvent::Disconnected { .. } => break,
//!         _ => {}
//!     }
//! }
//! ```

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tracing::{debug, error, warn};

use crate::error::{Result, TracklineError};
use crate::event::TracklineEvent;
use crate::protocol::{ClientMessage, PlayerId, ServerMessage, SessionId};
use crate::transport::{Connector, Transport};

/// Default capacity of the bounded event channel.
const DEFAULT_EVENT_CHANNEL_CAPACITY: usize = 256;

/// Default timeout for the graceful shutdown.
const DEFAULT_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(1);

/// Default number of reconnect attempts per outage.
const DEFAULT_RECONNECT_ATTEMPTS: u32 = 3;

/// Default delay between reconnect attempts.
const DEFAULT_RECONNECT_DELAY: Duration = Duration::from_secs(2);

// ── Configuration ───────────────────────────────────────────────────

/// Configuration for a [`SessionSocket`] connection.
///
/// The only required field is the session id; all others have defaults.
///
/// # Example
///
/// ```
/// use trackline_client::socket::SocketConfig;
/// use uuid::Uuid;
///
/// let config = SocketConfig::new(Uuid::nil())
///     .with_event_channel_capacity(512)
///     .with_reconnect(5, std::time::Duration::from_secs(1));
/// assert_eq!(config.event_channel_capacity, 512);
/// ```
#[derive(Debug, Clone)]
pub struct SocketConfig {
    /// Session this socket subscribes to.
    pub session_id: SessionId,
    /// Display name sent in the `join_lobby` handshake.
    pub player_name: Option<String>,
    /// Player id sent in the `join_lobby` handshake, once known.
    pub player_id: Option<PlayerId>,
    /// Capacity of the bounded event channel.
    ///
    /// When the consumer cannot keep up with incoming events, events are
    /// dropped (with a warning logged) to avoid blocking the transport
    /// loop. The terminal `Disconnected` event is always delivered
    /// regardless of capacity.
    ///
    /// Defaults to **256**. Values below 1 are clamped to 1.
    pub event_channel_capacity: usize,
    /// Timeout for the graceful shutdown.
    ///
    /// When [`SessionSocket::shutdown`] is called, the background loop is
    /// given this much time to close the transport and emit a final
    /// `Disconnected` event. If the timeout expires the task is aborted.
    pub shutdown_timeout: Duration,
    /// Reconnect attempts before the socket gives up on an outage.
    pub reconnect_attempts: u32,
    /// Delay between reconnect attempts.
    pub reconnect_delay: Duration,
}

impl SocketConfig {
    /// Create a configuration for the given session with default values.
    pub fn new(session_id: SessionId) -> Self {
        Self {
            session_id,
            player_name: None,
            player_id: None,
            event_channel_capacity: DEFAULT_EVENT_CHANNEL_CAPACITY,
            shutdown_timeout: DEFAULT_SHUTDOWN_TIMEOUT,
            reconnect_attempts: DEFAULT_RECONNECT_ATTEMPTS,
            reconnect_delay: DEFAULT_RECONNECT_DELAY,
        }
    }

    /// Attach the local player's identity to the handshake.
    #[must_use]
    pub fn with_player(mut self, name: impl Into<String>, player_id: PlayerId) -> Self {
        self.player_name = Some(name.into());
        self.player_id = Some(player_id);
        self
    }

    /// Set the capacity of the bounded event channel.
    ///
    /// Defaults to **256**. Values below 1 are clamped to 1.
    #[must_use]
    pub fn with_event_channel_capacity(mut self, capacity: usize) -> Self {
        self.event_channel_capacity = capacity.max(1);
        self
    }

    /// Set the timeout for the graceful shutdown.
    #[must_use]
    pub fn with_shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.shutdown_timeout = timeout;
        self
    }

    /// Set the reconnect attempt count and the delay between attempts.
    ///
    /// Zero attempts disables reconnection: the first transport loss is
    /// terminal.
    #[must_use]
    pub fn with_reconnect(mut self, attempts: u32, delay: Duration) -> Self {
        self.reconnect_attempts = attempts;
        self.reconnect_delay = delay;
        self
    }

    /// The `join_lobby` handshake message for this configuration.
    fn handshake(&self) -> ClientMessage {
        ClientMessage::JoinLobby {
            session_id: self.session_id,
            player_name: self.player_name.clone(),
            player_id: self.player_id,
        }
    }
}

// ── Shared state ────────────────────────────────────────────────────

/// Internal shared state between the socket handle and the loop task.
struct SocketState {
    connected: AtomicBool,
    session_id: SessionId,
}

// ── Socket handle ───────────────────────────────────────────────────

/// Handle to a session's push channel.
///
/// Created via [`SessionSocket::start`], which spawns a background loop and
/// returns this handle together with an event receiver.
///
/// All public methods serialize a [`ClientMessage`] and queue it to the
/// loop over an unbounded channel. They return immediately once the message
/// is queued (no round-trip await).
pub struct SessionSocket {
    /// Sender half of the command channel to the loop.
    cmd_tx: mpsc::UnboundedSender<ClientMessage>,
    /// Shared state updated by the loop.
    state: Arc<SocketState>,
    /// Handle to the background loop task.
    task: Option<tokio::task::JoinHandle<()>>,
    /// Oneshot sender to signal the loop to shut down gracefully.
    shutdown_tx: Option<tokio::sync::oneshot::Sender<()>>,
    /// Timeout for the graceful shutdown.
    shutdown_timeout: Duration,
}

impl SessionSocket {
    /// Start the socket loop and return a handle plus event receiver.
    ///
    /// The loop dials the [`Connector`], sends the `join_lobby` handshake as
    /// its very first outgoing message, and emits
    /// [`Connected`](TracklineEvent::Connected) once the channel is up.
    #[must_use = "the event receiver must be used to receive events"]
    pub fn start(
        connector: impl Connector,
        config: SocketConfig,
    ) -> (Self, mpsc::Receiver<TracklineEvent>) {
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel::<ClientMessage>();
        // Clamp capacity to at least 1 (tokio panics on 0).
        let capacity = config.event_channel_capacity.max(1);
        let (event_tx, event_rx) = mpsc::channel::<TracklineEvent>(capacity);
        let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel::<()>();

        let state = Arc::new(SocketState {
            connected: AtomicBool::new(false),
            session_id: config.session_id,
        });
        let loop_state = Arc::clone(&state);
        let shutdown_timeout = config.shutdown_timeout;

        let task = tokio::spawn(socket_loop(
            connector,
            config,
            cmd_rx,
            event_tx,
            loop_state,
            shutdown_rx,
        ));

        let socket = Self {
            cmd_tx,
            state,
            task: Some(task),
            shutdown_tx: Some(shutdown_tx),
            shutdown_timeout,
        };

        (socket, event_rx)
    }

    // ── Public API methods ──────────────────────────────────────────

    /// Ask the server to start the game (host only; the server enforces it).
    ///
    /// # Errors
    ///
    /// Returns [`TracklineError::NotConnected`] if the push channel is down.
    pub fn start_game(&self) -> Result<()> {
        self.send(ClientMessage::StartGame {
            session_id: self.state.session_id,
        })
    }

    /// Shut down the socket, closing the transport and stopping the task.
    ///
    /// By the time this returns the loop has exited: the receiver holds at
    /// most the terminal `Disconnected` event and then yields `None`.
    /// Nothing is emitted afterwards.
    pub async fn shutdown(&mut self) {
        debug!("SessionSocket: shutdown requested");

        // Signal the loop to shut down gracefully.
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }

        // Await the loop with a timeout. If it doesn't exit in time, abort
        // it so the task cannot detach and run indefinitely.
        if let Some(mut task) = self.task.take() {
            match tokio::time::timeout(self.shutdown_timeout, &mut task).await {
                Ok(Ok(())) => {}
                Ok(Err(join_err)) => {
                    warn!("socket loop terminated with join error: {join_err}");
                }
                Err(_) => {
                    warn!("socket loop did not exit within timeout; aborting task");
                    task.abort();
                    if let Err(join_err) = task.await {
                        debug!("socket loop aborted: {join_err}");
                    }
                }
            }
        }

        self.state.connected.store(false, Ordering::Release);
    }

    // ── State accessors ─────────────────────────────────────────────

    /// Returns `true` if the push channel is believed to be up.
    pub fn is_connected(&self) -> bool {
        self.state.connected.load(Ordering::Acquire)
    }

    /// The session this socket is subscribed to.
    pub fn session_id(&self) -> SessionId {
        self.state.session_id
    }

    // ── Internal helpers ────────────────────────────────────────────

    /// Queue a `ClientMessage` to the loop.
    fn send(&self, msg: ClientMessage) -> Result<()> {
        if !self.state.connected.load(Ordering::Acquire) {
            return Err(TracklineError::NotConnected);
        }
        self.cmd_tx
            .send(msg)
            .map_err(|_| TracklineError::NotConnected)
    }
}

impl std::fmt::Debug for SessionSocket {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionSocket")
            .field("session_id", &self.state.session_id)
            .field("connected", &self.is_connected())
            .field("has_task", &self.task.is_some())
            .finish()
    }
}

impl Drop for SessionSocket {
    fn drop(&mut self) {
        // `Drop` is synchronous so we cannot await a graceful shutdown.
        // The only safe action is to abort the spawned task, which causes
        // the loop future to be dropped immediately. The `shutdown_tx`
        // oneshot is intentionally *not* sent here: sending it would
        // trigger a graceful path that calls async `transport.close()`,
        // but there is no executor context to drive it inside `Drop`.
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

// ── Socket loop ─────────────────────────────────────────────────────

/// Outcome of one connected phase of the loop.
enum Phase {
    /// Transport lost; try to reconnect.
    Lost(String),
    /// Shut down; exit the loop.
    Exit,
}

/// Background loop that owns the connector and the live transport.
///
/// Connects, handshakes, then multiplexes send/receive via
/// `tokio::select!`. On transport loss it redials up to the configured
/// attempt count, re-handshaking each time. Exits when:
/// - The command channel closes (handle dropped) or shutdown is signaled
/// - Reconnect attempts are exhausted
async fn socket_loop(
    mut connector: impl Connector,
    config: SocketConfig,
    mut cmd_rx: mpsc::UnboundedReceiver<ClientMessage>,
    event_tx: mpsc::Sender<TracklineEvent>,
    state: Arc<SocketState>,
    mut shutdown_rx: tokio::sync::oneshot::Receiver<()>,
) {
    debug!(session_id = %config.session_id, "socket loop started");

    let mut last_loss: Option<String> = None;

    'session: loop {
        // ── Connect (or reconnect) phase ────────────────────────────
        // The initial dial is silent; redials after a loss announce each
        // attempt so consumers observe the connection-state change even
        // when the first redial succeeds immediately.
        let mut transport = {
            let mut attempt = 0u32;
            loop {
                if last_loss.is_some() {
                    attempt += 1;
                    if attempt > config.reconnect_attempts {
                        emit_disconnected(&event_tx, &state, last_loss.take()).await;
                        break 'session;
                    }
                    emit_event(&event_tx, TracklineEvent::Reconnecting { attempt });
                    if attempt > 1 {
                        tokio::select! {
                            _ = tokio::time::sleep(config.reconnect_delay) => {}
                            _ = &mut shutdown_rx => {
                                emit_disconnected(&event_tx, &state, Some("client shut down".into())).await;
                                break 'session;
                            }
                        }
                    }
                }
                match connector.connect().await {
                    Ok(t) => break t,
                    Err(e) => {
                        if last_loss.is_none() {
                            // The very first dial failed: no channel was
                            // ever up, so there is nothing to recover.
                            emit_disconnected(
                                &event_tx,
                                &state,
                                Some(format!("connect failed: {e}")),
                            )
                            .await;
                            break 'session;
                        }
                        warn!(attempt, "push channel connect failed: {e}");
                        last_loss = Some(format!("connect failed: {e}"));
                    }
                }
            }
        };

        // ── Handshake: join_lobby MUST be the first outgoing message ──
        let handshake = config.handshake();
        match serde_json::to_string(&handshake) {
            Ok(json) => {
                if let Err(e) = transport.send(json).await {
                    warn!("handshake send failed: {e}");
                    last_loss = Some(format!("handshake failed: {e}"));
                    continue 'session;
                }
            }
            Err(e) => {
                // Serialization of our own message failing is a bug; it
                // will not heal on retry, so report and stop.
                error!("failed to serialize join_lobby handshake: {e}");
                emit_disconnected(&event_tx, &state, Some(format!("handshake error: {e}"))).await;
                break 'session;
            }
        }

        state.connected.store(true, Ordering::Release);
        last_loss = None;
        emit_event(&event_tx, TracklineEvent::Connected);

        // ── Connected phase ─────────────────────────────────────────
        let phase = connected_phase(&mut transport, &mut cmd_rx, &event_tx, &mut shutdown_rx).await;
        state.connected.store(false, Ordering::Release);

        match phase {
            Phase::Lost(reason) => {
                warn!("push channel lost: {reason}");
                last_loss = Some(reason);
                if config.reconnect_attempts == 0 {
                    emit_disconnected(&event_tx, &state, last_loss.take()).await;
                    break 'session;
                }
            }
            Phase::Exit => {
                let _ = transport.close().await;
                emit_disconnected(&event_tx, &state, Some("client shut down".into())).await;
                break 'session;
            }
        }
    }

    debug!("socket loop exited");
}

/// Drive one connected transport until shutdown or loss.
async fn connected_phase(
    transport: &mut impl Transport,
    cmd_rx: &mut mpsc::UnboundedReceiver<ClientMessage>,
    event_tx: &mpsc::Sender<TracklineEvent>,
    shutdown_rx: &mut tokio::sync::oneshot::Receiver<()>,
) -> Phase {
    loop {
        tokio::select! {
            // Branch 1: outgoing command from the socket handle
            cmd = cmd_rx.recv() => {
                match cmd {
                    Some(msg) => {
                        debug!("sending client message: {:?}", std::mem::discriminant(&msg));
                        match serde_json::to_string(&msg) {
                            Ok(json) => {
                                if let Err(e) = transport.send(json).await {
                                    return Phase::Lost(format!("transport send error: {e}"));
                                }
                            }
                            Err(e) => {
                                error!("failed to serialize ClientMessage: {e}");
                                // Serialization errors are programming bugs;
                                // don't kill the loop.
                            }
                        }
                    }
                    // Command channel closed — socket handle dropped.
                    None => {
                        debug!("command channel closed, shutting down socket loop");
                        return Phase::Exit;
                    }
                }
            }

            // Branch 2: shutdown signal
            _ = &mut *shutdown_rx => {
                debug!("shutdown signal received");
                return Phase::Exit;
            }

            // Branch 3: incoming message from the server
            incoming = transport.recv() => {
                match incoming {
                    Some(Ok(text)) => {
                        match serde_json::from_str::<ServerMessage>(&text) {
                            Ok(server_msg) => {
                                emit_event(event_tx, TracklineEvent::from(server_msg));
                            }
                            Err(e) => {
                                // Unknown tags land here too: logged and
                                // dropped, never silently accepted.
                                warn!("failed to deserialize server message: {e} — raw: {text}");
                            }
                        }
                    }
                    Some(Err(e)) => {
                        return Phase::Lost(format!("transport receive error: {e}"));
                    }
                    // Transport closed by the server.
                    None => {
                        return Phase::Lost("connection closed by server".into());
                    }
                }
            }
        }
    }
}

/// Emit an event to the event channel. If the channel is full, log a warning
/// and drop the event to avoid blocking the socket loop.
fn emit_event(event_tx: &mpsc::Sender<TracklineEvent>, event: TracklineEvent) {
    match event_tx.try_send(event) {
        Ok(()) => {}
        Err(mpsc::error::TrySendError::Full(dropped)) => {
            warn!(
                "event channel full, dropping event: {:?}",
                std::mem::discriminant(&dropped)
            );
        }
        Err(mpsc::error::TrySendError::Closed(_)) => {
            debug!("event channel closed, receiver dropped");
        }
    }
}

/// Emit a [`Disconnected`](TracklineEvent::Disconnected) event and update
/// state.
///
/// Uses `send().await` (blocking) instead of `try_send` because
/// `Disconnected` is always the last event on the channel and must never be
/// silently dropped.
async fn emit_disconnected(
    event_tx: &mpsc::Sender<TracklineEvent>,
    state: &SocketState,
    reason: Option<String>,
) {
    state.connected.store(false, Ordering::Release);
    let event = TracklineEvent::Disconnected { reason };
    if event_tx.send(event).await.is_err() {
        debug!("event channel closed, receiver dropped");
    }
}

// ── Tests ───────────────────────────────────────────────────────────

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::todo,
    clippy::unimplemented,
    clippy::indexing_slicing
)]
mod tests {
    use super::*;
    use crate::protocol::{PlayerSnapshot, TokenActionKind};
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::Mutex as StdMutex;
    use uuid::Uuid;

    // ── Mock transport & connector ──────────────────────────────────

    /// A mock transport that records sent messages and replays scripted
    /// responses.
    struct MockTransport {
        /// Messages that `recv()` will yield in order.
        incoming: VecDeque<Option<Result<String>>>,
        /// Recorded outgoing messages.
        sent: Arc<StdMutex<Vec<String>>>,
        /// Whether `close()` was called.
        closed: Arc<AtomicBool>,
    }

    #[async_trait]
    impl Transport for MockTransport {
        async fn send(&mut self, message: String) -> Result<()> {
            self.sent.lock().unwrap().push(message);
            Ok(())
        }

        async fn recv(&mut self) -> Option<Result<String>> {
            if let Some(item) = self.incoming.pop_front() {
                // An explicit `None` entry signals a clean transport close;
                // `Some(result)` delivers the scripted message or error.
                item
            } else {
                // All scripted messages delivered — hang forever so the
                // loop stays alive until shutdown.
                std::future::pending().await
            }
        }

        async fn close(&mut self) -> Result<()> {
            self.closed.store(true, Ordering::Relaxed);
            Ok(())
        }
    }

    /// A connector serving a scripted sequence of transports. Once the
    /// script is exhausted, further connects fail.
    struct MockConnector {
        transports: VecDeque<MockTransport>,
    }

    impl MockConnector {
        #[allow(clippy::type_complexity)]
        fn new(
            scripts: Vec<Vec<Option<Result<String>>>>,
        ) -> (Self, Arc<StdMutex<Vec<String>>>, Arc<AtomicBool>) {
            let sent = Arc::new(StdMutex::new(Vec::new()));
            let closed = Arc::new(AtomicBool::new(false));
            let transports = scripts
                .into_iter()
                .map(|incoming| MockTransport {
                    incoming: VecDeque::from(incoming),
                    sent: Arc::clone(&sent),
                    closed: Arc::clone(&closed),
                })
                .collect();
            (Self { transports }, sent, closed)
        }
    }

    #[async_trait]
    impl Connector for MockConnector {
        type Conn = MockTransport;

        async fn connect(&mut self) -> Result<MockTransport> {
            self.transports
                .pop_front()
                .ok_or(TracklineError::NotConnected)
        }
    }

    // ── Helpers ─────────────────────────────────────────────────────

    fn session_id() -> SessionId {
        Uuid::from_u128(0xABCD)
    }

    fn config() -> SocketConfig {
        SocketConfig::new(session_id()).with_player("Alice", Uuid::from_u128(1))
    }

    fn player_joined_json() -> String {
        serde_json::to_string(&ServerMessage::PlayerJoined {
            player: PlayerSnapshot {
                player_id: Uuid::from_u128(2),
                name: "Bob".into(),
                score: 0,
                tokens: 0,
            },
        })
        .unwrap()
    }

    // ── Tests ───────────────────────────────────────────────────────

    #[tokio::test]
    async fn handshake_is_first_sent_message() {
        let (connector, sent, _closed) = MockConnector::new(vec![vec![]]);
        let (mut socket, mut events) = SessionSocket::start(connector, config());

        let event = events.recv().await.unwrap();
        assert!(matches!(event, TracklineEvent::Connected));

        {
            let messages = sent.lock().unwrap();
            assert!(!messages.is_empty());
            let first: ClientMessage = serde_json::from_str(&messages[0]).unwrap();
            if let ClientMessage::JoinLobby {
                session_id: sid,
                player_name,
                player_id,
            } = first
            {
                assert_eq!(sid, session_id());
                assert_eq!(player_name.as_deref(), Some("Alice"));
                assert_eq!(player_id, Some(Uuid::from_u128(1)));
            } else {
                panic!("expected JoinLobby handshake, got {first:?}");
            }
        }

        socket.shutdown().await;
    }

    #[tokio::test]
    async fn server_messages_become_events() {
        let (connector, _sent, _closed) =
            MockConnector::new(vec![vec![Some(Ok(player_joined_json()))]]);
        let (mut socket, mut events) = SessionSocket::start(connector, config());

        let _ = events.recv().await; // Connected
        let event = events.recv().await.unwrap();
        if let TracklineEvent::PlayerJoined { player } = event {
            assert_eq!(player.name, "Bob");
        } else {
            panic!("expected PlayerJoined, got {event:?}");
        }

        socket.shutdown().await;
    }

    #[tokio::test]
    async fn start_game_sends_message() {
        let (connector, sent, _closed) = MockConnector::new(vec![vec![]]);
        let (mut socket, mut events) = SessionSocket::start(connector, config());

        let _ = events.recv().await; // Connected
        socket.start_game().unwrap();

        tokio::time::sleep(Duration::from_millis(50)).await;

        {
            let messages = sent.lock().unwrap();
            let last: ClientMessage = serde_json::from_str(messages.last().unwrap()).unwrap();
            assert!(matches!(last, ClientMessage::StartGame { session_id: sid } if sid == session_id()));
        }

        socket.shutdown().await;
    }

    #[tokio::test]
    async fn reconnects_after_clean_server_close() {
        // First transport closes cleanly after one event; the second one
        // keeps the session alive.
        let (connector, _sent, _closed) = MockConnector::new(vec![
            vec![Some(Ok(player_joined_json())), None],
            vec![],
        ]);
        let cfg = config().with_reconnect(3, Duration::from_millis(10));
        let (mut socket, mut events) = SessionSocket::start(connector, cfg);

        let _ = events.recv().await; // Connected
        let _ = events.recv().await; // PlayerJoined

        // Reconnecting is announced, then a second Connected marks the
        // transparent reconnect.
        let event = events.recv().await.unwrap();
        assert!(matches!(event, TracklineEvent::Reconnecting { attempt: 1 }));
        let event = events.recv().await.unwrap();
        assert!(
            matches!(event, TracklineEvent::Connected),
            "expected Connected after reconnect, got {event:?}"
        );

        socket.shutdown().await;
    }

    #[tokio::test]
    async fn exhausted_reconnects_end_in_disconnected() {
        // Single scripted transport that closes immediately; the connector
        // then fails every redial.
        let (connector, _sent, _closed) = MockConnector::new(vec![vec![None]]);
        let cfg = config().with_reconnect(2, Duration::from_millis(5));
        let (mut socket, mut events) = SessionSocket::start(connector, cfg);

        let _ = events.recv().await; // Connected

        let mut reconnecting = 0;
        loop {
            match events.recv().await.unwrap() {
                TracklineEvent::Reconnecting { .. } => reconnecting += 1,
                TracklineEvent::Disconnected { .. } => break,
                other => panic!("unexpected event {other:?}"),
            }
        }
        assert_eq!(reconnecting, 2);
        assert!(!socket.is_connected());

        socket.shutdown().await;
    }

    #[tokio::test]
    async fn zero_reconnect_attempts_makes_loss_terminal() {
        let (connector, _sent, _closed) = MockConnector::new(vec![vec![None], vec![]]);
        let cfg = config().with_reconnect(0, Duration::from_millis(5));
        let (mut socket, mut events) = SessionSocket::start(connector, cfg);

        let _ = events.recv().await; // Connected
        let event = events.recv().await.unwrap();
        assert!(matches!(event, TracklineEvent::Disconnected { .. }));

        socket.shutdown().await;
    }

    #[tokio::test]
    async fn shutdown_emits_disconnected_and_closes_transport() {
        let (connector, _sent, closed) = MockConnector::new(vec![vec![]]);
        let (mut socket, mut events) = SessionSocket::start(connector, config());

        let _ = events.recv().await; // Connected
        socket.shutdown().await;

        let event = events.recv().await.unwrap();
        if let TracklineEvent::Disconnected { reason } = event {
            assert_eq!(reason.as_deref(), Some("client shut down"));
        } else {
            panic!("expected Disconnected, got {event:?}");
        }
        assert!(closed.load(Ordering::Relaxed));
        assert!(!socket.is_connected());
    }

    #[tokio::test]
    async fn not_connected_error_after_shutdown() {
        let (connector, _sent, _closed) = MockConnector::new(vec![vec![]]);
        let (mut socket, mut events) = SessionSocket::start(connector, config());

        let _ = events.recv().await; // Connected
        socket.shutdown().await;

        let result = socket.start_game();
        assert!(matches!(result, Err(TracklineError::NotConnected)));
    }

    #[tokio::test]
    async fn malformed_server_message_is_skipped() {
        let (connector, _sent, _closed) = MockConnector::new(vec![vec![
            Some(Ok("{not json".into())),
            Some(Ok(r#"{"type":"mystery_event","data":{}}"#.into())),
            Some(Ok(
                serde_json::to_string(&ServerMessage::NewTrack).unwrap()
            )),
        ]]);
        let (mut socket, mut events) = SessionSocket::start(connector, config());

        let _ = events.recv().await; // Connected
        // Both bad payloads are logged and dropped; the next valid message
        // still comes through.
        let event = events.recv().await.unwrap();
        assert!(matches!(event, TracklineEvent::NewTrack));

        socket.shutdown().await;
    }

    #[tokio::test]
    async fn double_shutdown_does_not_panic() {
        let (connector, _sent, _closed) = MockConnector::new(vec![vec![]]);
        let (mut socket, mut events) = SessionSocket::start(connector, config());

        let _ = events.recv().await; // Connected
        socket.shutdown().await;
        socket.shutdown().await; // should not panic
    }

    #[tokio::test]
    async fn drop_without_explicit_shutdown() {
        let (connector, _sent, _closed) = MockConnector::new(vec![vec![]]);
        let (socket, mut events) = SessionSocket::start(connector, config());

        let _ = events.recv().await; // Connected
        drop(socket);

        // The loop should exit; the event channel closes. We just verify we
        // don't hang or panic draining what remains.
        while let Some(_event) = events.recv().await {}
    }

    #[tokio::test]
    async fn event_channel_backpressure_does_not_block() {
        let mut script: Vec<Option<Result<String>>> = Vec::new();
        let token_used = serde_json::to_string(&ServerMessage::TokenActionUsed {
            action_type: TokenActionKind::SkipSong,
        })
        .unwrap();
        for _ in 0..20 {
            script.push(Some(Ok(token_used.clone())));
        }
        script.push(None);

        let (connector, _sent, _closed) = MockConnector::new(vec![script]);
        let cfg = config()
            .with_event_channel_capacity(1)
            .with_reconnect(0, Duration::from_millis(5));
        let (mut socket, mut events) = SessionSocket::start(connector, cfg);

        // Let the channel fill up and events get dropped.
        tokio::time::sleep(Duration::from_millis(100)).await;

        let mut count = 0;
        while let Some(_event) = events.recv().await {
            count += 1;
        }
        // Connected + Disconnected always arrive; most of the 20 signals
        // were dropped by the single-slot channel.
        assert!(count >= 2, "expected at least 2 events, got {count}");
        assert!(count < 22, "expected backpressure to drop events, got {count}");

        socket.shutdown().await;
    }

    #[tokio::test]
    async fn config_defaults() {
        let cfg = SocketConfig::new(session_id());
        assert_eq!(cfg.event_channel_capacity, 256);
        assert_eq!(cfg.shutdown_timeout, Duration::from_secs(1));
        assert_eq!(cfg.reconnect_attempts, 3);
        assert!(cfg.player_name.is_none());
        assert!(cfg.player_id.is_none());
    }

    #[tokio::test]
    async fn event_channel_capacity_is_clamped_to_one() {
        let cfg = SocketConfig::new(session_id()).with_event_channel_capacity(0);
        assert_eq!(cfg.event_channel_capacity, 1);
    }
}
