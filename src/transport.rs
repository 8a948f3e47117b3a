//! Transport abstraction for the Trackline push channel.
//!
//! The [`Transport`] trait defines a bidirectional text message channel
//! between the client and server. The push protocol uses JSON text messages,
//! so every transport implementation must handle message framing internally
//! (e.g., WebSocket frames, length-prefixed TCP).
//!
//! [`Connector`] is the async factory that produces connected transports.
//! Connection *parameters* differ per backend (URLs for WebSocket, host:port
//! for TCP), so they live in the connector, not in this trait. The socket
//! loop holds the connector for the lifetime of a session and reuses it to
//! reconnect with the same session id after transport loss.

use async_trait::async_trait;

use crate::error::Result;

/// A bidirectional text message transport for the Trackline push channel.
///
/// Implementors shuttle serialized JSON strings between the client and
/// server. Each call to [`send`](Transport::send) transmits one complete
/// JSON message; each call to [`recv`](Transport::recv) returns one.
///
/// # Cancel Safety
///
/// [`recv`](Transport::recv) **MUST** be cancel-safe because it is used
/// inside `tokio::select!`. If `recv` is cancelled before completion,
/// calling it again must not lose data. Channel-based implementations
/// (e.g., wrapping `mpsc::Receiver`) are naturally cancel-safe.
#[async_trait]
pub trait Transport: Send + 'static {
    /// Send a JSON text message to the server.
    ///
    /// # Errors
    ///
    /// Returns [`TransportSend`](crate::error::TracklineError::TransportSend)
    /// if the message could not be sent (e.g., connection broken, write
    /// buffer full).
    async fn send(&mut self, message: String) -> Result<()>;

    /// Receive the next JSON text message from the server.
    ///
    /// Returns:
    /// - `Some(Ok(text))` — a complete message was received
    /// - `Some(Err(e))` — a transport error occurred
    /// - `None` — the connection was closed cleanly by the server
    ///
    /// # Cancel Safety
    ///
    /// This method **MUST** be cancel-safe (see [trait documentation](Transport)).
    async fn recv(&mut self) -> Option<Result<String>>;

    /// Close the transport connection gracefully.
    ///
    /// After calling this method, subsequent calls to `send` and `recv` may
    /// return errors or `None`.
    ///
    /// # Errors
    ///
    /// Returns an error if the graceful shutdown fails. Implementations
    /// should still release resources even if the close handshake fails.
    async fn close(&mut self) -> Result<()>;
}

/// An async factory for [`Transport`] connections.
///
/// The socket loop calls [`connect`](Connector::connect) once at startup and
/// again after every transport loss, so reconnection reuses whatever
/// parameters (URL, TLS config) the connector was built with. Missed events
/// are not replayed across reconnects; state is recovered over REST.
///
/// # Implementing a Custom Connector
///
/// ```rust,no_run
/// use async_trait::async_trait;
/// use trackline_client::error::Result;
/// use trackline_client::transport::{Connector, Transport};
///
/// struct MyConnector { /* ... */ }
/// struct MyTransport { /* ... */ }
///
/// # #[async_trait]
/// # impl Transport for MyTransport {
/// #     async fn send(&mut self, _message: String) -> Result<()> { todo!() }
/// #     async fn recv(&mut self) -> Option<Result<String>> { todo!() }
/// #     async fn close(&mut self) -> Result<()> { todo!() }
/// # }
/// #[async_trait]
/// impl Connector for MyConnector {
///     type Conn = MyTransport;
///
///     async fn connect(&mut self) -> Result<Self::Conn> {
///         // Establish the connection however your backend requires.
///         todo!()
///     }
/// }
/// ```
#[async_trait]
pub trait Connector: Send + 'static {
    /// The transport this connector produces.
    type Conn: Transport;

    /// Establish a new connection.
    ///
    /// # Errors
    ///
    /// Returns a transport-level error when the connection cannot be
    /// established. The socket loop treats this as a failed reconnect
    /// attempt, never as a panic.
    async fn connect(&mut self) -> Result<Self::Conn>;
}
