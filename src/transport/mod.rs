//! I/O Engine Contract
//!
//! The client core never touches sockets. It talks to an engine through the
//! [`Transport`] trait, and the engine reports back with [`TransportEvent`]s
//! that the owner of the [`Client`](crate::client::Client) feeds into
//! [`Client::handle_event`](crate::client::Client::handle_event).
//!
//! ```text
//!            connect / send / close
//!   Client ─────────────────────────> Transport (engine)
//!     ▲                                    │
//!     │   Connected | Error | Data | Closed│
//!     └────────────── TransportEvent ──────┘
//! ```
//!
//! [`TcpTransport`] is the engine used by
//! [`ClientHandle`](crate::client::ClientHandle); tests plug in their own.

pub mod tcp;

pub use tcp::TcpTransport;

use bytes::Bytes;
use std::fmt;
use std::io;

/// Opaque identifier the engine assigns to a socket.
///
/// Stable for the socket's lifetime; the pool is keyed by it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(u64);

impl ConnectionId {
    pub fn new(raw: u64) -> Self {
        Self(raw)
    }

    pub fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// The operations the client needs from an I/O engine.
pub trait Transport {
    /// Starts connecting to `host:port` and returns the new socket's id.
    ///
    /// Completion is reported later as [`Notification::Connected`] or
    /// [`Notification::Error`].
    fn connect(&mut self, host: &str, port: u16) -> ConnectionId;

    /// Queues bytes on a connected socket.
    fn send(&mut self, id: ConnectionId, data: Bytes);

    /// Closes a socket the client no longer wants.
    fn close(&mut self, id: ConnectionId);
}

/// A notification from the engine about one socket.
#[derive(Debug)]
pub enum Notification {
    /// The socket finished connecting.
    Connected,
    /// Connecting failed, or the socket hit an I/O error.
    Error(io::Error),
    /// Bytes arrived.
    Data(Bytes),
    /// The peer closed the socket.
    Closed,
}

/// A [`Notification`] addressed to a connection.
#[derive(Debug)]
pub struct TransportEvent {
    pub id: ConnectionId,
    pub notification: Notification,
}

impl TransportEvent {
    pub fn new(id: ConnectionId, notification: Notification) -> Self {
        Self { id, notification }
    }

    pub fn connected(id: ConnectionId) -> Self {
        Self::new(id, Notification::Connected)
    }

    pub fn data(id: ConnectionId, data: impl Into<Bytes>) -> Self {
        Self::new(id, Notification::Data(data.into()))
    }

    pub fn error(id: ConnectionId, error: io::Error) -> Self {
        Self::new(id, Notification::Error(error))
    }

    pub fn closed(id: ConnectionId) -> Self {
        Self::new(id, Notification::Closed)
    }
}
