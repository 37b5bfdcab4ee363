//! Connection State Machine
//!
//! A [`Connection`] owns one socket's client-side state: whether the socket is
//! up, the request waiting for it to come up, the reply sender owed to the
//! command in flight, and the assembler collecting that command's reply.
//!
//! ## Connection Lifecycle
//!
//! ```text
//!   open ──> Connecting ──command──> Busy ──reply──> Idle ──command──> Busy ...
//!                                     │                │
//!                          close/error/bad reply   close/error
//!                                     ▼                ▼
//!                                Disconnected     Disconnected
//! ```
//!
//! A command may be issued while the socket is still connecting; its encoded
//! bytes are held as pending outbound and transmitted on `Connected`.
//!
//! The connection never decides where it lives. It reports what happened
//! ([`DataOutcome`]) and the [`Client`](crate::client::Client) moves it between
//! the pool and the in-flight set.

use crate::client::{ClientError, ReplySender};
use crate::protocol::{Command, ReplyAssembler, RespValue};
use crate::transport::{ConnectionId, Transport};
use bytes::Bytes;
use std::fmt;
use tracing::{debug, trace, warn};

/// Where a connection is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// The socket closed or failed; the connection is unusable.
    Disconnected,
    /// Connect in progress and no command issued yet.
    Connecting,
    /// In the pool with nothing outstanding.
    Idle,
    /// A command was issued and its reply has not completed.
    Busy,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Idle => "idle",
            ConnectionState::Busy => "busy",
        };
        f.write_str(name)
    }
}

/// What a delivery of bytes did to the connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataOutcome {
    /// The reply is still incomplete; stay busy.
    AwaitingMore,
    /// The reply completed and was delivered; the connection is idle again.
    Completed,
    /// The reply was not valid RESP; the command failed and the connection
    /// must be discarded.
    Corrupted,
    /// The reply completed and was delivered, but more bytes followed it in
    /// the same delivery. The stream is out of step with the commands sent,
    /// so the connection must be discarded.
    Overrun,
    /// Bytes arrived with no command outstanding.
    Unsolicited,
}

/// One pooled socket and its in-flight command.
pub struct Connection {
    id: ConnectionId,
    state: ConnectionState,
    /// The engine reported the socket as established
    connected: bool,
    /// Request issued before the socket came up
    pending_outbound: Option<Bytes>,
    /// Owed to the outstanding command, at most one
    reply: Option<ReplySender>,
    assembler: ReplyAssembler,
}

impl Connection {
    /// Starts connecting a new socket through the engine.
    pub fn open<T: Transport>(transport: &mut T, host: &str, port: u16) -> Self {
        let id = transport.connect(host, port);
        debug!(connection = %id, "Opening connection");
        Self {
            id,
            state: ConnectionState::Connecting,
            connected: false,
            pending_outbound: None,
            reply: None,
            assembler: ReplyAssembler::new(),
        }
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// Returns true once the engine has reported the socket as established.
    pub fn is_connected(&self) -> bool {
        self.connected
    }

    /// Returns true while a request is waiting for the socket to connect.
    pub fn has_pending_outbound(&self) -> bool {
        self.pending_outbound.is_some()
    }

    /// Number of reply bytes a split bulk string is still waiting for.
    pub fn bytes_still_needed(&self) -> usize {
        self.assembler.bytes_still_needed()
    }

    /// Issues `command` on this connection and makes it busy.
    ///
    /// Only valid on a connection that has nothing outstanding (fresh or
    /// idle). The request goes out immediately if the socket is up and is
    /// held until `Connected` otherwise.
    ///
    /// Returns the number of request bytes sent or queued.
    pub fn command<T: Transport>(
        &mut self,
        transport: &mut T,
        command: &Command,
        reply: ReplySender,
    ) -> usize {
        debug_assert!(
            matches!(self.state, ConnectionState::Connecting | ConnectionState::Idle),
            "command issued on a {} connection",
            self.state
        );
        debug_assert!(self.reply.is_none());

        let request = command.encode();
        let len = request.len();

        if self.connected {
            trace!(connection = %self.id, command = %command, bytes = len, "Sending command");
            transport.send(self.id, request);
        } else {
            trace!(connection = %self.id, command = %command, bytes = len, "Queueing command until connected");
            self.pending_outbound = Some(request);
        }

        self.reply = Some(reply);
        self.state = ConnectionState::Busy;
        len
    }

    /// Handles the engine's "connected" notification.
    pub fn on_connected<T: Transport>(&mut self, transport: &mut T) {
        self.connected = true;
        if let Some(request) = self.pending_outbound.take() {
            trace!(connection = %self.id, bytes = request.len(), "Connected, sending queued command");
            transport.send(self.id, request);
        } else {
            debug!(connection = %self.id, "Connected");
        }
    }

    /// Handles bytes delivered by the engine.
    pub fn on_data(&mut self, data: &[u8]) -> DataOutcome {
        if self.state != ConnectionState::Busy {
            warn!(
                connection = %self.id,
                state = %self.state,
                bytes = data.len(),
                "Data received with no command outstanding"
            );
            return DataOutcome::Unsolicited;
        }

        match self.assembler.feed(data) {
            Ok(None) => DataOutcome::AwaitingMore,
            Ok(Some(value)) => {
                self.resolve(Ok(value));
                let trailing = self.assembler.buffered();
                if trailing > 0 {
                    warn!(connection = %self.id, trailing = trailing, "Data received after a complete reply");
                    self.assembler.reset();
                    self.state = ConnectionState::Disconnected;
                    DataOutcome::Overrun
                } else {
                    self.state = ConnectionState::Idle;
                    DataOutcome::Completed
                }
            }
            Err(e) => {
                warn!(connection = %self.id, error = %e, "Protocol error in reply");
                self.state = ConnectionState::Disconnected;
                self.resolve(Err(ClientError::Protocol(e)));
                DataOutcome::Corrupted
            }
        }
    }

    /// Marks the connection unusable and fails the outstanding command, if any.
    ///
    /// Returns true when a command was failed.
    pub fn fail(&mut self, error: ClientError) -> bool {
        self.state = ConnectionState::Disconnected;
        self.connected = false;
        self.assembler.reset();
        if self.reply.is_some() {
            debug!(connection = %self.id, error = %error, "Failing outstanding command");
            self.resolve(Err(error));
            true
        } else {
            false
        }
    }

    /// Clears per-command state and delivers the result exactly once.
    fn resolve(&mut self, result: Result<RespValue, ClientError>) {
        self.pending_outbound = None;
        if let Some(reply) = self.reply.take() {
            if reply.send(result).is_err() {
                trace!(connection = %self.id, "Reply receiver dropped before completion");
            }
        }
    }
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("id", &self.id)
            .field("state", &self.state)
            .field("connected", &self.connected)
            .field("pending_outbound", &self.pending_outbound.as_ref().map(Bytes::len))
            .field("reply_owed", &self.reply.is_some())
            .field("buffered", &self.assembler.buffered())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::mock::MockTransport;
    use tokio::sync::oneshot;

    fn reply_pair() -> (ReplySender, oneshot::Receiver<Result<RespValue, ClientError>>) {
        oneshot::channel()
    }

    fn set_foo() -> Command {
        Command::new("SET", ["foo", "bar"])
    }

    #[test]
    fn test_command_before_connect_is_queued() {
        let mut transport = MockTransport::new();
        let mut conn = Connection::open(&mut transport, "localhost", 6379);
        assert_eq!(conn.state(), ConnectionState::Connecting);
        assert_eq!(transport.connects, vec![("localhost".to_string(), 6379)]);

        let (tx, _rx) = reply_pair();
        let len = conn.command(&mut transport, &set_foo(), tx);
        assert_eq!(len, set_foo().encoded_len());
        assert_eq!(conn.state(), ConnectionState::Busy);
        assert!(conn.has_pending_outbound());
        assert!(transport.sent.is_empty());

        conn.on_connected(&mut transport);
        assert!(!conn.has_pending_outbound());
        assert_eq!(transport.sent_to(conn.id()), vec![set_foo().encode()]);
    }

    #[test]
    fn test_command_on_connected_socket_is_sent_immediately() {
        let mut transport = MockTransport::new();
        let mut conn = Connection::open(&mut transport, "localhost", 6379);
        conn.on_connected(&mut transport);
        assert!(transport.sent.is_empty());

        let (tx, _rx) = reply_pair();
        conn.command(&mut transport, &set_foo(), tx);
        assert!(!conn.has_pending_outbound());
        assert_eq!(transport.sent_to(conn.id()).len(), 1);
    }

    #[test]
    fn test_split_reply_completes_once() {
        let mut transport = MockTransport::new();
        let mut conn = Connection::open(&mut transport, "localhost", 6379);
        conn.on_connected(&mut transport);

        let (tx, mut rx) = reply_pair();
        conn.command(&mut transport, &Command::new("GET", ["foo"]), tx);

        assert_eq!(conn.on_data(b"$5\r\nhel"), DataOutcome::AwaitingMore);
        assert_eq!(conn.bytes_still_needed(), 4);
        assert!(rx.try_recv().is_err());

        assert_eq!(conn.on_data(b"lo\r\n"), DataOutcome::Completed);
        assert_eq!(conn.state(), ConnectionState::Idle);
        assert_eq!(rx.try_recv().unwrap().unwrap(), RespValue::bulk_string("hello"));
    }

    #[test]
    fn test_error_reply_is_a_successful_decode() {
        let mut transport = MockTransport::new();
        let mut conn = Connection::open(&mut transport, "localhost", 6379);
        conn.on_connected(&mut transport);

        let (tx, mut rx) = reply_pair();
        conn.command(&mut transport, &Command::new("INCR", ["foo"]), tx);
        assert_eq!(conn.on_data(b"-ERR not an integer\r\n"), DataOutcome::Completed);
        assert_eq!(
            rx.try_recv().unwrap().unwrap(),
            RespValue::error("ERR not an integer")
        );
    }

    #[test]
    fn test_bad_reply_corrupts_connection() {
        let mut transport = MockTransport::new();
        let mut conn = Connection::open(&mut transport, "localhost", 6379);
        conn.on_connected(&mut transport);

        let (tx, mut rx) = reply_pair();
        conn.command(&mut transport, &Command::new("GET", ["foo"]), tx);
        assert_eq!(conn.on_data(b"%garbage\r\n"), DataOutcome::Corrupted);
        assert_eq!(conn.state(), ConnectionState::Disconnected);
        assert!(matches!(rx.try_recv().unwrap(), Err(ClientError::Protocol(_))));
    }

    #[test]
    fn test_fail_while_busy_resolves_once() {
        let mut transport = MockTransport::new();
        let mut conn = Connection::open(&mut transport, "localhost", 6379);

        let (tx, mut rx) = reply_pair();
        conn.command(&mut transport, &set_foo(), tx);
        assert!(conn.fail(ClientError::ConnectionClosed));
        assert!(!conn.has_pending_outbound());
        assert!(matches!(rx.try_recv().unwrap(), Err(ClientError::ConnectionClosed)));

        // nothing left to fail
        assert!(!conn.fail(ClientError::ConnectionClosed));
    }

    #[test]
    fn test_data_while_idle_is_unsolicited() {
        let mut transport = MockTransport::new();
        let mut conn = Connection::open(&mut transport, "localhost", 6379);
        conn.on_connected(&mut transport);

        let (tx, _rx) = reply_pair();
        conn.command(&mut transport, &set_foo(), tx);
        assert_eq!(conn.on_data(b"+OK\r\n"), DataOutcome::Completed);
        assert_eq!(conn.on_data(b"+OK\r\n"), DataOutcome::Unsolicited);
    }

    #[test]
    fn test_bytes_after_reply_deliver_value_then_overrun() {
        let mut transport = MockTransport::new();
        let mut conn = Connection::open(&mut transport, "localhost", 6379);
        conn.on_connected(&mut transport);

        let (tx, mut rx) = reply_pair();
        conn.command(&mut transport, &set_foo(), tx);
        assert_eq!(conn.on_data(b"+OK\r\n$5\r\nab"), DataOutcome::Overrun);
        assert_eq!(conn.state(), ConnectionState::Disconnected);
        assert_eq!(rx.try_recv().unwrap().unwrap(), RespValue::simple_string("OK"));
    }
}
